use std::path::PathBuf;

/// Errors raised while patching a document package.
///
/// Every variant aborts the whole operation: nothing is written at the
/// output path and the transient workspace is removed.
#[derive(Debug, thiserror::Error)]
pub enum PatchError {
    #[error("Input document not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("{patterns} find patterns but {replacements} replacements")]
    ArityMismatch { patterns: usize, replacements: usize },

    #[error("Corrupt archive {}: {source}", path.display())]
    CorruptArchive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("Invalid document {}: missing part '{part}'", path.display())]
    InvalidDocument { path: PathBuf, part: &'static str },

    #[error("Invalid pattern #{index} '{pattern}': {source}")]
    Pattern {
        index: usize,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Failed to package {}: {source}", path.display())]
    Pack {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PatchError {
    /// Stable short name of the failure class, used in batch summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            PatchError::NotFound(_) => "not_found",
            PatchError::ArityMismatch { .. } => "arity_mismatch",
            PatchError::CorruptArchive { .. } => "corrupt_archive",
            PatchError::InvalidDocument { .. } => "invalid_document",
            PatchError::Pattern { .. } => "pattern_error",
            PatchError::Pack { .. } => "pack_error",
            PatchError::Io(_) => "io_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, PatchError>;
