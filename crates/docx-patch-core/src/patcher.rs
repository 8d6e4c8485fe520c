use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info, instrument, warn};
use zip::result::ZipError;

use crate::archive::ExtractedArchive;
use crate::body::{BodyBuffer, BODY_PART};
use crate::error::{PatchError, Result};
use crate::format::wrap_bold_red;
use crate::substitute::{apply_rules, SubstitutionRule};

/// Environment variable overriding the base directory for workspaces.
pub const TEMP_DIR_ENV: &str = "DOCX_PATCH_TEMP";

const EXPECTED_EXTENSION: &str = "docx";

/// Outcome of a successful patch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchReport {
    pub output: PathBuf,
    /// Members written to the output package
    pub members: usize,
    /// Matches per rule, in rule order
    pub matches: Vec<usize>,
}

impl PatchReport {
    pub fn total_replacements(&self) -> usize {
        self.matches.iter().sum()
    }
}

/// Patches the body text of document packages.
///
/// Each call unpacks into its own workspace below `temp_dir`, so one patcher
/// can be shared between threads.
#[derive(Debug, Clone)]
pub struct DocxPatcher {
    temp_dir: PathBuf,
}

impl DocxPatcher {
    pub fn new() -> Result<Self> {
        let base = std::env::var_os(TEMP_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(std::env::temp_dir);
        Self::new_with_base_dir(base)
    }

    /// Create a patcher that places its workspaces under the provided base directory
    pub fn new_with_base_dir<P: AsRef<Path>>(base_dir: P) -> Result<Self> {
        let temp_dir = base_dir.as_ref().to_path_buf();
        fs::create_dir_all(&temp_dir)?;
        Ok(Self { temp_dir })
    }

    pub fn temp_dir_path(&self) -> &Path {
        &self.temp_dir
    }

    /// Replace `find_patterns[i]` with `replacements[i]`, in order, inside
    /// the body of `input` and write the result to `output`.
    pub fn patch<F, R>(
        &self,
        input: &Path,
        find_patterns: &[F],
        replacements: &[R],
        output: &Path,
    ) -> Result<PatchReport>
    where
        F: AsRef<str>,
        R: AsRef<str>,
    {
        let rules = SubstitutionRule::zip_pairs(find_patterns, replacements)?;
        self.patch_rules(input, &rules, output)
    }

    /// Same as [`DocxPatcher::patch`], with every replacement rendered bold
    /// red and the following text reset to non-bold black.
    pub fn patch_bold_red<F, R>(
        &self,
        input: &Path,
        find_patterns: &[F],
        replacements: &[R],
        output: &Path,
    ) -> Result<PatchReport>
    where
        F: AsRef<str>,
        R: AsRef<str>,
    {
        let formatted = wrap_bold_red(replacements);
        self.patch(input, find_patterns, &formatted, output)
    }

    #[instrument(skip(self, rules), fields(rule_count = rules.len()), level = "debug")]
    pub fn patch_rules(
        &self,
        input: &Path,
        rules: &[SubstitutionRule],
        output: &Path,
    ) -> Result<PatchReport> {
        if !input.is_file() {
            return Err(PatchError::NotFound(input.to_path_buf()));
        }
        let extension_ok = input
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(EXPECTED_EXTENSION));
        if !extension_ok {
            warn!(
                "Input {:?} does not have a .{} extension, patching anyway",
                input, EXPECTED_EXTENSION
            );
        }

        // Dropping `extracted` removes the workspace on every path out of here.
        let extracted = ExtractedArchive::unpack(input, &self.temp_dir)?;

        let body_path = extracted.part_path(BODY_PART);
        if !body_path.is_file() {
            return Err(PatchError::InvalidDocument {
                path: input.to_path_buf(),
                part: BODY_PART,
            });
        }

        let mut body = BodyBuffer::read(&body_path)?;
        let (patched, matches) = apply_rules(body.as_str(), rules)?;
        body.replace_text(patched);
        body.write(&body_path)?;

        let members = self.write_package(&extracted, input, output)?;

        let report = PatchReport {
            output: output.to_path_buf(),
            members,
            matches,
        };
        info!(
            "Patched {:?} -> {:?} ({} replacements)",
            input,
            output,
            report.total_replacements()
        );
        Ok(report)
    }

    /// Pack the workspace into a staged file next to `output`, then move it
    /// into place with the permissions of `input`. A failure leaves nothing
    /// at `output`.
    fn write_package(
        &self,
        extracted: &ExtractedArchive,
        input: &Path,
        output: &Path,
    ) -> Result<usize> {
        let parent = match output.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let mut staged = NamedTempFile::new_in(parent)?;

        let pack_err = |source: ZipError| PatchError::Pack {
            path: output.to_path_buf(),
            source,
        };
        let members = extracted
            .pack_into(staged.as_file_mut())
            .map_err(pack_err)?;
        staged.as_file().sync_all()?;
        // The staged file is created owner-only.
        fs::set_permissions(staged.path(), fs::metadata(input)?.permissions())?;

        debug!("Staged package at {:?}", staged.path());
        staged.persist(output).map_err(|e| PatchError::Io(e.error))?;
        Ok(members)
    }
}
