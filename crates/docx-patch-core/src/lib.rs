//! Text patching for rendered DOCX report packages.
//!
//! This crate rewrites the body part (`word/document.xml`) of a ZIP-packaged
//! document as raw text:
//! - `DocxPatcher`: unpack into a transient workspace, apply ordered regex
//!   substitutions, repack every member into a new archive
//! - `format`: wrap replacements in run formatting (bold red by default) so
//!   matched figures stand out in the rendered report
//! - `SubstitutionRule`: one ordered find/replace step with `\N` back-references

pub mod archive;
pub mod body;
mod error;
pub mod format;
mod patcher;
pub mod substitute;

pub use archive::{ArchiveManifest, ArchiveMember, ExtractedArchive};
pub use body::{BodyBuffer, BODY_PART};
pub use error::{PatchError, Result};
pub use format::{wrap_bold_red, wrap_replacements, RunStyle};
pub use patcher::{DocxPatcher, PatchReport, TEMP_DIR_ENV};
pub use substitute::{apply_rules, escape_xml_text, SubstitutionRule};
