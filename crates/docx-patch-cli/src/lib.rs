//! Front end for docx-patch-core: single-document patching and the
//! per-school batch runner used after template rendering.

pub mod batch;
pub mod config;
pub mod rules;
