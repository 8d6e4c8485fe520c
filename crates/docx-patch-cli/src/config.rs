use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Configuration for the docx-report-patch tool.
#[derive(Parser, Debug, Clone)]
#[command(name = "docx-report-patch")]
#[command(about = "Highlight figures inside rendered DOCX reports by patching their body XML")]
pub struct Config {
    /// Base directory for transient extraction workspaces
    #[arg(long, global = true, env = "DOCX_PATCH_TEMP")]
    pub temp_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Patch a single document
    Patch(PatchArgs),
    /// Patch every document listed in a JSON manifest
    Batch(BatchArgs),
}

#[derive(Args, Debug, Clone)]
pub struct PatchArgs {
    /// Rendered document to read
    #[arg(long, short)]
    pub input: PathBuf,

    /// Where to write the patched document (may equal --input)
    #[arg(long, short)]
    pub output: PathBuf,

    /// Regular expression to find; repeat, paired by position with --replace
    #[arg(long = "find", value_name = "REGEX")]
    pub finds: Vec<String>,

    /// Replacement text; `\1`..`\9` insert capture groups
    #[arg(long = "replace", value_name = "TEXT", allow_hyphen_values = true)]
    pub replacements: Vec<String>,

    /// Render replaced text bold red
    #[arg(long)]
    pub bold_red: bool,

    /// Treat --find and --replace as plain document text instead of regex/markup
    #[arg(long)]
    pub literal: bool,
}

#[derive(Args, Debug, Clone)]
pub struct BatchArgs {
    /// JSON manifest describing the jobs
    #[arg(long, short)]
    pub manifest: PathBuf,

    /// Maximum number of documents patched at the same time
    #[arg(long, default_value = "4", env = "DOCX_PATCH_JOBS")]
    pub jobs: usize,

    /// Write the JSON summary to this file instead of stdout
    #[arg(long)]
    pub summary: Option<PathBuf>,
}
