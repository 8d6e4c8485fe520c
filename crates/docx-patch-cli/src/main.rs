//! docx-report-patch: post-processing for rendered per-school reports.
//!
//! - `patch` rewrites one document with ordered find/replace rules
//! - `batch` runs a JSON manifest of documents concurrently and prints a
//!   summary; failed documents are reported and skipped

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use docx_patch_cli::batch::{run_batch, BatchManifest};
use docx_patch_cli::config::{BatchArgs, Command, Config, PatchArgs};
use docx_patch_cli::rules::prepare_rules;
use docx_patch_core::{DocxPatcher, SubstitutionRule};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging (stdout is reserved for JSON output)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Config::parse();

    let patcher = match &config.temp_dir {
        Some(dir) => DocxPatcher::new_with_base_dir(dir),
        None => DocxPatcher::new(),
    }
    .context("Failed to prepare workspace directory")?;
    info!("Workspaces under {:?}", patcher.temp_dir_path());

    match config.command {
        Command::Patch(args) => patch_one(patcher, args).await,
        Command::Batch(args) => patch_batch(patcher, args).await,
    }
}

async fn patch_one(patcher: DocxPatcher, args: PatchArgs) -> anyhow::Result<()> {
    let rules = SubstitutionRule::zip_pairs(&args.finds, &args.replacements)?;
    let rules = prepare_rules(rules, args.literal, args.bold_red);

    let input = args.input.clone();
    let output = args.output.clone();
    let report = tokio::task::spawn_blocking(move || {
        patcher.patch_rules(&args.input, &rules, &args.output)
    })
    .await?
    .with_context(|| format!("Failed to patch {:?} into {:?}", input, output))?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn patch_batch(patcher: DocxPatcher, args: BatchArgs) -> anyhow::Result<()> {
    let manifest = BatchManifest::load(&args.manifest)?;
    let summary = run_batch(Arc::new(patcher), manifest, args.jobs).await;

    let json = serde_json::to_string_pretty(&summary)?;
    match &args.summary {
        Some(path) => std::fs::write(path, json)
            .with_context(|| format!("Failed to write summary to {:?}", path))?,
        None => println!("{}", json),
    }

    if summary.failed > 0 {
        anyhow::bail!(
            "{} of {} documents failed",
            summary.failed,
            summary.failed + summary.succeeded
        );
    }
    Ok(())
}
