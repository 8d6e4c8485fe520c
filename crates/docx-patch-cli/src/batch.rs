//! Batch runner: patch one rendered report per school, recording failures
//! and carrying on with the remaining documents.

use std::any::Any;
use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use docx_patch_core::{DocxPatcher, PatchError, PatchReport, SubstitutionRule};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::rules::prepare_rules;

/// Failure kind recorded for a job that panicked instead of returning.
pub const PANIC_KIND: &str = "panic";

/// Jobs to run, as read from the manifest file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchManifest {
    pub jobs: Vec<JobSpec>,
}

/// One document to patch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSpec {
    /// Label used in logs and in the summary (school id, file stem, ...)
    pub name: String,
    pub input: PathBuf,
    pub output: PathBuf,
    #[serde(default)]
    pub rules: Vec<SubstitutionRule>,
    #[serde(default)]
    pub bold_red: bool,
    #[serde(default)]
    pub literal: bool,
}

impl BatchManifest {
    /// Load a manifest. Relative job paths are resolved against the
    /// manifest's own directory.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest {:?}", path))?;
        let mut manifest: BatchManifest = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid manifest JSON in {:?}", path))?;

        if let Some(base) = path.parent() {
            for job in &mut manifest.jobs {
                job.input = base.join(&job.input);
                job.output = base.join(&job.output);
            }
        }
        Ok(manifest)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobOutcome {
    Patched { report: PatchReport },
    Failed { kind: String, error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct JobResult {
    pub name: String,
    #[serde(flatten)]
    pub outcome: JobOutcome,
}

impl JobResult {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, JobOutcome::Patched { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub succeeded: usize,
    pub failed: usize,
    /// Results in manifest order
    pub jobs: Vec<JobResult>,
}

fn run_job(patcher: &DocxPatcher, job: &JobSpec) -> Result<PatchReport, PatchError> {
    let rules = prepare_rules(job.rules.clone(), job.literal, job.bold_red);
    patcher.patch_rules(&job.input, &rules, &job.output)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "job panicked".to_string()
    }
}

/// Patch every job of `manifest`, at most `max_parallel` at a time.
///
/// A failing job never stops the batch; it is logged and reported in the
/// summary.
#[instrument(skip(patcher, manifest), fields(jobs = manifest.jobs.len()))]
pub async fn run_batch(
    patcher: Arc<DocxPatcher>,
    manifest: BatchManifest,
    max_parallel: usize,
) -> BatchSummary {
    run_jobs(manifest, max_parallel, move |job| run_job(&patcher, job)).await
}

async fn run_jobs<F>(manifest: BatchManifest, max_parallel: usize, job_fn: F) -> BatchSummary
where
    F: Fn(&JobSpec) -> Result<PatchReport, PatchError> + Send + Sync + 'static,
{
    let run_id = Uuid::new_v4().to_string();
    let started_at = Utc::now();
    let total = manifest.jobs.len();
    info!("Batch {} started with {} jobs", run_id, total);

    let job_fn = Arc::new(job_fn);
    let names: Vec<String> = manifest.jobs.iter().map(|j| j.name.clone()).collect();
    let semaphore = Arc::new(Semaphore::new(max_parallel.max(1)));
    let mut tasks = JoinSet::new();

    for (index, job) in manifest.jobs.into_iter().enumerate() {
        let Ok(permit) = semaphore.clone().acquire_owned().await else {
            break;
        };
        let job_fn = Arc::clone(&job_fn);
        tasks.spawn_blocking(move || {
            let _permit = permit;
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| (*job_fn)(&job)));
            (index, outcome)
        });
    }

    let mut results: Vec<(usize, JobResult)> = Vec::with_capacity(total);
    while let Some(joined) = tasks.join_next().await {
        let (index, outcome) = match joined {
            Ok(done) => done,
            Err(e) => {
                error!("Batch {} lost a job: {}", run_id, e);
                continue;
            }
        };
        let name = names[index].clone();

        let outcome = match outcome {
            Ok(Ok(report)) => {
                info!("[{}] wrote {:?}", name, report.output);
                JobOutcome::Patched { report }
            }
            Ok(Err(e)) => {
                error!("[{}] failed: {}", name, e);
                JobOutcome::Failed {
                    kind: e.kind().to_string(),
                    error: e.to_string(),
                }
            }
            Err(payload) => {
                let message = panic_message(&*payload);
                error!("[{}] panicked: {}", name, message);
                JobOutcome::Failed {
                    kind: PANIC_KIND.to_string(),
                    error: message,
                }
            }
        };
        results.push((index, JobResult { name, outcome }));
    }

    // Jobs whose task never reported back still belong in the summary.
    let reported: HashSet<usize> = results.iter().map(|(index, _)| *index).collect();
    for (index, name) in names.into_iter().enumerate() {
        if !reported.contains(&index) {
            results.push((
                index,
                JobResult {
                    name,
                    outcome: JobOutcome::Failed {
                        kind: PANIC_KIND.to_string(),
                        error: "job did not complete".to_string(),
                    },
                },
            ));
        }
    }
    results.sort_by_key(|(index, _)| *index);

    let jobs: Vec<JobResult> = results.into_iter().map(|(_, r)| r).collect();
    let succeeded = jobs.iter().filter(|r| r.is_success()).count();
    let failed = total - succeeded;

    info!(
        "Batch {} finished: {} succeeded, {} failed",
        run_id, succeeded, failed
    );

    BatchSummary {
        run_id,
        started_at,
        finished_at: Utc::now(),
        succeeded,
        failed,
        jobs,
    }
}
