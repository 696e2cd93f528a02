//! Batch orchestration.
//!
//! Discovers input jobs, runs them under a bounded concurrency limit,
//! aggregates outcomes, and reports a summary. Individual job failures are
//! logged and counted but never abort the batch; only pre-batch setup
//! (a declined output directory) does.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use walkdir::WalkDir;

use crate::config::BatchConfig;
use crate::encoder::{FfmpegTranscoder, SizeConstrainedEncoder, Transcoder};
use crate::probe::{FfProber, Prober};
use crate::prompt::PromptGate;
use crate::runner::{JobOutcome, JobRunner, StickerJob};

/// Tally of terminal job outcomes for one batch run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchSummary {
    pub done: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl BatchSummary {
    fn record(&mut self, outcome: &JobOutcome) {
        match outcome {
            JobOutcome::Done => self.done += 1,
            JobOutcome::Skipped(_) => self.skipped += 1,
            JobOutcome::Failed(_) => self.failed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.done + self.skipped + self.failed
    }
}

/// Recursively expand input roots into concrete input files.
///
/// Directories recurse; plain files pass through unchanged. Unreadable
/// entries (permission errors, dangling links) are reported and skipped
/// without aborting the rest of the walk.
pub fn discover_inputs(roots: &[PathBuf]) -> Vec<PathBuf> {
    let mut inputs = Vec::new();
    for root in roots {
        for entry in WalkDir::new(root).follow_links(true) {
            match entry {
                Ok(entry) => {
                    if entry.file_type().is_dir() {
                        continue;
                    }
                    inputs.push(entry.path().to_path_buf());
                }
                Err(e) => {
                    warn!(root = %root.display(), error = %e, "skipping unreadable entry");
                }
            }
        }
    }
    inputs
}

/// Pair every discovered input with its `<stem>.webm` output path.
fn to_jobs(inputs: Vec<PathBuf>, output_dir: &Path) -> Vec<StickerJob> {
    inputs
        .into_iter()
        .map(|input| {
            let stem = input
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "output".to_string());
            let output = output_dir.join(format!("{stem}.webm"));
            StickerJob { input, output }
        })
        .collect()
}

/// Runs a whole batch of conversion jobs under a concurrency cap.
pub struct BatchOrchestrator<P: Prober, T: Transcoder> {
    runner: Arc<JobRunner<P, T>>,
    gate: PromptGate,
    config: BatchConfig,
    shutdown: Arc<AtomicBool>,
}

impl BatchOrchestrator<FfProber, FfmpegTranscoder> {
    /// Orchestrator backed by the real ffprobe/ffmpeg collaborators.
    pub fn new(config: BatchConfig, gate: PromptGate) -> Self {
        Self::with_collaborators(FfProber, FfmpegTranscoder, config, gate)
    }
}

impl<P, T> BatchOrchestrator<P, T>
where
    P: Prober + 'static,
    T: Transcoder + 'static,
{
    pub fn with_collaborators(
        prober: P,
        transcoder: T,
        config: BatchConfig,
        gate: PromptGate,
    ) -> Self {
        let runner = Arc::new(JobRunner::new(
            prober,
            SizeConstrainedEncoder::new(transcoder),
            config.clone(),
            gate.clone(),
        ));
        Self {
            runner,
            gate,
            config,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// External stop signal. Once set, queued jobs are no longer admitted;
    /// in-flight jobs finish their current external call.
    pub fn shutdown_signal(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Run the whole batch to completion and return the outcome tally.
    pub async fn run(&self, roots: &[PathBuf]) -> Result<BatchSummary> {
        self.ensure_output_dir().await?;

        let jobs = to_jobs(discover_inputs(roots), &self.config.output_dir);
        if jobs.is_empty() {
            warn!("no input files discovered");
            return Ok(BatchSummary::default());
        }

        info!(
            jobs = jobs.len(),
            concurrency = self.config.effective_concurrency(),
            "starting batch"
        );

        let semaphore = Arc::new(Semaphore::new(self.config.effective_concurrency()));
        let mut tasks = JoinSet::new();

        for job in jobs {
            let runner = Arc::clone(&self.runner);
            let semaphore = Arc::clone(&semaphore);
            let shutdown = Arc::clone(&self.shutdown);
            tasks.spawn(async move {
                let _permit = match semaphore.acquire().await {
                    Ok(permit) => permit,
                    Err(_) => return (job, JobOutcome::Skipped("interrupted".to_string())),
                };
                if shutdown.load(Ordering::Relaxed) {
                    return (job, JobOutcome::Skipped("interrupted".to_string()));
                }
                let outcome = runner.run(&job).await;
                (job, outcome)
            });
        }

        let mut summary = BatchSummary::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((job, outcome)) => {
                    report(&job, &outcome);
                    summary.record(&outcome);
                }
                Err(e) => {
                    error!(error = %e, "job task panicked");
                    summary.failed += 1;
                }
            }
        }

        info!(
            done = summary.done,
            skipped = summary.skipped,
            failed = summary.failed,
            "batch complete"
        );
        Ok(summary)
    }

    async fn ensure_output_dir(&self) -> Result<()> {
        let dir = &self.config.output_dir;
        if dir.is_dir() {
            return Ok(());
        }

        let question = format!("output directory {} does not exist, create?", dir.display());
        let create = self
            .gate
            .confirm("batch", &question, true)
            .await
            .context("output directory prompt failed")?;
        if !create {
            bail!("output directory creation declined, aborting");
        }

        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("failed to create output directory {}", dir.display()))?;
        Ok(())
    }
}

/// One outcome line per job, keyed by the job's input identity.
fn report(job: &StickerJob, outcome: &JobOutcome) {
    match outcome {
        JobOutcome::Done => info!(job = %job.input.display(), "done"),
        JobOutcome::Skipped(reason) => {
            info!(job = %job.input.display(), reason, "skipped")
        }
        JobOutcome::Failed(e) => error!(job = %job.input.display(), error = %e, "failed"),
    }
}
