//! Per-job pipeline sequencing.
//!
//! A job runs probe, overwrite gate, planning, and encoding in order, and
//! always reaches exactly one terminal outcome. Errors are caught at this
//! boundary, logged with the job's input path, and never propagate to
//! sibling jobs.

use std::path::PathBuf;

use tracing::{debug, error, info};

use crate::config::BatchConfig;
use crate::encoder::{SizeConstrainedEncoder, Transcoder};
use crate::error::{JobError, Result};
use crate::planner;
use crate::probe::Prober;
use crate::prompt::PromptGate;

/// One input-to-output conversion unit.
#[derive(Debug, Clone)]
pub struct StickerJob {
    pub input: PathBuf,
    pub output: PathBuf,
}

impl StickerJob {
    /// Identity carried through every log line and prompt for this job.
    pub fn label(&self) -> String {
        self.input.display().to_string()
    }
}

/// Terminal state of a job. Assigned exactly once.
#[derive(Debug)]
pub enum JobOutcome {
    /// Converted and written under the size budget.
    Done,
    /// Not converted, by user choice or interrupt; not a failure.
    Skipped(String),
    /// Conversion failed; the error never left this job.
    Failed(JobError),
}

/// Runs single jobs end to end.
pub struct JobRunner<P: Prober, T: Transcoder> {
    prober: P,
    encoder: SizeConstrainedEncoder<T>,
    config: BatchConfig,
    gate: PromptGate,
}

impl<P: Prober, T: Transcoder> JobRunner<P, T> {
    pub fn new(
        prober: P,
        encoder: SizeConstrainedEncoder<T>,
        config: BatchConfig,
        gate: PromptGate,
    ) -> Self {
        Self {
            prober,
            encoder,
            config,
            gate,
        }
    }

    /// Run one job to its terminal outcome.
    pub async fn run(&self, job: &StickerJob) -> JobOutcome {
        match self.try_run(job).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(job = %job.input.display(), error = %e, "job failed");
                JobOutcome::Failed(e)
            }
        }
    }

    async fn try_run(&self, job: &StickerJob) -> Result<JobOutcome> {
        let label = job.label();

        let probed = self.prober.probe(&job.input).await?;
        debug!(job = %label, ?probed, "probed input");

        if job.output.exists()
            && !self
                .gate
                .confirm(&label, "output file already exists, overwrite?", true)
                .await?
        {
            info!(job = %label, "skipped: output exists");
            return Ok(JobOutcome::Skipped("output exists".to_string()));
        }

        let plan = match planner::plan(&label, &probed, &self.config, &self.gate).await? {
            Some(plan) => plan,
            None => {
                info!(job = %label, "skipped: transform declined");
                return Ok(JobOutcome::Skipped("transform declined".to_string()));
            }
        };

        self.encoder
            .encode(&label, &job.input, &plan, &job.output)
            .await?;

        info!(job = %label, output = %job.output.display(), "converted");
        Ok(JobOutcome::Done)
    }
}
