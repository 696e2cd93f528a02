//! Batch configuration.
//!
//! One `BatchConfig` is built per invocation and passed explicitly into the
//! orchestrator and every job runner; there is no process-wide mutable state.

use std::path::PathBuf;

/// Default number of concurrently running jobs.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Settings for one batch invocation.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Directory receiving one `<stem>.webm` per input file.
    pub output_dir: PathBuf,

    /// Maximum number of concurrently running jobs.
    pub concurrency: usize,

    /// Answer every prompt with its default, without any interactive I/O.
    pub assume_yes: bool,

    /// Nearest-neighbor scaling policy. `Some` is authoritative and
    /// suppresses the per-job prompt; `None` asks for each scaled job.
    pub nearest: Option<bool>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output"),
            concurrency: DEFAULT_CONCURRENCY,
            assume_yes: false,
            nearest: None,
        }
    }
}

impl BatchConfig {
    /// Concurrency clamped so at least one job can always run.
    pub fn effective_concurrency(&self) -> usize {
        self.concurrency.max(1)
    }
}
