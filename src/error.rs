//! Error types for sticker conversion jobs.

/// Result type alias using our JobError type.
pub type Result<T> = std::result::Result<T, JobError>;

/// Errors that can fail a single conversion job.
///
/// Every variant is caught at the job-runner boundary and recorded as that
/// job's outcome; none of them abort sibling jobs or the batch.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    /// A required external tool is not available.
    #[error("tool not found: {tool}")]
    ToolNotFound { tool: String },

    /// An external tool exited unsuccessfully.
    #[error("tool execution failed: {tool}: {message}")]
    ToolFailed { tool: String, message: String },

    /// ffprobe output could not be interpreted as a decodable video.
    #[error("failed to parse probe output: {message}")]
    ProbeParse { message: String },

    /// Both encode attempts produced a file over the size budget.
    #[error("output is {size} bytes, over the {budget} byte budget after all attempts")]
    SizeBudgetExceeded { size: u64, budget: u64 },

    /// Temporary frame directory creation or cleanup failure.
    #[error("workspace error: {0}")]
    Workspace(String),

    /// The prompt broker went away while a job was awaiting an answer.
    #[error("interactive prompt stream closed")]
    PromptClosed,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl JobError {
    /// Create a tool not found error.
    pub fn tool_not_found(tool: impl Into<String>) -> Self {
        Self::ToolNotFound { tool: tool.into() }
    }

    /// Create a tool execution failed error.
    pub fn tool_failed(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolFailed {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Create a probe parse error.
    pub fn probe_parse(message: impl Into<String>) -> Self {
        Self::ProbeParse {
            message: message.into(),
        }
    }
}
