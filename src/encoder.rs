//! Size-constrained sticker encoding.
//!
//! Two stages: the filtered clip is extracted as a lossless PNG frame
//! sequence into a scoped temporary directory, then reassembled into a
//! WebM with alpha. If the first assembly misses the size budget one
//! retry runs at reduced quality; a second miss deletes the oversized
//! artifact and fails the job. The frame directory is removed on every
//! exit path.

use std::path::Path;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{JobError, Result};
use crate::planner::NormalizationPlan;

/// Hard ceiling on output size.
pub const SIZE_BUDGET_BYTES: u64 = 256 * 1024;

/// Fixed attempt cap; the second attempt runs at reduced quality. This is
/// deliberate policy, not a tunable retry count.
pub const MAX_ENCODE_ATTEMPTS: usize = 2;

/// Constant-rate-factor for the reduced-quality attempt.
const RETRY_CRF: u32 = 20;

/// Target bitrate for the reduced-quality attempt.
const RETRY_BITRATE: &str = "600k";

/// Quality tier of one encode attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quality {
    Default,
    Reduced,
}

impl Quality {
    fn for_attempt(attempt: usize) -> Self {
        if attempt == 0 {
            Self::Default
        } else {
            Self::Reduced
        }
    }
}

/// External transcoder collaborator.
///
/// The production impl shells out to ffmpeg; tests substitute a stub so
/// the retry policy is exercised without media files.
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Decode `input`, apply `filter_chain`, and write numbered lossless
    /// frames to `frame_pattern` (an ffmpeg `%d`-style path).
    async fn extract_frames(
        &self,
        input: &Path,
        filter_chain: Option<&str>,
        frame_pattern: &Path,
    ) -> Result<()>;

    /// Reassemble the frame sequence at `fps` into a WebM at `output`.
    async fn assemble(
        &self,
        frame_pattern: &Path,
        fps: f64,
        quality: Quality,
        output: &Path,
    ) -> Result<()>;
}

/// ffmpeg-backed transcoder.
pub struct FfmpegTranscoder;

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn extract_frames(
        &self,
        input: &Path,
        filter_chain: Option<&str>,
        frame_pattern: &Path,
    ) -> Result<()> {
        run_ffmpeg(&extract_args(input, filter_chain, frame_pattern)).await
    }

    async fn assemble(
        &self,
        frame_pattern: &Path,
        fps: f64,
        quality: Quality,
        output: &Path,
    ) -> Result<()> {
        run_ffmpeg(&assemble_args(frame_pattern, fps, quality, output)).await
    }
}

fn extract_args(input: &Path, filter_chain: Option<&str>, frame_pattern: &Path) -> Vec<String> {
    let mut args = vec!["-i".to_string(), input.display().to_string()];
    if let Some(chain) = filter_chain {
        args.push("-vf".to_string());
        args.push(chain.to_string());
    }
    args.push("-an".to_string());
    args.push(frame_pattern.display().to_string());
    args
}

fn assemble_args(frame_pattern: &Path, fps: f64, quality: Quality, output: &Path) -> Vec<String> {
    let mut args = vec![
        "-framerate".to_string(),
        format!("{fps}"),
        "-i".to_string(),
        frame_pattern.display().to_string(),
        "-f".to_string(),
        "webm".to_string(),
        "-pix_fmt".to_string(),
        "yuva420p".to_string(),
    ];
    if quality == Quality::Reduced {
        args.extend([
            "-crf".to_string(),
            RETRY_CRF.to_string(),
            "-b:v".to_string(),
            RETRY_BITRATE.to_string(),
        ]);
    }
    args.push("-y".to_string());
    args.push(output.display().to_string());
    args
}

async fn run_ffmpeg(args: &[String]) -> Result<()> {
    debug!(?args, "invoking ffmpeg");

    let output = Command::new("ffmpeg")
        .args(args)
        .output()
        .await
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                JobError::tool_not_found("ffmpeg")
            } else {
                JobError::Io(e)
            }
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(JobError::tool_failed("ffmpeg", stderr.trim().to_string()));
    }

    Ok(())
}

/// Encoder enforcing the output size budget with a fixed retry ladder.
pub struct SizeConstrainedEncoder<T: Transcoder> {
    transcoder: T,
}

impl<T: Transcoder> SizeConstrainedEncoder<T> {
    pub fn new(transcoder: T) -> Self {
        Self { transcoder }
    }

    /// Encode `input` to `output` under the size budget.
    ///
    /// The frame directory lives only for this call and is deleted on
    /// success, on size-retry exhaustion, and on error alike. On failure
    /// no partial or oversized file written by this job is left behind;
    /// an output that predates the job is only removed once an assembly
    /// attempt has actually overwritten it.
    pub async fn encode(
        &self,
        job: &str,
        input: &Path,
        plan: &NormalizationPlan,
        output: &Path,
    ) -> Result<()> {
        let frames = TempDir::new().map_err(|e| JobError::Workspace(e.to_string()))?;

        let mut wrote_output = false;
        let result = self
            .run_attempts(job, input, plan, frames.path(), output, &mut wrote_output)
            .await;
        if result.is_err() && wrote_output {
            let _ = tokio::fs::remove_file(output).await;
        }
        result
    }

    async fn run_attempts(
        &self,
        job: &str,
        input: &Path,
        plan: &NormalizationPlan,
        frame_dir: &Path,
        output: &Path,
        wrote_output: &mut bool,
    ) -> Result<()> {
        let frame_pattern = frame_dir.join("%d.png");

        info!(job, "extracting frame sequence");
        self.transcoder
            .extract_frames(input, plan.filter_chain().as_deref(), &frame_pattern)
            .await?;

        let mut last_size = 0;
        for attempt in 0..MAX_ENCODE_ATTEMPTS {
            let quality = Quality::for_attempt(attempt);
            info!(job, attempt, ?quality, "assembling webm");
            *wrote_output = true;
            self.transcoder
                .assemble(&frame_pattern, plan.reassembly_fps, quality, output)
                .await?;

            let size = tokio::fs::metadata(output).await?.len();
            if size <= SIZE_BUDGET_BYTES {
                info!(job, size, "output within size budget");
                return Ok(());
            }

            last_size = size;
            if attempt + 1 < MAX_ENCODE_ATTEMPTS {
                info!(job, size, "over size budget, retrying at reduced quality");
            }
        }

        Err(JobError::SizeBudgetExceeded {
            size: last_size,
            budget: SIZE_BUDGET_BYTES,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Stub transcoder that writes files of scripted sizes instead of
    /// running ffmpeg.
    struct StubTranscoder {
        /// Output size produced by each assembly attempt, in order.
        attempt_sizes: Vec<u64>,
        fail_extract: bool,
        extract_calls: AtomicUsize,
        assemble_calls: AtomicUsize,
        seen_qualities: Mutex<Vec<Quality>>,
        seen_frame_dir: Mutex<Option<PathBuf>>,
        seen_fps: Mutex<Option<f64>>,
    }

    impl StubTranscoder {
        fn with_sizes(attempt_sizes: Vec<u64>) -> Self {
            Self {
                attempt_sizes,
                fail_extract: false,
                extract_calls: AtomicUsize::new(0),
                assemble_calls: AtomicUsize::new(0),
                seen_qualities: Mutex::new(Vec::new()),
                seen_frame_dir: Mutex::new(None),
                seen_fps: Mutex::new(None),
            }
        }

        fn failing_extract() -> Self {
            Self {
                fail_extract: true,
                ..Self::with_sizes(Vec::new())
            }
        }
    }

    #[async_trait]
    impl Transcoder for StubTranscoder {
        async fn extract_frames(
            &self,
            _input: &Path,
            _filter_chain: Option<&str>,
            frame_pattern: &Path,
        ) -> Result<()> {
            self.extract_calls.fetch_add(1, Ordering::SeqCst);
            *self.seen_frame_dir.lock().unwrap() =
                frame_pattern.parent().map(|p| p.to_path_buf());
            if self.fail_extract {
                return Err(JobError::tool_failed("ffmpeg", "boom"));
            }
            Ok(())
        }

        async fn assemble(
            &self,
            _frame_pattern: &Path,
            fps: f64,
            quality: Quality,
            output: &Path,
        ) -> Result<()> {
            let attempt = self.assemble_calls.fetch_add(1, Ordering::SeqCst);
            self.seen_qualities.lock().unwrap().push(quality);
            *self.seen_fps.lock().unwrap() = Some(fps);
            let size = self.attempt_sizes[attempt] as usize;
            std::fs::write(output, vec![0u8; size]).unwrap();
            Ok(())
        }
    }

    fn empty_plan(fps: f64) -> NormalizationPlan {
        NormalizationPlan {
            steps: Vec::new(),
            reassembly_fps: fps,
        }
    }

    fn output_in(dir: &tempfile::TempDir) -> PathBuf {
        dir.path().join("out.webm")
    }

    #[tokio::test]
    async fn first_attempt_within_budget_never_retries() {
        let dir = tempfile::tempdir().unwrap();
        let output = output_in(&dir);
        let encoder = SizeConstrainedEncoder::new(StubTranscoder::with_sizes(vec![1000]));

        encoder
            .encode("a", Path::new("in.mp4"), &empty_plan(30.0), &output)
            .await
            .unwrap();

        assert_eq!(encoder.transcoder.assemble_calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            *encoder.transcoder.seen_qualities.lock().unwrap(),
            vec![Quality::Default]
        );
        assert!(output.exists());
    }

    #[tokio::test]
    async fn oversized_first_attempt_retries_at_reduced_quality() {
        let dir = tempfile::tempdir().unwrap();
        let output = output_in(&dir);
        let encoder = SizeConstrainedEncoder::new(StubTranscoder::with_sizes(vec![
            SIZE_BUDGET_BYTES + 1,
            1000,
        ]));

        encoder
            .encode("a", Path::new("in.mp4"), &empty_plan(30.0), &output)
            .await
            .unwrap();

        assert_eq!(encoder.transcoder.assemble_calls.load(Ordering::SeqCst), 2);
        assert_eq!(
            *encoder.transcoder.seen_qualities.lock().unwrap(),
            vec![Quality::Default, Quality::Reduced]
        );
    }

    #[tokio::test]
    async fn both_attempts_over_budget_removes_the_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let output = output_in(&dir);
        let encoder = SizeConstrainedEncoder::new(StubTranscoder::with_sizes(vec![
            SIZE_BUDGET_BYTES + 500,
            SIZE_BUDGET_BYTES + 100,
        ]));

        let result = encoder
            .encode("a", Path::new("in.mp4"), &empty_plan(30.0), &output)
            .await;

        assert_matches!(
            result,
            Err(JobError::SizeBudgetExceeded { size, budget })
                if size == SIZE_BUDGET_BYTES + 100 && budget == SIZE_BUDGET_BYTES
        );
        assert_eq!(encoder.transcoder.assemble_calls.load(Ordering::SeqCst), 2);
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn extract_failure_skips_assembly_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let output = output_in(&dir);
        let encoder = SizeConstrainedEncoder::new(StubTranscoder::failing_extract());

        let result = encoder
            .encode("a", Path::new("in.mp4"), &empty_plan(30.0), &output)
            .await;

        assert_matches!(result, Err(JobError::ToolFailed { .. }));
        assert_eq!(encoder.transcoder.assemble_calls.load(Ordering::SeqCst), 0);
        assert!(!output.exists());

        let frame_dir = encoder.transcoder.seen_frame_dir.lock().unwrap().clone();
        assert!(!frame_dir.unwrap().exists());
    }

    #[tokio::test]
    async fn extract_failure_leaves_a_pre_existing_output_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let output = output_in(&dir);
        // A good sticker from an earlier run; this job never writes it.
        std::fs::write(&output, b"previous sticker").unwrap();
        let encoder = SizeConstrainedEncoder::new(StubTranscoder::failing_extract());

        let result = encoder
            .encode("a", Path::new("in.mp4"), &empty_plan(30.0), &output)
            .await;

        assert_matches!(result, Err(JobError::ToolFailed { .. }));
        assert_eq!(std::fs::read(&output).unwrap(), b"previous sticker");
    }

    #[tokio::test]
    async fn frame_directory_is_removed_on_success() {
        let dir = tempfile::tempdir().unwrap();
        let output = output_in(&dir);
        let encoder = SizeConstrainedEncoder::new(StubTranscoder::with_sizes(vec![1]));

        encoder
            .encode("a", Path::new("in.mp4"), &empty_plan(24.0), &output)
            .await
            .unwrap();

        let frame_dir = encoder.transcoder.seen_frame_dir.lock().unwrap().clone();
        assert!(!frame_dir.unwrap().exists());
        assert_eq!(*encoder.transcoder.seen_fps.lock().unwrap(), Some(24.0));
    }

    fn has_pair(args: &[String], flag: &str, value: &str) -> bool {
        args.windows(2).any(|w| w[0] == flag && w[1] == value)
    }

    #[test]
    fn assemble_args_carry_quality_knobs_only_on_retry() {
        let pattern = Path::new("/tmp/frames/%d.png");
        let output = Path::new("/tmp/out.webm");

        let default = assemble_args(pattern, 30.0, Quality::Default, output);
        assert!(!default.contains(&"-crf".to_string()));
        assert!(has_pair(&default, "-framerate", "30"));
        assert!(has_pair(&default, "-pix_fmt", "yuva420p"));
        assert!(has_pair(&default, "-f", "webm"));

        let reduced = assemble_args(pattern, 30.0, Quality::Reduced, output);
        assert!(has_pair(&reduced, "-crf", "20"));
        assert!(has_pair(&reduced, "-b:v", "600k"));
    }

    #[test]
    fn extract_args_include_the_filter_chain_when_present() {
        let pattern = Path::new("/tmp/frames/%d.png");

        let plain = extract_args(Path::new("in.mp4"), None, pattern);
        assert!(!plain.contains(&"-vf".to_string()));

        let filtered = extract_args(Path::new("in.mp4"), Some("scale=512:-1"), pattern);
        assert!(has_pair(&filtered, "-vf", "scale=512:-1"));
    }
}
