//! Normalization planning.
//!
//! Probed stream properties plus policy thresholds produce an ordered list
//! of transform steps, each gated by a confirmation. Step order is fixed:
//! scale, then frame-rate cap, then speed-up, because the speed computation
//! must see the capped working rate.

use crate::config::BatchConfig;
use crate::error::Result;
use crate::probe::ProbeResult;
use crate::prompt::PromptGate;

/// Edge length stickers are normalized to.
pub const TARGET_EDGE: u32 = 512;

/// Frame rates above this are capped.
pub const MAX_FPS: f64 = 30.0;

/// Clips longer than this are sped up to fit.
pub const MAX_DURATION_SECS: f64 = 3.0;

/// One transform in a normalization plan.
#[derive(Debug, Clone, PartialEq)]
pub enum NormalizationStep {
    /// Rescale the frame; `-1` on either axis preserves aspect ratio.
    Scale {
        width: i32,
        height: i32,
        nearest: bool,
    },
    /// Drop frames down to a fixed rate.
    CapFrameRate { fps: u32 },
    /// Multiply presentation timestamps; factors below 1 speed the clip up.
    SpeedUp { factor: f64 },
}

impl NormalizationStep {
    /// Render this step as an ffmpeg filter expression.
    pub fn to_filter(&self) -> String {
        match self {
            Self::Scale {
                width,
                height,
                nearest: false,
            } => format!("scale={width}:{height}"),
            Self::Scale {
                width,
                height,
                nearest: true,
            } => format!("scale={width}:{height}:flags=neighbor"),
            Self::CapFrameRate { fps } => format!("fps={fps}:round=down"),
            Self::SpeedUp { factor } => format!("setpts={factor}*PTS"),
        }
    }
}

/// Ordered transform steps plus the frame rate the encoder must use when
/// reassembling the extracted frame sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizationPlan {
    pub steps: Vec<NormalizationStep>,
    pub reassembly_fps: f64,
}

impl NormalizationPlan {
    /// Comma-joined ffmpeg filter chain, or `None` for a conformant input.
    pub fn filter_chain(&self) -> Option<String> {
        if self.steps.is_empty() {
            return None;
        }
        Some(
            self.steps
                .iter()
                .map(NormalizationStep::to_filter)
                .collect::<Vec<_>>()
                .join(","),
        )
    }
}

/// Derive the normalization plan for one probed input.
///
/// Returns `Ok(None)` when the user declines a required transform: the job
/// is skipped outright, never with a partial plan applied.
pub async fn plan(
    job: &str,
    probe: &ProbeResult,
    config: &BatchConfig,
    gate: &PromptGate,
) -> Result<Option<NormalizationPlan>> {
    let mut steps = Vec::new();
    let mut working_fps = probe.frame_rate;

    if probe.width != TARGET_EDGE || probe.height != TARGET_EDGE {
        let question = format!(
            "clip is {}x{}, scale to fit {}?",
            probe.width, probe.height, TARGET_EDGE
        );
        if !gate.confirm(job, &question, true).await? {
            return Ok(None);
        }

        let nearest = match config.nearest {
            Some(explicit) => explicit,
            None => {
                gate.confirm(job, "use nearest-neighbor scaling?", false)
                    .await?
            }
        };

        // 512 goes on the longer-or-equal edge; the other axis follows the
        // source aspect ratio.
        let (width, height) = if probe.width > probe.height {
            (TARGET_EDGE as i32, -1)
        } else {
            (-1, TARGET_EDGE as i32)
        };
        steps.push(NormalizationStep::Scale {
            width,
            height,
            nearest,
        });
    }

    if probe.frame_rate > MAX_FPS {
        let question = format!(
            "frame rate is {:.3}, reduce to {}?",
            probe.frame_rate, MAX_FPS
        );
        if !gate.confirm(job, &question, true).await? {
            return Ok(None);
        }
        steps.push(NormalizationStep::CapFrameRate {
            fps: MAX_FPS as u32,
        });
        working_fps = MAX_FPS;
    }

    if probe.duration_secs > MAX_DURATION_SECS {
        let question = format!(
            "clip runs {:.2}s, speed up to {}s?",
            probe.duration_secs, MAX_DURATION_SECS
        );
        if !gate.confirm(job, &question, true).await? {
            return Ok(None);
        }
        steps.push(NormalizationStep::SpeedUp {
            factor: MAX_DURATION_SECS / probe.duration_secs,
        });
    }

    Ok(Some(NormalizationPlan {
        steps,
        reassembly_fps: working_fps,
    }))
}
