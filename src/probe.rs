//! FFprobe-based media probing.
//!
//! One external ffprobe query per job, no retries: an unreadable input is
//! not a transient condition. The first video stream is authoritative for
//! dimensions, duration, and frame rate.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use tokio::process::Command;

use crate::error::{JobError, Result};

/// Stream properties of an input clip, derived once per job.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeResult {
    pub width: u32,
    pub height: u32,
    pub duration_secs: f64,
    pub frame_rate: f64,
}

/// Probe collaborator seam.
///
/// The production impl shells out to ffprobe; tests substitute a stub.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, path: &Path) -> Result<ProbeResult>;
}

/// ffprobe-backed prober.
pub struct FfProber;

#[async_trait]
impl Prober for FfProber {
    async fn probe(&self, path: &Path) -> Result<ProbeResult> {
        probe(path).await
    }
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: FfprobeFormat,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    duration: Option<String>,
    avg_frame_rate: Option<String>,
}

/// Probe a media file using ffprobe.
pub async fn probe(path: &Path) -> Result<ProbeResult> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .output()
        .await
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                JobError::tool_not_found("ffprobe")
            } else {
                JobError::Io(e)
            }
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(JobError::tool_failed("ffprobe", stderr.trim().to_string()));
    }

    parse_probe_output(&output.stdout)
}

/// Interpret raw ffprobe JSON. Split from the subprocess call so fixtures
/// can exercise it directly.
fn parse_probe_output(raw: &[u8]) -> Result<ProbeResult> {
    let parsed: FfprobeOutput = serde_json::from_slice(raw)?;

    let stream = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| JobError::probe_parse("no video stream"))?;

    let width = stream.width.unwrap_or(0);
    let height = stream.height.unwrap_or(0);
    if width == 0 || height == 0 {
        return Err(JobError::probe_parse("missing or zero video dimensions"));
    }

    // WebM/Matroska streams often omit per-stream duration; the container
    // format section carries it instead.
    let duration_secs = stream
        .duration
        .as_deref()
        .or(parsed.format.duration.as_deref())
        .and_then(|s| s.parse::<f64>().ok())
        .ok_or_else(|| JobError::probe_parse("missing duration"))?;
    if duration_secs <= 0.0 {
        return Err(JobError::probe_parse("non-positive duration"));
    }

    let frame_rate = stream
        .avg_frame_rate
        .as_deref()
        .and_then(parse_frame_rate)
        .ok_or_else(|| JobError::probe_parse("missing or invalid frame rate"))?;
    if frame_rate <= 0.0 {
        return Err(JobError::probe_parse("non-positive frame rate"));
    }

    Ok(ProbeResult {
        width,
        height,
        duration_secs,
        frame_rate,
    })
}

/// Frame rates come from ffprobe as a rational "N/D" string.
fn parse_frame_rate(rate_str: &str) -> Option<f64> {
    let parts: Vec<&str> = rate_str.split('/').collect();
    if parts.len() == 2 {
        let num: f64 = parts[0].parse().ok()?;
        let den: f64 = parts[1].parse().ok()?;
        if den != 0.0 {
            return Some(num / den);
        }
    }
    rate_str.parse().ok()
}
