// FFprobe wrapper for source video metadata

use std::path::Path;
use std::process::Command;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{PreviewError, Result};
use crate::metadata::MediaMetadata;
use crate::tools::{run_tool, ToolError};

#[derive(Debug, Deserialize)]
struct FFprobeOutput {
    streams: Option<Vec<FFprobeStream>>,
    format: Option<FFprobeFormat>,
}

#[derive(Debug, Deserialize)]
struct FFprobeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FFprobeFormat {
    duration: Option<String>,
}

/// Run ffprobe on a video and extract duration and dimensions.
pub fn probe(path: &Path, timeout: Duration, cancel: &AtomicBool) -> Result<MediaMetadata> {
    let mut cmd = Command::new(crate::tools::ffprobe_path());
    cmd.args([
        "-v", "quiet",
        "-print_format", "json",
        "-show_format",
        "-show_streams",
    ])
    .arg(path);

    let output = run_tool(cmd, timeout, cancel).map_err(|e| match e {
        ToolError::Cancelled { .. } => PreviewError::Cancelled,
        other => PreviewError::FFprobe(other.to_string()),
    })?;

    parse_probe_output(&output.stdout)
}

fn parse_probe_output(stdout: &[u8]) -> Result<MediaMetadata> {
    let probe_output: FFprobeOutput = serde_json::from_slice(stdout)
        .map_err(|e| PreviewError::FFprobe(format!("Failed to parse ffprobe output: {}", e)))?;

    let mut meta = MediaMetadata::default();

    if let Some(ref streams) = probe_output.streams {
        if let Some(video) = streams
            .iter()
            .find(|s| s.codec_type.as_deref() == Some("video"))
        {
            meta.width = video.width;
            meta.height = video.height;
            meta.duration_secs = parse_duration(video.duration.as_deref());
        }
    }

    // Container duration wins: stream durations are often missing or truncated
    if let Some(ref format) = probe_output.format {
        if let Some(d) = parse_duration(format.duration.as_deref()) {
            meta.duration_secs = Some(d);
        }
    }

    Ok(meta)
}

/// Parse duration string ("12.480000") to seconds
fn parse_duration(duration_str: Option<&str>) -> Option<f64> {
    let seconds: f64 = duration_str?.trim().parse().ok()?;
    (seconds.is_finite() && seconds >= 0.0).then_some(seconds)
}

/// Check if ffprobe is available
pub fn is_available() -> bool {
    crate::tools::is_tool_available("ffprobe")
}
