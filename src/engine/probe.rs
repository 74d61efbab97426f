// Input probing using ffprobe

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Command;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputInfo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub duration: Option<f64>,
    /// Frame count from container metadata, when present
    pub frame_count: Option<u64>,
}

impl InputInfo {
    /// Best-effort frame total: container metadata, else duration × fps.
    ///
    /// Either may be off by a few frames; the session tolerates that.
    pub fn estimated_frames(&self) -> u64 {
        if let Some(count) = self.frame_count.filter(|&c| c > 0) {
            return count;
        }
        match self.duration {
            Some(d) if d > 0.0 && self.fps > 0.0 => (d * self.fps).round() as u64,
            _ => 0,
        }
    }
}

/// Probe input file using ffprobe to get video metadata
pub fn probe_input_info(input_path: &Path) -> Result<InputInfo> {
    // Run ffprobe to get JSON output with video stream info
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
            "-select_streams",
            "v:0", // First video stream only
        ])
        .arg(input_path)
        .output()
        .context("Failed to execute ffprobe")?;

    if !output.status.success() {
        anyhow::bail!(
            "ffprobe failed for {}: {}",
            input_path.display(),
            String::from_utf8_lossy(&output.stderr)
        );
    }

    parse_input_info(&String::from_utf8_lossy(&output.stdout))
}

/// Parse ffprobe JSON (`-show_format -show_streams`) into `InputInfo`
pub fn parse_input_info(json_str: &str) -> Result<InputInfo> {
    let json: serde_json::Value =
        serde_json::from_str(json_str).context("Failed to parse ffprobe JSON output")?;

    let video_stream = json["streams"]
        .as_array()
        .and_then(|streams| streams.first())
        .context("No video stream found")?;

    let width = video_stream["width"]
        .as_u64()
        .context("Failed to get video width")? as u32;
    let height = video_stream["height"]
        .as_u64()
        .context("Failed to get video height")? as u32;

    // Try r_frame_rate first (more accurate), fall back to avg_frame_rate
    let fps = ["r_frame_rate", "avg_frame_rate"]
        .iter()
        .filter_map(|key| video_stream[*key].as_str())
        .find_map(parse_fraction)
        .context("Failed to get video framerate")?;

    // Stream duration is tighter than the container's when both exist
    let duration = video_stream["duration"]
        .as_str()
        .or_else(|| json["format"]["duration"].as_str())
        .and_then(|s| s.parse::<f64>().ok());

    let frame_count = video_stream["nb_frames"]
        .as_str()
        .and_then(|s| s.parse::<u64>().ok());

    Ok(InputInfo {
        width,
        height,
        fps,
        duration,
        frame_count,
    })
}

/// Parse a fraction string like "30000/1001" to f64
fn parse_fraction(s: &str) -> Option<f64> {
    let (numerator, denominator) = s.split_once('/')?;
    let numerator: f64 = numerator.trim().parse().ok()?;
    let denominator: f64 = denominator.trim().parse().ok()?;

    if denominator == 0.0 || numerator == 0.0 {
        return None;
    }

    Some(numerator / denominator)
}
