use anyhow::{Context, Result};
use std::process::Command;

fn first_version_line(tool: &str) -> Result<String> {
    let output = Command::new(tool)
        .arg("-version")
        .output()
        .with_context(|| format!("Failed to execute {tool}. Is {tool} installed and in PATH?"))?;

    if !output.status.success() {
        anyhow::bail!("{} command failed with status: {}", tool, output.status);
    }

    let version_output = String::from_utf8_lossy(&output.stdout);
    let first_line = version_output.lines().next().unwrap_or("Unknown version");

    Ok(first_line.to_string())
}

/// Check if ffmpeg is available and return its version
pub fn ffmpeg_version() -> Result<String> {
    first_version_line("ffmpeg")
}

/// Check if ffprobe is available and return its version
pub fn ffprobe_version() -> Result<String> {
    first_version_line("ffprobe")
}

/// Check if this ffmpeg build ships the HAP encoder
pub fn hap_encoder_available() -> bool {
    let output = Command::new("ffmpeg")
        .arg("-hide_banner")
        .arg("-encoders")
        .output();

    match output {
        Ok(out) if out.status.success() => {
            has_hap_encoder(&String::from_utf8_lossy(&out.stdout))
        }
        _ => false,
    }
}

/// Scan `ffmpeg -encoders` output for the HAP entry
pub fn has_hap_encoder(listing: &str) -> bool {
    listing
        .lines()
        .any(|line| line.split_whitespace().nth(1) == Some("hap"))
}
