use super::settings::{EncoderParams, MAX_PARTITIONS, Quality};
use std::path::Path;
use std::process::Command;

/// Seconds offset for a frame index at the given rate
fn frame_to_seconds(frame: u64, fps: f64) -> f64 {
    if fps > 0.0 { frame as f64 / fps } else { 0.0 }
}

/// Build the ffmpeg command that decodes `input` to raw RGBA on stdout,
/// starting at `start_frame`
pub fn build_decode_cmd(input: &Path, start_frame: u64, fps: f64) -> Command {
    let mut cmd = Command::new("ffmpeg");
    cmd.arg("-hide_banner").arg("-loglevel").arg("error").arg("-nostdin");

    if start_frame > 0 {
        // Input seeking is frame-accurate for decoded output
        cmd.arg("-ss")
            .arg(format!("{:.6}", frame_to_seconds(start_frame, fps)));
    }

    // Frames are sliced at the probed coded size; rotation metadata must not
    // transpose them
    cmd.arg("-noautorotate")
        .arg("-i")
        .arg(input)
        .arg("-map")
        .arg("0:v:0")
        .arg("-an")
        .arg("-f")
        .arg("rawvideo")
        .arg("-pix_fmt")
        .arg("rgba")
        .arg("-");

    cmd
}

/// HAP texture format for the resolved parameters
pub fn hap_format(params: &EncoderParams) -> &'static str {
    if params.quality == Quality::High || params.effort >= 2 {
        "hap_q"
    } else {
        "hap"
    }
}

/// HAP chunk count (parallel-decode partitions), always within 1..=64
pub fn hap_chunks(params: &EncoderParams) -> u32 {
    params.partitions.clamp(1, MAX_PARTITIONS)
}

/// Output dimensions after optional quarter-resolution compression.
///
/// Block formats need multiples of 4, so quarter-res sizes are rounded down
/// to the nearest block (never below one block).
pub fn output_dimensions(width: u32, height: u32, params: &EncoderParams) -> (u32, u32) {
    if params.enable_quarter_resolution {
        let half = |v: u32| ((v / 2) / 4 * 4).max(4);
        (half(width), half(height))
    } else {
        (width, height)
    }
}

/// Build the ffmpeg command that reads raw RGBA frames on stdin and writes
/// a HAP-compressed container to `output`
pub fn build_hap_cmd(
    output: &Path,
    width: u32,
    height: u32,
    fps: f64,
    params: &EncoderParams,
) -> Command {
    let mut cmd = Command::new("ffmpeg");
    cmd.arg("-hide_banner")
        .arg("-loglevel")
        .arg("error")
        .arg("-y")
        .arg("-f")
        .arg("rawvideo")
        .arg("-pix_fmt")
        .arg("rgba")
        .arg("-s")
        .arg(format!("{}x{}", width, height))
        .arg("-r")
        .arg(format!("{}", fps))
        .arg("-i")
        .arg("-");

    let (out_w, out_h) = output_dimensions(width, height, params);
    if (out_w, out_h) != (width, height) {
        cmd.arg("-vf").arg(format!("scale={}:{}", out_w, out_h));
    }

    cmd.arg("-c:v")
        .arg("hap")
        .arg("-format")
        .arg(hap_format(params))
        .arg("-chunks")
        .arg(hap_chunks(params).to_string())
        .arg("-compressor")
        .arg(if params.effort == 0 { "none" } else { "snappy" })
        .arg("-threads")
        .arg(params.threads.to_string());

    if params.force_all_key_frames {
        cmd.arg("-g").arg("1");
    }

    cmd.arg(output);
    cmd
}

/// Render a command as a copy-pasteable shell line
pub fn format_ffmpeg_cmd(cmd: &Command) -> String {
    let quote = |s: &str| {
        if s.is_empty() || s.contains(char::is_whitespace) || s.contains('\'') {
            format!("'{}'", s.replace('\'', r"'\''"))
        } else {
            s.to_string()
        }
    };

    std::iter::once(cmd.get_program())
        .chain(cmd.get_args())
        .map(|a| quote(&a.to_string_lossy()))
        .collect::<Vec<_>>()
        .join(" ")
}
