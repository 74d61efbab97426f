// Block-compression encoder sink

use anyhow::{Context, Result};
use std::io::{Read, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, Stdio};
use std::thread::{self, JoinHandle};
use tracing::debug;

use super::core::{EncoderParams, Frame, build_hap_cmd, format_ffmpeg_cmd};

/// Receives decoded frames in order and writes the compressed container
pub trait BlockEncoder {
    /// Apply the resolved configuration; called once before `open`
    fn configure(&mut self, params: &EncoderParams);

    fn open(&mut self, path: &Path, width: u32, height: u32, fps: f64) -> Result<()>;

    fn append_frame(&mut self, frame: &Frame) -> Result<()>;

    /// Flush and close the output
    fn finish(&mut self) -> Result<()>;

    fn encoded_frames(&self) -> u64;
}

pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if !parent.exists() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create output directory: {}", parent.display())
            })?;
        }
    }
    Ok(())
}

/// Collect `pipe` to the end on a background thread
fn drain_stderr<R: Read + Send + 'static>(mut pipe: R) -> std::io::Result<JoinHandle<String>> {
    thread::Builder::new()
        .name("blockpress-encode-stderr".to_string())
        .spawn(move || {
            let mut bytes = Vec::new();
            let _ = pipe.read_to_end(&mut bytes);
            String::from_utf8_lossy(&bytes).into_owned()
        })
}

/// `BlockEncoder` that pipes RGBA frames into `ffmpeg -c:v hap`
pub struct FfmpegHapEncoder {
    params: EncoderParams,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stderr: Option<JoinHandle<String>>,
    width: u32,
    height: u32,
    encoded: u64,
}

impl FfmpegHapEncoder {
    pub fn new() -> Self {
        Self {
            params: EncoderParams::default(),
            child: None,
            stdin: None,
            stderr: None,
            width: 0,
            height: 0,
            encoded: 0,
        }
    }

    pub fn params(&self) -> &EncoderParams {
        &self.params
    }

    pub fn is_open(&self) -> bool {
        self.child.is_some()
    }
}

impl Default for FfmpegHapEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockEncoder for FfmpegHapEncoder {
    fn configure(&mut self, params: &EncoderParams) {
        self.params = *params;

        // HAP has no knobs for these; they only matter to native block encoders
        debug!(
            skip_blocks = params.enable_skip_blocks,
            solid_color_blocks = params.enable_solid_color_blocks,
            "block flags not supported by the HAP backend"
        );
    }

    fn open(&mut self, path: &Path, width: u32, height: u32, fps: f64) -> Result<()> {
        if self.child.is_some() {
            anyhow::bail!("encoder is already open");
        }
        if width == 0 || height == 0 {
            anyhow::bail!("frame dimensions must be non-zero ({}x{})", width, height);
        }
        if fps <= 0.0 {
            anyhow::bail!("frame rate must be positive ({})", fps);
        }

        ensure_parent_dir(path)?;

        let mut cmd = build_hap_cmd(path, width, height, fps, &self.params);
        debug!(command = %format_ffmpeg_cmd(&cmd), "starting encoder");

        cmd.stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .context("Failed to spawn ffmpeg. Is ffmpeg installed and in PATH?")?;
        let stdin = child.stdin.take().context("ffmpeg encoder has no stdin")?;
        let stderr = match child.stderr.take().map(drain_stderr).transpose() {
            Ok(handle) => handle,
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(e).context("Failed to start encoder stderr reader");
            }
        };

        self.child = Some(child);
        self.stdin = Some(stdin);
        self.stderr = stderr;
        self.width = width;
        self.height = height;
        self.encoded = 0;
        Ok(())
    }

    fn append_frame(&mut self, frame: &Frame) -> Result<()> {
        let stdin = self.stdin.as_mut().context("encoder is not open")?;

        if frame.width != self.width || frame.height != self.height || !frame.is_well_formed() {
            anyhow::bail!(
                "frame is {}x{} ({} bytes), encoder expects {}x{}",
                frame.width,
                frame.height,
                frame.data.len(),
                self.width,
                self.height
            );
        }

        stdin
            .write_all(&frame.data)
            .context("Failed to write frame to ffmpeg")?;
        self.encoded += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        // Closing stdin signals end-of-stream
        drop(self.stdin.take());

        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        let status = child.wait().context("Failed to wait for ffmpeg")?;
        let stderr = self
            .stderr
            .take()
            .and_then(|reader| reader.join().ok())
            .unwrap_or_default();
        if !status.success() {
            anyhow::bail!(
                "ffmpeg exited with status {}: {}",
                status,
                stderr.trim()
            );
        }

        debug!(frames = self.encoded, "encoder finished");
        Ok(())
    }

    fn encoded_frames(&self) -> u64 {
        self.encoded
    }
}

impl Drop for FfmpegHapEncoder {
    fn drop(&mut self) {
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            let _ = child.wait();
        }
        if let Some(reader) = self.stderr.take() {
            let _ = reader.join();
        }
    }
}
