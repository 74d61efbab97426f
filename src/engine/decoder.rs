// Poll-based video decoding

use anyhow::{Context, Result};
use std::io::{BufReader, ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Stdio};
use std::sync::mpsc::{self, Receiver, SyncSender, TryRecvError};
use std::thread::{self, JoinHandle};
use tracing::debug;

use super::core::{Frame, build_decode_cmd};
use super::probe::{InputInfo, probe_input_info};

/// A decoder that exposes frame readiness by polling.
///
/// Requests (`seek_to_frame`, `next_frame`) return immediately. The host
/// calls `update` once per tick and checks `is_frame_new` afterwards.
pub trait FrameDecoder {
    fn open(&mut self, path: &Path) -> Result<()>;

    /// Reported frame total (may be inaccurate)
    fn frame_count(&self) -> u64;

    /// Reported duration in seconds
    fn duration(&self) -> f64;

    fn frame_rate(&self) -> f64;

    fn width(&self) -> u32;

    fn height(&self) -> u32;

    /// Request the frame at `index`
    fn seek_to_frame(&mut self, index: u64);

    /// Request the frame after the last delivered one
    fn next_frame(&mut self);

    /// Advance internal decode state; never blocks
    fn update(&mut self);

    /// True only on the update that delivered a frame
    fn is_frame_new(&self) -> bool;

    /// Most recently delivered frame
    fn frame(&self) -> Option<&Frame>;

    fn close(&mut self);
}

/// Number of decoded frames buffered ahead of the consumer
const DEFAULT_PREFETCH: usize = 4;

/// Running `ffmpeg` child plus the thread reading its stdout
struct DecodeStream {
    child: Child,
    rx: Option<Receiver<Frame>>,
    reader: Option<JoinHandle<()>>,
}

impl DecodeStream {
    fn spawn(path: &Path, start_frame: u64, info: &InputInfo, prefetch: usize) -> Result<Self> {
        let mut cmd = build_decode_cmd(path, start_frame, info.fps);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());

        let mut child = cmd.spawn().context("Failed to spawn ffmpeg decoder")?;
        let stdout = child
            .stdout
            .take()
            .context("ffmpeg decoder has no stdout")?;

        let (tx, rx) = mpsc::sync_channel(prefetch.max(1));
        let (width, height) = (info.width, info.height);
        let reader = thread::Builder::new()
            .name("blockpress-decode".to_string())
            .spawn(move || read_frames(stdout, width, height, tx));

        let reader = match reader {
            Ok(handle) => handle,
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(e).context("Failed to start decoder reader thread");
            }
        };

        Ok(Self {
            child,
            rx: Some(rx),
            reader: Some(reader),
        })
    }

    fn try_recv(&self) -> Result<Frame, TryRecvError> {
        match &self.rx {
            Some(rx) => rx.try_recv(),
            None => Err(TryRecvError::Disconnected),
        }
    }
}

impl Drop for DecodeStream {
    fn drop(&mut self) {
        // Receiver first so a reader blocked on a full channel wakes up
        drop(self.rx.take());
        let _ = self.child.kill();
        let _ = self.child.wait();
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
    }
}

fn read_frames(stdout: ChildStdout, width: u32, height: u32, tx: SyncSender<Frame>) {
    let len = Frame::byte_len(width, height);
    let mut reader = BufReader::with_capacity(len.max(8192), stdout);
    let mut delivered = 0u64;

    loop {
        let mut data = vec![0u8; len];
        match reader.read_exact(&mut data) {
            Ok(()) => {
                if tx.send(Frame::new(width, height, data)).is_err() {
                    break;
                }
                delivered += 1;
            }
            Err(e) => {
                if e.kind() != ErrorKind::UnexpectedEof {
                    debug!(error = %e, "decoder pipe read failed");
                }
                break;
            }
        }
    }

    debug!(frames = delivered, "decoder stream ended");
}

/// `FrameDecoder` backed by an `ffmpeg` child emitting raw RGBA
pub struct FfmpegDecoder {
    path: Option<PathBuf>,
    info: Option<InputInfo>,
    stream: Option<DecodeStream>,
    prefetch: usize,
    /// Index of the next frame the stream will yield
    position: u64,
    pending: bool,
    frame_new: bool,
    exhausted: bool,
    current: Option<Frame>,
}

impl FfmpegDecoder {
    pub fn new() -> Self {
        Self::with_prefetch(DEFAULT_PREFETCH)
    }

    pub fn with_prefetch(prefetch: usize) -> Self {
        Self {
            path: None,
            info: None,
            stream: None,
            prefetch,
            position: 0,
            pending: false,
            frame_new: false,
            exhausted: false,
            current: None,
        }
    }

    fn restart_at(&mut self, index: u64) {
        self.stream = None;
        self.exhausted = false;
        self.position = index;

        let (Some(path), Some(info)) = (self.path.as_deref(), self.info.as_ref()) else {
            return;
        };

        match DecodeStream::spawn(path, index, info, self.prefetch) {
            Ok(stream) => self.stream = Some(stream),
            // Leave the request pending; the session's retry budget decides
            Err(e) => debug!(error = %format!("{e:#}"), frame = index, "decoder restart failed"),
        }
    }
}

impl Default for FfmpegDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder for FfmpegDecoder {
    fn open(&mut self, path: &Path) -> Result<()> {
        self.close();

        if !path.exists() {
            anyhow::bail!("input file does not exist");
        }

        let info = probe_input_info(path)?;
        if info.width == 0 || info.height == 0 {
            anyhow::bail!("video stream has no dimensions");
        }

        let stream = DecodeStream::spawn(path, 0, &info, self.prefetch)?;

        debug!(
            path = %path.display(),
            width = info.width,
            height = info.height,
            fps = info.fps,
            frames = info.estimated_frames(),
            "decoder opened"
        );

        self.path = Some(path.to_path_buf());
        self.info = Some(info);
        self.stream = Some(stream);
        self.position = 0;
        Ok(())
    }

    fn frame_count(&self) -> u64 {
        self.info.as_ref().map_or(0, InputInfo::estimated_frames)
    }

    fn duration(&self) -> f64 {
        self.info
            .as_ref()
            .and_then(|i| i.duration)
            .unwrap_or_else(|| {
                let fps = self.frame_rate();
                if fps > 0.0 {
                    self.frame_count() as f64 / fps
                } else {
                    0.0
                }
            })
    }

    fn frame_rate(&self) -> f64 {
        self.info.as_ref().map_or(0.0, |i| i.fps)
    }

    fn width(&self) -> u32 {
        self.info.as_ref().map_or(0, |i| i.width)
    }

    fn height(&self) -> u32 {
        self.info.as_ref().map_or(0, |i| i.height)
    }

    fn seek_to_frame(&mut self, index: u64) {
        if self.stream.is_none() || self.position != index {
            self.restart_at(index);
        }
        self.pending = true;
    }

    fn next_frame(&mut self) {
        self.pending = true;
    }

    fn update(&mut self) {
        self.frame_new = false;
        if !self.pending {
            return;
        }
        let Some(stream) = &self.stream else {
            return;
        };

        match stream.try_recv() {
            Ok(frame) => {
                self.current = Some(frame);
                self.position += 1;
                self.pending = false;
                self.frame_new = true;
            }
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => {
                if !self.exhausted {
                    debug!(frame = self.position, "decoder has no more frames");
                    self.exhausted = true;
                }
            }
        }
    }

    fn is_frame_new(&self) -> bool {
        self.frame_new
    }

    fn frame(&self) -> Option<&Frame> {
        self.current.as_ref()
    }

    fn close(&mut self) {
        self.stream = None;
        self.pending = false;
        self.frame_new = false;
        self.exhausted = false;
        self.current = None;
    }
}
