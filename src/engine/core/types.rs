use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

use super::settings::Quality;

/// Coarse lifecycle state of a transcode session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Idle,
    Encoding,
    Complete,
    Failed,
}

impl Phase {
    pub fn label(self) -> &'static str {
        match self {
            Phase::Idle => "Idle",
            Phase::Encoding => "Encoding",
            Phase::Complete => "Complete",
            Phase::Failed => "Failed",
        }
    }

    /// No transition leaves a terminal phase
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Complete | Phase::Failed)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Why a session reached `Phase::Complete`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// Every reported frame was encoded
    EndOfStream,
    /// Decoder stopped delivering close to the reported end (metadata was off)
    EarlyEnd,
    /// Decoder stalled well before the end; output is truncated
    DecodeStall,
    /// Encoder rejected a frame; output holds what was written before
    EncoderError,
    /// Host cancelled or dropped the session mid-stream
    Cancelled,
}

impl EndReason {
    pub fn description(self) -> &'static str {
        match self {
            EndReason::EndOfStream => "reached end of video",
            EndReason::EarlyEnd => "reached end of video (decoder ended early)",
            EndReason::DecodeStall => "decode failure, output truncated",
            EndReason::EncoderError => "encoder error, output truncated",
            EndReason::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// One decoded RGBA8 frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl Frame {
    pub const BYTES_PER_PIXEL: usize = 4;

    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            data,
        }
    }

    pub fn blank(width: u32, height: u32) -> Self {
        Self::new(width, height, vec![0; Self::byte_len(width, height)])
    }

    pub fn byte_len(width: u32, height: u32) -> usize {
        width as usize * height as usize * Self::BYTES_PER_PIXEL
    }

    pub fn is_well_formed(&self) -> bool {
        self.data.len() == Self::byte_len(self.width, self.height)
    }
}

/// Final (or in-flight) report for one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: Uuid,
    pub input: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub phase: Phase,
    pub end_reason: Option<EndReason>,
    pub quality: Option<Quality>,
    pub partitions: Option<u32>,
    pub effort: Option<u32>,
    pub total_frames: u64,
    pub current_frame: u64,
    pub encoded_frames: u64,
    pub progress: f64,
    pub error: Option<String>,
    pub finished_at: Option<String>,
}

impl SessionSummary {
    /// Fewer frames written than the source reported
    pub fn is_truncated(&self) -> bool {
        self.phase == Phase::Complete && self.encoded_frames < self.total_frames
    }
}
