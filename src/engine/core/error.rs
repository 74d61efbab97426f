use std::path::PathBuf;
use thiserror::Error;

use super::types::Phase;

/// Start-up failures returned by `TranscodeSession::begin`.
///
/// Mid-stream problems never surface here; they end the session early and
/// are reported through `EndReason`.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SessionError {
    #[error("failed to open source '{}': {reason}", path.display())]
    SourceOpen { path: PathBuf, reason: String },

    #[error("source '{}' reports no frames", path.display())]
    EmptySource { path: PathBuf },

    #[error("failed to open encoder output '{}': {reason}", path.display())]
    EncoderOpen { path: PathBuf, reason: String },

    #[error("session already started (phase: {phase})")]
    AlreadyStarted { phase: Phase },
}

/// Invalid user-facing settings
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("unknown quality '{0}' (expected fast, balanced, high, 0, 1 or 2)")]
    UnknownQuality(String),

    #[error("{field} override {value} is invalid (use -1 for the preset value)")]
    InvalidOverride { field: &'static str, value: i64 },

    #[error("{field} value {value} out of range (max {max})")]
    OutOfRange {
        field: &'static str,
        value: i64,
        max: u32,
    },
}
