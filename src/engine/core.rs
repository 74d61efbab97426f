mod error;
mod ffmpeg_cmd;
mod ffmpeg_info;
mod progress;
mod settings;
mod types;

pub use error::{SessionError, SettingsError};
pub use ffmpeg_cmd::{
    build_decode_cmd, build_hap_cmd, format_ffmpeg_cmd, hap_chunks, hap_format,
    output_dimensions,
};
pub use ffmpeg_info::{ffmpeg_version, ffprobe_version, hap_encoder_available, has_hap_encoder};
pub use progress::{Checkpoint, DEFAULT_LOG_INTERVAL, ProgressTracker};
pub use settings::{
    EncoderParams, MAX_EFFORT, MAX_PARTITIONS, Preset, Quality, Settings, UNSET_OVERRIDE,
    derive_output_path, parse_override, resolve_preset,
};
pub use types::{EndReason, Frame, Phase, SessionSummary};
