// Transcoding engine - independent of the CLI

pub mod core;
pub mod decoder;
pub mod encoder;
pub mod probe;
pub mod session;

pub use self::core::*;
pub use decoder::{FfmpegDecoder, FrameDecoder};
pub use encoder::{BlockEncoder, FfmpegHapEncoder};
pub use session::{
    END_OF_STREAM_THRESHOLD, MAX_RETRIES, SchedulerLimits, TranscodeSession, WAIT_TIMEOUT_TICKS,
};
