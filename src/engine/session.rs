// Tick-driven transcode session: pulls frames from a polling decoder and
// feeds them to a block encoder

use serde::{Deserialize, Serialize};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, info_span, warn};
use uuid::Uuid;

use super::core::{
    DEFAULT_LOG_INTERVAL, EncoderParams, EndReason, Frame, Phase, ProgressTracker, SessionError,
    SessionSummary, Settings,
};
use super::decoder::FrameDecoder;
use super::encoder::BlockEncoder;

/// Ticks to wait on one decode request before reissuing it
pub const WAIT_TIMEOUT_TICKS: u32 = 100;

/// Reissues allowed per frame before the job is ended
pub const MAX_RETRIES: u32 = 3;

/// Stalls past this fraction of the reported total count as a normal end
pub const END_OF_STREAM_THRESHOLD: f64 = 0.98;

/// Bounds that keep a stalled decoder from spinning forever.
///
/// A request that never completes ends the job after exactly
/// `(max_retries + 1) * wait_timeout_ticks` waiting ticks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SchedulerLimits {
    pub wait_timeout_ticks: u32,
    pub max_retries: u32,
    pub end_of_stream_threshold: f64,
    pub progress_log_interval: u64,
}

impl SchedulerLimits {
    pub fn max_stall_ticks(&self) -> u64 {
        (self.max_retries as u64 + 1) * self.wait_timeout_ticks.max(1) as u64
    }
}

impl Default for SchedulerLimits {
    fn default() -> Self {
        Self {
            wait_timeout_ticks: WAIT_TIMEOUT_TICKS,
            max_retries: MAX_RETRIES,
            end_of_stream_threshold: END_OF_STREAM_THRESHOLD,
            progress_log_interval: DEFAULT_LOG_INTERVAL,
        }
    }
}

/// One transcode job. Owns its decoder and encoder exclusively.
///
/// Lifecycle: `Idle` → `begin()` → `Encoding` → (`tick()`…) → `Complete`,
/// or `Idle` → `begin()` → `Failed`. A session runs one job; create a new
/// one for the next.
pub struct TranscodeSession<D: FrameDecoder, E: BlockEncoder> {
    id: Uuid,
    decoder: D,
    encoder: E,
    limits: SchedulerLimits,
    settings: Option<Settings>,
    params: Option<EncoderParams>,
    phase: Phase,
    progress: ProgressTracker,
    waiting_for_frame: bool,
    wait_counter: u32,
    retry_count: u32,
    encoded_frames: u64,
    end_reason: Option<EndReason>,
    failure: Option<SessionError>,
    finalize_error: Option<String>,
    finished_at: Option<String>,
    span: tracing::Span,
}

impl<D: FrameDecoder, E: BlockEncoder> TranscodeSession<D, E> {
    pub fn new(decoder: D, encoder: E) -> Self {
        Self::with_limits(decoder, encoder, SchedulerLimits::default())
    }

    pub fn with_limits(decoder: D, encoder: E, limits: SchedulerLimits) -> Self {
        let id = Uuid::new_v4();
        Self {
            id,
            decoder,
            encoder,
            limits,
            settings: None,
            params: None,
            phase: Phase::Idle,
            progress: ProgressTracker::new(0, limits.progress_log_interval),
            waiting_for_frame: false,
            wait_counter: 0,
            retry_count: 0,
            encoded_frames: 0,
            end_reason: None,
            failure: None,
            finalize_error: None,
            finished_at: None,
            span: info_span!("session", id = %id),
        }
    }

    /// Open decoder and encoder and enter `Encoding`.
    ///
    /// Open failures and empty sources move the session to `Failed`; the
    /// encoder is never opened unless the source opened with frames.
    pub fn begin(&mut self, settings: Settings) -> Result<(), SessionError> {
        if self.phase != Phase::Idle {
            return Err(SessionError::AlreadyStarted { phase: self.phase });
        }

        let span = self.span.clone();
        let _enter = span.enter();

        let params = settings.resolve();
        info!(
            input = %settings.input.display(),
            output = %settings.output.display(),
            quality = %params.quality,
            partitions = params.partitions,
            effort = params.effort,
            threads = params.threads,
            "starting transcode"
        );
        self.params = Some(params);

        if let Err(e) = self.decoder.open(&settings.input) {
            let err = SessionError::SourceOpen {
                path: settings.input.clone(),
                reason: format!("{e:#}"),
            };
            self.settings = Some(settings);
            return Err(self.fail(err));
        }

        let total = self.decoder.frame_count();
        if total == 0 {
            self.decoder.close();
            let err = SessionError::EmptySource {
                path: settings.input.clone(),
            };
            self.settings = Some(settings);
            return Err(self.fail(err));
        }

        self.encoder.configure(&params);
        let (width, height, fps) = (
            self.decoder.width(),
            self.decoder.height(),
            self.decoder.frame_rate(),
        );
        if let Err(e) = self.encoder.open(&settings.output, width, height, fps) {
            self.decoder.close();
            let err = SessionError::EncoderOpen {
                path: settings.output.clone(),
                reason: format!("{e:#}"),
            };
            self.settings = Some(settings);
            return Err(self.fail(err));
        }

        info!(
            frames = total,
            width,
            height,
            fps,
            duration_s = self.decoder.duration(),
            "source opened"
        );

        self.progress = ProgressTracker::new(total, self.limits.progress_log_interval);
        self.waiting_for_frame = false;
        self.wait_counter = 0;
        self.retry_count = 0;
        self.settings = Some(settings);
        self.phase = Phase::Encoding;
        Ok(())
    }

    /// Advance the job by one step. Never blocks; a no-op unless `Encoding`.
    pub fn tick(&mut self) {
        if self.phase != Phase::Encoding {
            return;
        }

        let span = self.span.clone();
        let _enter = span.enter();

        if !self.waiting_for_frame {
            self.request_frame();
        } else {
            self.wait_counter += 1;
            if self.wait_counter >= self.limits.wait_timeout_ticks.max(1) {
                self.retry_count += 1;
                if self.retry_count > self.limits.max_retries {
                    self.give_up();
                    return;
                }

                debug!(
                    frame = self.progress.current(),
                    retry = self.retry_count,
                    "frame not ready, reissuing decode request"
                );
                self.decoder.seek_to_frame(self.progress.current());
                self.wait_counter = 0;
                return;
            }
        }

        self.decoder.update();
        if !self.decoder.is_frame_new() {
            return;
        }

        self.waiting_for_frame = false;
        self.retry_count = 0;

        let appended = match self.decoder.frame() {
            Some(frame) => self.encoder.append_frame(frame),
            None => Err(anyhow::anyhow!("decoder flagged a new frame without pixels")),
        };
        if let Err(e) = appended {
            warn!(
                frame = self.progress.current(),
                error = %format!("{e:#}"),
                "encoder rejected frame, output truncated"
            );
            self.finalize(EndReason::EncoderError);
            return;
        }

        if let Some(checkpoint) = self.progress.record_frame() {
            info!(
                frame = checkpoint.frame,
                total = checkpoint.total,
                "progress {:.1}%",
                checkpoint.pct
            );
        }

        if self.progress.is_finished() {
            self.finalize(EndReason::EndOfStream);
        }
    }

    /// Tick until the session leaves `Encoding`, one tick per `interval`.
    ///
    /// Every tick is paced, so the stall budget lasts at least
    /// `max_stall_ticks() * interval` of wall-clock time. A zero interval
    /// ticks back to back.
    pub fn run_paced(&mut self, interval: Duration) -> Phase {
        let mut deadline = Instant::now();
        while self.phase == Phase::Encoding {
            self.tick();
            if interval.is_zero() {
                continue;
            }

            deadline += interval;
            let now = Instant::now();
            if deadline > now {
                thread::sleep(deadline - now);
            } else {
                // Running behind; don't burst to catch up
                deadline = now;
            }
        }
        self.phase
    }

    /// End an `Encoding` session now, keeping the frames written so far
    pub fn cancel(&mut self) {
        if self.phase == Phase::Encoding {
            let span = self.span.clone();
            let _enter = span.enter();
            info!(frame = self.progress.current(), "transcode cancelled");
            self.finalize(EndReason::Cancelled);
        }
    }

    fn request_frame(&mut self) {
        let current = self.progress.current();
        if current == 0 {
            self.decoder.seek_to_frame(0);
        } else {
            self.decoder.next_frame();
        }
        self.waiting_for_frame = true;
        self.wait_counter = 0;
    }

    /// Retry budget exhausted: decide between "stream ended early" and
    /// "decode failed", then finish either way
    fn give_up(&mut self) {
        let current = self.progress.current();
        let total = self.progress.total();

        if self.progress.completion() > self.limits.end_of_stream_threshold {
            info!(
                frame = current,
                total,
                "decoder stopped near the reported end, treating as end of video"
            );
            self.finalize(EndReason::EarlyEnd);
        } else {
            warn!(
                frame = current,
                total,
                retries = self.limits.max_retries,
                "decode failure, output truncated"
            );
            self.finalize(EndReason::DecodeStall);
        }
    }

    fn finalize(&mut self, reason: EndReason) {
        if self.phase != Phase::Encoding {
            return;
        }

        self.waiting_for_frame = false;
        if let Err(e) = self.encoder.finish() {
            let msg = format!("{e:#}");
            warn!(error = %msg, "encoder failed to finalize output");
            self.finalize_error = Some(msg);
        }
        self.decoder.close();

        self.encoded_frames = self.encoder.encoded_frames();
        self.end_reason = Some(reason);
        self.finished_at = Some(chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string());
        self.phase = Phase::Complete;

        info!(
            encoded = self.encoded_frames,
            total = self.progress.total(),
            reason = %reason,
            "transcode complete"
        );
    }

    fn fail(&mut self, err: SessionError) -> SessionError {
        warn!(error = %err, "transcode failed to start");
        self.phase = Phase::Failed;
        self.failure = Some(err.clone());
        err
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn status_label(&self) -> &'static str {
        self.phase.label()
    }

    pub fn has_failed(&self) -> bool {
        self.phase == Phase::Failed
    }

    pub fn is_complete(&self) -> bool {
        self.phase == Phase::Complete
    }

    pub fn is_finished(&self) -> bool {
        self.phase.is_terminal()
    }

    pub fn current_frame(&self) -> u64 {
        self.progress.current()
    }

    pub fn total_frames(&self) -> u64 {
        self.progress.total()
    }

    /// Completion ratio in 0.0..=1.0 as of the last consumed frame
    pub fn progress(&self) -> f64 {
        self.progress.ratio()
    }

    pub fn is_waiting(&self) -> bool {
        self.waiting_for_frame
    }

    pub fn wait_counter(&self) -> u32 {
        self.wait_counter
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Frames written so far; fixed at the encoder's final count once the
    /// job completes
    pub fn encoded_frame_count(&self) -> u64 {
        if self.phase == Phase::Encoding {
            self.encoder.encoded_frames()
        } else {
            self.encoded_frames
        }
    }

    pub fn end_reason(&self) -> Option<EndReason> {
        self.end_reason
    }

    pub fn failure(&self) -> Option<&SessionError> {
        self.failure.as_ref()
    }

    pub fn finalize_error(&self) -> Option<&str> {
        self.finalize_error.as_deref()
    }

    /// Latest decoded frame for live preview, only while encoding
    pub fn latest_frame(&self) -> Option<&Frame> {
        if self.phase == Phase::Encoding {
            self.decoder.frame()
        } else {
            None
        }
    }

    pub fn settings(&self) -> Option<&Settings> {
        self.settings.as_ref()
    }

    pub fn params(&self) -> Option<&EncoderParams> {
        self.params.as_ref()
    }

    pub fn limits(&self) -> &SchedulerLimits {
        &self.limits
    }

    pub fn decoder(&self) -> &D {
        &self.decoder
    }

    pub fn encoder(&self) -> &E {
        &self.encoder
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id,
            input: self.settings.as_ref().map(|s| s.input.clone()),
            output: self.settings.as_ref().map(|s| s.output.clone()),
            phase: self.phase,
            end_reason: self.end_reason,
            quality: self.params.map(|p| p.quality),
            partitions: self.params.map(|p| p.partitions),
            effort: self.params.map(|p| p.effort),
            total_frames: self.progress.total(),
            current_frame: self.progress.current(),
            encoded_frames: self.encoded_frame_count(),
            progress: self.progress.ratio(),
            error: self
                .failure
                .as_ref()
                .map(ToString::to_string)
                .or_else(|| self.finalize_error.clone()),
            finished_at: self.finished_at.clone(),
        }
    }
}

impl<D: FrameDecoder, E: BlockEncoder> Drop for TranscodeSession<D, E> {
    fn drop(&mut self) {
        // Abandoned mid-stream: flush what was written and release handles
        if self.phase == Phase::Encoding {
            let span = self.span.clone();
            let _enter = span.enter();
            debug!("session dropped while encoding");
            self.finalize(EndReason::Cancelled);
        }
    }
}
