// Frame pull scheduling: request order, timeouts, retries and the
// end-of-stream heuristic

use crate::common::{
    DecoderCall, RecordingEncoder, ScriptedDecoder, run_to_end, run_until_frame, test_settings,
};
use blockpress::engine::{
    EndReason, MAX_RETRIES, Phase, SchedulerLimits, TranscodeSession, WAIT_TIMEOUT_TICKS,
};

const STALL_BOUND: u64 = (MAX_RETRIES as u64 + 1) * WAIT_TIMEOUT_TICKS as u64;

fn started(decoder: ScriptedDecoder) -> TranscodeSession<ScriptedDecoder, RecordingEncoder> {
    let mut session = TranscodeSession::new(decoder, RecordingEncoder::new());
    session.begin(test_settings()).expect("begin should succeed");
    session
}

/// Drive a session to `stall_at` consumed frames, issue the next request,
/// then count waiting ticks until it finishes
fn ticks_after_stall(
    session: &mut TranscodeSession<ScriptedDecoder, RecordingEncoder>,
    stall_at: u64,
) -> u64 {
    run_until_frame(session, stall_at, 100_000);
    assert_eq!(session.current_frame(), stall_at);
    assert!(!session.is_waiting());

    // Issue tick
    session.tick();
    assert!(session.is_waiting());

    let mut waiting_ticks = 0;
    while !session.is_finished() {
        session.tick();
        waiting_ticks += 1;
        assert!(waiting_ticks <= STALL_BOUND, "stall exceeded its bound");
    }
    waiting_ticks
}

#[test]
fn test_frames_reach_encoder_in_order_once() {
    let decoder = ScriptedDecoder::new(25).with_latencies(vec![2; 25]);
    let mut session = started(decoder);
    run_to_end(&mut session, 10_000);

    let expected: Vec<u64> = (0..25).collect();
    assert_eq!(session.encoder().frames, expected);
}

#[test]
fn test_first_request_rewinds_then_advances() {
    let mut session = started(ScriptedDecoder::new(3));
    run_to_end(&mut session, 100);

    assert_eq!(
        session.decoder().calls,
        vec![
            DecoderCall::Open("/tmp/blockpress-test/input.mp4".into()),
            DecoderCall::Seek(0),
            DecoderCall::Next,
            DecoderCall::Next,
            DecoderCall::Close,
        ]
    );
}

#[test]
fn test_waiting_state_between_request_and_frame() {
    let mut session = started(ScriptedDecoder::new(2).with_latencies(vec![3, 0]));

    session.tick();
    assert!(session.is_waiting());
    assert_eq!(session.wait_counter(), 0);

    session.tick();
    session.tick();
    assert!(session.is_waiting());
    assert_eq!(session.wait_counter(), 2);
    assert_eq!(session.current_frame(), 0);

    session.tick();
    assert!(!session.is_waiting());
    assert_eq!(session.current_frame(), 1);
}

#[test]
fn test_latency_costs_one_tick_per_update() {
    let mut session = started(ScriptedDecoder::new(4).with_latencies(vec![5; 4]));
    let ticks = run_to_end(&mut session, 10_000);
    assert_eq!(ticks, 4 * 6);
    assert_eq!(session.end_reason(), Some(EndReason::EndOfStream));
}

#[test]
fn test_slow_frame_recovers_after_retry() {
    // Frame 1 needs more updates than one timeout window allows
    let mut session = started(ScriptedDecoder::new(3).with_latencies(vec![0, 150, 0]));

    let mut saw_retry = false;
    while session.current_frame() < 2 && !session.is_finished() {
        session.tick();
        saw_retry |= session.retry_count() > 0;
    }

    assert!(saw_retry, "frame 1 should have needed a reissue");
    assert_eq!(session.retry_count(), 0, "retry count resets on consume");
    assert_eq!(session.decoder().seeks(), vec![0, 1]);

    run_to_end(&mut session, 1_000);
    assert_eq!(session.end_reason(), Some(EndReason::EndOfStream));
    assert_eq!(session.encoded_frame_count(), 3);
}

#[test]
fn test_retry_count_zero_after_every_consume() {
    let latencies = vec![0, 120, 3, 250, 0, 101, 99];
    let mut session = started(ScriptedDecoder::new(7).with_latencies(latencies));

    while !session.is_finished() {
        let before = session.current_frame();
        session.tick();
        if session.current_frame() > before {
            assert_eq!(session.retry_count(), 0);
        }
    }
    assert_eq!(session.encoded_frame_count(), 7);
}

#[test]
fn test_stall_mid_stream_truncates() {
    let mut session = started(ScriptedDecoder::new(100).stalling_after(50));

    let waiting_ticks = ticks_after_stall(&mut session, 50);

    assert_eq!(waiting_ticks, STALL_BOUND);
    assert_eq!(waiting_ticks, 400);
    assert_eq!(session.phase(), Phase::Complete);
    assert!(!session.has_failed(), "stalls never surface as failures");
    assert_eq!(session.end_reason(), Some(EndReason::DecodeStall));
    assert_eq!(session.encoded_frame_count(), 50);
    assert_eq!(session.current_frame(), 50);
    assert_eq!(session.progress(), 0.5);
    assert!(session.summary().is_truncated());

    // One reissue per retry, all for the stalled frame
    assert_eq!(
        session.decoder().seeks(),
        vec![0, 50, 50, 50],
        "initial rewind plus MAX_RETRIES reissues"
    );
    assert_eq!(session.encoder().finish_calls, 1);
}

#[test]
fn test_stall_near_end_is_graceful() {
    let mut session = started(ScriptedDecoder::new(100).stalling_after(99));

    let waiting_ticks = ticks_after_stall(&mut session, 99);

    assert_eq!(waiting_ticks, STALL_BOUND);
    assert_eq!(session.phase(), Phase::Complete);
    assert_eq!(session.end_reason(), Some(EndReason::EarlyEnd));
    assert_eq!(session.encoded_frame_count(), 99);
    assert_eq!(session.progress(), 0.99);
}

#[test]
fn test_stall_exactly_at_threshold_is_a_failure() {
    // 98/100 is not past 0.98
    let mut session = started(ScriptedDecoder::new(100).stalling_after(98));
    ticks_after_stall(&mut session, 98);
    assert_eq!(session.end_reason(), Some(EndReason::DecodeStall));
}

#[test]
fn test_first_frame_never_arrives() {
    let mut session = started(ScriptedDecoder::new(30).stalling_after(0));

    let ticks = run_to_end(&mut session, 10_000);

    // Issue tick plus the full stall budget
    assert_eq!(ticks, STALL_BOUND + 1);
    assert_eq!(session.phase(), Phase::Complete);
    assert_eq!(session.end_reason(), Some(EndReason::DecodeStall));
    assert_eq!(session.encoded_frame_count(), 0);
    assert_eq!(session.progress(), 0.0);
    assert_eq!(session.decoder().seeks(), vec![0, 0, 0, 0]);
}

#[test]
fn test_custom_limits() {
    let limits = SchedulerLimits {
        wait_timeout_ticks: 10,
        max_retries: 0,
        end_of_stream_threshold: 0.4,
        progress_log_interval: 5,
    };
    assert_eq!(limits.max_stall_ticks(), 10);

    let mut session = TranscodeSession::with_limits(
        ScriptedDecoder::new(100).stalling_after(50),
        RecordingEncoder::new(),
        limits,
    );
    session.begin(test_settings()).unwrap();

    let waiting_ticks = ticks_after_stall(&mut session, 50);
    assert_eq!(waiting_ticks, 10);
    assert_eq!(
        session.end_reason(),
        Some(EndReason::EarlyEnd),
        "0.5 is past a 0.4 threshold"
    );
}

#[test]
fn test_metadata_undercount_stops_at_reported_total() {
    let mut decoder = ScriptedDecoder::new(5);
    decoder.deliverable = 8;
    let mut session = started(decoder);

    run_to_end(&mut session, 1_000);

    assert_eq!(session.end_reason(), Some(EndReason::EndOfStream));
    assert_eq!(session.encoded_frame_count(), 5);
    assert_eq!(session.decoder().delivered, 5);
}

#[test]
fn test_encoder_error_ends_job_without_failing() {
    let mut session = TranscodeSession::new(
        ScriptedDecoder::new(10),
        RecordingEncoder::failing_after(3),
    );
    session.begin(test_settings()).unwrap();

    run_to_end(&mut session, 1_000);

    assert_eq!(session.phase(), Phase::Complete);
    assert!(!session.has_failed());
    assert_eq!(session.end_reason(), Some(EndReason::EncoderError));
    assert_eq!(session.encoded_frame_count(), 3);
    assert_eq!(session.current_frame(), 3);
    assert_eq!(session.encoder().finish_calls, 1);
}

#[test]
fn test_progress_never_decreases() {
    let latencies = (0..40).map(|i| (i * 37 % 11) as u32).collect();
    let mut session = started(ScriptedDecoder::new(40).with_latencies(latencies));

    let mut last = session.progress();
    while !session.is_finished() {
        session.tick();
        let now = session.progress();
        assert!(now >= last, "progress went from {} to {}", last, now);
        last = now;
    }
    assert_eq!(last, 1.0);
}
