// Phase transitions, start-up failures and finalization

use crate::common::{
    DecoderCall, RecordingEncoder, ScriptedDecoder, run_to_end, test_settings,
};
use blockpress::engine::{EndReason, Phase, SessionError, TranscodeSession};
use std::cell::Cell;
use std::path::PathBuf;
use std::rc::Rc;

#[test]
fn test_new_session_is_idle() {
    let session = TranscodeSession::new(ScriptedDecoder::new(10), RecordingEncoder::new());
    assert_eq!(session.phase(), Phase::Idle);
    assert_eq!(session.status_label(), "Idle");
    assert_eq!(session.progress(), 0.0);
    assert!(!session.has_failed());
    assert!(session.latest_frame().is_none());
}

#[test]
fn test_tick_before_begin_is_noop() {
    let mut session = TranscodeSession::new(ScriptedDecoder::new(10), RecordingEncoder::new());
    for _ in 0..10 {
        session.tick();
    }
    assert_eq!(session.phase(), Phase::Idle);
    assert!(session.decoder().calls.is_empty());
    assert_eq!(session.decoder().updates, 0);
}

#[test]
fn test_begin_enters_encoding() {
    let mut session = TranscodeSession::new(ScriptedDecoder::new(10), RecordingEncoder::new());
    session.begin(test_settings()).expect("begin should succeed");

    assert_eq!(session.phase(), Phase::Encoding);
    assert_eq!(session.total_frames(), 10);
    assert_eq!(session.current_frame(), 0);

    let encoder = session.encoder();
    assert_eq!(encoder.configured.len(), 1, "configure runs exactly once");
    assert_eq!(
        encoder.configured_before_open,
        Some(1),
        "configure must precede open"
    );
    let (path, width, height, fps) = &encoder.open_calls[0];
    assert_eq!(path, &PathBuf::from("/tmp/blockpress-test/output.mov"));
    assert_eq!((*width, *height, *fps), (2, 2, 25.0));
}

#[test]
fn test_source_open_failure() {
    let mut session = TranscodeSession::new(
        ScriptedDecoder::new(10).failing_open(),
        RecordingEncoder::new(),
    );

    let err = session.begin(test_settings()).unwrap_err();
    assert!(matches!(err, SessionError::SourceOpen { .. }));
    assert_eq!(session.phase(), Phase::Failed);
    assert!(session.has_failed());
    assert_eq!(session.failure(), Some(&err));

    let encoder = session.encoder();
    assert!(encoder.open_calls.is_empty(), "encoder must never be opened");
    assert!(encoder.configured.is_empty());
}

#[test]
fn test_empty_source_failure() {
    let mut session = TranscodeSession::new(ScriptedDecoder::new(0), RecordingEncoder::new());

    let err = session.begin(test_settings()).unwrap_err();
    assert!(matches!(err, SessionError::EmptySource { .. }));
    assert_eq!(session.phase(), Phase::Failed);
    assert!(session.encoder().open_calls.is_empty());
    assert_eq!(session.decoder().close_count(), 1);
}

#[test]
fn test_encoder_open_failure() {
    let mut session = TranscodeSession::new(
        ScriptedDecoder::new(10),
        RecordingEncoder::failing_open(),
    );

    let err = session.begin(test_settings()).unwrap_err();
    assert!(matches!(err, SessionError::EncoderOpen { .. }));
    assert!(err.to_string().contains("scripted encoder open failure"));
    assert_eq!(session.phase(), Phase::Failed);
    assert_eq!(session.decoder().close_count(), 1);

    // Failed is terminal; ticks do nothing
    session.tick();
    assert_eq!(session.phase(), Phase::Failed);
    assert_eq!(session.decoder().updates, 0);
}

#[test]
fn test_full_run_completes() {
    let mut session = TranscodeSession::new(ScriptedDecoder::new(10), RecordingEncoder::new());
    session.begin(test_settings()).unwrap();

    let ticks = run_to_end(&mut session, 10_000);

    assert_eq!(ticks, 10, "immediately-ready frames take one tick each");
    assert_eq!(session.phase(), Phase::Complete);
    assert_eq!(session.status_label(), "Complete");
    assert_eq!(session.end_reason(), Some(EndReason::EndOfStream));
    assert_eq!(session.current_frame(), 10);
    assert_eq!(session.encoded_frame_count(), 10);
    assert_eq!(session.progress(), 1.0);
    assert!(!session.has_failed());

    assert_eq!(session.encoder().finish_calls, 1);
    assert_eq!(session.decoder().close_count(), 1);
    assert!(!session.decoder().is_open);
}

#[test]
fn test_consuming_ticks_match_encoded_count() {
    let decoder = ScriptedDecoder::new(12).with_latencies(vec![0, 3, 0, 7, 1, 0, 2, 0, 0, 5, 0, 4]);
    let mut session = TranscodeSession::new(decoder, RecordingEncoder::new());
    session.begin(test_settings()).unwrap();

    let mut consuming_ticks = 0;
    while !session.is_finished() {
        let before = session.current_frame();
        session.tick();
        if session.current_frame() > before {
            consuming_ticks += 1;
        }
    }

    assert_eq!(session.end_reason(), Some(EndReason::EndOfStream));
    assert_eq!(session.encoded_frame_count(), consuming_ticks);
    assert_eq!(consuming_ticks, 12);
}

#[test]
fn test_begin_twice_is_rejected() {
    let mut session = TranscodeSession::new(ScriptedDecoder::new(3), RecordingEncoder::new());
    session.begin(test_settings()).unwrap();
    run_to_end(&mut session, 100);
    assert_eq!(session.phase(), Phase::Complete);

    let err = session.begin(test_settings()).unwrap_err();
    assert_eq!(
        err,
        SessionError::AlreadyStarted {
            phase: Phase::Complete
        }
    );

    // No handles reopened, counters untouched
    assert_eq!(session.phase(), Phase::Complete);
    assert_eq!(session.encoded_frame_count(), 3);
    assert_eq!(session.encoder().open_calls.len(), 1);
    let opens = session
        .decoder()
        .calls
        .iter()
        .filter(|c| matches!(c, DecoderCall::Open(_)))
        .count();
    assert_eq!(opens, 1);
}

#[test]
fn test_begin_after_failure_is_rejected() {
    let mut session = TranscodeSession::new(
        ScriptedDecoder::new(5).failing_open(),
        RecordingEncoder::new(),
    );
    assert!(session.begin(test_settings()).is_err());
    let err = session.begin(test_settings()).unwrap_err();
    assert!(matches!(
        err,
        SessionError::AlreadyStarted {
            phase: Phase::Failed
        }
    ));
}

#[test]
fn test_latest_frame_only_while_encoding() {
    let mut session = TranscodeSession::new(ScriptedDecoder::new(2), RecordingEncoder::new());
    session.begin(test_settings()).unwrap();
    assert!(session.latest_frame().is_none());

    session.tick();
    let frame = session.latest_frame().expect("preview frame while encoding");
    assert_eq!(crate::common::frame_index(frame), 0);

    session.tick();
    assert_eq!(session.phase(), Phase::Complete);
    assert!(session.latest_frame().is_none());
}

#[test]
fn test_cancel_finalizes_once() {
    let mut session = TranscodeSession::new(ScriptedDecoder::new(10), RecordingEncoder::new());
    session.begin(test_settings()).unwrap();
    for _ in 0..4 {
        session.tick();
    }

    session.cancel();
    assert_eq!(session.phase(), Phase::Complete);
    assert_eq!(session.end_reason(), Some(EndReason::Cancelled));
    assert_eq!(session.encoded_frame_count(), 4);

    session.cancel();
    session.tick();
    assert_eq!(session.encoder().finish_calls, 1);
    assert_eq!(session.decoder().close_count(), 1);
}

#[test]
fn test_drop_while_encoding_flushes_encoder() {
    let probe = Rc::new(Cell::new(0));
    {
        let mut session = TranscodeSession::new(
            ScriptedDecoder::new(10),
            RecordingEncoder::with_finish_probe(probe.clone()),
        );
        session.begin(test_settings()).unwrap();
        session.tick();
    }
    assert_eq!(probe.get(), 1);

    // Completed sessions are not finalized again on drop
    let probe = Rc::new(Cell::new(0));
    {
        let mut session = TranscodeSession::new(
            ScriptedDecoder::new(2),
            RecordingEncoder::with_finish_probe(probe.clone()),
        );
        session.begin(test_settings()).unwrap();
        run_to_end(&mut session, 100);
    }
    assert_eq!(probe.get(), 1);
}

#[test]
fn test_summary_reports_run() {
    let mut session = TranscodeSession::new(ScriptedDecoder::new(4), RecordingEncoder::new());
    session.begin(test_settings()).unwrap();
    run_to_end(&mut session, 100);

    let summary = session.summary();
    assert_eq!(summary.id, session.id());
    assert_eq!(summary.phase, Phase::Complete);
    assert_eq!(summary.end_reason, Some(EndReason::EndOfStream));
    assert_eq!(summary.total_frames, 4);
    assert_eq!(summary.encoded_frames, 4);
    assert_eq!(summary.partitions, Some(32));
    assert!(summary.finished_at.is_some());
    assert!(!summary.is_truncated());

    let json = serde_json::to_value(&summary).unwrap();
    assert_eq!(json["phase"], "Complete");
    assert_eq!(json["end_reason"], "end_of_stream");
}

#[test]
fn test_summary_of_failed_session_carries_error() {
    let mut session = TranscodeSession::new(ScriptedDecoder::new(0), RecordingEncoder::new());
    let _ = session.begin(test_settings());

    let summary = session.summary();
    assert_eq!(summary.phase, Phase::Failed);
    assert!(summary.error.as_ref().unwrap().contains("reports no frames"));
    assert!(!summary.is_truncated());
}
