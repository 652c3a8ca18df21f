#![cfg(unix)]

mod common;

use common::{FakePcm, Readiness};
use duplex_engine::device::{Direction, PcmDevice, PcmState};
use duplex_engine::error::EngineError;
use duplex_engine::poll::{AvailOutcome, MAX_RETRY_COUNT, PollContext, WaitOutcome};
use duplex_engine::StreamConfig;

fn negotiated_pair(play: Readiness, capt: Readiness) -> (FakePcm, FakePcm) {
    common::init_logging();
    let mut p = FakePcm::new(Direction::Playback, play);
    let mut c = FakePcm::new(Direction::Capture, capt);
    let config = StreamConfig::default();
    p.negotiate(&config).unwrap();
    c.negotiate(&config).unwrap();
    (p, c)
}

// Short period so timeout rounds down to a couple of milliseconds.
fn context(play: &FakePcm, capt: &FakePcm) -> PollContext {
    PollContext::new(play, capt, 48_000, 64)
}

#[test]
fn fifth_consecutive_timeout_is_fatal() {
    let (mut play, mut capt) = negotiated_pair(Readiness::NeverReady, Readiness::NeverReady);
    let mut poll = context(&play, &capt);

    for attempt in 1..MAX_RETRY_COUNT {
        match poll.wait(&mut play, &mut capt) {
            WaitOutcome::NeedsRestart => {}
            other => panic!("attempt {attempt}: expected restart, got {other:?}"),
        }
        assert_eq!(poll.retry_count(), attempt);
    }
    match poll.wait(&mut play, &mut capt) {
        WaitOutcome::Fatal(EngineError::RetryCeilingExceeded(n)) => {
            assert_eq!(n, MAX_RETRY_COUNT);
        }
        other => panic!("expected fatal ceiling, got {other:?}"),
    }
}

#[test]
fn successful_wait_resets_the_retry_counter() {
    let (mut slow_play, mut slow_capt) =
        negotiated_pair(Readiness::NeverReady, Readiness::NeverReady);
    let (mut fast_play, mut fast_capt) = negotiated_pair(Readiness::Ready, Readiness::Ready);
    let mut poll = context(&slow_play, &slow_capt);

    for _ in 0..3 {
        assert!(matches!(
            poll.wait(&mut slow_play, &mut slow_capt),
            WaitOutcome::NeedsRestart
        ));
    }
    assert_eq!(poll.retry_count(), 3);

    assert!(matches!(
        poll.wait(&mut fast_play, &mut fast_capt),
        WaitOutcome::Ready
    ));
    assert_eq!(poll.retry_count(), 0);
}

#[test]
fn xrun_flag_requests_restart_and_recovers() {
    let (mut play, mut capt) = negotiated_pair(Readiness::Ready, Readiness::ErrorFlag);
    capt.status_state = Some(PcmState::Xrun);
    let mut poll = context(&play, &capt);

    match poll.wait(&mut play, &mut capt) {
        WaitOutcome::NeedsRestart => {}
        other => panic!("xrun must never be reported as ready: {other:?}"),
    }
    assert_eq!(poll.xrun_count(), 1);
    // Recovery re-prepared both substreams without restarting them.
    assert_eq!(play.prepare_calls, 1);
    assert_eq!(capt.prepare_calls, 1);
    assert_eq!(play.start_calls, 0);
    assert_eq!(capt.start_calls, 0);
}

#[test]
fn suspend_resumes_both_directions() {
    let (mut play, mut capt) = negotiated_pair(Readiness::Ready, Readiness::ErrorFlag);
    capt.status_state = Some(PcmState::Suspended);
    let mut poll = context(&play, &capt);

    assert!(matches!(
        poll.wait(&mut play, &mut capt),
        WaitOutcome::NeedsRestart
    ));
    assert_eq!(poll.xrun_count(), 0);
    assert_eq!(play.resume_calls, 1);
    assert_eq!(capt.resume_calls, 1);
}

#[test]
fn dead_descriptor_is_fatal() {
    let (mut play, mut capt) = negotiated_pair(Readiness::Ready, Readiness::Disconnected);
    let mut poll = context(&play, &capt);

    match poll.wait(&mut play, &mut capt) {
        WaitOutcome::Fatal(EngineError::Disconnected) => {}
        other => panic!("expected fatal disconnect, got {other:?}"),
    }
}

#[test]
fn avail_floors_to_whole_periods() {
    let (mut play, mut capt) = negotiated_pair(Readiness::Ready, Readiness::Ready);
    let mut poll = context(&play, &capt);

    play.avail = 300;
    capt.avail = 200;
    assert_eq!(
        poll.avail(&mut play, &mut capt).unwrap(),
        AvailOutcome::Frames(192)
    );

    capt.avail = 63;
    assert_eq!(
        poll.avail(&mut play, &mut capt).unwrap(),
        AvailOutcome::Frames(0)
    );
}

#[test]
fn avail_maps_recoverable_faults_to_restart() {
    let (mut play, mut capt) = negotiated_pair(Readiness::Ready, Readiness::Ready);
    let mut poll = context(&play, &capt);
    play.avail = 128;
    capt.avail = 128;

    capt.avail_error = Some(EngineError::Xrun);
    assert_eq!(
        poll.avail(&mut play, &mut capt).unwrap(),
        AvailOutcome::NeedsRestart
    );

    play.avail_error = Some(EngineError::Suspended);
    assert_eq!(
        poll.avail(&mut play, &mut capt).unwrap(),
        AvailOutcome::NeedsRestart
    );

    // Anything beyond xrun/suspend propagates as an error.
    play.avail_error = Some(EngineError::Disconnected);
    assert!(matches!(
        poll.avail(&mut play, &mut capt),
        Err(EngineError::Disconnected)
    ));

    // The faults were one-shot; the pair is healthy again.
    assert_eq!(
        poll.avail(&mut play, &mut capt).unwrap(),
        AvailOutcome::Frames(128)
    );
}

#[test]
fn descriptor_count_change_forces_a_rebuild() {
    let (mut play, capt) = negotiated_pair(Readiness::Ready, Readiness::Ready);
    let poll = context(&play, &capt);
    assert!(!poll.descriptors_changed(&play, &capt));

    play.descriptor_count = 2;
    assert!(poll.descriptors_changed(&play, &capt));

    let rebuilt = context(&play, &capt);
    assert_eq!(rebuilt.play_descriptors(), 2);
    assert_eq!(rebuilt.capture_descriptors(), 1);
    assert!(!rebuilt.descriptors_changed(&play, &capt));
}
