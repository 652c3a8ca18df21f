//! Read-only timing diagnostics for a running session.

use std::time::{Duration, Instant};

use tracing::info;

use crate::device::StatusSnapshot;

/// Records trigger and wall-clock timestamps around start/stop so drift
/// between real time and device time can be reported. Never feeds back into
/// stream control.
#[derive(Debug, Default)]
pub struct SessionTimer {
    started: Option<Instant>,
    stopped: Option<Instant>,
    start_play_trigger: Option<Duration>,
    start_capt_trigger: Option<Duration>,
    stop_play_trigger: Option<Duration>,
    stop_capt_trigger: Option<Duration>,
}

impl SessionTimer {
    pub fn record_start(&mut self, play: Option<StatusSnapshot>, capt: Option<StatusSnapshot>) {
        self.started = Some(Instant::now());
        self.stopped = None;
        self.start_play_trigger = play.map(|s| s.trigger_tstamp);
        self.start_capt_trigger = capt.map(|s| s.trigger_tstamp);
        self.stop_play_trigger = None;
        self.stop_capt_trigger = None;
    }

    pub fn record_stop(&mut self, play: Option<StatusSnapshot>, capt: Option<StatusSnapshot>) {
        self.stopped = Some(Instant::now());
        self.stop_play_trigger = play.map(|s| s.trigger_tstamp);
        self.stop_capt_trigger = capt.map(|s| s.trigger_tstamp);
    }

    /// Wall-clock time between start and stop (or now, while running).
    pub fn elapsed_real(&self) -> Option<Duration> {
        let started = self.started?;
        Some(match self.stopped {
            Some(stopped) => stopped.duration_since(started),
            None => started.elapsed(),
        })
    }

    /// Time `frames` frames take at `rate`, rounded to the nearest microsecond.
    pub fn device_time(frames: u64, rate: u32) -> Duration {
        let rate = u64::from(rate.max(1));
        Duration::from_micros((frames * 1_000_000 + rate / 2) / rate)
    }

    /// Whether both directions were triggered by the same event, judged by
    /// trigger timestamp equality at start. `None` before a recorded start
    /// or when either stamp is missing.
    pub fn hw_synced(&self) -> Option<bool> {
        match (self.start_play_trigger, self.start_capt_trigger) {
            (Some(p), Some(c)) => Some(p == c),
            _ => None,
        }
    }

    /// Logs elapsed real time against device time for `frames` at `rate`.
    pub fn report(&self, frames: u64, rate: u32) {
        let Some(real) = self.elapsed_real() else {
            return;
        };
        let device = Self::device_time(frames, rate);
        let drift = real.as_secs_f64() - device.as_secs_f64();
        info!(
            real_ms = real.as_secs_f64() * 1_000.0,
            device_ms = device.as_secs_f64() * 1_000.0,
            drift_ms = drift * 1_000.0,
            hw_synced = ?self.hw_synced(),
            "session timing"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::PcmState;

    fn snap(trigger_us: u64) -> StatusSnapshot {
        StatusSnapshot {
            state: PcmState::Running,
            htstamp: Duration::from_micros(trigger_us + 500),
            trigger_tstamp: Duration::from_micros(trigger_us),
            avail: 0,
        }
    }

    #[test]
    fn device_time_rounds_to_nearest_microsecond() {
        assert_eq!(
            SessionTimer::device_time(48_000, 48_000),
            Duration::from_secs(1)
        );
        // 128 frames at 48 kHz is 2666.67 us.
        assert_eq!(
            SessionTimer::device_time(128, 48_000),
            Duration::from_micros(2667)
        );
    }

    #[test]
    fn sync_judged_by_trigger_equality() {
        let mut t = SessionTimer::default();
        assert_eq!(t.hw_synced(), None);
        t.record_start(Some(snap(1000)), Some(snap(1000)));
        assert_eq!(t.hw_synced(), Some(true));
        t.record_start(Some(snap(1000)), Some(snap(1200)));
        assert_eq!(t.hw_synced(), Some(false));
        t.record_start(None, Some(snap(1000)));
        assert_eq!(t.hw_synced(), None);
    }

    #[test]
    fn elapsed_uses_stop_when_recorded() {
        let mut t = SessionTimer::default();
        assert!(t.elapsed_real().is_none());
        t.record_start(None, None);
        t.record_stop(None, None);
        let frozen = t.elapsed_real().unwrap();
        std::thread::sleep(Duration::from_millis(2));
        assert_eq!(t.elapsed_real().unwrap(), frozen);
    }
}
