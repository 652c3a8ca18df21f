//! Readiness wait and xrun recovery over a playback/capture pair.
//!
//! One wait blocks until both directions are ready, a timeout fires or a
//! device reports trouble. Timeouts and xruns come back as a restart
//! request; the caller stops and restarts the session data flow. Only
//! disconnects, signal interruption and the retry ceiling are fatal.

use tracing::{debug, warn};

use nix::libc;

use crate::device::{PcmDevice, PcmState};
use crate::error::EngineError;

/// Consecutive zero-readiness timeouts tolerated; the next one is fatal.
pub const MAX_RETRY_COUNT: u32 = 5;

#[derive(Debug)]
pub enum WaitOutcome {
    /// Both directions are ready for a period of I/O.
    Ready,
    /// Recoverable fault; stop and restart the stream before continuing.
    NeedsRestart,
    Fatal(EngineError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvailOutcome {
    /// Whole periods' worth of frames transferable in both directions.
    Frames(usize),
    NeedsRestart,
}

pub struct PollContext {
    fds: Vec<libc::pollfd>,
    play_nfds: usize,
    capt_nfds: usize,
    period_size: usize,
    period_usecs: u64,
    timeout_ms: i32,
    poll_next: u64,
    poll_last: u64,
    poll_late: u64,
    delayed_usecs: u64,
    xrun_count: u32,
    retry_count: u32,
}

fn now_usecs() -> u64 {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    unsafe {
        libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts);
    }
    ts.tv_sec as u64 * 1_000_000 + ts.tv_nsec as u64 / 1_000
}

impl PollContext {
    pub fn new<P: PcmDevice>(play: &P, capt: &P, rate: u32, period_size: usize) -> PollContext {
        let play_nfds = play.poll_descriptor_count();
        let capt_nfds = capt.poll_descriptor_count();
        let period_usecs = period_size as u64 * 1_000_000 / rate as u64;
        // Half a period of slack on top of the period itself.
        let timeout_ms = ((period_usecs * 3 / 2) / 1_000).max(1) as i32;
        let zero = libc::pollfd {
            fd: -1,
            events: 0,
            revents: 0,
        };
        debug!(play_nfds, capt_nfds, period_usecs, timeout_ms, "poll context");
        PollContext {
            fds: vec![zero; play_nfds + capt_nfds],
            play_nfds,
            capt_nfds,
            period_size,
            period_usecs,
            timeout_ms,
            poll_next: 0,
            poll_last: 0,
            poll_late: 0,
            delayed_usecs: 0,
            xrun_count: 0,
            retry_count: 0,
        }
    }

    /// True when a device's descriptor set no longer fits this context and
    /// it must be rebuilt.
    pub fn descriptors_changed<P: PcmDevice>(&self, play: &P, capt: &P) -> bool {
        play.poll_descriptor_count() != self.play_nfds
            || capt.poll_descriptor_count() != self.capt_nfds
    }

    pub fn play_descriptors(&self) -> usize {
        self.play_nfds
    }

    pub fn capture_descriptors(&self) -> usize {
        self.capt_nfds
    }

    pub fn xrun_count(&self) -> u32 {
        self.xrun_count
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn late_wakeups(&self) -> u64 {
        self.poll_late
    }

    pub fn delayed_usecs(&self) -> u64 {
        self.delayed_usecs
    }

    pub fn last_wakeup_usecs(&self) -> u64 {
        self.poll_last
    }

    /// Monotonic deadline for the next expected wakeup, zero when unarmed.
    pub fn next_wakeup_usecs(&self) -> u64 {
        self.poll_next
    }

    pub fn period_usecs(&self) -> u64 {
        self.period_usecs
    }

    pub fn timeout_ms(&self) -> i32 {
        self.timeout_ms
    }

    /// Blocks until both directions signal readiness.
    ///
    /// Re-polls with only the still-pending direction armed after a partial
    /// wakeup. An error flag on either device counts as an xrun: recovery
    /// runs, then the caller is asked to restart. A consecutive-timeout
    /// counter survives across calls and goes fatal at [`MAX_RETRY_COUNT`];
    /// any successful wait resets it.
    pub fn wait<P: PcmDevice>(&mut self, play: &mut P, capt: &mut P) -> WaitOutcome {
        let mut need_playback = true;
        let mut need_capture = true;
        let mut xrun = false;

        while (need_playback || need_capture) && !xrun {
            let mut nfds = 0;
            let mut capt_start = 0;
            if need_playback {
                match play.fill_descriptors(&mut self.fds[..self.play_nfds]) {
                    Ok(n) => nfds += n,
                    Err(e) => return WaitOutcome::Fatal(e),
                }
            }
            if need_capture {
                capt_start = nfds;
                match capt.fill_descriptors(&mut self.fds[nfds..nfds + self.capt_nfds]) {
                    Ok(n) => nfds += n,
                    Err(e) => return WaitOutcome::Fatal(e),
                }
            }

            let entered = now_usecs();
            if self.poll_next != 0 && entered > self.poll_next {
                self.poll_late += 1;
                self.poll_next = 0;
            }

            let rc = unsafe {
                libc::poll(self.fds.as_mut_ptr(), nfds as libc::nfds_t, self.timeout_ms)
            };
            if rc < 0 {
                let err = std::io::Error::last_os_error();
                if err.raw_os_error() == Some(libc::EINTR) {
                    return WaitOutcome::Fatal(EngineError::Interrupted);
                }
                return WaitOutcome::Fatal(EngineError::Device(err.to_string()));
            }

            let returned = now_usecs();
            if rc == 0 {
                self.retry_count += 1;
                if self.retry_count >= MAX_RETRY_COUNT {
                    warn!(
                        retries = self.retry_count,
                        "giving up after repeated poll timeouts"
                    );
                    return WaitOutcome::Fatal(EngineError::RetryCeilingExceeded(
                        MAX_RETRY_COUNT,
                    ));
                }
                warn!(
                    waited_usecs = returned - entered,
                    retry = self.retry_count,
                    "poll timed out, requesting restart"
                );
                if let Err(e) = self.xrun_recovery(play, capt) {
                    return WaitOutcome::Fatal(e);
                }
                return WaitOutcome::NeedsRestart;
            }

            if self.poll_next != 0 && returned > self.poll_next {
                self.delayed_usecs = returned - self.poll_next;
            }
            self.poll_last = returned;
            self.poll_next = returned + self.period_usecs;

            if need_playback {
                match play.revents(&self.fds[..self.play_nfds]) {
                    Err(e) => return WaitOutcome::Fatal(e),
                    Ok(r) => {
                        if r.disconnected {
                            return WaitOutcome::Fatal(EngineError::Disconnected);
                        }
                        if r.error {
                            xrun = true;
                        }
                        if r.ready {
                            need_playback = false;
                        }
                    }
                }
            }
            if need_capture {
                match capt.revents(&self.fds[capt_start..capt_start + self.capt_nfds]) {
                    Err(e) => return WaitOutcome::Fatal(e),
                    Ok(r) => {
                        if r.disconnected {
                            return WaitOutcome::Fatal(EngineError::Disconnected);
                        }
                        if r.error {
                            xrun = true;
                        }
                        if r.ready {
                            need_capture = false;
                        }
                    }
                }
            }
        }

        if xrun {
            if let Err(e) = self.xrun_recovery(play, capt) {
                return WaitOutcome::Fatal(e);
            }
            return WaitOutcome::NeedsRestart;
        }
        self.retry_count = 0;
        WaitOutcome::Ready
    }

    /// Puts both substreams back into a startable state after a fault.
    ///
    /// Never restarts data flow; the caller owns stop/start.
    pub fn xrun_recovery<P: PcmDevice>(
        &mut self,
        play: &mut P,
        capt: &mut P,
    ) -> Result<(), EngineError> {
        let status = capt.status()?;
        match status.state {
            PcmState::Suspended => {
                warn!("pcm suspended, resuming");
                if capt.resume().is_err() {
                    capt.prepare()?;
                }
                if play.resume().is_err() {
                    play.prepare()?;
                }
            }
            PcmState::Xrun => {
                self.xrun_count += 1;
                let delayed = status.htstamp.saturating_sub(status.trigger_tstamp);
                self.delayed_usecs = delayed.as_micros() as u64;
                warn!(
                    delayed_ms = delayed.as_secs_f64() * 1_000.0,
                    count = self.xrun_count,
                    "xrun detected"
                );
                capt.prepare()?;
                play.prepare()?;
            }
            _ => {}
        }
        Ok(())
    }

    /// Frames transferable in both directions, floored to whole periods.
    pub fn avail<P: PcmDevice>(
        &mut self,
        play: &mut P,
        capt: &mut P,
    ) -> Result<AvailOutcome, EngineError> {
        let p = match play.avail_update() {
            Ok(n) => n,
            Err(EngineError::Xrun) | Err(EngineError::Suspended) => {
                return Ok(AvailOutcome::NeedsRestart);
            }
            Err(e) => return Err(e),
        };
        let c = match capt.avail_update() {
            Ok(n) => n,
            Err(EngineError::Xrun) | Err(EngineError::Suspended) => {
                return Ok(AvailOutcome::NeedsRestart);
            }
            Err(e) => return Err(e),
        };
        let frames = p.min(c) / self.period_size * self.period_size;
        Ok(AvailOutcome::Frames(frames))
    }
}
