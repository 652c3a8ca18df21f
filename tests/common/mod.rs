//! Scripted PCM device for exercising the poll machine and session without
//! hardware. Poll readiness is real: each fake exports one end of a pipe,
//! so a never-ready fake genuinely makes poll(2) block until the timeout.

#![allow(dead_code)]

use std::time::Duration;

use nix::libc;

use duplex_engine::config::StreamConfig;
use duplex_engine::device::{Direction, Negotiated, PcmDevice, PcmState, Revents, StatusSnapshot};
use duplex_engine::error::EngineError;

static SESSION_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

/// Serializes tests that assert on the global buffer live count. Also makes
/// sure engine logs reach the test output.
pub fn session_lock() -> std::sync::MutexGuard<'static, ()> {
    init_logging();
    SESSION_LOCK.lock().unwrap_or_else(|e| e.into_inner())
}

/// Routes engine logs to the captured test output. Safe to call from every
/// test; only the first call installs the subscriber.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// Write end of the pipe, always ready.
    Ready,
    /// Read end of an empty pipe, never ready.
    NeverReady,
    /// Ready at the fd level, reports an error flag from revents.
    ErrorFlag,
    /// Ready at the fd level, reports a dead descriptor.
    Disconnected,
}

pub struct FakePcm {
    direction: Direction,
    readiness: Readiness,
    pipe_rd: libc::c_int,
    pipe_wr: libc::c_int,
    state: PcmState,
    /// Substitute state reported by `status`, e.g. `Xrun` while scripting
    /// recovery paths.
    pub status_state: Option<PcmState>,
    pub trigger_us: u64,
    /// Overrides the accepted period size to script a negotiation mismatch.
    pub negotiated_period: Option<usize>,
    pub linkable: bool,
    pub avail: usize,
    /// One-shot fault reported by the next `avail_update` call.
    pub avail_error: Option<EngineError>,
    pub descriptor_count: usize,
    /// Descriptor count reported once the device has been started, to
    /// script a mid-session descriptor set change.
    pub descriptor_count_after_start: Option<usize>,
    /// Per-call caps on transfer progress, to script partial transfers.
    pub read_limit: Option<usize>,
    pub write_limit: Option<usize>,
    pub preroll_frames: usize,
    pub frames_written: usize,
    pub frames_read: usize,
    pub start_calls: u32,
    pub prepare_calls: u32,
    pub resume_calls: u32,
    pub drop_calls: u32,
}

impl FakePcm {
    pub fn new(direction: Direction, readiness: Readiness) -> FakePcm {
        let mut fds = [0 as libc::c_int; 2];
        let rc = unsafe { libc::pipe(fds.as_mut_ptr()) };
        assert_eq!(rc, 0, "pipe failed");
        FakePcm {
            direction,
            readiness,
            pipe_rd: fds[0],
            pipe_wr: fds[1],
            state: PcmState::Open,
            status_state: None,
            trigger_us: 0,
            negotiated_period: None,
            linkable: true,
            avail: 0,
            avail_error: None,
            descriptor_count: 1,
            descriptor_count_after_start: None,
            read_limit: None,
            write_limit: None,
            preroll_frames: 0,
            frames_written: 0,
            frames_read: 0,
            start_calls: 0,
            prepare_calls: 0,
            resume_calls: 0,
            drop_calls: 0,
        }
    }

    pub fn playback() -> FakePcm {
        FakePcm::new(Direction::Playback, Readiness::Ready)
    }

    pub fn capture() -> FakePcm {
        FakePcm::new(Direction::Capture, Readiness::Ready)
    }
}

impl Drop for FakePcm {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.pipe_rd);
            libc::close(self.pipe_wr);
        }
    }
}

impl PcmDevice for FakePcm {
    fn direction(&self) -> Direction {
        self.direction
    }

    fn negotiate(&mut self, request: &StreamConfig) -> Result<Negotiated, EngineError> {
        self.state = PcmState::Prepared;
        Ok(Negotiated {
            channels: request.channels,
            format: request.format,
            rate: request.rate,
            period_size: self.negotiated_period.unwrap_or(request.period_size),
            periods: request.periods,
        })
    }

    fn link(&mut self, _other: &Self) -> Result<(), EngineError> {
        if self.linkable {
            Ok(())
        } else {
            Err(EngineError::Device("link refused".into()))
        }
    }

    fn start(&mut self) -> Result<(), EngineError> {
        self.start_calls += 1;
        self.state = PcmState::Running;
        Ok(())
    }

    fn drop_pending(&mut self) -> Result<(), EngineError> {
        self.drop_calls += 1;
        self.state = PcmState::Setup;
        Ok(())
    }

    fn prepare(&mut self) -> Result<(), EngineError> {
        self.prepare_calls += 1;
        self.state = PcmState::Prepared;
        self.status_state = None;
        Ok(())
    }

    fn resume(&mut self) -> Result<(), EngineError> {
        self.resume_calls += 1;
        self.state = PcmState::Running;
        self.status_state = None;
        Ok(())
    }

    fn state(&self) -> PcmState {
        self.state
    }

    fn status(&self) -> Result<StatusSnapshot, EngineError> {
        Ok(StatusSnapshot {
            state: self.status_state.unwrap_or(self.state),
            htstamp: Duration::from_micros(self.trigger_us + 250),
            trigger_tstamp: Duration::from_micros(self.trigger_us),
            avail: self.avail,
        })
    }

    fn avail_update(&mut self) -> Result<usize, EngineError> {
        if let Some(e) = self.avail_error.take() {
            return Err(e);
        }
        Ok(self.avail)
    }

    fn poll_descriptor_count(&self) -> usize {
        match self.descriptor_count_after_start {
            Some(n) if self.start_calls > 0 => n,
            _ => self.descriptor_count,
        }
    }

    fn fill_descriptors(&self, fds: &mut [libc::pollfd]) -> Result<usize, EngineError> {
        let (fd, events) = match self.readiness {
            Readiness::NeverReady => (self.pipe_rd, libc::POLLIN),
            _ => (self.pipe_wr, libc::POLLOUT),
        };
        let count = self.poll_descriptor_count();
        for slot in fds.iter_mut().take(count) {
            *slot = libc::pollfd {
                fd,
                events,
                revents: 0,
            };
        }
        Ok(count)
    }

    fn revents(&self, _fds: &[libc::pollfd]) -> Result<Revents, EngineError> {
        Ok(match self.readiness {
            Readiness::Ready => Revents {
                ready: true,
                ..Revents::default()
            },
            Readiness::NeverReady => Revents::default(),
            Readiness::ErrorFlag => Revents {
                error: true,
                ..Revents::default()
            },
            Readiness::Disconnected => Revents {
                disconnected: true,
                ..Revents::default()
            },
        })
    }

    fn readi(&mut self, buf: &mut [u8], frames: usize) -> Result<usize, EngineError> {
        let frames = match self.read_limit {
            Some(limit) => frames.min(limit),
            None => frames,
        };
        if frames == 0 {
            return Ok(0);
        }
        // Deterministic non-silent payload.
        for (i, b) in buf.iter_mut().enumerate().take(frames * 4) {
            *b = (self.frames_read + i) as u8;
        }
        self.frames_read += frames;
        Ok(frames)
    }

    fn writei(&mut self, _buf: &[u8], frames: usize) -> Result<usize, EngineError> {
        let frames = match self.write_limit {
            Some(limit) => frames.min(limit),
            None => frames,
        };
        if self.state != PcmState::Running {
            self.preroll_frames += frames;
        }
        self.frames_written += frames;
        Ok(frames)
    }
}
