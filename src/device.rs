//! The seam between the engine and the OS PCM layer.
//!
//! Everything above this trait (poll machine, duplex session) is written
//! against it, so the control flow can be exercised with a scripted device.

use std::time::Duration;

use nix::libc;

use crate::config::StreamConfig;
use crate::error::EngineError;
use crate::format::AudioFormat;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Playback,
    Capture,
}

/// PCM substream states, mirroring the ALSA state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PcmState {
    Open,
    Setup,
    Prepared,
    Running,
    Xrun,
    Draining,
    Paused,
    Suspended,
    Disconnected,
}

/// Interpretation of poll revents for one device.
#[derive(Debug, Clone, Copy, Default)]
pub struct Revents {
    pub ready: bool,
    pub error: bool,
    pub disconnected: bool,
}

/// Point-in-time device status.
#[derive(Debug, Clone, Copy)]
pub struct StatusSnapshot {
    pub state: PcmState,
    /// Monotonic timestamp of the snapshot.
    pub htstamp: Duration,
    /// Monotonic timestamp of the last start/stop trigger.
    pub trigger_tstamp: Duration,
    pub avail: usize,
}

/// Parameter values a device actually accepted.
#[derive(Debug, Clone, Copy)]
pub struct Negotiated {
    pub channels: u32,
    pub format: AudioFormat,
    pub rate: u32,
    pub period_size: usize,
    pub periods: u32,
}

pub trait PcmDevice {
    fn direction(&self) -> Direction;

    /// Applies hardware and software parameters. Channel count is
    /// best-effort; the returned values say what the device settled on.
    fn negotiate(&mut self, request: &StreamConfig) -> Result<Negotiated, EngineError>;

    /// Couples this substream's start/stop trigger to `other`'s.
    fn link(&mut self, other: &Self) -> Result<(), EngineError>;

    /// Explicit trigger. A no-op when already running.
    fn start(&mut self) -> Result<(), EngineError>;

    /// Stops immediately, dropping pending frames.
    fn drop_pending(&mut self) -> Result<(), EngineError>;

    fn prepare(&mut self) -> Result<(), EngineError>;

    fn resume(&mut self) -> Result<(), EngineError>;

    fn state(&self) -> PcmState;

    fn status(&self) -> Result<StatusSnapshot, EngineError>;

    /// Refreshes and returns the frames available for transfer.
    fn avail_update(&mut self) -> Result<usize, EngineError>;

    fn poll_descriptor_count(&self) -> usize;

    /// Fills `fds` and returns how many descriptors were written.
    fn fill_descriptors(&self, fds: &mut [libc::pollfd]) -> Result<usize, EngineError>;

    /// Maps raw revents back to a readiness summary for this direction.
    fn revents(&self, fds: &[libc::pollfd]) -> Result<Revents, EngineError>;

    /// Reads up to `frames` interleaved frames into `buf`. Returns frames
    /// actually read; retries internally on transient wakeups.
    fn readi(&mut self, buf: &mut [u8], frames: usize) -> Result<usize, EngineError>;

    /// Writes up to `frames` interleaved frames from `buf`.
    fn writei(&mut self, buf: &[u8], frames: usize) -> Result<usize, EngineError>;
}
