//! `PcmDevice` over the ALSA userspace library.

use std::time::Duration;

use alsa::pcm::{Access, HwParams, PCM, State};
use alsa::poll::Descriptors;
use alsa::{Direction as AlsaDirection, ValueOr};
use nix::libc;
use tracing::debug;

use crate::config::{AccessMode, StreamConfig};
use crate::device::{Direction, Negotiated, PcmDevice, PcmState, Revents, StatusSnapshot};
use crate::error::EngineError;

pub struct AlsaPcm {
    pcm: PCM,
    direction: Direction,
    name: String,
}

fn map_err(e: alsa::Error) -> EngineError {
    match e.errno() {
        libc::EPIPE => EngineError::Xrun,
        libc::ESTRPIPE => EngineError::Suspended,
        libc::ENODEV | libc::ENOTTY => EngineError::Disconnected,
        _ => EngineError::Device(e.to_string()),
    }
}

fn map_state(state: State) -> PcmState {
    match state {
        State::Open => PcmState::Open,
        State::Setup => PcmState::Setup,
        State::Prepared => PcmState::Prepared,
        State::Running => PcmState::Running,
        State::XRun => PcmState::Xrun,
        State::Draining => PcmState::Draining,
        State::Paused => PcmState::Paused,
        State::Suspended => PcmState::Suspended,
        State::Disconnected => PcmState::Disconnected,
    }
}

fn timespec_to_duration(ts: libc::timespec) -> Duration {
    if ts.tv_sec < 0 {
        return Duration::ZERO;
    }
    Duration::new(ts.tv_sec as u64, ts.tv_nsec as u32)
}

impl AlsaPcm {
    /// Opens `device` (e.g. "hw:0,0") non-blocking in the given direction.
    pub fn open(device: &str, direction: Direction) -> Result<AlsaPcm, EngineError> {
        let dir = match direction {
            Direction::Playback => AlsaDirection::Playback,
            Direction::Capture => AlsaDirection::Capture,
        };
        let pcm = PCM::new(device, dir, true).map_err(|e| {
            EngineError::Device(format!("failed to open ALSA {direction:?} '{device}': {e}"))
        })?;
        Ok(AlsaPcm {
            pcm,
            direction,
            name: device.to_string(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl PcmDevice for AlsaPcm {
    fn direction(&self) -> Direction {
        self.direction
    }

    fn negotiate(&mut self, request: &StreamConfig) -> Result<Negotiated, EngineError> {
        let neg = |e: alsa::Error, what: &str| {
            EngineError::Negotiation(format!("{}: {what}: {e}", self.name))
        };

        {
            let hwp = HwParams::any(&self.pcm).map_err(map_err)?;
            let access = match request.access {
                AccessMode::RwInterleaved => Access::RWInterleaved,
                AccessMode::MmapInterleaved => Access::MMapInterleaved,
            };
            hwp.set_access(access).map_err(|e| neg(e, "access mode"))?;
            hwp.set_format(request.format.to_alsa())
                .map_err(|e| neg(e, "sample format"))?;
            // Channel count is the one best-effort parameter.
            let channels = match hwp.set_channels_near(request.channels) {
                Ok(v) if v > 0 => v,
                _ => {
                    let min = hwp.get_channels_min().map_err(|e| neg(e, "channels"))?;
                    hwp.set_channels(min).map_err(|e| neg(e, "channels"))?;
                    min
                }
            };
            hwp.set_rate(request.rate, ValueOr::Nearest)
                .map_err(|e| neg(e, "rate"))?;
            hwp.set_period_size_near(request.period_size as i64, ValueOr::Nearest)
                .map_err(|e| neg(e, "period size"))?;
            hwp.set_buffer_size_near(request.buffer_size() as i64)
                .map_err(|e| neg(e, "buffer size"))?;
            self.pcm.hw_params(&hwp).map_err(|e| neg(e, "hw params"))?;
            debug!(device = %self.name, channels, "hw params applied");
        }

        let current = self.pcm.hw_params_current().map_err(map_err)?;
        let channels = current.get_channels().map_err(map_err)?;
        let rate = current.get_rate().map_err(map_err)?;
        let period_size = current.get_period_size().map_err(map_err)? as usize;
        let periods = current.get_periods().map_err(map_err)?;
        let buffer_size = period_size as i64 * i64::from(periods);

        {
            let swp = self.pcm.sw_params_current().map_err(map_err)?;
            // Auto-start only once a full buffer is queued; stop on empty.
            swp.set_start_threshold(buffer_size)
                .map_err(|e| neg(e, "start threshold"))?;
            swp.set_stop_threshold(buffer_size)
                .map_err(|e| neg(e, "stop threshold"))?;
            swp.set_avail_min(period_size as i64)
                .map_err(|e| neg(e, "avail min"))?;
            swp.set_tstamp_mode(true)
                .map_err(|e| neg(e, "timestamp mode"))?;
            self.pcm.sw_params(&swp).map_err(|e| neg(e, "sw params"))?;
        }

        self.pcm.prepare().map_err(map_err)?;
        Ok(Negotiated {
            channels,
            format: request.format,
            rate,
            period_size,
            periods,
        })
    }

    fn link(&mut self, other: &Self) -> Result<(), EngineError> {
        self.pcm.link(&other.pcm).map_err(map_err)
    }

    fn start(&mut self) -> Result<(), EngineError> {
        // The start threshold may already have fired during pre-roll.
        if self.pcm.state() != State::Running {
            self.pcm.start().map_err(map_err)?;
        }
        Ok(())
    }

    fn drop_pending(&mut self) -> Result<(), EngineError> {
        self.pcm.drop().map_err(map_err)
    }

    fn prepare(&mut self) -> Result<(), EngineError> {
        self.pcm.prepare().map_err(map_err)
    }

    fn resume(&mut self) -> Result<(), EngineError> {
        self.pcm.resume().map_err(map_err)
    }

    fn state(&self) -> PcmState {
        map_state(self.pcm.state())
    }

    fn status(&self) -> Result<StatusSnapshot, EngineError> {
        let status = self.pcm.status().map_err(map_err)?;
        Ok(StatusSnapshot {
            state: map_state(status.get_state()),
            htstamp: timespec_to_duration(status.get_htstamp()),
            trigger_tstamp: timespec_to_duration(status.get_trigger_htstamp()),
            avail: status.get_avail().max(0) as usize,
        })
    }

    fn avail_update(&mut self) -> Result<usize, EngineError> {
        self.pcm
            .avail_update()
            .map(|n| n.max(0) as usize)
            .map_err(map_err)
    }

    fn poll_descriptor_count(&self) -> usize {
        Descriptors::count(&self.pcm)
    }

    fn fill_descriptors(&self, fds: &mut [libc::pollfd]) -> Result<usize, EngineError> {
        Descriptors::fill(&self.pcm, fds).map_err(map_err)
    }

    fn revents(&self, fds: &[libc::pollfd]) -> Result<Revents, EngineError> {
        let flags = Descriptors::revents(&self.pcm, fds).map_err(map_err)?;
        let ready_flag = match self.direction {
            Direction::Playback => alsa::poll::Flags::OUT,
            Direction::Capture => alsa::poll::Flags::IN,
        };
        Ok(Revents {
            ready: flags.contains(ready_flag),
            error: flags.contains(alsa::poll::Flags::ERR),
            disconnected: flags.contains(alsa::poll::Flags::NVAL),
        })
    }

    fn readi(&mut self, buf: &mut [u8], frames: usize) -> Result<usize, EngineError> {
        let io = self.pcm.io_bytes();
        loop {
            match io.readi(buf) {
                Ok(n) => return Ok(n.min(frames)),
                Err(e) if e.errno() == libc::EAGAIN => continue,
                Err(e) => return Err(map_err(e)),
            }
        }
    }

    fn writei(&mut self, buf: &[u8], frames: usize) -> Result<usize, EngineError> {
        let io = self.pcm.io_bytes();
        loop {
            match io.writei(buf) {
                Ok(n) => return Ok(n.min(frames)),
                Err(e) if e.errno() == libc::EAGAIN => continue,
                Err(e) => return Err(map_err(e)),
            }
        }
    }
}
