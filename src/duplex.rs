//! Full-duplex session over a linked playback/capture pair.
//!
//! The session owns both substreams, one conversion buffer per direction
//! and the poll context. Data flow is synchronous: wait, check availability,
//! read a period, write a period. Channel counts may differ per direction;
//! format, rate and period geometry must not.

use tracing::{debug, warn};

use crate::buffer::{self, AudioBuffer};
use crate::config::{StreamConfig, env_flag};
use crate::device::{Direction, Negotiated, PcmDevice};
use crate::dump;
use crate::error::EngineError;
use crate::format::AudioFormat;
use crate::poll::{AvailOutcome, PollContext, WaitOutcome};
use crate::timing::SessionTimer;

/// Set to dump the session layout and poll statistics through the logger.
pub const DUMP_ENV: &str = "DUPLEX_ENGINE_DUMP";

pub struct DuplexSession<P: PcmDevice> {
    play: P,
    capt: P,
    linked: bool,
    format: AudioFormat,
    rate: u32,
    period_size: usize,
    periods: u32,
    play_channels: u32,
    capt_channels: u32,
    play_buf: AudioBuffer,
    capt_buf: AudioBuffer,
    poll: PollContext,
    timer: SessionTimer,
    running: bool,
}

fn check_strict(dir: Direction, req: &StreamConfig, got: &Negotiated) -> Result<(), EngineError> {
    if got.format != req.format {
        return Err(EngineError::Negotiation(format!(
            "{dir:?}: format {} not honored (got {})",
            req.format, got.format
        )));
    }
    if got.rate != req.rate {
        return Err(EngineError::Negotiation(format!(
            "{dir:?}: rate {} not honored (got {})",
            req.rate, got.rate
        )));
    }
    if got.period_size != req.period_size {
        return Err(EngineError::Negotiation(format!(
            "{dir:?}: period size {} not honored (got {})",
            req.period_size, got.period_size
        )));
    }
    if got.periods != req.periods {
        return Err(EngineError::Negotiation(format!(
            "{dir:?}: period count {} not honored (got {})",
            req.periods, got.periods
        )));
    }
    Ok(())
}

impl<P: PcmDevice> DuplexSession<P> {
    /// Negotiates both directions, links them when the hardware allows it
    /// and allocates one full buffer of conversion space per direction.
    pub fn open(mut play: P, mut capt: P, config: &StreamConfig) -> Result<Self, EngineError> {
        config.validate()?;
        if play.direction() != Direction::Playback || capt.direction() != Direction::Capture {
            return Err(EngineError::InvalidConfig(
                "open needs a playback device and a capture device".into(),
            ));
        }

        let accepted_play = play.negotiate(config)?;
        check_strict(Direction::Playback, config, &accepted_play)?;
        let accepted_capt = capt.negotiate(config)?;
        check_strict(Direction::Capture, config, &accepted_capt)?;
        if accepted_play.format != accepted_capt.format {
            return Err(EngineError::Negotiation(format!(
                "directions disagree on format: {} vs {}",
                accepted_play.format, accepted_capt.format
            )));
        }

        let linked = match capt.link(&play) {
            Ok(()) => true,
            Err(e) => {
                debug!("hardware link unavailable ({e}), triggering independently");
                false
            }
        };

        let buffer_frames = config.buffer_size();
        let play_buf =
            AudioBuffer::allocate(accepted_play.format, accepted_play.channels as usize, buffer_frames)?;
        let capt_buf =
            AudioBuffer::allocate(accepted_capt.format, accepted_capt.channels as usize, buffer_frames)?;
        let poll = PollContext::new(&play, &capt, config.rate, config.period_size);

        let session = DuplexSession {
            play,
            capt,
            linked,
            format: accepted_play.format,
            rate: config.rate,
            period_size: config.period_size,
            periods: config.periods,
            play_channels: accepted_play.channels,
            capt_channels: accepted_capt.channels,
            play_buf,
            capt_buf,
            poll,
            timer: SessionTimer::default(),
            running: false,
        };
        if env_flag(DUMP_ENV) {
            dump::session(&session);
        }
        Ok(session)
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn rate(&self) -> u32 {
        self.rate
    }

    pub fn period_size(&self) -> usize {
        self.period_size
    }

    pub fn periods(&self) -> u32 {
        self.periods
    }

    pub fn playback_channels(&self) -> u32 {
        self.play_channels
    }

    pub fn capture_channels(&self) -> u32 {
        self.capt_channels
    }

    pub fn linked(&self) -> bool {
        self.linked
    }

    pub fn running(&self) -> bool {
        self.running
    }

    pub fn playback_buffer(&self) -> &AudioBuffer {
        &self.play_buf
    }

    pub fn playback_buffer_mut(&mut self) -> &mut AudioBuffer {
        &mut self.play_buf
    }

    pub fn capture_buffer(&self) -> &AudioBuffer {
        &self.capt_buf
    }

    pub fn capture_buffer_mut(&mut self) -> &mut AudioBuffer {
        &mut self.capt_buf
    }

    pub fn timer(&self) -> &SessionTimer {
        &self.timer
    }

    pub fn poll_stats(&self) -> &PollContext {
        &self.poll
    }

    fn play_frame_bytes(&self) -> usize {
        self.play_channels as usize * self.format.physical_bytes()
    }

    fn capt_frame_bytes(&self) -> usize {
        self.capt_channels as usize * self.format.physical_bytes()
    }

    /// Pre-rolls one full buffer of silence in period-sized writes, then
    /// triggers. With an unlinked pair capture is triggered separately right
    /// after playback.
    pub fn start(&mut self) -> Result<(), EngineError> {
        self.play_buf.fill_silence();
        let period = self.period_size;
        for i in 0..self.periods as usize {
            let moved = self.transfer_out(i * period, period)?;
            if moved < period {
                return Err(EngineError::PartialTransfer {
                    moved,
                    requested: period,
                });
            }
        }
        self.play.start()?;
        if !self.linked {
            self.capt.start()?;
        }
        self.timer
            .record_start(self.play.status().ok(), self.capt.status().ok());
        self.running = true;
        debug!(linked = self.linked, "duplex started");
        Ok(())
    }

    /// Stops both directions, dropping pending frames. With a linked pair
    /// the capture side follows the playback trigger.
    pub fn stop(&mut self) -> Result<(), EngineError> {
        self.timer
            .record_stop(self.play.status().ok(), self.capt.status().ok());
        self.play.drop_pending()?;
        if !self.linked {
            self.capt.drop_pending()?;
        }
        self.running = false;
        Ok(())
    }

    /// Blocks until both directions are ready, rebuilding the poll context
    /// first if a device changed its descriptor set.
    pub fn wait(&mut self) -> WaitOutcome {
        if self.poll.descriptors_changed(&self.play, &self.capt) {
            warn!("poll descriptor set changed, rebuilding context");
            self.poll = PollContext::new(&self.play, &self.capt, self.rate, self.period_size);
        }
        self.poll.wait(&mut self.play, &mut self.capt)
    }

    /// Frames transferable in both directions, floored to whole periods.
    pub fn avail(&mut self) -> Result<AvailOutcome, EngineError> {
        self.poll.avail(&mut self.play, &mut self.capt)
    }

    /// Runs xrun recovery by hand, for callers that hit a device error
    /// outside `wait`. The session must be restarted afterwards.
    pub fn recover(&mut self) -> Result<(), EngineError> {
        self.poll.xrun_recovery(&mut self.play, &mut self.capt)
    }

    /// Captures exactly one period into the capture buffer's float plane.
    pub fn read(&mut self) -> Result<usize, EngineError> {
        let period = self.period_size;
        let frame_bytes = self.capt_frame_bytes();
        let mut done = 0;
        {
            let buf = self.capt_buf.dev_bytes_mut();
            while done < period {
                let n = self
                    .capt
                    .readi(&mut buf[done * frame_bytes..period * frame_bytes], period - done)?;
                if n == 0 {
                    break;
                }
                done += n;
            }
        }
        self.capt_buf.device_to_float(0, done);
        if done < period {
            return Err(EngineError::PartialTransfer {
                moved: done,
                requested: period,
            });
        }
        Ok(done)
    }

    /// Converts and writes exactly one period from the playback buffer's
    /// float plane.
    pub fn write(&mut self) -> Result<usize, EngineError> {
        let period = self.period_size;
        self.play_buf.float_to_device(0, period);
        let moved = self.transfer_out(0, period)?;
        if moved < period {
            return Err(EngineError::PartialTransfer {
                moved,
                requested: period,
            });
        }
        Ok(moved)
    }

    /// Routes the captured period into the playback plane, honoring the
    /// channel asymmetry rules.
    pub fn route_capture_to_playback(&mut self, frames: usize, gain: f32) {
        buffer::copy_capture_to_playback(&self.capt_buf, &mut self.play_buf, frames, gain);
    }

    fn transfer_out(&mut self, offset: usize, frames: usize) -> Result<usize, EngineError> {
        let frame_bytes = self.play_frame_bytes();
        let bytes = self.play_buf.dev_bytes();
        let mut done = 0;
        while done < frames {
            let start = (offset + done) * frame_bytes;
            let end = (offset + frames) * frame_bytes;
            let n = self.play.writei(&bytes[start..end], frames - done)?;
            if n == 0 {
                break;
            }
            done += n;
        }
        Ok(done)
    }

    /// Releases the conversion buffers and hands the devices back. Buffer
    /// release is idempotent, so dropping the session after `close` is fine.
    pub fn close(mut self) -> (P, P) {
        if self.running {
            if let Err(e) = self.stop() {
                warn!("stop during close failed: {e}");
            }
        }
        self.play_buf.release();
        self.capt_buf.release();
        (self.play, self.capt)
    }
}
