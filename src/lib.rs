//! Low-latency full-duplex PCM audio I/O engine.
//!
//! The engine couples a playback and a capture substream into one session:
//! parameters are negotiated strictly on both, the pair is hardware-linked
//! when possible, playback is pre-rolled with a full buffer of silence and
//! then both sides run a synchronous wait/read/write cycle with bounded
//! xrun recovery. Sample conversion between device formats and 32-bit float
//! goes through channel areas, so the same codec serves owned buffers,
//! foreign mmap windows and the lock-free ring.
//!
//! Everything above the [`device::PcmDevice`] trait is platform-neutral;
//! the ALSA implementation lives in [`alsa`] and is Linux-only.

pub mod area;
pub mod buffer;
pub mod config;
pub mod convert;
pub mod error;
pub mod format;
pub mod ring;

#[cfg(unix)]
pub mod device;
#[cfg(unix)]
pub mod dump;
#[cfg(unix)]
pub mod duplex;
#[cfg(unix)]
pub mod poll;
#[cfg(unix)]
pub mod rt;
#[cfg(unix)]
pub mod timing;

#[cfg(target_os = "linux")]
pub mod alsa;

pub use crate::area::ChannelArea;
pub use crate::buffer::AudioBuffer;
pub use crate::config::{AccessMode, StreamConfig};
pub use crate::convert::ConvertOps;
pub use crate::error::EngineError;
pub use crate::format::AudioFormat;
pub use crate::ring::RingBuffer;

#[cfg(unix)]
pub use crate::device::{Direction, Negotiated, PcmDevice, PcmState, Revents, StatusSnapshot};
#[cfg(unix)]
pub use crate::duplex::DuplexSession;
#[cfg(unix)]
pub use crate::poll::{AvailOutcome, MAX_RETRY_COUNT, PollContext, WaitOutcome};
#[cfg(unix)]
pub use crate::timing::SessionTimer;

#[cfg(target_os = "linux")]
pub use crate::alsa::AlsaPcm;
