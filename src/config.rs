use std::time::Duration;

use crate::error::EngineError;
use crate::format::AudioFormat;

/// How samples are laid out and transferred on the device side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    RwInterleaved,
    MmapInterleaved,
}

/// Stream geometry requested from both directions of a duplex pair.
///
/// Channel counts are a request only; devices may answer with fewer. Every
/// other field is strict: a device that cannot honor it fails the open.
#[derive(Debug, Clone, Copy)]
pub struct StreamConfig {
    pub channels: u32,
    pub format: AudioFormat,
    pub access: AccessMode,
    pub rate: u32,
    pub period_size: usize,
    pub periods: u32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        StreamConfig {
            channels: 2,
            format: AudioFormat::S16Le,
            access: AccessMode::RwInterleaved,
            rate: 48000,
            period_size: 128,
            periods: 2,
        }
    }
}

impl StreamConfig {
    /// Total device buffer size in frames.
    pub fn buffer_size(&self) -> usize {
        self.period_size * self.periods as usize
    }

    /// Wall-clock duration of one period.
    pub fn period_duration(&self) -> Duration {
        Duration::from_micros(self.period_size as u64 * 1_000_000 / self.rate as u64)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if !(5000..=768_000).contains(&self.rate) {
            return Err(EngineError::InvalidConfig(format!(
                "rate {} outside 5000..=768000",
                self.rate
            )));
        }
        if !(1..=512).contains(&self.channels) {
            return Err(EngineError::InvalidConfig(format!(
                "channel count {} outside 1..=512",
                self.channels
            )));
        }
        if self.period_size == 0 {
            return Err(EngineError::InvalidConfig("period size is zero".into()));
        }
        if self.periods < 2 {
            return Err(EngineError::InvalidConfig(format!(
                "need at least 2 periods, got {}",
                self.periods
            )));
        }
        Ok(())
    }
}

/// True when the environment variable is set to a truthy value.
pub fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| {
            let v = v.trim();
            !v.is_empty() && v != "0" && !v.eq_ignore_ascii_case("false")
        })
        .unwrap_or(false)
}
