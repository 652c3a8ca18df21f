/// Sample formats the engine converts between device memory and `f32`.
///
/// All fixed-point formats are signed. The 24-bit formats are the packed
/// 3-byte variants, not 24-in-32.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioFormat {
    S16Le,
    S16Be,
    S24Le3,
    S24Be3,
    S32Le,
    S32Be,
    /// Native 32-bit IEEE float, stored little-endian.
    FloatLe,
}

impl AudioFormat {
    /// Significant bits per sample.
    pub fn width(self) -> u32 {
        match self {
            AudioFormat::S16Le | AudioFormat::S16Be => 16,
            AudioFormat::S24Le3 | AudioFormat::S24Be3 => 24,
            AudioFormat::S32Le | AudioFormat::S32Be | AudioFormat::FloatLe => 32,
        }
    }

    /// Bytes a single sample occupies in device memory.
    pub fn physical_bytes(self) -> usize {
        match self {
            AudioFormat::S16Le | AudioFormat::S16Be => 2,
            AudioFormat::S24Le3 | AudioFormat::S24Be3 => 3,
            AudioFormat::S32Le | AudioFormat::S32Be | AudioFormat::FloatLe => 4,
        }
    }

    pub fn is_big_endian(self) -> bool {
        matches!(
            self,
            AudioFormat::S16Be | AudioFormat::S24Be3 | AudioFormat::S32Be
        )
    }

    pub fn is_float(self) -> bool {
        matches!(self, AudioFormat::FloatLe)
    }

    pub fn name(self) -> &'static str {
        match self {
            AudioFormat::S16Le => "S16_LE",
            AudioFormat::S16Be => "S16_BE",
            AudioFormat::S24Le3 => "S24_3LE",
            AudioFormat::S24Be3 => "S24_3BE",
            AudioFormat::S32Le => "S32_LE",
            AudioFormat::S32Be => "S32_BE",
            AudioFormat::FloatLe => "FLOAT_LE",
        }
    }

    #[cfg(target_os = "linux")]
    pub(crate) fn to_alsa(self) -> alsa::pcm::Format {
        use alsa::pcm::Format;
        match self {
            AudioFormat::S16Le => Format::S16LE,
            AudioFormat::S16Be => Format::S16BE,
            AudioFormat::S24Le3 => Format::S243LE,
            AudioFormat::S24Be3 => Format::S243BE,
            AudioFormat::S32Le => Format::S32LE,
            AudioFormat::S32Be => Format::S32BE,
            AudioFormat::FloatLe => Format::FloatLE,
        }
    }
}

impl std::fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
