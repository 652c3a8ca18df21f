//! Conversion buffer pairing an interleaved device image with a planar
//! float plane, both exposed through channel areas.

use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::debug;

use crate::area::ChannelArea;
use crate::convert::{self, ConvertOps};
use crate::error::EngineError;
use crate::format::AudioFormat;

static LIVE_BUFFERS: AtomicUsize = AtomicUsize::new(0);

pub struct AudioBuffer {
    format: AudioFormat,
    channels: usize,
    frames: usize,
    dev_data: Box<[u8]>,
    float_data: Box<[f32]>,
    dev_areas: Vec<ChannelArea>,
    float_areas: Vec<ChannelArea>,
    ops: ConvertOps,
    released: bool,
}

// The raw pointers in the area vectors point into the boxed storage owned
// by the same struct (or, after rebind, into memory the caller keeps alive
// for the session). Moving the struct across threads is sound.
unsafe impl Send for AudioBuffer {}

impl AudioBuffer {
    /// Allocates zeroed device and float storage for `channels` x `frames`.
    pub fn allocate(
        format: AudioFormat,
        channels: usize,
        frames: usize,
    ) -> Result<AudioBuffer, EngineError> {
        if channels == 0 || frames == 0 {
            return Err(EngineError::InvalidConfig(format!(
                "buffer geometry {channels}ch x {frames} frames"
            )));
        }
        let bytes = format.physical_bytes();
        let mut dev_data = vec![0u8; channels * frames * bytes].into_boxed_slice();
        let mut float_data = vec![0f32; channels * frames].into_boxed_slice();

        // Device image is interleaved; float plane is channel-contiguous.
        let dev_base = dev_data.as_mut_ptr();
        let float_base = float_data.as_mut_ptr() as *mut u8;
        let dev_areas = (0..channels)
            .map(|ch| ChannelArea::new(dev_base, ch * bytes * 8, channels * bytes * 8))
            .collect();
        let float_areas = (0..channels)
            .map(|ch| ChannelArea::new(float_base, ch * frames * 32, 32))
            .collect();

        LIVE_BUFFERS.fetch_add(1, Ordering::SeqCst);
        debug!(format = %format, channels, frames, "allocated audio buffer");
        Ok(AudioBuffer {
            format,
            channels,
            frames,
            dev_data,
            float_data,
            dev_areas,
            float_areas,
            ops: ConvertOps::for_format(format),
            released: false,
        })
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    /// The interleaved device image as raw bytes.
    pub fn dev_bytes(&self) -> &[u8] {
        &self.dev_data
    }

    pub fn dev_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.dev_data
    }

    pub fn float_plane(&self, channel: usize) -> &[f32] {
        &self.float_data[channel * self.frames..(channel + 1) * self.frames]
    }

    pub fn float_plane_mut(&mut self, channel: usize) -> &mut [f32] {
        &mut self.float_data[channel * self.frames..(channel + 1) * self.frames]
    }

    pub fn fill_silence(&mut self) {
        self.float_data.fill(0.0);
        self.dev_data.fill(0);
    }

    /// Converts `frames` device frames starting at `offset` into the float
    /// plane at the same frame offset.
    pub fn device_to_float(&mut self, offset: usize, frames: usize) {
        debug_assert!(offset + frames <= self.frames);
        convert::areas_to_float(
            &self.float_areas,
            offset,
            &self.dev_areas,
            offset,
            self.channels,
            frames,
            self.ops.to_float,
        );
    }

    /// Converts `frames` float frames starting at `offset` into the device
    /// image at the same frame offset.
    pub fn float_to_device(&mut self, offset: usize, frames: usize) {
        debug_assert!(offset + frames <= self.frames);
        convert::areas_from_float(
            &self.dev_areas,
            offset,
            &self.float_areas,
            offset,
            self.channels,
            frames,
            self.ops.from_float,
        );
    }

    /// Points the device side of the conversion at foreign memory, such as
    /// a mapped hardware period. The caller keeps that memory alive and
    /// sized for this buffer's geometry while the binding stands.
    pub fn rebind_device_areas(&mut self, areas: Vec<ChannelArea>) -> Result<(), EngineError> {
        if areas.len() != self.channels {
            return Err(EngineError::InvalidConfig(format!(
                "rebind with {} areas for {} channels",
                areas.len(),
                self.channels
            )));
        }
        self.dev_areas = areas;
        Ok(())
    }

    /// Frees the storage. Safe to call more than once; the buffer is
    /// unusable for conversion afterwards.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.dev_data = Box::new([]);
        self.float_data = Box::new([]);
        self.dev_areas.clear();
        self.float_areas.clear();
        LIVE_BUFFERS.fetch_sub(1, Ordering::SeqCst);
    }

    /// Number of allocated, unreleased buffers across the process.
    pub fn live_count() -> usize {
        LIVE_BUFFERS.load(Ordering::SeqCst)
    }
}

impl Drop for AudioBuffer {
    fn drop(&mut self) {
        self.release();
    }
}

/// Mixes captured float frames into the playback float plane.
///
/// Mono capture fans out to every playback channel; equal channel counts map
/// one to one. Any other combination is left untouched.
pub fn copy_capture_to_playback(src: &AudioBuffer, dst: &mut AudioBuffer, frames: usize, gain: f32) {
    let frames = frames.min(src.frames).min(dst.frames);
    if src.channels == 1 {
        for ch in 0..dst.channels {
            let plane = src.float_plane(0);
            for (d, s) in dst.float_plane_mut(ch)[..frames].iter_mut().zip(&plane[..frames]) {
                *d = s * gain;
            }
        }
    } else if src.channels == dst.channels {
        for ch in 0..dst.channels {
            let plane = src.float_plane(ch);
            for (d, s) in dst.float_plane_mut(ch)[..frames].iter_mut().zip(&plane[..frames]) {
                *d = s * gain;
            }
        }
    }
}
