//! Lock-free single-producer single-consumer float ring.
//!
//! The writer converts device-format frames to float on the way in; the
//! reader converts back out. Capacity is a power of two and one slot stays
//! reserved, so a ring of capacity C holds at most C-1 frames. Cursors are
//! plain frame counters masked on use; each side loads the opposing cursor
//! with acquire ordering and publishes its own advance with release ordering.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::area::ChannelArea;
use crate::convert::{self, ConvertOps};
use crate::error::EngineError;
use crate::format::AudioFormat;

pub struct RingBuffer {
    data: *mut f32,
    len: usize,
    areas: Vec<ChannelArea>,
    channels: usize,
    capacity: usize,
    mask: usize,
    ops: ConvertOps,
    read_pos: AtomicUsize,
    write_pos: AtomicUsize,
}

// One writer thread and one reader thread may use &self concurrently; the
// cursor protocol keeps their frame ranges disjoint.
unsafe impl Send for RingBuffer {}
unsafe impl Sync for RingBuffer {}

impl RingBuffer {
    /// `capacity` is in frames and must be a power of two.
    pub fn open(
        format: AudioFormat,
        channels: usize,
        capacity: usize,
    ) -> Result<RingBuffer, EngineError> {
        if channels == 0 {
            return Err(EngineError::InvalidConfig("ring with zero channels".into()));
        }
        if capacity < 2 || !capacity.is_power_of_two() {
            return Err(EngineError::InvalidConfig(format!(
                "ring capacity {capacity} is not a power of two"
            )));
        }
        let len = channels * capacity;
        let data = Box::into_raw(vec![0f32; len].into_boxed_slice()) as *mut f32;
        // Planar layout, one capacity-sized plane per channel.
        let areas = (0..channels)
            .map(|ch| ChannelArea::new(data as *mut u8, ch * capacity * 32, 32))
            .collect();
        Ok(RingBuffer {
            data,
            len,
            areas,
            channels,
            capacity,
            mask: capacity - 1,
            ops: ConvertOps::for_format(format),
            read_pos: AtomicUsize::new(0),
            write_pos: AtomicUsize::new(0),
        })
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Frames the producer may write right now.
    pub fn write_avail(&self) -> usize {
        let w = self.write_pos.load(Ordering::Relaxed);
        let r = self.read_pos.load(Ordering::Acquire);
        r.wrapping_sub(w).wrapping_sub(1) & self.mask
    }

    /// Frames the consumer may read right now.
    pub fn read_avail(&self) -> usize {
        let w = self.write_pos.load(Ordering::Acquire);
        let r = self.read_pos.load(Ordering::Relaxed);
        w.wrapping_sub(r) & self.mask
    }

    /// Converts up to `frames` device-format frames from `src` into the
    /// ring. Truncates silently to the available space and returns the
    /// number of frames actually stored. Producer side only.
    pub fn write(&self, src: &[ChannelArea], src_offset: usize, channels: usize, frames: usize) -> usize {
        let frames = frames.min(self.write_avail());
        if frames == 0 {
            return 0;
        }
        let channels = channels.min(self.channels).min(src.len());
        let w = self.write_pos.load(Ordering::Relaxed);
        let idx = w & self.mask;
        let first = frames.min(self.capacity - idx);

        convert::areas_to_float(&self.areas, idx, src, src_offset, channels, first, self.ops.to_float);
        self.write_pos.store(w.wrapping_add(first), Ordering::Release);

        let second = frames - first;
        if second > 0 {
            convert::areas_to_float(
                &self.areas,
                0,
                src,
                src_offset + first,
                channels,
                second,
                self.ops.to_float,
            );
            self.write_pos
                .store(w.wrapping_add(frames), Ordering::Release);
        }
        frames
    }

    /// Converts up to `frames` frames out of the ring into `dst` in the
    /// device format. Truncates silently to the frames present and returns
    /// the number delivered. Consumer side only.
    pub fn read(&self, dst: &[ChannelArea], dst_offset: usize, channels: usize, frames: usize) -> usize {
        let frames = frames.min(self.read_avail());
        if frames == 0 {
            return 0;
        }
        let channels = channels.min(self.channels).min(dst.len());
        let r = self.read_pos.load(Ordering::Relaxed);
        let idx = r & self.mask;
        let first = frames.min(self.capacity - idx);

        convert::areas_from_float(dst, dst_offset, &self.areas, idx, channels, first, self.ops.from_float);
        self.read_pos.store(r.wrapping_add(first), Ordering::Release);

        let second = frames - first;
        if second > 0 {
            convert::areas_from_float(
                dst,
                dst_offset + first,
                &self.areas,
                0,
                channels,
                second,
                self.ops.from_float,
            );
            self.read_pos.store(r.wrapping_add(frames), Ordering::Release);
        }
        frames
    }
}

impl Drop for RingBuffer {
    fn drop(&mut self) {
        unsafe {
            drop(Box::from_raw(std::ptr::slice_from_raw_parts_mut(
                self.data, self.len,
            )));
        }
    }
}
