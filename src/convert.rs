//! Sample codec between device formats and 32-bit float.
//!
//! Fixed-point formats use the symmetric scale `2^(bits-1) - 1`, so -1.0 and
//! +1.0 map to the exact negative and positive extremes. Float input outside
//! [-1.0, 1.0] clips; interior values round to the nearest step. The routine
//! pair for a stream is looked up once per session through
//! [`ConvertOps::for_format`] rather than re-dispatched per sample.

use std::slice;

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::area::ChannelArea;
use crate::format::AudioFormat;

const SCALE_16: f32 = 32767.0;
const SCALE_24: f32 = 8388607.0;
const SCALE_32: f64 = 2147483647.0;

/// Converts `frames` samples from a device format into `f32`.
///
/// `dst` must be 4-byte aligned; both steps are in bytes. Callers guarantee
/// `frames` samples are readable/writable behind each pointer at the given
/// stride.
pub type ToFloatFn =
    unsafe fn(dst: *mut u8, dst_step: usize, src: *const u8, src_step: usize, frames: usize);

/// Converts `frames` `f32` samples into a device format.
///
/// `src` must be 4-byte aligned; both steps are in bytes.
pub type FromFloatFn =
    unsafe fn(dst: *mut u8, dst_step: usize, src: *const u8, src_step: usize, frames: usize);

#[inline]
fn clip_i16(s: f32) -> i16 {
    if s <= -1.0 {
        -32767
    } else if s >= 1.0 {
        32767
    } else {
        (s * SCALE_16).round() as i16
    }
}

#[inline]
fn clip_i24(s: f32) -> i32 {
    if s <= -1.0 {
        -8388607
    } else if s >= 1.0 {
        8388607
    } else {
        (s * SCALE_24).round() as i32
    }
}

#[inline]
fn clip_i32(s: f32) -> i32 {
    if s <= -1.0 {
        -2147483647
    } else if s >= 1.0 {
        2147483647
    } else {
        (f64::from(s) * SCALE_32).round() as i32
    }
}

macro_rules! to_float {
    ($name:ident, $read:expr) => {
        unsafe fn $name(
            mut dst: *mut u8,
            dst_step: usize,
            mut src: *const u8,
            src_step: usize,
            frames: usize,
        ) {
            for _ in 0..frames {
                unsafe {
                    *(dst as *mut f32) = $read(src);
                    dst = dst.add(dst_step);
                    src = src.add(src_step);
                }
            }
        }
    };
}

macro_rules! from_float {
    ($name:ident, $write:expr) => {
        unsafe fn $name(
            mut dst: *mut u8,
            dst_step: usize,
            mut src: *const u8,
            src_step: usize,
            frames: usize,
        ) {
            for _ in 0..frames {
                unsafe {
                    $write(dst, *(src as *const f32));
                    dst = dst.add(dst_step);
                    src = src.add(src_step);
                }
            }
        }
    };
}

to_float!(s16_le_to_f32, |p: *const u8| unsafe {
    f32::from(LittleEndian::read_i16(slice::from_raw_parts(p, 2))) / SCALE_16
});
to_float!(s16_be_to_f32, |p: *const u8| unsafe {
    f32::from(BigEndian::read_i16(slice::from_raw_parts(p, 2))) / SCALE_16
});
to_float!(s24_le_to_f32, |p: *const u8| unsafe {
    LittleEndian::read_i24(slice::from_raw_parts(p, 3)) as f32 / SCALE_24
});
to_float!(s24_be_to_f32, |p: *const u8| unsafe {
    BigEndian::read_i24(slice::from_raw_parts(p, 3)) as f32 / SCALE_24
});
to_float!(s32_le_to_f32, |p: *const u8| unsafe {
    (f64::from(LittleEndian::read_i32(slice::from_raw_parts(p, 4))) / SCALE_32) as f32
});
to_float!(s32_be_to_f32, |p: *const u8| unsafe {
    (f64::from(BigEndian::read_i32(slice::from_raw_parts(p, 4))) / SCALE_32) as f32
});
to_float!(f32_le_to_f32, |p: *const u8| unsafe {
    LittleEndian::read_f32(slice::from_raw_parts(p, 4))
});

from_float!(f32_to_s16_le, |p: *mut u8, s: f32| unsafe {
    LittleEndian::write_i16(slice::from_raw_parts_mut(p, 2), clip_i16(s))
});
from_float!(f32_to_s16_be, |p: *mut u8, s: f32| unsafe {
    BigEndian::write_i16(slice::from_raw_parts_mut(p, 2), clip_i16(s))
});
from_float!(f32_to_s24_le, |p: *mut u8, s: f32| unsafe {
    LittleEndian::write_i24(slice::from_raw_parts_mut(p, 3), clip_i24(s))
});
from_float!(f32_to_s24_be, |p: *mut u8, s: f32| unsafe {
    BigEndian::write_i24(slice::from_raw_parts_mut(p, 3), clip_i24(s))
});
from_float!(f32_to_s32_le, |p: *mut u8, s: f32| unsafe {
    LittleEndian::write_i32(slice::from_raw_parts_mut(p, 4), clip_i32(s))
});
from_float!(f32_to_s32_be, |p: *mut u8, s: f32| unsafe {
    BigEndian::write_i32(slice::from_raw_parts_mut(p, 4), clip_i32(s))
});
from_float!(f32_to_f32_le, |p: *mut u8, s: f32| unsafe {
    LittleEndian::write_f32(slice::from_raw_parts_mut(p, 4), s)
});

// Indexed by width slot * 2 + endianness; the float entry sits at the end.
// Every supported fixed-point format is signed, so there is no sign axis.
const TO_FLOAT: [ToFloatFn; 7] = [
    s16_le_to_f32,
    s16_be_to_f32,
    s24_le_to_f32,
    s24_be_to_f32,
    s32_le_to_f32,
    s32_be_to_f32,
    f32_le_to_f32,
];

const FROM_FLOAT: [FromFloatFn; 7] = [
    f32_to_s16_le,
    f32_to_s16_be,
    f32_to_s24_le,
    f32_to_s24_be,
    f32_to_s32_le,
    f32_to_s32_be,
    f32_to_f32_le,
];

fn dispatch_index(format: AudioFormat) -> usize {
    if format.is_float() {
        return 6;
    }
    let width_slot = match format.width() {
        16 => 0,
        24 => 1,
        _ => 2,
    };
    width_slot * 2 + usize::from(format.is_big_endian())
}

/// The routine pair for one stream, resolved once at negotiation time.
#[derive(Debug, Clone, Copy)]
pub struct ConvertOps {
    pub to_float: ToFloatFn,
    pub from_float: FromFloatFn,
}

impl ConvertOps {
    pub fn for_format(format: AudioFormat) -> ConvertOps {
        let idx = dispatch_index(format);
        ConvertOps {
            to_float: TO_FLOAT[idx],
            from_float: FROM_FLOAT[idx],
        }
    }
}

/// Drives `op` across `channels` channel-area pairs.
pub fn areas_to_float(
    dst: &[ChannelArea],
    dst_offset: usize,
    src: &[ChannelArea],
    src_offset: usize,
    channels: usize,
    frames: usize,
    op: ToFloatFn,
) {
    for ch in 0..channels {
        let d = dst[ch].sample_ptr(dst_offset);
        let s = src[ch].sample_ptr(src_offset) as *const u8;
        unsafe { op(d, dst[ch].step_bytes(), s, src[ch].step_bytes(), frames) }
    }
}

pub fn areas_from_float(
    dst: &[ChannelArea],
    dst_offset: usize,
    src: &[ChannelArea],
    src_offset: usize,
    channels: usize,
    frames: usize,
    op: FromFloatFn,
) {
    for ch in 0..channels {
        let d = dst[ch].sample_ptr(dst_offset);
        let s = src[ch].sample_ptr(src_offset) as *const u8;
        unsafe { op(d, dst[ch].step_bytes(), s, src[ch].step_bytes(), frames) }
    }
}
