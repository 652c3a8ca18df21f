/// Non-owning view of one channel inside a sample buffer.
///
/// `first` and `step` are in bits, matching the ALSA channel-area model, so
/// the same type describes a planar float plane (step 32), an interleaved
/// device buffer (step = frame stride) or a foreign mmap window. Offsets are
/// byte-aligned for every format the engine supports; `sample_ptr` assumes
/// that.
#[derive(Debug, Clone, Copy)]
pub struct ChannelArea {
    addr: *mut u8,
    first: usize,
    step: usize,
}

// An area is a view; whoever creates it owns the memory and decides which
// threads may touch it. The pointer itself is freely movable.
unsafe impl Send for ChannelArea {}
unsafe impl Sync for ChannelArea {}

impl ChannelArea {
    pub fn new(addr: *mut u8, first: usize, step: usize) -> Self {
        debug_assert!(first % 8 == 0 && step % 8 == 0);
        ChannelArea { addr, first, step }
    }

    /// Pointer to the sample at `frame` within this channel.
    pub fn sample_ptr(&self, frame: usize) -> *mut u8 {
        self.addr.wrapping_add((self.first + frame * self.step) / 8)
    }

    /// Distance between consecutive samples of this channel, in bytes.
    pub fn step_bytes(&self) -> usize {
        self.step / 8
    }

    pub fn first_bits(&self) -> usize {
        self.first
    }

    pub fn step_bits(&self) -> usize {
        self.step
    }
}
