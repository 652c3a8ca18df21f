//! Human-readable snapshots of engine state, rendered through the logger.
//! Purely observational.

use tracing::info;

use crate::buffer::AudioBuffer;
use crate::device::PcmDevice;
use crate::duplex::DuplexSession;
use crate::poll::PollContext;

pub fn buffer(label: &str, buf: &AudioBuffer) {
    info!(
        label,
        format = %buf.format(),
        channels = buf.channels(),
        frames = buf.frames(),
        dev_bytes = buf.dev_bytes().len(),
        "buffer"
    );
}

pub fn poll_stats(poll: &PollContext) {
    info!(
        xruns = poll.xrun_count(),
        retries = poll.retry_count(),
        late_wakeups = poll.late_wakeups(),
        delayed_usecs = poll.delayed_usecs(),
        period_usecs = poll.period_usecs(),
        timeout_ms = poll.timeout_ms(),
        "poll statistics"
    );
}

pub fn session<P: PcmDevice>(s: &DuplexSession<P>) {
    info!(
        format = %s.format(),
        rate = s.rate(),
        period_size = s.period_size(),
        periods = s.periods(),
        playback_channels = s.playback_channels(),
        capture_channels = s.capture_channels(),
        linked = s.linked(),
        running = s.running(),
        "duplex session"
    );
    buffer("playback", s.playback_buffer());
    buffer("capture", s.capture_buffer());
    poll_stats(s.poll_stats());
}
