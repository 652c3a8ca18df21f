use thiserror::Error;

/// Failure classes surfaced by the engine.
///
/// Recoverable device conditions (`Xrun`, `Suspended`) are normally absorbed
/// by the poll machinery and reported as a restart request; they only escape
/// as errors from direct device calls.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("parameter negotiation failed: {0}")]
    Negotiation(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("device disconnected")]
    Disconnected,

    #[error("device suspended")]
    Suspended,

    #[error("xrun (buffer overrun/underrun)")]
    Xrun,

    #[error("poll retry ceiling of {0} consecutive timeouts reached")]
    RetryCeilingExceeded(u32),

    #[error("poll interrupted by signal")]
    Interrupted,

    #[error("partial transfer: moved {moved} of {requested} frames")]
    PartialTransfer { moved: usize, requested: usize },

    #[error("device error: {0}")]
    Device(String),
}
