use thiserror::Error;

use super::report::SessionReport;

/// Failures reported by a device endpoint.
///
/// Backends map their native status codes onto these variants. Only
/// `BufferTooLarge` is treated as recoverable by the scheduler: it is the
/// render side's way of saying "no room right now, try again shortly".
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("render buffer too large for the space currently available")]
    BufferTooLarge,

    #[error("endpoint is not open")]
    NotOpen,

    #[error("device not available: {0}")]
    Unavailable(String),

    #[error("{call} failed: hr = 0x{code:08x}")]
    Call { call: &'static str, code: u32 },

    #[error("device error: {0}")]
    Other(String),
}

impl DeviceError {
    pub fn call(call: &'static str, code: u32) -> Self {
        Self::Call { call, code }
    }

    /// Whether this is the render-buffer-full backpressure condition.
    pub fn is_buffer_full(&self) -> bool {
        matches!(self, Self::BufferTooLarge)
    }
}

/// Errors that abort a remix session.
///
/// Every variant is fatal for the session that produced it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RemixError {
    #[error("unsupported input layout: {0}")]
    UnsupportedInputLayout(String),

    #[error("unsupported output format: {0}")]
    UnsupportedOutputFormat(String),

    #[error("capture batch of {acquired} frames disagrees with next packet size {announced} on pass {pass}")]
    InconsistentPacketSize { announced: u32, acquired: u32, pass: u64 },

    #[error("capture set flags to 0x{flags:08x} on pass {pass} after {frames} frames")]
    UnexpectedCaptureFlag { flags: u32, pass: u64, frames: u64 },

    #[error("capture said to read 0 frames on pass {pass} after {frames} frames")]
    EmptyPacket { pass: u64, frames: u64 },

    #[error("scheduler error: {0}")]
    SchedulerError(String),

    #[error("configuration failed: {0}")]
    ConfigurationFailed(String),

    #[error(transparent)]
    Device(#[from] DeviceError),
}

/// A fatal session outcome together with everything streamed before it.
#[derive(Debug, Error, Clone, PartialEq)]
#[error("{error} (after {} frames)", report.frames)]
pub struct SessionFailure {
    #[source]
    pub error: RemixError,
    pub report: SessionReport,
}

impl SessionFailure {
    pub fn new(error: RemixError, report: SessionReport) -> Self {
        Self { error, report }
    }
}
