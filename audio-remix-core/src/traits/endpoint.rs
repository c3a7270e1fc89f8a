use std::time::Duration;

use crate::models::error::DeviceError;
use crate::models::format::AudioFormat;
use crate::session::signal::Signal;

/// Status bits reported with a capture batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct CaptureFlags(u32);

impl CaptureFlags {
    pub const NONE: Self = Self(0);
    pub const DATA_DISCONTINUITY: Self = Self(0x1);
    pub const SILENT: Self = Self(0x2);
    pub const TIMESTAMP_ERROR: Self = Self(0x4);

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for CaptureFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// What the capture endpoint reported for the batch it just handed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapturePacket {
    pub frames: u32,
    pub flags: CaptureFlags,
}

/// How the capture endpoint tells the scheduler that data is waiting.
#[derive(Debug, Clone)]
pub enum CaptureMode {
    /// The endpoint sets the signal itself whenever a packet is queued.
    EventDriven(Signal),
    /// The endpoint is polled; an external periodic timer does the waking.
    Polled,
}

/// Answer to "can you play this format?".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatSupport {
    Exact,
    /// Not as asked, but this close alternative would work.
    Closest(AudioFormat),
    Unsupported,
}

/// Reverts an elevated thread priority when dropped.
#[must_use = "dropping the token immediately reverts the priority boost"]
pub struct PriorityToken {
    revert: Option<Box<dyn FnOnce() + Send>>,
}

impl PriorityToken {
    /// No boost was applied.
    pub fn none() -> Self {
        Self { revert: None }
    }

    pub fn with_revert(revert: impl FnOnce() + Send + 'static) -> Self {
        Self {
            revert: Some(Box::new(revert)),
        }
    }
}

impl Drop for PriorityToken {
    fn drop(&mut self) {
        if let Some(revert) = self.revert.take() {
            revert();
        }
    }
}

impl std::fmt::Debug for PriorityToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriorityToken")
            .field("boosted", &self.revert.is_some())
            .finish()
    }
}

/// A device stream that can be started and stopped.
pub trait Endpoint {
    fn start(&mut self) -> Result<(), DeviceError>;

    fn stop(&mut self) -> Result<(), DeviceError>;
}

/// Source side of a session: an opened capture or loopback stream.
///
/// Batches follow a strict acquire/release cycle. Between `acquire` and
/// `release`, `data` returns exactly `frames * block_align` bytes of the
/// batch; the bytes must not be retained past `release`.
pub trait CaptureEndpoint: Endpoint {
    /// Prepares the stream and returns its fixed format.
    fn open(&mut self, mode: CaptureMode) -> Result<AudioFormat, DeviceError>;

    /// Default device period; the polling timer fires at half of it.
    fn device_period(&self) -> Duration;

    /// Frames in the next queued packet, 0 when nothing is queued.
    fn next_packet_size(&mut self) -> Result<u32, DeviceError>;

    fn acquire(&mut self) -> Result<CapturePacket, DeviceError>;

    fn data(&self) -> &[u8];

    /// Hands back the current batch. `frames` is either the whole batch
    /// (consumed) or 0 (left queued); devices reject anything in between.
    fn release(&mut self, frames: u32) -> Result<(), DeviceError>;

    /// Registers the calling thread for real-time scheduling.
    fn boost_priority(&mut self) -> Result<PriorityToken, DeviceError> {
        Ok(PriorityToken::none())
    }
}

/// Sink side of a session.
///
/// Between `acquire(frames)` and `release`, `data_mut` returns exactly
/// `frames * block_align` writable bytes.
pub trait RenderEndpoint: Endpoint {
    fn check_support(&mut self, candidate: &AudioFormat) -> Result<FormatSupport, DeviceError>;

    fn initialize(&mut self, format: &AudioFormat, buffer: Duration) -> Result<(), DeviceError>;

    /// Total frames in the device buffer, valid after `initialize`.
    fn buffer_frames(&self) -> u32;

    /// Fails with [`DeviceError::BufferTooLarge`] while the sink is too full.
    fn acquire(&mut self, frames: u32) -> Result<(), DeviceError>;

    fn data_mut(&mut self) -> &mut [u8];

    fn release(&mut self, frames: u32, silent: bool) -> Result<(), DeviceError>;
}
