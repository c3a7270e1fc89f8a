//! Scoped ownership of device-side buffers and running streams.
//!
//! Every lease is released exactly once. Committing hands the buffer back
//! with the caller's frame count; dropping an uncommitted lease (an error
//! path) hands it back in the most harmless way the device allows.

use std::ops::{Deref, DerefMut};

use crate::models::error::DeviceError;
use crate::traits::endpoint::{CaptureEndpoint, CapturePacket, Endpoint, RenderEndpoint};

/// A captured batch, borrowed from the capture endpoint until released.
///
/// Dropped without [`commit`](Self::commit), the batch is released with zero
/// frames consumed and stays queued on the device.
pub struct CaptureLease<'a, C: CaptureEndpoint + ?Sized> {
    endpoint: &'a mut C,
    packet: CapturePacket,
    released: bool,
}

impl<'a, C: CaptureEndpoint + ?Sized> CaptureLease<'a, C> {
    pub fn acquire(endpoint: &'a mut C) -> Result<Self, DeviceError> {
        let packet = endpoint.acquire()?;
        Ok(Self {
            endpoint,
            packet,
            released: false,
        })
    }

    pub fn packet(&self) -> CapturePacket {
        self.packet
    }

    pub fn data(&self) -> &[u8] {
        self.endpoint.data()
    }

    /// Releases the whole batch as consumed.
    pub fn commit(mut self) -> Result<(), DeviceError> {
        self.released = true;
        self.endpoint.release(self.packet.frames)
    }
}

impl<C: CaptureEndpoint + ?Sized> Drop for CaptureLease<'_, C> {
    fn drop(&mut self) {
        if !self.released {
            if let Err(e) = self.endpoint.release(0) {
                log::warn!("failed to hand back abandoned capture batch: {}", e);
            }
        }
    }
}

/// Writable render space for `frames` frames, borrowed until released.
///
/// Dropped without [`commit`](Self::commit), the whole span is released as
/// silence so the device never plays half-written data.
pub struct RenderLease<'a, R: RenderEndpoint + ?Sized> {
    endpoint: &'a mut R,
    frames: u32,
    released: bool,
}

impl<'a, R: RenderEndpoint + ?Sized> RenderLease<'a, R> {
    /// Single attempt; a full sink surfaces as [`DeviceError::BufferTooLarge`].
    pub fn acquire(endpoint: &'a mut R, frames: u32) -> Result<Self, DeviceError> {
        Self::acquire_with_retry(endpoint, frames, |_| false)
    }

    /// Retries while the sink is full. `on_full` is called with the attempt
    /// number after every refusal and returns whether to try again; it is
    /// where callers pause.
    pub fn acquire_with_retry(
        endpoint: &'a mut R,
        frames: u32,
        mut on_full: impl FnMut(u64) -> bool,
    ) -> Result<Self, DeviceError> {
        let mut attempt = 0u64;
        loop {
            match endpoint.acquire(frames) {
                Ok(()) => break,
                Err(e) if e.is_buffer_full() => {
                    attempt += 1;
                    if !on_full(attempt) {
                        return Err(e);
                    }
                }
                Err(e) => return Err(e),
            }
        }
        Ok(Self {
            endpoint,
            frames,
            released: false,
        })
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        self.endpoint.data_mut()
    }

    pub fn commit(mut self, silent: bool) -> Result<(), DeviceError> {
        self.released = true;
        self.endpoint.release(self.frames, silent)
    }
}

impl<R: RenderEndpoint + ?Sized> Drop for RenderLease<'_, R> {
    fn drop(&mut self) {
        if !self.released {
            if let Err(e) = self.endpoint.release(self.frames, true) {
                log::warn!("failed to hand back abandoned render buffer: {}", e);
            }
        }
    }
}

/// A started stream. Stops it when dropped unless already finished.
pub struct StartedStream<'a, E: Endpoint + ?Sized> {
    endpoint: &'a mut E,
    running: bool,
}

impl<'a, E: Endpoint + ?Sized> StartedStream<'a, E> {
    pub fn start(endpoint: &'a mut E) -> Result<Self, DeviceError> {
        endpoint.start()?;
        Ok(Self {
            endpoint,
            running: true,
        })
    }

    /// Stops the stream, reporting failure instead of swallowing it.
    pub fn finish(mut self) -> Result<(), DeviceError> {
        self.running = false;
        self.endpoint.stop()
    }
}

impl<E: Endpoint + ?Sized> Deref for StartedStream<'_, E> {
    type Target = E;

    fn deref(&self) -> &E {
        self.endpoint
    }
}

impl<E: Endpoint + ?Sized> DerefMut for StartedStream<'_, E> {
    fn deref_mut(&mut self) -> &mut E {
        self.endpoint
    }
}

impl<E: Endpoint + ?Sized> Drop for StartedStream<'_, E> {
    fn drop(&mut self) {
        if self.running {
            if let Err(e) = self.endpoint.stop() {
                log::warn!("failed to stop stream: {}", e);
            }
        }
    }
}
