//! Scripted endpoints for running a session without audio hardware.
//!
//! Both mocks keep their bookkeeping behind an `Arc<Mutex<_>>` so a test can
//! hand the endpoint to a session thread and still inspect what happened
//! through a [`CaptureFeeder`] or [`RenderMonitor`].

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::models::error::DeviceError;
use crate::models::format::AudioFormat;
use crate::session::signal::Signal;
use crate::traits::endpoint::{
    CaptureEndpoint, CaptureFlags, CaptureMode, CapturePacket, Endpoint, FormatSupport, PriorityToken, RenderEndpoint,
};

/// What a [`MockCapture`] was asked to do.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureStats {
    pub opened: bool,
    pub event_driven: bool,
    pub starts: u32,
    pub stops: u32,
    pub acquires: u32,
    /// Frame count of every release, in order.
    pub released: Vec<u32>,
    pub boosts: u32,
    pub boosts_reverted: u32,
}

#[derive(Default)]
struct CaptureShared {
    queue: VecDeque<(Vec<u8>, CaptureFlags)>,
    data_ready: Option<Signal>,
    stop_on_acquire: Option<(u32, Signal)>,
    stop_when_drained: Option<Signal>,
    stats: CaptureStats,
}

impl CaptureShared {
    fn push(&mut self, bytes: Vec<u8>, flags: CaptureFlags) {
        self.queue.push_back((bytes, flags));
        if let Some(signal) = &self.data_ready {
            signal.set();
        }
    }
}

/// Feeds packets to a [`MockCapture`] from another thread.
#[derive(Clone)]
pub struct CaptureFeeder {
    shared: Arc<Mutex<CaptureShared>>,
}

impl CaptureFeeder {
    /// Queues a packet and, once the endpoint is open in event-driven mode,
    /// raises its data-ready signal.
    pub fn push(&self, bytes: Vec<u8>, flags: CaptureFlags) {
        self.shared.lock().push(bytes, flags);
    }

    /// Sets `stop` when the `n`-th batch is acquired (1-based).
    pub fn stop_on_acquire(&self, n: u32, stop: Signal) {
        self.shared.lock().stop_on_acquire = Some((n, stop));
    }

    /// Sets `stop` whenever the queue is found empty.
    pub fn stop_when_drained(&self, stop: Signal) {
        self.shared.lock().stop_when_drained = Some(stop);
    }

    pub fn queued_packets(&self) -> usize {
        self.shared.lock().queue.len()
    }

    pub fn stats(&self) -> CaptureStats {
        self.shared.lock().stats.clone()
    }
}

/// Capture endpoint that replays queued byte packets.
pub struct MockCapture {
    format: AudioFormat,
    period: Duration,
    shared: Arc<Mutex<CaptureShared>>,
    current: Vec<u8>,
    current_frames: Option<u32>,
    misreported_size: Option<u32>,
}

impl MockCapture {
    pub fn new(format: AudioFormat) -> Self {
        Self {
            format,
            period: Duration::from_millis(10),
            shared: Arc::new(Mutex::new(CaptureShared::default())),
            current: Vec::new(),
            current_frames: None,
            misreported_size: None,
        }
    }

    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    /// Makes `next_packet_size` report `frames` regardless of the queue.
    pub fn misreport_next_packet_size(mut self, frames: u32) -> Self {
        self.misreported_size = Some(frames);
        self
    }

    pub fn queue_packet(&mut self, bytes: Vec<u8>, flags: CaptureFlags) {
        self.shared.lock().push(bytes, flags);
    }

    pub fn feeder(&self) -> CaptureFeeder {
        CaptureFeeder {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn stats(&self) -> CaptureStats {
        self.shared.lock().stats.clone()
    }

    fn frames_in(&self, len: usize) -> u32 {
        let block = self.format.block_size();
        if block == 0 {
            0
        } else {
            (len / block) as u32
        }
    }
}

impl Endpoint for MockCapture {
    fn start(&mut self) -> Result<(), DeviceError> {
        self.shared.lock().stats.starts += 1;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), DeviceError> {
        self.shared.lock().stats.stops += 1;
        Ok(())
    }
}

impl CaptureEndpoint for MockCapture {
    fn open(&mut self, mode: CaptureMode) -> Result<AudioFormat, DeviceError> {
        let mut shared = self.shared.lock();
        shared.stats.opened = true;
        if let CaptureMode::EventDriven(signal) = mode {
            shared.stats.event_driven = true;
            if !shared.queue.is_empty() {
                signal.set();
            }
            shared.data_ready = Some(signal);
        }
        Ok(self.format)
    }

    fn device_period(&self) -> Duration {
        self.period
    }

    fn next_packet_size(&mut self) -> Result<u32, DeviceError> {
        let shared = self.shared.lock();
        match shared.queue.front() {
            Some((bytes, _)) => Ok(self.misreported_size.unwrap_or_else(|| self.frames_in(bytes.len()))),
            None => {
                if let Some(stop) = &shared.stop_when_drained {
                    stop.set();
                }
                Ok(0)
            }
        }
    }

    fn acquire(&mut self) -> Result<CapturePacket, DeviceError> {
        if self.current_frames.is_some() {
            return Err(DeviceError::Other("batch already acquired".into()));
        }
        let (bytes, flags) = {
            let mut shared = self.shared.lock();
            let (bytes, flags) = shared
                .queue
                .front()
                .cloned()
                .ok_or_else(|| DeviceError::Other("no packet queued".into()))?;
            shared.stats.acquires += 1;
            if let Some((n, stop)) = &shared.stop_on_acquire {
                if *n == shared.stats.acquires {
                    stop.set();
                }
            }
            (bytes, flags)
        };

        let frames = self.frames_in(bytes.len());
        self.current = bytes;
        self.current_frames = Some(frames);
        Ok(CapturePacket { frames, flags })
    }

    fn data(&self) -> &[u8] {
        &self.current
    }

    fn release(&mut self, frames: u32) -> Result<(), DeviceError> {
        let acquired = self
            .current_frames
            .take()
            .ok_or_else(|| DeviceError::Other("release without acquire".into()))?;
        self.current.clear();
        if frames != 0 && frames != acquired {
            return Err(DeviceError::Other(format!(
                "released {} frames of a {}-frame batch",
                frames, acquired
            )));
        }

        let mut shared = self.shared.lock();
        shared.stats.released.push(frames);
        if frames == acquired {
            shared.queue.pop_front();
        }
        Ok(())
    }

    fn boost_priority(&mut self) -> Result<PriorityToken, DeviceError> {
        self.shared.lock().stats.boosts += 1;
        let shared = Arc::clone(&self.shared);
        Ok(PriorityToken::with_revert(move || {
            shared.lock().stats.boosts_reverted += 1;
        }))
    }
}

/// What a [`MockRender`] was asked to do.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderStats {
    pub checked: Vec<AudioFormat>,
    pub format: Option<AudioFormat>,
    pub buffer: Option<Duration>,
    pub starts: u32,
    pub stops: u32,
    pub acquires: u32,
    /// Acquisitions refused with [`DeviceError::BufferTooLarge`].
    pub full_responses: u64,
    /// Bytes of every non-silent release, concatenated.
    pub written: Vec<u8>,
    pub silent_frames: u64,
    pub released: Vec<(u32, bool)>,
}

/// Inspects a [`MockRender`] that was moved elsewhere.
#[derive(Clone)]
pub struct RenderMonitor {
    shared: Arc<Mutex<RenderStats>>,
}

impl RenderMonitor {
    pub fn stats(&self) -> RenderStats {
        self.shared.lock().clone()
    }
}

/// Byte written into freshly acquired render buffers, so output that was
/// never filled in is easy to spot.
pub const UNWRITTEN: u8 = 0xEE;

/// Render endpoint that records everything it is given.
pub struct MockRender {
    support: FormatSupport,
    buffer_frames: Option<u32>,
    full_remaining: u64,
    failure: Option<(u32, DeviceError)>,
    running: bool,
    format: Option<AudioFormat>,
    pending: Option<u32>,
    scratch: Vec<u8>,
    shared: Arc<Mutex<RenderStats>>,
}

impl Default for MockRender {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRender {
    pub fn new() -> Self {
        Self {
            support: FormatSupport::Exact,
            buffer_frames: None,
            full_remaining: 0,
            failure: None,
            running: false,
            format: None,
            pending: None,
            scratch: Vec::new(),
            shared: Arc::new(Mutex::new(RenderStats::default())),
        }
    }

    pub fn with_support(mut self, support: FormatSupport) -> Self {
        self.support = support;
        self
    }

    /// Refuses the next `k` acquisitions made while started as full.
    /// Priming happens before start and is never refused.
    pub fn with_full_responses(mut self, k: u64) -> Self {
        self.full_remaining = k;
        self
    }

    /// Fails the `n`-th acquisition (1-based, priming included) with `error`.
    pub fn fail_acquire(mut self, n: u32, error: DeviceError) -> Self {
        self.failure = Some((n, error));
        self
    }

    pub fn monitor(&self) -> RenderMonitor {
        RenderMonitor {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn stats(&self) -> RenderStats {
        self.shared.lock().clone()
    }
}

impl Endpoint for MockRender {
    fn start(&mut self) -> Result<(), DeviceError> {
        self.running = true;
        self.shared.lock().starts += 1;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), DeviceError> {
        self.running = false;
        self.shared.lock().stops += 1;
        Ok(())
    }
}

impl RenderEndpoint for MockRender {
    fn check_support(&mut self, candidate: &AudioFormat) -> Result<FormatSupport, DeviceError> {
        self.shared.lock().checked.push(*candidate);
        Ok(self.support)
    }

    fn initialize(&mut self, format: &AudioFormat, buffer: Duration) -> Result<(), DeviceError> {
        let frames = self
            .buffer_frames
            .unwrap_or_else(|| (u128::from(format.sample_rate) * buffer.as_millis() / 1000) as u32);
        self.buffer_frames = Some(frames);
        self.format = Some(*format);

        let mut stats = self.shared.lock();
        stats.format = Some(*format);
        stats.buffer = Some(buffer);
        Ok(())
    }

    fn buffer_frames(&self) -> u32 {
        self.buffer_frames.unwrap_or(0)
    }

    fn acquire(&mut self, frames: u32) -> Result<(), DeviceError> {
        let format = self.format.ok_or(DeviceError::NotOpen)?;
        if self.pending.is_some() {
            return Err(DeviceError::Other("buffer already acquired".into()));
        }

        let acquires = {
            let mut stats = self.shared.lock();
            stats.acquires += 1;
            stats.acquires
        };
        if let Some((n, error)) = &self.failure {
            if *n == acquires {
                return Err(error.clone());
            }
        }
        if self.running && self.full_remaining > 0 {
            self.full_remaining -= 1;
            self.shared.lock().full_responses += 1;
            return Err(DeviceError::BufferTooLarge);
        }

        self.scratch.clear();
        self.scratch.resize(format.bytes_for(frames as usize), UNWRITTEN);
        self.pending = Some(frames);
        Ok(())
    }

    fn data_mut(&mut self) -> &mut [u8] {
        &mut self.scratch
    }

    fn release(&mut self, frames: u32, silent: bool) -> Result<(), DeviceError> {
        let acquired = self
            .pending
            .take()
            .ok_or_else(|| DeviceError::Other("release without acquire".into()))?;
        if frames > acquired {
            return Err(DeviceError::Other(format!(
                "released {} frames of a {}-frame buffer",
                frames, acquired
            )));
        }

        let mut stats = self.shared.lock();
        stats.released.push((frames, silent));
        if silent {
            stats.silent_frames += u64::from(frames);
        } else {
            let len = self.format.map_or(0, |f| f.bytes_for(frames as usize));
            stats.written.extend_from_slice(&self.scratch[..len]);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::format::SampleEncoding;
    use crate::session::signal::SignalSet;

    fn mono() -> AudioFormat {
        AudioFormat::new(1, 16, 48_000, SampleEncoding::Pcm)
    }

    #[test]
    fn partial_release_is_rejected() {
        let mut capture = MockCapture::new(mono());
        capture.queue_packet(vec![1, 1, 2, 2, 3, 3], CaptureFlags::NONE);
        capture.open(CaptureMode::Polled).unwrap();

        assert_eq!(capture.acquire().unwrap().frames, 3);
        assert!(capture.release(2).is_err());

        assert_eq!(capture.stats().released, Vec::<u32>::new());
        assert_eq!(capture.next_packet_size().unwrap(), 3);
    }

    #[test]
    fn zero_release_keeps_batch_queued() {
        let mut capture = MockCapture::new(mono());
        capture.queue_packet(vec![1, 1, 2, 2], CaptureFlags::DATA_DISCONTINUITY);
        capture.open(CaptureMode::Polled).unwrap();

        capture.acquire().unwrap();
        capture.release(0).unwrap();

        let packet = capture.acquire().unwrap();
        assert_eq!(packet.frames, 2);
        assert_eq!(packet.flags, CaptureFlags::DATA_DISCONTINUITY);
        assert_eq!(capture.data(), &[1, 1, 2, 2]);
    }

    #[test]
    fn open_raises_data_ready_for_queued_packets() {
        let set = SignalSet::new();
        let ready = set.signal().unwrap();
        let mut capture = MockCapture::new(mono());
        capture.queue_packet(vec![0, 0], CaptureFlags::NONE);

        capture.open(CaptureMode::EventDriven(ready.clone())).unwrap();

        assert!(ready.is_set());
        assert!(capture.stats().event_driven);
    }

    #[test]
    fn feeder_push_raises_data_ready() {
        let set = SignalSet::new();
        let ready = set.signal().unwrap();
        let mut capture = MockCapture::new(mono());
        capture.open(CaptureMode::EventDriven(ready.clone())).unwrap();
        assert!(!ready.is_set());

        capture.feeder().push(vec![0, 0], CaptureFlags::NONE);

        assert!(ready.is_set());
    }

    #[test]
    fn render_buffer_derived_from_duration() {
        let mut render = MockRender::new();
        render.initialize(&mono(), Duration::from_millis(64)).unwrap();
        assert_eq!(render.buffer_frames(), 3072);
    }

    #[test]
    fn render_refuses_k_times_then_succeeds() {
        let mut render = MockRender::new().with_full_responses(2);
        render.initialize(&mono(), Duration::from_millis(10)).unwrap();
        render.start().unwrap();

        assert_eq!(render.acquire(1), Err(DeviceError::BufferTooLarge));
        assert_eq!(render.acquire(1), Err(DeviceError::BufferTooLarge));
        render.acquire(1).unwrap();
        assert_eq!(render.data_mut(), &[UNWRITTEN, UNWRITTEN]);
        render.release(1, false).unwrap();

        let stats = render.stats();
        assert_eq!(stats.full_responses, 2);
        assert_eq!(stats.written, vec![UNWRITTEN, UNWRITTEN]);
    }

    #[test]
    fn render_acquire_before_initialize_fails() {
        let mut render = MockRender::new();
        assert_eq!(render.acquire(1), Err(DeviceError::NotOpen));
    }
}
