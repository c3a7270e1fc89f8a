//! WASAPI capture endpoint.
//!
//! Opens a capture device in shared mode, or a render device with
//! `AUDCLNT_STREAMFLAGS_LOOPBACK` to capture what it is playing. Capture
//! devices are event driven: the device's Win32 event is bridged onto the
//! session's [`Signal`]. Loopback streams are polled by the session.

use std::ffi::c_void;
use std::thread;
use std::time::Duration;

use windows::core::{w, PCWSTR};
use windows::Win32::Foundation::{CloseHandle, HANDLE, WAIT_OBJECT_0};
use windows::Win32::Media::Audio::*;
use windows::Win32::System::Com::{CoTaskMemFree, CLSCTX_ALL};
use windows::Win32::System::Threading::{
    AvRevertMmThreadCharacteristics, AvSetMmThreadCharacteristicsW, CreateEventW, SetEvent, WaitForMultipleObjects,
    INFINITE,
};

use audio_remix_core::{
    AudioFormat, CaptureEndpoint, CaptureFlags, CaptureMode, CapturePacket, DeviceError, Endpoint, PriorityToken,
    Signal,
};

use crate::com::{failed, init_mta, ComGuard};
use crate::device_enumerator::DeviceEnumerator;
use crate::wave_format::WaveFormat;

/// Fallback when the device does not report a period.
const DEFAULT_PERIOD: Duration = Duration::from_millis(10);

/// Capture side of a session, backed by `IAudioCaptureClient`.
pub struct WasapiCapture {
    device: IMMDevice,
    name: String,
    loopback: bool,
    client: Option<IAudioClient>,
    capture: Option<IAudioCaptureClient>,
    _bridge: Option<EventBridge>,
    block_align: usize,
    period: Duration,
    packet: Option<(*mut u8, usize)>,
    // Dropped last: COM objects above must be released inside the apartment.
    com: Option<ComGuard>,
}

// SAFETY: the endpoint is created on the controller thread but every COM
// call happens on the session thread after `open`, in the multithreaded
// apartment, where interface pointers may be used from any thread.
unsafe impl Send for WasapiCapture {}

impl WasapiCapture {
    /// `loopback` selects capturing what a render device plays.
    pub fn new(device: IMMDevice, loopback: bool) -> Self {
        let name = DeviceEnumerator::friendly_name(&device).unwrap_or_else(|| "unnamed device".into());
        Self {
            device,
            name,
            loopback,
            client: None,
            capture: None,
            _bridge: None,
            block_align: 0,
            period: DEFAULT_PERIOD,
            packet: None,
            com: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn client(&self) -> Result<&IAudioClient, DeviceError> {
        self.client.as_ref().ok_or(DeviceError::NotOpen)
    }

    fn capture_client(&self) -> Result<&IAudioCaptureClient, DeviceError> {
        self.capture.as_ref().ok_or(DeviceError::NotOpen)
    }
}

impl Endpoint for WasapiCapture {
    fn start(&mut self) -> Result<(), DeviceError> {
        unsafe { self.client()?.Start().map_err(failed("IAudioClient::Start (capture)")) }
    }

    fn stop(&mut self) -> Result<(), DeviceError> {
        unsafe { self.client()?.Stop().map_err(failed("IAudioClient::Stop (capture)")) }
    }
}

impl CaptureEndpoint for WasapiCapture {
    fn open(&mut self, mode: CaptureMode) -> Result<AudioFormat, DeviceError> {
        if self.com.is_none() {
            self.com = Some(init_mta()?);
        }

        unsafe {
            let client: IAudioClient = self
                .device
                .Activate(CLSCTX_ALL, None)
                .map_err(failed("IMMDevice::Activate (capture)"))?;

            let mut period_hns = 0i64;
            client
                .GetDevicePeriod(Some(&mut period_hns as *mut i64), None)
                .map_err(failed("IAudioClient::GetDevicePeriod"))?;
            if period_hns > 0 {
                self.period = Duration::from_nanos(period_hns as u64 * 100);
            }

            let mix_ptr = client.GetMixFormat().map_err(failed("IAudioClient::GetMixFormat"))?;
            let mix = WaveFormat::from_ptr(mix_ptr);
            CoTaskMemFree(Some(mix_ptr as *const c_void));
            let mut wave = mix?;
            wave.normalize_block_align();
            let format = wave.to_audio_format()?;

            let mut flags = 0u32;
            if self.loopback {
                flags |= AUDCLNT_STREAMFLAGS_LOOPBACK;
            }
            if let CaptureMode::EventDriven(_) = mode {
                flags |= AUDCLNT_STREAMFLAGS_EVENTCALLBACK;
            }

            client
                .Initialize(AUDCLNT_SHAREMODE_SHARED, flags, 0, 0, wave.as_ptr(), None)
                .map_err(failed("IAudioClient::Initialize (capture)"))?;

            if let CaptureMode::EventDriven(ready) = mode {
                let bridge = EventBridge::start(ready)?;
                client
                    .SetEventHandle(bridge.handle())
                    .map_err(failed("IAudioClient::SetEventHandle"))?;
                self._bridge = Some(bridge);
            }

            let capture: IAudioCaptureClient = client
                .GetService()
                .map_err(failed("IAudioClient::GetService (capture)"))?;

            log::debug!(
                "opened {} ({}, period {:?}): {}",
                self.name,
                if self.loopback { "loopback" } else { "capture" },
                self.period,
                format
            );

            self.block_align = format.block_size();
            self.client = Some(client);
            self.capture = Some(capture);
            Ok(format)
        }
    }

    fn device_period(&self) -> Duration {
        self.period
    }

    fn next_packet_size(&mut self) -> Result<u32, DeviceError> {
        unsafe {
            self.capture_client()?
                .GetNextPacketSize()
                .map_err(failed("IAudioCaptureClient::GetNextPacketSize"))
        }
    }

    fn acquire(&mut self) -> Result<CapturePacket, DeviceError> {
        let mut data: *mut u8 = std::ptr::null_mut();
        let mut frames = 0u32;
        let mut flags = 0u32;
        unsafe {
            self.capture_client()?
                .GetBuffer(&mut data, &mut frames, &mut flags, None, None)
                .map_err(failed("IAudioCaptureClient::GetBuffer"))?;
        }
        self.packet = Some((data, frames as usize * self.block_align));
        Ok(CapturePacket {
            frames,
            flags: CaptureFlags::from_bits(flags),
        })
    }

    fn data(&self) -> &[u8] {
        match self.packet {
            // SAFETY: the device keeps the batch mapped until ReleaseBuffer.
            Some((data, len)) if !data.is_null() => unsafe { std::slice::from_raw_parts(data, len) },
            _ => &[],
        }
    }

    fn release(&mut self, frames: u32) -> Result<(), DeviceError> {
        self.packet = None;
        unsafe {
            self.capture_client()?
                .ReleaseBuffer(frames)
                .map_err(failed("IAudioCaptureClient::ReleaseBuffer"))
        }
    }

    fn boost_priority(&mut self) -> Result<PriorityToken, DeviceError> {
        let mut task_index = 0u32;
        let task = unsafe { AvSetMmThreadCharacteristicsW(w!("Audio"), &mut task_index) }
            .map_err(failed("AvSetMmThreadCharacteristics"))?;
        let raw = task.0 as isize;
        Ok(PriorityToken::with_revert(move || unsafe {
            if let Err(e) = AvRevertMmThreadCharacteristics(HANDLE(raw as *mut c_void)) {
                log::warn!("AvRevertMmThreadCharacteristics failed: {}", e);
            }
        }))
    }
}

/// Auto-reset Win32 event, closed on drop.
struct OwnedEvent(HANDLE);

impl OwnedEvent {
    fn new() -> Result<Self, DeviceError> {
        unsafe {
            CreateEventW(None, false, false, PCWSTR::null())
                .map(Self)
                .map_err(failed("CreateEventW"))
        }
    }

    fn raw(&self) -> isize {
        self.0 .0 as isize
    }
}

impl Drop for OwnedEvent {
    fn drop(&mut self) {
        unsafe {
            let _ = CloseHandle(self.0);
        }
    }
}

/// Forwards a device's ready event to a session [`Signal`] from a helper
/// thread, until dropped.
struct EventBridge {
    ready: OwnedEvent,
    quit: OwnedEvent,
    worker: Option<thread::JoinHandle<()>>,
}

impl EventBridge {
    fn start(signal: Signal) -> Result<Self, DeviceError> {
        let ready = OwnedEvent::new()?;
        let quit = OwnedEvent::new()?;
        let (ready_raw, quit_raw) = (ready.raw(), quit.raw());

        let worker = thread::Builder::new()
            .name("wasapi-event-bridge".into())
            .spawn(move || {
                let handles = [HANDLE(ready_raw as *mut c_void), HANDLE(quit_raw as *mut c_void)];
                loop {
                    let woke = unsafe { WaitForMultipleObjects(&handles, false, INFINITE) };
                    if woke != WAIT_OBJECT_0 {
                        break;
                    }
                    signal.set();
                }
            })
            .map_err(|e| DeviceError::Other(format!("failed to spawn event bridge: {}", e)))?;

        Ok(Self {
            ready,
            quit,
            worker: Some(worker),
        })
    }

    fn handle(&self) -> HANDLE {
        self.ready.0
    }
}

impl Drop for EventBridge {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = SetEvent(self.quit.0) {
                log::warn!("failed to stop event bridge: {}", e);
                return;
            }
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
