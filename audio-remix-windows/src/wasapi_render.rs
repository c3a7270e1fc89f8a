//! WASAPI render endpoint.

use std::ffi::c_void;
use std::time::Duration;

use windows::Win32::Foundation::{S_FALSE, S_OK};
use windows::Win32::Media::Audio::*;
use windows::Win32::System::Com::{CoTaskMemFree, CLSCTX_ALL};

use audio_remix_core::{AudioFormat, DeviceError, Endpoint, FormatSupport, RenderEndpoint};

use crate::com::{failed, init_mta, ComGuard};
use crate::device_enumerator::DeviceEnumerator;
use crate::wave_format::WaveFormat;

/// Render side of a session, backed by `IAudioRenderClient`.
///
/// The audio client is activated lazily on the first COM call, which the
/// session makes from its own thread. The endpoint joins the multithreaded
/// apartment there itself, so its interfaces never outlive its own
/// apartment reference whatever order the endpoints drop in.
pub struct WasapiRender {
    device: IMMDevice,
    name: String,
    client: Option<IAudioClient>,
    render: Option<IAudioRenderClient>,
    /// The device's own suggestion from the last `Closest` answer, kept so the
    /// stream opens with the speaker mask the device asked for.
    closest: Option<WaveFormat>,
    block_align: usize,
    buffer_frames: u32,
    pending: Option<(*mut u8, usize)>,
    // Dropped last: COM objects above must be released inside the apartment.
    com: Option<ComGuard>,
}

// SAFETY: see `WasapiCapture`; all COM calls happen on the session thread.
unsafe impl Send for WasapiRender {}

impl WasapiRender {
    pub fn new(device: IMMDevice) -> Self {
        let name = DeviceEnumerator::friendly_name(&device).unwrap_or_else(|| "unnamed device".into());
        Self {
            device,
            name,
            client: None,
            render: None,
            closest: None,
            block_align: 0,
            buffer_frames: 0,
            pending: None,
            com: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn client(&mut self) -> Result<&IAudioClient, DeviceError> {
        if self.client.is_none() {
            if self.com.is_none() {
                self.com = Some(init_mta()?);
            }
            let client: IAudioClient = unsafe {
                self.device
                    .Activate(CLSCTX_ALL, None)
                    .map_err(failed("IMMDevice::Activate (render)"))?
            };
            self.client = Some(client);
        }
        self.client.as_ref().ok_or(DeviceError::NotOpen)
    }

    fn render_client(&self) -> Result<&IAudioRenderClient, DeviceError> {
        self.render.as_ref().ok_or(DeviceError::NotOpen)
    }

    fn wave_for(&self, format: &AudioFormat) -> WaveFormat {
        self.closest
            .filter(|wave| wave.to_audio_format().is_ok_and(|f| f == *format))
            .unwrap_or_else(|| WaveFormat::from_audio_format(format))
    }
}

impl Endpoint for WasapiRender {
    fn start(&mut self) -> Result<(), DeviceError> {
        unsafe { self.client()?.Start().map_err(failed("IAudioClient::Start (render)")) }
    }

    fn stop(&mut self) -> Result<(), DeviceError> {
        unsafe { self.client()?.Stop().map_err(failed("IAudioClient::Stop (render)")) }
    }
}

impl RenderEndpoint for WasapiRender {
    fn check_support(&mut self, candidate: &AudioFormat) -> Result<FormatSupport, DeviceError> {
        let wave = WaveFormat::from_audio_format(candidate);
        let mut closest: *mut WAVEFORMATEX = std::ptr::null_mut();

        let hr = unsafe {
            self.client()?.IsFormatSupported(
                AUDCLNT_SHAREMODE_SHARED,
                wave.as_ptr(),
                Some(&mut closest as *mut *mut WAVEFORMATEX),
            )
        };

        let suggestion = if closest.is_null() {
            None
        } else {
            let copied = unsafe { WaveFormat::from_ptr(closest) };
            unsafe { CoTaskMemFree(Some(closest as *const c_void)) };
            Some(copied?)
        };

        if hr == S_OK {
            Ok(FormatSupport::Exact)
        } else if hr == S_FALSE {
            match suggestion {
                Some(wave) => {
                    let format = wave.to_audio_format()?;
                    self.closest = Some(wave);
                    Ok(FormatSupport::Closest(format))
                }
                None => Ok(FormatSupport::Unsupported),
            }
        } else if hr == AUDCLNT_E_UNSUPPORTED_FORMAT {
            Ok(FormatSupport::Unsupported)
        } else {
            log::error!("IAudioClient::IsFormatSupported failed: {}", hr.message());
            Err(DeviceError::call("IAudioClient::IsFormatSupported", hr.0 as u32))
        }
    }

    fn initialize(&mut self, format: &AudioFormat, buffer: Duration) -> Result<(), DeviceError> {
        let wave = self.wave_for(format);
        let buffer_hns = (buffer.as_nanos() / 100) as i64;

        let client = self.client()?.clone();
        unsafe {
            client
                .Initialize(AUDCLNT_SHAREMODE_SHARED, 0, buffer_hns, 0, wave.as_ptr(), None)
                .map_err(failed("IAudioClient::Initialize (render)"))?;
            self.buffer_frames = client.GetBufferSize().map_err(failed("IAudioClient::GetBufferSize"))?;
            self.render = Some(client.GetService().map_err(failed("IAudioClient::GetService (render)"))?);
        }
        self.block_align = format.normalized().block_size();

        log::debug!(
            "initialized {} for {} with {} buffer frames",
            self.name,
            format,
            self.buffer_frames
        );
        Ok(())
    }

    fn buffer_frames(&self) -> u32 {
        self.buffer_frames
    }

    fn acquire(&mut self, frames: u32) -> Result<(), DeviceError> {
        let data = unsafe {
            match self.render_client()?.GetBuffer(frames) {
                Ok(data) => data,
                Err(e) if e.code() == AUDCLNT_E_BUFFER_TOO_LARGE => return Err(DeviceError::BufferTooLarge),
                Err(e) => return Err(failed("IAudioRenderClient::GetBuffer")(e)),
            }
        };
        self.pending = Some((data, frames as usize * self.block_align));
        Ok(())
    }

    fn data_mut(&mut self) -> &mut [u8] {
        match self.pending {
            // SAFETY: the span stays writable until ReleaseBuffer.
            Some((data, len)) if !data.is_null() => unsafe { std::slice::from_raw_parts_mut(data, len) },
            _ => &mut [],
        }
    }

    fn release(&mut self, frames: u32, silent: bool) -> Result<(), DeviceError> {
        self.pending = None;
        let flags = if silent { AUDCLNT_BUFFERFLAGS_SILENT.0 as u32 } else { 0 };
        unsafe {
            self.render_client()?
                .ReleaseBuffer(frames, flags)
                .map_err(failed("IAudioRenderClient::ReleaseBuffer"))
        }
    }
}
