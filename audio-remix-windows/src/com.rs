//! COM apartment setup and HRESULT mapping shared by the WASAPI endpoints.

use windows::Win32::System::Com::{CoInitializeEx, CoUninitialize, COINIT_MULTITHREADED};

use audio_remix_core::DeviceError;

/// Keeps the calling thread in the multithreaded apartment until dropped.
///
/// Not `Send`: it must be dropped on the thread that created it.
pub struct ComGuard {
    _not_send: std::marker::PhantomData<*const ()>,
}

/// Joins the multithreaded apartment on the calling thread.
pub fn init_mta() -> Result<ComGuard, DeviceError> {
    unsafe {
        CoInitializeEx(None, COINIT_MULTITHREADED)
            .ok()
            .map_err(failed("CoInitializeEx"))?;
    }
    Ok(ComGuard {
        _not_send: std::marker::PhantomData,
    })
}

impl Drop for ComGuard {
    fn drop(&mut self) {
        unsafe {
            CoUninitialize();
        }
    }
}

/// Maps a failed COM call onto [`DeviceError::Call`], logging it.
pub fn failed(call: &'static str) -> impl FnOnce(windows::core::Error) -> DeviceError {
    move |e| {
        log::error!("{} failed: {}", call, e);
        DeviceError::call(call, e.code().0 as u32)
    }
}
