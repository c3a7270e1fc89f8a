//! Windows audio endpoint enumeration via the MMDevice API.
//!
//! Wraps `IMMDeviceEnumerator` to list active render and capture endpoints
//! with their friendly names and to resolve the endpoint a session streams
//! from or to.

use windows::Win32::Devices::FunctionDiscovery::PKEY_Device_FriendlyName;
use windows::Win32::Media::Audio::*;
use windows::Win32::System::Com::StructuredStorage::{PropVariantClear, PROPVARIANT};
use windows::Win32::System::Com::*;
use windows::Win32::System::Variant::VT_LPWSTR;

use audio_remix_core::DeviceError;

use crate::com::failed;
use crate::device_selection::{select_unique, Direction};

/// An active endpoint as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub id: String,
    pub name: String,
    pub direction: Direction,
    pub is_default: bool,
}

/// Audio endpoint enumerator using the Windows MMDevice API.
pub struct DeviceEnumerator {
    enumerator: IMMDeviceEnumerator,
}

impl DeviceEnumerator {
    /// Requires COM to be initialized on the calling thread.
    pub fn new() -> Result<Self, DeviceError> {
        unsafe {
            let enumerator: IMMDeviceEnumerator = CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL)
                .map_err(failed("CoCreateInstance(MMDeviceEnumerator)"))?;
            Ok(Self { enumerator })
        }
    }

    /// Lists active endpoints in one direction.
    pub fn list(&self, direction: Direction) -> Result<Vec<DeviceInfo>, DeviceError> {
        let default_id = self.default_device(direction).ok().and_then(|d| Self::device_id(&d));

        Ok(self
            .active_devices(direction)?
            .into_iter()
            .enumerate()
            .filter_map(|(i, device)| {
                let id = Self::device_id(&device)?;
                let name = Self::friendly_name(&device).unwrap_or_else(|| format!("Device {}", i));
                Some(DeviceInfo {
                    is_default: default_id.as_deref() == Some(id.as_str()),
                    id,
                    name,
                    direction,
                })
            })
            .collect())
    }

    /// The console-role default endpoint.
    pub fn default_device(&self, direction: Direction) -> Result<IMMDevice, DeviceError> {
        unsafe {
            self.enumerator
                .GetDefaultAudioEndpoint(data_flow(direction), eConsole)
                .map_err(|_| DeviceError::Unavailable(format!("no default {} endpoint", direction)))
        }
    }

    /// Finds the one active endpoint named `name`, ignoring case.
    pub fn find_by_name(&self, name: &str, direction: Direction) -> Result<IMMDevice, DeviceError> {
        let named = self
            .active_devices(direction)?
            .into_iter()
            .filter_map(|device| Self::friendly_name(&device).map(|n| (n, device)));
        select_unique(named, name)
    }

    /// Reads `PKEY_Device_FriendlyName`.
    pub fn friendly_name(device: &IMMDevice) -> Option<String> {
        unsafe {
            let store = device.OpenPropertyStore(STGM_READ).ok()?;

            let mut prop_variant = std::mem::zeroed::<PROPVARIANT>();
            store.GetValue(&PKEY_Device_FriendlyName, &mut prop_variant).ok()?;

            let name = if prop_variant.Anonymous.Anonymous.vt == VT_LPWSTR {
                let pwsz = prop_variant.Anonymous.Anonymous.Anonymous.pwszVal;
                if pwsz.is_null() {
                    None
                } else {
                    pwsz.to_string().ok()
                }
            } else {
                None
            };

            PropVariantClear(&mut prop_variant).ok();
            name
        }
    }

    fn active_devices(&self, direction: Direction) -> Result<Vec<IMMDevice>, DeviceError> {
        unsafe {
            let collection = self
                .enumerator
                .EnumAudioEndpoints(data_flow(direction), DEVICE_STATE_ACTIVE)
                .map_err(failed("IMMDeviceEnumerator::EnumAudioEndpoints"))?;
            let count = collection.GetCount().map_err(failed("IMMDeviceCollection::GetCount"))?;

            Ok((0..count).filter_map(|i| collection.Item(i).ok()).collect())
        }
    }

    fn device_id(device: &IMMDevice) -> Option<String> {
        unsafe {
            let id = device.GetId().ok()?;
            let text = id.to_string().ok();
            CoTaskMemFree(Some(id.0 as *const _));
            text
        }
    }
}

fn data_flow(direction: Direction) -> EDataFlow {
    match direction {
        Direction::Render => eRender,
        Direction::Capture => eCapture,
    }
}
