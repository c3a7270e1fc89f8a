//! # audio-remix-windows
//!
//! Windows WASAPI backend and command-line front end for audio-remix.
//!
//! Provides:
//! - `WasapiCapture`: capture endpoint, or a render endpoint's loopback feed
//! - `WasapiRender`: render endpoint with format suggestion and backpressure
//! - `DeviceEnumerator`: endpoint listing and lookup via MMDevice API
//! - `cli`: command-line flags mapped onto a `SessionConfig`
//!
//! ## Platform Requirements
//! - Windows 10 or later
//! - Visual Studio Build Tools 2022 + Windows SDK for linking
//!
//! ## Usage
//! ```ignore
//! use audio_remix_windows::{DeviceEnumerator, Direction, WasapiCapture, WasapiRender};
//! use audio_remix_core::{CaptureRenderLoop, LogObserver, SessionConfig, SessionHandle};
//!
//! let enumerator = DeviceEnumerator::new()?;
//! let capture = WasapiCapture::new(enumerator.default_device(Direction::Capture)?, false);
//! let render = WasapiRender::new(enumerator.find_by_name("Headphones", Direction::Render)?);
//! let session = CaptureRenderLoop::new(capture, render, SessionConfig::default(), Arc::new(LogObserver))?;
//! let handle = SessionHandle::spawn(session)?;
//! ```

pub mod cli;
pub mod device_selection;
pub mod error;

#[cfg(target_os = "windows")]
pub mod app;
#[cfg(target_os = "windows")]
mod com;
#[cfg(target_os = "windows")]
pub mod device_enumerator;
#[cfg(target_os = "windows")]
pub mod wasapi_capture;
#[cfg(target_os = "windows")]
pub mod wasapi_render;
#[cfg(target_os = "windows")]
mod wave_format;

pub use device_selection::Direction;
pub use error::AppError;

#[cfg(target_os = "windows")]
pub use device_enumerator::DeviceEnumerator;
#[cfg(target_os = "windows")]
pub use wasapi_capture::WasapiCapture;
#[cfg(target_os = "windows")]
pub use wasapi_render::WasapiRender;
