//! # audio-remix-core
//!
//! Platform-agnostic core of a capture-to-render audio streaming pipeline.
//!
//! A capture endpoint (microphone, line-in, or a render device's loopback
//! feed) is streamed in real time to a render endpoint, with the channel
//! layout remixed on the way (mono→stereo, stereo→5.1/7.1, left/right
//! duplication, swap and zeroing, one-frame phase correction). Platform
//! backends implement the `CaptureEndpoint` and `RenderEndpoint` traits and
//! plug into the generic `CaptureRenderLoop`.
//!
//! ## Architecture
//!
//! ```text
//! audio-remix-core (this crate)
//! ├── traits/       ← CaptureEndpoint, RenderEndpoint, SessionObserver
//! ├── models/       ← AudioFormat, RemixPolicy, SessionConfig, RemixError, SchedulerState, SessionReport
//! ├── processing/   ← negotiator, remixer, pre-processor, phase aligner
//! ├── session/      ← CaptureRenderLoop, SessionHandle, signals, leases, periodic timer
//! └── mock          ← scripted endpoints for running without hardware
//! ```

pub mod mock;
pub mod models;
pub mod processing;
pub mod session;
pub mod traits;

// Re-export key types at crate root for convenience.
pub use models::config::{CaptureSourceKind, ChannelEdit, PreProcessConfig, RemixPolicy, SessionConfig};
pub use models::error::{DeviceError, RemixError, SessionFailure};
pub use models::format::{AudioFormat, SampleEncoding};
pub use models::report::SessionReport;
pub use models::state::SchedulerState;
pub use processing::negotiator::NegotiatedFormats;
pub use processing::phase_aligner::{AlignerState, PhaseAligner};
pub use session::handle::SessionHandle;
pub use session::scheduler::CaptureRenderLoop;
pub use session::signal::{Signal, SignalSet};
pub use traits::endpoint::{
    CaptureEndpoint, CaptureFlags, CaptureMode, CapturePacket, Endpoint, FormatSupport, PriorityToken, RenderEndpoint,
};
pub use traits::session_observer::{LogObserver, SessionEvent, SessionObserver};
