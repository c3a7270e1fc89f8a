use thiserror::Error;

use audio_remix_core::{DeviceError, RemixError, SessionFailure};

/// Failures surfaced by the `audio-remix` front end.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Remix(#[from] RemixError),

    #[error("session failed: {0}")]
    Session(#[from] SessionFailure),

    #[error("the session thread terminated early after {frames} frames")]
    TerminatedEarly { frames: u64 },

    #[error("the session thread exited before streaming started")]
    NeverStarted,

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("report serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}
