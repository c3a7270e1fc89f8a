use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How the remixer fills channels the source cannot supply, and which
/// stream-level transforms are active. Fixed for the session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemixPolicy {
    /// Replicate front L/R into rear and side slots on up-mix.
    pub duplicate_channels: bool,

    /// Treat pairs of consecutive mono samples as one stereo frame at half
    /// the sample rate. No up-mixing math is involved.
    pub force_mono_to_stereo: bool,

    /// Delay the stream by one source frame to cancel a one-sample capture skew.
    pub skip_first_sample: bool,
}

/// Edit applied between the two channels of a pair.
///
/// Swapping and the two copy directions cannot be combined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelEdit {
    #[default]
    None,
    Swap,
    CopyToRight,
    CopyToLeft,
}

/// Per-frame channel editing applied before remixing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreProcessConfig {
    pub zero_left: bool,
    pub zero_right: bool,
    pub edit: ChannelEdit,
}

impl PreProcessConfig {
    pub fn is_required(&self) -> bool {
        self.zero_left || self.zero_right || self.edit != ChannelEdit::None
    }
}

/// Which kind of endpoint feeds the session.
///
/// Render-loopback sources do not signal readiness reliably, so they are
/// woken by a periodic timer instead of the device event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureSourceKind {
    #[default]
    CaptureDevice,
    RenderLoopback,
}

/// Configuration for one remix session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub source_kind: CaptureSourceKind,

    pub policy: RemixPolicy,

    pub preprocess: PreProcessConfig,

    /// Render buffer length in milliseconds (default: 64).
    pub buffer_ms: u32,

    /// Pause between render acquisition attempts while the sink is full
    /// (default: 1 ms).
    pub overflow_retry_delay_ms: u64,
}

impl SessionConfig {
    pub const DEFAULT_BUFFER_MS: u32 = 64;

    pub fn validate(&self) -> Result<(), String> {
        if self.buffer_ms == 0 {
            return Err("buffer size must be positive".into());
        }
        if self.buffer_ms > 10_000 {
            return Err(format!("buffer size too large: {} ms", self.buffer_ms));
        }
        if self.overflow_retry_delay_ms > 1_000 {
            return Err(format!(
                "overflow retry delay too large: {} ms",
                self.overflow_retry_delay_ms
            ));
        }
        Ok(())
    }

    pub fn buffer_duration(&self) -> Duration {
        Duration::from_millis(u64::from(self.buffer_ms))
    }

    pub fn overflow_retry_delay(&self) -> Duration {
        Duration::from_millis(self.overflow_retry_delay_ms)
    }

    pub fn from_json(json: &str) -> Result<Self, String> {
        let config: Self = serde_json::from_str(json).map_err(|e| format!("invalid config: {}", e))?;
        config.validate()?;
        Ok(config)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            source_kind: CaptureSourceKind::CaptureDevice,
            policy: RemixPolicy::default(),
            preprocess: PreProcessConfig::default(),
            buffer_ms: Self::DEFAULT_BUFFER_MS,
            overflow_retry_delay_ms: 1,
        }
    }
}
