//! Command-line surface of the `audio-remix` binary.

use std::path::PathBuf;

use clap::Parser;

use audio_remix_core::{CaptureSourceKind, ChannelEdit, SessionConfig};

use crate::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "audio-remix",
    version,
    about = "Stream one audio endpoint into another, remixing channels on the way"
)]
pub struct Args {
    /// List the names of all active render and capture endpoints, then exit
    #[arg(long)]
    pub list_devices: bool,

    /// Endpoint to capture from (default: the default capture endpoint)
    #[arg(long, value_name = "NAME")]
    pub in_device: Option<String>,

    /// Endpoint to render to (default: the default render endpoint)
    #[arg(long, value_name = "NAME")]
    pub out_device: Option<String>,

    /// Render buffer size in milliseconds
    #[arg(long, value_name = "MS")]
    pub buffer_size: Option<u32>,

    /// Capture what a render endpoint is playing instead of a capture endpoint
    #[arg(long)]
    pub capture_renderer: bool,

    /// Copy front left/right into the rear and side channels when up-mixing
    #[arg(long)]
    pub duplicate_channels: bool,

    /// Treat a mono stream as stereo at half the sample rate
    #[arg(long)]
    pub force_mono_to_stereo: bool,

    /// Delay the stream by one frame to fix a one-sample channel skew
    #[arg(long)]
    pub skip_first_sample: bool,

    /// Silence the left channel
    #[arg(long)]
    pub zero_left: bool,

    /// Silence the right channel
    #[arg(long)]
    pub zero_right: bool,

    /// Swap left and right
    #[arg(long, conflicts_with_all = ["copy_to_right", "copy_to_left"])]
    pub swap_channels: bool,

    /// Copy left over right
    #[arg(long, conflicts_with = "copy_to_left")]
    pub copy_to_right: bool,

    /// Copy right over left
    #[arg(long)]
    pub copy_to_left: bool,

    /// JSON session config to start from; flags given here take precedence
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Print the final session report as JSON on stdout
    #[arg(long)]
    pub json_report: bool,
}

impl Args {
    /// Builds the session config from `--config` (if any) plus the flags.
    pub fn session_config(&self) -> Result<SessionConfig, AppError> {
        let base = match &self.config {
            Some(path) => {
                let json = std::fs::read_to_string(path)?;
                SessionConfig::from_json(&json).map_err(AppError::Config)?
            }
            None => SessionConfig::default(),
        };
        let config = self.apply(base);
        config.validate().map_err(AppError::Config)?;
        Ok(config)
    }

    fn apply(&self, mut config: SessionConfig) -> SessionConfig {
        if self.capture_renderer {
            config.source_kind = CaptureSourceKind::RenderLoopback;
        }
        if let Some(ms) = self.buffer_size {
            config.buffer_ms = ms;
        }

        let policy = &mut config.policy;
        policy.duplicate_channels |= self.duplicate_channels;
        policy.force_mono_to_stereo |= self.force_mono_to_stereo;
        policy.skip_first_sample |= self.skip_first_sample;

        let preprocess = &mut config.preprocess;
        preprocess.zero_left |= self.zero_left;
        preprocess.zero_right |= self.zero_right;
        if let Some(edit) = self.edit() {
            preprocess.edit = edit;
        }
        config
    }

    fn edit(&self) -> Option<ChannelEdit> {
        if self.swap_channels {
            Some(ChannelEdit::Swap)
        } else if self.copy_to_right {
            Some(ChannelEdit::CopyToRight)
        } else if self.copy_to_left {
            Some(ChannelEdit::CopyToLeft)
        } else {
            None
        }
    }
}
