use crate::models::error::RemixError;
use crate::models::format::AudioFormat;
use crate::models::state::SchedulerState;

/// Structured notifications raised by the scheduler.
///
/// The scheduler never formats log text; observers decide what to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    FormatsNegotiated {
        source: AudioFormat,
        sink: AudioFormat,
        channels_differ: bool,
    },
    /// Capture reported a data discontinuity. Expected on the first packet
    /// after start, suspicious afterwards; never fatal.
    Discontinuity { first_packet: bool, pass: u64, frames: u64 },
    /// The render buffer had no room; the scheduler will retry.
    RenderBufferFull { pass: u64, frames: u64, attempt: u64 },
    StopReceived { passes: u64, frames: u64 },
}

/// Event sink for a remix session.
///
/// All methods are called from the streaming thread and must not block.
pub trait SessionObserver: Send + Sync {
    fn on_state_changed(&self, state: &SchedulerState);

    fn on_event(&self, event: &SessionEvent);

    fn on_error(&self, error: &RemixError);
}

/// Observer that forwards everything to the `log` facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogObserver;

impl SessionObserver for LogObserver {
    fn on_state_changed(&self, state: &SchedulerState) {
        log::debug!("scheduler state: {}", state.name());
    }

    fn on_event(&self, event: &SessionEvent) {
        match event {
            SessionEvent::FormatsNegotiated {
                source,
                sink,
                channels_differ,
            } => {
                log::info!(
                    "streaming {} -> {}{}",
                    source,
                    sink,
                    if *channels_differ { " (remixing channels)" } else { "" }
                );
            }
            SessionEvent::Discontinuity {
                first_packet: true, ..
            } => {
                log::debug!("discontinuity on first packet after start");
            }
            SessionEvent::Discontinuity { pass, frames, .. } => {
                log::info!(
                    "Probably spurious glitch reported on pass {} after {} frames",
                    pass,
                    frames
                );
            }
            SessionEvent::RenderBufferFull { pass, frames, attempt } => {
                log::warn!(
                    "render buffer overflow on pass {} after {} frames (attempt {})",
                    pass,
                    frames,
                    attempt
                );
            }
            SessionEvent::StopReceived { passes, frames } => {
                log::info!("Received stop event after {} passes and {} frames", passes, frames);
            }
        }
    }

    fn on_error(&self, error: &RemixError) {
        log::error!("remix session failed: {}", error);
    }
}
