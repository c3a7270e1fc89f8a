use super::error::RemixError;

/// Scheduler state machine.
///
/// State transitions:
/// ```text
/// idle → started → waiting ⇄ draining
///                     ↓
///                  stopping → stopped
///
/// any non-terminal state → failed
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Started,
    WaitingForSignal,
    Draining { pass: u64 },
    Stopping,
    Stopped { frames: u64 },
    Failed(RemixError),
}

impl SchedulerState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_running(&self) -> bool {
        matches!(
            self,
            Self::Started | Self::WaitingForSignal | Self::Draining { .. }
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped { .. } | Self::Failed(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Started => "started",
            Self::WaitingForSignal => "waiting",
            Self::Draining { .. } => "draining",
            Self::Stopping => "stopping",
            Self::Stopped { .. } => "stopped",
            Self::Failed(_) => "failed",
        }
    }
}
