//! One-shot, auto-resetting wake signals with multi-way waits.
//!
//! A [`SignalSet`] hands out up to 32 [`Signal`]s sharing one lock and
//! condition variable, so a thread can block until any of several signals is
//! set. When more than one is set, the signal listed first in the wait wins.
//! Waking consumes only the signal that won; the others stay set.

use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::models::error::RemixError;

const MAX_SIGNALS: u32 = 32;

#[derive(Debug, Default)]
struct HubState {
    pending: u32,
    allocated: u32,
}

#[derive(Debug, Default)]
struct Hub {
    state: Mutex<HubState>,
    cond: Condvar,
}

/// Settable flag belonging to a [`SignalSet`]. Cheap to clone; clones refer
/// to the same flag.
#[derive(Clone)]
pub struct Signal {
    hub: Arc<Hub>,
    mask: u32,
}

impl Signal {
    /// Sets the flag and wakes waiters. Setting an already-set flag is a no-op.
    pub fn set(&self) {
        let mut state = self.hub.state.lock();
        state.pending |= self.mask;
        self.hub.cond.notify_all();
    }

    pub fn is_set(&self) -> bool {
        self.hub.state.lock().pending & self.mask != 0
    }

    fn belongs_to(&self, hub: &Arc<Hub>) -> bool {
        Arc::ptr_eq(&self.hub, hub)
    }
}

impl std::fmt::Debug for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("bit", &self.mask.trailing_zeros())
            .field("set", &self.is_set())
            .finish()
    }
}

/// Group of signals that can be waited on together.
#[derive(Debug, Clone, Default)]
pub struct SignalSet {
    hub: Arc<Hub>,
}

impl SignalSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a new, unset signal.
    pub fn signal(&self) -> Result<Signal, RemixError> {
        let mut state = self.hub.state.lock();
        if state.allocated >= MAX_SIGNALS {
            return Err(RemixError::SchedulerError(format!(
                "signal set is limited to {} signals",
                MAX_SIGNALS
            )));
        }
        let mask = 1 << state.allocated;
        state.allocated += 1;
        Ok(Signal {
            hub: Arc::clone(&self.hub),
            mask,
        })
    }

    /// Blocks until one of `signals` is set, clears it, and returns its
    /// position in `signals`. Earlier positions take priority.
    ///
    /// There is no timeout: callers must include a signal that is
    /// guaranteed to fire eventually.
    pub fn wait_any(&self, signals: &[&Signal]) -> Result<usize, RemixError> {
        if signals.is_empty() {
            return Err(RemixError::SchedulerError("wait on an empty signal list".into()));
        }
        if let Some(foreign) = signals.iter().position(|s| !s.belongs_to(&self.hub)) {
            return Err(RemixError::SchedulerError(format!(
                "signal {} belongs to a different set",
                foreign
            )));
        }

        let mut state = self.hub.state.lock();
        loop {
            if let Some(index) = signals.iter().position(|s| state.pending & s.mask != 0) {
                state.pending &= !signals[index].mask;
                return Ok(index);
            }
            self.hub.cond.wait(&mut state);
        }
    }

    /// Clears `signal` without waiting. Returns whether it was set.
    pub fn take(&self, signal: &Signal) -> bool {
        let mut state = self.hub.state.lock();
        let was_set = state.pending & signal.mask != 0;
        state.pending &= !signal.mask;
        was_set
    }
}
