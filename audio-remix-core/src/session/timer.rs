use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::models::error::RemixError;
use crate::session::signal::Signal;

#[derive(Default)]
struct Cancel {
    cancelled: Mutex<bool>,
    cond: Condvar,
}

/// Sets a signal at a fixed period until dropped.
///
/// Used to wake the scheduler for sources that cannot raise their own
/// data-ready event. Ticks are scheduled against absolute deadlines, so a
/// slow waiter does not make the timer drift.
pub struct PeriodicTimer {
    cancel: Arc<Cancel>,
    handle: Option<thread::JoinHandle<()>>,
    period: Duration,
}

impl PeriodicTimer {
    pub fn start(signal: Signal, period: Duration) -> Result<Self, RemixError> {
        if period.is_zero() {
            return Err(RemixError::SchedulerError("timer period must be positive".into()));
        }

        let cancel = Arc::new(Cancel::default());
        let thread_cancel = Arc::clone(&cancel);

        let handle = thread::Builder::new()
            .name("remix-timer".into())
            .spawn(move || {
                let mut deadline = Instant::now() + period;
                let mut cancelled = thread_cancel.cancelled.lock();
                loop {
                    if *cancelled {
                        break;
                    }
                    if thread_cancel.cond.wait_until(&mut cancelled, deadline).timed_out() {
                        if *cancelled {
                            break;
                        }
                        signal.set();
                        deadline += period;
                    }
                }
            })
            .map_err(|e| RemixError::SchedulerError(format!("failed to spawn timer thread: {}", e)))?;

        Ok(Self {
            cancel,
            handle: Some(handle),
            period,
        })
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}

impl Drop for PeriodicTimer {
    fn drop(&mut self) {
        {
            let mut cancelled = self.cancel.cancelled.lock();
            *cancelled = true;
            self.cancel.cond.notify_all();
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::signal::SignalSet;

    #[test]
    fn fires_repeatedly() {
        let set = SignalSet::new();
        let tick = set.signal().unwrap();
        let timer = PeriodicTimer::start(tick.clone(), Duration::from_millis(5)).unwrap();

        for _ in 0..3 {
            assert_eq!(set.wait_any(&[&tick]).unwrap(), 0);
        }
        assert_eq!(timer.period(), Duration::from_millis(5));
    }

    #[test]
    fn drop_stops_ticking() {
        let set = SignalSet::new();
        let tick = set.signal().unwrap();
        let timer = PeriodicTimer::start(tick.clone(), Duration::from_millis(5)).unwrap();
        set.wait_any(&[&tick]).unwrap();

        drop(timer);
        set.take(&tick);
        thread::sleep(Duration::from_millis(30));

        assert!(!tick.is_set());
    }

    #[test]
    fn drop_before_first_tick_returns_promptly() {
        let set = SignalSet::new();
        let timer = PeriodicTimer::start(set.signal().unwrap(), Duration::from_secs(60)).unwrap();
        let started = Instant::now();

        drop(timer);

        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn zero_period_rejected() {
        let set = SignalSet::new();
        assert!(PeriodicTimer::start(set.signal().unwrap(), Duration::ZERO).is_err());
    }
}
