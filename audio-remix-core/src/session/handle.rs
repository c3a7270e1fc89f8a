use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;

use crate::models::error::{RemixError, SessionFailure};
use crate::models::report::SessionReport;
use crate::models::state::SchedulerState;
use crate::session::scheduler::CaptureRenderLoop;
use crate::session::signal::{Signal, SignalSet};
use crate::traits::endpoint::{CaptureEndpoint, RenderEndpoint};

type WorkerResult = Result<SessionReport, SessionFailure>;

/// Controller side of a session running on its own thread.
///
/// The controller blocks on its own signal set: the worker raises `started`
/// once streaming and `finished` when `run` returns, for any reason.
/// `finished` stays raised once set.
pub struct SessionHandle {
    controller: SignalSet,
    started: Signal,
    finished: Signal,
    stop: Signal,
    state: Arc<Mutex<SchedulerState>>,
    worker: Option<thread::JoinHandle<WorkerResult>>,
}

impl SessionHandle {
    pub fn spawn<C, R>(mut session: CaptureRenderLoop<C, R>) -> Result<Self, RemixError>
    where
        C: CaptureEndpoint + Send + 'static,
        R: RenderEndpoint + Send + 'static,
    {
        let controller = SignalSet::new();
        let started = controller.signal()?;
        let finished = controller.signal()?;
        let stop = session.stop_signal();
        let state = session.shared_state();

        let worker_started = started.clone();
        let worker_finished = finished.clone();
        let worker = thread::Builder::new()
            .name("audio-remix".into())
            .spawn(move || {
                let result = session.run(&worker_started);
                worker_finished.set();
                result
            })
            .map_err(|e| RemixError::SchedulerError(format!("failed to spawn session thread: {}", e)))?;

        Ok(Self {
            controller,
            started,
            finished,
            stop,
            state,
            worker: Some(worker),
        })
    }

    /// Blocks until streaming has started (`true`) or the worker gave up
    /// before starting (`false`).
    pub fn wait_started(&self) -> Result<bool, RemixError> {
        match self.controller.wait_any(&[&self.started, &self.finished])? {
            0 => Ok(true),
            _ => {
                self.finished.set();
                Ok(false)
            }
        }
    }

    /// Allocates another signal the controller can wait on alongside the
    /// worker, e.g. a console "quit" request.
    pub fn new_signal(&self) -> Result<Signal, RemixError> {
        self.controller.signal()
    }

    /// Blocks until the worker finishes (`true`) or `other` is raised
    /// (`false`). A finished worker takes priority.
    pub fn wait_finished_or(&self, other: &Signal) -> Result<bool, RemixError> {
        match self.controller.wait_any(&[&self.finished, other])? {
            0 => {
                self.finished.set();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished.is_set()
    }

    pub fn state(&self) -> SchedulerState {
        self.state.lock().clone()
    }

    /// Requests a stop and waits for the worker's result.
    pub fn stop(mut self) -> WorkerResult {
        self.stop.set();
        self.join()
    }

    fn join(&mut self) -> WorkerResult {
        let Some(worker) = self.worker.take() else {
            return Err(SessionFailure::new(
                RemixError::SchedulerError("session already joined".into()),
                SessionReport::default(),
            ));
        };
        worker.join().unwrap_or_else(|_| {
            Err(SessionFailure::new(
                RemixError::SchedulerError("session thread panicked".into()),
                SessionReport::default(),
            ))
        })
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        if self.worker.is_some() {
            self.stop.set();
            if let Err(failure) = self.join() {
                log::warn!("session ended with error during drop: {}", failure);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::mock::{MockCapture, MockRender};
    use crate::models::config::SessionConfig;
    use crate::models::format::{AudioFormat, SampleEncoding};
    use crate::traits::endpoint::{CaptureFlags, FormatSupport};
    use crate::traits::session_observer::LogObserver;

    fn stereo() -> AudioFormat {
        AudioFormat::new(2, 16, 48_000, SampleEncoding::Pcm)
    }

    fn spawn(capture: MockCapture, render: MockRender) -> SessionHandle {
        let session =
            CaptureRenderLoop::new(capture, render, SessionConfig::default(), Arc::new(LogObserver)).unwrap();
        SessionHandle::spawn(session).unwrap()
    }

    #[test]
    fn start_then_stop() {
        let capture = MockCapture::new(stereo());
        let feeder = capture.feeder();
        let handle = spawn(capture, MockRender::new());

        assert!(handle.wait_started().unwrap());
        feeder.push(vec![0; 8], CaptureFlags::NONE);
        while feeder.queued_packets() > 0 {
            thread::sleep(Duration::from_millis(1));
        }

        let report = handle.stop().unwrap();
        assert_eq!(report.frames, 2);
        assert_eq!(feeder.stats().stops, 1);
    }

    #[test]
    fn failure_before_start_is_reported() {
        let render = MockRender::new().with_support(FormatSupport::Unsupported);
        let handle = spawn(MockCapture::new(stereo()), render);

        assert!(!handle.wait_started().unwrap());
        assert!(handle.is_finished());
        assert!(matches!(handle.state(), SchedulerState::Failed(_)));

        let failure = handle.stop().unwrap_err();
        assert!(matches!(failure.error, RemixError::UnsupportedOutputFormat(_)));
    }

    #[test]
    fn worker_exit_wakes_controller() {
        let capture = MockCapture::new(stereo());
        let feeder = capture.feeder();
        let handle = spawn(capture, MockRender::new());
        let quit = handle.new_signal().unwrap();

        assert!(handle.wait_started().unwrap());
        feeder.push(vec![0; 4], CaptureFlags::SILENT);

        assert!(handle.wait_finished_or(&quit).unwrap());
        assert!(handle.stop().is_err());
    }

    #[test]
    fn controller_signal_wakes_controller() {
        let handle = spawn(MockCapture::new(stereo()), MockRender::new());
        let quit = handle.new_signal().unwrap();
        assert!(handle.wait_started().unwrap());

        quit.set();

        assert!(!handle.wait_finished_or(&quit).unwrap());
        assert!(handle.state().is_running());
        assert!(handle.stop().is_ok());
    }

    #[test]
    fn drop_stops_the_worker() {
        let capture = MockCapture::new(stereo());
        let feeder = capture.feeder();
        let handle = spawn(capture, MockRender::new());
        assert!(handle.wait_started().unwrap());

        drop(handle);

        assert_eq!(feeder.stats().stops, 1);
    }
}
