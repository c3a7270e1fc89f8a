use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use crate::models::config::{CaptureSourceKind, PreProcessConfig, SessionConfig};
use crate::models::error::{DeviceError, RemixError, SessionFailure};
use crate::models::report::SessionReport;
use crate::models::state::SchedulerState;
use crate::processing::negotiator::{self, NegotiatedFormats};
use crate::processing::phase_aligner::PhaseAligner;
use crate::processing::preprocess::preprocess_batch;
use crate::processing::remixer::remix;
use crate::session::lease::{CaptureLease, RenderLease, StartedStream};
use crate::session::signal::{Signal, SignalSet};
use crate::session::timer::PeriodicTimer;
use crate::traits::endpoint::{CaptureEndpoint, CaptureFlags, CaptureMode, RenderEndpoint};
use crate::traits::session_observer::{SessionEvent, SessionObserver};

/// Current scheduler state, shared with whoever wants to watch it.
#[derive(Clone)]
struct StateCell {
    state: Arc<Mutex<SchedulerState>>,
    observer: Arc<dyn SessionObserver>,
}

impl StateCell {
    fn set(&self, next: SchedulerState) {
        *self.state.lock() = next.clone();
        self.observer.on_state_changed(&next);
    }

    fn get(&self) -> SchedulerState {
        self.state.lock().clone()
    }
}

/// Streams one capture endpoint into one render endpoint until stopped.
///
/// The loop owns both endpoints. Everything it needs per run (negotiated
/// formats, the phase aligner, scratch space, counters) is built when
/// [`run`](Self::run) starts and dropped when it returns.
///
/// ```text
/// [Capture] → lease → [Pre-Processor] → [Phase Aligner] → [Remixer] → lease → [Render]
/// ```
pub struct CaptureRenderLoop<C: CaptureEndpoint, R: RenderEndpoint> {
    capture: C,
    render: R,
    config: SessionConfig,
    observer: Arc<dyn SessionObserver>,
    status: StateCell,
    signals: SignalSet,
    stop: Signal,
    data_ready: Signal,
}

impl<C: CaptureEndpoint, R: RenderEndpoint> CaptureRenderLoop<C, R> {
    pub fn new(
        capture: C,
        render: R,
        config: SessionConfig,
        observer: Arc<dyn SessionObserver>,
    ) -> Result<Self, RemixError> {
        config.validate().map_err(RemixError::ConfigurationFailed)?;

        // Stop is allocated first so it wins when both are pending.
        let signals = SignalSet::new();
        let stop = signals.signal()?;
        let data_ready = signals.signal()?;

        Ok(Self {
            capture,
            render,
            config,
            status: StateCell {
                state: Arc::new(Mutex::new(SchedulerState::Idle)),
                observer: Arc::clone(&observer),
            },
            observer,
            signals,
            stop,
            data_ready,
        })
    }

    /// Signal that ends the session at the next wait.
    pub fn stop_signal(&self) -> Signal {
        self.stop.clone()
    }

    pub fn state(&self) -> SchedulerState {
        self.status.get()
    }

    pub(crate) fn shared_state(&self) -> Arc<Mutex<SchedulerState>> {
        Arc::clone(&self.status.state)
    }

    /// Run the session on the calling thread until stop or failure.
    ///
    /// `started` is set once both streams are running. A loop runs at most
    /// once.
    pub fn run(&mut self, started: &Signal) -> Result<SessionReport, SessionFailure> {
        let mut report = SessionReport::begin();

        if !self.status.get().is_idle() {
            return Err(SessionFailure::new(
                RemixError::SchedulerError("session already ran".into()),
                report,
            ));
        }

        match self.stream(started, &mut report) {
            Ok(()) => {
                self.status.set(SchedulerState::Stopped { frames: report.frames });
                Ok(report)
            }
            Err(error) => {
                self.observer.on_error(&error);
                self.status.set(SchedulerState::Failed(error.clone()));
                Err(SessionFailure::new(error, report))
            }
        }
    }

    fn stream(&mut self, started: &Signal, report: &mut SessionReport) -> Result<(), RemixError> {
        let mode = match self.config.source_kind {
            CaptureSourceKind::CaptureDevice => CaptureMode::EventDriven(self.data_ready.clone()),
            CaptureSourceKind::RenderLoopback => CaptureMode::Polled,
        };
        let source = self.capture.open(mode)?;

        let formats = negotiator::negotiate(&source, &self.config.policy, &mut self.render)?;
        report.source_format = Some(formats.source);
        report.sink_format = Some(formats.sink);
        self.observer.on_event(&SessionEvent::FormatsNegotiated {
            source: formats.source,
            sink: formats.sink,
            channels_differ: formats.channels_differ,
        });

        self.render.initialize(&formats.sink, self.config.buffer_duration())?;

        // Loopback sources never raise data-ready themselves.
        let _timer = match self.config.source_kind {
            CaptureSourceKind::RenderLoopback => Some(PeriodicTimer::start(
                self.data_ready.clone(),
                self.capture.device_period() / 2,
            )?),
            CaptureSourceKind::CaptureDevice => None,
        };

        let _priority = self.capture.boost_priority()?;

        let mut pipeline = Pipeline::new(formats, &self.config, Arc::clone(&self.observer));

        let Self {
            capture,
            render,
            status,
            signals,
            stop,
            data_ready,
            observer,
            ..
        } = self;

        let mut capture = StartedStream::start(capture)?;
        prime(&mut *render)?;
        let mut render = StartedStream::start(render)?;

        status.set(SchedulerState::Started);
        started.set();

        let mut pass: u64 = 0;
        loop {
            status.set(SchedulerState::Draining { pass });
            pipeline.drain(&mut *capture, &mut *render, pass, report)?;

            status.set(SchedulerState::WaitingForSignal);
            match signals.wait_any(&[&*stop, &*data_ready])? {
                0 => {
                    observer.on_event(&SessionEvent::StopReceived {
                        passes: pass,
                        frames: report.frames,
                    });
                    break;
                }
                1 => {
                    pass += 1;
                    report.passes = pass;
                }
                other => {
                    return Err(RemixError::SchedulerError(format!(
                        "unexpected wait result {}",
                        other
                    )))
                }
            }
        }

        status.set(SchedulerState::Stopping);
        render.finish()?;
        capture.finish()?;
        Ok(())
    }
}

/// Fills the first half of the render buffer with silence so playback has
/// headroom before the first captured batch arrives.
fn prime<R: RenderEndpoint + ?Sized>(render: &mut R) -> Result<(), DeviceError> {
    let frames = render.buffer_frames() / 2;
    if frames == 0 {
        return Ok(());
    }
    RenderLease::acquire(render, frames)?.commit(true)
}

/// Per-run streaming state.
struct Pipeline {
    formats: NegotiatedFormats,
    duplicate_channels: bool,
    preprocess: Option<PreProcessConfig>,
    aligner: Option<PhaseAligner>,
    /// Source frames captured but not yet rendered: in forced mono→stereo a
    /// packet with an odd sample count leaves one behind for the next packet.
    holdover: Vec<u8>,
    joined: Vec<u8>,
    edit_scratch: Vec<u8>,
    align_scratch: Vec<u8>,
    retry_delay: Duration,
    first_packet: bool,
    observer: Arc<dyn SessionObserver>,
}

impl Pipeline {
    fn new(formats: NegotiatedFormats, config: &SessionConfig, observer: Arc<dyn SessionObserver>) -> Self {
        let preprocess = (config.preprocess.is_required() && formats.source.channels >= 2).then_some(config.preprocess);
        let aligner = config
            .policy
            .skip_first_sample
            .then(|| PhaseAligner::new(formats.source.block_size()));

        Self {
            formats,
            duplicate_channels: config.policy.duplicate_channels,
            preprocess,
            aligner,
            holdover: Vec::new(),
            joined: Vec::new(),
            edit_scratch: Vec::new(),
            align_scratch: Vec::new(),
            retry_delay: config.overflow_retry_delay(),
            first_packet: true,
            observer,
        }
    }

    /// Move every queued capture packet to the render endpoint.
    fn drain<C, R>(&mut self, capture: &mut C, render: &mut R, pass: u64, report: &mut SessionReport) -> Result<(), RemixError>
    where
        C: CaptureEndpoint + ?Sized,
        R: RenderEndpoint + ?Sized,
    {
        loop {
            let announced = capture.next_packet_size()?;
            if announced == 0 {
                return Ok(());
            }

            let batch = CaptureLease::acquire(&mut *capture)?;
            let packet = batch.packet();
            if packet.frames == 0 {
                return Err(RemixError::EmptyPacket {
                    pass,
                    frames: report.frames,
                });
            }
            if packet.frames != announced {
                return Err(RemixError::InconsistentPacketSize {
                    announced,
                    acquired: packet.frames,
                    pass,
                });
            }
            self.check_flags(packet.flags, pass, report)?;

            let source = self.formats.source;
            let data = batch.data();
            let captured = &data[..source.bytes_for(packet.frames as usize).min(data.len())];

            let held = self.holdover.len() / source.block_size().max(1);
            let frames = self.formats.usable_source_frames(held as u32 + packet.frames);
            if frames == 0 {
                self.holdover.extend_from_slice(captured);
                batch.commit()?;
                self.first_packet = false;
                continue;
            }
            let out_frames = self.formats.output_frames(frames);

            let observer = &self.observer;
            let retry_delay = self.retry_delay;
            let mut out = RenderLease::acquire_with_retry(&mut *render, out_frames, |attempt| {
                report.overflow_retries += 1;
                observer.on_event(&SessionEvent::RenderBufferFull {
                    pass,
                    frames: report.frames,
                    attempt,
                });
                thread::sleep(retry_delay);
                true
            })?;

            self.transform(captured, frames as usize, out.data_mut(), out_frames as usize);

            out.commit(false)?;
            batch.commit()?;

            report.frames = report.frames.wrapping_add(u64::from(frames));
            self.first_packet = false;
        }
    }

    /// Only a bare discontinuity is tolerated.
    fn check_flags(&self, flags: CaptureFlags, pass: u64, report: &mut SessionReport) -> Result<(), RemixError> {
        if flags.is_empty() {
            return Ok(());
        }
        if flags != CaptureFlags::DATA_DISCONTINUITY {
            return Err(RemixError::UnexpectedCaptureFlag {
                flags: flags.bits(),
                pass,
                frames: report.frames,
            });
        }

        if !self.first_packet {
            report.glitches += 1;
        }
        self.observer.on_event(&SessionEvent::Discontinuity {
            first_packet: self.first_packet,
            pass,
            frames: report.frames,
        });
        Ok(())
    }

    /// Pre-process, align, then remix the first `frames` source frames of
    /// holdover followed by `captured` into `out`. Whatever is left over
    /// becomes the new holdover.
    fn transform(&mut self, captured: &[u8], frames: usize, out: &mut [u8], out_frames: usize) {
        let mut joined = std::mem::take(&mut self.joined);
        let pending: &[u8] = if self.holdover.is_empty() {
            captured
        } else {
            joined.clear();
            joined.extend_from_slice(&self.holdover);
            joined.extend_from_slice(captured);
            &joined
        };
        let (mut input, rest) = pending.split_at(self.formats.source.bytes_for(frames).min(pending.len()));
        self.holdover.clear();
        self.holdover.extend_from_slice(rest);

        if let Some(config) = &self.preprocess {
            self.edit_scratch.clear();
            self.edit_scratch.extend_from_slice(input);
            preprocess_batch(&mut self.edit_scratch, &self.formats.source, config);
            input = &self.edit_scratch;
        }

        if let Some(aligner) = self.aligner.as_mut() {
            self.align_scratch.resize(input.len(), 0);
            aligner.align(input, &mut self.align_scratch);
            input = &self.align_scratch;
        }

        if self.formats.channels_differ {
            out.fill(0);
        }
        remix(
            out,
            &self.formats.sink,
            input,
            &self.formats.remix_input,
            out_frames,
            self.duplicate_channels,
        );

        self.joined = joined;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{CaptureFeeder, MockCapture, MockRender, RenderMonitor};
    use crate::models::config::{ChannelEdit, RemixPolicy};
    use crate::models::format::{AudioFormat, SampleEncoding};
    use crate::traits::endpoint::FormatSupport;

    #[derive(Default)]
    struct Recorder {
        states: Mutex<Vec<&'static str>>,
        events: Mutex<Vec<SessionEvent>>,
        errors: Mutex<Vec<RemixError>>,
    }

    impl SessionObserver for Recorder {
        fn on_state_changed(&self, state: &SchedulerState) {
            self.states.lock().push(state.name());
        }

        fn on_event(&self, event: &SessionEvent) {
            self.events.lock().push(event.clone());
        }

        fn on_error(&self, error: &RemixError) {
            self.errors.lock().push(error.clone());
        }
    }

    fn pcm(channels: u16, bits: u16, rate: u32) -> AudioFormat {
        AudioFormat::new(channels, bits, rate, SampleEncoding::Pcm)
    }

    fn with_policy(policy: RemixPolicy) -> SessionConfig {
        SessionConfig {
            policy,
            overflow_retry_delay_ms: 0,
            ..SessionConfig::default()
        }
    }

    struct Outcome {
        result: Result<SessionReport, SessionFailure>,
        capture: CaptureFeeder,
        render: RenderMonitor,
        recorder: Arc<Recorder>,
        started: bool,
    }

    /// Runs on this thread; stop is raised as soon as the queue runs dry.
    fn run_until_drained(capture: MockCapture, render: MockRender, config: SessionConfig) -> Outcome {
        let feeder = capture.feeder();
        let monitor = render.monitor();
        let recorder = Arc::new(Recorder::default());
        let mut session = CaptureRenderLoop::new(capture, render, config, recorder.clone()).unwrap();
        feeder.stop_when_drained(session.stop_signal());

        let started = SignalSet::new().signal().unwrap();
        let result = session.run(&started);

        Outcome {
            result,
            capture: feeder,
            render: monitor,
            recorder,
            started: started.is_set(),
        }
    }

    #[test]
    fn forced_mono_to_stereo_streams_pairs_at_half_rate() {
        let mut capture = MockCapture::new(pcm(1, 8, 96_000));
        capture.queue_packet(vec![1, 2, 3, 4], CaptureFlags::NONE);

        let outcome = run_until_drained(
            capture,
            MockRender::new(),
            with_policy(RemixPolicy {
                force_mono_to_stereo: true,
                ..RemixPolicy::default()
            }),
        );

        let report = outcome.result.unwrap();
        assert_eq!(report.frames, 4);
        assert_eq!(report.sink_format, Some(pcm(2, 8, 48_000)));
        let render = outcome.render.stats();
        assert_eq!(render.format, Some(pcm(2, 8, 48_000)));
        assert_eq!(render.written, vec![1, 2, 3, 4]);
        assert_eq!(outcome.capture.stats().released, vec![4]);
    }

    #[test]
    fn state_sequence_for_a_clean_run() {
        let mut capture = MockCapture::new(pcm(2, 16, 48_000));
        capture.queue_packet(vec![0; 8], CaptureFlags::NONE);

        let outcome = run_until_drained(capture, MockRender::new(), SessionConfig::default());

        assert!(outcome.result.is_ok());
        assert!(outcome.started);
        assert_eq!(
            *outcome.recorder.states.lock(),
            vec!["started", "draining", "waiting", "stopping", "stopped"]
        );
        assert!(outcome
            .recorder
            .events
            .lock()
            .contains(&SessionEvent::StopReceived { passes: 0, frames: 2 }));
    }

    #[test]
    fn render_primed_with_half_a_buffer_of_silence() {
        let capture = MockCapture::new(pcm(2, 16, 48_000));

        let outcome = run_until_drained(capture, MockRender::new(), SessionConfig::default());

        assert!(outcome.result.is_ok());
        let render = outcome.render.stats();
        assert_eq!(render.buffer, Some(Duration::from_millis(64)));
        assert_eq!(render.silent_frames, 1536);
        assert_eq!(render.released, vec![(1536, true)]);
    }

    #[test]
    fn upmix_zero_fills_channels_without_a_source() {
        let mut capture = MockCapture::new(pcm(2, 8, 48_000));
        capture.queue_packet(vec![1, 2, 3, 4], CaptureFlags::NONE);
        let render = MockRender::new().with_support(FormatSupport::Closest(pcm(6, 8, 48_000)));

        let outcome = run_until_drained(capture, render, SessionConfig::default());

        assert!(outcome.result.is_ok());
        assert_eq!(outcome.render.stats().written, vec![1, 2, 0, 0, 0, 0, 3, 4, 0, 0, 0, 0]);
    }

    #[test]
    fn upmix_with_duplication_fills_rear_pair() {
        let mut capture = MockCapture::new(pcm(2, 8, 48_000));
        capture.queue_packet(vec![1, 2], CaptureFlags::NONE);
        let render = MockRender::new().with_support(FormatSupport::Closest(pcm(4, 8, 48_000)));

        let outcome = run_until_drained(
            capture,
            render,
            with_policy(RemixPolicy {
                duplicate_channels: true,
                ..RemixPolicy::default()
            }),
        );

        assert!(outcome.result.is_ok());
        assert_eq!(outcome.render.stats().written, vec![1, 2, 1, 2]);
    }

    #[test]
    fn preprocess_runs_before_remix() {
        let mut capture = MockCapture::new(pcm(2, 8, 48_000));
        capture.queue_packet(vec![1, 2, 3, 4], CaptureFlags::NONE);
        let config = SessionConfig {
            preprocess: PreProcessConfig {
                edit: ChannelEdit::Swap,
                ..PreProcessConfig::default()
            },
            ..SessionConfig::default()
        };

        let outcome = run_until_drained(capture, MockRender::new(), config);

        assert!(outcome.result.is_ok());
        assert_eq!(outcome.render.stats().written, vec![2, 1, 4, 3]);
    }

    #[test]
    fn skip_first_sample_delays_by_one_frame() {
        let mut capture = MockCapture::new(pcm(2, 8, 48_000));
        capture.queue_packet(vec![1, 2, 3, 4], CaptureFlags::NONE);
        capture.queue_packet(vec![5, 6], CaptureFlags::NONE);

        let outcome = run_until_drained(
            capture,
            MockRender::new(),
            with_policy(RemixPolicy {
                skip_first_sample: true,
                ..RemixPolicy::default()
            }),
        );

        assert_eq!(outcome.result.unwrap().frames, 3);
        assert_eq!(outcome.render.stats().written, vec![0, 0, 1, 2, 3, 4]);
    }

    #[test]
    fn discontinuity_is_expected_only_on_first_packet() {
        let mut capture = MockCapture::new(pcm(1, 16, 48_000));
        capture.queue_packet(vec![0; 4], CaptureFlags::DATA_DISCONTINUITY);
        capture.queue_packet(vec![0; 4], CaptureFlags::DATA_DISCONTINUITY);

        let outcome = run_until_drained(capture, MockRender::new(), SessionConfig::default());

        let report = outcome.result.unwrap();
        assert_eq!(report.glitches, 1);
        assert_eq!(report.frames, 4);
        let events = outcome.recorder.events.lock();
        let discontinuities: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, SessionEvent::Discontinuity { .. }))
            .collect();
        assert_eq!(
            discontinuities,
            vec![
                &SessionEvent::Discontinuity {
                    first_packet: true,
                    pass: 0,
                    frames: 0
                },
                &SessionEvent::Discontinuity {
                    first_packet: false,
                    pass: 0,
                    frames: 2
                },
            ]
        );
    }

    #[test]
    fn other_capture_flags_are_fatal_and_keep_frame_count() {
        let mut capture = MockCapture::new(pcm(1, 16, 48_000));
        capture.queue_packet(vec![0; 6], CaptureFlags::NONE);
        capture.queue_packet(vec![0; 2], CaptureFlags::SILENT);

        let outcome = run_until_drained(capture, MockRender::new(), SessionConfig::default());

        let failure = outcome.result.unwrap_err();
        assert_eq!(
            failure.error,
            RemixError::UnexpectedCaptureFlag {
                flags: 0x2,
                pass: 0,
                frames: 3
            }
        );
        assert_eq!(failure.report.frames, 3);
        assert_eq!(outcome.capture.stats().released, vec![3, 0]);
        assert_eq!(outcome.recorder.errors.lock().len(), 1);
        assert_eq!(outcome.recorder.states.lock().last(), Some(&"failed"));
    }

    #[test]
    fn streams_stopped_on_failure() {
        let mut capture = MockCapture::new(pcm(1, 16, 48_000));
        capture.queue_packet(vec![0; 2], CaptureFlags::TIMESTAMP_ERROR);

        let outcome = run_until_drained(capture, MockRender::new(), SessionConfig::default());

        assert!(outcome.result.is_err());
        let capture = outcome.capture.stats();
        let render = outcome.render.stats();
        assert_eq!((capture.starts, capture.stops), (1, 1));
        assert_eq!((render.starts, render.stops), (1, 1));
        assert_eq!(capture.boosts_reverted, 1);
    }

    #[test]
    fn inconsistent_packet_size_is_fatal() {
        let mut capture = MockCapture::new(pcm(1, 16, 48_000)).misreport_next_packet_size(3);
        capture.queue_packet(vec![0; 4], CaptureFlags::NONE);

        let outcome = run_until_drained(capture, MockRender::new(), SessionConfig::default());

        assert_eq!(
            outcome.result.unwrap_err().error,
            RemixError::InconsistentPacketSize {
                announced: 3,
                acquired: 2,
                pass: 0
            }
        );
        assert_eq!(outcome.capture.stats().released, vec![0]);
    }

    #[test]
    fn odd_mono_sample_is_carried_into_next_packet() {
        let mut capture = MockCapture::new(pcm(1, 8, 96_000));
        capture.queue_packet(vec![1, 2, 3, 4, 5], CaptureFlags::NONE);
        capture.queue_packet(vec![6, 7, 8], CaptureFlags::NONE);

        let outcome = run_until_drained(
            capture,
            MockRender::new(),
            with_policy(RemixPolicy {
                force_mono_to_stereo: true,
                ..RemixPolicy::default()
            }),
        );

        let report = outcome.result.unwrap();
        assert_eq!(report.frames, 8);
        assert_eq!(outcome.render.stats().written, vec![1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(outcome.capture.stats().released, vec![5, 3]);
        assert_eq!(outcome.capture.queued_packets(), 0);
    }

    #[test]
    fn lone_mono_sample_waits_for_its_pair() {
        let mut capture = MockCapture::new(pcm(1, 8, 96_000));
        capture.queue_packet(vec![1], CaptureFlags::NONE);
        capture.queue_packet(vec![2, 3, 4], CaptureFlags::NONE);

        let outcome = run_until_drained(
            capture,
            MockRender::new(),
            with_policy(RemixPolicy {
                force_mono_to_stereo: true,
                ..RemixPolicy::default()
            }),
        );

        assert_eq!(outcome.result.unwrap().frames, 4);
        let render = outcome.render.stats();
        assert_eq!(render.written, vec![1, 2, 3, 4]);
        assert_eq!(render.released, vec![(1536, true), (2, false)]);
        assert_eq!(outcome.capture.stats().released, vec![1, 3]);
    }

    #[test]
    fn empty_batch_is_fatal() {
        let mut capture = MockCapture::new(pcm(2, 16, 48_000)).misreport_next_packet_size(2);
        capture.queue_packet(Vec::new(), CaptureFlags::NONE);

        let outcome = run_until_drained(capture, MockRender::new(), SessionConfig::default());

        assert_eq!(
            outcome.result.unwrap_err().error,
            RemixError::EmptyPacket { pass: 0, frames: 0 }
        );
        assert_eq!(outcome.capture.stats().released, vec![0]);
    }

    #[test]
    fn full_render_buffer_is_retried() {
        let mut capture = MockCapture::new(pcm(2, 8, 48_000));
        capture.queue_packet(vec![7, 8], CaptureFlags::NONE);
        let render = MockRender::new().with_full_responses(3);

        let outcome = run_until_drained(capture, render, with_policy(RemixPolicy::default()));

        let report = outcome.result.unwrap();
        assert_eq!(report.overflow_retries, 3);
        assert_eq!(outcome.render.stats().written, vec![7, 8]);
        let overflows = outcome
            .recorder
            .events
            .lock()
            .iter()
            .filter(|e| matches!(e, SessionEvent::RenderBufferFull { .. }))
            .count();
        assert_eq!(overflows, 3);
    }

    #[test]
    fn render_failure_releases_capture_batch() {
        let mut capture = MockCapture::new(pcm(2, 8, 48_000));
        capture.queue_packet(vec![7, 8], CaptureFlags::NONE);
        let render = MockRender::new().fail_acquire(2, DeviceError::call("IAudioRenderClient::GetBuffer", 0x8000_4005));

        let outcome = run_until_drained(capture, render, SessionConfig::default());

        assert!(matches!(
            outcome.result.unwrap_err().error,
            RemixError::Device(DeviceError::Call { .. })
        ));
        assert_eq!(outcome.capture.stats().released, vec![0]);
        assert_eq!(outcome.capture.queued_packets(), 1);
    }

    #[test]
    fn downmix_rejected_before_streaming() {
        let capture = MockCapture::new(pcm(2, 16, 48_000));
        let render = MockRender::new().with_support(FormatSupport::Closest(pcm(1, 16, 48_000)));

        let outcome = run_until_drained(capture, render, SessionConfig::default());

        assert!(matches!(
            outcome.result.unwrap_err().error,
            RemixError::UnsupportedOutputFormat(_)
        ));
        assert!(!outcome.started);
        let render = outcome.render.stats();
        assert_eq!(render.format, None);
        assert_eq!(render.starts, 0);
        assert_eq!(outcome.capture.stats().starts, 0);
    }

    #[test]
    fn loopback_source_is_polled_by_timer() {
        let mut capture = MockCapture::new(pcm(2, 16, 48_000)).with_period(Duration::from_millis(2));
        capture.queue_packet(vec![0; 4], CaptureFlags::NONE);
        let config = SessionConfig {
            source_kind: CaptureSourceKind::RenderLoopback,
            ..SessionConfig::default()
        };

        let outcome = run_until_drained(capture, MockRender::new(), config);

        assert_eq!(outcome.result.unwrap().frames, 1);
        let capture = outcome.capture.stats();
        assert!(capture.opened);
        assert!(!capture.event_driven);
    }

    #[test]
    fn session_runs_only_once() {
        let mut session = CaptureRenderLoop::new(
            MockCapture::new(pcm(2, 16, 48_000)),
            MockRender::new(),
            SessionConfig::default(),
            Arc::new(Recorder::default()),
        )
        .unwrap();
        let stop = session.stop_signal();
        let started = SignalSet::new().signal().unwrap();
        stop.set();

        assert!(session.run(&started).is_ok());
        assert!(matches!(session.state(), SchedulerState::Stopped { frames: 0 }));
        let again = session.run(&started).unwrap_err();
        assert!(matches!(again.error, RemixError::SchedulerError(_)));
    }

    #[test]
    fn invalid_config_rejected_up_front() {
        let config = SessionConfig {
            buffer_ms: 0,
            ..SessionConfig::default()
        };
        let result = CaptureRenderLoop::new(
            MockCapture::new(pcm(2, 16, 48_000)),
            MockRender::new(),
            config,
            Arc::new(Recorder::default()),
        );
        assert!(matches!(result, Err(RemixError::ConfigurationFailed(_))));
    }
}
