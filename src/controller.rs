//! Dictation state machine: `Idle → Recording → Processing → Idle`.
//!
//! The controller orchestrates one capture session and one transcription
//! worker at a time. Hotkey and UI layers talk to it only through
//! [`DictationController::toggle`] / [`start`](DictationController::start) /
//! [`stop`](DictationController::stop) and the event channel; it talks back
//! only through [`DictationEvent`]s. Whatever fails (device at open, device
//! mid-stream, network during processing, even a panic in the worker), the
//! controller ends up in Idle and the next `start()` works.

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::audio::capture::{CaptureConfig, CaptureHooks, CaptureSession};
use crate::audio::device::{CaptureError, InputBackend};
use crate::events::{DictationEvent, DictationState, StopReason};
use crate::transcribe::engine::{Transcriber, TranscriptResult};

/// Errors surfaced by controller operations. Expected pipeline failures
/// (network, empty results) are events, not errors; these cover the cases
/// where an operation cannot begin at all.
#[derive(Debug, Error)]
pub enum DictationError {
    /// Missing credential or device selection; `start()` was a no-op.
    #[error("not configured: {0}")]
    NotConfigured(&'static str),

    /// The capture device could not be opened.
    #[error(transparent)]
    Device(#[from] CaptureError),
}

struct Inner {
    state: DictationState,
    session: Option<CaptureSession>,
    /// Bumped per recording; auto-stop callbacks carry the value they were
    /// created with so a stale watchdog cannot stop a newer session.
    generation: u64,
}

struct ControllerCore {
    inner: Mutex<Inner>,
    events: Sender<DictationEvent>,
    backend: Box<dyn InputBackend>,
    transcriber: Transcriber,
    capture_config: CaptureConfig,
    credential_present: bool,
}

/// Orchestrates capture and transcription; cheap to clone.
pub struct DictationController {
    core: Arc<ControllerCore>,
}

impl Clone for DictationController {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl DictationController {
    /// Build a controller and the receiving end of its event channel.
    #[must_use]
    pub fn new(
        backend: Box<dyn InputBackend>,
        transcriber: Transcriber,
        capture_config: CaptureConfig,
        credential_present: bool,
    ) -> (Self, Receiver<DictationEvent>) {
        let (events, receiver) = unbounded();
        let controller = Self {
            core: Arc::new(ControllerCore {
                inner: Mutex::new(Inner {
                    state: DictationState::Idle,
                    session: None,
                    generation: 0,
                }),
                events,
                backend,
                transcriber,
                capture_config,
                credential_present,
            }),
        };
        (controller, receiver)
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> DictationState {
        self.core.inner.lock().state
    }

    /// Toggle between starting and stopping a recording. Ignored while a
    /// transcription is in flight.
    ///
    /// # Errors
    /// Propagates [`DictationError`] from `start()`.
    pub fn toggle(&self) -> Result<(), DictationError> {
        match self.state() {
            DictationState::Idle => self.start(),
            DictationState::Recording => {
                self.stop();
                Ok(())
            }
            DictationState::Processing => {
                debug!("toggle ignored while processing");
                Ok(())
            }
        }
    }

    /// Open a capture session and enter Recording.
    ///
    /// A no-op while already Recording or Processing: the hotkey can never
    /// double-open the device or launch two transcriptions.
    ///
    /// # Errors
    /// [`DictationError::NotConfigured`] if no API credential is available;
    /// [`DictationError::Device`] if the microphone cannot be opened. The
    /// state stays Idle in both cases.
    pub fn start(&self) -> Result<(), DictationError> {
        let mut inner = self.core.inner.lock();
        if inner.state != DictationState::Idle {
            debug!(state = ?inner.state, "start ignored");
            return Ok(());
        }

        if !self.core.credential_present {
            drop(inner);
            self.core.emit(DictationEvent::Failed(
                "speech API key is not configured".to_owned(),
            ));
            return Err(DictationError::NotConfigured("speech API key missing"));
        }

        inner.generation += 1;
        let generation = inner.generation;

        let level_events = self.core.events.clone();
        let stop_core = Arc::downgrade(&self.core);
        let hooks = CaptureHooks {
            on_level: Box::new(move |level| {
                let _ = level_events.send(DictationEvent::LevelChanged(level));
            }),
            on_auto_stop: Box::new(move |reason| {
                if let Some(core) = stop_core.upgrade() {
                    ControllerCore::finish_recording(&core, reason, Some(generation));
                }
            }),
        };

        match CaptureSession::open(self.core.backend.as_ref(), &self.core.capture_config, hooks) {
            Ok(session) => {
                inner.session = Some(session);
                inner.state = DictationState::Recording;
                drop(inner);
                self.core
                    .emit_state(DictationState::Idle, DictationState::Recording);
                Ok(())
            }
            Err(e) => {
                // Nothing was opened; stay Idle and surface the failure.
                drop(inner);
                warn!("could not open capture session: {e}");
                self.core
                    .emit(DictationEvent::Failed(format!("microphone unavailable: {e}")));
                Err(DictationError::Device(e))
            }
        }
    }

    /// Manually end the current recording and hand it to transcription.
    /// No-op unless Recording.
    pub fn stop(&self) {
        ControllerCore::finish_recording(&self.core, StopReason::Manual, None);
    }
}

impl ControllerCore {
    fn emit(&self, event: DictationEvent) {
        let _ = self.events.send(event);
    }

    fn emit_state(&self, from: DictationState, to: DictationState) {
        info!(?from, ?to, "state changed");
        self.emit(DictationEvent::StateChanged { from, to });
    }

    /// Take the session out of Recording and either hand its audio to a
    /// worker or return straight to Idle when nothing was captured.
    ///
    /// `expected_generation` is set by auto-stop callbacks; a mismatch means
    /// the callback belongs to an already-finished session and is dropped.
    fn finish_recording(
        core: &Arc<Self>,
        reason: StopReason,
        expected_generation: Option<u64>,
    ) {
        let mut session = {
            let mut inner = core.inner.lock();
            if inner.state != DictationState::Recording {
                debug!(state = ?inner.state, ?reason, "stop ignored");
                return;
            }
            if expected_generation.is_some_and(|g| g != inner.generation) {
                debug!(?reason, "stale auto-stop ignored");
                return;
            }
            let Some(session) = inner.session.take() else {
                inner.state = DictationState::Idle;
                return;
            };
            // Claim the transition under the lock, but close the session
            // outside it: close() joins session threads, and a concurrent
            // stop on one of those threads must not deadlock here.
            inner.state = DictationState::Processing;
            session
        };

        info!(?reason, "recording stopped");
        let samples = session.close();
        drop(session);

        if samples.is_empty() {
            // Nothing worth transcribing; skip Processing entirely.
            core.inner.lock().state = DictationState::Idle;
            core.emit_state(DictationState::Recording, DictationState::Idle);
            core.emit(DictationEvent::NothingRecognized);
            return;
        }

        core.emit_state(DictationState::Recording, DictationState::Processing);
        Self::spawn_worker(Arc::clone(core), samples);
    }

    fn spawn_worker(core: Arc<Self>, samples: Vec<i16>) {
        let worker_core = Arc::clone(&core);
        let spawned = std::thread::Builder::new()
            .name("transcribe-worker".to_owned())
            .spawn(move || {
                let result = catch_unwind(AssertUnwindSafe(|| {
                    worker_core.transcriber.transcribe(&samples)
                }));

                worker_core.inner.lock().state = DictationState::Idle;
                worker_core.emit_state(DictationState::Processing, DictationState::Idle);

                match result {
                    Ok(TranscriptResult::Text(text)) => {
                        worker_core.emit(DictationEvent::TranscriptReady(text));
                    }
                    Ok(TranscriptResult::Empty) => {
                        worker_core.emit(DictationEvent::NothingRecognized);
                    }
                    Ok(TranscriptResult::Failed(kind)) => {
                        worker_core.emit(DictationEvent::Failed(format!(
                            "transcription failed ({kind:?})"
                        )));
                    }
                    Err(_) => {
                        worker_core.emit(DictationEvent::Failed(
                            "transcription worker panicked".to_owned(),
                        ));
                    }
                }
            });

        if let Err(e) = spawned {
            // Could not even start the worker; force Idle so nothing wedges.
            warn!("failed to spawn transcription worker: {e}");
            core.inner.lock().state = DictationState::Idle;
            core.emit_state(DictationState::Processing, DictationState::Idle);
            core.emit(DictationEvent::Failed(format!(
                "could not start transcription: {e}"
            )));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::device::{
        BlockCallback, FaultCallback, InputDeviceInfo, InputStreamHandle, StreamFormat,
    };
    use crate::transcribe::api::{ApiError, ApiErrorKind, MockSpeechApi};
    use crate::transcribe::engine::RetryPolicy;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    type SharedSink = Arc<Mutex<Option<(BlockCallback, FaultCallback)>>>;

    struct ScriptedBackend {
        sink: SharedSink,
        opens: Arc<AtomicUsize>,
        fail_open: bool,
    }

    struct ScriptedHandle {
        sink: SharedSink,
    }

    impl InputStreamHandle for ScriptedHandle {}

    impl Drop for ScriptedHandle {
        fn drop(&mut self) {
            *self.sink.lock() = None;
        }
    }

    impl InputBackend for ScriptedBackend {
        fn list_input_devices(&self) -> Result<Vec<InputDeviceInfo>, CaptureError> {
            Ok(vec![])
        }

        fn open(
            &self,
            _device: &str,
            _format: StreamFormat,
            on_block: BlockCallback,
            on_fault: FaultCallback,
        ) -> Result<Box<dyn InputStreamHandle>, CaptureError> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            if self.fail_open {
                return Err(CaptureError::DeviceUnavailable("device busy".to_owned()));
            }
            *self.sink.lock() = Some((on_block, on_fault));
            Ok(Box::new(ScriptedHandle {
                sink: Arc::clone(&self.sink),
            }))
        }
    }

    struct Fixture {
        controller: DictationController,
        events: Receiver<DictationEvent>,
        sink: SharedSink,
        opens: Arc<AtomicUsize>,
    }

    fn fixture_with(mock: MockSpeechApi, fail_open: bool, credential_present: bool) -> Fixture {
        let sink: SharedSink = Arc::new(Mutex::new(None));
        let opens = Arc::new(AtomicUsize::new(0));
        let backend = ScriptedBackend {
            sink: Arc::clone(&sink),
            opens: Arc::clone(&opens),
            fail_open,
        };

        // Zero cooldowns keep failure-path tests fast.
        let policy = RetryPolicy {
            max_attempts: 3,
            rate_limit_cooldown: Duration::ZERO,
            timeout_cooldown: Duration::ZERO,
            error_cooldown: Duration::ZERO,
        };
        let transcriber = Transcriber::new(Box::new(mock), 16000, policy);

        let config = CaptureConfig {
            device: String::new(),
            format: StreamFormat {
                sample_rate: 16000,
                channels: 1,
            },
            gain_calibration: 0.02,
            silence_threshold: 0.1,
            silence_timeout: Duration::from_secs(60),
            max_duration: Duration::from_secs(120),
            min_samples: 100,
            poll_interval: Duration::from_millis(10),
        };

        let (controller, events) =
            DictationController::new(Box::new(backend), transcriber, config, credential_present);
        Fixture {
            controller,
            events,
            sink,
            opens,
        }
    }

    fn push_block(sink: &SharedSink, block: &[i16]) {
        if let Some((on_block, _)) = sink.lock().as_mut() {
            on_block(block);
        }
    }

    /// Drain events until a terminal one arrives, returning everything seen.
    fn collect_until_terminal(events: &Receiver<DictationEvent>) -> Vec<DictationEvent> {
        let mut seen = Vec::new();
        loop {
            let event = events
                .recv_timeout(Duration::from_secs(5))
                .unwrap_or_else(|_| panic!("no terminal event; saw {seen:?}"));
            let terminal = matches!(
                event,
                DictationEvent::TranscriptReady(_)
                    | DictationEvent::NothingRecognized
                    | DictationEvent::Failed(_)
            );
            seen.push(event);
            if terminal {
                return seen;
            }
        }
    }

    fn state_transitions(events: &[DictationEvent]) -> Vec<(DictationState, DictationState)> {
        events
            .iter()
            .filter_map(|e| match e {
                DictationEvent::StateChanged { from, to } => Some((*from, *to)),
                _ => None,
            })
            .collect()
    }

    fn wait_for_idle(controller: &DictationController) {
        for _ in 0..500 {
            if controller.state() == DictationState::Idle {
                return;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        panic!("controller never returned to Idle");
    }

    #[test]
    fn test_start_without_credential_is_not_configured() {
        let fixture = fixture_with(MockSpeechApi::new(), false, false);

        let result = fixture.controller.start();
        assert!(matches!(result, Err(DictationError::NotConfigured(_))));
        assert_eq!(fixture.controller.state(), DictationState::Idle);
        assert_eq!(fixture.opens.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_open_failure_stays_idle_and_allows_retry() {
        let fixture = fixture_with(MockSpeechApi::new(), true, true);

        assert!(matches!(
            fixture.controller.start(),
            Err(DictationError::Device(CaptureError::DeviceUnavailable(_)))
        ));
        assert_eq!(fixture.controller.state(), DictationState::Idle);

        // The controller is not wedged: a second start attempts a fresh open.
        let _ = fixture.controller.start();
        assert_eq!(fixture.opens.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_double_start_opens_one_session() {
        let mut mock = MockSpeechApi::new();
        mock.expect_transcribe().returning(|_| Ok("x".to_owned()));
        let fixture = fixture_with(mock, false, true);

        fixture.controller.start().unwrap();
        fixture.controller.start().unwrap();

        assert_eq!(fixture.controller.state(), DictationState::Recording);
        assert_eq!(fixture.opens.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_manual_stop_transcribes_and_returns_to_idle() {
        let mut mock = MockSpeechApi::new();
        mock.expect_transcribe()
            .returning(|_| Ok("hello world".to_owned()));
        let fixture = fixture_with(mock, false, true);

        fixture.controller.start().unwrap();
        push_block(&fixture.sink, &[8000; 480]);
        fixture.controller.stop();

        let events = collect_until_terminal(&fixture.events);
        assert_eq!(
            state_transitions(&events),
            vec![
                (DictationState::Idle, DictationState::Recording),
                (DictationState::Recording, DictationState::Processing),
                (DictationState::Processing, DictationState::Idle),
            ]
        );
        assert!(events.contains(&DictationEvent::TranscriptReady("hello world".to_owned())));
        wait_for_idle(&fixture.controller);
    }

    #[test]
    fn test_empty_capture_skips_processing() {
        let fixture = fixture_with(MockSpeechApi::new(), false, true);

        fixture.controller.start().unwrap();
        fixture.controller.stop();

        let events = collect_until_terminal(&fixture.events);
        assert_eq!(
            state_transitions(&events),
            vec![
                (DictationState::Idle, DictationState::Recording),
                (DictationState::Recording, DictationState::Idle),
            ]
        );
        assert!(events.contains(&DictationEvent::NothingRecognized));
    }

    #[test]
    fn test_stop_while_idle_is_a_no_op() {
        let fixture = fixture_with(MockSpeechApi::new(), false, true);
        fixture.controller.stop();
        assert_eq!(fixture.controller.state(), DictationState::Idle);
        assert!(fixture.events.try_recv().is_err());
    }

    #[test]
    fn test_exhausted_retries_fail_but_controller_recovers() {
        let mut mock = MockSpeechApi::new();
        mock.expect_transcribe()
            .returning(|_| Err(ApiError::new(ApiErrorKind::Other, "connection refused")));
        let fixture = fixture_with(mock, false, true);

        fixture.controller.start().unwrap();
        push_block(&fixture.sink, &[8000; 480]);
        fixture.controller.stop();

        let events = collect_until_terminal(&fixture.events);
        assert!(matches!(events.last(), Some(DictationEvent::Failed(_))));
        wait_for_idle(&fixture.controller);

        // Next recording proceeds normally.
        fixture.controller.start().unwrap();
        assert_eq!(fixture.controller.state(), DictationState::Recording);
    }

    #[test]
    fn test_level_events_flow_while_recording() {
        let mut mock = MockSpeechApi::new();
        mock.expect_transcribe().returning(|_| Ok("x".to_owned()));
        let fixture = fixture_with(mock, false, true);

        fixture.controller.start().unwrap();
        push_block(&fixture.sink, &[8000; 160]);

        let mut saw_level = false;
        while let Ok(event) = fixture.events.recv_timeout(Duration::from_millis(200)) {
            if matches!(event, DictationEvent::LevelChanged(l) if l > 0.0) {
                saw_level = true;
                break;
            }
        }
        assert!(saw_level);
        fixture.controller.stop();
    }

    #[test]
    fn test_toggle_cycles_through_a_full_session() {
        let mut mock = MockSpeechApi::new();
        mock.expect_transcribe().returning(|_| Ok("ok".to_owned()));
        let fixture = fixture_with(mock, false, true);

        fixture.controller.toggle().unwrap();
        assert_eq!(fixture.controller.state(), DictationState::Recording);

        push_block(&fixture.sink, &[8000; 480]);
        fixture.controller.toggle().unwrap();

        let events = collect_until_terminal(&fixture.events);
        assert!(events.contains(&DictationEvent::TranscriptReady("ok".to_owned())));
        wait_for_idle(&fixture.controller);

        // And the cycle restarts cleanly.
        fixture.controller.toggle().unwrap();
        assert_eq!(fixture.controller.state(), DictationState::Recording);
    }
}
