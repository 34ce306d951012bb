//! One recording's stream lifetime and stop conditions.
//!
//! A session owns the input stream exclusively from `open` to `close`. Every
//! delivered block is appended to the [`BlockBuffer`], metered, and reported
//! through `on_level`; a watchdog thread polls at a fixed interval and fires
//! `on_auto_stop` exactly once for the first stop condition that holds
//! (silence, duration cap, or a device fault). Stream faults never propagate
//! out of the audio callback: they are flagged and surfaced by the watchdog.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::audio::buffer::BlockBuffer;
use crate::audio::device::{
    BlockCallback, CaptureError, FaultCallback, InputBackend, InputStreamHandle, StreamFormat,
};
use crate::audio::level::LevelMeter;
use crate::config::AudioConfig;
use crate::events::StopReason;

/// Everything a session needs to know about the device and when to stop.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Device name; empty selects the system default.
    pub device: String,
    /// Capture format (16 kHz mono for the speech API).
    pub format: StreamFormat,
    /// Level-meter calibration constant.
    pub gain_calibration: f32,
    /// Normalized level above which a block counts as sound.
    pub silence_threshold: f32,
    /// Continuous silence after which the session auto-stops.
    pub silence_timeout: Duration,
    /// Unconditional cap on recording length.
    pub max_duration: Duration,
    /// Samples that must be captured before silence may auto-stop.
    pub min_samples: usize,
    /// Watchdog polling interval.
    pub poll_interval: Duration,
}

impl From<&AudioConfig> for CaptureConfig {
    fn from(audio: &AudioConfig) -> Self {
        Self {
            device: audio.device.clone(),
            format: StreamFormat {
                sample_rate: audio.sample_rate,
                channels: 1,
            },
            gain_calibration: audio.gain_calibration,
            silence_threshold: audio.silence_threshold,
            silence_timeout: audio.silence_timeout(),
            max_duration: audio.max_duration(),
            min_samples: audio.min_samples(),
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// Callbacks a session reports through. Both may be invoked from
/// session-owned threads; neither may block.
pub struct CaptureHooks {
    /// Normalized level per captured block.
    pub on_level: Box<dyn Fn(f32) + Send + Sync + 'static>,
    /// Fired exactly once when a stop condition holds.
    pub on_auto_stop: Box<dyn Fn(StopReason) + Send + Sync + 'static>,
}

struct SessionShared {
    buffer: BlockBuffer,
    samples_captured: AtomicUsize,
    last_sound_at: Mutex<Instant>,
    started_at: Instant,
    faulted: AtomicBool,
    stopping: AtomicBool,
}

/// An open recording. Closing (or dropping) releases the device.
pub struct CaptureSession {
    shared: Arc<SessionShared>,
    stream: Option<Box<dyn InputStreamHandle>>,
    watchdog: Option<JoinHandle<()>>,
    closed: bool,
}

impl CaptureSession {
    /// Acquire the device and start capturing.
    ///
    /// # Errors
    /// Returns [`CaptureError::DeviceUnavailable`] / [`CaptureError::UnsupportedFormat`]
    /// if the device cannot be opened at the requested format; no stream is
    /// left open on failure.
    pub fn open(
        backend: &dyn InputBackend,
        config: &CaptureConfig,
        hooks: CaptureHooks,
    ) -> Result<Self, CaptureError> {
        let now = Instant::now();
        let shared = Arc::new(SessionShared {
            buffer: BlockBuffer::new(),
            samples_captured: AtomicUsize::new(0),
            last_sound_at: Mutex::new(now),
            started_at: now,
            faulted: AtomicBool::new(false),
            stopping: AtomicBool::new(false),
        });

        let meter = LevelMeter::new(config.gain_calibration);
        let threshold = config.silence_threshold;
        let on_level = hooks.on_level;
        let block_shared = Arc::clone(&shared);
        let on_block: BlockCallback = Box::new(move |data: &[i16]| {
            if block_shared.stopping.load(Ordering::Relaxed) {
                return;
            }
            if !block_shared.buffer.append(data.to_vec()) {
                return;
            }
            block_shared
                .samples_captured
                .fetch_add(data.len(), Ordering::Relaxed);

            let level = meter.level(data);
            on_level(level);
            if level > threshold {
                *block_shared.last_sound_at.lock() = Instant::now();
            }
        });

        let fault_shared = Arc::clone(&shared);
        let on_fault: FaultCallback = Box::new(move |_message| {
            fault_shared.faulted.store(true, Ordering::Relaxed);
        });

        let stream = backend.open(&config.device, config.format, on_block, on_fault)?;

        let conditions = StopConditions {
            silence_timeout: config.silence_timeout,
            max_duration: config.max_duration,
            min_samples: config.min_samples,
        };
        let poll_interval = config.poll_interval;
        let on_auto_stop = hooks.on_auto_stop;
        let watchdog_shared = Arc::clone(&shared);
        let watchdog = std::thread::Builder::new()
            .name("capture-watchdog".to_owned())
            .spawn(move || loop {
                std::thread::sleep(poll_interval);
                if watchdog_shared.stopping.load(Ordering::Relaxed) {
                    return;
                }
                if watchdog_shared.faulted.load(Ordering::Relaxed) {
                    debug!("stream fault observed, auto-stopping");
                    on_auto_stop(StopReason::DeviceError);
                    return;
                }
                let last_sound = *watchdog_shared.last_sound_at.lock();
                let decision = evaluate_stop(
                    Instant::now(),
                    watchdog_shared.started_at,
                    last_sound,
                    watchdog_shared.samples_captured.load(Ordering::Relaxed),
                    &conditions,
                );
                if let Some(reason) = decision {
                    debug!(?reason, "auto-stop condition met");
                    on_auto_stop(reason);
                    return;
                }
            })
            .map_err(|e| CaptureError::Stream(format!("failed to spawn watchdog: {e}")))?;

        Ok(Self {
            shared,
            stream: Some(stream),
            watchdog: Some(watchdog),
            closed: false,
        })
    }

    /// Stop the stream, release the device, and return the captured samples.
    ///
    /// Idempotent: a second call returns an empty vec and releases nothing
    /// twice. Safe to call from the auto-stop callback.
    pub fn close(&mut self) -> Vec<i16> {
        if self.closed {
            return Vec::new();
        }
        self.closed = true;
        self.shared.stopping.store(true, Ordering::Relaxed);

        // Dropping the handle stops the stream and joins its owner thread,
        // so no callback can run once the flush below starts.
        drop(self.stream.take());

        if let Some(watchdog) = self.watchdog.take() {
            if watchdog.thread().id() != std::thread::current().id() {
                let _ = watchdog.join();
            }
        }

        let samples = self.shared.buffer.flush();
        info!(
            samples = samples.len(),
            elapsed_ms = self.shared.started_at.elapsed().as_millis(),
            "capture session closed"
        );
        samples
    }

    /// Total samples captured so far.
    #[must_use]
    pub fn samples_captured(&self) -> usize {
        self.shared.samples_captured.load(Ordering::Relaxed)
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        if !self.closed {
            self.shared.stopping.store(true, Ordering::Relaxed);
            drop(self.stream.take());
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct StopConditions {
    silence_timeout: Duration,
    max_duration: Duration,
    min_samples: usize,
}

/// Decide whether a recording should auto-stop at `now`.
///
/// The duration cap is unconditional. Silence only applies once the
/// minimum-audio guard is satisfied, so a slow starter is not cut off before
/// speaking.
fn evaluate_stop(
    now: Instant,
    started_at: Instant,
    last_sound_at: Instant,
    samples_captured: usize,
    conditions: &StopConditions,
) -> Option<StopReason> {
    if now.duration_since(started_at) >= conditions.max_duration {
        return Some(StopReason::MaxDuration);
    }
    if samples_captured >= conditions.min_samples
        && now.duration_since(last_sound_at) >= conditions.silence_timeout
    {
        return Some(StopReason::Silence);
    }
    None
}
