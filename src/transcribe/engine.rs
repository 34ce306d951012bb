//! Retrying transcriber.
//!
//! Takes a finished recording, encodes it for the wire, and drives the
//! speech API with a bounded retry budget. The upstream model occasionally
//! hallucinates short placeholder strings on near-silent audio instead of
//! returning an empty result; those are detected here and treated as empty,
//! never handed to the caller as a transcript.

use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::TranscribeConfig;
use crate::transcribe::api::{self, ApiErrorKind, SpeechApi};

/// Exact strings the model has been observed to return for silence,
/// compared case-insensitively after trimming.
const PLACEHOLDER_TEXTS: [&str; 4] = ["продолжение следует", "you", "...", "silence"];

/// Outcome of one full transcription episode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptResult {
    /// Non-empty, non-placeholder text.
    Text(String),
    /// The call worked but no speech was recognized (possibly after retries
    /// that only produced placeholders).
    Empty,
    /// All attempts failed; carries the last failure classification.
    Failed(ApiErrorKind),
}

/// Retry budget and per-kind cooldowns, kept as one value so the policy is
/// explicit and injectable instead of scattered sleep calls.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Cooldown after HTTP 429.
    pub rate_limit_cooldown: Duration,
    /// Cooldown after a request timeout.
    pub timeout_cooldown: Duration,
    /// Cooldown after other failures and placeholder results.
    pub error_cooldown: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            rate_limit_cooldown: Duration::from_secs(30),
            timeout_cooldown: Duration::from_secs(5),
            error_cooldown: Duration::from_secs(2),
        }
    }
}

impl From<&TranscribeConfig> for RetryPolicy {
    fn from(config: &TranscribeConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            rate_limit_cooldown: Duration::from_secs(config.rate_limit_cooldown_secs),
            timeout_cooldown: Duration::from_secs(config.timeout_cooldown_secs),
            error_cooldown: Duration::from_secs(config.error_cooldown_secs),
        }
    }
}

/// Sleep abstraction so retry tests run without real delays.
pub trait Sleeper: Send + Sync {
    /// Block the current thread for `duration`.
    fn sleep(&self, duration: Duration);
}

/// Production sleeper backed by `std::thread::sleep`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Drives the speech API with bounded retries and placeholder filtering.
pub struct Transcriber {
    speech_api: Box<dyn SpeechApi>,
    policy: RetryPolicy,
    sleeper: Box<dyn Sleeper>,
    sample_rate: u32,
}

impl Transcriber {
    /// Create a transcriber that sleeps for real between attempts.
    #[must_use]
    pub fn new(speech_api: Box<dyn SpeechApi>, sample_rate: u32, policy: RetryPolicy) -> Self {
        Self::with_sleeper(speech_api, sample_rate, policy, Box::new(ThreadSleeper))
    }

    /// Create a transcriber with an injected sleeper (used by tests to make
    /// backoff deterministic).
    #[must_use]
    pub fn with_sleeper(
        speech_api: Box<dyn SpeechApi>,
        sample_rate: u32,
        policy: RetryPolicy,
        sleeper: Box<dyn Sleeper>,
    ) -> Self {
        Self {
            speech_api,
            policy,
            sleeper,
            sample_rate,
        }
    }

    /// Transcribe a finished recording. Never panics and never blocks beyond
    /// the configured retry budget; every failure mode comes back as a
    /// structured [`TranscriptResult`].
    #[must_use]
    pub fn transcribe(&self, samples: &[i16]) -> TranscriptResult {
        let wav = match api::encode_wav(samples, self.sample_rate) {
            Ok(wav) => wav,
            Err(e) => {
                warn!("failed to encode recording: {e}");
                return TranscriptResult::Failed(ApiErrorKind::Other);
            }
        };

        debug!(
            samples = samples.len(),
            wav_bytes = wav.len(),
            attempts = self.policy.max_attempts,
            "starting transcription"
        );

        // None here means the most recent attempt produced empty/placeholder
        // text rather than an error; that distinction picks the final result.
        let mut last_failure: Option<ApiErrorKind> = None;

        for attempt in 1..=self.policy.max_attempts {
            let start = Instant::now();
            match self.speech_api.transcribe(&wav) {
                Ok(raw) => {
                    let text = raw.trim();
                    let elapsed_ms = start.elapsed().as_millis();

                    if text.is_empty() || is_placeholder(text) {
                        info!(attempt, elapsed_ms, text = %text, "placeholder or empty result");
                        last_failure = None;
                        if attempt < self.policy.max_attempts {
                            self.sleeper.sleep(self.policy.error_cooldown);
                        }
                        continue;
                    }

                    info!(attempt, elapsed_ms, text_len = text.len(), "transcription succeeded");
                    return TranscriptResult::Text(text.to_owned());
                }
                Err(e) => {
                    warn!(
                        attempt,
                        elapsed_ms = start.elapsed().as_millis(),
                        kind = ?e.kind,
                        "attempt failed: {}",
                        e.message
                    );
                    last_failure = Some(e.kind);
                    if attempt < self.policy.max_attempts {
                        self.sleeper.sleep(self.cooldown_for(e.kind));
                    }
                }
            }
        }

        match last_failure {
            Some(kind) => TranscriptResult::Failed(kind),
            None => TranscriptResult::Empty,
        }
    }

    const fn cooldown_for(&self, kind: ApiErrorKind) -> Duration {
        match kind {
            ApiErrorKind::RateLimited => self.policy.rate_limit_cooldown,
            ApiErrorKind::Timeout => self.policy.timeout_cooldown,
            ApiErrorKind::Other => self.policy.error_cooldown,
        }
    }
}

fn is_placeholder(text: &str) -> bool {
    let lowered = text.to_lowercase();
    PLACEHOLDER_TEXTS.iter().any(|p| *p == lowered)
}
