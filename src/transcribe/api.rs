//! Speech API boundary.
//!
//! The pipeline treats the cloud service as `POST audio → text | error`.
//! [`SpeechApi`] is the seam the retrying transcriber (and its tests) work
//! against; [`GroqClient`] is the production implementation speaking the
//! OpenAI-compatible transcription endpoint.

use hound::{SampleFormat, WavSpec, WavWriter};
use std::io::Cursor;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::config::ApiConfig;

/// Failure classification driving the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    /// HTTP 429; the service asked us to back off.
    RateLimited,
    /// The request hit the per-attempt timeout.
    Timeout,
    /// Anything else: transport errors, 5xx, malformed responses.
    Other,
}

/// One failed transcription attempt.
#[derive(Debug, Error)]
#[error("{kind:?}: {message}")]
pub struct ApiError {
    /// Classification for backoff selection.
    pub kind: ApiErrorKind,
    /// Human-readable detail for logs.
    pub message: String,
}

impl ApiError {
    /// Build an error of the given kind.
    #[must_use]
    pub fn new(kind: ApiErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Trait for the external speech service (enables testing via mocking).
#[cfg_attr(test, mockall::automock)]
pub trait SpeechApi: Send + Sync {
    /// Submit a WAV payload and return the transcribed text.
    ///
    /// # Errors
    /// Returns a classified [`ApiError`] on any failure.
    fn transcribe(&self, wav: &[u8]) -> Result<String, ApiError>;
}

/// Blocking HTTP client for the Groq Whisper transcription endpoint.
pub struct GroqClient {
    http: reqwest::blocking::Client,
    endpoint: String,
    api_key: String,
    model: String,
    language: String,
    vocabulary_hint: String,
}

impl GroqClient {
    /// Build a client from config plus the resolved API key.
    ///
    /// # Errors
    /// Returns error if the underlying HTTP client cannot be constructed.
    pub fn new(config: &ApiConfig, api_key: String) -> Result<Self, ApiError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ApiError::new(ApiErrorKind::Other, e.to_string()))?;

        Ok(Self {
            http,
            endpoint: config.endpoint.clone(),
            api_key,
            model: config.model.clone(),
            language: config.language.clone(),
            vocabulary_hint: config.vocabulary_hint.clone(),
        })
    }
}

impl SpeechApi for GroqClient {
    fn transcribe(&self, wav: &[u8]) -> Result<String, ApiError> {
        let part = reqwest::blocking::multipart::Part::bytes(wav.to_vec())
            .file_name("recording.wav")
            .mime_str("audio/wav")
            .map_err(|e| ApiError::new(ApiErrorKind::Other, e.to_string()))?;

        let mut form = reqwest::blocking::multipart::Form::new()
            .part("file", part)
            .text("model", self.model.clone())
            .text("response_format", "text");
        if !self.language.is_empty() {
            form = form.text("language", self.language.clone());
        }
        if !self.vocabulary_hint.is_empty() {
            form = form.text("prompt", self.vocabulary_hint.clone());
        }

        debug!(bytes = wav.len(), model = %self.model, "submitting transcription request");

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .map_err(classify_transport_error)?;

        let status = response.status();
        let body = response
            .text()
            .map_err(|e| ApiError::new(ApiErrorKind::Other, e.to_string()))?;

        if status.is_success() {
            Ok(body)
        } else {
            Err(classify_status(status, &body))
        }
    }
}

fn classify_transport_error(error: reqwest::Error) -> ApiError {
    let kind = if error.is_timeout() {
        ApiErrorKind::Timeout
    } else {
        ApiErrorKind::Other
    };
    ApiError::new(kind, error.to_string())
}

fn classify_status(status: reqwest::StatusCode, body: &str) -> ApiError {
    let kind = if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        ApiErrorKind::RateLimited
    } else if status == reqwest::StatusCode::REQUEST_TIMEOUT {
        ApiErrorKind::Timeout
    } else {
        ApiErrorKind::Other
    };

    let detail: String = body.chars().take(200).collect();
    ApiError::new(kind, format!("HTTP {status}: {detail}"))
}

/// Encode captured samples as a 16-bit PCM mono WAV payload in memory.
///
/// # Errors
/// Returns error if the WAV header or samples cannot be written.
pub fn encode_wav(samples: &[i16], sample_rate: u32) -> Result<Vec<u8>, hound::Error> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec)?;
        for &sample in samples {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
    }

    Ok(cursor.into_inner())
}
