/// Speech API boundary: trait, HTTP client, wire encoding
pub mod api;
/// Retrying transcriber on top of the API boundary
pub mod engine;

pub use api::{ApiError, ApiErrorKind, GroqClient, SpeechApi};
pub use engine::{RetryPolicy, Sleeper, ThreadSleeper, Transcriber, TranscriptResult};
