//! Vox Hotkey - push-to-talk cloud dictation
//!
//! This library exports the capture-and-transcription pipeline for testing
//! and potential future reuse. The binary wires it to the OS collaborators
//! (global hotkey, clipboard, paste injection).

/// Audio capture: level metering, block buffering, capture sessions
pub mod audio;
/// Configuration management
pub mod config;
/// Dictation state machine
pub mod controller;
/// Events emitted by the controller
pub mod events;
/// Input handling (global hotkey)
pub mod input;
/// Clipboard copy and paste injection
pub mod output;
/// Telemetry and logging
pub mod telemetry;
/// Speech API client and retrying transcriber
pub mod transcribe;
