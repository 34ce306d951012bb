//! Typed events emitted by the dictation controller.
//!
//! The controller never touches the clipboard, the screen, or any other UI
//! surface directly. It emits these events on a channel; whatever presentation
//! layer exists drains them and marshals onto its own thread.

/// Current state of the dictation pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DictationState {
    /// Nothing in flight; `start()` will open a capture session.
    Idle,
    /// A capture session owns the microphone.
    Recording,
    /// A worker thread is transcribing the flushed buffer.
    Processing,
}

/// Why a recording ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The user toggled the hotkey (or called `stop()`).
    Manual,
    /// No sound above the silence threshold for the configured timeout.
    Silence,
    /// The recording hit the hard duration cap.
    MaxDuration,
    /// The audio stream reported a fault mid-recording.
    DeviceError,
}

/// Events delivered to the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub enum DictationEvent {
    /// The state machine transitioned.
    StateChanged {
        /// State before the transition
        from: DictationState,
        /// State after the transition
        to: DictationState,
    },
    /// Normalized input level in [0, 1], one per captured block.
    LevelChanged(f32),
    /// A recording produced text. Exactly one terminal event
    /// (`TranscriptReady`, `NothingRecognized`, or `Failed`) is emitted per
    /// recording.
    TranscriptReady(String),
    /// The recording contained no recognizable speech (empty capture, empty
    /// transcription, or a known placeholder result). Not an error.
    NothingRecognized,
    /// The pipeline failed; the controller has already returned to Idle.
    Failed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_states_compare_by_variant() {
        assert_eq!(DictationState::Idle, DictationState::Idle);
        assert_ne!(DictationState::Recording, DictationState::Processing);
    }

    #[test]
    fn test_stop_reasons_are_copy() {
        let reason = StopReason::Silence;
        let copied = reason;
        assert_eq!(reason, copied);
    }
}
