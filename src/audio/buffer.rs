//! Thread-safe, append-only accumulator of captured sample blocks.
//!
//! Exactly one producer (the audio callback) appends while a recording is
//! live; exactly one consumer flushes once, at the transition out of
//! Recording. The flush closes the buffer for good: the synchronization point
//! between capture and transcription is that state transition, not this type.

use parking_lot::Mutex;

/// Accumulates audio blocks in strict arrival order until flushed.
#[derive(Debug, Default)]
pub struct BlockBuffer {
    inner: Mutex<BufferState>,
}

#[derive(Debug, Default)]
struct BufferState {
    blocks: Vec<Vec<i16>>,
    total_samples: usize,
    closed: bool,
}

impl BlockBuffer {
    /// Create an empty, open buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one captured block. O(1) amortized; performs no logging or IO,
    /// safe to call from the audio callback.
    ///
    /// Appending after [`flush`](Self::flush) is a contract violation: it
    /// fails a debug assertion in development builds and is silently ignored
    /// in release builds. Returns whether the block was accepted.
    pub fn append(&self, block: Vec<i16>) -> bool {
        let mut state = self.inner.lock();
        if state.closed {
            debug_assert!(false, "append after flush");
            return false;
        }
        state.total_samples += block.len();
        state.blocks.push(block);
        true
    }

    /// Concatenate all appended blocks in arrival order and close the buffer.
    /// A second flush returns an empty vec.
    #[must_use]
    pub fn flush(&self) -> Vec<i16> {
        let mut state = self.inner.lock();
        state.closed = true;
        let mut samples = Vec::with_capacity(state.total_samples);
        for block in state.blocks.drain(..) {
            samples.extend_from_slice(&block);
        }
        state.total_samples = 0;
        samples
    }

    /// Whether no samples have been appended (or the buffer was flushed).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().total_samples == 0
    }

    /// Total samples appended so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().total_samples
    }

    /// Number of blocks appended so far.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.inner.lock().blocks.len()
    }
}
