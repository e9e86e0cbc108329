//! Read coalescing.
//!
//! Serial devices hand over bytes in whatever chunk sizes the driver
//! happens to produce. The coalescer accumulates them in a [`ReadBuffer`]
//! and delivers the whole buffer once no new bytes have arrived for one
//! window. Every arrival restarts the window.
//!
//! ```text
//! chunks:   [1] [2,3]      [4]
//! time:     0   5    ...   80
//! window:   |----25ms----|     |----25ms----|
//! deliver:               [1,2,3]            [4]
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use tokio::time::timeout;
use tracing::trace;

use crate::device::Incoming;

// ============================================================================
// Constants
// ============================================================================

/// Default quiet period before a buffer is delivered.
pub const DEFAULT_COALESCE_WINDOW: Duration = Duration::from_millis(25);

// ============================================================================
// ReadBuffer
// ============================================================================

/// Ordered byte accumulator for one open port.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReadBuffer {
    bytes: Vec<u8>,
}

impl ReadBuffer {
    /// Creates an empty buffer.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a chunk.
    #[inline]
    pub fn push(&mut self, chunk: &[u8]) {
        self.bytes.extend_from_slice(chunk);
    }

    /// Returns the number of buffered bytes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns `true` if nothing is buffered.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Takes the buffered bytes, leaving the buffer empty.
    ///
    /// Returns `None` if nothing was buffered.
    #[must_use]
    pub fn take(&mut self) -> Option<Vec<u8>> {
        if self.bytes.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.bytes))
        }
    }
}

// ============================================================================
// Coalescer
// ============================================================================

/// Drains `incoming`, calling `deliver` once per quiet window.
///
/// Returns when the device stream ends; bytes still buffered at that point
/// are delivered immediately. Aborting the task discards the buffer.
pub async fn coalesce<F>(mut incoming: Incoming, window: Duration, mut deliver: F)
where
    F: FnMut(Vec<u8>),
{
    let mut buffer = ReadBuffer::new();

    loop {
        let next = if buffer.is_empty() {
            incoming.recv().await
        } else {
            match timeout(window, incoming.recv()).await {
                Ok(next) => next,
                Err(_) => {
                    if let Some(chunk) = buffer.take() {
                        trace!(len = chunk.len(), "Window expired");
                        deliver(chunk);
                    }
                    continue;
                }
            }
        };

        match next {
            Some(chunk) => buffer.push(&chunk),
            None => {
                if let Some(chunk) = buffer.take() {
                    trace!(len = chunk.len(), "Stream ended; flushing");
                    deliver(chunk);
                }
                break;
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
