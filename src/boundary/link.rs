//! In-memory frame link.
//!
//! A [`Link`] is one end of a bidirectional channel of JSON text frames.
//! [`pair`] returns two connected ends: one for the host's drain loop and
//! one for the sandbox. Dropping an end closes the direction it sends on,
//! which the other end observes as `None` from [`FrameReceiver::recv`].

// ============================================================================
// Imports
// ============================================================================

use serde::Serialize;
use serde_json::to_string;
use tokio::sync::mpsc;

use crate::error::{Error, Result};

// ============================================================================
// Link
// ============================================================================

/// One end of a bidirectional frame channel.
#[derive(Debug)]
pub struct Link {
    /// Outgoing frames.
    sender: FrameSender,
    /// Incoming frames.
    receiver: FrameReceiver,
}

/// Creates two connected link ends.
#[must_use]
pub fn pair() -> (Link, Link) {
    let (a_tx, a_rx) = mpsc::unbounded_channel();
    let (b_tx, b_rx) = mpsc::unbounded_channel();

    let a = Link {
        sender: FrameSender(a_tx),
        receiver: FrameReceiver(b_rx),
    };
    let b = Link {
        sender: FrameSender(b_tx),
        receiver: FrameReceiver(a_rx),
    };

    (a, b)
}

impl Link {
    /// Splits the link into its sending and receiving halves.
    #[inline]
    #[must_use]
    pub fn split(self) -> (FrameSender, FrameReceiver) {
        (self.sender, self.receiver)
    }
}

// ============================================================================
// FrameSender
// ============================================================================

/// Sending half of a [`Link`].
///
/// Cloning is cheap; the direction closes when every clone is dropped.
#[derive(Debug, Clone)]
pub struct FrameSender(mpsc::UnboundedSender<String>);

impl FrameSender {
    /// Sends a raw text frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SandboxClosed`] if the other end is gone.
    pub fn send(&self, frame: String) -> Result<()> {
        self.0.send(frame).map_err(|_| Error::SandboxClosed)
    }

    /// Serializes `message` and sends it as one frame.
    ///
    /// # Errors
    ///
    /// - [`Error::Json`] if serialization fails
    /// - [`Error::SandboxClosed`] if the other end is gone
    pub fn send_json<T: Serialize>(&self, message: &T) -> Result<()> {
        self.send(to_string(message)?)
    }

    /// Returns `true` if the receiving end has been dropped.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.0.is_closed()
    }
}

// ============================================================================
// FrameReceiver
// ============================================================================

/// Receiving half of a [`Link`].
#[derive(Debug)]
pub struct FrameReceiver(mpsc::UnboundedReceiver<String>);

impl FrameReceiver {
    /// Waits for the next frame.
    ///
    /// Returns `None` once every sender on the other end is dropped and all
    /// queued frames have been consumed.
    pub async fn recv(&mut self) -> Option<String> {
        self.0.recv().await
    }

    /// Returns a queued frame without waiting.
    pub fn try_recv(&mut self) -> Option<String> {
        self.0.try_recv().ok()
    }
}

// ============================================================================
// Tests
// ============================================================================
