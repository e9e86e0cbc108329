//! Error types for the serial bridge.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use serial_bridge::{Result, SerialOptions};
//!
//! async fn example(serial: &Serial) -> Result<()> {
//!     let port = serial.request_port(Default::default()).await?;
//!     port.open(SerialOptions::new(115_200)).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`], [`Error::BoardLaunchFailed`] |
//! | Protocol misuse | [`Error::ProtocolMisuse`], [`Error::UnknownPort`], [`Error::AlreadyOpen`], [`Error::NotOpen`] |
//! | Hardware | [`Error::Transport`] |
//! | Boundary | [`Error::Protocol`], [`Error::SandboxClosed`], [`Error::WebSocket`], [`Error::ChannelClosed`] |
//! | External | [`Error::Io`], [`Error::Json`] |
//!
//! Protocol misuse means the caller did something the bridge never allows;
//! it is never retried. Transport errors come from the device itself and are
//! surfaced to the caller unchanged.

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio::sync::oneshot::error::RecvError;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::identifiers::PortId;
use crate::protocol::{Fault, FaultKind};

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when bridge configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Failed to launch the simulated board process.
    #[error("Failed to launch board: {message}")]
    BoardLaunchFailed {
        /// Description of the launch failure.
        message: String,
    },

    // ========================================================================
    // Protocol Misuse
    // ========================================================================
    /// Generic caller error reported by the host.
    #[error("Protocol misuse: {message}")]
    ProtocolMisuse {
        /// Description of the misuse.
        message: String,
    },

    /// Operation named a port that was never discovered.
    #[error("Unknown port: {port_id}")]
    UnknownPort {
        /// The unknown port ID.
        port_id: PortId,
    },

    /// Open was requested on a port that is already open.
    #[error("Port already open: {port_id}")]
    AlreadyOpen {
        /// The port that is already open.
        port_id: PortId,
    },

    /// Operation requires an open port but the port is closed.
    #[error("Port not open: {port_id}")]
    NotOpen {
        /// The closed port.
        port_id: PortId,
    },

    // ========================================================================
    // Hardware Errors
    // ========================================================================
    /// Serial device failure (open, write, close or control lines).
    #[error("Transport error: {message}")]
    Transport {
        /// Description reported by the device.
        message: String,
    },

    // ========================================================================
    // Boundary Errors
    // ========================================================================
    /// Malformed frame or unexpected reply.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    /// The sandbox/host link was torn down.
    #[error("Sandbox closed")]
    SandboxClosed,

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// Channel receive error.
    #[error("Channel closed")]
    ChannelClosed(#[from] RecvError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a board launch error.
    #[inline]
    pub fn board_launch_failed(err: IoError) -> Self {
        Self::BoardLaunchFailed {
            message: err.to_string(),
        }
    }

    /// Creates a protocol misuse error.
    #[inline]
    pub fn protocol_misuse(message: impl Into<String>) -> Self {
        Self::ProtocolMisuse {
            message: message.into(),
        }
    }

    /// Creates an unknown port error.
    #[inline]
    pub fn unknown_port(port_id: PortId) -> Self {
        Self::UnknownPort { port_id }
    }

    /// Creates an already open error.
    #[inline]
    pub fn already_open(port_id: PortId) -> Self {
        Self::AlreadyOpen { port_id }
    }

    /// Creates a not open error.
    #[inline]
    pub fn not_open(port_id: PortId) -> Self {
        Self::NotOpen { port_id }
    }

    /// Creates a transport error.
    #[inline]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }
}

// ============================================================================
// Fault Conversion
// ============================================================================

impl Error {
    /// Converts a failure reported by the host into an error.
    ///
    /// `port_id` is attached to the port-specific variants; without one they
    /// degrade to [`Error::ProtocolMisuse`].
    #[must_use]
    pub fn from_fault(fault: Fault, port_id: Option<&PortId>) -> Self {
        match (fault.kind, port_id) {
            (FaultKind::Transport, _) => Self::transport(fault.message),
            (FaultKind::UnknownPort, Some(id)) => Self::unknown_port(id.clone()),
            (FaultKind::AlreadyOpen, Some(id)) => Self::already_open(id.clone()),
            (FaultKind::NotOpen, Some(id)) => Self::not_open(id.clone()),
            _ => Self::protocol_misuse(fault.message),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this error signals a caller bug.
    #[inline]
    #[must_use]
    pub fn is_protocol_misuse(&self) -> bool {
        matches!(
            self,
            Self::ProtocolMisuse { .. }
                | Self::UnknownPort { .. }
                | Self::AlreadyOpen { .. }
                | Self::NotOpen { .. }
        )
    }

    /// Returns `true` if this error came from the serial device.
    #[inline]
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    /// Returns `true` if the sandbox/host link failed.
    #[inline]
    #[must_use]
    pub fn is_boundary_error(&self) -> bool {
        matches!(
            self,
            Self::Protocol { .. } | Self::SandboxClosed | Self::WebSocket(_) | Self::ChannelClosed(_)
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
