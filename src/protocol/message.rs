//! Messages sent from the host back into the sandbox.
//!
//! # Message Types
//!
//! | Type | Purpose |
//! |------|---------|
//! | `reply` | Resolves the pending slot of one call |
//! | `delivery` | Carries one coalesced chunk of inbound bytes for a port |
//!
//! # Format
//!
//! Success:
//! ```json
//! { "type": "reply", "callId": "uuid", "outcome": { "status": "success", "result": "P1" } }
//! ```
//!
//! Failure:
//! ```json
//! {
//!   "type": "reply",
//!   "callId": "uuid",
//!   "outcome": { "status": "failure", "fault": { "kind": "transport", "message": "EIO" } }
//! }
//! ```
//!
//! Delivery:
//! ```json
//! { "type": "delivery", "portId": "P1", "data": [1, 2, 3] }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::identifiers::{CallId, PortId};

// ============================================================================
// HostMessage
// ============================================================================

/// Any frame travelling host → sandbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum HostMessage {
    /// Completion of a call.
    Reply(Reply),
    /// Inbound bytes for a port.
    Delivery(Delivery),
}

// ============================================================================
// Reply
// ============================================================================

/// Completion of one call, correlated by its ID.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reply {
    /// Matches the call's `callId`.
    pub call_id: CallId,
    /// Tagged result.
    pub outcome: Outcome,
}

impl Reply {
    /// Creates a reply.
    #[inline]
    #[must_use]
    pub fn new(call_id: CallId, outcome: Outcome) -> Self {
        Self { call_id, outcome }
    }
}

// ============================================================================
// Outcome
// ============================================================================

/// Explicit success/failure result of a call.
///
/// Hardware failures travel as [`Outcome::Failure`] values and are only
/// turned into errors by the polyfill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Outcome {
    /// The call succeeded.
    Success {
        /// Method-specific result (`null` for unit results).
        #[serde(default)]
        result: Value,
    },
    /// The call failed.
    Failure {
        /// What went wrong.
        fault: Fault,
    },
}

impl Outcome {
    /// Success with a unit (`null`) result.
    #[inline]
    #[must_use]
    pub fn unit() -> Self {
        Self::Success {
            result: Value::Null,
        }
    }

    /// Success with a value.
    #[inline]
    #[must_use]
    pub fn success(result: Value) -> Self {
        Self::Success { result }
    }

    /// Failure with a fault.
    #[inline]
    #[must_use]
    pub fn failure(fault: Fault) -> Self {
        Self::Failure { fault }
    }

    /// Returns `true` if this is a success outcome.
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Converts the outcome into a result.
    ///
    /// `port_id` names the port the call targeted, if any.
    ///
    /// # Errors
    ///
    /// Returns the error matching the fault kind on failure.
    pub fn into_result(self, port_id: Option<&PortId>) -> Result<Value> {
        match self {
            Self::Success { result } => Ok(result),
            Self::Failure { fault } => Err(Error::from_fault(fault, port_id)),
        }
    }
}

impl From<Result<Value>> for Outcome {
    fn from(result: Result<Value>) -> Self {
        match result {
            Ok(value) => Self::success(value),
            Err(e) => Self::failure(Fault::from(&e)),
        }
    }
}

// ============================================================================
// Fault
// ============================================================================

/// Failure carried inside an [`Outcome`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fault {
    /// Failure class.
    pub kind: FaultKind,
    /// Human readable description.
    pub message: String,
}

impl Fault {
    /// Creates a fault.
    #[inline]
    #[must_use]
    pub fn new(kind: FaultKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<&Error> for Fault {
    fn from(err: &Error) -> Self {
        let kind = match err {
            Error::UnknownPort { .. } => FaultKind::UnknownPort,
            Error::AlreadyOpen { .. } => FaultKind::AlreadyOpen,
            Error::NotOpen { .. } => FaultKind::NotOpen,
            Error::Transport { .. } | Error::Io(_) => FaultKind::Transport,
            _ => FaultKind::ProtocolMisuse,
        };
        Self::new(kind, err.to_string())
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

/// Failure classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FaultKind {
    /// Caller bug not covered by a more specific kind.
    ProtocolMisuse,
    /// Port was never discovered.
    UnknownPort,
    /// Port is already open.
    AlreadyOpen,
    /// Port is not open.
    NotOpen,
    /// Device failure.
    Transport,
}

// ============================================================================
// Delivery
// ============================================================================

/// One coalesced chunk of bytes read from a port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Delivery {
    /// Port the bytes were read from.
    pub port_id: PortId,
    /// Bytes in arrival order.
    pub data: Vec<u8>,
}

// ============================================================================
// Tests
// ============================================================================
