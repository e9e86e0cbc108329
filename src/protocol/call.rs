//! Call frames sent from the sandbox to the host.
//!
//! # Format
//!
//! ```json
//! {
//!   "callId": "uuid",
//!   "method": "openPort",
//!   "args": ["P1", { "baudRate": 9600 }]
//! }
//! ```
//!
//! `args` is always an ordered list matching the method's signature:
//!
//! | Method | Args |
//! |--------|------|
//! | `requestPort` | `[options]` |
//! | `listPorts` | `[]` |
//! | `openPort` | `[portId, options]` |
//! | `readPort` | `[portId]` |
//! | `writePort` | `[portId, bytes]` |
//! | `closePort` | `[portId]` |
//! | `setSignals` | `[portId, signals]` |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::{Error, Result};
use crate::identifiers::{CallId, PortId};

use super::params::{SerialOptions, SerialOutputSignals, SerialPortRequestOptions};

// ============================================================================
// Method
// ============================================================================

/// The fixed method set understood by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Method {
    /// Reserve a new port.
    RequestPort,
    /// List every reserved port.
    ListPorts,
    /// Attach a device handle to a port.
    OpenPort,
    /// Start delivering inbound bytes.
    ReadPort,
    /// Send bytes to the device.
    WritePort,
    /// Release the device handle.
    ClosePort,
    /// Drive the control lines.
    SetSignals,
}

impl Method {
    /// Returns the wire name of the method.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RequestPort => "requestPort",
            Self::ListPorts => "listPorts",
            Self::OpenPort => "openPort",
            Self::ReadPort => "readPort",
            Self::WritePort => "writePort",
            Self::ClosePort => "closePort",
            Self::SetSignals => "setSignals",
        }
    }

    /// Returns `true` if the first argument names a port.
    #[inline]
    #[must_use]
    pub const fn is_port_scoped(self) -> bool {
        !matches!(self, Self::RequestPort | Self::ListPorts)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Call
// ============================================================================

/// A single queued invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Call {
    /// Unique identifier for reply correlation.
    pub call_id: CallId,

    /// Method to invoke.
    pub method: Method,

    /// Ordered arguments.
    #[serde(default)]
    pub args: Vec<Value>,
}

impl Call {
    /// Creates a call with an auto-generated ID.
    #[inline]
    #[must_use]
    pub fn new(method: Method, args: Vec<Value>) -> Self {
        Self {
            call_id: CallId::generate(),
            method,
            args,
        }
    }

    /// `requestPort(options)`.
    #[must_use]
    pub fn request_port(options: &SerialPortRequestOptions) -> Self {
        Self::new(Method::RequestPort, vec![json!(options)])
    }

    /// `listPorts()`.
    #[must_use]
    pub fn list_ports() -> Self {
        Self::new(Method::ListPorts, Vec::new())
    }

    /// `openPort(id, options)`.
    #[must_use]
    pub fn open_port(port_id: &PortId, options: &SerialOptions) -> Self {
        Self::new(Method::OpenPort, vec![json!(port_id), json!(options)])
    }

    /// `readPort(id)`.
    #[must_use]
    pub fn read_port(port_id: &PortId) -> Self {
        Self::new(Method::ReadPort, vec![json!(port_id)])
    }

    /// `writePort(id, bytes)`.
    #[must_use]
    pub fn write_port(port_id: &PortId, data: &[u8]) -> Self {
        Self::new(Method::WritePort, vec![json!(port_id), json!(data)])
    }

    /// `closePort(id)`.
    #[must_use]
    pub fn close_port(port_id: &PortId) -> Self {
        Self::new(Method::ClosePort, vec![json!(port_id)])
    }

    /// `setSignals(id, signals)`.
    #[must_use]
    pub fn set_signals(port_id: &PortId, signals: &SerialOutputSignals) -> Self {
        Self::new(Method::SetSignals, vec![json!(port_id), json!(signals)])
    }
}

// ============================================================================
// Call - Argument Access
// ============================================================================

impl Call {
    /// Returns the port named by the first argument.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ProtocolMisuse`] if the method is not port-scoped or
    /// the first argument is not a string.
    pub fn port_id(&self) -> Result<PortId> {
        if !self.method.is_port_scoped() {
            return Err(Error::protocol_misuse(format!(
                "{} does not take a port",
                self.method
            )));
        }

        self.args
            .first()
            .and_then(Value::as_str)
            .map(PortId::from_raw)
            .ok_or_else(|| {
                Error::protocol_misuse(format!("{} requires a port id argument", self.method))
            })
    }

    /// Decodes the argument list into a typed tuple.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ProtocolMisuse`] if the arguments do not match `T`.
    pub fn decode_args<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(Value::Array(self.args.clone())).map_err(|e| {
            Error::protocol_misuse(format!("invalid arguments for {}: {e}", self.method))
        })
    }

    /// Extracts a call ID from a frame that failed to decode as a [`Call`].
    ///
    /// Lets the host answer an unknown method instead of leaving the caller
    /// suspended.
    #[must_use]
    pub fn recover_id(frame: &str) -> Option<CallId> {
        let value: Value = serde_json::from_str(frame).ok()?;
        serde_json::from_value(value.get("callId")?.clone()).ok()
    }
}

// ============================================================================
// Tests
// ============================================================================
