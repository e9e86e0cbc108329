//! `navigator.serial` equivalent.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde_json::from_value;
use tracing::debug;

use crate::error::Result;
use crate::identifiers::PortId;
use crate::protocol::{Call, SerialPortRequestOptions};
use crate::sandbox::Sandbox;

use super::invoke;
use super::port::SerialPort;

// ============================================================================
// Serial
// ============================================================================

/// Port discovery for one sandbox.
///
/// # Example
///
/// ```ignore
/// let serial = sandbox.serial();
/// let port = serial.request_port(SerialPortRequestOptions::default()).await?;
/// assert_eq!(serial.get_ports().await?.len(), 1);
/// ```
#[derive(Clone)]
pub struct Serial {
    sandbox: Sandbox,
}

impl fmt::Debug for Serial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Serial")
            .field("pending", &self.sandbox.pending_count())
            .finish_non_exhaustive()
    }
}

impl Serial {
    /// Creates the surface for `sandbox`.
    pub(crate) fn new(sandbox: Sandbox) -> Self {
        Self { sandbox }
    }

    /// Asks the host for a new port.
    ///
    /// No device is touched until the port is opened.
    ///
    /// # Errors
    ///
    /// - [`Error::SandboxClosed`](crate::Error::SandboxClosed) if the host is gone
    /// - [`Error::Json`](crate::Error::Json) if the reply is not a port ID
    pub async fn request_port(&self, options: SerialPortRequestOptions) -> Result<SerialPort> {
        let value = invoke(&self.sandbox, Call::request_port(&options), None).await?;
        let port_id: PortId = from_value(value)?;

        debug!(port_id = %port_id, "Port granted");
        Ok(SerialPort::new(port_id, self.sandbox.clone()))
    }

    /// Returns a handle for every port the host knows, in creation order.
    ///
    /// Each call returns fresh handles with their own local state.
    ///
    /// # Errors
    ///
    /// Same as [`request_port`](Self::request_port).
    pub async fn get_ports(&self) -> Result<Vec<SerialPort>> {
        let value = invoke(&self.sandbox, Call::list_ports(), None).await?;
        let ids: Vec<PortId> = from_value(value)?;

        Ok(ids
            .into_iter()
            .map(|id| SerialPort::new(id, self.sandbox.clone()))
            .collect())
    }
}
