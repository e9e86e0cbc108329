//! Compatibility Polyfill.
//!
//! The Web Serial surface a sandboxed client programs against, implemented
//! entirely as calls through the sandbox's queue.
//!
//! | Web Serial | Here |
//! |------------|------|
//! | `navigator.serial.requestPort()` | [`Serial::request_port`] |
//! | `navigator.serial.getPorts()` | [`Serial::get_ports`] |
//! | `port.open()` / `port.close()` | [`SerialPort::open`] / [`SerialPort::close`] |
//! | `port.setSignals()` | [`SerialPort::set_signals`] |
//! | `port.getInfo()` | [`SerialPort::get_info`] |
//! | `port.readable` | [`SerialPort::readable`] → [`PortReader`] |
//! | `port.writable` | [`SerialPort::writable`] → [`PortWriter`] |
//!
//! Host outcomes become errors here and nowhere else.

// ============================================================================
// Imports
// ============================================================================

use serde_json::Value;

use crate::error::Result;
use crate::identifiers::PortId;
use crate::protocol::Call;
use crate::sandbox::Sandbox;

// ============================================================================
// Submodules
// ============================================================================

/// `SerialPort` and its streams.
pub mod port;

/// `navigator.serial`.
pub mod serial;

// ============================================================================
// Re-exports
// ============================================================================

pub use port::{PortReader, PortWriter, SerialPort};
pub use serial::Serial;

// ============================================================================
// Helpers
// ============================================================================

/// Issues a call and converts its outcome into a result.
async fn invoke(sandbox: &Sandbox, call: Call, port_id: Option<&PortId>) -> Result<Value> {
    sandbox.call(call).await?.into_result(port_id)
}
