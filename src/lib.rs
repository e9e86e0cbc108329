//! Serial Bridge - Web Serial for sandboxed code, backed by a host device.
//!
//! Client code written against the Web Serial API runs unmodified inside a
//! sandboxed context, while the bytes are carried by a real or simulated
//! serial device that only a privileged host process can reach.
//!
//! # Architecture
//!
//! The bridge follows a queue/drain model:
//!
//! - **Sandbox**: every polyfilled call becomes one [`Call`] on the sandbox's
//!   queue, paired with a pending slot
//! - **Host**: a drain loop pulls calls in FIFO order and submits them to the
//!   [`Dispatcher`](host::Dispatcher) without waiting; replies and read
//!   deliveries go back as plain JSON frames
//!
//! Key design principles:
//!
//! - No memory is shared across the boundary; only JSON text frames cross it
//! - Calls on one port complete in pull order; ports run concurrently
//! - Failures travel as tagged [`Outcome`] values and become [`Error`]s only
//!   in the polyfill
//! - Inbound bytes are coalesced per port and delivered once per quiet window
//!
//! # Quick Start
//!
//! ```no_run
//! use serial_bridge::{Bridge, Result, SerialOptions, SerialPortRequestOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let bridge = Bridge::builder()
//!         .device("/tmp/simavr-uart0")
//!         .build()
//!         .await?;
//!
//!     let serial = bridge.sandbox().serial();
//!     let port = serial.request_port(SerialPortRequestOptions::default()).await?;
//!     port.open(SerialOptions::new(9600)).await?;
//!
//!     if let Some(writer) = port.writable() {
//!         writer.write(b"hello").await?;
//!     }
//!     if let Some(reader) = port.readable() {
//!         let chunk = reader.read().await;
//!         println!("{chunk:?}");
//!     }
//!
//!     port.close().await?;
//!     bridge.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`boundary`] | In-memory and WebSocket frame links |
//! | [`bridge`] | Host entry point, configuration, script injection |
//! | [`device`] | Serial transports and the simulator process |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`host`] | Port table, dispatcher, drain loop, read coalescing |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`polyfill`] | Web Serial surface: [`Serial`], [`SerialPort`] |
//! | [`protocol`] | Wire message types |
//! | [`sandbox`] | Per-sandbox queue and delivery channels |

// ============================================================================
// Modules
// ============================================================================

/// Sandbox ↔ host frame links.
pub mod boundary;

/// Host entry point and configuration.
///
/// Use [`Bridge::builder()`] to create a configured bridge.
pub mod bridge;

/// Serial transports and the simulated board.
pub mod device;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Port Session Table, Host Dispatcher and Drain Loop.
pub mod host;

/// Type-safe identifiers for calls and ports.
pub mod identifiers;

/// Compatibility Polyfill.
pub mod polyfill;

/// Wire protocol message types.
pub mod protocol;

/// Per-sandbox context.
pub mod sandbox;

// ============================================================================
// Re-exports
// ============================================================================

// Boundary types
pub use boundary::{BoundaryServer, Link};

// Bridge types
pub use bridge::{Bridge, BridgeBuilder, BridgeOptions, InjectionRule, polyfill_source};

// Device types
pub use device::{
    Board, BoardCommand, ControlLines, LineConfig, NativeTransport, SerialDevice,
    SerialTransport, SimulatedTransport,
};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{CallId, PortId};

// Polyfill types
pub use polyfill::{PortReader, PortWriter, Serial, SerialPort};

// Protocol types
pub use protocol::{
    Call, Fault, FaultKind, Method, Outcome, PortInfo, SerialOptions, SerialOutputSignals,
    SerialPortFilter, SerialPortRequestOptions,
};

// Sandbox types
pub use sandbox::Sandbox;
