//! Serial devices reachable from the host.
//!
//! The host dispatcher talks to devices only through the [`SerialTransport`]
//! and [`SerialDevice`] traits, so a real port, the simulated echo device
//! and test doubles are interchangeable.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`NativeTransport`] | OS serial path via the `serialport` crate |
//! | [`SimulatedTransport`] | In-memory echo device with failure injection |
//! | [`Board`] | Simulator process that publishes a serial path |
//!
//! # Line Configuration
//!
//! Every open uses 8 data bits, no parity and 1 stop bit; only the baud rate
//! comes from the caller.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::io;

use async_trait::async_trait;
use serialport::{DataBits, Parity, StopBits};
use tokio::sync::mpsc;

use crate::protocol::{SerialOptions, SerialOutputSignals};

// ============================================================================
// Submodules
// ============================================================================

/// Simulator process management.
pub mod board;

/// OS serial ports.
pub mod native;

/// In-memory simulated device.
pub mod sim;

// ============================================================================
// Re-exports
// ============================================================================

pub use board::{Board, BoardCommand, DEFAULT_PORT_PATH};
pub use native::NativeTransport;
pub use sim::SimulatedTransport;

// ============================================================================
// Types
// ============================================================================

/// Receiver of raw inbound chunks, in arrival order.
pub type Incoming = mpsc::UnboundedReceiver<Vec<u8>>;

// ============================================================================
// LineConfig
// ============================================================================

/// Line settings used to open a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineConfig {
    /// Bits per second.
    pub baud_rate: u32,
    /// Always [`DataBits::Eight`].
    pub data_bits: DataBits,
    /// Always [`Parity::None`].
    pub parity: Parity,
    /// Always [`StopBits::One`].
    pub stop_bits: StopBits,
}

impl LineConfig {
    /// 8N1 at the given baud rate.
    #[inline]
    #[must_use]
    pub const fn eight_n_one(baud_rate: u32) -> Self {
        Self {
            baud_rate,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
        }
    }
}

impl From<&SerialOptions> for LineConfig {
    fn from(options: &SerialOptions) -> Self {
        Self::eight_n_one(options.baud_rate)
    }
}

impl fmt::Display for LineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} 8N1", self.baud_rate)
    }
}

// ============================================================================
// ControlLines
// ============================================================================

/// Resolved control-line states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlLines {
    /// Data terminal ready.
    pub dtr: bool,
    /// Request to send.
    pub rts: bool,
    /// Line break.
    pub brk: bool,
}

impl Default for ControlLines {
    /// DTR and RTS asserted, break clear.
    fn default() -> Self {
        Self {
            dtr: true,
            rts: true,
            brk: false,
        }
    }
}

impl From<&SerialOutputSignals> for ControlLines {
    fn from(signals: &SerialOutputSignals) -> Self {
        let defaults = Self::default();
        Self {
            dtr: signals.data_terminal_ready.unwrap_or(defaults.dtr),
            rts: signals.request_to_send.unwrap_or(defaults.rts),
            brk: signals.brk.unwrap_or(defaults.brk),
        }
    }
}

// ============================================================================
// Traits
// ============================================================================

/// Something that can open serial devices.
#[async_trait]
pub trait SerialTransport: Send + Sync + 'static {
    /// Opens the device with the given line settings.
    async fn open(&self, config: LineConfig) -> io::Result<Box<dyn SerialDevice>>;
}

/// An open serial device.
#[async_trait]
pub trait SerialDevice: Send + Sync {
    /// Writes all of `data`, in order.
    async fn write(&mut self, data: &[u8]) -> io::Result<()>;

    /// Drives DTR, RTS and break.
    async fn set_control_lines(&mut self, lines: ControlLines) -> io::Result<()>;

    /// Takes the inbound byte stream.
    ///
    /// Returns `None` once it has been taken.
    fn take_incoming(&mut self) -> Option<Incoming>;

    /// Releases the device.
    async fn close(self: Box<Self>) -> io::Result<()>;
}

// ============================================================================
// Tests
// ============================================================================
