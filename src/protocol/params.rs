//! Parameter types shared by the polyfill and the host.
//!
//! Field names follow the Web Serial dictionaries (`baudRate`,
//! `dataTerminalReady`, `usbVendorId`, ...) so the same JSON is produced by
//! the Rust polyfill and by the injected JavaScript one.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};

// ============================================================================
// Constants
// ============================================================================

/// USB vendor ID reported for every emulated port (FTDI).
pub const EMULATED_VENDOR_ID: u16 = 0x0403;

/// USB product ID reported for every emulated port (FT232R).
pub const EMULATED_PRODUCT_ID: u16 = 0x6001;

// ============================================================================
// SerialOptions
// ============================================================================

/// Options passed to `SerialPort.open`.
///
/// Only the baud rate is honoured; the line is always 8 data bits, no
/// parity, 1 stop bit. Other Web Serial fields are accepted and ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerialOptions {
    /// Line speed in bits per second.
    pub baud_rate: u32,
}

impl SerialOptions {
    /// Creates options for the given baud rate.
    #[inline]
    #[must_use]
    pub const fn new(baud_rate: u32) -> Self {
        Self { baud_rate }
    }
}

// ============================================================================
// SerialOutputSignals
// ============================================================================

/// Control-line states passed to `SerialPort.setSignals`.
///
/// Absent fields are left to the transport's defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerialOutputSignals {
    /// Data terminal ready.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_terminal_ready: Option<bool>,

    /// Request to send.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_to_send: Option<bool>,

    /// Line break.
    #[serde(rename = "break", default, skip_serializing_if = "Option::is_none")]
    pub brk: Option<bool>,
}

impl SerialOutputSignals {
    /// Creates an empty signal set.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            data_terminal_ready: None,
            request_to_send: None,
            brk: None,
        }
    }

    /// Sets data terminal ready.
    #[inline]
    #[must_use]
    pub const fn with_data_terminal_ready(mut self, value: bool) -> Self {
        self.data_terminal_ready = Some(value);
        self
    }

    /// Sets request to send.
    #[inline]
    #[must_use]
    pub const fn with_request_to_send(mut self, value: bool) -> Self {
        self.request_to_send = Some(value);
        self
    }

    /// Sets line break.
    #[inline]
    #[must_use]
    pub const fn with_break(mut self, value: bool) -> Self {
        self.brk = Some(value);
        self
    }
}

// ============================================================================
// Request Options
// ============================================================================

/// Options passed to `navigator.serial.requestPort`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerialPortRequestOptions {
    /// Device filters supplied by the client.
    #[serde(default)]
    pub filters: Vec<SerialPortFilter>,
}

/// One client-side device filter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerialPortFilter {
    /// Required USB vendor ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usb_vendor_id: Option<u16>,

    /// Required USB product ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usb_product_id: Option<u16>,
}

impl SerialPortFilter {
    /// Returns `true` if `info` satisfies this filter.
    #[must_use]
    pub fn matches(&self, info: &PortInfo) -> bool {
        self.usb_vendor_id.is_none_or(|id| id == info.usb_vendor_id)
            && self.usb_product_id.is_none_or(|id| id == info.usb_product_id)
    }
}

// ============================================================================
// PortInfo
// ============================================================================

/// Identity returned by `SerialPort.getInfo`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortInfo {
    /// USB vendor ID.
    pub usb_vendor_id: u16,
    /// USB product ID.
    pub usb_product_id: u16,
}

impl PortInfo {
    /// The fixed identity of every emulated port.
    pub const EMULATED: Self = Self {
        usb_vendor_id: EMULATED_VENDOR_ID,
        usb_product_id: EMULATED_PRODUCT_ID,
    };
}

// ============================================================================
// Tests
// ============================================================================
