//! Wire protocol between the sandbox and the host.
//!
//! Every value crossing the boundary is plain JSON: identifiers, numbers and
//! arrays of bytes. Nothing else is shared between the two sides.
//!
//! # Protocol Overview
//!
//! | Message Type | Direction | Purpose |
//! |--------------|-----------|---------|
//! | [`Call`] | Sandbox → Host | One polyfilled API invocation |
//! | [`Reply`] | Host → Sandbox | Tagged outcome for a call |
//! | [`Delivery`] | Host → Sandbox | Coalesced inbound bytes for a port |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `call` | Call frames and the fixed method set |
//! | `message` | Replies, outcomes, faults and deliveries |
//! | `params` | Web Serial parameter dictionaries |

// ============================================================================
// Submodules
// ============================================================================

/// Call frames and the fixed method set.
pub mod call;

/// Host → sandbox messages.
pub mod message;

/// Web Serial parameter dictionaries.
pub mod params;

// ============================================================================
// Re-exports
// ============================================================================

pub use call::{Call, Method};
pub use message::{Delivery, Fault, FaultKind, HostMessage, Outcome, Reply};
pub use params::{
    EMULATED_PRODUCT_ID, EMULATED_VENDOR_ID, PortInfo, SerialOptions, SerialOutputSignals,
    SerialPortFilter, SerialPortRequestOptions,
};
