//! Privileged host side of the bridge.
//!
//! # Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`PortTable`] | PortId → session, owns device lifecycle |
//! | [`Dispatcher`] | Fixed method set against the table and transport |
//! | [`DrainLoop`] | Pulls calls from one sandbox and pushes replies back |
//! | [`coalesce`](coalesce::coalesce) | Debounces inbound bytes into deliveries |
//!
//! # Ordering
//!
//! Calls are pulled in FIFO order. Calls naming the same port complete in
//! pull order; calls on different ports and port-less calls may complete
//! in any order relative to each other.

// ============================================================================
// Submodules
// ============================================================================

/// Read coalescing.
pub mod coalesce;

/// Host Dispatcher.
pub mod dispatcher;

/// Drain Loop.
pub mod drain;

/// Port Session Table.
pub mod table;

// ============================================================================
// Re-exports
// ============================================================================

pub use coalesce::{DEFAULT_COALESCE_WINDOW, ReadBuffer};
pub use dispatcher::Dispatcher;
pub use drain::{DrainLoop, Responder};
pub use table::{OpenHandle, PortSession, PortTable};
