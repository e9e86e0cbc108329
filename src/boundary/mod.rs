//! Sandbox ↔ host boundary.
//!
//! The two sides share no memory. They exchange JSON text frames over a
//! [`Link`]: either an in-memory channel pair (same process) or a WebSocket
//! (sandbox in a browser or another process).
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐                              ┌─────────────────┐
//! │  Sandbox        │        Call frames           │  Host           │
//! │                 │─────────────────────────────►│                 │
//! │  Call Queue     │                              │  Drain Loop     │
//! │  Polyfill       │◄─────────────────────────────│  Dispatcher     │
//! │                 │    Reply / Delivery frames   │                 │
//! └─────────────────┘                              └─────────────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `link` | In-memory frame channel |
//! | `websocket` | WebSocket server, client and pump |

// ============================================================================
// Submodules
// ============================================================================

/// In-memory frame channel.
pub mod link;

/// WebSocket carriage for links.
pub mod websocket;

// ============================================================================
// Re-exports
// ============================================================================

pub use link::{FrameReceiver, FrameSender, Link, pair};
pub use websocket::{BoundaryServer, connect};
