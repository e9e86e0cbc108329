//! Sandboxed execution context.
//!
//! A [`Sandbox`] owns everything one client context needs to reach the
//! host: the Call Queue (the sending half of its link), the table of
//! pending slots and the per-port delivery channels. Several sandboxes can
//! be attached to one host at the same time.

// ============================================================================
// Submodules
// ============================================================================

/// Sandbox context and event loop.
pub mod context;

// ============================================================================
// Re-exports
// ============================================================================

pub use context::{Inbox, Sandbox};
