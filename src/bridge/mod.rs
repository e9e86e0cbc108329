//! Host entry point and its glue.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Bridge`] | Owns the dispatcher and board; attaches sandboxes |
//! | [`BridgeBuilder`] | Fluent configuration builder |
//! | [`BridgeOptions`] | Plain configuration values |
//! | [`InjectionRule`] | Prepends the browser polyfill to a matching script |
//!
//! # Example
//!
//! ```ignore
//! use serial_bridge::{Bridge, BoundaryServer, InjectionRule};
//!
//! let bridge = Bridge::builder().device("/tmp/simavr-uart0").build().await?;
//! let server = BoundaryServer::bind_localhost().await?;
//! let rule = InjectionRule::polyfill("**/main.*.js", &server.ws_url())?;
//!
//! // Hand `rule` to the intercepting proxy, then:
//! bridge.serve(server).await;
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Fluent builder pattern for bridge configuration.
pub mod builder;

/// Core bridge implementation.
pub mod core;

/// Browser polyfill source and script injection.
pub mod inject;

/// Bridge configuration values.
pub mod options;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::BridgeBuilder;
pub use core::Bridge;
pub use inject::{InjectionRule, polyfill_source};
pub use options::BridgeOptions;
