//! Type-safe identifiers for bridge entities.
//!
//! Newtype wrappers keep call identifiers and port identifiers from being
//! mixed up at compile time. Both serialize transparently so they cross the
//! sandbox boundary as plain strings.
//!
//! | Type | Origin | Format |
//! |------|--------|--------|
//! | [`CallId`] | Sandbox, one per call | UUID v4 |
//! | [`PortId`] | Host, one per discovery | `P<n>` |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// CallId
// ============================================================================

/// Correlates a queued call with the reply that resolves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallId(Uuid);

impl CallId {
    /// Generates a fresh random call identifier.
    #[inline]
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    #[inline]
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ============================================================================
// PortId
// ============================================================================

/// Opaque token naming a logical serial port.
///
/// A `PortId` is allocated by discovery and stays valid whether or not a
/// device handle is currently attached to it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PortId(String);

impl PortId {
    /// Builds the identifier for the `index`-th reserved port (1-based).
    #[inline]
    #[must_use]
    pub fn from_index(index: u32) -> Self {
        Self(format!("P{index}"))
    }

    /// Wraps an identifier received from the other side of the boundary.
    #[inline]
    #[must_use]
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Returns the identifier as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PortId {
    fn from(raw: &str) -> Self {
        Self::from_raw(raw)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_ids_are_unique() {
        let a = CallId::generate();
        let b = CallId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn test_call_id_serializes_as_string() {
        let id = CallId::generate();
        let json = serde_json::to_string(&id).expect("serialize");
        assert_eq!(json, format!("\"{id}\""));
    }

    #[test]
    fn test_port_id_format() {
        assert_eq!(PortId::from_index(1).as_str(), "P1");
        assert_eq!(PortId::from_index(42).to_string(), "P42");
    }

    #[test]
    fn test_port_id_transparent_serde() {
        let id: PortId = serde_json::from_str("\"P7\"").expect("parse");
        assert_eq!(id, PortId::from("P7"));
        assert_eq!(serde_json::to_string(&id).expect("serialize"), "\"P7\"");
    }
}
