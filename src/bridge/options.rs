//! Bridge configuration values.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use serial_bridge::BridgeOptions;
//!
//! let options = BridgeOptions::new()
//!     .with_coalesce_window(Duration::from_millis(10))
//!     .with_device_path("/dev/ttyUSB0");
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::device::{BoardCommand, DEFAULT_PORT_PATH};
use crate::host::DEFAULT_COALESCE_WINDOW;

// ============================================================================
// Constants
// ============================================================================

/// Default time a board gets to publish its serial path.
pub const DEFAULT_BOARD_READY_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// BridgeOptions
// ============================================================================

/// Host-side configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeOptions {
    /// Quiet period before buffered bytes are delivered.
    pub coalesce_window: Duration,

    /// Serial path to open; `None` uses [`DEFAULT_PORT_PATH`].
    pub device_path: Option<PathBuf>,

    /// Simulator to start before serving.
    pub board: Option<BoardCommand>,

    /// Time the board gets to publish its serial path.
    pub board_ready_timeout: Duration,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl BridgeOptions {
    /// Creates options with default settings.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            coalesce_window: DEFAULT_COALESCE_WINDOW,
            device_path: None,
            board: None,
            board_ready_timeout: DEFAULT_BOARD_READY_TIMEOUT,
        }
    }

    /// Returns the serial path to open.
    #[must_use]
    pub fn device_path(&self) -> &Path {
        self.device_path
            .as_deref()
            .unwrap_or_else(|| Path::new(DEFAULT_PORT_PATH))
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl BridgeOptions {
    /// Sets the coalescing window.
    #[inline]
    #[must_use]
    pub fn with_coalesce_window(mut self, window: Duration) -> Self {
        self.coalesce_window = window;
        self
    }

    /// Sets the serial path.
    #[inline]
    #[must_use]
    pub fn with_device_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.device_path = Some(path.into());
        self
    }

    /// Starts `command` as the board.
    #[inline]
    #[must_use]
    pub fn with_board(mut self, command: BoardCommand) -> Self {
        self.board = Some(command);
        self
    }

    /// Sets how long the board gets to publish its serial path.
    #[inline]
    #[must_use]
    pub fn with_board_ready_timeout(mut self, limit: Duration) -> Self {
        self.board_ready_timeout = limit;
        self
    }
}

// ============================================================================
// Tests
// ============================================================================
