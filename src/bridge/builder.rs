//! Builder pattern for bridge configuration.
//!
//! # Example
//!
//! ```ignore
//! use serial_bridge::Bridge;
//!
//! let bridge = Bridge::builder()
//!     .device("/tmp/simavr-uart0")
//!     .build()
//!     .await?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::device::{Board, BoardCommand, NativeTransport, SerialTransport};
use crate::error::{Error, Result};

use super::core::Bridge;
use super::options::BridgeOptions;

// ============================================================================
// BridgeBuilder
// ============================================================================

/// Builder for configuring a [`Bridge`].
///
/// Use [`Bridge::builder()`] to create a new builder.
#[derive(Default, Clone)]
pub struct BridgeBuilder {
    options: BridgeOptions,
    /// Transport overriding the device path.
    transport: Option<Arc<dyn SerialTransport>>,
}

impl fmt::Debug for BridgeBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeBuilder")
            .field("options", &self.options)
            .field("custom_transport", &self.transport.is_some())
            .finish()
    }
}

// ============================================================================
// BridgeBuilder Implementation
// ============================================================================

impl BridgeBuilder {
    /// Creates a builder with default options.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces every option at once.
    #[inline]
    #[must_use]
    pub fn options(mut self, options: BridgeOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the OS serial path to open.
    #[inline]
    #[must_use]
    pub fn device(mut self, path: impl Into<PathBuf>) -> Self {
        self.options.device_path = Some(path.into());
        self
    }

    /// Uses a custom transport instead of an OS serial path.
    #[inline]
    #[must_use]
    pub fn transport(mut self, transport: impl SerialTransport) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Sets the coalescing window.
    #[inline]
    #[must_use]
    pub fn coalesce_window(mut self, window: Duration) -> Self {
        self.options.coalesce_window = window;
        self
    }

    /// Starts a simulator before serving and opens the path it publishes.
    #[inline]
    #[must_use]
    pub fn board(mut self, command: BoardCommand) -> Self {
        self.options.board = Some(command);
        self
    }

    /// Sets how long the board gets to publish its serial path.
    #[inline]
    #[must_use]
    pub fn board_ready_timeout(mut self, limit: Duration) -> Self {
        self.options.board_ready_timeout = limit;
        self
    }

    /// Builds the bridge, starting the board if one is configured.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the options are inconsistent
    /// - [`Error::BoardLaunchFailed`] if the board cannot be started
    pub async fn build(self) -> Result<Bridge> {
        self.validate()?;

        let Self { options, transport } = self;

        if let Some(transport) = transport {
            return Ok(Bridge::new(transport, options.coalesce_window, None));
        }

        let board = match options.board {
            Some(ref command) => {
                let mut board = Board::spawn(command)?;
                board.wait_for_port(options.board_ready_timeout).await?;
                Some(board)
            }
            None => None,
        };

        let path = board
            .as_ref()
            .map_or_else(|| options.device_path().to_path_buf(), |b| b.port_path().to_path_buf());

        Ok(Bridge::new(
            Arc::new(NativeTransport::new(path)),
            options.coalesce_window,
            board,
        ))
    }
}

// ============================================================================
// Validation
// ============================================================================

impl BridgeBuilder {
    fn validate(&self) -> Result<()> {
        if self.options.coalesce_window.is_zero() {
            return Err(Error::config(
                "Coalescing window must be greater than zero.\n\
                 Example: Bridge::builder().coalesce_window(Duration::from_millis(25))",
            ));
        }

        if self.transport.is_some() && self.options.board.is_some() {
            return Err(Error::config(
                "A custom transport cannot be combined with a board; \
                 the board's serial path is opened natively.",
            ));
        }

        if self.transport.is_some() && self.options.device_path.is_some() {
            return Err(Error::config(
                "A custom transport cannot be combined with a device path.",
            ));
        }

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
