//! Bridge host.
//!
//! The [`Bridge`] owns the dispatcher (and therefore every port session)
//! and the optional board process. Sandboxes attach to it in process with
//! [`Bridge::sandbox`] or over WebSocket with [`Bridge::serve`].
//!
//! # Example
//!
//! ```ignore
//! use serial_bridge::{Bridge, SerialOptions, SimulatedTransport};
//!
//! let bridge = Bridge::builder()
//!     .transport(SimulatedTransport::echo())
//!     .build()
//!     .await?;
//!
//! let serial = bridge.sandbox().serial();
//! let port = serial.request_port(Default::default()).await?;
//! port.open(SerialOptions::new(9600)).await?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::boundary::{BoundaryServer, Link, pair};
use crate::device::{Board, SerialTransport};
use crate::host::{Dispatcher, DrainLoop};
use crate::identifiers::PortId;
use crate::sandbox::Sandbox;

use super::builder::BridgeBuilder;

// ============================================================================
// Types
// ============================================================================

/// Internal shared state for the bridge.
struct BridgeInner {
    dispatcher: Arc<Dispatcher>,
    /// Simulator process, if the bridge started one.
    board: Mutex<Option<Board>>,
    /// Stops [`Bridge::serve`].
    shutdown: Notify,
}

// ============================================================================
// Bridge
// ============================================================================

/// The privileged host process.
#[derive(Clone)]
pub struct Bridge {
    inner: Arc<BridgeInner>,
}

impl fmt::Debug for Bridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bridge")
            .field("port_count", &self.port_count())
            .field("coalesce_window", &self.coalesce_window())
            .finish_non_exhaustive()
    }
}

impl Bridge {
    /// Creates a bridge over `transport`.
    pub(crate) fn new(
        transport: Arc<dyn SerialTransport>,
        window: Duration,
        board: Option<Board>,
    ) -> Self {
        info!(window_ms = window.as_millis(), board = board.is_some(), "Bridge started");

        Self {
            inner: Arc::new(BridgeInner {
                dispatcher: Arc::new(Dispatcher::with_window(transport, window)),
                board: Mutex::new(board),
                shutdown: Notify::new(),
            }),
        }
    }

    /// Creates a configuration builder.
    #[inline]
    #[must_use]
    pub fn builder() -> BridgeBuilder {
        BridgeBuilder::new()
    }
}

// ============================================================================
// Bridge - Accessors
// ============================================================================

impl Bridge {
    /// Returns the dispatcher shared by every attached sandbox.
    #[inline]
    #[must_use]
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.inner.dispatcher
    }

    /// Returns the coalescing window.
    #[inline]
    #[must_use]
    pub fn coalesce_window(&self) -> Duration {
        self.inner.dispatcher.window()
    }

    /// Returns the number of ports handed out so far.
    #[inline]
    #[must_use]
    pub fn port_count(&self) -> usize {
        self.inner.dispatcher.table().len()
    }

    /// Returns every port ID in creation order.
    #[must_use]
    pub fn ports(&self) -> Vec<PortId> {
        self.inner.dispatcher.list_ports()
    }
}

// ============================================================================
// Bridge - Sandboxes
// ============================================================================

impl Bridge {
    /// Serves the host end of a link until the sandbox closes it.
    pub fn attach(&self, link: Link) -> JoinHandle<()> {
        debug!("Sandbox attached");
        DrainLoop::new(Arc::clone(&self.inner.dispatcher), link).spawn()
    }

    /// Creates an in-process sandbox attached to this bridge.
    #[must_use]
    pub fn sandbox(&self) -> Sandbox {
        let (host, sandbox) = pair();
        self.attach(host);
        Sandbox::attach(sandbox)
    }

    /// Attaches every sandbox that connects to `server` until
    /// [`shutdown`](Self::shutdown).
    ///
    /// A failed handshake is logged and does not stop the loop.
    pub async fn serve(&self, server: BoundaryServer) {
        info!(url = %server.ws_url(), "Serving sandboxes");

        loop {
            tokio::select! {
                accepted = server.accept() => match accepted {
                    Ok(link) => {
                        self.attach(link);
                    }
                    Err(e) => {
                        warn!(error = %e, "Sandbox connection failed");
                    }
                },

                () = self.inner.shutdown.notified() => break,
            }
        }

        debug!("Accept loop terminated");
    }

    /// Stops serving, closes every open port and stops the board.
    pub async fn shutdown(&self) {
        info!(ports = self.port_count(), "Bridge shutting down");

        self.inner.shutdown.notify_one();
        self.inner.dispatcher.table().close_all().await;

        if let Some(board) = self.inner.board.lock().await.take() {
            board.stop().await;
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
