//! `SerialPort` equivalent.
//!
//! A [`SerialPort`] keeps only local bookkeeping: whether it believes the
//! port is open, its delivery inbox and the cached reader and writer. All
//! real state lives on the host.
//!
//! # Example
//!
//! ```ignore
//! port.open(SerialOptions::new(9600)).await?;
//!
//! let writer = port.writable().expect("open");
//! writer.write(&[1, 2, 3]).await?;
//!
//! let reader = port.readable().expect("open");
//! let chunk = reader.read().await;
//!
//! port.close().await?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::{Arc, Weak};

use futures_util::Stream;
use futures_util::stream::unfold;
use parking_lot::Mutex;
use tracing::debug;

use crate::error::Result;
use crate::identifiers::PortId;
use crate::protocol::{Call, PortInfo, SerialOptions, SerialOutputSignals};
use crate::sandbox::{Inbox, Sandbox};

use super::invoke;

// ============================================================================
// Types
// ============================================================================

/// Inbox shared by every reader of one open port.
type SharedInbox = Arc<tokio::sync::Mutex<Inbox>>;

/// Internal shared state for a port.
struct PortInner {
    id: PortId,
    sandbox: Sandbox,
    state: Mutex<PortState>,
}

/// Local view of the port.
#[derive(Default)]
struct PortState {
    /// Set once open succeeds, cleared by close.
    open: bool,
    /// Delivery inbox while open.
    inbox: Option<SharedInbox>,
    /// Cached `readable`.
    reader: Option<PortReader>,
    /// Cached `writable`.
    writer: Option<PortWriter>,
}

// ============================================================================
// SerialPort
// ============================================================================

/// A handle to one host port.
#[derive(Clone)]
pub struct SerialPort {
    inner: Arc<PortInner>,
}

impl fmt::Debug for SerialPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialPort")
            .field("id", &self.inner.id)
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}

impl SerialPort {
    /// Creates a handle for `id`.
    pub(crate) fn new(id: PortId, sandbox: Sandbox) -> Self {
        Self {
            inner: Arc::new(PortInner {
                id,
                sandbox,
                state: Mutex::new(PortState::default()),
            }),
        }
    }

    /// Returns the port ID.
    #[inline]
    #[must_use]
    pub fn id(&self) -> &PortId {
        &self.inner.id
    }

    /// Returns the fixed identity every port reports.
    #[inline]
    #[must_use]
    pub fn get_info(&self) -> PortInfo {
        PortInfo::EMULATED
    }

    /// Returns `true` if this handle opened the port and has not closed it.
    #[inline]
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.inner.state.lock().open
    }
}

// ============================================================================
// SerialPort - Lifecycle
// ============================================================================

impl SerialPort {
    /// Opens the port and starts reading.
    ///
    /// The host decides whether the port may be opened; a handle whose port
    /// was closed through another handle can open it again. The delivery
    /// channel is registered before `readPort` is issued, and the host
    /// delivers nothing before `readPort`. The handle counts as open only
    /// once reading has started.
    ///
    /// # Errors
    ///
    /// - [`Error::AlreadyOpen`](crate::Error::AlreadyOpen) if the port is open
    /// - [`Error::Transport`](crate::Error::Transport) if the device cannot be opened
    /// - [`Error::SandboxClosed`](crate::Error::SandboxClosed) if the host is gone
    pub async fn open(&self, options: SerialOptions) -> Result<()> {
        let id = &self.inner.id;
        let sandbox = &self.inner.sandbox;

        invoke(sandbox, Call::open_port(id, &options), Some(id)).await?;

        // Anything cached from an earlier open is stale now.
        *self.inner.state.lock() = PortState::default();

        let inbox = sandbox.open_delivery(id);
        if let Err(e) = invoke(sandbox, Call::read_port(id), Some(id)).await {
            sandbox.close_delivery(id);
            return Err(e);
        }

        {
            let mut state = self.inner.state.lock();
            state.open = true;
            state.inbox = Some(Arc::new(tokio::sync::Mutex::new(inbox)));
        }

        debug!(port_id = %id, baud_rate = options.baud_rate, "Port open");
        Ok(())
    }

    /// Closes the port.
    ///
    /// Local state is reset whatever the host answers, because the host
    /// always leaves the port reserved after a close attempt.
    ///
    /// # Errors
    ///
    /// - [`Error::NotOpen`](crate::Error::NotOpen) if the port is not open
    /// - [`Error::Transport`](crate::Error::Transport) if the device fails to close
    pub async fn close(&self) -> Result<()> {
        let id = &self.inner.id;
        let result = invoke(&self.inner.sandbox, Call::close_port(id), Some(id)).await;

        {
            let mut state = self.inner.state.lock();
            state.open = false;
            state.inbox = None;
            state.reader = None;
            state.writer = None;
        }
        self.inner.sandbox.close_delivery(id);

        result.map(drop)
    }

    /// Drives DTR, RTS and break. Absent fields use the line defaults.
    ///
    /// # Errors
    ///
    /// - [`Error::NotOpen`](crate::Error::NotOpen) if the port is not open
    /// - [`Error::Transport`](crate::Error::Transport) if the device rejects the change
    pub async fn set_signals(&self, signals: SerialOutputSignals) -> Result<()> {
        let id = &self.inner.id;
        invoke(&self.inner.sandbox, Call::set_signals(id, &signals), Some(id))
            .await
            .map(drop)
    }
}

// ============================================================================
// SerialPort - Streams
// ============================================================================

impl SerialPort {
    /// Returns the byte-input stream, creating it on first access.
    ///
    /// Returns `None` while the port is not open.
    #[must_use]
    pub fn readable(&self) -> Option<PortReader> {
        let mut state = self.inner.state.lock();
        if !state.open {
            return None;
        }

        if let Some(ref reader) = state.reader {
            return Some(reader.clone());
        }

        let reader = PortReader {
            port_id: self.inner.id.clone(),
            inbox: Arc::clone(state.inbox.as_ref()?),
            port: Arc::downgrade(&self.inner),
        };
        state.reader = Some(reader.clone());
        Some(reader)
    }

    /// Returns the byte-output stream, creating it on first access.
    ///
    /// Returns `None` while the port is not open.
    #[must_use]
    pub fn writable(&self) -> Option<PortWriter> {
        let mut state = self.inner.state.lock();
        if !state.open {
            return None;
        }

        let writer = state
            .writer
            .get_or_insert_with(|| PortWriter {
                port_id: self.inner.id.clone(),
                sandbox: self.inner.sandbox.clone(),
                port: Arc::downgrade(&self.inner),
            })
            .clone();
        Some(writer)
    }
}

// ============================================================================
// PortReader
// ============================================================================

/// Byte-input stream of an open port.
///
/// Yields delivered chunks in order. Clones share the same inbox.
#[derive(Clone)]
pub struct PortReader {
    port_id: PortId,
    inbox: SharedInbox,
    port: Weak<PortInner>,
}

impl fmt::Debug for PortReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortReader")
            .field("port_id", &self.port_id)
            .finish_non_exhaustive()
    }
}

impl PortReader {
    /// Waits for the next delivered chunk.
    ///
    /// Returns `None` once the port is closed.
    pub async fn read(&self) -> Option<Vec<u8>> {
        self.inbox.lock().await.recv().await
    }

    /// Converts the reader into a [`Stream`] of chunks.
    pub fn into_stream(self) -> impl Stream<Item = Vec<u8>> + Send {
        unfold(self, |reader| async move {
            match reader.read().await {
                Some(chunk) => Some((chunk, reader)),
                None => None,
            }
        })
    }

    /// Drops the port's cached reader.
    ///
    /// The host keeps delivering; the next [`SerialPort::readable`] returns
    /// a new reader over the same inbox.
    pub fn cancel(&self) {
        if let Some(port) = self.port.upgrade() {
            port.state.lock().reader = None;
        }
        debug!(port_id = %self.port_id, "Reader cancelled");
    }
}

// ============================================================================
// PortWriter
// ============================================================================

/// Byte-output stream of an open port.
#[derive(Clone)]
pub struct PortWriter {
    port_id: PortId,
    sandbox: Sandbox,
    port: Weak<PortInner>,
}

impl fmt::Debug for PortWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortWriter")
            .field("port_id", &self.port_id)
            .finish_non_exhaustive()
    }
}

impl PortWriter {
    /// Sends one chunk as one `writePort` call.
    ///
    /// # Errors
    ///
    /// - [`Error::NotOpen`](crate::Error::NotOpen) if the port has been closed
    /// - [`Error::Transport`](crate::Error::Transport) if the device write fails
    pub async fn write(&self, chunk: &[u8]) -> Result<()> {
        invoke(
            &self.sandbox,
            Call::write_port(&self.port_id, chunk),
            Some(&self.port_id),
        )
        .await
        .map(drop)
    }

    /// Drops the port's cached writer.
    pub fn close(&self) {
        if let Some(port) = self.port.upgrade() {
            port.state.lock().writer = None;
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
