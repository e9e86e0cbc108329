//! Port Session Table.
//!
//! Maps every discovered [`PortId`] to its session. A session exists from
//! discovery until host teardown; only its device handle comes and goes.
//!
//! # Lanes
//!
//! Each session owns a lane: a task that runs the session's jobs one at a
//! time, in submission order. Calls on one port therefore complete in the
//! order they were pulled, while different ports run concurrently.

// ============================================================================
// Imports
// ============================================================================

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tokio::sync::{Mutex, MutexGuard, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::device::SerialDevice;
use crate::error::{Error, Result};
use crate::identifiers::PortId;

// ============================================================================
// Types
// ============================================================================

/// A unit of work queued on a port's lane.
pub type Job = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Sessions in creation order.
#[derive(Default)]
struct Sessions {
    by_id: FxHashMap<PortId, Arc<PortSession>>,
    order: Vec<PortId>,
}

// ============================================================================
// OpenHandle
// ============================================================================

/// Device state attached to an open session.
pub struct OpenHandle {
    /// The open device.
    pub device: Box<dyn SerialDevice>,
    /// Coalescer task, once reading has started.
    pub reader: Option<JoinHandle<()>>,
}

impl OpenHandle {
    /// Wraps a freshly opened device.
    #[inline]
    #[must_use]
    pub fn new(device: Box<dyn SerialDevice>) -> Self {
        Self {
            device,
            reader: None,
        }
    }

    /// Returns `true` once reading has started.
    #[inline]
    #[must_use]
    pub fn is_reading(&self) -> bool {
        self.reader.is_some()
    }

    /// Stops the coalescer, dropping any buffered bytes, and closes the
    /// device.
    ///
    /// # Errors
    ///
    /// Returns the device's close error.
    pub async fn release(mut self) -> std::io::Result<()> {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        self.device.close().await
    }
}

// ============================================================================
// PortSession
// ============================================================================

/// One logical serial port.
pub struct PortSession {
    id: PortId,
    /// `None` while reserved, `Some` while open.
    handle: Mutex<Option<OpenHandle>>,
    /// Sender into this session's lane.
    lane: mpsc::UnboundedSender<Job>,
}

impl PortSession {
    /// Creates a reserved session and starts its lane.
    fn spawn(id: PortId) -> Self {
        let (lane, mut jobs) = mpsc::unbounded_channel::<Job>();

        let lane_id = id.clone();
        tokio::spawn(async move {
            while let Some(job) = jobs.recv().await {
                job.await;
            }
            trace!(port_id = %lane_id, "Lane finished");
        });

        Self {
            id,
            handle: Mutex::new(None),
            lane,
        }
    }

    /// Returns the port ID.
    #[inline]
    #[must_use]
    pub fn id(&self) -> &PortId {
        &self.id
    }

    /// Locks the device handle.
    pub async fn handle(&self) -> MutexGuard<'_, Option<OpenHandle>> {
        self.handle.lock().await
    }

    /// Returns `true` if a device handle is attached.
    pub async fn is_open(&self) -> bool {
        self.handle.lock().await.is_some()
    }

    /// Queues a job behind every job already queued on this port.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the lane has stopped.
    pub fn enqueue(&self, job: Job) -> Result<()> {
        self.lane
            .send(job)
            .map_err(|_| Error::protocol(format!("lane for {} has stopped", self.id)))
    }
}

// ============================================================================
// PortTable
// ============================================================================

/// Every port the host has handed out.
#[derive(Default)]
pub struct PortTable {
    sessions: RwLock<Sessions>,
    /// Index of the last reserved port.
    last_index: AtomicU32,
}

impl PortTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves a new port without touching any device.
    ///
    /// Must be called from within a tokio runtime.
    pub fn reserve(&self) -> Arc<PortSession> {
        let index = self.last_index.fetch_add(1, Ordering::SeqCst) + 1;
        let id = PortId::from_index(index);
        let session = Arc::new(PortSession::spawn(id.clone()));

        let mut sessions = self.sessions.write();
        sessions.order.push(id.clone());
        sessions.by_id.insert(id.clone(), Arc::clone(&session));

        debug!(port_id = %id, "Port reserved");
        session
    }

    /// Looks up a session.
    #[must_use]
    pub fn get(&self, id: &PortId) -> Option<Arc<PortSession>> {
        self.sessions.read().by_id.get(id).cloned()
    }

    /// Returns every port ID in creation order.
    #[must_use]
    pub fn ids(&self) -> Vec<PortId> {
        self.sessions.read().order.clone()
    }

    /// Returns the number of known ports.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.read().order.len()
    }

    /// Returns `true` if no port has been reserved.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Closes every open device and forgets every session.
    pub async fn close_all(&self) {
        let sessions: Vec<Arc<PortSession>> = {
            let mut sessions = self.sessions.write();
            sessions.order.clear();
            sessions.by_id.drain().map(|(_, session)| session).collect()
        };

        for session in sessions {
            let handle = session.handle().await.take();
            if let Some(handle) = handle
                && let Err(e) = handle.release().await
            {
                debug!(port_id = %session.id(), error = %e, "Close failed during teardown");
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
