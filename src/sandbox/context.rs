//! Per-sandbox context: Call Queue, pending slots and delivery channels.
//!
//! # Event Loop
//!
//! Attaching a sandbox spawns a task that reads host frames and:
//!
//! - resolves the pending slot named by each reply
//! - routes each delivery to the channel registered for its port
//!
//! When the host end closes, every pending slot fails with
//! [`Error::SandboxClosed`] and every delivery channel ends.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::from_str;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::boundary::{FrameReceiver, FrameSender, Link};
use crate::error::{Error, Result};
use crate::identifiers::{CallId, PortId};
use crate::polyfill::Serial;
use crate::protocol::{Call, HostMessage, Outcome};

// ============================================================================
// Types
// ============================================================================

/// Map of call IDs to pending slots.
type PendingMap = FxHashMap<CallId, oneshot::Sender<Result<Outcome>>>;

/// Map of port IDs to delivery channels.
type DeliveryMap = FxHashMap<PortId, mpsc::UnboundedSender<Vec<u8>>>;

/// Receiving end of a port's delivery channel.
pub type Inbox = mpsc::UnboundedReceiver<Vec<u8>>;

// ============================================================================
// Sandbox
// ============================================================================

/// The sandboxed side of one link.
///
/// Cloning is cheap and every clone shares the same queue. The link is torn
/// down by [`close`](Self::close) or when the last clone is dropped.
///
/// # Example
///
/// ```ignore
/// let sandbox = Sandbox::attach(link);
/// let serial = sandbox.serial();
/// let port = serial.request_port(Default::default()).await?;
/// ```
#[derive(Clone)]
pub struct Sandbox {
    inner: Arc<SandboxInner>,
}

struct SandboxInner {
    /// Call Queue; `None` once closed.
    outbound: Mutex<Option<FrameSender>>,
    /// Pending slots (shared with the event loop).
    pending: Arc<Mutex<PendingMap>>,
    /// Delivery channels (shared with the event loop).
    deliveries: Arc<Mutex<DeliveryMap>>,
    /// Event loop task.
    event_loop: Mutex<Option<JoinHandle<()>>>,
}

impl Sandbox {
    /// Attaches to the sandbox end of a link and starts the event loop.
    #[must_use]
    pub fn attach(link: Link) -> Self {
        let (sender, receiver) = link.split();
        let pending = Arc::new(Mutex::new(PendingMap::default()));
        let deliveries = Arc::new(Mutex::new(DeliveryMap::default()));

        let event_loop = tokio::spawn(Self::run_event_loop(
            receiver,
            Arc::clone(&pending),
            Arc::clone(&deliveries),
        ));

        Self {
            inner: Arc::new(SandboxInner {
                outbound: Mutex::new(Some(sender)),
                pending,
                deliveries,
                event_loop: Mutex::new(Some(event_loop)),
            }),
        }
    }

    /// Returns the `navigator.serial` surface for this sandbox.
    #[must_use]
    pub fn serial(&self) -> Serial {
        Serial::new(self.clone())
    }

    /// Enqueues a call and waits for its outcome.
    ///
    /// The pending slot is registered before the call is queued, so a reply
    /// can never arrive ahead of its slot.
    ///
    /// # Errors
    ///
    /// - [`Error::SandboxClosed`] if the link is down, before or during the call
    /// - [`Error::Json`] if the call cannot be serialized
    pub async fn call(&self, call: Call) -> Result<Outcome> {
        let call_id = call.call_id;
        let sender = self
            .inner
            .outbound
            .lock()
            .clone()
            .ok_or(Error::SandboxClosed)?;

        let (slot_tx, slot_rx) = oneshot::channel();
        self.inner.pending.lock().insert(call_id, slot_tx);

        if let Err(e) = sender.send_json(&call) {
            self.inner.pending.lock().remove(&call_id);
            return Err(e);
        }

        trace!(%call_id, method = %call.method, "Call queued");

        slot_rx.await?
    }

    /// Returns the number of calls waiting for a reply.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.pending.lock().len()
    }

    /// Returns `true` once the sandbox has been closed.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner
            .outbound
            .lock()
            .as_ref()
            .is_none_or(FrameSender::is_closed)
    }

    /// Tears the sandbox down.
    ///
    /// The host's drain loop sees the queue close and exits. Pending calls
    /// fail with [`Error::SandboxClosed`].
    pub fn close(&self) {
        self.inner.shutdown();
    }

    /// Registers the delivery channel for a port, replacing any previous one.
    pub(crate) fn open_delivery(&self, port_id: &PortId) -> Inbox {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.deliveries.lock().insert(port_id.clone(), tx);
        rx
    }

    /// Drops the delivery channel for a port, ending its inbox.
    pub(crate) fn close_delivery(&self, port_id: &PortId) {
        self.inner.deliveries.lock().remove(port_id);
    }
}

// ============================================================================
// Sandbox - Event Loop
// ============================================================================

impl Sandbox {
    /// Routes host frames until the host end closes.
    async fn run_event_loop(
        mut receiver: FrameReceiver,
        pending: Arc<Mutex<PendingMap>>,
        deliveries: Arc<Mutex<DeliveryMap>>,
    ) {
        while let Some(frame) = receiver.recv().await {
            match from_str::<HostMessage>(&frame) {
                Ok(HostMessage::Reply(reply)) => {
                    let slot = pending.lock().remove(&reply.call_id);
                    match slot {
                        Some(slot) => {
                            let _ = slot.send(Ok(reply.outcome));
                        }
                        None => warn!(call_id = %reply.call_id, "Reply for unknown call"),
                    }
                }

                Ok(HostMessage::Delivery(delivery)) => {
                    let channel = deliveries.lock().get(&delivery.port_id).cloned();
                    match channel {
                        Some(channel) => {
                            let _ = channel.send(delivery.data);
                        }
                        None => trace!(
                            port_id = %delivery.port_id,
                            len = delivery.data.len(),
                            "Delivery for port without channel"
                        ),
                    }
                }

                Err(e) => warn!(error = %e, "Failed to parse host frame"),
            }
        }

        fail_pending(&pending);
        deliveries.lock().clear();

        debug!("Sandbox event loop terminated");
    }
}

impl SandboxInner {
    fn shutdown(&self) {
        self.outbound.lock().take();
        if let Some(event_loop) = self.event_loop.lock().take() {
            event_loop.abort();
        }
        fail_pending(&self.pending);
        self.deliveries.lock().clear();
    }
}

impl Drop for SandboxInner {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Fails every pending slot with [`Error::SandboxClosed`].
fn fail_pending(pending: &Mutex<PendingMap>) {
    let slots: Vec<_> = pending.lock().drain().collect();
    let count = slots.len();

    for (_, slot) in slots {
        let _ = slot.send(Err(Error::SandboxClosed));
    }

    if count > 0 {
        debug!(count, "Failed pending calls on teardown");
    }
}

// ============================================================================
// Tests
// ============================================================================
