//! Drain Loop.
//!
//! Pulls call frames from one sandbox in FIFO order and submits each to the
//! [`Dispatcher`] without waiting for it to finish. Replies and deliveries
//! go back through a [`Responder`].
//!
//! The loop ends when the sandbox side of the link closes. That is the
//! normal way a sandbox goes away, not an error.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use serde_json::from_str;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::boundary::{FrameReceiver, FrameSender, Link};
use crate::identifiers::{CallId, PortId};
use crate::protocol::{Call, Delivery, Fault, FaultKind, HostMessage, Outcome, Reply};

use super::dispatcher::Dispatcher;

// ============================================================================
// Responder
// ============================================================================

/// Pushes host messages back into one sandbox.
///
/// A closed sandbox is not an error for the host; failed pushes are logged
/// and dropped.
#[derive(Debug, Clone)]
pub struct Responder {
    sender: FrameSender,
}

impl Responder {
    /// Creates a responder over the host's sending half.
    #[inline]
    #[must_use]
    pub fn new(sender: FrameSender) -> Self {
        Self { sender }
    }

    /// Resolves a call.
    pub fn reply(&self, call_id: CallId, outcome: Outcome) {
        trace!(%call_id, success = outcome.is_success(), "Reply");

        let message = HostMessage::Reply(Reply::new(call_id, outcome));
        if let Err(e) = self.sender.send_json(&message) {
            debug!(%call_id, error = %e, "Reply dropped");
        }
    }

    /// Delivers a coalesced chunk for a port.
    pub fn deliver(&self, port_id: &PortId, data: Vec<u8>) {
        trace!(%port_id, len = data.len(), "Delivery");

        let message = HostMessage::Delivery(Delivery {
            port_id: port_id.clone(),
            data,
        });
        if let Err(e) = self.sender.send_json(&message) {
            debug!(%port_id, error = %e, "Delivery dropped");
        }
    }

    /// Returns `true` once the sandbox has gone away.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

// ============================================================================
// DrainLoop
// ============================================================================

/// Serves one sandbox.
pub struct DrainLoop {
    dispatcher: Arc<Dispatcher>,
    receiver: FrameReceiver,
    responder: Responder,
}

impl DrainLoop {
    /// Creates a drain loop over the host end of a link.
    #[must_use]
    pub fn new(dispatcher: Arc<Dispatcher>, link: Link) -> Self {
        let (sender, receiver) = link.split();
        Self {
            dispatcher,
            receiver,
            responder: Responder::new(sender),
        }
    }

    /// Runs the loop on a new task.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Pulls and submits calls until the sandbox closes.
    pub async fn run(mut self) {
        debug!("Drain loop started");

        while let Some(frame) = self.receiver.recv().await {
            self.handle_frame(&frame);
        }

        debug!("Sandbox closed; drain loop finished");
    }

    /// Decodes one frame and submits it.
    fn handle_frame(&self, frame: &str) {
        match from_str::<Call>(frame) {
            Ok(call) => {
                trace!(call_id = %call.call_id, method = %call.method, "Call pulled");
                self.dispatcher.submit(call, self.responder.clone());
            }

            Err(e) => match Call::recover_id(frame) {
                Some(call_id) => {
                    warn!(%call_id, error = %e, "Undecodable call");
                    let fault = Fault::new(
                        FaultKind::ProtocolMisuse,
                        format!("undecodable call: {e}"),
                    );
                    self.responder.reply(call_id, Outcome::failure(fault));
                }
                None => {
                    warn!(error = %e, "Dropping frame without call id");
                }
            },
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
