//! Host Dispatcher.
//!
//! Implements the fixed method set against the [`PortTable`] and a
//! [`SerialTransport`].
//!
//! # Port State Machine
//!
//! ```text
//!            requestPort           openPort
//! Unknown ───────────────► Reserved ◄──────────► Open
//!                                     closePort
//! ```
//!
//! | Method | Reserved | Open |
//! |--------|----------|------|
//! | `openPort` | opens device | `AlreadyOpen` |
//! | `readPort` | `NotOpen` | starts coalescer (idempotent) |
//! | `writePort` | `NotOpen` | writes bytes |
//! | `setSignals` | `NotOpen` | drives control lines |
//! | `closePort` | `NotOpen` | releases device |
//!
//! Every method on an unknown port fails with `UnknownPort`.

// ============================================================================
// Imports
// ============================================================================

use std::io;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::device::{ControlLines, LineConfig, SerialTransport};
use crate::error::{Error, Result};
use crate::identifiers::PortId;
use crate::protocol::{
    Call, Method, Outcome, PortInfo, SerialOptions, SerialOutputSignals, SerialPortRequestOptions,
};

use super::coalesce::{DEFAULT_COALESCE_WINDOW, coalesce};
use super::drain::Responder;
use super::table::{OpenHandle, PortSession, PortTable};

// ============================================================================
// Dispatcher
// ============================================================================

/// Executes calls for every sandbox attached to one host.
pub struct Dispatcher {
    table: PortTable,
    transport: Arc<dyn SerialTransport>,
    /// Coalescing window for reads.
    window: Duration,
}

impl Dispatcher {
    /// Creates a dispatcher with the default coalescing window.
    #[must_use]
    pub fn new(transport: Arc<dyn SerialTransport>) -> Self {
        Self::with_window(transport, DEFAULT_COALESCE_WINDOW)
    }

    /// Creates a dispatcher with a custom coalescing window.
    #[must_use]
    pub fn with_window(transport: Arc<dyn SerialTransport>, window: Duration) -> Self {
        Self {
            table: PortTable::new(),
            transport,
            window,
        }
    }

    /// Returns the session table.
    #[inline]
    #[must_use]
    pub fn table(&self) -> &PortTable {
        &self.table
    }

    /// Returns the coalescing window.
    #[inline]
    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }
}

// ============================================================================
// Dispatcher - Submission
// ============================================================================

impl Dispatcher {
    /// Submits a call without waiting for it to complete.
    ///
    /// Port-less calls run immediately. Port calls are queued on the port's
    /// lane; the reply is sent through `responder` when the call finishes.
    pub fn submit(self: &Arc<Self>, call: Call, responder: Responder) {
        if !call.method.is_port_scoped() {
            let outcome = Outcome::from(self.dispatch_unscoped(&call));
            responder.reply(call.call_id, outcome);
            return;
        }

        let session = match self.lookup(&call) {
            Ok(session) => session,
            Err(e) => {
                debug!(call_id = %call.call_id, method = %call.method, error = %e, "Call rejected");
                responder.reply(call.call_id, Outcome::from(Err(e)));
                return;
            }
        };

        let this = Arc::clone(self);
        let lane_session = Arc::clone(&session);
        let call_id = call.call_id;

        let job = Box::pin(async move {
            let outcome = this.run(&lane_session, &call, &responder).await;
            responder.reply(call.call_id, outcome);
        });

        if let Err(e) = session.enqueue(job) {
            warn!(%call_id, error = %e, "Failed to queue call");
        }
    }

    /// Executes a call directly, bypassing the port lane.
    pub async fn dispatch(&self, call: &Call, responder: &Responder) -> Outcome {
        if !call.method.is_port_scoped() {
            return Outcome::from(self.dispatch_unscoped(call));
        }

        match self.lookup(call) {
            Ok(session) => self.run(&session, call, responder).await,
            Err(e) => Outcome::from(Err(e)),
        }
    }

    /// Resolves the session a port call targets.
    fn lookup(&self, call: &Call) -> Result<Arc<PortSession>> {
        let port_id = call.port_id()?;
        self.table
            .get(&port_id)
            .ok_or_else(|| Error::unknown_port(port_id))
    }

    /// Runs a port-less call.
    fn dispatch_unscoped(&self, call: &Call) -> Result<Value> {
        match call.method {
            Method::RequestPort => {
                let options = match call.args.first() {
                    Some(value) if !value.is_null() => {
                        serde_json::from_value(value.clone()).map_err(|e| {
                            Error::protocol_misuse(format!("invalid requestPort options: {e}"))
                        })?
                    }
                    _ => SerialPortRequestOptions::default(),
                };
                Ok(json!(self.request_port(&options)))
            }

            Method::ListPorts => Ok(json!(self.list_ports())),

            method => Err(Error::protocol_misuse(format!("{method} requires a port"))),
        }
    }

    /// Runs a port call and converts its result into an outcome.
    async fn run(&self, session: &PortSession, call: &Call, responder: &Responder) -> Outcome {
        let result = match call.method {
            Method::OpenPort => match call.decode_args::<(PortId, SerialOptions)>() {
                Ok((_, options)) => self.open_port(session, &options).await,
                Err(e) => Err(e),
            },

            Method::ReadPort => self.read_port(session, responder.clone()).await,

            Method::WritePort => match call.decode_args::<(PortId, Vec<u8>)>() {
                Ok((_, data)) => self.write_port(session, &data).await,
                Err(e) => Err(e),
            },

            Method::SetSignals => match call.decode_args::<(PortId, SerialOutputSignals)>() {
                Ok((_, signals)) => self.set_signals(session, &signals).await,
                Err(e) => Err(e),
            },

            Method::ClosePort => self.close_port(session).await,

            method => Err(Error::protocol_misuse(format!("{method} does not take a port"))),
        };

        if let Err(ref e) = result {
            debug!(
                call_id = %call.call_id,
                port_id = %session.id(),
                method = %call.method,
                error = %e,
                "Call failed"
            );
        }

        Outcome::from(result.map(|()| Value::Null))
    }
}

// ============================================================================
// Dispatcher - Methods
// ============================================================================

impl Dispatcher {
    /// Reserves a new port. Filters are logged but not evaluated.
    pub fn request_port(&self, options: &SerialPortRequestOptions) -> PortId {
        let session = self.table.reserve();

        let matches = options.filters.is_empty()
            || options
                .filters
                .iter()
                .any(|filter| filter.matches(&PortInfo::EMULATED));

        info!(
            port_id = %session.id(),
            filters = options.filters.len(),
            matches,
            "Port requested"
        );

        session.id().clone()
    }

    /// Returns every known port in creation order.
    #[must_use]
    pub fn list_ports(&self) -> Vec<PortId> {
        self.table.ids()
    }

    /// Opens the device for a reserved port.
    ///
    /// # Errors
    ///
    /// - [`Error::AlreadyOpen`] if the port is open (the transport is not touched)
    /// - [`Error::Transport`] if the device cannot be opened
    pub async fn open_port(&self, session: &PortSession, options: &SerialOptions) -> Result<()> {
        let mut handle = session.handle().await;
        if handle.is_some() {
            return Err(Error::already_open(session.id().clone()));
        }

        let config = LineConfig::from(options);
        let device = self.transport.open(config).await.map_err(hardware)?;
        *handle = Some(OpenHandle::new(device));

        info!(port_id = %session.id(), %config, "Port opened");
        Ok(())
    }

    /// Starts delivering inbound bytes through `responder`.
    ///
    /// A second call on the same open port does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotOpen`] if the port is reserved.
    pub async fn read_port(&self, session: &PortSession, responder: Responder) -> Result<()> {
        let mut guard = session.handle().await;
        let handle = guard
            .as_mut()
            .ok_or_else(|| Error::not_open(session.id().clone()))?;

        if handle.is_reading() {
            debug!(port_id = %session.id(), "Port already reading");
            return Ok(());
        }

        let Some(incoming) = handle.device.take_incoming() else {
            debug!(port_id = %session.id(), "Device has no inbound stream");
            return Ok(());
        };

        let port_id = session.id().clone();
        handle.reader = Some(tokio::spawn(coalesce(incoming, self.window, move |chunk| {
            responder.deliver(&port_id, chunk);
        })));

        debug!(port_id = %session.id(), window_ms = self.window.as_millis(), "Reading started");
        Ok(())
    }

    /// Writes bytes in the order given.
    ///
    /// # Errors
    ///
    /// - [`Error::NotOpen`] if the port is reserved
    /// - [`Error::Transport`] if the device write fails
    pub async fn write_port(&self, session: &PortSession, data: &[u8]) -> Result<()> {
        let mut guard = session.handle().await;
        let handle = guard
            .as_mut()
            .ok_or_else(|| Error::not_open(session.id().clone()))?;

        handle.device.write(data).await.map_err(hardware)?;

        debug!(port_id = %session.id(), len = data.len(), "Bytes written");
        Ok(())
    }

    /// Drives DTR, RTS and break.
    ///
    /// # Errors
    ///
    /// - [`Error::NotOpen`] if the port is reserved
    /// - [`Error::Transport`] if the device rejects the change
    pub async fn set_signals(&self, session: &PortSession, signals: &SerialOutputSignals) -> Result<()> {
        let mut guard = session.handle().await;
        let handle = guard
            .as_mut()
            .ok_or_else(|| Error::not_open(session.id().clone()))?;

        let lines = ControlLines::from(signals);
        handle.device.set_control_lines(lines).await.map_err(hardware)?;

        debug!(
            port_id = %session.id(),
            dtr = lines.dtr,
            rts = lines.rts,
            brk = lines.brk,
            "Signals set"
        );
        Ok(())
    }

    /// Stops reading, releases the device and returns the port to reserved.
    ///
    /// Bytes still waiting in the read buffer are discarded.
    ///
    /// # Errors
    ///
    /// - [`Error::NotOpen`] if the port is reserved
    /// - [`Error::Transport`] if the device fails to close (the port is
    ///   reserved regardless)
    pub async fn close_port(&self, session: &PortSession) -> Result<()> {
        let handle = session
            .handle()
            .await
            .take()
            .ok_or_else(|| Error::not_open(session.id().clone()))?;

        handle.release().await.map_err(hardware)?;

        info!(port_id = %session.id(), "Port closed");
        Ok(())
    }
}

/// Maps a device failure onto the transport fault class.
fn hardware(err: io::Error) -> Error {
    Error::transport(err.to_string())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::time::sleep;

    use crate::boundary::pair;
    use crate::device::SimulatedTransport;
    use crate::protocol::{FaultKind, HostMessage};

    fn setup(sim: &SimulatedTransport) -> (Arc<Dispatcher>, Responder, crate::boundary::FrameReceiver) {
        let dispatcher = Arc::new(Dispatcher::new(Arc::new(sim.clone())));
        let (host, sandbox) = pair();
        let (tx, _host_rx) = host.split();
        let (_sandbox_tx, sandbox_rx) = sandbox.split();
        (dispatcher, Responder::new(tx), sandbox_rx)
    }

    fn fault_kind(outcome: &Outcome) -> Option<FaultKind> {
        match outcome {
            Outcome::Failure { fault } => Some(fault.kind),
            Outcome::Success { .. } => None,
        }
    }

    #[tokio::test]
    async fn test_request_port_issues_distinct_ids() {
        let sim = SimulatedTransport::new();
        let (dispatcher, _, _) = setup(&sim);

        let a = dispatcher.request_port(&SerialPortRequestOptions::default());
        let b = dispatcher.request_port(&SerialPortRequestOptions::default());

        assert_ne!(a, b);
        assert_eq!(dispatcher.list_ports(), vec![a, b]);
        assert_eq!(sim.open_count(), 0);
    }

    #[tokio::test]
    async fn test_open_twice_fails_without_touching_transport() {
        let sim = SimulatedTransport::new();
        let (dispatcher, responder, _) = setup(&sim);
        let id = dispatcher.request_port(&SerialPortRequestOptions::default());

        let outcome = dispatcher
            .dispatch(&Call::open_port(&id, &SerialOptions::new(9600)), &responder)
            .await;
        assert!(outcome.is_success());

        let outcome = dispatcher
            .dispatch(&Call::open_port(&id, &SerialOptions::new(9600)), &responder)
            .await;
        assert_eq!(fault_kind(&outcome), Some(FaultKind::AlreadyOpen));
        assert_eq!(sim.open_count(), 1);
    }

    #[tokio::test]
    async fn test_open_uses_8n1_and_caller_baud() {
        let sim = SimulatedTransport::new();
        let (dispatcher, responder, _) = setup(&sim);
        let id = dispatcher.request_port(&SerialPortRequestOptions::default());

        dispatcher
            .dispatch(&Call::open_port(&id, &SerialOptions::new(115_200)), &responder)
            .await;

        assert_eq!(sim.line_configs(), vec![LineConfig::eight_n_one(115_200)]);
    }

    #[tokio::test]
    async fn test_open_failure_stays_reserved() {
        let sim = SimulatedTransport::new();
        let (dispatcher, responder, _) = setup(&sim);
        let id = dispatcher.request_port(&SerialPortRequestOptions::default());

        sim.fail_next_open();
        let outcome = dispatcher
            .dispatch(&Call::open_port(&id, &SerialOptions::new(9600)), &responder)
            .await;
        assert_eq!(fault_kind(&outcome), Some(FaultKind::Transport));

        let session = dispatcher.table().get(&id).expect("session");
        assert!(!session.is_open().await);

        let outcome = dispatcher
            .dispatch(&Call::open_port(&id, &SerialOptions::new(9600)), &responder)
            .await;
        assert!(outcome.is_success());
    }

    #[tokio::test]
    async fn test_unknown_port_fails_every_method() {
        let sim = SimulatedTransport::new();
        let (dispatcher, responder, _) = setup(&sim);
        let id = PortId::from("P42");

        let calls = [
            Call::open_port(&id, &SerialOptions::new(9600)),
            Call::read_port(&id),
            Call::write_port(&id, &[1]),
            Call::set_signals(&id, &SerialOutputSignals::new()),
            Call::close_port(&id),
        ];

        for call in &calls {
            let outcome = dispatcher.dispatch(call, &responder).await;
            assert_eq!(fault_kind(&outcome), Some(FaultKind::UnknownPort), "{}", call.method);
        }
    }

    #[tokio::test]
    async fn test_reserved_port_rejects_io() {
        let sim = SimulatedTransport::new();
        let (dispatcher, responder, _) = setup(&sim);
        let id = dispatcher.request_port(&SerialPortRequestOptions::default());

        let calls = [
            Call::read_port(&id),
            Call::write_port(&id, &[1]),
            Call::set_signals(&id, &SerialOutputSignals::new()),
            Call::close_port(&id),
        ];

        for call in &calls {
            let outcome = dispatcher.dispatch(call, &responder).await;
            assert_eq!(fault_kind(&outcome), Some(FaultKind::NotOpen), "{}", call.method);
        }
    }

    #[tokio::test]
    async fn test_write_preserves_order() {
        let sim = SimulatedTransport::new();
        let (dispatcher, responder, _) = setup(&sim);
        let id = dispatcher.request_port(&SerialPortRequestOptions::default());
        dispatcher
            .dispatch(&Call::open_port(&id, &SerialOptions::new(9600)), &responder)
            .await;

        dispatcher
            .dispatch(&Call::write_port(&id, &[b'a', b'b', b'c']), &responder)
            .await;
        dispatcher
            .dispatch(&Call::write_port(&id, &[b'd', b'e']), &responder)
            .await;

        assert_eq!(sim.written(), b"abcde".to_vec());
    }

    #[tokio::test]
    async fn test_write_failure_is_transport() {
        let sim = SimulatedTransport::new();
        let (dispatcher, responder, _) = setup(&sim);
        let id = dispatcher.request_port(&SerialPortRequestOptions::default());
        dispatcher
            .dispatch(&Call::open_port(&id, &SerialOptions::new(9600)), &responder)
            .await;

        sim.fail_writes(true);
        let outcome = dispatcher.dispatch(&Call::write_port(&id, &[1]), &responder).await;
        assert_eq!(fault_kind(&outcome), Some(FaultKind::Transport));
    }

    #[tokio::test]
    async fn test_set_signals_maps_lines() {
        let sim = SimulatedTransport::new();
        let (dispatcher, responder, _) = setup(&sim);
        let id = dispatcher.request_port(&SerialPortRequestOptions::default());
        dispatcher
            .dispatch(&Call::open_port(&id, &SerialOptions::new(9600)), &responder)
            .await;

        let signals = SerialOutputSignals::new()
            .with_data_terminal_ready(true)
            .with_request_to_send(false)
            .with_break(false);
        let outcome = dispatcher.dispatch(&Call::set_signals(&id, &signals), &responder).await;
        assert!(outcome.is_success());

        assert_eq!(
            sim.control_lines(),
            vec![ControlLines {
                dtr: true,
                rts: false,
                brk: false
            }]
        );
    }

    #[tokio::test]
    async fn test_close_then_reopen() {
        let sim = SimulatedTransport::new();
        let (dispatcher, responder, _) = setup(&sim);
        let id = dispatcher.request_port(&SerialPortRequestOptions::default());

        for _ in 0..2 {
            let outcome = dispatcher
                .dispatch(&Call::open_port(&id, &SerialOptions::new(9600)), &responder)
                .await;
            assert!(outcome.is_success());

            let outcome = dispatcher.dispatch(&Call::close_port(&id), &responder).await;
            assert!(outcome.is_success());
        }

        assert_eq!(sim.open_count(), 2);
        assert_eq!(sim.close_count(), 2);
        assert_eq!(dispatcher.list_ports(), vec![id]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_delivers_coalesced_bytes() {
        let sim = SimulatedTransport::echo();
        let (dispatcher, responder, mut sandbox_rx) = setup(&sim);
        let id = dispatcher.request_port(&SerialPortRequestOptions::default());

        dispatcher
            .dispatch(&Call::open_port(&id, &SerialOptions::new(9600)), &responder)
            .await;
        dispatcher.dispatch(&Call::read_port(&id), &responder).await;
        let again = dispatcher.dispatch(&Call::read_port(&id), &responder).await;
        assert!(again.is_success());

        dispatcher.dispatch(&Call::write_port(&id, &[1, 2]), &responder).await;
        dispatcher.dispatch(&Call::write_port(&id, &[3]), &responder).await;

        let frame = sandbox_rx.recv().await.expect("delivery");
        let message: HostMessage = serde_json::from_str(&frame).expect("parse");
        let HostMessage::Delivery(delivery) = message else {
            panic!("expected delivery, got {frame}");
        };
        assert_eq!(delivery.port_id, id);
        assert_eq!(delivery.data, vec![1, 2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_discards_buffered_bytes() {
        let sim = SimulatedTransport::new();
        let (dispatcher, responder, mut sandbox_rx) = setup(&sim);
        let id = dispatcher.request_port(&SerialPortRequestOptions::default());

        dispatcher
            .dispatch(&Call::open_port(&id, &SerialOptions::new(9600)), &responder)
            .await;
        dispatcher.dispatch(&Call::read_port(&id), &responder).await;

        sim.inject(&[0xAA]);
        tokio::task::yield_now().await;
        dispatcher.dispatch(&Call::close_port(&id), &responder).await;

        sleep(Duration::from_millis(100)).await;
        assert!(sandbox_rx.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_submit_replies_through_responder() {
        let sim = SimulatedTransport::new();
        let (dispatcher, responder, mut sandbox_rx) = setup(&sim);

        let call = Call::request_port(&SerialPortRequestOptions::default());
        let call_id = call.call_id;
        dispatcher.submit(call, responder);

        let frame = sandbox_rx.recv().await.expect("reply");
        let message: HostMessage = serde_json::from_str(&frame).expect("parse");
        let HostMessage::Reply(reply) = message else {
            panic!("expected reply");
        };
        assert_eq!(reply.call_id, call_id);
        assert_eq!(reply.outcome, Outcome::success(json!("P1")));
    }

    #[tokio::test]
    async fn test_request_port_without_options() {
        let sim = SimulatedTransport::new();
        let (dispatcher, responder, _) = setup(&sim);

        let outcome = dispatcher
            .dispatch(&Call::new(Method::RequestPort, Vec::new()), &responder)
            .await;
        assert_eq!(outcome, Outcome::success(json!("P1")));
    }
}
