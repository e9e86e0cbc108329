//! In-memory simulated serial device.
//!
//! [`SimulatedTransport`] stands in for a board when no hardware is
//! attached. In echo mode every write is looped back as inbound bytes.
//! The transport keeps a record of what the host did to it (line configs,
//! written bytes, control lines) and can be told to fail.

// ============================================================================
// Imports
// ============================================================================

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

use super::{ControlLines, Incoming, LineConfig, SerialDevice, SerialTransport};

// ============================================================================
// Types
// ============================================================================

/// State shared between the transport handle and its open devices.
#[derive(Default)]
struct SimState {
    /// Loop writes back as inbound bytes.
    echo: bool,
    /// Fail the next open.
    fail_next_open: AtomicBool,
    /// Fail every write.
    fail_writes: AtomicBool,
    /// Fail every control-line change.
    fail_signals: AtomicBool,
    /// Fail every close.
    fail_close: AtomicBool,
    /// Delay applied before each write completes.
    write_delay: Mutex<Option<Duration>>,
    /// Number of successful opens.
    opens: AtomicUsize,
    /// Number of successful closes.
    closes: AtomicUsize,
    /// Line configs passed to successful opens.
    configs: Mutex<Vec<LineConfig>>,
    /// Every byte written, across all devices.
    written: Mutex<Vec<u8>>,
    /// Every control-line change.
    lines: Mutex<Vec<ControlLines>>,
    /// Inbound senders of currently open devices.
    open_devices: Mutex<Vec<mpsc::UnboundedSender<Vec<u8>>>>,
}

// ============================================================================
// SimulatedTransport
// ============================================================================

/// Simulated board.
///
/// Cloning shares state, so a test can keep one handle for inspection and
/// hand another to the bridge.
#[derive(Clone, Default)]
pub struct SimulatedTransport {
    state: Arc<SimState>,
}

impl SimulatedTransport {
    /// Creates a silent device: writes are recorded, nothing is read back.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a device that echoes every write.
    #[must_use]
    pub fn echo() -> Self {
        Self {
            state: Arc::new(SimState {
                echo: true,
                ..SimState::default()
            }),
        }
    }

    /// Makes the next open fail.
    pub fn fail_next_open(&self) {
        self.state.fail_next_open.store(true, Ordering::SeqCst);
    }

    /// Makes every write fail (or succeed again).
    pub fn fail_writes(&self, fail: bool) {
        self.state.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Makes every control-line change fail (or succeed again).
    pub fn fail_signals(&self, fail: bool) {
        self.state.fail_signals.store(fail, Ordering::SeqCst);
    }

    /// Makes every close fail (or succeed again).
    ///
    /// A failed close still detaches the device.
    pub fn fail_close(&self, fail: bool) {
        self.state.fail_close.store(fail, Ordering::SeqCst);
    }

    /// Delays every write by `delay`.
    pub fn set_write_delay(&self, delay: Option<Duration>) {
        *self.state.write_delay.lock() = delay;
    }

    /// Pushes bytes into every open device as if the board sent them.
    ///
    /// Returns the number of devices that received them.
    pub fn inject(&self, data: &[u8]) -> usize {
        let mut devices = self.state.open_devices.lock();
        devices.retain(|tx| !tx.is_closed());
        devices
            .iter()
            .filter(|tx| tx.send(data.to_vec()).is_ok())
            .count()
    }

    /// Returns how many times a device was opened.
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.state.opens.load(Ordering::SeqCst)
    }

    /// Returns how many times a device was closed.
    #[must_use]
    pub fn close_count(&self) -> usize {
        self.state.closes.load(Ordering::SeqCst)
    }

    /// Returns the line configs of every successful open.
    #[must_use]
    pub fn line_configs(&self) -> Vec<LineConfig> {
        self.state.configs.lock().clone()
    }

    /// Returns every byte written so far.
    #[must_use]
    pub fn written(&self) -> Vec<u8> {
        self.state.written.lock().clone()
    }

    /// Returns every control-line change so far.
    #[must_use]
    pub fn control_lines(&self) -> Vec<ControlLines> {
        self.state.lines.lock().clone()
    }
}

#[async_trait]
impl SerialTransport for SimulatedTransport {
    async fn open(&self, config: LineConfig) -> io::Result<Box<dyn SerialDevice>> {
        if self.state.fail_next_open.swap(false, Ordering::SeqCst) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                "simulated board not responding",
            ));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        self.state.open_devices.lock().push(tx.clone());
        self.state.configs.lock().push(config);
        self.state.opens.fetch_add(1, Ordering::SeqCst);

        debug!(%config, "Simulated device opened");

        Ok(Box::new(SimulatedDevice {
            state: Arc::clone(&self.state),
            loopback: tx,
            incoming: Some(rx),
        }))
    }
}

// ============================================================================
// SimulatedDevice
// ============================================================================

/// One open simulated device.
struct SimulatedDevice {
    state: Arc<SimState>,
    /// Sender feeding this device's inbound stream.
    loopback: mpsc::UnboundedSender<Vec<u8>>,
    incoming: Option<Incoming>,
}

#[async_trait]
impl SerialDevice for SimulatedDevice {
    async fn write(&mut self, data: &[u8]) -> io::Result<()> {
        let delay = *self.state.write_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.state.fail_writes.load(Ordering::SeqCst) {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "simulated write failure",
            ));
        }

        self.state.written.lock().extend_from_slice(data);

        if self.state.echo {
            let _ = self.loopback.send(data.to_vec());
        }

        Ok(())
    }

    async fn set_control_lines(&mut self, lines: ControlLines) -> io::Result<()> {
        if self.state.fail_signals.load(Ordering::SeqCst) {
            return Err(io::Error::other("simulated control-line failure"));
        }

        self.state.lines.lock().push(lines);
        Ok(())
    }

    fn take_incoming(&mut self) -> Option<Incoming> {
        self.incoming.take()
    }

    async fn close(self: Box<Self>) -> io::Result<()> {
        self.state
            .open_devices
            .lock()
            .retain(|tx| !tx.same_channel(&self.loopback));

        if self.state.fail_close.load(Ordering::SeqCst) {
            return Err(io::Error::other("simulated close failure"));
        }
        self.state.closes.fetch_add(1, Ordering::SeqCst);

        debug!("Simulated device closed");
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_echo_loops_writes_back() {
        let sim = SimulatedTransport::echo();
        let mut device = sim.open(LineConfig::eight_n_one(9600)).await.expect("open");
        let mut incoming = device.take_incoming().expect("incoming");

        device.write(&[1, 2, 3]).await.expect("write");
        assert_eq!(incoming.recv().await, Some(vec![1, 2, 3]));
        assert_eq!(sim.written(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_incoming_taken_once() {
        let sim = SimulatedTransport::new();
        let mut device = sim.open(LineConfig::eight_n_one(9600)).await.expect("open");
        assert!(device.take_incoming().is_some());
        assert!(device.take_incoming().is_none());
    }

    #[tokio::test]
    async fn test_fail_next_open_is_one_shot() {
        let sim = SimulatedTransport::new();
        sim.fail_next_open();

        assert!(sim.open(LineConfig::eight_n_one(9600)).await.is_err());
        assert!(sim.open(LineConfig::eight_n_one(9600)).await.is_ok());
        assert_eq!(sim.open_count(), 1);
    }

    #[tokio::test]
    async fn test_inject_reaches_open_devices_only() {
        let sim = SimulatedTransport::new();
        let mut device = sim.open(LineConfig::eight_n_one(9600)).await.expect("open");
        let mut incoming = device.take_incoming().expect("incoming");

        assert_eq!(sim.inject(b"hi"), 1);
        assert_eq!(incoming.recv().await, Some(b"hi".to_vec()));

        device.close().await.expect("close");
        assert_eq!(sim.inject(b"late"), 0);
        assert_eq!(sim.close_count(), 1);
    }

    #[tokio::test]
    async fn test_failures_are_reported() {
        let sim = SimulatedTransport::new();
        let mut device = sim.open(LineConfig::eight_n_one(9600)).await.expect("open");

        sim.fail_writes(true);
        assert!(device.write(&[0]).await.is_err());
        assert!(sim.written().is_empty());

        sim.fail_signals(true);
        assert!(device.set_control_lines(ControlLines::default()).await.is_err());
        assert!(sim.control_lines().is_empty());
    }

    #[tokio::test]
    async fn test_failed_close_detaches_device() {
        let sim = SimulatedTransport::new();
        let device = sim.open(LineConfig::eight_n_one(9600)).await.expect("open");

        sim.fail_close(true);
        assert!(device.close().await.is_err());
        assert_eq!(sim.close_count(), 0);
        assert_eq!(sim.inject(b"late"), 0);
    }
}
