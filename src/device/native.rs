//! OS serial ports via the `serialport` crate.
//!
//! `serialport` is blocking, so every device call runs on the blocking pool
//! and a dedicated blocking task polls for inbound bytes.

// ============================================================================
// Imports
// ============================================================================

use std::io::{self, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serialport::SerialPort;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, spawn_blocking};
use tracing::{debug, info, warn};

use super::{ControlLines, Incoming, LineConfig, SerialDevice, SerialTransport};

// ============================================================================
// Constants
// ============================================================================

/// Read timeout; bounds how long closing waits for the reader to notice.
const READ_POLL: Duration = Duration::from_millis(10);

/// Size of the reader's scratch buffer.
const READ_CHUNK: usize = 256;

// ============================================================================
// NativeTransport
// ============================================================================

/// Opens a fixed OS serial path.
#[derive(Debug, Clone)]
pub struct NativeTransport {
    /// Device path, e.g. `/dev/ttyUSB0` or `/tmp/simavr-uart0`.
    path: PathBuf,
}

impl NativeTransport {
    /// Creates a transport for `path`.
    #[inline]
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the device path.
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SerialTransport for NativeTransport {
    async fn open(&self, config: LineConfig) -> io::Result<Box<dyn SerialDevice>> {
        let path = self.path.to_string_lossy().into_owned();

        let port = spawn_blocking(move || {
            serialport::new(path, config.baud_rate)
                .data_bits(config.data_bits)
                .parity(config.parity)
                .stop_bits(config.stop_bits)
                .timeout(READ_POLL)
                .open()
        })
        .await
        .map_err(io::Error::other)??;

        info!(path = %self.path.display(), %config, "Serial device opened");

        let device = NativeDevice::start(port)?;
        Ok(Box::new(device))
    }
}

// ============================================================================
// NativeDevice
// ============================================================================

/// An open OS serial port.
struct NativeDevice {
    /// Port used for writes and control lines.
    port: Arc<Mutex<Box<dyn SerialPort>>>,
    /// Stops the reader task.
    stop: Arc<AtomicBool>,
    /// Reader task handle.
    reader: Option<JoinHandle<()>>,
    /// Inbound chunks until taken.
    incoming: Option<Incoming>,
}

impl NativeDevice {
    /// Clones the port for reading and starts the reader task.
    fn start(port: Box<dyn SerialPort>) -> io::Result<Self> {
        let read_half = port.try_clone()?;
        let (tx, rx) = mpsc::unbounded_channel();
        let stop = Arc::new(AtomicBool::new(false));

        let stop_flag = Arc::clone(&stop);
        let reader = spawn_blocking(move || read_loop(read_half, &tx, &stop_flag));

        Ok(Self {
            port: Arc::new(Mutex::new(port)),
            stop,
            reader: Some(reader),
            incoming: Some(rx),
        })
    }
}

/// Polls the port and forwards every chunk until stopped.
fn read_loop(
    mut port: Box<dyn SerialPort>,
    tx: &mpsc::UnboundedSender<Vec<u8>>,
    stop: &AtomicBool,
) {
    let mut buf = [0u8; READ_CHUNK];

    while !stop.load(Ordering::SeqCst) {
        match port.read(&mut buf) {
            Ok(0) => {}
            Ok(n) => {
                if tx.send(buf[..n].to_vec()).is_err() {
                    break;
                }
            }
            Err(e) if e.kind() == ErrorKind::TimedOut || e.kind() == ErrorKind::Interrupted => {}
            Err(e) => {
                warn!(error = %e, "Serial read failed");
                break;
            }
        }
    }

    debug!("Serial reader stopped");
}

#[async_trait]
impl SerialDevice for NativeDevice {
    async fn write(&mut self, data: &[u8]) -> io::Result<()> {
        let port = Arc::clone(&self.port);
        let data = data.to_vec();

        spawn_blocking(move || {
            let mut port = port.lock();
            port.write_all(&data)?;
            port.flush()
        })
        .await
        .map_err(io::Error::other)?
    }

    async fn set_control_lines(&mut self, lines: ControlLines) -> io::Result<()> {
        let port = Arc::clone(&self.port);

        spawn_blocking(move || -> io::Result<()> {
            let mut port = port.lock();
            port.write_data_terminal_ready(lines.dtr)?;
            port.write_request_to_send(lines.rts)?;
            if lines.brk {
                port.set_break()?;
            } else {
                port.clear_break()?;
            }
            Ok(())
        })
        .await
        .map_err(io::Error::other)?
    }

    fn take_incoming(&mut self) -> Option<Incoming> {
        self.incoming.take()
    }

    async fn close(mut self: Box<Self>) -> io::Result<()> {
        self.stop.store(true, Ordering::SeqCst);

        if let Some(reader) = self.reader.take() {
            reader.await.map_err(io::Error::other)?;
        }

        debug!("Serial device closed");
        Ok(())
    }
}

impl Drop for NativeDevice {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

// ============================================================================
// Tests
// ============================================================================
