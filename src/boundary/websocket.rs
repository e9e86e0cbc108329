//! WebSocket carriage for frame links.
//!
//! Lets the sandbox live in another process (typically a browser page or
//! worker running the injected JavaScript polyfill). Each WebSocket text
//! message carries exactly one frame.
//!
//! # Connection Flow
//!
//! 1. Host binds [`BoundaryServer`] to `localhost:0` (random port)
//! 2. The polyfill source is injected with [`BoundaryServer::ws_url`]
//! 3. The sandbox connects; [`BoundaryServer::accept`] returns a [`Link`]
//! 4. A pump task moves frames between the socket and the link until either
//!    side closes

// ============================================================================
// Imports
// ============================================================================

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, trace, warn};

use crate::error::{Error, Result};

use super::link::{Link, pair};

// ============================================================================
// BoundaryServer
// ============================================================================

/// A WebSocket server that sandboxes connect to.
///
/// # Example
///
/// ```ignore
/// let server = BoundaryServer::bind(IpAddr::V4(Ipv4Addr::LOCALHOST), 0).await?;
/// let source = serial_bridge::bridge::inject::polyfill_source(&server.ws_url());
///
/// // Inject `source` into the page...
///
/// let link = server.accept().await?;
/// ```
pub struct BoundaryServer {
    /// TCP listener for incoming connections.
    listener: TcpListener,
    /// Port the server is bound to.
    port: u16,
}

impl BoundaryServer {
    /// Binds to the specified address and port.
    ///
    /// Use port 0 to let the OS assign a random available port.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if binding fails.
    pub async fn bind(ip: IpAddr, port: u16) -> Result<Self> {
        let addr = SocketAddr::new(ip, port);
        let listener = TcpListener::bind(addr).await?;
        let actual_port = listener.local_addr()?.port();

        debug!(port = actual_port, "Boundary server bound");

        Ok(Self {
            listener,
            port: actual_port,
        })
    }

    /// Binds to `127.0.0.1` on a random port.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if binding fails.
    pub async fn bind_localhost() -> Result<Self> {
        Self::bind(IpAddr::V4(Ipv4Addr::LOCALHOST), 0).await
    }

    /// Returns the port the server is bound to.
    #[inline]
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Returns the WebSocket URL for this server.
    ///
    /// Format: `ws://127.0.0.1:{port}`
    #[inline]
    #[must_use]
    pub fn ws_url(&self) -> String {
        format!("ws://127.0.0.1:{}", self.port)
    }

    /// Waits for the next sandbox to connect.
    ///
    /// # Errors
    ///
    /// - [`Error::Io`] if accepting the TCP connection fails
    /// - [`Error::WebSocket`] if the upgrade fails
    pub async fn accept(&self) -> Result<Link> {
        let (stream, addr) = self.listener.accept().await?;
        debug!(?addr, "TCP connection accepted");

        let ws_stream = tokio_tungstenite::accept_async(stream).await?;
        info!(?addr, port = self.port, "Sandbox connected over WebSocket");

        Ok(spawn_pump(ws_stream))
    }

    /// Like [`accept`](Self::accept) but gives up after `limit`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] on timeout, otherwise as [`accept`](Self::accept).
    pub async fn accept_timeout(&self, limit: Duration) -> Result<Link> {
        timeout(limit, self.accept()).await.map_err(|_| {
            Error::protocol(format!(
                "no sandbox connected within {}ms",
                limit.as_millis()
            ))
        })?
    }
}

// ============================================================================
// Client
// ============================================================================

/// Connects a sandbox to a host listening at `url`.
///
/// # Errors
///
/// Returns [`Error::WebSocket`] if the connection or handshake fails.
pub async fn connect(url: &str) -> Result<Link> {
    let (ws_stream, _response) = tokio_tungstenite::connect_async(url).await?;
    debug!(url, "Connected to host");
    Ok(spawn_pump(ws_stream))
}

// ============================================================================
// Pump
// ============================================================================

/// Spawns the pump task and returns the caller's end of the link.
fn spawn_pump<S>(ws_stream: WebSocketStream<S>) -> Link
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (local, remote) = pair();
    tokio::spawn(pump(ws_stream, remote));
    local
}

/// Moves frames between a WebSocket and a link until either side closes.
async fn pump<S>(ws_stream: WebSocketStream<S>, link: Link)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (mut ws_write, mut ws_read) = ws_stream.split();
    let (tx, mut rx) = link.split();

    loop {
        tokio::select! {
            message = ws_read.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        trace!(len = text.len(), "Frame received");
                        if tx.send(text.as_str().to_owned()).is_err() {
                            debug!("Local end dropped");
                            let _ = ws_write.close().await;
                            break;
                        }
                    }

                    Some(Ok(Message::Close(_))) => {
                        debug!("WebSocket closed by remote");
                        break;
                    }

                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket error");
                        break;
                    }

                    None => {
                        debug!("WebSocket stream ended");
                        break;
                    }

                    // Ignore Binary, Ping, Pong
                    _ => {}
                }
            }

            frame = rx.recv() => {
                match frame {
                    Some(frame) => {
                        if let Err(e) = ws_write.send(Message::Text(frame.into())).await {
                            warn!(error = %e, "Failed to send frame");
                            break;
                        }
                    }

                    None => {
                        debug!("Local end closed");
                        let _ = ws_write.close().await;
                        break;
                    }
                }
            }
        }
    }

    debug!("Pump terminated");
}

// ============================================================================
// Tests
// ============================================================================
