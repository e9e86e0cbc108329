//! Sandboxes connecting to the host over WebSocket.

mod common;

use std::time::Duration;

use anyhow::Result;
use serial_bridge::boundary::connect;
use serial_bridge::{
    BoundaryServer, Error, Sandbox, SerialOptions, SerialPortRequestOptions, SimulatedTransport,
};
use tokio::time::timeout;
use tokio_test::assert_err;

use common::bridge;

#[tokio::test]
async fn test_round_trip_over_websocket() -> Result<()> {
    let sim = SimulatedTransport::echo();
    let bridge = bridge(&sim).await?;

    let server = BoundaryServer::bind_localhost().await?;
    let url = server.ws_url();
    let serving = bridge.clone();
    let serve = tokio::spawn(async move { serving.serve(server).await });

    let sandbox = Sandbox::attach(connect(&url).await?);
    let serial = sandbox.serial();

    let port = serial.request_port(SerialPortRequestOptions::default()).await?;
    assert_eq!(port.id().as_str(), "P1");

    port.open(SerialOptions::new(9600)).await?;
    port.writable().expect("writable").write(&[1, 2, 3]).await?;

    let chunk = timeout(Duration::from_secs(2), port.readable().expect("readable").read()).await?;
    assert_eq!(chunk, Some(vec![1, 2, 3]));

    port.close().await?;
    assert_eq!(sim.close_count(), 1);

    bridge.shutdown().await;
    timeout(Duration::from_secs(1), serve).await??;
    Ok(())
}

#[tokio::test]
async fn test_websocket_sandboxes_share_the_table() -> Result<()> {
    let sim = SimulatedTransport::new();
    let bridge = bridge(&sim).await?;

    let server = BoundaryServer::bind_localhost().await?;
    let url = server.ws_url();
    let serving = bridge.clone();
    let serve = tokio::spawn(async move { serving.serve(server).await });

    let first = Sandbox::attach(connect(&url).await?).serial();
    let second = Sandbox::attach(connect(&url).await?).serial();

    let port = first.request_port(SerialPortRequestOptions::default()).await?;
    port.open(SerialOptions::new(9600)).await?;

    let same = second.get_ports().await?.remove(0);
    assert_eq!(same.id(), port.id());

    let err = assert_err!(same.open(SerialOptions::new(9600)).await);
    assert!(matches!(err, Error::AlreadyOpen { .. }));
    assert_eq!(sim.open_count(), 1);

    bridge.shutdown().await;
    timeout(Duration::from_secs(1), serve).await??;
    Ok(())
}

#[tokio::test]
async fn test_shutdown_stops_accepting() -> Result<()> {
    let sim = SimulatedTransport::new();
    let bridge = bridge(&sim).await?;

    let server = BoundaryServer::bind_localhost().await?;
    let url = server.ws_url();
    let serving = bridge.clone();
    let serve = tokio::spawn(async move { serving.serve(server).await });

    let sandbox = Sandbox::attach(connect(&url).await?);
    sandbox
        .serial()
        .request_port(SerialPortRequestOptions::default())
        .await?;

    bridge.shutdown().await;
    timeout(Duration::from_secs(1), serve).await??;

    assert!(connect(&url).await.is_err());
    Ok(())
}
