//! End-to-end behaviour through the polyfill, the sandbox queue and the host.

mod common;

use std::time::Duration;

use anyhow::Result;
use futures_util::StreamExt;
use serial_bridge::boundary::pair;
use serial_bridge::{
    Call, ControlLines, Error, FaultKind, Outcome, PortId, Sandbox, SerialOptions,
    SerialOutputSignals, SerialPortRequestOptions, SimulatedTransport,
};
use tokio::time::timeout;
use tokio_test::{assert_err, assert_ok};

use common::bridge;

#[tokio::test(start_paused = true)]
async fn test_request_open_write_echo_close_reopen() -> Result<()> {
    let sim = SimulatedTransport::echo();
    let bridge = bridge(&sim).await?;
    let serial = bridge.sandbox().serial();

    let port = serial.request_port(SerialPortRequestOptions::default()).await?;
    assert_eq!(port.id().as_str(), "P1");

    port.open(SerialOptions::new(9600)).await?;
    let reader = port.readable().expect("readable while open");
    let writer = port.writable().expect("writable while open");

    writer.write(&[1, 2, 3]).await?;
    assert_eq!(reader.read().await, Some(vec![1, 2, 3]));

    // Exactly one delivery for the burst.
    assert_err!(timeout(Duration::from_millis(100), reader.read()).await);

    port.close().await?;
    assert!(port.readable().is_none());

    port.open(SerialOptions::new(9600)).await?;
    assert_eq!(sim.open_count(), 2);
    Ok(())
}

#[tokio::test]
async fn test_every_discovery_is_distinct() -> Result<()> {
    let sim = SimulatedTransport::new();
    let bridge = bridge(&sim).await?;
    let serial = bridge.sandbox().serial();

    let mut ids = Vec::new();
    for _ in 0..5 {
        ids.push(serial.request_port(SerialPortRequestOptions::default()).await?.id().clone());
    }
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 5);

    let listed: Vec<PortId> = serial
        .get_ports()
        .await?
        .iter()
        .map(|port| port.id().clone())
        .collect();
    assert_eq!(listed.len(), 5);
    assert_eq!(listed[0].as_str(), "P1");
    assert_eq!(sim.open_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_open_on_open_port_fails_without_touching_device() -> Result<()> {
    let sim = SimulatedTransport::new();
    let bridge = bridge(&sim).await?;
    let serial = bridge.sandbox().serial();

    let port = serial.request_port(SerialPortRequestOptions::default()).await?;
    port.open(SerialOptions::new(9600)).await?;

    // A second handle to the same port only learns from the host.
    let other = serial.get_ports().await?.remove(0);
    let err = assert_err!(other.open(SerialOptions::new(9600)).await);
    assert!(matches!(err, Error::AlreadyOpen { ref port_id } if port_id == port.id()));
    assert!(err.is_protocol_misuse());

    // The handle holding the port is refused as well.
    let err = assert_err!(port.open(SerialOptions::new(9600)).await);
    assert!(matches!(err, Error::AlreadyOpen { .. }));

    assert_eq!(sim.open_count(), 1);
    Ok(())
}

#[tokio::test]
async fn test_writes_reach_device_in_order() -> Result<()> {
    let sim = SimulatedTransport::new();
    let bridge = bridge(&sim).await?;
    let serial = bridge.sandbox().serial();

    let port = serial.request_port(SerialPortRequestOptions::default()).await?;
    port.open(SerialOptions::new(115_200)).await?;
    let writer = port.writable().expect("writable");

    writer.write(b"abc").await?;
    writer.write(b"de").await?;

    assert_eq!(sim.written(), b"abcde".to_vec());
    Ok(())
}

#[tokio::test]
async fn test_set_signals_drives_lines() -> Result<()> {
    let sim = SimulatedTransport::new();
    let bridge = bridge(&sim).await?;
    let serial = bridge.sandbox().serial();

    let port = serial.request_port(SerialPortRequestOptions::default()).await?;
    port.open(SerialOptions::new(9600)).await?;

    port.set_signals(
        SerialOutputSignals::new()
            .with_data_terminal_ready(true)
            .with_request_to_send(false)
            .with_break(false),
    )
    .await?;

    assert_eq!(
        sim.control_lines(),
        vec![ControlLines {
            dtr: true,
            rts: false,
            brk: false,
        }]
    );
    Ok(())
}

#[tokio::test]
async fn test_device_failures_surface_as_transport_errors() -> Result<()> {
    let sim = SimulatedTransport::new();
    let bridge = bridge(&sim).await?;
    let serial = bridge.sandbox().serial();
    let port = serial.request_port(SerialPortRequestOptions::default()).await?;

    sim.fail_next_open();
    let err = assert_err!(port.open(SerialOptions::new(9600)).await);
    assert!(err.is_transport());
    assert!(!port.is_open());

    port.open(SerialOptions::new(9600)).await?;
    sim.fail_writes(true);
    let err = assert_err!(port.writable().expect("writable").write(&[0]).await);
    assert!(err.is_transport());
    Ok(())
}

#[tokio::test]
async fn test_handle_reopens_after_close_through_another_handle() -> Result<()> {
    let sim = SimulatedTransport::new();
    let bridge = bridge(&sim).await?;
    let serial = bridge.sandbox().serial();

    let first = serial.request_port(SerialPortRequestOptions::default()).await?;
    first.open(SerialOptions::new(9600)).await?;
    let stale = first.readable().expect("readable");

    let second = serial.get_ports().await?.remove(0);
    second.close().await?;
    assert!(first.is_open());

    first.open(SerialOptions::new(19_200)).await?;
    assert_eq!(sim.open_count(), 2);
    assert_eq!(stale.read().await, None);

    sim.inject(b"fresh");
    assert_eq!(first.readable().expect("readable").read().await, Some(b"fresh".to_vec()));
    Ok(())
}

#[tokio::test]
async fn test_signal_failure_is_transport_error() -> Result<()> {
    let sim = SimulatedTransport::new();
    let bridge = bridge(&sim).await?;
    let serial = bridge.sandbox().serial();

    let port = serial.request_port(SerialPortRequestOptions::default()).await?;
    port.open(SerialOptions::new(9600)).await?;

    sim.fail_signals(true);
    let err = assert_err!(port.set_signals(SerialOutputSignals::new()).await);
    assert!(err.is_transport());
    assert!(port.is_open());
    Ok(())
}

#[tokio::test]
async fn test_failed_close_leaves_port_reopenable() -> Result<()> {
    let sim = SimulatedTransport::new();
    let bridge = bridge(&sim).await?;
    let serial = bridge.sandbox().serial();

    let port = serial.request_port(SerialPortRequestOptions::default()).await?;
    port.open(SerialOptions::new(9600)).await?;

    sim.fail_close(true);
    let err = assert_err!(port.close().await);
    assert!(err.is_transport());
    assert!(!port.is_open());
    assert!(port.readable().is_none());
    assert!(port.writable().is_none());

    sim.fail_close(false);
    port.open(SerialOptions::new(9600)).await?;
    assert_eq!(sim.open_count(), 2);
    assert!(port.readable().is_some());
    Ok(())
}

#[tokio::test]
async fn test_closed_port_rejects_io() -> Result<()> {
    let sim = SimulatedTransport::new();
    let bridge = bridge(&sim).await?;
    let serial = bridge.sandbox().serial();

    let port = serial.request_port(SerialPortRequestOptions::default()).await?;
    port.open(SerialOptions::new(9600)).await?;
    let writer = port.writable().expect("writable");
    port.close().await?;

    let err = assert_err!(writer.write(&[1]).await);
    assert!(matches!(err, Error::NotOpen { .. }));

    let err = assert_err!(port.close().await);
    assert!(matches!(err, Error::NotOpen { .. }));
    Ok(())
}

#[tokio::test]
async fn test_unknown_port_is_distinct_from_closed() -> Result<()> {
    let sim = SimulatedTransport::new();
    let bridge = bridge(&sim).await?;
    let sandbox = bridge.sandbox();

    let outcome = sandbox
        .call(Call::write_port(&PortId::from("P99"), &[1]))
        .await?;
    let Outcome::Failure { fault } = outcome else {
        panic!("expected failure");
    };
    assert_eq!(fault.kind, FaultKind::UnknownPort);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_two_ports_receive_only_their_own_bytes() -> Result<()> {
    let sim = SimulatedTransport::echo();
    let bridge = bridge(&sim).await?;
    let serial = bridge.sandbox().serial();

    let first = serial.request_port(SerialPortRequestOptions::default()).await?;
    let second = serial.request_port(SerialPortRequestOptions::default()).await?;
    first.open(SerialOptions::new(9600)).await?;
    second.open(SerialOptions::new(9600)).await?;

    first.writable().expect("writable").write(b"one").await?;
    second.writable().expect("writable").write(b"two").await?;

    let first_reader = first.readable().expect("readable");
    let second_reader = second.readable().expect("readable");

    assert_eq!(first_reader.read().await, Some(b"one".to_vec()));
    assert_eq!(second_reader.read().await, Some(b"two".to_vec()));
    assert_err!(timeout(Duration::from_millis(100), first_reader.read()).await);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_same_port_completes_in_pull_order() -> Result<()> {
    let sim = SimulatedTransport::new();
    let bridge = bridge(&sim).await?;
    let sandbox = bridge.sandbox();
    let serial = sandbox.serial();

    let slow = serial.request_port(SerialPortRequestOptions::default()).await?;
    let fast = serial.request_port(SerialPortRequestOptions::default()).await?;
    slow.open(SerialOptions::new(9600)).await?;
    fast.open(SerialOptions::new(9600)).await?;

    sim.set_write_delay(Some(Duration::from_millis(50)));

    let order = parking_lot::Mutex::new(Vec::new());
    let record = |label: &'static str, call: Call| {
        let sandbox = sandbox.clone();
        let order = &order;
        async move {
            let outcome = sandbox.call(call).await;
            order.lock().push(label);
            outcome
        }
    };

    let signals = SerialOutputSignals::new();
    let (write, same_port, other_port) = tokio::join!(
        record("slow write", Call::write_port(slow.id(), &[1])),
        record("same port", Call::set_signals(slow.id(), &signals)),
        record("other port", Call::set_signals(fast.id(), &signals)),
    );
    assert!(assert_ok!(write).is_success());
    assert!(assert_ok!(same_port).is_success());
    assert!(assert_ok!(other_port).is_success());

    let order = order.into_inner();
    let position = |label| order.iter().position(|l| *l == label).expect("recorded");
    assert!(position("slow write") < position("same port"));
    assert!(position("other port") < position("slow write"));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_reopen_has_no_residual_bytes() -> Result<()> {
    let sim = SimulatedTransport::new();
    let bridge = bridge(&sim).await?;
    let serial = bridge.sandbox().serial();

    let port = serial.request_port(SerialPortRequestOptions::default()).await?;
    port.open(SerialOptions::new(9600)).await?;

    sim.inject(b"stale");
    port.close().await?;

    port.open(SerialOptions::new(9600)).await?;
    let reader = port.readable().expect("readable");
    assert_err!(timeout(Duration::from_millis(100), reader.read()).await);

    sim.inject(b"fresh");
    assert_eq!(reader.read().await, Some(b"fresh".to_vec()));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_reader_is_replaced() -> Result<()> {
    let sim = SimulatedTransport::echo();
    let bridge = bridge(&sim).await?;
    let serial = bridge.sandbox().serial();

    let port = serial.request_port(SerialPortRequestOptions::default()).await?;
    port.open(SerialOptions::new(9600)).await?;

    let reader = port.readable().expect("readable");
    reader.cancel();

    port.writable().expect("writable").write(&[7]).await?;

    let stream = port.readable().expect("readable").into_stream();
    tokio::pin!(stream);
    assert_eq!(stream.next().await, Some(vec![7]));

    port.close().await?;
    assert_eq!(stream.next().await, None);
    Ok(())
}

#[tokio::test]
async fn test_dropping_sandbox_ends_drain_loop() -> Result<()> {
    let sim = SimulatedTransport::new();
    let bridge = bridge(&sim).await?;

    let (host_end, sandbox_end) = pair();
    let drain = bridge.attach(host_end);
    let sandbox = Sandbox::attach(sandbox_end);

    sandbox
        .serial()
        .request_port(SerialPortRequestOptions::default())
        .await?;
    drop(sandbox);

    timeout(Duration::from_secs(1), drain).await??;
    Ok(())
}

#[tokio::test]
async fn test_closed_sandbox_fails_calls() -> Result<()> {
    let sim = SimulatedTransport::new();
    let bridge = bridge(&sim).await?;
    let sandbox = bridge.sandbox();
    let serial = sandbox.serial();

    sandbox.close();

    let err = assert_err!(serial.request_port(SerialPortRequestOptions::default()).await);
    assert!(matches!(err, Error::SandboxClosed));
    assert!(err.is_boundary_error());
    assert_eq!(bridge.port_count(), 0);
    Ok(())
}
