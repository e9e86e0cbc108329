//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::sync::Once;

use serial_bridge::{Bridge, SimulatedTransport};
use tracing_subscriber::EnvFilter;

static TRACING: Once = Once::new();

/// Installs a test subscriber honouring `RUST_LOG`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Builds a bridge over a simulated device.
pub async fn bridge(sim: &SimulatedTransport) -> anyhow::Result<Bridge> {
    init_tracing();
    Ok(Bridge::builder().transport(sim.clone()).build().await?)
}
