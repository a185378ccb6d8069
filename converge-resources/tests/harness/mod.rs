//! Test harness for reconciliation integration tests
//!
//! Provides an in-memory control plane and preconfigured reconcilers.

#![allow(dead_code)]

pub mod cloud;

use std::sync::Once;

use converge_core::{ReconcileAuditLogger, Reconciler, ReconcilerConfig};
use converge_resources::{EventBus, NetworkInterface, ResponseHeadersPolicy};
use tracing_subscriber::EnvFilter;

pub use cloud::{Faults, FakeCloud, OWNER_ID};

static TRACING: Once = Once::new();

/// Install a test subscriber once; filter with `RUST_LOG`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// One-second polls without jitter, so paused-clock tests are exact.
pub fn config() -> ReconcilerConfig {
    ReconcilerConfig {
        poll_interval_ms: 1000,
        poll_jitter: 0.0,
        ..Default::default()
    }
}

pub fn interfaces(config: ReconcilerConfig) -> Reconciler<NetworkInterface> {
    init_tracing();
    Reconciler::new(config).with_audit(ReconcileAuditLogger::new())
}

pub fn buses(config: ReconcilerConfig) -> Reconciler<EventBus> {
    init_tracing();
    Reconciler::new(config).with_audit(ReconcileAuditLogger::new())
}

pub fn policies(config: ReconcilerConfig) -> Reconciler<ResponseHeadersPolicy> {
    init_tracing();
    Reconciler::new(config).with_audit(ReconcileAuditLogger::new())
}
