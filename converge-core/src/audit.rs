//! Reconciliation audit logging
//!
//! Records lifecycle events for every resource the engine touches. Events go
//! out as `tracing` events on the `audit` target, so the host decides where
//! they end up. Logging never fails the reconciliation.

use tracing::{info, warn};

use crate::state::ResourceId;
use crate::tags::TagDelta;

const TARGET: &str = "audit";

/// Audit logger with domain-specific methods.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReconcileAuditLogger {
    enabled: bool,
}

impl ReconcileAuditLogger {
    pub fn new() -> Self {
        Self { enabled: true }
    }

    /// Create a noop audit logger (for testing)
    pub fn new_noop() -> Self {
        Self { enabled: false }
    }

    // === Lifecycle Events ===

    pub fn created(&self, kind: &str, id: &ResourceId) {
        if self.enabled {
            info!(target: TARGET, kind, resource_id = %id, "{} '{}' created", kind, id);
        }
    }

    pub fn updated(&self, kind: &str, id: &ResourceId, steps: &[String]) {
        if self.enabled {
            info!(
                target: TARGET,
                kind,
                resource_id = %id,
                steps = steps.len(),
                "{} '{}' updated: {}",
                kind,
                id,
                steps.join("; ")
            );
        }
    }

    pub fn deleted(&self, kind: &str, id: &ResourceId) {
        if self.enabled {
            info!(target: TARGET, kind, resource_id = %id, "{} '{}' deleted", kind, id);
        }
    }

    pub fn imported(&self, kind: &str, id: &ResourceId) {
        if self.enabled {
            info!(target: TARGET, kind, resource_id = %id, "{} '{}' imported", kind, id);
        }
    }

    // === Drift Events ===

    pub fn drifted(&self, kind: &str, id: &ResourceId) {
        if self.enabled {
            warn!(
                target: TARGET,
                kind,
                resource_id = %id,
                "{} '{}' changed outside of reconciliation",
                kind,
                id
            );
        }
    }

    pub fn gone(&self, kind: &str, id: &ResourceId) {
        if self.enabled {
            warn!(
                target: TARGET,
                kind,
                resource_id = %id,
                "{} '{}' no longer exists, dropping from state",
                kind,
                id
            );
        }
    }

    // === Attachment Events ===

    pub fn attached(&self, kind: &str, id: &ResourceId, parent_id: &str, slot: u32) {
        if self.enabled {
            info!(
                target: TARGET,
                kind,
                resource_id = %id,
                parent_id,
                slot,
                "{} '{}' attached to {} at slot {}",
                kind,
                id,
                parent_id,
                slot
            );
        }
    }

    pub fn detached(&self, kind: &str, id: &ResourceId, parent_id: &str) {
        if self.enabled {
            info!(
                target: TARGET,
                kind,
                resource_id = %id,
                parent_id,
                "{} '{}' detached from {}",
                kind,
                id,
                parent_id
            );
        }
    }

    // === Tag Events ===

    pub fn tags_updated(&self, kind: &str, id: &ResourceId, delta: &TagDelta) {
        if self.enabled {
            info!(
                target: TARGET,
                kind,
                resource_id = %id,
                upserted = delta.upsert.len(),
                removed = delta.remove.len(),
                "{} '{}' tags updated",
                kind,
                id
            );
        }
    }
}
