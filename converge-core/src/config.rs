//! Reconciler configuration.
//!
//! [`ReconcilerConfig`] derives `clap::Args` so a host binary can flatten it into
//! its own argument parser, and serde so it can be loaded from a file.

use std::time::Duration;

use clap::Args;
use serde::{Deserialize, Serialize};

use crate::tags::TagConfig;
use crate::wait::WaitSpec;

const DEFAULT_CREATE_TIMEOUT_SECS: u64 = 600;
const DEFAULT_UPDATE_TIMEOUT_SECS: u64 = 600;
const DEFAULT_DELETE_TIMEOUT_SECS: u64 = 600;
const DEFAULT_ATTACH_TIMEOUT_SECS: u64 = 300;
const DEFAULT_DETACH_TIMEOUT_SECS: u64 = 600;
const DEFAULT_POLL_INTERVAL_MS: u64 = 5000;
const DEFAULT_NOT_FOUND_GRACE_SECS: u64 = 60;
const DEFAULT_POLL_JITTER: f64 = 0.1;

/// Which call site a wait belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitPurpose {
    Create,
    Update,
    Delete,
    Attach,
    Detach,
}

/// Partition and region the control plane lives in.
#[derive(Debug, Clone, PartialEq, Eq, Args, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderContext {
    /// Partition used when deriving ARNs
    #[arg(long, default_value = "aws")]
    pub partition: String,

    /// Region used when deriving ARNs
    #[arg(long, default_value = "us-east-1")]
    pub region: String,
}

impl Default for ProviderContext {
    fn default() -> Self {
        Self {
            partition: "aws".to_string(),
            region: "us-east-1".to_string(),
        }
    }
}

impl ProviderContext {
    pub fn arn(&self, service: &str, account: &str, resource: &str) -> String {
        format!(
            "arn:{}:{}:{}:{}:{}",
            self.partition, service, self.region, account, resource
        )
    }
}

/// Timeouts, polling and tag settings shared by every reconciliation.
#[derive(Debug, Clone, PartialEq, Args, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcilerConfig {
    /// Seconds to wait for a created resource to become active
    #[arg(long, default_value_t = DEFAULT_CREATE_TIMEOUT_SECS)]
    pub create_timeout_secs: u64,

    /// Seconds to wait for an updated resource to settle
    #[arg(long, default_value_t = DEFAULT_UPDATE_TIMEOUT_SECS)]
    pub update_timeout_secs: u64,

    /// Seconds to wait for a deletion to complete
    #[arg(long, default_value_t = DEFAULT_DELETE_TIMEOUT_SECS)]
    pub delete_timeout_secs: u64,

    /// Seconds to wait for an attachment to become attached
    #[arg(long, default_value_t = DEFAULT_ATTACH_TIMEOUT_SECS)]
    pub attach_timeout_secs: u64,

    /// Seconds to wait for an attachment to be released
    #[arg(long, default_value_t = DEFAULT_DETACH_TIMEOUT_SECS)]
    pub detach_timeout_secs: u64,

    /// Milliseconds between status polls
    #[arg(long, default_value_t = DEFAULT_POLL_INTERVAL_MS)]
    pub poll_interval_ms: u64,

    /// Seconds a freshly created resource may read as not found
    #[arg(long, default_value_t = DEFAULT_NOT_FOUND_GRACE_SECS)]
    pub not_found_grace_secs: u64,

    /// Extra random delay per poll, as a fraction of the interval (0 disables, capped at 1)
    #[arg(long, default_value_t = DEFAULT_POLL_JITTER)]
    pub poll_jitter: f64,

    #[command(flatten)]
    pub provider: ProviderContext,

    #[command(flatten)]
    pub tags: TagConfig,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            create_timeout_secs: DEFAULT_CREATE_TIMEOUT_SECS,
            update_timeout_secs: DEFAULT_UPDATE_TIMEOUT_SECS,
            delete_timeout_secs: DEFAULT_DELETE_TIMEOUT_SECS,
            attach_timeout_secs: DEFAULT_ATTACH_TIMEOUT_SECS,
            detach_timeout_secs: DEFAULT_DETACH_TIMEOUT_SECS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            not_found_grace_secs: DEFAULT_NOT_FOUND_GRACE_SECS,
            poll_jitter: DEFAULT_POLL_JITTER,
            provider: ProviderContext::default(),
            tags: TagConfig::default(),
        }
    }
}

impl ReconcilerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn not_found_grace(&self) -> Duration {
        Duration::from_secs(self.not_found_grace_secs)
    }

    pub fn timeout(&self, purpose: WaitPurpose) -> Duration {
        let secs = match purpose {
            WaitPurpose::Create => self.create_timeout_secs,
            WaitPurpose::Update => self.update_timeout_secs,
            WaitPurpose::Delete => self.delete_timeout_secs,
            WaitPurpose::Attach => self.attach_timeout_secs,
            WaitPurpose::Detach => self.detach_timeout_secs,
        };
        Duration::from_secs(secs)
    }

    /// Build the wait parameters for one call site.
    pub fn wait_spec(&self, purpose: WaitPurpose, target: &'static str) -> WaitSpec {
        let spec = WaitSpec::new(target, self.timeout(purpose), self.poll_interval())
            .with_jitter(self.poll_jitter);
        match purpose {
            // Read-after-write: a just-created object may not be visible yet.
            WaitPurpose::Create => spec.with_not_found_grace(self.not_found_grace()),
            _ => spec,
        }
    }
}
