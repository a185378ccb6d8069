//! converge-core: single-resource convergence engine.
//!
//! Given the desired state of one remote resource, the engine:
//! - Encodes it into the control-plane request shape (codec lives with each resource type)
//! - Plans the minimal ordered set of mutating calls from a prior/desired diff
//! - Waits for asynchronous remote transitions with a bounded poller
//! - Reads the result back and normalizes drift into canonical state
//!
//! The orchestration layer calls [`Reconciler::reconcile`] once per node; the remote
//! API is reached only through the [`ControlPlane`] capability handle passed into
//! every call.

pub mod audit;
pub mod client;
pub mod config;
pub mod drift;
pub mod error;
pub mod field;
pub mod plan;
pub mod reconciler;
pub mod resource;
pub mod set;
pub mod state;
pub mod tags;
pub mod wait;

pub use audit::ReconcileAuditLogger;
pub use client::{AttachmentRef, AttachmentSpec, AttachmentState, AttachmentStatus, ControlPlane};
pub use config::{ProviderContext, ReconcilerConfig};
pub use error::{ClientError, ClientResult, ReconcileError, ReconcileFailure, Subject, ValidationError};
pub use field::{Allocation, Field};
pub use plan::{Operation, Plan, PlanBuilder};
pub use reconciler::{Action, Outcome, Phase, Reconciler};
pub use resource::{AttrMode, Attribute, CreatePlan, DecodeContext, Lifecycle, Resource};
pub use set::UnorderedSet;
pub use state::{AttachmentId, ResourceId, Snapshot};
pub use tags::{TagConfig, TagDelta, TagSet};
pub use wait::{Cancellation, Observation, WaitSpec};
