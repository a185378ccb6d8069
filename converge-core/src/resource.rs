//! Per-resource-type contract driven by the reconciler.

use std::fmt;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::client::AttachmentRef;
use crate::config::ProviderContext;
use crate::error::ValidationError;
use crate::plan::{Operation, Plan};
use crate::state::ResourceId;
use crate::tags::{TagLayers, TagSet};

/// How an attribute is supplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrMode {
    Required,
    Optional,
    /// Server-supplied only; never encoded.
    Computed,
    /// Server may default it when absent; a client value wins once set.
    OptionalComputed,
}

/// One row of a resource type's schema table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attribute {
    pub name: &'static str,
    pub mode: AttrMode,
    /// Changing the value requires destroying and re-creating the resource.
    pub force_new: bool,
}

impl Attribute {
    pub const fn required(name: &'static str) -> Self {
        Self {
            name,
            mode: AttrMode::Required,
            force_new: false,
        }
    }

    pub const fn optional(name: &'static str) -> Self {
        Self {
            name,
            mode: AttrMode::Optional,
            force_new: false,
        }
    }

    pub const fn computed(name: &'static str) -> Self {
        Self {
            name,
            mode: AttrMode::Computed,
            force_new: false,
        }
    }

    pub const fn optional_computed(name: &'static str) -> Self {
        Self {
            name,
            mode: AttrMode::OptionalComputed,
            force_new: false,
        }
    }

    pub const fn force_new(mut self) -> Self {
        self.force_new = true;
        self
    }
}

/// Look up an attribute by name in a schema table.
pub fn lookup(schema: &'static [Attribute], name: &str) -> Option<&'static Attribute> {
    schema.iter().find(|a| a.name == name)
}

/// Fail with `MissingRequired` when a required string attribute is empty.
pub fn require(name: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::MissingRequired(name));
    }
    Ok(())
}

/// Remote lifecycle status as seen by the poller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lifecycle {
    Pending(String),
    Ready,
    Failed { status: String, reason: String },
}

/// The create call plus the secondary calls that must follow it.
///
/// Deferred operations cover attributes the create call cannot carry, or cannot
/// carry in combination with others.
#[derive(Debug, Clone)]
pub struct CreatePlan<Req, D> {
    pub request: Req,
    pub deferred: Vec<Operation<D>>,
}

/// Inputs to decoding that do not come from the response itself.
#[derive(Debug, Clone)]
pub struct DecodeContext<'a> {
    pub id: &'a ResourceId,
    pub provider: &'a ProviderContext,
    pub tags: TagLayers,
}

/// A resource type: its desired/canonical shapes, wire shapes, codec and planner.
///
/// All methods are pure; remote calls happen only in the reconciler.
pub trait Resource: Send + Sync + Sized + 'static {
    const KIND: &'static str;
    const SCHEMA: &'static [Attribute];

    type Desired: Clone + fmt::Debug + Send + Sync;
    type State: Clone + fmt::Debug + PartialEq + Send + Sync + Serialize + DeserializeOwned;
    type Request: fmt::Debug + Send + Sync;
    type Response: fmt::Debug + Send + Sync;
    type Delta: Clone + fmt::Debug + fmt::Display + PartialEq + Send + Sync;

    fn validate(desired: &Self::Desired) -> Result<(), ValidationError>;

    /// Resource-local tags of the desired state.
    fn local_tags(desired: &Self::Desired) -> &TagSet;

    /// Encode desired state for creation; `tags` are the merged effective tags.
    fn create_plan(
        desired: &Self::Desired,
        tags: &TagSet,
    ) -> CreatePlan<Self::Request, Self::Delta>;

    fn lifecycle(response: &Self::Response) -> Lifecycle;

    /// Tags carried in the fetch response; `None` means they are listed separately.
    fn response_tags(response: &Self::Response) -> Option<TagSet>;

    fn decode(response: &Self::Response, ctx: &DecodeContext<'_>) -> Self::State;

    /// Plan the calls that take `prior` to `desired`; `tags` are the merged effective tags.
    fn plan(prior: &Self::State, desired: &Self::Desired, tags: &TagSet) -> Plan<Self::Delta>;

    /// Attachment that must be released before deletion.
    fn attachment(_state: &Self::State) -> Option<&AttachmentRef> {
        None
    }

    /// Object revision the control plane requires on destructive calls.
    fn revision(_state: &Self::State) -> Option<&str> {
        None
    }
}
