//! Capability interface to the remote control plane.
//!
//! The concrete SDK binding implements [`ControlPlane`] per resource type. A handle
//! is passed into every reconciler call; the engine keeps no client of its own.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{ClientError, ClientResult};
use crate::resource::Resource;
use crate::state::{AttachmentId, ResourceId};
use crate::tags::{TagDelta, TagSet};

/// Desired attachment of a resource to a parent at a given slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentSpec {
    pub parent_id: String,
    pub slot: u32,
}

/// An existing attachment, as observed on the remote object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRef {
    pub attachment_id: AttachmentId,
    pub parent_id: String,
    pub slot: u32,
}

impl AttachmentRef {
    /// Whether this attachment already satisfies `spec`.
    pub fn satisfies(&self, spec: &AttachmentSpec) -> bool {
        self.parent_id == spec.parent_id && self.slot == spec.slot
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentState {
    Attaching,
    Attached,
    Detaching,
    Detached,
}

impl AttachmentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttachmentState::Attaching => "attaching",
            AttachmentState::Attached => "attached",
            AttachmentState::Detaching => "detaching",
            AttachmentState::Detached => "detached",
        }
    }
}

impl std::str::FromStr for AttachmentState {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "attaching" => Ok(AttachmentState::Attaching),
            "attached" => Ok(AttachmentState::Attached),
            "detaching" => Ok(AttachmentState::Detaching),
            "detached" => Ok(AttachmentState::Detached),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentStatus {
    pub attachment_id: AttachmentId,
    pub state: AttachmentState,
}

/// Remote operations the engine needs for resource type `R`.
#[async_trait]
pub trait ControlPlane<R: Resource>: Send + Sync {
    async fn create(&self, request: &R::Request) -> ClientResult<ResourceId>;

    async fn fetch(&self, id: &ResourceId) -> ClientResult<R::Response>;

    /// Apply one planned attribute change.
    async fn mutate(&self, id: &ResourceId, delta: &R::Delta) -> ClientResult<()>;

    /// `if_match` is the revision last observed, for types that version their objects.
    async fn delete(&self, id: &ResourceId, if_match: Option<&str>) -> ClientResult<()>;

    async fn list_tags(&self, id: &ResourceId) -> ClientResult<TagSet>;

    async fn update_tags(&self, id: &ResourceId, delta: &TagDelta) -> ClientResult<()>;

    async fn attach(
        &self,
        _id: &ResourceId,
        _parent_id: &str,
        _slot: u32,
    ) -> ClientResult<AttachmentId> {
        Err(ClientError::Unsupported("attach"))
    }

    async fn fetch_attachment(&self, _attachment: &AttachmentId) -> ClientResult<AttachmentStatus> {
        Err(ClientError::Unsupported("fetch_attachment"))
    }

    async fn detach(&self, _attachment: &AttachmentId) -> ClientResult<()> {
        Err(ClientError::Unsupported("detach"))
    }
}
