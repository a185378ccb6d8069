//! Error types for the convergence engine.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::state::{ResourceId, Snapshot};

/// The resource an error refers to: its type and, once created, its ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject {
    pub kind: &'static str,
    pub id: Option<ResourceId>,
}

impl Subject {
    pub fn new(kind: &'static str, id: Option<ResourceId>) -> Self {
        Self { kind, id }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.id {
            Some(id) => write!(f, "{} ({})", self.kind, id),
            None => write!(f, "{} (not yet created)", self.kind),
        }
    }
}

/// Malformed desired state. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("attribute `{0}` is required")]
    MissingRequired(&'static str),

    #[error("attributes `{0}` and `{1}` are mutually exclusive")]
    ConflictingAttributes(&'static str, &'static str),

    #[error("attribute `{attribute}`: {reason}")]
    InvalidValue {
        attribute: &'static str,
        reason: String,
    },

    #[error("changing {} requires replacement", .0.join(", "))]
    RequiresReplacement(Vec<&'static str>),

    #[error("{0} is required for this action")]
    MissingInput(&'static str),
}

impl ValidationError {
    pub fn invalid(attribute: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            attribute,
            reason: reason.into(),
        }
    }
}

/// Errors returned by a [`ControlPlane`](crate::client::ControlPlane) implementation.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("not found: {0}")]
    NotFound(String),

    /// Terminal remote rejection (validation, conflict).
    #[error("rejected ({code}): {message}")]
    Rejected { code: String, message: String },

    /// Network or transport failure; retry policy belongs to the caller.
    #[error(transparent)]
    Transport(#[from] anyhow::Error),

    #[error("operation not supported: {0}")]
    Unsupported(&'static str),
}

impl ClientError {
    pub fn rejected(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Rejected {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound(_))
    }
}

pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// Errors produced by the wait poller.
#[derive(Debug, Error)]
pub enum WaitError {
    #[error("timed out after {elapsed:?} (last status: {})", .last_status.as_deref().unwrap_or("none"))]
    Timeout {
        elapsed: Duration,
        last_status: Option<String>,
    },

    #[error("entered terminal status {status}: {reason}")]
    Terminal { status: String, reason: String },

    #[error("cancelled (last status: {})", .last_status.as_deref().unwrap_or("none"))]
    Cancelled { last_status: Option<String> },

    #[error(transparent)]
    Client(#[from] ClientError),
}

/// Reconciliation errors. Every variant names the resource and the operation attempted.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("{operation} {subject}: invalid desired state: {source}")]
    Validation {
        subject: Subject,
        operation: &'static str,
        #[source]
        source: ValidationError,
    },

    #[error("{operation} {subject}: not found")]
    NotFound {
        subject: Subject,
        operation: &'static str,
    },

    #[error("{operation} {subject}: remote reported status {status}: {reason}")]
    TerminalFailure {
        subject: Subject,
        operation: &'static str,
        status: String,
        reason: String,
    },

    #[error(
        "{operation} {subject}: timed out after {elapsed:?} (last status: {})",
        .last_status.as_deref().unwrap_or("none")
    )]
    Timeout {
        subject: Subject,
        operation: &'static str,
        elapsed: Duration,
        last_status: Option<String>,
    },

    #[error(
        "{operation} {subject}: cancelled (last status: {})",
        .last_status.as_deref().unwrap_or("none")
    )]
    Cancelled {
        subject: Subject,
        operation: &'static str,
        last_status: Option<String>,
    },

    /// An update plan aborted mid-sequence. The caller must re-read to learn
    /// the actual remote state; nothing is rolled back.
    #[error("{operation} {subject}: aborted at `{failed}` after {} completed step(s)", .completed.len())]
    PartialFailure {
        subject: Subject,
        operation: &'static str,
        completed: Vec<String>,
        failed: String,
        #[source]
        source: Box<ReconcileError>,
    },

    #[error("{operation} {subject}: {source}")]
    Remote {
        subject: Subject,
        operation: &'static str,
        #[source]
        source: ClientError,
    },
}

impl ReconcileError {
    pub fn validation(subject: Subject, operation: &'static str, source: ValidationError) -> Self {
        Self::Validation {
            subject,
            operation,
            source,
        }
    }

    /// Wrap a client error, mapping `NotFound` to its own variant.
    pub fn remote(subject: Subject, operation: &'static str, source: ClientError) -> Self {
        if source.is_not_found() {
            Self::NotFound { subject, operation }
        } else {
            Self::Remote {
                subject,
                operation,
                source,
            }
        }
    }

    pub fn from_wait(subject: Subject, operation: &'static str, err: WaitError) -> Self {
        match err {
            WaitError::Timeout {
                elapsed,
                last_status,
            } => Self::Timeout {
                subject,
                operation,
                elapsed,
                last_status,
            },
            WaitError::Terminal { status, reason } => Self::TerminalFailure {
                subject,
                operation,
                status,
                reason,
            },
            WaitError::Cancelled { last_status } => Self::Cancelled {
                subject,
                operation,
                last_status,
            },
            WaitError::Client(source) => Self::remote(subject, operation, source),
        }
    }

    pub fn subject(&self) -> &Subject {
        match self {
            Self::Validation { subject, .. }
            | Self::NotFound { subject, .. }
            | Self::TerminalFailure { subject, .. }
            | Self::Timeout { subject, .. }
            | Self::Cancelled { subject, .. }
            | Self::PartialFailure { subject, .. }
            | Self::Remote { subject, .. } => subject,
        }
    }

    pub fn operation(&self) -> &'static str {
        match self {
            Self::Validation { operation, .. }
            | Self::NotFound { operation, .. }
            | Self::TerminalFailure { operation, .. }
            | Self::Timeout { operation, .. }
            | Self::Cancelled { operation, .. }
            | Self::PartialFailure { operation, .. }
            | Self::Remote { operation, .. } => operation,
        }
    }

    /// Whether retrying the whole reconciliation may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Cancelled { .. } => true,
            Self::Remote { source, .. } => matches!(source, ClientError::Transport(_)),
            Self::PartialFailure { source, .. } => source.is_retryable(),
            Self::Validation { .. } | Self::NotFound { .. } | Self::TerminalFailure { .. } => {
                false
            }
        }
    }
}

/// A failed reconciliation together with any state the caller must still persist.
///
/// After a create whose deferred steps failed, the remote object exists: `state`
/// then carries its snapshot (or the error's subject carries at least its ID).
#[derive(Debug, Error)]
#[error("{error}")]
pub struct ReconcileFailure<S: fmt::Debug> {
    #[source]
    pub error: ReconcileError,
    pub state: Option<Snapshot<S>>,
}

impl<S: fmt::Debug> ReconcileFailure<S> {
    pub fn with_state(error: ReconcileError, state: Option<Snapshot<S>>) -> Self {
        Self { error, state }
    }

    /// ID of the remote object, if one exists.
    pub fn id(&self) -> Option<&ResourceId> {
        self.state
            .as_ref()
            .map(|s| &s.id)
            .or(self.error.subject().id.as_ref())
    }
}

impl<S: fmt::Debug> From<ReconcileError> for ReconcileFailure<S> {
    fn from(error: ReconcileError) -> Self {
        Self { error, state: None }
    }
}
