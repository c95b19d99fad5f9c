//! Uniform result value returned for every dispatched operation

use crate::error::CloudError;
use crate::model::{OperationHandle, ResourceSummary};
use serde::{Deserialize, Serialize};

pub const STATUS_NO_OP: &str = "NO_OP";
pub const STATUS_OK: &str = "OK";
pub const STATUS_FAILED: &str = "FAILED";
pub const STATUS_NOT_FOUND: &str = "NOT_FOUND";
pub const STATUS_UNRECOGNIZED: &str = "UNRECOGNIZED";

/// Category of a failed outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Resource absent
    NotFound,
    /// Stale fingerprint
    ConcurrencyConflict,
    /// Rejected before any remote call
    Validation,
    /// Network / API error
    RemoteCallFailure,
    /// Polling step exceeded its deadline
    Timeout,
    /// Polling step aborted by the caller
    Cancelled,
    /// No intent recognized in free text
    Unrecognized,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::NotFound => write!(f, "not-found"),
            FailureKind::ConcurrencyConflict => write!(f, "concurrency-conflict"),
            FailureKind::Validation => write!(f, "validation"),
            FailureKind::RemoteCallFailure => write!(f, "remote-call-failure"),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::Cancelled => write!(f, "cancelled"),
            FailureKind::Unrecognized => write!(f, "unrecognized"),
        }
    }
}

impl From<&CloudError> for FailureKind {
    fn from(err: &CloudError) -> Self {
        match err {
            CloudError::NotFound(_) => FailureKind::NotFound,
            CloudError::ConcurrencyConflict { .. } => FailureKind::ConcurrencyConflict,
            CloudError::Validation(_) | CloudError::AlreadyExists(_) => FailureKind::Validation,
            CloudError::Timeout(_) => FailureKind::Timeout,
            CloudError::Cancelled(_) => FailureKind::Cancelled,
            CloudError::Api(_)
            | CloudError::AuthenticationFailed(_)
            | CloudError::InvalidConfig(_)
            | CloudError::Io(_)
            | CloudError::Json(_) => FailureKind::RemoteCallFailure,
        }
    }
}

/// Failure detail attached to an outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
}

/// Result of one operation or one workflow
///
/// For workflows `per_step_results` holds one entry per executed step, in
/// execution order, so a caller can see how far the workflow progressed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationOutcome {
    /// Whether the remote side accepted a request (false for no-ops and failures)
    pub accepted: bool,

    /// Remote operation id, empty when no remote operation was started
    pub remote_operation_id: String,

    /// Remote operation status, or one of the `STATUS_*` markers
    pub status: String,

    /// Step label when this outcome describes a workflow step
    pub step: Option<String>,

    /// Human readable summary
    pub message: String,

    pub failure: Option<Failure>,

    /// Resources returned by list/get
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<ResourceSummary>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub per_step_results: Vec<OperationOutcome>,
}

impl OperationOutcome {
    fn blank(status: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            accepted: false,
            remote_operation_id: String::new(),
            status: status.into(),
            step: None,
            message: message.into(),
            failure: None,
            resources: Vec::new(),
            per_step_results: Vec::new(),
        }
    }

    /// The remote API accepted a mutation
    pub fn accepted(handle: &OperationHandle, message: impl Into<String>) -> Self {
        Self {
            accepted: true,
            remote_operation_id: handle.id.clone(),
            ..Self::blank(handle.status.clone(), message)
        }
    }

    /// A read (list/get) completed
    pub fn read(resources: Vec<ResourceSummary>, message: impl Into<String>) -> Self {
        Self {
            accepted: true,
            resources,
            ..Self::blank(STATUS_OK, message)
        }
    }

    /// A step that completed locally without a remote operation (e.g. a poll)
    pub fn observed(status: impl std::fmt::Display, message: impl Into<String>) -> Self {
        Self {
            accepted: true,
            ..Self::blank(status.to_string(), message)
        }
    }

    /// Resource already in the desired state. Not a failure.
    pub fn no_op(message: impl Into<String>) -> Self {
        Self::blank(STATUS_NO_OP, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::rejected(FailureKind::NotFound, message)
    }

    pub fn unrecognized(message: impl Into<String>) -> Self {
        Self::rejected(FailureKind::Unrecognized, message)
    }

    pub fn rejected(kind: FailureKind, message: impl Into<String>) -> Self {
        let message = message.into();
        let status = match kind {
            FailureKind::NotFound => STATUS_NOT_FOUND,
            FailureKind::Unrecognized => STATUS_UNRECOGNIZED,
            _ => STATUS_FAILED,
        };
        Self {
            failure: Some(Failure {
                kind,
                message: message.clone(),
            }),
            ..Self::blank(status, message)
        }
    }

    /// Failure caused by an error, message prefixed with what was attempted
    pub fn failed(context: impl std::fmt::Display, err: &CloudError) -> Self {
        Self::rejected(FailureKind::from(err), format!("{}: {}", context, err))
    }

    pub fn with_step(mut self, step: impl Into<String>) -> Self {
        self.step = Some(step.into());
        self
    }

    pub fn with_steps(mut self, steps: Vec<OperationOutcome>) -> Self {
        self.per_step_results = steps;
        self
    }

    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    pub fn is_no_op(&self) -> bool {
        self.status == STATUS_NO_OP
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        self.failure.as_ref().map(|f| f.kind)
    }

    /// Step labels in execution order
    pub fn step_labels(&self) -> Vec<&str> {
        self.per_step_results
            .iter()
            .filter_map(|s| s.step.as_deref())
            .collect()
    }
}

impl std::fmt::Display for OperationOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}
