//! gcpflow core
//!
//! Intent resolution and mutation orchestration on top of [`gcpflow_cloud::ComputeApi`]:
//!
//! - [`IntentParser`] turns free text into an [`Intent`]
//! - [`OperationDispatcher`] routes intents and structured [`Request`]s
//! - [`ConcurrencyController`] applies fingerprint-checked label / metadata writes
//! - [`WorkflowOrchestrator`] runs stop/update/start and create/wait/attach sequences
//!
//! The dispatcher never returns an error: every path ends in an
//! [`gcpflow_cloud::OperationOutcome`].

pub mod concurrency;
pub mod dispatcher;
pub mod intent;
pub mod validation;
pub mod workflow;

pub use concurrency::{ConcurrencyController, FieldUpdate};
pub use dispatcher::{OperationDispatcher, Request};
pub use intent::{Intent, IntentParser};
pub use workflow::{
    DEFAULT_POLL_INTERVAL, DEFAULT_POLL_TIMEOUT, PollConfig, ResourceLocks, Workflow,
    WorkflowOrchestrator, WorkflowStep,
};
