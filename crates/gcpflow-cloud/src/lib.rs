//! gcpflow Cloud abstraction
//!
//! This crate provides the compute/cluster provider abstraction for gcpflow:
//! the [`ComputeApi`] trait every backend implements, the resource model shared
//! with the orchestration core, zonal/regional [`Location`] resolution and the
//! uniform [`OperationOutcome`] value.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │          gflow CLI / MCP server                 │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │               gcpflow-core                      │
//! │  IntentParser · Dispatcher · Orchestrator · CAS │
//! └─────────────────┬───────────────────────────────┘
//!                   │  trait ComputeApi
//! ┌─────────────────▼───────────────────────────────┐
//! │               gcpflow-cloud                     │
//! └───────┬─────────────────┬───────────────────────┘
//!         │                 │
//! ┌───────▼───────┐ ┌───────▼───────┐
//! │ google (REST) │ │ memory        │
//! └───────────────┘ └───────────────┘
//! ```

pub mod error;
pub mod location;
pub mod memory;
pub mod model;
pub mod outcome;
pub mod provider;

// Re-exports
pub use error::{CloudError, Result};
pub use location::{Location, LocationKind};
pub use memory::{ExternalWrite, MemoryCompute, RecordedCall};
pub use model::{
    AttachOptions, ClusterSpec, DiskSpec, Fingerprint, InstanceSpec, Labels, ListScope, Metadata,
    NodePoolSpec, NodeTaint, OperationHandle, PrivateClusterConfig, ResourceKind, ResourceRef,
    ResourceSpec, ResourceStatus, ResourceSummary, TaintEffect, UpdateFields,
};
pub use outcome::{Failure, FailureKind, OperationOutcome};
pub use provider::ComputeApi;
