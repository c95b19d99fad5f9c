//! Compute provider trait definition

use crate::error::Result;
use crate::model::{
    AttachOptions, DiskSpec, Fingerprint, Labels, ListScope, Metadata, OperationHandle,
    ResourceRef, ResourceSpec, ResourceSummary, UpdateFields,
};
use async_trait::async_trait;

/// Remote compute / cluster management API
///
/// Every backend (Google REST, in-memory sandbox) implements this trait so the
/// orchestration core never sees request/response shapes. Mutations return an
/// [`OperationHandle`]; the resource itself converges asynchronously and must be
/// observed through [`ComputeApi::get_resource`].
#[async_trait]
pub trait ComputeApi: Send + Sync {
    /// Returns the backend name (e.g., "google", "memory")
    fn name(&self) -> &str;

    async fn list_resources(&self, scope: &ListScope) -> Result<Vec<ResourceSummary>>;

    /// `Ok(None)` when the resource does not exist
    async fn get_resource(&self, target: &ResourceRef) -> Result<Option<ResourceSummary>>;

    async fn create_resource(&self, spec: &ResourceSpec) -> Result<OperationHandle>;

    async fn delete_resource(&self, target: &ResourceRef) -> Result<OperationHandle>;

    /// Change fields that require a stopped instance (machine type, CPU platform)
    async fn update_resource(
        &self,
        target: &ResourceRef,
        fields: &UpdateFields,
    ) -> Result<OperationHandle>;

    /// Replace the whole label set. A stale `fingerprint` must fail with
    /// `CloudError::ConcurrencyConflict`.
    async fn set_labels(
        &self,
        target: &ResourceRef,
        labels: &Labels,
        fingerprint: &Fingerprint,
    ) -> Result<OperationHandle>;

    /// Replace the whole metadata set, same fingerprint contract as `set_labels`
    async fn set_metadata(
        &self,
        target: &ResourceRef,
        metadata: &Metadata,
        fingerprint: &Fingerprint,
    ) -> Result<OperationHandle>;

    /// Node-pool style resize
    async fn set_size(&self, target: &ResourceRef, count: u32) -> Result<OperationHandle>;

    async fn start_resource(&self, target: &ResourceRef) -> Result<OperationHandle>;

    async fn stop_resource(&self, target: &ResourceRef) -> Result<OperationHandle>;

    async fn create_sub_resource(&self, disk: &DiskSpec) -> Result<OperationHandle>;

    async fn attach_sub_resource(
        &self,
        target: &ResourceRef,
        disk: &ResourceRef,
        options: &AttachOptions,
    ) -> Result<OperationHandle>;

    async fn detach_sub_resource(
        &self,
        target: &ResourceRef,
        device_name: &str,
    ) -> Result<OperationHandle>;
}
