//! In-memory compute backend
//!
//! Simulates the parts of the remote API the orchestration core depends on:
//! asynchronous status convergence (a stopped instance reports `STOPPING` for a
//! few reads before `TERMINATED`), independently versioned label and metadata
//! fingerprints, and duplicate / not-found errors. Every call is recorded so
//! tests can assert exact call sequences, and failures can be injected per verb.

use crate::error::{CloudError, Result};
use crate::model::{
    AttachOptions, DiskSpec, Fingerprint, Labels, ListScope, Metadata, OperationHandle,
    ResourceKind, ResourceRef, ResourceSpec, ResourceStatus, ResourceSummary, UpdateFields,
};
use crate::provider::ComputeApi;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};

/// Calls kept in the log; older entries are dropped first
pub const DEFAULT_CALL_LOG_LIMIT: usize = 10_000;

/// Verbs that only read remote state
const READ_VERBS: &[&str] = &["list_resources", "get_resource"];

/// A recorded call against the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub verb: &'static str,
    pub target: String,
}

/// Write performed by "someone else" right after the next read of a resource
#[derive(Debug, Clone)]
pub enum ExternalWrite {
    Labels(Labels),
    Metadata(Metadata),
}

#[derive(Debug, Clone)]
struct StoredResource {
    summary: ResourceSummary,
    label_version: u64,
    metadata_version: u64,
    /// Status the resource converges to, and the number of reads until it does
    pending: Option<(ResourceStatus, u32)>,
}

impl StoredResource {
    fn new(mut summary: ResourceSummary) -> Self {
        summary.label_fingerprint = Some(fingerprint(1));
        summary.metadata_fingerprint = Some(fingerprint(1));
        Self {
            summary,
            label_version: 1,
            metadata_version: 1,
            pending: None,
        }
    }

    fn bump_labels(&mut self, labels: Labels) {
        self.label_version += 1;
        self.summary.labels = labels;
        self.summary.label_fingerprint = Some(fingerprint(self.label_version));
    }

    fn bump_metadata(&mut self, metadata: Metadata) {
        self.metadata_version += 1;
        self.summary.metadata = metadata;
        self.summary.metadata_fingerprint = Some(fingerprint(self.metadata_version));
    }
}

fn fingerprint(version: u64) -> Fingerprint {
    Fingerprint::new(format!("fp-{:04}", version))
}

#[derive(Default)]
struct MemoryState {
    resources: BTreeMap<String, StoredResource>,
    calls: VecDeque<RecordedCall>,
    failures: HashMap<&'static str, String>,
    frozen: HashSet<String>,
    external_writes: HashMap<String, ExternalWrite>,
    operation_seq: u64,
}

/// In-memory implementation of [`ComputeApi`]
pub struct MemoryCompute {
    state: Mutex<MemoryState>,
    settle_reads: u32,
    call_log_limit: usize,
}

impl Default for MemoryCompute {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCompute {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            settle_reads: 1,
            call_log_limit: DEFAULT_CALL_LOG_LIMIT,
        }
    }

    /// Keep at most `limit` recorded calls
    pub fn with_call_log_limit(mut self, limit: usize) -> Self {
        self.call_log_limit = limit;
        self
    }

    /// Number of reads a transitional status is reported before it settles
    pub fn with_settle_reads(mut self, reads: u32) -> Self {
        self.settle_reads = reads;
        self
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Seed a resource
    pub fn insert(&self, summary: ResourceSummary) -> ResourceRef {
        let target = summary_ref(&summary);
        self.lock()
            .resources
            .insert(target.key(), StoredResource::new(summary));
        target
    }

    /// Seed an instance with the given status
    pub fn insert_instance(&self, name: &str, location: &str, status: ResourceStatus) -> ResourceRef {
        self.insert(
            ResourceSummary::new(name, ResourceKind::Instance, location.into())
                .with_status(status)
                .with_machine_type(crate::model::DEFAULT_MACHINE_TYPE),
        )
    }

    /// Current snapshot without recording a call or advancing convergence
    pub fn peek(&self, target: &ResourceRef) -> Option<ResourceSummary> {
        self.lock()
            .resources
            .get(&target.key())
            .map(|r| r.summary.clone())
    }

    /// Keep the resource in its current transitional status forever
    pub fn freeze(&self, target: &ResourceRef) {
        self.lock().frozen.insert(target.key());
    }

    /// Make the next call of `verb` fail with an API error
    pub fn fail_next(&self, verb: &'static str, message: impl Into<String>) {
        self.lock().failures.insert(verb, message.into());
    }

    /// Apply `write` (bumping the fingerprint) immediately after the next read of `target`
    pub fn write_after_next_read(&self, target: &ResourceRef, write: ExternalWrite) {
        self.lock().external_writes.insert(target.key(), write);
    }

    /// Apply a write from another client right now
    pub fn external_write(&self, target: &ResourceRef, write: ExternalWrite) -> Result<()> {
        let mut state = self.lock();
        let stored = state
            .resources
            .get_mut(&target.key())
            .ok_or_else(|| CloudError::NotFound(target.to_string()))?;
        apply_external(stored, write);
        Ok(())
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.lock().calls.iter().cloned().collect()
    }

    pub fn verbs(&self) -> Vec<&'static str> {
        self.lock().calls.iter().map(|c| c.verb).collect()
    }

    /// Calls that may change remote state
    pub fn mutation_calls(&self) -> Vec<RecordedCall> {
        self.lock()
            .calls
            .iter()
            .filter(|c| !READ_VERBS.contains(&c.verb))
            .cloned()
            .collect()
    }

    fn begin(&self, verb: &'static str, target: impl Into<String>) -> Result<MutexGuard<'_, MemoryState>> {
        let mut state = self.lock();
        if state.calls.len() >= self.call_log_limit {
            state.calls.pop_front();
        }
        state.calls.push_back(RecordedCall {
            verb,
            target: target.into(),
        });
        if let Some(message) = state.failures.remove(verb) {
            tracing::debug!("memory backend: injected failure for {}", verb);
            return Err(CloudError::Api(message));
        }
        Ok(state)
    }
}

fn summary_ref(summary: &ResourceSummary) -> ResourceRef {
    ResourceRef {
        kind: summary.kind,
        name: summary.name.clone(),
        location: summary.location.clone(),
        parent: summary.get_attribute::<String>("cluster"),
    }
}

fn apply_external(stored: &mut StoredResource, write: ExternalWrite) {
    match write {
        ExternalWrite::Labels(labels) => stored.bump_labels(labels),
        ExternalWrite::Metadata(metadata) => stored.bump_metadata(metadata),
    }
}

impl MemoryState {
    fn next_operation(&mut self, operation_type: &str, target: &str) -> OperationHandle {
        self.operation_seq += 1;
        OperationHandle::new(
            format!("operation-{:06}", self.operation_seq),
            "PENDING",
            operation_type,
        )
        .with_target(target)
    }

    fn get_mut(&mut self, target: &ResourceRef) -> Result<&mut StoredResource> {
        self.resources
            .get_mut(&target.key())
            .ok_or_else(|| CloudError::NotFound(target.to_string()))
    }

    fn create(&mut self, summary: ResourceSummary, settles_to: ResourceStatus, reads: u32) -> Result<()> {
        let key = summary_ref(&summary).key();
        if self.resources.contains_key(&key) {
            return Err(CloudError::AlreadyExists(summary_ref(&summary).to_string()));
        }
        let summary = summary.with_attribute(
            "created_at",
            serde_json::json!(chrono::Utc::now().to_rfc3339()),
        );
        let mut stored = StoredResource::new(summary);
        stored.pending = Some((settles_to, reads));
        self.resources.insert(key, stored);
        Ok(())
    }

    fn transition(
        &mut self,
        target: &ResourceRef,
        now: ResourceStatus,
        settles_to: ResourceStatus,
        reads: u32,
    ) -> Result<()> {
        let stored = self.get_mut(target)?;
        stored.summary.status = now;
        stored.pending = Some((settles_to, reads));
        Ok(())
    }
}

#[async_trait]
impl ComputeApi for MemoryCompute {
    fn name(&self) -> &str {
        "memory"
    }

    async fn list_resources(&self, scope: &ListScope) -> Result<Vec<ResourceSummary>> {
        let target = scope
            .location
            .as_ref()
            .map(|l| l.to_string())
            .unwrap_or_else(|| "-".to_string());
        let state = self.begin("list_resources", target)?;
        Ok(state
            .resources
            .values()
            .map(|r| &r.summary)
            .filter(|s| s.kind == scope.kind)
            .filter(|s| scope.location.as_ref().is_none_or(|l| &s.location == l))
            .filter(|s| {
                scope.parent.is_none()
                    || s.get_attribute::<String>("cluster").as_ref() == scope.parent.as_ref()
            })
            .cloned()
            .collect())
    }

    async fn get_resource(&self, target: &ResourceRef) -> Result<Option<ResourceSummary>> {
        let mut state = self.begin("get_resource", target.key())?;
        let key = target.key();
        let frozen = state.frozen.contains(&key);
        let external = state.external_writes.remove(&key);

        let Some(stored) = state.resources.get_mut(&key) else {
            return Ok(None);
        };

        let snapshot = stored.summary.clone();

        if !frozen {
            if let Some((settles_to, remaining)) = stored.pending {
                if remaining <= 1 {
                    stored.summary.status = settles_to;
                    stored.pending = None;
                } else {
                    stored.pending = Some((settles_to, remaining - 1));
                }
            }
        }

        if let Some(write) = external {
            apply_external(stored, write);
        }

        Ok(Some(snapshot))
    }

    async fn create_resource(&self, spec: &ResourceSpec) -> Result<OperationHandle> {
        let target = spec.resource_ref();
        let mut state = self.begin("create_resource", target.key())?;
        let reads = self.settle_reads;

        match spec {
            ResourceSpec::Instance(instance) => {
                let mut summary = ResourceSummary::new(
                    instance.name.clone(),
                    ResourceKind::Instance,
                    instance.location.clone(),
                )
                .with_status(ResourceStatus::Provisioning)
                .with_machine_type(instance.machine_type.clone());
                summary.labels = instance.labels.clone();
                summary.metadata = instance.metadata.clone();
                state.create(summary, ResourceStatus::Running, reads)?;
            }
            ResourceSpec::Cluster(cluster) => {
                let summary = ResourceSummary::new(
                    cluster.name.clone(),
                    ResourceKind::Cluster,
                    cluster.location.clone(),
                )
                .with_status(ResourceStatus::Provisioning)
                .with_attribute("autopilot", serde_json::json!(cluster.autopilot));
                state.create(summary, ResourceStatus::Running, reads)?;

                for pool in &cluster.node_pools {
                    let pool_summary = node_pool_summary(&cluster.name, cluster.location.clone(), pool);
                    state.create(pool_summary, ResourceStatus::Running, reads)?;
                }
            }
            ResourceSpec::NodePool {
                cluster,
                location,
                pool,
            } => {
                let cluster_ref = ResourceRef::cluster(cluster.clone(), location.clone());
                if !state.resources.contains_key(&cluster_ref.key()) {
                    return Err(CloudError::NotFound(cluster_ref.to_string()));
                }
                state.create(
                    node_pool_summary(cluster, location.clone(), pool),
                    ResourceStatus::Running,
                    reads,
                )?;
            }
        }

        Ok(state.next_operation("create", &target.name))
    }

    async fn delete_resource(&self, target: &ResourceRef) -> Result<OperationHandle> {
        let mut state = self.begin("delete_resource", target.key())?;
        if state.resources.remove(&target.key()).is_none() {
            return Err(CloudError::NotFound(target.to_string()));
        }
        if target.kind == ResourceKind::Cluster {
            let cluster = target.name.clone();
            state.resources.retain(|_, r| {
                !(r.summary.kind == ResourceKind::NodePool
                    && r.summary.get_attribute::<String>("cluster").as_deref() == Some(cluster.as_str()))
            });
        }
        Ok(state.next_operation("delete", &target.name))
    }

    async fn update_resource(
        &self,
        target: &ResourceRef,
        fields: &UpdateFields,
    ) -> Result<OperationHandle> {
        let mut state = self.begin("update_resource", target.key())?;
        let stored = state.get_mut(target)?;
        if stored.summary.status != ResourceStatus::Terminated {
            return Err(CloudError::Api(format!(
                "{} must be stopped before it can be updated (status {})",
                target, stored.summary.status
            )));
        }
        if let Some(machine_type) = &fields.machine_type {
            stored.summary.machine_type = Some(machine_type.clone());
        }
        if let Some(platform) = &fields.min_cpu_platform {
            stored
                .summary
                .attributes
                .insert("min_cpu_platform".to_string(), serde_json::json!(platform));
        }
        Ok(state.next_operation("update", &target.name))
    }

    async fn set_labels(
        &self,
        target: &ResourceRef,
        labels: &Labels,
        fingerprint: &Fingerprint,
    ) -> Result<OperationHandle> {
        let mut state = self.begin("set_labels", target.key())?;
        let stored = state.get_mut(target)?;
        if stored.summary.label_fingerprint.as_ref() != Some(fingerprint) {
            return Err(CloudError::conflict(
                target.to_string(),
                format!("label fingerprint {} is stale", fingerprint),
            ));
        }
        stored.bump_labels(labels.clone());
        Ok(state.next_operation("set_labels", &target.name))
    }

    async fn set_metadata(
        &self,
        target: &ResourceRef,
        metadata: &Metadata,
        fingerprint: &Fingerprint,
    ) -> Result<OperationHandle> {
        let mut state = self.begin("set_metadata", target.key())?;
        let stored = state.get_mut(target)?;
        if stored.summary.metadata_fingerprint.as_ref() != Some(fingerprint) {
            return Err(CloudError::conflict(
                target.to_string(),
                format!("metadata fingerprint {} is stale", fingerprint),
            ));
        }
        stored.bump_metadata(metadata.clone());
        Ok(state.next_operation("set_metadata", &target.name))
    }

    async fn set_size(&self, target: &ResourceRef, count: u32) -> Result<OperationHandle> {
        let mut state = self.begin("set_size", target.key())?;
        let stored = state.get_mut(target)?;
        stored
            .summary
            .attributes
            .insert("node_count".to_string(), serde_json::json!(count));
        Ok(state.next_operation("set_size", &target.name))
    }

    async fn start_resource(&self, target: &ResourceRef) -> Result<OperationHandle> {
        let reads = self.settle_reads;
        let mut state = self.begin("start_resource", target.key())?;
        state.transition(target, ResourceStatus::Staging, ResourceStatus::Running, reads)?;
        Ok(state.next_operation("start", &target.name))
    }

    async fn stop_resource(&self, target: &ResourceRef) -> Result<OperationHandle> {
        let reads = self.settle_reads;
        let mut state = self.begin("stop_resource", target.key())?;
        state.transition(target, ResourceStatus::Stopping, ResourceStatus::Terminated, reads)?;
        Ok(state.next_operation("stop", &target.name))
    }

    async fn create_sub_resource(&self, disk: &DiskSpec) -> Result<OperationHandle> {
        let reads = self.settle_reads;
        let mut state = self.begin("create_sub_resource", disk.resource_ref().key())?;
        let summary = ResourceSummary::new(disk.name.clone(), ResourceKind::Disk, disk.location.clone())
            .with_status(ResourceStatus::Creating)
            .with_attribute("size_gb", serde_json::json!(disk.size_gb))
            .with_attribute("disk_type", serde_json::json!(disk.disk_type));
        state.create(summary, ResourceStatus::Ready, reads)?;
        Ok(state.next_operation("create_disk", &disk.name))
    }

    async fn attach_sub_resource(
        &self,
        target: &ResourceRef,
        disk: &ResourceRef,
        options: &AttachOptions,
    ) -> Result<OperationHandle> {
        let mut state = self.begin("attach_sub_resource", target.key())?;
        let disk_status = state
            .resources
            .get(&disk.key())
            .map(|d| d.summary.status)
            .ok_or_else(|| CloudError::NotFound(disk.to_string()))?;
        if disk_status != ResourceStatus::Ready {
            return Err(CloudError::Api(format!(
                "{} is not ready (status {})",
                disk, disk_status
            )));
        }

        let stored = state.get_mut(target)?;
        let device_name = options.device_name.clone().unwrap_or_else(|| disk.name.clone());
        let mut disks = stored
            .summary
            .get_attribute::<Vec<serde_json::Value>>("disks")
            .unwrap_or_default();
        disks.push(serde_json::json!({
            "device_name": device_name,
            "source": disk.name,
            "read_only": options.read_only,
            "auto_delete": options.auto_delete,
        }));
        stored
            .summary
            .attributes
            .insert("disks".to_string(), serde_json::Value::Array(disks));
        Ok(state.next_operation("attach_disk", &target.name))
    }

    async fn detach_sub_resource(
        &self,
        target: &ResourceRef,
        device_name: &str,
    ) -> Result<OperationHandle> {
        let mut state = self.begin("detach_sub_resource", target.key())?;
        let stored = state.get_mut(target)?;
        let mut disks = stored
            .summary
            .get_attribute::<Vec<serde_json::Value>>("disks")
            .unwrap_or_default();
        let before = disks.len();
        disks.retain(|d| d.get("device_name").and_then(|v| v.as_str()) != Some(device_name));
        if disks.len() == before {
            return Err(CloudError::NotFound(format!(
                "device '{}' on {}",
                device_name, target
            )));
        }
        stored
            .summary
            .attributes
            .insert("disks".to_string(), serde_json::Value::Array(disks));
        Ok(state.next_operation("detach_disk", &target.name))
    }
}

fn node_pool_summary(
    cluster: &str,
    location: crate::location::Location,
    pool: &crate::model::NodePoolSpec,
) -> ResourceSummary {
    ResourceSummary::new(pool.name.clone(), ResourceKind::NodePool, location)
        .with_status(ResourceStatus::Provisioning)
        .with_machine_type(pool.machine_type.clone())
        .with_attribute("cluster", serde_json::json!(cluster))
        .with_attribute("node_count", serde_json::json!(pool.node_count))
        .with_attribute("autoscaling_enabled", serde_json::json!(pool.autoscaling_enabled))
}
