//! Single entry point mapping intents and structured requests to remote calls
//!
//! Every intent becomes exactly one of: a single remote call, a
//! [`ConcurrencyController`] update, or a [`WorkflowOrchestrator`] run.
//! Validation and existence checks happen first; nothing is mutated when they
//! fail.

use crate::concurrency::{ConcurrencyController, FieldUpdate};
use crate::intent::Intent;
use crate::validation;
use crate::workflow::{PollConfig, ResourceLocks, Workflow, WorkflowOrchestrator};
use gcpflow_cloud::{
    AttachOptions, CloudError, ClusterSpec, ComputeApi, DiskSpec, FailureKind, InstanceSpec,
    Labels, ListScope, Location, Metadata, NodePoolSpec, OperationOutcome, ResourceKind,
    ResourceRef, ResourceSpec, ResourceStatus, ResourceSummary, UpdateFields,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Explicit operations not expressible as a free-text [`Intent`]
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    /// Stop, change machine type / CPU platform, start
    ResizeInstance {
        name: String,
        location: Location,
        fields: UpdateFields,
    },
    /// Create a disk in the instance's zone and attach it once ready
    ProvisionDisk {
        instance: String,
        disk: DiskSpec,
        options: AttachOptions,
    },
    DetachDisk {
        instance: String,
        location: Location,
        device_name: String,
    },
    /// `location: None` lists every location
    ListClusters {
        location: Option<Location>,
    },
    GetCluster {
        name: String,
        location: Location,
    },
    CreateCluster(ClusterSpec),
    DeleteCluster {
        name: String,
        location: Location,
    },
    ListNodePools {
        cluster: String,
        location: Location,
    },
    CreateNodePool {
        cluster: String,
        location: Location,
        pool: NodePoolSpec,
    },
    DeleteNodePool {
        cluster: String,
        location: Location,
        pool: String,
    },
    ResizeNodePool {
        cluster: String,
        location: Location,
        pool: String,
        node_count: u32,
    },
}

impl Request {
    pub fn kind(&self) -> &'static str {
        match self {
            Request::ResizeInstance { .. } => "resize_instance",
            Request::ProvisionDisk { .. } => "provision_disk",
            Request::DetachDisk { .. } => "detach_disk",
            Request::ListClusters { .. } => "list_clusters",
            Request::GetCluster { .. } => "get_cluster",
            Request::CreateCluster(_) => "create_cluster",
            Request::DeleteCluster { .. } => "delete_cluster",
            Request::ListNodePools { .. } => "list_node_pools",
            Request::CreateNodePool { .. } => "create_node_pool",
            Request::DeleteNodePool { .. } => "delete_node_pool",
            Request::ResizeNodePool { .. } => "resize_node_pool",
        }
    }
}

/// Intermediate result: `Err` carries the outcome that ends the request early
type Step<T> = std::result::Result<T, OperationOutcome>;

fn settle(step: Step<OperationOutcome>) -> OperationOutcome {
    match step {
        Ok(outcome) | Err(outcome) => outcome,
    }
}

fn check(result: gcpflow_cloud::Result<()>) -> Step<()> {
    result.map_err(|err| {
        warn!("request rejected: {}", err);
        match err {
            CloudError::Validation(message) => {
                OperationOutcome::rejected(FailureKind::Validation, message)
            }
            other => OperationOutcome::rejected(FailureKind::from(&other), other.to_string()),
        }
    })
}

fn invalid(message: impl Into<String>) -> OperationOutcome {
    let message = message.into();
    warn!("request rejected: {}", message);
    OperationOutcome::rejected(FailureKind::Validation, message)
}

fn not_found_message(target: &ResourceRef) -> String {
    match target.kind {
        ResourceKind::Instance => format!(
            "Instance '{}' not found in zone {}.",
            target.name, target.location
        ),
        ResourceKind::Disk => format!("Disk '{}' not found in zone {}.", target.name, target.location),
        ResourceKind::Cluster => format!(
            "GKE cluster '{}' not found in location {}.",
            target.name, target.location
        ),
        ResourceKind::NodePool => format!(
            "Node pool '{}' not found in GKE cluster '{}'.",
            target.name,
            target.parent.as_deref().unwrap_or_default()
        ),
    }
}

fn exists_message(target: &ResourceRef) -> String {
    match target.kind {
        ResourceKind::Instance => format!(
            "Instance '{}' already exists in zone {}.",
            target.name, target.location
        ),
        ResourceKind::Disk => format!(
            "Disk '{}' already exists in zone {}.",
            target.name, target.location
        ),
        ResourceKind::Cluster => format!(
            "GKE cluster '{}' already exists in location {}.",
            target.name, target.location
        ),
        ResourceKind::NodePool => format!(
            "Node pool '{}' already exists in GKE cluster '{}'.",
            target.name,
            target.parent.as_deref().unwrap_or_default()
        ),
    }
}

fn unrecognized_message(text: &str) -> String {
    format!(
        "I couldn't understand the request {:?}. Try one of these formats:\n\
         - List all instances in us-central1-a\n\
         - Get instance my-instance\n\
         - Create instance my-instance with machine type e2-medium in zone us-central1-a\n\
         - Delete instance my-instance\n\
         - Update instance my-instance with label env=prod\n\
         - Set metadata startup=on on vm my-instance\n\
         - Start / Stop / Restart instance my-instance",
        text
    )
}

/// Routes intents and requests to the remote API
pub struct OperationDispatcher {
    api: Arc<dyn ComputeApi>,
    default_location: Location,
    controller: ConcurrencyController,
    orchestrator: WorkflowOrchestrator,
}

impl OperationDispatcher {
    pub fn new(api: Arc<dyn ComputeApi>, default_location: Location, poll: PollConfig) -> Self {
        Self {
            controller: ConcurrencyController::new(api.clone()),
            orchestrator: WorkflowOrchestrator::new(api.clone(), poll),
            api,
            default_location,
        }
    }

    /// Share workflow locks with other dispatchers in the same process
    pub fn with_locks(mut self, locks: ResourceLocks) -> Self {
        self.orchestrator = self.orchestrator.with_locks(locks);
        self
    }

    pub fn backend_name(&self) -> &str {
        self.api.name()
    }

    pub fn default_location(&self) -> &Location {
        &self.default_location
    }

    pub async fn dispatch(&self, intent: Intent) -> OperationOutcome {
        self.dispatch_with_cancel(intent, &CancellationToken::new())
            .await
    }

    pub async fn dispatch_with_cancel(
        &self,
        intent: Intent,
        cancel: &CancellationToken,
    ) -> OperationOutcome {
        info!(intent = intent.kind(), "dispatching intent");
        settle(match intent {
            Intent::List { location } => self.list_instances(location).await,
            Intent::Get { name, location } => self.get_instance(name, location).await,
            Intent::Create {
                name,
                location,
                machine_type,
                labels,
                metadata,
            } => {
                self.create_instance(name, location, machine_type, labels, metadata)
                    .await
            }
            Intent::Delete { name, location } => self.delete_instance(name, location).await,
            Intent::Modify {
                name,
                location,
                labels,
                metadata,
            } => self.modify_instance(name, location, labels, metadata).await,
            Intent::Start { name, location } => self.start_instance(name, location).await,
            Intent::Stop { name, location } => self.stop_instance(name, location).await,
            Intent::Restart { name, location } => {
                self.restart_instance(name, location, cancel).await
            }
            Intent::Unrecognized { text } => {
                debug!("unrecognized request: {:?}", text);
                Ok(OperationOutcome::unrecognized(unrecognized_message(&text)))
            }
        })
    }

    pub async fn execute(&self, request: Request) -> OperationOutcome {
        self.execute_with_cancel(request, &CancellationToken::new())
            .await
    }

    pub async fn execute_with_cancel(
        &self,
        request: Request,
        cancel: &CancellationToken,
    ) -> OperationOutcome {
        info!(request = request.kind(), "executing request");
        settle(match request {
            Request::ResizeInstance {
                name,
                location,
                fields,
            } => self.resize_instance(name, location, fields, cancel).await,
            Request::ProvisionDisk {
                instance,
                disk,
                options,
            } => self.provision_disk(instance, disk, options, cancel).await,
            Request::DetachDisk {
                instance,
                location,
                device_name,
            } => self.detach_disk(instance, location, device_name).await,
            Request::ListClusters { location } => self.list_clusters(location).await,
            Request::GetCluster { name, location } => self.get_cluster(name, location).await,
            Request::CreateCluster(spec) => self.create_cluster(spec).await,
            Request::DeleteCluster { name, location } => {
                self.delete_cluster(name, location).await
            }
            Request::ListNodePools { cluster, location } => {
                self.list_node_pools(cluster, location).await
            }
            Request::CreateNodePool {
                cluster,
                location,
                pool,
            } => self.create_node_pool(cluster, location, pool).await,
            Request::DeleteNodePool {
                cluster,
                location,
                pool,
            } => self.delete_node_pool(cluster, location, pool).await,
            Request::ResizeNodePool {
                cluster,
                location,
                pool,
                node_count,
            } => {
                self.resize_node_pool(cluster, location, pool, node_count)
                    .await
            }
        })
    }

    // ------------------------------------------------------------------
    // lookups
    // ------------------------------------------------------------------

    async fn find(&self, target: &ResourceRef) -> Step<Option<ResourceSummary>> {
        debug!("looking up {}", target);
        self.api
            .get_resource(target)
            .await
            .map_err(|e| OperationOutcome::failed(format!("Failed to get {}", target), &e))
    }

    async fn require(&self, target: &ResourceRef) -> Step<ResourceSummary> {
        match self.find(target).await? {
            Some(summary) => Ok(summary),
            None => {
                warn!("{} not found", target);
                Err(OperationOutcome::not_found(not_found_message(target)))
            }
        }
    }

    /// Advisory duplicate guard; the remote side remains authoritative
    async fn require_absent(&self, target: &ResourceRef) -> Step<()> {
        match self.find(target).await? {
            Some(_) => Err(invalid(exists_message(target))),
            None => Ok(()),
        }
    }

    /// Cluster that exists and is not Autopilot
    async fn require_standard_cluster(
        &self,
        cluster: &str,
        location: &Location,
    ) -> Step<ResourceSummary> {
        let summary = self
            .require(&ResourceRef::cluster(cluster, location.clone()))
            .await?;
        if summary.is_autopilot() {
            return Err(invalid(format!(
                "Cluster '{}' is an Autopilot cluster, which does not have user-manageable node pools.",
                cluster
            )));
        }
        Ok(summary)
    }

    // ------------------------------------------------------------------
    // instances
    // ------------------------------------------------------------------

    async fn list_instances(&self, location: Location) -> Step<OperationOutcome> {
        check(validation::validate_zone(&location))?;
        let instances = self
            .api
            .list_resources(&ListScope::instances(location.clone()))
            .await
            .map_err(|e| {
                OperationOutcome::failed(format!("Failed to list instances in {}", location), &e)
            })?;

        let message = if instances.is_empty() {
            format!("No instances found in zone {}.", location)
        } else {
            format!("Found {} instance(s) in zone {}.", instances.len(), location)
        };
        Ok(OperationOutcome::read(instances, message))
    }

    async fn get_instance(&self, name: String, location: Location) -> Step<OperationOutcome> {
        check(validation::validate_zone(&location))?;
        let summary = self.require(&ResourceRef::instance(name, location)).await?;
        let message = format!(
            "Instance '{}' in zone {} is {}.",
            summary.name, summary.location, summary.status
        );
        Ok(OperationOutcome::read(vec![summary], message))
    }

    async fn create_instance(
        &self,
        name: String,
        location: Location,
        machine_type: String,
        labels: Labels,
        metadata: Metadata,
    ) -> Step<OperationOutcome> {
        check(validation::validate_name("instance", &name))?;
        check(validation::validate_zone(&location))?;
        if machine_type.trim().is_empty() {
            return Err(invalid("Machine type must not be empty."));
        }

        let target = ResourceRef::instance(name.clone(), location.clone());
        self.require_absent(&target).await?;

        let mut spec = InstanceSpec::new(name, location);
        spec.machine_type = machine_type;
        spec.labels = labels;
        spec.metadata = metadata;

        let handle = self
            .api
            .create_resource(&ResourceSpec::Instance(spec))
            .await
            .map_err(|e| OperationOutcome::failed(format!("Failed to create {}", target), &e))?;
        info!("create accepted for {} ({})", target, handle.id);
        Ok(OperationOutcome::accepted(
            &handle,
            format!(
                "Creating instance '{}' in zone {}. Operation: {}, Status: {}",
                target.name, target.location, handle.id, handle.status
            ),
        ))
    }

    async fn delete_instance(&self, name: String, location: Location) -> Step<OperationOutcome> {
        check(validation::validate_zone(&location))?;
        let target = ResourceRef::instance(name, location);
        self.require(&target).await?;

        let handle = self
            .api
            .delete_resource(&target)
            .await
            .map_err(|e| OperationOutcome::failed(format!("Failed to delete {}", target), &e))?;
        info!("delete accepted for {} ({})", target, handle.id);
        Ok(OperationOutcome::accepted(
            &handle,
            format!(
                "Deleting instance '{}' in zone {}. Operation: {}, Status: {}",
                target.name, target.location, handle.id, handle.status
            ),
        ))
    }

    async fn modify_instance(
        &self,
        name: String,
        location: Location,
        labels: Labels,
        metadata: Metadata,
    ) -> Step<OperationOutcome> {
        if labels.is_empty() && metadata.is_empty() {
            return Err(invalid(
                "No modifications specified. Please provide labels or metadata to update.",
            ));
        }
        check(validation::validate_zone(&location))?;
        let target = ResourceRef::instance(name, location);
        self.require(&target).await?;

        let labels = (!labels.is_empty()).then(|| FieldUpdate::Merge(labels));
        let metadata = (!metadata.is_empty()).then(|| FieldUpdate::Merge(metadata));
        Ok(self
            .controller
            .update_mutable_fields(&target, labels.as_ref(), metadata.as_ref())
            .await)
    }

    async fn start_instance(&self, name: String, location: Location) -> Step<OperationOutcome> {
        check(validation::validate_zone(&location))?;
        let target = ResourceRef::instance(name, location);
        let current = self.require(&target).await?;
        if current.status == ResourceStatus::Running {
            warn!("{} is already running", target);
            return Ok(OperationOutcome::no_op(format!(
                "Instance '{}' is already running.",
                target.name
            )));
        }

        let handle = self
            .api
            .start_resource(&target)
            .await
            .map_err(|e| OperationOutcome::failed(format!("Failed to start {}", target), &e))?;
        info!("start accepted for {} ({})", target, handle.id);
        Ok(OperationOutcome::accepted(
            &handle,
            format!(
                "Starting instance '{}'. Operation: {}, Status: {}",
                target.name, handle.id, handle.status
            ),
        ))
    }

    async fn stop_instance(&self, name: String, location: Location) -> Step<OperationOutcome> {
        check(validation::validate_zone(&location))?;
        let target = ResourceRef::instance(name, location);
        let current = self.require(&target).await?;
        if current.status == ResourceStatus::Terminated {
            warn!("{} is already stopped", target);
            return Ok(OperationOutcome::no_op(format!(
                "Instance '{}' is already stopped.",
                target.name
            )));
        }

        let handle = self
            .api
            .stop_resource(&target)
            .await
            .map_err(|e| OperationOutcome::failed(format!("Failed to stop {}", target), &e))?;
        info!("stop accepted for {} ({})", target, handle.id);
        Ok(OperationOutcome::accepted(
            &handle,
            format!(
                "Stopping instance '{}'. Operation: {}, Status: {}",
                target.name, handle.id, handle.status
            ),
        ))
    }

    async fn restart_instance(
        &self,
        name: String,
        location: Location,
        cancel: &CancellationToken,
    ) -> Step<OperationOutcome> {
        check(validation::validate_zone(&location))?;
        let target = ResourceRef::instance(name, location);
        self.require(&target).await?;
        Ok(self
            .orchestrator
            .run_workflow(&Workflow::restart(target), cancel)
            .await)
    }

    async fn resize_instance(
        &self,
        name: String,
        location: Location,
        fields: UpdateFields,
        cancel: &CancellationToken,
    ) -> Step<OperationOutcome> {
        check(validation::validate_update_fields(&fields))?;
        check(validation::validate_zone(&location))?;
        let target = ResourceRef::instance(name, location);
        let current = self.require(&target).await?;

        if fields.min_cpu_platform.is_none() && fields.machine_type == current.machine_type {
            return Ok(OperationOutcome::no_op(format!(
                "Instance '{}' already has machine type {}.",
                target.name,
                current.machine_type.unwrap_or_default()
            )));
        }

        Ok(self
            .orchestrator
            .run_workflow(&Workflow::modify_with_restart(target, fields), cancel)
            .await)
    }

    // ------------------------------------------------------------------
    // disks
    // ------------------------------------------------------------------

    async fn provision_disk(
        &self,
        instance: String,
        disk: DiskSpec,
        options: AttachOptions,
        cancel: &CancellationToken,
    ) -> Step<OperationOutcome> {
        check(validation::validate_disk(&disk))?;
        if options.device_name.as_deref().is_some_and(|d| d.trim().is_empty()) {
            return Err(invalid("Device name must not be empty."));
        }

        let target = ResourceRef::instance(instance, disk.location.clone());
        self.require(&target).await?;
        self.require_absent(&disk.resource_ref()).await?;

        Ok(self
            .orchestrator
            .run_workflow(
                &Workflow::disk_provision_and_attach(target, disk, options),
                cancel,
            )
            .await)
    }

    async fn detach_disk(
        &self,
        instance: String,
        location: Location,
        device_name: String,
    ) -> Step<OperationOutcome> {
        check(validation::validate_zone(&location))?;
        if device_name.trim().is_empty() {
            return Err(invalid("Device name must not be empty."));
        }
        let target = ResourceRef::instance(instance, location);
        self.require(&target).await?;

        let handle = self
            .api
            .detach_sub_resource(&target, &device_name)
            .await
            .map_err(|e| {
                OperationOutcome::failed(
                    format!("Failed to detach '{}' from {}", device_name, target),
                    &e,
                )
            })?;
        info!("detach of '{}' accepted for {} ({})", device_name, target, handle.id);
        Ok(OperationOutcome::accepted(
            &handle,
            format!(
                "Detaching disk '{}' from instance '{}'. Operation: {}, Status: {}",
                device_name, target.name, handle.id, handle.status
            ),
        ))
    }

    // ------------------------------------------------------------------
    // clusters
    // ------------------------------------------------------------------

    async fn list_clusters(&self, location: Option<Location>) -> Step<OperationOutcome> {
        if let Some(location) = &location {
            check(validation::validate_location(location))?;
        }
        let scope = location
            .as_ref()
            .map(|l| l.to_string())
            .unwrap_or_else(|| "all locations".to_string());

        let clusters = self
            .api
            .list_resources(&ListScope::clusters(location))
            .await
            .map_err(|e| OperationOutcome::failed(format!("Failed to list clusters in {}", scope), &e))?;

        let message = if clusters.is_empty() {
            format!("No GKE clusters found in {}.", scope)
        } else {
            format!("Found {} GKE cluster(s) in {}.", clusters.len(), scope)
        };
        Ok(OperationOutcome::read(clusters, message))
    }

    async fn get_cluster(&self, name: String, location: Location) -> Step<OperationOutcome> {
        check(validation::validate_location(&location))?;
        let summary = self.require(&ResourceRef::cluster(name, location)).await?;
        let message = format!(
            "GKE cluster '{}' in {} is {}.",
            summary.name, summary.location, summary.status
        );
        Ok(OperationOutcome::read(vec![summary], message))
    }

    async fn create_cluster(&self, spec: ClusterSpec) -> Step<OperationOutcome> {
        check(validation::validate_cluster(&spec))?;
        let target = ResourceRef::cluster(spec.name.clone(), spec.location.clone());
        self.require_absent(&target).await?;

        let handle = self
            .api
            .create_resource(&ResourceSpec::Cluster(spec))
            .await
            .map_err(|e| OperationOutcome::failed(format!("Failed to create {}", target), &e))?;
        info!("create accepted for {} ({})", target, handle.id);
        Ok(OperationOutcome::accepted(
            &handle,
            format!(
                "Creating GKE cluster '{}' in {}. Operation: {}, Status: {}",
                target.name, target.location, handle.id, handle.status
            ),
        ))
    }

    async fn delete_cluster(&self, name: String, location: Location) -> Step<OperationOutcome> {
        check(validation::validate_location(&location))?;
        let target = ResourceRef::cluster(name, location);
        self.require(&target).await?;

        let handle = self
            .api
            .delete_resource(&target)
            .await
            .map_err(|e| OperationOutcome::failed(format!("Failed to delete {}", target), &e))?;
        info!("delete accepted for {} ({})", target, handle.id);
        Ok(OperationOutcome::accepted(
            &handle,
            format!(
                "Deleting GKE cluster '{}' in {}. Operation: {}, Status: {}",
                target.name, target.location, handle.id, handle.status
            ),
        ))
    }

    // ------------------------------------------------------------------
    // node pools
    // ------------------------------------------------------------------

    async fn list_node_pools(&self, cluster: String, location: Location) -> Step<OperationOutcome> {
        check(validation::validate_location(&location))?;
        self.require_standard_cluster(&cluster, &location).await?;

        let pools = self
            .api
            .list_resources(&ListScope::node_pools(cluster.clone(), location))
            .await
            .map_err(|e| {
                OperationOutcome::failed(format!("Failed to list node pools of '{}'", cluster), &e)
            })?;

        let message = if pools.is_empty() {
            format!("No node pools found in GKE cluster '{}'.", cluster)
        } else {
            format!("Found {} node pool(s) in GKE cluster '{}'.", pools.len(), cluster)
        };
        Ok(OperationOutcome::read(pools, message))
    }

    async fn create_node_pool(
        &self,
        cluster: String,
        location: Location,
        pool: NodePoolSpec,
    ) -> Step<OperationOutcome> {
        check(validation::validate_node_pool(&pool))?;
        check(validation::validate_location(&location))?;
        self.require_standard_cluster(&cluster, &location).await?;

        let target = ResourceRef::node_pool(cluster.clone(), pool.name.clone(), location.clone());
        self.require_absent(&target).await?;

        let handle = self
            .api
            .create_resource(&ResourceSpec::NodePool {
                cluster,
                location,
                pool,
            })
            .await
            .map_err(|e| OperationOutcome::failed(format!("Failed to create {}", target), &e))?;
        info!("create accepted for {} ({})", target, handle.id);
        Ok(OperationOutcome::accepted(
            &handle,
            format!(
                "Creating node pool '{}' in GKE cluster '{}'. Operation: {}, Status: {}",
                target.name,
                target.parent.as_deref().unwrap_or_default(),
                handle.id,
                handle.status
            ),
        ))
    }

    async fn delete_node_pool(
        &self,
        cluster: String,
        location: Location,
        pool: String,
    ) -> Step<OperationOutcome> {
        check(validation::validate_location(&location))?;
        self.require_standard_cluster(&cluster, &location).await?;
        let target = ResourceRef::node_pool(cluster.clone(), pool, location);
        self.require(&target).await?;

        let handle = self
            .api
            .delete_resource(&target)
            .await
            .map_err(|e| OperationOutcome::failed(format!("Failed to delete {}", target), &e))?;
        info!("delete accepted for {} ({})", target, handle.id);
        Ok(OperationOutcome::accepted(
            &handle,
            format!(
                "Deleting node pool '{}' from GKE cluster '{}'. Operation: {}, Status: {}",
                target.name, cluster, handle.id, handle.status
            ),
        ))
    }

    async fn resize_node_pool(
        &self,
        cluster: String,
        location: Location,
        pool: String,
        node_count: u32,
    ) -> Step<OperationOutcome> {
        check(validation::validate_location(&location))?;
        self.require_standard_cluster(&cluster, &location).await?;
        let target = ResourceRef::node_pool(cluster.clone(), pool, location);
        let current = self.require(&target).await?;

        if current.autoscaling_enabled() {
            return Err(invalid(format!(
                "Node pool '{}' has autoscaling enabled. To resize, disable autoscaling first.",
                target.name
            )));
        }
        if current.get_attribute::<u32>("node_count") == Some(node_count) {
            return Ok(OperationOutcome::no_op(format!(
                "Node pool '{}' already has {} node(s).",
                target.name, node_count
            )));
        }

        let handle = self
            .api
            .set_size(&target, node_count)
            .await
            .map_err(|e| OperationOutcome::failed(format!("Failed to resize {}", target), &e))?;
        info!("resize to {} accepted for {} ({})", node_count, target, handle.id);
        Ok(OperationOutcome::accepted(
            &handle,
            format!(
                "Resizing node pool '{}' in GKE cluster '{}' to {} node(s). Operation: {}, Status: {}",
                target.name, cluster, node_count, handle.id, handle.status
            ),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gcpflow_cloud::{MemoryCompute, NodeTaint, TaintEffect};
    use std::time::Duration;

    fn zone() -> Location {
        Location::resolve("us-central1-a")
    }

    fn setup() -> (Arc<MemoryCompute>, OperationDispatcher) {
        let api = Arc::new(MemoryCompute::new());
        let dispatcher = OperationDispatcher::new(
            api.clone(),
            zone(),
            PollConfig {
                interval: Duration::from_millis(5),
                timeout: Duration::from_secs(5),
            },
        );
        (api, dispatcher)
    }

    fn seed_cluster(api: &MemoryCompute, name: &str, autopilot: bool) {
        api.insert(
            ResourceSummary::new(name, ResourceKind::Cluster, "us-central1".into())
                .with_status(ResourceStatus::Running)
                .with_attribute("autopilot", serde_json::json!(autopilot)),
        );
    }

    fn seed_pool(api: &MemoryCompute, cluster: &str, name: &str, autoscaling: bool) {
        api.insert(
            ResourceSummary::new(name, ResourceKind::NodePool, "us-central1".into())
                .with_status(ResourceStatus::Running)
                .with_attribute("cluster", serde_json::json!(cluster))
                .with_attribute("node_count", serde_json::json!(3))
                .with_attribute("autoscaling_enabled", serde_json::json!(autoscaling)),
        );
    }

    fn mutation_verbs(api: &MemoryCompute) -> Vec<&'static str> {
        api.mutation_calls().into_iter().map(|c| c.verb).collect()
    }

    #[tokio::test]
    async fn test_start_running_is_no_op() {
        let (api, dispatcher) = setup();
        api.insert_instance("web-1", "us-central1-a", ResourceStatus::Running);

        let outcome = dispatcher
            .dispatch(Intent::Start {
                name: "web-1".to_string(),
                location: zone(),
            })
            .await;

        assert!(outcome.is_no_op());
        assert!(outcome.is_success());
        assert!(mutation_verbs(&api).is_empty());
    }

    #[tokio::test]
    async fn test_stop_terminated_is_no_op() {
        let (api, dispatcher) = setup();
        api.insert_instance("web-1", "us-central1-a", ResourceStatus::Terminated);

        let outcome = dispatcher
            .dispatch(Intent::Stop {
                name: "web-1".to_string(),
                location: zone(),
            })
            .await;

        assert!(outcome.is_no_op());
        assert!(mutation_verbs(&api).is_empty());
    }

    #[tokio::test]
    async fn test_stop_running_issues_one_call() {
        let (api, dispatcher) = setup();
        api.insert_instance("web-1", "us-central1-a", ResourceStatus::Running);

        let outcome = dispatcher
            .dispatch(Intent::Stop {
                name: "web-1".to_string(),
                location: zone(),
            })
            .await;

        assert!(outcome.accepted);
        assert!(!outcome.remote_operation_id.is_empty());
        assert_eq!(mutation_verbs(&api), vec!["stop_resource"]);
    }

    #[tokio::test]
    async fn test_missing_instance_is_not_found_without_mutation() {
        let (api, dispatcher) = setup();
        for intent in [
            Intent::Get {
                name: "ghost".to_string(),
                location: zone(),
            },
            Intent::Delete {
                name: "ghost".to_string(),
                location: zone(),
            },
            Intent::Start {
                name: "ghost".to_string(),
                location: zone(),
            },
            Intent::Stop {
                name: "ghost".to_string(),
                location: zone(),
            },
            Intent::Restart {
                name: "ghost".to_string(),
                location: zone(),
            },
        ] {
            let outcome = dispatcher.dispatch(intent).await;
            assert_eq!(outcome.failure_kind(), Some(FailureKind::NotFound));
            assert_eq!(outcome.message, "Instance 'ghost' not found in zone us-central1-a.");
        }
        assert!(mutation_verbs(&api).is_empty());
    }

    #[tokio::test]
    async fn test_create_duplicate_is_rejected() {
        let (api, dispatcher) = setup();
        api.insert_instance("web-1", "us-central1-a", ResourceStatus::Running);

        let outcome = dispatcher
            .dispatch(Intent::Create {
                name: "web-1".to_string(),
                location: zone(),
                machine_type: "e2-small".to_string(),
                labels: Labels::new(),
                metadata: Metadata::new(),
            })
            .await;

        assert_eq!(outcome.failure_kind(), Some(FailureKind::Validation));
        assert!(mutation_verbs(&api).is_empty());
    }

    #[tokio::test]
    async fn test_create_instance() {
        let (api, dispatcher) = setup();
        let outcome = dispatcher
            .dispatch(Intent::Create {
                name: "api-1".to_string(),
                location: zone(),
                machine_type: "e2-medium".to_string(),
                labels: Labels::from([("env".to_string(), "prod".to_string())]),
                metadata: Metadata::new(),
            })
            .await;

        assert!(outcome.accepted, "{}", outcome);
        let created = api
            .peek(&ResourceRef::instance("api-1", zone()))
            .unwrap();
        assert_eq!(created.machine_type.as_deref(), Some("e2-medium"));
        assert_eq!(created.labels.get("env").map(String::as_str), Some("prod"));
    }

    #[tokio::test]
    async fn test_modify_without_changes_is_validation() {
        let (api, dispatcher) = setup();
        api.insert_instance("web-1", "us-central1-a", ResourceStatus::Running);

        let outcome = dispatcher
            .dispatch(Intent::Modify {
                name: "web-1".to_string(),
                location: zone(),
                labels: Labels::new(),
                metadata: Metadata::new(),
            })
            .await;

        assert_eq!(outcome.failure_kind(), Some(FailureKind::Validation));
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn test_modify_goes_through_fingerprint_update() {
        let (api, dispatcher) = setup();
        let vm = api.insert_instance("web-1", "us-central1-a", ResourceStatus::Running);

        let outcome = dispatcher
            .dispatch(Intent::Modify {
                name: "web-1".to_string(),
                location: zone(),
                labels: Labels::from([("env".to_string(), "dev".to_string())]),
                metadata: Metadata::new(),
            })
            .await;

        assert!(outcome.is_success(), "{}", outcome);
        assert_eq!(mutation_verbs(&api), vec!["set_labels"]);
        assert_eq!(api.peek(&vm).unwrap().labels.len(), 1);
    }

    #[tokio::test]
    async fn test_restart_runs_workflow() {
        let (api, dispatcher) = setup();
        api.insert_instance("web-1", "us-central1-a", ResourceStatus::Running);

        let outcome = dispatcher
            .dispatch(Intent::Restart {
                name: "web-1".to_string(),
                location: zone(),
            })
            .await;

        assert!(outcome.is_success(), "{}", outcome);
        assert_eq!(
            outcome.step_labels(),
            vec!["stop", "wait_until:TERMINATED", "start"]
        );
    }

    #[tokio::test]
    async fn test_unrecognized_is_reported() {
        let (api, dispatcher) = setup();
        let outcome = dispatcher
            .dispatch(Intent::Unrecognized {
                text: "quux".to_string(),
            })
            .await;
        assert_eq!(outcome.failure_kind(), Some(FailureKind::Unrecognized));
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_location_rejected_before_remote_call() {
        let (api, dispatcher) = setup();
        let outcome = dispatcher
            .dispatch(Intent::Get {
                name: "web-1".to_string(),
                location: "zone".into(),
            })
            .await;
        assert_eq!(outcome.failure_kind(), Some(FailureKind::Validation));
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn test_resize_instance() {
        let (api, dispatcher) = setup();
        let vm = api.insert_instance("web-1", "us-central1-a", ResourceStatus::Running);

        let outcome = dispatcher
            .execute(Request::ResizeInstance {
                name: "web-1".to_string(),
                location: zone(),
                fields: UpdateFields::machine_type("e2-standard-4"),
            })
            .await;

        assert!(outcome.is_success(), "{}", outcome);
        assert_eq!(
            mutation_verbs(&api),
            vec!["stop_resource", "update_resource", "start_resource"]
        );
        assert_eq!(api.peek(&vm).unwrap().machine_type.as_deref(), Some("e2-standard-4"));
    }

    #[tokio::test]
    async fn test_resize_to_current_machine_type_is_no_op() {
        let (api, dispatcher) = setup();
        api.insert_instance("web-1", "us-central1-a", ResourceStatus::Running);

        let outcome = dispatcher
            .execute(Request::ResizeInstance {
                name: "web-1".to_string(),
                location: zone(),
                fields: UpdateFields::machine_type(gcpflow_cloud::model::DEFAULT_MACHINE_TYPE),
            })
            .await;

        assert!(outcome.is_no_op());
        assert!(mutation_verbs(&api).is_empty());
    }

    #[tokio::test]
    async fn test_provision_disk_rejects_existing_disk() {
        let (api, dispatcher) = setup();
        api.insert_instance("web-1", "us-central1-a", ResourceStatus::Running);
        api.insert(
            ResourceSummary::new("data-1", ResourceKind::Disk, zone())
                .with_status(ResourceStatus::Ready),
        );

        let outcome = dispatcher
            .execute(Request::ProvisionDisk {
                instance: "web-1".to_string(),
                disk: DiskSpec::new("data-1", zone(), 10),
                options: AttachOptions::default(),
            })
            .await;

        assert_eq!(outcome.failure_kind(), Some(FailureKind::Validation));
        assert!(mutation_verbs(&api).is_empty());
    }

    #[tokio::test]
    async fn test_provision_then_detach_disk() {
        let (api, dispatcher) = setup();
        api.insert_instance("web-1", "us-central1-a", ResourceStatus::Running);

        let outcome = dispatcher
            .execute(Request::ProvisionDisk {
                instance: "web-1".to_string(),
                disk: DiskSpec::new("data-1", zone(), 10),
                options: AttachOptions {
                    device_name: Some("data".to_string()),
                    ..Default::default()
                },
            })
            .await;
        assert!(outcome.is_success(), "{}", outcome);

        let detached = dispatcher
            .execute(Request::DetachDisk {
                instance: "web-1".to_string(),
                location: zone(),
                device_name: "data".to_string(),
            })
            .await;
        assert!(detached.accepted, "{}", detached);
    }

    #[tokio::test]
    async fn test_node_pool_inverted_autoscaling_rejected_before_any_call() {
        let (api, dispatcher) = setup();
        seed_cluster(&api, "c1", false);

        let outcome = dispatcher
            .execute(Request::CreateNodePool {
                cluster: "c1".to_string(),
                location: "us-central1".into(),
                pool: NodePoolSpec::new("pool-a").with_autoscaling(5, 3),
            })
            .await;

        assert_eq!(outcome.failure_kind(), Some(FailureKind::Validation));
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn test_node_pool_incomplete_taint_rejected() {
        let (api, dispatcher) = setup();
        let mut pool = NodePoolSpec::new("pool-a");
        pool.taints.push(NodeTaint {
            key: None,
            value: Some("gpu".to_string()),
            effect: TaintEffect::NoSchedule,
        });

        let outcome = dispatcher
            .execute(Request::CreateNodePool {
                cluster: "c1".to_string(),
                location: "us-central1".into(),
                pool,
            })
            .await;

        assert_eq!(outcome.failure_kind(), Some(FailureKind::Validation));
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn test_create_node_pool() {
        let (api, dispatcher) = setup();
        seed_cluster(&api, "c1", false);

        let outcome = dispatcher
            .execute(Request::CreateNodePool {
                cluster: "c1".to_string(),
                location: "us-central1".into(),
                pool: NodePoolSpec::new("pool-a").with_autoscaling(1, 5),
            })
            .await;

        assert!(outcome.accepted, "{}", outcome);
        assert_eq!(mutation_verbs(&api), vec!["create_resource"]);
    }

    #[tokio::test]
    async fn test_autopilot_cluster_rejects_node_pool_operations() {
        let (api, dispatcher) = setup();
        seed_cluster(&api, "auto-1", true);

        for request in [
            Request::ListNodePools {
                cluster: "auto-1".to_string(),
                location: "us-central1".into(),
            },
            Request::CreateNodePool {
                cluster: "auto-1".to_string(),
                location: "us-central1".into(),
                pool: NodePoolSpec::new("pool-a"),
            },
            Request::ResizeNodePool {
                cluster: "auto-1".to_string(),
                location: "us-central1".into(),
                pool: "pool-a".to_string(),
                node_count: 2,
            },
        ] {
            let outcome = dispatcher.execute(request).await;
            assert_eq!(outcome.failure_kind(), Some(FailureKind::Validation));
            assert!(outcome.message.contains("Autopilot"));
        }
        assert!(mutation_verbs(&api).is_empty());
    }

    #[tokio::test]
    async fn test_resize_autoscaling_pool_rejected() {
        let (api, dispatcher) = setup();
        seed_cluster(&api, "c1", false);
        seed_pool(&api, "c1", "pool-a", true);

        let outcome = dispatcher
            .execute(Request::ResizeNodePool {
                cluster: "c1".to_string(),
                location: "us-central1".into(),
                pool: "pool-a".to_string(),
                node_count: 5,
            })
            .await;

        assert_eq!(outcome.failure_kind(), Some(FailureKind::Validation));
        assert!(mutation_verbs(&api).is_empty());
    }

    #[tokio::test]
    async fn test_resize_node_pool() {
        let (api, dispatcher) = setup();
        seed_cluster(&api, "c1", false);
        seed_pool(&api, "c1", "pool-a", false);

        let outcome = dispatcher
            .execute(Request::ResizeNodePool {
                cluster: "c1".to_string(),
                location: "us-central1".into(),
                pool: "pool-a".to_string(),
                node_count: 5,
            })
            .await;

        assert!(outcome.accepted, "{}", outcome);
        assert_eq!(mutation_verbs(&api), vec!["set_size"]);
    }

    #[tokio::test]
    async fn test_cluster_lifecycle() {
        let (api, dispatcher) = setup();
        let mut spec = ClusterSpec::new("c2", "us-central1".into());
        spec.node_pools.push(NodePoolSpec::new("default-pool"));

        let created = dispatcher.execute(Request::CreateCluster(spec.clone())).await;
        assert!(created.accepted, "{}", created);

        let duplicate = dispatcher.execute(Request::CreateCluster(spec)).await;
        assert_eq!(duplicate.failure_kind(), Some(FailureKind::Validation));

        let listed = dispatcher
            .execute(Request::ListClusters { location: None })
            .await;
        assert_eq!(listed.resources.len(), 1);

        let pools = dispatcher
            .execute(Request::ListNodePools {
                cluster: "c2".to_string(),
                location: "us-central1".into(),
            })
            .await;
        assert_eq!(pools.resources.len(), 1);

        let deleted = dispatcher
            .execute(Request::DeleteCluster {
                name: "c2".to_string(),
                location: "us-central1".into(),
            })
            .await;
        assert!(deleted.accepted);

        let gone = dispatcher
            .execute(Request::GetCluster {
                name: "c2".to_string(),
                location: "us-central1".into(),
            })
            .await;
        assert_eq!(gone.failure_kind(), Some(FailureKind::NotFound));
        assert_eq!(gone.message, "GKE cluster 'c2' not found in location us-central1.");
    }
}
