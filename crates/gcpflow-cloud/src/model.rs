//! Resource model shared by providers and the orchestration core

use crate::error::CloudError;
use crate::location::Location;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Label / metadata maps. Ordered so that rendered output and request bodies are stable.
pub type Labels = BTreeMap<String, String>;
pub type Metadata = BTreeMap<String, String>;

pub const DEFAULT_MACHINE_TYPE: &str = "n1-standard-1";
pub const DEFAULT_SOURCE_IMAGE: &str = "projects/debian-cloud/global/images/family/debian-12";
pub const DEFAULT_DISK_TYPE: &str = "pd-balanced";
pub const DEFAULT_NODE_MACHINE_TYPE: &str = "e2-standard-2";

/// Kind of remote resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Instance,
    Disk,
    Cluster,
    NodePool,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKind::Instance => write!(f, "instance"),
            ResourceKind::Disk => write!(f, "disk"),
            ResourceKind::Cluster => write!(f, "cluster"),
            ResourceKind::NodePool => write!(f, "node pool"),
        }
    }
}

/// Reference to a single remote resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceRef {
    pub kind: ResourceKind,
    pub name: String,
    pub location: Location,
    /// Owning cluster for node pools
    pub parent: Option<String>,
}

impl ResourceRef {
    pub fn instance(name: impl Into<String>, location: Location) -> Self {
        Self {
            kind: ResourceKind::Instance,
            name: name.into(),
            location,
            parent: None,
        }
    }

    pub fn disk(name: impl Into<String>, location: Location) -> Self {
        Self {
            kind: ResourceKind::Disk,
            name: name.into(),
            location,
            parent: None,
        }
    }

    pub fn cluster(name: impl Into<String>, location: Location) -> Self {
        Self {
            kind: ResourceKind::Cluster,
            name: name.into(),
            location,
            parent: None,
        }
    }

    pub fn node_pool(
        cluster: impl Into<String>,
        name: impl Into<String>,
        location: Location,
    ) -> Self {
        Self {
            kind: ResourceKind::NodePool,
            name: name.into(),
            location,
            parent: Some(cluster.into()),
        }
    }

    /// Key unique within a project (`kind:location[/parent]/name`)
    pub fn key(&self) -> String {
        match &self.parent {
            Some(parent) => format!("{}:{}/{}/{}", self.kind, self.location, parent, self.name),
            None => format!("{}:{}/{}", self.kind, self.location, self.name),
        }
    }
}

impl std::fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.parent {
            Some(parent) => write!(f, "{} '{}/{}' in {}", self.kind, parent, self.name, self.location),
            None => write!(f, "{} '{}' in {}", self.kind, self.name, self.location),
        }
    }
}

/// Scope of a list call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListScope {
    pub kind: ResourceKind,
    /// `None` means every location (aggregated list)
    pub location: Option<Location>,
    pub parent: Option<String>,
}

impl ListScope {
    pub fn instances(location: Location) -> Self {
        Self {
            kind: ResourceKind::Instance,
            location: Some(location),
            parent: None,
        }
    }

    pub fn clusters(location: Option<Location>) -> Self {
        Self {
            kind: ResourceKind::Cluster,
            location,
            parent: None,
        }
    }

    pub fn node_pools(cluster: impl Into<String>, location: Location) -> Self {
        Self {
            kind: ResourceKind::NodePool,
            location: Some(location),
            parent: Some(cluster.into()),
        }
    }
}

/// Opaque version token of a mutable sub-resource (labels, metadata)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Status of a remote resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceStatus {
    Provisioning,
    Staging,
    Running,
    Stopping,
    Suspended,
    Terminated,
    Ready,
    Creating,
    Reconciling,
    Deleting,
    Error,
    Unknown,
}

impl ResourceStatus {
    /// Parse the remote status string (case-insensitive). Unknown values map to `Unknown`.
    pub fn from_remote(status: &str) -> Self {
        match status.trim().to_ascii_uppercase().as_str() {
            "PROVISIONING" => ResourceStatus::Provisioning,
            "STAGING" => ResourceStatus::Staging,
            "RUNNING" => ResourceStatus::Running,
            "STOPPING" => ResourceStatus::Stopping,
            "SUSPENDED" | "SUSPENDING" => ResourceStatus::Suspended,
            "TERMINATED" | "STOPPED" => ResourceStatus::Terminated,
            "READY" => ResourceStatus::Ready,
            "CREATING" => ResourceStatus::Creating,
            "RECONCILING" | "RESTORING" => ResourceStatus::Reconciling,
            "DELETING" | "STOPPING_DELETE" => ResourceStatus::Deleting,
            "ERROR" | "FAILED" | "DEGRADED" => ResourceStatus::Error,
            _ => ResourceStatus::Unknown,
        }
    }
}

impl std::fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ResourceStatus::Provisioning => "PROVISIONING",
            ResourceStatus::Staging => "STAGING",
            ResourceStatus::Running => "RUNNING",
            ResourceStatus::Stopping => "STOPPING",
            ResourceStatus::Suspended => "SUSPENDED",
            ResourceStatus::Terminated => "TERMINATED",
            ResourceStatus::Ready => "READY",
            ResourceStatus::Creating => "CREATING",
            ResourceStatus::Reconciling => "RECONCILING",
            ResourceStatus::Deleting => "DELETING",
            ResourceStatus::Error => "ERROR",
            ResourceStatus::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

/// Snapshot of a remote resource as returned by list/get
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSummary {
    pub name: String,
    pub kind: ResourceKind,
    pub location: Location,
    pub status: ResourceStatus,
    pub machine_type: Option<String>,
    #[serde(default)]
    pub labels: Labels,
    #[serde(default)]
    pub metadata: Metadata,
    pub label_fingerprint: Option<Fingerprint>,
    pub metadata_fingerprint: Option<Fingerprint>,
    /// Kind-specific attributes (IP, disks, autopilot, autoscaling, node_count …)
    #[serde(default)]
    pub attributes: HashMap<String, serde_json::Value>,
}

impl ResourceSummary {
    pub fn new(name: impl Into<String>, kind: ResourceKind, location: Location) -> Self {
        Self {
            name: name.into(),
            kind,
            location,
            status: ResourceStatus::Unknown,
            machine_type: None,
            labels: Labels::new(),
            metadata: Metadata::new(),
            label_fingerprint: None,
            metadata_fingerprint: None,
            attributes: HashMap::new(),
        }
    }

    pub fn with_status(mut self, status: ResourceStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_machine_type(mut self, machine_type: impl Into<String>) -> Self {
        self.machine_type = Some(machine_type.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub fn get_attribute<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.attributes
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Clusters: Autopilot clusters have no user-manageable node pools
    pub fn is_autopilot(&self) -> bool {
        self.get_attribute::<bool>("autopilot").unwrap_or(false)
    }

    /// Node pools: autoscaling enabled
    pub fn autoscaling_enabled(&self) -> bool {
        self.get_attribute::<bool>("autoscaling_enabled").unwrap_or(false)
    }
}

/// Handle of a (possibly still running) remote operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationHandle {
    pub id: String,
    pub status: String,
    pub operation_type: String,
    pub target: Option<String>,
}

impl OperationHandle {
    pub fn new(
        id: impl Into<String>,
        status: impl Into<String>,
        operation_type: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            status: status.into(),
            operation_type: operation_type.into(),
            target: None,
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }
}

/// Fields that can only be changed while an instance is stopped
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateFields {
    pub machine_type: Option<String>,
    pub min_cpu_platform: Option<String>,
}

impl UpdateFields {
    pub fn machine_type(machine_type: impl Into<String>) -> Self {
        Self {
            machine_type: Some(machine_type.into()),
            min_cpu_platform: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.machine_type.is_none() && self.min_cpu_platform.is_none()
    }
}

/// Compute Engine instance to create
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceSpec {
    pub name: String,
    pub location: Location,
    pub machine_type: String,
    pub source_image: String,
    #[serde(default)]
    pub labels: Labels,
    #[serde(default)]
    pub metadata: Metadata,
}

impl InstanceSpec {
    pub fn new(name: impl Into<String>, location: Location) -> Self {
        Self {
            name: name.into(),
            location,
            machine_type: DEFAULT_MACHINE_TYPE.to_string(),
            source_image: DEFAULT_SOURCE_IMAGE.to_string(),
            labels: Labels::new(),
            metadata: Metadata::new(),
        }
    }
}

/// Persistent disk to create
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskSpec {
    pub name: String,
    pub location: Location,
    pub size_gb: u64,
    pub disk_type: String,
}

impl DiskSpec {
    pub fn new(name: impl Into<String>, location: Location, size_gb: u64) -> Self {
        Self {
            name: name.into(),
            location,
            size_gb,
            disk_type: DEFAULT_DISK_TYPE.to_string(),
        }
    }

    pub fn resource_ref(&self) -> ResourceRef {
        ResourceRef::disk(self.name.clone(), self.location.clone())
    }
}

/// Options for attaching a disk to an instance
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachOptions {
    pub device_name: Option<String>,
    #[serde(default)]
    pub read_only: bool,
    #[serde(default)]
    pub auto_delete: bool,
}

/// Kubernetes taint effect
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaintEffect {
    #[default]
    NoSchedule,
    PreferNoSchedule,
    NoExecute,
}

impl std::fmt::Display for TaintEffect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaintEffect::NoSchedule => write!(f, "NO_SCHEDULE"),
            TaintEffect::PreferNoSchedule => write!(f, "PREFER_NO_SCHEDULE"),
            TaintEffect::NoExecute => write!(f, "NO_EXECUTE"),
        }
    }
}

impl std::str::FromStr for TaintEffect {
    type Err = CloudError;

    /// Accepts `NO_SCHEDULE` as well as the Kubernetes spelling `NoSchedule`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.replace(['_', '-'], "").to_ascii_lowercase().as_str() {
            "noschedule" => Ok(TaintEffect::NoSchedule),
            "prefernoschedule" => Ok(TaintEffect::PreferNoSchedule),
            "noexecute" => Ok(TaintEffect::NoExecute),
            _ => Err(CloudError::Validation(format!(
                "Unknown taint effect '{}'. Use NO_SCHEDULE, PREFER_NO_SCHEDULE or NO_EXECUTE.",
                s
            ))),
        }
    }
}

/// Kubernetes node taint. `key`/`value` are optional here so that incomplete
/// taints coming from loosely typed callers can be rejected by validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeTaint {
    pub key: Option<String>,
    pub value: Option<String>,
    #[serde(default)]
    pub effect: TaintEffect,
}

impl NodeTaint {
    pub fn new(key: impl Into<String>, value: impl Into<String>, effect: TaintEffect) -> Self {
        Self {
            key: Some(key.into()),
            value: Some(value.into()),
            effect,
        }
    }
}

/// GKE node pool to create
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodePoolSpec {
    pub name: String,
    pub node_count: u32,
    pub machine_type: String,
    pub disk_size_gb: u32,
    pub disk_type: String,
    pub max_pods_per_node: u32,
    #[serde(default)]
    pub network_tags: Vec<String>,
    #[serde(default)]
    pub kubernetes_labels: Labels,
    #[serde(default)]
    pub labels: Labels,
    #[serde(default)]
    pub taints: Vec<NodeTaint>,
    #[serde(default)]
    pub autoscaling_enabled: bool,
    pub min_node_count: Option<u32>,
    pub max_node_count: Option<u32>,
}

impl NodePoolSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            node_count: 3,
            machine_type: DEFAULT_NODE_MACHINE_TYPE.to_string(),
            disk_size_gb: 100,
            disk_type: "pd-standard".to_string(),
            max_pods_per_node: 110,
            network_tags: Vec::new(),
            kubernetes_labels: Labels::new(),
            labels: Labels::new(),
            taints: Vec::new(),
            autoscaling_enabled: false,
            min_node_count: None,
            max_node_count: None,
        }
    }

    pub fn with_autoscaling(mut self, min: u32, max: u32) -> Self {
        self.autoscaling_enabled = true;
        self.min_node_count = Some(min);
        self.max_node_count = Some(max);
        self
    }
}

/// Private cluster options
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivateClusterConfig {
    pub enable_private_nodes: bool,
    pub enable_private_endpoint: bool,
    pub master_ipv4_cidr_block: Option<String>,
}

/// GKE cluster to create
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSpec {
    pub name: String,
    pub location: Location,
    #[serde(default)]
    pub autopilot: bool,
    pub network: Option<String>,
    pub subnetwork: Option<String>,
    pub cluster_ipv4_cidr: Option<String>,
    pub services_ipv4_cidr: Option<String>,
    pub private_cluster: Option<PrivateClusterConfig>,
    pub kubernetes_version: Option<String>,
    #[serde(default)]
    pub node_pools: Vec<NodePoolSpec>,
}

impl ClusterSpec {
    pub fn new(name: impl Into<String>, location: Location) -> Self {
        Self {
            name: name.into(),
            location,
            autopilot: false,
            network: None,
            subnetwork: None,
            cluster_ipv4_cidr: None,
            services_ipv4_cidr: None,
            private_cluster: None,
            kubernetes_version: None,
            node_pools: Vec::new(),
        }
    }
}

/// Anything `create_resource` can create
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResourceSpec {
    Instance(InstanceSpec),
    Cluster(ClusterSpec),
    NodePool {
        cluster: String,
        location: Location,
        pool: NodePoolSpec,
    },
}

impl ResourceSpec {
    pub fn resource_ref(&self) -> ResourceRef {
        match self {
            ResourceSpec::Instance(spec) => {
                ResourceRef::instance(spec.name.clone(), spec.location.clone())
            }
            ResourceSpec::Cluster(spec) => {
                ResourceRef::cluster(spec.name.clone(), spec.location.clone())
            }
            ResourceSpec::NodePool {
                cluster,
                location,
                pool,
            } => ResourceRef::node_pool(cluster.clone(), pool.name.clone(), location.clone()),
        }
    }
}
