//! GKE v1 request bodies and response models
//!
//! Zonal clusters are addressed through the legacy `zones` surface and
//! regional clusters through `locations`; the path itself comes from
//! [`Location::cluster_path`]. The two surfaces spell custom verbs differently
//! (`/setSize` vs `:setSize`).

use gcpflow_cloud::{
    ClusterSpec, Labels, Location, LocationKind, NodePoolSpec, OperationHandle, ResourceKind,
    ResourceStatus, ResourceSummary,
};
use serde::Deserialize;
use serde_json::{Map, Value, json};

/// Custom verb URL on a GKE resource path
pub fn verb_url(base: &str, path: &str, location: &Location, verb: &str) -> String {
    match location.kind() {
        LocationKind::Zonal => format!("{}/{}/{}", base, path, verb),
        LocationKind::Regional => format!("{}/{}:{}", base, path, verb),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiClusterList {
    #[serde(default)]
    pub clusters: Vec<ApiCluster>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiNodePoolList {
    #[serde(default)]
    pub node_pools: Vec<ApiNodePool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ApiAutopilot {
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiCluster {
    pub name: String,
    #[serde(default)]
    pub status: String,
    pub location: Option<String>,
    pub current_master_version: Option<String>,
    pub current_node_count: Option<u32>,
    pub endpoint: Option<String>,
    pub network: Option<String>,
    pub subnetwork: Option<String>,
    #[serde(default)]
    pub autopilot: ApiAutopilot,
    #[serde(default)]
    pub resource_labels: Labels,
    pub label_fingerprint: Option<String>,
    pub create_time: Option<String>,
    #[serde(default)]
    pub node_pools: Vec<ApiNodePool>,
}

impl ApiCluster {
    pub fn into_summary(self, fallback: &Location) -> ResourceSummary {
        let location = self
            .location
            .as_deref()
            .map(Location::resolve)
            .unwrap_or_else(|| fallback.clone());
        let pools: Vec<&str> = self.node_pools.iter().map(|p| p.name.as_str()).collect();

        let mut summary = ResourceSummary::new(self.name.clone(), ResourceKind::Cluster, location)
            .with_status(ResourceStatus::from_remote(&self.status))
            .with_attribute("autopilot", json!(self.autopilot.enabled))
            .with_attribute("node_pools", json!(pools));
        for (key, value) in [
            ("kubernetes_version", &self.current_master_version),
            ("endpoint", &self.endpoint),
            ("network", &self.network),
            ("subnetwork", &self.subnetwork),
            ("created_at", &self.create_time),
        ] {
            if let Some(value) = value {
                summary = summary.with_attribute(key, json!(value));
            }
        }
        if let Some(count) = self.current_node_count {
            summary = summary.with_attribute("node_count", json!(count));
        }
        summary.labels = self.resource_labels;
        summary.label_fingerprint = self.label_fingerprint.map(gcpflow_cloud::Fingerprint::new);
        summary
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiAutoscaling {
    #[serde(default)]
    pub enabled: bool,
    pub min_node_count: Option<u32>,
    pub max_node_count: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiNodeConfig {
    pub machine_type: Option<String>,
    pub disk_size_gb: Option<u32>,
    pub disk_type: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiNodePool {
    pub name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub config: ApiNodeConfig,
    pub initial_node_count: Option<u32>,
    pub autoscaling: Option<ApiAutoscaling>,
    pub version: Option<String>,
}

impl ApiNodePool {
    pub fn into_summary(self, cluster: &str, location: &Location) -> ResourceSummary {
        let autoscaling = self.autoscaling.as_ref().is_some_and(|a| a.enabled);
        let mut summary =
            ResourceSummary::new(self.name, ResourceKind::NodePool, location.clone())
                .with_status(ResourceStatus::from_remote(&self.status))
                .with_attribute("cluster", json!(cluster))
                .with_attribute("autoscaling_enabled", json!(autoscaling));
        summary.machine_type = self.config.machine_type;
        if let Some(count) = self.initial_node_count {
            summary = summary.with_attribute("node_count", json!(count));
        }
        if let Some(scaling) = self.autoscaling.filter(|a| a.enabled) {
            summary = summary
                .with_attribute("min_node_count", json!(scaling.min_node_count))
                .with_attribute("max_node_count", json!(scaling.max_node_count));
        }
        if let Some(size) = self.config.disk_size_gb {
            summary = summary.with_attribute("disk_size_gb", json!(size));
        }
        if let Some(version) = self.version {
            summary = summary.with_attribute("kubernetes_version", json!(version));
        }
        summary
    }
}

/// GKE operation; `name` is the id
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiGkeOperation {
    pub name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub operation_type: String,
    pub target_link: Option<String>,
}

impl From<ApiGkeOperation> for OperationHandle {
    fn from(op: ApiGkeOperation) -> Self {
        let handle = OperationHandle::new(op.name, op.status, op.operation_type);
        match op.target_link {
            Some(link) => handle.with_target(crate::compute::short_name(&link).to_string()),
            None => handle,
        }
    }
}

pub fn node_pool_body(pool: &NodePoolSpec) -> Value {
    let taints: Vec<Value> = pool
        .taints
        .iter()
        .map(|t| {
            json!({
                "key": t.key,
                "value": t.value,
                "effect": t.effect.to_string(),
            })
        })
        .collect();

    let mut body = json!({
        "name": pool.name,
        "initialNodeCount": pool.node_count,
        "config": {
            "machineType": pool.machine_type,
            "diskSizeGb": pool.disk_size_gb,
            "diskType": pool.disk_type,
            "tags": pool.network_tags,
            "labels": pool.kubernetes_labels,
            "resourceLabels": pool.labels,
            "taints": taints,
        },
        "maxPodsConstraint": { "maxPodsPerNode": pool.max_pods_per_node.to_string() },
    });

    if pool.autoscaling_enabled {
        body["autoscaling"] = json!({
            "enabled": true,
            "minNodeCount": pool.min_node_count,
            "maxNodeCount": pool.max_node_count,
        });
    }
    body
}

pub fn create_node_pool_body(pool: &NodePoolSpec) -> Value {
    json!({ "nodePool": node_pool_body(pool) })
}

pub fn create_cluster_body(spec: &ClusterSpec) -> Value {
    let mut cluster = Map::new();
    cluster.insert("name".to_string(), json!(spec.name));

    if let Some(network) = &spec.network {
        cluster.insert("network".to_string(), json!(network));
    }
    if let Some(subnetwork) = &spec.subnetwork {
        cluster.insert("subnetwork".to_string(), json!(subnetwork));
    }
    if let Some(version) = &spec.kubernetes_version {
        cluster.insert("initialClusterVersion".to_string(), json!(version));
    }

    let mut ip_policy = Map::new();
    ip_policy.insert("useIpAliases".to_string(), json!(true));
    if let Some(cidr) = &spec.cluster_ipv4_cidr {
        ip_policy.insert("clusterIpv4CidrBlock".to_string(), json!(cidr));
    }
    if let Some(cidr) = &spec.services_ipv4_cidr {
        ip_policy.insert("servicesIpv4CidrBlock".to_string(), json!(cidr));
    }
    cluster.insert("ipAllocationPolicy".to_string(), Value::Object(ip_policy));

    if let Some(private) = &spec.private_cluster {
        cluster.insert(
            "privateClusterConfig".to_string(),
            json!({
                "enablePrivateNodes": private.enable_private_nodes,
                "enablePrivateEndpoint": private.enable_private_endpoint,
                "masterIpv4CidrBlock": private.master_ipv4_cidr_block,
            }),
        );
    }

    if spec.autopilot {
        cluster.insert("autopilot".to_string(), json!({ "enabled": true }));
    } else {
        let pools: Vec<Value> = if spec.node_pools.is_empty() {
            vec![node_pool_body(&NodePoolSpec::new("default-pool"))]
        } else {
            spec.node_pools.iter().map(node_pool_body).collect()
        };
        cluster.insert("nodePools".to_string(), Value::Array(pools));
    }

    json!({ "cluster": Value::Object(cluster) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use gcpflow_cloud::{NodeTaint, PrivateClusterConfig, TaintEffect};

    #[test]
    fn test_verb_url_per_surface() {
        let zonal = Location::resolve("us-central1-a");
        let regional = Location::resolve("us-central1");
        assert_eq!(
            verb_url("https://c", &zonal.node_pool_path("p", "c1", "np"), &zonal, "setSize"),
            "https://c/projects/p/zones/us-central1-a/clusters/c1/nodePools/np/setSize"
        );
        assert_eq!(
            verb_url("https://c", &regional.node_pool_path("p", "c1", "np"), &regional, "setSize"),
            "https://c/projects/p/locations/us-central1/clusters/c1/nodePools/np:setSize"
        );
    }

    #[test]
    fn test_node_pool_body() {
        let mut pool = NodePoolSpec::new("gpu-pool").with_autoscaling(1, 4);
        pool.taints.push(NodeTaint::new("nvidia.com/gpu", "present", TaintEffect::NoSchedule));
        let body = node_pool_body(&pool);

        assert_eq!(body["autoscaling"]["minNodeCount"], 1);
        assert_eq!(body["autoscaling"]["maxNodeCount"], 4);
        assert_eq!(body["config"]["taints"][0]["effect"], "NO_SCHEDULE");
        assert_eq!(body["maxPodsConstraint"]["maxPodsPerNode"], "110");
    }

    #[test]
    fn test_standard_cluster_gets_default_pool() {
        let body = create_cluster_body(&ClusterSpec::new("c1", Location::resolve("us-central1")));
        assert_eq!(body["cluster"]["nodePools"][0]["name"], "default-pool");
        assert!(body["cluster"].get("autopilot").is_none());
    }

    #[test]
    fn test_autopilot_private_cluster_body() {
        let mut spec = ClusterSpec::new("auto-1", Location::resolve("us-central1"));
        spec.autopilot = true;
        spec.private_cluster = Some(PrivateClusterConfig {
            enable_private_nodes: true,
            enable_private_endpoint: false,
            master_ipv4_cidr_block: Some("172.16.0.0/28".to_string()),
        });
        let body = create_cluster_body(&spec);
        assert_eq!(body["cluster"]["autopilot"]["enabled"], true);
        assert!(body["cluster"].get("nodePools").is_none());
        assert_eq!(
            body["cluster"]["privateClusterConfig"]["masterIpv4CidrBlock"],
            "172.16.0.0/28"
        );
    }

    #[test]
    fn test_node_pool_summary() {
        let pool: ApiNodePool = serde_json::from_value(json!({
            "name": "pool-a",
            "status": "RUNNING",
            "initialNodeCount": 3,
            "config": { "machineType": "e2-standard-2" },
            "autoscaling": { "enabled": true, "minNodeCount": 1, "maxNodeCount": 5 }
        }))
        .unwrap();
        let summary = pool.into_summary("c1", &Location::resolve("us-central1"));
        assert!(summary.autoscaling_enabled());
        assert_eq!(summary.get_attribute::<String>("cluster").as_deref(), Some("c1"));
        assert_eq!(summary.get_attribute::<u32>("node_count"), Some(3));
    }
}
