//! [`ComputeApi`] implementation over the Compute Engine and GKE REST APIs

use crate::auth::{TokenProvider, TokenSource};
use crate::client::{COMPUTE_API_BASE, CONTAINER_API_BASE, GoogleClient};
use crate::compute::{self, ApiDisk, ApiInstance, ApiList, ApiOperation};
use crate::gke::{self, ApiCluster, ApiClusterList, ApiGkeOperation, ApiNodePool, ApiNodePoolList};
use async_trait::async_trait;
use gcpflow_cloud::{
    AttachOptions, CloudError, ComputeApi, DiskSpec, Fingerprint, Labels, ListScope, Location,
    Metadata, OperationHandle, ResourceKind, ResourceRef, ResourceSpec, ResourceSummary, Result,
    UpdateFields,
};
use reqwest::Method;
use serde_json::json;

/// Google Cloud backend bound to one project
pub struct GoogleCompute {
    project: String,
    client: GoogleClient,
    compute_base: String,
    container_base: String,
}

impl GoogleCompute {
    pub fn new(project: impl Into<String>, tokens: TokenSource) -> Self {
        Self {
            project: project.into(),
            client: GoogleClient::new(TokenProvider::new(tokens)),
            compute_base: COMPUTE_API_BASE.to_string(),
            container_base: CONTAINER_API_BASE.to_string(),
        }
    }

    /// Override API endpoints (private service connect, emulators)
    pub fn with_endpoints(mut self, compute: impl Into<String>, container: impl Into<String>) -> Self {
        self.compute_base = compute.into();
        self.container_base = container.into();
        self
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    fn compute_collection(&self, location: &Location, collection: &str) -> String {
        format!(
            "{}/{}/{}",
            self.compute_base,
            location.compute_scope(&self.project),
            collection
        )
    }

    fn instance_url(&self, target: &ResourceRef) -> String {
        format!("{}/{}", self.compute_collection(&target.location, "instances"), target.name)
    }

    fn disk_url(&self, target: &ResourceRef) -> String {
        format!("{}/{}", self.compute_collection(&target.location, "disks"), target.name)
    }

    fn cluster_url(&self, name: &str, location: &Location) -> String {
        format!("{}/{}", self.container_base, location.cluster_path(&self.project, name))
    }

    fn node_pool_path(&self, target: &ResourceRef) -> Result<String> {
        let cluster = target
            .parent
            .as_deref()
            .ok_or_else(|| CloudError::Validation(format!("{} has no parent cluster", target)))?;
        Ok(target
            .location
            .node_pool_path(&self.project, cluster, &target.name))
    }

    fn resource_url(&self, target: &ResourceRef) -> Result<String> {
        match target.kind {
            ResourceKind::Instance => Ok(self.instance_url(target)),
            ResourceKind::Disk => Ok(self.disk_url(target)),
            ResourceKind::Cluster => Ok(self.cluster_url(&target.name, &target.location)),
            ResourceKind::NodePool => {
                Ok(format!("{}/{}", self.container_base, self.node_pool_path(target)?))
            }
        }
    }

    /// POST a Compute Engine instance verb (`stop`, `setLabels`, …)
    async fn instance_verb(
        &self,
        target: &ResourceRef,
        verb: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<OperationHandle> {
        self.instance_verb_with_query(target, verb, &[], body).await
    }

    async fn instance_verb_with_query(
        &self,
        target: &ResourceRef,
        verb: &str,
        query: &[(&str, &str)],
        body: Option<&serde_json::Value>,
    ) -> Result<OperationHandle> {
        require_kind(target, ResourceKind::Instance)?;
        let url = format!("{}/{}", self.instance_url(target), verb);
        let op: ApiOperation = self
            .client
            .call_with_query(Method::POST, &url, query, body, &target.to_string())
            .await?;
        tracing::info!("{} {}: operation {}", verb, target, op.name);
        Ok(op.into())
    }

    async fn list_instances(&self, location: &Location) -> Result<Vec<ResourceSummary>> {
        let base = self.compute_collection(location, "instances");
        let mut summaries = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let query: Vec<(&str, &str)> = match &page_token {
                Some(token) => vec![("pageToken", token.as_str())],
                None => Vec::new(),
            };
            let page: ApiList<ApiInstance> =
                self.client.get_with_query(&base, &query, &base).await?;
            summaries.extend(page.items.into_iter().map(|i| i.into_summary(location)));
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }
        Ok(summaries)
    }

    async fn list_clusters(&self, location: Option<&Location>) -> Result<Vec<ResourceSummary>> {
        let (scope, fallback) = match location {
            Some(location) => (location.cluster_scope(&self.project), location.clone()),
            None => (
                format!("projects/{}/locations/-", self.project),
                Location::resolve("-"),
            ),
        };
        let url = format!("{}/{}/clusters", self.container_base, scope);
        let list: ApiClusterList = self.client.get(&url, &scope).await?;
        Ok(list
            .clusters
            .into_iter()
            .map(|c| c.into_summary(&fallback))
            .collect())
    }

    async fn list_node_pools(&self, cluster: &str, location: &Location) -> Result<Vec<ResourceSummary>> {
        let url = format!("{}/nodePools", self.cluster_url(cluster, location));
        let list: ApiNodePoolList = self.client.get(&url, cluster).await?;
        Ok(list
            .node_pools
            .into_iter()
            .map(|p| p.into_summary(cluster, location))
            .collect())
    }
}

fn require_kind(target: &ResourceRef, kind: ResourceKind) -> Result<()> {
    if target.kind == kind {
        Ok(())
    } else {
        Err(CloudError::Validation(format!(
            "operation not supported for {} (expected {})",
            target, kind
        )))
    }
}

#[async_trait]
impl ComputeApi for GoogleCompute {
    fn name(&self) -> &str {
        "google"
    }

    async fn list_resources(&self, scope: &ListScope) -> Result<Vec<ResourceSummary>> {
        match (scope.kind, &scope.location, &scope.parent) {
            (ResourceKind::Instance, Some(location), _) => self.list_instances(location).await,
            (ResourceKind::Cluster, location, _) => self.list_clusters(location.as_ref()).await,
            (ResourceKind::NodePool, Some(location), Some(cluster)) => {
                self.list_node_pools(cluster, location).await
            }
            _ => Err(CloudError::Validation(format!(
                "listing {} requires a location{}",
                scope.kind,
                if scope.kind == ResourceKind::NodePool { " and a cluster" } else { "" }
            ))),
        }
    }

    async fn get_resource(&self, target: &ResourceRef) -> Result<Option<ResourceSummary>> {
        let url = self.resource_url(target)?;
        let resource = target.to_string();
        let summary = match target.kind {
            ResourceKind::Instance => self
                .client
                .get_optional::<ApiInstance>(&url, &resource)
                .await?
                .map(|i| i.into_summary(&target.location)),
            ResourceKind::Disk => self
                .client
                .get_optional::<ApiDisk>(&url, &resource)
                .await?
                .map(|d| d.into_summary(&target.location)),
            ResourceKind::Cluster => self
                .client
                .get_optional::<ApiCluster>(&url, &resource)
                .await?
                .map(|c| c.into_summary(&target.location)),
            ResourceKind::NodePool => {
                let cluster = target.parent.as_deref().unwrap_or_default();
                self.client
                    .get_optional::<ApiNodePool>(&url, &resource)
                    .await?
                    .map(|p| p.into_summary(cluster, &target.location))
            }
        };
        Ok(summary)
    }

    async fn create_resource(&self, spec: &ResourceSpec) -> Result<OperationHandle> {
        let target = spec.resource_ref();
        let resource = target.to_string();
        let handle: OperationHandle = match spec {
            ResourceSpec::Instance(instance) => {
                let url = self.compute_collection(&instance.location, "instances");
                let body = compute::instance_body(instance);
                self.client
                    .call::<ApiOperation>(Method::POST, &url, Some(&body), &resource)
                    .await?
                    .into()
            }
            ResourceSpec::Cluster(cluster) => {
                let url = format!(
                    "{}/{}/clusters",
                    self.container_base,
                    cluster.location.cluster_scope(&self.project)
                );
                let body = gke::create_cluster_body(cluster);
                self.client
                    .call::<ApiGkeOperation>(Method::POST, &url, Some(&body), &resource)
                    .await?
                    .into()
            }
            ResourceSpec::NodePool {
                cluster,
                location,
                pool,
            } => {
                let url = format!("{}/nodePools", self.cluster_url(cluster, location));
                let body = gke::create_node_pool_body(pool);
                self.client
                    .call::<ApiGkeOperation>(Method::POST, &url, Some(&body), &resource)
                    .await?
                    .into()
            }
        };
        tracing::info!("create {}: operation {}", target, handle.id);
        Ok(handle)
    }

    async fn delete_resource(&self, target: &ResourceRef) -> Result<OperationHandle> {
        let url = self.resource_url(target)?;
        let resource = target.to_string();
        let handle: OperationHandle = match target.kind {
            ResourceKind::Instance | ResourceKind::Disk => self
                .client
                .call::<ApiOperation>(Method::DELETE, &url, None, &resource)
                .await?
                .into(),
            ResourceKind::Cluster | ResourceKind::NodePool => self
                .client
                .call::<ApiGkeOperation>(Method::DELETE, &url, None, &resource)
                .await?
                .into(),
        };
        tracing::info!("delete {}: operation {}", target, handle.id);
        Ok(handle)
    }

    async fn update_resource(
        &self,
        target: &ResourceRef,
        fields: &UpdateFields,
    ) -> Result<OperationHandle> {
        require_kind(target, ResourceKind::Instance)?;
        let mut last = None;
        if let Some(machine_type) = &fields.machine_type {
            let body = json!({
                "machineType": compute::machine_type_url(target.location.as_str(), machine_type),
            });
            last = Some(self.instance_verb(target, "setMachineType", Some(&body)).await?);
        }
        if let Some(platform) = &fields.min_cpu_platform {
            let body = json!({ "minCpuPlatform": platform });
            last = Some(self.instance_verb(target, "setMinCpuPlatform", Some(&body)).await?);
        }
        last.ok_or_else(|| CloudError::Validation("no fields to update".to_string()))
    }

    async fn set_labels(
        &self,
        target: &ResourceRef,
        labels: &Labels,
        fingerprint: &Fingerprint,
    ) -> Result<OperationHandle> {
        let body = compute::set_labels_body(labels, fingerprint);
        self.instance_verb(target, "setLabels", Some(&body)).await
    }

    async fn set_metadata(
        &self,
        target: &ResourceRef,
        metadata: &Metadata,
        fingerprint: &Fingerprint,
    ) -> Result<OperationHandle> {
        let body = compute::set_metadata_body(metadata, fingerprint);
        self.instance_verb(target, "setMetadata", Some(&body)).await
    }

    async fn set_size(&self, target: &ResourceRef, count: u32) -> Result<OperationHandle> {
        require_kind(target, ResourceKind::NodePool)?;
        let url = gke::verb_url(
            &self.container_base,
            &self.node_pool_path(target)?,
            &target.location,
            "setSize",
        );
        let body = json!({ "nodeCount": count });
        let op: ApiGkeOperation = self
            .client
            .call(Method::POST, &url, Some(&body), &target.to_string())
            .await?;
        tracing::info!("setSize {} -> {}: operation {}", target, count, op.name);
        Ok(op.into())
    }

    async fn start_resource(&self, target: &ResourceRef) -> Result<OperationHandle> {
        self.instance_verb(target, "start", None).await
    }

    async fn stop_resource(&self, target: &ResourceRef) -> Result<OperationHandle> {
        self.instance_verb(target, "stop", None).await
    }

    async fn create_sub_resource(&self, disk: &DiskSpec) -> Result<OperationHandle> {
        let url = self.compute_collection(&disk.location, "disks");
        let body = compute::disk_body(disk);
        let op: ApiOperation = self
            .client
            .call(Method::POST, &url, Some(&body), &disk.resource_ref().to_string())
            .await?;
        tracing::info!("create {}: operation {}", disk.resource_ref(), op.name);
        Ok(op.into())
    }

    async fn attach_sub_resource(
        &self,
        target: &ResourceRef,
        disk: &ResourceRef,
        options: &AttachOptions,
    ) -> Result<OperationHandle> {
        let body = compute::attach_disk_body(&self.project, disk, options);
        self.instance_verb(target, "attachDisk", Some(&body)).await
    }

    async fn detach_sub_resource(
        &self,
        target: &ResourceRef,
        device_name: &str,
    ) -> Result<OperationHandle> {
        let valid = !device_name.is_empty()
            && device_name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(CloudError::Validation(format!(
                "invalid device name '{}'",
                device_name
            )));
        }
        self.instance_verb_with_query(target, "detachDisk", &[("deviceName", device_name)], None)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> GoogleCompute {
        GoogleCompute::new("my-project", TokenSource::Static("token".to_string()))
    }

    #[test]
    fn test_resource_urls() {
        let google = backend();
        let vm = ResourceRef::instance("web-1", Location::resolve("us-central1-a"));
        assert_eq!(
            google.resource_url(&vm).unwrap(),
            "https://compute.googleapis.com/compute/v1/projects/my-project/zones/us-central1-a/instances/web-1"
        );

        let pool = ResourceRef::node_pool("c1", "pool-a", Location::resolve("europe-west4"));
        assert_eq!(
            google.resource_url(&pool).unwrap(),
            "https://container.googleapis.com/v1/projects/my-project/locations/europe-west4/clusters/c1/nodePools/pool-a"
        );

        let zonal_cluster = ResourceRef::cluster("c2", Location::resolve("europe-west4-b"));
        assert_eq!(
            google.resource_url(&zonal_cluster).unwrap(),
            "https://container.googleapis.com/v1/projects/my-project/zones/europe-west4-b/clusters/c2"
        );
    }

    #[test]
    fn test_node_pool_without_parent_is_rejected() {
        let google = backend();
        let orphan = ResourceRef {
            kind: ResourceKind::NodePool,
            name: "pool-a".to_string(),
            location: Location::resolve("us-central1"),
            parent: None,
        };
        assert!(matches!(
            google.resource_url(&orphan),
            Err(CloudError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_instance_verbs_reject_other_kinds() {
        let google = backend();
        let cluster = ResourceRef::cluster("c1", Location::resolve("us-central1"));
        let err = google.stop_resource(&cluster).await.unwrap_err();
        assert!(matches!(err, CloudError::Validation(_)));
    }

    #[test]
    fn test_custom_endpoints() {
        let google = backend().with_endpoints("http://localhost:8080/compute/v1", "http://localhost:8081/v1");
        let disk = ResourceRef::disk("data-1", Location::resolve("us-central1-a"));
        assert_eq!(
            google.resource_url(&disk).unwrap(),
            "http://localhost:8080/compute/v1/projects/my-project/zones/us-central1-a/disks/data-1"
        );
    }
}
