//! Compute Engine v1 request bodies and response models

use gcpflow_cloud::{
    AttachOptions, DiskSpec, Fingerprint, InstanceSpec, Labels, Location, Metadata,
    OperationHandle, ResourceKind, ResourceStatus, ResourceSummary,
};
use serde::Deserialize;
use serde_json::{Value, json};

/// Last path segment of a resource URL (`…/machineTypes/e2-small` → `e2-small`)
pub fn short_name(url: &str) -> &str {
    url.rsplit('/').next().unwrap_or(url)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiList<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ApiMetadataItem {
    pub key: String,
    #[serde(default)]
    pub value: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ApiMetadata {
    pub fingerprint: Option<String>,
    #[serde(default)]
    pub items: Vec<ApiMetadataItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiAccessConfig {
    #[serde(rename = "natIP")]
    pub nat_ip: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiNetworkInterface {
    #[serde(rename = "networkIP")]
    pub network_ip: Option<String>,
    #[serde(default)]
    pub access_configs: Vec<ApiAccessConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiAttachedDisk {
    pub device_name: Option<String>,
    pub source: Option<String>,
    #[serde(default)]
    pub boot: bool,
    pub mode: Option<String>,
    #[serde(default)]
    pub auto_delete: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiInstance {
    pub name: String,
    #[serde(default)]
    pub status: String,
    pub machine_type: Option<String>,
    pub zone: Option<String>,
    #[serde(default)]
    pub labels: Labels,
    pub label_fingerprint: Option<String>,
    #[serde(default)]
    pub metadata: ApiMetadata,
    #[serde(default)]
    pub network_interfaces: Vec<ApiNetworkInterface>,
    #[serde(default)]
    pub disks: Vec<ApiAttachedDisk>,
    pub min_cpu_platform: Option<String>,
    pub creation_timestamp: Option<String>,
}

impl ApiInstance {
    pub fn into_summary(self, fallback: &Location) -> ResourceSummary {
        let location = self
            .zone
            .as_deref()
            .map(|z| Location::resolve(short_name(z)))
            .unwrap_or_else(|| fallback.clone());

        let mut summary = ResourceSummary::new(self.name, ResourceKind::Instance, location)
            .with_status(ResourceStatus::from_remote(&self.status));
        summary.machine_type = self.machine_type.as_deref().map(|m| short_name(m).to_string());
        summary.labels = self.labels;
        summary.label_fingerprint = self.label_fingerprint.map(Fingerprint::new);
        summary.metadata_fingerprint = self.metadata.fingerprint.map(Fingerprint::new);
        summary.metadata = self
            .metadata
            .items
            .into_iter()
            .map(|item| (item.key, item.value.unwrap_or_default()))
            .collect();

        if let Some(nic) = self.network_interfaces.first() {
            if let Some(ip) = &nic.network_ip {
                summary = summary.with_attribute("internal_ip", json!(ip));
            }
            if let Some(ip) = nic.access_configs.iter().find_map(|a| a.nat_ip.as_ref()) {
                summary = summary.with_attribute("external_ip", json!(ip));
            }
        }

        let disks: Vec<Value> = self
            .disks
            .iter()
            .map(|d| {
                json!({
                    "device_name": d.device_name,
                    "source": d.source.as_deref().map(short_name),
                    "boot": d.boot,
                    "read_only": d.mode.as_deref() == Some("READ_ONLY"),
                    "auto_delete": d.auto_delete,
                })
            })
            .collect();
        summary = summary.with_attribute("disks", Value::Array(disks));

        if let Some(platform) = self.min_cpu_platform {
            summary = summary.with_attribute("min_cpu_platform", json!(platform));
        }
        if let Some(created) = self.creation_timestamp {
            summary = summary.with_attribute("created_at", json!(created));
        }
        summary
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiDisk {
    pub name: String,
    #[serde(default)]
    pub status: String,
    pub size_gb: Option<String>,
    #[serde(rename = "type")]
    pub disk_type: Option<String>,
    #[serde(default)]
    pub users: Vec<String>,
    #[serde(default)]
    pub labels: Labels,
    pub label_fingerprint: Option<String>,
}

impl ApiDisk {
    pub fn into_summary(self, location: &Location) -> ResourceSummary {
        let mut summary = ResourceSummary::new(self.name, ResourceKind::Disk, location.clone())
            .with_status(ResourceStatus::from_remote(&self.status))
            .with_attribute(
                "users",
                json!(self.users.iter().map(|u| short_name(u)).collect::<Vec<_>>()),
            );
        if let Some(size) = self.size_gb.and_then(|s| s.parse::<u64>().ok()) {
            summary = summary.with_attribute("size_gb", json!(size));
        }
        if let Some(disk_type) = self.disk_type {
            summary = summary.with_attribute("disk_type", json!(short_name(&disk_type)));
        }
        summary.labels = self.labels;
        summary.label_fingerprint = self.label_fingerprint.map(Fingerprint::new);
        summary
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiOperation {
    pub name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub operation_type: String,
    pub target_link: Option<String>,
}

impl From<ApiOperation> for OperationHandle {
    fn from(op: ApiOperation) -> Self {
        let handle = OperationHandle::new(op.name, op.status, op.operation_type);
        match op.target_link {
            Some(link) => handle.with_target(short_name(&link).to_string()),
            None => handle,
        }
    }
}

fn metadata_items(metadata: &Metadata) -> Vec<Value> {
    metadata
        .iter()
        .map(|(k, v)| json!({ "key": k, "value": v }))
        .collect()
}

pub fn machine_type_url(zone: &str, machine_type: &str) -> String {
    format!("zones/{}/machineTypes/{}", zone, machine_type)
}

pub fn instance_body(spec: &InstanceSpec) -> Value {
    json!({
        "name": spec.name,
        "machineType": machine_type_url(spec.location.as_str(), &spec.machine_type),
        "labels": spec.labels,
        "metadata": { "items": metadata_items(&spec.metadata) },
        "disks": [{
            "boot": true,
            "autoDelete": true,
            "initializeParams": { "sourceImage": spec.source_image },
        }],
        "networkInterfaces": [{
            "network": "global/networks/default",
            "accessConfigs": [{ "type": "ONE_TO_ONE_NAT", "name": "External NAT" }],
        }],
    })
}

pub fn set_labels_body(labels: &Labels, fingerprint: &Fingerprint) -> Value {
    json!({
        "labels": labels,
        "labelFingerprint": fingerprint.as_str(),
    })
}

pub fn set_metadata_body(metadata: &Metadata, fingerprint: &Fingerprint) -> Value {
    json!({
        "fingerprint": fingerprint.as_str(),
        "items": metadata_items(metadata),
    })
}

pub fn disk_body(spec: &DiskSpec) -> Value {
    json!({
        "name": spec.name,
        "sizeGb": spec.size_gb.to_string(),
        "type": format!("zones/{}/diskTypes/{}", spec.location, spec.disk_type),
    })
}

pub fn attach_disk_body(project: &str, disk: &gcpflow_cloud::ResourceRef, options: &AttachOptions) -> Value {
    json!({
        "source": format!("{}/disks/{}", disk.location.compute_scope(project), disk.name),
        "deviceName": options.device_name.clone().unwrap_or_else(|| disk.name.clone()),
        "mode": if options.read_only { "READ_ONLY" } else { "READ_WRITE" },
        "autoDelete": options.auto_delete,
    })
}
