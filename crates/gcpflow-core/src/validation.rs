//! Request validation performed before any remote call

use gcpflow_cloud::{
    CloudError, ClusterSpec, DiskSpec, Location, NodePoolSpec, Result, UpdateFields,
};

const MAX_NAME_LEN: usize = 63;

/// Resource names: lowercase letter first, then lowercase letters, digits or
/// hyphens, no trailing hyphen, at most 63 characters
pub fn validate_name(kind: &str, name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.len() <= MAX_NAME_LEN
        && name.starts_with(|c: char| c.is_ascii_lowercase())
        && !name.ends_with('-')
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if valid {
        Ok(())
    } else {
        Err(CloudError::Validation(format!(
            "Invalid {} name '{}': use lowercase letters, digits and hyphens, starting with a letter (max {} characters).",
            kind, name, MAX_NAME_LEN
        )))
    }
}

/// Location strings: lowercase letters, digits and hyphens with at least one hyphen
pub fn validate_location(location: &Location) -> Result<()> {
    let raw = location.as_str();
    let valid = raw.contains('-')
        && !raw.starts_with('-')
        && !raw.ends_with('-')
        && raw
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if valid {
        Ok(())
    } else {
        Err(CloudError::Validation(format!(
            "Invalid location '{}'. Expected a region (us-central1) or zone (us-central1-a).",
            raw
        )))
    }
}

/// Instances and disks live in zones
pub fn validate_zone(location: &Location) -> Result<()> {
    validate_location(location)?;
    if location.is_zonal() {
        Ok(())
    } else {
        Err(CloudError::Validation(format!(
            "'{}' is a region. Compute Engine instances and disks require a zone (e.g. {}-a).",
            location, location
        )))
    }
}

pub fn validate_update_fields(fields: &UpdateFields) -> Result<()> {
    if fields.is_empty() {
        return Err(CloudError::Validation(
            "No changes specified. Provide a machine type or a minimum CPU platform.".to_string(),
        ));
    }
    if fields.machine_type.as_deref().is_some_and(|m| m.trim().is_empty()) {
        return Err(CloudError::Validation("Machine type must not be empty.".to_string()));
    }
    Ok(())
}

pub fn validate_disk(disk: &DiskSpec) -> Result<()> {
    validate_name("disk", &disk.name)?;
    validate_zone(&disk.location)?;
    if disk.size_gb == 0 {
        return Err(CloudError::Validation(
            "Disk size must be at least 1 GB.".to_string(),
        ));
    }
    Ok(())
}

pub fn validate_node_pool(pool: &NodePoolSpec) -> Result<()> {
    validate_name("node pool", &pool.name)?;

    if pool.autoscaling_enabled {
        let (Some(min), Some(max)) = (pool.min_node_count, pool.max_node_count) else {
            return Err(CloudError::Validation(
                "When autoscaling is enabled, both min_node_count and max_node_count must be specified."
                    .to_string(),
            ));
        };
        if min >= max {
            return Err(CloudError::Validation(format!(
                "min_node_count ({}) must be less than max_node_count ({}).",
                min, max
            )));
        }
    } else if pool.node_count == 0 {
        return Err(CloudError::Validation(
            "node_count must be at least 1 when autoscaling is disabled.".to_string(),
        ));
    }

    for taint in &pool.taints {
        let complete = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.is_empty());
        if !complete(&taint.key) || !complete(&taint.value) {
            return Err(CloudError::Validation(
                "Each taint must have at least a 'key' and 'value'.".to_string(),
            ));
        }
    }

    Ok(())
}

pub fn validate_cluster(cluster: &ClusterSpec) -> Result<()> {
    validate_name("cluster", &cluster.name)?;
    validate_location(&cluster.location)?;

    if let Some(private) = &cluster.private_cluster {
        let has_cidr = private
            .master_ipv4_cidr_block
            .as_deref()
            .is_some_and(|c| !c.trim().is_empty());
        if private.enable_private_nodes && !has_cidr {
            return Err(CloudError::Validation(
                "When creating a private cluster, master_cidr_block must be specified."
                    .to_string(),
            ));
        }
    }

    if cluster.autopilot && !cluster.node_pools.is_empty() {
        return Err(CloudError::Validation(
            "Autopilot clusters manage their own nodes; remove the node pool definitions."
                .to_string(),
        ));
    }

    cluster.node_pools.iter().try_for_each(validate_node_pool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gcpflow_cloud::{NodeTaint, PrivateClusterConfig, TaintEffect};

    fn is_validation(result: Result<()>) -> bool {
        matches!(result, Err(CloudError::Validation(_)))
    }

    #[test]
    fn test_names() {
        assert!(validate_name("instance", "web-1").is_ok());
        assert!(is_validation(validate_name("instance", "Web-1")));
        assert!(is_validation(validate_name("instance", "1web")));
        assert!(is_validation(validate_name("instance", "web-")));
        assert!(is_validation(validate_name("instance", "")));
        assert!(is_validation(validate_name("instance", &"a".repeat(64))));
    }

    #[test]
    fn test_locations() {
        assert!(validate_location(&"us-central1".into()).is_ok());
        assert!(validate_zone(&"us-central1-a".into()).is_ok());
        assert!(is_validation(validate_zone(&"us-central1".into())));
        assert!(is_validation(validate_location(&"zone".into())));
        assert!(is_validation(validate_location(&"US-CENTRAL1-A".into())));
    }

    #[test]
    fn test_autoscaling_bounds() {
        let inverted = NodePoolSpec::new("pool-a").with_autoscaling(5, 3);
        assert!(is_validation(validate_node_pool(&inverted)));

        let equal = NodePoolSpec::new("pool-a").with_autoscaling(3, 3);
        assert!(is_validation(validate_node_pool(&equal)));

        let mut half = NodePoolSpec::new("pool-a");
        half.autoscaling_enabled = true;
        half.min_node_count = Some(1);
        assert!(is_validation(validate_node_pool(&half)));

        assert!(validate_node_pool(&NodePoolSpec::new("pool-a").with_autoscaling(1, 5)).is_ok());
    }

    #[test]
    fn test_taints_need_key_and_value() {
        let mut pool = NodePoolSpec::new("pool-a");
        pool.taints.push(NodeTaint::new("dedicated", "gpu", TaintEffect::NoSchedule));
        assert!(validate_node_pool(&pool).is_ok());

        pool.taints.push(NodeTaint {
            key: Some("only-key".to_string()),
            value: None,
            effect: TaintEffect::NoExecute,
        });
        assert!(is_validation(validate_node_pool(&pool)));
    }

    #[test]
    fn test_private_cluster_needs_master_cidr() {
        let mut cluster = ClusterSpec::new("c1", "us-central1".into());
        cluster.private_cluster = Some(PrivateClusterConfig {
            enable_private_nodes: true,
            enable_private_endpoint: false,
            master_ipv4_cidr_block: None,
        });
        assert!(is_validation(validate_cluster(&cluster)));

        cluster.private_cluster = Some(PrivateClusterConfig {
            enable_private_nodes: true,
            enable_private_endpoint: false,
            master_ipv4_cidr_block: Some("172.16.0.0/28".to_string()),
        });
        assert!(validate_cluster(&cluster).is_ok());
    }

    #[test]
    fn test_cluster_validates_its_node_pools() {
        let mut cluster = ClusterSpec::new("c1", "us-central1-a".into());
        cluster.node_pools.push(NodePoolSpec::new("pool-a").with_autoscaling(4, 2));
        assert!(is_validation(validate_cluster(&cluster)));
    }

    #[test]
    fn test_disk() {
        assert!(validate_disk(&DiskSpec::new("data-1", "us-central1-a".into(), 10)).is_ok());
        assert!(is_validation(validate_disk(&DiskSpec::new("data-1", "us-central1-a".into(), 0))));
        assert!(is_validation(validate_disk(&DiskSpec::new("data-1", "us-central1".into(), 10))));
    }
}
