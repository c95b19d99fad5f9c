use super::{into_map, location_or_default};
use crate::NodePoolCommands;
use gcpflow_cloud::{NodePoolSpec, OperationOutcome};
use gcpflow_core::{OperationDispatcher, Request};

pub async fn handle(dispatcher: &OperationDispatcher, cmd: NodePoolCommands) -> OperationOutcome {
    let request = match cmd {
        NodePoolCommands::List { cluster, location } => Request::ListNodePools {
            cluster,
            location: location_or_default(dispatcher, location),
        },
        NodePoolCommands::Create {
            cluster,
            name,
            location,
            node_count,
            machine_type,
            disk_size_gb,
            disk_type,
            max_pods_per_node,
            network_tags,
            node_labels,
            labels,
            taints,
            autoscaling,
            min_nodes,
            max_nodes,
        } => {
            let mut pool = NodePoolSpec::new(name);
            pool.node_count = node_count;
            pool.machine_type = machine_type;
            pool.disk_size_gb = disk_size_gb;
            pool.disk_type = disk_type;
            pool.max_pods_per_node = max_pods_per_node;
            pool.network_tags = network_tags;
            pool.kubernetes_labels = into_map(node_labels);
            pool.labels = into_map(labels);
            pool.taints = taints;
            // min/max が欠けていれば dispatcher の検証で弾かれる
            pool.autoscaling_enabled = autoscaling;
            pool.min_node_count = min_nodes;
            pool.max_node_count = max_nodes;
            Request::CreateNodePool {
                cluster,
                location: location_or_default(dispatcher, location),
                pool,
            }
        }
        NodePoolCommands::Delete {
            cluster,
            name,
            location,
        } => Request::DeleteNodePool {
            cluster,
            location: location_or_default(dispatcher, location),
            pool: name,
        },
        NodePoolCommands::Resize {
            cluster,
            name,
            node_count,
            location,
        } => Request::ResizeNodePool {
            cluster,
            location: location_or_default(dispatcher, location),
            pool: name,
            node_count,
        },
    };
    dispatcher.execute(request).await
}
