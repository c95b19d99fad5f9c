use super::location_or_default;
use crate::ClusterCommands;
use gcpflow_cloud::{ClusterSpec, Location, NodePoolSpec, OperationOutcome, PrivateClusterConfig};
use gcpflow_core::{OperationDispatcher, Request};

pub async fn handle(dispatcher: &OperationDispatcher, cmd: ClusterCommands) -> OperationOutcome {
    let request = match cmd {
        ClusterCommands::List { location } => Request::ListClusters {
            // 未指定なら全ロケーション
            location: location
                .filter(|s| !s.trim().is_empty())
                .map(|s| Location::resolve(s.trim())),
        },
        ClusterCommands::Get { name, location } => Request::GetCluster {
            name,
            location: location_or_default(dispatcher, location),
        },
        ClusterCommands::Create {
            name,
            location,
            autopilot,
            network,
            subnetwork,
            kubernetes_version,
            node_count,
            machine_type,
            private_nodes,
            master_cidr,
        } => {
            let mut spec = ClusterSpec::new(name, location_or_default(dispatcher, location));
            spec.autopilot = autopilot;
            spec.network = network;
            spec.subnetwork = subnetwork;
            spec.kubernetes_version = kubernetes_version;
            if private_nodes {
                spec.private_cluster = Some(PrivateClusterConfig {
                    enable_private_nodes: true,
                    enable_private_endpoint: false,
                    master_ipv4_cidr_block: master_cidr,
                });
            }
            if node_count.is_some() || machine_type.is_some() {
                let mut pool = NodePoolSpec::new("default-pool");
                if let Some(count) = node_count {
                    pool.node_count = count;
                }
                if let Some(machine_type) = machine_type {
                    pool.machine_type = machine_type;
                }
                spec.node_pools.push(pool);
            }
            Request::CreateCluster(spec)
        }
        ClusterCommands::Delete { name, location } => Request::DeleteCluster {
            name,
            location: location_or_default(dispatcher, location),
        },
    };
    dispatcher.execute(request).await
}
