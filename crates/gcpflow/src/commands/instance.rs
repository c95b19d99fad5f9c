use super::{into_map, location_or_default};
use crate::InstanceCommands;
use gcpflow_cloud::{OperationOutcome, UpdateFields};
use gcpflow_core::{Intent, OperationDispatcher, Request};
use tokio_util::sync::CancellationToken;

pub async fn handle(
    dispatcher: &OperationDispatcher,
    cmd: InstanceCommands,
    cancel: &CancellationToken,
) -> OperationOutcome {
    let intent = match cmd {
        InstanceCommands::List { zone } => Intent::List {
            location: location_or_default(dispatcher, zone),
        },
        InstanceCommands::Get { name, zone } => Intent::Get {
            name,
            location: location_or_default(dispatcher, zone),
        },
        InstanceCommands::Create {
            name,
            zone,
            machine_type,
            labels,
            metadata,
        } => Intent::Create {
            name,
            location: location_or_default(dispatcher, zone),
            machine_type,
            labels: into_map(labels),
            metadata: into_map(metadata),
        },
        InstanceCommands::Delete { name, zone } => Intent::Delete {
            name,
            location: location_or_default(dispatcher, zone),
        },
        InstanceCommands::Start { name, zone } => Intent::Start {
            name,
            location: location_or_default(dispatcher, zone),
        },
        InstanceCommands::Stop { name, zone } => Intent::Stop {
            name,
            location: location_or_default(dispatcher, zone),
        },
        InstanceCommands::Restart { name, zone } => Intent::Restart {
            name,
            location: location_or_default(dispatcher, zone),
        },
        InstanceCommands::Update {
            name,
            zone,
            labels,
            metadata,
        } => Intent::Modify {
            name,
            location: location_or_default(dispatcher, zone),
            labels: into_map(labels),
            metadata: into_map(metadata),
        },
        InstanceCommands::Resize {
            name,
            zone,
            machine_type,
            min_cpu_platform,
        } => {
            // 停止を伴うのでワークフローとして実行
            let request = Request::ResizeInstance {
                name,
                location: location_or_default(dispatcher, zone),
                fields: UpdateFields {
                    machine_type,
                    min_cpu_platform,
                },
            };
            return dispatcher.execute_with_cancel(request, cancel).await;
        }
    };
    dispatcher.dispatch_with_cancel(intent, cancel).await
}
