use super::location_or_default;
use crate::DiskCommands;
use gcpflow_cloud::{AttachOptions, DiskSpec, OperationOutcome};
use gcpflow_core::{OperationDispatcher, Request};
use tokio_util::sync::CancellationToken;

pub async fn handle(
    dispatcher: &OperationDispatcher,
    cmd: DiskCommands,
    cancel: &CancellationToken,
) -> OperationOutcome {
    let request = match cmd {
        DiskCommands::Provision {
            instance,
            name,
            size_gb,
            zone,
            disk_type,
            device_name,
            read_only,
            auto_delete,
        } => {
            let mut disk = DiskSpec::new(name, location_or_default(dispatcher, zone), size_gb);
            disk.disk_type = disk_type;
            Request::ProvisionDisk {
                instance,
                disk,
                options: AttachOptions {
                    device_name,
                    read_only,
                    auto_delete,
                },
            }
        }
        DiskCommands::Detach {
            instance,
            device_name,
            zone,
        } => Request::DetachDisk {
            instance,
            location: location_or_default(dispatcher, zone),
            device_name,
        },
    };
    dispatcher.execute_with_cancel(request, cancel).await
}
