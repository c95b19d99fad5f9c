//! Fingerprint compare-and-swap updates of labels and metadata

use gcpflow_cloud::{
    ComputeApi, FailureKind, Fingerprint, Labels, OperationOutcome, ResourceRef,
    ResourceSummary,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const STEP_SET_LABELS: &str = "set_labels";
pub const STEP_SET_METADATA: &str = "set_metadata";

/// How a requested label / metadata value relates to the current one
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldUpdate {
    /// The value becomes exactly this map
    Replace(Labels),
    /// Entries are inserted into (or overwrite keys of) the current map
    Merge(Labels),
}

impl FieldUpdate {
    /// Full value to send, computed from the snapshot the fingerprint came from
    fn resolve(&self, current: &Labels) -> Labels {
        match self {
            FieldUpdate::Replace(value) => value.clone(),
            FieldUpdate::Merge(delta) => {
                let mut merged = current.clone();
                merged.extend(delta.iter().map(|(k, v)| (k.clone(), v.clone())));
                merged
            }
        }
    }
}

/// Applies label / metadata updates with optimistic concurrency
///
/// One read captures both fingerprints, then each requested sub-resource is
/// written with its captured fingerprint, labels first. A stale fingerprint
/// surfaces as a `ConcurrencyConflict` outcome and is never retried here.
pub struct ConcurrencyController {
    api: Arc<dyn ComputeApi>,
}

impl ConcurrencyController {
    pub fn new(api: Arc<dyn ComputeApi>) -> Self {
        Self { api }
    }

    pub async fn update_mutable_fields(
        &self,
        target: &ResourceRef,
        labels: Option<&FieldUpdate>,
        metadata: Option<&FieldUpdate>,
    ) -> OperationOutcome {
        if labels.is_none() && metadata.is_none() {
            return OperationOutcome::rejected(
                FailureKind::Validation,
                "No modifications specified. Please provide labels or metadata to update.",
            );
        }

        debug!("fetching fingerprints for {}", target);
        let snapshot = match self.api.get_resource(target).await {
            Ok(Some(summary)) => summary,
            Ok(None) => {
                warn!("{} not found", target);
                return OperationOutcome::not_found(format!("{} not found.", capitalize(target)));
            }
            Err(e) => return OperationOutcome::failed(format!("Failed to read {}", target), &e),
        };

        let mut steps = Vec::new();

        if let Some(update) = labels {
            let value = update.resolve(&snapshot.labels);
            let fingerprint = captured(snapshot.label_fingerprint.as_ref());
            match self.api.set_labels(target, &value, &fingerprint).await {
                Ok(handle) => {
                    info!("labels update accepted for {} ({})", target, handle.id);
                    steps.push(
                        OperationOutcome::accepted(&handle, format!("Labels updated on {}", target))
                            .with_step(STEP_SET_LABELS),
                    );
                }
                Err(e) => return abort(target, STEP_SET_LABELS, &e, steps),
            }
        }

        if let Some(update) = metadata {
            let value = update.resolve(&snapshot.metadata);
            let fingerprint = captured(snapshot.metadata_fingerprint.as_ref());
            match self.api.set_metadata(target, &value, &fingerprint).await {
                Ok(handle) => {
                    info!("metadata update accepted for {} ({})", target, handle.id);
                    steps.push(
                        OperationOutcome::accepted(
                            &handle,
                            format!("Metadata updated on {}", target),
                        )
                        .with_step(STEP_SET_METADATA),
                    );
                }
                Err(e) => return abort(target, STEP_SET_METADATA, &e, steps),
            }
        }

        summarize(target, &snapshot, steps)
    }
}

/// The fingerprint read from the snapshot. Absent fingerprints are sent as an
/// empty token and left to the remote side to judge.
fn captured(fingerprint: Option<&Fingerprint>) -> Fingerprint {
    fingerprint.cloned().unwrap_or_else(|| Fingerprint::new(""))
}

fn abort(
    target: &ResourceRef,
    step: &str,
    err: &gcpflow_cloud::CloudError,
    mut steps: Vec<OperationOutcome>,
) -> OperationOutcome {
    let outcome = OperationOutcome::failed(format!("{} on {}", step, target), err);
    match outcome.failure_kind() {
        Some(FailureKind::ConcurrencyConflict) => warn!(
            "{} changed concurrently; {} rejected with stale fingerprint",
            target, step
        ),
        _ => tracing::error!("{} failed for {}: {}", step, target, err),
    }
    steps.push(outcome.clone().with_step(step));
    outcome.with_steps(steps)
}

fn summarize(
    target: &ResourceRef,
    snapshot: &ResourceSummary,
    steps: Vec<OperationOutcome>,
) -> OperationOutcome {
    let Some(first) = steps.first() else {
        return OperationOutcome::no_op(format!("Nothing to update on {}", target));
    };
    let updated: Vec<&str> = steps.iter().filter_map(|s| s.step.as_deref()).collect();
    let message = format!(
        "Updated {} of {} '{}'. Operation: {}",
        updated
            .iter()
            .map(|s| s.trim_start_matches("set_"))
            .collect::<Vec<_>>()
            .join(" and "),
        snapshot.kind,
        snapshot.name,
        first.remote_operation_id
    );
    let mut outcome = OperationOutcome::observed(first.status.clone(), message);
    outcome.remote_operation_id = first.remote_operation_id.clone();
    outcome.with_steps(steps)
}

fn capitalize(target: &ResourceRef) -> String {
    let text = target.to_string();
    let mut chars = text.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().collect::<String>() + chars.as_str(),
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gcpflow_cloud::{ExternalWrite, MemoryCompute, ResourceStatus};

    fn map(pairs: &[(&str, &str)]) -> Labels {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn setup() -> (Arc<MemoryCompute>, ConcurrencyController, ResourceRef) {
        let api = Arc::new(MemoryCompute::new());
        let vm = api.insert_instance("web-1", "us-central1-a", ResourceStatus::Running);
        let controller = ConcurrencyController::new(api.clone());
        (api, controller, vm)
    }

    #[tokio::test]
    async fn test_single_fetch_then_labels_then_metadata() {
        let (api, controller, vm) = setup();

        let outcome = controller
            .update_mutable_fields(
                &vm,
                Some(&FieldUpdate::Replace(map(&[("env", "prod")]))),
                Some(&FieldUpdate::Replace(map(&[("owner", "ops")]))),
            )
            .await;

        assert!(outcome.is_success(), "{}", outcome);
        assert_eq!(api.verbs(), vec!["get_resource", "set_labels", "set_metadata"]);
        assert_eq!(outcome.step_labels(), vec![STEP_SET_LABELS, STEP_SET_METADATA]);
        let stored = api.peek(&vm).unwrap();
        assert_eq!(stored.labels, map(&[("env", "prod")]));
        assert_eq!(stored.metadata, map(&[("owner", "ops")]));
    }

    #[tokio::test]
    async fn test_merge_keeps_existing_entries() {
        let (api, controller, vm) = setup();
        api.external_write(&vm, ExternalWrite::Labels(map(&[("team", "core")])))
            .unwrap();

        let outcome = controller
            .update_mutable_fields(&vm, Some(&FieldUpdate::Merge(map(&[("env", "dev")]))), None)
            .await;

        assert!(outcome.is_success());
        assert_eq!(
            api.peek(&vm).unwrap().labels,
            map(&[("env", "dev"), ("team", "core")])
        );
    }

    #[tokio::test]
    async fn test_stale_fingerprint_is_conflict_not_overwrite() {
        let (api, controller, vm) = setup();
        api.write_after_next_read(&vm, ExternalWrite::Labels(map(&[("owner", "someone-else")])));

        let outcome = controller
            .update_mutable_fields(&vm, Some(&FieldUpdate::Replace(map(&[("env", "prod")]))), None)
            .await;

        assert_eq!(outcome.failure_kind(), Some(FailureKind::ConcurrencyConflict));
        assert_eq!(api.peek(&vm).unwrap().labels, map(&[("owner", "someone-else")]));
        // No retry
        assert_eq!(api.verbs(), vec!["get_resource", "set_labels"]);
    }

    #[tokio::test]
    async fn test_partial_progress_is_visible() {
        let (api, controller, vm) = setup();
        api.write_after_next_read(&vm, ExternalWrite::Metadata(map(&[("k", "v")])));

        let outcome = controller
            .update_mutable_fields(
                &vm,
                Some(&FieldUpdate::Replace(map(&[("env", "prod")]))),
                Some(&FieldUpdate::Replace(map(&[("owner", "ops")]))),
            )
            .await;

        assert_eq!(outcome.failure_kind(), Some(FailureKind::ConcurrencyConflict));
        assert_eq!(outcome.per_step_results.len(), 2);
        assert!(outcome.per_step_results[0].is_success());
        assert_eq!(api.peek(&vm).unwrap().labels, map(&[("env", "prod")]));
        assert_eq!(api.peek(&vm).unwrap().metadata, map(&[("k", "v")]));
    }

    #[tokio::test]
    async fn test_nothing_requested_is_validation() {
        let (api, controller, vm) = setup();
        let outcome = controller.update_mutable_fields(&vm, None, None).await;
        assert_eq!(outcome.failure_kind(), Some(FailureKind::Validation));
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn test_missing_resource() {
        let (api, controller, _) = setup();
        let ghost = ResourceRef::instance("ghost", "us-central1-a".into());
        let outcome = controller
            .update_mutable_fields(&ghost, Some(&FieldUpdate::Merge(Labels::new())), None)
            .await;
        assert_eq!(outcome.failure_kind(), Some(FailureKind::NotFound));
        assert!(api.mutation_calls().is_empty());
    }
}
