//! Multi-step mutation workflows
//!
//! A [`Workflow`] is an ordered list of [`WorkflowStep`]s against one target.
//! [`WorkflowOrchestrator::run_workflow`] executes them strictly in order,
//! polls the remote side between steps when the step is a `WaitUntil`, and
//! stops at the first failure without compensating earlier steps.

use gcpflow_cloud::{
    AttachOptions, CloudError, ComputeApi, DiskSpec, FailureKind, OperationOutcome, ResourceRef,
    ResourceStatus, Result, UpdateFields,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::OwnedMutexGuard;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(300);

/// One step of a workflow
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowStep {
    Stop,
    /// Poll `resource` until it reports `state`
    WaitUntil {
        resource: ResourceRef,
        state: ResourceStatus,
        /// Overrides the orchestrator's default timeout
        timeout: Option<Duration>,
    },
    Update(UpdateFields),
    Start,
    CreateSubResource(DiskSpec),
    AttachSubResource {
        disk: ResourceRef,
        options: AttachOptions,
    },
}

impl WorkflowStep {
    pub fn wait_until(resource: ResourceRef, state: ResourceStatus) -> Self {
        WorkflowStep::WaitUntil {
            resource,
            state,
            timeout: None,
        }
    }

    /// Label recorded in `per_step_results`
    pub fn label(&self) -> String {
        match self {
            WorkflowStep::Stop => "stop".to_string(),
            WorkflowStep::WaitUntil { state, .. } => format!("wait_until:{}", state),
            WorkflowStep::Update(_) => "update".to_string(),
            WorkflowStep::Start => "start".to_string(),
            WorkflowStep::CreateSubResource(_) => "create_disk".to_string(),
            WorkflowStep::AttachSubResource { .. } => "attach_disk".to_string(),
        }
    }
}

/// Ordered steps toward one goal on one target resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workflow {
    pub goal: String,
    pub target: ResourceRef,
    pub steps: Vec<WorkflowStep>,
}

impl Workflow {
    pub fn new(goal: impl Into<String>, target: ResourceRef, steps: Vec<WorkflowStep>) -> Self {
        Self {
            goal: goal.into(),
            target,
            steps,
        }
    }

    /// Stop → wait for TERMINATED → start
    pub fn restart(target: ResourceRef) -> Self {
        let wait = WorkflowStep::wait_until(target.clone(), ResourceStatus::Terminated);
        Self::new(
            "restart",
            target,
            vec![WorkflowStep::Stop, wait, WorkflowStep::Start],
        )
    }

    /// Stop → wait for TERMINATED → update → start
    pub fn modify_with_restart(target: ResourceRef, fields: UpdateFields) -> Self {
        let wait = WorkflowStep::wait_until(target.clone(), ResourceStatus::Terminated);
        Self::new(
            "modify",
            target,
            vec![
                WorkflowStep::Stop,
                wait,
                WorkflowStep::Update(fields),
                WorkflowStep::Start,
            ],
        )
    }

    /// Create disk → wait for READY → attach to `target`
    pub fn disk_provision_and_attach(
        target: ResourceRef,
        disk: DiskSpec,
        options: AttachOptions,
    ) -> Self {
        let disk_ref = disk.resource_ref();
        Self::new(
            "provision disk",
            target,
            vec![
                WorkflowStep::CreateSubResource(disk),
                WorkflowStep::wait_until(disk_ref.clone(), ResourceStatus::Ready),
                WorkflowStep::AttachSubResource {
                    disk: disk_ref,
                    options,
                },
            ],
        )
    }
}

/// Polling parameters for `WaitUntil` steps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_POLL_TIMEOUT,
        }
    }
}

/// Per-resource async locks
///
/// Two workflows on the same resource run one after the other; workflows on
/// different resources never contend.
#[derive(Clone, Default)]
pub struct ResourceLocks {
    inner: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
}

impl ResourceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, target: &ResourceRef) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self
                .inner
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            // Drop entries nobody holds or waits on
            map.retain(|_, l| Arc::strong_count(l) > 1);
            map.entry(target.key()).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Number of resources currently locked or awaited
    pub fn active(&self) -> usize {
        let map = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        map.values().filter(|l| Arc::strong_count(l) > 1).count()
    }
}

/// Executes workflows against a [`ComputeApi`]
pub struct WorkflowOrchestrator {
    api: Arc<dyn ComputeApi>,
    poll: PollConfig,
    locks: ResourceLocks,
}

impl WorkflowOrchestrator {
    pub fn new(api: Arc<dyn ComputeApi>, poll: PollConfig) -> Self {
        Self {
            api,
            poll,
            locks: ResourceLocks::new(),
        }
    }

    /// Share locks with another orchestrator in the same process
    pub fn with_locks(mut self, locks: ResourceLocks) -> Self {
        self.locks = locks;
        self
    }

    pub fn poll_config(&self) -> PollConfig {
        self.poll
    }

    pub async fn run_workflow(
        &self,
        workflow: &Workflow,
        cancel: &CancellationToken,
    ) -> OperationOutcome {
        let _guard = tokio::select! {
            guard = self.locks.acquire(&workflow.target) => guard,
            _ = cancel.cancelled() => {
                return OperationOutcome::rejected(
                    FailureKind::Cancelled,
                    format!("{} of {} cancelled before it started", workflow.goal, workflow.target),
                );
            }
        };

        info!(
            goal = %workflow.goal,
            target = %workflow.target,
            steps = workflow.steps.len(),
            "starting workflow"
        );

        let mut steps: Vec<OperationOutcome> = Vec::with_capacity(workflow.steps.len());
        for step in &workflow.steps {
            let label = step.label();
            info!("{}: step '{}'", workflow.target, label);

            match self.run_step(workflow, step, cancel).await {
                Ok(outcome) => steps.push(outcome.with_step(label)),
                Err(err) => {
                    match FailureKind::from(&err) {
                        FailureKind::Timeout | FailureKind::Cancelled | FailureKind::NotFound => {
                            warn!("{}: step '{}' failed: {}", workflow.target, label, err)
                        }
                        _ => error!("{}: step '{}' failed: {}", workflow.target, label, err),
                    }
                    steps.push(OperationOutcome::failed(&label, &err).with_step(label.clone()));
                    return OperationOutcome::failed(
                        format!(
                            "{} of {} aborted at step '{}' after {} completed step(s)",
                            workflow.goal,
                            workflow.target,
                            label,
                            steps.len() - 1
                        ),
                        &err,
                    )
                    .with_steps(steps);
                }
            }
        }

        let status = steps
            .last()
            .map(|s| s.status.clone())
            .unwrap_or_else(|| gcpflow_cloud::outcome::STATUS_OK.to_string());
        let operation_id = steps
            .iter()
            .rev()
            .map(|s| s.remote_operation_id.as_str())
            .find(|id| !id.is_empty())
            .unwrap_or_default()
            .to_string();

        info!(goal = %workflow.goal, target = %workflow.target, "workflow completed");
        let mut outcome = OperationOutcome::observed(
            status,
            format!("{} of {} completed", workflow.goal, workflow.target),
        );
        outcome.remote_operation_id = operation_id;
        outcome.with_steps(steps)
    }

    async fn run_step(
        &self,
        workflow: &Workflow,
        step: &WorkflowStep,
        cancel: &CancellationToken,
    ) -> Result<OperationOutcome> {
        let target = &workflow.target;
        match step {
            WorkflowStep::Stop => {
                let handle = self.api.stop_resource(target).await?;
                Ok(OperationOutcome::accepted(
                    &handle,
                    format!("Stop requested for {}", target),
                ))
            }
            WorkflowStep::Start => {
                let handle = self.api.start_resource(target).await?;
                Ok(OperationOutcome::accepted(
                    &handle,
                    format!("Start requested for {}", target),
                ))
            }
            WorkflowStep::Update(fields) => {
                let handle = self.api.update_resource(target, fields).await?;
                Ok(OperationOutcome::accepted(
                    &handle,
                    format!("Update requested for {}", target),
                ))
            }
            WorkflowStep::WaitUntil {
                resource,
                state,
                timeout,
            } => {
                let reached = self
                    .wait_until(resource, *state, timeout.unwrap_or(self.poll.timeout), cancel)
                    .await?;
                Ok(OperationOutcome::observed(
                    reached,
                    format!("{} reached {}", resource, reached),
                ))
            }
            WorkflowStep::CreateSubResource(disk) => {
                let handle = self.api.create_sub_resource(disk).await?;
                Ok(OperationOutcome::accepted(
                    &handle,
                    format!("Creation requested for {}", disk.resource_ref()),
                ))
            }
            WorkflowStep::AttachSubResource { disk, options } => {
                let handle = self.api.attach_sub_resource(target, disk, options).await?;
                Ok(OperationOutcome::accepted(
                    &handle,
                    format!("Attach of {} requested for {}", disk, target),
                ))
            }
        }
    }

    /// Poll until `resource` reports `state`, the deadline passes, or `cancel` fires
    async fn wait_until(
        &self,
        resource: &ResourceRef,
        state: ResourceStatus,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<ResourceStatus> {
        // None when the timeout is too large to represent: wait without a deadline
        let deadline = Instant::now().checked_add(timeout);
        loop {
            if cancel.is_cancelled() {
                return Err(CloudError::Cancelled(format!(
                    "waiting for {} to reach {}",
                    resource, state
                )));
            }

            let current = self
                .api
                .get_resource(resource)
                .await?
                .ok_or_else(|| {
                    CloudError::NotFound(format!("{} disappeared while waiting for {}", resource, state))
                })?;
            debug!("poll {}: {} (want {})", resource, current.status, state);

            if current.status == state {
                return Ok(current.status);
            }
            if current.status == ResourceStatus::Error {
                return Err(CloudError::Api(format!(
                    "{} entered ERROR while waiting for {}",
                    resource, state
                )));
            }

            let nap = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(CloudError::Timeout(format!(
                            "{} did not reach {} within {:?} (last status {})",
                            resource, state, timeout, current.status
                        )));
                    }
                    self.poll.interval.min(deadline - now)
                }
                None => self.poll.interval,
            };
            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(CloudError::Cancelled(format!(
                        "waiting for {} to reach {}",
                        resource, state
                    )));
                }
                _ = tokio::time::sleep(nap) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gcpflow_cloud::{Location, MemoryCompute};

    fn fast() -> PollConfig {
        PollConfig {
            interval: Duration::from_millis(5),
            timeout: Duration::from_secs(5),
        }
    }

    fn zone() -> Location {
        Location::resolve("us-central1-a")
    }

    #[test]
    fn test_workflow_shapes() {
        let vm = ResourceRef::instance("web-1", zone());
        let labels: Vec<String> = Workflow::restart(vm.clone())
            .steps
            .iter()
            .map(WorkflowStep::label)
            .collect();
        assert_eq!(labels, vec!["stop", "wait_until:TERMINATED", "start"]);

        let modify = Workflow::modify_with_restart(vm.clone(), UpdateFields::machine_type("e2-small"));
        assert_eq!(modify.steps.len(), 4);
        assert_eq!(modify.steps[2], WorkflowStep::Update(UpdateFields::machine_type("e2-small")));

        let disk = DiskSpec::new("data-1", zone(), 50);
        let provision = Workflow::disk_provision_and_attach(vm, disk.clone(), AttachOptions::default());
        assert_eq!(
            provision.steps[1],
            WorkflowStep::wait_until(disk.resource_ref(), ResourceStatus::Ready)
        );
    }

    #[tokio::test]
    async fn test_restart_runs_steps_in_order() {
        let api = Arc::new(MemoryCompute::new().with_settle_reads(3));
        let vm = api.insert_instance("web-1", "us-central1-a", ResourceStatus::Running);
        let orchestrator = WorkflowOrchestrator::new(api.clone(), fast());

        let outcome = orchestrator
            .run_workflow(&Workflow::restart(vm.clone()), &CancellationToken::new())
            .await;

        assert!(outcome.is_success(), "{}", outcome);
        assert_eq!(outcome.step_labels(), vec!["stop", "wait_until:TERMINATED", "start"]);
        let mutations: Vec<_> = api.mutation_calls().into_iter().map(|c| c.verb).collect();
        assert_eq!(mutations, vec!["stop_resource", "start_resource"]);
        // Start only after TERMINATED was observed
        let verbs = api.verbs();
        let start_at = verbs.iter().position(|v| *v == "start_resource").unwrap();
        assert!(verbs[..start_at].iter().filter(|v| **v == "get_resource").count() >= 3);
    }

    #[tokio::test]
    async fn test_failed_stop_aborts() {
        let api = Arc::new(MemoryCompute::new());
        let vm = api.insert_instance("web-1", "us-central1-a", ResourceStatus::Running);
        api.fail_next("stop_resource", "quota exceeded");
        let orchestrator = WorkflowOrchestrator::new(api.clone(), fast());

        let outcome = orchestrator
            .run_workflow(&Workflow::restart(vm), &CancellationToken::new())
            .await;

        assert_eq!(outcome.failure_kind(), Some(FailureKind::RemoteCallFailure));
        assert_eq!(outcome.per_step_results.len(), 1);
        assert!(!api.verbs().contains(&"start_resource"));
    }

    #[tokio::test]
    async fn test_failed_update_keeps_partial_results_without_compensation() {
        let api = Arc::new(MemoryCompute::new());
        let vm = api.insert_instance("web-1", "us-central1-a", ResourceStatus::Running);
        api.fail_next("update_resource", "invalid machine type");
        let orchestrator = WorkflowOrchestrator::new(api.clone(), fast());

        let outcome = orchestrator
            .run_workflow(
                &Workflow::modify_with_restart(vm.clone(), UpdateFields::machine_type("bogus")),
                &CancellationToken::new(),
            )
            .await;

        assert!(!outcome.is_success());
        assert_eq!(outcome.step_labels(), vec!["stop", "wait_until:TERMINATED", "update"]);
        assert!(outcome.per_step_results[..2].iter().all(|s| s.is_success()));
        // Left stopped, never restarted
        assert_eq!(api.peek(&vm).unwrap().status, ResourceStatus::Terminated);
        assert!(!api.verbs().contains(&"start_resource"));
    }

    #[tokio::test]
    async fn test_wait_times_out() {
        let api = Arc::new(MemoryCompute::new());
        let vm = api.insert_instance("web-1", "us-central1-a", ResourceStatus::Stopping);
        api.freeze(&vm);
        let orchestrator = WorkflowOrchestrator::new(
            api.clone(),
            PollConfig {
                interval: Duration::from_millis(5),
                timeout: Duration::from_millis(40),
            },
        );
        let workflow = Workflow::new(
            "wait",
            vm.clone(),
            vec![WorkflowStep::wait_until(vm, ResourceStatus::Terminated)],
        );

        let outcome = orchestrator.run_workflow(&workflow, &CancellationToken::new()).await;
        assert_eq!(outcome.failure_kind(), Some(FailureKind::Timeout));
    }

    #[tokio::test]
    async fn test_step_timeout_overrides_default() {
        let api = Arc::new(MemoryCompute::new());
        let vm = api.insert_instance("web-1", "us-central1-a", ResourceStatus::Stopping);
        api.freeze(&vm);
        let orchestrator = WorkflowOrchestrator::new(
            api.clone(),
            PollConfig {
                interval: Duration::from_millis(5),
                timeout: Duration::from_secs(3600),
            },
        );
        let workflow = Workflow::new(
            "wait",
            vm.clone(),
            vec![WorkflowStep::WaitUntil {
                resource: vm,
                state: ResourceStatus::Terminated,
                timeout: Some(Duration::from_millis(20)),
            }],
        );

        let outcome = tokio::time::timeout(
            Duration::from_secs(5),
            orchestrator.run_workflow(&workflow, &CancellationToken::new()),
        )
        .await
        .expect("step timeout should end the wait");
        assert_eq!(outcome.failure_kind(), Some(FailureKind::Timeout));
    }

    #[tokio::test]
    async fn test_unbounded_timeout_still_completes() {
        let api = Arc::new(MemoryCompute::new().with_settle_reads(2));
        let vm = api.insert_instance("web-1", "us-central1-a", ResourceStatus::Running);
        let orchestrator = WorkflowOrchestrator::new(
            api.clone(),
            PollConfig {
                interval: Duration::from_millis(5),
                timeout: Duration::from_secs(u64::MAX),
            },
        );

        let outcome = orchestrator
            .run_workflow(&Workflow::restart(vm.clone()), &CancellationToken::new())
            .await;

        assert!(outcome.is_success(), "{}", outcome);
        assert_eq!(outcome.step_labels(), vec!["stop", "wait_until:TERMINATED", "start"]);
    }

    #[tokio::test]
    async fn test_wait_is_cancellable() {
        let api = Arc::new(MemoryCompute::new());
        let vm = api.insert_instance("web-1", "us-central1-a", ResourceStatus::Running);
        let orchestrator = WorkflowOrchestrator::new(
            api.clone(),
            PollConfig {
                interval: Duration::from_millis(5),
                timeout: Duration::from_secs(3600),
            },
        );
        api.freeze(&vm);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            trigger.cancel();
        });

        let outcome = orchestrator.run_workflow(&Workflow::restart(vm), &cancel).await;

        assert_eq!(outcome.failure_kind(), Some(FailureKind::Cancelled));
        assert_eq!(outcome.step_labels(), vec!["stop", "wait_until:TERMINATED"]);
        assert!(!api.verbs().contains(&"start_resource"));
    }

    #[tokio::test]
    async fn test_vanished_resource_is_not_found() {
        let api = Arc::new(MemoryCompute::new());
        let orchestrator = WorkflowOrchestrator::new(api.clone(), fast());
        let disk = ResourceRef::disk("ghost", zone());
        let workflow = Workflow::new(
            "wait",
            disk.clone(),
            vec![WorkflowStep::wait_until(disk, ResourceStatus::Ready)],
        );

        let outcome = orchestrator.run_workflow(&workflow, &CancellationToken::new()).await;
        assert_eq!(outcome.failure_kind(), Some(FailureKind::NotFound));
    }

    #[tokio::test]
    async fn test_disk_provision_and_attach() {
        let api = Arc::new(MemoryCompute::new().with_settle_reads(2));
        let vm = api.insert_instance("web-1", "us-central1-a", ResourceStatus::Running);
        let orchestrator = WorkflowOrchestrator::new(api.clone(), fast());
        let disk = DiskSpec::new("data-1", zone(), 20);

        let outcome = orchestrator
            .run_workflow(
                &Workflow::disk_provision_and_attach(vm.clone(), disk, AttachOptions::default()),
                &CancellationToken::new(),
            )
            .await;

        assert!(outcome.is_success(), "{}", outcome);
        let mutations: Vec<_> = api.mutation_calls().into_iter().map(|c| c.verb).collect();
        assert_eq!(mutations, vec!["create_sub_resource", "attach_sub_resource"]);
        let disks: Vec<serde_json::Value> = api.peek(&vm).unwrap().get_attribute("disks").unwrap();
        assert_eq!(disks.len(), 1);
    }

    #[tokio::test]
    async fn test_same_resource_workflows_are_serialized() {
        let api = Arc::new(MemoryCompute::new().with_settle_reads(2));
        let vm = api.insert_instance("web-1", "us-central1-a", ResourceStatus::Running);
        let orchestrator = Arc::new(WorkflowOrchestrator::new(api.clone(), fast()));

        let a = {
            let orchestrator = orchestrator.clone();
            let vm = vm.clone();
            tokio::spawn(async move {
                orchestrator
                    .run_workflow(&Workflow::restart(vm), &CancellationToken::new())
                    .await
            })
        };
        let b = {
            let orchestrator = orchestrator.clone();
            let vm = vm.clone();
            tokio::spawn(async move {
                orchestrator
                    .run_workflow(&Workflow::restart(vm), &CancellationToken::new())
                    .await
            })
        };
        assert!(a.await.unwrap().is_success());
        assert!(b.await.unwrap().is_success());

        let mutations: Vec<_> = api.mutation_calls().into_iter().map(|c| c.verb).collect();
        assert_eq!(
            mutations,
            vec!["stop_resource", "start_resource", "stop_resource", "start_resource"]
        );
        assert_eq!(orchestrator.locks.active(), 0);
    }
}
