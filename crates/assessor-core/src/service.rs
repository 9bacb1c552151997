//! The caller-facing surface: submit, poll, evaluate, release.
//!
//! `AssessmentService` pairs a [`TaskRegistry`] with a [`TaskOrchestrator`].
//! Each submitted task runs on its own tokio task; the registry is the only
//! thing they share.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use assessor_contracts::{
    capability::AgentCapabilityDescriptor,
    error::{AssessorError, AssessorResult},
    task::{Task, TaskId, TaskOutcome, TaskRequest},
    verdict::{family_name, BatchFailure, BatchSummary},
};

use crate::{orchestrator::TaskOrchestrator, registry::TaskRegistry};

#[derive(Clone)]
pub struct AssessmentService {
    registry: Arc<TaskRegistry>,
    orchestrator: TaskOrchestrator,
    descriptor: AgentCapabilityDescriptor,
}

impl AssessmentService {
    /// `descriptor` is this orchestrator's own capability card, returned by
    /// [`AssessmentService::descriptor`].
    pub fn new(orchestrator: TaskOrchestrator, descriptor: AgentCapabilityDescriptor) -> Self {
        Self {
            registry: Arc::new(TaskRegistry::new()),
            orchestrator,
            descriptor,
        }
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    pub fn descriptor(&self) -> &AgentCapabilityDescriptor {
        &self.descriptor
    }

    /// Register the task and start it in the background.
    ///
    /// The join handle resolves to the terminal task. The task stays in the
    /// registry until [`AssessmentService::release`] is called.
    pub fn submit(&self, request: TaskRequest) -> AssessorResult<(TaskId, JoinHandle<Task>)> {
        let handle = self.registry.create(request)?;
        let id = handle.id().clone();
        let orchestrator = self.orchestrator.clone();
        let join = tokio::spawn(async move { orchestrator.run(handle).await });
        Ok((id, join))
    }

    /// Run one request to completion, release it, and return its outcome.
    pub async fn evaluate(&self, request: TaskRequest) -> AssessorResult<TaskOutcome> {
        let handle = self.registry.create(request)?;
        let task = self.orchestrator.run(handle).await;
        self.registry.release(&task.id)?;
        outcome_of(&task)
    }

    /// Snapshot of a registered task.
    pub fn status(&self, id: &TaskId) -> AssessorResult<Task> {
        self.registry.get(id)
    }

    pub fn release(&self, id: &TaskId) -> AssessorResult<Task> {
        self.registry.release(id)
    }

    /// Run every request concurrently and summarize.
    ///
    /// A request that cannot even be registered, or whose task fails, counts
    /// as a failed entry; it never stops the others.
    pub async fn evaluate_batch(&self, requests: Vec<TaskRequest>) -> BatchSummary {
        let total = requests.len();
        let mut running = Vec::with_capacity(total);
        let mut failed = Vec::new();

        for request in requests {
            let family = request.task_family.clone();
            match self.submit(request) {
                Ok((id, join)) => running.push((id, family, join)),
                Err(err) => failed.push(BatchFailure {
                    task_id: TaskId::from("-"),
                    family_name: family_name(&family),
                    family,
                    feedback: err.to_string(),
                    score: 0.0,
                }),
            }
        }

        let mut passed = 0;
        for (id, family, join) in running {
            let entry = match join.await {
                Ok(task) => {
                    if let Err(err) = self.registry.release(&task.id) {
                        warn!(task_id = %task.id, error = %err, "release after batch run failed");
                    }
                    match task.outcome() {
                        Some(TaskOutcome::Verdict(v)) if v.passed => {
                            passed += 1;
                            None
                        }
                        Some(TaskOutcome::Verdict(v)) => Some((v.rationale, v.score)),
                        Some(TaskOutcome::Failure { kind, message, .. }) => {
                            Some((format!("{kind}: {message}"), 0.0))
                        }
                        None => Some(("task did not terminate".to_string(), 0.0)),
                    }
                }
                Err(join_err) => Some((format!("task panicked: {join_err}"), 0.0)),
            };

            if let Some((feedback, score)) = entry {
                failed.push(BatchFailure {
                    task_id: id,
                    family_name: family_name(&family),
                    family,
                    feedback,
                    score,
                });
            }
        }

        let summary = BatchSummary::new(total, passed, failed);
        info!(
            total = summary.total,
            passed = summary.passed,
            score = %summary.score_summary,
            "batch complete"
        );
        summary
    }
}

fn outcome_of(task: &Task) -> AssessorResult<TaskOutcome> {
    task.outcome().ok_or_else(|| AssessorError::IllegalTransition {
        from: task.state.to_string(),
        to: "outcome".to_string(),
    })
}
