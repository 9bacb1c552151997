//! The task orchestrator: one evaluation, start to finish.
//!
//! ```text
//!   PENDING → RETRIEVING_CONTEXT → DISPATCHING → AWAITING_RESPONSE → EVALUATING → COMPLETED
//!             fetch (retried)      discover       dispatch            lookup + score
//! ```
//!
//! The three network-bound steps are the only suspension points. All of them
//! run inside one overall deadline measured from the start of the run; when
//! it fires, the in-flight future is dropped, which cancels the request and
//! throws away anything that arrives afterwards. Dispatch additionally runs
//! under its own response timeout.
//!
//! Every failure ends the task in `FAILED` with exactly one recorded kind.

use std::{sync::Arc, time::Duration};

use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, info, warn};

use assessor_contracts::{
    capability::CapabilitySet,
    error::{AssessorError, AssessorResult, FailureKind},
    task::{DomainContext, Instruction, Task},
};

use crate::{
    registry::TaskHandle,
    retry::RetryPolicy,
    traits::{Evaluator, ReferenceDataClient, ReferenceSolutionProvider, RemoteAgentClient},
};

/// Operations every agent under test must declare before it is instructed.
pub const DEFAULT_REQUIRED_OPERATIONS: [&str; 3] = ["message/send", "input:text", "output:text"];

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Overall budget for a task, unless the request carries its own.
    pub task_deadline: Duration,
    /// How long a single dispatch may wait for the agent's reply.
    pub response_timeout: Duration,
    pub required_operations: CapabilitySet,
    /// Forwarded to the agent when the request does not set one.
    pub interaction_limit: u32,
    /// Data repository address handed to the agent for its own queries.
    pub fhir_callback_url: Option<String>,
    pub retry: RetryPolicy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            task_deadline: Duration::from_secs(300),
            response_timeout: Duration::from_secs(240),
            required_operations: DEFAULT_REQUIRED_OPERATIONS.into_iter().collect(),
            interaction_limit: 8,
            fhir_callback_url: None,
            retry: RetryPolicy::default(),
        }
    }
}

/// Drives tasks through their lifecycle.
///
/// Cheap to clone; the collaborators are shared. They are also shared by
/// every task in flight, which is why the traits demand `Send + Sync` and
/// no per-task state.
#[derive(Clone)]
pub struct TaskOrchestrator {
    data: Arc<dyn ReferenceDataClient>,
    solutions: Arc<dyn ReferenceSolutionProvider>,
    agent: Arc<dyn RemoteAgentClient>,
    evaluator: Arc<dyn Evaluator>,
    config: OrchestratorConfig,
}

impl TaskOrchestrator {
    pub fn new(
        data: Arc<dyn ReferenceDataClient>,
        solutions: Arc<dyn ReferenceSolutionProvider>,
        agent: Arc<dyn RemoteAgentClient>,
        evaluator: Arc<dyn Evaluator>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            data,
            solutions,
            agent,
            evaluator,
            config,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Run the task owned by `handle` to a terminal state and return it.
    ///
    /// Never returns a non-terminal task and never returns an error: every
    /// failure is recorded on the task itself.
    pub async fn run(&self, mut handle: TaskHandle) -> Task {
        let budget = handle
            .task()
            .request
            .deadline_ms
            .map(Duration::from_millis)
            .unwrap_or(self.config.task_deadline);
        let deadline = Instant::now() + budget;
        let task_id = handle.id().clone();

        info!(
            task_id = %task_id,
            family = %handle.task().request.task_family,
            endpoint = %handle.task().agent_endpoint,
            deadline_ms = budget.as_millis() as u64,
            "task started"
        );

        let failure = match timeout_at(deadline, self.drive(&mut handle)).await {
            Ok(Ok(())) => None,
            Ok(Err(err)) => Some(err),
            Err(_) => Some(AssessorError::TaskDeadlineExceeded {
                deadline_ms: budget.as_millis() as u64,
            }),
        };

        if let Some(err) = failure {
            let kind = err.kind().unwrap_or(FailureKind::EvaluatorInternalError);
            warn!(
                task_id = %task_id,
                state = %handle.task().state,
                kind = %kind,
                error = %err,
                "task failed"
            );
            if let Err(refused) = handle.update(|t| t.fail(kind, err.to_string())) {
                warn!(task_id = %task_id, error = %refused, "could not record failure");
            }
        } else if let Some(verdict) = &handle.task().verdict {
            info!(
                task_id = %task_id,
                score = verdict.score,
                passed = verdict.passed,
                "task completed"
            );
        }

        handle.into_task()
    }

    async fn drive(&self, handle: &mut TaskHandle) -> AssessorResult<()> {
        let task_id = handle.id().clone();
        let retry = &self.config.retry;

        // ── Step 1: Retrieve domain context ──────────────────────────────────
        handle.update(Task::begin_retrieval)?;
        let scope = handle.task().request.data_scope.clone();
        debug!(task_id = %task_id, records = scope.records.len(), "retrieving context");

        let data = self.data.as_ref();
        let scope_ref = &scope;
        let context = retry
            .run("fetch_context", &task_id, || async move { data.fetch(scope_ref).await })
            .await?;
        if context.records.len() != scope.records.len() {
            return Err(AssessorError::DataUnavailable {
                reason: format!(
                    "scope declared {} records, repository returned {}",
                    scope.records.len(),
                    context.records.len()
                ),
                transient: false,
            });
        }

        let instruction = self.formulate(handle.task(), &context);
        handle.update(|t| t.record_context(context, instruction))?;

        // ── Step 2: Discovery and capability check ───────────────────────────
        let endpoint = handle.task().agent_endpoint.clone();
        debug!(task_id = %task_id, endpoint = %endpoint, "discovering agent");

        let agent = self.agent.as_ref();
        let endpoint_ref = endpoint.as_str();
        let descriptor = retry
            .run("discover", &task_id, || async move { agent.discover(endpoint_ref).await })
            .await?;

        let missing = descriptor.operations.missing(&self.config.required_operations);
        if !missing.is_empty() {
            return Err(AssessorError::AgentIncompatible {
                missing: missing.into_iter().map(|c| c.0).collect(),
            });
        }
        let dispatch_to = descriptor.endpoint.clone();
        handle.update(|t| t.record_dispatch(descriptor))?;

        // ── Step 3: Dispatch and await the reply ─────────────────────────────
        let instruction = handle
            .task()
            .instruction
            .clone()
            .ok_or_else(|| AssessorError::IllegalTransition {
                from: handle.task().state.to_string(),
                to: "dispatch without instruction".to_string(),
            })?;
        let response_timeout = self.config.response_timeout;
        let dispatch_ref = dispatch_to.as_str();
        let instruction_ref = &instruction;
        debug!(
            task_id = %task_id,
            endpoint = %dispatch_to,
            timeout_ms = response_timeout.as_millis() as u64,
            "dispatching instruction"
        );

        let response = retry
            .run("dispatch", &task_id, || async move {
                match timeout(
                    response_timeout,
                    agent.dispatch(dispatch_ref, instruction_ref, response_timeout),
                )
                .await
                {
                    Ok(result) => result,
                    Err(_) => Err(AssessorError::AgentTimeout {
                        endpoint: dispatch_ref.to_string(),
                        waited_ms: response_timeout.as_millis() as u64,
                    }),
                }
            })
            .await?;
        handle.update(|t| t.record_response(response))?;

        // ── Step 4: Evaluate ─────────────────────────────────────────────────
        let family = handle.task().request.task_family.clone();
        let solution = self.solutions.lookup(&family)?;
        let verdict = match &handle.task().response {
            Some(response) => self.evaluator.evaluate(&task_id, response, &solution)?,
            None => {
                return Err(AssessorError::EvaluatorInternalError {
                    reason: "no response recorded".to_string(),
                })
            }
        };
        debug!(task_id = %task_id, rule = %solution.rule, score = verdict.score, "scored response");
        handle.update(|t| t.complete(verdict))?;

        Ok(())
    }

    /// Combine the request with the retrieved context.
    fn formulate(&self, task: &Task, context: &DomainContext) -> Instruction {
        let request = &task.request;
        let text = request
            .prompt
            .clone()
            .or_else(|| self.solutions.prompt_for(&request.task_family))
            .unwrap_or_else(|| {
                format!(
                    "Complete task '{}' using the supplied records and reply with FINISH(answer).",
                    request.task_family
                )
            });

        Instruction {
            task_id: task.id.clone(),
            task_family: request.task_family.clone(),
            instruction: text,
            system_context: context.to_value(),
            fhir_base_url: self.config.fhir_callback_url.clone(),
            interaction_limit: request
                .interaction_limit
                .unwrap_or(self.config.interaction_limit),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use assessor_contracts::{
        error::FailureKind,
        task::{TaskRequest, TaskState},
    };

    use crate::{
        fakes::{
            AgentBehavior, ExactAnswerEvaluator, FakeAgentClient, FakeDataClient,
            FixedSolutionProvider, ScriptedAgent,
        },
        registry::TaskRegistry,
    };

    use super::{OrchestratorConfig, TaskOrchestrator};

    const AGENT: &str = "http://purple.local:9009";

    fn solutions() -> FixedSolutionProvider {
        FixedSolutionProvider::new()
            .with_exact("task1_1", "S6534835", Some("Find the MRN for Peter Stafford."))
    }

    fn data() -> FakeDataClient {
        FakeDataClient::new().with_record(
            "Patient",
            "S6534835",
            serde_json::json!({ "resourceType": "Patient", "id": "S6534835" }),
        )
    }

    fn config() -> OrchestratorConfig {
        OrchestratorConfig {
            task_deadline: Duration::from_secs(30),
            response_timeout: Duration::from_secs(5),
            ..OrchestratorConfig::default()
        }
    }

    fn orchestrator(
        data: FakeDataClient,
        agent: Arc<FakeAgentClient>,
        config: OrchestratorConfig,
    ) -> TaskOrchestrator {
        TaskOrchestrator::new(
            Arc::new(data),
            Arc::new(solutions()),
            agent,
            Arc::new(ExactAnswerEvaluator),
            config,
        )
    }

    fn answering(answer: &str) -> Arc<FakeAgentClient> {
        Arc::new(FakeAgentClient::new().with_agent(AGENT, ScriptedAgent::answering(answer)))
    }

    fn request() -> TaskRequest {
        TaskRequest::new("task1_1", AGENT)
            .with_task_id("t-1")
            .with_record("Patient", "S6534835")
    }

    #[tokio::test(start_paused = true)]
    async fn happy_path_visits_every_state_once() {
        let agent = answering("S6534835");
        let orch = orchestrator(data(), agent.clone(), config());
        let registry = TaskRegistry::new();

        let task = orch.run(registry.create(request()).unwrap()).await;

        let states: Vec<TaskState> = task.history.iter().map(|t| t.state).collect();
        assert_eq!(
            states,
            vec![
                TaskState::Pending,
                TaskState::RetrievingContext,
                TaskState::Dispatching,
                TaskState::AwaitingResponse,
                TaskState::Evaluating,
                TaskState::Completed,
            ]
        );
        let verdict = task.verdict.as_ref().unwrap();
        assert!(verdict.passed);
        assert_eq!(task.context.records.len(), 1);
        assert!(task.capabilities.is_some());

        // The registry saw the same final state.
        assert_eq!(registry.get(&task.id).unwrap().state, TaskState::Completed);

        let sent = agent.dispatched();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].instruction, "Find the MRN for Peter Stafford.");
        assert_eq!(sent[0].interaction_limit, 8);
    }

    #[tokio::test(start_paused = true)]
    async fn wrong_answer_still_completes_with_zero_score() {
        let agent = answering("S0000000");
        let orch = orchestrator(data(), agent, config());

        let task = orch.run(TaskRegistry::new().create(request()).unwrap()).await;

        assert_eq!(task.state, TaskState::Completed);
        let verdict = task.verdict.unwrap();
        assert!(!verdict.passed);
        assert_eq!(verdict.score, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn dispatch_timeout_fails_task_and_discards_late_reply() {
        let slow = ScriptedAgent::answering("S6534835").delayed(Duration::from_secs(10));
        let agent = Arc::new(FakeAgentClient::new().with_agent(AGENT, slow));
        let cfg = OrchestratorConfig {
            response_timeout: Duration::from_secs(2),
            ..config()
        };
        let orch = orchestrator(data(), agent.clone(), cfg);
        let registry = TaskRegistry::new();

        let task = orch.run(registry.create(request()).unwrap()).await;

        assert_eq!(task.state, TaskState::Failed);
        assert_eq!(task.failure.as_ref().unwrap().kind, FailureKind::AgentTimeout);
        assert!(task.response.is_none());
        assert!(task.verdict.is_none());

        // Let the agent's reply "arrive" long after cancellation.
        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(agent.replies_delivered(), 0);
        let snapshot = registry.get(&task.id).unwrap();
        assert_eq!(snapshot.state, TaskState::Failed);
        assert!(snapshot.response.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn overall_deadline_cancels_slow_retrieval() {
        let agent = answering("S6534835");
        let slow_data = data().delayed(Duration::from_secs(60));
        let orch = orchestrator(slow_data, agent.clone(), config());

        let task = orch.run(TaskRegistry::new().create(request()).unwrap()).await;

        assert_eq!(task.state, TaskState::Failed);
        assert_eq!(
            task.failure.unwrap().kind,
            FailureKind::TaskDeadlineExceeded
        );
        assert!(agent.dispatched().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn transient_data_failures_are_retried() {
        let agent = answering("S6534835");
        let flaky = data().failing_first(2);
        let orch = orchestrator(flaky, agent, config());

        let task = orch.run(TaskRegistry::new().create(request()).unwrap()).await;

        assert_eq!(task.state, TaskState::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_record_fails_with_data_unavailable() {
        let agent = answering("S6534835");
        let orch = orchestrator(FakeDataClient::new(), agent, config());

        let task = orch.run(TaskRegistry::new().create(request()).unwrap()).await;

        assert_eq!(task.failure.unwrap().kind, FailureKind::DataUnavailable);
        assert_eq!(task.history.last().unwrap().state, TaskState::Failed);
        assert_eq!(task.history[task.history.len() - 2].state, TaskState::RetrievingContext);
    }

    #[tokio::test(start_paused = true)]
    async fn extra_records_from_repository_fail_with_data_unavailable() {
        let agent = answering("S6534835");
        let padded = data().with_unrequested(
            "Observation",
            "obs-unasked",
            serde_json::json!({ "resourceType": "Observation", "id": "obs-unasked" }),
        );
        let orch = orchestrator(padded, agent.clone(), config());

        let task = orch.run(TaskRegistry::new().create(request()).unwrap()).await;

        assert_eq!(task.state, TaskState::Failed);
        let failure = task.failure.unwrap();
        assert_eq!(failure.kind, FailureKind::DataUnavailable);
        assert!(failure.message.contains("declared 1 records"));
        assert!(task.context.is_empty());
        assert_eq!(agent.discoveries(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn overall_deadline_cuts_dispatch_short_of_response_timeout() {
        let slow = ScriptedAgent::answering("S6534835").delayed(Duration::from_secs(20));
        let agent = Arc::new(FakeAgentClient::new().with_agent(AGENT, slow));
        let cfg = OrchestratorConfig {
            task_deadline: Duration::from_secs(3),
            response_timeout: Duration::from_secs(10),
            ..config()
        };
        let orch = orchestrator(data(), agent.clone(), cfg);
        let registry = TaskRegistry::new();

        let task = orch.run(registry.create(request()).unwrap()).await;

        assert_eq!(task.state, TaskState::Failed);
        assert_eq!(task.failure.as_ref().unwrap().kind, FailureKind::TaskDeadlineExceeded);
        assert!(task.response.is_none());
        assert_eq!(agent.dispatched().len(), 1);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(agent.replies_delivered(), 0);
        assert!(registry.get(&task.id).unwrap().response.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn capability_mismatch_fails_before_dispatch() {
        let limited = ScriptedAgent::answering("S6534835").with_operations(&["message/send"]);
        let agent = Arc::new(FakeAgentClient::new().with_agent(AGENT, limited));
        let orch = orchestrator(data(), agent.clone(), config());

        let task = orch.run(TaskRegistry::new().create(request()).unwrap()).await;

        let failure = task.failure.unwrap();
        assert_eq!(failure.kind, FailureKind::AgentIncompatible);
        assert!(failure.message.contains("output:text"));
        assert!(agent.dispatched().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_agent_is_unreachable_after_retries() {
        let agent = Arc::new(FakeAgentClient::new());
        let orch = orchestrator(data(), agent.clone(), config());

        let task = orch.run(TaskRegistry::new().create(request()).unwrap()).await;

        assert_eq!(task.failure.unwrap().kind, FailureKind::AgentUnreachable);
        assert_eq!(agent.discoveries(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_reply_is_a_protocol_error() {
        let broken = ScriptedAgent::new(AgentBehavior::Malformed("missing result".to_string()));
        let agent = Arc::new(FakeAgentClient::new().with_agent(AGENT, broken));
        let orch = orchestrator(data(), agent, config());

        let task = orch.run(TaskRegistry::new().create(request()).unwrap()).await;

        assert_eq!(task.failure.unwrap().kind, FailureKind::AgentProtocolError);
        assert!(task.response.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_family_fails_in_evaluation() {
        let agent = answering("42");
        let orch = orchestrator(data(), agent, config());
        let req = TaskRequest::new("task9_9", AGENT).with_record("Patient", "S6534835");

        let task = orch.run(TaskRegistry::new().create(req).unwrap()).await;

        assert_eq!(task.failure.unwrap().kind, FailureKind::SolutionMissing);
        // The response was kept; only the verdict is absent.
        assert!(task.response.is_some());
        assert!(task.verdict.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn request_overrides_prompt_and_interaction_limit() {
        let agent = answering("S6534835");
        let orch = orchestrator(data(), agent.clone(), config());
        let mut req = request().with_prompt("Custom prompt");
        req.interaction_limit = Some(3);

        orch.run(TaskRegistry::new().create(req).unwrap()).await;

        let sent = agent.dispatched();
        assert_eq!(sent[0].instruction, "Custom prompt");
        assert_eq!(sent[0].interaction_limit, 3);
        assert_eq!(sent[0].system_context[0]["id"], "S6534835");
    }
}
