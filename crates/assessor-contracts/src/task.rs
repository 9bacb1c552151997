//! The task record and its state machine.
//!
//! A `Task` is one evaluation run from request to verdict or failure. Its
//! state only moves forward:
//!
//! ```text
//! PENDING → RETRIEVING_CONTEXT → DISPATCHING → AWAITING_RESPONSE → EVALUATING → COMPLETED
//!                      └──────────────┴─────────────┴──────────────────┴──────→ FAILED
//! ```
//!
//! Every mutator checks the transition first and only then writes the new
//! state together with the field that step produced, so a rejected call
//! leaves the record untouched.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{
    capability::AgentCapabilityDescriptor,
    error::{AssessorError, AssessorResult, FailureKind},
    verdict::Verdict,
};

/// Unique identifier of a task. Callers may supply their own.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    /// Generate a fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Pending,
    RetrievingContext,
    Dispatching,
    AwaitingResponse,
    Evaluating,
    Completed,
    Failed,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Failed)
    }

    /// The next state on the success path, if any.
    pub fn successor(self) -> Option<TaskState> {
        match self {
            TaskState::Pending => Some(TaskState::RetrievingContext),
            TaskState::RetrievingContext => Some(TaskState::Dispatching),
            TaskState::Dispatching => Some(TaskState::AwaitingResponse),
            TaskState::AwaitingResponse => Some(TaskState::Evaluating),
            TaskState::Evaluating => Some(TaskState::Completed),
            TaskState::Completed | TaskState::Failed => None,
        }
    }

    /// Return true if moving from `self` to `next` is legal.
    ///
    /// Terminal states have no exits. `FAILED` is reachable from every
    /// non-terminal state; otherwise only the direct successor is allowed.
    pub fn can_transition_to(self, next: TaskState) -> bool {
        if self.is_terminal() {
            return false;
        }
        next == TaskState::Failed || self.successor() == Some(next)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskState::Pending => "PENDING",
            TaskState::RetrievingContext => "RETRIEVING_CONTEXT",
            TaskState::Dispatching => "DISPATCHING",
            TaskState::AwaitingResponse => "AWAITING_RESPONSE",
            TaskState::Evaluating => "EVALUATING",
            TaskState::Completed => "COMPLETED",
            TaskState::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

// ── Request ──────────────────────────────────────────────────────────────────

/// A single record the task needs from the data repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordRef {
    /// Resource type, e.g. `"Patient"` or `"Observation"`.
    pub resource_type: String,
    pub id: String,
}

/// The records a task declares it needs. Queries never go beyond this.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataScope {
    #[serde(default)]
    pub records: Vec<RecordRef>,
}

/// An inbound evaluation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRequest {
    /// Caller-supplied id. A fresh one is generated when absent.
    #[serde(default)]
    pub task_id: Option<TaskId>,
    /// Task-family identifier used to look up the reference solution.
    pub task_family: String,
    #[serde(default)]
    pub data_scope: DataScope,
    /// Base address of the agent under test.
    pub agent_endpoint: String,
    /// Instruction text. Falls back to the catalog prompt for the family.
    #[serde(default)]
    pub prompt: Option<String>,
    /// Maximum tool round-trips the agent may take; forwarded verbatim.
    #[serde(default)]
    pub interaction_limit: Option<u32>,
    /// Overall deadline override, in milliseconds from creation.
    #[serde(default)]
    pub deadline_ms: Option<u64>,
}

impl TaskRequest {
    pub fn new(task_family: impl Into<String>, agent_endpoint: impl Into<String>) -> Self {
        Self {
            task_id: None,
            task_family: task_family.into(),
            data_scope: DataScope::default(),
            agent_endpoint: agent_endpoint.into(),
            prompt: None,
            interaction_limit: None,
            deadline_ms: None,
        }
    }

    pub fn with_task_id(mut self, id: impl Into<String>) -> Self {
        self.task_id = Some(TaskId(id.into()));
        self
    }

    pub fn with_record(mut self, resource_type: &str, id: &str) -> Self {
        self.data_scope.records.push(RecordRef {
            resource_type: resource_type.to_string(),
            id: id.to_string(),
        });
        self
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }
}

// ── Produced fields ──────────────────────────────────────────────────────────

/// One record fetched from the data repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainRecord {
    pub resource_type: String,
    pub id: String,
    pub body: Value,
}

/// Everything retrieved for a task, in the order the scope declared it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DomainContext {
    pub records: Vec<DomainRecord>,
}

impl DomainContext {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The record bodies as a JSON array, as handed to the agent.
    pub fn to_value(&self) -> Value {
        Value::Array(self.records.iter().map(|r| r.body.clone()).collect())
    }
}

/// The message sent to the agent under test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    pub task_id: TaskId,
    pub task_family: String,
    pub instruction: String,
    pub system_context: Value,
    /// Data repository address the agent may query on its own.
    pub fhir_base_url: Option<String>,
    pub interaction_limit: u32,
}

impl Instruction {
    pub fn to_payload(&self) -> Value {
        serde_json::json!({
            "task_id": self.task_id,
            "task_family": self.task_family,
            "instruction": self.instruction,
            "system_context": self.system_context,
            "fhir_base_url": self.fhir_base_url,
            "interaction_limit": self.interaction_limit,
        })
    }
}

/// A schema-valid reply from the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResponse {
    /// The full message as received.
    pub raw: Value,
    /// The extracted, cleaned answer text handed to the evaluator.
    pub answer: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub kind: FailureKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub state: TaskState,
    pub at: DateTime<Utc>,
}

/// What the caller receives once a task is terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskOutcome {
    Verdict(Verdict),
    Failure {
        task_id: TaskId,
        kind: FailureKind,
        message: String,
    },
}

// ── Task ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub state: TaskState,
    pub request: TaskRequest,
    pub agent_endpoint: String,
    /// Empty until retrieval finishes.
    pub context: DomainContext,
    /// Discovery result, valid for this task only.
    pub capabilities: Option<AgentCapabilityDescriptor>,
    pub instruction: Option<Instruction>,
    pub response: Option<AgentResponse>,
    /// Present if and only if `state == Completed`.
    pub verdict: Option<Verdict>,
    pub failure: Option<FailureRecord>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub history: Vec<Transition>,
}

impl Task {
    pub fn new(id: TaskId, request: TaskRequest) -> Self {
        let now = Utc::now();
        Self {
            id,
            state: TaskState::Pending,
            agent_endpoint: request.agent_endpoint.clone(),
            request,
            context: DomainContext::default(),
            capabilities: None,
            instruction: None,
            response: None,
            verdict: None,
            failure: None,
            created_at: now,
            updated_at: now,
            history: vec![Transition {
                state: TaskState::Pending,
                at: now,
            }],
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    fn check(&self, next: TaskState) -> AssessorResult<()> {
        if self.state.can_transition_to(next) {
            Ok(())
        } else {
            Err(AssessorError::IllegalTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            })
        }
    }

    fn enter(&mut self, next: TaskState) {
        let now = Utc::now();
        self.state = next;
        self.updated_at = now;
        self.history.push(Transition { state: next, at: now });
    }

    /// PENDING → RETRIEVING_CONTEXT.
    pub fn begin_retrieval(&mut self) -> AssessorResult<()> {
        self.check(TaskState::RetrievingContext)?;
        self.enter(TaskState::RetrievingContext);
        Ok(())
    }

    /// RETRIEVING_CONTEXT → DISPATCHING, storing the context and the
    /// instruction formulated from it.
    pub fn record_context(
        &mut self,
        context: DomainContext,
        instruction: Instruction,
    ) -> AssessorResult<()> {
        self.check(TaskState::Dispatching)?;
        self.context = context;
        self.instruction = Some(instruction);
        self.enter(TaskState::Dispatching);
        Ok(())
    }

    /// DISPATCHING → AWAITING_RESPONSE, storing the accepted descriptor.
    pub fn record_dispatch(&mut self, descriptor: AgentCapabilityDescriptor) -> AssessorResult<()> {
        self.check(TaskState::AwaitingResponse)?;
        self.capabilities = Some(descriptor);
        self.enter(TaskState::AwaitingResponse);
        Ok(())
    }

    /// AWAITING_RESPONSE → EVALUATING.
    pub fn record_response(&mut self, response: AgentResponse) -> AssessorResult<()> {
        self.check(TaskState::Evaluating)?;
        self.response = Some(response);
        self.enter(TaskState::Evaluating);
        Ok(())
    }

    /// EVALUATING → COMPLETED.
    pub fn complete(&mut self, verdict: Verdict) -> AssessorResult<()> {
        self.check(TaskState::Completed)?;
        if verdict.task_id != self.id {
            return Err(AssessorError::EvaluatorInternalError {
                reason: format!(
                    "verdict for task '{}' offered to task '{}'",
                    verdict.task_id, self.id
                ),
            });
        }
        self.verdict = Some(verdict);
        self.enter(TaskState::Completed);
        Ok(())
    }

    /// Any non-terminal state → FAILED.
    pub fn fail(&mut self, kind: FailureKind, message: impl Into<String>) -> AssessorResult<()> {
        self.check(TaskState::Failed)?;
        self.failure = Some(FailureRecord {
            kind,
            message: message.into(),
        });
        self.enter(TaskState::Failed);
        Ok(())
    }

    /// The caller-facing result, or `None` while the task is still running.
    pub fn outcome(&self) -> Option<TaskOutcome> {
        match (self.state, &self.verdict, &self.failure) {
            (TaskState::Completed, Some(verdict), _) => Some(TaskOutcome::Verdict(verdict.clone())),
            (TaskState::Failed, _, Some(failure)) => Some(TaskOutcome::Failure {
                task_id: self.id.clone(),
                kind: failure.kind,
                message: failure.message.clone(),
            }),
            _ => None,
        }
    }
}
