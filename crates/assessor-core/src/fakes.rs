//! In-memory collaborators for tests and offline runs.
//!
//! `FakeDataClient`, `FakeAgentClient`, `FixedSolutionProvider` and
//! `ExactAnswerEvaluator` satisfy the trait contracts without touching the
//! network. Delays use `tokio::time`, so paused-clock tests run instantly.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex, PoisonError,
    },
    time::Duration,
};

use async_trait::async_trait;
use serde_json::Value;

use assessor_contracts::{
    capability::AgentCapabilityDescriptor,
    error::{AssessorError, AssessorResult},
    task::{AgentResponse, DataScope, DomainContext, DomainRecord, Instruction, TaskId},
    verdict::{ReferenceSolution, Verdict},
};

use crate::{
    orchestrator::DEFAULT_REQUIRED_OPERATIONS,
    traits::{Evaluator, ReferenceDataClient, ReferenceSolutionProvider, RemoteAgentClient},
};

// ---------------------------------------------------------------------------
// FakeDataClient
// ---------------------------------------------------------------------------

/// Data repository backed by a map of `(resource_type, id) → body`.
#[derive(Debug, Default)]
pub struct FakeDataClient {
    records: HashMap<(String, String), Value>,
    /// Appended to every answer, whether or not the scope asked for it.
    unrequested: Vec<DomainRecord>,
    delay: Duration,
    transient_failures: AtomicUsize,
    calls: AtomicUsize,
}

impl FakeDataClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(mut self, resource_type: &str, id: &str, body: Value) -> Self {
        self.records
            .insert((resource_type.to_string(), id.to_string()), body);
        self
    }

    /// Return this record on every fetch in addition to the scoped ones.
    pub fn with_unrequested(mut self, resource_type: &str, id: &str, body: Value) -> Self {
        self.unrequested.push(DomainRecord {
            resource_type: resource_type.to_string(),
            id: id.to_string(),
            body,
        });
        self
    }

    /// Wait `delay` before answering each fetch.
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Fail the first `n` fetches with a transient error.
    pub fn failing_first(self, n: usize) -> Self {
        self.transient_failures.store(n, Ordering::SeqCst);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReferenceDataClient for FakeDataClient {
    async fn fetch(&self, scope: &DataScope) -> AssessorResult<DomainContext> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let remaining = self.transient_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.transient_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(AssessorError::DataUnavailable {
                reason: "simulated 503 from data repository".to_string(),
                transient: true,
            });
        }

        let mut records = Vec::with_capacity(scope.records.len());
        for wanted in &scope.records {
            let key = (wanted.resource_type.clone(), wanted.id.clone());
            match self.records.get(&key) {
                Some(body) => records.push(DomainRecord {
                    resource_type: wanted.resource_type.clone(),
                    id: wanted.id.clone(),
                    body: body.clone(),
                }),
                None => {
                    return Err(AssessorError::DataUnavailable {
                        reason: format!("{}/{} not found", wanted.resource_type, wanted.id),
                        transient: false,
                    })
                }
            }
        }
        records.extend(self.unrequested.iter().cloned());
        Ok(DomainContext { records })
    }
}

// ---------------------------------------------------------------------------
// FakeAgentClient
// ---------------------------------------------------------------------------

/// How a scripted agent answers a dispatch.
#[derive(Debug, Clone)]
pub enum AgentBehavior {
    /// Reply with this answer text.
    Answer(String),
    /// Reply with something that fails schema validation.
    Malformed(String),
    /// Refuse every connection, discovery included.
    Unreachable,
}

#[derive(Debug, Clone)]
pub struct ScriptedAgent {
    pub operations: Vec<String>,
    pub behavior: AgentBehavior,
    /// Time taken before the reply is produced.
    pub delay: Duration,
}

impl ScriptedAgent {
    pub fn new(behavior: AgentBehavior) -> Self {
        Self {
            operations: DEFAULT_REQUIRED_OPERATIONS.iter().map(|s| s.to_string()).collect(),
            behavior,
            delay: Duration::ZERO,
        }
    }

    pub fn answering(answer: &str) -> Self {
        Self::new(AgentBehavior::Answer(answer.to_string()))
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_operations(mut self, operations: &[&str]) -> Self {
        self.operations = operations.iter().map(|s| s.to_string()).collect();
        self
    }
}

/// Agents keyed by endpoint. Unknown endpoints are unreachable.
#[derive(Debug, Default)]
pub struct FakeAgentClient {
    agents: HashMap<String, ScriptedAgent>,
    dispatched: Mutex<Vec<Instruction>>,
    discoveries: AtomicUsize,
    delivered: AtomicUsize,
}

impl FakeAgentClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_agent(mut self, endpoint: &str, agent: ScriptedAgent) -> Self {
        self.agents.insert(endpoint.to_string(), agent);
        self
    }

    /// Every instruction that reached an agent, in order.
    pub fn dispatched(&self) -> Vec<Instruction> {
        self.dispatched
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn discoveries(&self) -> usize {
        self.discoveries.load(Ordering::SeqCst)
    }

    /// Replies that were fully produced, i.e. whose call was not cancelled.
    pub fn replies_delivered(&self) -> usize {
        self.delivered.load(Ordering::SeqCst)
    }

    fn reachable(&self, endpoint: &str) -> AssessorResult<&ScriptedAgent> {
        match self.agents.get(endpoint) {
            Some(agent) if !matches!(agent.behavior, AgentBehavior::Unreachable) => Ok(agent),
            _ => Err(AssessorError::AgentUnreachable {
                endpoint: endpoint.to_string(),
                reason: "connection refused".to_string(),
            }),
        }
    }
}

#[async_trait]
impl RemoteAgentClient for FakeAgentClient {
    async fn discover(&self, endpoint: &str) -> AssessorResult<AgentCapabilityDescriptor> {
        self.discoveries.fetch_add(1, Ordering::SeqCst);
        let agent = self.reachable(endpoint)?;
        Ok(AgentCapabilityDescriptor {
            name: format!("scripted agent at {endpoint}"),
            protocol_version: "0.3.0".to_string(),
            endpoint: endpoint.to_string(),
            operations: agent.operations.iter().cloned().collect(),
        })
    }

    async fn dispatch(
        &self,
        endpoint: &str,
        instruction: &Instruction,
        _deadline: Duration,
    ) -> AssessorResult<AgentResponse> {
        let agent = self.reachable(endpoint)?.clone();
        self.dispatched
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(instruction.clone());

        if !agent.delay.is_zero() {
            tokio::time::sleep(agent.delay).await;
        }
        self.delivered.fetch_add(1, Ordering::SeqCst);

        match agent.behavior {
            AgentBehavior::Answer(answer) => Ok(AgentResponse {
                raw: serde_json::json!({ "kind": "message", "text": answer }),
                answer,
            }),
            AgentBehavior::Malformed(reason) => Err(AssessorError::AgentProtocolError { reason }),
            AgentBehavior::Unreachable => Err(AssessorError::AgentUnreachable {
                endpoint: endpoint.to_string(),
                reason: "connection refused".to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// FixedSolutionProvider
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct FixedSolutionProvider {
    solutions: HashMap<String, ReferenceSolution>,
    prompts: HashMap<String, String>,
}

impl FixedSolutionProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_solution(mut self, solution: ReferenceSolution, prompt: Option<&str>) -> Self {
        if let Some(prompt) = prompt {
            self.prompts
                .insert(solution.family.clone(), prompt.to_string());
        }
        self.solutions.insert(solution.family.clone(), solution);
        self
    }

    /// Shorthand for an `exact-match` solution with a string answer.
    pub fn with_exact(self, family: &str, expected: &str, prompt: Option<&str>) -> Self {
        self.with_solution(
            ReferenceSolution {
                family: family.to_string(),
                expected: Value::String(expected.to_string()),
                rule: "exact-match".to_string(),
                params: Value::Null,
                pass_threshold: 1.0,
            },
            prompt,
        )
    }
}

impl ReferenceSolutionProvider for FixedSolutionProvider {
    fn lookup(&self, family: &str) -> AssessorResult<ReferenceSolution> {
        self.solutions
            .get(family)
            .cloned()
            .ok_or_else(|| AssessorError::SolutionMissing {
                family: family.to_string(),
            })
    }

    fn prompt_for(&self, family: &str) -> Option<String> {
        self.prompts.get(family).cloned()
    }
}

// ---------------------------------------------------------------------------
// ExactAnswerEvaluator
// ---------------------------------------------------------------------------

/// Scores 1.0 when the trimmed answer equals the expected string, else 0.0.
/// Ignores the solution's rule name.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExactAnswerEvaluator;

impl Evaluator for ExactAnswerEvaluator {
    fn evaluate(
        &self,
        task_id: &TaskId,
        response: &AgentResponse,
        solution: &ReferenceSolution,
    ) -> AssessorResult<Verdict> {
        let expected = match &solution.expected {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let score = if response.answer.trim() == expected.trim() { 1.0 } else { 0.0 };
        Ok(Verdict::new(
            task_id.clone(),
            score,
            solution.pass_threshold,
            format!("expected {expected:?}, got {:?}", response.answer),
        ))
    }
}
