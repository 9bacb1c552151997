//! Collaborator traits for the task orchestrator.
//!
//! - `ReferenceDataClient`: scoped reads from the data repository
//! - `ReferenceSolutionProvider`: ground truth per task family
//! - `RemoteAgentClient`: discovery and instruction exchange
//! - `Evaluator`: scores a response against a solution
//!
//! The two network-bound traits are async; the orchestrator wraps every call
//! to them in a deadline, so implementations must be cancel-safe: dropping
//! the returned future abandons the call.

use std::time::Duration;

use async_trait::async_trait;

use assessor_contracts::{
    capability::AgentCapabilityDescriptor,
    error::AssessorResult,
    task::{AgentResponse, DataScope, DomainContext, Instruction, TaskId},
    verdict::{ReferenceSolution, Verdict},
};

/// Read client for the external data repository.
///
/// Implementations hold connection configuration only. They are shared by
/// every in-flight task, so they must not keep per-task mutable state.
#[async_trait]
pub trait ReferenceDataClient: Send + Sync {
    /// Fetch exactly the records listed in `scope`, in the same order.
    ///
    /// Returning more or fewer records than requested is a
    /// `DataUnavailable` error, never a partial context.
    async fn fetch(&self, scope: &DataScope) -> AssessorResult<DomainContext>;
}

/// Read-only lookup of reference solutions.
///
/// Lookups must be deterministic and free of side effects: the same family
/// id yields the same solution for the lifetime of the process.
pub trait ReferenceSolutionProvider: Send + Sync {
    /// Return the solution for `family`, or `SolutionMissing`.
    fn lookup(&self, family: &str) -> AssessorResult<ReferenceSolution>;

    /// Default instruction text for `family`, if the provider carries one.
    fn prompt_for(&self, _family: &str) -> Option<String> {
        None
    }
}

/// Client for the agent under test.
#[async_trait]
pub trait RemoteAgentClient: Send + Sync {
    /// Fetch the agent's capability metadata.
    ///
    /// Fails with `AgentUnreachable` when the agent cannot be contacted
    /// within the discovery timeout. Absent or malformed metadata is a
    /// failure, never an empty capability set.
    async fn discover(&self, endpoint: &str) -> AssessorResult<AgentCapabilityDescriptor>;

    /// Send `instruction` and wait up to `deadline` for the reply.
    ///
    /// Fails with `AgentTimeout` when the deadline elapses and with
    /// `AgentProtocolError` when the reply does not match the message schema.
    async fn dispatch(
        &self,
        endpoint: &str,
        instruction: &Instruction,
        deadline: Duration,
    ) -> AssessorResult<AgentResponse>;
}

/// Scores a response against a reference solution.
///
/// A wrong answer is a successful evaluation with a low score. Errors are
/// reserved for solutions that name an unknown scoring rule or carry
/// unusable parameters (`EvaluatorInternalError`).
pub trait Evaluator: Send + Sync {
    fn evaluate(
        &self,
        task_id: &TaskId,
        response: &AgentResponse,
        solution: &ReferenceSolution,
    ) -> AssessorResult<Verdict>;
}
