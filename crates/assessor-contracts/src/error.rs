//! Error types for the assessment pipeline.
//!
//! Every fallible operation returns `AssessorResult<T>`. Variants that can
//! terminate a task map onto a public [`FailureKind`], which is what gets
//! recorded on the task and reported back to the caller.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The caller-visible classification of a task failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    DataUnavailable,
    AgentUnreachable,
    AgentTimeout,
    AgentProtocolError,
    AgentIncompatible,
    SolutionMissing,
    TaskDeadlineExceeded,
    DuplicateTask,
    TaskNotTerminal,
    EvaluatorInternalError,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::DataUnavailable => "DataUnavailable",
            FailureKind::AgentUnreachable => "AgentUnreachable",
            FailureKind::AgentTimeout => "AgentTimeout",
            FailureKind::AgentProtocolError => "AgentProtocolError",
            FailureKind::AgentIncompatible => "AgentIncompatible",
            FailureKind::SolutionMissing => "SolutionMissing",
            FailureKind::TaskDeadlineExceeded => "TaskDeadlineExceeded",
            FailureKind::DuplicateTask => "DuplicateTask",
            FailureKind::TaskNotTerminal => "TaskNotTerminal",
            FailureKind::EvaluatorInternalError => "EvaluatorInternalError",
        };
        f.write_str(name)
    }
}

/// The unified error type for the assessor crates.
#[derive(Debug, Clone, Error)]
pub enum AssessorError {
    /// The data repository could not supply the records the task declared.
    ///
    /// `transient` is set for timeouts, refused connections and 5xx answers;
    /// only those are retried.
    #[error("reference data unavailable: {reason}")]
    DataUnavailable { reason: String, transient: bool },

    #[error("agent at '{endpoint}' is unreachable: {reason}")]
    AgentUnreachable { endpoint: String, reason: String },

    #[error("agent at '{endpoint}' did not respond within {waited_ms} ms")]
    AgentTimeout { endpoint: String, waited_ms: u64 },

    /// The agent answered, but not with a message we are willing to interpret.
    #[error("agent protocol error: {reason}")]
    AgentProtocolError { reason: String },

    #[error("agent does not support required operations: {}", .missing.join(", "))]
    AgentIncompatible { missing: Vec<String> },

    #[error("no reference solution for task family '{family}'")]
    SolutionMissing { family: String },

    #[error("task exceeded its overall deadline of {deadline_ms} ms")]
    TaskDeadlineExceeded { deadline_ms: u64 },

    #[error("task '{task_id}' is already in flight")]
    DuplicateTask { task_id: String },

    #[error("task '{task_id}' is still {state}; only terminal tasks can be released")]
    TaskNotTerminal { task_id: String, state: String },

    #[error("evaluator internal error: {reason}")]
    EvaluatorInternalError { reason: String },

    #[error("task '{task_id}' is not registered")]
    TaskNotFound { task_id: String },

    /// The task record refused a state change. Indicates a bug in the driver.
    #[error("illegal task transition from {from} to {to}")]
    IllegalTransition { from: String, to: String },

    /// A required configuration value is missing or invalid.
    #[error("configuration error: {reason}")]
    ConfigError { reason: String },
}

impl AssessorError {
    /// Classify this error as a task failure kind.
    ///
    /// Returns `None` for errors that never terminate a task on their own
    /// (unknown ids, bad configuration, driver bugs).
    pub fn kind(&self) -> Option<FailureKind> {
        match self {
            AssessorError::DataUnavailable { .. } => Some(FailureKind::DataUnavailable),
            AssessorError::AgentUnreachable { .. } => Some(FailureKind::AgentUnreachable),
            AssessorError::AgentTimeout { .. } => Some(FailureKind::AgentTimeout),
            AssessorError::AgentProtocolError { .. } => Some(FailureKind::AgentProtocolError),
            AssessorError::AgentIncompatible { .. } => Some(FailureKind::AgentIncompatible),
            AssessorError::SolutionMissing { .. } => Some(FailureKind::SolutionMissing),
            AssessorError::TaskDeadlineExceeded { .. } => Some(FailureKind::TaskDeadlineExceeded),
            AssessorError::DuplicateTask { .. } => Some(FailureKind::DuplicateTask),
            AssessorError::TaskNotTerminal { .. } => Some(FailureKind::TaskNotTerminal),
            AssessorError::EvaluatorInternalError { .. } => {
                Some(FailureKind::EvaluatorInternalError)
            }
            AssessorError::TaskNotFound { .. }
            | AssessorError::IllegalTransition { .. }
            | AssessorError::ConfigError { .. } => None,
        }
    }

    /// True when a retry has a reasonable chance of succeeding.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AssessorError::DataUnavailable { transient: true, .. }
                | AssessorError::AgentUnreachable { .. }
        )
    }
}

/// Convenience alias used throughout the assessor crates.
pub type AssessorResult<T> = Result<T, AssessorError>;
