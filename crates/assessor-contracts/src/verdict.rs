//! Reference solutions, verdicts, and batch summaries.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::task::TaskId;

/// Ground truth for one task family.
///
/// Loaded once at startup and shared read-only. `rule` names a scoring rule
/// registered with the evaluator; `params` is handed to that rule untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceSolution {
    /// Task-family identifier, e.g. `"task1_1"`.
    pub family: String,
    /// The expected answer.
    pub expected: Value,
    /// Registered scoring-rule name, e.g. `"tolerance-numeric"`.
    pub rule: String,
    /// Rule-specific parameters (tolerances, case sensitivity, ...).
    #[serde(default)]
    pub params: Value,
    /// Minimum score counted as a pass.
    #[serde(default = "default_pass_threshold")]
    pub pass_threshold: f64,
}

pub fn default_pass_threshold() -> f64 {
    1.0
}

/// The scored outcome of a completed task. Produced exactly once per task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub task_id: TaskId,
    pub passed: bool,
    /// Score in `[0, 1]`.
    pub score: f64,
    pub rationale: String,
}

impl Verdict {
    /// Build a verdict, clamping `score` into `[0, 1]`.
    pub fn new(task_id: TaskId, score: f64, pass_threshold: f64, rationale: String) -> Self {
        let score = if score.is_nan() { 0.0 } else { score.clamp(0.0, 1.0) };
        Self {
            task_id,
            passed: score >= pass_threshold,
            score,
            rationale,
        }
    }
}

/// Derive the family type from a family id (`"task1_1"` → `"task1"`).
pub fn family_type(family: &str) -> &str {
    match family.split_once('_') {
        Some((prefix, _)) => prefix,
        None => "unknown",
    }
}

/// Human-readable name for a family, used in rationales and summaries.
pub fn family_name(family: &str) -> String {
    let name = match family_type(family) {
        "task1" => "Patient Search",
        "task2" => "Age Calculation",
        "task3" => "Vital Sign Recording",
        "task4" => "Lab Result Retrieval",
        "task5" => "Medication Ordering",
        "task6" => "Data Summarization",
        "task7" => "Most Recent Value",
        "task8" => "Procedure Ordering",
        "task9" => "Medication + Schedule",
        "task10" => "Lab Gap Closure",
        other => return format!("Type: {other}"),
    };
    name.to_string()
}

/// One non-passing entry in a [`BatchSummary`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchFailure {
    pub task_id: TaskId,
    pub family: String,
    pub family_name: String,
    /// Verdict rationale, or the failure kind and message.
    pub feedback: String,
    pub score: f64,
}

/// Aggregate of several independent evaluations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: Vec<BatchFailure>,
    /// `"passed/total"`.
    pub score_summary: String,
}

impl BatchSummary {
    pub fn new(total: usize, passed: usize, failed: Vec<BatchFailure>) -> Self {
        Self {
            total,
            passed,
            failed,
            score_summary: format!("{passed}/{total}"),
        }
    }
}
