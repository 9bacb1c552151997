//! Rule-based scoring engine.
//!
//! `ScoringEngine` implements the `Evaluator` trait from `assessor-core`.
//! Each `ReferenceSolution` names a scoring rule; the engine looks the name
//! up in its registry and applies it to the agent's answer.
//!
//! Built-in rules:
//!
//! | name                | score                                                   |
//! |---------------------|---------------------------------------------------------|
//! | `exact-match`       | 1.0 on a normalized match, else 0.0                     |
//! | `tolerance-numeric` | 1.0 within `absolute` or `relative` tolerance, else 0.0 |
//! | `set-equality`      | Jaccard overlap, rounded to 3 decimal places            |
//!
//! Hosting applications add their own with `register_rule`. A wrong answer
//! is never an error. Only an unregistered rule name or unusable rule
//! parameters produce `EvaluatorInternalError`.

use std::collections::{BTreeSet, HashMap};

use serde_json::Value;
use tracing::{debug, warn};

use assessor_contracts::{
    error::{AssessorError, AssessorResult},
    task::{AgentResponse, TaskId},
    verdict::{family_name, ReferenceSolution, Verdict},
};
use assessor_core::traits::Evaluator;

pub const EXACT_MATCH: &str = "exact-match";
pub const TOLERANCE_NUMERIC: &str = "tolerance-numeric";
pub const SET_EQUALITY: &str = "set-equality";

/// Decimal places kept on fractional scores.
pub const SCORE_PRECISION: i32 = 3;

/// Result of applying one rule.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleScore {
    pub score: f64,
    /// Short human-readable explanation.
    pub detail: String,
}

impl RuleScore {
    fn new(score: f64, detail: impl Into<String>) -> Self {
        Self {
            score,
            detail: detail.into(),
        }
    }
}

/// A scoring rule.
///
/// Receives the cleaned answer text, the expected value and the rule
/// parameters. Returns `Err(message)` only when the parameters or expected
/// value make scoring impossible.
pub type ScoringFn = Box<dyn Fn(&str, &Value, &Value) -> Result<RuleScore, String> + Send + Sync>;

pub struct ScoringEngine {
    rules: HashMap<String, ScoringFn>,
}

impl ScoringEngine {
    /// An engine with no rules registered.
    pub fn empty() -> Self {
        Self {
            rules: HashMap::new(),
        }
    }

    /// An engine with the three built-in rules registered.
    pub fn new() -> Self {
        let mut engine = Self::empty();
        engine.register_rule(EXACT_MATCH, Box::new(exact_match));
        engine.register_rule(TOLERANCE_NUMERIC, Box::new(tolerance_numeric));
        engine.register_rule(SET_EQUALITY, Box::new(set_equality));
        engine
    }

    /// Register `rule` under `name`, replacing any previous rule of that name.
    pub fn register_rule(&mut self, name: impl Into<String>, rule: ScoringFn) {
        self.rules.insert(name.into(), rule);
    }

    pub fn has_rule(&self, name: &str) -> bool {
        self.rules.contains_key(name)
    }

    /// Registered rule names, sorted.
    pub fn rule_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.rules.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for ScoringEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Evaluator for ScoringEngine {
    fn evaluate(
        &self,
        task_id: &TaskId,
        response: &AgentResponse,
        solution: &ReferenceSolution,
    ) -> AssessorResult<Verdict> {
        let rule = self.rules.get(solution.rule.as_str()).ok_or_else(|| {
            warn!(task_id = %task_id, rule = %solution.rule, "unknown scoring rule");
            AssessorError::EvaluatorInternalError {
                reason: format!("no scoring rule registered as '{}'", solution.rule),
            }
        })?;

        let family = &solution.family;
        let scored = rule(&response.answer, &solution.expected, &solution.params).map_err(
            |reason| AssessorError::EvaluatorInternalError {
                reason: format!("rule '{}' for family '{family}': {reason}", solution.rule),
            },
        )?;

        let verdict = Verdict::new(
            task_id.clone(),
            scored.score,
            solution.pass_threshold,
            format!(
                "{} ({}) [{}]: {}",
                family_name(&solution.family),
                solution.family,
                solution.rule,
                scored.detail
            ),
        );
        debug!(
            task_id = %task_id,
            rule = %solution.rule,
            score = verdict.score,
            passed = verdict.passed,
            "evaluation complete"
        );
        Ok(verdict)
    }
}

// ── Answer normalization ─────────────────────────────────────────────────────

/// Collapse runs of whitespace and trim; lowercase unless `case_sensitive`.
fn normalize(text: &str, case_sensitive: bool) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if case_sensitive {
        collapsed
    } else {
        collapsed.to_lowercase()
    }
}

/// Render a JSON value as comparable text. Strings lose their quotes.
fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Reduce an answer to a single scalar.
///
/// Agents often answer `["S6534835"]` or `"S6534835"` where a bare value is
/// meant. A JSON string or single-element list is unwrapped; anything else
/// is used verbatim.
fn scalar_answer(answer: &str) -> String {
    match serde_json::from_str::<Value>(answer.trim()) {
        Ok(Value::Array(items)) if items.len() == 1 => value_text(&items[0]),
        Ok(Value::String(s)) => s,
        _ => answer.trim().to_string(),
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn param_f64(params: &Value, key: &str) -> Result<Option<f64>, String> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => match v.as_f64() {
            Some(x) if x >= 0.0 => Ok(Some(x)),
            _ => Err(format!("parameter '{key}' must be a non-negative number, got {v}")),
        },
    }
}

fn round_score(score: f64) -> f64 {
    let factor = 10f64.powi(SCORE_PRECISION);
    (score * factor).round() / factor
}

// ── Built-in rules ───────────────────────────────────────────────────────────

/// `exact-match`. Params: `case_sensitive` (bool, default false).
pub fn exact_match(answer: &str, expected: &Value, params: &Value) -> Result<RuleScore, String> {
    let case_sensitive = params
        .get("case_sensitive")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let got = normalize(&scalar_answer(answer), case_sensitive);
    let want = normalize(&value_text(expected), case_sensitive);

    if got == want {
        Ok(RuleScore::new(1.0, format!("answer matches {want:?}")))
    } else {
        Ok(RuleScore::new(0.0, format!("expected {want:?}, got {got:?}")))
    }
}

/// `tolerance-numeric`. Params: `absolute` and/or `relative` (non-negative).
///
/// Passes when `|answer - expected| <= absolute` or
/// `|answer - expected| <= relative * |expected|`. With neither set the
/// values must be equal. A non-numeric answer scores 0.0.
pub fn tolerance_numeric(
    answer: &str,
    expected: &Value,
    params: &Value,
) -> Result<RuleScore, String> {
    let want =
        as_number(expected).ok_or_else(|| format!("expected value {expected} is not numeric"))?;
    let absolute = param_f64(params, "absolute")?;
    let relative = param_f64(params, "relative")?;

    let text = scalar_answer(answer);
    let got: f64 = match text.trim().parse() {
        Ok(v) => v,
        Err(_) => return Ok(RuleScore::new(0.0, format!("answer {text:?} is not numeric"))),
    };
    if !got.is_finite() {
        return Ok(RuleScore::new(0.0, format!("answer {text:?} is not a finite number")));
    }

    let diff = (got - want).abs();
    let within = match (absolute, relative) {
        (None, None) => diff == 0.0,
        (abs, rel) => {
            abs.map_or(false, |a| diff <= a) || rel.map_or(false, |r| diff <= r * want.abs())
        }
    };

    if within {
        Ok(RuleScore::new(1.0, format!("{got} is within tolerance of {want}")))
    } else {
        Ok(RuleScore::new(0.0, format!("{got} is outside tolerance of {want} (diff {diff})")))
    }
}

/// `set-equality`. Params: `case_sensitive` (bool, default false).
///
/// The answer may be a JSON list or a comma/semicolon/newline separated
/// string. Score is `|A ∩ B| / |A ∪ B|`; two empty sets score 1.0.
pub fn set_equality(answer: &str, expected: &Value, params: &Value) -> Result<RuleScore, String> {
    let case_sensitive = params
        .get("case_sensitive")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let want: BTreeSet<String> = match expected {
        Value::Array(items) => items
            .iter()
            .map(|v| normalize(&value_text(v), case_sensitive))
            .filter(|s| !s.is_empty())
            .collect(),
        other => return Err(format!("expected value must be a list, got {other}")),
    };

    let got: BTreeSet<String> = match serde_json::from_str::<Value>(answer.trim()) {
        Ok(Value::Array(items)) => items
            .iter()
            .map(|v| normalize(&value_text(v), case_sensitive))
            .filter(|s| !s.is_empty())
            .collect(),
        _ => answer
            .split(|c| c == ',' || c == ';' || c == '\n')
            .map(|s| normalize(s, case_sensitive))
            .filter(|s| !s.is_empty())
            .collect(),
    };

    let union = want.union(&got).count();
    let overlap = want.intersection(&got).count();
    let score = if union == 0 {
        1.0
    } else {
        round_score(overlap as f64 / union as f64)
    };

    Ok(RuleScore::new(
        score,
        format!("{overlap} of {union} distinct items agree"),
    ))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
