//! Runtime settings.
//!
//! Loaded from an optional TOML file, then overridden by environment
//! variables. Every field has a default, so an empty file (or no file) is a
//! valid configuration.
//!
//! | variable                        | overrides                   |
//! |---------------------------------|-----------------------------|
//! | `FHIR_BASE_URL`                 | `fhir.base_url`             |
//! | `FHIR_SERVER_URL`               | `fhir.base_url` as `<url>/fhir`, if the above is unset |
//! | `FHIR_CALLBACK_HOST`            | `fhir.callback_url` as `http://<host>:8080/fhir` |
//! | `FHIR_CHECK_RETRIES`            | `fhir.ready_retries`        |
//! | `SKIP_FHIR_CHECK`               | `fhir.skip_ready_check`     |
//! | `ASSESSOR_TASK_DEADLINE_MS`     | `task.deadline_ms`          |
//! | `ASSESSOR_RESPONSE_TIMEOUT_MS`  | `agent.response_timeout_ms` |

use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};
use tracing::debug;

use assessor_contracts::error::{AssessorError, AssessorResult};
use assessor_core::{
    orchestrator::{OrchestratorConfig, DEFAULT_REQUIRED_OPERATIONS},
    retry::RetryPolicy,
};

pub const DEFAULT_FHIR_BASE_URL: &str = "http://localhost:8080/fhir";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FhirSettings {
    /// Address this process uses for its own reads.
    pub base_url: String,
    /// Address handed to agents; defaults to `base_url`.
    pub callback_url: Option<String>,
    pub request_timeout_ms: u64,
    /// Readiness probe attempts before a run.
    pub ready_retries: u32,
    pub ready_interval_ms: u64,
    pub skip_ready_check: bool,
}

impl Default for FhirSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_FHIR_BASE_URL.to_string(),
            callback_url: None,
            request_timeout_ms: 10_000,
            ready_retries: 30,
            ready_interval_ms: 2_000,
            skip_ready_check: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    pub discovery_timeout_ms: u64,
    pub response_timeout_ms: u64,
    /// Operations an agent must declare before it is instructed.
    pub required_operations: Vec<String>,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            discovery_timeout_ms: 10_000,
            response_timeout_ms: 240_000,
            required_operations: DEFAULT_REQUIRED_OPERATIONS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskSettings {
    pub deadline_ms: u64,
    pub interaction_limit: u32,
}

impl Default for TaskSettings {
    fn default() -> Self {
        Self {
            deadline_ms: 300_000,
            interaction_limit: 8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub multiplier: f64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 200,
            multiplier: 2.0,
            max_delay_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub fhir: FhirSettings,
    pub agent: AgentSettings,
    pub task: TaskSettings,
    pub retry: RetrySettings,
}

impl Settings {
    /// Parse `s` as TOML. Missing sections and fields take their defaults.
    pub fn from_toml_str(s: &str) -> AssessorResult<Self> {
        let settings: Settings = toml::from_str(s).map_err(|e| AssessorError::ConfigError {
            reason: format!("failed to parse settings TOML: {}", e),
        })?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> AssessorResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| AssessorError::ConfigError {
            reason: format!("failed to read settings file '{}': {}", path.display(), e),
        })?;
        Self::from_toml_str(&contents)
    }

    /// File (if any) first, then the process environment on top.
    pub fn load(path: Option<&Path>) -> AssessorResult<Self> {
        let base = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        base.with_env(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`, which maps variable names to values.
    pub fn with_env<F>(mut self, lookup: F) -> AssessorResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("FHIR_BASE_URL").filter(|v| !v.is_empty()) {
            self.fhir.base_url = url;
        } else if let Some(server) = lookup("FHIR_SERVER_URL").filter(|v| !v.is_empty()) {
            self.fhir.base_url = format!("{}/fhir", server.trim_end_matches('/'));
        }
        if let Some(host) = lookup("FHIR_CALLBACK_HOST").filter(|v| !v.is_empty()) {
            self.fhir.callback_url = Some(format!("http://{host}:8080/fhir"));
        }
        if let Some(raw) = lookup("FHIR_CHECK_RETRIES") {
            self.fhir.ready_retries = parse_env("FHIR_CHECK_RETRIES", &raw)?;
        }
        if let Some(raw) = lookup("SKIP_FHIR_CHECK") {
            self.fhir.skip_ready_check = !matches!(raw.trim(), "" | "0" | "false");
        }
        if let Some(raw) = lookup("ASSESSOR_TASK_DEADLINE_MS") {
            self.task.deadline_ms = parse_env("ASSESSOR_TASK_DEADLINE_MS", &raw)?;
        }
        if let Some(raw) = lookup("ASSESSOR_RESPONSE_TIMEOUT_MS") {
            self.agent.response_timeout_ms = parse_env("ASSESSOR_RESPONSE_TIMEOUT_MS", &raw)?;
        }
        self.validate()?;
        debug!(fhir_base_url = %self.fhir.base_url, "settings resolved");
        Ok(self)
    }

    fn validate(&self) -> AssessorResult<()> {
        if self.retry.max_attempts == 0 {
            return Err(AssessorError::ConfigError {
                reason: "retry.max_attempts must be at least 1".to_string(),
            });
        }
        if self.task.deadline_ms == 0 || self.agent.response_timeout_ms == 0 {
            return Err(AssessorError::ConfigError {
                reason: "task.deadline_ms and agent.response_timeout_ms must be positive"
                    .to_string(),
            });
        }
        let multiplier = self.retry.multiplier;
        if !multiplier.is_finite() || multiplier < 1.0 {
            return Err(AssessorError::ConfigError {
                reason: format!("retry.multiplier must be finite and >= 1.0, got {multiplier}"),
            });
        }
        Ok(())
    }

    /// The address agents should use; falls back to `fhir.base_url`.
    pub fn fhir_callback_url(&self) -> String {
        self.fhir
            .callback_url
            .clone()
            .unwrap_or_else(|| self.fhir.base_url.clone())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            base_delay: Duration::from_millis(self.retry.base_delay_ms),
            multiplier: self.retry.multiplier,
            max_delay: Duration::from_millis(self.retry.max_delay_ms),
        }
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            task_deadline: Duration::from_millis(self.task.deadline_ms),
            response_timeout: Duration::from_millis(self.agent.response_timeout_ms),
            required_operations: self.agent.required_operations.iter().cloned().collect(),
            interaction_limit: self.task.interaction_limit,
            fhir_callback_url: Some(self.fhir_callback_url()),
            retry: self.retry_policy(),
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, raw: &str) -> AssessorResult<T>
where
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e| AssessorError::ConfigError {
        reason: format!("environment variable {key}={raw:?} is invalid: {e}"),
    })
}
