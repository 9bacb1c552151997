//! JSON Schema validation of agent replies.
//!
//! Replies are checked against a compiled schema before anything is read out
//! of them. Every violation is collected so the resulting
//! `AgentProtocolError` shows the full picture in one message.

use serde_json::Value;
use tracing::warn;

use assessor_contracts::error::{AssessorError, AssessorResult};

pub struct ResponseValidator {
    schema_id: String,
    validator: jsonschema::Validator,
}

impl ResponseValidator {
    /// Compile `schema`. A malformed schema document is a `ConfigError`.
    pub fn new(schema_id: impl Into<String>, schema: &Value) -> AssessorResult<Self> {
        let schema_id = schema_id.into();
        let validator = jsonschema::validator_for(schema).map_err(|e| AssessorError::ConfigError {
            reason: format!("invalid JSON Schema document '{schema_id}': {e}"),
        })?;
        Ok(Self {
            schema_id,
            validator,
        })
    }

    pub fn schema_id(&self) -> &str {
        &self.schema_id
    }

    /// Return `AgentProtocolError` listing every violation, or `Ok(())`.
    pub fn validate(&self, payload: &Value) -> AssessorResult<()> {
        let violations: Vec<String> = self
            .validator
            .iter_errors(payload)
            .map(|error| format!("JSON Schema violation at {}: {}", error.instance_path, error))
            .collect();

        if violations.is_empty() {
            return Ok(());
        }

        let reason = violations.join("; ");
        warn!(schema_id = %self.schema_id, %reason, "response failed schema validation");
        Err(AssessorError::AgentProtocolError { reason })
    }
}

impl std::fmt::Debug for ResponseValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseValidator")
            .field("schema_id", &self.schema_id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use assessor_contracts::error::{AssessorError, FailureKind};

    use super::ResponseValidator;

    fn reply_schema() -> serde_json::Value {
        json!({
            "type": "object",
            "required": ["jsonrpc", "result"],
            "properties": {
                "jsonrpc": { "const": "2.0" },
                "result": { "type": "object", "required": ["kind"] }
            }
        })
    }

    #[test]
    fn conforming_reply_passes() {
        let validator = ResponseValidator::new("reply-v1", &reply_schema()).unwrap();
        let reply = json!({ "jsonrpc": "2.0", "result": { "kind": "message" } });
        assert!(validator.validate(&reply).is_ok());
    }

    #[test]
    fn violations_become_protocol_errors() {
        let validator = ResponseValidator::new("reply-v1", &reply_schema()).unwrap();
        let reply = json!({ "jsonrpc": "1.0", "result": {} });

        let err = validator.validate(&reply).unwrap_err();
        assert_eq!(err.kind(), Some(FailureKind::AgentProtocolError));
        match err {
            AssessorError::AgentProtocolError { reason } => {
                assert!(reason.contains("/jsonrpc"), "reason: {reason}");
                assert!(reason.contains("/result"), "reason: {reason}");
            }
            other => panic!("expected AgentProtocolError, got {:?}", other),
        }
    }

    #[test]
    fn malformed_schema_is_a_config_error() {
        let err = ResponseValidator::new("broken", &json!({ "type": 12 })).unwrap_err();
        assert!(matches!(err, AssessorError::ConfigError { .. }));
    }
}
