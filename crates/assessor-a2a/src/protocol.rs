//! A2A wire types and message handling.
//!
//! Covers the three pieces the orchestrator needs:
//!
//! - the agent card served at `/.well-known/agent-card.json`, and how its
//!   fields turn into a capability set;
//! - the JSON-RPC 2.0 `message/send` request carrying an instruction;
//! - the reply: its schema, text extraction, and answer cleanup.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use assessor_contracts::{
    capability::{AgentCapabilityDescriptor, Capability, CapabilitySet},
    error::{AssessorError, AssessorResult},
    task::Instruction,
};

pub const AGENT_CARD_PATH: &str = "/.well-known/agent-card.json";
pub const PROTOCOL_VERSION: &str = "0.3.0";
pub const SEND_MESSAGE: &str = "message/send";
pub const STREAM_MESSAGE: &str = "message/stream";

// ── Agent card ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentCapabilities {
    #[serde(default)]
    pub streaming: bool,
    #[serde(default)]
    pub push_notifications: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSkill {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub examples: Vec<String>,
}

/// Self-description an A2A agent publishes. `name` and `url` are required;
/// a card without them does not deserialize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentCard {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub url: String,
    #[serde(default)]
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol_version: Option<String>,
    /// Absent means JSON-RPC.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_transport: Option<String>,
    #[serde(default)]
    pub capabilities: AgentCapabilities,
    #[serde(default)]
    pub default_input_modes: Vec<String>,
    #[serde(default)]
    pub default_output_modes: Vec<String>,
    #[serde(default)]
    pub skills: Vec<AgentSkill>,
}

impl AgentCard {
    /// Parse a card body. Anything that is not a usable card is reported as
    /// `AgentIncompatible`; an agent without discovery metadata cannot be
    /// checked, so it is never treated as having no capabilities.
    pub fn parse(endpoint: &str, body: &[u8]) -> AssessorResult<Self> {
        let card: AgentCard = serde_json::from_slice(body).map_err(|e| {
            tracing::warn!(%endpoint, error = %e, "malformed agent card");
            missing_card()
        })?;
        if card.url.trim().is_empty() {
            tracing::warn!(%endpoint, "agent card has an empty url");
            return Err(missing_card());
        }
        Ok(card)
    }

    /// The operations this card advertises, in capability-string form:
    /// `message/send`, `message/stream`, `input:<mode>`, `output:<mode>`,
    /// `skill:<id>`.
    pub fn operations(&self) -> CapabilitySet {
        let mut ops = CapabilitySet::default();
        let transport = self.preferred_transport.as_deref().unwrap_or("JSONRPC");
        if transport.eq_ignore_ascii_case("JSONRPC") {
            ops.grant(Capability::new(SEND_MESSAGE));
            if self.capabilities.streaming {
                ops.grant(Capability::new(STREAM_MESSAGE));
            }
        }
        for mode in &self.default_input_modes {
            ops.grant(Capability::new(format!("input:{}", normalize_mode(mode))));
        }
        for mode in &self.default_output_modes {
            ops.grant(Capability::new(format!("output:{}", normalize_mode(mode))));
        }
        for skill in &self.skills {
            ops.grant(Capability::new(format!("skill:{}", skill.id)));
        }
        ops
    }

    pub fn descriptor(&self) -> AgentCapabilityDescriptor {
        AgentCapabilityDescriptor {
            name: self.name.clone(),
            protocol_version: self
                .protocol_version
                .clone()
                .unwrap_or_else(|| "unspecified".to_string()),
            endpoint: self.url.clone(),
            operations: self.operations(),
        }
    }
}

fn missing_card() -> AssessorError {
    AssessorError::AgentIncompatible {
        missing: vec![format!("agent card ({AGENT_CARD_PATH})")],
    }
}

/// Fold MIME spellings into the short A2A mode names.
fn normalize_mode(mode: &str) -> &str {
    match mode {
        "text/plain" => "text",
        "application/json" => "data",
        other => other,
    }
}

// ── Request ───────────────────────────────────────────────────────────────────

/// A `message/send` call with the instruction payload as a single text part.
pub fn send_message_request(instruction: &Instruction) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": Uuid::new_v4().to_string(),
        "method": SEND_MESSAGE,
        "params": {
            "message": {
                "kind": "message",
                "role": "user",
                "messageId": Uuid::new_v4().to_string(),
                "contextId": instruction.task_id.as_str(),
                "parts": [
                    { "kind": "text", "text": instruction.to_payload().to_string() }
                ]
            }
        }
    })
}

// ── Reply ─────────────────────────────────────────────────────────────────────

/// JSON Schema every `message/send` reply must satisfy before it is read.
pub fn reply_schema() -> Value {
    json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "type": "object",
        "required": ["jsonrpc"],
        "properties": {
            "jsonrpc": { "const": "2.0" },
            "result": {
                "type": "object",
                "required": ["kind"],
                "properties": {
                    "kind": { "enum": ["message", "task"] },
                    "parts": { "type": "array", "items": { "$ref": "#/$defs/part" } },
                    "status": {
                        "type": "object",
                        "required": ["state"],
                        "properties": {
                            "state": { "type": "string" },
                            "message": {
                                "type": "object",
                                "properties": {
                                    "parts": {
                                        "type": "array",
                                        "items": { "$ref": "#/$defs/part" }
                                    }
                                }
                            }
                        }
                    },
                    "artifacts": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "required": ["parts"],
                            "properties": {
                                "parts": { "type": "array", "items": { "$ref": "#/$defs/part" } }
                            }
                        }
                    }
                },
                "allOf": [
                    {
                        "if": { "properties": { "kind": { "const": "message" } } },
                        "then": { "required": ["parts"] }
                    },
                    {
                        "if": { "properties": { "kind": { "const": "task" } } },
                        "then": { "required": ["status"] }
                    }
                ]
            },
            "error": {
                "type": "object",
                "required": ["code", "message"],
                "properties": {
                    "code": { "type": "integer" },
                    "message": { "type": "string" }
                }
            }
        },
        "oneOf": [
            { "required": ["result"] },
            { "required": ["error"] }
        ],
        "$defs": {
            "part": {
                "type": "object",
                "required": ["kind"],
                "properties": {
                    "kind": { "enum": ["text", "data", "file"] },
                    "text": { "type": "string" }
                },
                "if": { "properties": { "kind": { "const": "text" } } },
                "then": { "required": ["text"] }
            }
        }
    })
}

const UNSUCCESSFUL_STATES: [&str; 3] = ["failed", "rejected", "canceled"];

/// Pull the answer text out of a schema-valid reply.
///
/// A `message` yields its parts. A `task` must be `completed`; it yields its
/// artifacts, or its status message when it has no artifact text.
pub fn reply_text(reply: &Value) -> AssessorResult<String> {
    if let Some(error) = reply.get("error") {
        return Err(AssessorError::AgentProtocolError {
            reason: format!(
                "agent returned JSON-RPC error {}: {}",
                error["code"],
                error["message"].as_str().unwrap_or_default()
            ),
        });
    }

    let result = &reply["result"];
    let text = match result["kind"].as_str() {
        Some("message") => parts_text(&result["parts"]),
        Some("task") => {
            let state = result["status"]["state"].as_str().unwrap_or_default();
            if UNSUCCESSFUL_STATES.contains(&state) {
                return Err(AssessorError::AgentProtocolError {
                    reason: format!("agent ended the task in state '{state}'"),
                });
            }
            if state != "completed" {
                return Err(AssessorError::AgentProtocolError {
                    reason: format!("agent replied with the task still in state '{state}'"),
                });
            }
            let artifacts: Vec<String> = result["artifacts"]
                .as_array()
                .map(|list| list.iter().map(|a| parts_text(&a["parts"])).collect())
                .unwrap_or_default();
            let artifacts = artifacts.join("\n");
            if artifacts.trim().is_empty() {
                parts_text(&result["status"]["message"]["parts"])
            } else {
                artifacts
            }
        }
        _ => String::new(),
    };

    if text.trim().is_empty() {
        return Err(AssessorError::AgentProtocolError {
            reason: "reply carries no text or data parts".to_string(),
        });
    }
    Ok(text)
}

fn parts_text(parts: &Value) -> String {
    let Some(parts) = parts.as_array() else {
        return String::new();
    };
    parts
        .iter()
        .filter_map(|part| match part["kind"].as_str() {
            Some("text") => part["text"].as_str().map(str::to_string),
            Some("data") => part.get("data").map(Value::to_string),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Strip markdown code fences and unwrap a `FINISH(...)` wrapper.
pub fn clean_answer(text: &str) -> String {
    let mut answer = text.trim().to_string();
    if answer.contains("```") {
        answer = answer.replace("```json", "").replace("```", "").trim().to_string();
    }
    if let Some(inner) = answer
        .strip_prefix("FINISH(")
        .and_then(|rest| rest.strip_suffix(')'))
    {
        answer = inner.trim().to_string();
    }
    answer
}
