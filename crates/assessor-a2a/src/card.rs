//! The orchestrator's own agent card.
//!
//! Mirrors the discovery contract it consumes: a caller that fetches this
//! card learns what the orchestrator itself accepts and produces.

use assessor_contracts::capability::AgentCapabilityDescriptor;

use crate::protocol::{AgentCapabilities, AgentCard, AgentSkill, PROTOCOL_VERSION};

pub const ASSESSOR_NAME: &str = "MedAgentBench-Green";
pub const ASSESSOR_SKILL: &str = "medagent-assessor";

pub fn assessor_card(url: &str) -> AgentCard {
    AgentCard {
        name: ASSESSOR_NAME.to_string(),
        description: "Assessment orchestrator for clinical agents backed by a FHIR server"
            .to_string(),
        url: url.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        protocol_version: Some(PROTOCOL_VERSION.to_string()),
        preferred_transport: None,
        capabilities: AgentCapabilities {
            streaming: false,
            push_notifications: false,
        },
        default_input_modes: vec!["text".to_string()],
        default_output_modes: vec!["text".to_string(), "data".to_string()],
        skills: vec![AgentSkill {
            id: ASSESSOR_SKILL.to_string(),
            name: "MedAgentBench Assessment".to_string(),
            description: "Evaluates agents on clinical tasks using a FHIR server".to_string(),
            tags: vec!["medical".to_string(), "fhir".to_string(), "assessment".to_string()],
            examples: Vec::new(),
        }],
    }
}

pub fn assessor_descriptor(url: &str) -> AgentCapabilityDescriptor {
    assessor_card(url).descriptor()
}

#[cfg(test)]
mod tests {
    use assessor_contracts::capability::Capability;

    use super::*;

    #[test]
    fn own_card_round_trips_through_discovery_parsing() {
        let card = assessor_card("http://localhost:9009/");
        let body = serde_json::to_vec(&card).unwrap();
        let parsed = AgentCard::parse("http://localhost:9009", &body).unwrap();
        assert_eq!(parsed, card);
    }

    #[test]
    fn own_descriptor_meets_default_requirements() {
        let descriptor = assessor_descriptor("http://localhost:9009/");
        assert_eq!(descriptor.name, ASSESSOR_NAME);
        for op in [
            "message/send",
            "input:text",
            "output:text",
            "output:data",
            "skill:medagent-assessor",
        ] {
            assert!(descriptor.operations.has(&Capability::new(op)), "missing {op}");
        }
        assert!(!descriptor.operations.has(&Capability::new("message/stream")));
    }
}
