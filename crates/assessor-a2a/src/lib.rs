//! # assessor-a2a
//!
//! Talking to agents under test over the A2A protocol.
//!
//! - [`A2aAgentClient`] implements
//!   [`RemoteAgentClient`](assessor_core::traits::RemoteAgentClient):
//!   discovery reads `{endpoint}/.well-known/agent-card.json`, dispatch is a
//!   JSON-RPC `message/send` whose reply is schema-checked before its text
//!   is read.
//! - [`protocol`] holds the wire types and reply handling.
//! - [`card`] builds the orchestrator's own agent card.
//!
//! Failure mapping:
//!
//! | situation                                       | error                |
//! |-------------------------------------------------|----------------------|
//! | refused connection, HTTP 5xx or 429             | `AgentUnreachable`   |
//! | no card, or a card without `name`/`url`         | `AgentIncompatible`  |
//! | dispatch deadline elapsed                       | `AgentTimeout`       |
//! | other non-2xx, non-JSON, schema violation       | `AgentProtocolError` |
//! | RPC error, task not `completed`                 | `AgentProtocolError` |
//!
//! Only `AgentUnreachable` is retried, on discovery and dispatch alike.

pub mod card;
pub mod client;
pub mod protocol;

pub use card::{assessor_card, assessor_descriptor};
pub use client::A2aAgentClient;
pub use protocol::AgentCard;
