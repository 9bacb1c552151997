//! # assessor-verify
//!
//! Checking and scoring what the agent under test sends back.
//!
//! 1. **Structural**: [`schema::ResponseValidator`] validates raw replies
//!    with the `jsonschema` crate; violations become `AgentProtocolError`.
//! 2. **Scoring**: [`engine::ScoringEngine`] implements the
//!    [`assessor_core::traits::Evaluator`] trait with a registry of named
//!    rules (`exact-match`, `tolerance-numeric`, `set-equality`).
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use assessor_verify::engine::{RuleScore, ScoringEngine};
//!
//! let mut engine = ScoringEngine::new();
//! engine.register_rule("contains", Box::new(|answer, expected, _params| {
//!     let hit = answer.contains(expected.as_str().unwrap_or_default());
//!     Ok(RuleScore { score: if hit { 1.0 } else { 0.0 }, detail: "substring".into() })
//! }));
//! ```

pub mod engine;
pub mod schema;

pub use engine::ScoringEngine;
pub use schema::ResponseValidator;
