//! # assessor-contracts
//!
//! Shared types for the clinical assessment orchestrator.
//!
//! All crates in the workspace import from here. No business logic lives in
//! this crate beyond the task record's own transition checks.

pub mod capability;
pub mod error;
pub mod task;
pub mod verdict;
