//! # assessor-core
//!
//! The task execution engine of the assessment orchestrator.
//!
//! This crate provides:
//! - The collaborator traits (`ReferenceDataClient`, `ReferenceSolutionProvider`,
//!   `RemoteAgentClient`, `Evaluator`)
//! - The `TaskOrchestrator` state machine that sequences them
//! - The `TaskRegistry` of in-flight tasks and the `AssessmentService` facade
//! - A bounded exponential `RetryPolicy`
//! - In-memory `fakes` for tests and offline runs
//!
//! ## Usage
//!
//! ```rust,ignore
//! use assessor_core::{AssessmentService, TaskOrchestrator, orchestrator::OrchestratorConfig};
//!
//! let config = OrchestratorConfig::default();
//! let orchestrator = TaskOrchestrator::new(data, solutions, agent, evaluator, config);
//! let service = AssessmentService::new(orchestrator, own_descriptor);
//! let outcome = service.evaluate(request).await?;
//! ```

pub mod fakes;
pub mod orchestrator;
pub mod registry;
pub mod retry;
pub mod service;
pub mod traits;

pub use orchestrator::TaskOrchestrator;
pub use registry::{TaskHandle, TaskRegistry};
pub use service::AssessmentService;
