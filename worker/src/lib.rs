//! The Processor Orchestrator (§4.2, §5): the worker process that claims
//! jobs from the shared queue, extracts structured documents out of them,
//! and tracks its own compute cost against an operator-set budget.

pub mod cost;
pub mod orchestrator;

pub use cost::CostTracker;
pub use orchestrator::{Orchestrator, OrchestratorConfig, ShutdownReason, BUDGET_SHUTDOWN_GRACE, JOB_TIMEOUT};
