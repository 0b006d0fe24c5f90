//! Coordination tasks of the fleet agent.
//!
//! Every task implements [`Worker`]; [`WorkerService`] wires them together
//! through bounded channels and supervises them under one cancellation
//! token.

pub mod components;
pub mod service;

pub use components::{
    Commissioner, ConfUpdater, DeploymentJob, DeploymentProcessor, Heartbeat,
    InMemoryJobRegistry, JobGuard, JobProcessor, JobRegistry, OrchestratorTable, ResourceCleaner,
    Worker, WorkerKind,
};
pub use service::{WorkerService, WorkerServiceBuilder};
