//! Agent configuration.
//!
//! `AgentConfig` is loaded once at startup. `WorkerConfig` is the part of it
//! that can change at runtime: the conf updater rebuilds it from the backend
//! and broadcasts a fresh copy to every task.

pub mod models;
pub mod validation;

pub use models::{
    AgentConfig, BackendConfig, CleanupObject, CommissionConfig, DeploymentsConfig, JobsConfig,
    LogConfig, WorkerConfig,
};
pub use validation::{ConfigValidator, ValidationUtils};
