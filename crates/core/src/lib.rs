//! Core types of the fleet agent: error taxonomy, configuration, data model
//! and the traits implemented by external collaborators.

pub mod config;
pub mod errors;
pub mod models;
pub mod traits;

pub use crate::config::{
    AgentConfig, BackendConfig, CleanupObject, CommissionConfig, ConfigValidator,
    DeploymentsConfig, JobsConfig, LogConfig, WorkerConfig,
};
pub use crate::errors::{AgentError, AgentResult};
pub use crate::traits::{BackendClient, ContainerEngine, OrchestrationBackend};
