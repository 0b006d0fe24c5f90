pub mod app_config;
pub mod backend;
pub mod jobs;
pub mod logging;
pub mod worker;

pub use app_config::AgentConfig;
pub use backend::BackendConfig;
pub use jobs::{CommissionConfig, DeploymentsConfig, JobsConfig};
pub use logging::LogConfig;
pub use worker::{CleanupObject, WorkerConfig};
