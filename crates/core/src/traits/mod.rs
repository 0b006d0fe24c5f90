pub mod backend;
pub mod container_engine;
pub mod orchestrator;

pub use backend::BackendClient;
pub use container_engine::ContainerEngine;
pub use orchestrator::OrchestrationBackend;
