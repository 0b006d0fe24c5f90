use std::time::Duration;

use async_trait::async_trait;

use crate::models::{ContainerSpec, PruneTarget};
use crate::AgentResult;

/// Raw container-engine operations used by legacy jobs, native actions and
/// the resource cleaner.
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    async fn pull_image(&self, image: &str) -> AgentResult<()>;

    /// Creates and starts a container, returning its id.
    async fn create_and_start(&self, spec: &ContainerSpec) -> AgentResult<String>;

    /// Waits for the container to exit and returns its exit code.
    async fn wait_for_exit(&self, container_id: &str, timeout: Duration) -> AgentResult<i64>;

    async fn remove_container(&self, container_id: &str) -> AgentResult<()>;

    async fn prune(&self, target: PruneTarget) -> AgentResult<()>;
}
