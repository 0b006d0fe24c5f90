use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::models::{DeploymentSpec, ServiceSummary};
use crate::AgentResult;

/// One orchestration technology (Compose, Swarm, ...).
#[async_trait]
pub trait OrchestrationBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn start(&self, spec: &DeploymentSpec) -> AgentResult<()>;

    async fn stop(&self, project: &str) -> AgentResult<()>;

    async fn list(&self, project: &str) -> AgentResult<Vec<ServiceSummary>>;

    /// Streams the last `tail` log lines of every service of the project
    /// into `consumer`.
    async fn logs(
        &self,
        project: &str,
        tail: usize,
        consumer: mpsc::Sender<String>,
    ) -> AgentResult<()>;
}
