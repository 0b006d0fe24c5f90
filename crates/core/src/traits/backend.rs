use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::models::{
    BackendCredentials, DeploymentResource, DeploymentState, DeviceConfigFields,
    HeartbeatResponse, JobResource, JobState, ServiceSummary,
};
use crate::AgentResult;

/// Fleet-management backend as seen by the agent.
///
/// One client is shared by reference between every task; implementations
/// must be safe to call concurrently.
#[async_trait]
pub trait BackendClient: Send + Sync {
    async fn heartbeat(&self) -> AgentResult<HeartbeatResponse>;

    async fn fetch_device_config(&self, fields: &[&str]) -> AgentResult<DeviceConfigFields>;

    async fn commission(&self, payload: Map<String, Value>) -> AgentResult<()>;

    async fn fetch_job(&self, job_id: &str) -> AgentResult<JobResource>;

    async fn set_job_state(
        &self,
        job_id: &str,
        state: JobState,
        message: Option<&str>,
    ) -> AgentResult<()>;

    async fn fetch_deployment(&self, deployment_id: &str) -> AgentResult<DeploymentResource>;

    async fn set_deployment_state(
        &self,
        deployment_id: &str,
        state: DeploymentState,
    ) -> AgentResult<()>;

    async fn push_deployment_logs(&self, deployment_id: &str, lines: Vec<String>)
        -> AgentResult<()>;

    async fn report_deployment_services(
        &self,
        deployment_id: &str,
        services: &[ServiceSummary],
    ) -> AgentResult<()>;

    /// Credentials forwarded to helper containers (legacy jobs).
    fn credentials(&self) -> BackendCredentials;
}
