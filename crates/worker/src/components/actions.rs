//! Job types executed in-process, and the helper-container path used for
//! job types this agent does not implement.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fleet_agent_core::models::{BackendCredentials, ContainerSpec, JobResource};
use fleet_agent_core::{AgentError, AgentResult, ContainerEngine};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::conf_updater::ConfSync;
use super::lifecycle::cancellable;

#[async_trait]
pub trait NativeAction: Send + Sync {
    fn name(&self) -> &str;

    /// Runs the job and returns the status message reported on success.
    async fn execute(&self, job: &JobResource) -> AgentResult<String>;
}

/// Job type -> implementation, built once at startup.
pub type ActionTable = HashMap<String, Arc<dyn NativeAction>>;

pub fn container_name(prefix: &str, job_id: &str) -> String {
    let suffix: String = job_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    format!("{prefix}-{suffix}")
}

async fn pull_best_effort(engine: &dyn ContainerEngine, image: &str) {
    if let Err(e) = engine.pull_image(image).await {
        warn!(image, error = %e, "image pull failed, trying the local copy");
    }
}

/// Reboots the host from a privileged helper container after a short delay,
/// leaving time to report the job as successful.
pub struct RebootAction {
    engine: Arc<dyn ContainerEngine>,
    image: String,
    delay: Duration,
}

impl RebootAction {
    pub const NAME: &'static str = "reboot";

    pub fn new(engine: Arc<dyn ContainerEngine>, image: impl Into<String>) -> Self {
        Self {
            engine,
            image: image.into(),
            delay: Duration::from_secs(10),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl NativeAction for RebootAction {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn execute(&self, job: &JobResource) -> AgentResult<String> {
        pull_best_effort(self.engine.as_ref(), &self.image).await;

        let mut spec = ContainerSpec::new(container_name("reboot", &job.id), self.image.clone());
        spec.command = vec![
            "sh".to_string(),
            "-c".to_string(),
            format!("sleep {} && echo b > /sysrq", self.delay.as_secs()),
        ];
        spec.binds = vec!["/proc/sysrq-trigger:/sysrq".to_string()];
        spec.privileged = true;

        let container_id = self.engine.create_and_start(&spec).await?;
        info!(job_id = %job.id, container_id = %container_id, "reboot scheduled");
        Ok(format!("reboot in {}s", self.delay.as_secs()))
    }
}

/// Forces the conf updater to refetch and redistribute configuration.
pub struct ResyncConfigAction {
    conf_sync_tx: mpsc::Sender<ConfSync>,
}

impl ResyncConfigAction {
    pub const NAME: &'static str = "resync_configuration";
    pub const ALIAS: &'static str = "update_configuration";

    pub fn new(conf_sync_tx: mpsc::Sender<ConfSync>) -> Self {
        Self { conf_sync_tx }
    }
}

#[async_trait]
impl NativeAction for ResyncConfigAction {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn execute(&self, _job: &JobResource) -> AgentResult<String> {
        self.conf_sync_tx
            .send(ConfSync::Force)
            .await
            .map_err(|_| AgentError::ChannelClosed("conf-sync queue".to_string()))?;
        Ok("configuration resync requested".to_string())
    }
}

pub fn default_actions(
    engine: Arc<dyn ContainerEngine>,
    reboot_image: &str,
    conf_sync_tx: mpsc::Sender<ConfSync>,
) -> ActionTable {
    let reboot: Arc<dyn NativeAction> = Arc::new(RebootAction::new(engine, reboot_image));
    let resync: Arc<dyn NativeAction> = Arc::new(ResyncConfigAction::new(conf_sync_tx));

    let mut actions = ActionTable::new();
    actions.insert(RebootAction::NAME.to_string(), reboot);
    actions.insert(ResyncConfigAction::NAME.to_string(), Arc::clone(&resync));
    actions.insert(ResyncConfigAction::ALIAS.to_string(), resync);
    actions
}

/// Runs unsupported job types inside a helper container that embeds the
/// legacy implementation.
pub struct LegacyJobRunner {
    engine: Arc<dyn ContainerEngine>,
    credentials: BackendCredentials,
}

impl LegacyJobRunner {
    pub fn new(engine: Arc<dyn ContainerEngine>, credentials: BackendCredentials) -> Self {
        Self {
            engine,
            credentials,
        }
    }

    pub fn container_spec(&self, job: &JobResource, image: &str) -> ContainerSpec {
        let mut spec = ContainerSpec::new(container_name("legacy-job", &job.id), image);
        spec.command = vec![
            "--api-url".to_string(),
            self.credentials.endpoint.clone(),
            "--api-key".to_string(),
            self.credentials.api_key.clone(),
            "--api-secret".to_string(),
            self.credentials.api_secret.clone(),
            "--job-id".to_string(),
            job.id.clone(),
        ];
        if self.credentials.insecure {
            spec.command.push("--api-insecure".to_string());
        }
        spec.network_mode = Some("host".to_string());
        spec
    }

    /// Runs the helper container to completion and returns its exit code.
    /// The container is removed afterwards on a best-effort basis, also when
    /// `cancel` interrupts the wait.
    pub async fn run(
        &self,
        job: &JobResource,
        image: &str,
        wait: Duration,
        cancel: &CancellationToken,
    ) -> AgentResult<i64> {
        pull_best_effort(self.engine.as_ref(), image).await;

        let spec = self.container_spec(job, image);
        let container_id = self.engine.create_and_start(&spec).await?;
        info!(job_id = %job.id, container_id = %container_id, image, "legacy job container started");

        let exit_code = cancellable(cancel, self.engine.wait_for_exit(&container_id, wait)).await;
        if let Err(e) = self.engine.remove_container(&container_id).await {
            warn!(container_id = %container_id, error = %e, "failed to remove legacy job container");
        }
        exit_code
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_name_is_engine_safe() {
        assert_eq!(container_name("legacy-job", "job/1a2b"), "legacy-job-job-1a2b");
    }

    #[tokio::test]
    async fn test_resync_requests_forced_refresh() {
        let (tx, mut rx) = mpsc::channel(1);
        let action = ResyncConfigAction::new(tx);

        let message = action
            .execute(&JobResource::new("job/1", ResyncConfigAction::NAME))
            .await
            .expect("resync failed");
        assert_eq!(message, "configuration resync requested");

        let signal = rx.recv().await.expect("no signal sent");
        assert_eq!(signal, ConfSync::Force);
    }
}
