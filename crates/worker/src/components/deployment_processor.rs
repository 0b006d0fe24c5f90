//! Deployment jobs: orchestrator selection and the deployment state machine.
//!
//! Mutating actions move the remote deployment through
//! `Starting -> Started | Error` or `Stopping -> Stopped | Error`. The action
//! outcome is authoritative; a failure to report a state is only logged.

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use async_trait::async_trait;
use fleet_agent_core::models::{
    validate_project_name, DeploymentAction, DeploymentResource, DeploymentSpec, DeploymentState,
    JobResource, JobState, OrchestratorKey,
};
use fleet_agent_core::{
    AgentError, AgentResult, BackendClient, DeploymentsConfig, OrchestrationBackend, WorkerConfig,
};
use tokio::sync::{mpsc, OwnedMutexGuard};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::job_processor::{report_job_state, DeploymentJob};
use super::lifecycle::{cancellable, ConfigMailbox, InFlight, Worker, WorkerKind};

/// Capacity of the channel between a log stream and its collector.
const LOG_CHANNEL_CAPACITY: usize = 256;

/// Orchestration backends keyed by module subtype and compatibility.
pub type OrchestratorTable = HashMap<OrchestratorKey, Arc<dyn OrchestrationBackend>>;

/// One async lock per deployment id. Entries disappear once no job holds
/// or waits for them.
#[derive(Debug, Default)]
pub struct DeploymentLocks {
    locks: Mutex<HashMap<String, Weak<tokio::sync::Mutex<()>>>>,
}

impl DeploymentLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, deployment_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            locks.retain(|_, lock| lock.strong_count() > 0);
            match locks.get(deployment_id).and_then(Weak::upgrade) {
                Some(lock) => lock,
                None => {
                    let lock = Arc::new(tokio::sync::Mutex::new(()));
                    locks.insert(deployment_id.to_string(), Arc::downgrade(&lock));
                    lock
                }
            }
        };
        lock.lock_owned().await
    }

    pub fn len(&self) -> usize {
        let locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.values().filter(|lock| lock.strong_count() > 0).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

async fn bounded<T, F>(limit: Duration, what: &str, operation: F) -> AgentResult<T>
where
    F: Future<Output = AgentResult<T>>,
{
    timeout(limit, operation)
        .await
        .map_err(|_| AgentError::Timeout(format!("{what} exceeded {limit:?}")))?
}

/// Everything one deployment activity needs, detached from the processor.
#[derive(Clone)]
struct DeploymentDispatch {
    backend: Arc<dyn BackendClient>,
    orchestrators: Arc<OrchestratorTable>,
    locks: Arc<DeploymentLocks>,
    working_dir: PathBuf,
    operation_timeout: Duration,
    log_tail_lines: usize,
}

impl DeploymentDispatch {
    async fn process(self, deployment_job: DeploymentJob, cancel: CancellationToken) {
        let DeploymentJob { job, guard } = deployment_job;

        report_job_state(self.backend.as_ref(), &job.id, JobState::Running, None).await;

        let outcome = self.execute(&job, &cancel).await;

        match outcome {
            Ok(message) => {
                info!(job_id = %job.id, "deployment job succeeded");
                report_job_state(self.backend.as_ref(), &job.id, JobState::Success, Some(&message))
                    .await;
            }
            Err(e) => {
                warn!(job_id = %job.id, error = %e, "deployment job failed");
                report_job_state(
                    self.backend.as_ref(),
                    &job.id,
                    JobState::Failed,
                    Some(&e.to_string()),
                )
                .await;
            }
        }
        drop(guard);
    }

    async fn execute(&self, job: &JobResource, cancel: &CancellationToken) -> AgentResult<String> {
        let action = DeploymentAction::from_job_type(job.job_type())
            .ok_or_else(|| AgentError::UnsupportedJob(job.job_type().to_string()))?;
        let deployment_id = job.target_href().ok_or_else(|| {
            AgentError::validation_error(format!("job {} has no target deployment", job.id))
        })?;

        let _lock = cancellable(cancel, async { Ok(self.locks.acquire(deployment_id).await) }).await?;
        debug!(job_id = %job.id, deployment_id, action = %action, "deployment lock acquired");

        let deployment = cancellable(cancel, self.backend.fetch_deployment(deployment_id)).await?;
        validate_project_name(deployment.project_name())?;
        let orchestrator = self.resolve(&deployment)?;

        match action {
            DeploymentAction::Start | DeploymentAction::Update | DeploymentAction::Stop => {
                self.transition(&deployment, action, orchestrator, cancel).await
            }
            DeploymentAction::FetchLogs => {
                cancellable(cancel, self.fetch_logs(&deployment, orchestrator)).await
            }
            DeploymentAction::State => {
                cancellable(cancel, self.report_services(&deployment, orchestrator)).await
            }
        }
    }

    fn resolve(&self, deployment: &DeploymentResource) -> AgentResult<Arc<dyn OrchestrationBackend>> {
        let key = deployment.module.orchestrator_key();
        self.orchestrators
            .get(&key)
            .cloned()
            .ok_or_else(|| AgentError::NotImplemented(format!("orchestrator {key}")))
    }

    async fn set_state(&self, deployment_id: &str, state: DeploymentState) {
        if let Err(e) = self.backend.set_deployment_state(deployment_id, state).await {
            warn!(deployment_id, state = %state, error = %e, "failed to report deployment state");
        }
    }

    async fn transition(
        &self,
        deployment: &DeploymentResource,
        action: DeploymentAction,
        orchestrator: Arc<dyn OrchestrationBackend>,
        cancel: &CancellationToken,
    ) -> AgentResult<String> {
        let Some((entering, done)) = action.transitions() else {
            return Err(AgentError::Internal(format!("{action} has no state transition")));
        };
        let project = deployment.project_name();

        self.set_state(&deployment.id, entering).await;

        // 被取消的操作同样落入 Error 分支, 远端状态不会停留在中间态
        let result = cancellable(cancel, async {
            match action {
                DeploymentAction::Stop => {
                    bounded(self.operation_timeout, "stop", orchestrator.stop(project)).await
                }
                _ => {
                    let spec = self.prepare(deployment).await?;
                    bounded(self.operation_timeout, "start", orchestrator.start(&spec)).await
                }
            }
        })
        .await;

        match result {
            Ok(()) => {
                self.set_state(&deployment.id, done).await;
                info!(
                    deployment_id = %deployment.id,
                    orchestrator = orchestrator.name(),
                    state = %done,
                    "deployment transitioned"
                );
                Ok(format!("deployment {done}"))
            }
            Err(e) => {
                self.set_state(&deployment.id, DeploymentState::Error).await;
                Err(e)
            }
        }
    }

    /// Writes the compose file and environment under the project directory.
    async fn prepare(&self, deployment: &DeploymentResource) -> AgentResult<DeploymentSpec> {
        let content = deployment
            .module
            .content
            .docker_compose
            .clone()
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| {
                AgentError::validation_error(format!(
                    "deployment {} has no compose content",
                    deployment.id
                ))
            })?;

        let spec = DeploymentSpec {
            project: deployment.project_name().to_string(),
            content,
            env: deployment.environment(),
            working_dir: self.working_dir.join(deployment.project_name()),
        };

        tokio::fs::create_dir_all(&spec.working_dir).await?;
        tokio::fs::write(spec.compose_file(), &spec.content).await?;
        tokio::fs::write(spec.env_file(), spec.env_file_content()).await?;
        Ok(spec)
    }

    async fn fetch_logs(
        &self,
        deployment: &DeploymentResource,
        orchestrator: Arc<dyn OrchestrationBackend>,
    ) -> AgentResult<String> {
        let (tx, mut rx) = mpsc::channel(LOG_CHANNEL_CAPACITY);
        let collect = async move {
            let mut lines = Vec::new();
            while let Some(line) = rx.recv().await {
                lines.push(line);
            }
            lines
        };
        let stream = bounded(
            self.operation_timeout,
            "logs",
            orchestrator.logs(deployment.project_name(), self.log_tail_lines, tx),
        );

        let (streamed, lines) = tokio::join!(stream, collect);
        streamed?;

        let count = lines.len();
        self.backend.push_deployment_logs(&deployment.id, lines).await?;
        Ok(format!("{count} log lines pushed"))
    }

    async fn report_services(
        &self,
        deployment: &DeploymentResource,
        orchestrator: Arc<dyn OrchestrationBackend>,
    ) -> AgentResult<String> {
        let services = bounded(
            self.operation_timeout,
            "list",
            orchestrator.list(deployment.project_name()),
        )
        .await?;
        self.backend
            .report_deployment_services(&deployment.id, &services)
            .await?;
        Ok(format!("{} services reported", services.len()))
    }
}

/// Runs deployment jobs forwarded by the job processor.
pub struct DeploymentProcessor {
    backend: Arc<dyn BackendClient>,
    orchestrators: Arc<OrchestratorTable>,
    locks: Arc<DeploymentLocks>,
    settings: DeploymentsConfig,
    deploy_rx: mpsc::Receiver<DeploymentJob>,
    shutdown_grace: Duration,
    in_flight: InFlight,
    mailbox: ConfigMailbox,
    conf_rx: mpsc::Receiver<WorkerConfig>,
}

impl DeploymentProcessor {
    pub fn new(
        backend: Arc<dyn BackendClient>,
        orchestrators: OrchestratorTable,
        settings: DeploymentsConfig,
        deploy_rx: mpsc::Receiver<DeploymentJob>,
    ) -> Self {
        let (mailbox, conf_rx) = ConfigMailbox::channel(WorkerKind::DeploymentProcessor);
        Self {
            backend,
            orchestrators: Arc::new(orchestrators),
            locks: Arc::new(DeploymentLocks::new()),
            settings,
            deploy_rx,
            shutdown_grace: Duration::from_secs(10),
            in_flight: InFlight::new(WorkerKind::DeploymentProcessor),
            mailbox,
            conf_rx,
        }
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn supports(&self, key: &OrchestratorKey) -> bool {
        self.orchestrators.contains_key(key)
    }

    fn dispatch(&self) -> DeploymentDispatch {
        DeploymentDispatch {
            backend: Arc::clone(&self.backend),
            orchestrators: Arc::clone(&self.orchestrators),
            locks: Arc::clone(&self.locks),
            working_dir: self.settings.working_dir.clone(),
            operation_timeout: self.settings.operation_timeout(),
            log_tail_lines: self.settings.log_tail_lines,
        }
    }

    pub fn handle_job(&mut self, job: DeploymentJob) {
        let dispatch = self.dispatch();
        let token = self.in_flight.job_token();
        self.in_flight.spawn(dispatch.process(job, token));
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }
}

#[async_trait]
impl Worker for DeploymentProcessor {
    fn kind(&self) -> WorkerKind {
        WorkerKind::DeploymentProcessor
    }

    fn config_mailbox(&self) -> ConfigMailbox {
        self.mailbox.clone()
    }

    fn reconfigure(&mut self, _config: WorkerConfig) -> AgentResult<()> {
        Ok(())
    }

    async fn run(&mut self, cancel: CancellationToken) -> AgentResult<()> {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                Some(config) = self.conf_rx.recv() => self.reconfigure(config)?,
                Some(job) = self.deploy_rx.recv() => self.handle_job(job),
                _ = self.in_flight.reap(), if !self.in_flight.is_empty() => {}
            }
        }

        self.stop().await?;
        Err(AgentError::Cancelled)
    }

    async fn stop(&mut self) -> AgentResult<()> {
        self.deploy_rx.close();
        // 队列中尚未开始的任务随接收端一起释放
        while let Ok(job) = self.deploy_rx.try_recv() {
            report_job_state(
                self.backend.as_ref(),
                &job.job.id,
                JobState::Failed,
                Some("agent shutting down"),
            )
            .await;
        }
        self.in_flight.drain(self.shutdown_grace).await;
        Ok(())
    }
}
