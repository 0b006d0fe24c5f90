use std::sync::Arc;
use std::time::Duration;

use fleet_agent_core::models::{CommissionAttributes, CommissionUpdate, OrchestratorKey};
use fleet_agent_core::{
    AgentError, AgentResult, BackendClient, CommissionConfig, ContainerEngine, DeploymentsConfig,
    JobsConfig, OrchestrationBackend, WorkerConfig,
};
use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinSet};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::components::{
    default_actions, Commissioner, ConfUpdater, DeploymentProcessor, Heartbeat,
    InMemoryJobRegistry, JobProcessor, JobRegistry, LegacyJobRunner, OrchestratorTable,
    ResourceCleaner, Worker, WorkerKind, DISTRIBUTION_TIMEOUT,
};

/// Worker服务构建器
pub struct WorkerServiceBuilder {
    backend: Arc<dyn BackendClient>,
    engine: Arc<dyn ContainerEngine>,
    orchestrators: OrchestratorTable,
    registry: Option<Arc<dyn JobRegistry>>,
    worker: WorkerConfig,
    jobs: JobsConfig,
    deployments: DeploymentsConfig,
    commission: CommissionConfig,
    distribution_timeout: Duration,
}

impl WorkerServiceBuilder {
    pub fn new(backend: Arc<dyn BackendClient>, engine: Arc<dyn ContainerEngine>) -> Self {
        Self {
            backend,
            engine,
            orchestrators: OrchestratorTable::new(),
            registry: None,
            worker: WorkerConfig::default(),
            jobs: JobsConfig::default(),
            deployments: DeploymentsConfig::default(),
            commission: CommissionConfig::default(),
            distribution_timeout: DISTRIBUTION_TIMEOUT,
        }
    }

    pub fn worker_config(mut self, worker: WorkerConfig) -> Self {
        self.worker = worker;
        self
    }

    pub fn jobs_config(mut self, jobs: JobsConfig) -> Self {
        self.jobs = jobs;
        self
    }

    pub fn deployments_config(mut self, deployments: DeploymentsConfig) -> Self {
        self.deployments = deployments;
        self
    }

    pub fn commission_config(mut self, commission: CommissionConfig) -> Self {
        self.commission = commission;
        self
    }

    /// 注册编排后端
    pub fn orchestrator(mut self, key: OrchestratorKey, backend: Arc<dyn OrchestrationBackend>) -> Self {
        self.orchestrators.insert(key, backend);
        self
    }

    pub fn registry(mut self, registry: Arc<dyn JobRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn distribution_timeout(mut self, distribution_timeout: Duration) -> Self {
        self.distribution_timeout = distribution_timeout;
        self
    }

    /// 创建所有任务并连接它们之间的通道, 不启动任何后台工作
    pub fn build(self) -> WorkerService {
        let registry = self.registry.unwrap_or_else(InMemoryJobRegistry::shared);

        let (job_tx, job_rx) = mpsc::channel(self.jobs.job_queue_capacity.max(1));
        let (deploy_tx, deploy_rx) = mpsc::channel(self.jobs.deployment_queue_capacity.max(1));
        let (conf_sync_tx, conf_sync_rx) = mpsc::channel(self.jobs.conf_sync_queue_capacity.max(1));

        let heartbeat = Heartbeat::new(
            Arc::clone(&self.backend),
            job_tx.clone(),
            conf_sync_tx.clone(),
            self.worker.clone(),
        );

        let actions = default_actions(
            Arc::clone(&self.engine),
            &self.jobs.reboot_image,
            conf_sync_tx,
        );
        let legacy = LegacyJobRunner::new(Arc::clone(&self.engine), self.backend.credentials());
        let job_processor = JobProcessor::new(
            Arc::clone(&self.backend),
            Arc::clone(&registry),
            actions,
            legacy,
            job_rx,
            deploy_tx,
            self.worker.clone(),
            self.jobs.job_timeout(),
        )
        .with_shutdown_grace(self.jobs.shutdown_grace());

        let deployment_processor = DeploymentProcessor::new(
            Arc::clone(&self.backend),
            self.orchestrators,
            self.deployments,
            deploy_rx,
        )
        .with_shutdown_grace(self.jobs.shutdown_grace());

        let commissioner = Commissioner::new(
            Arc::clone(&self.backend),
            self.worker.clone(),
            CommissionAttributes::with_defaults(
                self.commission.default_tags,
                self.commission.default_capabilities,
            ),
            self.commission.attribute_queue_capacity,
        );

        let resource_cleaner = ResourceCleaner::new(Arc::clone(&self.engine), self.worker.clone());

        let mut conf_updater = ConfUpdater::new(self.backend, conf_sync_rx, self.worker)
            .with_distribution_timeout(self.distribution_timeout);
        conf_updater.subscribe(heartbeat.config_mailbox());
        conf_updater.subscribe(commissioner.config_mailbox());
        conf_updater.subscribe(job_processor.config_mailbox());
        conf_updater.subscribe(deployment_processor.config_mailbox());
        conf_updater.subscribe(resource_cleaner.config_mailbox());

        WorkerService {
            registry,
            job_tx,
            attribute_tx: commissioner.attribute_sender(),
            heartbeat,
            conf_updater,
            commissioner,
            job_processor,
            deployment_processor,
            resource_cleaner,
        }
    }
}

/// The six coordination tasks, wired and ready to run.
pub struct WorkerService {
    registry: Arc<dyn JobRegistry>,
    job_tx: mpsc::Sender<String>,
    attribute_tx: mpsc::Sender<CommissionUpdate>,
    heartbeat: Heartbeat,
    conf_updater: ConfUpdater,
    commissioner: Commissioner,
    job_processor: JobProcessor,
    deployment_processor: DeploymentProcessor,
    resource_cleaner: ResourceCleaner,
}

type TaskOutcome = (WorkerKind, AgentResult<()>);

/// Starts `worker` and tracks it in `tasks`; the returned handle aborts the
/// worker itself, not only its tracking wrapper.
fn launch<W: Worker>(
    tasks: &mut JoinSet<TaskOutcome>,
    worker: W,
    cancel: &CancellationToken,
) -> AbortHandle {
    let kind = worker.kind();
    let handle = worker.start(cancel.clone());
    let abort = handle.abort_handle();
    tasks.spawn(async move {
        let result = match handle.await {
            Ok(result) => result,
            Err(e) => Err(AgentError::Internal(format!("task panicked: {e}"))),
        };
        (kind, result)
    });
    abort
}

impl WorkerService {
    pub fn builder(
        backend: Arc<dyn BackendClient>,
        engine: Arc<dyn ContainerEngine>,
    ) -> WorkerServiceBuilder {
        WorkerServiceBuilder::new(backend, engine)
    }

    pub fn registry(&self) -> Arc<dyn JobRegistry> {
        Arc::clone(&self.registry)
    }

    /// Job-id queue, the same one the heartbeat feeds.
    pub fn job_sender(&self) -> mpsc::Sender<String> {
        self.job_tx.clone()
    }

    /// Attribute updates for the commissioner (telemetry, health checks).
    pub fn attribute_sender(&self) -> mpsc::Sender<CommissionUpdate> {
        self.attribute_tx.clone()
    }

    /// Starts every task and waits for the first one to end.
    ///
    /// Cancellation of `cancel` is the orderly way out and yields `Ok(())`.
    /// Any other task result is fatal: the root token is cancelled, the
    /// remaining tasks get `shutdown_timeout` to stop and the first error is
    /// returned.
    pub async fn run(self, cancel: CancellationToken, shutdown_timeout: Duration) -> AgentResult<()> {
        let mut tasks = JoinSet::new();
        let workers = [
            launch(&mut tasks, self.conf_updater, &cancel),
            launch(&mut tasks, self.heartbeat, &cancel),
            launch(&mut tasks, self.commissioner, &cancel),
            launch(&mut tasks, self.job_processor, &cancel),
            launch(&mut tasks, self.deployment_processor, &cancel),
            launch(&mut tasks, self.resource_cleaner, &cancel),
        ];
        info!(tasks = tasks.len(), "all worker tasks started");

        let first = tasks.join_next().await;
        let outcome = match first {
            Some(Ok((_, Err(e)))) if e.is_cancelled() => Ok(()),
            Some(Ok((kind, Err(e)))) => {
                error!(worker = %kind, error = %e, "worker task failed, shutting down");
                Err(e)
            }
            Some(Ok((kind, Ok(())))) => {
                error!(worker = %kind, "worker task exited unexpectedly, shutting down");
                Err(AgentError::Internal(format!("{kind} exited without cancellation")))
            }
            Some(Err(e)) => Err(AgentError::Internal(format!("supervisor task failed: {e}"))),
            None => Ok(()),
        };
        cancel.cancel();

        let remaining = async {
            while let Some(joined) = tasks.join_next().await {
                if let Ok((kind, Err(e))) = joined {
                    if e.is_fatal() {
                        warn!(worker = %kind, error = %e, "worker task failed during shutdown");
                    }
                }
            }
        };
        if timeout(shutdown_timeout, remaining).await.is_err() {
            warn!(remaining = tasks.len(), "worker tasks did not stop in time, aborting");
            for worker in &workers {
                worker.abort();
            }
            tasks.abort_all();
        }

        info!("all worker tasks stopped");
        outcome
    }
}
