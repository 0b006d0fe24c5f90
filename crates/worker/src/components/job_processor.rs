use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fleet_agent_core::models::{JobRecord, JobResource, JobState};
use fleet_agent_core::{AgentError, AgentResult, BackendClient, WorkerConfig};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::actions::{ActionTable, LegacyJobRunner, NativeAction};
use super::job_registry::{JobGuard, JobRegistry};
use super::lifecycle::{cancellable, ConfigMailbox, InFlight, Worker, WorkerKind};

/// A deployment-class job handed over together with its registry admission.
/// The receiver owns the release of the job id.
#[derive(Debug)]
pub struct DeploymentJob {
    pub job: JobResource,
    pub guard: JobGuard,
}

/// How a fetched job will be executed.
pub enum JobClass {
    Deployment,
    Native(Arc<dyn NativeAction>),
    Legacy { image: String },
    Unsupported,
}

impl std::fmt::Debug for JobClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobClass::Deployment => f.write_str("Deployment"),
            JobClass::Native(action) => write!(f, "Native({})", action.name()),
            JobClass::Legacy { image } => write!(f, "Legacy({image})"),
            JobClass::Unsupported => f.write_str("Unsupported"),
        }
    }
}

/// Everything one job activity needs, detached from the processor.
#[derive(Clone)]
struct JobDispatch {
    backend: Arc<dyn BackendClient>,
    registry: Arc<dyn JobRegistry>,
    actions: Arc<ActionTable>,
    legacy: Arc<LegacyJobRunner>,
    deploy_tx: mpsc::Sender<DeploymentJob>,
    legacy_jobs_enabled: bool,
    legacy_job_image: String,
    job_timeout: Duration,
}

pub(crate) async fn report_job_state(
    backend: &dyn BackendClient,
    job_id: &str,
    state: JobState,
    message: Option<&str>,
) {
    if let Err(e) = backend.set_job_state(job_id, state, message).await {
        warn!(job_id, state = %state, error = %e, "failed to report job state");
    }
}

impl JobDispatch {
    fn classify(&self, job: &JobResource) -> JobClass {
        if job.is_deployment() {
            return JobClass::Deployment;
        }
        if let Some(action) = self.actions.get(job.job_type()) {
            return JobClass::Native(Arc::clone(action));
        }
        if self.legacy_jobs_enabled {
            return JobClass::Legacy {
                image: self.legacy_job_image.clone(),
            };
        }
        JobClass::Unsupported
    }

    async fn process(self, job_id: String, cancel: CancellationToken) {
        let fetch = async {
            timeout(self.job_timeout, self.backend.fetch_job(&job_id))
                .await
                .map_err(|_| AgentError::Timeout("fetching job".to_string()))?
        };
        let job = match cancellable(&cancel, fetch).await {
            Ok(job) => job,
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "failed to fetch job");
                return;
            }
        };

        let Some(guard) = JobGuard::admit(&self.registry, JobRecord::from(&job)) else {
            debug!(job_id = %job_id, "job admitted by a concurrent delivery, dropping");
            return;
        };

        let class = self.classify(&job);
        info!(job_id = %job.id, job_type = %job.job_type(), class = ?class, "job received");

        let outcome = match class {
            JobClass::Deployment => {
                self.forward(job, guard).await;
                return;
            }
            JobClass::Unsupported => Err(AgentError::UnsupportedJob(format!(
                "{} is not supported and legacy jobs are disabled",
                job.job_type()
            ))),
            JobClass::Native(action) => {
                report_job_state(self.backend.as_ref(), &job.id, JobState::Running, None).await;
                let run = async {
                    timeout(self.job_timeout, action.execute(&job))
                        .await
                        .map_err(|_| AgentError::Timeout(format!("job exceeded {:?}", self.job_timeout)))?
                };
                cancellable(&cancel, run).await
            }
            JobClass::Legacy { image } => {
                report_job_state(self.backend.as_ref(), &job.id, JobState::Running, None).await;
                match self.legacy.run(&job, &image, self.job_timeout, &cancel).await {
                    Ok(0) => Ok("legacy job completed".to_string()),
                    Ok(code) => Err(AgentError::engine(format!(
                        "legacy job container exited with code {code}"
                    ))),
                    Err(e) => Err(e),
                }
            }
        };

        match outcome {
            Ok(message) => {
                info!(job_id = %job.id, "job succeeded");
                report_job_state(self.backend.as_ref(), &job.id, JobState::Success, Some(&message))
                    .await;
            }
            Err(e) => {
                warn!(job_id = %job.id, error = %e, "job failed");
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

    async fn forward(&self, job: JobResource, guard: JobGuard) {
        let job_id = job.id.clone();
        if let Err(mpsc::error::SendError(rejected)) =
            self.deploy_tx.send(DeploymentJob { job, guard }).await
        {
            error!(job_id = %job_id, "deployment queue closed");
            report_job_state(
                self.backend.as_ref(),
                &job_id,
                JobState::Failed,
                Some("deployment processor unavailable"),
            )
            .await;
            drop(rejected);
        }
    }
}

/// Consumes job ids, deduplicates them and runs each job as its own
/// activity.
pub struct JobProcessor {
    backend: Arc<dyn BackendClient>,
    registry: Arc<dyn JobRegistry>,
    actions: Arc<ActionTable>,
    legacy: Arc<LegacyJobRunner>,
    job_rx: mpsc::Receiver<String>,
    deploy_tx: mpsc::Sender<DeploymentJob>,
    config: WorkerConfig,
    job_timeout: Duration,
    shutdown_grace: Duration,
    in_flight: InFlight,
    mailbox: ConfigMailbox,
    conf_rx: mpsc::Receiver<WorkerConfig>,
}

impl JobProcessor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        backend: Arc<dyn BackendClient>,
        registry: Arc<dyn JobRegistry>,
        actions: ActionTable,
        legacy: LegacyJobRunner,
        job_rx: mpsc::Receiver<String>,
        deploy_tx: mpsc::Sender<DeploymentJob>,
        config: WorkerConfig,
        job_timeout: Duration,
    ) -> Self {
        let (mailbox, conf_rx) = ConfigMailbox::channel(WorkerKind::JobProcessor);
        Self {
            backend,
            registry,
            actions: Arc::new(actions),
            legacy: Arc::new(legacy),
            job_rx,
            deploy_tx,
            config,
            job_timeout,
            shutdown_grace: Duration::from_secs(10),
            in_flight: InFlight::new(WorkerKind::JobProcessor),
            mailbox,
            conf_rx,
        }
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    fn dispatch(&self) -> JobDispatch {
        JobDispatch {
            backend: Arc::clone(&self.backend),
            registry: Arc::clone(&self.registry),
            actions: Arc::clone(&self.actions),
            legacy: Arc::clone(&self.legacy),
            deploy_tx: self.deploy_tx.clone(),
            legacy_jobs_enabled: self.config.legacy_jobs_enabled,
            legacy_job_image: self.config.legacy_job_image.clone(),
            job_timeout: self.job_timeout,
        }
    }

    /// Returns `false` when the id is already in flight and was dropped.
    pub fn handle_job_id(&mut self, job_id: String) -> bool {
        if self.registry.exists(&job_id) {
            debug!(job_id = %job_id, "job already in flight, dropping duplicate");
            return false;
        }
        let dispatch = self.dispatch();
        let token = self.in_flight.job_token();
        self.in_flight.spawn(dispatch.process(job_id, token));
        true
    }
}

#[async_trait]
impl Worker for JobProcessor {
    fn kind(&self) -> WorkerKind {
        WorkerKind::JobProcessor
    }

    fn config_mailbox(&self) -> ConfigMailbox {
        self.mailbox.clone()
    }

    fn reconfigure(&mut self, config: WorkerConfig) -> AgentResult<()> {
        if config.legacy_jobs_enabled != self.config.legacy_jobs_enabled {
            info!(enabled = config.legacy_jobs_enabled, "legacy job mode changed");
        }
        self.config = config;
        Ok(())
    }

    async fn run(&mut self, cancel: CancellationToken) -> AgentResult<()> {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                Some(config) = self.conf_rx.recv() => self.reconfigure(config)?,
                Some(job_id) = self.job_rx.recv() => {
                    self.handle_job_id(job_id);
                }
                _ = self.in_flight.reap(), if !self.in_flight.is_empty() => {}
            }
        }

        self.stop().await?;
        Err(AgentError::Cancelled)
    }

    async fn stop(&mut self) -> AgentResult<()> {
        self.job_rx.close();
        self.in_flight.drain(self.shutdown_grace).await;
        Ok(())
    }
}
