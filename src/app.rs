use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use fleet_agent_core::models::OrchestratorKey;
use fleet_agent_core::{AgentConfig, BackendClient, ConfigValidator, ContainerEngine};
use fleet_agent_infrastructure::{
    ComposeBackend, DockerCli, DockerEngine, HttpBackendClient, SwarmBackend,
};
use fleet_agent_worker::WorkerService;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Deployment subtype served by the bundled orchestration backends.
pub const APPLICATION_SUBTYPE: &str = "application";

pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// 命令行对配置文件的覆盖
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub device_id: Option<String>,
    pub endpoint: Option<String>,
    pub log_level: Option<String>,
    pub log_format: Option<String>,
}

impl Overrides {
    pub fn apply(&self, config: &mut AgentConfig) {
        if let Some(device_id) = &self.device_id {
            config.backend.device_id = device_id.clone();
        }
        if let Some(endpoint) = &self.endpoint {
            config.backend.endpoint = endpoint.clone();
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        if let Some(format) = &self.log_format {
            config.logging.format = format.clone();
        }
    }
}

/// Loads the layered configuration, applies the command line overrides and
/// validates the result.
pub fn load_config(config_path: Option<&str>, overrides: &Overrides) -> Result<AgentConfig> {
    let mut config = AgentConfig::load_unvalidated(config_path).with_context(|| match config_path {
        Some(path) => format!("加载配置文件失败: {path}"),
        None => "加载默认配置失败".to_string(),
    })?;
    overrides.apply(&mut config);
    config.validate().context("配置校验失败")?;
    Ok(config)
}

/// 主应用程序
pub struct Application {
    service: WorkerService,
    shutdown_timeout: Duration,
}

impl Application {
    /// Wires the HTTP backend client and the Docker collaborators into the
    /// worker service.
    pub fn new(config: AgentConfig) -> Result<Self> {
        let backend: Arc<dyn BackendClient> =
            Arc::new(HttpBackendClient::new(&config.backend).context("创建后端客户端失败")?);
        let cli = DockerCli::new();
        let engine: Arc<dyn ContainerEngine> = Arc::new(DockerEngine::new(cli.clone()));

        let service = Self::builder(backend, engine, cli, &config).build();
        info!(
            device_id = %config.backend.device_id,
            endpoint = %config.backend.endpoint,
            "fleet agent initialized"
        );

        Ok(Self {
            service,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        })
    }

    fn builder(
        backend: Arc<dyn BackendClient>,
        engine: Arc<dyn ContainerEngine>,
        cli: DockerCli,
        config: &AgentConfig,
    ) -> fleet_agent_worker::WorkerServiceBuilder {
        WorkerService::builder(backend, engine)
            .worker_config(config.worker.clone())
            .jobs_config(config.jobs.clone())
            .deployments_config(config.deployments.clone())
            .commission_config(config.commission.clone())
            .orchestrator(
                OrchestratorKey::new(APPLICATION_SUBTYPE, ComposeBackend::NAME),
                Arc::new(ComposeBackend::new(cli.clone())),
            )
            .orchestrator(
                OrchestratorKey::new(APPLICATION_SUBTYPE, SwarmBackend::NAME),
                Arc::new(SwarmBackend::new(cli)),
            )
    }

    pub fn with_shutdown_timeout(mut self, shutdown_timeout: Duration) -> Self {
        self.shutdown_timeout = shutdown_timeout;
        self
    }

    /// Runs until `cancel` fires or a task fails.
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        self.service
            .run(cancel, self.shutdown_timeout)
            .await
            .context("worker service stopped with an error")
    }
}
