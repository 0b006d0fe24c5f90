use std::path::Path;

use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use super::{
    backend::BackendConfig,
    jobs::{CommissionConfig, DeploymentsConfig, JobsConfig},
    logging::LogConfig,
    worker::WorkerConfig,
};
use crate::config::validation::ConfigValidator;
use crate::{AgentError, AgentResult};

const DEFAULT_CONFIG_PATHS: [&str; 3] = [
    "config/fleet-agent.toml",
    "fleet-agent.toml",
    "/etc/fleet-agent/config.toml",
];

const ENV_PREFIX: &str = "FLEET_AGENT";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub backend: BackendConfig,
    pub worker: WorkerConfig,
    pub jobs: JobsConfig,
    pub deployments: DeploymentsConfig,
    pub commission: CommissionConfig,
    pub logging: LogConfig,
}

impl AgentConfig {
    /// Loads the configuration from an explicit TOML file (or the first
    /// default location that exists) layered with `FLEET_AGENT__*`
    /// environment variables, then validates it.
    pub fn load(config_path: Option<&str>) -> AgentResult<Self> {
        let config = Self::load_unvalidated(config_path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_unvalidated(config_path: Option<&str>) -> AgentResult<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_path {
            if !Path::new(path).exists() {
                return Err(AgentError::config_error(format!("配置文件不存在: {path}")));
            }
            builder = builder.add_source(File::new(path, FileFormat::Toml));
        } else if let Some(path) = DEFAULT_CONFIG_PATHS
            .iter()
            .find(|path| Path::new(path).exists())
        {
            builder = builder.add_source(File::new(path, FileFormat::Toml));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?.try_deserialize::<AgentConfig>()?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> AgentResult<Self> {
        let config = ConfigBuilder::builder()
            .add_source(File::from_str(content, FileFormat::Toml))
            .build()?
            .try_deserialize::<AgentConfig>()?;
        Ok(config)
    }
}

impl ConfigValidator for AgentConfig {
    fn validate(&self) -> AgentResult<()> {
        self.backend.validate()?;
        self.worker.validate()?;
        self.jobs.validate()?;
        self.deployments.validate()?;
        self.commission.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}
