use async_trait::async_trait;
use fleet_agent_core::models::{DeploymentSpec, ServiceSummary};
use fleet_agent_core::{AgentError, AgentResult, OrchestrationBackend};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::info;

use super::cli::{args, as_orchestration, DockerCli};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ComposePsEntry {
    #[serde(default)]
    name: String,
    #[serde(default)]
    service: String,
    #[serde(default)]
    image: String,
    #[serde(default)]
    state: String,
}

impl From<ComposePsEntry> for ServiceSummary {
    fn from(entry: ComposePsEntry) -> Self {
        ServiceSummary {
            name: if entry.service.is_empty() {
                entry.name
            } else {
                entry.service
            },
            image: entry.image,
            state: entry.state,
            replicas: None,
        }
    }
}

/// Parses `docker compose ps --format json`, which is a JSON array on older
/// releases and one object per line on newer ones.
pub fn parse_compose_ps(output: &str) -> AgentResult<Vec<ServiceSummary>> {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    let entries: Vec<ComposePsEntry> = if trimmed.starts_with('[') {
        serde_json::from_str(trimmed)?
    } else {
        trimmed
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str::<ComposePsEntry>(line))
            .collect::<Result<_, _>>()?
    };
    Ok(entries.into_iter().map(ServiceSummary::from).collect())
}

/// Compose projects through `docker compose`.
#[derive(Debug, Clone, Default)]
pub struct ComposeBackend {
    cli: DockerCli,
}

impl ComposeBackend {
    pub const NAME: &'static str = "docker-compose";

    pub fn new(cli: DockerCli) -> Self {
        Self { cli }
    }

    pub fn up_args(spec: &DeploymentSpec) -> Vec<String> {
        vec![
            "compose".to_string(),
            "-p".to_string(),
            spec.project.clone(),
            "-f".to_string(),
            spec.compose_file().to_string_lossy().to_string(),
            "--env-file".to_string(),
            spec.env_file().to_string_lossy().to_string(),
            "up".to_string(),
            "-d".to_string(),
            "--remove-orphans".to_string(),
        ]
    }
}

#[async_trait]
impl OrchestrationBackend for ComposeBackend {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn start(&self, spec: &DeploymentSpec) -> AgentResult<()> {
        self.cli
            .run_with(Self::up_args(spec), Some(&spec.working_dir), &spec.env)
            .await
            .map_err(as_orchestration)?;
        info!(project = %spec.project, "compose project up");
        Ok(())
    }

    async fn stop(&self, project: &str) -> AgentResult<()> {
        self.cli
            .run(args(["compose", "-p", project, "down", "--remove-orphans"]))
            .await
            .map_err(as_orchestration)?;
        info!(project, "compose project down");
        Ok(())
    }

    async fn list(&self, project: &str) -> AgentResult<Vec<ServiceSummary>> {
        let output = self
            .cli
            .run(args(["compose", "-p", project, "ps", "--all", "--format", "json"]))
            .await
            .map_err(as_orchestration)?;
        parse_compose_ps(&output)
            .map_err(|e| AgentError::orchestration(format!("unreadable compose ps output: {e}")))
    }

    async fn logs(
        &self,
        project: &str,
        tail: usize,
        consumer: mpsc::Sender<String>,
    ) -> AgentResult<()> {
        let tail = tail.to_string();
        self.cli
            .stream_lines(
                args(["compose", "-p", project, "logs", "--no-color", "--tail", &tail]),
                consumer,
            )
            .await
            .map_err(as_orchestration)
    }
}
