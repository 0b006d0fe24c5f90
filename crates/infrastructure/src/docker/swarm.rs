use async_trait::async_trait;
use fleet_agent_core::models::{DeploymentSpec, ServiceSummary};
use fleet_agent_core::{AgentError, AgentResult, OrchestrationBackend};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::cli::{args, as_orchestration, DockerCli};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StackServiceEntry {
    #[serde(default)]
    name: String,
    #[serde(default)]
    image: String,
    #[serde(default)]
    replicas: String,
}

/// `running` once every desired replica is up, `converging` otherwise.
pub fn replica_state(replicas: &str) -> &'static str {
    let counts = replicas
        .split_whitespace()
        .next()
        .and_then(|ratio| ratio.split_once('/'))
        .and_then(|(up, desired)| Some((up.parse::<u32>().ok()?, desired.parse::<u32>().ok()?)));
    match counts {
        Some((up, desired)) if desired > 0 && up >= desired => "running",
        Some((_, 0)) => "stopped",
        _ => "converging",
    }
}

/// Parses `docker stack services --format json` (one object per line).
pub fn parse_stack_services(output: &str) -> AgentResult<Vec<ServiceSummary>> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let entry: StackServiceEntry = serde_json::from_str(line)?;
            Ok(ServiceSummary {
                state: replica_state(&entry.replicas).to_string(),
                name: entry.name,
                image: entry.image,
                replicas: Some(entry.replicas),
            })
        })
        .collect()
}

/// Swarm stacks through `docker stack`.
#[derive(Debug, Clone, Default)]
pub struct SwarmBackend {
    cli: DockerCli,
}

impl SwarmBackend {
    pub const NAME: &'static str = "swarm";

    pub fn new(cli: DockerCli) -> Self {
        Self { cli }
    }
}

#[async_trait]
impl OrchestrationBackend for SwarmBackend {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn start(&self, spec: &DeploymentSpec) -> AgentResult<()> {
        let compose_file = spec.compose_file().to_string_lossy().to_string();
        // stack deploy 不读取 .env, 变量通过进程环境传入
        self.cli
            .run_with(
                args([
                    "stack",
                    "deploy",
                    "--with-registry-auth",
                    "--prune",
                    "-c",
                    &compose_file,
                    &spec.project,
                ]),
                Some(&spec.working_dir),
                &spec.env,
            )
            .await
            .map_err(as_orchestration)?;
        info!(project = %spec.project, "stack deployed");
        Ok(())
    }

    async fn stop(&self, project: &str) -> AgentResult<()> {
        self.cli
            .run(args(["stack", "rm", project]))
            .await
            .map_err(as_orchestration)?;
        info!(project, "stack removed");
        Ok(())
    }

    async fn list(&self, project: &str) -> AgentResult<Vec<ServiceSummary>> {
        let output = self
            .cli
            .run(args(["stack", "services", "--format", "json", project]))
            .await
            .map_err(as_orchestration)?;
        parse_stack_services(&output)
            .map_err(|e| AgentError::orchestration(format!("unreadable stack services output: {e}")))
    }

    async fn logs(
        &self,
        project: &str,
        tail: usize,
        consumer: mpsc::Sender<String>,
    ) -> AgentResult<()> {
        let tail = tail.to_string();
        for service in self.list(project).await? {
            let streamed = self
                .cli
                .stream_lines(
                    args([
                        "service",
                        "logs",
                        "--no-task-ids",
                        "--tail",
                        &tail,
                        &service.name,
                    ]),
                    consumer.clone(),
                )
                .await;
            if let Err(e) = streamed {
                warn!(service = %service.name, error = %e, "failed to read service logs");
            }
        }
        Ok(())
    }
}
