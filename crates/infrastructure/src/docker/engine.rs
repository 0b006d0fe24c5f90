use std::time::Duration;

use async_trait::async_trait;
use fleet_agent_core::models::{ContainerSpec, PruneTarget};
use fleet_agent_core::{AgentError, AgentResult, ContainerEngine};
use tracing::info;

use super::cli::{args, DockerCli};

/// `docker run -d` arguments for a container spec.
pub fn run_args(spec: &ContainerSpec) -> Vec<String> {
    let mut run = args(["run", "-d", "--name", &spec.name]);
    if spec.privileged {
        run.push("--privileged".to_string());
    }
    if let Some(network) = &spec.network_mode {
        run.push(format!("--network={network}"));
    }
    for (name, value) in &spec.env {
        run.push("-e".to_string());
        run.push(format!("{name}={value}"));
    }
    for bind in &spec.binds {
        run.push("-v".to_string());
        run.push(bind.clone());
    }
    run.push(spec.image.clone());
    run.extend(spec.command.iter().cloned());
    run
}

pub fn prune_args(target: PruneTarget) -> Vec<String> {
    match target {
        PruneTarget::Containers => args(["container", "prune", "-f"]),
        PruneTarget::Images { dangling_only: true } => args(["image", "prune", "-f"]),
        PruneTarget::Images {
            dangling_only: false,
        } => args(["image", "prune", "-a", "-f"]),
        PruneTarget::Volumes => args(["volume", "prune", "-f"]),
        PruneTarget::Networks => args(["network", "prune", "-f"]),
    }
}

/// Container engine backed by the local Docker daemon.
#[derive(Debug, Clone, Default)]
pub struct DockerEngine {
    cli: DockerCli,
}

impl DockerEngine {
    pub fn new(cli: DockerCli) -> Self {
        Self { cli }
    }
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    async fn pull_image(&self, image: &str) -> AgentResult<()> {
        self.cli.run(args(["pull", "--quiet", image])).await?;
        Ok(())
    }

    async fn create_and_start(&self, spec: &ContainerSpec) -> AgentResult<String> {
        let output = self.cli.run(run_args(spec)).await?;
        let container_id = output.trim().to_string();
        if container_id.is_empty() {
            return Err(AgentError::engine(format!(
                "docker run returned no container id for {}",
                spec.name
            )));
        }
        info!(name = %spec.name, image = %spec.image, container_id = %container_id, "container started");
        Ok(container_id)
    }

    async fn wait_for_exit(&self, container_id: &str, timeout: Duration) -> AgentResult<i64> {
        let output = tokio::time::timeout(timeout, self.cli.run(args(["wait", container_id])))
            .await
            .map_err(|_| {
                AgentError::Timeout(format!("container {container_id} still running after {timeout:?}"))
            })??;
        output.trim().parse::<i64>().map_err(|e| {
            AgentError::engine(format!("unexpected docker wait output {:?}: {e}", output.trim()))
        })
    }

    async fn remove_container(&self, container_id: &str) -> AgentResult<()> {
        self.cli.run(args(["rm", "-f", container_id])).await?;
        Ok(())
    }

    async fn prune(&self, target: PruneTarget) -> AgentResult<()> {
        self.cli.run(prune_args(target)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_args_for_privileged_helper() {
        let mut spec = ContainerSpec::new("reboot-job-1", "alpine:3");
        spec.privileged = true;
        spec.binds = vec!["/proc/sysrq-trigger:/sysrq".to_string()];
        spec.command = vec!["sh".to_string(), "-c".to_string(), "sleep 10".to_string()];

        assert_eq!(
            run_args(&spec),
            vec![
                "run",
                "-d",
                "--name",
                "reboot-job-1",
                "--privileged",
                "-v",
                "/proc/sysrq-trigger:/sysrq",
                "alpine:3",
                "sh",
                "-c",
                "sleep 10",
            ]
        );
    }

    #[test]
    fn test_run_args_env_and_network() {
        let mut spec = ContainerSpec::new("legacy-job-1", "engine:1");
        spec.network_mode = Some("host".to_string());
        spec.env = vec![("A".to_string(), "1".to_string())];

        let run = run_args(&spec);
        assert!(run.contains(&"--network=host".to_string()));
        assert!(run.windows(2).any(|w| w[0] == "-e" && w[1] == "A=1"));
        assert_eq!(run.last().map(String::as_str), Some("engine:1"));
    }

    #[test]
    fn test_prune_args() {
        assert_eq!(
            prune_args(PruneTarget::Images {
                dangling_only: false
            }),
            vec!["image", "prune", "-a", "-f"]
        );
        assert_eq!(
            prune_args(PruneTarget::Images {
                dangling_only: true
            }),
            vec!["image", "prune", "-f"]
        );
        assert_eq!(prune_args(PruneTarget::Volumes), vec!["volume", "prune", "-f"]);
    }
}
