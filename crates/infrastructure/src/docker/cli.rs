use std::path::Path;
use std::process::Stdio;

use fleet_agent_core::{AgentError, AgentResult};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::debug;

/// Thin wrapper around the `docker` command line.
///
/// Failures are reported as [`AgentError::ContainerEngine`]; callers that
/// act as orchestration backends re-tag them with [`as_orchestration`].
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: String,
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new()
    }
}

pub fn as_orchestration(err: AgentError) -> AgentError {
    match err {
        AgentError::ContainerEngine(msg) => AgentError::Orchestration(msg),
        other => other,
    }
}

fn describe(args: &[String]) -> String {
    args.iter().take(3).cloned().collect::<Vec<_>>().join(" ")
}

async fn forward_lines<R>(reader: R, consumer: mpsc::Sender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if consumer.send(line).await.is_err() {
            break;
        }
    }
}

impl DockerCli {
    pub fn new() -> Self {
        Self::with_binary("docker")
    }

    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    fn command(&self, args: &[String], dir: Option<&Path>, env: &[(String, String)]) -> Command {
        let mut command = Command::new(&self.binary);
        command.args(args).envs(env.iter().cloned()).kill_on_drop(true);
        if let Some(dir) = dir {
            command.current_dir(dir);
        }
        command
    }

    pub async fn run(&self, args: Vec<String>) -> AgentResult<String> {
        self.run_with(args, None, &[]).await
    }

    /// Runs one command to completion and returns its stdout.
    pub async fn run_with(
        &self,
        args: Vec<String>,
        dir: Option<&Path>,
        env: &[(String, String)],
    ) -> AgentResult<String> {
        debug!(binary = %self.binary, args = ?args, "running docker command");
        let output = self
            .command(&args, dir, env)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| AgentError::engine(format!("failed to run {}: {e}", self.binary)))?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).to_string())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(AgentError::engine(format!(
                "{} {} exited with {:?}: {}",
                self.binary,
                describe(&args),
                output.status.code(),
                stderr.trim()
            )))
        }
    }

    /// Runs a command and forwards every stdout and stderr line to
    /// `consumer` as it is produced.
    pub async fn stream_lines(
        &self,
        args: Vec<String>,
        consumer: mpsc::Sender<String>,
    ) -> AgentResult<()> {
        debug!(binary = %self.binary, args = ?args, "streaming docker command");
        let mut child = self
            .command(&args, None, &[])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| AgentError::engine(format!("failed to run {}: {e}", self.binary)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AgentError::Internal("child stdout not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| AgentError::Internal("child stderr not captured".to_string()))?;

        tokio::join!(
            forward_lines(stdout, consumer.clone()),
            forward_lines(stderr, consumer)
        );

        let status = child.wait().await?;
        if status.success() {
            Ok(())
        } else {
            Err(AgentError::engine(format!(
                "{} {} exited with {:?}",
                self.binary,
                describe(&args),
                status.code()
            )))
        }
    }
}

/// Builds an owned argument vector from string slices.
pub fn args<const N: usize>(parts: [&str; N]) -> Vec<String> {
    parts.iter().map(|part| part.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orchestration_retag() {
        let err = as_orchestration(AgentError::engine("compose failed"));
        assert!(matches!(err, AgentError::Orchestration(ref msg) if msg == "compose failed"));
        assert!(matches!(
            as_orchestration(AgentError::Cancelled),
            AgentError::Cancelled
        ));
    }

    #[tokio::test]
    async fn test_missing_binary_is_engine_error() {
        let cli = DockerCli::with_binary("/nonexistent/docker-binary");
        let result = cli.run(args(["version"])).await;
        assert!(matches!(result, Err(AgentError::ContainerEngine(_))));
    }
}
