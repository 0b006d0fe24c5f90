use std::sync::Arc;

use async_trait::async_trait;
use fleet_agent_core::models::PruneTarget;
use fleet_agent_core::{AgentError, AgentResult, CleanupObject, ContainerEngine, WorkerConfig};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::lifecycle::{ConfigMailbox, PeriodicTimer, Worker, WorkerKind};

/// Expands the configured object set into concrete prune calls.
///
/// 空集合只清理悬空镜像; `system` 包含容器、镜像和网络, 卷需单独指定。
pub fn prune_plan(objects: &[CleanupObject]) -> Vec<PruneTarget> {
    if objects.is_empty() {
        return vec![PruneTarget::Images {
            dangling_only: true,
        }];
    }

    let wants = |object: CleanupObject| objects.contains(&object);
    let system = wants(CleanupObject::System);

    let mut plan = Vec::new();
    if system || wants(CleanupObject::Containers) {
        plan.push(PruneTarget::Containers);
    }
    if system || wants(CleanupObject::Networks) {
        plan.push(PruneTarget::Networks);
    }
    if wants(CleanupObject::Volumes) {
        plan.push(PruneTarget::Volumes);
    }
    if system || wants(CleanupObject::Images) {
        plan.push(PruneTarget::Images {
            dangling_only: false,
        });
    }
    plan
}

/// Periodically prunes unused container-engine objects.
pub struct ResourceCleaner {
    engine: Arc<dyn ContainerEngine>,
    config: WorkerConfig,
    timer: PeriodicTimer,
    mailbox: ConfigMailbox,
    conf_rx: mpsc::Receiver<WorkerConfig>,
}

impl ResourceCleaner {
    pub fn new(engine: Arc<dyn ContainerEngine>, config: WorkerConfig) -> Self {
        let (mailbox, conf_rx) = ConfigMailbox::channel(WorkerKind::ResourceCleaner);
        Self {
            engine,
            timer: PeriodicTimer::new(config.cleanup_period()),
            config,
            mailbox,
            conf_rx,
        }
    }

    /// Runs every prune of the plan; failures are collected, not fatal to
    /// the remaining prunes.
    pub async fn clean(&self) -> AgentResult<usize> {
        let plan = prune_plan(&self.config.cleanup_objects);
        let mut failures = Vec::new();

        for target in &plan {
            match self.engine.prune(*target).await {
                Ok(()) => debug!(target = %target, "pruned"),
                Err(e) => failures.push(format!("{target}: {e}")),
            }
        }

        if failures.is_empty() {
            Ok(plan.len())
        } else {
            Err(AgentError::Cleanup(failures.join("; ")))
        }
    }
}

#[async_trait]
impl Worker for ResourceCleaner {
    fn kind(&self) -> WorkerKind {
        WorkerKind::ResourceCleaner
    }

    fn config_mailbox(&self) -> ConfigMailbox {
        self.mailbox.clone()
    }

    fn reconfigure(&mut self, config: WorkerConfig) -> AgentResult<()> {
        if self.timer.reset(config.cleanup_period()) {
            info!(period = ?config.cleanup_period(), "cleanup period changed");
        }
        self.config = config;
        Ok(())
    }

    async fn run(&mut self, cancel: CancellationToken) -> AgentResult<()> {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                Some(config) = self.conf_rx.recv() => self.reconfigure(config)?,
                _ = self.timer.tick() => {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        result = self.clean() => match result {
                            Ok(prunes) => info!(prunes, "resource cleanup finished"),
                            Err(e) => warn!(error = %e, "resource cleanup incomplete"),
                        },
                    }
                }
            }
        }

        self.stop().await?;
        Err(AgentError::Cancelled)
    }

    async fn stop(&mut self) -> AgentResult<()> {
        self.timer.stop();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_set_prunes_dangling_images_only() {
        assert_eq!(
            prune_plan(&[]),
            vec![PruneTarget::Images {
                dangling_only: true
            }]
        );
    }

    #[test]
    fn test_system_excludes_volumes_unless_requested() {
        let plan = prune_plan(&[CleanupObject::System]);
        assert_eq!(
            plan,
            vec![
                PruneTarget::Containers,
                PruneTarget::Networks,
                PruneTarget::Images {
                    dangling_only: false
                },
            ]
        );

        let plan = prune_plan(&[CleanupObject::System, CleanupObject::Volumes]);
        assert!(plan.contains(&PruneTarget::Volumes));
        assert_eq!(plan.len(), 4);
    }

    #[test]
    fn test_explicit_objects() {
        assert_eq!(
            prune_plan(&[CleanupObject::Volumes, CleanupObject::Containers]),
            vec![PruneTarget::Containers, PruneTarget::Volumes]
        );
    }
}
