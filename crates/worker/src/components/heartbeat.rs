use std::sync::Arc;

use async_trait::async_trait;
use fleet_agent_core::{AgentError, AgentResult, BackendClient, WorkerConfig};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::conf_updater::ConfSync;
use super::lifecycle::{ConfigMailbox, PeriodicTimer, Worker, WorkerKind};

/// Periodically reports to the backend and forwards what it answers:
/// pending job ids to the job processor and the device's last-update
/// timestamp to the conf updater.
pub struct Heartbeat {
    backend: Arc<dyn BackendClient>,
    job_tx: mpsc::Sender<String>,
    conf_sync_tx: mpsc::Sender<ConfSync>,
    config: WorkerConfig,
    timer: PeriodicTimer,
    mailbox: ConfigMailbox,
    conf_rx: mpsc::Receiver<WorkerConfig>,
}

impl Heartbeat {
    pub fn new(
        backend: Arc<dyn BackendClient>,
        job_tx: mpsc::Sender<String>,
        conf_sync_tx: mpsc::Sender<ConfSync>,
        config: WorkerConfig,
    ) -> Self {
        let (mailbox, conf_rx) = ConfigMailbox::channel(WorkerKind::Heartbeat);
        Self {
            backend,
            job_tx,
            conf_sync_tx,
            timer: PeriodicTimer::new(config.heartbeat_period()),
            config,
            mailbox,
            conf_rx,
        }
    }

    /// Sends one heartbeat, bounded by the heartbeat period, and returns the
    /// number of job ids forwarded.
    pub async fn beat(&self) -> AgentResult<usize> {
        let period = self.config.heartbeat_period();
        let response = timeout(period, self.backend.heartbeat())
            .await
            .map_err(|_| AgentError::Timeout(format!("heartbeat took longer than {period:?}")))??;

        let job_count = response.jobs.len();
        for job_id in response.jobs {
            debug!(job_id = %job_id, "heartbeat returned job");
            self.job_tx
                .send(job_id)
                .await
                .map_err(|_| AgentError::ChannelClosed("job queue".to_string()))?;
        }

        if let Some(updated) = response.doc_last_updated {
            self.conf_sync_tx
                .send(ConfSync::Updated(updated))
                .await
                .map_err(|_| AgentError::ChannelClosed("conf-sync queue".to_string()))?;
        }

        Ok(job_count)
    }
}

#[async_trait]
impl Worker for Heartbeat {
    fn kind(&self) -> WorkerKind {
        WorkerKind::Heartbeat
    }

    fn config_mailbox(&self) -> ConfigMailbox {
        self.mailbox.clone()
    }

    fn reconfigure(&mut self, config: WorkerConfig) -> AgentResult<()> {
        if self.timer.reset(config.heartbeat_period()) {
            info!(period = ?config.heartbeat_period(), "heartbeat period changed");
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
                        result = self.beat() => match result {
                            Ok(jobs) if jobs > 0 => info!(jobs, "heartbeat delivered jobs"),
                            Ok(_) => debug!("heartbeat sent"),
                            Err(e) => warn!(error = %e, "heartbeat failed, retrying at next tick"),
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
