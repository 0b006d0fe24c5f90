use std::sync::Arc;

use async_trait::async_trait;
use fleet_agent_core::models::{CommissionAttributes, CommissionUpdate};
use fleet_agent_core::{AgentError, AgentResult, BackendClient, WorkerConfig};
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::lifecycle::{ConfigMailbox, PeriodicTimer, Worker, WorkerKind};

/// Reports device facts to the backend.
///
/// Updates are merged into the live snapshot as soon as they arrive; on each
/// tick only the difference against the last committed snapshot is sent.
pub struct Commissioner {
    backend: Arc<dyn BackendClient>,
    updates_tx: mpsc::Sender<CommissionUpdate>,
    updates_rx: mpsc::Receiver<CommissionUpdate>,
    current: CommissionAttributes,
    last_committed: CommissionAttributes,
    timer: PeriodicTimer,
    mailbox: ConfigMailbox,
    conf_rx: mpsc::Receiver<WorkerConfig>,
}

impl Commissioner {
    pub fn new(
        backend: Arc<dyn BackendClient>,
        config: WorkerConfig,
        initial: CommissionAttributes,
        queue_capacity: usize,
    ) -> Self {
        let (updates_tx, updates_rx) = mpsc::channel(queue_capacity.max(1));
        let (mailbox, conf_rx) = ConfigMailbox::channel(WorkerKind::Commissioner);
        Self {
            backend,
            updates_tx,
            updates_rx,
            current: initial,
            last_committed: CommissionAttributes::default(),
            timer: PeriodicTimer::new(config.commission_period()),
            mailbox,
            conf_rx,
        }
    }

    /// Channel for asynchronous attribute sources (telemetry, health checks).
    pub fn attribute_sender(&self) -> mpsc::Sender<CommissionUpdate> {
        self.updates_tx.clone()
    }

    pub fn current(&self) -> &CommissionAttributes {
        &self.current
    }

    pub fn last_committed(&self) -> &CommissionAttributes {
        &self.last_committed
    }

    pub fn apply_update(&mut self, update: CommissionUpdate) {
        debug!(update = ?update, "commission attributes updated");
        self.current.apply(update);
    }

    /// Payload to send, if the live snapshot differs from the committed one.
    pub fn needs_commissioning(&self) -> (Option<Map<String, Value>>, bool) {
        let diff = self.current.diff(&self.last_committed);
        if diff.is_empty() {
            return (None, false);
        }
        (Some(diff.into_payload()), true)
    }

    /// Returns whether a commission request was sent.
    pub async fn commission(&mut self) -> AgentResult<bool> {
        let (payload, needed) = self.needs_commissioning();
        let payload = match payload {
            Some(payload) if needed => payload,
            _ => return Ok(false),
        };

        info!(fields = ?payload.keys().collect::<Vec<_>>(), "commissioning device");
        self.backend.commission(payload).await?;
        self.last_committed = self.current.clone();
        Ok(true)
    }
}

#[async_trait]
impl Worker for Commissioner {
    fn kind(&self) -> WorkerKind {
        WorkerKind::Commissioner
    }

    fn config_mailbox(&self) -> ConfigMailbox {
        self.mailbox.clone()
    }

    fn reconfigure(&mut self, config: WorkerConfig) -> AgentResult<()> {
        if self.timer.reset(config.commission_period()) {
            info!(period = ?config.commission_period(), "commission period changed");
        }
        Ok(())
    }

    async fn run(&mut self, cancel: CancellationToken) -> AgentResult<()> {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                Some(config) = self.conf_rx.recv() => self.reconfigure(config)?,
                Some(update) = self.updates_rx.recv() => self.apply_update(update),
                _ = self.timer.tick() => {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        result = self.commission() => {
                            if let Err(e) = result {
                                warn!(error = %e, "commissioning failed, retrying at next tick");
                            }
                        }
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
