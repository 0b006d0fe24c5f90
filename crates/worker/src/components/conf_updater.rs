use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fleet_agent_core::models::DEVICE_CONFIG_FIELDS;
use fleet_agent_core::{AgentError, AgentResult, BackendClient, WorkerConfig};
use futures::future::join_all;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::lifecycle::{ConfigMailbox, Worker, WorkerKind};

/// Deadline for handing a new snapshot to every subscriber.
pub const DISTRIBUTION_TIMEOUT: Duration = Duration::from_secs(5);

/// Message on the conf-sync queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfSync {
    /// Last update time of the device document, as reported by the backend.
    Updated(String),
    /// Refetch and redistribute regardless of freshness. `last_update` keeps
    /// following the backend's clock.
    Force,
}

/// Refreshes the worker configuration when the backend reports a newer
/// device document, then broadcasts it to every subscribed task.
pub struct ConfUpdater {
    backend: Arc<dyn BackendClient>,
    conf_sync_rx: mpsc::Receiver<ConfSync>,
    subscribers: Vec<ConfigMailbox>,
    config: WorkerConfig,
    last_update: Option<DateTime<Utc>>,
    distribution_timeout: Duration,
    mailbox: ConfigMailbox,
    conf_rx: mpsc::Receiver<WorkerConfig>,
}

pub fn parse_timestamp(raw: &str) -> AgentResult<DateTime<Utc>> {
    let parsed = DateTime::parse_from_rfc3339(raw.trim())
        .map_err(|e| AgentError::InvalidTimestamp(format!("{raw}: {e}")))?;
    Ok(parsed.with_timezone(&Utc))
}

impl ConfUpdater {
    pub fn new(
        backend: Arc<dyn BackendClient>,
        conf_sync_rx: mpsc::Receiver<ConfSync>,
        config: WorkerConfig,
    ) -> Self {
        let (mailbox, conf_rx) = ConfigMailbox::channel(WorkerKind::ConfUpdater);
        Self {
            backend,
            conf_sync_rx,
            subscribers: Vec::new(),
            config,
            last_update: None,
            distribution_timeout: DISTRIBUTION_TIMEOUT,
            mailbox,
            conf_rx,
        }
    }

    pub fn with_last_update(mut self, last_update: DateTime<Utc>) -> Self {
        self.last_update = Some(last_update);
        self
    }

    pub fn with_distribution_timeout(mut self, distribution_timeout: Duration) -> Self {
        self.distribution_timeout = distribution_timeout;
        self
    }

    pub fn subscribe(&mut self, mailbox: ConfigMailbox) {
        self.subscribers.push(mailbox);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        self.last_update
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Handles one freshness signal. Returns `true` when a new snapshot was
    /// fetched and delivered to every subscriber.
    pub async fn handle_signal(&mut self, raw: &str) -> AgentResult<bool> {
        let remote = parse_timestamp(raw)?;
        if let Some(last) = self.last_update {
            if remote <= last {
                debug!(remote = %remote, last = %last, "configuration already up to date");
                return Ok(false);
            }
        }

        self.refresh().await?;
        self.last_update = Some(remote);
        info!(updated = %remote, "configuration distributed");
        Ok(true)
    }

    /// Refetches and distributes the configuration without consulting or
    /// advancing `last_update`.
    pub async fn force_refresh(&mut self) -> AgentResult<()> {
        self.refresh().await?;
        info!("configuration resynchronized");
        Ok(())
    }

    pub async fn handle_sync(&mut self, signal: ConfSync) -> AgentResult<bool> {
        match signal {
            ConfSync::Updated(raw) => self.handle_signal(&raw).await,
            ConfSync::Force => self.force_refresh().await.map(|()| true),
        }
    }

    async fn refresh(&mut self) -> AgentResult<()> {
        let fields = self.backend.fetch_device_config(&DEVICE_CONFIG_FIELDS).await?;
        let next = self.config.with_device_fields(&fields);
        self.distribute_config(&next).await?;
        self.config = next;
        Ok(())
    }

    /// Sends `config` to every subscriber concurrently under one deadline.
    ///
    /// On timeout the whole distribution fails; mailboxes that were already
    /// served keep the new snapshot.
    pub async fn distribute_config(&self, config: &WorkerConfig) -> AgentResult<()> {
        let total = self.subscribers.len();
        let delivered = AtomicUsize::new(0);

        let sends = self.subscribers.iter().map(|mailbox| {
            let delivered = &delivered;
            let config = config.clone();
            async move {
                let result = mailbox.deliver(config).await;
                if result.is_ok() {
                    delivered.fetch_add(1, Ordering::SeqCst);
                }
                (mailbox.owner(), result)
            }
        });

        let results = match timeout(self.distribution_timeout, join_all(sends)).await {
            Ok(results) => results,
            Err(_) => {
                let delivered = delivered.load(Ordering::SeqCst);
                error!(delivered, total, "configuration distribution timed out");
                return Err(AgentError::DistributionTimeout { delivered, total });
            }
        };

        let failures: Vec<String> = results
            .into_iter()
            .filter_map(|(owner, result)| result.err().map(|e| format!("{owner}: {e}")))
            .collect();
        if failures.is_empty() {
            Ok(())
        } else {
            Err(AgentError::ChannelClosed(failures.join("; ")))
        }
    }
}

#[async_trait]
impl Worker for ConfUpdater {
    fn kind(&self) -> WorkerKind {
        WorkerKind::ConfUpdater
    }

    fn config_mailbox(&self) -> ConfigMailbox {
        self.mailbox.clone()
    }

    fn reconfigure(&mut self, config: WorkerConfig) -> AgentResult<()> {
        self.config = config;
        Ok(())
    }

    async fn run(&mut self, cancel: CancellationToken) -> AgentResult<()> {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                Some(config) = self.conf_rx.recv() => self.reconfigure(config)?,
                Some(signal) = self.conf_sync_rx.recv() => {
                    let described = format!("{signal:?}");
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        result = self.handle_sync(signal) => {
                            if let Err(e) = result {
                                warn!(error = %e, signal = %described, "configuration update failed");
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
        self.conf_sync_rx.close();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timestamp() {
        let ts = parse_timestamp("2024-05-01T10:00:00.123Z").expect("valid timestamp");
        assert_eq!(ts.to_rfc3339(), "2024-05-01T10:00:00.123+00:00");
        assert!(parse_timestamp("yesterday").is_err());
    }
}
