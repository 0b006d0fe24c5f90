//! Lifecycle shared by every coordination task.
//!
//! * construction (`new`) wires dependencies and never starts background work;
//! * [`Worker::start`] spawns [`Worker::run`] and returns immediately;
//! * `run` is the event loop; on cancellation it calls `stop` and returns
//!   [`AgentError::Cancelled`];
//! * `reconfigure` swaps in a new [`WorkerConfig`] without restarting the loop.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use fleet_agent_core::{AgentError, AgentResult, WorkerConfig};
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval_at, timeout, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Pending configuration snapshots a task may hold before the sender waits.
pub const CONFIG_MAILBOX_CAPACITY: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerKind {
    Heartbeat,
    ConfUpdater,
    Commissioner,
    JobProcessor,
    DeploymentProcessor,
    ResourceCleaner,
}

impl fmt::Display for WorkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkerKind::Heartbeat => "heartbeat",
            WorkerKind::ConfUpdater => "conf-updater",
            WorkerKind::Commissioner => "commissioner",
            WorkerKind::JobProcessor => "job-processor",
            WorkerKind::DeploymentProcessor => "deployment-processor",
            WorkerKind::ResourceCleaner => "resource-cleaner",
        };
        f.write_str(name)
    }
}

/// Sending half of a task's configuration mailbox.
#[derive(Debug, Clone)]
pub struct ConfigMailbox {
    owner: String,
    tx: mpsc::Sender<WorkerConfig>,
}

impl ConfigMailbox {
    pub fn channel(owner: impl fmt::Display) -> (Self, mpsc::Receiver<WorkerConfig>) {
        let (tx, rx) = mpsc::channel(CONFIG_MAILBOX_CAPACITY);
        (Self::new(owner, tx), rx)
    }

    pub fn new(owner: impl fmt::Display, tx: mpsc::Sender<WorkerConfig>) -> Self {
        Self {
            owner: owner.to_string(),
            tx,
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Waits for room in the mailbox; only fails if the owner is gone.
    pub async fn deliver(&self, config: WorkerConfig) -> AgentResult<()> {
        self.tx
            .send(config)
            .await
            .map_err(|_| AgentError::ChannelClosed(format!("{} config mailbox", self.owner)))
    }
}

#[async_trait]
pub trait Worker: Send + 'static {
    fn kind(&self) -> WorkerKind;

    fn config_mailbox(&self) -> ConfigMailbox;

    /// Applies a new snapshot to live scheduling state.
    fn reconfigure(&mut self, config: WorkerConfig) -> AgentResult<()>;

    /// Event loop. Returns `Err(AgentError::Cancelled)` once `cancel` fires
    /// and `stop` has completed; any other error is fatal for the agent.
    async fn run(&mut self, cancel: CancellationToken) -> AgentResult<()>;

    /// Releases timers and in-flight work. Must be idempotent.
    async fn stop(&mut self) -> AgentResult<()>;

    fn start(mut self, cancel: CancellationToken) -> JoinHandle<AgentResult<()>>
    where
        Self: Sized,
    {
        tokio::spawn(async move {
            let kind = self.kind();
            info!(worker = %kind, "worker started");
            let result = self.run(cancel).await;
            match &result {
                Err(e) if e.is_cancelled() => info!(worker = %kind, "worker stopped"),
                Err(e) => error!(worker = %kind, error = %e, "worker failed"),
                Ok(()) => warn!(worker = %kind, "worker exited without cancellation"),
            }
            result
        })
    }
}

/// Fixed-period schedule that can be re-armed with a new period.
///
/// The first tick fires immediately; after `reset` the next tick fires one
/// full new period later.
#[derive(Debug)]
pub struct PeriodicTimer {
    period: Duration,
    immediate: bool,
    interval: Option<Interval>,
}

impl PeriodicTimer {
    pub fn new(period: Duration) -> Self {
        Self {
            period: period.max(Duration::from_millis(1)),
            immediate: true,
            interval: None,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Returns whether the schedule changed.
    pub fn reset(&mut self, period: Duration) -> bool {
        let period = period.max(Duration::from_millis(1));
        if period == self.period {
            return false;
        }
        self.period = period;
        self.immediate = false;
        self.interval = None;
        true
    }

    pub async fn tick(&mut self) {
        let period = self.period;
        let immediate = self.immediate;
        let interval = self.interval.get_or_insert_with(|| {
            let start = if immediate {
                Instant::now()
            } else {
                Instant::now() + period
            };
            let mut interval = interval_at(start, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });
        interval.tick().await;
    }

    pub fn stop(&mut self) {
        self.interval = None;
    }
}

/// Time a cancelled activity gets to report its outcome before it is aborted.
pub const CANCEL_CLEANUP_WINDOW: Duration = Duration::from_secs(5);

/// Runs `operation` until it finishes or `cancel` fires.
pub async fn cancellable<T, F>(cancel: &CancellationToken, operation: F) -> AgentResult<T>
where
    F: Future<Output = AgentResult<T>>,
{
    tokio::select! {
        _ = cancel.cancelled() => Err(AgentError::Cancelled),
        result = operation => result,
    }
}

/// Tracked set of per-job activities spawned by a processor.
///
/// Activities run under a cancellation scope owned by the set, not by the
/// root token: on shutdown they first get a grace period to finish, then
/// the scope is cancelled and they get [`CANCEL_CLEANUP_WINDOW`] to report
/// before being aborted.
#[derive(Debug)]
pub struct InFlight {
    owner: WorkerKind,
    tasks: JoinSet<()>,
    scope: CancellationToken,
    cleanup_window: Duration,
}

impl InFlight {
    pub fn new(owner: WorkerKind) -> Self {
        Self {
            owner,
            tasks: JoinSet::new(),
            scope: CancellationToken::new(),
            cleanup_window: CANCEL_CLEANUP_WINDOW,
        }
    }

    pub fn with_cleanup_window(mut self, cleanup_window: Duration) -> Self {
        self.cleanup_window = cleanup_window;
        self
    }

    /// Cancellation token for one new activity.
    pub fn job_token(&self) -> CancellationToken {
        self.scope.child_token()
    }

    pub fn spawn<F>(&mut self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tasks.spawn(task);
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Collects one finished activity. Callers must guard on `!is_empty()`.
    pub async fn reap(&mut self) {
        if let Some(Err(e)) = self.tasks.join_next().await {
            if e.is_panic() {
                error!(worker = %self.owner, error = %e, "in-flight activity panicked");
            }
        }
    }

    async fn join_all_within(&mut self, limit: Duration) -> bool {
        let owner = self.owner;
        let tasks = &mut self.tasks;
        timeout(limit, async move {
            while let Some(result) = tasks.join_next().await {
                if let Err(e) = result {
                    if e.is_panic() {
                        error!(worker = %owner, error = %e, "in-flight activity panicked");
                    }
                }
            }
        })
        .await
        .is_ok()
    }

    /// Waits up to `grace` for every activity, then cancels the rest and
    /// aborts whatever is still running after the cleanup window.
    pub async fn drain(&mut self, grace: Duration) {
        if self.tasks.is_empty() {
            self.scope.cancel();
            return;
        }
        info!(worker = %self.owner, in_flight = self.tasks.len(), "waiting for in-flight activities");

        if self.join_all_within(grace).await {
            self.scope.cancel();
            return;
        }

        warn!(
            worker = %self.owner,
            remaining = self.tasks.len(),
            "in-flight activities did not finish in time, cancelling"
        );
        self.scope.cancel();
        if self.join_all_within(self.cleanup_window).await {
            return;
        }

        warn!(worker = %self.owner, remaining = self.tasks.len(), "aborting in-flight activities");
        self.tasks.abort_all();
        while self.tasks.join_next().await.is_some() {}
    }
}
