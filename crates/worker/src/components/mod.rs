pub mod actions;
pub mod commissioner;
pub mod conf_updater;
pub mod deployment_processor;
pub mod heartbeat;
pub mod job_processor;
pub mod job_registry;
pub mod lifecycle;
pub mod resource_cleaner;

pub use actions::{
    container_name, default_actions, ActionTable, LegacyJobRunner, NativeAction, RebootAction,
    ResyncConfigAction,
};
pub use commissioner::Commissioner;
pub use conf_updater::{parse_timestamp, ConfSync, ConfUpdater, DISTRIBUTION_TIMEOUT};
pub use deployment_processor::{DeploymentLocks, DeploymentProcessor, OrchestratorTable};
pub use heartbeat::Heartbeat;
pub use job_processor::{DeploymentJob, JobClass, JobProcessor};
pub use job_registry::{InMemoryJobRegistry, JobGuard, JobRegistry};
pub use lifecycle::{
    cancellable, ConfigMailbox, InFlight, PeriodicTimer, Worker, WorkerKind,
    CANCEL_CLEANUP_WINDOW, CONFIG_MAILBOX_CAPACITY,
};
pub use resource_cleaner::{prune_plan, ResourceCleaner};
