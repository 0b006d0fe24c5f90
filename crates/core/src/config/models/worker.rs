use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::validation::{ConfigValidator, ValidationUtils};
use crate::models::DeviceConfigFields;
use crate::AgentResult;

/// Container-engine object kinds the resource cleaner may prune.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CleanupObject {
    Containers,
    Images,
    Volumes,
    Networks,
    System,
}

impl fmt::Display for CleanupObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CleanupObject::Containers => "containers",
            CleanupObject::Images => "images",
            CleanupObject::Volumes => "volumes",
            CleanupObject::Networks => "networks",
            CleanupObject::System => "system",
        };
        f.write_str(name)
    }
}

/// Immutable configuration snapshot shared with every task.
///
/// Tasks keep their own copy and replace it wholesale when a new snapshot
/// arrives in their mailbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub telemetry_interval_seconds: u64,
    pub heartbeat_interval_seconds: u64,
    pub cleanup_interval_seconds: u64,
    pub cleanup_objects: Vec<CleanupObject>,
    pub commission_interval_seconds: u64,
    pub legacy_jobs_enabled: bool,
    pub legacy_job_image: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            telemetry_interval_seconds: 60,
            heartbeat_interval_seconds: 20,
            cleanup_interval_seconds: 86400,
            cleanup_objects: Vec::new(),
            commission_interval_seconds: 60,
            legacy_jobs_enabled: false,
            legacy_job_image: "fleet/job-engine-lite:latest".to_string(),
        }
    }
}

impl WorkerConfig {
    pub fn heartbeat_period(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_seconds)
    }
    pub fn cleanup_period(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_seconds)
    }
    pub fn commission_period(&self) -> Duration {
        Duration::from_secs(self.commission_interval_seconds)
    }

    /// Builds the next snapshot from the remote device fields; fields the
    /// backend did not return keep their current value.
    pub fn with_device_fields(&self, fields: &DeviceConfigFields) -> Self {
        let mut next = self.clone();
        if let Some(refresh) = fields.refresh_interval.filter(|v| *v > 0) {
            next.telemetry_interval_seconds = refresh;
        }
        if let Some(heartbeat) = fields.heartbeat_interval.filter(|v| *v > 0) {
            next.heartbeat_interval_seconds = heartbeat;
        }
        next
    }
}

impl ConfigValidator for WorkerConfig {
    fn validate(&self) -> AgentResult<()> {
        ValidationUtils::validate_interval_seconds(
            self.telemetry_interval_seconds,
            "worker.telemetry_interval_seconds",
        )?;
        ValidationUtils::validate_interval_seconds(
            self.heartbeat_interval_seconds,
            "worker.heartbeat_interval_seconds",
        )?;
        ValidationUtils::validate_interval_seconds(
            self.cleanup_interval_seconds,
            "worker.cleanup_interval_seconds",
        )?;
        ValidationUtils::validate_interval_seconds(
            self.commission_interval_seconds,
            "worker.commission_interval_seconds",
        )?;
        if self.legacy_jobs_enabled {
            ValidationUtils::validate_not_empty(&self.legacy_job_image, "worker.legacy_job_image")?;
        }
        Ok(())
    }
}
