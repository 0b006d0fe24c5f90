use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::validation::{ConfigValidator, ValidationUtils};
use crate::AgentResult;

/// Job execution limits and queue sizes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    pub job_timeout_seconds: u64,
    pub shutdown_grace_seconds: u64,
    pub job_queue_capacity: usize,
    pub deployment_queue_capacity: usize,
    pub conf_sync_queue_capacity: usize,
    pub reboot_image: String,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            job_timeout_seconds: 120,
            shutdown_grace_seconds: 10,
            job_queue_capacity: 64,
            deployment_queue_capacity: 32,
            conf_sync_queue_capacity: 8,
            reboot_image: "alpine:3".to_string(),
        }
    }
}

impl JobsConfig {
    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_seconds)
    }
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_seconds)
    }
}

impl ConfigValidator for JobsConfig {
    fn validate(&self) -> AgentResult<()> {
        ValidationUtils::validate_timeout_seconds(self.job_timeout_seconds, "jobs.job_timeout_seconds")?;
        ValidationUtils::validate_timeout_seconds(
            self.shutdown_grace_seconds,
            "jobs.shutdown_grace_seconds",
        )?;
        ValidationUtils::validate_count(self.job_queue_capacity, "jobs.job_queue_capacity", 10000)?;
        ValidationUtils::validate_count(
            self.deployment_queue_capacity,
            "jobs.deployment_queue_capacity",
            10000,
        )?;
        ValidationUtils::validate_count(
            self.conf_sync_queue_capacity,
            "jobs.conf_sync_queue_capacity",
            10000,
        )?;
        ValidationUtils::validate_not_empty(&self.reboot_image, "jobs.reboot_image")?;
        Ok(())
    }
}

/// Where and how long deployments run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeploymentsConfig {
    pub working_dir: PathBuf,
    pub operation_timeout_seconds: u64,
    pub log_tail_lines: usize,
}

impl Default for DeploymentsConfig {
    fn default() -> Self {
        Self {
            working_dir: PathBuf::from("/var/lib/fleet-agent/deployments"),
            operation_timeout_seconds: 300,
            log_tail_lines: 500,
        }
    }
}

impl DeploymentsConfig {
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_seconds)
    }
}

impl ConfigValidator for DeploymentsConfig {
    fn validate(&self) -> AgentResult<()> {
        ValidationUtils::validate_not_empty(
            &self.working_dir.to_string_lossy(),
            "deployments.working_dir",
        )?;
        ValidationUtils::validate_timeout_seconds(
            self.operation_timeout_seconds,
            "deployments.operation_timeout_seconds",
        )?;
        ValidationUtils::validate_count(self.log_tail_lines, "deployments.log_tail_lines", 100_000)?;
        Ok(())
    }
}

/// Facts reported by the commissioner before anything else is known.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommissionConfig {
    pub default_tags: Vec<String>,
    pub default_capabilities: Vec<String>,
    pub attribute_queue_capacity: usize,
}

impl Default for CommissionConfig {
    fn default() -> Self {
        Self {
            default_tags: Vec::new(),
            default_capabilities: vec!["HEARTBEAT".to_string(), "JOB_PULL".to_string()],
            attribute_queue_capacity: 32,
        }
    }
}

impl ConfigValidator for CommissionConfig {
    fn validate(&self) -> AgentResult<()> {
        ValidationUtils::validate_count(
            self.attribute_queue_capacity,
            "commission.attribute_queue_capacity",
            10000,
        )?;
        for capability in &self.default_capabilities {
            ValidationUtils::validate_not_empty(capability, "commission.default_capabilities")?;
        }
        Ok(())
    }
}
