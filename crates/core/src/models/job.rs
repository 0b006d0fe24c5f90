use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Job types containing this marker are executed by the deployment processor.
pub const DEPLOYMENT_JOB_MARKER: &str = "deployment";

/// Remote job state as seen by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Queued,
    Running,
    Success,
    Failed,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self {
            JobState::Queued => "QUEUED",
            JobState::Running => "RUNNING",
            JobState::Success => "SUCCESS",
            JobState::Failed => "FAILED",
        };
        f.write_str(state)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRef {
    pub href: String,
}

/// Job metadata fetched from the backend before execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResource {
    pub id: String,
    pub action: String,
    #[serde(rename = "target-resource", default)]
    pub target_resource: Option<ResourceRef>,
    #[serde(default)]
    pub payload: Option<String>,
}

impl JobResource {
    pub fn new(id: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            action: action.into(),
            target_resource: None,
            payload: None,
        }
    }

    pub fn with_target(mut self, href: impl Into<String>) -> Self {
        self.target_resource = Some(ResourceRef { href: href.into() });
        self
    }

    pub fn job_type(&self) -> &str {
        &self.action
    }

    pub fn target_href(&self) -> Option<&str> {
        self.target_resource.as_ref().map(|r| r.href.as_str())
    }

    pub fn is_deployment(&self) -> bool {
        self.action.contains(DEPLOYMENT_JOB_MARKER)
    }
}

/// Registry entry for a job that is currently in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRecord {
    pub id: String,
    pub job_type: String,
    pub arrived_at: DateTime<Utc>,
}

impl JobRecord {
    pub fn new(id: impl Into<String>, job_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            job_type: job_type.into(),
            arrived_at: Utc::now(),
        }
    }
}

impl From<&JobResource> for JobRecord {
    fn from(job: &JobResource) -> Self {
        JobRecord::new(job.id.clone(), job.action.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deployment_marker_classification() {
        assert!(JobResource::new("job/1", "start_deployment").is_deployment());
        assert!(JobResource::new("job/2", "fetch_deployment_log").is_deployment());
        assert!(!JobResource::new("job/3", "reboot").is_deployment());
    }

    #[test]
    fn test_job_state_wire_format() {
        assert_eq!(serde_json::to_string(&JobState::Success).unwrap(), "\"SUCCESS\"");
        assert_eq!(JobState::Failed.to_string(), "FAILED");
    }

    #[test]
    fn test_job_resource_deserialize() {
        let job: JobResource = serde_json::from_str(
            r#"{"id": "job/7", "action": "stop_deployment",
                "target-resource": {"href": "deployment/abc"}}"#,
        )
        .expect("Failed to deserialize");
        assert_eq!(job.target_href(), Some("deployment/abc"));
        assert!(job.payload.is_none());
    }
}
