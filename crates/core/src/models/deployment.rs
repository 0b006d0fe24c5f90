use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{AgentError, AgentResult};

/// Remote deployment state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeploymentState {
    New,
    Starting,
    Started,
    Stopping,
    Stopped,
    Error,
}

impl fmt::Display for DeploymentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self {
            DeploymentState::New => "NEW",
            DeploymentState::Starting => "STARTING",
            DeploymentState::Started => "STARTED",
            DeploymentState::Stopping => "STOPPING",
            DeploymentState::Stopped => "STOPPED",
            DeploymentState::Error => "ERROR",
        };
        f.write_str(state)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeploymentAction {
    Start,
    Update,
    Stop,
    FetchLogs,
    State,
}

const DEPLOYMENT_ACTIONS: [(&str, DeploymentAction); 5] = [
    ("start_deployment", DeploymentAction::Start),
    ("update_deployment", DeploymentAction::Update),
    ("stop_deployment", DeploymentAction::Stop),
    ("fetch_deployment_log", DeploymentAction::FetchLogs),
    ("deployment_state", DeploymentAction::State),
];

impl DeploymentAction {
    pub fn from_job_type(job_type: &str) -> Option<Self> {
        DEPLOYMENT_ACTIONS
            .iter()
            .find(|(name, _)| *name == job_type)
            .map(|(_, action)| *action)
    }

    /// States entered before and after a mutating action, `None` for
    /// read-only actions.
    pub fn transitions(&self) -> Option<(DeploymentState, DeploymentState)> {
        match self {
            DeploymentAction::Start | DeploymentAction::Update => {
                Some((DeploymentState::Starting, DeploymentState::Started))
            }
            DeploymentAction::Stop => Some((DeploymentState::Stopping, DeploymentState::Stopped)),
            DeploymentAction::FetchLogs | DeploymentAction::State => None,
        }
    }
}

impl fmt::Display for DeploymentAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeploymentAction::Start => "start",
            DeploymentAction::Update => "update",
            DeploymentAction::Stop => "stop",
            DeploymentAction::FetchLogs => "fetch-logs",
            DeploymentAction::State => "state",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVar {
    pub name: String,
    #[serde(default)]
    pub value: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleContent {
    #[serde(rename = "docker-compose")]
    pub docker_compose: Option<String>,
    #[serde(rename = "environmental-variables")]
    pub environmental_variables: Vec<EnvVar>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentModule {
    pub subtype: String,
    #[serde(default)]
    pub compatibility: Option<String>,
    #[serde(default)]
    pub content: ModuleContent,
}

/// Registry key selecting an orchestration backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OrchestratorKey {
    pub subtype: String,
    pub compatibility: String,
}

impl OrchestratorKey {
    pub fn new(subtype: impl Into<String>, compatibility: impl Into<String>) -> Self {
        Self {
            subtype: subtype.into(),
            compatibility: compatibility.into(),
        }
    }
}

impl fmt::Display for OrchestratorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.subtype, self.compatibility)
    }
}

pub const DEFAULT_COMPATIBILITY: &str = "docker-compose";

impl DeploymentModule {
    pub fn orchestrator_key(&self) -> OrchestratorKey {
        OrchestratorKey::new(
            self.subtype.clone(),
            self.compatibility
                .clone()
                .unwrap_or_else(|| DEFAULT_COMPATIBILITY.to_string()),
        )
    }
}

/// Deployment resource as stored by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentResource {
    pub id: String,
    pub module: DeploymentModule,
    #[serde(default)]
    pub state: Option<DeploymentState>,
}

impl DeploymentResource {
    pub fn project_name(&self) -> &str {
        project_name(&self.id)
    }

    pub fn environment(&self) -> Vec<(String, String)> {
        self.module
            .content
            .environmental_variables
            .iter()
            .filter_map(|var| var.value.clone().map(|value| (var.name.clone(), value)))
            .collect()
    }
}

/// Local project name derived from a deployment id (`deployment/abc` -> `abc`).
pub fn project_name(deployment_id: &str) -> &str {
    deployment_id
        .rsplit('/')
        .next()
        .unwrap_or(deployment_id)
}

/// Project names become directory names and `-p` arguments: only
/// `[a-z0-9_-]` is accepted, which also rules out `.`, `..` and the empty name.
pub fn validate_project_name(project: &str) -> AgentResult<()> {
    let valid = !project.is_empty()
        && project
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(AgentError::validation_error(format!(
            "invalid deployment project name: {project:?}"
        )))
    }
}

pub const COMPOSE_FILE_NAME: &str = "docker-compose.yml";
pub const ENV_FILE_NAME: &str = ".env";

/// Everything an orchestration backend needs to bring a project up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentSpec {
    pub project: String,
    pub content: String,
    pub env: Vec<(String, String)>,
    pub working_dir: PathBuf,
}

impl DeploymentSpec {
    pub fn compose_file(&self) -> PathBuf {
        self.working_dir.join(COMPOSE_FILE_NAME)
    }

    pub fn env_file(&self) -> PathBuf {
        self.working_dir.join(ENV_FILE_NAME)
    }

    /// `.env` file body, one `NAME=value` per line.
    pub fn env_file_content(&self) -> String {
        self.env
            .iter()
            .map(|(name, value)| format!("{name}={value}\n"))
            .collect()
    }
}

/// Per-service status reported by an orchestration backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSummary {
    pub name: String,
    pub image: String,
    pub state: String,
    pub replicas: Option<String>,
}
