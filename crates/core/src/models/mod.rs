pub mod commission;
pub mod container;
pub mod deployment;
pub mod device;
pub mod job;

pub use commission::{
    ClusterAttributes, CommissionAttributes, CommissionDiff, CommissionUpdate,
    KubernetesAttributes, SwarmAttributes, REMOVED_KEY,
};
pub use container::{ContainerSpec, PruneTarget};
pub use deployment::{
    project_name, validate_project_name, DeploymentAction, DeploymentModule, DeploymentResource,
    DeploymentSpec, DeploymentState, EnvVar, ModuleContent, OrchestratorKey, ServiceSummary,
    COMPOSE_FILE_NAME, DEFAULT_COMPATIBILITY, ENV_FILE_NAME,
};
pub use device::{BackendCredentials, DeviceConfigFields, HeartbeatResponse, DEVICE_CONFIG_FIELDS};
pub use job::{JobRecord, JobResource, JobState, ResourceRef, DEPLOYMENT_JOB_MARKER};
