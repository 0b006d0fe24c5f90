use serde::{Deserialize, Serialize};

/// Device resource fields that drive the worker configuration.
pub const DEVICE_CONFIG_FIELDS: [&str; 3] = ["refresh-interval", "heartbeat-interval", "updated"];

/// Decoded heartbeat answer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatResponse {
    pub jobs: Vec<String>,
    #[serde(rename = "doc-last-updated")]
    pub doc_last_updated: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct DeviceConfigFields {
    pub refresh_interval: Option<u64>,
    pub heartbeat_interval: Option<u64>,
    pub updated: Option<String>,
}

/// Credentials handed to helper containers that talk to the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackendCredentials {
    pub endpoint: String,
    pub api_key: String,
    pub api_secret: String,
    pub insecure: bool,
}
