use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::validation::{ConfigValidator, ValidationUtils};
use crate::AgentResult;

/// Connection settings for the fleet-management backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub endpoint: String,
    pub device_id: String,
    pub api_key: String,
    pub api_secret: String,
    pub request_timeout_seconds: u64,
    pub insecure: bool,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8200".to_string(),
            device_id: String::new(),
            api_key: String::new(),
            api_secret: String::new(),
            request_timeout_seconds: 30,
            insecure: false,
        }
    }
}

impl BackendConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

impl ConfigValidator for BackendConfig {
    fn validate(&self) -> AgentResult<()> {
        ValidationUtils::validate_url(&self.endpoint, "backend.endpoint")?;
        ValidationUtils::validate_not_empty(&self.device_id, "backend.device_id")?;
        ValidationUtils::validate_timeout_seconds(
            self.request_timeout_seconds,
            "backend.request_timeout_seconds",
        )?;
        Ok(())
    }
}
