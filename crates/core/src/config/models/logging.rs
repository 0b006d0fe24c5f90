use serde::{Deserialize, Serialize};

use crate::config::validation::ConfigValidator;
use crate::{AgentError, AgentResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub format: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl ConfigValidator for LogConfig {
    fn validate(&self) -> AgentResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.level.as_str()) {
            return Err(AgentError::validation_error(format!(
                "Invalid log level: {}. Valid options: {:?}",
                self.level, valid_levels
            )));
        }
        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.format.as_str()) {
            return Err(AgentError::validation_error(format!(
                "Invalid log format: {}. Valid options: {:?}",
                self.format, valid_formats
            )));
        }
        Ok(())
    }
}
