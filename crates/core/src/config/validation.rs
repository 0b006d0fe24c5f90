use crate::{AgentError, AgentResult};

/// Trait for configuration validation
pub trait ConfigValidator {
    fn validate(&self) -> AgentResult<()>;
}

/// General validation utilities
pub struct ValidationUtils;

/// Longest schedule period accepted by any task (one week).
const MAX_INTERVAL_SECONDS: u64 = 7 * 24 * 3600;

impl ValidationUtils {
    /// Validate that a string is not empty
    pub fn validate_not_empty(value: &str, field_name: &str) -> AgentResult<()> {
        if value.trim().is_empty() {
            return Err(AgentError::validation_error(format!(
                "{field_name} cannot be empty"
            )));
        }
        Ok(())
    }

    /// Validate that a timeout is reasonable
    pub fn validate_timeout_seconds(timeout_seconds: u64, field_name: &str) -> AgentResult<()> {
        if timeout_seconds == 0 {
            return Err(AgentError::validation_error(format!(
                "{field_name} must be greater than 0"
            )));
        }
        if timeout_seconds > 3600 {
            return Err(AgentError::validation_error(format!(
                "{field_name} must be less than or equal to 3600"
            )));
        }
        Ok(())
    }

    pub fn validate_interval_seconds(interval_seconds: u64, field_name: &str) -> AgentResult<()> {
        if interval_seconds == 0 {
            return Err(AgentError::validation_error(format!(
                "{field_name} must be greater than 0"
            )));
        }
        if interval_seconds > MAX_INTERVAL_SECONDS {
            return Err(AgentError::validation_error(format!(
                "{field_name} must be less than or equal to {MAX_INTERVAL_SECONDS}"
            )));
        }
        Ok(())
    }

    /// Validate that a count is reasonable
    pub fn validate_count(count: usize, field_name: &str, max: usize) -> AgentResult<()> {
        if count == 0 {
            return Err(AgentError::validation_error(format!(
                "{field_name} must be greater than 0"
            )));
        }
        if count > max {
            return Err(AgentError::validation_error(format!(
                "{field_name} must be less than or equal to {max}"
            )));
        }
        Ok(())
    }

    /// Validate that a URL has a valid format
    pub fn validate_url(url: &str, field_name: &str) -> AgentResult<()> {
        Self::validate_not_empty(url, field_name)?;
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(AgentError::validation_error(format!(
                "{field_name} must be an http(s) URL"
            )));
        }
        Ok(())
    }
}
