use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::capabilities::{ApiPath, DEFAULT_TIMEOUT_MS, MAX_TIMEOUT_MS};
use crate::error::{AppError, ErrorKind};

pub const DEFAULT_API_PREFIX: &str = "/api";
pub const DEFAULT_CASE_NAME_PREFIX: &str = "Case";
pub const MAX_CASE_NAME_PREFIX_LENGTH: usize = 64;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid config: {0}")]
    Validation(String),

    #[error("failed to parse config: {0}")]
    Parse(String),
}

impl From<ConfigError> for AppError {
    fn from(e: ConfigError) -> Self {
        AppError::new(ErrorKind::Validation, e.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Prefix every endpoint hangs off, e.g. `/api`.
    pub api_prefix: String,
    /// Placeholder names for unnamed new cases read `"<prefix> <n>"`.
    pub default_case_name_prefix: String,
    pub request_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            api_prefix: DEFAULT_API_PREFIX.to_string(),
            default_case_name_prefix: DEFAULT_CASE_NAME_PREFIX.to_string(),
            request_timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

impl StoreConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_prefix.ends_with('/') {
            return Err(ConfigError::Validation(
                "api_prefix must not end with '/'".into(),
            ));
        }
        ApiPath::new(format!("{}/cases", self.api_prefix))
            .map_err(|e| ConfigError::Validation(format!("api_prefix: {e}")))?;

        let prefix = self.default_case_name_prefix.trim();
        if prefix.is_empty() {
            return Err(ConfigError::Validation(
                "default_case_name_prefix must not be blank".into(),
            ));
        }
        if prefix.len() > MAX_CASE_NAME_PREFIX_LENGTH {
            return Err(ConfigError::Validation(format!(
                "default_case_name_prefix exceeds {MAX_CASE_NAME_PREFIX_LENGTH} bytes"
            )));
        }

        if self.request_timeout_ms == 0 || self.request_timeout_ms > MAX_TIMEOUT_MS {
            return Err(ConfigError::Validation(format!(
                "request_timeout_ms must be in 1..={MAX_TIMEOUT_MS}"
            )));
        }
        Ok(())
    }

    /// Placeholder name for an unnamed case created while `live_count` cases exist.
    #[must_use]
    pub fn placeholder_case_name(&self, live_count: usize) -> String {
        format!("{} {}", self.default_case_name_prefix.trim(), live_count)
    }
}
