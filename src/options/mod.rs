/// Client options management
///
/// Options follow the same pattern as any of our TOML-backed configuration:
/// a serde-derived struct with defaults, file load/save helpers, and an
/// explicit `validate()` pass.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::wire::MAX_MESSAGE_SIZE;

/// Tunable client behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientOptions {
    /// TCP connect timeout per seed, in milliseconds
    pub connect_timeout_ms: u64,
    /// Largest wire message the client will accept from a server
    pub max_message_size_bytes: usize,
    /// Application name reported to the server during the handshake
    pub app_name: Option<String>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 5000,
            max_message_size_bytes: MAX_MESSAGE_SIZE,
            app_name: None,
        }
    }
}

impl ClientOptions {
    /// Load options from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, OptionsError> {
        let content =
            fs::read_to_string(path).map_err(|e| OptionsError::IoError(e.to_string()))?;

        let options: ClientOptions =
            toml::from_str(&content).map_err(|e| OptionsError::ParseError(e.to_string()))?;

        options.validate()?;
        Ok(options)
    }

    /// Save options to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), OptionsError> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| OptionsError::SerializeError(e.to_string()))?;

        fs::write(path, content).map_err(|e| OptionsError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Validate option values
    pub fn validate(&self) -> Result<(), OptionsError> {
        if self.connect_timeout_ms == 0 {
            return Err(OptionsError::ValidationError(
                "connect_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.max_message_size_bytes < 1024 {
            return Err(OptionsError::ValidationError(
                "max_message_size_bytes must be at least 1024".to_string(),
            ));
        }

        if self.max_message_size_bytes > MAX_MESSAGE_SIZE {
            return Err(OptionsError::ValidationError(format!(
                "max_message_size_bytes must not exceed {}",
                MAX_MESSAGE_SIZE
            )));
        }

        if let Some(app_name) = &self.app_name {
            if app_name.trim().is_empty() {
                return Err(OptionsError::ValidationError(
                    "app_name must not be blank".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Connect timeout as a `Duration`
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Options error types
#[derive(Debug, thiserror::Error)]
pub enum OptionsError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}
