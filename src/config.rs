//! Configuration for the streaming engine.
//!
//! # Design Decisions
//! - Config is immutable once loaded; it is consulted at registry build
//!   time and at connection construction, never reloaded mid-request.
//! - All fields have defaults so a minimal (or absent) config works.
//! - Validation separates syntactic (serde) from semantic checks.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Engine configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Register the WebSocket upgrade handler.
    pub websocket_enabled: bool,

    /// Register the EventSource (server-push events) handler.
    pub event_source_enabled: bool,

    /// Status forced onto a connection that errors before committing
    /// a response.
    pub error_status: u16,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            websocket_enabled: true,
            event_source_enabled: true,
            error_status: 500,
        }
    }
}

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("error_status {0} is not a valid 4xx/5xx status")]
    InvalidErrorStatus(u16),
}

impl StreamConfig {
    /// Parse and validate configuration from a TOML document.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: StreamConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Semantic checks beyond what serde enforces.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(400..=599).contains(&self.error_status) {
            return Err(ConfigError::InvalidErrorStatus(self.error_status));
        }
        Ok(())
    }
}
