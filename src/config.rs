//! Host configuration parsed from environment variables.
//!
//! `main` loads `.env` first (dotenvy), so every variable below may also come
//! from that file. Sync engine knobs are read by [`SyncConfig::from_env`];
//! this module adds the settings for the extraction / alignment gateway.

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;

use annosync::config::{ConfigError, SyncConfig, env_parse};

pub const DEFAULT_MODEL: &str = "gemini-2.5-pro";
pub const DEFAULT_API_KEY_ENV: &str = "PICTOSYNC_API_KEY";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceTimeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

/// Where and how to reach the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub timeouts: ServiceTimeouts,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub sync: SyncConfig,
    /// `None` when no gateway is configured; AI commands are then refused.
    pub service: Option<ServiceConfig>,
}

impl AppConfig {
    /// Build the host configuration from the environment.
    ///
    /// Optional:
    /// - `PICTOSYNC_SERVICE_URL`: gateway base URL; AI features are off when unset
    /// - `PICTOSYNC_API_KEY_ENV`: names the variable holding the key (default `PICTOSYNC_API_KEY`)
    /// - `PICTOSYNC_MODEL`: default `gemini-2.5-pro`
    /// - `PICTOSYNC_REQUEST_TIMEOUT_SECS`: default 120
    /// - `PICTOSYNC_CONNECT_TIMEOUT_SECS`: default 10
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::OutOfRange`] for out-of-range sync settings and
    /// [`ConfigError::MissingApiKey`] when a gateway URL is set but its key
    /// variable is not.
    pub fn from_env() -> Result<Self, ConfigError> {
        let sync = SyncConfig::from_env()?;
        let service = match std::env::var("PICTOSYNC_SERVICE_URL") {
            Ok(url) if !url.trim().is_empty() => Some(ServiceConfig::from_env(&url)?),
            _ => None,
        };
        Ok(Self { sync, service })
    }
}

impl ServiceConfig {
    fn from_env(url: &str) -> Result<Self, ConfigError> {
        let key_var = std::env::var("PICTOSYNC_API_KEY_ENV").unwrap_or_else(|_| DEFAULT_API_KEY_ENV.to_string());
        let api_key = match std::env::var(&key_var) {
            Ok(key) if !key.trim().is_empty() => key,
            _ => return Err(ConfigError::MissingApiKey { var: key_var }),
        };
        let model = std::env::var("PICTOSYNC_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let timeouts = ServiceTimeouts {
            request_secs: env_parse("PICTOSYNC_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS),
            connect_secs: env_parse("PICTOSYNC_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS),
        };
        Ok(Self { base_url: url.trim().trim_end_matches('/').to_string(), api_key, model, timeouts })
    }
}
