//! Environment-driven tuning knobs for the sync engine.
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | `PICTOSYNC_DEBOUNCE_MS` | 250 | Quiet period before re-parsing editor text |
//! | `PICTOSYNC_NORMALIZED_MAX` | 1.5 | Upper bound for reading a coordinate as a fraction |
//! | `PICTOSYNC_INDENT` | 2 | Spaces per indent level in serialized text |
//!
//! The normalized bound is a heuristic. It is tunable so deployments can
//! tighten or loosen it against their own extraction output.

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;

use std::time::Duration;

use crate::ErrorCode;
use crate::consts::{DEFAULT_DEBOUNCE_MS, DEFAULT_INDENT, NORMALIZED_MAX};

const MAX_INDENT: usize = 8;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{key}: {reason}")]
    OutOfRange { key: &'static str, reason: String },

    #[error("missing API key: set {var}")]
    MissingApiKey { var: String },
}

impl ErrorCode for ConfigError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::OutOfRange { .. } => "E_CONFIG_RANGE",
            Self::MissingApiKey { .. } => "E_CONFIG_API_KEY",
        }
    }
}

/// Parse an environment variable, falling back to `default` when it is
/// unset or does not parse.
pub fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    match std::env::var(key) {
        Ok(raw) => match raw.trim().parse::<T>() {
            Ok(v) => v,
            Err(_) => default,
        },
        Err(_) => default,
    }
}

/// Sync engine settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncConfig {
    /// Quiet period after the last keystroke before the text is re-parsed.
    pub debounce: Duration,
    /// Upper bound for `looks_normalized`.
    pub normalized_max: f64,
    /// Spaces per indent level when serializing.
    pub indent: usize,
}

impl SyncConfig {
    /// Load settings from the environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::OutOfRange`] if the normalized bound is not
    /// above 1.0 or the indent exceeds eight spaces.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self {
            debounce: Duration::from_millis(env_parse("PICTOSYNC_DEBOUNCE_MS", DEFAULT_DEBOUNCE_MS)),
            normalized_max: env_parse("PICTOSYNC_NORMALIZED_MAX", NORMALIZED_MAX),
            indent: env_parse("PICTOSYNC_INDENT", DEFAULT_INDENT),
        };
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// See [`Self::from_env`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.normalized_max.is_finite() || self.normalized_max <= 1.0 {
            return Err(ConfigError::OutOfRange {
                key: "PICTOSYNC_NORMALIZED_MAX",
                reason: format!("must be a finite value above 1.0, got {}", self.normalized_max),
            });
        }
        if self.indent > MAX_INDENT {
            return Err(ConfigError::OutOfRange {
                key: "PICTOSYNC_INDENT",
                reason: format!("must be at most {MAX_INDENT}, got {}", self.indent),
            });
        }
        Ok(())
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            normalized_max: NORMALIZED_MAX,
            indent: DEFAULT_INDENT,
        }
    }
}
