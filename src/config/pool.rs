//! Worker pool configuration.

use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Environment variable overriding [`PoolConfig::concurrency`].
pub const ENV_CONCURRENCY: &str = "TASK_ENGINE_CONCURRENCY";
/// Environment variable overriding [`PoolConfig::default_timeout_ms`].
pub const ENV_DEFAULT_TIMEOUT_MS: &str = "TASK_ENGINE_DEFAULT_TIMEOUT_MS";
/// Environment variable overriding [`PoolConfig::poll_interval_ms`].
pub const ENV_POLL_INTERVAL_MS: &str = "TASK_ENGINE_POLL_INTERVAL_MS";

/// Worker pool configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum number of units running at once.
    pub concurrency: usize,
    /// Timeout applied to callables added without one, in milliseconds.
    /// Zero means no timeout.
    pub default_timeout_ms: u64,
    /// How long a driver waits for an outcome before re-checking, in
    /// milliseconds.
    pub poll_interval_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            concurrency: num_cpus::get(),
            default_timeout_ms: 0,
            poll_interval_ms: 10,
        }
    }
}

impl PoolConfig {
    /// Create a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the concurrency ceiling.
    #[must_use]
    pub const fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Set the default unit timeout in milliseconds.
    #[must_use]
    pub const fn with_default_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.default_timeout_ms = timeout_ms;
        self
    }

    /// Set the driver poll interval in milliseconds.
    #[must_use]
    pub const fn with_poll_interval_ms(mut self, interval_ms: u64) -> Self {
        self.poll_interval_ms = interval_ms;
        self
    }

    /// Default unit timeout; zero means none.
    #[must_use]
    pub const fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    /// Driver poll interval.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid value.
    pub fn validate(&self) -> Result<(), String> {
        if self.concurrency == 0 {
            return Err("concurrency must be greater than 0".into());
        }
        if self.poll_interval_ms == 0 {
            return Err("poll_interval_ms must be greater than 0".into());
        }
        Ok(())
    }

    /// Parse a configuration from a JSON string and validate it.
    ///
    /// Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns a description of the parse or validation failure.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Build a configuration from `TASK_ENGINE_*` environment variables,
    /// loading a `.env` file first if one exists.
    ///
    /// # Errors
    ///
    /// Returns a description of an unparsable variable or invalid value.
    pub fn from_env() -> Result<Self, String> {
        dotenvy::dotenv().ok();
        let mut cfg = Self::default();
        if let Some(concurrency) = read_var(ENV_CONCURRENCY)? {
            cfg.concurrency = concurrency;
        }
        if let Some(timeout_ms) = read_var(ENV_DEFAULT_TIMEOUT_MS)? {
            cfg.default_timeout_ms = timeout_ms;
        }
        if let Some(interval_ms) = read_var(ENV_POLL_INTERVAL_MS)? {
            cfg.poll_interval_ms = interval_ms;
        }
        cfg.validate()?;
        debug!(?cfg, "pool configuration loaded from environment");
        Ok(cfg)
    }
}

fn read_var<T: std::str::FromStr>(name: &str) -> Result<Option<T>, String>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| format!("{name}: {e}")),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(format!("{name}: {e}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = PoolConfig::default();
        assert!(cfg.concurrency >= 1);
        assert_eq!(cfg.default_timeout(), Duration::ZERO);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_builder_and_validation() {
        let cfg = PoolConfig::new()
            .with_concurrency(3)
            .with_default_timeout_ms(250)
            .with_poll_interval_ms(5);
        assert_eq!(cfg.concurrency, 3);
        assert_eq!(cfg.default_timeout(), Duration::from_millis(250));
        assert_eq!(cfg.poll_interval(), Duration::from_millis(5));

        assert!(cfg.clone().with_concurrency(0).validate().is_err());
        assert!(cfg.with_poll_interval_ms(0).validate().is_err());
    }

    #[test]
    fn test_from_json_str_fills_defaults() {
        let cfg = PoolConfig::from_json_str(r#"{"concurrency": 2}"#).unwrap();
        assert_eq!(cfg.concurrency, 2);
        assert_eq!(cfg.poll_interval_ms, 10);

        let err = PoolConfig::from_json_str(r#"{"concurrency": 0}"#).unwrap_err();
        assert!(err.contains("concurrency"));
        assert!(PoolConfig::from_json_str("{").unwrap_err().starts_with("parse error"));
    }
}
