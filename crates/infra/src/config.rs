//! Service configuration, read from `FOODRESCUE_*` environment variables.

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

use foodrescue_observability::LogFormat;

pub const ENV_LOCK_TIMEOUT_MS: &str = "FOODRESCUE_LOCK_TIMEOUT_MS";
pub const ENV_TOKEN_VALIDITY_SECS: &str = "FOODRESCUE_TOKEN_VALIDITY_SECS";
pub const ENV_CURRENCY: &str = "FOODRESCUE_CURRENCY";
pub const ENV_BIND_ADDR: &str = "FOODRESCUE_BIND_ADDR";
pub const ENV_LOG_FORMAT: &str = "FOODRESCUE_LOG_FORMAT";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} has invalid value '{value}': {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    fn invalid(key: &'static str, value: &str, reason: impl ToString) -> Self {
        ConfigError::Invalid {
            key,
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Longest wait for a row lock before failing with a retryable timeout.
    pub lock_timeout: Duration,
    /// How long an issued pickup token stays redeemable.
    pub token_validity: Duration,
    /// Currency stamped on orders that do not name one.
    pub default_currency: String,
    pub bind_addr: SocketAddr,
    pub log_format: LogFormat,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_secs(2),
            token_validity: Duration::from_secs(24 * 60 * 60),
            default_currency: "SGD".to_string(),
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            log_format: LogFormat::Json,
        }
    }
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Unset or blank keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(raw) = get(ENV_LOCK_TIMEOUT_MS) {
            config.lock_timeout = Duration::from_millis(parse_positive(ENV_LOCK_TIMEOUT_MS, &raw)?);
        }
        if let Some(raw) = get(ENV_TOKEN_VALIDITY_SECS) {
            config.token_validity = Duration::from_secs(parse_positive(ENV_TOKEN_VALIDITY_SECS, &raw)?);
        }
        if let Some(raw) = get(ENV_CURRENCY) {
            let code = raw.trim().to_ascii_uppercase();
            if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
                return Err(ConfigError::invalid(ENV_CURRENCY, &raw, "expected a 3-letter currency code"));
            }
            config.default_currency = code;
        }
        if let Some(raw) = get(ENV_BIND_ADDR) {
            config.bind_addr = raw
                .trim()
                .parse()
                .map_err(|e| ConfigError::invalid(ENV_BIND_ADDR, &raw, e))?;
        }
        if let Some(raw) = get(ENV_LOG_FORMAT) {
            config.log_format = raw.parse().map_err(|e| ConfigError::invalid(ENV_LOG_FORMAT, &raw, e))?;
        }

        Ok(config)
    }

    /// Token validity as a calendar duration.
    pub fn token_validity_chrono(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.token_validity).unwrap_or(chrono::Duration::MAX)
    }
}

fn parse_positive(key: &'static str, raw: &str) -> Result<u64, ConfigError> {
    let value: u64 = raw.trim().parse().map_err(|e| ConfigError::invalid(key, raw, e))?;
    if value == 0 {
        return Err(ConfigError::invalid(key, raw, "must be greater than zero"));
    }
    Ok(value)
}
