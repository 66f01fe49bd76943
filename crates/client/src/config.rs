use std::str::FromStr;
use std::time::Duration;

use evo_core::run::DEFAULT_MAX_TRANSIENT_FAILURES;

use crate::controller::{PollConfig, DEFAULT_POLL_INTERVAL};

/// Default base URL of the evolver web application.
pub const DEFAULT_API_URL: &str = "http://localhost:8080/compound-evolver";

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Client configuration loaded from environment variables.
///
/// All fields have defaults suitable for a local deployment.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Base URL of the evolver web application.
    pub api_url: String,
    /// Time between progress polls while a run is active.
    pub poll_interval: Duration,
    /// Consecutive connection failures after which a run is given up.
    pub max_transient_failures: u32,
    /// Per-request HTTP timeout.
    pub request_timeout: Duration,
    /// Existing server session to resume, as a bare session id or a
    /// `NAME=value` cookie pair.
    pub session_cookie: Option<String>,
}

/// Errors from reading the configuration environment.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} must be {expected}, got {value:?}")]
    Invalid {
        name: &'static str,
        expected: &'static str,
        value: String,
    },
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_transient_failures: DEFAULT_MAX_TRANSIENT_FAILURES,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            session_cookie: None,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                  | Default                                  |
    /// |--------------------------|------------------------------------------|
    /// | `EVOLVER_API_URL`        | `http://localhost:8080/compound-evolver` |
    /// | `POLL_INTERVAL_SECS`     | `5`                                      |
    /// | `MAX_TRANSIENT_FAILURES` | `12`                                     |
    /// | `REQUEST_TIMEOUT_SECS`   | `30`                                     |
    /// | `EVOLVER_SESSION`        | unset                                    |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let api_url = lookup("EVOLVER_API_URL")
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty())
            .unwrap_or(defaults.api_url);

        let poll_secs: u64 = parse_var(&lookup, "POLL_INTERVAL_SECS", defaults.poll_interval.as_secs())?;
        if poll_secs == 0 {
            return Err(ConfigError::Invalid {
                name: "POLL_INTERVAL_SECS",
                expected: "a positive number of seconds",
                value: "0".into(),
            });
        }

        let max_transient_failures =
            parse_var(&lookup, "MAX_TRANSIENT_FAILURES", defaults.max_transient_failures)?;

        let timeout_secs: u64 =
            parse_var(&lookup, "REQUEST_TIMEOUT_SECS", defaults.request_timeout.as_secs())?;

        let session_cookie = lookup("EVOLVER_SESSION")
            .map(|session| session.trim().to_string())
            .filter(|session| !session.is_empty());

        Ok(Self {
            api_url,
            poll_interval: Duration::from_secs(poll_secs),
            max_transient_failures,
            request_timeout: Duration::from_secs(timeout_secs),
            session_cookie,
        })
    }

    /// The polling parameters for [`PollingController`](crate::controller::PollingController).
    pub fn poll_config(&self) -> PollConfig {
        PollConfig {
            interval: self.poll_interval,
            max_transient_failures: self.max_transient_failures,
        }
    }
}

fn parse_var<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
            name,
            expected: "a non-negative integer",
            value: raw,
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = EngineConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.max_transient_failures, 12);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert!(config.session_cookie.is_none());
    }

    #[test]
    fn overrides_from_environment() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("EVOLVER_API_URL", "https://evolver.example.org/app"),
            ("POLL_INTERVAL_SECS", "2"),
            ("MAX_TRANSIENT_FAILURES", "3"),
            ("REQUEST_TIMEOUT_SECS", " 10 "),
            ("EVOLVER_SESSION", " 5F3A9C "),
        ]))
        .unwrap();
        assert_eq!(config.api_url, "https://evolver.example.org/app");
        assert_eq!(config.poll_config().interval, Duration::from_secs(2));
        assert_eq!(config.poll_config().max_transient_failures, 3);
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert_eq!(config.session_cookie.as_deref(), Some("5F3A9C"));
    }

    #[test]
    fn rejects_non_numeric_values() {
        let err = EngineConfig::from_lookup(lookup(&[("MAX_TRANSIENT_FAILURES", "many")])).unwrap_err();
        assert!(err.to_string().contains("MAX_TRANSIENT_FAILURES"));
    }

    #[test]
    fn rejects_zero_poll_interval() {
        assert!(EngineConfig::from_lookup(lookup(&[("POLL_INTERVAL_SECS", "0")])).is_err());
    }
}
