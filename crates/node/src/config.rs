//! Node configuration loaded from environment variables.

use std::time::Duration;

use projections::RetryPolicy;

/// Node configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` — bind address (default: `"0.0.0.0"`)
/// - `PORT` — listen port (default: `3000`)
/// - `RUST_LOG` — tracing filter directive (default: `"info"`)
/// - `DATABASE_URL` — PostgreSQL connection string; unset runs a single
///   in-memory node
/// - `DATABASE_MAX_CONNECTIONS` — pool size (default: `10`)
/// - `COMMAND_MAX_RETRIES` — conflict retries per command (default: `0`)
/// - `CONSUMER_RETRY_SECS` — retry failed consumers after this many
///   seconds; unset means failed consumers wait for a manual retry
/// - `SNAPSHOT_CACHE_CAPACITY` — aggregate snapshots kept per node;
///   `0` disables the cache (default: `1024`)
/// - `DEFAULT_ACTOR` — actor recorded for commands without one
///   (default: `"system"`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub command_max_retries: u32,
    pub consumer_retry: Option<Duration>,
    pub snapshot_cache_capacity: usize,
    pub default_actor: String,
}

fn var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = var(name)?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(variable = name, value = %raw, "ignoring unparsable setting");
            None
        }
    }
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: var("HOST").unwrap_or(defaults.host),
            port: parsed("PORT").unwrap_or(defaults.port),
            log_level: var("RUST_LOG").unwrap_or(defaults.log_level),
            database_url: var("DATABASE_URL"),
            database_max_connections: parsed("DATABASE_MAX_CONNECTIONS")
                .unwrap_or(defaults.database_max_connections),
            command_max_retries: parsed("COMMAND_MAX_RETRIES")
                .unwrap_or(defaults.command_max_retries),
            consumer_retry: parsed::<u64>("CONSUMER_RETRY_SECS")
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            snapshot_cache_capacity: parsed("SNAPSHOT_CACHE_CAPACITY")
                .unwrap_or(defaults.snapshot_cache_capacity),
            default_actor: var("DEFAULT_ACTOR").unwrap_or(defaults.default_actor),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.consumer_retry
            .map_or(RetryPolicy::Manual, RetryPolicy::Interval)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            database_url: None,
            database_max_connections: 10,
            command_max_retries: 0,
            consumer_retry: None,
            snapshot_cache_capacity: 1024,
            default_actor: "system".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_level, "info");
        assert!(config.database_url.is_none());
        assert_eq!(config.command_max_retries, 0);
        assert_eq!(config.retry_policy(), RetryPolicy::Manual);
    }

    #[test]
    fn test_addr_formatting() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Config::default()
        };
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_interval_retry_policy() {
        let config = Config {
            consumer_retry: Some(Duration::from_secs(30)),
            ..Config::default()
        };
        assert_eq!(
            config.retry_policy(),
            RetryPolicy::Interval(Duration::from_secs(30))
        );
    }
}
