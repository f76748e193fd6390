//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use dispatch::DispatcherConfig;

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`, `PORT`: bind address (default `0.0.0.0:3000`)
/// - `RUST_LOG`: tracing filter directive (default `info`)
/// - `LOG_FORMAT`: `text` or `json`
/// - `DATABASE_URL`: PostgreSQL connection string; unset means the in-memory store
/// - `OUTBOX_POLL_INTERVAL_MS`, `OUTBOX_BATCH_SIZE`, `OUTBOX_MAX_ATTEMPTS`,
///   `OUTBOX_VISIBILITY_TIMEOUT_MS`, `OUTBOX_HANDLER_TIMEOUT_MS`: dispatcher tuning
/// - `CACHE_TTL_SECS`: TTL of read-through cache entries
///
/// Unparseable values fall back to the default.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub dispatcher: DispatcherConfig,
    pub cache_ttl: Duration,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parsed = |name: &str| lookup(name).and_then(|v| v.trim().parse::<u64>().ok());
        let millis = |name: &str, default: Duration| {
            parsed(name).map(Duration::from_millis).unwrap_or(default)
        };

        let dispatcher = DispatcherConfig {
            poll_interval: millis("OUTBOX_POLL_INTERVAL_MS", defaults.dispatcher.poll_interval),
            batch_size: parsed("OUTBOX_BATCH_SIZE")
                .and_then(|n| usize::try_from(n).ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.dispatcher.batch_size),
            max_attempts: parsed("OUTBOX_MAX_ATTEMPTS")
                .and_then(|n| u32::try_from(n).ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.dispatcher.max_attempts),
            visibility_timeout: millis(
                "OUTBOX_VISIBILITY_TIMEOUT_MS",
                defaults.dispatcher.visibility_timeout,
            ),
            handler_timeout: millis(
                "OUTBOX_HANDLER_TIMEOUT_MS",
                defaults.dispatcher.handler_timeout,
            ),
            ..defaults.dispatcher
        };

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: lookup("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: lookup("LOG_FORMAT")
                .and_then(|f| f.parse().ok())
                .unwrap_or(defaults.log_format),
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            dispatcher,
            cache_ttl: parsed("CACHE_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.cache_ttl),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            dispatcher: DispatcherConfig::default(),
            cache_ttl: Duration::from_secs(300),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_default_values() {
        let config = from_pairs(&[]);
        assert_eq!(config.addr(), "0.0.0.0:3000");
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, LogFormat::Text);
        assert!(config.database_url.is_none());
        assert_eq!(config.dispatcher.batch_size, 100);
        assert_eq!(config.dispatcher.max_attempts, 5);
        assert_eq!(config.cache_ttl, Duration::from_secs(300));
    }

    #[test]
    fn test_overrides() {
        let config = from_pairs(&[
            ("HOST", "127.0.0.1"),
            ("PORT", "8080"),
            ("LOG_FORMAT", "JSON"),
            ("DATABASE_URL", "postgres://localhost/catalog"),
            ("OUTBOX_POLL_INTERVAL_MS", "250"),
            ("OUTBOX_BATCH_SIZE", "10"),
            ("OUTBOX_MAX_ATTEMPTS", "3"),
            ("OUTBOX_HANDLER_TIMEOUT_MS", "1500"),
            ("CACHE_TTL_SECS", "60"),
        ]);
        assert_eq!(config.addr(), "127.0.0.1:8080");
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(
            config.database_url.as_deref(),
            Some("postgres://localhost/catalog")
        );
        assert_eq!(config.dispatcher.poll_interval, Duration::from_millis(250));
        assert_eq!(config.dispatcher.batch_size, 10);
        assert_eq!(config.dispatcher.max_attempts, 3);
        assert_eq!(config.dispatcher.handler_timeout, Duration::from_millis(1500));
        assert_eq!(config.cache_ttl, Duration::from_secs(60));
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = from_pairs(&[
            ("PORT", "not-a-port"),
            ("LOG_FORMAT", "xml"),
            ("OUTBOX_BATCH_SIZE", "0"),
            ("DATABASE_URL", "  "),
        ]);
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_format, LogFormat::Text);
        assert_eq!(config.dispatcher.batch_size, 100);
        assert!(config.database_url.is_none());
    }
}
