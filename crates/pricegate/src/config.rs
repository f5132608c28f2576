use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, de};
use tracing::level_filters::LevelFilter;
use url::Url;

/// Controls the log format.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Auto detect (pretty for tty, simplified for other)
    Auto,
    /// With colors
    Pretty,
    /// Simplified log output
    Simplified,
    /// Dump out JSON lines
    Json,
}

/// Controls the logging system.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Logging {
    /// The log level for the engine.
    #[serde(deserialize_with = "deserialize_level_filter")]
    pub level: LevelFilter,
    /// Controls the log format.
    pub format: LogFormat,
    /// When set to true, backtraces are forced on.
    pub enable_backtraces: bool,
}

impl Default for Logging {
    fn default() -> Self {
        Logging {
            level: LevelFilter::INFO,
            format: LogFormat::Auto,
            enable_backtraces: true,
        }
    }
}

/// Fine-tuning of the read-result cache.
#[derive(Debug, Clone, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum age before a cached payload is treated as absent.
    ///
    /// Defaults to one hour, matching the cache window of the upstream proxy,
    /// so client-side staleness is bounded by the same duration.
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
    /// Maximum number of payloads held in memory.
    pub max_capacity: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(3600),
            max_capacity: 1_000,
        }
    }
}

/// Fine-tuning of the circuit breaker.
#[derive(Debug, Clone, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct HealthConfig {
    /// How long requests are refused after a failure.
    ///
    /// The block starts with the first failure of an episode and is not
    /// extended by further failures while it is active.
    #[serde(with = "humantime_serde")]
    pub block_time: Duration,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            block_time: Duration::from_secs(30),
        }
    }
}

/// Default retry behavior for consumer-side reads.
#[derive(Debug, Clone, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    /// Total number of attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles on every further retry.
    #[serde(with = "humantime_serde")]
    pub base_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

/// Connection settings for the HTTP transport.
#[derive(Debug, Clone, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct HttpConfig {
    /// Base URL of the API proxy; request paths are joined onto it.
    pub base_url: Url,
    /// Bearer token attached to every request.
    pub bearer_token: Option<String>,
    /// Request timeout applied by the client.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080/"
                .parse()
                .expect("default base url must parse"),
            bearer_token: None,
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub logging: Logging,
    pub cache: CacheConfig,
    pub health: HealthConfig,
    pub retry: RetryConfig,
    pub http: HttpConfig,
}

impl Config {
    pub fn get(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_reader(
                fs::File::open(path).context("failed to open configuration file")?,
            ),
            None => Ok(Config::default()),
        }
    }

    fn from_reader(mut reader: impl std::io::Read) -> Result<Self> {
        let mut config = String::new();
        reader
            .read_to_string(&mut config)
            .context("failed to read configuration file")?;
        serde_yaml::from_str(&config).context("failed to parse config YAML")
    }
}

fn deserialize_level_filter<'de, D>(deserializer: D) -> Result<LevelFilter, D::Error>
where
    D: Deserializer<'de>,
{
    let level = String::deserialize(deserializer)?;
    level.parse().map_err(de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config() {
        // Regression test: an empty YAML mapping must produce the defaults.
        let cfg = Config::from_reader("{}".as_bytes()).unwrap();
        assert_eq!(cfg.cache.ttl, Duration::from_secs(3600));
        assert_eq!(cfg.health.block_time, Duration::from_secs(30));
        assert_eq!(cfg.retry.max_attempts, 3);
    }

    #[test]
    fn test_humantime_durations() {
        let yaml = r#"
            cache:
              ttl: 15m
            health:
              block_time: 2m 30s
            retry:
              base_delay: 250ms
        "#;
        let cfg = Config::from_reader(yaml.as_bytes()).unwrap();
        assert_eq!(cfg.cache.ttl, Duration::from_secs(900));
        assert_eq!(cfg.health.block_time, Duration::from_secs(150));
        assert_eq!(cfg.retry.base_delay, Duration::from_millis(250));
    }

    #[test]
    fn test_http_section() {
        let yaml = r#"
            http:
              base_url: "https://api.example.com/v1/proxy/"
              bearer_token: "sk_live_123"
              timeout: 10s
        "#;
        let cfg = Config::from_reader(yaml.as_bytes()).unwrap();
        assert_eq!(
            cfg.http.base_url.as_str(),
            "https://api.example.com/v1/proxy/"
        );
        assert_eq!(cfg.http.bearer_token.as_deref(), Some("sk_live_123"));
        assert_eq!(cfg.http.timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_logging_section() {
        let yaml = r#"
            logging:
              level: debug
              format: json
              enable_backtraces: false
        "#;
        let cfg = Config::from_reader(yaml.as_bytes()).unwrap();
        assert_eq!(cfg.logging.level, LevelFilter::DEBUG);
        assert_eq!(cfg.logging.format, LogFormat::Json);
        assert!(!cfg.logging.enable_backtraces);
    }

    #[test]
    fn test_invalid_level_is_rejected() {
        let yaml = "logging:\n  level: shouting\n";
        assert!(Config::from_reader(yaml.as_bytes()).is_err());
    }
}
