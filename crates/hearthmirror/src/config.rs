//! Configuration file parsing and structures.
//!
//! hearthmirror reads an optional TOML file. Every section and field has a default, so an empty
//! file (or no file at all) yields a client pointed at a server on localhost.

use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::filter::LevelFilter;
use url::Url;

/// Top-level configuration structure
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub poll: PollConfig,
    pub channel: ChannelConfig,
    pub flash: FlashConfig,
    pub logging: LoggingConfig,
}

#[derive(
    Debug,
    Default,
    Deserialize,
    Serialize,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: LogLevel,

    /// Per-target levels, e.g. `hearthmirror::engine = "debug"`
    pub overrides: HashMap<String, LogLevel>,
}

impl LoggingConfig {
    /// Build the subscriber filter from the global level and the per-target overrides.
    pub fn env_filter(&self) -> Result<EnvFilter, ConfigError> {
        let mut filter = EnvFilter::default().add_directive(LevelFilter::from(self.level).into());

        for (target, level) in &self.overrides {
            let directive: Directive = format!("{}={}", target, LevelFilter::from(*level))
                .parse()
                .map_err(|e| {
                    ConfigError::Invalid(format!("bad logging override for {}: {}", target, e))
                })?;
            filter = filter.add_directive(directive);
        }

        Ok(filter)
    }
}

/// Where the device server lives
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Base URL of the HTTP API
    pub base_url: String,

    /// Socket.IO endpoint of the push channel; `base_url` when absent
    pub socket_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:5000".to_string(),
            socket_url: None,
        }
    }
}

impl ServerConfig {
    /// Push channel URL: `socket_url` if set, otherwise `base_url`.
    ///
    /// Socket.IO clients take the plain http(s) origin and negotiate the transport themselves.
    pub fn socket_url(&self) -> Result<Url, ConfigError> {
        let (field, raw) = match &self.socket_url {
            Some(socket_url) => ("socket_url", socket_url),
            None => ("base_url", &self.base_url),
        };
        let url = Url::parse(raw)
            .map_err(|e| ConfigError::Invalid(format!("invalid {} {}: {}", field, raw, e)))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(ConfigError::Invalid(format!(
                "{} must be http or https, got {}",
                field, other
            ))),
        }
    }
}

/// Full-state polling
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    pub interval_ms: u64,

    /// Per-request HTTP timeout; must stay below `interval_ms`
    pub timeout_ms: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            timeout_ms: 800,
        }
    }
}

impl PollConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Push channel reconnection policy
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    pub reconnect_delay_ms: u64,
    pub reconnect_attempts: u32,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            reconnect_delay_ms: 1000,
            reconnect_attempts: 5,
        }
    }
}

impl ChannelConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

/// How long each card type stays highlighted after a change
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FlashConfig {
    pub air_conditioner_ms: u64,
    pub light_ms: u64,
}

impl Default for FlashConfig {
    fn default() -> Self {
        Self {
            air_conditioner_ms: 1200,
            light_ms: 1000,
        }
    }
}

impl FlashConfig {
    pub fn air_conditioner(&self) -> Duration {
        Duration::from_millis(self.air_conditioner_ms)
    }

    pub fn light(&self) -> Duration {
        Duration::from_millis(self.light_ms)
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(path.as_ref().to_path_buf(), e))?;

        Self::from_toml(&contents)
    }

    /// Load `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            Self::from_file(path)
        } else {
            tracing::debug!(
                "No config file at {}, using defaults",
                path.as_ref().display()
            );
            Ok(Self::default())
        }
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Check values serde cannot reject on its own
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll.interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "poll.interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.poll.timeout_ms == 0 || self.poll.timeout_ms >= self.poll.interval_ms {
            return Err(ConfigError::Invalid(format!(
                "poll.timeout_ms must be between 1 and poll.interval_ms ({}), got {}",
                self.poll.interval_ms, self.poll.timeout_ms
            )));
        }
        Url::parse(&self.server.base_url).map_err(|e| {
            ConfigError::Invalid(format!(
                "invalid base_url {}: {}",
                self.server.base_url, e
            ))
        })?;
        self.server.socket_url()?;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
