//! Server configuration.
//!
//! Configuration is layered:
//! - Built-in defaults
//! - A TOML file: the one passed to [`Config::from_file`], or else the
//!   first found in the search paths
//! - Environment variables (`SEATSYNC_PORT`, `SEATSYNC_AUTH__MODE`, ...)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Files searched by [`Config::load`], first match wins.
const CONFIG_PATHS: [&str; 3] = [
    "seatsync.toml",
    "/etc/seatsync/seatsync.toml",
    "~/.config/seatsync/seatsync.toml",
];

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Transport configuration.
    #[serde(default)]
    pub transport: TransportConfig,

    /// Resource limits.
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Heartbeat configuration.
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,

    /// Seat authentication.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Group distribution strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomAdapterKind {
    /// Groups live in this process.
    #[default]
    Memory,
}

/// Transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Path for the WebSocket endpoint.
    #[serde(default = "default_ws_path")]
    pub websocket_path: String,

    /// Group distribution strategy.
    #[serde(default)]
    pub room_adapter: RoomAdapterKind,

    /// Maximum inbound message size in bytes.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
}

/// Resource limits configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum number of concurrent connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

/// Heartbeat configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    /// Interval advertised to clients, in milliseconds.
    #[serde(default = "default_heartbeat_interval")]
    pub interval_ms: u32,
}

/// How seat claims are checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthMode {
    /// Every claim is accepted.
    #[default]
    Open,
    /// A seat is bound to the first credential presented for it.
    FirstClaim,
}

/// Authentication configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Claim checking mode.
    #[serde(default)]
    pub mode: AuthMode,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics export.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_true() -> bool {
    true
}

fn default_ws_path() -> String {
    "/ws".to_string()
}

fn default_max_message_size() -> usize {
    64 * 1024
}

fn default_max_connections() -> usize {
    100_000
}

fn default_heartbeat_interval() -> u32 {
    30_000
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            transport: TransportConfig::default(),
            limits: LimitsConfig::default(),
            heartbeat: HeartbeatConfig::default(),
            auth: AuthConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            websocket_path: default_ws_path(),
            room_adapter: RoomAdapterKind::default(),
            max_message_size: default_max_message_size(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
        }
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_heartbeat_interval(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_metrics_port(),
        }
    }
}

/// `SEATSYNC_*` variables; `__` separates nested keys.
fn environment() -> config::Environment {
    config::Environment::with_prefix("SEATSYNC")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

impl Config {
    /// Load configuration from the search paths and the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file or variable cannot be parsed.
    pub fn load() -> Result<Self> {
        let file = CONFIG_PATHS
            .iter()
            .map(|path| PathBuf::from(shellexpand::tilde(path).as_ref()))
            .find(|path| path.exists());

        Self::layered(file.as_deref(), environment())
    }

    /// Load configuration from a specific file, with environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or cannot be parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        Self::layered(Some(path), environment())
            .with_context(|| format!("Failed to load config file: {}", path.display()))
    }

    /// Defaults, then `file`, then `env`.
    fn layered(file: Option<&Path>, env: config::Environment) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).format(config::FileFormat::Toml));
        }

        builder
            .add_source(env)
            .build()
            .context("Failed to load configuration")?
            .try_deserialize()
            .context("Invalid configuration")
    }

    /// Render the configuration as TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration")
    }

    /// Get the socket address to bind to.
    ///
    /// # Errors
    ///
    /// Returns an error if host and port do not form an address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid bind address {}:{}", self.host, self.port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.transport.websocket_path, "/ws");
        assert_eq!(config.transport.room_adapter, RoomAdapterKind::Memory);
        assert_eq!(config.auth.mode, AuthMode::Open);
    }

    #[test]
    fn test_config_bind_addr() {
        let mut config = Config::default();
        assert_eq!(config.bind_addr().unwrap().port(), 8080);

        config.host = "not a host".into();
        assert!(config.bind_addr().is_err());
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            host = "0.0.0.0"
            port = 9000

            [transport]
            max_message_size = 1024

            [auth]
            mode = "first-claim"
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 9000);
        assert_eq!(config.transport.max_message_size, 1024);
        assert_eq!(config.transport.websocket_path, "/ws");
        assert_eq!(config.auth.mode, AuthMode::FirstClaim);
        assert_eq!(config.limits.max_connections, 100_000);
    }

    #[test]
    fn test_config_from_file() {
        let path = std::env::temp_dir().join(format!("seatsync-{}.toml", std::process::id()));
        std::fs::write(&path, "port = 9100\n[heartbeat]\ninterval_ms = 5000\n").unwrap();

        let config = Config::from_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.port, 9100);
        assert_eq!(config.heartbeat.interval_ms, 5000);
        assert!(Config::from_file(&path).is_err());
    }

    fn env(vars: &[(&str, &str)]) -> config::Environment {
        environment().source(Some(
            vars.iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        ))
    }

    #[test]
    fn test_env_overrides_file() {
        let path = std::env::temp_dir().join(format!("seatsync-env-{}.toml", std::process::id()));
        std::fs::write(&path, "port = 9100\n[heartbeat]\ninterval_ms = 5000\n").unwrap();

        let config = Config::layered(
            Some(path.as_path()),
            env(&[
                ("SEATSYNC_PORT", "9200"),
                ("SEATSYNC_AUTH__MODE", "first-claim"),
                ("SEATSYNC_TRANSPORT__MAX_MESSAGE_SIZE", "2048"),
            ]),
        )
        .unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.port, 9200);
        assert_eq!(config.auth.mode, AuthMode::FirstClaim);
        assert_eq!(config.transport.max_message_size, 2048);
        assert_eq!(config.heartbeat.interval_ms, 5000);
    }

    #[test]
    fn test_env_only() {
        let config = Config::layered(None, env(&[("SEATSYNC_METRICS__ENABLED", "false")])).unwrap();
        assert!(!config.metrics.enabled);
        assert_eq!(config.port, 8080);
    }

    #[test]
    fn test_toml_output_parses_back() {
        let mut config = Config::default();
        config.auth.mode = AuthMode::FirstClaim;

        let parsed: Config = toml::from_str(&config.to_toml().unwrap()).unwrap();
        assert_eq!(parsed.auth.mode, AuthMode::FirstClaim);
        assert_eq!(parsed.port, config.port);
    }
}
