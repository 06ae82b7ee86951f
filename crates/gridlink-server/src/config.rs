//! Server configuration.
//!
//! Configuration is loaded from:
//! - the file given with `--config`
//! - otherwise the first existing default location
//! - environment variables (GRIDLINK_HOST, GRIDLINK_PORT) for the HTTP defaults

use anyhow::{Context as _, Result};
use gridlink_core::context::{DEFAULT_SHUTDOWN_GRACE, DEFAULT_STATS_INTERVAL};
use gridlink_core::{Context, PathConfig};
use gridlink_nodes::NodeConfig;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Default configuration locations, in search order.
const CONFIG_PATHS: [&str; 3] = [
    "gridlink.toml",
    "/etc/gridlink/gridlink.toml",
    "~/.config/gridlink/gridlink.toml",
];

/// Server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// HTTP status endpoint.
    #[serde(default)]
    pub http: HttpConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Engine wide settings.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Nodes, in start order.
    #[serde(default)]
    pub nodes: Vec<NodeConfig>,

    /// Paths between the nodes.
    #[serde(default)]
    pub paths: Vec<PathConfig>,
}

/// HTTP status endpoint configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Metrics configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricsConfig {
    /// Enable metrics export.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Prometheus listener port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

/// Engine configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Interval of periodic hook callbacks and metric updates. Zero disables.
    #[serde(default = "default_stats_interval")]
    pub stats_interval_ms: u64,

    /// Drain bound for paths without their own `shutdown_grace_ms`.
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_ms: u64,
}

// Default value functions
fn default_host() -> String {
    std::env::var("GRIDLINK_HOST").unwrap_or_else(|_| "127.0.0.1".to_string())
}

fn default_port() -> u16 {
    std::env::var("GRIDLINK_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080)
}

fn default_true() -> bool {
    true
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_stats_interval() -> u64 {
    DEFAULT_STATS_INTERVAL.as_millis() as u64
}

fn default_shutdown_grace() -> u64 {
    DEFAULT_SHUTDOWN_GRACE.as_millis() as u64
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_host(),
            port: default_port(),
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

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stats_interval_ms: default_stats_interval(),
            shutdown_grace_ms: default_shutdown_grace(),
        }
    }
}

impl HttpConfig {
    /// Get the socket address to bind to.
    ///
    /// # Errors
    ///
    /// Returns an error if host and port do not form a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid HTTP address {}:{}", self.host, self.port))
    }
}

impl EngineConfig {
    /// Engine context carrying these settings.
    #[must_use]
    pub fn context(&self) -> Context {
        Context::new()
            .with_stats_interval(Duration::from_millis(self.stats_interval_ms))
            .with_shutdown_grace(Duration::from_millis(self.shutdown_grace_ms))
    }
}

impl Config {
    /// Load configuration from `path`, or from the first default location
    /// that exists, or defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::from_file(path);
        }

        for path in &CONFIG_PATHS {
            let expanded = shellexpand::tilde(path);
            if Path::new(expanded.as_ref()).exists() {
                return Self::from_file(expanded.as_ref());
            }
        }

        tracing::warn!("No configuration file found, running without nodes");
        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        tracing::info!(path = %path.display(), nodes = config.nodes.len(), paths = config.paths.len(), "Loaded configuration");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.http.enabled);
        assert!(config.metrics.enabled);
        assert_eq!(config.metrics.port, 9090);
        assert_eq!(config.engine.stats_interval_ms, 1000);
        assert!(config.nodes.is_empty());
    }

    #[test]
    fn test_bind_addr() {
        let http = HttpConfig {
            enabled: true,
            host: "0.0.0.0".into(),
            port: 9000,
        };
        assert_eq!(http.bind_addr().unwrap().port(), 9000);

        let http = HttpConfig {
            host: "not a host".into(),
            ..http
        };
        assert!(http.bind_addr().is_err());
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            [http]
            host = "0.0.0.0"
            port = 9000

            [engine]
            stats_interval_ms = 250

            [[nodes]]
            name = "gen"
            type = "signal"
            signal = "sine"
            rate = 50.0

            [[nodes]]
            name = "udp"
            type = "socket"
            local = "127.0.0.1:12000"
            remote = "127.0.0.1:12001"

            [[paths]]
            in = ["gen"]
            out = ["udp"]
            hooks = [{ type = "decimate", ratio = 2 }]
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.http.port, 9000);
        assert_eq!(config.engine.stats_interval_ms, 250);
        assert_eq!(config.engine.shutdown_grace_ms, 1000);
        assert_eq!(config.nodes.len(), 2);
        assert_eq!(config.nodes[1].kind, "socket");
        assert_eq!(config.paths[0].hooks.len(), 1);

        let ctx = config.engine.context();
        assert_eq!(ctx.stats_interval(), Duration::from_millis(250));
    }

    #[test]
    fn test_unknown_section_rejected() {
        assert!(toml::from_str::<Config>("[transport]\nwebsocket = true").is_err());
    }
}
