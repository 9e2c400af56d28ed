use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::error::ServerError;

/// Default request body limit: 10 MiB.
pub const DEFAULT_MAX_BODY_SIZE: usize = 10 * 1024 * 1024;

/// Server configuration.
///
/// Every field has a default, so a YAML file only needs the keys it changes.
/// Durations are written in seconds and may be fractional (`0.5`).
///
/// ```yaml
/// host: 0.0.0.0
/// port: 8443
/// max_body_size: 1048576
/// request_timeout: 10
/// tls:
///   cert_path: /etc/beacon/cert.pem
///   key_path: /etc/beacon/key.pem
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Largest request body accepted before answering 413.
    pub max_body_size: usize,
    /// How long an idle keep-alive connection waits for its next request.
    #[serde(deserialize_with = "seconds")]
    pub keep_alive_timeout: Duration,
    /// How long a partially received request may stall between chunks.
    #[serde(deserialize_with = "seconds")]
    pub request_timeout: Duration,
    /// Upper bound on receive calls spent on a single request.
    pub max_read_attempts: usize,
    #[serde(deserialize_with = "seconds")]
    pub sse_ping_interval: Duration,
    #[serde(deserialize_with = "seconds")]
    pub stats_interval: Duration,
    /// Whether SSE routes are served on encrypted connections.
    pub sse_over_tls: bool,
    pub tls: Option<TlsConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TlsConfig {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            keep_alive_timeout: Duration::from_secs(60),
            request_timeout: Duration::from_secs(30),
            max_read_attempts: 10_000,
            sse_ping_interval: Duration::from_secs(30),
            stats_interval: Duration::from_secs(60),
            sse_over_tls: false,
            tls: None,
        }
    }
}

impl ServerConfig {
    /// Loads configuration the way the binary does.
    ///
    /// Reads the YAML file named by `BEACON_CONFIG` when set, otherwise starts
    /// from defaults, then applies a `LISTEN=host:port` override.
    pub fn load() -> Result<Self, ServerError> {
        let mut cfg = match std::env::var("BEACON_CONFIG") {
            Ok(path) => Self::from_file(path)?,
            Err(_) => Self::default(),
        };

        if let Ok(listen) = std::env::var("LISTEN") {
            cfg.apply_listen(&listen)?;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ServerError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            ServerError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&text)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, ServerError> {
        let cfg: ServerConfig = serde_yaml::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Overrides host and port from a `host:port` string.
    pub fn apply_listen(&mut self, listen: &str) -> Result<(), ServerError> {
        let (host, port) = listen
            .rsplit_once(':')
            .ok_or_else(|| ServerError::Config(format!("LISTEN must be host:port, got {listen:?}")))?;
        self.port = port
            .parse()
            .map_err(|_| ServerError::Config(format!("invalid port in LISTEN: {port:?}")))?;
        self.host = host.trim_start_matches('[').trim_end_matches(']').to_string();
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ServerError> {
        if self.max_body_size == 0 {
            return Err(ServerError::Config("max_body_size must be positive".into()));
        }
        if self.max_read_attempts == 0 {
            return Err(ServerError::Config("max_read_attempts must be positive".into()));
        }
        if self.sse_ping_interval.is_zero() || self.stats_interval.is_zero() {
            return Err(ServerError::Config("intervals must be positive".into()));
        }
        Ok(())
    }

    /// `host:port`, bracketing IPv6 hosts.
    pub fn listen_addr(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    pub fn is_tls(&self) -> bool {
        self.tls.is_some()
    }
}

fn seconds<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let secs = f64::deserialize(deserializer)?;
    Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
}
