//! Configuration loading and validation for the monitor engine.

use crate::types::TargetId;
use probe::{HttpProber, Prober, TcpProber, TlsProber, WsProber};
use serde::{Deserialize, Serialize};
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use validator::{Validate, ValidationError};

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found in search paths")]
    FileNotFound,

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(#[from] validator::ValidationErrors),
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineSettings,

    #[serde(default)]
    pub logging: LoggingSettings,

    #[serde(default)]
    pub targets: Vec<TargetConfig>,
}

impl Validate for Config {
    fn validate(&self) -> Result<(), validator::ValidationErrors> {
        self.engine.validate()?;
        Ok(())
    }
}

/// Engine-level settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct EngineSettings {
    /// Concurrent probe cycle slots across all targets
    #[validate(range(min = 1, max = 4096))]
    pub max_concurrent_probes: usize,

    /// Capacity of the transition event stream
    #[validate(range(min = 1, max = 100000))]
    pub event_capacity: usize,

    /// Buffer size of the scheduler-to-aggregator channel
    #[validate(range(min = 1, max = 100000))]
    pub result_channel: usize,

    /// Base delay for in-cycle retry backoff
    #[serde(with = "humantime_serde")]
    #[validate(custom = "validate_backoff_base")]
    pub backoff_base: Duration,

    /// Upper bound on a single retry backoff delay
    #[serde(with = "humantime_serde")]
    #[validate(custom = "validate_backoff_cap")]
    pub backoff_cap: Duration,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    pub level: Option<String>,
    pub format: Option<String>,
}

/// One monitored endpoint.
///
/// Immutable once scheduled; a reload replaces the whole descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Stable identifier, unique across the target list
    pub id: TargetId,

    /// Host name or IP address
    pub host: String,

    /// Port to probe
    pub port: u16,

    /// Interval between probe cycles
    #[serde(with = "humantime_serde")]
    pub interval: Duration,

    /// Deadline for each probe attempt
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// In-cycle retries after a failed attempt
    #[serde(default)]
    pub retries: u32,

    /// Protocol-specific probe parameters
    #[serde(flatten)]
    pub kind: ProbeKindConfig,
}

/// Protocol-specific probe configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ProbeKindConfig {
    /// TCP connect check
    Tcp,

    /// TLS handshake check
    Tls {
        /// Validate the certificate chain and hostname
        #[serde(default = "default_true")]
        verify: bool,
        /// SNI name, defaults to the target host
        #[serde(default)]
        server_name: Option<String>,
    },

    /// HTTP/HTTPS check
    Http {
        /// HTTP method (GET, HEAD, ...)
        #[serde(default = "default_method")]
        method: String,
        /// Request path
        #[serde(default = "default_path")]
        path: String,
        /// Accepted status codes; empty accepts any 2xx
        #[serde(default)]
        expected_codes: Vec<u16>,
        /// Use HTTPS
        #[serde(default)]
        secure: bool,
        /// Validate the certificate when secure
        #[serde(default = "default_true")]
        verify: bool,
    },

    /// WebSocket upgrade/echo check
    Ws {
        /// Upgrade request path
        #[serde(default = "default_path")]
        path: String,
        /// Text message the endpoint must echo back; with none, a completed
        /// handshake alone is success
        #[serde(default)]
        message: Option<String>,
    },
}

fn default_true() -> bool {
    true
}

fn default_method() -> String {
    "GET".to_string()
}

fn default_path() -> String {
    "/".to_string()
}

/// Map a configured method name onto the supported set.
fn parse_method(method: &str) -> Option<probe::Method> {
    match method.to_uppercase().as_str() {
        "GET" => Some(probe::Method::GET),
        "HEAD" => Some(probe::Method::HEAD),
        "POST" => Some(probe::Method::POST),
        "PUT" => Some(probe::Method::PUT),
        "DELETE" => Some(probe::Method::DELETE),
        "OPTIONS" => Some(probe::Method::OPTIONS),
        _ => None,
    }
}

impl TargetConfig {
    /// Validate this single target entry.
    ///
    /// One bad target must not abort loading the rest, so this is checked
    /// per entry rather than through the config-wide validator.
    pub fn check(&self) -> Result<(), String> {
        if self.host.trim().is_empty() {
            return Err("host must not be empty".to_string());
        }
        if self.port == 0 {
            return Err("port must not be zero".to_string());
        }
        if self.interval < Duration::from_millis(100) {
            return Err("interval must be at least 100ms".to_string());
        }
        if self.timeout < Duration::from_millis(1) {
            return Err("timeout must be at least 1ms".to_string());
        }
        match &self.kind {
            ProbeKindConfig::Http { method, path, .. } => {
                if parse_method(method).is_none() {
                    return Err(format!("unsupported HTTP method: {}", method));
                }
                if !path.starts_with('/') {
                    return Err(format!("path must start with '/': {}", path));
                }
            }
            ProbeKindConfig::Ws { path, .. } => {
                if !path.starts_with('/') {
                    return Err(format!("path must start with '/': {}", path));
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Resolve the configured address, taking the first answer.
    pub fn resolve(&self) -> common::Result<SocketAddr> {
        let mut addrs = (self.host.as_str(), self.port).to_socket_addrs()?;
        addrs
            .next()
            .ok_or_else(|| common::Error::config(format!("failed to resolve: {}", self.host)))
    }

    /// Build the prober for this target.
    ///
    /// A target with no resolvable meaning is rejected here, at load time,
    /// never at probe time.
    pub fn build_prober(&self) -> common::Result<Arc<dyn Prober>> {
        self.check().map_err(common::Error::config)?;

        match &self.kind {
            ProbeKindConfig::Tcp => {
                let addr = self.resolve()?;
                Ok(Arc::new(TcpProber::new(addr)))
            }
            ProbeKindConfig::Tls {
                verify,
                server_name,
            } => {
                let addr = self.resolve()?;
                let host = server_name.as_deref().unwrap_or(&self.host);
                Ok(Arc::new(TlsProber::new(addr, host, *verify)?))
            }
            ProbeKindConfig::Http {
                method,
                path,
                expected_codes,
                secure,
                verify,
            } => {
                let scheme = if *secure { "https" } else { "http" };
                let url = format!("{}://{}:{}{}", scheme, self.host, self.port, path);
                let method = parse_method(method).ok_or_else(|| {
                    common::Error::config(format!("unsupported HTTP method: {}", method))
                })?;
                Ok(Arc::new(HttpProber::new(
                    url,
                    method,
                    expected_codes.clone(),
                    *verify,
                )?))
            }
            ProbeKindConfig::Ws { path, message } => {
                let addr = self.resolve()?;
                let url = format!("ws://{}:{}{}", self.host, self.port, path);
                Ok(Arc::new(WsProber::new(addr, url, message.clone())))
            }
        }
    }
}

// Default implementations

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_concurrent_probes: 64,
            event_capacity: 1024,
            result_channel: 1024,
            backoff_base: Duration::from_millis(100),
            backoff_cap: Duration::from_secs(2),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: None,
            format: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            engine: EngineSettings::default(),
            logging: LoggingSettings::default(),
            targets: Vec::new(),
        }
    }
}

// Custom validators

fn validate_backoff_base(delay: &Duration) -> Result<(), ValidationError> {
    let millis = delay.as_millis();
    if millis < 1 || millis > 10_000 {
        return Err(ValidationError::new("backoff_base_out_of_range"));
    }
    Ok(())
}

fn validate_backoff_cap(delay: &Duration) -> Result<(), ValidationError> {
    let millis = delay.as_millis();
    if millis < 1 || millis > 60_000 {
        return Err(ValidationError::new("backoff_cap_out_of_range"));
    }
    Ok(())
}

// Configuration loading implementation

impl Config {
    /// Load configuration from default search paths
    pub fn load() -> Result<Self, ConfigError> {
        match Self::find_config_file() {
            Some(path) => {
                tracing::info!("Loading configuration from: {}", path.display());
                Self::load_from_file(&path)
            }
            None => {
                tracing::info!("No configuration file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let config: Config = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Find configuration file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("NETWORK_MONITOR_CONFIG") {
            return Some(PathBuf::from(path));
        }

        let mut paths = vec![PathBuf::from("/etc/network-monitor/config.yaml")];

        if let Some(home_path) = Self::home_config_path() {
            paths.push(home_path);
        }

        paths.push(PathBuf::from("./network-monitor.yaml"));

        paths
            .into_iter()
            .find(|p: &PathBuf| p.exists() && p.is_file())
    }

    /// Get home directory config path
    fn home_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".config/network-monitor/config.yaml"))
    }

    /// The configured targets that pass per-entry validation.
    ///
    /// Malformed entries and duplicate ids are rejected individually with a
    /// warning; the rest load.
    pub fn valid_targets(&self) -> Vec<TargetConfig> {
        let mut seen = std::collections::HashSet::new();
        let mut valid = Vec::with_capacity(self.targets.len());

        for target in &self.targets {
            if let Err(reason) = target.check() {
                tracing::warn!(id = target.id, host = %target.host, %reason, "Rejecting target");
                continue;
            }
            if !seen.insert(target.id) {
                tracing::warn!(id = target.id, host = %target.host, "Rejecting target with duplicate id");
                continue;
            }
            valid.push(target.clone());
        }

        valid
    }
}
