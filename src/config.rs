//! # Configuration Management
//!
//! Typed configuration for the gateway: listener, TLS credentials, framing
//! limits, the logon worker pool and logging.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()` / `from_toml()`
//! - Direct instantiation with defaults
//! - `LOGON_GATEWAY_*` environment overrides via `from_env()`
//!
//! ## Security Considerations
//! - Frame payloads are capped before any buffer is reserved
//! - TLS handshakes and idle sessions have deadlines (slowloris)
//! - TLS 1.2 is the lowest accepted protocol version

use crate::core::frame::{HEADER_LEN, LENGTH_PREFIX_LEN};
use crate::error::{GatewayError, Result};
use crate::session::write_queue::MAX_QUEUED_BYTES;
use crate::utils::timeout;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::Level;

pub use crate::core::frame::MAX_PAYLOAD_SIZE;

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "LOGON_GATEWAY_";

/// Top-level gateway configuration
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct GatewayConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub tls: TlsConfig,

    #[serde(default)]
    pub transport: TransportConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl GatewayConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|e| GatewayError::ConfigError(format!("Failed to read config file: {e}")))?;
        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| GatewayError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Defaults with `LOGON_GATEWAY_*` overrides applied
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Override fields from `LOGON_GATEWAY_*` variables. A variable that is set
    /// but does not parse is an error rather than silently ignored.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(addr) = env_var("BIND_ADDRESS") {
            self.server.bind_address = addr;
        }
        if let Some(port) = env_parse::<u16>("PORT")? {
            self.server.port = port;
        }
        if let Some(threads) = env_parse::<usize>("IO_THREADS")? {
            self.server.io_threads = threads;
        }
        if let Some(max) = env_parse::<usize>("MAX_CONNECTIONS")? {
            self.server.max_connections = max;
        }
        if let Some(ms) = env_parse::<u64>("IDLE_TIMEOUT_MS")? {
            self.server.idle_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = env_parse::<u64>("HANDSHAKE_TIMEOUT_MS")? {
            self.server.handshake_timeout = Duration::from_millis(ms);
        }
        if let Some(path) = env_var("TLS_CERT") {
            self.tls.cert_path = Some(path);
        }
        if let Some(path) = env_var("TLS_KEY") {
            self.tls.key_path = Some(path);
        }
        if let Some(size) = env_parse::<usize>("MAX_PAYLOAD_SIZE")? {
            self.transport.max_payload_size = size;
        }
        if let Some(size) = env_parse::<usize>("MAX_QUEUED_BYTES")? {
            self.transport.max_queued_bytes = size;
        }
        if let Some(workers) = env_parse::<usize>("AUTH_WORKERS")? {
            self.auth.max_in_flight = workers;
        }
        if let Some(level) = env_var("LOG_LEVEL") {
            self.logging.log_level = level
                .parse::<Level>()
                .map_err(|_| GatewayError::ConfigError(format!("Invalid log level: {level}")))?;
        }
        Ok(())
    }

    /// Apply overrides to the default configuration
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// Generate example configuration file content
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate example config"))
    }

    /// Save configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| GatewayError::ConfigError(format!("Failed to serialize config: {e}")))?;
        fs::write(path, content)
            .map_err(|e| GatewayError::ConfigError(format!("Failed to write config file: {e}")))?;
        Ok(())
    }

    /// Validate the configuration for common issues and misconfigurations
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.server.validate());
        errors.extend(self.tls.validate());
        errors.extend(self.transport.validate());
        errors.extend(self.auth.validate());
        errors.extend(self.logging.validate());
        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(GatewayError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(format!("{ENV_PREFIX}{name}")).ok()
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match env_var(name) {
        None => Ok(None),
        Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|_| {
            GatewayError::ConfigError(format!("Invalid value for {ENV_PREFIX}{name}: '{raw}'"))
        }),
    }
}

/// Listener and session lifetime settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind (e.g. "0.0.0.0")
    pub bind_address: String,

    /// TCP port; 0 asks the OS for a free one
    pub port: u16,

    /// Threads driving socket I/O
    pub io_threads: usize,

    /// Maximum number of live sessions
    pub max_connections: usize,

    /// Sessions with no traffic for this long are closed
    #[serde(with = "duration_serde")]
    pub idle_timeout: Duration,

    /// Deadline for completing the TLS handshake
    #[serde(with = "duration_serde")]
    pub handshake_timeout: Duration,

    /// How long a requested disconnect may spend flushing replies
    #[serde(with = "duration_serde")]
    pub linger: Duration,

    /// Timeout for graceful server shutdown
    #[serde(with = "duration_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: String::from("0.0.0.0"),
            port: 1119,
            io_threads: 2,
            max_connections: 5000,
            idle_timeout: timeout::IDLE_TIMEOUT,
            handshake_timeout: timeout::HANDSHAKE_TIMEOUT,
            linger: timeout::LINGER_TIMEOUT,
            shutdown_timeout: timeout::SHUTDOWN_TIMEOUT,
        }
    }
}

impl ServerConfig {
    /// `bind_address:port` as a string, bracketing IPv6 hosts
    pub fn listen_address(&self) -> String {
        if self.bind_address.contains(':') && !self.bind_address.starts_with('[') {
            format!("[{}]:{}", self.bind_address, self.port)
        } else {
            format!("{}:{}", self.bind_address, self.port)
        }
    }

    /// Validate server configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.bind_address.is_empty() {
            errors.push("Bind address cannot be empty".to_string());
        } else if self.bind_address.parse::<std::net::IpAddr>().is_err() {
            errors.push(format!(
                "Invalid bind address: '{}' (expected an IP such as '0.0.0.0')",
                self.bind_address
            ));
        }

        if self.io_threads == 0 {
            errors.push("I/O thread count must be greater than 0".to_string());
        } else if self.io_threads > 64 {
            errors.push(format!("Too many I/O threads: {} (maximum: 64)", self.io_threads));
        }

        if self.max_connections == 0 {
            errors.push("Max connections must be greater than 0".to_string());
        } else if self.max_connections > 100_000 {
            errors.push(format!(
                "Max connections very high: {} (ensure system resources can support this)",
                self.max_connections
            ));
        }

        if self.idle_timeout.as_millis() < 100 {
            errors.push("Idle timeout too short (minimum: 100ms)".to_string());
        } else if self.idle_timeout.as_secs() > 3600 {
            errors.push("Idle timeout too long (maximum: 1 hour)".to_string());
        }

        if self.handshake_timeout.as_millis() < 100 {
            errors.push("Handshake timeout too short (minimum: 100ms)".to_string());
        } else if self.handshake_timeout.as_secs() > 120 {
            errors.push("Handshake timeout too long (maximum: 120s)".to_string());
        }

        if self.linger.as_secs() > 30 {
            errors.push("Linger too long (maximum: 30s)".to_string());
        }

        if self.shutdown_timeout.as_secs() < 1 {
            errors.push("Shutdown timeout too short (minimum: 1s)".to_string());
        } else if self.shutdown_timeout.as_secs() > 60 {
            errors.push("Shutdown timeout too long (maximum: 60s)".to_string());
        }

        errors
    }
}

/// TLS credentials and protocol floor
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TlsConfig {
    /// PEM certificate chain
    pub cert_path: Option<String>,

    /// PEM private key
    pub key_path: Option<String>,

    /// Generate a throwaway self-signed certificate when no paths are set
    pub self_signed: bool,

    /// Lowest accepted protocol: "1.2" or "1.3"
    pub min_version: String,

    /// CA bundle for optional client certificates; unset disables them
    pub client_ca_path: Option<String>,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            cert_path: None,
            key_path: None,
            self_signed: false,
            min_version: String::from("1.2"),
            client_ca_path: None,
        }
    }
}

impl TlsConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        match (&self.cert_path, &self.key_path) {
            (Some(_), None) | (None, Some(_)) => {
                errors.push("cert_path and key_path must be set together".to_string());
            }
            (None, None) if !self.self_signed => {
                errors.push(
                    "No TLS certificate configured (set cert_path/key_path or self_signed)"
                        .to_string(),
                );
            }
            _ => {}
        }

        for path in [&self.cert_path, &self.key_path, &self.client_ca_path]
            .into_iter()
            .flatten()
        {
            if !Path::new(path).exists() {
                errors.push(format!("TLS file does not exist: {path}"));
            }
        }

        if !matches!(self.min_version.as_str(), "1.2" | "1.3") {
            errors.push(format!(
                "Unsupported TLS minimum version: '{}' (valid: 1.2, 1.3)",
                self.min_version
            ));
        }

        errors
    }
}

/// Framing limits
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Maximum allowed frame payload in bytes
    pub max_payload_size: usize,

    /// Unsent reply bytes a session may accumulate before it is closed
    pub max_queued_bytes: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_payload_size: MAX_PAYLOAD_SIZE,
            max_queued_bytes: MAX_QUEUED_BYTES,
        }
    }
}

impl TransportConfig {
    /// Validate transport configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.max_payload_size < 1024 {
            errors.push("Max payload size too small (minimum: 1 KB)".to_string());
        } else if self.max_payload_size > 16 * 1024 * 1024 {
            errors.push(format!(
                "Max payload size too large: {} bytes (maximum: 16 MB)",
                self.max_payload_size
            ));
        }
        let largest_frame = LENGTH_PREFIX_LEN + HEADER_LEN + self.max_payload_size;
        if self.max_queued_bytes < largest_frame {
            errors.push(format!(
                "Max queued bytes must hold at least one full frame ({largest_frame} bytes)"
            ));
        }
        errors
    }
}

/// Logon worker pool settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Deferred store lookups allowed in flight at once; further requests
    /// are answered `ServerBusy`
    pub max_in_flight: usize,

    /// Hex secret seeding decoy challenges for unknown identities. Random per
    /// process when unset.
    pub decoy_secret: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 64,
            decoy_secret: None,
        }
    }
}

impl AuthConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.max_in_flight == 0 {
            errors.push("Auth worker pool size must be greater than 0".to_string());
        }
        if let Some(secret) = &self.decoy_secret {
            if hex::decode(secret.trim()).map_or(true, |bytes| bytes.len() < 16) {
                errors.push("decoy_secret must be at least 16 bytes of hex".to_string());
            }
        }
        errors
    }

    /// Decoded decoy secret, if configured and valid
    pub fn decoy_secret_bytes(&self) -> Option<Vec<u8>> {
        self.decoy_secret
            .as_deref()
            .and_then(|secret| hex::decode(secret.trim()).ok())
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Application name for logs
    pub app_name: String,

    /// Log level
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to log to console
    pub log_to_console: bool,

    /// Whether to log to file
    pub log_to_file: bool,

    /// Path to log file (if log_to_file is true)
    pub log_file_path: Option<String>,

    /// Whether to use JSON formatting for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("logon-gateway"),
            log_level: Level::INFO,
            log_to_console: true,
            log_to_file: false,
            log_file_path: None,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    /// Validate logging configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.app_name.is_empty() {
            errors.push("Application name cannot be empty".to_string());
        } else if self.app_name.len() > 64 {
            errors.push(format!(
                "Application name too long: {} characters (maximum: 64)",
                self.app_name.len()
            ));
        }

        if self.log_to_file {
            if let Some(ref path) = self.log_file_path {
                if let Some(parent) = Path::new(path).parent() {
                    if !parent.as_os_str().is_empty() && !parent.exists() {
                        errors.push(format!(
                            "Log file directory does not exist: {}",
                            parent.display()
                        ));
                    }
                }
            } else {
                errors.push("log_file_path must be specified when log_to_file is true".to_string());
            }
        }

        if !self.log_to_console && !self.log_to_file {
            errors
                .push("At least one logging output (console or file) must be enabled".to_string());
        }

        errors
    }
}

/// Helper module for Duration serialization/deserialization
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = duration.as_millis() as u64;
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Helper module for tracing::Level serialization/deserialization
mod log_level_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;
    use tracing::Level;

    pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let level_str = match *level {
            Level::TRACE => "trace",
            Level::DEBUG => "debug",
            Level::INFO => "info",
            Level::WARN => "warn",
            Level::ERROR => "error",
        };
        level_str.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level_str = String::deserialize(deserializer)?;
        Level::from_str(&level_str)
            .map_err(|_| serde::de::Error::custom(format!("Invalid log level: {level_str}")))
    }
}
