//! Configuration loading and constants.
//!
//! Loads application configuration from TOML files and defines constants for
//! listener ports, shutdown timing, ACME defaults, logging and default paths.
//! `AppConfig` is the root configuration struct containing all settings.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use const_format::formatcp;
use serde::Deserialize;

use crate::acme::{CertificateManager, TlsSettings};

// =============================================================================
// Listener Constants
// =============================================================================

/// Standard HTTPS port
pub const HTTPS_PORT: u16 = 443;

/// Standard HTTP port, used by the redirect listener
pub const HTTP_PORT: u16 = 80;

/// Address the listeners bind to unless configured otherwise
pub const DEFAULT_BIND_HOST: &str = "0.0.0.0";

/// Default secure listener address
pub const DEFAULT_HTTPS_ADDR: &str = formatcp!("{}:{}", DEFAULT_BIND_HOST, HTTPS_PORT);

/// Default redirect listener address
pub const DEFAULT_HTTP_ADDR: &str = formatcp!("{}:{}", DEFAULT_BIND_HOST, HTTP_PORT);

// =============================================================================
// Shutdown Constants
// =============================================================================

/// Grace period for in-flight connections when both listeners stop (seconds)
pub const DEFAULT_EXIT_WAIT_SECS: u64 = 5;

/// Grace period as a Duration
pub const DEFAULT_EXIT_WAIT: Duration = Duration::from_secs(DEFAULT_EXIT_WAIT_SECS);

/// Extra time allowed past the grace period before a shutdown is reported as stuck
pub const SHUTDOWN_SLACK: Duration = Duration::from_secs(1);

// =============================================================================
// ACME Constants
// =============================================================================

/// Subdirectory of the user cache directory holding ACME state
pub const CACHE_NAMESPACE: &str = "autotls";

/// Consecutive failed ACME events after which a host's order is dropped.
/// The next handshake for that host starts a fresh order.
pub const MAX_ORDER_FAILURES: usize = 3;

// =============================================================================
// Default Paths and Strings
// =============================================================================

/// Default configuration file path
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Default log filter when RUST_LOG is not set
pub const DEFAULT_LOG_FILTER: &str = "autotls=debug,tower_http=debug";

/// Default log format (text or json)
pub const DEFAULT_LOG_FORMAT: &str = "text";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Listener configuration
    #[serde(default)]
    pub http: HttpConfig,
    /// Certificate provisioning configuration
    #[serde(default)]
    pub tls: TlsConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Listener configuration for the secure and redirect servers
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "HttpConfig::default_host")]
    pub host: String,
    /// Secure listener port
    #[serde(default = "HttpConfig::default_https_port")]
    pub https_port: u16,
    /// Redirect listener port
    #[serde(default = "HttpConfig::default_http_port")]
    pub http_port: u16,
    /// Graceful shutdown window for both listeners
    #[serde(default = "HttpConfig::default_exit_wait")]
    pub exit_wait_seconds: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: Self::default_host(),
            https_port: Self::default_https_port(),
            http_port: Self::default_http_port(),
            exit_wait_seconds: Self::default_exit_wait(),
        }
    }
}

impl HttpConfig {
    fn default_host() -> String {
        DEFAULT_BIND_HOST.to_string()
    }
    fn default_https_port() -> u16 {
        HTTPS_PORT
    }
    fn default_http_port() -> u16 {
        HTTP_PORT
    }
    fn default_exit_wait() -> u64 {
        DEFAULT_EXIT_WAIT_SECS
    }

    pub fn https_addr(&self) -> Result<SocketAddr, ConfigError> {
        Self::addr(&self.host, self.https_port)
    }

    pub fn http_addr(&self) -> Result<SocketAddr, ConfigError> {
        Self::addr(&self.host, self.http_port)
    }

    pub fn exit_wait(&self) -> Duration {
        Duration::from_secs(self.exit_wait_seconds)
    }

    fn addr(host: &str, port: u16) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", host, port)
            .parse()
            .map_err(|e| ConfigError::Validation(format!("Invalid http.host or port: {}", e)))
    }
}

/// Certificate provisioning configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TlsConfig {
    /// Domains certificates may be issued for; empty accepts any SNI name
    #[serde(default)]
    pub domains: Vec<String>,
    /// ACME account contacts (email addresses)
    #[serde(default)]
    pub contacts: Vec<String>,
    /// Use the Let's Encrypt production directory instead of staging
    #[serde(default)]
    pub production: bool,
    /// Custom ACME directory URL, overrides `production`
    pub directory_url: Option<String>,
    /// Certificate cache directory (default: user cache dir + "autotls")
    pub cache_dir: Option<PathBuf>,
    /// Protocol version and cipher overrides
    #[serde(flatten)]
    pub settings: TlsSettings,
}

impl TlsConfig {
    /// Build the certificate manager described by this section.
    pub fn manager(&self) -> CertificateManager {
        let mut builder = CertificateManager::builder()
            .domains(&self.domains)
            .production(self.production);
        for contact in &self.contacts {
            builder = builder.contact(contact);
        }
        if let Some(url) = &self.directory_url {
            builder = builder.directory_url(url.clone());
        }
        if let Some(dir) = &self.cache_dir {
            builder = builder.cache_dir(dir.clone());
        }
        builder.build()
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log format: "text" (human-readable, default) or "json" (structured)
    #[serde(default = "LoggingConfig::default_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: DEFAULT_LOG_FORMAT.to_string(),
        }
    }
}

impl LoggingConfig {
    fn default_format() -> String {
        DEFAULT_LOG_FORMAT.to_string()
    }
}

impl AppConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.http.https_port == self.http.http_port {
            return Err(ConfigError::Validation(format!(
                "http.https_port and http.http_port must differ (both {})",
                self.http.https_port
            )));
        }

        if matches!(&self.tls.settings.cipher_suites, Some(suites) if suites.is_empty()) {
            return Err(ConfigError::Validation(
                "tls.cipher_suites must not be empty when set".to_string(),
            ));
        }

        if !matches!(self.logging.format.as_str(), "text" | "json") {
            return Err(ConfigError::Validation(format!(
                "logging.format must be \"text\" or \"json\", got {:?}",
                self.logging.format
            )));
        }

        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Configuration error: {0}")]
    Validation(String),
}
