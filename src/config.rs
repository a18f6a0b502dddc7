//! Configuration management for sns-toolbox.
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. Command-line arguments
//! 2. Environment variables
//! 3. Selected profile
//! 4. Configuration file (JSON)
//! 5. Default values
//!
//! Passwords are never read from or written to the configuration file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cli::Args;
use crate::export::Decryptor;
use crate::session::{SessionOptions, DEFAULT_USERS_QUERY};
use crate::transport::{BridgeConnector, ConnectParams, VerifyOptions};

/// Environment variable holding the session password.
pub const PASSWORD_ENV: &str = "SNS_TOOLBOX_PASSWORD";

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Appliance connection settings.
    pub connection: ConnectionSection,
    /// Monitor settings.
    pub monitor: MonitorSection,
    /// Backup decryption settings.
    pub decrypt: DecryptSection,
    /// Vendor client settings.
    pub bridge: BridgeSection,
    /// Logging configuration.
    pub logging: LoggingSection,
    /// Saved connection targets by name.
    pub profiles: BTreeMap<String, Profile>,
}

/// Connection configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSection {
    /// Appliance address.
    pub host: String,
    /// Appliance port.
    pub port: u16,
    /// Administrator account.
    pub user: String,
    /// Check the certificate host name.
    pub verify_host: bool,
    /// Check the certificate chain.
    pub verify_peer: bool,
    /// Authentication timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Per-command timeout in seconds.
    pub command_timeout_secs: u64,
    /// Command listing logged-in administrators.
    pub users_query: String,
}

impl Default for ConnectionSection {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 443,
            user: "admin".to_string(),
            verify_host: false,
            verify_peer: false,
            connect_timeout_secs: 30,
            command_timeout_secs: 30,
            users_query: DEFAULT_USERS_QUERY.to_string(),
        }
    }
}

/// Monitor configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSection {
    /// Seconds between two ticks.
    pub interval_secs: u64,
}

impl Default for MonitorSection {
    fn default() -> Self {
        Self { interval_secs: 2 }
    }
}

/// Decrypt configuration section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DecryptSection {
    /// Directory holding the decrypt tool; defaults to the executable's.
    pub tool_dir: Option<PathBuf>,
}

/// Vendor client configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeSection {
    /// Client program, looked up in `PATH` when relative.
    pub program: PathBuf,
    /// Extra arguments appended after the connection flags.
    pub args: Vec<String>,
}

impl Default for BridgeSection {
    fn default() -> Self {
        Self {
            program: PathBuf::from("sns-bridge"),
            args: Vec::new(),
        }
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level (error, warn, info, debug, trace).
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// A saved connection target. Unset fields keep the connection section's value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Profile {
    pub host: String,
    pub port: Option<u16>,
    pub user: Option<String>,
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        serde_json::from_str(&content).map_err(ConfigError::Json)
    }

    /// Copy a named profile over the connection section.
    pub fn apply_profile(&mut self, name: &str) -> Result<(), ConfigError> {
        let profile = self
            .profiles
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownProfile(name.to_string()))?;

        self.connection.host = profile.host;
        if let Some(port) = profile.port {
            self.connection.port = port;
        }
        if let Some(user) = profile.user {
            self.connection.user = user;
        }
        Ok(())
    }

    /// Apply environment variable overrides.
    pub fn apply_env(&mut self) {
        if let Ok(host) = std::env::var("SNS_TOOLBOX_HOST") {
            self.connection.host = host;
        }

        if let Ok(port) = std::env::var("SNS_TOOLBOX_PORT") {
            if let Ok(port) = port.parse() {
                self.connection.port = port;
            }
        }

        if let Ok(user) = std::env::var("SNS_TOOLBOX_USER") {
            if !user.is_empty() {
                self.connection.user = user;
            }
        }

        if let Ok(level) = std::env::var("SNS_TOOLBOX_LOG_LEVEL") {
            self.logging.level = level;
        } else if let Ok(level) = std::env::var("RUST_LOG") {
            self.logging.level = level;
        }
    }

    /// Apply CLI argument overrides.
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(ref host) = args.host {
            self.connection.host = host.clone();
        }
        if let Some(port) = args.port {
            self.connection.port = port;
        }
        if let Some(ref user) = args.user {
            self.connection.user = user.clone();
        }
        if let Some(interval) = args.interval {
            self.monitor.interval_secs = interval;
        }
        if let Some(ref level) = args.log_level {
            self.logging.level = level.clone();
        }
    }

    /// Load configuration with full priority chain.
    ///
    /// Priority: CLI args > env vars > profile > config file > defaults
    pub fn load(args: &Args) -> Result<Self, ConfigError> {
        let mut config = match args.config {
            Some(ref path) => Config::from_file(path)?,
            None => Config::default(),
        };

        if let Some(ref profile) = args.profile {
            config.apply_profile(profile)?;
        }

        config.apply_env();
        config.apply_args(args);

        Ok(config)
    }

    /// Session tunables.
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            connect_timeout: Duration::from_secs(self.connection.connect_timeout_secs),
            command_timeout: Duration::from_secs(self.connection.command_timeout_secs),
            users_query: self.connection.users_query.clone(),
        }
    }

    /// Connection parameters for the configured appliance.
    pub fn connect_params(&self, password: &str) -> Result<ConnectParams, ConfigError> {
        if self.connection.host.trim().is_empty() {
            return Err(ConfigError::MissingHost);
        }
        Ok(ConnectParams::new(
            self.connection.host.trim(),
            self.connection.port,
            self.connection.user.as_str(),
            password,
        )
        .with_verify(VerifyOptions {
            verify_host: self.connection.verify_host,
            verify_peer: self.connection.verify_peer,
        }))
    }

    /// Vendor client connector.
    pub fn connector(&self) -> BridgeConnector {
        BridgeConnector::new(&self.bridge.program).with_args(self.bridge.args.iter().cloned())
    }

    /// Decryptor looking in the configured tool directory.
    pub fn decryptor(&self) -> Result<Decryptor, ConfigError> {
        match self.decrypt.tool_dir {
            Some(ref dir) => Ok(Decryptor::new(dir)),
            None => Decryptor::beside_executable().map_err(ConfigError::Io),
        }
    }

    /// Monitor interval.
    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor.interval_secs)
    }

    /// Get the log level filter string.
    pub fn log_filter(&self) -> &str {
        &self.logging.level
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file.
    Io(std::io::Error),
    /// JSON parsing error.
    Json(serde_json::Error),
    /// Profile name not present in the file.
    UnknownProfile(String),
    /// No appliance address configured.
    MissingHost,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "failed to read config file: {}", e),
            Self::Json(e) => write!(f, "failed to parse config file: {}", e),
            Self::UnknownProfile(name) => write!(f, "unknown profile: {}", name),
            Self::MissingHost => write!(f, "no appliance host configured"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.connection.host.is_empty());
        assert_eq!(config.connection.port, 443);
        assert_eq!(config.connection.user, "admin");
        assert_eq!(config.monitor.interval_secs, 2);
        assert!(config.profiles.is_empty());
    }

    #[test]
    fn test_config_from_json() {
        let json = r#"{
            "connection": {
                "host": "10.0.0.254",
                "user": "ops",
                "verify_peer": true
            },
            "profiles": {
                "paris": { "host": "fw-paris.example.net", "port": 8443 }
            }
        }"#;

        let mut file = NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.connection.host, "10.0.0.254");
        assert_eq!(config.connection.port, 443); // Default
        assert_eq!(config.connection.user, "ops");
        assert!(config.connection.verify_peer);
        assert_eq!(config.profiles["paris"].port, Some(8443));
    }

    #[test]
    fn test_apply_profile() {
        let mut config = Config::default();
        config.profiles.insert(
            "lyon".to_string(),
            Profile {
                host: "fw-lyon".to_string(),
                port: None,
                user: Some("audit".to_string()),
            },
        );

        config.apply_profile("lyon").unwrap();
        assert_eq!(config.connection.host, "fw-lyon");
        assert_eq!(config.connection.port, 443);
        assert_eq!(config.connection.user, "audit");
    }

    #[test]
    fn test_unknown_profile() {
        let mut config = Config::default();
        let err = config.apply_profile("nowhere").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownProfile(_)));
    }

    #[test]
    fn test_apply_args() {
        let mut config = Config::default();
        let args = Args {
            host: Some("192.168.1.1".to_string()),
            port: Some(10443),
            interval: Some(7),
            log_level: Some("debug".to_string()),
            ..Args::default()
        };

        config.apply_args(&args);

        assert_eq!(config.connection.host, "192.168.1.1");
        assert_eq!(config.connection.port, 10443);
        assert_eq!(config.connection.user, "admin");
        assert_eq!(config.monitor_interval(), Duration::from_secs(7));
        assert_eq!(config.log_filter(), "debug");
    }

    #[test]
    fn test_connect_params_requires_host() {
        let config = Config::default();
        assert!(matches!(
            config.connect_params("pw"),
            Err(ConfigError::MissingHost)
        ));
    }

    #[test]
    fn test_connect_params() {
        let mut config = Config::default();
        config.connection.host = "10.1.1.1".to_string();
        config.connection.verify_host = true;

        let params = config.connect_params("secret").unwrap();
        assert_eq!(params.endpoint(), "10.1.1.1:443");
        assert!(params.verify.verify_host);
        assert!(!params.verify.verify_peer);
        assert_eq!(params.password(), "secret");
    }

    #[test]
    fn test_session_options() {
        let mut config = Config::default();
        config.connection.command_timeout_secs = 5;
        let options = config.session_options();
        assert_eq!(options.command_timeout, Duration::from_secs(5));
        assert_eq!(options.users_query, DEFAULT_USERS_QUERY);
    }

    #[test]
    fn test_decryptor_tool_dir() {
        let mut config = Config::default();
        config.decrypt.tool_dir = Some(PathBuf::from("/opt/sns"));
        let decryptor = config.decryptor().unwrap();
        assert!(decryptor.tool_path().starts_with("/opt/sns"));
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        assert!(json.contains("\"connection\""));
        assert!(json.contains("\"interval_secs\""));
        assert!(!json.contains("password"));
    }
}
