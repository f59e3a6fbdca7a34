//! Configuration module for the talkbox server.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;

/// Command-line arguments for the application server
#[derive(Parser, Debug)]
#[command(name = "talkbox")]
#[command(version = "0.1.0")]
#[command(about = "A chat and forum application server", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to bind to (e.g., 127.0.0.1:8080)
    #[arg(short = 'l', long)]
    pub listen: Option<String>,

    /// Directory for uploaded files
    #[arg(short = 'u', long)]
    pub upload_dir: Option<PathBuf>,

    /// Maximum number of concurrent connections
    #[arg(short = 'c', long)]
    pub max_connections: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub files: FilesConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Maximum number of concurrent connections
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            max_connections: default_max_connections(),
        }
    }
}

/// File storage configuration
#[derive(Debug, Deserialize)]
pub struct FilesConfig {
    /// Directory for uploaded files
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            upload_dir: default_upload_dir(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_listen() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_max_connections() -> usize {
    10000
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub listen: String,
    pub upload_dir: PathBuf,
    pub max_connections: usize,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        let cli = CliArgs::parse();
        Self::merge(cli)
    }

    fn merge(cli: CliArgs) -> Result<Self, ConfigError> {
        // Load TOML config if specified
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        // Merge CLI args with TOML config (CLI takes precedence)
        Ok(Config {
            listen: cli.listen.unwrap_or(toml_config.server.listen),
            upload_dir: cli.upload_dir.unwrap_or(toml_config.files.upload_dir),
            max_connections: cli
                .max_connections
                .unwrap_or(toml_config.server.max_connections),
            log_level: if cli.log_level != "info" {
                cli.log_level
            } else {
                toml_config.logging.level
            },
        })
    }
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    FileRead(PathBuf, std::io::Error),
    TomlParse(PathBuf, toml::de::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::FileRead(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::TomlParse(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TomlConfig::default();
        assert_eq!(config.server.listen, "127.0.0.1:8080");
        assert_eq!(config.server.max_connections, 10000);
        assert_eq!(config.files.upload_dir, PathBuf::from("uploads"));
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_toml_parsing() {
        let toml_str = r#"
            [server]
            listen = "0.0.0.0:9000"
            max_connections = 256

            [files]
            upload_dir = "/var/lib/talkbox/uploads"

            [logging]
            level = "debug"
        "#;

        let config: TomlConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.listen, "0.0.0.0:9000");
        assert_eq!(config.server.max_connections, 256);
        assert_eq!(
            config.files.upload_dir,
            PathBuf::from("/var/lib/talkbox/uploads")
        );
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_cli_overrides_toml_defaults() {
        let cli = CliArgs {
            config: None,
            listen: Some("127.0.0.1:9999".to_string()),
            upload_dir: None,
            max_connections: Some(32),
            log_level: "info".to_string(),
        };
        let config = Config::merge(cli).unwrap();
        assert_eq!(config.listen, "127.0.0.1:9999");
        assert_eq!(config.max_connections, 32);
        assert_eq!(config.upload_dir, PathBuf::from("uploads"));
    }
}
