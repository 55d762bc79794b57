//! Configuration module for the lottery intake server.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;

use crate::lottery::DEFAULT_WINNING_NUMBER;

/// Command-line arguments for the intake server
#[derive(Parser, Debug)]
#[command(name = "lottery-intake")]
#[command(author = "lottery-intake authors")]
#[command(version = "0.1.0")]
#[command(about = "Betting intake server for lottery agencies", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to bind to (e.g., 0.0.0.0:12345)
    #[arg(short = 'l', long)]
    pub listen: Option<String>,

    /// Accept backlog of the listening socket
    #[arg(short = 'b', long)]
    pub backlog: Option<u32>,

    /// Number of runtime worker threads (defaults to number of CPU cores)
    #[arg(short = 'w', long)]
    pub workers: Option<usize>,

    /// Number of agencies that must finish before the draw
    #[arg(short = 'a', long)]
    pub agencies: Option<u32>,

    /// Number that wins the draw
    #[arg(long)]
    pub winning_number: Option<u32>,

    /// CSV file where bets are stored
    #[arg(long)]
    pub bets_file: Option<PathBuf>,

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
    pub lottery: LotteryConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Accept backlog
    #[serde(default = "default_backlog")]
    pub backlog: u32,
    /// Number of worker threads
    pub workers: Option<usize>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            backlog: default_backlog(),
            workers: None,
        }
    }
}

/// Draw-related configuration
#[derive(Debug, Deserialize)]
pub struct LotteryConfig {
    /// Agencies expected to finish before the draw
    #[serde(default = "default_agencies")]
    pub agencies: u32,
    #[serde(default = "default_winning_number")]
    pub winning_number: u32,
}

impl Default for LotteryConfig {
    fn default() -> Self {
        Self {
            agencies: default_agencies(),
            winning_number: default_winning_number(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_bets_file")]
    pub bets_file: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bets_file: default_bets_file(),
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
    "0.0.0.0:12345".to_string()
}

fn default_backlog() -> u32 {
    5
}

fn default_agencies() -> u32 {
    5
}

fn default_winning_number() -> u32 {
    DEFAULT_WINNING_NUMBER
}

fn default_bets_file() -> PathBuf {
    PathBuf::from("bets.csv")
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub listen: String,
    pub backlog: u32,
    pub workers: Option<usize>,
    pub agencies: u32,
    pub winning_number: u32,
    pub bets_file: PathBuf,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        let cli = CliArgs::parse();

        // Load TOML config if specified
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        Self::merge(cli, toml_config)
    }

    /// Merge CLI args over TOML values and validate the result.
    pub fn merge(cli: CliArgs, toml_config: TomlConfig) -> Result<Self, ConfigError> {
        let config = Config {
            listen: cli.listen.unwrap_or(toml_config.server.listen),
            backlog: cli.backlog.unwrap_or(toml_config.server.backlog),
            workers: cli.workers.or(toml_config.server.workers),
            agencies: cli.agencies.unwrap_or(toml_config.lottery.agencies),
            winning_number: cli
                .winning_number
                .unwrap_or(toml_config.lottery.winning_number),
            bets_file: cli.bets_file.unwrap_or(toml_config.storage.bets_file),
            log_level: if cli.log_level != "info" {
                cli.log_level
            } else {
                toml_config.logging.level
            },
        };

        if config.agencies == 0 {
            return Err(ConfigError::Invalid("agencies must be at least 1".into()));
        }
        if config.backlog == 0 {
            return Err(ConfigError::Invalid("backlog must be at least 1".into()));
        }
        if config.workers == Some(0) {
            return Err(ConfigError::Invalid("workers must be at least 1".into()));
        }

        Ok(config)
    }
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    FileRead(PathBuf, std::io::Error),
    TomlParse(PathBuf, toml::de::Error),
    Invalid(String),
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
            ConfigError::Invalid(msg) => write!(f, "Invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}
