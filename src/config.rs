//! Command line arguments and TOML settings
//!
//! Settings come from the config file, then secrets and ids from the
//! environment, then the command line log level.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::Deserialize;

use crate::types::*;

#[derive(Parser, Debug)]
#[command(
    name = "bank-sync",
    version,
    about = "Mirror bank transactions into a budget, exactly once"
)]
pub struct CliArgs {
    /// Path to config file
    #[arg(short, long, default_value = "bank-sync.toml")]
    pub config: String,

    /// Log level (overrides config file)
    #[arg(short, long)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Mirror new transactions and publish the balance
    Update,
    /// Store a full export of all transactions
    Backup,
    /// Print the last published balance
    Balance,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub source: SourceConfig,

    #[serde(default)]
    pub destination: DestinationConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub http: HttpConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    #[serde(default = "default_source_url")]
    pub base_url: String,

    /// Bearer token; usually supplied through `N26_TOKEN`
    #[serde(default)]
    pub access_token: String,

    /// Maximum number of transactions fetched per run
    #[serde(default = "default_limit")]
    pub limit: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DestinationConfig {
    #[serde(default = "default_destination_url")]
    pub base_url: String,

    /// Personal access token; usually supplied through `YNAB_KEY`
    #[serde(default)]
    pub access_token: String,

    #[serde(default)]
    pub budget_id: String,

    #[serde(default)]
    pub account_id: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_bindings_path")]
    pub bindings_path: PathBuf,

    /// Directory holding the published balance
    #[serde(default = "default_info_dir")]
    pub info_dir: PathBuf,

    #[serde(default = "default_backups_dir")]
    pub backups_dir: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub json: bool,
}

fn default_source_url() -> String {
    "https://api.tech26.de".to_string()
}

fn default_limit() -> usize {
    10_000
}

fn default_destination_url() -> String {
    "https://api.youneedabudget.com/v1".to_string()
}

fn default_bindings_path() -> PathBuf {
    PathBuf::from("data/bindings.json")
}

fn default_info_dir() -> PathBuf {
    PathBuf::from("data/info")
}

fn default_backups_dir() -> PathBuf {
    PathBuf::from("data/backups")
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig {
            base_url: default_source_url(),
            access_token: String::new(),
            limit: default_limit(),
        }
    }
}

impl Default for DestinationConfig {
    fn default() -> Self {
        DestinationConfig {
            base_url: default_destination_url(),
            access_token: String::new(),
            budget_id: String::new(),
            account_id: String::new(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            bindings_path: default_bindings_path(),
            info_dir: default_info_dir(),
            backups_dir: default_backups_dir(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        HttpConfig {
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Config {
    /// Load the config file (defaults if it does not exist), then apply
    /// environment and CLI overrides.
    pub fn load(cli: &CliArgs) -> SyncResult<Self> {
        let mut config = match std::fs::read_to_string(&cli.config) {
            Ok(contents) => Self::parse(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Config::default(),
            Err(e) => return Err(SyncError::Config(format!("{}: {e}", cli.config))),
        };

        config.apply_env(|key| std::env::var(key).ok());

        if let Some(ref level) = cli.log_level {
            config.logging.level = level.clone();
        }

        Ok(config)
    }

    pub fn parse(contents: &str) -> SyncResult<Self> {
        toml::from_str(contents).map_err(|e| SyncError::Config(e.to_string()))
    }

    /// Secrets and account ids may come from the environment instead of the file
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let overrides: [(&str, &mut String); 4] = [
            ("N26_TOKEN", &mut self.source.access_token),
            ("YNAB_KEY", &mut self.destination.access_token),
            ("YNAB_BUDGET_ID", &mut self.destination.budget_id),
            ("YNAB_ACCOUNT_ID", &mut self.destination.account_id),
        ];
        for (key, field) in overrides {
            if let Some(value) = lookup(key).filter(|v| !v.is_empty()) {
                *field = value;
            }
        }
    }

    /// Check the settings needed to talk to both services
    pub fn validate_remote(&self) -> SyncResult<()> {
        let required = [
            ("source.access_token", &self.source.access_token),
            ("destination.access_token", &self.destination.access_token),
            ("destination.budget_id", &self.destination.budget_id),
            ("destination.account_id", &self.destination.account_id),
        ];
        let missing: Vec<&str> = required
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(name, _)| *name)
            .collect();
        if !missing.is_empty() {
            return Err(SyncError::Config(format!(
                "missing settings: {}",
                missing.join(", ")
            )));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.http.timeout_secs)
    }
}
