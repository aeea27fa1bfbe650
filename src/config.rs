use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::{GridError, Result};
use crate::mix::TxnMix;

/// Prefix of environment variables that override file settings,
/// e.g. `GRIDSAMPLE_DATABASE__UID`
pub const ENV_PREFIX: &str = "GRIDSAMPLE";

pub const MAX_LEN_DSN: usize = 256;
pub const MAX_LEN_UID: usize = 30;
pub const MAX_LEN_PWD: usize = 30;
pub const MIN_REPORT_INTERVAL_SECS: u64 = 10;

/// Main configuration structure for the grid workload generator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Database connection settings
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Workload shape and recovery limits
    #[serde(default)]
    pub workload: WorkloadConfig,

    /// Message and report output
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Database connection configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Connect target in the form host:port[/database]
    #[serde(default = "default_dsn")]
    pub dsn: String,

    /// Database username
    #[serde(default = "default_uid")]
    pub uid: String,

    /// Database password; prompted for when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Name the session reports to the server
    #[serde(default = "default_connection_name")]
    pub connection_name: String,
}

/// Workload configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkloadConfig {
    /// Retry attempts allowed per transaction for transient errors
    #[serde(default = "default_retry_limit")]
    pub retry_limit: u32,

    /// Re-prepare attempts allowed per transaction for failover errors
    #[serde(default = "default_failover_limit")]
    pub failover_limit: u32,

    /// Minimum age of history rows removed by Purge
    #[serde(default = "default_purge_age_secs")]
    pub purge_age_secs: u32,

    /// Smallest call charge
    #[serde(default = "default_charge_min")]
    pub charge_min: f64,

    /// Largest call charge
    #[serde(default = "default_charge_max")]
    pub charge_max: f64,

    /// Amount credited by Topup
    #[serde(default = "default_topup_amount")]
    pub topup_amount: f64,

    /// Commit after read-only transactions
    #[serde(default)]
    pub commit_read_only: bool,

    /// Truncate the history table before the run
    #[serde(default = "default_cleanup")]
    pub cleanup: bool,

    /// Stop after this many successful transactions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_transactions: Option<u64>,

    /// Stop after this many seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<u64>,

    /// Percentage of each workload transaction
    #[serde(default)]
    pub txn_mix: TxnMix,
}

/// Console verbosity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    Silent,
    #[default]
    Normal,
    Verbose,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Console verbosity (silent, normal, verbose)
    #[serde(default)]
    pub verbosity: Verbosity,

    /// Seconds between interval reports
    #[serde(default = "default_report_interval")]
    pub report_interval_secs: u64,

    /// Log file path (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,

    /// Log file that also receives debug traces (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug_file: Option<PathBuf>,
}

/// When the workload stops on its own
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunLimit {
    Unlimited,
    Transactions(u64),
    Duration(Duration),
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            dsn: default_dsn(),
            uid: default_uid(),
            password: None,
            connection_name: default_connection_name(),
        }
    }
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            retry_limit: default_retry_limit(),
            failover_limit: default_failover_limit(),
            purge_age_secs: default_purge_age_secs(),
            charge_min: default_charge_min(),
            charge_max: default_charge_max(),
            topup_amount: default_topup_amount(),
            commit_read_only: false,
            cleanup: default_cleanup(),
            num_transactions: None,
            duration_secs: None,
            txn_mix: TxnMix::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            verbosity: Verbosity::default(),
            report_interval_secs: default_report_interval(),
            log_file: None,
            debug_file: None,
        }
    }
}

// Default value functions
fn default_dsn() -> String { "localhost:4000/sampledb".to_string() }
fn default_uid() -> String { "appuser".to_string() }
fn default_connection_name() -> String { "GridSample".to_string() }
fn default_retry_limit() -> u32 { 30 }
fn default_failover_limit() -> u32 { 100 }
fn default_purge_age_secs() -> u32 { 30 }
fn default_charge_min() -> f64 { 0.10 }
fn default_charge_max() -> f64 { 1.00 }
fn default_topup_amount() -> f64 { 10.0 }
fn default_cleanup() -> bool { true }
fn default_report_interval() -> u64 { 30 }

impl WorkloadConfig {
    pub fn run_limit(&self) -> RunLimit {
        match (self.num_transactions, self.duration_secs) {
            (Some(n), _) => RunLimit::Transactions(n),
            (None, Some(secs)) => RunLimit::Duration(Duration::from_secs(secs)),
            (None, None) => RunLimit::Unlimited,
        }
    }
}

impl LoggingConfig {
    /// Path of whichever log file is configured
    pub fn file(&self) -> Option<&Path> {
        self.debug_file.as_deref().or(self.log_file.as_deref())
    }

    /// Interval reports are produced when they are displayed or logged
    pub fn reports_enabled(&self) -> bool {
        self.verbosity == Verbosity::Verbose || self.file().is_some()
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_interval_secs)
    }
}

fn file_format(path: &Path) -> Result<FileFormat> {
    let extension = path.extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("json");
    match extension {
        "json" => Ok(FileFormat::Json),
        "toml" => Ok(FileFormat::Toml),
        _ => Err(GridError::Configuration(format!("Unsupported config file format: {}", extension))),
    }
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

impl AppConfig {
    /// Load configuration from a JSON or TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let config = Config::builder()
            .add_source(File::from(path).format(file_format(path)?))
            .build()?;
        Ok(config.try_deserialize()?)
    }

    /// Load configuration from a file, then apply `GRIDSAMPLE_*` overrides
    pub fn from_file_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let config = Config::builder()
            .add_source(File::from(path).format(file_format(path)?))
            .add_source(environment())
            .build()?;
        Ok(config.try_deserialize()?)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Result<Self> {
        let config = Config::builder().add_source(environment()).build()?;
        Ok(config.try_deserialize()?)
    }

    /// Save configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = match file_format(path)? {
            FileFormat::Toml => toml::to_string_pretty(self)
                .map_err(|e| GridError::Configuration(format!("Failed to serialize config: {}", e)))?,
            _ => serde_json::to_string_pretty(self)
                .map_err(|e| GridError::Configuration(format!("Failed to serialize config: {}", e)))?,
        };

        std::fs::write(path, content)
            .map_err(|e| GridError::Configuration(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let db = &self.database;
        if db.dsn.is_empty() || db.dsn.len() > MAX_LEN_DSN {
            return Err(GridError::Parameter(format!(
                "DSN must be between 1 and {MAX_LEN_DSN} characters"
            )));
        }
        if db.uid.is_empty() || db.uid.len() > MAX_LEN_UID {
            return Err(GridError::Parameter(format!(
                "username must be between 1 and {MAX_LEN_UID} characters"
            )));
        }
        if let Some(password) = &db.password
            && password.len() > MAX_LEN_PWD
        {
            return Err(GridError::Parameter(format!(
                "password must be at most {MAX_LEN_PWD} characters"
            )));
        }

        let w = &self.workload;
        w.txn_mix.validate()?;
        if w.retry_limit == 0 || w.failover_limit == 0 {
            return Err(GridError::Parameter("retry and failover limits must be greater than 0".to_string()));
        }
        if w.num_transactions.is_some() && w.duration_secs.is_some() {
            return Err(GridError::Parameter("a transaction limit and a duration are mutually exclusive".to_string()));
        }
        if w.num_transactions == Some(0) {
            return Err(GridError::Parameter("transaction limit must be greater than 0".to_string()));
        }
        if w.duration_secs == Some(0) {
            return Err(GridError::Parameter("duration must be greater than 0".to_string()));
        }
        if !(w.charge_min > 0.0 && w.charge_max >= w.charge_min) {
            return Err(GridError::Parameter(format!(
                "charge range {}..{} is invalid",
                w.charge_min, w.charge_max
            )));
        }

        if w.topup_amount.is_nan() || w.topup_amount <= 0.0 {
            return Err(GridError::Parameter(format!(
                "topup amount {} must be greater than 0",
                w.topup_amount
            )));
        }

        let l = &self.logging;
        if l.report_interval_secs < MIN_REPORT_INTERVAL_SECS {
            return Err(GridError::Parameter(format!(
                "report interval must be at least {MIN_REPORT_INTERVAL_SECS} seconds"
            )));
        }
        if l.log_file.is_some() && l.debug_file.is_some() {
            return Err(GridError::Parameter("log and debug files are mutually exclusive".to_string()));
        }
        Ok(())
    }
}

/// Configuration builder for programmatic configuration
#[derive(Default)]
pub struct ConfigBuilder {
    config: AppConfig,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dsn(mut self, dsn: impl Into<String>) -> Self {
        self.config.database.dsn = dsn.into();
        self
    }

    pub fn uid(mut self, uid: impl Into<String>) -> Self {
        self.config.database.uid = uid.into();
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.config.database.password = Some(password.into());
        self
    }

    pub fn txn_mix(mut self, mix: TxnMix) -> Self {
        self.config.workload.txn_mix = mix;
        self
    }

    pub fn num_transactions(mut self, count: u64) -> Self {
        self.config.workload.num_transactions = Some(count);
        self
    }

    pub fn duration_secs(mut self, secs: u64) -> Self {
        self.config.workload.duration_secs = Some(secs);
        self
    }

    pub fn cleanup(mut self, cleanup: bool) -> Self {
        self.config.workload.cleanup = cleanup;
        self
    }

    pub fn commit_read_only(mut self, commit: bool) -> Self {
        self.config.workload.commit_read_only = commit;
        self
    }

    pub fn verbosity(mut self, verbosity: Verbosity) -> Self {
        self.config.logging.verbosity = verbosity;
        self
    }

    pub fn report_interval_secs(mut self, secs: u64) -> Self {
        self.config.logging.report_interval_secs = secs;
        self
    }

    pub fn log_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.logging.log_file = Some(path.into());
        self
    }

    pub fn debug_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.logging.debug_file = Some(path.into());
        self
    }

    pub fn build(self) -> AppConfig {
        self.config
    }
}
