//! # Command Line
//!
//! Options are spelled with a single dash (`-dsn`, `-txnmix`, ...). They are
//! rewritten to the double-dash form before clap sees them, so both
//! spellings are accepted.

use std::ffi::OsString;
use std::path::PathBuf;

use clap::{CommandFactory, Parser};
use rpassword::prompt_password;

use crate::config::{AppConfig, MAX_LEN_PWD, Verbosity};
use crate::errors::{GridError, Result};
use crate::logging::{LogConfig, LogGuard, timestamp};
use crate::mix::TxnMix;

const EXIT_STATUS_HELP: &str = "\
The '-numtxn' and '-duration' options are mutually exclusive. If neither is
specified the program runs until it is interrupted (Ctrl-C, SIGTERM ...).

Exit status:
    0  - Success
    1  - Parameter error
    2  - Help requested
   >2  - Fatal error encountered";

#[derive(Parser, Debug, Clone, Default)]
#[command(name = "gridsample")]
#[command(about = "Synthetic OLTP workload for a distributed SQL database")]
#[command(disable_help_flag = true, after_long_help = EXIT_STATUS_HELP)]
pub struct GridArgs {
    /// Display this usage information and exit; other options are ignored
    #[arg(long)]
    pub help: bool,

    /// Connect to this target (host:port/database)
    #[arg(long, value_name = "DSNAME", allow_hyphen_values = true)]
    pub dsn: Option<String>,

    /// Connect as this user
    #[arg(long, value_name = "USERNAME", allow_hyphen_values = true)]
    pub uid: Option<String>,

    /// Connect using this password; prompted for when omitted
    #[arg(long, value_name = "PASSWORD", allow_hyphen_values = true)]
    pub pwd: Option<String>,

    /// Transaction mix as percentages of Authorize, Charge, Topup, Query and
    /// Purge; integers 0..=100 summing to 100 (default 70,15,5,5,5)
    #[arg(long, value_name = "A,C,T,Q,P", allow_hyphen_values = true)]
    pub txnmix: Option<String>,

    /// Do not truncate the transaction history before the workload starts
    #[arg(long)]
    pub nocleanup: bool,

    /// Stop after this many successful transactions
    #[arg(long, value_name = "T", conflicts_with = "duration")]
    pub numtxn: Option<u64>,

    /// Stop after approximately this many seconds
    #[arg(long, value_name = "S")]
    pub duration: Option<u64>,

    /// Only report errors
    #[arg(long, conflicts_with = "verbose")]
    pub silent: bool,

    /// Report execution statistics every N seconds (default 30, at least 10)
    #[arg(long, value_name = "N", num_args = 0..=1)]
    pub verbose: Option<Option<u64>>,

    /// Write an execution log to this file
    #[arg(long, value_name = "LOGPATH", allow_hyphen_values = true, conflicts_with = "debug")]
    pub log: Option<PathBuf>,

    /// Write a detailed debug log, including driver calls, to this file
    #[arg(long, value_name = "LOGPATH", allow_hyphen_values = true)]
    pub debug: Option<PathBuf>,

    /// Commit read-only transactions
    #[arg(long)]
    pub commitrotxn: bool,

    /// Load settings from a JSON or TOML file before applying other options
    #[arg(long, value_name = "PATH", allow_hyphen_values = true)]
    pub config: Option<PathBuf>,
}

/// Options whose next argument is always their value, whatever it looks like
const VALUE_OPTIONS: &[&str] = &["dsn", "uid", "pwd", "txnmix", "numtxn", "duration", "log", "debug", "config"];

/// Name of an option spelled `-name` or `--name`
fn option_name(arg: &OsString) -> Option<String> {
    let name = arg.to_str()?.strip_prefix('-')?;
    let name = name.strip_prefix('-').unwrap_or(name);
    (name.len() > 1 && name.chars().all(|c| c.is_ascii_alphabetic())).then(|| name.to_string())
}

/// Rewrite option names to the `--name` form. Values of the options in
/// [`VALUE_OPTIONS`] pass through untouched. Also reports whether `-help`
/// appeared in an option position.
fn rewrite_args<I, T>(args: I) -> (Vec<OsString>, bool)
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    let mut help = false;
    let mut value_expected = false;
    let args = args
        .into_iter()
        .map(Into::into)
        .enumerate()
        .map(|(position, arg)| {
            if position == 0 || std::mem::take(&mut value_expected) {
                return arg;
            }
            match option_name(&arg) {
                Some(name) => {
                    value_expected = VALUE_OPTIONS.contains(&name.as_str());
                    help |= name == "help";
                    OsString::from(format!("--{name}"))
                }
                None => arg,
            }
        })
        .collect();
    (args, help)
}

/// Rewrite `-name` to `--name`; short options, `--name` and option values
/// pass through untouched
pub fn normalize_args<I, T>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    rewrite_args(args).0
}

/// Render the usage text
pub fn usage() -> String {
    GridArgs::command().render_long_help().to_string()
}

impl GridArgs {
    /// Parse the process arguments
    pub fn from_env_args() -> Result<Self> {
        Self::try_parse_args(std::env::args_os())
    }

    /// Parse an argument list whose first element is the program name.
    ///
    /// `-help` in an option position wins over every other option and
    /// yields [`GridError::Help`] after printing the usage text.
    pub fn try_parse_args<I, T>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        let (args, help) = rewrite_args(args);
        if help {
            println!("{}", usage());
            return Err(GridError::Help);
        }
        GridArgs::try_parse_from(args).map_err(|e| GridError::Parameter(e.to_string().trim_end().to_string()))
    }

    /// Build the effective configuration: the `-config` file (or defaults),
    /// then `GRIDSAMPLE_*` environment variables, then these options
    pub fn load_config(&self) -> Result<AppConfig> {
        let mut config = match &self.config {
            Some(path) => AppConfig::from_file_with_env(path)?,
            None => AppConfig::from_env()?,
        };
        self.apply(&mut config)?;
        config.validate()?;
        Ok(config)
    }

    fn apply(&self, config: &mut AppConfig) -> Result<()> {
        let db = &mut config.database;
        if let Some(dsn) = &self.dsn {
            db.dsn = dsn.clone();
        }
        if let Some(uid) = &self.uid {
            db.uid = uid.clone();
        }
        if let Some(pwd) = &self.pwd {
            db.password = Some(pwd.clone());
        }

        let w = &mut config.workload;
        if let Some(mix) = &self.txnmix {
            w.txn_mix = mix.parse::<TxnMix>()?;
        }
        if self.nocleanup {
            w.cleanup = false;
        }
        if self.commitrotxn {
            w.commit_read_only = true;
        }
        if let Some(count) = self.numtxn {
            w.num_transactions = Some(count);
            w.duration_secs = None;
        }
        if let Some(secs) = self.duration {
            w.duration_secs = Some(secs);
            w.num_transactions = None;
        }

        let l = &mut config.logging;
        if self.silent {
            l.verbosity = Verbosity::Silent;
        }
        if let Some(interval) = self.verbose {
            l.verbosity = Verbosity::Verbose;
            if let Some(secs) = interval {
                l.report_interval_secs = secs;
            }
        }
        if let Some(path) = &self.log {
            l.log_file = Some(path.clone());
            l.debug_file = None;
        }
        if let Some(path) = &self.debug {
            l.debug_file = Some(path.clone());
            l.log_file = None;
        }
        Ok(())
    }

    /// Password to connect with. Asks on the terminal when neither the
    /// options nor the configuration supply one. An empty password means
    /// none.
    pub fn resolve_password(&self, config: &AppConfig) -> Result<Option<String>> {
        let password = match self.pwd.as_ref().or(config.database.password.as_ref()) {
            Some(password) => password.clone(),
            None => prompt_password(format!("{}: Password for '{}'? ", timestamp(), config.database.uid))?,
        };
        if password.len() > MAX_LEN_PWD {
            return Err(GridError::Parameter(format!(
                "password must be at most {MAX_LEN_PWD} characters"
            )));
        }
        Ok((!password.is_empty()).then_some(password))
    }
}

/// Install logging for `config`; a log file that cannot be created is a
/// parameter error
pub fn init_logging(config: &AppConfig) -> Result<LogGuard> {
    crate::logging::init_logging(LogConfig::from(&config.logging)).map_err(|e| match e {
        GridError::Logging(msg) => GridError::Parameter(msg),
        other => other,
    })
}
