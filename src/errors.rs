use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::txn::TxnKind;

/// One diagnostic record returned by the driver for a failed call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorRecord {
    /// Five character SQL state, e.g. "S1000"
    pub state: String,
    /// Native (vendor) error code
    pub native: i32,
    pub message: String,
}

impl ErrorRecord {
    pub fn new(state: impl Into<String>, native: i32, message: impl Into<String>) -> Self {
        Self {
            state: state.into(),
            native,
            message: message.into(),
        }
    }
}

impl fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} / {} / {}", self.state, self.native, self.message)
    }
}

/// Diagnostic records for one failed driver call, in the driver's own order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorStack {
    records: Vec<ErrorRecord>,
}

impl ErrorStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(record: ErrorRecord) -> Self {
        Self {
            records: vec![record],
        }
    }

    pub fn push(&mut self, record: ErrorRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[ErrorRecord] {
        &self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}

impl FromIterator<ErrorRecord> for ErrorStack {
    fn from_iter<I: IntoIterator<Item = ErrorRecord>>(iter: I) -> Self {
        Self {
            records: iter.into_iter().collect(),
        }
    }
}

impl fmt::Display for ErrorStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, record) in self.records.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{record}")?;
        }
        Ok(())
    }
}

/// Failure reported by the database driver layer
#[derive(Error, Debug, Clone)]
pub enum DriverError {
    #[error("ODBC error\n{0}")]
    Diagnostics(ErrorStack),

    #[error("ODBC error - no additional info: {0}")]
    NoInfo(String),
}

impl DriverError {
    pub fn stack(&self) -> Option<&ErrorStack> {
        match self {
            DriverError::Diagnostics(stack) => Some(stack),
            DriverError::NoInfo(_) => None,
        }
    }
}

/// Main error type for the grid workload generator
#[derive(Error, Debug)]
pub enum GridError {
    #[error("* help requested *")]
    Help,

    #[error("internal error - invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("internal error - invalid state: {0}")]
    InvalidState(String),

    #[error("internal error - data type mismatch: {0}")]
    TypeMismatch(String),

    #[error("parameter error: {0}")]
    Parameter(String),

    #[error("failed to install signal handlers: {0}")]
    Signal(String),

    #[error("data error: {0}")]
    Data(String),

    #[error("ODBC error - no data returned: {0}")]
    NoData(String),

    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error("{kind} did not complete during startup: {}", .error.code().message())]
    Setup { kind: TxnKind, error: Box<TxnError> },

    #[error("interrupted")]
    Interrupted,

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Logging error: {0}")]
    Logging(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, GridError>;

/// Numbered status codes reported alongside error messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Help = 1,
    ParamInternal = 2,
    StateInternal = 3,
    TypeMismatchInternal = 4,
    NoMem = 5,
    Param = 6,
    Signal = 7,
    User = 8,
    Data = 9,
    OdbcNoData = 10,
    OdbcNoInfo = 11,
    OdbcNormal = 12,
    OdbcRetryable = 13,
    OdbcFailover = 14,
}

impl ErrorCode {
    pub fn message(self) -> &'static str {
        match self {
            ErrorCode::Help => "* help requested *",
            ErrorCode::ParamInternal => "internal error - invalid parameter",
            ErrorCode::StateInternal => "internal error - invalid state",
            ErrorCode::TypeMismatchInternal => "internal error - data type mismatch",
            ErrorCode::NoMem => "internal error - out of memory",
            ErrorCode::Param => "parameter error",
            ErrorCode::Signal => "failed to install signal handlers",
            ErrorCode::User => "user defined error",
            ErrorCode::Data => "data error",
            ErrorCode::OdbcNoData => "ODBC error - no data returned",
            ErrorCode::OdbcNoInfo => "ODBC error - no additional info",
            ErrorCode::OdbcNormal => "ODBC error",
            ErrorCode::OdbcRetryable => "ODBC error - retryable",
            ErrorCode::OdbcFailover => "ODBC error - failover",
        }
    }
}

impl GridError {
    pub fn code(&self) -> ErrorCode {
        match self {
            GridError::Help => ErrorCode::Help,
            GridError::InvalidParameter(_) => ErrorCode::ParamInternal,
            GridError::InvalidState(_) => ErrorCode::StateInternal,
            GridError::TypeMismatch(_) => ErrorCode::TypeMismatchInternal,
            GridError::Parameter(_) | GridError::Configuration(_) => ErrorCode::Param,
            GridError::Signal(_) => ErrorCode::Signal,
            GridError::Data(_) => ErrorCode::Data,
            GridError::NoData(_) => ErrorCode::OdbcNoData,
            GridError::Driver(DriverError::Diagnostics(_)) => ErrorCode::OdbcNormal,
            GridError::Driver(DriverError::NoInfo(_)) => ErrorCode::OdbcNoInfo,
            GridError::Setup { error, .. } => error.code(),
            GridError::Interrupted => ErrorCode::Signal,
            GridError::Logging(_) | GridError::Io(_) => ErrorCode::User,
        }
    }

    /// Diagnostic records behind this error, if the driver supplied any
    pub fn stack(&self) -> Option<&ErrorStack> {
        match self {
            GridError::Driver(e) => e.stack(),
            GridError::Setup { error, .. } => match error.as_ref() {
                TxnError::Fatal(e) => e.stack(),
                _ => None,
            },
            _ => None,
        }
    }

    /// Process exit status for this error
    pub fn exit_status(&self) -> ExitStatus {
        match self {
            GridError::Help => ExitStatus::Help,
            GridError::Parameter(_) | GridError::Configuration(_) => ExitStatus::ParamError,
            GridError::Interrupted => ExitStatus::Interrupted,
            _ => ExitStatus::Error,
        }
    }
}

/// Process exit codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Success = 0,
    ParamError = 1,
    Help = 2,
    Interrupted = 3,
    Error = 4,
}

impl ExitStatus {
    pub fn code(self) -> i32 {
        self as i32
    }
}

impl From<ExitStatus> for std::process::ExitCode {
    fn from(status: ExitStatus) -> Self {
        std::process::ExitCode::from(status as u8)
    }
}

/// Outcome of a transaction-level operation that did not succeed
#[derive(Error, Debug)]
pub enum TxnError {
    #[error("ODBC error - retryable (delay {}ms)", .delay.as_millis())]
    Retryable { delay: Duration },

    #[error("ODBC error - failover (delay {}ms)", .delay.as_millis())]
    Failover { delay: Duration },

    #[error(transparent)]
    Fatal(#[from] GridError),
}

impl TxnError {
    pub fn code(&self) -> ErrorCode {
        match self {
            TxnError::Retryable { .. } => ErrorCode::OdbcRetryable,
            TxnError::Failover { .. } => ErrorCode::OdbcFailover,
            TxnError::Fatal(e) => e.code(),
        }
    }
}

pub type TxnResult<T> = std::result::Result<T, TxnError>;

// Conversion implementations
impl From<config::ConfigError> for GridError {
    fn from(err: config::ConfigError) -> Self {
        GridError::Configuration(err.to_string())
    }
}
