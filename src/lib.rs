pub mod classifier;
pub mod cli;
pub mod config;
pub mod context;
pub mod driver;
pub mod engine;
pub mod errors;
pub mod logging;
pub mod mix;
pub mod stats;
pub mod txn;
pub mod workload;

pub use cli::{GridArgs, normalize_args, usage};
pub use config::{AppConfig, ConfigBuilder, DatabaseConfig, LoggingConfig, RunLimit, Verbosity, WorkloadConfig};
pub use context::{GridTopology, KeyRanges, WorkloadContext};
pub use engine::{Budget, Engine, TxnOutcome, execute_with_recovery};
pub use errors::{ErrorCode, ExitStatus, GridError, Result, TxnError, TxnResult};
pub use logging::{LogConfig, LogGuard, init_logging, report_error};
pub use mix::{InputGenerator, TxnMix};
pub use stats::{Counters, Statistics};
pub use txn::{Transaction, TxnKind, TxnRegistry};
pub use workload::{CancelToken, Termination, listen_for_signals, run, run_with};
