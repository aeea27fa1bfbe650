//! # Transactions
//!
//! Each business operation is a descriptor owning its prepared statements,
//! bindings and row data, driven through the [`Transaction`] trait.

pub mod authorize;
pub mod balance;
pub mod charge;
pub mod clear_history;
pub mod get_counts;
pub mod purge;
pub mod query;
pub mod topup;
pub mod update_grid_info;

use std::collections::BTreeMap;
use std::fmt;

use tracing::debug;

pub use authorize::Authorize;
pub use charge::Charge;
pub use clear_history::ClearHistory;
pub use get_counts::GetCounts;
pub use purge::Purge;
pub use query::Query;
pub use topup::Topup;
pub use update_grid_info::UpdateGridInfo;

use crate::classifier::Classification;
use crate::context::{GridTopology, KeyRanges};
use crate::driver::Connection;
use crate::errors::{GridError, TxnError, TxnResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TxnKind {
    UpdateGridInfo,
    GetCounts,
    ClearHistory,
    Purge,
    Query,
    Authorize,
    Charge,
    Topup,
}

impl fmt::Display for TxnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxnKind::UpdateGridInfo => write!(f, "UpdateGridInfo"),
            TxnKind::GetCounts => write!(f, "GetCounts"),
            TxnKind::ClearHistory => write!(f, "ClearHistory"),
            TxnKind::Purge => write!(f, "Purge"),
            TxnKind::Query => write!(f, "Query"),
            TxnKind::Authorize => write!(f, "Authorize"),
            TxnKind::Charge => write!(f, "Charge"),
            TxnKind::Topup => write!(f, "Topup"),
        }
    }
}

/// Outcome of advancing a transaction's cursor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fetched {
    Row,
    NoData,
}

/// Randomized inputs for one workload iteration
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TxnInputs {
    pub account_id: i64,
    pub cust_id: i64,
    pub adjust_amount: f64,
}

/// Parts of the workload context a running transaction may use
pub struct TxnEnv<'a> {
    pub conn: &'a mut Connection,
    pub commit_read_only: bool,
    pub topology: &'a mut GridTopology,
    pub key_ranges: &'a mut KeyRanges,
}

/// Uniform contract for every business transaction.
///
/// `fetch`, `close` and `rowcount` are optional; callers check
/// [`Transaction::returns_rows`] before driving a cursor.
pub trait Transaction: Send {
    fn kind(&self) -> TxnKind;

    /// Prepare all statements and bindings, releasing any previous ones first
    fn init(&mut self, conn: &mut Connection) -> TxnResult<()>;

    fn execute(&mut self, env: &mut TxnEnv<'_>) -> TxnResult<()>;

    fn returns_rows(&self) -> bool {
        false
    }

    fn fetch(&mut self, _env: &mut TxnEnv<'_>) -> TxnResult<Fetched> {
        Err(unsupported(self.kind(), "fetch"))
    }

    fn close(&mut self, _env: &mut TxnEnv<'_>) -> TxnResult<()> {
        Ok(())
    }

    fn rowcount(&self) -> TxnResult<u64> {
        Err(unsupported(self.kind(), "rowcount"))
    }

    fn set_inputs(&mut self, _inputs: &TxnInputs) {}

    fn has_open_cursor(&self) -> bool {
        false
    }

    fn is_initialized(&self) -> bool;

    /// Release statements and bindings; safe to call repeatedly
    fn cleanup(&mut self);
}

fn unsupported(kind: TxnKind, operation: &str) -> TxnError {
    TxnError::Fatal(GridError::InvalidState(format!(
        "{kind} does not support {operation}"
    )))
}

/// Map a failure to its recovery category and roll back the open
/// transaction. Callers reset their own cursor and row data first.
pub(crate) fn abort(conn: &mut Connection, kind: TxnKind, err: GridError) -> TxnError {
    let outcome = match conn.classify(&err) {
        Classification::Retryable(delay) => {
            debug!("{kind}: retryable error\n{err}");
            TxnError::Retryable { delay }
        }
        Classification::Failover(delay) => {
            debug!("{kind}: failover error\n{err}");
            TxnError::Failover { delay }
        }
        Classification::Fatal => TxnError::Fatal(err),
    };
    if conn.is_connected()
        && let Err(e) = conn.rollback()
    {
        debug!("{kind}: rollback after failure also failed: {e}");
    }
    outcome
}

/// Require an initialized statement slot
pub(crate) fn prepared<'a, T>(slot: &'a mut Option<T>, kind: TxnKind) -> Result<&'a mut T, GridError> {
    slot.as_mut()
        .ok_or_else(|| GridError::InvalidState(format!("{kind} is not initialized")))
}

/// The set of initialized transaction descriptors, keyed by kind
#[derive(Default)]
pub struct TxnRegistry {
    txns: BTreeMap<TxnKind, Box<dyn Transaction>>,
}

impl TxnRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a descriptor, replacing (and cleaning up) any previous one of the same kind
    pub fn register(&mut self, txn: Box<dyn Transaction>) {
        if let Some(mut previous) = self.txns.insert(txn.kind(), txn) {
            previous.cleanup();
        }
    }

    pub fn contains(&self, kind: TxnKind) -> bool {
        self.txns.contains_key(&kind)
    }

    pub fn get_mut(&mut self, kind: TxnKind) -> Option<&mut (dyn Transaction + 'static)> {
        self.txns.get_mut(&kind).map(|txn| txn.as_mut())
    }

    pub fn kinds(&self) -> Vec<TxnKind> {
        self.txns.keys().copied().collect()
    }

    /// Re-initialize every registered descriptor, stopping at the first failure
    pub fn init_all(&mut self, conn: &mut Connection) -> TxnResult<()> {
        for txn in self.txns.values_mut() {
            txn.init(conn)?;
        }
        Ok(())
    }

    pub fn cleanup_all(&mut self) {
        for txn in self.txns.values_mut() {
            txn.cleanup();
        }
    }
}

impl Drop for TxnRegistry {
    fn drop(&mut self) {
        self.cleanup_all();
    }
}
