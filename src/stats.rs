//! # Workload statistics
//!
//! Running totals for the whole run plus interval counters that are reset
//! after every periodic report.

use std::fmt;
use std::time::Duration;

use crate::txn::TxnKind;

/// Per-type transaction counters with retry and failover tallies
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counters {
    pub executed: u64,
    pub authorize: u64,
    pub query: u64,
    pub charge: u64,
    pub topup: u64,
    pub purge: u64,
    pub retries: u64,
    pub failovers: u64,
}

impl Counters {
    fn record(&mut self, kind: TxnKind) {
        self.executed += 1;
        match kind {
            TxnKind::Authorize => self.authorize += 1,
            TxnKind::Query => self.query += 1,
            TxnKind::Charge => self.charge += 1,
            TxnKind::Topup => self.topup += 1,
            TxnKind::Purge => self.purge += 1,
            _ => {}
        }
    }

    pub fn count(&self, kind: TxnKind) -> u64 {
        match kind {
            TxnKind::Authorize => self.authorize,
            TxnKind::Query => self.query,
            TxnKind::Charge => self.charge,
            TxnKind::Topup => self.topup,
            TxnKind::Purge => self.purge,
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Statistics {
    pub total: Counters,
    pub interval: Counters,
    pub account_updates: u64,
    pub transaction_inserts: u64,
    pub transaction_deletes: u64,
}

impl Statistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a completed workload transaction. `rows_deleted` is only
    /// meaningful for Purge.
    pub fn record_success(&mut self, kind: TxnKind, rows_deleted: u64) {
        self.total.record(kind);
        self.interval.record(kind);
        match kind {
            TxnKind::Charge | TxnKind::Topup => {
                self.account_updates += 1;
                self.transaction_inserts += 1;
            }
            TxnKind::Purge => self.transaction_deletes += rows_deleted,
            _ => {}
        }
    }

    pub fn record_retry(&mut self) {
        self.total.retries += 1;
        self.interval.retries += 1;
    }

    pub fn record_failover(&mut self) {
        self.total.failovers += 1;
        self.interval.failovers += 1;
    }

    /// Interval report line for the given element
    pub fn interval_report(&self, element: i64) -> String {
        let c = &self.interval;
        format!(
            "Eid={element} Txn={} A={} C={} T={} Q={} P={} R={} F={}",
            c.executed, c.authorize, c.charge, c.topup, c.query, c.purge, c.retries, c.failovers
        )
    }

    pub fn reset_interval(&mut self) {
        self.interval = Counters::default();
    }

    pub fn summary(&self, elapsed: Duration) -> Summary<'_> {
        Summary {
            stats: self,
            elapsed,
        }
    }
}

/// End of run summary, one line per entry
pub struct Summary<'a> {
    stats: &'a Statistics,
    elapsed: Duration,
}

impl Summary<'_> {
    pub fn lines(&self) -> Vec<String> {
        let s = self.stats;
        let t = &s.total;
        let mut lines = vec![
            format!("Execution time: {} seconds", self.elapsed.as_secs()),
            format!("Total transactions: {}", t.executed),
        ];
        if t.executed > 0 {
            lines.extend([
                format!("    Authorize : {}", t.authorize),
                format!("    Charge    : {}", t.charge),
                format!("    Topup     : {}", t.topup),
                format!("    Query     : {}", t.query),
                format!("    Purge     : {}", t.purge),
                format!("ACCOUNTS table rows: {} updated", s.account_updates),
                format!(
                    "TRANSACTIONS table rows: {} inserted, {} deleted",
                    s.transaction_inserts, s.transaction_deletes
                ),
            ]);
        }
        lines.push(format!("Total retries: {}", t.retries));
        lines.push(format!("Total C/S failovers: {}", t.failovers));
        lines
    }
}

impl fmt::Display for Summary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.lines().join("\n"))
    }
}
