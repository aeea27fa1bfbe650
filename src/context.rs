use crate::config::WorkloadConfig;
use crate::driver::Connection;
use crate::errors::{GridError, Result, TxnResult};
use crate::stats::Statistics;
use crate::txn::{TxnEnv, TxnKind, TxnRegistry};

/// Valid primary key ranges for random key generation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyRanges {
    pub min_cust_id: i64,
    pub max_cust_id: i64,
    pub num_customers: i64,
    pub min_account_id: i64,
    pub max_account_id: i64,
    pub num_accounts: i64,
}

impl KeyRanges {
    pub fn is_established(&self) -> bool {
        self.num_customers > 0 && self.num_accounts > 0
    }
}

/// Which database element the connection is bound to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GridTopology {
    pub is_grid: bool,
    pub current_element: i64,
    pub previous_element: i64,
}

impl GridTopology {
    pub fn record_element(&mut self, element: i64) {
        self.previous_element = self.current_element;
        self.current_element = element;
    }
}

/// All state of one workload run. Owned by the workload driver; the engine
/// and the transactions borrow it.
pub struct WorkloadContext {
    pub conn: Connection,
    pub txns: TxnRegistry,
    pub settings: WorkloadConfig,
    pub stats: Statistics,
    pub key_ranges: KeyRanges,
    pub topology: GridTopology,
}

impl WorkloadContext {
    pub fn new(conn: Connection, settings: WorkloadConfig) -> Self {
        Self {
            conn,
            txns: TxnRegistry::new(),
            settings,
            stats: Statistics::new(),
            key_ranges: KeyRanges::default(),
            topology: GridTopology::default(),
        }
    }

    /// Split into the registry and the environment its transactions run in
    pub fn split(&mut self) -> (&mut TxnRegistry, TxnEnv<'_>) {
        (
            &mut self.txns,
            TxnEnv {
                conn: &mut self.conn,
                commit_read_only: self.settings.commit_read_only,
                topology: &mut self.topology,
                key_ranges: &mut self.key_ranges,
            },
        )
    }

    /// Initialize a registered transaction
    pub fn init_txn(&mut self, kind: TxnKind) -> TxnResult<()> {
        let txn = self
            .txns
            .get_mut(kind)
            .ok_or_else(|| GridError::InvalidState(format!("{kind} is not registered")))?;
        txn.init(&mut self.conn)
    }

    /// Execute a registered transaction that does not return rows
    pub fn execute_txn(&mut self, kind: TxnKind) -> TxnResult<()> {
        let (txns, mut env) = self.split();
        let txn = txns
            .get_mut(kind)
            .ok_or_else(|| GridError::InvalidState(format!("{kind} is not registered")))?;
        txn.execute(&mut env)
    }

    /// Release every transaction and close the connection
    pub fn disconnect(&mut self) -> Result<()> {
        self.txns.cleanup_all();
        self.conn.disconnect()
    }
}
