use super::{Transaction, TxnEnv, TxnKind, abort, prepared};
use crate::driver::{Connection, Statement};
use crate::errors::{GridError, TxnResult};

const KIND: TxnKind = TxnKind::ClearHistory;

const TRUNCATE_SQL: &str = "TRUNCATE TABLE transactions";

/// Empties the transaction history table
pub struct ClearHistory {
    stmt: Option<Statement>,
}

impl Default for ClearHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl ClearHistory {
    pub fn new() -> Self {
        Self { stmt: None }
    }

    fn run(&mut self, conn: &mut Connection) -> Result<(), GridError> {
        prepared(&mut self.stmt, KIND)?.execute()?;
        conn.commit()
    }
}

impl Transaction for ClearHistory {
    fn kind(&self) -> TxnKind {
        KIND
    }

    fn init(&mut self, conn: &mut Connection) -> TxnResult<()> {
        self.cleanup();
        let stmt = conn.prepare(TRUNCATE_SQL).map_err(|e| abort(conn, KIND, e))?;
        self.stmt = Some(stmt);
        Ok(())
    }

    fn execute(&mut self, env: &mut TxnEnv<'_>) -> TxnResult<()> {
        self.run(env.conn).map_err(|e| abort(env.conn, KIND, e))
    }

    fn is_initialized(&self) -> bool {
        self.stmt.is_some()
    }

    fn cleanup(&mut self) {
        self.stmt = None;
    }
}
