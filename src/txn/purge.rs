use super::{Transaction, TxnEnv, TxnKind, abort, prepared};
use crate::driver::{ClientType, Connection, DbType, Statement};
use crate::errors::{GridError, TxnResult};

const KIND: TxnKind = TxnKind::Purge;

/// Rows removed per call, bounding lock time
pub const PURGE_BATCH_SIZE: u32 = 128;

fn purge_sql() -> String {
    format!(
        "DELETE FROM transactions \
         WHERE transaction_ts < NOW() - INTERVAL ? SECOND \
         LIMIT {PURGE_BATCH_SIZE}"
    )
}

/// Deletes one batch of history rows older than the configured age
pub struct Purge {
    stmt: Option<Statement>,
    age_secs: i32,
    deleted: Option<u64>,
}

impl Purge {
    pub fn new(age_secs: u32) -> Self {
        Self {
            stmt: None,
            age_secs: i32::try_from(age_secs).unwrap_or(i32::MAX),
            deleted: None,
        }
    }

    fn prepare(&mut self, conn: &mut Connection) -> Result<(), GridError> {
        let mut stmt = conn.prepare(&purge_sql())?;
        stmt.bind_param(1, ClientType::Integer, DbType::Numeric { precision: 10, scale: 0 })?;
        self.stmt = Some(stmt);
        Ok(())
    }

    fn run(&mut self, conn: &mut Connection) -> Result<(), GridError> {
        self.deleted = None;
        let stmt = prepared(&mut self.stmt, KIND)?;
        stmt.set_i32(1, self.age_secs)?;
        stmt.execute()?;
        let deleted = stmt.rows_affected();
        conn.commit()?;
        self.deleted = Some(deleted);
        Ok(())
    }
}

impl Transaction for Purge {
    fn kind(&self) -> TxnKind {
        KIND
    }

    fn init(&mut self, conn: &mut Connection) -> TxnResult<()> {
        self.cleanup();
        self.prepare(conn).map_err(|e| {
            self.cleanup();
            abort(conn, KIND, e)
        })
    }

    fn execute(&mut self, env: &mut TxnEnv<'_>) -> TxnResult<()> {
        self.run(env.conn).map_err(|e| {
            self.deleted = None;
            abort(env.conn, KIND, e)
        })
    }

    fn rowcount(&self) -> TxnResult<u64> {
        self.deleted
            .ok_or_else(|| GridError::InvalidState("Purge has not executed".into()).into())
    }

    fn is_initialized(&self) -> bool {
        self.stmt.is_some()
    }

    fn cleanup(&mut self) {
        self.deleted = None;
        self.stmt = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::SqlValue;
    use crate::driver::scripted::Outcome;
    use crate::errors::TxnError;
    use crate::txn::test_support::Harness;

    #[test]
    fn test_purge_reports_deleted_rows() {
        let mut h = Harness::new();
        let mut txn = Purge::new(30);
        txn.init(&mut h.conn).unwrap();
        assert!(txn.rowcount().is_err());

        txn.execute(&mut h.env()).unwrap();
        assert_eq!(txn.rowcount().unwrap(), 5);
        assert_eq!(h.script.commits(), 1);

        let executed = h.script.executed();
        assert!(executed[0].0.contains("LIMIT 128"));
        assert_eq!(executed[0].1, vec![SqlValue::Integer(30)]);
    }

    #[test]
    fn test_lock_timeout_is_retryable() {
        let mut h = Harness::new();
        h.script.once("DELETE FROM transactions", Outcome::error("S1000", 6003));
        let mut txn = Purge::new(30);
        txn.init(&mut h.conn).unwrap();
        assert!(matches!(
            txn.execute(&mut h.env()),
            Err(TxnError::Retryable { .. })
        ));
        assert!(txn.rowcount().is_err());
    }
}
