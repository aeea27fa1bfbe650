use super::{Transaction, TxnEnv, TxnKind, abort, prepared};
use crate::context::KeyRanges;
use crate::driver::{ClientType, Connection, FetchStatus, Statement};
use crate::errors::{GridError, TxnError, TxnResult};

const KIND: TxnKind = TxnKind::GetCounts;

const CUSTOMERS_SQL: &str = "SELECT MIN(cust_id), MAX(cust_id), COUNT(*) FROM customers";
const ACCOUNTS_SQL: &str = "SELECT MIN(account_id), MAX(account_id), COUNT(*) FROM accounts";

/// Inclusive id range of one table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct IdRange {
    min: i64,
    max: i64,
    count: i64,
}

impl IdRange {
    /// Random key generation needs a dense id space starting at 1 or above
    fn validate(&self, table: &str) -> Result<(), GridError> {
        if self.min < 1 || self.max <= self.min || self.max - self.min + 1 != self.count {
            return Err(GridError::Data(format!(
                "{table} ids {}..{} are not a dense range of {} rows",
                self.min, self.max, self.count
            )));
        }
        Ok(())
    }
}

/// Reads the customer and account key ranges used for random input generation
pub struct GetCounts {
    customers: Option<Statement>,
    accounts: Option<Statement>,
}

impl Default for GetCounts {
    fn default() -> Self {
        Self::new()
    }
}

impl GetCounts {
    pub fn new() -> Self {
        Self {
            customers: None,
            accounts: None,
        }
    }

    fn prepare_range(conn: &mut Connection, sql: &str) -> Result<Statement, GridError> {
        let mut stmt = conn.prepare(sql)?;
        for column in 1..=3 {
            stmt.bind_column(column, ClientType::BigInt, 0)?;
        }
        Ok(stmt)
    }

    fn prepare(&mut self, conn: &mut Connection) -> Result<(), GridError> {
        self.customers = Some(Self::prepare_range(conn, CUSTOMERS_SQL)?);
        self.accounts = Some(Self::prepare_range(conn, ACCOUNTS_SQL)?);
        Ok(())
    }

    fn read_range(stmt: &mut Statement, table: &str) -> Result<IdRange, GridError> {
        stmt.execute()?;
        if stmt.fetch()? == FetchStatus::NoData {
            return Err(GridError::NoData(format!("no counts returned for {table}")));
        }
        let range = IdRange {
            min: stmt.get_i64(1)?.unwrap_or_default(),
            max: stmt.get_i64(2)?.unwrap_or_default(),
            count: stmt.get_i64(3)?.unwrap_or_default(),
        };
        stmt.close_cursor()?;
        Ok(range)
    }

    fn run(&mut self, env: &mut TxnEnv<'_>) -> Result<(), GridError> {
        let customers = Self::read_range(prepared(&mut self.customers, KIND)?, "CUSTOMERS")?;
        let accounts = Self::read_range(prepared(&mut self.accounts, KIND)?, "ACCOUNTS")?;
        customers.validate("CUSTOMERS")?;
        accounts.validate("ACCOUNTS")?;

        *env.key_ranges = KeyRanges {
            min_cust_id: customers.min,
            max_cust_id: customers.max,
            num_customers: customers.count,
            min_account_id: accounts.min,
            max_account_id: accounts.max,
            num_accounts: accounts.count,
        };
        if env.commit_read_only {
            env.conn.commit()?;
        }
        Ok(())
    }

    fn fail(&mut self, conn: &mut Connection, err: GridError) -> TxnError {
        for stmt in [self.customers.as_mut(), self.accounts.as_mut()].into_iter().flatten() {
            stmt.discard_cursor();
        }
        abort(conn, KIND, err)
    }
}

impl Transaction for GetCounts {
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
        self.run(env).map_err(|e| self.fail(env.conn, e))
    }

    fn is_initialized(&self) -> bool {
        self.customers.is_some() && self.accounts.is_some()
    }

    fn cleanup(&mut self) {
        self.customers = None;
        self.accounts = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::SqlValue;
    use crate::driver::scripted::Outcome;
    use crate::txn::test_support::Harness;

    fn counts(min: i64, max: i64, count: i64) -> Outcome {
        Outcome::rows(vec![vec![
            SqlValue::BigInt(min),
            SqlValue::BigInt(max),
            SqlValue::BigInt(count),
        ]])
    }

    #[test]
    fn test_dense_ranges_are_stored() {
        let mut h = Harness::new();
        h.script.always("COUNT(*) FROM accounts", counts(1, 250, 250));
        let mut txn = GetCounts::new();
        txn.init(&mut h.conn).unwrap();
        txn.execute(&mut h.env()).unwrap();

        assert!(h.key_ranges.is_established());
        assert_eq!(h.key_ranges.min_cust_id, 1);
        assert_eq!(h.key_ranges.max_cust_id, 100);
        assert_eq!(h.key_ranges.num_customers, 100);
        assert_eq!(h.key_ranges.max_account_id, 250);
        assert_eq!(h.key_ranges.num_accounts, 250);
    }

    #[test]
    fn test_sparse_ids_are_a_data_error() {
        let mut h = Harness::new();
        h.script.always("COUNT(*) FROM customers", counts(1, 100, 99));
        let mut txn = GetCounts::new();
        txn.init(&mut h.conn).unwrap();
        let err = txn.execute(&mut h.env()).unwrap_err();
        assert!(matches!(err, TxnError::Fatal(GridError::Data(_))));
        assert!(!h.key_ranges.is_established());
        assert_eq!(h.script.rollbacks(), 1);
    }

    #[test]
    fn test_range_validation() {
        let range = |min, max, count| IdRange { min, max, count };
        assert!(range(1, 100, 100).validate("T").is_ok());
        assert!(range(5, 104, 100).validate("T").is_ok());
        assert!(range(0, 99, 100).validate("T").is_err());
        assert!(range(1, 1, 1).validate("T").is_err());
        assert!(range(1, 100, 50).validate("T").is_err());
    }

    #[test]
    fn test_empty_table_is_no_data() {
        let mut h = Harness::new();
        h.script.always("COUNT(*) FROM accounts", Outcome::rows(vec![]));
        let mut txn = GetCounts::new();
        txn.init(&mut h.conn).unwrap();
        assert!(matches!(
            txn.execute(&mut h.env()),
            Err(TxnError::Fatal(GridError::NoData(_)))
        ));
    }
}
