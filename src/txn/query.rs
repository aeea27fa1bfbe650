use super::{Fetched, Transaction, TxnEnv, TxnInputs, TxnKind, abort, prepared};
use crate::driver::{ClientType, Connection, DbType, FetchStatus, Statement};
use crate::errors::{GridError, TxnError, TxnResult};

const KIND: TxnKind = TxnKind::Query;

const QUERY_SQL: &str = "SELECT c.cust_id, c.last_name, c.member_since, \
     a.account_id, a.phone, s.status, a.current_balance \
     FROM customers c, accounts a, account_status s \
     WHERE c.cust_id = ? AND c.cust_id = a.cust_id AND a.status = s.status";

/// One account of a customer
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRow {
    pub cust_id: i64,
    pub last_name: String,
    pub member_since: String,
    pub account_id: i64,
    pub phone: String,
    pub status: i16,
    pub current_balance: f64,
}

/// Customer and account snapshot for one customer
pub struct Query {
    stmt: Option<Statement>,
    cust_id: i64,
    row: Option<QueryRow>,
    rows_fetched: u64,
}

impl Default for Query {
    fn default() -> Self {
        Self::new()
    }
}

impl Query {
    pub fn new() -> Self {
        Self {
            stmt: None,
            cust_id: 0,
            row: None,
            rows_fetched: 0,
        }
    }

    /// Most recently fetched row
    pub fn row(&self) -> Option<&QueryRow> {
        self.row.as_ref()
    }

    pub fn rows_fetched(&self) -> u64 {
        self.rows_fetched
    }

    fn prepare(&mut self, conn: &mut Connection) -> Result<(), GridError> {
        let mut stmt = conn.prepare(QUERY_SQL)?;
        stmt.bind_param(1, ClientType::BigInt, DbType::Numeric { precision: 10, scale: 0 })?;
        stmt.bind_column(1, ClientType::BigInt, 0)?;
        stmt.bind_column(2, ClientType::Char, 30)?;
        stmt.bind_column(3, ClientType::Char, 19)?;
        stmt.bind_column(4, ClientType::BigInt, 0)?;
        stmt.bind_column(5, ClientType::Char, 16)?;
        stmt.bind_column(6, ClientType::SmallInt, 0)?;
        stmt.bind_column(7, ClientType::Double, 0)?;
        self.stmt = Some(stmt);
        Ok(())
    }

    fn run(&mut self) -> Result<(), GridError> {
        self.row = None;
        self.rows_fetched = 0;
        let stmt = prepared(&mut self.stmt, KIND)?;
        stmt.set_i64(1, self.cust_id)?;
        stmt.execute()
    }

    fn next_row(&mut self) -> Result<Fetched, GridError> {
        let stmt = prepared(&mut self.stmt, KIND)?;
        if stmt.fetch()? == FetchStatus::NoData {
            return Ok(Fetched::NoData);
        }
        let row = QueryRow {
            cust_id: stmt.get_i64(1)?.unwrap_or_default(),
            last_name: stmt.get_str(2)?.unwrap_or_default(),
            member_since: stmt.get_str(3)?.unwrap_or_default(),
            account_id: stmt.get_i64(4)?.unwrap_or_default(),
            phone: stmt.get_str(5)?.unwrap_or_default(),
            status: stmt.get_i16(6)?.unwrap_or_default(),
            current_balance: stmt.get_f64(7)?.unwrap_or_default(),
        };
        self.row = Some(row);
        self.rows_fetched += 1;
        Ok(Fetched::Row)
    }

    fn finish(&mut self, env: &mut TxnEnv<'_>) -> Result<(), GridError> {
        prepared(&mut self.stmt, KIND)?.close_cursor()?;
        if env.commit_read_only {
            env.conn.commit()?;
        }
        Ok(())
    }

    fn fail(&mut self, conn: &mut Connection, err: GridError) -> TxnError {
        self.row = None;
        if let Some(stmt) = self.stmt.as_mut() {
            stmt.discard_cursor();
        }
        abort(conn, KIND, err)
    }
}

impl Transaction for Query {
    fn kind(&self) -> TxnKind {
        KIND
    }

    fn init(&mut self, conn: &mut Connection) -> TxnResult<()> {
        if self.has_open_cursor() {
            return Err(GridError::InvalidState("Query cursor is open".into()).into());
        }
        self.cleanup();
        self.prepare(conn).map_err(|e| {
            self.cleanup();
            abort(conn, KIND, e)
        })
    }

    fn execute(&mut self, env: &mut TxnEnv<'_>) -> TxnResult<()> {
        self.run().map_err(|e| self.fail(env.conn, e))
    }

    fn returns_rows(&self) -> bool {
        true
    }

    fn fetch(&mut self, env: &mut TxnEnv<'_>) -> TxnResult<Fetched> {
        self.next_row().map_err(|e| self.fail(env.conn, e))
    }

    fn close(&mut self, env: &mut TxnEnv<'_>) -> TxnResult<()> {
        self.finish(env).map_err(|e| self.fail(env.conn, e))
    }

    fn set_inputs(&mut self, inputs: &TxnInputs) {
        self.cust_id = inputs.cust_id;
    }

    fn has_open_cursor(&self) -> bool {
        self.stmt.as_ref().is_some_and(Statement::is_cursor_open)
    }

    fn is_initialized(&self) -> bool {
        self.stmt.is_some()
    }

    fn cleanup(&mut self) {
        self.row = None;
        self.stmt = None;
    }
}
