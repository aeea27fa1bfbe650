use super::{Fetched, Transaction, TxnEnv, TxnInputs, TxnKind, abort, prepared};
use crate::driver::{ClientType, Connection, DbType, FetchStatus, Statement};
use crate::errors::{GridError, TxnError, TxnResult};

const KIND: TxnKind = TxnKind::Authorize;

const AUTHORIZE_SQL: &str = "SELECT cust_id, phone FROM accounts \
     WHERE account_id = ? AND account_type = ? AND status = ?";

/// Prepaid accounts only
const ACCOUNT_TYPE: &str = "P";
/// Active status
const ACCOUNT_STATUS: i32 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizeRow {
    pub cust_id: i64,
    pub phone: String,
}

/// Validates that an account is an active prepaid account
pub struct Authorize {
    stmt: Option<Statement>,
    account_id: i64,
    row: Option<AuthorizeRow>,
}

impl Default for Authorize {
    fn default() -> Self {
        Self::new()
    }
}

impl Authorize {
    pub fn new() -> Self {
        Self {
            stmt: None,
            account_id: 0,
            row: None,
        }
    }

    pub fn row(&self) -> Option<&AuthorizeRow> {
        self.row.as_ref()
    }

    fn prepare(&mut self, conn: &mut Connection) -> Result<(), GridError> {
        let mut stmt = conn.prepare(AUTHORIZE_SQL)?;
        stmt.bind_param(1, ClientType::BigInt, DbType::Numeric { precision: 10, scale: 0 })?;
        stmt.bind_param(2, ClientType::Char, DbType::Char(1))?;
        stmt.bind_param(3, ClientType::Integer, DbType::Numeric { precision: 2, scale: 0 })?;
        stmt.bind_column(1, ClientType::BigInt, 0)?;
        stmt.bind_column(2, ClientType::Char, 16)?;
        self.stmt = Some(stmt);
        Ok(())
    }

    fn run(&mut self) -> Result<(), GridError> {
        self.row = None;
        let stmt = prepared(&mut self.stmt, KIND)?;
        stmt.set_i64(1, self.account_id)?;
        stmt.set_str(2, ACCOUNT_TYPE)?;
        stmt.set_i32(3, ACCOUNT_STATUS)?;
        stmt.execute()
    }

    fn next_row(&mut self) -> Result<Fetched, GridError> {
        let stmt = prepared(&mut self.stmt, KIND)?;
        match stmt.fetch()? {
            FetchStatus::Row => {
                let row = AuthorizeRow {
                    cust_id: stmt.get_i64(1)?.unwrap_or_default(),
                    phone: stmt.get_str(2)?.unwrap_or_default(),
                };
                self.row = Some(row);
                Ok(Fetched::Row)
            }
            FetchStatus::NoData => Ok(Fetched::NoData),
        }
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

impl Transaction for Authorize {
    fn kind(&self) -> TxnKind {
        KIND
    }

    fn init(&mut self, conn: &mut Connection) -> TxnResult<()> {
        if self.has_open_cursor() {
            return Err(GridError::InvalidState("Authorize cursor is open".into()).into());
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
        self.account_id = inputs.account_id;
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
