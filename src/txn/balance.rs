//! Three-statement balance adjustment shared by Charge and Topup: lock the
//! account row, apply the adjustment, and record an audit row.

use super::{TxnEnv, TxnKind, abort, prepared};
use crate::driver::{ClientType, Connection, DbType, FetchStatus, Statement};
use crate::errors::{GridError, TxnError, TxnResult};

const SELECT_SQL: &str = "SELECT current_balance, prev_balance FROM accounts \
     WHERE account_id = ? FOR UPDATE";

const UPDATE_SQL: &str = "UPDATE accounts \
     SET prev_balance = current_balance, current_balance = current_balance + ? \
     WHERE account_id = ?";

const INSERT_SQL: &str = "INSERT INTO transactions \
     (account_id, transaction_ts, description, optype, amount) \
     VALUES (?, NOW(), ?, ?, ?)";

const DESCRIPTION_LEN: usize = 60;

pub(crate) struct BalanceAdjustment {
    kind: TxnKind,
    description: &'static str,
    optype: &'static str,
    select: Option<Statement>,
    update: Option<Statement>,
    insert: Option<Statement>,
    pub account_id: i64,
    pub amount: f64,
}

impl BalanceAdjustment {
    pub fn new(kind: TxnKind, description: &'static str, optype: &'static str) -> Self {
        Self {
            kind,
            description,
            optype,
            select: None,
            update: None,
            insert: None,
            account_id: 0,
            amount: 0.0,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.select.is_some() && self.update.is_some() && self.insert.is_some()
    }

    pub fn has_open_cursor(&self) -> bool {
        self.select.as_ref().is_some_and(Statement::is_cursor_open)
    }

    pub fn cleanup(&mut self) {
        self.select = None;
        self.update = None;
        self.insert = None;
    }

    fn prepare(&mut self, conn: &mut Connection) -> Result<(), GridError> {
        let key = DbType::Numeric { precision: 10, scale: 0 };
        let money = DbType::Numeric { precision: 10, scale: 2 };

        let mut select = conn.prepare(SELECT_SQL)?;
        select.bind_param(1, ClientType::BigInt, key)?;
        self.select = Some(select);

        let mut update = conn.prepare(UPDATE_SQL)?;
        update.bind_param(1, ClientType::Double, money)?;
        update.bind_param(2, ClientType::BigInt, key)?;
        self.update = Some(update);

        let mut insert = conn.prepare(INSERT_SQL)?;
        insert.bind_param(1, ClientType::BigInt, key)?;
        insert.bind_param(2, ClientType::Char, DbType::Char(DESCRIPTION_LEN))?;
        insert.bind_param(3, ClientType::Char, DbType::Char(1))?;
        insert.bind_param(4, ClientType::Double, money)?;
        self.insert = Some(insert);
        Ok(())
    }

    pub fn init(&mut self, conn: &mut Connection) -> TxnResult<()> {
        if self.has_open_cursor() {
            return Err(GridError::InvalidState(format!("{} cursor is open", self.kind)).into());
        }
        self.cleanup();
        self.prepare(conn).map_err(|e| {
            self.cleanup();
            abort(conn, self.kind, e)
        })
    }

    fn run(&mut self, conn: &mut Connection) -> Result<(), GridError> {
        let kind = self.kind;
        let select = prepared(&mut self.select, kind)?;
        select.set_i64(1, self.account_id)?;
        select.execute()?;
        // only the row lock matters, the balances are not used
        if select.fetch()? == FetchStatus::NoData {
            return Err(GridError::NoData(format!("account {} not found", self.account_id)));
        }
        select.close_cursor()?;

        let update = prepared(&mut self.update, kind)?;
        update.set_f64(1, self.amount)?;
        update.set_i64(2, self.account_id)?;
        update.execute()?;

        let insert = prepared(&mut self.insert, kind)?;
        insert.set_i64(1, self.account_id)?;
        insert.set_str(2, self.description)?;
        insert.set_str(3, self.optype)?;
        insert.set_f64(4, self.amount)?;
        insert.execute()?;

        conn.commit()
    }

    pub fn execute(&mut self, env: &mut TxnEnv<'_>) -> TxnResult<()> {
        self.run(env.conn).map_err(|e| self.fail(env.conn, e))
    }

    fn fail(&mut self, conn: &mut Connection, err: GridError) -> TxnError {
        if let Some(select) = self.select.as_mut() {
            select.discard_cursor();
        }
        abort(conn, self.kind, err)
    }
}
