//! # Database Driver Adapter
//!
//! A single physical connection plus the prepared statements, parameter and
//! column bindings, and per-call diagnostics the workload needs. Concrete
//! client libraries plug in underneath through [`Session`] and
//! [`RawStatement`]; everything above works with [`Connection`] and
//! [`Statement`].

pub mod mysql;
#[cfg(test)]
pub(crate) mod scripted;
pub mod types;

use std::collections::BTreeMap;

use tracing::trace;

use crate::classifier::{Classification, GRID_RULES, RuleSet};
use crate::errors::{DriverError, GridError, Result};

pub use types::{ClientType, DbType, SqlValue, column_buffer_size, param_buffer_size};

pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// What an executed statement produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecOutcome {
    pub has_result_set: bool,
    pub rows_affected: u64,
}

/// Connection-level capability of a client library
pub trait Session: Send {
    fn prepare(&mut self, sql: &str) -> DriverResult<Box<dyn RawStatement>>;
    fn commit(&mut self) -> DriverResult<()>;
    fn rollback(&mut self) -> DriverResult<()>;
    fn disconnect(&mut self) -> DriverResult<()>;

    /// Error signatures this library reports for retryable and failover conditions
    fn rules(&self) -> &'static RuleSet {
        &GRID_RULES
    }
}

/// Statement-level capability of a client library.
///
/// Resources held by the statement are released when it is dropped.
pub trait RawStatement: Send {
    /// Execute with positional parameters; a result set stays open for `fetch`
    fn execute(&mut self, params: &[SqlValue]) -> DriverResult<ExecOutcome>;
    /// Next row of the open result set, `None` at end of data
    fn fetch(&mut self) -> DriverResult<Option<Vec<SqlValue>>>;
    fn close_cursor(&mut self) -> DriverResult<()>;
}

/// Connection target and credentials
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// `host:port[/database]`
    pub target: String,
    pub user: String,
    pub password: Option<String>,
    pub connection_name: String,
}

/// The single database connection used by the workload
pub struct Connection {
    session: Box<dyn Session>,
    connected: bool,
}

impl Connection {
    pub fn new(session: Box<dyn Session>) -> Self {
        Self {
            session,
            connected: true,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.connected {
            Ok(())
        } else {
            Err(GridError::InvalidState("connection is closed".to_string()))
        }
    }

    pub fn prepare(&mut self, sql: &str) -> Result<Statement> {
        self.ensure_connected()?;
        trace!("prepare: {sql}");
        let raw = self.session.prepare(sql)?;
        Ok(Statement::new(sql, raw))
    }

    pub fn commit(&mut self) -> Result<()> {
        self.ensure_connected()?;
        trace!("commit");
        Ok(self.session.commit()?)
    }

    pub fn rollback(&mut self) -> Result<()> {
        self.ensure_connected()?;
        trace!("rollback");
        Ok(self.session.rollback()?)
    }

    pub fn disconnect(&mut self) -> Result<()> {
        if !self.connected {
            return Ok(());
        }
        self.connected = false;
        trace!("disconnect");
        Ok(self.session.disconnect()?)
    }

    pub fn rules(&self) -> &'static RuleSet {
        self.session.rules()
    }

    /// Classify a failure against this connection's rule set.
    /// Only driver failures carrying diagnostics can be recoverable.
    pub fn classify(&self, err: &GridError) -> Classification {
        match err {
            GridError::Driver(driver) => match driver.stack() {
                Some(stack) => self.rules().classify(stack),
                None => Classification::Fatal,
            },
            _ => Classification::Fatal,
        }
    }
}

#[derive(Debug, Clone)]
struct ParamBinding {
    client: ClientType,
    db: DbType,
    value: SqlValue,
}

#[derive(Debug, Clone)]
struct ColumnBinding {
    client: ClientType,
    max_len: usize,
}

/// Outcome of advancing a cursor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatus {
    Row,
    NoData,
}

/// A prepared statement with its bindings
pub struct Statement {
    sql: String,
    raw: Box<dyn RawStatement>,
    params: BTreeMap<u16, ParamBinding>,
    columns: BTreeMap<u16, ColumnBinding>,
    row: Option<Vec<SqlValue>>,
    cursor_open: bool,
    rows_affected: u64,
}

impl Statement {
    fn new(sql: &str, raw: Box<dyn RawStatement>) -> Self {
        Self {
            sql: sql.to_string(),
            raw,
            params: BTreeMap::new(),
            columns: BTreeMap::new(),
            row: None,
            cursor_open: false,
            rows_affected: 0,
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn is_cursor_open(&self) -> bool {
        self.cursor_open
    }

    pub fn bind_param(&mut self, index: u16, client: ClientType, db: DbType) -> Result<()> {
        if index == 0 || self.params.contains_key(&index) {
            return Err(GridError::InvalidParameter(format!(
                "parameter {index} cannot be bound"
            )));
        }
        param_buffer_size(client, db)?;
        self.params.insert(
            index,
            ParamBinding {
                client,
                db,
                value: SqlValue::Null,
            },
        );
        Ok(())
    }

    pub fn bind_column(&mut self, index: u16, client: ClientType, max_len: usize) -> Result<()> {
        if index == 0 || self.columns.contains_key(&index) {
            return Err(GridError::InvalidParameter(format!(
                "column {index} cannot be bound"
            )));
        }
        column_buffer_size(client, max_len)?;
        self.columns.insert(index, ColumnBinding { client, max_len });
        Ok(())
    }

    fn param_mut(&mut self, index: u16, expected: ClientType) -> Result<&mut ParamBinding> {
        let param = self
            .params
            .get_mut(&index)
            .ok_or_else(|| GridError::InvalidParameter(format!("parameter {index} is not bound")))?;
        if param.client != expected {
            return Err(GridError::TypeMismatch(format!(
                "parameter {index} is bound as {}, not {expected}",
                param.client
            )));
        }
        Ok(param)
    }

    pub fn set_i64(&mut self, index: u16, value: i64) -> Result<()> {
        self.param_mut(index, ClientType::BigInt)?.value = SqlValue::BigInt(value);
        Ok(())
    }

    pub fn set_i32(&mut self, index: u16, value: i32) -> Result<()> {
        self.param_mut(index, ClientType::Integer)?.value = SqlValue::Integer(value);
        Ok(())
    }

    pub fn set_f64(&mut self, index: u16, value: f64) -> Result<()> {
        self.param_mut(index, ClientType::Double)?.value = SqlValue::Double(value);
        Ok(())
    }

    pub fn set_str(&mut self, index: u16, value: &str) -> Result<()> {
        let param = self.param_mut(index, ClientType::Char)?;
        let limit = match param.db {
            DbType::Char(n) | DbType::VarChar(n) => n,
            _ => 0,
        };
        if value.chars().count() > limit {
            return Err(GridError::InvalidParameter(format!(
                "value for parameter {index} exceeds {limit} characters"
            )));
        }
        param.value = SqlValue::Char(value.to_string());
        Ok(())
    }

    pub fn set_null(&mut self, index: u16) -> Result<()> {
        let param = self
            .params
            .get_mut(&index)
            .ok_or_else(|| GridError::InvalidParameter(format!("parameter {index} is not bound")))?;
        param.value = SqlValue::Null;
        Ok(())
    }

    /// Execute with the current parameter values
    pub fn execute(&mut self) -> Result<()> {
        if self.cursor_open {
            return Err(GridError::InvalidState(format!(
                "cursor already open for: {}",
                self.sql
            )));
        }
        let mut values = Vec::with_capacity(self.params.len());
        for (position, (index, param)) in self.params.iter().enumerate() {
            if usize::from(*index) != position + 1 {
                return Err(GridError::InvalidState(format!(
                    "parameter {} is not bound",
                    position + 1
                )));
            }
            values.push(param.value.clone());
        }
        trace!("execute: {}", self.sql);
        self.row = None;
        let outcome = self.raw.execute(&values)?;
        self.cursor_open = outcome.has_result_set;
        self.rows_affected = outcome.rows_affected;
        Ok(())
    }

    /// Advance the open cursor, converting the row to the bound column types
    pub fn fetch(&mut self) -> Result<FetchStatus> {
        if !self.cursor_open {
            return Err(GridError::InvalidState(format!(
                "no open cursor for: {}",
                self.sql
            )));
        }
        let Some(row) = self.raw.fetch()? else {
            self.row = None;
            return Ok(FetchStatus::NoData);
        };
        let mut converted = row;
        for (index, column) in &self.columns {
            let slot = converted.get_mut(usize::from(*index) - 1).ok_or_else(|| {
                GridError::InvalidParameter(format!("column {index} is not in the result set"))
            })?;
            *slot = slot.convert(column.client, column.max_len).ok_or_else(|| {
                GridError::TypeMismatch(format!("column {index} cannot be read as {}", column.client))
            })?;
        }
        self.row = Some(converted);
        Ok(FetchStatus::Row)
    }

    pub fn close_cursor(&mut self) -> Result<()> {
        self.row = None;
        if !self.cursor_open {
            return Ok(());
        }
        self.cursor_open = false;
        trace!("close cursor: {}", self.sql);
        Ok(self.raw.close_cursor()?)
    }

    /// Close the cursor after a failure, ignoring any further error
    pub fn discard_cursor(&mut self) {
        if let Err(e) = self.close_cursor() {
            trace!("ignoring close cursor failure: {e}");
        }
    }

    pub fn rows_affected(&self) -> u64 {
        self.rows_affected
    }

    fn column(&self, index: u16, expected: ClientType) -> Result<&SqlValue> {
        let binding = self
            .columns
            .get(&index)
            .ok_or_else(|| GridError::InvalidParameter(format!("column {index} is not bound")))?;
        if binding.client != expected {
            return Err(GridError::TypeMismatch(format!(
                "column {index} is bound as {}, not {expected}",
                binding.client
            )));
        }
        let row = self
            .row
            .as_ref()
            .ok_or_else(|| GridError::InvalidState("no current row".to_string()))?;
        row.get(usize::from(index) - 1)
            .ok_or_else(|| GridError::InvalidParameter(format!("column {index} is not in the result set")))
    }

    pub fn get_i64(&self, index: u16) -> Result<Option<i64>> {
        match self.column(index, ClientType::BigInt)? {
            SqlValue::BigInt(v) => Ok(Some(*v)),
            _ => Ok(None),
        }
    }

    pub fn get_i32(&self, index: u16) -> Result<Option<i32>> {
        match self.column(index, ClientType::Integer)? {
            SqlValue::Integer(v) => Ok(Some(*v)),
            _ => Ok(None),
        }
    }

    pub fn get_i16(&self, index: u16) -> Result<Option<i16>> {
        match self.column(index, ClientType::SmallInt)? {
            SqlValue::SmallInt(v) => Ok(Some(*v)),
            _ => Ok(None),
        }
    }

    pub fn get_f64(&self, index: u16) -> Result<Option<f64>> {
        match self.column(index, ClientType::Double)? {
            SqlValue::Double(v) => Ok(Some(*v)),
            _ => Ok(None),
        }
    }

    pub fn get_str(&self, index: u16) -> Result<Option<String>> {
        match self.column(index, ClientType::Char)? {
            SqlValue::Char(v) => Ok(Some(v.clone())),
            _ => Ok(None),
        }
    }
}
