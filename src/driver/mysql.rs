//! MySQL protocol backend (MySQL, TiDB) built on the blocking `mysql` client.
//!
//! A lost connection is re-established on the next `prepare`, which is what
//! the engine does when it re-initializes after a failover. Statements
//! prepared on an earlier physical connection are never executed or closed
//! on the new one.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use mysql::prelude::*;
use mysql::{Conn, Opts, OptsBuilder, Params, Row, Value};
use tracing::{debug, warn};

use super::{ConnectOptions, Connection, DriverResult, ExecOutcome, RawStatement, Session, SqlValue};
use crate::classifier::{MYSQL_RULES, RuleSet};
use crate::errors::{DriverError, ErrorRecord, ErrorStack, GridError, Result};

const DEFAULT_PORT: u16 = 4000;
const LOST_CONNECTION_STATE: &str = "08S01";
const CR_SERVER_LOST: i32 = 2013;

/// Parse a connection target in format `hostname[:port][/database]`
pub fn parse_target(target: &str) -> Result<(String, u16, Option<String>)> {
    let (host_port, database) = match target.split_once('/') {
        Some((host_port, db)) if !db.is_empty() => (host_port, Some(db.to_string())),
        Some((host_port, _)) => (host_port, None),
        None => (target, None),
    };
    let (host, port) = match host_port.rsplit_once(':') {
        Some((host, port)) => {
            let port = port
                .parse::<u16>()
                .map_err(|_| GridError::Parameter(format!("invalid port number in '{target}'")))?;
            (host, port)
        }
        None => (host_port, DEFAULT_PORT),
    };
    if host.is_empty() {
        return Err(GridError::Parameter(format!("missing host name in '{target}'")));
    }
    Ok((host.to_string(), port, database))
}

fn build_opts(options: &ConnectOptions) -> Result<Opts> {
    let (host, port, database) = parse_target(&options.target)?;
    let mut attrs = HashMap::new();
    attrs.insert("program_name".to_string(), options.connection_name.clone());
    let builder = OptsBuilder::new()
        .ip_or_hostname(Some(host))
        .tcp_port(port)
        .user(Some(options.user.clone()))
        .pass(options.password.clone())
        .db_name(database)
        .connect_attrs(Some(attrs))
        .init(vec!["SET autocommit = 0"]);
    Ok(Opts::from(builder))
}

fn lost_connection(message: impl Into<String>) -> DriverError {
    DriverError::Diagnostics(ErrorStack::single(ErrorRecord::new(
        LOST_CONNECTION_STATE,
        CR_SERVER_LOST,
        message,
    )))
}

fn is_connection_loss(err: &mysql::Error) -> bool {
    matches!(err, mysql::Error::IoError(_) | mysql::Error::CodecError(_))
}

fn to_driver_error(err: mysql::Error) -> DriverError {
    match err {
        mysql::Error::MySqlError(e) => DriverError::Diagnostics(ErrorStack::single(ErrorRecord::new(
            e.state,
            i32::from(e.code),
            e.message,
        ))),
        e if is_connection_loss(&e) => lost_connection(e.to_string()),
        e => DriverError::Diagnostics(ErrorStack::single(ErrorRecord::new("HY000", 0, e.to_string()))),
    }
}

struct Shared {
    conn: Option<Conn>,
    opts: Opts,
    generation: u64,
    broken: bool,
}

impl Shared {
    /// Reconnect if the previous physical connection was lost
    fn ensure_connected(&mut self) -> DriverResult<&mut Conn> {
        if self.broken || self.conn.is_none() {
            warn!("Re-establishing lost connection");
            self.conn = None;
            let conn = Conn::new(self.opts.clone()).map_err(to_driver_error)?;
            self.conn = Some(conn);
            self.generation += 1;
            self.broken = false;
        }
        self.conn
            .as_mut()
            .ok_or_else(|| lost_connection("not connected"))
    }

    fn current(&mut self, generation: u64) -> DriverResult<&mut Conn> {
        if self.broken || self.generation != generation {
            return Err(lost_connection("statement belongs to a lost connection"));
        }
        self.conn
            .as_mut()
            .ok_or_else(|| lost_connection("not connected"))
    }

    fn record(&mut self, err: mysql::Error) -> DriverError {
        if is_connection_loss(&err) {
            self.broken = true;
        }
        to_driver_error(err)
    }
}

type SharedConn = Arc<Mutex<Shared>>;

fn lock(shared: &SharedConn) -> DriverResult<MutexGuard<'_, Shared>> {
    shared
        .lock()
        .map_err(|_| DriverError::NoInfo("connection state is poisoned".to_string()))
}

/// Open a connection to a MySQL-protocol server
pub fn connect(options: &ConnectOptions) -> Result<Connection> {
    let opts = build_opts(options)?;
    let conn = Conn::new(opts.clone()).map_err(to_driver_error)?;
    debug!("Connected to {} as {}", options.target, options.user);
    let shared = Shared {
        conn: Some(conn),
        opts,
        generation: 0,
        broken: false,
    };
    Ok(Connection::new(Box::new(MysqlSession {
        shared: Arc::new(Mutex::new(shared)),
    })))
}

struct MysqlSession {
    shared: SharedConn,
}

impl MysqlSession {
    fn run(&mut self, sql: &str) -> DriverResult<()> {
        let mut shared = lock(&self.shared)?;
        let generation = shared.generation;
        let conn = shared.current(generation)?;
        match conn.query_drop(sql) {
            Ok(()) => Ok(()),
            Err(e) => Err(shared.record(e)),
        }
    }
}

impl Session for MysqlSession {
    fn prepare(&mut self, sql: &str) -> DriverResult<Box<dyn RawStatement>> {
        let mut shared = lock(&self.shared)?;
        let conn = shared.ensure_connected()?;
        let prepared = conn.prep(sql);
        let stmt = match prepared {
            Ok(stmt) => stmt,
            Err(e) => return Err(shared.record(e)),
        };
        Ok(Box::new(MysqlStatement {
            shared: Arc::clone(&self.shared),
            stmt,
            generation: shared.generation,
            rows: VecDeque::new(),
        }))
    }

    fn commit(&mut self) -> DriverResult<()> {
        self.run("COMMIT")
    }

    fn rollback(&mut self) -> DriverResult<()> {
        self.run("ROLLBACK")
    }

    fn disconnect(&mut self) -> DriverResult<()> {
        let mut shared = lock(&self.shared)?;
        // dropping the client connection sends COM_QUIT
        shared.conn = None;
        shared.broken = false;
        Ok(())
    }

    fn rules(&self) -> &'static RuleSet {
        &MYSQL_RULES
    }
}

struct MysqlStatement {
    shared: SharedConn,
    stmt: mysql::Statement,
    generation: u64,
    rows: VecDeque<Vec<SqlValue>>,
}

impl RawStatement for MysqlStatement {
    fn execute(&mut self, params: &[SqlValue]) -> DriverResult<ExecOutcome> {
        let mut shared = lock(&self.shared)?;
        let conn = shared.current(self.generation)?;
        let params = if params.is_empty() {
            Params::Empty
        } else {
            Params::Positional(params.iter().map(to_mysql_value).collect())
        };

        let result = (|| -> mysql::Result<(bool, VecDeque<Vec<SqlValue>>)> {
            let mut result = conn.exec_iter(&self.stmt, params)?;
            let has_result_set = !result.columns().as_ref().is_empty();
            let mut rows = VecDeque::new();
            for row in result.by_ref() {
                rows.push_back(from_mysql_row(&row?));
            }
            Ok((has_result_set, rows))
        })();

        match result {
            Ok((has_result_set, rows)) => {
                let rows_affected = conn.affected_rows();
                self.rows = rows;
                Ok(ExecOutcome {
                    has_result_set,
                    rows_affected,
                })
            }
            Err(e) => Err(shared.record(e)),
        }
    }

    fn fetch(&mut self) -> DriverResult<Option<Vec<SqlValue>>> {
        Ok(self.rows.pop_front())
    }

    fn close_cursor(&mut self) -> DriverResult<()> {
        self.rows.clear();
        Ok(())
    }
}

impl Drop for MysqlStatement {
    fn drop(&mut self) {
        let Ok(mut shared) = self.shared.lock() else {
            return;
        };
        if let Ok(conn) = shared.current(self.generation)
            && let Err(e) = conn.close(self.stmt.clone())
        {
            debug!("Failed to close statement: {e}");
        }
    }
}

fn to_mysql_value(value: &SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::NULL,
        SqlValue::BigInt(v) => Value::Int(*v),
        SqlValue::Integer(v) => Value::Int(i64::from(*v)),
        SqlValue::SmallInt(v) => Value::Int(i64::from(*v)),
        SqlValue::Double(v) => Value::Double(*v),
        SqlValue::Char(s) => Value::Bytes(s.clone().into_bytes()),
    }
}

fn from_mysql_value(value: &Value) -> SqlValue {
    match value {
        Value::NULL => SqlValue::Null,
        Value::Int(v) => SqlValue::BigInt(*v),
        Value::UInt(v) => match i64::try_from(*v) {
            Ok(v) => SqlValue::BigInt(v),
            Err(_) => SqlValue::Double(*v as f64),
        },
        Value::Float(v) => SqlValue::Double(f64::from(*v)),
        Value::Double(v) => SqlValue::Double(*v),
        Value::Bytes(bytes) => SqlValue::Char(String::from_utf8_lossy(bytes).into_owned()),
        Value::Date(year, month, day, hour, minute, second, _) => SqlValue::Char(format!(
            "{year:04}-{month:02}-{day:02} {hour:02}:{minute:02}:{second:02}"
        )),
        Value::Time(negative, days, hours, minutes, seconds, _) => {
            let sign = if *negative { "-" } else { "" };
            let hours = u32::from(*hours) + days * 24;
            SqlValue::Char(format!("{sign}{hours:02}:{minutes:02}:{seconds:02}"))
        }
    }
}

fn from_mysql_row(row: &Row) -> Vec<SqlValue> {
    (0..row.len())
        .map(|i| row.as_ref(i).map(from_mysql_value).unwrap_or(SqlValue::Null))
        .collect()
}
