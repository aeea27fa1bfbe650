//! In-memory session driven by a script of canned outcomes, used by unit tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use super::{Connection, DriverResult, ExecOutcome, RawStatement, Session, SqlValue};
use crate::classifier::{GRID_RULES, RuleSet};
use crate::errors::{DriverError, ErrorRecord, ErrorStack};

#[derive(Debug, Clone)]
pub(crate) enum Outcome {
    Rows(Vec<Vec<SqlValue>>),
    Affected(u64),
    Fail(DriverError),
}

impl Outcome {
    pub fn rows(rows: Vec<Vec<SqlValue>>) -> Self {
        Outcome::Rows(rows)
    }

    pub fn affected(count: u64) -> Self {
        Outcome::Affected(count)
    }

    pub fn error(state: &str, native: i32) -> Self {
        Outcome::Fail(driver_error(state, native))
    }
}

pub(crate) fn driver_error(state: &str, native: i32) -> DriverError {
    DriverError::Diagnostics(ErrorStack::single(ErrorRecord::new(
        state,
        native,
        format!("scripted error {state}/{native}"),
    )))
}

#[derive(Default)]
struct Script {
    queued: Vec<(String, VecDeque<Outcome>)>,
    fixed: Vec<(String, Outcome)>,
    prepare_failures: Vec<(String, VecDeque<DriverError>)>,
    commit_failures: VecDeque<DriverError>,
    executed: Vec<(String, Vec<SqlValue>)>,
    prepared: Vec<String>,
    live: usize,
    commits: usize,
    rollbacks: usize,
    disconnected: bool,
}

impl Script {
    fn next_outcome(&mut self, sql: &str) -> Outcome {
        for (needle, queue) in self.queued.iter_mut() {
            if sql.contains(needle.as_str())
                && let Some(outcome) = queue.pop_front()
            {
                return outcome;
            }
        }
        if let Some((_, outcome)) = self.fixed.iter().find(|(needle, _)| sql.contains(needle.as_str())) {
            return outcome.clone();
        }
        let verb = sql.trim_start().to_ascii_uppercase();
        if verb.starts_with("SELECT") {
            Outcome::Rows(Vec::new())
        } else {
            Outcome::Affected(1)
        }
    }
}

/// Shared view of a script for configuring outcomes and inspecting calls
#[derive(Clone, Default)]
pub(crate) struct ScriptHandle(Arc<Mutex<Script>>);

impl ScriptHandle {
    fn lock(&self) -> MutexGuard<'_, Script> {
        self.0.lock().unwrap()
    }

    /// Answer every execution of SQL containing `needle` with `outcome`
    pub fn always(&self, needle: &str, outcome: Outcome) {
        let mut script = self.lock();
        script.fixed.retain(|(n, _)| n != needle);
        script.fixed.push((needle.to_string(), outcome));
    }

    /// Answer the next execution of SQL containing `needle` with `outcome`
    pub fn once(&self, needle: &str, outcome: Outcome) {
        let mut script = self.lock();
        match script.queued.iter_mut().find(|(n, _)| n == needle) {
            Some((_, queue)) => queue.push_back(outcome),
            None => script
                .queued
                .push((needle.to_string(), VecDeque::from([outcome]))),
        }
    }

    pub fn fail_prepare(&self, needle: &str, error: DriverError) {
        let mut script = self.lock();
        match script.prepare_failures.iter_mut().find(|(n, _)| n == needle) {
            Some((_, queue)) => queue.push_back(error),
            None => script
                .prepare_failures
                .push((needle.to_string(), VecDeque::from([error]))),
        }
    }

    pub fn fail_commit(&self, error: DriverError) {
        self.lock().commit_failures.push_back(error);
    }

    pub fn executed(&self) -> Vec<(String, Vec<SqlValue>)> {
        self.lock().executed.clone()
    }

    pub fn executions(&self, needle: &str) -> usize {
        self.lock()
            .executed
            .iter()
            .filter(|(sql, _)| sql.contains(needle))
            .count()
    }

    pub fn prepares(&self, needle: &str) -> usize {
        self.lock()
            .prepared
            .iter()
            .filter(|sql| sql.contains(needle))
            .count()
    }

    pub fn live_statements(&self) -> usize {
        self.lock().live
    }

    pub fn commits(&self) -> usize {
        self.lock().commits
    }

    pub fn rollbacks(&self) -> usize {
        self.lock().rollbacks
    }

    pub fn disconnected(&self) -> bool {
        self.lock().disconnected
    }
}

pub(crate) struct ScriptedSession {
    script: ScriptHandle,
    rules: &'static RuleSet,
}

impl ScriptedSession {
    pub fn new() -> (Self, ScriptHandle) {
        let script = ScriptHandle::default();
        (
            Self {
                script: script.clone(),
                rules: &GRID_RULES,
            },
            script,
        )
    }
}

impl Session for ScriptedSession {
    fn prepare(&mut self, sql: &str) -> DriverResult<Box<dyn RawStatement>> {
        let mut script = self.script.lock();
        for (needle, queue) in script.prepare_failures.iter_mut() {
            if sql.contains(needle.as_str())
                && let Some(error) = queue.pop_front()
            {
                return Err(error);
            }
        }
        script.prepared.push(sql.to_string());
        script.live += 1;
        Ok(Box::new(ScriptedStatement {
            sql: sql.to_string(),
            script: self.script.clone(),
            rows: VecDeque::new(),
        }))
    }

    fn commit(&mut self) -> DriverResult<()> {
        let mut script = self.script.lock();
        if let Some(error) = script.commit_failures.pop_front() {
            return Err(error);
        }
        script.commits += 1;
        Ok(())
    }

    fn rollback(&mut self) -> DriverResult<()> {
        self.script.lock().rollbacks += 1;
        Ok(())
    }

    fn disconnect(&mut self) -> DriverResult<()> {
        self.script.lock().disconnected = true;
        Ok(())
    }

    fn rules(&self) -> &'static RuleSet {
        self.rules
    }
}

struct ScriptedStatement {
    sql: String,
    script: ScriptHandle,
    rows: VecDeque<Vec<SqlValue>>,
}

impl RawStatement for ScriptedStatement {
    fn execute(&mut self, params: &[SqlValue]) -> DriverResult<ExecOutcome> {
        let mut script = self.script.lock();
        script.executed.push((self.sql.clone(), params.to_vec()));
        match script.next_outcome(&self.sql) {
            Outcome::Rows(rows) => {
                self.rows = rows.into();
                Ok(ExecOutcome {
                    has_result_set: true,
                    rows_affected: 0,
                })
            }
            Outcome::Affected(count) => Ok(ExecOutcome {
                has_result_set: false,
                rows_affected: count,
            }),
            Outcome::Fail(error) => Err(error),
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

impl Drop for ScriptedStatement {
    fn drop(&mut self) {
        if let Ok(mut script) = self.script.0.lock() {
            script.live -= 1;
        }
    }
}

/// A connection whose script answers every workload statement with
/// consistent sample data: 100 customers and 100 accounts keyed 1..=100,
/// a grid database connected to element 1.
pub(crate) fn sample_database() -> (Connection, ScriptHandle) {
    let (session, script) = ScriptedSession::new();
    script.always(
        "COUNT(*) FROM customers",
        Outcome::rows(vec![vec![
            SqlValue::BigInt(1),
            SqlValue::BigInt(100),
            SqlValue::BigInt(100),
        ]]),
    );
    script.always(
        "COUNT(*) FROM accounts",
        Outcome::rows(vec![vec![
            SqlValue::BigInt(1),
            SqlValue::BigInt(100),
            SqlValue::BigInt(100),
        ]]),
    );
    script.always(
        "TTGridEnable",
        Outcome::rows(vec![vec![
            SqlValue::Char("TTGridEnable".into()),
            SqlValue::Char("1".into()),
        ]]),
    );
    script.always("@@server_id", Outcome::rows(vec![vec![SqlValue::BigInt(1)]]));
    script.always(
        "account_type",
        Outcome::rows(vec![vec![SqlValue::BigInt(42), SqlValue::Char("555-0100".into())]]),
    );
    script.always(
        "c.last_name",
        Outcome::rows(vec![vec![
            SqlValue::BigInt(42),
            SqlValue::Char("Smith".into()),
            SqlValue::Char("2019-04-01 00:00:00".into()),
            SqlValue::BigInt(7),
            SqlValue::Char("555-0100".into()),
            SqlValue::BigInt(10),
            SqlValue::Char("12.50".into()),
        ]]),
    );
    script.always(
        "current_balance, prev_balance",
        Outcome::rows(vec![vec![SqlValue::Double(12.5), SqlValue::Double(13.0)]]),
    );
    script.always("DELETE FROM transactions", Outcome::affected(5));
    (Connection::new(Box::new(session)), script)
}
