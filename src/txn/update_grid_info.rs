//! Discovers whether the database is a grid and which element the
//! connection is currently bound to. Runs at connect time and again after
//! every failover.

use tracing::debug;

use super::{Transaction, TxnEnv, TxnKind, abort, prepared};
use crate::classifier::Classification;
use crate::driver::{ClientType, Connection, FetchStatus, Statement};
use crate::errors::{GridError, TxnError, TxnResult};

const KIND: TxnKind = TxnKind::UpdateGridInfo;

const GRID_PROBE_SQL: &str = "SHOW VARIABLES LIKE 'TTGridEnable'";
const ELEMENT_SQL: &str = "SELECT @@server_id";

const GRID_ENABLED: &str = "1";

pub struct UpdateGridInfo {
    probe: Option<Statement>,
    element: Option<Statement>,
}

impl Default for UpdateGridInfo {
    fn default() -> Self {
        Self::new()
    }
}

impl UpdateGridInfo {
    pub fn new() -> Self {
        Self {
            probe: None,
            element: None,
        }
    }

    fn prepare_probe(&mut self, conn: &mut Connection) -> Result<(), GridError> {
        let mut probe = conn.prepare(GRID_PROBE_SQL)?;
        probe.bind_column(1, ClientType::Char, 30)?;
        probe.bind_column(2, ClientType::Char, 1024)?;
        self.probe = Some(probe);
        Ok(())
    }

    /// The element query is optional; servers that reject it simply leave
    /// the element unknown.
    fn prepare_element(&mut self, conn: &mut Connection) -> TxnResult<()> {
        let prepared = conn.prepare(ELEMENT_SQL).and_then(|mut stmt| {
            stmt.bind_column(1, ClientType::BigInt, 0)?;
            Ok(stmt)
        });
        match prepared {
            Ok(stmt) => self.element = Some(stmt),
            Err(e) => match conn.classify(&e) {
                Classification::Fatal => debug!("{KIND}: element query unavailable: {e}"),
                _ => return Err(abort(conn, KIND, e)),
            },
        }
        Ok(())
    }

    fn run(&mut self, env: &mut TxnEnv<'_>) -> Result<(), GridError> {
        let probe = prepared(&mut self.probe, KIND)?;
        probe.execute()?;
        let is_grid = match probe.fetch()? {
            FetchStatus::Row => probe.get_str(2)?.is_some_and(|v| v.trim() == GRID_ENABLED),
            FetchStatus::NoData => false,
        };
        probe.close_cursor()?;

        if is_grid && let Some(element) = self.element.as_mut() {
            element.execute()?;
            if element.fetch()? == FetchStatus::NoData {
                return Err(GridError::NoData("element id query returned no rows".into()));
            }
            let id = element.get_i64(1)?.unwrap_or_default();
            element.close_cursor()?;
            env.topology.record_element(id);
        }
        env.topology.is_grid = is_grid;

        if env.commit_read_only {
            env.conn.commit()?;
        }
        Ok(())
    }

    fn fail(&mut self, conn: &mut Connection, err: GridError) -> TxnError {
        for stmt in [self.probe.as_mut(), self.element.as_mut()].into_iter().flatten() {
            stmt.discard_cursor();
        }
        abort(conn, KIND, err)
    }
}

impl Transaction for UpdateGridInfo {
    fn kind(&self) -> TxnKind {
        KIND
    }

    fn init(&mut self, conn: &mut Connection) -> TxnResult<()> {
        self.cleanup();
        if let Err(e) = self.prepare_probe(conn) {
            self.cleanup();
            return Err(abort(conn, KIND, e));
        }
        self.prepare_element(conn).inspect_err(|_| self.cleanup())
    }

    fn execute(&mut self, env: &mut TxnEnv<'_>) -> TxnResult<()> {
        self.run(env).map_err(|e| self.fail(env.conn, e))
    }

    fn is_initialized(&self) -> bool {
        self.probe.is_some()
    }

    fn cleanup(&mut self) {
        self.probe = None;
        self.element = None;
    }
}
