//! # Workload driver
//!
//! Connects, prepares every transaction, runs the workload loop until a
//! termination condition holds, then disconnects and prints the summary.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use rand::{Rng, SeedableRng};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::{AppConfig, LoggingConfig, RunLimit, Verbosity};
use crate::context::WorkloadContext;
use crate::driver::{ConnectOptions, Connection};
use crate::engine::Engine;
use crate::errors::{GridError, Result, TxnError};
use crate::txn::{
    Authorize, Charge, ClearHistory, GetCounts, Purge, Query, Topup, Transaction, TxnKind, UpdateGridInfo,
};

/// Cooperative interruption flag, set from the signal listener and polled
/// between transactions
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Cancel `token` on Ctrl-C, SIGTERM or SIGHUP
#[cfg(unix)]
pub fn listen_for_signals(token: CancelToken) -> Result<JoinHandle<()>> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = signal(SignalKind::terminate()).map_err(|e| GridError::Signal(e.to_string()))?;
    let mut hangup = signal(SignalKind::hangup()).map_err(|e| GridError::Signal(e.to_string()))?;
    Ok(tokio::spawn(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = terminate.recv() => {}
            _ = hangup.recv() => {}
        }
        token.cancel();
    }))
}

/// Cancel `token` on Ctrl-C
#[cfg(not(unix))]
pub fn listen_for_signals(token: CancelToken) -> Result<JoinHandle<()>> {
    Ok(tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    }))
}

/// Why the workload loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Interrupted,
    TransactionLimit,
    TimeLimit,
    TransactionFailed,
}

fn workload_transaction(kind: TxnKind, purge_age_secs: u32) -> Option<Box<dyn Transaction>> {
    let txn: Box<dyn Transaction> = match kind {
        TxnKind::Authorize => Box::new(Authorize::new()),
        TxnKind::Query => Box::new(Query::new()),
        TxnKind::Charge => Box::new(Charge::new()),
        TxnKind::Topup => Box::new(Topup::new()),
        TxnKind::Purge => Box::new(Purge::new(purge_age_secs)),
        _ => return None,
    };
    Some(txn)
}

fn startup_failure(kind: TxnKind, err: TxnError) -> GridError {
    match err {
        TxnError::Fatal(e) => e,
        other => GridError::Setup {
            kind,
            error: Box::new(other),
        },
    }
}

fn init_and_execute(ctx: &mut WorkloadContext, kind: TxnKind) -> Result<()> {
    ctx.init_txn(kind).map_err(|e| startup_failure(kind, e))?;
    ctx.execute_txn(kind).map_err(|e| startup_failure(kind, e))
}

/// Register and prepare everything the run needs: grid information and key
/// ranges are loaded immediately, the history cleaner and the workload
/// transactions with a non-zero share are prepared for later.
pub fn setup(ctx: &mut WorkloadContext) -> Result<()> {
    ctx.txns.register(Box::new(UpdateGridInfo::new()));
    init_and_execute(ctx, TxnKind::UpdateGridInfo)?;

    ctx.txns.register(Box::new(GetCounts::new()));
    init_and_execute(ctx, TxnKind::GetCounts)?;

    let mut prepare = Vec::new();
    if ctx.settings.cleanup {
        ctx.txns.register(Box::new(ClearHistory::new()));
        prepare.push(TxnKind::ClearHistory);
    }
    for kind in ctx.settings.txn_mix.enabled() {
        if let Some(txn) = workload_transaction(kind, ctx.settings.purge_age_secs) {
            ctx.txns.register(txn);
            prepare.push(kind);
        }
    }
    for kind in prepare {
        ctx.init_txn(kind).map_err(|e| startup_failure(kind, e))?;
    }
    Ok(())
}

/// Produces the periodic `Eid=..` report lines
struct IntervalReporter {
    enabled: bool,
    display: bool,
    interval: Duration,
    last: Instant,
}

impl IntervalReporter {
    fn new(logging: &LoggingConfig) -> Self {
        Self {
            enabled: logging.reports_enabled(),
            display: logging.verbosity == Verbosity::Verbose,
            interval: logging.report_interval(),
            last: Instant::now(),
        }
    }

    fn maybe_report(&mut self, ctx: &mut WorkloadContext) {
        if !self.enabled || self.last.elapsed() < self.interval {
            return;
        }
        let line = ctx.stats.interval_report(ctx.topology.current_element);
        if self.display {
            info!("{line}");
        } else {
            debug!("{line}");
        }
        ctx.stats.reset_interval();
        self.last = Instant::now();
    }
}

fn should_terminate(ctx: &WorkloadContext, cancel: &CancelToken, started: Instant) -> Option<Termination> {
    if cancel.is_cancelled() {
        info!("*** Interrupt");
        return Some(Termination::Interrupted);
    }
    match ctx.settings.run_limit() {
        RunLimit::Transactions(limit) if ctx.stats.total.executed >= limit => {
            info!("Transaction count limit reached");
            Some(Termination::TransactionLimit)
        }
        RunLimit::Duration(limit) if started.elapsed() >= limit => {
            info!("Run time limit reached");
            Some(Termination::TimeLimit)
        }
        _ => None,
    }
}

/// Execute transactions until interrupted, a run limit is reached or a
/// transaction fails
pub async fn run_workload<R: Rng>(
    ctx: &mut WorkloadContext,
    engine: &mut Engine<R>,
    logging: &LoggingConfig,
    cancel: &CancelToken,
    started: Instant,
) -> Termination {
    let mix = ctx.settings.txn_mix;
    info!(
        "Workload started (A={}%,C={}%,T={}%,Q={}%,P={}%)",
        mix.authorize, mix.charge, mix.topup, mix.query, mix.purge
    );

    let mut reporter = IntervalReporter::new(logging);
    let termination = loop {
        if let Some(reason) = should_terminate(ctx, cancel, started) {
            break reason;
        }
        if !engine.execute_next(ctx).await.is_success() {
            break Termination::TransactionFailed;
        }
        reporter.maybe_report(ctx);
    };

    info!("Workload ended");
    termination
}

/// Complete run against the connection produced by `connect`. Returns why
/// the workload stopped; a transaction that failed during the workload has
/// already been reported and still completes the run.
pub async fn run_with<C, R>(
    config: &AppConfig,
    password: Option<String>,
    cancel: &CancelToken,
    connect: C,
    rng: R,
) -> Result<Termination>
where
    C: FnOnce(&ConnectOptions) -> Result<Connection>,
    R: Rng,
{
    let started = Instant::now();
    let db = &config.database;
    info!("Connecting to '{}' as '{}'", db.dsn, db.uid);
    let options = ConnectOptions {
        target: db.dsn.clone(),
        user: db.uid.clone(),
        password,
        connection_name: db.connection_name.clone(),
    };
    let conn = connect(&options)?;

    let mut ctx = WorkloadContext::new(conn, config.workload.clone());
    if let Err(e) = setup(&mut ctx) {
        if let Err(disconnect) = ctx.disconnect() {
            debug!("disconnect after failed startup: {disconnect}");
        }
        return Err(e);
    }

    if cancel.is_cancelled() {
        info!("*** Interrupt");
        ctx.disconnect()?;
        return Err(GridError::Interrupted);
    }

    if ctx.topology.is_grid {
        info!("Connected to element {}", ctx.topology.current_element);
    } else {
        info!("Connected");
    }

    if ctx.settings.cleanup {
        debug!("Truncating TRANSACTIONS table");
        if let Err(e) = ctx.execute_txn(TxnKind::ClearHistory) {
            if let Err(disconnect) = ctx.disconnect() {
                debug!("disconnect after failed truncate: {disconnect}");
            }
            return Err(startup_failure(TxnKind::ClearHistory, e));
        }
        debug!("Truncate complete");
    }

    let mut engine = Engine::new(&config.workload, rng);
    let termination = run_workload(&mut ctx, &mut engine, &config.logging, cancel, started).await;

    info!("Disconnecting");
    ctx.disconnect()?;
    info!("Disconnected");

    for line in ctx.stats.summary(started.elapsed()).lines() {
        info!("{line}");
    }
    Ok(termination)
}

/// Complete run against the configured MySQL-protocol server
pub async fn run(config: &AppConfig, password: Option<String>, cancel: &CancelToken) -> Result<Termination> {
    let rng = rand_chacha::ChaCha8Rng::from_entropy();
    run_with(config, password, cancel, crate::driver::mysql::connect, rng).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigBuilder, WorkloadConfig};
    use crate::driver::scripted::{Outcome, ScriptHandle, sample_database};
    use crate::mix::TxnMix;
    use rand_chacha::ChaCha8Rng;

    fn context(settings: WorkloadConfig) -> (WorkloadContext, ScriptHandle) {
        let (conn, script) = sample_database();
        (WorkloadContext::new(conn, settings), script)
    }

    #[test]
    fn test_cancel_token_is_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_setup_prepares_only_enabled_transactions() {
        let settings = WorkloadConfig {
            txn_mix: TxnMix::new(50, 0, 0, 50, 0).unwrap(),
            cleanup: false,
            ..WorkloadConfig::default()
        };
        let (mut ctx, script) = context(settings);
        setup(&mut ctx).unwrap();

        assert_eq!(
            ctx.txns.kinds(),
            vec![TxnKind::UpdateGridInfo, TxnKind::GetCounts, TxnKind::Query, TxnKind::Authorize]
        );
        assert!(ctx.topology.is_grid);
        assert_eq!(ctx.topology.current_element, 1);
        assert_eq!(ctx.key_ranges.num_accounts, 100);
        assert_eq!(script.prepares("FOR UPDATE"), 0);
        assert_eq!(script.prepares("TRUNCATE"), 0);
    }

    #[test]
    fn test_setup_fails_on_sparse_keys() {
        let (mut ctx, script) = context(WorkloadConfig::default());
        script.always(
            "COUNT(*) FROM accounts",
            Outcome::rows(vec![vec![
                crate::driver::SqlValue::BigInt(1),
                crate::driver::SqlValue::BigInt(100),
                crate::driver::SqlValue::BigInt(10),
            ]]),
        );
        assert!(matches!(setup(&mut ctx), Err(GridError::Data(_))));
    }

    #[test]
    fn test_setup_failover_is_fatal() {
        let (mut ctx, script) = context(WorkloadConfig::default());
        script.once("TTGridEnable", Outcome::error("S1000", 47137));
        let err = setup(&mut ctx).unwrap_err();
        assert!(matches!(
            err,
            GridError::Setup {
                kind: TxnKind::UpdateGridInfo,
                ..
            }
        ));
        assert_eq!(err.code(), crate::errors::ErrorCode::OdbcFailover);
    }

    #[tokio::test]
    async fn test_transaction_limit_counts_successes_only() {
        let settings = WorkloadConfig {
            txn_mix: TxnMix::new(0, 100, 0, 0, 0).unwrap(),
            num_transactions: Some(50),
            ..WorkloadConfig::default()
        };
        let (mut ctx, script) = context(settings.clone());
        setup(&mut ctx).unwrap();
        for _ in 0..3 {
            script.once("UPDATE accounts", Outcome::error("S1000", 6002));
        }

        let mut engine = Engine::new(&settings, ChaCha8Rng::seed_from_u64(11));
        let termination = run_workload(
            &mut ctx,
            &mut engine,
            &LoggingConfig::default(),
            &CancelToken::new(),
            Instant::now(),
        )
        .await;

        assert_eq!(termination, Termination::TransactionLimit);
        assert_eq!(ctx.stats.total.executed, 50);
        assert_eq!(ctx.stats.total.charge, 50);
        assert_eq!(ctx.stats.total.retries, 3);
        assert_eq!(script.executions("INSERT INTO transactions"), 50);
    }

    #[tokio::test]
    async fn test_interrupt_is_checked_before_each_transaction() {
        let settings = WorkloadConfig::default();
        let (mut ctx, script) = context(settings.clone());
        setup(&mut ctx).unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();

        let mut engine = Engine::new(&settings, ChaCha8Rng::seed_from_u64(1));
        let termination =
            run_workload(&mut ctx, &mut engine, &LoggingConfig::default(), &cancel, Instant::now()).await;
        assert_eq!(termination, Termination::Interrupted);
        assert_eq!(ctx.stats.total.executed, 0);
        assert_eq!(script.executions("account_type"), 0);
    }

    #[tokio::test]
    async fn test_failed_transaction_ends_workload() {
        let settings = WorkloadConfig {
            txn_mix: TxnMix::new(100, 0, 0, 0, 0).unwrap(),
            ..WorkloadConfig::default()
        };
        let (mut ctx, script) = context(settings.clone());
        setup(&mut ctx).unwrap();
        script.always("account_type", Outcome::error("42000", 1064));

        let mut engine = Engine::new(&settings, ChaCha8Rng::seed_from_u64(1));
        let termination = run_workload(
            &mut ctx,
            &mut engine,
            &LoggingConfig::default(),
            &CancelToken::new(),
            Instant::now(),
        )
        .await;
        assert_eq!(termination, Termination::TransactionFailed);
        assert_eq!(script.executions("account_type"), 1);
    }

    #[test]
    fn test_time_limit() {
        let settings = WorkloadConfig {
            duration_secs: Some(5),
            ..WorkloadConfig::default()
        };
        let (ctx, _script) = context(settings);
        let cancel = CancelToken::new();
        assert_eq!(should_terminate(&ctx, &cancel, Instant::now()), None);

        let Some(started) = Instant::now().checked_sub(Duration::from_secs(6)) else {
            return;
        };
        assert_eq!(should_terminate(&ctx, &cancel, started), Some(Termination::TimeLimit));
    }

    #[test]
    fn test_interval_report_resets_counters() {
        let (mut ctx, _script) = context(WorkloadConfig::default());
        ctx.stats.record_success(TxnKind::Query, 0);
        let logging = LoggingConfig {
            verbosity: Verbosity::Verbose,
            ..LoggingConfig::default()
        };
        let mut reporter = IntervalReporter::new(&logging);
        reporter.maybe_report(&mut ctx);
        assert_eq!(ctx.stats.interval.executed, 1);

        let Some(earlier) = reporter.last.checked_sub(reporter.interval) else {
            return;
        };
        reporter.last = earlier;
        reporter.maybe_report(&mut ctx);
        assert_eq!(ctx.stats.interval.executed, 0);
        assert_eq!(ctx.stats.total.executed, 1);
    }

    #[tokio::test]
    async fn test_complete_run() {
        let config = ConfigBuilder::new()
            .dsn("grid1:4000/sampledb")
            .num_transactions(25)
            .build();
        let (conn, script) = sample_database();
        let mut seen = None;
        let status = run_with(
            &config,
            Some("secret".into()),
            &CancelToken::new(),
            |options| {
                seen = Some(options.clone());
                Ok(conn)
            },
            ChaCha8Rng::seed_from_u64(5),
        )
        .await
        .unwrap();

        assert_eq!(status, Termination::TransactionLimit);
        let options = seen.unwrap();
        assert_eq!(options.target, "grid1:4000/sampledb");
        assert_eq!(options.user, "appuser");
        assert_eq!(options.password.as_deref(), Some("secret"));
        assert_eq!(options.connection_name, "GridSample");
        assert_eq!(script.executions("TRUNCATE TABLE transactions"), 1);
        assert!(script.disconnected());
        assert_eq!(script.live_statements(), 0);
    }

    #[tokio::test]
    async fn test_failed_transaction_still_completes_run() {
        let config = ConfigBuilder::new()
            .txn_mix(TxnMix::new(100, 0, 0, 0, 0).unwrap())
            .build();
        let (conn, script) = sample_database();
        script.always("account_type", Outcome::error("42000", 1064));
        let termination = run_with(&config, None, &CancelToken::new(), |_| Ok(conn), ChaCha8Rng::seed_from_u64(5))
            .await
            .unwrap();
        assert_eq!(termination, Termination::TransactionFailed);
        assert!(script.disconnected());
    }

    #[tokio::test]
    async fn test_failed_truncate_is_fatal() {
        let config = ConfigBuilder::new().build();
        let (conn, script) = sample_database();
        script.always("TRUNCATE TABLE transactions", Outcome::error("42S02", 1146));
        let result = run_with(&config, None, &CancelToken::new(), |_| Ok(conn), ChaCha8Rng::seed_from_u64(5)).await;
        let err = result.unwrap_err();
        assert_eq!(err.exit_status(), crate::errors::ExitStatus::Error);
        assert!(script.disconnected());
        assert_eq!(script.executions("account_type"), 0);
    }

    #[tokio::test]
    async fn test_interrupt_during_startup() {
        let config = ConfigBuilder::new().cleanup(false).build();
        let (conn, script) = sample_database();
        let cancel = CancelToken::new();
        cancel.cancel();
        let result = run_with(&config, None, &cancel, |_| Ok(conn), ChaCha8Rng::seed_from_u64(5)).await;
        assert!(matches!(result, Err(GridError::Interrupted)));
        assert!(script.disconnected());
        assert_eq!(script.executions("account_type"), 0);
    }

    #[tokio::test]
    async fn test_connect_failure_is_returned() {
        let config = AppConfig::default();
        let result = run_with(
            &config,
            None,
            &CancelToken::new(),
            |_| Err(GridError::from(crate::driver::scripted::driver_error("08001", 2003))),
            ChaCha8Rng::seed_from_u64(5),
        )
        .await;
        assert!(matches!(result, Err(GridError::Driver(_))));
    }
}
