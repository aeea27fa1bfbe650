//! # Execution engine
//!
//! Runs one workload transaction per call: pick a type from the mix, supply
//! random inputs, then drive the descriptor through execute, fetch and close
//! while recovering from retryable and failover errors.
//!
//! Each attempt walks the steps
//!
//! ```text
//! [Reprepare] -> Execute -> [Fetch]* -> [Close] -> Done
//! ```
//!
//! where `Reprepare` only runs after a failover and `Fetch`/`Close` only for
//! transactions that return rows. The retry and failover budgets are
//! independent; running out of either ends the transaction.

use std::fmt;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, info, trace};

use crate::config::WorkloadConfig;
use crate::context::WorkloadContext;
use crate::errors::{GridError, TxnError, TxnResult};
use crate::logging::report_error;
use crate::mix::{InputGenerator, TxnMix};
use crate::txn::{Fetched, TxnInputs, TxnKind};

/// Step of a single attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Reprepare,
    Execute,
    Fetch,
    Close,
    Done,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Reprepare => write!(f, "Re-preparing"),
            Step::Execute => write!(f, "Executing"),
            Step::Fetch => write!(f, "Fetching"),
            Step::Close => write!(f, "Closing"),
            Step::Done => write!(f, "Done"),
        }
    }
}

/// How a logical transaction ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnOutcome {
    Committed(TxnKind),
    Failed(TxnKind),
    Exhausted(TxnKind),
}

impl TxnOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TxnOutcome::Committed(_))
    }
}

/// Per-transaction recovery budgets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Budget {
    pub retries: u32,
    pub failovers: u32,
}

impl Budget {
    fn has_remaining(&self) -> bool {
        self.retries > 0 && self.failovers > 0
    }
}

pub struct Engine<R> {
    rng: R,
    mix: TxnMix,
    inputs: InputGenerator,
    budget: Budget,
}

impl<R: Rng> Engine<R> {
    pub fn new(settings: &WorkloadConfig, rng: R) -> Self {
        Self {
            rng,
            mix: settings.txn_mix,
            inputs: InputGenerator::new(settings.charge_min, settings.charge_max, settings.topup_amount),
            budget: Budget {
                retries: settings.retry_limit,
                failovers: settings.failover_limit,
            },
        }
    }

    /// Select, parameterize and execute one transaction
    pub async fn execute_next(&mut self, ctx: &mut WorkloadContext) -> TxnOutcome {
        let kind = self.mix.choose(&mut self.rng);
        let inputs = self.inputs.inputs(kind, &ctx.key_ranges, &mut self.rng);
        execute_with_recovery(ctx, kind, &inputs, self.budget).await
    }
}

/// Execute `kind` until it succeeds, fails fatally or exhausts a budget
pub async fn execute_with_recovery(
    ctx: &mut WorkloadContext,
    kind: TxnKind,
    inputs: &TxnInputs,
    mut budget: Budget,
) -> TxnOutcome {
    match ctx.txns.get_mut(kind) {
        Some(txn) => txn.set_inputs(inputs),
        None => {
            report_error(&format!("Transaction {kind}"), &not_registered(kind));
            info!("*** Transaction {kind} failed");
            return TxnOutcome::Failed(kind);
        }
    }

    let mut needs_reprepare = false;
    while budget.has_remaining() {
        match attempt(ctx, kind, &mut needs_reprepare) {
            Ok(()) => {
                record_success(ctx, kind);
                return TxnOutcome::Committed(kind);
            }
            Err(TxnError::Retryable { delay }) => {
                ctx.stats.record_retry();
                budget.retries -= 1;
                if budget.retries > 0 {
                    debug!("RETRY: {kind} (retries={})", ctx.stats.total.retries);
                    pause(delay).await;
                }
            }
            Err(TxnError::Failover { delay }) => {
                ctx.stats.record_failover();
                needs_reprepare = true;
                budget.failovers -= 1;
                if budget.failovers > 0 {
                    debug!("FAILOVER: {kind} (failovers={})", ctx.stats.total.failovers);
                    pause(delay).await;
                }
            }
            Err(TxnError::Fatal(e)) => {
                report_error(&format!("Transaction {kind}"), &e);
                info!("*** Transaction {kind} failed");
                return TxnOutcome::Failed(kind);
            }
        }
    }

    info!("*** Transaction {kind} retries exhausted");
    TxnOutcome::Exhausted(kind)
}

async fn pause(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

fn not_registered(kind: TxnKind) -> GridError {
    GridError::InvalidState(format!("{kind} is not registered"))
}

/// One pass through the attempt steps
fn attempt(ctx: &mut WorkloadContext, kind: TxnKind, needs_reprepare: &mut bool) -> TxnResult<()> {
    let mut step = if *needs_reprepare { Step::Reprepare } else { Step::Execute };
    loop {
        trace!("{kind}: {step}");
        step = match step {
            Step::Reprepare => {
                reprepare(ctx)?;
                *needs_reprepare = false;
                info!(
                    "Failover from element {} to element {}",
                    ctx.topology.previous_element, ctx.topology.current_element
                );
                Step::Execute
            }
            Step::Execute => {
                let (txns, mut env) = ctx.split();
                let txn = txns.get_mut(kind).ok_or_else(|| not_registered(kind))?;
                txn.execute(&mut env)?;
                if txn.returns_rows() { Step::Fetch } else { Step::Done }
            }
            Step::Fetch => {
                let (txns, mut env) = ctx.split();
                let txn = txns.get_mut(kind).ok_or_else(|| not_registered(kind))?;
                match txn.fetch(&mut env)? {
                    Fetched::Row => Step::Fetch,
                    Fetched::NoData => Step::Close,
                }
            }
            Step::Close => {
                let (txns, mut env) = ctx.split();
                let txn = txns.get_mut(kind).ok_or_else(|| not_registered(kind))?;
                txn.close(&mut env)?;
                Step::Done
            }
            Step::Done => return Ok(()),
        };
    }
}

/// Re-prepare every registered descriptor on the new element, then refresh
/// the element tracking
fn reprepare(ctx: &mut WorkloadContext) -> TxnResult<()> {
    let (txns, mut env) = ctx.split();
    txns.init_all(env.conn)?;
    txns.get_mut(TxnKind::UpdateGridInfo)
        .ok_or_else(|| not_registered(TxnKind::UpdateGridInfo))?
        .execute(&mut env)
}

fn record_success(ctx: &mut WorkloadContext, kind: TxnKind) {
    let deleted = match (kind, ctx.txns.get_mut(kind)) {
        (TxnKind::Purge, Some(txn)) => txn.rowcount().unwrap_or(0),
        _ => 0,
    };
    ctx.stats.record_success(kind, deleted);
}
