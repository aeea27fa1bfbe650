//! # Transaction mix
//!
//! Percentage profile used to pick the next workload transaction, and the
//! random inputs each pick is executed with.

use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::context::KeyRanges;
use crate::errors::GridError;
use crate::txn::{TxnInputs, TxnKind};

/// Relative frequency of each workload transaction, in percent.
/// Textual form is `A,C,T,Q,P`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxnMix {
    pub authorize: u8,
    pub charge: u8,
    pub topup: u8,
    pub query: u8,
    pub purge: u8,
}

impl Default for TxnMix {
    fn default() -> Self {
        Self {
            authorize: 70,
            charge: 15,
            topup: 5,
            query: 5,
            purge: 5,
        }
    }
}

impl TxnMix {
    pub fn new(authorize: u8, charge: u8, topup: u8, query: u8, purge: u8) -> Result<Self, GridError> {
        let mix = Self {
            authorize,
            charge,
            topup,
            query,
            purge,
        };
        mix.validate()?;
        Ok(mix)
    }

    pub fn validate(&self) -> Result<(), GridError> {
        let parts = [self.authorize, self.charge, self.topup, self.query, self.purge];
        if parts.iter().any(|&p| p > 100) {
            return Err(GridError::Parameter(format!(
                "transaction mix '{self}': each value must be between 0 and 100"
            )));
        }
        let sum: u32 = parts.iter().map(|&p| u32::from(p)).sum();
        if sum != 100 {
            return Err(GridError::Parameter(format!(
                "transaction mix '{self}' must add up to 100, not {sum}"
            )));
        }
        Ok(())
    }

    pub fn percent(&self, kind: TxnKind) -> u8 {
        match kind {
            TxnKind::Authorize => self.authorize,
            TxnKind::Charge => self.charge,
            TxnKind::Topup => self.topup,
            TxnKind::Query => self.query,
            TxnKind::Purge => self.purge,
            _ => 0,
        }
    }

    /// Workload transactions that can be selected
    pub fn enabled(&self) -> Vec<TxnKind> {
        [
            TxnKind::Authorize,
            TxnKind::Charge,
            TxnKind::Topup,
            TxnKind::Query,
            TxnKind::Purge,
        ]
        .into_iter()
        .filter(|&kind| self.percent(kind) > 0)
        .collect()
    }

    /// Pick a transaction with a uniform draw in [0, 100) against the
    /// cumulative thresholds Authorize, Query, Charge, Topup, Purge
    pub fn choose<R: Rng + ?Sized>(&self, rng: &mut R) -> TxnKind {
        let draw: u32 = rng.gen_range(0..100);
        let mut threshold = 0u32;
        for kind in [TxnKind::Authorize, TxnKind::Query, TxnKind::Charge, TxnKind::Topup] {
            threshold += u32::from(self.percent(kind));
            if draw < threshold {
                return kind;
            }
        }
        TxnKind::Purge
    }
}

impl fmt::Display for TxnMix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{},{}",
            self.authorize, self.charge, self.topup, self.query, self.purge
        )
    }
}

impl FromStr for TxnMix {
    type Err = GridError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || GridError::Parameter(format!("invalid transaction mix '{s}', expected A,C,T,Q,P"));
        let parts = s
            .split(',')
            .map(|part| part.trim().parse::<u8>().map_err(|_| invalid()))
            .collect::<Result<Vec<_>, _>>()?;
        match parts.as_slice() {
            &[a, c, t, q, p] => Self::new(a, c, t, q, p),
            _ => Err(invalid()),
        }
    }
}

/// Produces the random inputs for a selected transaction
#[derive(Debug, Clone)]
pub struct InputGenerator {
    charge_cents: RangeInclusive<i64>,
    topup_amount: f64,
}

impl InputGenerator {
    pub fn new(charge_min: f64, charge_max: f64, topup_amount: f64) -> Self {
        let lo = (charge_min * 100.0).round() as i64;
        let hi = (charge_max * 100.0).round() as i64;
        Self {
            charge_cents: lo.min(hi)..=hi.max(lo),
            topup_amount,
        }
    }

    pub fn inputs<R: Rng + ?Sized>(&self, kind: TxnKind, keys: &KeyRanges, rng: &mut R) -> TxnInputs {
        let mut inputs = TxnInputs::default();
        match kind {
            TxnKind::Authorize => inputs.account_id = random_key(rng, keys.min_account_id, keys.max_account_id),
            TxnKind::Query => inputs.cust_id = random_key(rng, keys.min_cust_id, keys.max_cust_id),
            TxnKind::Charge => {
                inputs.account_id = random_key(rng, keys.min_account_id, keys.max_account_id);
                inputs.adjust_amount = -(rng.gen_range(self.charge_cents.clone()) as f64 / 100.0);
            }
            TxnKind::Topup => {
                inputs.account_id = random_key(rng, keys.min_account_id, keys.max_account_id);
                inputs.adjust_amount = self.topup_amount;
            }
            _ => {}
        }
        inputs
    }
}

fn random_key<R: Rng + ?Sized>(rng: &mut R, min: i64, max: i64) -> i64 {
    if max <= min {
        return min;
    }
    rng.gen_range(min..=max)
}
