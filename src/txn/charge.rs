use super::balance::BalanceAdjustment;
use super::{Transaction, TxnEnv, TxnInputs, TxnKind};
use crate::driver::Connection;
use crate::errors::TxnResult;

/// Debits a call charge from an account
pub struct Charge {
    adjustment: BalanceAdjustment,
}

impl Default for Charge {
    fn default() -> Self {
        Self::new()
    }
}

impl Charge {
    pub fn new() -> Self {
        Self {
            adjustment: BalanceAdjustment::new(TxnKind::Charge, "Call Charge", "C"),
        }
    }

    pub fn amount(&self) -> f64 {
        self.adjustment.amount
    }
}

impl Transaction for Charge {
    fn kind(&self) -> TxnKind {
        TxnKind::Charge
    }

    fn init(&mut self, conn: &mut Connection) -> TxnResult<()> {
        self.adjustment.init(conn)
    }

    fn execute(&mut self, env: &mut TxnEnv<'_>) -> TxnResult<()> {
        self.adjustment.execute(env)
    }

    fn set_inputs(&mut self, inputs: &TxnInputs) {
        self.adjustment.account_id = inputs.account_id;
        self.adjustment.amount = inputs.adjust_amount;
    }

    fn has_open_cursor(&self) -> bool {
        self.adjustment.has_open_cursor()
    }

    fn is_initialized(&self) -> bool {
        self.adjustment.is_initialized()
    }

    fn cleanup(&mut self) {
        self.adjustment.cleanup();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::SqlValue;
    use crate::driver::scripted::Outcome;
    use crate::errors::{GridError, TxnError};
    use crate::txn::test_support::Harness;

    fn inputs() -> TxnInputs {
        TxnInputs {
            account_id: 9,
            cust_id: 0,
            adjust_amount: -0.35,
        }
    }

    #[test]
    fn test_charge_runs_select_update_insert_then_commits() {
        let mut h = Harness::new();
        let mut txn = Charge::new();
        txn.init(&mut h.conn).unwrap();
        txn.set_inputs(&inputs());
        txn.execute(&mut h.env()).unwrap();

        let executed = h.script.executed();
        assert_eq!(executed.len(), 3);
        assert!(executed[0].0.contains("FOR UPDATE"));
        assert_eq!(executed[1].1, vec![SqlValue::Double(-0.35), SqlValue::BigInt(9)]);
        assert_eq!(
            executed[2].1,
            vec![
                SqlValue::BigInt(9),
                SqlValue::Char("Call Charge".into()),
                SqlValue::Char("C".into()),
                SqlValue::Double(-0.35)
            ]
        );
        assert_eq!(h.script.commits(), 1);
        assert!(!txn.has_open_cursor());
    }

    #[test]
    fn test_deadlock_on_update_is_retryable() {
        let mut h = Harness::new();
        h.script.once("UPDATE accounts", Outcome::error("S1000", 6002));
        let mut txn = Charge::new();
        txn.init(&mut h.conn).unwrap();
        txn.set_inputs(&inputs());

        let err = txn.execute(&mut h.env()).unwrap_err();
        assert!(matches!(err, TxnError::Retryable { .. }));
        assert_eq!(h.script.rollbacks(), 1);
        assert_eq!(h.script.commits(), 0);
        assert_eq!(h.script.executions("INSERT INTO transactions"), 0);

        txn.execute(&mut h.env()).unwrap();
        assert_eq!(h.script.commits(), 1);
    }

    #[test]
    fn test_missing_account_is_fatal() {
        let mut h = Harness::new();
        h.script.once("current_balance, prev_balance", Outcome::rows(vec![]));
        let mut txn = Charge::new();
        txn.init(&mut h.conn).unwrap();
        txn.set_inputs(&inputs());
        assert!(matches!(
            txn.execute(&mut h.env()),
            Err(TxnError::Fatal(GridError::NoData(_)))
        ));
        assert!(!txn.has_open_cursor());
    }

    #[test]
    fn test_commit_failover() {
        let mut h = Harness::new();
        h.script.fail_commit(crate::driver::scripted::driver_error("08S01", 47137));
        let mut txn = Charge::new();
        txn.init(&mut h.conn).unwrap();
        assert!(matches!(
            txn.execute(&mut h.env()),
            Err(TxnError::Failover { .. })
        ));
    }

    #[test]
    fn test_reinit_releases_previous_statements() {
        let mut h = Harness::new();
        let mut txn = Charge::new();
        txn.init(&mut h.conn).unwrap();
        txn.init(&mut h.conn).unwrap();
        assert_eq!(h.script.live_statements(), 3);
        txn.cleanup();
        txn.cleanup();
        assert_eq!(h.script.live_statements(), 0);
    }
}
