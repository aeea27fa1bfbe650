use super::balance::BalanceAdjustment;
use super::{Transaction, TxnEnv, TxnInputs, TxnKind};
use crate::driver::Connection;
use crate::errors::TxnResult;

/// Credits a fixed amount to an account
pub struct Topup {
    adjustment: BalanceAdjustment,
}

impl Default for Topup {
    fn default() -> Self {
        Self::new()
    }
}

impl Topup {
    pub fn new() -> Self {
        Self {
            adjustment: BalanceAdjustment::new(TxnKind::Topup, "Account Topup", "T"),
        }
    }

    pub fn amount(&self) -> f64 {
        self.adjustment.amount
    }
}

impl Transaction for Topup {
    fn kind(&self) -> TxnKind {
        TxnKind::Topup
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
    use crate::txn::test_support::Harness;

    #[test]
    fn test_topup_credits_the_requested_account() {
        let mut h = Harness::new();
        let mut txn = Topup::new();
        txn.init(&mut h.conn).unwrap();
        txn.set_inputs(&TxnInputs {
            account_id: 31,
            cust_id: 0,
            adjust_amount: 10.0,
        });
        txn.execute(&mut h.env()).unwrap();

        assert_eq!(txn.amount(), 10.0);
        let executed = h.script.executed();
        assert_eq!(executed[1].1, vec![SqlValue::Double(10.0), SqlValue::BigInt(31)]);
        assert_eq!(executed[2].1[1], SqlValue::Char("Account Topup".into()));
        assert_eq!(executed[2].1[2], SqlValue::Char("T".into()));
        assert_eq!(h.script.commits(), 1);
    }
}
