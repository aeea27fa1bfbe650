//! # Error Classification
//!
//! Maps the diagnostic stack of a failed driver call onto a recovery category.
//! A rule set holds two static tables, retryable and failover; the first rule
//! matching any record decides the outcome.

use std::time::Duration;

use crate::errors::{ErrorRecord, ErrorStack};

/// Default delay before reissuing a retryable operation
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(0);
/// Default delay before re-preparing after a failover
pub const DEFAULT_FAILOVER_DELAY: Duration = Duration::from_millis(25);

/// Matches the SQL state of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatePattern {
    Any,
    Exact(&'static str),
}

/// Matches the native code of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativePattern {
    Any,
    Exact(i32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassificationRule {
    pub state: StatePattern,
    pub native: NativePattern,
    pub delay: Duration,
}

impl ClassificationRule {
    pub const fn new(state: StatePattern, native: NativePattern, delay: Duration) -> Self {
        Self {
            state,
            native,
            delay,
        }
    }

    pub fn matches(&self, record: &ErrorRecord) -> bool {
        let state_ok = match self.state {
            StatePattern::Any => true,
            StatePattern::Exact(state) => record.state == state,
        };
        let native_ok = match self.native {
            NativePattern::Any => true,
            NativePattern::Exact(native) => record.native == native,
        };
        state_ok && native_ok
    }
}

/// Recovery category for a failed call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Retryable(Duration),
    Failover(Duration),
    Fatal,
}

/// Pair of retryable and failover rule tables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleSet {
    pub name: &'static str,
    pub retryable: &'static [ClassificationRule],
    pub failover: &'static [ClassificationRule],
}

const TT_ERR_NATIVE_DEADLOCK: i32 = 6002;
const TT_ERR_NATIVE_LOCKTIMEOUT: i32 = 6003;
const TT_ERR_NATIVE_FAILOVER: i32 = 47137;

static GRID_RETRYABLE: [ClassificationRule; 3] = [
    ClassificationRule::new(StatePattern::Exact("TT005"), NativePattern::Any, DEFAULT_RETRY_DELAY),
    ClassificationRule::new(
        StatePattern::Any,
        NativePattern::Exact(TT_ERR_NATIVE_DEADLOCK),
        DEFAULT_RETRY_DELAY,
    ),
    ClassificationRule::new(
        StatePattern::Any,
        NativePattern::Exact(TT_ERR_NATIVE_LOCKTIMEOUT),
        DEFAULT_RETRY_DELAY,
    ),
];

static GRID_FAILOVER: [ClassificationRule; 2] = [
    ClassificationRule::new(
        StatePattern::Any,
        NativePattern::Exact(TT_ERR_NATIVE_FAILOVER),
        DEFAULT_FAILOVER_DELAY,
    ),
    ClassificationRule::new(StatePattern::Exact("S1000"), NativePattern::Any, DEFAULT_FAILOVER_DELAY),
];

// MySQL and TiDB signatures
const ER_LOCK_WAIT_TIMEOUT: i32 = 1205;
const ER_LOCK_DEADLOCK: i32 = 1213;
const TIDB_ERR_LOCK_CONFLICT: i32 = 8002;
const TIDB_ERR_TXN_RETRYABLE: i32 = 8022;
const TIDB_ERR_WRITE_CONFLICT: i32 = 9007;
const CR_SERVER_GONE_ERROR: i32 = 2006;
const CR_SERVER_LOST: i32 = 2013;

static MYSQL_RETRYABLE: [ClassificationRule; 6] = [
    ClassificationRule::new(StatePattern::Exact("40001"), NativePattern::Any, DEFAULT_RETRY_DELAY),
    ClassificationRule::new(StatePattern::Any, NativePattern::Exact(ER_LOCK_DEADLOCK), DEFAULT_RETRY_DELAY),
    ClassificationRule::new(StatePattern::Any, NativePattern::Exact(ER_LOCK_WAIT_TIMEOUT), DEFAULT_RETRY_DELAY),
    ClassificationRule::new(StatePattern::Any, NativePattern::Exact(TIDB_ERR_LOCK_CONFLICT), DEFAULT_RETRY_DELAY),
    ClassificationRule::new(StatePattern::Any, NativePattern::Exact(TIDB_ERR_TXN_RETRYABLE), DEFAULT_RETRY_DELAY),
    ClassificationRule::new(StatePattern::Any, NativePattern::Exact(TIDB_ERR_WRITE_CONFLICT), DEFAULT_RETRY_DELAY),
];

static MYSQL_FAILOVER: [ClassificationRule; 3] = [
    ClassificationRule::new(StatePattern::Exact("08S01"), NativePattern::Any, DEFAULT_FAILOVER_DELAY),
    ClassificationRule::new(StatePattern::Any, NativePattern::Exact(CR_SERVER_GONE_ERROR), DEFAULT_FAILOVER_DELAY),
    ClassificationRule::new(StatePattern::Any, NativePattern::Exact(CR_SERVER_LOST), DEFAULT_FAILOVER_DELAY),
];

/// TimesTen Scaleout signatures
pub static GRID_RULES: RuleSet = RuleSet {
    name: "grid",
    retryable: &GRID_RETRYABLE,
    failover: &GRID_FAILOVER,
};

/// MySQL protocol signatures, including TiDB's optimistic-transaction conflicts
pub static MYSQL_RULES: RuleSet = RuleSet {
    name: "mysql",
    retryable: &MYSQL_RETRYABLE,
    failover: &MYSQL_FAILOVER,
};

impl Default for RuleSet {
    fn default() -> Self {
        GRID_RULES
    }
}

impl RuleSet {
    /// Classify a diagnostic stack.
    ///
    /// Records are scanned front to back. Each record is tested against the
    /// retryable table before the failover table, and the first rule that
    /// matches decides the category and delay.
    pub fn classify(&self, stack: &ErrorStack) -> Classification {
        for record in stack.records() {
            if let Some(rule) = self.retryable.iter().find(|rule| rule.matches(record)) {
                return Classification::Retryable(rule.delay);
            }
            if let Some(rule) = self.failover.iter().find(|rule| rule.matches(record)) {
                return Classification::Failover(rule.delay);
            }
        }
        Classification::Fatal
    }
}

/// Classify against the default grid rule set
pub fn classify(stack: &ErrorStack) -> Classification {
    GRID_RULES.classify(stack)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stack(records: &[(&str, i32)]) -> ErrorStack {
        records
            .iter()
            .map(|(state, native)| ErrorRecord::new(*state, *native, "test"))
            .collect()
    }

    #[test]
    fn test_deadlock_under_general_state_is_retryable() {
        let result = classify(&stack(&[("S1000", 6002)]));
        assert_eq!(result, Classification::Retryable(DEFAULT_RETRY_DELAY));
    }

    #[test]
    fn test_lock_timeout_and_tt005_are_retryable() {
        assert_eq!(
            classify(&stack(&[("HY000", 6003)])),
            Classification::Retryable(Duration::ZERO)
        );
        assert_eq!(
            classify(&stack(&[("TT005", 12345)])),
            Classification::Retryable(Duration::ZERO)
        );
    }

    #[test]
    fn test_failover_signatures() {
        assert_eq!(
            classify(&stack(&[("08006", 47137)])),
            Classification::Failover(Duration::from_millis(25))
        );
        assert_eq!(
            classify(&stack(&[("S1000", 999)])),
            Classification::Failover(DEFAULT_FAILOVER_DELAY)
        );
    }

    #[test]
    fn test_match_found_beyond_first_record() {
        let result = classify(&stack(&[("42000", 1001), ("HY000", 6003)]));
        assert_eq!(result, Classification::Retryable(Duration::ZERO));
    }

    #[test]
    fn test_records_scanned_in_order() {
        // failover signature first, retryable second
        let result = classify(&stack(&[("08006", 47137), ("TT005", 0)]));
        assert_eq!(result, Classification::Failover(DEFAULT_FAILOVER_DELAY));
    }

    #[test]
    fn test_unmatched_and_empty_stacks_are_fatal() {
        assert_eq!(classify(&stack(&[("42S02", 2206)])), Classification::Fatal);
        assert_eq!(classify(&ErrorStack::new()), Classification::Fatal);
    }

    #[test]
    fn test_classification_is_deterministic() {
        let s = stack(&[("S1000", 47137), ("TT005", 6002)]);
        let first = classify(&s);
        for _ in 0..10 {
            assert_eq!(classify(&s), first);
        }
    }

    #[test]
    fn test_mysql_rules() {
        assert_eq!(
            MYSQL_RULES.classify(&stack(&[("40001", 1213)])),
            Classification::Retryable(Duration::ZERO)
        );
        assert_eq!(
            MYSQL_RULES.classify(&stack(&[("HY000", 9007)])),
            Classification::Retryable(Duration::ZERO)
        );
        assert_eq!(
            MYSQL_RULES.classify(&stack(&[("08S01", 2013)])),
            Classification::Failover(DEFAULT_FAILOVER_DELAY)
        );
        assert_eq!(
            MYSQL_RULES.classify(&stack(&[("42S02", 1146)])),
            Classification::Fatal
        );
    }

    #[test]
    fn test_rule_wildcards() {
        let any = ClassificationRule::new(StatePattern::Any, NativePattern::Any, Duration::ZERO);
        assert!(any.matches(&ErrorRecord::new("", 0, "")));
        let exact = ClassificationRule::new(
            StatePattern::Exact("S1000"),
            NativePattern::Exact(1),
            Duration::ZERO,
        );
        assert!(exact.matches(&ErrorRecord::new("S1000", 1, "")));
        assert!(!exact.matches(&ErrorRecord::new("S1000", 2, "")));
        assert!(!exact.matches(&ErrorRecord::new("S1001", 1, "")));
    }
}
