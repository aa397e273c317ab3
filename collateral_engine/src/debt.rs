//! Per-user debt ledger
//!
//! The ledger is an append-only list of loan/repayment events. Base debt and
//! accrued interest are never stored; they are replayed from the events on
//! every query.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{EngineError, EngineResult};
use crate::interest::InterestCalculator;
use crate::types::{Amount, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebtAction {
    Loan,
    Repayment,
}

/// One immutable ledger entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebtEvent {
    pub action: DebtAction,
    pub amount: Amount,
    pub timestamp: Timestamp,
}

/// Result of replaying a ledger up to some instant
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebtBreakdown {
    pub base: Amount,
    pub interest: Amount,
}

impl DebtBreakdown {
    pub fn total(&self) -> EngineResult<Amount> {
        self.base
            .checked_add(self.interest)
            .ok_or(EngineError::ArithmeticOverflow("total debt"))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebtLedger {
    events: Vec<DebtEvent>,
}

impl DebtLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_loan(&mut self, amount: Amount, timestamp: Timestamp) -> EngineResult<()> {
        self.append(DebtAction::Loan, amount, timestamp)
    }

    pub fn add_repayment(&mut self, amount: Amount, timestamp: Timestamp) -> EngineResult<()> {
        self.append(DebtAction::Repayment, amount, timestamp)
    }

    fn append(&mut self, action: DebtAction, amount: Amount, timestamp: Timestamp) -> EngineResult<()> {
        if amount == 0 {
            return Err(EngineError::ZeroAmount);
        }
        if let Some(last) = self.last_timestamp() {
            if timestamp < last {
                return Err(EngineError::TimestampRegression { timestamp, last });
            }
        }

        self.events.push(DebtEvent {
            action,
            amount,
            timestamp,
        });
        Ok(())
    }

    pub fn events(&self) -> &[DebtEvent] {
        &self.events
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn last_timestamp(&self) -> Option<Timestamp> {
        self.events.last().map(|event| event.timestamp)
    }

    /// Erases the whole history (liquidation)
    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Replays every event plus a trailing boundary at `as_of`.
    ///
    /// Repayments pay accrued interest first; only the remainder reduces the
    /// base, and the base never goes below zero.
    pub fn calculate_base_and_interest(
        &self,
        calculator: &InterestCalculator,
        as_of: Timestamp,
    ) -> EngineResult<DebtBreakdown> {
        let mut base: Amount = 0;
        let mut interest: Amount = 0;
        let mut last_ts = self.events.first().map(|e| e.timestamp).unwrap_or(as_of);

        for event in &self.events {
            let accrued = calculator.accrue(base, elapsed(last_ts, event.timestamp))?;
            interest = interest
                .checked_add(accrued)
                .ok_or(EngineError::ArithmeticOverflow("interest replay"))?;
            last_ts = event.timestamp;

            match event.action {
                DebtAction::Loan => {
                    base = base
                        .checked_add(event.amount)
                        .ok_or(EngineError::ArithmeticOverflow("base debt replay"))?;
                }
                DebtAction::Repayment => {
                    let interest_paid = event.amount.min(interest);
                    interest -= interest_paid;
                    let remainder = event.amount - interest_paid;
                    base -= remainder.min(base);
                }
            }
        }

        let accrued = calculator.accrue(base, elapsed(last_ts, as_of))?;
        interest = interest
            .checked_add(accrued)
            .ok_or(EngineError::ArithmeticOverflow("interest replay"))?;

        debug!(events = self.events.len(), base, interest, as_of, "Replayed debt ledger");

        Ok(DebtBreakdown { base, interest })
    }
}

fn elapsed(from: Timestamp, to: Timestamp) -> u64 {
    to.saturating_sub(from).max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interest::SECONDS_PER_YEAR;
    use proptest::prelude::*;

    const MONTH: i64 = 30 * 24 * 3600;
    const YEAR: i64 = SECONDS_PER_YEAR as i64;

    fn six_percent() -> InterestCalculator {
        InterestCalculator::with_default_bound(60).unwrap()
    }

    #[test]
    fn test_single_loan_accrues_for_a_year() {
        let mut ledger = DebtLedger::new();
        ledger.add_loan(100, 0).unwrap();

        let debt = ledger.calculate_base_and_interest(&six_percent(), YEAR).unwrap();
        assert_eq!(debt, DebtBreakdown { base: 100, interest: 6 });
        assert_eq!(debt.total().unwrap(), 106);
    }

    #[test]
    fn test_records_events_in_order() {
        let mut ledger = DebtLedger::new();
        ledger.add_loan(100, 0).unwrap();
        ledger.add_loan(200, MONTH).unwrap();
        ledger.add_repayment(50, 2 * MONTH).unwrap();

        let actions: Vec<_> = ledger.events().iter().map(|e| (e.action, e.amount)).collect();
        assert_eq!(
            actions,
            vec![
                (DebtAction::Loan, 100),
                (DebtAction::Loan, 200),
                (DebtAction::Repayment, 50)
            ]
        );
    }

    #[test]
    fn test_repayment_pays_interest_before_base() {
        // 100 @ 0, 200 @ 1m, 300 @ 2m, repay 200 @ 3m, query after a year
        let mut ledger = DebtLedger::new();
        ledger.add_loan(100, 0).unwrap();
        ledger.add_loan(200, MONTH).unwrap();
        ledger.add_loan(300, 2 * MONTH).unwrap();
        ledger.add_repayment(200, 3 * MONTH).unwrap();

        let debt = ledger.calculate_base_and_interest(&six_percent(), YEAR).unwrap();

        // 0 + 1 + 2 interest before the repayment, so the base only drops by 197
        assert_eq!(debt.base, 403);
        assert!(debt.base > 400);
        assert!(debt.interest > 0);
        assert!(debt.total().unwrap() > 400);
    }

    #[test]
    fn test_excess_repayment_floors_base_at_zero() {
        let mut ledger = DebtLedger::new();
        ledger.add_loan(100, 0).unwrap();
        ledger.add_repayment(500, 10).unwrap();

        let debt = ledger.calculate_base_and_interest(&six_percent(), 10).unwrap();
        assert_eq!(debt, DebtBreakdown::default());
    }

    #[test]
    fn test_rejects_backward_timestamps_and_zero_amounts() {
        let mut ledger = DebtLedger::new();
        ledger.add_loan(100, 50).unwrap();

        assert_eq!(
            ledger.add_loan(10, 49).unwrap_err(),
            EngineError::TimestampRegression { timestamp: 49, last: 50 }
        );
        assert_eq!(ledger.add_repayment(0, 60).unwrap_err(), EngineError::ZeroAmount);
        assert_eq!(ledger.events().len(), 1);
    }

    #[test]
    fn test_empty_ledger_and_clear() {
        let mut ledger = DebtLedger::new();
        let debt = ledger.calculate_base_and_interest(&six_percent(), YEAR).unwrap();
        assert_eq!(debt.total().unwrap(), 0);

        ledger.add_loan(100, 0).unwrap();
        ledger.clear();
        assert!(ledger.is_empty());
        assert_eq!(ledger.calculate_base_and_interest(&six_percent(), YEAR).unwrap().total().unwrap(), 0);
    }

    #[test]
    fn test_query_before_last_event_adds_nothing() {
        let mut ledger = DebtLedger::new();
        ledger.add_loan(1_000, 100).unwrap();

        let debt = ledger.calculate_base_and_interest(&six_percent(), 0).unwrap();
        assert_eq!(debt, DebtBreakdown { base: 1_000, interest: 0 });
    }

    fn event_strategy() -> impl Strategy<Value = Vec<(bool, u64, u32)>> {
        prop::collection::vec((any::<bool>(), 1u64..1_000_000, 0u32..10_000_000), 1..20)
    }

    proptest! {
        #[test]
        fn prop_interest_paid_before_base(
            loan in 1u64..1_000_000_000,
            hold in 1u32..100_000_000,
            rate in 1u64..1000,
            fraction in 1u64..100,
        ) {
            let calc = InterestCalculator::with_default_bound(rate).unwrap();
            let mut ledger = DebtLedger::new();
            ledger.add_loan(loan as u128, 0).unwrap();

            let before = ledger.calculate_base_and_interest(&calc, hold as i64).unwrap();
            prop_assume!(before.interest > 0);

            let repay = (before.interest * fraction as u128 / 100).max(1);
            ledger.add_repayment(repay, hold as i64).unwrap();

            let after = ledger.calculate_base_and_interest(&calc, hold as i64).unwrap();
            prop_assert_eq!(after.base, before.base);
            prop_assert_eq!(after.interest, before.interest - repay);
        }

        #[test]
        fn prop_total_debt_grows_between_events(
            events in event_strategy(),
            rate in 0u64..1000,
        ) {
            let calc = InterestCalculator::with_default_bound(rate).unwrap();
            let mut ledger = DebtLedger::new();
            let mut now: i64 = 0;
            let mut previous = 0u128;

            for (is_loan, amount, gap) in events {
                now += gap as i64;
                let current = ledger.calculate_base_and_interest(&calc, now).unwrap().total().unwrap();
                prop_assert!(current >= previous);

                if is_loan {
                    ledger.add_loan(amount as u128, now).unwrap();
                    let after = ledger.calculate_base_and_interest(&calc, now).unwrap().total().unwrap();
                    prop_assert_eq!(after, current + amount as u128);
                } else {
                    ledger.add_repayment(amount as u128, now).unwrap();
                }
                previous = ledger.calculate_base_and_interest(&calc, now).unwrap().total().unwrap();
            }
        }
    }
}
