//! Liquidation sweep
//!
//! A debtor is flagged when they owe something and their collateral ratio
//! has fallen below `1000 + interest rate + liquidation penalty`. Flagged
//! debtors lose their entire vault to the seizure destination and have
//! their debt ledger erased; they stay in the all-debtors registry.

use tracing::{debug, info, warn};

use crate::engine::{Journal, LendingEngine};
use crate::error::EngineResult;
use crate::events::{EngineEvent, LiquidationRecord};
use crate::types::{AccountId, Timestamp, TokenBalance};

impl LendingEngine {
    pub fn is_below_liquidation_threshold(&self, user: &AccountId) -> EngineResult<bool> {
        self.below_threshold_at(user, self.clock.now())
    }

    /// All debtors currently eligible for liquidation, first-join order
    pub fn debtors_below_threshold(&self) -> EngineResult<Vec<AccountId>> {
        let now = self.clock.now();
        let mut flagged = Vec::new();
        for user in self.state.debtors.all() {
            if self.flagged_at(user, now) {
                flagged.push(user.clone());
            }
        }
        Ok(flagged)
    }

    /// Liquidates every flagged debtor in one atomic sweep.
    ///
    /// Each debtor is re-evaluated against the state left by the earlier
    /// liquidations of the same sweep. Running it again without new
    /// deposits or loans liquidates nobody. A debtor that cannot be
    /// evaluated is skipped; a failed seizure aborts the whole sweep.
    pub fn liquidate_all(&mut self, caller: &AccountId) -> EngineResult<Vec<LiquidationRecord>> {
        self.transact("liquidate_all", |engine, journal| {
            engine.ensure_admin(caller)?;
            let now = engine.clock.now();
            let debtors = engine.state.debtors.all().to_vec();

            let mut records = Vec::new();
            for user in &debtors {
                if engine.flagged_at(user, now) {
                    records.push(engine.liquidate_user(user, now, journal)?);
                }
            }

            info!(
                scanned = debtors.len(),
                liquidated = records.len(),
                threshold = engine.liquidation_threshold(),
                "Liquidation sweep complete"
            );
            Ok(records)
        })
    }

    /// Scan-side check: a debtor whose position cannot be evaluated is
    /// logged and skipped so the rest of the scan still runs
    fn flagged_at(&self, user: &AccountId, now: Timestamp) -> bool {
        match self.below_threshold_at(user, now) {
            Ok(below) => below,
            Err(err) => {
                warn!(user = %user, error = %err, kind = ?err.kind(), "Skipping debtor that cannot be evaluated");
                false
            }
        }
    }

    fn below_threshold_at(&self, user: &AccountId, now: Timestamp) -> EngineResult<bool> {
        let debt = self.breakdown_at(user, now)?.total()?;
        if debt == 0 {
            return Ok(false);
        }

        let ratio = self.calculator().collateral_ratio(user, debt)?;
        let threshold = self.state.params.liquidation_threshold_tenth_perc();
        let below = ratio.is_below(threshold);
        debug!(user = %user, debt, ratio = ?ratio, threshold, below, "Checked liquidation threshold");
        Ok(below)
    }

    fn liquidate_user(&mut self, user: &AccountId, now: Timestamp, journal: &mut Journal) -> EngineResult<LiquidationRecord> {
        let debt_erased = self.breakdown_at(user, now)?.total()?;
        let destination = self.state.seizure_destination.clone();

        let held = self.state.vault.clear(user);
        let mut seized = Vec::with_capacity(held.len());
        for (token_id, amount) in held {
            let adapter = self.state.registry.get(&token_id)?;
            let token = adapter.token().clone();
            let symbol = adapter.symbol().to_string();

            journal.transfer(&token, &self.custody, &destination, amount)?;
            seized.push(TokenBalance {
                token: token_id,
                symbol,
                amount,
            });
        }

        if let Some(ledger) = self.state.debts.get_mut(user) {
            ledger.clear();
        }
        self.events.push(EngineEvent::LiquidatedUser { user: user.clone() });

        warn!(
            user = %user,
            debt_erased,
            tokens = seized.len(),
            destination = %destination,
            "Debtor liquidated"
        );

        Ok(LiquidationRecord {
            user: user.clone(),
            seized,
            debt_erased,
            timestamp: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::TokenAdapter;
    use crate::clock::ManualClock;
    use crate::engine::EngineSettings;
    use crate::error::EngineError;
    use crate::oracle::InMemoryOracle;
    use crate::token::{FungibleToken, InMemoryToken};
    use std::sync::Arc;

    const USD: u128 = 100_000_000;

    #[test]
    fn test_sweep_requires_admin() {
        let stable = Arc::new(InMemoryToken::new("0xstable", "CUSD", 18));
        let mut engine = LendingEngine::new(
            EngineSettings::new("admin", "custody", "treasury"),
            stable,
            Arc::new(ManualClock::new(0)),
        )
        .unwrap();

        let err = engine.liquidate_all(&AccountId::from("mallory")).unwrap_err();
        assert_eq!(err, EngineError::Unauthorized(AccountId::from("mallory")));
        assert!(engine.liquidate_all(&AccountId::from("admin")).unwrap().is_empty());
    }

    #[test]
    fn test_price_drop_flags_and_liquidates() {
        let admin = AccountId::from("admin");
        let alice = AccountId::from("alice");
        let stable = Arc::new(InMemoryToken::new("0xstable", "CUSD", 18));
        let usdt = Arc::new(InMemoryToken::new("0xusdt", "USDT", 18));
        let oracle = Arc::new(InMemoryOracle::new("dia", 8));
        oracle.set_value("USDT/USD", USD, 0);

        let mut engine = LendingEngine::new(
            EngineSettings::new("admin", "custody", "treasury"),
            stable,
            Arc::new(ManualClock::new(0)),
        )
        .unwrap();
        engine
            .register_adapter(&admin, TokenAdapter::bind(usdt.clone(), oracle.clone()).unwrap())
            .unwrap();
        usdt.mint(&alice, 150).unwrap();
        engine.deposit_and_borrow(&alice, usdt.id(), 150, 100).unwrap();

        oracle.set_value("USDT/USD", 80_000_000, 1);
        assert!(!engine.is_below_liquidation_threshold(&alice).unwrap());

        oracle.set_value("USDT/USD", 79_990_000, 2);
        assert!(engine.is_below_liquidation_threshold(&alice).unwrap());

        let records = engine.liquidate_all(&admin).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].debt_erased, 100);
        assert_eq!(records[0].seized[0].amount, 150);
        assert_eq!(usdt.balance_of(&AccountId::from("treasury")), 150);
        assert_eq!(engine.total_debt(&alice).unwrap(), 0);
    }
}
