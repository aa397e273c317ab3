//! Per-user, per-token deposited collateral
//!
//! Pure bookkeeping; token movement and adapter checks happen in the engine.

use std::collections::{BTreeMap, HashMap};

use crate::error::{EngineError, EngineResult};
use crate::types::{AccountId, Amount, TokenId};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollateralVault {
    balances: HashMap<AccountId, BTreeMap<TokenId, Amount>>,
}

impl CollateralVault {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deposit(&mut self, user: &AccountId, token: &TokenId, amount: Amount) -> EngineResult<Amount> {
        let balance = self
            .balances
            .entry(user.clone())
            .or_default()
            .entry(token.clone())
            .or_insert(0);
        *balance = balance
            .checked_add(amount)
            .ok_or(EngineError::ArithmeticOverflow("vault deposit"))?;
        Ok(*balance)
    }

    pub fn withdraw(&mut self, user: &AccountId, token: &TokenId, amount: Amount) -> EngineResult<Amount> {
        let available = self.balance(user, token);
        if amount > available {
            return Err(EngineError::InsufficientBalance {
                token: token.clone(),
                requested: amount,
                available,
            });
        }

        let remaining = available - amount;
        if let Some(tokens) = self.balances.get_mut(user) {
            tokens.insert(token.clone(), remaining);
        }
        Ok(remaining)
    }

    pub fn balance(&self, user: &AccountId, token: &TokenId) -> Amount {
        self.balances
            .get(user)
            .and_then(|tokens| tokens.get(token))
            .copied()
            .unwrap_or(0)
    }

    /// Non-zero holdings of `user`
    pub fn holdings(&self, user: &AccountId) -> Vec<(TokenId, Amount)> {
        self.balances
            .get(user)
            .map(|tokens| {
                tokens
                    .iter()
                    .filter(|(_, amount)| **amount > 0)
                    .map(|(token, &amount)| (token.clone(), amount))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Sum of every user's balance of `token`
    pub fn total_deposited(&self, token: &TokenId) -> Amount {
        self.balances
            .values()
            .filter_map(|tokens| tokens.get(token))
            .sum()
    }

    /// Zeroes every balance of `user` and returns what was held
    pub fn clear(&mut self, user: &AccountId) -> Vec<(TokenId, Amount)> {
        let held = self.holdings(user);
        if let Some(tokens) = self.balances.get_mut(user) {
            tokens.values_mut().for_each(|amount| *amount = 0);
        }
        held
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids() -> (AccountId, TokenId, TokenId) {
        (AccountId::from("alice"), TokenId::from("0xusdc"), TokenId::from("0xdai"))
    }

    #[test]
    fn test_deposit_accumulates() {
        let (alice, usdc, _) = ids();
        let mut vault = CollateralVault::new();
        vault.deposit(&alice, &usdc, 100).unwrap();
        assert_eq!(vault.deposit(&alice, &usdc, 50).unwrap(), 150);
        assert_eq!(vault.balance(&alice, &usdc), 150);
    }

    #[test]
    fn test_withdraw_beyond_balance_rejected() {
        let (alice, usdc, dai) = ids();
        let mut vault = CollateralVault::new();
        vault.deposit(&alice, &usdc, 100).unwrap();

        let err = vault.withdraw(&alice, &usdc, 101).unwrap_err();
        assert_eq!(
            err,
            EngineError::InsufficientBalance {
                token: usdc.clone(),
                requested: 101,
                available: 100
            }
        );
        assert!(vault.withdraw(&alice, &dai, 1).is_err());
        assert_eq!(vault.withdraw(&alice, &usdc, 100).unwrap(), 0);
    }

    #[test]
    fn test_clear_returns_holdings() {
        let (alice, usdc, dai) = ids();
        let mut vault = CollateralVault::new();
        vault.deposit(&alice, &usdc, 100).unwrap();
        vault.deposit(&alice, &dai, 7).unwrap();
        vault.deposit(&AccountId::from("bob"), &usdc, 5).unwrap();

        let mut seized = vault.clear(&alice);
        seized.sort();
        assert_eq!(seized, vec![(dai.clone(), 7), (usdc.clone(), 100)]);
        assert!(vault.holdings(&alice).is_empty());
        assert_eq!(vault.total_deposited(&usdc), 5);
    }
}
