//! Collateral valuation and ratio math
//!
//! Works on borrowed views of the registry and the vault; total debt is
//! supplied by the caller so the same snapshot drives every figure.

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::params::FULL_RATIO_TENTH_PERC;
use crate::registry::TokenAdapterRegistry;
use crate::types::{mul_div, AccountId, Amount, TenthPerc, TokenBalance};
use crate::vault::CollateralVault;

/// Collateral value over total debt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollateralRatio {
    /// No outstanding debt
    Unbounded,
    TenthPerc(u128),
}

impl CollateralRatio {
    pub fn is_below(&self, floor: TenthPerc) -> bool {
        match self {
            CollateralRatio::Unbounded => false,
            CollateralRatio::TenthPerc(ratio) => *ratio < floor as u128,
        }
    }

    pub fn tenth_perc(&self) -> Option<u128> {
        match self {
            CollateralRatio::Unbounded => None,
            CollateralRatio::TenthPerc(ratio) => Some(*ratio),
        }
    }
}

pub struct CollateralRatioCalculator<'a> {
    registry: &'a TokenAdapterRegistry,
    vault: &'a CollateralVault,
    stable_decimals: u8,
    min_collateral_ratio_tenth_perc: TenthPerc,
}

impl<'a> CollateralRatioCalculator<'a> {
    pub fn new(
        registry: &'a TokenAdapterRegistry,
        vault: &'a CollateralVault,
        stable_decimals: u8,
        min_collateral_ratio_tenth_perc: TenthPerc,
    ) -> Self {
        Self {
            registry,
            vault,
            stable_decimals,
            min_collateral_ratio_tenth_perc,
        }
    }

    /// Sum of each holding's value, each floored on its own
    pub fn collateral_value(&self, user: &AccountId) -> EngineResult<Amount> {
        self.vault
            .holdings(user)
            .iter()
            .try_fold(0u128, |total, (token, amount)| {
                let value = self.registry.get(token)?.price_of(*amount, self.stable_decimals)?;
                total
                    .checked_add(value)
                    .ok_or(EngineError::ArithmeticOverflow("collateral value"))
            })
    }

    pub fn collateral_ratio(&self, user: &AccountId, total_debt: Amount) -> EngineResult<CollateralRatio> {
        if total_debt == 0 {
            return Ok(CollateralRatio::Unbounded);
        }

        let value = self.collateral_value(user)?;
        // A ratio past u128 saturates; it is above every threshold anyway
        let ratio = mul_div(value, FULL_RATIO_TENTH_PERC as u128, total_debt).unwrap_or(u128::MAX);
        Ok(CollateralRatio::TenthPerc(ratio))
    }

    /// Rejects with a solvency error when the ratio is below the minimum
    pub fn ensure_safe(&self, user: &AccountId, total_debt: Amount) -> EngineResult<()> {
        match self.collateral_ratio(user, total_debt)? {
            CollateralRatio::TenthPerc(ratio) if ratio < self.min_collateral_ratio_tenth_perc as u128 => {
                Err(EngineError::UnsafeCollateralRatio {
                    ratio,
                    minimum: self.min_collateral_ratio_tenth_perc,
                })
            }
            _ => Ok(()),
        }
    }

    /// `max(0, value × 1000 / minCR − debt)`
    pub fn max_borrow(&self, user: &AccountId, total_debt: Amount) -> EngineResult<Amount> {
        let value = self.collateral_value(user)?;
        let capacity = mul_div(
            value,
            FULL_RATIO_TENTH_PERC as u128,
            self.min_collateral_ratio_tenth_perc as u128,
        )
        .ok_or(EngineError::ArithmeticOverflow("borrow capacity"))?;
        Ok(capacity.saturating_sub(total_debt))
    }

    /// `max(0, value − debt × minCR / 1000)`
    pub fn max_withdraw_value(&self, user: &AccountId, total_debt: Amount) -> EngineResult<Amount> {
        let value = self.collateral_value(user)?;
        let required = mul_div(
            total_debt,
            self.min_collateral_ratio_tenth_perc as u128,
            FULL_RATIO_TENTH_PERC as u128,
        )
        .ok_or(EngineError::ArithmeticOverflow("required collateral"))?;
        Ok(value.saturating_sub(required))
    }

    /// Per registered token: `min(balance, budget in token units)`.
    ///
    /// Every token is measured against the same full budget; withdrawing
    /// one token's cap does not shrink another token's cap here.
    pub fn max_tokens_to_withdraw(&self, user: &AccountId, total_debt: Amount) -> EngineResult<Vec<TokenBalance>> {
        let budget = self.max_withdraw_value(user, total_debt)?;

        self.registry
            .adapters()
            .iter()
            .map(|adapter| {
                let balance = self.vault.balance(user, adapter.token_id());
                let amount = if budget == 0 || balance == 0 {
                    0
                } else {
                    match adapter.amount_for_value(budget, self.stable_decimals)? {
                        Some(cap) => cap.min(balance),
                        None => balance,
                    }
                };

                Ok(TokenBalance {
                    token: adapter.token_id().clone(),
                    symbol: adapter.symbol().to_string(),
                    amount,
                })
            })
            .collect()
    }
}
