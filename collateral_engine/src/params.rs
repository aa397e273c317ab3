//! Global risk parameters

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::types::TenthPerc;

/// 100.0% in tenths of a percent
pub const FULL_RATIO_TENTH_PERC: TenthPerc = 1000;

/// All values in tenths of a percent (60 = 6.0%)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskParameters {
    pub annual_interest_rate_tenth_perc: TenthPerc,
    pub min_collateral_ratio_tenth_perc: TenthPerc,
    pub liquidation_penalty_tenth_perc: TenthPerc,
}

impl Default for RiskParameters {
    fn default() -> Self {
        Self {
            annual_interest_rate_tenth_perc: 80,
            min_collateral_ratio_tenth_perc: 1500,
            liquidation_penalty_tenth_perc: 120,
        }
    }
}

impl RiskParameters {
    /// `1000 + interest + penalty`
    pub fn liquidation_threshold_tenth_perc(&self) -> TenthPerc {
        FULL_RATIO_TENTH_PERC
            .saturating_add(self.annual_interest_rate_tenth_perc)
            .saturating_add(self.liquidation_penalty_tenth_perc)
    }

    /// The liquidation threshold must sit strictly below the minimum ratio
    pub fn validate(&self) -> EngineResult<()> {
        let threshold = self.liquidation_threshold_tenth_perc();
        if threshold >= self.min_collateral_ratio_tenth_perc {
            return Err(EngineError::ThresholdNotBelowMinimum {
                threshold,
                min_collateral_ratio: self.min_collateral_ratio_tenth_perc,
            });
        }
        Ok(())
    }

    pub fn with_annual_interest_rate(self, rate: TenthPerc) -> EngineResult<Self> {
        let updated = Self {
            annual_interest_rate_tenth_perc: rate,
            ..self
        };
        updated.validate()?;
        Ok(updated)
    }

    pub fn with_min_collateral_ratio(self, ratio: TenthPerc) -> EngineResult<Self> {
        let updated = Self {
            min_collateral_ratio_tenth_perc: ratio,
            ..self
        };
        updated.validate()?;
        Ok(updated)
    }

    pub fn with_liquidation_penalty(self, penalty: TenthPerc) -> EngineResult<Self> {
        let updated = Self {
            liquidation_penalty_tenth_perc: penalty,
            ..self
        };
        updated.validate()?;
        Ok(updated)
    }
}
