//! Interest accrual on outstanding debt
//!
//! Simple (non-compounding) interest: `base × rate × elapsed / (1000 × year)`,
//! floored. Accrued interest never earns interest of its own.

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::types::{Amount, TenthPerc};

/// 365 days, leap years ignored
pub const SECONDS_PER_YEAR: u64 = 365 * 24 * 60 * 60;

/// Default upper bound for the annual rate (100.0%)
pub const DEFAULT_MAX_ANNUAL_RATE_TENTH_PERC: TenthPerc = 1000;

/// Interest accrued on `base` over `elapsed_secs` at `rate_tenth_perc` per year
pub fn accrue(base: Amount, rate_tenth_perc: TenthPerc, elapsed_secs: u64) -> EngineResult<Amount> {
    if base == 0 || rate_tenth_perc == 0 || elapsed_secs == 0 {
        return Ok(0);
    }

    let numerator = base
        .checked_mul(rate_tenth_perc as u128)
        .and_then(|v| v.checked_mul(elapsed_secs as u128))
        .ok_or(EngineError::ArithmeticOverflow("interest accrual"))?;

    Ok(numerator / (1000 * SECONDS_PER_YEAR as u128))
}

/// Validated annual interest rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterestCalculator {
    annual_rate_tenth_perc: TenthPerc,
    max_annual_rate_tenth_perc: TenthPerc,
}

impl InterestCalculator {
    /// Rejects rates above `max_annual_rate_tenth_perc`
    pub fn new(annual_rate_tenth_perc: TenthPerc, max_annual_rate_tenth_perc: TenthPerc) -> EngineResult<Self> {
        if annual_rate_tenth_perc > max_annual_rate_tenth_perc {
            return Err(EngineError::InvalidInterestRate {
                rate: annual_rate_tenth_perc,
                max: max_annual_rate_tenth_perc,
            });
        }

        Ok(Self {
            annual_rate_tenth_perc,
            max_annual_rate_tenth_perc,
        })
    }

    pub fn with_default_bound(annual_rate_tenth_perc: TenthPerc) -> EngineResult<Self> {
        Self::new(annual_rate_tenth_perc, DEFAULT_MAX_ANNUAL_RATE_TENTH_PERC)
    }

    /// Same bound, new rate
    pub fn with_rate(&self, annual_rate_tenth_perc: TenthPerc) -> EngineResult<Self> {
        Self::new(annual_rate_tenth_perc, self.max_annual_rate_tenth_perc)
    }

    pub fn annual_rate_tenth_perc(&self) -> TenthPerc {
        self.annual_rate_tenth_perc
    }

    pub fn max_annual_rate_tenth_perc(&self) -> TenthPerc {
        self.max_annual_rate_tenth_perc
    }

    pub fn accrue(&self, base: Amount, elapsed_secs: u64) -> EngineResult<Amount> {
        accrue(base, self.annual_rate_tenth_perc, elapsed_secs)
    }
}
