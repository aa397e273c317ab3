//! Shared identifiers and numeric aliases

use serde::{Deserialize, Serialize};
use std::fmt;

/// Token amount in the token's smallest unit
pub type Amount = u128;

/// Unix timestamp in seconds
pub type Timestamp = i64;

/// Rates and ratios in tenths of a percent (10 = 1.0%)
pub type TenthPerc = u64;

/// Opaque account identity (address-like key)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AccountId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Token identity (the token contract's address-like key)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenId(pub String);

impl TokenId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TokenId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Per-token balance line returned by balance and withdrawal queries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBalance {
    pub token: TokenId,
    pub symbol: String,
    pub amount: Amount,
}

/// Computes `10^exp` as an `Amount`, `None` on overflow
pub(crate) fn pow10(exp: u32) -> Option<Amount> {
    10u128.checked_pow(exp)
}

/// Exact `floor(a × b / c)` over the full 256-bit product.
///
/// `None` when `c` is zero or the quotient does not fit in an `Amount`.
pub(crate) fn mul_div(a: Amount, b: Amount, c: Amount) -> Option<Amount> {
    if c == 0 {
        return None;
    }
    if let Some(product) = a.checked_mul(b) {
        return Some(product / c);
    }

    const LOW: u128 = u64::MAX as u128;
    let (a_hi, a_lo) = (a >> 64, a & LOW);
    let (b_hi, b_lo) = (b >> 64, b & LOW);
    let ll = a_lo * b_lo;
    let lh = a_lo * b_hi;
    let hl = a_hi * b_lo;
    let mid = (ll >> 64) + (lh & LOW) + (hl & LOW);
    let lo = (ll & LOW) | ((mid & LOW) << 64);
    let hi = a_hi * b_hi + (lh >> 64) + (hl >> 64) + (mid >> 64);
    if hi >= c {
        return None;
    }

    // Shift-subtract division; `rem` stays below `c` between steps
    let mut rem = hi;
    let mut quotient: u128 = 0;
    for bit in (0..128).rev() {
        let carry = rem >> 127;
        rem = (rem << 1) | ((lo >> bit) & 1);
        quotient <<= 1;
        if carry == 1 || rem >= c {
            rem = rem.wrapping_sub(c);
            quotient |= 1;
        }
    }
    Some(quotient)
}
