//! Token ↔ price-feed binding
//!
//! A `TokenAdapter` ties one collateral token to one oracle symbol key and
//! converts token amounts into stable units. The bound oracle must hold a
//! present, non-zero price for the key at bind time and at every rebind.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::error::{EngineError, EngineResult};
use crate::oracle::{OracleValue, PriceOracle};
use crate::token::FungibleToken;
use crate::types::{mul_div, pow10, Amount, TokenId};

/// Quote currency appended to the token symbol for the default key
pub const DEFAULT_QUOTE: &str = "USD";

#[derive(Clone)]
pub struct TokenAdapter {
    token: Arc<dyn FungibleToken>,
    symbol_key: String,
    oracle: Arc<dyn PriceOracle>,
}

impl fmt::Debug for TokenAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenAdapter")
            .field("token", self.token.id())
            .field("symbol", &self.token.symbol())
            .field("symbol_key", &self.symbol_key)
            .field("oracle", &self.oracle.id())
            .finish()
    }
}

/// Read-only description of a registered adapter
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdapterInfo {
    pub token: TokenId,
    pub symbol: String,
    pub decimals: u8,
    pub symbol_key: String,
    pub oracle: String,
}

pub fn default_symbol_key(symbol: &str) -> String {
    format!("{}/{}", symbol, DEFAULT_QUOTE)
}

fn validated_value(oracle: &dyn PriceOracle, key: &str) -> EngineResult<OracleValue> {
    match oracle.get_value(key) {
        Some(value) if value.price > 0 => Ok(value),
        _ => Err(EngineError::InvalidOracleValue { key: key.to_string() }),
    }
}

impl TokenAdapter {
    /// Binds `token` under the key `"<SYMBOL>/USD"`
    pub fn bind(token: Arc<dyn FungibleToken>, oracle: Arc<dyn PriceOracle>) -> EngineResult<Self> {
        let key = default_symbol_key(token.symbol());
        Self::bind_with_key(token, key, oracle)
    }

    /// Binds `token` under an explicit key, e.g. a wrapped native token
    /// priced by the native symbol
    pub fn bind_with_key(
        token: Arc<dyn FungibleToken>,
        symbol_key: impl Into<String>,
        oracle: Arc<dyn PriceOracle>,
    ) -> EngineResult<Self> {
        let symbol_key = symbol_key.into();
        validated_value(oracle.as_ref(), &symbol_key)?;

        Ok(Self {
            token,
            symbol_key,
            oracle,
        })
    }

    pub fn rebind_oracle(&mut self, oracle: Arc<dyn PriceOracle>) -> EngineResult<()> {
        validated_value(oracle.as_ref(), &self.symbol_key)?;
        self.oracle = oracle;
        Ok(())
    }

    /// The replacement token must carry the same symbol as the current one
    pub fn rebind_token(&mut self, token: Arc<dyn FungibleToken>) -> EngineResult<()> {
        if token.symbol() != self.token.symbol() {
            return Err(EngineError::TokenSymbolMismatch {
                expected: self.token.symbol().to_string(),
                actual: token.symbol().to_string(),
            });
        }
        validated_value(self.oracle.as_ref(), &self.symbol_key)?;
        self.token = token;
        Ok(())
    }

    pub fn token(&self) -> &Arc<dyn FungibleToken> {
        &self.token
    }

    pub fn token_id(&self) -> &TokenId {
        self.token.id()
    }

    pub fn symbol(&self) -> &str {
        self.token.symbol()
    }

    pub fn decimals(&self) -> u8 {
        self.token.decimals()
    }

    pub fn symbol_key(&self) -> &str {
        &self.symbol_key
    }

    pub fn oracle(&self) -> &Arc<dyn PriceOracle> {
        &self.oracle
    }

    pub fn info(&self) -> AdapterInfo {
        AdapterInfo {
            token: self.token.id().clone(),
            symbol: self.token.symbol().to_string(),
            decimals: self.token.decimals(),
            symbol_key: self.symbol_key.clone(),
            oracle: self.oracle.id().to_string(),
        }
    }

    /// Current feed value; a zero price is allowed here, only binding rejects it
    pub fn price(&self) -> EngineResult<OracleValue> {
        self.oracle
            .get_value(&self.symbol_key)
            .ok_or_else(|| EngineError::InvalidOracleValue {
                key: self.symbol_key.clone(),
            })
    }

    /// `price × amount × 10^(stable − token − oracle)`, floored
    pub fn price_of(&self, amount: Amount, stable_decimals: u8) -> EngineResult<Amount> {
        let price = self.price()?.price;
        let exponent = stable_decimals as i32 - self.decimals() as i32 - self.oracle.decimals() as i32;

        let value = if exponent >= 0 {
            pow10(exponent as u32)
                .and_then(|scale| price.checked_mul(amount)?.checked_mul(scale))
                .ok_or(EngineError::ArithmeticOverflow("token valuation"))?
        } else {
            // Divide first so a large balance stays representable after scaling down
            match pow10(exponent.unsigned_abs()) {
                Some(divisor) => {
                    mul_div(amount, price, divisor).ok_or(EngineError::ArithmeticOverflow("token valuation"))?
                }
                None => 0,
            }
        };

        debug!(symbol = %self.symbol(), amount, price, value, "Valued collateral");
        Ok(value)
    }

    /// Token units worth `value` stable units, floored.
    ///
    /// `None` when the current price is zero (the token backs nothing).
    pub fn amount_for_value(&self, value: Amount, stable_decimals: u8) -> EngineResult<Option<Amount>> {
        let price = self.price()?.price;
        if price == 0 {
            return Ok(None);
        }

        let exponent = self.decimals() as i32 + self.oracle.decimals() as i32 - stable_decimals as i32;
        let amount = if exponent >= 0 {
            pow10(exponent as u32)
                .and_then(|scale| mul_div(value, scale, price))
                .ok_or(EngineError::ArithmeticOverflow("inverse valuation"))?
        } else {
            match pow10(exponent.unsigned_abs()).and_then(|scale| scale.checked_mul(price)) {
                Some(divisor) => value / divisor,
                None => 0,
            }
        };

        Ok(Some(amount))
    }
}
