//! Price oracle collaborator
//!
//! Oracles publish `(price, timestamp)` pairs under symbol keys such as
//! `"USDC/USD"`. Staleness policy belongs to the feed, not to the engine.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::types::{Amount, Timestamp};

/// Price precision of the reference feed
pub const DEFAULT_ORACLE_DECIMALS: u8 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleValue {
    pub price: Amount,
    pub timestamp: Timestamp,
}

pub trait PriceOracle: Send + Sync {
    /// Identity of the feed (address-like key)
    fn id(&self) -> &str;

    /// Number of decimals carried by `OracleValue::price`
    fn decimals(&self) -> u8;

    /// `None` if no value was ever published for `key`
    fn get_value(&self, key: &str) -> Option<OracleValue>;
}

/// Push-style feed; the owner publishes values with `set_value`
#[derive(Debug)]
pub struct InMemoryOracle {
    id: String,
    decimals: u8,
    values: DashMap<String, OracleValue>,
}

impl InMemoryOracle {
    pub fn new(id: impl Into<String>, decimals: u8) -> Self {
        Self {
            id: id.into(),
            decimals,
            values: DashMap::new(),
        }
    }

    pub fn set_value(&self, key: impl Into<String>, price: Amount, timestamp: Timestamp) {
        self.values.insert(key.into(), OracleValue { price, timestamp });
    }

    pub fn keys(&self) -> Vec<String> {
        self.values.iter().map(|entry| entry.key().clone()).collect()
    }
}

impl PriceOracle for InMemoryOracle {
    fn id(&self) -> &str {
        &self.id
    }

    fn decimals(&self) -> u8 {
        self.decimals
    }

    fn get_value(&self, key: &str) -> Option<OracleValue> {
        self.values.get(key).map(|value| *value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_get_value() {
        let oracle = InMemoryOracle::new("dia", DEFAULT_ORACLE_DECIMALS);
        oracle.set_value("TLOS/USD", 150, 1_700_000_000);

        let value = oracle.get_value("TLOS/USD").unwrap();
        assert_eq!(value.price, 150);
        assert_eq!(value.timestamp, 1_700_000_000);
        assert!(oracle.get_value("USDC/USD").is_none());
    }

    #[test]
    fn test_overwrites_previous_value() {
        let oracle = InMemoryOracle::new("dia", DEFAULT_ORACLE_DECIMALS);
        oracle.set_value("USDC/USD", 100_000_000, 1);
        oracle.set_value("USDC/USD", 99_000_000, 2);

        assert_eq!(oracle.get_value("USDC/USD").unwrap().price, 99_000_000);
        assert_eq!(oracle.keys(), vec!["USDC/USD".to_string()]);
    }
}
