//! Engine event log and liquidation records

use serde::{Deserialize, Serialize};

use crate::params::RiskParameters;
use crate::types::{AccountId, Amount, Timestamp, TokenBalance, TokenId};

/// Committed state changes, in commit order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    Deposited {
        user: AccountId,
        token: TokenId,
        amount: Amount,
    },
    Withdrawn {
        user: AccountId,
        token: TokenId,
        amount: Amount,
    },
    Borrowed {
        user: AccountId,
        amount: Amount,
        timestamp: Timestamp,
    },
    Repaid {
        user: AccountId,
        amount: Amount,
        timestamp: Timestamp,
    },
    AdapterRegistered {
        symbol: String,
        token: TokenId,
        symbol_key: String,
    },
    AdapterRebound {
        symbol: String,
        token: TokenId,
        oracle: String,
    },
    RiskParametersUpdated {
        params: RiskParameters,
    },
    SeizureDestinationUpdated {
        destination: AccountId,
    },
    AdminTransferred {
        previous: AccountId,
        current: AccountId,
    },
    LiquidatedUser {
        user: AccountId,
    },
}

/// Outcome of liquidating one debtor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationRecord {
    pub user: AccountId,
    pub seized: Vec<TokenBalance>,
    pub debt_erased: Amount,
    pub timestamp: Timestamp,
}
