//! Engine error taxonomy
//!
//! Every rejected operation surfaces exactly one `EngineError`; the engine
//! restores its pre-call state before returning it.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::token::LedgerError;
use crate::types::{AccountId, Amount, TenthPerc, Timestamp, TokenId};

/// Error categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Invalid interest rate or risk parameter combination
    Configuration,
    /// Adapter registration or lookup failures
    Registry,
    /// Oracle/token validation and malformed requests
    Validation,
    /// Post-operation collateral ratio below the minimum
    Solvency,
    /// Withdrawal beyond the deposited balance
    Balance,
    /// Privileged operation attempted by a non-admin identity
    Authorization,
    /// Token ledger collaborator refused a movement
    Ledger,
    /// Checked arithmetic overflowed
    Arithmetic,
}

impl ErrorKind {
    /// Engine errors are local; the caller must fix the triggering condition
    pub fn is_retryable(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    // Configuration
    #[error("InterestCalculator: Invalid annual interest rate ({rate} > {max} tenths of a percent)")]
    InvalidInterestRate { rate: TenthPerc, max: TenthPerc },

    #[error("Liquidation threshold must be below minimum collateral ratio (threshold {threshold}, minimum {min_collateral_ratio})")]
    ThresholdNotBelowMinimum {
        threshold: TenthPerc,
        min_collateral_ratio: TenthPerc,
    },

    // Registry
    #[error("Token adapter already exists for symbol {0}")]
    AdapterAlreadyExists(String),

    #[error("Token adapter does not exist for token {0}")]
    AdapterNotFound(String),

    #[error("Token adapter for {symbol} still backs {deposited} deposited units")]
    AdapterInUse { symbol: String, deposited: Amount },

    // Validation
    #[error("Token adapter: invalid oracle value for {key}")]
    InvalidOracleValue { key: String },

    #[error("Token adapter: invalid token symbol (expected {expected}, got {actual})")]
    TokenSymbolMismatch { expected: String, actual: String },

    #[error("Amount must be greater than zero")]
    ZeroAmount,

    #[error("Debt event at {timestamp} precedes last recorded event at {last}")]
    TimestampRegression { timestamp: Timestamp, last: Timestamp },

    // Solvency
    #[error("Collateral ratio is unsafe ({ratio} < {minimum} tenths of a percent)")]
    UnsafeCollateralRatio { ratio: u128, minimum: TenthPerc },

    // Balance
    #[error("Insufficient balance of {token}: requested {requested}, deposited {available}")]
    InsufficientBalance {
        token: TokenId,
        requested: Amount,
        available: Amount,
    },

    // Authorization
    #[error("Account {0} is not authorized for this operation")]
    Unauthorized(AccountId),

    // Collaborators
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("Arithmetic overflow in {0}")]
    ArithmeticOverflow(&'static str),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::InvalidInterestRate { .. } | EngineError::ThresholdNotBelowMinimum { .. } => {
                ErrorKind::Configuration
            }
            EngineError::AdapterAlreadyExists(_)
            | EngineError::AdapterNotFound(_)
            | EngineError::AdapterInUse { .. } => ErrorKind::Registry,
            EngineError::InvalidOracleValue { .. }
            | EngineError::TokenSymbolMismatch { .. }
            | EngineError::ZeroAmount
            | EngineError::TimestampRegression { .. } => ErrorKind::Validation,
            EngineError::UnsafeCollateralRatio { .. } => ErrorKind::Solvency,
            EngineError::InsufficientBalance { .. } => ErrorKind::Balance,
            EngineError::Unauthorized(_) => ErrorKind::Authorization,
            EngineError::Ledger(_) => ErrorKind::Ledger,
            EngineError::ArithmeticOverflow(_) => ErrorKind::Arithmetic,
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            EngineError::InvalidInterestRate { rate: 1001, max: 1000 }.kind(),
            ErrorKind::Configuration
        );
        assert_eq!(
            EngineError::AdapterAlreadyExists("USDC".into()).kind(),
            ErrorKind::Registry
        );
        assert_eq!(
            EngineError::UnsafeCollateralRatio { ratio: 1485, minimum: 1500 }.kind(),
            ErrorKind::Solvency
        );
        assert_eq!(
            EngineError::Unauthorized(AccountId::from("mallory")).kind(),
            ErrorKind::Authorization
        );
        assert!(!ErrorKind::Solvency.is_retryable());
    }

    #[test]
    fn test_messages_name_the_failure() {
        let err = EngineError::AdapterAlreadyExists("USDC".into());
        assert!(err.to_string().starts_with("Token adapter already exists"));

        let err = EngineError::UnsafeCollateralRatio { ratio: 1485, minimum: 1500 };
        assert!(err.to_string().contains("Collateral ratio is unsafe"));
    }
}
