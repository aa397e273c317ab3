//! Multi-collateral lending engine
//!
//! Users deposit registered collateral tokens, borrow a stable unit against
//! them, accrue simple interest on an append-only debt ledger and are
//! liquidated once their collateral ratio falls below the liquidation
//! threshold.

pub mod adapter;
pub mod clock;
pub mod config;
pub mod debt;
pub mod debtors;
pub mod engine;
pub mod error;
pub mod events;
pub mod interest;
pub mod keeper;
pub mod liquidation;
pub mod oracle;
pub mod params;
pub mod ratio;
pub mod registry;
pub mod token;
pub mod tracing_logger;
pub mod types;
pub mod vault;

pub use adapter::{AdapterInfo, TokenAdapter};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, EngineConfig, MarketConfig};
pub use debt::{DebtAction, DebtBreakdown, DebtEvent, DebtLedger};
pub use engine::{EngineSettings, LendingEngine, SharedEngine};
pub use error::{EngineError, EngineResult, ErrorKind};
pub use events::{EngineEvent, LiquidationRecord};
pub use interest::InterestCalculator;
pub use keeper::LiquidationKeeper;
pub use oracle::{InMemoryOracle, OracleValue, PriceOracle};
pub use params::RiskParameters;
pub use ratio::CollateralRatio;
pub use token::{FungibleToken, InMemoryToken, LedgerError};
pub use types::{AccountId, Amount, TenthPerc, Timestamp, TokenBalance, TokenId};
