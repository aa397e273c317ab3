//! Engine and keeper configuration
//!
//! Loaded from a TOML file (`ENGINE_CONFIG`) or from `ENGINE_*` environment
//! variables. Markets seed the in-memory token ledgers, price feed and
//! adapter registry of the reference engine the keeper binary runs.

use std::collections::HashSet;
use std::env;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::adapter::{default_symbol_key, TokenAdapter};
use crate::clock::Clock;
use crate::engine::{EngineSettings, LendingEngine};
use crate::error::EngineError;
use crate::interest::{InterestCalculator, DEFAULT_MAX_ANNUAL_RATE_TENTH_PERC};
use crate::keeper::DEFAULT_SWEEP_INTERVAL;
use crate::oracle::{InMemoryOracle, DEFAULT_ORACLE_DECIMALS};
use crate::params::RiskParameters;
use crate::token::InMemoryToken;
use crate::types::{AccountId, Amount, TenthPerc};

/// Largest decimal count whose power of ten fits an `Amount`
const MAX_DECIMALS: u8 = 38;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    #[error("Configuration file error: {0}")]
    FileError(String),

    #[error("Configuration parse error: {0}")]
    Parse(String),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub risk: RiskParameters,
    pub max_annual_interest_rate_tenth_perc: TenthPerc,
    pub stable: StableConfig,
    pub admin: String,
    pub custody: String,
    pub seizure_destination: String,
    pub keeper: KeeperConfig,
    pub log_level: String,
    pub oracle: OracleConfig,
    pub markets: Vec<MarketConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StableConfig {
    pub token_id: String,
    pub symbol: String,
    pub decimals: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeeperConfig {
    pub enabled: bool,
    pub interval_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    pub id: String,
    pub decimals: u8,
}

/// One collateral token and its seed price
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketConfig {
    pub token_id: String,
    pub symbol: String,
    #[serde(default = "default_token_decimals")]
    pub decimals: u8,
    /// Defaults to `"<SYMBOL>/USD"`
    #[serde(default)]
    pub oracle_key: Option<String>,
    pub price: Amount,
}

fn default_token_decimals() -> u8 {
    18
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            risk: RiskParameters::default(),
            max_annual_interest_rate_tenth_perc: DEFAULT_MAX_ANNUAL_RATE_TENTH_PERC,
            stable: StableConfig::default(),
            admin: "admin".to_string(),
            custody: "engine-custody".to_string(),
            seizure_destination: "treasury".to_string(),
            keeper: KeeperConfig::default(),
            log_level: "info".to_string(),
            oracle: OracleConfig::default(),
            markets: Vec::new(),
        }
    }
}

impl Default for StableConfig {
    fn default() -> Self {
        Self {
            token_id: "stable".to_string(),
            symbol: "CUSD".to_string(),
            decimals: 18,
        }
    }
}

impl Default for KeeperConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: DEFAULT_SWEEP_INTERVAL.as_secs(),
        }
    }
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            id: "oracle".to_string(),
            decimals: DEFAULT_ORACLE_DECIMALS,
        }
    }
}

impl KeeperConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl MarketConfig {
    pub fn oracle_key(&self) -> String {
        self.oracle_key
            .clone()
            .unwrap_or_else(|| default_symbol_key(&self.symbol))
    }
}

impl EngineConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::FileError(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// Defaults overridden by `ENGINE_*` variables and `LOG_LEVEL`
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|key| env::var(key).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(admin) = var("ENGINE_ADMIN") {
            config.admin = admin;
        }
        if let Some(custody) = var("ENGINE_CUSTODY") {
            config.custody = custody;
        }
        if let Some(destination) = var("ENGINE_SEIZURE_DESTINATION") {
            config.seizure_destination = destination;
        }
        if let Some(rate) = var("ENGINE_ANNUAL_INTEREST_RATE") {
            config.risk.annual_interest_rate_tenth_perc = parse_var("ENGINE_ANNUAL_INTEREST_RATE", &rate)?;
        }
        if let Some(ratio) = var("ENGINE_MIN_COLLATERAL_RATIO") {
            config.risk.min_collateral_ratio_tenth_perc = parse_var("ENGINE_MIN_COLLATERAL_RATIO", &ratio)?;
        }
        if let Some(penalty) = var("ENGINE_LIQUIDATION_PENALTY") {
            config.risk.liquidation_penalty_tenth_perc = parse_var("ENGINE_LIQUIDATION_PENALTY", &penalty)?;
        }
        if let Some(secs) = var("ENGINE_KEEPER_INTERVAL_SECS") {
            config.keeper.interval_secs = parse_var("ENGINE_KEEPER_INTERVAL_SECS", &secs)?;
        }
        if let Some(enabled) = var("ENGINE_KEEPER_ENABLED") {
            config.keeper.enabled = enabled == "true";
        }
        if let Some(level) = var("LOG_LEVEL") {
            config.log_level = level;
        }

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        InterestCalculator::new(
            self.risk.annual_interest_rate_tenth_perc,
            self.max_annual_interest_rate_tenth_perc,
        )?;
        self.risk.validate()?;

        for (name, value) in [
            ("admin", &self.admin),
            ("custody", &self.custody),
            ("seizure_destination", &self.seizure_destination),
            ("stable.token_id", &self.stable.token_id),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::MissingRequired(name.to_string()));
            }
        }

        if self.keeper.enabled && self.keeper.interval_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "keeper.interval_secs must be positive".to_string(),
            ));
        }

        if self.stable.decimals > MAX_DECIMALS || self.oracle.decimals > MAX_DECIMALS {
            return Err(ConfigError::InvalidValue(format!(
                "decimals must not exceed {}",
                MAX_DECIMALS
            )));
        }

        let mut symbols = HashSet::new();
        let mut tokens = HashSet::new();
        for market in &self.markets {
            if !symbols.insert(market.symbol.as_str()) || !tokens.insert(market.token_id.as_str()) {
                return Err(ConfigError::InvalidValue(format!(
                    "duplicate market {} ({})",
                    market.symbol, market.token_id
                )));
            }
            if market.price == 0 {
                return Err(ConfigError::InvalidValue(format!(
                    "market {} needs a non-zero price",
                    market.symbol
                )));
            }
            if market.decimals > MAX_DECIMALS {
                return Err(ConfigError::InvalidValue(format!(
                    "market {} decimals must not exceed {}",
                    market.symbol, MAX_DECIMALS
                )));
            }
        }

        Ok(())
    }

    pub fn settings(&self) -> EngineSettings {
        EngineSettings {
            params: self.risk,
            max_annual_interest_rate_tenth_perc: self.max_annual_interest_rate_tenth_perc,
            admin: AccountId::new(self.admin.clone()),
            custody: AccountId::new(self.custody.clone()),
            seizure_destination: AccountId::new(self.seizure_destination.clone()),
        }
    }

    /// Reference wiring: an engine over in-memory token ledgers and an
    /// in-memory price feed seeded from `markets`.
    ///
    /// Nothing here deposits or borrows, so the engine starts with no
    /// debtors and its feed never moves. A host that embeds the library
    /// binds its own `FungibleToken` and `PriceOracle` implementations and
    /// drives user operations through a `SharedEngine`.
    pub fn build_reference_engine(&self, clock: Arc<dyn Clock>) -> Result<LendingEngine, ConfigError> {
        let stable = Arc::new(InMemoryToken::new(
            self.stable.token_id.clone(),
            self.stable.symbol.clone(),
            self.stable.decimals,
        ));
        let mut engine = LendingEngine::new(self.settings(), stable, clock)?;

        let oracle = Arc::new(InMemoryOracle::new(self.oracle.id.clone(), self.oracle.decimals));
        let admin = AccountId::new(self.admin.clone());
        for market in &self.markets {
            let key = market.oracle_key();
            oracle.set_value(key.clone(), market.price, engine.now());

            let token = Arc::new(InMemoryToken::new(
                market.token_id.clone(),
                market.symbol.clone(),
                market.decimals,
            ));
            let adapter = TokenAdapter::bind_with_key(token, key, oracle.clone())?;
            engine.register_adapter(&admin, adapter)?;
        }

        info!(markets = self.markets.len(), symbols = ?engine.token_symbols(), "Reference markets seeded");
        Ok(engine)
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue(format!("{}={}", key, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    const SAMPLE: &str = r#"
admin = "ops"
seizure_destination = "treasury"
log_level = "debug"

[risk]
annual_interest_rate_tenth_perc = 60
min_collateral_ratio_tenth_perc = 1500
liquidation_penalty_tenth_perc = 120

[keeper]
enabled = true
interval_secs = 30

[[markets]]
token_id = "0xusdc"
symbol = "USDC"
price = 100000000

[[markets]]
token_id = "0xwtlos"
symbol = "WTLOS"
oracle_key = "TLOS/USD"
decimals = 18
price = 21000000
"#;

    #[test]
    fn test_from_toml_str() {
        let config = EngineConfig::from_toml_str(SAMPLE).unwrap();
        config.validate().unwrap();

        assert_eq!(config.admin, "ops");
        assert_eq!(config.custody, "engine-custody");
        assert_eq!(config.risk.annual_interest_rate_tenth_perc, 60);
        assert_eq!(config.keeper.interval(), Duration::from_secs(30));
        assert_eq!(config.oracle.decimals, 8);
        assert_eq!(config.markets.len(), 2);
        assert_eq!(config.markets[0].decimals, 18);
        assert_eq!(config.markets[0].oracle_key(), "USDC/USD");
        assert_eq!(config.markets[1].oracle_key(), "TLOS/USD");
    }

    #[test]
    fn test_reference_engine_registers_markets() {
        let config = EngineConfig::from_toml_str(SAMPLE).unwrap();
        let engine = config
            .build_reference_engine(Arc::new(crate::clock::ManualClock::new(0)))
            .unwrap();

        assert_eq!(engine.token_symbols(), vec!["USDC".to_string(), "WTLOS".to_string()]);
        assert_eq!(engine.adapter("WTLOS").unwrap().symbol_key, "TLOS/USD");
        assert_eq!(engine.admin(), &AccountId::from("ops"));
        assert!(engine.all_debtors().is_empty());
        assert!(engine.events().iter().all(|e| matches!(e, crate::events::EngineEvent::AdapterRegistered { .. })));
    }

    #[test]
    fn test_partial_risk_table_keeps_defaults() {
        let config = EngineConfig::from_toml_str("[risk]\nliquidation_penalty_tenth_perc = 100\n").unwrap();
        assert_eq!(config.risk.liquidation_penalty_tenth_perc, 100);
        assert_eq!(config.risk.min_collateral_ratio_tenth_perc, 1500);
        assert_eq!(config.keeper, KeeperConfig::default());
    }

    #[test]
    fn test_from_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = EngineConfig::from_toml_file(file.path()).unwrap();
        assert_eq!(config.log_level, "debug");

        let err = EngineConfig::from_toml_file("/nonexistent/engine.toml").unwrap_err();
        assert!(matches!(err, ConfigError::FileError(_)));
    }

    #[test]
    fn test_malformed_toml() {
        let err = EngineConfig::from_toml_str("risk = 5").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_from_vars() {
        let vars: HashMap<&str, &str> = [
            ("ENGINE_ADMIN", "ops"),
            ("ENGINE_MIN_COLLATERAL_RATIO", "2000"),
            ("ENGINE_KEEPER_ENABLED", "false"),
            ("LOG_LEVEL", "warn"),
        ]
        .into_iter()
        .collect();

        let config = EngineConfig::from_vars(|key| vars.get(key).map(|v| v.to_string())).unwrap();
        assert_eq!(config.admin, "ops");
        assert_eq!(config.risk.min_collateral_ratio_tenth_perc, 2000);
        assert!(!config.keeper.enabled);
        assert_eq!(config.log_level, "warn");

        let err = EngineConfig::from_vars(|key| (key == "ENGINE_ANNUAL_INTEREST_RATE").then(|| "six".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(_)));
    }

    #[test]
    fn test_validate_rejects_bad_configuration() {
        let mut config = EngineConfig::default();
        config.risk.min_collateral_ratio_tenth_perc = 1100;
        assert!(matches!(
            config.validate().unwrap_err(),
            ConfigError::Engine(EngineError::ThresholdNotBelowMinimum { .. })
        ));

        let mut config = EngineConfig::default();
        config.max_annual_interest_rate_tenth_perc = 50;
        assert!(matches!(
            config.validate().unwrap_err(),
            ConfigError::Engine(EngineError::InvalidInterestRate { rate: 80, max: 50 })
        ));

        let mut config = EngineConfig::from_toml_str(SAMPLE).unwrap();
        config.markets[1].symbol = "USDC".to_string();
        assert!(matches!(config.validate().unwrap_err(), ConfigError::InvalidValue(_)));

        let mut config = EngineConfig::default();
        config.admin = " ".to_string();
        assert!(matches!(config.validate().unwrap_err(), ConfigError::MissingRequired(_)));
    }
}
