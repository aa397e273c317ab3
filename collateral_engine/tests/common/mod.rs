//! Shared fixture for engine scenario tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use collateral_engine::{
    AccountId, Amount, DebtEvent, EngineSettings, FungibleToken, InMemoryOracle, InMemoryToken, LendingEngine,
    ManualClock, RiskParameters, TokenAdapter, TokenBalance, TokenId,
};

/// One stable unit at 8 oracle decimals
pub const USD: Amount = 100_000_000;
pub const SECONDS_PER_YEAR: i64 = 365 * 24 * 60 * 60;

pub struct Harness {
    pub engine: LendingEngine,
    pub stable: Arc<InMemoryToken>,
    pub oracle: Arc<InMemoryOracle>,
    pub clock: Arc<ManualClock>,
    pub admin: AccountId,
    tokens: HashMap<String, Arc<InMemoryToken>>,
}

impl Harness {
    /// USDC, USDT and DAI at 1.0 with default risk parameters
    pub fn new() -> Self {
        Self::with_markets(RiskParameters::default(), &[("USDC", USD), ("USDT", USD), ("DAI", USD)])
    }

    pub fn with_markets(params: RiskParameters, markets: &[(&str, Amount)]) -> Self {
        let stable = Arc::new(InMemoryToken::new("0xstable", "CUSD", 18));
        let oracle = Arc::new(InMemoryOracle::new("dia", 8));
        let clock = Arc::new(ManualClock::new(1_600_000_000));
        let admin = AccountId::from("admin");

        let mut engine = LendingEngine::new(
            EngineSettings::new("admin", "custody", "treasury").with_params(params),
            stable.clone(),
            clock.clone(),
        )
        .expect("valid engine settings");

        let mut tokens = HashMap::new();
        for (symbol, price) in markets {
            oracle.set_value(format!("{}/USD", symbol), *price, clock_now(&clock));
            let token = Arc::new(InMemoryToken::new(token_address(symbol), *symbol, 18));
            engine
                .register_adapter(&admin, TokenAdapter::bind(token.clone(), oracle.clone()).expect("price published"))
                .expect("unique symbol");
            tokens.insert(symbol.to_string(), token);
        }

        Self {
            engine,
            stable,
            oracle,
            clock,
            admin,
            tokens,
        }
    }

    pub fn token(&self, symbol: &str) -> Arc<InMemoryToken> {
        self.tokens[symbol].clone()
    }

    pub fn token_id(&self, symbol: &str) -> TokenId {
        TokenId::new(token_address(symbol))
    }

    /// Mints collateral tokens straight to `user`
    pub fn fund(&self, user: &AccountId, symbol: &str, amount: Amount) {
        self.tokens[symbol].mint(user, amount).expect("mint");
    }

    pub fn fund_and_deposit(&mut self, user: &AccountId, symbol: &str, amount: Amount) {
        self.fund(user, symbol, amount);
        let token = self.token_id(symbol);
        self.engine.deposit(user, &token, amount).expect("deposit");
    }

    pub fn set_price(&self, symbol: &str, price: Amount) {
        self.oracle
            .set_value(format!("{}/USD", symbol), price, clock_now(&self.clock));
    }

    pub fn wallet(&self, user: &AccountId, symbol: &str) -> Amount {
        self.tokens[symbol].balance_of(user)
    }

    /// Everything a caller can observe about `users` and the engine
    pub fn observe(&self, users: &[AccountId]) -> Observed {
        Observed {
            vaults: users.iter().map(|u| self.engine.user_token_balances(u)).collect(),
            debts: users.iter().map(|u| self.engine.debt_events(u).to_vec()).collect(),
            wallets: users
                .iter()
                .map(|u| {
                    let mut line: Vec<Amount> = self.tokens.values().map(|t| t.balance_of(u)).collect();
                    line.sort();
                    line.push(self.stable.balance_of(u));
                    line
                })
                .collect(),
            debtors: self.engine.all_debtors().to_vec(),
            events: self.engine.events().len(),
            stable_supply: self.stable.total_supply(),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct Observed {
    pub vaults: Vec<Vec<TokenBalance>>,
    pub debts: Vec<Vec<DebtEvent>>,
    pub wallets: Vec<Vec<Amount>>,
    pub debtors: Vec<AccountId>,
    pub events: usize,
    pub stable_supply: Amount,
}

pub fn token_address(symbol: &str) -> String {
    format!("0x{}", symbol.to_lowercase())
}

fn clock_now(clock: &ManualClock) -> i64 {
    use collateral_engine::Clock;
    clock.now()
}
