//! Lending engine
//!
//! `LendingEngine` owns every table (risk parameters, adapter registry,
//! collateral vault, debt ledgers, debtor registry) and is the single entry
//! point for user and admin operations. It is a synchronous state machine;
//! hosts that share it across tasks wrap it in one exclusive lock
//! (`SharedEngine`).
//!
//! Each mutating operation runs inside [`LendingEngine::transact`]: engine
//! state is snapshotted up front and every token-ledger side effect is
//! journaled, so a rejected operation leaves both the engine and the token
//! ledgers exactly as they were.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::adapter::{AdapterInfo, TokenAdapter};
use crate::clock::Clock;
use crate::debt::{DebtBreakdown, DebtEvent, DebtLedger};
use crate::debtors::DebtorRegistry;
use crate::error::{EngineError, EngineResult};
use crate::events::EngineEvent;
use crate::interest::{InterestCalculator, DEFAULT_MAX_ANNUAL_RATE_TENTH_PERC};
use crate::oracle::PriceOracle;
use crate::params::RiskParameters;
use crate::ratio::{CollateralRatio, CollateralRatioCalculator};
use crate::registry::TokenAdapterRegistry;
use crate::token::FungibleToken;
use crate::tracing_logger::timed;
use crate::types::{AccountId, Amount, TenthPerc, Timestamp, TokenBalance, TokenId};
use crate::vault::CollateralVault;

/// Engine handle shared between the keeper and other tasks
pub type SharedEngine = Arc<tokio::sync::Mutex<LendingEngine>>;

/// Construction-time settings
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub params: RiskParameters,
    pub max_annual_interest_rate_tenth_perc: TenthPerc,
    pub admin: AccountId,
    /// Account that holds deposited collateral on the token ledgers
    pub custody: AccountId,
    pub seizure_destination: AccountId,
}

impl EngineSettings {
    pub fn new(admin: impl Into<String>, custody: impl Into<String>, seizure_destination: impl Into<String>) -> Self {
        Self {
            params: RiskParameters::default(),
            max_annual_interest_rate_tenth_perc: DEFAULT_MAX_ANNUAL_RATE_TENTH_PERC,
            admin: AccountId::new(admin),
            custody: AccountId::new(custody),
            seizure_destination: AccountId::new(seizure_destination),
        }
    }

    pub fn with_params(mut self, params: RiskParameters) -> Self {
        self.params = params;
        self
    }
}

/// Tables a rejected operation must restore. The event log lives outside
/// so a snapshot never copies it.
#[derive(Debug, Clone)]
pub(crate) struct EngineState {
    pub(crate) params: RiskParameters,
    pub(crate) interest: InterestCalculator,
    pub(crate) admin: AccountId,
    pub(crate) seizure_destination: AccountId,
    pub(crate) registry: TokenAdapterRegistry,
    pub(crate) vault: CollateralVault,
    pub(crate) debts: HashMap<AccountId, DebtLedger>,
    pub(crate) debtors: DebtorRegistry,
}

enum LedgerOp {
    Transfer {
        token: Arc<dyn FungibleToken>,
        from: AccountId,
        to: AccountId,
        amount: Amount,
    },
    Mint {
        token: Arc<dyn FungibleToken>,
        to: AccountId,
        amount: Amount,
    },
    Burn {
        token: Arc<dyn FungibleToken>,
        from: AccountId,
        amount: Amount,
    },
}

/// Token-ledger effects applied by the current operation
#[derive(Default)]
pub(crate) struct Journal {
    ops: Vec<LedgerOp>,
}

impl Journal {
    pub(crate) fn transfer(
        &mut self,
        token: &Arc<dyn FungibleToken>,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> EngineResult<()> {
        token.transfer(from, to, amount)?;
        self.ops.push(LedgerOp::Transfer {
            token: token.clone(),
            from: from.clone(),
            to: to.clone(),
            amount,
        });
        Ok(())
    }

    pub(crate) fn mint(&mut self, token: &Arc<dyn FungibleToken>, to: &AccountId, amount: Amount) -> EngineResult<()> {
        token.mint(to, amount)?;
        self.ops.push(LedgerOp::Mint {
            token: token.clone(),
            to: to.clone(),
            amount,
        });
        Ok(())
    }

    pub(crate) fn burn(&mut self, token: &Arc<dyn FungibleToken>, from: &AccountId, amount: Amount) -> EngineResult<()> {
        token.burn(from, amount)?;
        self.ops.push(LedgerOp::Burn {
            token: token.clone(),
            from: from.clone(),
            amount,
        });
        Ok(())
    }

    /// Applies the inverse of every recorded effect, newest first
    fn unwind(self) {
        for op in self.ops.into_iter().rev() {
            let (token, result) = match &op {
                LedgerOp::Transfer { token, from, to, amount } => (token, token.transfer(to, from, *amount)),
                LedgerOp::Mint { token, to, amount } => (token, token.burn(to, *amount)),
                LedgerOp::Burn { token, from, amount } => (token, token.mint(from, *amount)),
            };
            if let Err(err) = result {
                error!(token = %token.id(), error = %err, "Failed to compensate token ledger effect");
            }
        }
    }
}

pub struct LendingEngine {
    pub(crate) custody: AccountId,
    pub(crate) stable: Arc<dyn FungibleToken>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) state: EngineState,
    pub(crate) events: Vec<EngineEvent>,
}

impl LendingEngine {
    /// Rejects an out-of-bound interest rate or a liquidation threshold that
    /// is not below the minimum collateral ratio
    pub fn new(settings: EngineSettings, stable: Arc<dyn FungibleToken>, clock: Arc<dyn Clock>) -> EngineResult<Self> {
        let interest = InterestCalculator::new(
            settings.params.annual_interest_rate_tenth_perc,
            settings.max_annual_interest_rate_tenth_perc,
        )?;
        settings.params.validate()?;

        info!(
            admin = %settings.admin,
            custody = %settings.custody,
            stable = %stable.symbol(),
            interest_rate = settings.params.annual_interest_rate_tenth_perc,
            min_collateral_ratio = settings.params.min_collateral_ratio_tenth_perc,
            liquidation_threshold = settings.params.liquidation_threshold_tenth_perc(),
            "Lending engine initialized"
        );

        Ok(Self {
            custody: settings.custody,
            stable,
            clock,
            state: EngineState {
                params: settings.params,
                interest,
                admin: settings.admin,
                seizure_destination: settings.seizure_destination,
                registry: TokenAdapterRegistry::new(),
                vault: CollateralVault::new(),
                debts: HashMap::new(),
                debtors: DebtorRegistry::new(),
            },
            events: Vec::new(),
        })
    }

    /// Wraps the engine for sharing across tasks
    pub fn into_shared(self) -> SharedEngine {
        Arc::new(tokio::sync::Mutex::new(self))
    }

    /// Runs `f` atomically: on error the state snapshot is restored, events
    /// appended by `f` are truncated and the journal unwound before the
    /// error is returned
    pub(crate) fn transact<T>(
        &mut self,
        operation: &'static str,
        f: impl FnOnce(&mut Self, &mut Journal) -> EngineResult<T>,
    ) -> EngineResult<T> {
        let snapshot = self.state.clone();
        let events_len = self.events.len();
        let mut journal = Journal::default();

        match timed(operation, || f(self, &mut journal)) {
            Ok(value) => Ok(value),
            Err(err) => {
                self.state = snapshot;
                self.events.truncate(events_len);
                journal.unwind();
                warn!(operation, error = %err, kind = ?err.kind(), "Operation rejected");
                Err(err)
            }
        }
    }

    pub(crate) fn ensure_admin(&self, caller: &AccountId) -> EngineResult<()> {
        if caller != &self.state.admin {
            return Err(EngineError::Unauthorized(caller.clone()));
        }
        Ok(())
    }

    pub(crate) fn calculator(&self) -> CollateralRatioCalculator<'_> {
        CollateralRatioCalculator::new(
            &self.state.registry,
            &self.state.vault,
            self.stable.decimals(),
            self.state.params.min_collateral_ratio_tenth_perc,
        )
    }

    pub(crate) fn breakdown_at(&self, user: &AccountId, as_of: Timestamp) -> EngineResult<DebtBreakdown> {
        match self.state.debts.get(user) {
            Some(ledger) => ledger.calculate_base_and_interest(&self.state.interest, as_of),
            None => Ok(DebtBreakdown::default()),
        }
    }

    // User operations

    pub fn deposit(&mut self, user: &AccountId, token: &TokenId, amount: Amount) -> EngineResult<()> {
        self.transact("deposit", |engine, journal| engine.deposit_inner(user, token, amount, journal))
    }

    pub fn withdraw(&mut self, user: &AccountId, token: &TokenId, amount: Amount) -> EngineResult<()> {
        self.transact("withdraw", |engine, journal| engine.withdraw_inner(user, token, amount, journal))
    }

    /// Mints `amount` stable units to `user` against their collateral
    pub fn borrow(&mut self, user: &AccountId, amount: Amount) -> EngineResult<()> {
        self.transact("borrow", |engine, journal| engine.borrow_inner(user, amount, journal))
    }

    /// Deposit and borrow as one operation; neither applies if either fails
    pub fn deposit_and_borrow(
        &mut self,
        user: &AccountId,
        token: &TokenId,
        amount: Amount,
        loan: Amount,
    ) -> EngineResult<()> {
        self.transact("deposit_and_borrow", |engine, journal| {
            engine.deposit_inner(user, token, amount, journal)?;
            engine.borrow_inner(user, loan, journal)
        })
    }

    /// Burns up to `amount` stable units from `user`, capped at the current
    /// total debt. Returns the amount actually repaid.
    pub fn repay(&mut self, user: &AccountId, amount: Amount) -> EngineResult<Amount> {
        self.transact("repay", |engine, journal| engine.repay_inner(user, amount, journal))
    }

    pub fn repay_all(&mut self, user: &AccountId) -> EngineResult<Amount> {
        self.transact("repay_all", |engine, journal| engine.repay_inner(user, Amount::MAX, journal))
    }

    fn deposit_inner(&mut self, user: &AccountId, token_id: &TokenId, amount: Amount, journal: &mut Journal) -> EngineResult<()> {
        if amount == 0 {
            return Err(EngineError::ZeroAmount);
        }
        let token = self.state.registry.get(token_id)?.token().clone();

        journal.transfer(&token, user, &self.custody, amount)?;
        let balance = self.state.vault.deposit(user, token_id, amount)?;
        // Holdings that cannot be valued would stall every liquidation scan
        self.calculator().collateral_value(user)?;
        self.state.debtors.insert(user);
        self.events.push(EngineEvent::Deposited {
            user: user.clone(),
            token: token_id.clone(),
            amount,
        });

        info!(user = %user, token = %token_id, amount, balance, "Collateral deposited");
        Ok(())
    }

    fn withdraw_inner(&mut self, user: &AccountId, token_id: &TokenId, amount: Amount, journal: &mut Journal) -> EngineResult<()> {
        if amount == 0 {
            return Err(EngineError::ZeroAmount);
        }
        let token = self.state.registry.get(token_id)?.token().clone();

        let remaining = self.state.vault.withdraw(user, token_id, amount)?;
        let debt = self.total_debt(user)?;
        self.calculator().ensure_safe(user, debt)?;

        journal.transfer(&token, &self.custody, user, amount)?;
        self.events.push(EngineEvent::Withdrawn {
            user: user.clone(),
            token: token_id.clone(),
            amount,
        });

        info!(user = %user, token = %token_id, amount, remaining, "Collateral withdrawn");
        Ok(())
    }

    fn borrow_inner(&mut self, user: &AccountId, amount: Amount, journal: &mut Journal) -> EngineResult<()> {
        if amount == 0 {
            return Err(EngineError::ZeroAmount);
        }
        let now = self.clock.now();

        self.state.debts.entry(user.clone()).or_default().add_loan(amount, now)?;
        let debt = self.breakdown_at(user, now)?.total()?;
        self.calculator().ensure_safe(user, debt)?;

        journal.mint(&self.stable, user, amount)?;
        self.state.debtors.insert(user);
        self.events.push(EngineEvent::Borrowed {
            user: user.clone(),
            amount,
            timestamp: now,
        });

        info!(user = %user, amount, total_debt = debt, "Stable units borrowed");
        Ok(())
    }

    fn repay_inner(&mut self, user: &AccountId, amount: Amount, journal: &mut Journal) -> EngineResult<Amount> {
        let now = self.clock.now();
        let owed = self.breakdown_at(user, now)?.total()?;
        let repaid = amount.min(owed);
        if repaid == 0 {
            debug!(user = %user, owed, "Nothing to repay");
            return Ok(0);
        }

        journal.burn(&self.stable, user, repaid)?;
        self.state.debts.entry(user.clone()).or_default().add_repayment(repaid, now)?;
        self.events.push(EngineEvent::Repaid {
            user: user.clone(),
            amount: repaid,
            timestamp: now,
        });

        info!(user = %user, requested = amount, repaid, remaining = owed - repaid, "Debt repaid");
        Ok(repaid)
    }

    // Admin operations

    pub fn set_annual_interest_rate(&mut self, caller: &AccountId, rate: TenthPerc) -> EngineResult<()> {
        self.transact("set_annual_interest_rate", |engine, _| {
            engine.ensure_admin(caller)?;
            let interest = engine.state.interest.with_rate(rate)?;
            let params = engine.state.params.with_annual_interest_rate(rate)?;
            engine.state.interest = interest;
            engine.apply_params(params);
            Ok(())
        })
    }

    pub fn set_min_collateral_ratio(&mut self, caller: &AccountId, ratio: TenthPerc) -> EngineResult<()> {
        self.transact("set_min_collateral_ratio", |engine, _| {
            engine.ensure_admin(caller)?;
            let params = engine.state.params.with_min_collateral_ratio(ratio)?;
            engine.apply_params(params);
            Ok(())
        })
    }

    pub fn set_liquidation_penalty(&mut self, caller: &AccountId, penalty: TenthPerc) -> EngineResult<()> {
        self.transact("set_liquidation_penalty", |engine, _| {
            engine.ensure_admin(caller)?;
            let params = engine.state.params.with_liquidation_penalty(penalty)?;
            engine.apply_params(params);
            Ok(())
        })
    }

    fn apply_params(&mut self, params: RiskParameters) {
        self.state.params = params;
        self.events.push(EngineEvent::RiskParametersUpdated { params });
        info!(
            interest_rate = params.annual_interest_rate_tenth_perc,
            min_collateral_ratio = params.min_collateral_ratio_tenth_perc,
            liquidation_penalty = params.liquidation_penalty_tenth_perc,
            liquidation_threshold = params.liquidation_threshold_tenth_perc(),
            "Risk parameters updated"
        );
    }

    pub fn set_seizure_destination(&mut self, caller: &AccountId, destination: AccountId) -> EngineResult<()> {
        self.transact("set_seizure_destination", |engine, _| {
            engine.ensure_admin(caller)?;
            info!(previous = %engine.state.seizure_destination, current = %destination, "Seizure destination updated");
            engine.state.seizure_destination = destination.clone();
            engine.events.push(EngineEvent::SeizureDestinationUpdated { destination });
            Ok(())
        })
    }

    pub fn transfer_admin(&mut self, caller: &AccountId, new_admin: AccountId) -> EngineResult<()> {
        self.transact("transfer_admin", |engine, _| {
            engine.ensure_admin(caller)?;
            let previous = std::mem::replace(&mut engine.state.admin, new_admin.clone());
            info!(previous = %previous, current = %new_admin, "Admin transferred");
            engine.events.push(EngineEvent::AdminTransferred {
                previous,
                current: new_admin,
            });
            Ok(())
        })
    }

    pub fn register_adapter(&mut self, caller: &AccountId, adapter: TokenAdapter) -> EngineResult<()> {
        self.transact("register_adapter", |engine, _| {
            engine.ensure_admin(caller)?;
            let event = EngineEvent::AdapterRegistered {
                symbol: adapter.symbol().to_string(),
                token: adapter.token_id().clone(),
                symbol_key: adapter.symbol_key().to_string(),
            };
            info!(symbol = %adapter.symbol(), token = %adapter.token_id(), key = %adapter.symbol_key(), "Token adapter registered");
            engine.state.registry.register(adapter)?;
            engine.events.push(event);
            Ok(())
        })
    }

    pub fn rebind_adapter_oracle(&mut self, caller: &AccountId, symbol: &str, oracle: Arc<dyn PriceOracle>) -> EngineResult<()> {
        self.transact("rebind_adapter_oracle", |engine, _| {
            engine.ensure_admin(caller)?;
            engine.state.registry.rebind_oracle(symbol, oracle)?;
            engine.record_rebind(symbol)
        })
    }

    /// Rejected while any user still holds a deposit of the current token
    pub fn rebind_adapter_token(&mut self, caller: &AccountId, symbol: &str, token: Arc<dyn FungibleToken>) -> EngineResult<()> {
        self.transact("rebind_adapter_token", |engine, _| {
            engine.ensure_admin(caller)?;
            let current = engine.state.registry.get_by_symbol(symbol)?.token_id().clone();
            let deposited = engine.state.vault.total_deposited(&current);
            if deposited > 0 {
                return Err(EngineError::AdapterInUse {
                    symbol: symbol.to_string(),
                    deposited,
                });
            }

            engine.state.registry.rebind_token(symbol, token)?;
            engine.record_rebind(symbol)
        })
    }

    fn record_rebind(&mut self, symbol: &str) -> EngineResult<()> {
        let adapter = self.state.registry.get_by_symbol(symbol)?;
        let event = EngineEvent::AdapterRebound {
            symbol: symbol.to_string(),
            token: adapter.token_id().clone(),
            oracle: adapter.oracle().id().to_string(),
        };
        info!(symbol, token = %adapter.token_id(), oracle = %adapter.oracle().id(), "Token adapter rebound");
        self.events.push(event);
        Ok(())
    }

    // Debt queries

    pub fn debt_breakdown(&self, user: &AccountId) -> EngineResult<DebtBreakdown> {
        self.breakdown_at(user, self.clock.now())
    }

    /// Base plus accrued interest as of now
    pub fn total_debt(&self, user: &AccountId) -> EngineResult<Amount> {
        self.debt_breakdown(user)?.total()
    }

    pub fn debt_events(&self, user: &AccountId) -> &[DebtEvent] {
        self.state.debts.get(user).map(DebtLedger::events).unwrap_or(&[])
    }

    // Collateral queries

    pub fn collateral_value(&self, user: &AccountId) -> EngineResult<Amount> {
        self.calculator().collateral_value(user)
    }

    pub fn collateral_ratio(&self, user: &AccountId) -> EngineResult<CollateralRatio> {
        let debt = self.total_debt(user)?;
        self.calculator().collateral_ratio(user, debt)
    }

    pub fn max_borrow(&self, user: &AccountId) -> EngineResult<Amount> {
        let debt = self.total_debt(user)?;
        self.calculator().max_borrow(user, debt)
    }

    pub fn max_withdraw_value(&self, user: &AccountId) -> EngineResult<Amount> {
        let debt = self.total_debt(user)?;
        self.calculator().max_withdraw_value(user, debt)
    }

    pub fn max_tokens_to_withdraw(&self, user: &AccountId) -> EngineResult<Vec<TokenBalance>> {
        let debt = self.total_debt(user)?;
        self.calculator().max_tokens_to_withdraw(user, debt)
    }

    pub fn user_token_balance(&self, user: &AccountId, token: &TokenId) -> Amount {
        self.state.vault.balance(user, token)
    }

    /// Every registered token in registration order, zero when not held
    pub fn user_token_balances(&self, user: &AccountId) -> Vec<TokenBalance> {
        self.state
            .registry
            .adapters()
            .iter()
            .map(|adapter| TokenBalance {
                token: adapter.token_id().clone(),
                symbol: adapter.symbol().to_string(),
                amount: self.state.vault.balance(user, adapter.token_id()),
            })
            .collect()
    }

    // Registry queries

    pub fn token_symbols(&self) -> Vec<String> {
        self.state.registry.symbols()
    }

    pub fn adapters(&self) -> Vec<AdapterInfo> {
        self.state.registry.infos()
    }

    pub fn adapter(&self, symbol: &str) -> EngineResult<AdapterInfo> {
        self.state.registry.get_by_symbol(symbol).map(TokenAdapter::info)
    }

    /// Value of `amount` units of `token` in stable units
    pub fn token_price_in_stable(&self, token: &TokenId, amount: Amount) -> EngineResult<Amount> {
        self.state.registry.get(token)?.price_of(amount, self.stable.decimals())
    }

    // Debtor queries

    /// Every identity that has ever deposited or borrowed, first-join order
    pub fn all_debtors(&self) -> &[AccountId] {
        self.state.debtors.all()
    }

    /// Known debtors with non-zero total debt
    pub fn current_debtors(&self) -> EngineResult<Vec<AccountId>> {
        let now = self.clock.now();
        let mut current = Vec::new();
        for user in self.state.debtors.all() {
            if self.breakdown_at(user, now)?.total()? > 0 {
                current.push(user.clone());
            }
        }
        Ok(current)
    }

    // Parameters and roles

    pub fn risk_parameters(&self) -> RiskParameters {
        self.state.params
    }

    pub fn annual_interest_rate(&self) -> TenthPerc {
        self.state.params.annual_interest_rate_tenth_perc
    }

    pub fn max_annual_interest_rate(&self) -> TenthPerc {
        self.state.interest.max_annual_rate_tenth_perc()
    }

    pub fn min_collateral_ratio(&self) -> TenthPerc {
        self.state.params.min_collateral_ratio_tenth_perc
    }

    pub fn liquidation_penalty(&self) -> TenthPerc {
        self.state.params.liquidation_penalty_tenth_perc
    }

    pub fn liquidation_threshold(&self) -> TenthPerc {
        self.state.params.liquidation_threshold_tenth_perc()
    }

    pub fn admin(&self) -> &AccountId {
        &self.state.admin
    }

    pub fn seizure_destination(&self) -> &AccountId {
        &self.state.seizure_destination
    }

    pub fn custody(&self) -> &AccountId {
        &self.custody
    }

    pub fn stable_token(&self) -> &Arc<dyn FungibleToken> {
        &self.stable
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    // Event log

    /// Events committed since the last drain, oldest first
    pub fn events(&self) -> &[EngineEvent] {
        &self.events
    }

    /// Hands the committed events to the caller and empties the log.
    ///
    /// The log grows with every committed operation until drained; hosts
    /// that keep the engine running should drain it on a schedule.
    pub fn drain_events(&mut self) -> Vec<EngineEvent> {
        std::mem::take(&mut self.events)
    }
}
