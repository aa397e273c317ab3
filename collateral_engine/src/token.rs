//! Fungible token ledger collaborator
//!
//! The engine only needs mint/burn/transfer and metadata; `InMemoryToken` is
//! the reference ledger used by the keeper daemon and the tests.

use dashmap::DashMap;
use thiserror::Error;

use crate::types::{AccountId, Amount, TokenId};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("{token}: insufficient funds for {account} (requested {requested}, available {available})")]
    InsufficientFunds {
        token: TokenId,
        account: AccountId,
        requested: Amount,
        available: Amount,
    },

    #[error("{token}: balance overflow for {account}")]
    Overflow { token: TokenId, account: AccountId },
}

pub trait FungibleToken: Send + Sync {
    fn id(&self) -> &TokenId;

    fn symbol(&self) -> &str;

    fn decimals(&self) -> u8;

    fn balance_of(&self, account: &AccountId) -> Amount;

    fn mint(&self, to: &AccountId, amount: Amount) -> Result<(), LedgerError>;

    fn burn(&self, from: &AccountId, amount: Amount) -> Result<(), LedgerError>;

    fn transfer(&self, from: &AccountId, to: &AccountId, amount: Amount) -> Result<(), LedgerError>;
}

#[derive(Debug)]
pub struct InMemoryToken {
    id: TokenId,
    symbol: String,
    decimals: u8,
    balances: DashMap<AccountId, Amount>,
}

impl InMemoryToken {
    pub fn new(id: impl Into<String>, symbol: impl Into<String>, decimals: u8) -> Self {
        Self {
            id: TokenId::new(id),
            symbol: symbol.into(),
            decimals,
            balances: DashMap::new(),
        }
    }

    pub fn total_supply(&self) -> Amount {
        self.balances.iter().map(|entry| *entry.value()).sum()
    }

    fn debit(&self, account: &AccountId, amount: Amount) -> Result<(), LedgerError> {
        let mut entry = self.balances.entry(account.clone()).or_insert(0);
        let available = *entry;
        if available < amount {
            return Err(LedgerError::InsufficientFunds {
                token: self.id.clone(),
                account: account.clone(),
                requested: amount,
                available,
            });
        }
        *entry = available - amount;
        Ok(())
    }

    fn credit(&self, account: &AccountId, amount: Amount) -> Result<(), LedgerError> {
        let mut entry = self.balances.entry(account.clone()).or_insert(0);
        *entry = entry.checked_add(amount).ok_or_else(|| LedgerError::Overflow {
            token: self.id.clone(),
            account: account.clone(),
        })?;
        Ok(())
    }
}

impl FungibleToken for InMemoryToken {
    fn id(&self) -> &TokenId {
        &self.id
    }

    fn symbol(&self) -> &str {
        &self.symbol
    }

    fn decimals(&self) -> u8 {
        self.decimals
    }

    fn balance_of(&self, account: &AccountId) -> Amount {
        self.balances.get(account).map(|b| *b).unwrap_or(0)
    }

    fn mint(&self, to: &AccountId, amount: Amount) -> Result<(), LedgerError> {
        self.credit(to, amount)
    }

    fn burn(&self, from: &AccountId, amount: Amount) -> Result<(), LedgerError> {
        self.debit(from, amount)
    }

    fn transfer(&self, from: &AccountId, to: &AccountId, amount: Amount) -> Result<(), LedgerError> {
        self.debit(from, amount)?;
        if let Err(err) = self.credit(to, amount) {
            // Put the debited amount back before reporting
            let _ = self.credit(from, amount);
            return Err(err);
        }
        Ok(())
    }
}
