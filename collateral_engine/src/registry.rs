//! Registered collateral adapters, one per token symbol

use std::collections::HashMap;
use std::sync::Arc;

use crate::adapter::{AdapterInfo, TokenAdapter};
use crate::error::{EngineError, EngineResult};
use crate::oracle::PriceOracle;
use crate::token::FungibleToken;
use crate::types::TokenId;

/// Adapters in registration order, indexed by symbol and by token identity
#[derive(Debug, Clone, Default)]
pub struct TokenAdapterRegistry {
    adapters: Vec<TokenAdapter>,
    by_symbol: HashMap<String, usize>,
    by_token: HashMap<TokenId, usize>,
}

impl TokenAdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, adapter: TokenAdapter) -> EngineResult<()> {
        let symbol = adapter.symbol().to_string();
        if self.by_symbol.contains_key(&symbol) || self.by_token.contains_key(adapter.token_id()) {
            return Err(EngineError::AdapterAlreadyExists(symbol));
        }

        let index = self.adapters.len();
        self.by_symbol.insert(symbol, index);
        self.by_token.insert(adapter.token_id().clone(), index);
        self.adapters.push(adapter);
        Ok(())
    }

    pub fn get(&self, token: &TokenId) -> EngineResult<&TokenAdapter> {
        self.by_token
            .get(token)
            .map(|&index| &self.adapters[index])
            .ok_or_else(|| EngineError::AdapterNotFound(token.to_string()))
    }

    pub fn get_by_symbol(&self, symbol: &str) -> EngineResult<&TokenAdapter> {
        self.by_symbol
            .get(symbol)
            .map(|&index| &self.adapters[index])
            .ok_or_else(|| EngineError::AdapterNotFound(symbol.to_string()))
    }

    pub fn contains(&self, token: &TokenId) -> bool {
        self.by_token.contains_key(token)
    }

    pub fn rebind_oracle(&mut self, symbol: &str, oracle: Arc<dyn PriceOracle>) -> EngineResult<()> {
        let index = self.index_of(symbol)?;
        self.adapters[index].rebind_oracle(oracle)
    }

    /// Swaps the adapter's token and re-indexes it; returns the previous token
    pub fn rebind_token(&mut self, symbol: &str, token: Arc<dyn FungibleToken>) -> EngineResult<TokenId> {
        let index = self.index_of(symbol)?;
        let new_id = token.id().clone();
        if let Some(&other) = self.by_token.get(&new_id) {
            if other != index {
                return Err(EngineError::AdapterAlreadyExists(symbol.to_string()));
            }
        }

        let previous = self.adapters[index].token_id().clone();
        self.adapters[index].rebind_token(token)?;
        self.by_token.remove(&previous);
        self.by_token.insert(new_id, index);
        Ok(previous)
    }

    fn index_of(&self, symbol: &str) -> EngineResult<usize> {
        self.by_symbol
            .get(symbol)
            .copied()
            .ok_or_else(|| EngineError::AdapterNotFound(symbol.to_string()))
    }

    pub fn adapters(&self) -> &[TokenAdapter] {
        &self.adapters
    }

    pub fn symbols(&self) -> Vec<String> {
        self.adapters.iter().map(|a| a.symbol().to_string()).collect()
    }

    pub fn infos(&self) -> Vec<AdapterInfo> {
        self.adapters.iter().map(TokenAdapter::info).collect()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}
