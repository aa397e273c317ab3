//! Append-only registry of every identity that has deposited or borrowed

use std::collections::HashSet;

use crate::types::AccountId;

/// First-join ordered set
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DebtorRegistry {
    order: Vec<AccountId>,
    members: HashSet<AccountId>,
}

impl DebtorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when `user` was not yet known
    pub fn insert(&mut self, user: &AccountId) -> bool {
        if !self.members.insert(user.clone()) {
            return false;
        }
        self.order.push(user.clone());
        true
    }

    pub fn contains(&self, user: &AccountId) -> bool {
        self.members.contains(user)
    }

    pub fn all(&self) -> &[AccountId] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
