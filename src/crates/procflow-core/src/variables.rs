//! Per-token variable storage
//!
//! Variables are scoped to tokens. Lookups walk from a token up to the root,
//! so variables set on the root are visible everywhere while fork children can
//! shadow them locally. The lineage walk lives in
//! [`ProcessInstance`](crate::instance::ProcessInstance); a store only maps
//! `(token, name)` to a JSON value.

use crate::token::TokenId;
use serde_json::Value;
use std::collections::HashMap;

/// Backend for process variables
pub trait VariableStore: Send + Sync {
    fn get(&self, token: TokenId, name: &str) -> Option<Value>;

    fn set(&mut self, token: TokenId, name: &str, value: Value);

    fn remove(&mut self, token: TokenId, name: &str) -> Option<Value>;

    fn contains(&self, token: TokenId, name: &str) -> bool {
        self.get(token, name).is_some()
    }

    /// Variable names defined directly on `token`, sorted
    fn names(&self, token: TokenId) -> Vec<String>;

    /// Every variable defined directly on `token`
    fn all(&self, token: TokenId) -> HashMap<String, Value>;
}

/// [`VariableStore`] kept in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryVariableStore {
    scopes: HashMap<TokenId, HashMap<String, Value>>,
}

impl InMemoryVariableStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VariableStore for InMemoryVariableStore {
    fn get(&self, token: TokenId, name: &str) -> Option<Value> {
        self.scopes.get(&token)?.get(name).cloned()
    }

    fn set(&mut self, token: TokenId, name: &str, value: Value) {
        self.scopes
            .entry(token)
            .or_default()
            .insert(name.to_string(), value);
    }

    fn remove(&mut self, token: TokenId, name: &str) -> Option<Value> {
        self.scopes.get_mut(&token)?.remove(name)
    }

    fn contains(&self, token: TokenId, name: &str) -> bool {
        self.scopes
            .get(&token)
            .is_some_and(|scope| scope.contains_key(name))
    }

    fn names(&self, token: TokenId) -> Vec<String> {
        let mut names: Vec<String> = self
            .scopes
            .get(&token)
            .map(|scope| scope.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    fn all(&self, token: TokenId) -> HashMap<String, Value> {
        self.scopes.get(&token).cloned().unwrap_or_default()
    }
}
