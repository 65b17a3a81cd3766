//! Persistence boundary for ledger state
//!
//! Durable storage lives outside this crate. The ledger only needs simple
//! get/set of JSON values keyed by strategy id.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::errors::Result;

/// Key prefix for per-strategy effectiveness entries
pub const EFFECTIVENESS_PREFIX: &str = "effectiveness:";

/// Key holding the list of persisted strategy ids
pub const INDEX_KEY: &str = "ledger:index";

/// Key holding the confidence bias table
pub const BIASES_KEY: &str = "ledger:biases";

/// Key holding the context pattern table
pub const CONTEXTS_KEY: &str = "ledger:contexts";

/// Storage key of one strategy's entry
pub fn effectiveness_key(strategy_id: &str) -> String {
    format!("{}{}", EFFECTIVENESS_PREFIX, strategy_id)
}

/// External key/value storage collaborator
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>>;
    async fn set(&self, key: &str, value: serde_json::Value) -> Result<()>;
}

/// Process-local store
#[derive(Debug, Default)]
pub struct InMemoryStore {
    values: RwLock<HashMap<String, serde_json::Value>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.values.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.values.read().await.is_empty()
    }
}

#[async_trait]
impl LedgerStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>> {
        Ok(self.values.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: serde_json::Value) -> Result<()> {
        self.values.write().await.insert(key.to_string(), value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_in_memory_round_trip() {
        let store = InMemoryStore::new();
        assert!(store.is_empty().await);
        assert_eq!(store.get("missing").await.unwrap(), None);

        store.set(&effectiveness_key("generic_retry"), json!({"overall": 0.4})).await.unwrap();
        let value = store.get("effectiveness:generic_retry").await.unwrap().unwrap();
        assert_eq!(value["overall"], 0.4);
        assert_eq!(store.len().await, 1);
    }
}
