//! Variable access façade.
//!
//! Reads are read-through to the external store, except that writes issued
//! earlier in the same invocation are visible immediately. Writes buffer
//! until [`Variables::flush`], which must complete before the invocation is
//! considered finished; keys are last-write-wins with no cross-key
//! atomicity.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::runtime::external::{StoreError, VariableStore};

pub struct Variables {
    store: Arc<dyn VariableStore>,
    /// Pending writes; `None` marks a reset.
    pending: HashMap<String, Option<Value>>,
    flushed: usize,
}

impl Variables {
    pub fn new(store: Arc<dyn VariableStore>) -> Self {
        Self {
            store,
            pending: HashMap::new(),
            flushed: 0,
        }
    }

    /// Read-through get that first consults this invocation's pending writes.
    pub async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        if let Some(pending) = self.pending.get(key) {
            return Ok(pending.clone());
        }
        self.store.get(key).await
    }

    pub fn set(&mut self, key: &str, value: Value) {
        self.pending.insert(key.to_string(), Some(value));
    }

    pub fn reset(&mut self, key: &str) {
        self.pending.insert(key.to_string(), None);
    }

    /// Persists every pending write. Called once when the invocation
    /// completes, whether it succeeded or aborted; issued writes are never
    /// rolled back.
    pub async fn flush(&mut self) -> Result<(), StoreError> {
        let pending = std::mem::take(&mut self.pending);
        let count = pending.len();
        for (key, value) in pending {
            match value {
                Some(value) => self.store.set(&key, value).await?,
                None => self.store.reset(&key).await?,
            }
            self.flushed += 1;
        }
        if count > 0 {
            debug!(writes = count, "flushed variable writes");
        }
        Ok(())
    }

    /// Distinct keys persisted so far by this invocation.
    pub fn write_count(&self) -> usize {
        self.flushed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::external::InMemoryStore;
    use serde_json::json;

    #[tokio::test]
    async fn pending_writes_are_visible_before_flush() {
        let store = Arc::new(InMemoryStore::new());
        let mut variables = Variables::new(store.clone());
        variables.set("~x", json!("1"));
        assert_eq!(variables.get("~x").await.unwrap(), Some(json!("1")));
        // Not persisted yet.
        assert_eq!(store.get("~x").await.unwrap(), None);

        variables.flush().await.unwrap();
        assert_eq!(store.get("~x").await.unwrap(), Some(json!("1")));
        assert_eq!(variables.write_count(), 1);
    }

    #[tokio::test]
    async fn reset_shadows_the_stored_value() {
        let store = Arc::new(InMemoryStore::new());
        store.set("key", json!("old")).await.unwrap();
        let mut variables = Variables::new(store.clone());
        variables.reset("key");
        assert_eq!(variables.get("key").await.unwrap(), None);
        variables.flush().await.unwrap();
        assert_eq!(store.get("key").await.unwrap(), None);
    }

    #[tokio::test]
    async fn last_write_wins_per_key() {
        let store = Arc::new(InMemoryStore::new());
        let mut variables = Variables::new(store.clone());
        variables.set("k", json!(1));
        variables.set("k", json!(2));
        variables.flush().await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(json!(2)));
        assert_eq!(variables.write_count(), 1);
    }
}
