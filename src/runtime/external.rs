//! Contracts consumed from external collaborators.
//!
//! The engine never owns storage, content, or platform state; it consumes
//! these narrow interfaces. In-memory implementations ship for embedding and
//! tests.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::RwLock;

// ============================================================================
// VARIABLE STORE
// ============================================================================

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("{0}")]
    Backend(String),
}

/// Key-value contract for persisted variables. Prefix routing of keys to
/// storage domains (per-author, per-guild, global, scratch) is the store's
/// responsibility, not the engine's.
#[async_trait]
pub trait VariableStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;
    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError>;
    async fn reset(&self, key: &str) -> Result<(), StoreError>;
}

/// Process-local store, suitable for tests and single-process embedding.
#[derive(Default)]
pub struct InMemoryStore {
    values: RwLock<HashMap<String, Value>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VariableStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.values.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.values.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn reset(&self, key: &str) -> Result<(), StoreError> {
        self.values.write().await.remove(key);
        Ok(())
    }
}

// ============================================================================
// CONTENT LOOKUP
// ============================================================================

/// A stored tag fetched for nested invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagContent {
    pub content: String,
    pub cooldown: u64,
}

/// Resolves stored tag names to their source. Results are memoized per
/// top-level invocation by the execution context.
#[async_trait]
pub trait ContentLookup: Send + Sync {
    async fn lookup(&self, name: &str) -> Option<TagContent>;
}

/// A fixed set of stored tags.
#[derive(Default)]
pub struct InMemoryTags {
    tags: HashMap<String, TagContent>,
}

impl InMemoryTags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tag(mut self, name: &str, content: &str) -> Self {
        self.tags.insert(
            name.to_string(),
            TagContent {
                content: content.to_string(),
                cooldown: 0,
            },
        );
        self
    }
}

#[async_trait]
impl ContentLookup for InMemoryTags {
    async fn lookup(&self, name: &str) -> Option<TagContent> {
        self.tags.get(name).cloned()
    }
}

// ============================================================================
// PLATFORM QUERY
// ============================================================================

/// A resolved platform entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub name: String,
}

/// Resolves textual references (id, name, mention) against the hosting
/// platform. `None` means not found; quiet handling is the caller's choice.
#[async_trait]
pub trait PlatformQuery: Send + Sync {
    async fn find_channel(&self, query: &str) -> Option<Entity>;
    async fn find_user(&self, query: &str) -> Option<Entity>;
    async fn find_role(&self, query: &str) -> Option<Entity>;
}

/// A platform with nothing in it.
#[derive(Default)]
pub struct NullPlatform;

#[async_trait]
impl PlatformQuery for NullPlatform {
    async fn find_channel(&self, _query: &str) -> Option<Entity> {
        None
    }

    async fn find_user(&self, _query: &str) -> Option<Entity> {
        None
    }

    async fn find_role(&self, _query: &str) -> Option<Entity> {
        None
    }
}

/// Fixed entity sets for tests.
#[derive(Default)]
pub struct InMemoryPlatform {
    pub channels: Vec<Entity>,
    pub users: Vec<Entity>,
    pub roles: Vec<Entity>,
}

impl InMemoryPlatform {
    fn find(pool: &[Entity], query: &str) -> Option<Entity> {
        pool.iter()
            .find(|entity| entity.id == query || entity.name.eq_ignore_ascii_case(query))
            .cloned()
    }
}

#[async_trait]
impl PlatformQuery for InMemoryPlatform {
    async fn find_channel(&self, query: &str) -> Option<Entity> {
        Self::find(&self.channels, query)
    }

    async fn find_user(&self, query: &str) -> Option<Entity> {
        Self::find(&self.users, query)
    }

    async fn find_role(&self, query: &str) -> Option<Entity> {
        Self::find(&self.roles, query)
    }
}

// ============================================================================
// AWAITED EVENTS
// ============================================================================

/// A reaction observed by the host, delivered into the reaction pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReactionEvent {
    pub message_id: String,
    pub user_id: String,
    pub emote: String,
}
