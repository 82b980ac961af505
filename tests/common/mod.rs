//! Shared harness for engine integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use bbtag::awaiter::AwaiterPool;
use bbtag::runtime::external::{InMemoryStore, InMemoryTags, ReactionEvent};
use bbtag::{Engine, ExecutionResult, InvocationOptions};

/// One engine plus in-memory collaborators, shared across executions so
/// tests can inspect the store or deliver events mid-run.
pub struct Harness {
    pub engine: Engine,
    pub store: Arc<InMemoryStore>,
    pub tags: Arc<InMemoryTags>,
    pub reactions: AwaiterPool<ReactionEvent>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_tags(InMemoryTags::new())
    }

    pub fn with_tags(tags: InMemoryTags) -> Self {
        // Once per process; later calls fail harmlessly.
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        Self {
            engine: Engine::default(),
            store: Arc::new(InMemoryStore::new()),
            tags: Arc::new(tags),
            reactions: AwaiterPool::new(),
        }
    }

    /// Default options wired to this harness's collaborators.
    pub fn options(&self) -> InvocationOptions {
        InvocationOptions {
            store: self.store.clone(),
            content: self.tags.clone(),
            reactions: self.reactions.clone(),
            ..Default::default()
        }
    }

    pub async fn run(&self, source: &str) -> ExecutionResult {
        self.engine
            .execute(source, self.options())
            .await
            .expect("execution should not fail to compile")
    }

    pub async fn run_with(&self, source: &str, options: InvocationOptions) -> ExecutionResult {
        self.engine
            .execute(source, options)
            .await
            .expect("execution should not fail to compile")
    }
}

/// One-shot execution with fresh collaborators.
pub async fn run(source: &str) -> ExecutionResult {
    Harness::new().run(source).await
}
