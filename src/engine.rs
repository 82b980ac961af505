//! # BBTag Engine
//!
//! The embedding surface: one [`Engine`] per process (or per registry
//! variant), one [`InvocationOptions`] per tag invocation. `execute` runs
//! the full pipeline: parse, compile, evaluate, flush variables, then apply
//! the deferred output transforms.
//!
//! Syntax and compile errors abort before any evaluation and surface as
//! `Err`. Runtime failures never do: contained errors appear inline in the
//! output and in the error log, and a fatal error replaces the output with
//! its marker while still producing an [`ExecutionResult`].

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::awaiter::AwaiterPool;
use crate::compiler::compile;
use crate::errors::{unspanned, BBTagError, ErrorKind, ErrorReporting, SourceContext};
use crate::runtime::context::{DebugEntry, ErrorEntry, TagContext};
use crate::runtime::eval::eval_block;
use crate::runtime::external::{
    ContentLookup, InMemoryStore, InMemoryTags, NullPlatform, PlatformQuery, ReactionEvent,
    VariableStore,
};
use crate::runtime::limits::{tag_default, Limit};
use crate::subtags::{default_registry, SubtagRegistry};
use crate::syntax::parse;

/// A reusable engine bound to one subtag registry.
#[derive(Clone)]
pub struct Engine {
    registry: SubtagRegistry,
}

impl Default for Engine {
    fn default() -> Self {
        Self {
            registry: default_registry().clone(),
        }
    }
}

impl Engine {
    pub fn new(registry: SubtagRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &SubtagRegistry {
        &self.registry
    }

    /// Runs one tag invocation to completion.
    pub async fn execute(
        &self,
        source: &str,
        options: InvocationOptions,
    ) -> Result<ExecutionResult, BBTagError> {
        let source_context = SourceContext::new(options.tag_name.clone(), source);
        let statements = parse(source, &source_context)?;
        let program = compile(&statements, &self.registry, &source_context)?;

        let mut ctx = TagContext::new(
            source_context,
            options.tag_name,
            &self.registry,
            options.limits,
            options.store,
            options.platform,
            options.content,
            options.reactions,
            options.is_staff,
            options.max_depth,
        );

        info!(tag = %ctx.tag_name, limit = ctx.limits.id, "executing tag");

        let mut output = match eval_block(&mut ctx, &program).await {
            Ok(block) => block.text,
            Err(fatal) => {
                ctx.log_error(&fatal);
                format!("`{}`", fatal.kind)
            }
        };

        // Writes issued before a fatal error still persist.
        if let Err(store_error) = ctx.variables.flush().await {
            let error = ctx.report(
                ErrorKind::StoreFailure {
                    message: store_error.to_string(),
                },
                unspanned(),
            );
            ctx.log_error(&error);
        }

        if let Some(replacement) = ctx.output.output_override.take() {
            output = replacement;
        }
        if let Some((from, to)) = ctx.output.replace.take() {
            output = output.replacen(&from, &to, 1);
        }

        debug!(
            tag = %ctx.tag_name,
            errors = ctx.errors.len(),
            writes = ctx.variables.write_count(),
            "tag finished"
        );

        let timings_ms = ctx.take_timings();
        let variable_write_count = ctx.variables.write_count();
        Ok(ExecutionResult {
            output,
            errors: ctx.errors,
            debug_entries: ctx.debug_entries,
            timings_ms,
            variable_write_count,
            embed: ctx.output.embed,
            file: ctx.output.file,
        })
    }
}

/// Everything the host supplies for one invocation. The defaults wire
/// process-local collaborators, suitable for tests and previews.
pub struct InvocationOptions {
    pub tag_name: String,
    pub store: Arc<dyn VariableStore>,
    pub platform: Arc<dyn PlatformQuery>,
    pub content: Arc<dyn ContentLookup>,
    pub reactions: AwaiterPool<ReactionEvent>,
    pub limits: Limit,
    pub is_staff: bool,
    pub max_depth: usize,
}

impl Default for InvocationOptions {
    fn default() -> Self {
        Self {
            tag_name: "tag".to_string(),
            store: Arc::new(InMemoryStore::new()),
            platform: Arc::new(NullPlatform),
            content: Arc::new(InMemoryTags::new()),
            reactions: AwaiterPool::new(),
            limits: tag_default(),
            is_staff: false,
            max_depth: 100,
        }
    }
}

/// The outcome of one invocation.
#[derive(Debug, Serialize)]
pub struct ExecutionResult {
    pub output: String,
    pub errors: Vec<ErrorEntry>,
    pub debug_entries: Vec<DebugEntry>,
    pub timings_ms: HashMap<String, Vec<f64>>,
    pub variable_write_count: usize,
    pub embed: Option<Value>,
    /// Attachment as `(name, content)`.
    pub file: Option<(String, String)>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn plain_text_passes_through() {
        let result = Engine::default()
            .execute("hello world", InvocationOptions::default())
            .await
            .unwrap();
        assert_eq!(result.output, "hello world");
        assert!(result.errors.is_empty());
    }

    #[tokio::test]
    async fn syntax_errors_abort_before_execution() {
        let err = Engine::default()
            .execute("{if;true;x", InvocationOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnmatchedOpenBrace);
    }

    #[tokio::test]
    async fn fatal_errors_replace_the_output() {
        let limits = Limit::new("tiny").add(
            "subtag",
            crate::runtime::limits::UseCountRule::new(0, "subtags"),
        );
        let result = Engine::default()
            .execute(
                "text {debug;x}",
                InvocationOptions {
                    limits,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(result.output, "`Maximum 0 subtags reached`");
        assert_eq!(result.errors.len(), 1);
    }
}
