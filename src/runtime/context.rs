//! Per-invocation execution state.

use std::collections::HashMap;
use std::sync::Arc;

use miette::SourceSpan;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use serde_json::Value;

use crate::arrays::TagArray;
use crate::awaiter::AwaiterPool;
use crate::errors::{BBTagError, ErrorKind, ErrorReporting, SourceContext, SourceInfo, DiagnosticInfo, unspanned};
use crate::runtime::external::{
    ContentLookup, PlatformQuery, ReactionEvent, TagContent, VariableStore,
};
use crate::runtime::limits::Limit;
use crate::runtime::scope::ScopeStack;
use crate::runtime::variables::Variables;
use crate::runtime::Interrupt;
use crate::subtags::{HandlerRef, SubtagRegistry};

/// Deferred message-shaping state, applied by the host after execution.
#[derive(Debug, Default)]
pub struct OutputState {
    /// Single-use full replacement of the rendered output.
    pub output_override: Option<String>,
    /// Deferred first-occurrence replacement applied to the final output.
    pub replace: Option<(String, String)>,
    pub embed: Option<Value>,
    /// Attachment as `(name, content)`.
    pub file: Option<(String, String)>,
}

/// One contained runtime error, kept for the invocation's error log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorEntry {
    /// 1-based line and column of the failing call.
    pub line: usize,
    pub column: usize,
    pub message: String,
}

/// One `{debug}` entry, located at the call that produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DebugEntry {
    pub line: usize,
    pub column: usize,
    pub text: String,
}

/// Everything one invocation carries: scopes, variables, limits, deferred
/// output, diagnostics, and the host collaborators. Nested `exec` runs reuse
/// the context, swapping source, depth, and limits around the nested body.
pub struct TagContext {
    pub source: SourceContext,
    pub tag_name: String,
    pub is_staff: bool,
    pub depth: usize,
    pub max_depth: usize,

    /// The registry this invocation compiles nested sources against.
    pub registry: SubtagRegistry,
    /// Invocation-scoped handler table: the shared registry's handlers with
    /// this invocation's limit rules installed.
    handlers: im::HashMap<String, HandlerRef>,
    pub scopes: ScopeStack,
    pub variables: Variables,
    pub limits: Limit,
    pub output: OutputState,

    pub errors: Vec<ErrorEntry>,
    pub debug_entries: Vec<DebugEntry>,
    timings: HashMap<String, Vec<f64>>,
    lookup_cache: HashMap<String, Option<TagContent>>,
    pub rng: StdRng,

    /// Span of the call currently being executed, for error reporting from
    /// inside handlers.
    pub call_span: SourceSpan,
    /// Set by `return` (and re-raised by nested invocations unwinding to
    /// root); the evaluator consumes it after the current call's output is
    /// committed, so preceding sibling text survives.
    pub pending_return: Option<crate::runtime::ReturnScope>,

    pub platform: Arc<dyn PlatformQuery>,
    pub content: Arc<dyn ContentLookup>,
    pub reactions: AwaiterPool<ReactionEvent>,
}

impl TagContext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: SourceContext,
        tag_name: String,
        registry: &SubtagRegistry,
        limits: Limit,
        store: Arc<dyn VariableStore>,
        platform: Arc<dyn PlatformQuery>,
        content: Arc<dyn ContentLookup>,
        reactions: AwaiterPool<ReactionEvent>,
        is_staff: bool,
        max_depth: usize,
    ) -> Self {
        let handlers = build_handlers(registry, &limits);
        Self {
            source,
            tag_name,
            is_staff,
            depth: 0,
            max_depth,
            registry: registry.clone(),
            handlers,
            scopes: ScopeStack::new(),
            variables: Variables::new(store),
            limits,
            output: OutputState::default(),
            errors: Vec::new(),
            debug_entries: Vec::new(),
            timings: HashMap::new(),
            lookup_cache: HashMap::new(),
            rng: StdRng::from_entropy(),
            call_span: unspanned(),
            pending_return: None,
            platform,
            content,
            reactions,
        }
    }

    /// The limit-wrapped handler for a bound call.
    pub fn handler(&self, name: &str) -> Option<HandlerRef> {
        self.handlers.get(name).cloned()
    }

    // ------------------------------------------------------------------
    // Error helpers
    // ------------------------------------------------------------------

    /// Raises `kind` at the current call site, routed by severity.
    pub fn raise(&self, kind: ErrorKind) -> Interrupt {
        Interrupt::from(self.report(kind, self.call_span))
    }

    /// Raises `kind` as fatal regardless of its category.
    pub fn abort(&self, kind: ErrorKind) -> Interrupt {
        Interrupt::Abort(self.report(kind, self.call_span))
    }

    /// Records a contained error in the invocation's error log. The location
    /// comes from the error's own source, which may be a nested tag's.
    pub fn log_error(&mut self, error: &BBTagError) {
        let (line, column) = error.line_col();
        self.errors.push(ErrorEntry {
            line,
            column,
            message: error.kind.to_string(),
        });
    }

    pub fn debug(&mut self, text: impl Into<String>) {
        let (line, column) = self.source.line_col(self.call_span.offset());
        self.debug_entries.push(DebugEntry {
            line,
            column,
            text: text.into(),
        });
    }

    // ------------------------------------------------------------------
    // Timings
    // ------------------------------------------------------------------

    pub fn record_timing(&mut self, subtag: &str, millis: f64) {
        self.timings
            .entry(subtag.to_string())
            .or_default()
            .push(millis);
    }

    pub fn take_timings(&mut self) -> HashMap<String, Vec<f64>> {
        std::mem::take(&mut self.timings)
    }

    // ------------------------------------------------------------------
    // Content lookup (memoized per invocation)
    // ------------------------------------------------------------------

    pub async fn fetch_content(&mut self, name: &str) -> Option<TagContent> {
        if let Some(cached) = self.lookup_cache.get(name) {
            return cached.clone();
        }
        let found = self.content.lookup(name).await;
        self.lookup_cache.insert(name.to_string(), found.clone());
        found
    }

    // ------------------------------------------------------------------
    // Array resolution
    // ------------------------------------------------------------------

    /// Resolves `text` as an array: a serialized array literal, or the name
    /// of a variable holding one. Variable-resolved arrays remember their
    /// name so mutations write back.
    pub async fn resolve_array(&mut self, text: &str) -> Result<TagArray, Interrupt> {
        if let Some(array) = TagArray::parse(text) {
            return Ok(array);
        }
        let stored = self
            .variables
            .get(text)
            .await
            .map_err(|e| self.store_failure(e))?;
        match stored.and_then(|value| TagArray::from_value(&value)) {
            Some(mut array) => {
                // Remember where it came from so mutations write back.
                array.name.get_or_insert_with(|| text.to_string());
                Ok(array)
            }
            None => Err(self.raise(ErrorKind::NotAnArray { value: text.into() })),
        }
    }

    /// Persists a mutated array. Name-tagged arrays write back to their
    /// variable and produce no output; anonymous arrays serialize instead.
    pub fn write_array(&mut self, array: TagArray) -> Option<String> {
        let TagArray { name, values } = array;
        match name {
            Some(name) => {
                self.variables.set(&name, Value::Array(values));
                None
            }
            None => Some(Value::Array(values).to_string()),
        }
    }

    pub fn store_failure(&self, error: crate::runtime::external::StoreError) -> Interrupt {
        self.raise(ErrorKind::StoreFailure {
            message: error.to_string(),
        })
    }
}

impl ErrorReporting for TagContext {
    fn report(&self, kind: ErrorKind, span: SourceSpan) -> BBTagError {
        let error_code = format!("bbtag::runtime::{}", kind.code_suffix());
        BBTagError {
            kind,
            source_info: SourceInfo {
                source: self.source.to_named_source(),
                primary_span: span,
                phase: "runtime",
            },
            diagnostic_info: DiagnosticInfo {
                help: None,
                error_code,
            },
        }
    }
}

/// Installs the limit's rules onto every registered handler, producing the
/// invocation-scoped table. Aliases share the wrapped handler of their
/// canonical name.
fn build_handlers(registry: &SubtagRegistry, limits: &Limit) -> im::HashMap<String, HandlerRef> {
    let mut handlers = im::HashMap::new();
    for name in registry.names() {
        if let Some(def) = registry.get(name) {
            let wrapped = limits.install_all(name, Arc::clone(&def.handler));
            handlers.insert(name.to_string(), Arc::clone(&wrapped));
            for alias in def.aliases {
                handlers.insert(alias.to_string(), Arc::clone(&wrapped));
            }
        }
    }
    handlers
}
