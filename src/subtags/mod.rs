//! # BBTag Subtag System
//!
//! Subtags are the named operations invocable as `{name;...}`. Each
//! [`SubtagDef`] carries identity (canonical name plus aliases), one or more
//! parameter signatures matched by arity at compile time, and a handler.
//!
//! ## Module Structure
//!
//! - **`control`**: flow control (`if`, `repeat`, `foreach`, `return`, ...)
//! - **`variables`**: variable access (`get`, `set`)
//! - **`arrays`**: array mutation (`push`, `pop`, `sort`, ...)
//! - **`json`**: JSON path access (`jget`)
//! - **`regexes`**: defensive regex operations
//! - **`platform`**: entity lookups against the hosting platform
//! - **`messages`**: deferred output state and event waits
//!
//! Handlers receive their arguments lazily; evaluating an argument is an
//! explicit act, so conditional and looping subtags decide which subtrees
//! ever run.

use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::runtime::arguments::Arguments;
use crate::runtime::context::TagContext;
use crate::runtime::Interrupt;

pub mod arrays;
pub mod control;
pub mod json;
pub mod messages;
pub mod platform;
pub mod regexes;
pub mod variables;

// ============================================================================
// CORE TYPES
// ============================================================================

/// What a handler produces. Arrays keep their structure until they are
/// merged into surrounding text.
#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    None,
    Text(String),
    Array(Vec<serde_json::Value>),
}

impl Output {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn into_text(self) -> String {
        match self {
            Self::None => String::new(),
            Self::Text(text) => text,
            Self::Array(values) => serde_json::Value::Array(values).to_string(),
        }
    }
}

/// The unified executor contract. Synchronous subtags are trivially lifted;
/// handlers that suspend (store access, sleeps, awaits) do so through the
/// context's collaborators.
#[async_trait::async_trait]
pub trait SubtagHandler: Send + Sync {
    async fn invoke(
        &self,
        ctx: &mut TagContext,
        args: &mut Arguments<'_>,
    ) -> Result<Output, Interrupt>;
}

pub type HandlerRef = Arc<dyn SubtagHandler>;

/// Broad grouping, used for documentation listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubtagCategory {
    Misc,
    Control,
    Variables,
    Array,
    Json,
    Regex,
    Platform,
    Message,
}

// ============================================================================
// SIGNATURES
// ============================================================================

/// Arity class of one parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum Arity {
    Required,
    Optional { default: Option<String> },
    /// Consumes the remaining arguments, at least `min` of them.
    Variadic { min: usize },
    /// Trailing group that is never split further; handlers read it through
    /// the raw argument view.
    GreedyRaw { min: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: &'static str,
    pub arity: Arity,
}

impl Parameter {
    pub fn required(name: &'static str) -> Self {
        Self {
            name,
            arity: Arity::Required,
        }
    }

    pub fn optional(name: &'static str) -> Self {
        Self {
            name,
            arity: Arity::Optional { default: None },
        }
    }

    pub fn optional_or(name: &'static str, default: &str) -> Self {
        Self {
            name,
            arity: Arity::Optional {
                default: Some(default.to_string()),
            },
        }
    }

    pub fn variadic(name: &'static str, min: usize) -> Self {
        Self {
            name,
            arity: Arity::Variadic { min },
        }
    }

    pub fn raw(name: &'static str, min: usize) -> Self {
        Self {
            name,
            arity: Arity::GreedyRaw { min },
        }
    }
}

/// One ordered parameter list. A call matches the first declared signature
/// whose arity constraints accept its argument count.
#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
    pub params: Vec<Parameter>,
}

impl Signature {
    pub fn new(params: impl Into<Vec<Parameter>>) -> Self {
        Self {
            params: params.into(),
        }
    }

    /// Whether `count` arguments satisfy this signature.
    pub fn accepts(&self, count: usize) -> bool {
        let mut min = 0;
        let mut max = Some(0usize);
        for param in &self.params {
            match &param.arity {
                Arity::Required => {
                    min += 1;
                    max = max.map(|m| m + 1);
                }
                Arity::Optional { .. } => {
                    max = max.map(|m| m + 1);
                }
                Arity::Variadic { min: group_min } | Arity::GreedyRaw { min: group_min } => {
                    min += group_min;
                    max = None;
                }
            }
        }
        count >= min && max.map_or(true, |m| count <= m)
    }

    /// Human-readable shape, e.g. `{if;<value>;<then>;[else]}`.
    pub fn render(&self, subtag: &str) -> String {
        let mut out = format!("{{{subtag}");
        for param in &self.params {
            out.push(';');
            match &param.arity {
                Arity::Required => out.push_str(&format!("<{}>", param.name)),
                Arity::Optional { .. } => out.push_str(&format!("[{}]", param.name)),
                Arity::Variadic { .. } | Arity::GreedyRaw { .. } => {
                    out.push_str(&format!("<{}...>", param.name))
                }
            }
        }
        out.push('}');
        out
    }
}

// ============================================================================
// DEFINITIONS
// ============================================================================

/// Folds a constant call to its value at compile time. Receives the literal
/// argument texts; only consulted when every argument subtree is literal.
pub type ConstFold = fn(args: &[String]) -> String;

pub struct SubtagDef {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub category: SubtagCategory,
    pub signatures: Vec<Signature>,
    pub const_fold: Option<ConstFold>,
    pub handler: HandlerRef,
}

impl SubtagDef {
    pub fn new(
        name: &'static str,
        category: SubtagCategory,
        handler: impl SubtagHandler + 'static,
    ) -> Self {
        Self {
            name,
            aliases: &[],
            category,
            signatures: Vec::new(),
            const_fold: None,
            handler: Arc::new(handler),
        }
    }

    pub fn aliases(mut self, aliases: &'static [&'static str]) -> Self {
        self.aliases = aliases;
        self
    }

    pub fn signature(mut self, signature: Signature) -> Self {
        self.signatures.push(signature);
        self
    }

    pub fn const_fold(mut self, fold: ConstFold) -> Self {
        self.const_fold = Some(fold);
        self
    }

    /// Renders every signature shape, for compile diagnostics.
    pub fn expected_shape(&self) -> String {
        self.signatures
            .iter()
            .map(|sig| sig.render(self.name))
            .collect::<Vec<_>>()
            .join(" or ")
    }
}

// ============================================================================
// REGISTRY
// ============================================================================

/// Immutable name-to-definition map. The process-wide default is built once;
/// per-invocation limit wrapping happens on an invocation-scoped overlay of
/// the handlers, never on this shared structure.
#[derive(Default, Clone)]
pub struct SubtagRegistry {
    defs: im::HashMap<String, Arc<SubtagDef>>,
}

impl SubtagRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a definition under its canonical name and every alias.
    pub fn register(&mut self, def: SubtagDef) {
        let def = Arc::new(def);
        for name in std::iter::once(def.name).chain(def.aliases.iter().copied()) {
            self.defs.insert(name.to_string(), Arc::clone(&def));
        }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<SubtagDef>> {
        self.defs.get(name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.defs.contains_key(name)
    }

    /// Canonical names, deduplicated across aliases.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.defs.values().map(|def| def.name).collect();
        names.sort_unstable();
        names.dedup();
        names
    }

    pub fn len(&self) -> usize {
        self.names().len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }
}

/// Registers the standard subtags from every domain module.
pub fn register_all(registry: &mut SubtagRegistry) {
    control::register_control_subtags(registry);
    variables::register_variable_subtags(registry);
    arrays::register_array_subtags(registry);
    json::register_json_subtags(registry);
    regexes::register_regex_subtags(registry);
    platform::register_platform_subtags(registry);
    messages::register_message_subtags(registry);
}

// ============================================================================
// VALUE PARSING
// ============================================================================

/// Lenient boolean parsing shared by condition-taking subtags.
pub(crate) fn parse_bool(text: &str) -> Result<bool, crate::errors::ErrorKind> {
    match text.trim().to_lowercase().as_str() {
        "true" | "t" | "yes" | "y" => Ok(true),
        "false" | "f" | "no" | "n" => Ok(false),
        _ => Err(crate::errors::ErrorKind::NotABoolean { value: text.into() }),
    }
}

pub(crate) fn parse_int(text: &str) -> Result<i64, crate::errors::ErrorKind> {
    text.trim()
        .parse()
        .map_err(|_| crate::errors::ErrorKind::NotANumber { value: text.into() })
}

/// The process-wide registry, built once at startup and shared read-only.
pub fn default_registry() -> &'static SubtagRegistry {
    static REGISTRY: Lazy<SubtagRegistry> = Lazy::new(|| {
        let mut registry = SubtagRegistry::new();
        register_all(&mut registry);
        registry
    });
    &REGISTRY
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_required_one_optional_accepts_two_or_three() {
        let sig = Signature::new(vec![
            Parameter::required("a"),
            Parameter::required("b"),
            Parameter::optional("c"),
        ]);
        assert!(!sig.accepts(1));
        assert!(sig.accepts(2));
        assert!(sig.accepts(3));
        assert!(!sig.accepts(4));
    }

    #[test]
    fn variadic_minimum_is_enforced() {
        let sig = Signature::new(vec![
            Parameter::required("name"),
            Parameter::variadic("values", 2),
        ]);
        assert!(!sig.accepts(2));
        assert!(sig.accepts(3));
        assert!(sig.accepts(10));
    }

    #[test]
    fn greedy_raw_accepts_any_tail() {
        let sig = Signature::new(vec![Parameter::raw("text", 0)]);
        assert!(sig.accepts(0));
        assert!(sig.accepts(5));
    }

    #[test]
    fn render_marks_optional_and_variadic_parameters() {
        let sig = Signature::new(vec![
            Parameter::required("value"),
            Parameter::optional("quiet"),
            Parameter::variadic("rest", 0),
        ]);
        assert_eq!(sig.render("find"), "{find;<value>;[quiet];<rest...>}");
    }

    #[test]
    fn aliases_resolve_to_the_same_definition() {
        let registry = default_registry();
        let canonical = registry.get("comment").map(|def| def.name);
        let alias = registry.get("//").map(|def| def.name);
        assert_eq!(canonical, alias);
        assert!(registry.len() < registry.defs.len() + 1);
    }
}
