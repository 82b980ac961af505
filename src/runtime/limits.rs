//! Composable execution limits.
//!
//! A [`Limit`] is a named collection of keyed rules. Rules act through two
//! hooks: [`LimitRule::install`] wraps a subtag's handler when the
//! invocation-scoped handler table is built, and [`LimitRule::check`] spends
//! budget at explicit checkpoints (one per subtag call, plus loop-count
//! checks before any iteration runs). Budgets are additive across nested
//! invocations: a nested tag receives the parent's remaining state by value
//! and hands its own remaining state back when it finishes.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::errors::ErrorKind;
use crate::runtime::arguments::Arguments;
use crate::runtime::context::TagContext;
use crate::runtime::Interrupt;
use crate::subtags::{HandlerRef, Output, SubtagHandler};

// ============================================================================
// RULES
// ============================================================================

/// One restriction attached to a key within a [`Limit`].
pub trait LimitRule: Send + Sync {
    /// Wraps the handler of the subtag this rule is keyed to. The default
    /// leaves the handler untouched.
    fn install(&self, _name: &str, handler: HandlerRef) -> HandlerRef {
        handler
    }

    /// Spends `count` units of whatever this rule meters. An `Err` carries
    /// the user-facing message for the limit error.
    fn check(&self, _count: u64) -> Result<(), String> {
        Ok(())
    }

    /// Human-readable restriction, for limit listings.
    fn display(&self) -> Option<String>;

    /// Serializable remaining-budget state.
    fn state(&self) -> Value {
        Value::Null
    }

    /// Restores remaining budget from [`LimitRule::state`] output.
    fn load(&self, _state: &Value) {}

    /// A copy of this rule with its budget reset to the initial value.
    fn fresh(&self) -> Arc<dyn LimitRule>;
}

/// A finite budget of uses. Decrementing below zero fails the check; the
/// budget stays exhausted rather than being restored.
pub struct UseCountRule {
    initial: i64,
    remaining: AtomicI64,
    /// What is being counted, e.g. "loops" or "uses".
    kind: &'static str,
}

impl UseCountRule {
    pub fn new(initial: i64, kind: &'static str) -> Self {
        Self {
            initial,
            remaining: AtomicI64::new(initial),
            kind,
        }
    }

    pub fn remaining(&self) -> i64 {
        self.remaining.load(Ordering::Relaxed).max(0)
    }
}

impl LimitRule for UseCountRule {
    fn check(&self, count: u64) -> Result<(), String> {
        let spent = count as i64;
        let after = self.remaining.fetch_sub(spent, Ordering::Relaxed) - spent;
        if after < 0 {
            Err(format!("Maximum {} {} reached", self.initial, self.kind))
        } else {
            Ok(())
        }
    }

    fn display(&self) -> Option<String> {
        Some(format!("Maximum {} {}", self.initial, self.kind))
    }

    fn state(&self) -> Value {
        json!(self.remaining.load(Ordering::Relaxed))
    }

    fn load(&self, state: &Value) {
        if let Some(remaining) = state.as_i64() {
            self.remaining.store(remaining, Ordering::Relaxed);
        }
    }

    fn fresh(&self) -> Arc<dyn LimitRule> {
        Arc::new(Self::new(self.initial, self.kind))
    }
}

/// Rejects every use of the subtag it is keyed to.
pub struct DisabledRule;

struct DisabledHandler {
    name: String,
}

#[async_trait]
impl SubtagHandler for DisabledHandler {
    async fn invoke(
        &self,
        ctx: &mut TagContext,
        _args: &mut Arguments<'_>,
    ) -> Result<Output, Interrupt> {
        Err(ctx.abort(ErrorKind::LimitExceeded {
            rule: format!("{{{}}} is disabled", self.name),
        }))
    }
}

impl LimitRule for DisabledRule {
    fn install(&self, name: &str, _handler: HandlerRef) -> HandlerRef {
        Arc::new(DisabledHandler {
            name: name.to_string(),
        })
    }

    fn display(&self) -> Option<String> {
        Some("Cannot be used".to_string())
    }

    fn fresh(&self) -> Arc<dyn LimitRule> {
        Arc::new(Self)
    }
}

/// Restricts the subtag it is keyed to, to staff invokers. Checked at call
/// time against the invocation's staff flag.
pub struct StaffOnlyRule;

struct StaffOnlyHandler {
    name: String,
    inner: HandlerRef,
}

#[async_trait]
impl SubtagHandler for StaffOnlyHandler {
    async fn invoke(
        &self,
        ctx: &mut TagContext,
        args: &mut Arguments<'_>,
    ) -> Result<Output, Interrupt> {
        if !ctx.is_staff {
            return Err(ctx.abort(ErrorKind::LimitExceeded {
                rule: format!("{{{}}} is limited to staff", self.name),
            }));
        }
        self.inner.invoke(ctx, args).await
    }
}

impl LimitRule for StaffOnlyRule {
    fn install(&self, name: &str, handler: HandlerRef) -> HandlerRef {
        Arc::new(StaffOnlyHandler {
            name: name.to_string(),
            inner: handler,
        })
    }

    fn display(&self) -> Option<String> {
        Some("Limited to staff".to_string())
    }

    fn fresh(&self) -> Arc<dyn LimitRule> {
        Arc::new(Self)
    }
}

// ============================================================================
// LIMITS
// ============================================================================

/// A named bundle of keyed rules governing one invocation.
///
/// Keys are either a subtag name (rules installed onto that subtag's
/// handler) or a checkpoint key such as `subtag` or `repeat:loops` (rules
/// spent through [`Limit::check`]). Multiple rules may share a key.
pub struct Limit {
    pub id: &'static str,
    rules: Vec<(String, Arc<dyn LimitRule>)>,
}

impl Limit {
    pub fn new(id: &'static str) -> Self {
        Self {
            id,
            rules: Vec::new(),
        }
    }

    pub fn add(mut self, key: &str, rule: impl LimitRule + 'static) -> Self {
        self.rules.push((key.to_string(), Arc::new(rule)));
        self
    }

    /// Spends `count` against every rule keyed to `key`.
    pub fn check(&self, key: &str, count: u64) -> Result<(), String> {
        for (rule_key, rule) in &self.rules {
            if rule_key == key {
                rule.check(count)?;
            }
        }
        Ok(())
    }

    /// Folds `handler` through every rule keyed to the subtag's name.
    pub fn install_all(&self, name: &str, handler: HandlerRef) -> HandlerRef {
        self.rules
            .iter()
            .filter(|(key, _)| key == name)
            .fold(handler, |handler, (_, rule)| rule.install(name, handler))
    }

    /// Remaining-budget snapshot for every rule, in declaration order.
    pub fn state(&self) -> Value {
        Value::Array(
            self.rules
                .iter()
                .map(|(key, rule)| json!([key, rule.state()]))
                .collect(),
        )
    }

    /// Restores rule budgets from a [`Limit::state`] snapshot. Entries pair
    /// positionally, so snapshots only round-trip between forks of the same
    /// limit.
    pub fn load(&self, state: &Value) {
        let Value::Array(entries) = state else {
            return;
        };
        for ((_, rule), entry) in self.rules.iter().zip(entries) {
            if let Some(rule_state) = entry.get(1) {
                rule.load(rule_state);
            }
        }
    }

    /// A structurally identical limit with every budget reset.
    pub fn fork(&self) -> Limit {
        Limit {
            id: self.id,
            rules: self
                .rules
                .iter()
                .map(|(key, rule)| (key.clone(), rule.fresh()))
                .collect(),
        }
    }

    /// `(key, restriction)` pairs for documentation listings.
    pub fn describe(&self) -> Vec<(String, String)> {
        self.rules
            .iter()
            .filter_map(|(key, rule)| rule.display().map(|text| (key.clone(), text)))
            .collect()
    }
}

/// The default limit for user-authored tags.
pub fn tag_default() -> Limit {
    Limit::new("tag")
        .add("subtag", UseCountRule::new(10_000, "subtags"))
        .add("repeat:loops", UseCountRule::new(5_000, "loops"))
        .add("foreach:loops", UseCountRule::new(3_000, "loops"))
        .add("waitreaction", UseCountRule::new(5, "uses"))
}

/// The default limit for moderator-managed custom commands. Wider budgets,
/// same checkpoint keys.
pub fn custom_command_default() -> Limit {
    Limit::new("customcommand")
        .add("subtag", UseCountRule::new(200_000, "subtags"))
        .add("repeat:loops", UseCountRule::new(10_000, "loops"))
        .add("foreach:loops", UseCountRule::new(10_000, "loops"))
        .add("waitreaction", UseCountRule::new(20, "uses"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn use_count_spends_and_exhausts() {
        let rule = UseCountRule::new(3, "loops");
        assert!(rule.check(2).is_ok());
        assert!(rule.check(1).is_ok());
        let err = rule.check(1).unwrap_err();
        assert_eq!(err, "Maximum 3 loops reached");
        // Exhaustion is sticky.
        assert!(rule.check(1).is_err());
    }

    #[test]
    fn oversized_spend_fails_without_partial_grant() {
        let rule = UseCountRule::new(5, "loops");
        assert!(rule.check(6).is_err());
        assert!(rule.check(1).is_err());
    }

    #[test]
    fn checks_only_touch_matching_keys() {
        let limit = Limit::new("test")
            .add("repeat:loops", UseCountRule::new(1, "loops"))
            .add("foreach:loops", UseCountRule::new(1, "loops"));
        assert!(limit.check("repeat:loops", 1).is_ok());
        assert!(limit.check("repeat:loops", 1).is_err());
        assert!(limit.check("foreach:loops", 1).is_ok());
        // Unknown keys are unmetered.
        assert!(limit.check("unmetered", 1_000_000).is_ok());
    }

    #[test]
    fn state_round_trips_into_a_fork() {
        let parent = Limit::new("test").add("subtag", UseCountRule::new(10, "subtags"));
        parent.check("subtag", 4).unwrap();

        let child = parent.fork();
        child.load(&parent.state());
        assert!(child.check("subtag", 6).is_ok());
        assert!(child.check("subtag", 1).is_err());

        // Hand the child's consumption back to the parent.
        parent.load(&child.state());
        assert!(parent.check("subtag", 1).is_err());
    }

    #[test]
    fn fork_resets_budgets_when_not_loaded() {
        let parent = Limit::new("test").add("subtag", UseCountRule::new(2, "subtags"));
        parent.check("subtag", 2).unwrap();
        let child = parent.fork();
        assert!(child.check("subtag", 2).is_ok());
    }

    #[test]
    fn default_limits_describe_their_rules() {
        let limit = tag_default();
        let described = limit.describe();
        assert!(described
            .iter()
            .any(|(key, text)| key == "repeat:loops" && text == "Maximum 5000 loops"));
    }
}
