//! Limit-rule behavior: budgets, structural rules, and nested budget
//! sharing.

mod common;

use bbtag::runtime::external::InMemoryTags;
use bbtag::runtime::limits::{DisabledRule, Limit, StaffOnlyRule, UseCountRule};
use bbtag::InvocationOptions;
use common::Harness;

fn loop_limited(loops: i64) -> Limit {
    Limit::new("test")
        .add("subtag", UseCountRule::new(10_000, "subtags"))
        .add("repeat:loops", UseCountRule::new(loops, "loops"))
        .add("foreach:loops", UseCountRule::new(loops, "loops"))
}

#[tokio::test]
async fn repeat_at_exactly_the_budget_succeeds() {
    let harness = Harness::new();
    let result = harness
        .run_with(
            "{repeat;x;5}",
            InvocationOptions {
                limits: loop_limited(5),
                ..harness.options()
            },
        )
        .await;
    assert_eq!(result.output, "xxxxx");
    assert!(result.errors.is_empty());
}

#[tokio::test]
async fn over_budget_repeat_fails_before_any_output() {
    let harness = Harness::new();
    let result = harness
        .run_with(
            "prefix {repeat;x;6}",
            InvocationOptions {
                limits: loop_limited(5),
                ..harness.options()
            },
        )
        .await;
    // Fatal: the whole output is the limit message, not "prefix xxx...".
    assert_eq!(result.output, "`Maximum 5 loops reached`");
    assert_eq!(result.errors.len(), 1);
}

#[tokio::test]
async fn foreach_budget_counts_elements() {
    let harness = Harness::new();
    let options = InvocationOptions {
        limits: loop_limited(2),
        ..harness.options()
    };
    let result = harness
        .run_with("{foreach;~x;[1,2,3];{get;~x}}", options)
        .await;
    assert_eq!(result.output, "`Maximum 2 loops reached`");
}

#[tokio::test]
async fn subtag_call_budget_is_fatal_when_exhausted() {
    let harness = Harness::new();
    let options = InvocationOptions {
        limits: Limit::new("test").add("subtag", UseCountRule::new(2, "subtags")),
        ..harness.options()
    };
    let result = harness.run_with("{debug;1}{debug;2}{debug;3}", options).await;
    assert_eq!(result.output, "`Maximum 2 subtags reached`");
}

#[tokio::test]
async fn disabled_subtags_abort_when_called() {
    let harness = Harness::new();
    let options = InvocationOptions {
        limits: Limit::new("test").add("throw", DisabledRule),
        ..harness.options()
    };
    let result = harness.run_with("a{throw;ignored}b", options).await;
    assert_eq!(result.output, "`{throw} is disabled`");
}

#[tokio::test]
async fn staff_only_subtags_check_the_invoker() {
    let harness = Harness::new();

    let denied = harness
        .run_with(
            "{debug;x}",
            InvocationOptions {
                limits: Limit::new("test").add("debug", StaffOnlyRule),
                ..harness.options()
            },
        )
        .await;
    assert_eq!(denied.output, "`{debug} is limited to staff`");

    let allowed = harness
        .run_with(
            "ok{debug;x}",
            InvocationOptions {
                limits: Limit::new("test").add("debug", StaffOnlyRule),
                is_staff: true,
                ..harness.options()
            },
        )
        .await;
    assert_eq!(allowed.output, "ok");
    assert_eq!(allowed.debug_entries.len(), 1);
}

#[tokio::test]
async fn nested_tags_share_the_loop_budget_additively() {
    let tags = InMemoryTags::new().with_tag("inner", "{repeat;i;3}");
    let harness = Harness::with_tags(tags);

    // 2 + 3 = 5 fits exactly.
    let result = harness
        .run_with(
            "{repeat;o;2}{exec;inner}",
            InvocationOptions {
                limits: loop_limited(5),
                ..harness.options()
            },
        )
        .await;
    assert_eq!(result.output, "ooiii");

    // 3 + 3 exceeds the shared budget; the nested loop trips it.
    let result = harness
        .run_with(
            "{repeat;o;3}{exec;inner}",
            InvocationOptions {
                limits: loop_limited(5),
                ..harness.options()
            },
        )
        .await;
    assert_eq!(result.output, "`Maximum 5 loops reached`");
}

#[tokio::test]
async fn consumption_inside_exec_counts_against_the_caller() {
    let tags = InMemoryTags::new().with_tag("inner", "{repeat;i;3}");
    let harness = Harness::with_tags(tags);
    // Same total as above but with the nested tag first.
    let result = harness
        .run_with(
            "{exec;inner}{repeat;o;3}",
            InvocationOptions {
                limits: loop_limited(5),
                ..harness.options()
            },
        )
        .await;
    assert_eq!(result.output, "`Maximum 5 loops reached`");
}
