//! Flow-control subtags.
//!
//! These are the subtags that make laziness observable: `if` evaluates only
//! the taken branch, loops re-execute their body argument, and `exec`/
//! `inject` run whole nested programs under the invocation's shared budget.

use std::time::Duration;

use async_trait::async_trait;

use crate::compiler::compile;
use crate::errors::{ErrorKind, SourceContext};
use crate::runtime::arguments::Arguments;
use crate::runtime::context::TagContext;
use crate::runtime::eval::eval_block;
use crate::runtime::{Interrupt, ReturnScope};
use crate::subtags::{
    parse_bool, parse_int, Output, Parameter, Signature, SubtagCategory, SubtagDef, SubtagHandler,
    SubtagRegistry,
};
use crate::syntax::parse;

/// Longest `{sleep}` accepted, in milliseconds.
const MAX_SLEEP_MS: u64 = 300_000;

pub fn register_control_subtags(registry: &mut SubtagRegistry) {
    registry.register(
        SubtagDef::new("if", SubtagCategory::Control, IfSubtag)
            .signature(Signature::new(vec![
                Parameter::required("value"),
                Parameter::required("then"),
            ]))
            .signature(Signature::new(vec![
                Parameter::required("value"),
                Parameter::required("then"),
                Parameter::optional("else"),
            ]))
            .signature(Signature::new(vec![
                Parameter::required("value1"),
                Parameter::required("evaluator"),
                Parameter::required("value2"),
                Parameter::required("then"),
            ]))
            .signature(Signature::new(vec![
                Parameter::required("value1"),
                Parameter::required("evaluator"),
                Parameter::required("value2"),
                Parameter::required("then"),
                Parameter::optional("else"),
            ])),
    );

    registry.register(
        SubtagDef::new("repeat", SubtagCategory::Control, RepeatSubtag)
            .aliases(&["loop"])
            .signature(Signature::new(vec![
                Parameter::required("code"),
                Parameter::required("amount"),
            ])),
    );

    registry.register(
        SubtagDef::new("foreach", SubtagCategory::Control, ForeachSubtag).signature(
            Signature::new(vec![
                Parameter::required("variable"),
                Parameter::required("array"),
                Parameter::required("code"),
            ]),
        ),
    );

    registry.register(
        SubtagDef::new("return", SubtagCategory::Control, ReturnSubtag).signature(Signature::new(
            vec![Parameter::optional_or("force", "true")],
        )),
    );

    registry.register(
        SubtagDef::new("comment", SubtagCategory::Misc, CommentSubtag)
            .aliases(&["//"])
            .signature(Signature::new(vec![Parameter::raw("anything", 0)]))
            .const_fold(|_| String::new()),
    );

    registry.register(
        SubtagDef::new("lb", SubtagCategory::Misc, LiteralSubtag("{"))
            .signature(Signature::new(vec![]))
            .const_fold(|_| "{".to_string()),
    );
    registry.register(
        SubtagDef::new("rb", SubtagCategory::Misc, LiteralSubtag("}"))
            .signature(Signature::new(vec![]))
            .const_fold(|_| "}".to_string()),
    );
    registry.register(
        SubtagDef::new("semi", SubtagCategory::Misc, LiteralSubtag(";"))
            .signature(Signature::new(vec![]))
            .const_fold(|_| ";".to_string()),
    );

    registry.register(
        SubtagDef::new("exec", SubtagCategory::Control, ExecSubtag)
            .signature(Signature::new(vec![Parameter::required("tag")])),
    );

    registry.register(
        SubtagDef::new("inject", SubtagCategory::Control, InjectSubtag)
            .signature(Signature::new(vec![Parameter::raw("code", 1)])),
    );

    registry.register(
        SubtagDef::new("sleep", SubtagCategory::Control, SleepSubtag)
            .signature(Signature::new(vec![Parameter::required("duration")])),
    );

    registry.register(
        SubtagDef::new("throw", SubtagCategory::Misc, ThrowSubtag).signature(Signature::new(
            vec![Parameter::optional_or("error", "A custom error occurred")],
        )),
    );

    registry.register(
        SubtagDef::new("debug", SubtagCategory::Misc, DebugSubtag)
            .signature(Signature::new(vec![Parameter::variadic("text", 0)])),
    );

    registry.register(
        SubtagDef::new("fallback", SubtagCategory::Misc, FallbackSubtag)
            .signature(Signature::new(vec![Parameter::optional("message")])),
    );
}

// ============================================================================
// CONDITIONALS
// ============================================================================

struct IfSubtag;

#[async_trait]
impl SubtagHandler for IfSubtag {
    async fn invoke(
        &self,
        ctx: &mut TagContext,
        args: &mut Arguments<'_>,
    ) -> Result<Output, Interrupt> {
        let (condition, then_index) = if args.len() <= 3 {
            let value = args.eval(ctx, 0).await?;
            let condition = parse_bool(&value).map_err(|kind| ctx.raise(kind))?;
            (condition, 1)
        } else {
            let lhs = args.eval(ctx, 0).await?;
            let op = args.eval(ctx, 1).await?;
            let rhs = args.eval(ctx, 2).await?;
            (compare(ctx, &lhs, &op, &rhs)?, 3)
        };

        // Only the taken branch's subtree ever runs.
        let branch = if condition {
            args.eval(ctx, then_index).await?
        } else {
            args.eval(ctx, then_index + 1).await?
        };
        Ok(Output::Text(branch))
    }
}

fn compare(ctx: &TagContext, lhs: &str, op: &str, rhs: &str) -> Result<bool, Interrupt> {
    use std::cmp::Ordering;
    let ordering = match (lhs.trim().parse::<f64>(), rhs.trim().parse::<f64>()) {
        (Ok(a), Ok(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
        _ => lhs.cmp(rhs),
    };
    match op.trim() {
        "==" => Ok(ordering == Ordering::Equal),
        "!=" => Ok(ordering != Ordering::Equal),
        ">" => Ok(ordering == Ordering::Greater),
        ">=" => Ok(ordering != Ordering::Less),
        "<" => Ok(ordering == Ordering::Less),
        "<=" => Ok(ordering != Ordering::Greater),
        other => Err(ctx.raise(ErrorKind::Custom {
            message: format!("Invalid operator `{other}`"),
        })),
    }
}

// ============================================================================
// LOOPS
// ============================================================================

struct RepeatSubtag;

#[async_trait]
impl SubtagHandler for RepeatSubtag {
    async fn invoke(
        &self,
        ctx: &mut TagContext,
        args: &mut Arguments<'_>,
    ) -> Result<Output, Interrupt> {
        let amount_text = args.eval(ctx, 1).await?;
        let amount = parse_int(&amount_text).map_err(|kind| ctx.raise(kind))?;
        if amount < 0 {
            return Err(ctx.raise(ErrorKind::NotANumber { value: amount_text }));
        }

        // The whole iteration budget is spent before any output is produced,
        // so an over-budget loop fails without partial output.
        if let Err(rule) = ctx.limits.check("repeat:loops", amount as u64) {
            return Err(ctx.abort(ErrorKind::LimitExceeded { rule }));
        }

        let mut text = String::new();
        for _ in 0..amount {
            match args.execute(ctx, 0).await {
                Ok(body) => text.push_str(&body),
                Err(Interrupt::Return(scope)) => {
                    ctx.pending_return = Some(scope);
                    break;
                }
                Err(other) => return Err(other),
            }
        }
        Ok(Output::Text(text))
    }
}

struct ForeachSubtag;

#[async_trait]
impl SubtagHandler for ForeachSubtag {
    async fn invoke(
        &self,
        ctx: &mut TagContext,
        args: &mut Arguments<'_>,
    ) -> Result<Output, Interrupt> {
        let variable = args.eval(ctx, 0).await?;
        let source = args.eval(ctx, 1).await?;
        let array = ctx.resolve_array(&source).await?;

        if let Err(rule) = ctx.limits.check("foreach:loops", array.len() as u64) {
            return Err(ctx.abort(ErrorKind::LimitExceeded { rule }));
        }

        let mut text = String::new();
        for element in array.values {
            ctx.variables.set(&variable, element);
            match args.execute(ctx, 2).await {
                Ok(body) => text.push_str(&body),
                Err(Interrupt::Return(scope)) => {
                    ctx.pending_return = Some(scope);
                    break;
                }
                Err(other) => return Err(other),
            }
        }
        Ok(Output::Text(text))
    }
}

// ============================================================================
// CONTROL FLOW
// ============================================================================

struct ReturnSubtag;

#[async_trait]
impl SubtagHandler for ReturnSubtag {
    async fn invoke(
        &self,
        ctx: &mut TagContext,
        args: &mut Arguments<'_>,
    ) -> Result<Output, Interrupt> {
        let force = args.eval_or(ctx, 0, "true").await?;
        let scope = if parse_bool(&force).unwrap_or(true) {
            ReturnScope::Root
        } else {
            ReturnScope::Scope
        };
        ctx.pending_return = Some(scope);
        Ok(Output::None)
    }
}

struct CommentSubtag;

#[async_trait]
impl SubtagHandler for CommentSubtag {
    async fn invoke(
        &self,
        _ctx: &mut TagContext,
        _args: &mut Arguments<'_>,
    ) -> Result<Output, Interrupt> {
        // Arguments are never evaluated.
        Ok(Output::None)
    }
}

struct LiteralSubtag(&'static str);

#[async_trait]
impl SubtagHandler for LiteralSubtag {
    async fn invoke(
        &self,
        _ctx: &mut TagContext,
        _args: &mut Arguments<'_>,
    ) -> Result<Output, Interrupt> {
        Ok(Output::text(self.0))
    }
}

// ============================================================================
// NESTED INVOCATION
// ============================================================================

struct ExecSubtag;

#[async_trait]
impl SubtagHandler for ExecSubtag {
    async fn invoke(
        &self,
        ctx: &mut TagContext,
        args: &mut Arguments<'_>,
    ) -> Result<Output, Interrupt> {
        let name = args.eval(ctx, 0).await?.trim().to_string();
        let Some(content) = ctx.fetch_content(&name).await else {
            return Err(ctx.raise(ErrorKind::TagNotFound { name }));
        };
        if ctx.depth + 1 > ctx.max_depth {
            return Err(ctx.abort(ErrorKind::LimitExceeded {
                rule: format!("Max tag nesting depth of {} reached", ctx.max_depth),
            }));
        }

        let child_source = SourceContext::new(name.clone(), content.content.clone());
        let statements = parse(&content.content, &child_source).map_err(Interrupt::from)?;
        let program =
            compile(&statements, &ctx.registry, &child_source).map_err(Interrupt::from)?;

        // Nested budgets are additive: hand the remaining state down by
        // value, then take back whatever the child left.
        let child_limits = ctx.limits.fork();
        child_limits.load(&ctx.limits.state());
        let parent_limits = std::mem::replace(&mut ctx.limits, child_limits);
        let parent_source = std::mem::replace(&mut ctx.source, child_source);
        let parent_name = std::mem::replace(&mut ctx.tag_name, name);
        ctx.depth += 1;
        ctx.scopes.push();

        let result = eval_block(ctx, &program).await;

        ctx.scopes.pop();
        ctx.depth -= 1;
        ctx.tag_name = parent_name;
        ctx.source = parent_source;
        let child_limits = std::mem::replace(&mut ctx.limits, parent_limits);
        ctx.limits.load(&child_limits.state());

        let block = result.map_err(Interrupt::Abort)?;
        if block.signal == Some(ReturnScope::Root) {
            // Keep the child's text and continue unwinding.
            ctx.pending_return = Some(ReturnScope::Root);
        }
        Ok(Output::Text(block.text))
    }
}

struct InjectSubtag;

#[async_trait]
impl SubtagHandler for InjectSubtag {
    async fn invoke(
        &self,
        ctx: &mut TagContext,
        args: &mut Arguments<'_>,
    ) -> Result<Output, Interrupt> {
        let code = args.raw_from(0);
        let injected_source = SourceContext::new(format!("{}:inject", ctx.tag_name), code.clone());
        let statements = parse(&code, &injected_source).map_err(Interrupt::from)?;
        let program =
            compile(&statements, &ctx.registry, &injected_source).map_err(Interrupt::from)?;

        // Injected code runs as if written inline: same scopes, same limits,
        // and its control flow is the caller's control flow.
        let parent_source = std::mem::replace(&mut ctx.source, injected_source);
        let result = eval_block(ctx, &program).await;
        ctx.source = parent_source;

        let block = result.map_err(Interrupt::Abort)?;
        if let Some(scope) = block.signal {
            ctx.pending_return = Some(scope);
        }
        Ok(Output::Text(block.text))
    }
}

// ============================================================================
// MISC
// ============================================================================

struct SleepSubtag;

#[async_trait]
impl SubtagHandler for SleepSubtag {
    async fn invoke(
        &self,
        ctx: &mut TagContext,
        args: &mut Arguments<'_>,
    ) -> Result<Output, Interrupt> {
        let duration_text = args.eval(ctx, 0).await?;
        let millis = parse_int(&duration_text).map_err(|kind| ctx.raise(kind))?;
        if millis < 0 {
            return Err(ctx.raise(ErrorKind::NotANumber {
                value: duration_text,
            }));
        }
        let capped = (millis as u64).min(MAX_SLEEP_MS);
        tokio::time::sleep(Duration::from_millis(capped)).await;
        Ok(Output::None)
    }
}

struct ThrowSubtag;

#[async_trait]
impl SubtagHandler for ThrowSubtag {
    async fn invoke(
        &self,
        ctx: &mut TagContext,
        args: &mut Arguments<'_>,
    ) -> Result<Output, Interrupt> {
        let message = args.eval_or(ctx, 0, "A custom error occurred").await?;
        Err(ctx.raise(ErrorKind::Custom { message }))
    }
}

struct DebugSubtag;

#[async_trait]
impl SubtagHandler for DebugSubtag {
    async fn invoke(
        &self,
        ctx: &mut TagContext,
        args: &mut Arguments<'_>,
    ) -> Result<Output, Interrupt> {
        let mut parts = Vec::with_capacity(args.len());
        for index in 0..args.len() {
            parts.push(args.eval(ctx, index).await?);
        }
        ctx.debug(parts.join(" "));
        Ok(Output::None)
    }
}

struct FallbackSubtag;

#[async_trait]
impl SubtagHandler for FallbackSubtag {
    async fn invoke(
        &self,
        ctx: &mut TagContext,
        args: &mut Arguments<'_>,
    ) -> Result<Output, Interrupt> {
        if args.has(0) {
            let message = args.eval(ctx, 0).await?;
            ctx.scopes.set_fallback(Some(message));
        } else {
            ctx.scopes.set_fallback(None);
        }
        Ok(Output::None)
    }
}
