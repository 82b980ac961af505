//! The block evaluator.
//!
//! Blocks evaluate left to right, concatenating text. Each call is one
//! budget checkpoint; contained runtime errors become inline markers (or the
//! active scope fallback) and evaluation continues with the next sibling.
//! `return` stops the block but keeps the text produced so far; fatal errors
//! propagate out and discard it.

use std::sync::Arc;
use std::time::Instant;

use tracing::debug;

use crate::compiler::{CompiledCall, Executable};
use crate::errors::{to_source_span, BBTagError, ErrorKind};
use crate::runtime::arguments::Arguments;
use crate::runtime::context::TagContext;
use crate::runtime::{BoxFuture, Interrupt, ReturnScope};

/// What a block produced, and whether a `return` cut it short.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockOutput {
    pub text: String,
    pub signal: Option<ReturnScope>,
}

impl BlockOutput {
    pub fn text_only(text: String) -> Self {
        Self { text, signal: None }
    }
}

/// Evaluates a compiled block. Boxed so handlers can recurse through it for
/// their argument subtrees.
pub fn eval_block<'a>(
    ctx: &'a mut TagContext,
    block: &'a [Executable],
) -> BoxFuture<'a, Result<BlockOutput, BBTagError>> {
    Box::pin(async move {
        let mut text = String::new();
        let mut signal = None;
        for node in block {
            match node {
                Executable::Text(literal) | Executable::Const(literal) => text.push_str(literal),
                Executable::Call(call) => match eval_call(ctx, call).await {
                    Ok(produced) => {
                        text.push_str(&produced);
                        if let Some(scope) = ctx.pending_return.take() {
                            signal = Some(scope);
                            break;
                        }
                    }
                    Err(Interrupt::Error(error)) => {
                        let marker = ctx
                            .scopes
                            .fallback()
                            .unwrap_or_else(|| format!("`{}`", error.kind));
                        ctx.log_error(&error);
                        text.push_str(&marker);
                    }
                    Err(Interrupt::Return(scope)) => {
                        signal = Some(scope);
                        break;
                    }
                    Err(Interrupt::Abort(error)) => return Err(error),
                },
            }
        }
        Ok(BlockOutput { text, signal })
    })
}

async fn eval_call(ctx: &mut TagContext, call: &CompiledCall) -> Result<String, Interrupt> {
    if let Err(rule) = ctx.limits.check("subtag", 1) {
        return Err(ctx.abort(ErrorKind::LimitExceeded { rule }));
    }

    let handler = ctx
        .handler(&call.name)
        .unwrap_or_else(|| Arc::clone(&call.def.handler));

    let previous_span = ctx.call_span;
    ctx.call_span = to_source_span(call.span);

    let mut args = Arguments::new(call);
    let started = Instant::now();
    let result = handler.invoke(ctx, &mut args).await;
    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

    ctx.call_span = previous_span;
    ctx.record_timing(&call.name, elapsed_ms);
    debug!(subtag = %call.name, elapsed_ms, ok = result.is_ok(), "subtag executed");

    result.map(|output| output.into_text())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::awaiter::AwaiterPool;
    use crate::compiler::compile;
    use crate::errors::SourceContext;
    use crate::runtime::external::{InMemoryStore, InMemoryTags, NullPlatform};
    use crate::runtime::limits::tag_default;
    use crate::subtags::default_registry;
    use crate::syntax::parse;

    fn context_for(source: &str) -> (TagContext, Vec<Executable>) {
        let sc = SourceContext::new("test", source);
        let statements = parse(source, &sc).unwrap();
        let program = compile(&statements, default_registry(), &sc).unwrap();
        let ctx = TagContext::new(
            sc,
            "test".to_string(),
            default_registry(),
            tag_default(),
            Arc::new(InMemoryStore::new()),
            Arc::new(NullPlatform),
            Arc::new(InMemoryTags::new()),
            AwaiterPool::new(),
            false,
            100,
        );
        (ctx, program)
    }

    #[tokio::test]
    async fn literal_blocks_pass_through() {
        let (mut ctx, program) = context_for("hello {lb}world{rb}");
        let output = eval_block(&mut ctx, &program).await.unwrap();
        assert_eq!(output.text, "hello {world}");
        assert_eq!(output.signal, None);
    }

    #[tokio::test]
    async fn contained_errors_become_markers_and_siblings_run() {
        let (mut ctx, program) = context_for("a {throw;boom} b");
        let output = eval_block(&mut ctx, &program).await.unwrap();
        assert_eq!(output.text, "a `boom` b");
        assert_eq!(ctx.errors.len(), 1);
        assert_eq!(ctx.errors[0].message, "boom");
    }

    #[tokio::test]
    async fn return_keeps_preceding_text() {
        let (mut ctx, program) = context_for("before{return}after");
        let output = eval_block(&mut ctx, &program).await.unwrap();
        assert_eq!(output.text, "before");
        assert_eq!(output.signal, Some(ReturnScope::Root));
    }

    #[tokio::test]
    async fn every_call_records_a_timing() {
        let (mut ctx, program) = context_for("{debug;x}{debug;y}");
        eval_block(&mut ctx, &program).await.unwrap();
        let timings = ctx.take_timings();
        assert_eq!(timings.get("debug").map(Vec::len), Some(2));
    }
}
