//! Lazy argument access for subtag handlers.
//!
//! Argument subtrees are compiled but unevaluated when a handler starts.
//! [`Arguments::eval`] evaluates on first access and memoizes, so an
//! argument's side effects happen at most once per call; [`Arguments::execute`]
//! bypasses the memo for loop bodies that must re-run.

use crate::compiler::CompiledCall;
use crate::runtime::context::TagContext;
use crate::runtime::eval::eval_block;
use crate::runtime::Interrupt;
use crate::syntax::Span;

pub struct Arguments<'c> {
    call: &'c CompiledCall,
    memo: Vec<Option<String>>,
}

impl<'c> Arguments<'c> {
    pub fn new(call: &'c CompiledCall) -> Self {
        Self {
            call,
            memo: vec![None; call.args.len()],
        }
    }

    /// The canonical name this call was bound to.
    pub fn subtag(&self) -> &str {
        &self.call.name
    }

    /// Which of the definition's signatures matched.
    pub fn signature(&self) -> usize {
        self.call.signature
    }

    pub fn span(&self) -> Span {
        self.call.span
    }

    pub fn len(&self) -> usize {
        self.call.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.call.args.is_empty()
    }

    pub fn has(&self, index: usize) -> bool {
        index < self.call.args.len()
    }

    /// Evaluates argument `index`, memoized. A missing optional argument
    /// evaluates to the empty string.
    pub async fn eval(&mut self, ctx: &mut TagContext, index: usize) -> Result<String, Interrupt> {
        if !self.has(index) {
            return Ok(String::new());
        }
        if let Some(Some(memoized)) = self.memo.get(index) {
            return Ok(memoized.clone());
        }
        let text = self.run(ctx, index).await?;
        self.memo[index] = Some(text.clone());
        Ok(text)
    }

    /// Evaluates argument `index`, or yields `default` when it is absent or
    /// evaluates to the empty string.
    pub async fn eval_or(
        &mut self,
        ctx: &mut TagContext,
        index: usize,
        default: &str,
    ) -> Result<String, Interrupt> {
        let text = self.eval(ctx, index).await?;
        if text.is_empty() {
            Ok(default.to_string())
        } else {
            Ok(text)
        }
    }

    /// Re-evaluates argument `index` unconditionally, refreshing the memo.
    /// Loop subtags use this for their body argument.
    pub async fn execute(
        &mut self,
        ctx: &mut TagContext,
        index: usize,
    ) -> Result<String, Interrupt> {
        if !self.has(index) {
            return Ok(String::new());
        }
        let text = self.run(ctx, index).await?;
        self.memo[index] = Some(text.clone());
        Ok(text)
    }

    /// The verbatim source of argument `index`, never evaluated.
    pub fn raw(&self, index: usize) -> Option<&str> {
        self.call.args.get(index).map(|arg| arg.raw.as_str())
    }

    /// Verbatim source from argument `index` to the end, re-joined on the
    /// separators the parser split on. Greedy-raw parameters read this.
    pub fn raw_from(&self, index: usize) -> String {
        self.call
            .args
            .iter()
            .skip(index)
            .map(|arg| arg.raw.as_str())
            .collect::<Vec<_>>()
            .join(";")
    }

    async fn run(&self, ctx: &mut TagContext, index: usize) -> Result<String, Interrupt> {
        let output = eval_block(ctx, &self.call.args[index].body)
            .await
            .map_err(Interrupt::Abort)?;
        if let Some(scope) = output.signal {
            return Err(Interrupt::Return(scope));
        }
        Ok(output.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{compile, Executable};
    use crate::errors::SourceContext;
    use crate::subtags::default_registry;
    use crate::syntax::parse;

    fn compile_call(source: &str) -> CompiledCall {
        let sc = SourceContext::new("test", source);
        let statements = parse(source, &sc).unwrap();
        let program = compile(&statements, default_registry(), &sc).unwrap();
        match program.into_iter().next() {
            Some(Executable::Call(call)) => *call,
            _ => panic!("expected a call"),
        }
    }

    #[test]
    fn raw_preserves_nested_source_verbatim() {
        let call = compile_call("{//;Hello {get;~x} world; tail }");
        let args = Arguments::new(&call);
        assert_eq!(args.raw(0), Some("Hello {get;~x} world"));
        assert_eq!(args.raw(1), Some(" tail "));
        assert_eq!(args.raw(2), None);
    }

    #[test]
    fn raw_from_rejoins_on_separators() {
        let call = compile_call("{//;a;b;c}");
        let args = Arguments::new(&call);
        assert_eq!(args.raw_from(0), "a;b;c");
        assert_eq!(args.raw_from(1), "b;c");
        assert_eq!(args.raw_from(3), "");
    }

    #[test]
    fn missing_arguments_are_reported_absent() {
        let call = compile_call("{return}");
        let args = Arguments::new(&call);
        assert!(args.is_empty());
        assert!(!args.has(0));
    }
}
