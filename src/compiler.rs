//! Binds parsed calls to executable units.
//!
//! Compilation resolves every call against the registry: the subtag must
//! exist (by name or alias) and the first declared signature whose arity
//! accepts the call's argument count wins. No match is a compile error that
//! names the subtag and its expected shape; arguments are never silently
//! dropped. Constant subtags whose argument subtrees are all literal fold to
//! their value here and cost nothing at runtime.

use std::sync::Arc;

use crate::errors::{to_source_span, BBTagError, ErrorKind, ErrorReporting, PhaseContext, SourceContext};
use crate::subtags::{SubtagDef, SubtagRegistry};
use crate::syntax::{stringify, Span, Statement};

/// One node of the compiled program.
#[derive(Clone)]
pub enum Executable {
    /// Literal text from the source.
    Text(String),
    /// A call folded to a constant at compile time.
    Const(String),
    Call(Box<CompiledCall>),
}

/// A call bound to its definition and matched signature.
#[derive(Clone)]
pub struct CompiledCall {
    /// Canonical lookup key: the written name, trimmed and lowercased.
    pub name: String,
    pub def: Arc<SubtagDef>,
    /// Index into `def.signatures` of the matched signature.
    pub signature: usize,
    pub args: Vec<CompiledArg>,
    pub span: Span,
}

/// One compiled argument subtree, with its verbatim source kept for raw
/// parameter access.
#[derive(Clone)]
pub struct CompiledArg {
    pub body: Vec<Executable>,
    pub raw: String,
}

/// Compiles a parsed statement sequence against `registry`.
pub fn compile(
    statements: &[Statement],
    registry: &SubtagRegistry,
    source: &SourceContext,
) -> Result<Vec<Executable>, BBTagError> {
    let reporter = PhaseContext::new(source.clone(), "compiler");
    compile_block(statements, registry, &reporter)
}

fn compile_block(
    statements: &[Statement],
    registry: &SubtagRegistry,
    reporter: &PhaseContext,
) -> Result<Vec<Executable>, BBTagError> {
    statements
        .iter()
        .map(|statement| match statement {
            Statement::Text(text) => Ok(Executable::Text(text.clone())),
            Statement::Call(call) => compile_call(call, registry, reporter),
        })
        .collect()
}

fn compile_call(
    call: &crate::syntax::SubtagCall,
    registry: &SubtagRegistry,
    reporter: &PhaseContext,
) -> Result<Executable, BBTagError> {
    let name = call.name.trim().to_lowercase();
    let span = to_source_span(call.span);

    let Some(def) = registry.get(&name) else {
        return Err(reporter.report(ErrorKind::UnknownSubtag { name }, span));
    };

    let signature = def
        .signatures
        .iter()
        .position(|sig| sig.accepts(call.args.len()))
        .ok_or_else(|| {
            reporter.report(
                ErrorKind::NoMatchingSignature {
                    subtag: name.clone(),
                    expected: def.expected_shape(),
                    actual: call.args.len(),
                },
                span,
            )
        })?;

    let args = call
        .args
        .iter()
        .map(|arg| {
            Ok(CompiledArg {
                body: compile_block(arg, registry, reporter)?,
                raw: stringify(arg),
            })
        })
        .collect::<Result<Vec<_>, BBTagError>>()?;

    if let Some(fold) = def.const_fold {
        let literals: Option<Vec<String>> = args
            .iter()
            .map(|arg| match arg.body.as_slice() {
                [] => Some(String::new()),
                [Executable::Text(text)] => Some(text.clone()),
                _ => None,
            })
            .collect();
        if let Some(literals) = literals {
            return Ok(Executable::Const(fold(&literals)));
        }
    }

    Ok(Executable::Call(Box::new(CompiledCall {
        name,
        def: Arc::clone(def),
        signature,
        args,
        span: call.span,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::subtags::default_registry;
    use crate::syntax::parse;

    fn compile_source(source: &str) -> Result<Vec<Executable>, BBTagError> {
        let sc = SourceContext::new("test", source);
        let statements = parse(source, &sc)?;
        compile(&statements, default_registry(), &sc)
    }

    #[test]
    fn literal_emitters_fold_to_constants() {
        let program = compile_source("{lb}{semi}{rb}").unwrap();
        let folded: Vec<_> = program
            .iter()
            .map(|node| match node {
                Executable::Const(text) => text.as_str(),
                _ => panic!("expected constant folding"),
            })
            .collect();
        assert_eq!(folded, vec!["{", ";", "}"]);
    }

    #[test]
    fn comment_with_nested_call_stays_a_call() {
        // A non-literal argument defeats folding; laziness still guarantees
        // the body never executes.
        let program = compile_source("{//;{get;~x}}").unwrap();
        assert!(matches!(program[0], Executable::Call(_)));
    }

    #[test]
    fn unknown_subtag_is_a_compile_error() {
        let err = compile_source("{definitelynotasubtag}").err().unwrap();
        assert_eq!(
            err.kind,
            ErrorKind::UnknownSubtag {
                name: "definitelynotasubtag".into()
            }
        );
    }

    #[test]
    fn name_lookup_trims_and_lowercases() {
        assert!(compile_source("{ LB }").is_ok());
    }

    #[test]
    fn arity_mismatch_names_subtag_and_shape() {
        let err = compile_source("{sort}").err().unwrap();
        let ErrorKind::NoMatchingSignature {
            subtag,
            expected,
            actual,
        } = err.kind
        else {
            panic!("expected a signature error, got {:?}", err.kind);
        };
        assert_eq!(subtag, "sort");
        assert_eq!(actual, 0);
        assert!(expected.contains("{sort;<array>"));
    }

    #[test]
    fn first_accepting_signature_wins() {
        let program = compile_source("{if;true;yes;no}").unwrap();
        let Executable::Call(call) = &program[0] else {
            panic!("expected a call");
        };
        // Three arguments: the value/then/else signature, not value/op/v2/then.
        assert_eq!(call.signature, 1);
    }
}
