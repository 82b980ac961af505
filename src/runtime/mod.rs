//! Execution runtime: context, scopes, variables, limits, and the evaluator.

use crate::errors::BBTagError;

pub mod arguments;
pub mod context;
pub mod eval;
pub mod external;
pub mod limits;
pub mod scope;
pub mod variables;

pub use context::TagContext;
pub use eval::{eval_block, BlockOutput};

/// Boxed future used for the recursive evaluator.
pub type BoxFuture<'a, T> = std::pin::Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// How far a `return` unwinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnScope {
    /// Truncate the remaining output of the current invocation.
    Scope,
    /// Unwind through every nested invocation to the top-level call.
    Root,
}

/// Non-local exits raised by subtag handlers.
///
/// `Error` is caught at the call boundary and replaced with an inline
/// marker; `Return` is control flow, not an error; `Abort` is fatal and
/// terminates the whole invocation immediately.
#[derive(Debug)]
pub enum Interrupt {
    Error(BBTagError),
    Return(ReturnScope),
    Abort(BBTagError),
}

impl From<BBTagError> for Interrupt {
    fn from(error: BBTagError) -> Self {
        if error.is_fatal() {
            Interrupt::Abort(error)
        } else {
            Interrupt::Error(error)
        }
    }
}
