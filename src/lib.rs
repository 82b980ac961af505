pub use crate::engine::{Engine, ExecutionResult, InvocationOptions};
pub use crate::errors::{BBTagError, ErrorCategory, ErrorKind, ErrorReporting, SourceContext};

pub mod arrays;
pub mod awaiter;
pub mod compiler;
pub mod engine;
pub mod errors;
pub mod json;
pub mod regexes;
pub mod runtime;
pub mod subtags;
pub mod syntax;
