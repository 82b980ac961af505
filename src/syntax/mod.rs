//! AST types for the BBTag grammar.
//!
//! A tag is an ordered sequence of [`Statement`]s: literal text interleaved
//! with subtag calls. The tree is immutable once parsed; repeated executions
//! of the same stored tag may share it read-only.

use serde::{Deserialize, Serialize};

pub mod parser;

pub use parser::parse;

/// A half-open byte range into the tag source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

/// One node of a parsed tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Statement {
    /// Literal text, stored verbatim.
    Text(String),
    /// A `{name;arg;...}` call.
    Call(SubtagCall),
}

/// A subtag call. The name is kept exactly as written; trimming and case
/// folding happen at compile time so that [`stringify`] round-trips.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtagCall {
    pub name: String,
    pub args: Vec<Vec<Statement>>,
    pub span: Span,
}

/// Reconstructs the exact source text of a statement sequence.
pub fn stringify(statements: &[Statement]) -> String {
    let mut out = String::new();
    for statement in statements {
        match statement {
            Statement::Text(text) => out.push_str(text),
            Statement::Call(call) => {
                out.push('{');
                out.push_str(&call.name);
                for arg in &call.args {
                    out.push(';');
                    out.push_str(&stringify(arg));
                }
                out.push('}');
            }
        }
    }
    out
}
