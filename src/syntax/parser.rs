//! BBTag parser - a single-pass cursor scanner.
//!
//! The grammar has three structural characters: `{` opens a call, `}` closes
//! it, and `;` separates arguments inside a call. Everything else is literal
//! text. There is no escaping; scripts that need the structural characters as
//! output use the `lb`/`rb`/`semi` subtags, which the parser does not
//! special-case.

use std::iter::Peekable;
use std::str::CharIndices;

use crate::errors::{to_source_span, BBTagError, ErrorKind, ErrorReporting, PhaseContext, SourceContext};
use crate::syntax::{Span, Statement, SubtagCall};

/// Parse tag source into an ordered statement sequence.
///
/// Top-level `;` is literal text; a top-level `}` or an unterminated `{` is a
/// syntax error carrying the offending byte offset.
pub fn parse(source: &str, context: &SourceContext) -> Result<Vec<Statement>, BBTagError> {
    let reporter = PhaseContext::new(context.clone(), "parser");
    let mut cursor = Cursor::new(source);
    let mut statements = Vec::new();
    let mut text = TextRun::default();

    while let Some((pos, ch)) = cursor.next() {
        match ch {
            '{' => {
                text.flush_into(&mut statements);
                statements.push(Statement::Call(parse_call(&mut cursor, pos, &reporter)?));
            }
            '}' => {
                return Err(reporter.report(
                    ErrorKind::UnexpectedCloseBrace,
                    to_source_span(Span::new(pos, pos + ch.len_utf8())),
                ));
            }
            _ => text.push(ch),
        }
    }

    text.flush_into(&mut statements);
    Ok(statements)
}

// ============================================================================
// CURSOR
// ============================================================================

struct Cursor<'a> {
    chars: Peekable<CharIndices<'a>>,
}

impl<'a> Cursor<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            chars: source.char_indices().peekable(),
        }
    }

    fn next(&mut self) -> Option<(usize, char)> {
        self.chars.next()
    }
}

/// Accumulates literal characters between structural tokens.
#[derive(Default)]
struct TextRun {
    buffer: String,
}

impl TextRun {
    fn push(&mut self, ch: char) {
        self.buffer.push(ch);
    }

    fn flush_into(&mut self, statements: &mut Vec<Statement>) {
        if !self.buffer.is_empty() {
            statements.push(Statement::Text(std::mem::take(&mut self.buffer)));
        }
    }
}

// ============================================================================
// CALL PARSING
// ============================================================================

/// Parses one call after its `{` has been consumed at `open`.
fn parse_call(
    cursor: &mut Cursor,
    open: usize,
    reporter: &PhaseContext,
) -> Result<SubtagCall, BBTagError> {
    let unmatched = |at: usize| {
        reporter.report(
            ErrorKind::UnmatchedOpenBrace,
            to_source_span(Span::new(at, at + 1)),
        )
    };

    // The name is everything up to the first `;` or the closing `}`. A nested
    // call in name position is rejected; the data model fixes names as text.
    let mut name = String::new();
    let close;
    loop {
        match cursor.next() {
            Some((pos, '{')) => {
                return Err(reporter.report(
                    ErrorKind::InvalidSubtagName,
                    to_source_span(Span::new(pos, pos + 1)),
                ));
            }
            Some((pos, '}')) => {
                return Ok(SubtagCall {
                    name,
                    args: Vec::new(),
                    span: Span::new(open, pos + 1),
                });
            }
            Some((_, ';')) => break,
            Some((_, ch)) => name.push(ch),
            None => return Err(unmatched(open)),
        }
    }

    // Arguments: each is itself a statement sequence, split on top-level `;`.
    let mut args = Vec::new();
    let mut current = Vec::new();
    let mut text = TextRun::default();
    loop {
        match cursor.next() {
            Some((pos, '{')) => {
                text.flush_into(&mut current);
                current.push(Statement::Call(parse_call(cursor, pos, reporter)?));
            }
            Some((_, ';')) => {
                text.flush_into(&mut current);
                args.push(std::mem::take(&mut current));
            }
            Some((pos, '}')) => {
                text.flush_into(&mut current);
                args.push(current);
                close = pos + 1;
                break;
            }
            Some((_, ch)) => text.push(ch),
            None => return Err(unmatched(open)),
        }
    }

    Ok(SubtagCall {
        name,
        args,
        span: Span::new(open, close),
    })
}
