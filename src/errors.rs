//! BBTag Error Handling - Unified Encapsulated API
//!
//! Every failure mode of the engine is represented by [`BBTagError`]: a kind,
//! the source it occurred in, and diagnostic enhancements. Construction goes
//! through the [`ErrorReporting`] trait so each pipeline phase produces
//! consistently contextualized diagnostics.

use std::fmt;
use std::sync::Arc;

use miette::{Diagnostic, LabeledSpan, NamedSource, SourceSpan};
use thiserror::Error;

use crate::syntax::Span;

// ============================================================================
// SOURCE CONTEXT - Error reporting infrastructure
// ============================================================================

/// The tag source a diagnostic points into. Cheap to clone; the content is
/// shared once converted to a named source.
#[derive(Debug, Clone)]
pub struct SourceContext {
    pub name: String,
    pub content: String,
}

impl SourceContext {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }

    /// Create a fallback when real source is unavailable (host-side failures).
    pub fn fallback(context: &str) -> Self {
        Self {
            name: "fallback".to_string(),
            content: format!("// {context}"),
        }
    }

    pub fn to_named_source(&self) -> Arc<NamedSource<String>> {
        Arc::new(NamedSource::new(self.name.clone(), self.content.clone()))
    }

    /// 1-based line and column for a byte offset, for user-facing locations.
    pub fn line_col(&self, offset: usize) -> (usize, usize) {
        offset_to_line_col(&self.content, offset)
    }
}

fn offset_to_line_col(content: &str, offset: usize) -> (usize, usize) {
    let mut line = 1;
    let mut col = 1;
    for (i, ch) in content.char_indices() {
        if i >= offset {
            break;
        }
        if ch == '\n' {
            line += 1;
            col = 1;
        } else {
            col += 1;
        }
    }
    (line, col)
}

impl Default for SourceContext {
    fn default() -> Self {
        Self::fallback("default context")
    }
}

// ============================================================================
// ERROR KINDS
// ============================================================================

/// All engine failure modes as a single enum. The Display text of a runtime
/// kind is what appears inside the inline error marker in tag output.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ErrorKind {
    // Syntax errors - malformed brace structure, abort parsing
    #[error("Unmatched `{{`")]
    UnmatchedOpenBrace,
    #[error("Unexpected `}}`")]
    UnexpectedCloseBrace,
    #[error("Subtag names must be literal text")]
    InvalidSubtagName,

    // Compile errors - a call cannot be bound to an executable unit
    #[error("Unknown subtag `{name}`")]
    UnknownSubtag { name: String },
    #[error("`{subtag}` expects {expected}, got {actual} arguments")]
    NoMatchingSignature {
        subtag: String,
        expected: String,
        actual: usize,
    },

    // Runtime errors - caught per call, replaced with an inline marker
    #[error("Not a number: {value}")]
    NotANumber { value: String },
    #[error("Not a boolean: {value}")]
    NotABoolean { value: String },
    #[error("Not an array: {value}")]
    NotAnArray { value: String },
    #[error("Invalid JSON path `{path}`: {message}")]
    JsonPathError { path: String, message: String },
    #[error("Index out of range: {index} (length {length})")]
    IndexOutOfRange { index: usize, length: usize },
    #[error("No channel found: {query}")]
    ChannelNotFound { query: String },
    #[error("No user found: {query}")]
    UserNotFound { query: String },
    #[error("No role found: {query}")]
    RoleNotFound { query: String },
    #[error("Tag not found: {name}")]
    TagNotFound { name: String },
    #[error("Regex too long ({length} characters)")]
    RegexTooLong { length: usize },
    #[error("Unsafe regex: {reason}")]
    UnsafeRegex { reason: String },
    #[error("Invalid regex: {message}")]
    InvalidRegex { message: String },
    #[error("Wait timed out after {millis}ms")]
    WaitTimedOut { millis: u64 },
    #[error("Output already set")]
    OutputAlreadySet,
    #[error("{message}")]
    Custom { message: String },
    #[error("Variable store failure: {message}")]
    StoreFailure { message: String },

    // Limit errors - fatal, abort the entire invocation
    #[error("{rule}")]
    LimitExceeded { rule: String },

    // Internal engine errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl ErrorKind {
    /// The error category, used by the evaluator to decide containment.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::UnmatchedOpenBrace | Self::UnexpectedCloseBrace | Self::InvalidSubtagName => {
                ErrorCategory::Syntax
            }

            Self::UnknownSubtag { .. } | Self::NoMatchingSignature { .. } => ErrorCategory::Compile,

            Self::NotANumber { .. }
            | Self::NotABoolean { .. }
            | Self::NotAnArray { .. }
            | Self::JsonPathError { .. }
            | Self::IndexOutOfRange { .. }
            | Self::ChannelNotFound { .. }
            | Self::UserNotFound { .. }
            | Self::RoleNotFound { .. }
            | Self::TagNotFound { .. }
            | Self::RegexTooLong { .. }
            | Self::UnsafeRegex { .. }
            | Self::InvalidRegex { .. }
            | Self::WaitTimedOut { .. }
            | Self::OutputAlreadySet
            | Self::Custom { .. }
            | Self::StoreFailure { .. } => ErrorCategory::Runtime,

            Self::LimitExceeded { .. } => ErrorCategory::Limit,

            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }

    /// Error code suffix for diagnostic codes.
    pub const fn code_suffix(&self) -> &'static str {
        match self {
            Self::UnmatchedOpenBrace => "unmatched_open_brace",
            Self::UnexpectedCloseBrace => "unexpected_close_brace",
            Self::InvalidSubtagName => "invalid_subtag_name",
            Self::UnknownSubtag { .. } => "unknown_subtag",
            Self::NoMatchingSignature { .. } => "no_matching_signature",
            Self::NotANumber { .. } => "not_a_number",
            Self::NotABoolean { .. } => "not_a_boolean",
            Self::NotAnArray { .. } => "not_an_array",
            Self::JsonPathError { .. } => "json_path",
            Self::IndexOutOfRange { .. } => "index_out_of_range",
            Self::ChannelNotFound { .. } => "channel_not_found",
            Self::UserNotFound { .. } => "user_not_found",
            Self::RoleNotFound { .. } => "role_not_found",
            Self::TagNotFound { .. } => "tag_not_found",
            Self::RegexTooLong { .. } => "regex_too_long",
            Self::UnsafeRegex { .. } => "unsafe_regex",
            Self::InvalidRegex { .. } => "invalid_regex",
            Self::WaitTimedOut { .. } => "wait_timed_out",
            Self::OutputAlreadySet => "output_already_set",
            Self::Custom { .. } => "custom_error",
            Self::StoreFailure { .. } => "store_failure",
            Self::LimitExceeded { .. } => "limit_exceeded",
            Self::Internal { .. } => "internal",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Syntax,
    Compile,
    Runtime,
    Limit,
    Internal,
}

// ============================================================================
// ERROR TYPE
// ============================================================================

/// The single error type - a kind, where it happened, and how to help.
#[derive(Debug)]
pub struct BBTagError {
    pub kind: ErrorKind,
    pub source_info: SourceInfo,
    pub diagnostic_info: DiagnosticInfo,
}

/// Context-specific source information.
#[derive(Debug, Clone)]
pub struct SourceInfo {
    pub source: Arc<NamedSource<String>>,
    pub primary_span: SourceSpan,
    pub phase: &'static str,
}

/// Diagnostic enhancement data.
#[derive(Debug, Clone)]
pub struct DiagnosticInfo {
    pub help: Option<String>,
    pub error_code: String,
}

impl BBTagError {
    pub fn category(&self) -> ErrorCategory {
        self.kind.category()
    }

    /// Whether the evaluator must abort the whole invocation.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Limit | ErrorCategory::Internal
        )
    }

    /// 1-based line and column of the primary span, computed against the
    /// source the error was reported in. Errors from nested tags locate into
    /// the nested source even when logged later, from the caller.
    pub fn line_col(&self) -> (usize, usize) {
        offset_to_line_col(
            self.source_info.source.inner(),
            self.source_info.primary_span.offset(),
        )
    }
}

impl std::error::Error for BBTagError {}

impl fmt::Display for BBTagError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)
    }
}

impl Diagnostic for BBTagError {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        Some(Box::new(&self.diagnostic_info.error_code))
    }

    fn help<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        self.diagnostic_info
            .help
            .as_ref()
            .map(|h| Box::new(h) as Box<dyn fmt::Display>)
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        let labels = vec![LabeledSpan::new_with_span(
            Some(self.kind.to_string()),
            self.source_info.primary_span,
        )];
        Some(Box::new(labels.into_iter()))
    }

    fn source_code(&self) -> Option<&dyn miette::SourceCode> {
        Some(&*self.source_info.source)
    }
}

// ============================================================================
// ERROR CONSTRUCTION
// ============================================================================

/// Context-aware error creation - each pipeline phase knows how to create
/// appropriately contextualized errors.
pub trait ErrorReporting {
    fn report(&self, kind: ErrorKind, span: SourceSpan) -> BBTagError;

    fn not_a_number(&self, value: &str, span: SourceSpan) -> BBTagError {
        self.report(
            ErrorKind::NotANumber {
                value: value.into(),
            },
            span,
        )
    }

    fn not_a_boolean(&self, value: &str, span: SourceSpan) -> BBTagError {
        self.report(
            ErrorKind::NotABoolean {
                value: value.into(),
            },
            span,
        )
    }

    fn not_an_array(&self, value: &str, span: SourceSpan) -> BBTagError {
        self.report(
            ErrorKind::NotAnArray {
                value: value.into(),
            },
            span,
        )
    }

    /// Internal errors indicate engine bugs, not user mistakes.
    fn internal_error(&self, message: &str, span: SourceSpan) -> BBTagError {
        let mut error = self.report(
            ErrorKind::Internal {
                message: message.into(),
            },
            span,
        );
        error.diagnostic_info.help =
            Some("This is an internal engine error. Please report it as a bug.".into());
        error
    }
}

/// General-purpose reporting context for phases that are not threaded through
/// an execution context (parser, compiler).
pub struct PhaseContext {
    pub source: SourceContext,
    pub phase: &'static str,
}

impl PhaseContext {
    pub fn new(source: SourceContext, phase: &'static str) -> Self {
        Self { source, phase }
    }
}

impl ErrorReporting for PhaseContext {
    fn report(&self, kind: ErrorKind, span: SourceSpan) -> BBTagError {
        let error_code = format!("bbtag::{}::{}", self.phase, kind.code_suffix());
        BBTagError {
            kind,
            source_info: SourceInfo {
                source: self.source.to_named_source(),
                primary_span: span,
                phase: self.phase,
            },
            diagnostic_info: DiagnosticInfo {
                help: None,
                error_code,
            },
        }
    }
}

/// Converts a BBTag AST span to a miette source span.
pub fn to_source_span(span: Span) -> SourceSpan {
    SourceSpan::from(span.start..span.end)
}

/// Placeholder span for errors not tied to a specific source location, such
/// as store failures surfaced at flush time.
pub fn unspanned() -> SourceSpan {
    SourceSpan::from(0..0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_carry_the_right_category() {
        assert_eq!(
            ErrorKind::UnmatchedOpenBrace.category(),
            ErrorCategory::Syntax
        );
        assert_eq!(
            ErrorKind::UnknownSubtag { name: "x".into() }.category(),
            ErrorCategory::Compile
        );
        assert_eq!(
            ErrorKind::NotANumber { value: "x".into() }.category(),
            ErrorCategory::Runtime
        );
        assert_eq!(
            ErrorKind::LimitExceeded { rule: "r".into() }.category(),
            ErrorCategory::Limit
        );
    }

    #[test]
    fn phase_context_produces_coded_diagnostics() {
        let ctx = PhaseContext::new(SourceContext::new("tag", "{lb}"), "parser");
        let err = ctx.report(ErrorKind::UnexpectedCloseBrace, SourceSpan::from(0..1));
        assert_eq!(
            err.diagnostic_info.error_code,
            "bbtag::parser::unexpected_close_brace"
        );
        assert!(!err.is_fatal());
        let fatal = ctx.report(
            ErrorKind::LimitExceeded {
                rule: "budget".into(),
            },
            SourceSpan::from(0..1),
        );
        assert!(fatal.is_fatal());
    }

    #[test]
    fn line_col_counts_from_one() {
        let sc = SourceContext::new("tag", "ab\ncd");
        assert_eq!(sc.line_col(0), (1, 1));
        assert_eq!(sc.line_col(4), (2, 2));
    }

    #[test]
    fn errors_locate_against_their_own_source() {
        let ctx = PhaseContext::new(SourceContext::new("tag", "line1\n{oops"), "parser");
        let err = ctx.report(ErrorKind::UnmatchedOpenBrace, SourceSpan::from(6..7));
        assert_eq!(err.line_col(), (2, 1));
    }
}
