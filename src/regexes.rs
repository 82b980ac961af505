//! Defensive compilation of user-supplied regular expressions.
//!
//! Patterns are untrusted input. Before a matcher is ever constructed the
//! pattern must pass a length cap and a static heuristic that rejects shapes
//! prone to catastrophic backtracking, such as nested unbounded quantifiers.
//! Accepted patterns compile once and are reused for the duration of a call.

use regex::{Regex, RegexBuilder};
use regex_syntax::hir::{Hir, HirKind};

/// Longest accepted pattern source, in characters.
pub const MAX_PATTERN_LENGTH: usize = 2_000;

/// Compiled-program size cap handed to the regex engine.
const SIZE_LIMIT: usize = 256 * 1024;

/// Why a candidate pattern was refused.
#[derive(Debug, Clone, PartialEq)]
pub enum RegexRejection {
    TooLong { length: usize },
    Vulnerable { reason: String },
    Invalid { message: String },
}

/// Validates and compiles a user-supplied pattern.
pub fn create_safe_regex(pattern: &str) -> Result<Regex, RegexRejection> {
    let length = pattern.chars().count();
    if length > MAX_PATTERN_LENGTH {
        return Err(RegexRejection::TooLong { length });
    }

    let hir = regex_syntax::Parser::new()
        .parse(pattern)
        .map_err(|e| RegexRejection::Invalid {
            message: e.to_string(),
        })?;

    if has_nested_unbounded_repetition(&hir, false) {
        return Err(RegexRejection::Vulnerable {
            reason: "nested unbounded quantifiers".to_string(),
        });
    }

    RegexBuilder::new(pattern)
        .size_limit(SIZE_LIMIT)
        .build()
        .map_err(|e| RegexRejection::Invalid {
            message: e.to_string(),
        })
}

/// Detects an unbounded repetition nested inside another unbounded
/// repetition, e.g. `(a+)+` or `(\w*)*`. This is the classic shape that
/// explodes under backtracking engines; it is rejected here so the same
/// pattern stays portable to hosts that do backtrack.
fn has_nested_unbounded_repetition(hir: &Hir, inside_unbounded: bool) -> bool {
    match hir.kind() {
        HirKind::Repetition(rep) => {
            let unbounded = rep.max.is_none();
            if unbounded && inside_unbounded {
                return true;
            }
            has_nested_unbounded_repetition(&rep.sub, inside_unbounded || unbounded)
        }
        HirKind::Capture(capture) => has_nested_unbounded_repetition(&capture.sub, inside_unbounded),
        HirKind::Concat(parts) | HirKind::Alternation(parts) => parts
            .iter()
            .any(|part| has_nested_unbounded_repetition(part, inside_unbounded)),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_patterns_compile() {
        let regex = create_safe_regex(r"\d+ apples").unwrap();
        assert!(regex.is_match("12 apples"));
    }

    #[test]
    fn overlong_pattern_is_rejected() {
        let pattern = "a".repeat(MAX_PATTERN_LENGTH + 1);
        assert_eq!(
            create_safe_regex(&pattern).map(|_| ()),
            Err(RegexRejection::TooLong {
                length: MAX_PATTERN_LENGTH + 1
            })
        );
    }

    #[test]
    fn nested_unbounded_quantifiers_are_rejected() {
        for pattern in [r"(a+)+", r"(\w*)*", r"((x|y)*z?)+", r"(?:a*)+b"] {
            assert!(
                matches!(
                    create_safe_regex(pattern),
                    Err(RegexRejection::Vulnerable { .. })
                ),
                "pattern {pattern} should be rejected"
            );
        }
    }

    #[test]
    fn bounded_nesting_is_allowed() {
        assert!(create_safe_regex(r"(a+){1,3}").is_ok());
        assert!(create_safe_regex(r"(ab)+c*").is_ok());
    }

    #[test]
    fn invalid_syntax_is_reported() {
        assert!(matches!(
            create_safe_regex(r"(unclosed"),
            Err(RegexRejection::Invalid { .. })
        ));
    }
}
