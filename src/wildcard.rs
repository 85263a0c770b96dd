//! Regex-to-wildcard translation with danger classification.
//!
//! Surge's `DOMAIN-WILDCARD` syntax only knows literal characters, `?`
//! (any single character) and `*` (any run). Translating a regular
//! expression into it is inherently lossy, so every translation is judged
//! twice: structurally, on the regex syntax tree, and again on the
//! translated output. Either judgement can veto publishing the pattern as
//! an enabled rule.

use regex_syntax::ast::{self, Ast};

/// Convert a regex pattern to a wildcard pattern.
///
/// Leading/trailing slash delimiters are ignored. A pattern that does not
/// parse as a regex yields an empty string, which callers must treat as
/// "no safe translation". The rewrite is structural and bottom-up:
/// literals pass through, single-character constructs become `?`, anything
/// of variable width becomes `*`, anchors vanish, and an unrecognized
/// node collapses to `?` rather than leaking raw syntax into the output.
pub fn regex_to_wildcard(pattern: &str) -> String {
    let pattern = strip_delimiters(pattern);
    match parse(pattern) {
        Some(tree) => convert(&tree),
        None => String::new(),
    }
}

/// Check whether a regex would translate into a dangerously broad wildcard.
///
/// True when the pattern cannot be parsed, when its syntax tree contains a
/// precision-losing construct (character class, alternation, bounded
/// repeat, or a quantifier wrapping one of those), or when the translated
/// output carries no literal anchor text / three or more `?`. The output
/// check is independent of the structural one: a tree of safe nodes can
/// still add up to an overly broad pattern.
pub fn is_dangerous_regex(pattern: &str) -> bool {
    let pattern = strip_delimiters(pattern);
    let Some(tree) = parse(pattern) else {
        return true;
    };
    if has_lossy_construct(&tree) {
        return true;
    }
    is_broad_pattern(&convert(&tree))
}

fn strip_delimiters(pattern: &str) -> &str {
    let pattern = pattern.strip_prefix('/').unwrap_or(pattern);
    pattern.strip_suffix('/').unwrap_or(pattern)
}

fn parse(pattern: &str) -> Option<Ast> {
    ast::parse::Parser::new().parse(pattern).ok()
}

fn convert(tree: &Ast) -> String {
    match tree {
        Ast::Empty(_) | Ast::Flags(_) | Ast::Assertion(_) => String::new(),
        Ast::Literal(literal) => literal.c.to_string(),
        Ast::Group(group) => convert(&group.ast),
        Ast::Concat(concat) => concat.asts.iter().map(convert).collect(),
        Ast::Repetition(_) | Ast::Alternation(_) => "*".to_string(),
        // Dot, character classes, and anything unrecognized: a single-char
        // match is the narrowest rewrite that cannot fail open.
        _ => "?".to_string(),
    }
}

fn has_lossy_construct(tree: &Ast) -> bool {
    match tree {
        Ast::ClassBracketed(_) | Ast::ClassPerl(_) | Ast::ClassUnicode(_) => true,
        Ast::Alternation(_) => true,
        Ast::Repetition(repetition) => match repetition.op.kind {
            ast::RepetitionKind::Range(_) => true,
            _ => has_lossy_construct(&repetition.ast),
        },
        Ast::Group(group) => has_lossy_construct(&group.ast),
        Ast::Concat(concat) => concat.asts.iter().any(has_lossy_construct),
        _ => false,
    }
}

/// A translated pattern is too broad when it has no literal anchor text at
/// all (only wildcards and dots) or needs three or more `?`.
fn is_broad_pattern(pattern: &str) -> bool {
    if pattern.is_empty() {
        return false;
    }

    let mut questions = 0;
    let mut has_anchor = false;
    for c in pattern.chars() {
        match c {
            '*' => {}
            '?' => questions += 1,
            '.' => {}
            _ => has_anchor = true,
        }
    }

    !has_anchor || questions >= 3
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_passthrough() {
        assert_eq!(regex_to_wildcard("example\\.com"), "example.com");
        assert!(!is_dangerous_regex("example\\.com"));
    }

    #[test]
    fn test_anchors_and_boundaries_vanish() {
        assert_eq!(regex_to_wildcard("^example\\.com$"), "example.com");
        assert_eq!(regex_to_wildcard("\\bexample\\.com\\b"), "example.com");
    }

    #[test]
    fn test_quantifiers_become_star() {
        assert_eq!(regex_to_wildcard(".*\\.google\\.com"), "*.google.com");
        assert_eq!(regex_to_wildcard("a+\\.cdn\\.com"), "*.cdn.com");
        assert_eq!(regex_to_wildcard("ab?c"), "a*c");
    }

    #[test]
    fn test_dot_becomes_question_mark() {
        assert_eq!(regex_to_wildcard("a.c\\.com"), "a?c.com");
    }

    #[test]
    fn test_char_class_becomes_question_mark() {
        assert_eq!(regex_to_wildcard("[0-9]\\.example\\.com"), "?.example.com");
    }

    #[test]
    fn test_alternation_becomes_star() {
        assert_eq!(regex_to_wildcard("(img|static)\\.site\\.com"), "*.site.com");
    }

    #[test]
    fn test_slash_delimiters_are_stripped() {
        assert_eq!(regex_to_wildcard("/foo\\.bar/"), "foo.bar");
    }

    #[test]
    fn test_unparseable_pattern() {
        assert_eq!(regex_to_wildcard("(["), "");
        assert!(is_dangerous_regex("(["));
    }

    #[test]
    fn test_char_class_is_dangerous() {
        assert!(is_dangerous_regex("[a-z]+\\.example\\.com"));
    }

    #[test]
    fn test_quantified_char_class_is_dangerous() {
        assert!(is_dangerous_regex("([0-9])*\\.example\\.com"));
        assert!(is_dangerous_regex("[0-9]?\\.example\\.com"));
    }

    #[test]
    fn test_alternation_is_dangerous() {
        assert!(is_dangerous_regex("(a|b)\\.com"));
    }

    #[test]
    fn test_bounded_repeat_is_dangerous() {
        assert!(is_dangerous_regex("ab{2,3}c\\.com"));
    }

    #[test]
    fn test_wildcard_only_output_is_dangerous() {
        // Structurally harmless, but translates to "*" with no anchor.
        assert!(is_dangerous_regex(".*"));
        assert!(is_dangerous_regex(".+"));
    }

    #[test]
    fn test_many_question_marks_are_dangerous() {
        // Four dots translate to "????.com": far too many single-char slots.
        assert!(is_dangerous_regex("....\\.com"));
        assert!(!is_dangerous_regex("..\\.com"));
    }

    #[test]
    fn test_safe_translation_survives() {
        assert!(!is_dangerous_regex(".*\\.google\\.com"));
        assert!(!is_dangerous_regex("^dl\\.google\\.com$"));
    }
}
