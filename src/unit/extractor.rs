//! Pluggable method-name extraction from raw source text.
//!
//! When a caller submits a unit without a method name, the name is derived
//! heuristically by scanning the source for a declaration pattern. The
//! heuristic is inherently tied to one language's grammar, so it sits
//! behind a trait and the policy layer never hard-codes the syntax.

use regex::Regex;

/// Fallback name when no declaration pattern matches.
pub const UNKNOWN_METHOD_NAME: &str = "unknown";

/// Derives a unit's method name from its source text.
///
/// Implementations must be thread-safe; extraction failures are expressed
/// as `None`, never as an error, and callers fall back to
/// [`UNKNOWN_METHOD_NAME`].
pub trait UnitNameExtractor: Send + Sync {
    /// Returns the first method name declared in `code`, if any.
    fn extract(&self, code: &str) -> Option<String>;
}

/// Extractor for Java-style method declarations.
///
/// Matches a visibility qualifier, optional modifiers, an optional return
/// type (absent for constructors), then an identifier followed by `(`.
pub struct JavaMethodExtractor {
    pattern: Regex,
}

impl JavaMethodExtractor {
    #[must_use]
    pub fn new() -> Self {
        let pattern = Regex::new(
            r"(?m)\b(?:public|protected|private)\s+(?:(?:static|final|synchronized|abstract|native|default)\s+)*(?:[\w$<>\[\],.?&\s]+\s+)?([\w$]+)\s*\(",
        )
        .expect("method declaration pattern is valid");
        Self { pattern }
    }
}

impl Default for JavaMethodExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl UnitNameExtractor for JavaMethodExtractor {
    fn extract(&self, code: &str) -> Option<String> {
        self.pattern
            .captures(code)
            .map(|captures| captures[1].to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_simple_method() {
        let extractor = JavaMethodExtractor::new();

        let code = "public void dummyMethod() { System.out.println(\"Hello\"); }";
        assert_eq!(extractor.extract(code), Some("dummyMethod".to_string()));
    }

    #[test]
    fn test_extracts_with_modifiers_and_generics() {
        let extractor = JavaMethodExtractor::new();

        let code = "private static List<String> splitLines(String input) { return null; }";
        assert_eq!(extractor.extract(code), Some("splitLines".to_string()));
    }

    #[test]
    fn test_extracts_constructor() {
        let extractor = JavaMethodExtractor::new();

        // Constructors have no return type
        let code = "public Foo(int x) { this.x = x; }";
        assert_eq!(extractor.extract(code), Some("Foo".to_string()));
    }

    #[test]
    fn test_extracts_first_declaration_only() {
        let extractor = JavaMethodExtractor::new();

        let code = "public int first() { return 1; }\npublic int second() { return 2; }";
        assert_eq!(extractor.extract(code), Some("first".to_string()));
    }

    #[test]
    fn test_no_match_returns_none() {
        let extractor = JavaMethodExtractor::new();

        assert_eq!(extractor.extract("int x = 5;"), None);
        assert_eq!(extractor.extract(""), None);
        assert_eq!(extractor.extract("// just a comment"), None);
    }
}
