//! Source normalization: declared-name and namespace extraction, and the
//! textual declared-name rewrite.
//!
//! Extraction and rewrite are pattern matches over the raw text, not a parse.
//! A `class` token inside a string literal or comment will fool them; the
//! rewrite touches only the first declaration token and leaves every other
//! occurrence of the old name alone, including a constructor body that names
//! the type in a struct literal. Both are inherited, documented limitations
//! of the textual contract.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{DynError, DynResult};

static CLASS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bclass\s+([A-Za-z_][A-Za-z0-9_]*)").unwrap());

static NAMESPACE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*namespace\s+([A-Za-z_][A-Za-z0-9_.]*)\s*;").unwrap());

/// Extract the declared class name from source text.
pub fn declared_name(source: &str) -> DynResult<String> {
    CLASS_RE
        .captures(source)
        .map(|c| c[1].to_string())
        .ok_or_else(|| DynError::malformed("no class declaration found"))
}

/// Byte range of the name token in the first class declaration, for callers
/// that need to keep scanning from the same spot the extraction matched.
pub(crate) fn declared_name_range(source: &str) -> Option<std::ops::Range<usize>> {
    CLASS_RE
        .captures(source)
        .and_then(|c| c.get(1))
        .map(|m| m.range())
}

/// Extract the namespace declaration. Absence is not an error and yields "".
pub fn namespace(source: &str) -> String {
    NAMESPACE_RE
        .captures(source)
        .map(|c| c[1].to_string())
        .unwrap_or_default()
}

/// Replace the name in the first class declaration with `new_name`, leaving
/// all other occurrences of the old name untouched.
pub fn rewrite_declared_name(new_name: &str, source: &str) -> String {
    match CLASS_RE.captures(source) {
        Some(caps) => {
            let name = caps.get(1).unwrap();
            let mut out = String::with_capacity(source.len() + new_name.len());
            out.push_str(&source[..name.start()]);
            out.push_str(new_name);
            out.push_str(&source[name.end()..]);
            out
        }
        None => source.to_string(),
    }
}

/// Join a namespace and a class name into the fully qualified name.
pub fn qualified_name(namespace: &str, name: &str) -> String {
    if namespace.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", namespace, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SRC: &str = r#"
namespace demo.util;

class Greeter {
    fn greet(&self, who: String) -> String { format!("hi {}", who) }
}
"#;

    #[test]
    fn test_declared_name() {
        assert_eq!(declared_name(SRC).unwrap(), "Greeter");
    }

    #[test]
    fn test_namespace() {
        assert_eq!(namespace(SRC), "demo.util");
    }

    #[test]
    fn test_namespace_absent_is_empty_not_error() {
        assert_eq!(namespace("class A {}"), "");
    }

    #[test]
    fn test_missing_class_declaration_is_malformed() {
        let err = declared_name("fn loose() {}").unwrap_err();
        assert!(matches!(err, DynError::MalformedSource { .. }));
    }

    #[test]
    fn test_rewrite_roundtrip() {
        let rewritten = rewrite_declared_name("Greeter2", SRC);
        assert_eq!(declared_name(&rewritten).unwrap(), "Greeter2");
        // Only the declaration changes; the body is untouched.
        assert!(rewritten.contains("format!(\"hi {}\", who)"));
    }

    #[test]
    fn test_rewrite_leaves_other_occurrences() {
        let src = "class Box { new() { Box {} } }";
        let rewritten = rewrite_declared_name("Crate", src);
        assert!(rewritten.starts_with("class Crate"));
        // The constructor body still names the old type; this is the
        // documented textual-rewrite limitation.
        assert!(rewritten.contains("{ Box {} }"));
    }

    #[test]
    fn test_qualified_name() {
        assert_eq!(qualified_name("demo.util", "Greeter"), "demo.util.Greeter");
        assert_eq!(qualified_name("", "Greeter"), "Greeter");
    }
}
