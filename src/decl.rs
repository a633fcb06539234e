//! Class declaration model and the shallow parse that produces it.
//!
//! The submitted dialect is a class wrapper around Rust member signatures and
//! bodies:
//!
//! ```text
//! namespace demo.util;
//!
//! class Greeter {
//!     prefix: String,
//!
//!     new(prefix: String) { Greeter { prefix } }
//!     fn greet(&self, who: String) -> String { format!("{} {}", self.prefix, who) }
//!     static fn answer() -> i64 { 42 }
//!     priv fn internal(&self) -> i64 { 1 }
//! }
//! ```
//!
//! The parse is brace-aware but deliberately shallow: member bodies are
//! captured verbatim and never interpreted. Marshallable parameter types are
//! `i64`, `f64`, `bool`, `String` and `&str`; return types add `()`. Field
//! types pass through untouched (they never cross the call boundary).

use crate::analyzer;
use crate::error::{DynError, DynResult};
use crate::value::{ParamType, RetType};

/// A parsed class declaration.
#[derive(Debug, Clone)]
pub struct ClassDecl {
    pub name: String,
    pub namespace: String,
    pub fields: Vec<FieldDecl>,
    pub ctors: Vec<CtorDecl>,
    pub methods: Vec<MethodDecl>,
}

#[derive(Debug, Clone)]
pub struct FieldDecl {
    pub name: String,
    /// Verbatim Rust type text.
    pub ty: String,
}

#[derive(Debug, Clone)]
pub struct CtorDecl {
    pub params: Vec<Param>,
    /// Verbatim body, braces included.
    pub body: String,
}

#[derive(Debug, Clone)]
pub struct MethodDecl {
    pub name: String,
    pub is_static: bool,
    pub is_public: bool,
    pub params: Vec<Param>,
    pub ret: RetType,
    /// `&self` or `&mut self` as written (empty for static members).
    pub self_text: String,
    /// Verbatim body, braces included.
    pub body: String,
}

#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub ty: ParamType,
    /// Spelled `&str` rather than `String`.
    pub by_ref: bool,
}

impl ClassDecl {
    pub fn qualified_name(&self) -> String {
        analyzer::qualified_name(&self.namespace, &self.name)
    }

    /// Whether a no-argument construction path exists (an explicit zero-arity
    /// constructor, or the implicit one of a fieldless class).
    pub fn has_default_ctor(&self) -> bool {
        self.fields.is_empty() && self.ctors.is_empty()
            || self.ctors.iter().any(|c| c.params.is_empty())
    }
}

/// Parse a class declaration out of source text.
pub fn parse_class(source: &str) -> DynResult<ClassDecl> {
    let namespace = analyzer::namespace(source);
    let name = analyzer::declared_name(source)?;

    // Same match the name extraction used, so the two scans cannot disagree
    // on what counts as a declaration.
    let name_range = analyzer::declared_name_range(source)
        .ok_or_else(|| DynError::malformed("no class declaration found"))?;

    let open = skip_trivia(source, name_range.end);
    if source.as_bytes().get(open) != Some(&b'{') {
        return Err(DynError::malformed("expected '{' after class name"));
    }
    let close = find_matching(source, open)
        .ok_or_else(|| DynError::malformed("unbalanced braces in class body"))?;
    let body = &source[open + 1..close];

    let mut decl = ClassDecl {
        name,
        namespace,
        fields: Vec::new(),
        ctors: Vec::new(),
        methods: Vec::new(),
    };
    parse_members(body, &mut decl)?;
    validate(&decl)?;
    Ok(decl)
}

fn parse_members(body: &str, decl: &mut ClassDecl) -> DynResult<()> {
    let mut i = skip_trivia(body, 0);
    while i < body.len() {
        let (word, after) = read_ident(body, i);
        if word.is_empty() {
            return Err(DynError::malformed(format!(
                "unexpected character '{}' in class body",
                &body[i..].chars().next().unwrap_or(' ')
            )));
        }

        match word {
            "new" => {
                let (params_text, after_params) = read_parens(body, after)?;
                let (ctor_body, after_body) = read_braces(body, after_params)?;
                let (self_text, params) = parse_params(params_text)?;
                if !self_text.is_empty() {
                    return Err(DynError::malformed("constructors do not take self"));
                }
                decl.ctors.push(CtorDecl {
                    params,
                    body: ctor_body.to_string(),
                });
                i = skip_trivia(body, after_body);
            }
            "static" | "priv" | "pub" | "fn" => {
                let (method, next) = parse_method(body, i)?;
                decl.methods.push(method);
                i = skip_trivia(body, next);
            }
            field_name => {
                // Field: `name: Type,` with the trailing comma optional on
                // the last field.
                let colon = skip_trivia(body, after);
                if body.as_bytes().get(colon) != Some(&b':') {
                    return Err(DynError::malformed(format!(
                        "expected ':' after field name '{}'",
                        field_name
                    )));
                }
                let (ty, next) = read_until_top_level_comma(body, colon + 1)?;
                if ty.trim().is_empty() {
                    return Err(DynError::malformed(format!(
                        "missing type for field '{}'",
                        field_name
                    )));
                }
                // A type capturing a brace means the field ran into the next
                // member: the separating comma is missing.
                if ty.contains('{') {
                    return Err(DynError::malformed(format!(
                        "field '{}' is missing a trailing comma",
                        field_name
                    )));
                }
                decl.fields.push(FieldDecl {
                    name: field_name.to_string(),
                    ty: ty.trim().to_string(),
                });
                i = skip_trivia(body, next);
            }
        }
    }
    Ok(())
}

fn parse_method(body: &str, start: usize) -> DynResult<(MethodDecl, usize)> {
    let mut is_static = false;
    let mut is_public = true;
    let mut i = start;

    loop {
        let (word, after) = read_ident(body, i);
        match word {
            "static" => is_static = true,
            "priv" => is_public = false,
            "pub" => is_public = true,
            "fn" => {
                i = skip_trivia(body, after);
                break;
            }
            other => {
                return Err(DynError::malformed(format!(
                    "unexpected token '{}' before 'fn'",
                    other
                )));
            }
        }
        i = skip_trivia(body, after);
    }

    let (name, after_name) = read_ident(body, i);
    if name.is_empty() {
        return Err(DynError::malformed("expected method name after 'fn'"));
    }
    let (params_text, after_params) = read_parens(body, skip_trivia(body, after_name))?;
    let (self_text, params) = parse_params(params_text)?;

    if is_static && !self_text.is_empty() {
        return Err(DynError::malformed(format!(
            "static method '{}' must not take self",
            name
        )));
    }
    if !is_static && self_text.is_empty() {
        return Err(DynError::malformed(format!(
            "instance method '{}' must take &self (or be marked static)",
            name
        )));
    }

    // Optional `-> Ret` before the body.
    let mut j = skip_trivia(body, after_params);
    let ret = if body[j..].starts_with("->") {
        let ret_start = skip_trivia(body, j + 2);
        let brace = find_at_top_level(body, ret_start, b'{')
            .ok_or_else(|| DynError::malformed(format!("missing body for method '{}'", name)))?;
        let ret_text = body[ret_start..brace].trim();
        j = brace;
        parse_ret_type(ret_text, name)?
    } else {
        RetType::Unit
    };

    let (method_body, after_body) = read_braces(body, j)?;
    Ok((
        MethodDecl {
            name: name.to_string(),
            is_static,
            is_public,
            params,
            ret,
            self_text: self_text.to_string(),
            body: method_body.to_string(),
        },
        after_body,
    ))
}

fn parse_ret_type(text: &str, method: &str) -> DynResult<RetType> {
    match text {
        "" | "()" => Ok(RetType::Unit),
        "i64" => Ok(RetType::Int),
        "f64" => Ok(RetType::Float),
        "bool" => Ok(RetType::Bool),
        "String" => Ok(RetType::Str),
        other => Err(DynError::malformed(format!(
            "method '{}': unsupported return type '{}'",
            method, other
        ))),
    }
}

/// Split a parameter list, peeling a leading `&self` / `&mut self`.
fn parse_params(text: &str) -> DynResult<(&str, Vec<Param>)> {
    let mut parts = split_top_level_commas(text);
    let mut self_text = "";
    if let Some(first) = parts.first() {
        let t = first.trim();
        if t == "&self" || t == "&mut self" {
            self_text = t;
            parts.remove(0);
        }
    }

    let mut params = Vec::with_capacity(parts.len());
    for part in parts {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let (pname, pty) = part
            .split_once(':')
            .ok_or_else(|| DynError::malformed(format!("parameter '{}' missing a type", part)))?;
        let pname = pname.trim();
        let (ty, by_ref) = match pty.trim() {
            "i64" => (ParamType::Int, false),
            "f64" => (ParamType::Float, false),
            "bool" => (ParamType::Bool, false),
            "String" => (ParamType::Str, false),
            "&str" => (ParamType::Str, true),
            other => {
                return Err(DynError::malformed(format!(
                    "parameter '{}': unsupported type '{}'",
                    pname, other
                )));
            }
        };
        params.push(Param {
            name: pname.to_string(),
            ty,
            by_ref,
        });
    }
    Ok((self_text, params))
}

fn validate(decl: &ClassDecl) -> DynResult<()> {
    // Constructors are keyed by arity; methods share one impl block, so their
    // names must be unique outright.
    for (i, a) in decl.ctors.iter().enumerate() {
        for b in &decl.ctors[i + 1..] {
            if a.params.len() == b.params.len() {
                return Err(DynError::malformed(format!(
                    "duplicate constructor with {} parameter(s)",
                    a.params.len()
                )));
            }
        }
    }
    for (i, a) in decl.methods.iter().enumerate() {
        for b in &decl.methods[i + 1..] {
            if a.name == b.name {
                return Err(DynError::malformed(format!(
                    "duplicate method '{}'",
                    a.name
                )));
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Text scanning helpers. These skip Rust string/char literals and comments so
// that braces and commas inside member bodies do not confuse the item split.
// ---------------------------------------------------------------------------

fn read_ident(src: &str, start: usize) -> (&str, usize) {
    let bytes = src.as_bytes();
    let mut end = start;
    while end < bytes.len() {
        let c = bytes[end];
        if c.is_ascii_alphanumeric() || c == b'_' {
            end += 1;
        } else {
            break;
        }
    }
    (&src[start..end], end)
}

fn read_parens(src: &str, start: usize) -> DynResult<(&str, usize)> {
    let open = skip_trivia(src, start);
    if src.as_bytes().get(open) != Some(&b'(') {
        return Err(DynError::malformed("expected '('"));
    }
    let close =
        find_matching(src, open).ok_or_else(|| DynError::malformed("unbalanced parentheses"))?;
    Ok((&src[open + 1..close], close + 1))
}

fn read_braces(src: &str, start: usize) -> DynResult<(&str, usize)> {
    let open = skip_trivia(src, start);
    if src.as_bytes().get(open) != Some(&b'{') {
        return Err(DynError::malformed("expected '{'"));
    }
    let close = find_matching(src, open)
        .ok_or_else(|| DynError::malformed("unbalanced braces in member body"))?;
    Ok((&src[open..=close], close + 1))
}

fn read_until_top_level_comma(src: &str, start: usize) -> DynResult<(&str, usize)> {
    match find_at_top_level(src, start, b',') {
        Some(comma) => Ok((&src[start..comma], comma + 1)),
        None => Ok((&src[start..], src.len())),
    }
}

/// Index of the first `target` byte at nesting depth zero, skipping literals
/// and comments. Angle brackets are tracked so generic types survive.
fn find_at_top_level(src: &str, start: usize, target: u8) -> Option<usize> {
    let bytes = src.as_bytes();
    let mut depth: i32 = 0;
    let mut angle: i32 = 0;
    let mut i = start;
    while i < bytes.len() {
        i = skip_non_code(src, i);
        if i >= bytes.len() {
            break;
        }
        let c = bytes[i];
        if c == target && depth == 0 && angle <= 0 {
            return Some(i);
        }
        match c {
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => depth -= 1,
            b'<' => angle += 1,
            b'>' => angle -= 1,
            _ => {}
        }
        i += 1;
    }
    None
}

/// Matching close delimiter for the open delimiter at `open`.
fn find_matching(src: &str, open: usize) -> Option<usize> {
    let bytes = src.as_bytes();
    let (open_c, close_c) = match bytes[open] {
        b'(' => (b'(', b')'),
        b'[' => (b'[', b']'),
        b'{' => (b'{', b'}'),
        _ => return None,
    };
    let mut depth = 0usize;
    let mut i = open;
    while i < bytes.len() {
        i = skip_non_code(src, i);
        if i >= bytes.len() {
            break;
        }
        let c = bytes[i];
        if c == open_c {
            depth += 1;
        } else if c == close_c {
            depth -= 1;
            if depth == 0 {
                return Some(i);
            }
        }
        i += 1;
    }
    None
}

/// If `i` sits at the start of a string/char literal or comment, return the
/// index just past it; otherwise return `i` unchanged.
fn skip_non_code(src: &str, i: usize) -> usize {
    let bytes = src.as_bytes();
    match bytes.get(i) {
        Some(b'"') => {
            let mut j = i + 1;
            while j < bytes.len() {
                match bytes[j] {
                    b'\\' => j += 2,
                    b'"' => return j + 1,
                    _ => j += 1,
                }
            }
            j
        }
        Some(b'\'') => {
            // Distinguish a char literal from a lifetime: a closing quote
            // within a couple of bytes means a literal.
            if bytes.get(i + 1) == Some(&b'\\') {
                let mut j = i + 3;
                while j < bytes.len() && bytes[j] != b'\'' {
                    j += 1;
                }
                j + 1
            } else if bytes.get(i + 2) == Some(&b'\'') {
                i + 3
            } else {
                i + 1
            }
        }
        Some(b'/') if bytes.get(i + 1) == Some(&b'/') => {
            let mut j = i + 2;
            while j < bytes.len() && bytes[j] != b'\n' {
                j += 1;
            }
            j
        }
        Some(b'/') if bytes.get(i + 1) == Some(&b'*') => {
            let mut j = i + 2;
            while j + 1 < bytes.len() && !(bytes[j] == b'*' && bytes[j + 1] == b'/') {
                j += 1;
            }
            (j + 2).min(bytes.len())
        }
        _ => i,
    }
}

fn skip_trivia(src: &str, mut i: usize) -> usize {
    let bytes = src.as_bytes();
    loop {
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        let skipped = skip_non_code(src, i);
        if skipped == i || !matches!(bytes.get(i), Some(b'/')) {
            return i;
        }
        i = skipped;
    }
}

fn split_top_level_commas(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut at = 0;
    while let Some(comma) = find_at_top_level(text, at, b',') {
        parts.push(&text[start..comma]);
        start = comma + 1;
        at = start;
    }
    if !text[start..].trim().is_empty() {
        parts.push(&text[start..]);
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
namespace demo.util;

// A polite example class.
class Greeter {
    prefix: String,

    new(prefix: String) { Greeter { prefix } }

    fn greet(&self, who: String) -> String { format!("{} {}", self.prefix, who) }

    static fn answer() -> i64 { 42 }

    priv fn internal(&self) -> i64 { 1 }
}
"#;

    #[test]
    fn test_parse_full_class() {
        let decl = parse_class(FULL).unwrap();
        assert_eq!(decl.name, "Greeter");
        assert_eq!(decl.namespace, "demo.util");
        assert_eq!(decl.qualified_name(), "demo.util.Greeter");
        assert_eq!(decl.fields.len(), 1);
        assert_eq!(decl.fields[0].ty, "String");
        assert_eq!(decl.ctors.len(), 1);
        assert_eq!(decl.ctors[0].params.len(), 1);
        assert_eq!(decl.methods.len(), 3);

        let greet = &decl.methods[0];
        assert_eq!(greet.name, "greet");
        assert!(!greet.is_static);
        assert!(greet.is_public);
        assert_eq!(greet.params[0].ty, ParamType::Str);
        assert_eq!(greet.ret, RetType::Str);

        let answer = &decl.methods[1];
        assert!(answer.is_static);
        assert_eq!(answer.ret, RetType::Int);

        assert!(!decl.methods[2].is_public);
    }

    #[test]
    fn test_bodies_are_verbatim() {
        let decl = parse_class(FULL).unwrap();
        assert_eq!(
            decl.methods[0].body,
            "{ format!(\"{} {}\", self.prefix, who) }"
        );
        assert_eq!(decl.ctors[0].body, "{ Greeter { prefix } }");
    }

    #[test]
    fn test_braces_inside_string_literals_do_not_confuse_the_scan() {
        let src = r#"class Tricky { fn s(&self) -> String { "}{".to_string() } }"#;
        let decl = parse_class(src).unwrap();
        assert_eq!(decl.methods.len(), 1);
        assert!(decl.methods[0].body.contains("\"}{\""));
    }

    #[test]
    fn test_unsupported_param_type_is_malformed() {
        let src = "class A { fn f(&self, v: Vec<u8>) -> i64 { 0 } }";
        assert!(matches!(
            parse_class(src),
            Err(DynError::MalformedSource { .. })
        ));
    }

    #[test]
    fn test_instance_method_requires_self() {
        let src = "class A { fn f() -> i64 { 0 } }";
        let err = parse_class(src).unwrap_err();
        assert!(err.to_string().contains("must take &self"));
    }

    #[test]
    fn test_duplicate_method_name_rejected() {
        let src = "class A { static fn f(x: i64) -> i64 { x } static fn f(y: f64) -> i64 { 0 } }";
        assert!(parse_class(src).is_err());
    }

    #[test]
    fn test_any_whitespace_after_class_keyword_parses() {
        let decl = parse_class("class\tProbe { static fn one() -> i64 { 1 } }").unwrap();
        assert_eq!(decl.name, "Probe");
        let decl = parse_class("class\n    Probe { static fn one() -> i64 { 1 } }").unwrap();
        assert_eq!(decl.name, "Probe");
    }

    #[test]
    fn test_ref_str_parameter() {
        let src = "class A { static fn len(s: &str) -> i64 { s.len() as i64 } }";
        let decl = parse_class(src).unwrap();
        assert_eq!(decl.methods[0].params[0].ty, ParamType::Str);
        assert!(decl.methods[0].params[0].by_ref);
    }

    #[test]
    fn test_fieldless_class_has_default_ctor() {
        let decl = parse_class("class A { static fn f() -> i64 { 1 } }").unwrap();
        assert!(decl.has_default_ctor());
    }

    #[test]
    fn test_generic_field_type_passes_through() {
        let src = "class A { items: Vec<String>, new() { A { items: Vec::new() } } }";
        let decl = parse_class(src).unwrap();
        assert_eq!(decl.fields[0].ty, "Vec<String>");
        assert_eq!(decl.ctors.len(), 1);
    }
}
