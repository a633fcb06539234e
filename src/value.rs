//! Values crossing the host/plugin boundary, and their wire encoding.
//!
//! Arguments and results travel across the C ABI as a single string: encoded
//! values joined by the ASCII unit separator (0x1F). Each value carries a
//! one-character tag (`u`, `b`, `i`, `f`, `s`); string payloads escape the
//! backslash, the separator, and NUL so the record structure survives
//! arbitrary text. The generated plugin source embeds a `std`-only copy of
//! this codec (see `codegen`), so the two must agree byte for byte.

use serde::{Deserialize, Serialize};

/// Field separator between encoded arguments.
pub const SEP: char = '\u{1f}';

/// A value passed to or returned from a dynamically loaded member.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Unit,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl Value {
    /// The declared parameter type this value satisfies, if any.
    pub fn param_type(&self) -> Option<ParamType> {
        match self {
            Value::Unit => None,
            Value::Bool(_) => Some(ParamType::Bool),
            Value::Int(_) => Some(ParamType::Int),
            Value::Float(_) => Some(ParamType::Float),
            Value::Str(_) => Some(ParamType::Str),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

/// Declared parameter type of a member, as recorded in the manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParamType {
    Bool,
    Int,
    Float,
    Str,
}

impl ParamType {
    /// Rust spelling used in generated signatures.
    pub fn rust_name(&self) -> &'static str {
        match self {
            ParamType::Bool => "bool",
            ParamType::Int => "i64",
            ParamType::Float => "f64",
            ParamType::Str => "String",
        }
    }
}

/// Declared return type of a member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RetType {
    Unit,
    Bool,
    Int,
    Float,
    Str,
}

/// Escape a string payload for the wire: `\` -> `\\`, 0x1F -> `\s`,
/// NUL -> `\z` (interior NUL would truncate the C string).
pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            SEP => out.push_str("\\s"),
            '\0' => out.push_str("\\z"),
            other => out.push(other),
        }
    }
    out
}

/// Inverse of [`escape`]. Fails on a dangling or unknown escape.
pub fn unescape(s: &str) -> Result<String, String> {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('s') => out.push(SEP),
            Some('z') => out.push('\0'),
            Some(other) => return Err(format!("unknown escape '\\{}'", other)),
            None => return Err("dangling escape at end of payload".to_string()),
        }
    }
    Ok(out)
}

/// Encode one value with its tag character.
pub fn encode_value(v: &Value) -> String {
    match v {
        Value::Unit => "u".to_string(),
        Value::Bool(b) => if *b { "b1" } else { "b0" }.to_string(),
        Value::Int(i) => format!("i{}", i),
        Value::Float(f) => format!("f{:?}", f),
        Value::Str(s) => format!("s{}", escape(s)),
    }
}

/// Decode one tagged value.
pub fn decode_value(s: &str) -> Result<Value, String> {
    let mut chars = s.chars();
    let tag = chars.next().ok_or_else(|| "empty value field".to_string())?;
    let rest = chars.as_str();
    match tag {
        'u' => Ok(Value::Unit),
        'b' => match rest {
            "1" => Ok(Value::Bool(true)),
            "0" => Ok(Value::Bool(false)),
            other => Err(format!("bad bool payload '{}'", other)),
        },
        'i' => rest
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|e| format!("bad int payload '{}': {}", rest, e)),
        'f' => rest
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|e| format!("bad float payload '{}': {}", rest, e)),
        's' => unescape(rest).map(Value::Str),
        other => Err(format!("unknown value tag '{}'", other)),
    }
}

/// Encode an argument sequence as a single separator-joined record.
pub fn encode_args(args: &[Value]) -> String {
    args.iter()
        .map(encode_value)
        .collect::<Vec<_>>()
        .join(&SEP.to_string())
}

/// Decode a call result: `v<value>` on success, `e<message>` when the invoked
/// code raised. The error message comes back verbatim.
pub fn decode_result(raw: &str) -> Result<Result<Value, String>, String> {
    let mut chars = raw.chars();
    match chars.next() {
        Some('v') => decode_value(chars.as_str()).map(Ok),
        Some('e') => unescape(chars.as_str()).map(Err),
        Some(other) => Err(format!("unknown result tag '{}'", other)),
        None => Err("empty result record".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_scalars() {
        for v in [
            Value::Unit,
            Value::Bool(true),
            Value::Bool(false),
            Value::Int(-42),
            Value::Float(2.5),
            Value::Str("plain".to_string()),
        ] {
            assert_eq!(decode_value(&encode_value(&v)).unwrap(), v);
        }
    }

    #[test]
    fn test_string_with_separator_and_escapes_roundtrips() {
        let tricky = format!("a\\b{}c\0d", SEP);
        let v = Value::Str(tricky.clone());
        let enc = encode_value(&v);
        // The raw separator must not appear unescaped inside the payload.
        assert!(!enc[1..].contains(SEP));
        assert_eq!(decode_value(&enc).unwrap(), Value::Str(tricky));
    }

    #[test]
    fn test_float_special_values_roundtrip() {
        for f in [f64::INFINITY, f64::NEG_INFINITY, 1.0e300, -0.0] {
            match decode_value(&encode_value(&Value::Float(f))).unwrap() {
                Value::Float(g) => assert_eq!(g.to_bits(), f.to_bits()),
                other => panic!("expected float, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_encode_args_empty_is_empty_record() {
        assert_eq!(encode_args(&[]), "");
    }

    #[test]
    fn test_decode_result_error_carries_message() {
        let raw = format!("e{}", escape("boom: went wrong"));
        assert_eq!(
            decode_result(&raw).unwrap(),
            Err("boom: went wrong".to_string())
        );
    }

    #[test]
    fn test_unescape_rejects_dangling_escape() {
        assert!(unescape("abc\\").is_err());
        assert!(unescape("ab\\q").is_err());
    }
}
