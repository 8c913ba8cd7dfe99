//! Cell values shared by every stage.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One table cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v", rename_all = "snake_case")]
pub enum Value {
    Null,
    Integer(i64),
    Float(f64),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric view of the value; text is parsed permissively.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Null => None,
            Value::Integer(i) => Some(*i as f64),
            Value::Float(f) if f.is_finite() => Some(*f),
            Value::Float(_) => None,
            Value::Text(s) => parse_number(s),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Permissive numeric coercion: anything unparseable becomes `Null`.
    pub fn coerce_float(&self) -> Value {
        match self.as_f64() {
            Some(f) => Value::Float(f),
            None => Value::Null,
        }
    }

    /// Canonical text form for key columns so that `5`, `5.0` and `"5"` match.
    pub fn canonical_key(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Integer(i) => Some(i.to_string()),
            Value::Float(f) => float_key(*f),
            Value::Text(s) if s.is_empty() => None,
            Value::Text(s) => Some(s.clone()),
        }
    }

    /// Key-canonicalised copy (`Null` when there is no usable key).
    pub fn to_key(&self) -> Value {
        match self.canonical_key() {
            Some(k) => Value::Text(k),
            None => Value::Null,
        }
    }
}

fn float_key(f: f64) -> Option<String> {
    if !f.is_finite() {
        return None;
    }
    // Integral floats within the exactly representable range print as integers.
    if f.fract() == 0.0 && f.abs() < 9.007_199_254_740_992e15 {
        Some(format!("{}", f as i64))
    } else {
        Some(format!("{f}"))
    }
}

/// Parse a number the way a spreadsheet-ish source would: surrounding
/// whitespace is ignored, empty and non-finite input yields `None`.
pub fn parse_number(s: &str) -> Option<f64> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|f| f.is_finite())
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn coercion_is_permissive() {
        assert_eq!(Value::from(" 12.5 ").coerce_float(), Value::Float(12.5));
        assert_eq!(Value::from("n/a").coerce_float(), Value::Null);
        assert_eq!(Value::from("").coerce_float(), Value::Null);
        assert_eq!(Value::from("NaN").coerce_float(), Value::Null);
        assert_eq!(Value::Integer(3).coerce_float(), Value::Float(3.0));
    }

    #[test]
    fn keys_match_across_types() {
        assert_eq!(Value::Integer(5).canonical_key().as_deref(), Some("5"));
        assert_eq!(Value::Float(5.0).canonical_key().as_deref(), Some("5"));
        assert_eq!(Value::from("5").canonical_key().as_deref(), Some("5"));
        assert_eq!(Value::Float(5.5).canonical_key().as_deref(), Some("5.5"));
        assert_eq!(Value::from("").canonical_key(), None);
        assert_eq!(Value::Null.to_key(), Value::Null);
    }

    proptest! {
        #[test]
        fn integer_keys_agree_with_their_float_form(i in -1_000_000_000i64..1_000_000_000) {
            prop_assert_eq!(
                Value::Integer(i).canonical_key(),
                Value::Float(i as f64).canonical_key()
            );
        }

        #[test]
        fn display_of_finite_float_parses_back(f in -1.0e9f64..1.0e9) {
            let shown = Value::Float(f).to_string();
            prop_assert_eq!(parse_number(&shown), Some(f));
        }
    }
}
