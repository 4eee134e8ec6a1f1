//! The scalar value carried by every topic and association.

use super::DmxError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Scalar value of a topic or association.
///
/// Strings, integers and booleans all funnel into this one canonical
/// representation. Numbers are integers: the core performs no floating-point
/// arithmetic, and a fractional JSON number is rejected at the wire boundary.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SimpleValue {
    Text(String),
    Number(i64),
    Boolean(bool),
}

impl Default for SimpleValue {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl SimpleValue {
    /// `true` for the empty string. Numbers and booleans are never empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Text(s) if s.is_empty())
    }

    /// The text payload, if this is a text value.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// The integer payload, if this is a number.
    #[must_use]
    pub fn as_number(&self) -> Option<i64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// The boolean payload, if this is a boolean.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Wire form: a JSON string, number or boolean.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Text(s) => serde_json::Value::String(s.clone()),
            Self::Number(n) => serde_json::Value::from(*n),
            Self::Boolean(b) => serde_json::Value::Bool(*b),
        }
    }

    /// Parse the wire form. Fractional numbers, `null`, arrays and objects
    /// are not scalar values.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, DmxError> {
        match value {
            serde_json::Value::String(s) => Ok(Self::Text(s.clone())),
            serde_json::Value::Bool(b) => Ok(Self::Boolean(*b)),
            serde_json::Value::Number(n) => n.as_i64().map(Self::Number).ok_or_else(|| {
                DmxError::SerializationError(format!("{} is not an integer value", n))
            }),
            other => Err(DmxError::SerializationError(format!(
                "{} is not a simple value",
                other
            ))),
        }
    }
}

impl fmt::Display for SimpleValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Number(n) => write!(f, "{}", n),
            Self::Boolean(b) => write!(f, "{}", b),
        }
    }
}

impl From<&str> for SimpleValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for SimpleValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i32> for SimpleValue {
    fn from(n: i32) -> Self {
        Self::Number(i64::from(n))
    }
}

impl From<i64> for SimpleValue {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

impl From<bool> for SimpleValue {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn conversions_funnel_to_one_representation() {
        assert_eq!(SimpleValue::from(5i32), SimpleValue::from(5i64));
        assert_eq!(SimpleValue::from("abc"), SimpleValue::from("abc".to_string()));
        assert_eq!(SimpleValue::from(true).to_string(), "true");
        assert_eq!(SimpleValue::from(-12i64).to_string(), "-12");
    }

    #[test]
    fn accessors_match_variant() {
        assert_eq!(SimpleValue::from("abc").as_text(), Some("abc"));
        assert_eq!(SimpleValue::from(3i64).as_text(), None);
        assert_eq!(SimpleValue::from(3i64).as_number(), Some(3));
        assert_eq!(SimpleValue::from(true).as_number(), None);
        assert_eq!(SimpleValue::from(true).as_bool(), Some(true));
    }

    #[test]
    fn default_is_empty_text() {
        assert!(SimpleValue::default().is_empty());
        assert!(!SimpleValue::from(0i64).is_empty());
    }

    #[test]
    fn from_json_rejects_fractions_and_composites() {
        assert_eq!(
            SimpleValue::from_json(&json!(42)).expect("int"),
            SimpleValue::Number(42)
        );
        assert!(SimpleValue::from_json(&json!(1.5)).is_err());
        assert!(SimpleValue::from_json(&json!(null)).is_err());
        assert!(SimpleValue::from_json(&json!({"a": 1})).is_err());
    }
}
