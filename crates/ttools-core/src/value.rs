//! Dynamic SQL values.

use serde::{Deserialize, Serialize};

/// A statement argument or result column.
///
/// Serializes externally tagged, so trace lines keep the distinction between
/// `Int` and `BigInt` arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i32),
    BigInt(i64),
    Double(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl Value {
    pub const fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The value as a row id, if it is integral.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(i64::from(*v)),
            Value::BigInt(v) => Some(*v),
            Value::Bool(v) => Some(i64::from(*v)),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::BigInt(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_widening() {
        assert_eq!(Value::Int(7).as_i64(), Some(7));
        assert_eq!(Value::BigInt(i64::MAX).as_i64(), Some(i64::MAX));
        assert_eq!(Value::Bool(true).as_i64(), Some(1));
        assert_eq!(Value::Text("7".into()).as_i64(), None);
    }

    #[test]
    fn option_conversion() {
        assert_eq!(Value::from(Some(5_i64)), Value::BigInt(5));
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert!(Value::from(None::<&str>).is_null());
    }

    #[test]
    fn serializes_as_tagged_json() {
        let json = serde_json::to_string(&Value::BigInt(42)).unwrap();
        assert_eq!(json, r#"{"BigInt":42}"#);
        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Value::BigInt(42));
    }
}
