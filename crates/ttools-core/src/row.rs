//! Result rows.

use crate::Result;
use crate::error::{Error, TypeError};
use crate::value::Value;
use std::sync::Arc;

/// One row of a result set. Rows of the same result share their column names.
#[derive(Debug, Clone)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl Row {
    pub fn new(columns: Arc<[String]>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Name of the column at `index`.
    pub fn column(&self, index: usize) -> Option<&str> {
        self.columns.get(index).map(String::as_str)
    }

    /// Convert the value at `index`. Type errors name the column.
    pub fn get_as<T: FromValue>(&self, index: usize) -> Result<T> {
        let column = self.column(index).map(str::to_string);
        let Some(value) = self.get(index) else {
            return Err(Error::Type(TypeError {
                expected: std::any::type_name::<T>(),
                actual: format!("no column {index} (row has {})", self.len()),
                column,
            }));
        };
        T::from_value(value).map_err(|e| match e {
            Error::Type(te) => Error::Type(TypeError { column, ..te }),
            e => e,
        })
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

/// Conversion out of a dynamic [`Value`].
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Result<Self>;
}

fn mismatch(expected: &'static str, value: &Value) -> Error {
    Error::Type(TypeError {
        expected,
        actual: format!("{value:?}"),
        column: None,
    })
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Result<Self> {
        value.as_i64().ok_or_else(|| mismatch("i64", value))
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Text(s) => Ok(s.clone()),
            _ => Err(mismatch("String", value)),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self> {
        if value.is_null() {
            Ok(None)
        } else {
            T::from_value(value).map(Some)
        }
    }
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self> {
        Ok(value.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(names: &[&str], values: Vec<Value>) -> Row {
        let columns: Arc<[String]> = names.iter().map(|n| n.to_string()).collect();
        Row::new(columns, values)
    }

    #[test]
    fn typed_access_by_index() {
        let row = row(&["id", "name"], vec![Value::Int(1), Value::from("Alice")]);

        assert_eq!(row.len(), 2);
        assert_eq!(row.column(1), Some("name"));
        assert_eq!(row.get_as::<i64>(0).unwrap(), 1);
        assert_eq!(row.get_as::<String>(1).unwrap(), "Alice");
        assert_eq!(row.get(2), None);
    }

    #[test]
    fn type_errors_name_the_column() {
        let row = row(&["id"], vec![Value::from("x")]);

        match row.get_as::<i64>(0) {
            Err(Error::Type(te)) => {
                assert_eq!(te.column.as_deref(), Some("id"));
                assert_eq!(te.expected, "i64");
            }
            other => panic!("expected type error, got {other:?}"),
        }
        assert!(row.get_as::<i64>(9).is_err());
    }

    #[test]
    fn null_converts_only_to_option() {
        let row = row(&["nullable"], vec![Value::Null]);
        assert_eq!(row.get_as::<Option<i64>>(0).unwrap(), None);
        assert!(row.get_as::<i64>(0).is_err());
        assert_eq!(row.into_values(), vec![Value::Null]);
    }
}
