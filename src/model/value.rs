use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;

/// A single cell of a dynamically read row, or a related object folded into it.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    /// Raw json/jsonb column content
    Json(serde_json::Value),
    Bytes(Vec<u8>),
    /// A materialized related row
    Object(RawRow),
    /// A materialized many-to-many list
    List(Vec<Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// String form used to key ids in demand sets and caches.
    ///
    /// Returns `None` for values that cannot act as a foreign key: null,
    /// the empty string, and nested objects or lists.
    pub fn as_key(&self) -> Option<String> {
        let key = match self {
            Value::Null | Value::Object(_) | Value::List(_) => return None,
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Text(s) => s.clone(),
            Value::Json(serde_json::Value::String(s)) => s.clone(),
            Value::Json(serde_json::Value::Null) => return None,
            Value::Json(other) => other.to_string(),
            Value::Bytes(bytes) => hex::encode(bytes),
        };

        if key.is_empty() {
            None
        } else {
            Some(key)
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            Value::Json(serde_json::Value::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Json(serde_json::Value::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    /// Convert to plain JSON, dropping the column-type distinction.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::Json(json) => json.clone(),
            Value::Bytes(bytes) => serde_json::Value::String(hex::encode(bytes)),
            Value::Object(row) => serde_json::Value::Object(
                row.iter()
                    .map(|(column, value)| (column.clone(), value.to_json()))
                    .collect(),
            ),
            Value::List(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => n.as_f64().map(Value::Float).unwrap_or(Value::Null),
            },
            serde_json::Value::String(s) => Value::Text(s),
            other => Value::Json(other),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_none(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::Text(s) => serializer.serialize_str(s),
            Value::Json(json) => json.serialize(serializer),
            Value::Bytes(bytes) => serializer.serialize_str(&hex::encode(bytes)),
            Value::Object(row) => row.serialize(serializer),
            Value::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
        }
    }
}

/// Column to value map handed to dynamic inserts and updates.
pub type Fields = BTreeMap<String, Value>;

/// One row of a table whose columns are only known at runtime.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRow {
    columns: BTreeMap<String, Value>,
}

impl RawRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a row by pairing column names with positionally scanned values.
    pub fn from_positional(columns: &[String], values: Vec<Value>) -> Self {
        Self {
            columns: columns.iter().cloned().zip(values).collect(),
        }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns.get(column)
    }

    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.columns.insert(column.into(), value.into())
    }

    pub fn remove(&mut self, column: &str) -> Option<Value> {
        self.columns.remove(column)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.columns.contains_key(column)
    }

    /// The row's own `id` column in key form.
    pub fn id_key(&self) -> Option<String> {
        self.get("id").and_then(Value::as_key)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.columns.iter()
    }
}

impl From<RawRow> for Value {
    fn from(row: RawRow) -> Self {
        Value::Object(row)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for RawRow {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            columns: iter
                .into_iter()
                .map(|(column, value)| (column.into(), value.into()))
                .collect(),
        }
    }
}

impl Serialize for RawRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (column, value) in &self.columns {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_form_of_values() {
        assert_eq!(Value::Int(42).as_key(), Some("42".to_string()));
        assert_eq!(Value::from("abc").as_key(), Some("abc".to_string()));
        assert_eq!(Value::Null.as_key(), None);
        assert_eq!(Value::from("").as_key(), None);
        assert_eq!(Value::Object(RawRow::new()).as_key(), None);
    }

    #[test]
    fn test_json_payload_conversion() {
        assert_eq!(Value::from(json!(7)), Value::Int(7));
        assert_eq!(Value::from(json!(1.5)), Value::Float(1.5));
        assert_eq!(Value::from(json!("x")), Value::Text("x".to_string()));
        assert_eq!(Value::from(json!(null)), Value::Null);
        assert_eq!(
            Value::from(json!({"a": 1})),
            Value::Json(json!({"a": 1}))
        );
    }

    #[test]
    fn test_materialized_row_serializes_as_plain_json() {
        let tag: RawRow = [("id", Value::from("t1")), ("label", Value::from("red"))]
            .into_iter()
            .collect();
        let mut row = RawRow::new();
        row.insert("id", 1_i64);
        row.insert("tags", Value::List(vec![Value::Object(tag), Value::from("t9")]));
        row.insert("blob", Value::Bytes(vec![0xde, 0xad]));
        row.insert("owner", Value::Null);

        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(
            json,
            json!({
                "id": 1,
                "tags": [{"id": "t1", "label": "red"}, "t9"],
                "blob": "dead",
                "owner": null
            })
        );
        assert_eq!(Value::Object(row).to_json(), json);
    }
}
