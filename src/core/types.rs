use serde::{Serialize, Deserialize};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;
use std::fmt;
use chrono::{DateTime, SecondsFormat, Utc};
use crate::core::error::{Error, ErrorKind, Result};

/// Physical document as stored: an untyped JSON object carrying `_id`, `_rev`
/// and the discriminator next to the model properties.
pub type Document = Map<String, Value>;

/// Opaque revision token (`_rev`) used for optimistic concurrency
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Revision(pub String);

impl Revision {
    pub fn new(rev: impl Into<String>) -> Self {
        Revision(rev.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Generation number, the part before the dash
    pub fn generation(&self) -> u64 {
        self.0
            .split_once('-')
            .and_then(|(n, _)| n.parse().ok())
            .unwrap_or(0)
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Typed property value of a logical record
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Declared but not provided. Dropped on write, ignored on merge.
    Unset,
    Null,
    Boolean(bool),
    Integer(i64),
    Number(f64),
    Text(String),
    Date(DateTime<Utc>),
    Array(Vec<FieldValue>),
    Object(BTreeMap<String, FieldValue>),
}

impl FieldValue {
    pub fn from_json(value: &Value) -> FieldValue {
        match value {
            Value::Null => FieldValue::Null,
            Value::Bool(b) => FieldValue::Boolean(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => FieldValue::Integer(i),
                None => FieldValue::Number(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => FieldValue::Text(s.clone()),
            Value::Array(items) => FieldValue::Array(items.iter().map(FieldValue::from_json).collect()),
            Value::Object(map) => FieldValue::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), FieldValue::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// JSON form of the value; `None` for `Unset`
    pub fn to_json(&self) -> Option<Value> {
        let value = match self {
            FieldValue::Unset => return None,
            FieldValue::Null => Value::Null,
            FieldValue::Boolean(b) => Value::Bool(*b),
            FieldValue::Integer(i) => Value::Number((*i).into()),
            FieldValue::Number(n) => Number::from_f64(*n).map(Value::Number).unwrap_or(Value::Null),
            FieldValue::Text(s) => Value::String(s.clone()),
            FieldValue::Date(d) => Value::String(format_date(d)),
            FieldValue::Array(items) => Value::Array(
                items.iter()
                    .map(|v| v.to_json().unwrap_or(Value::Null))
                    .collect(),
            ),
            FieldValue::Object(map) => Value::Object(
                map.iter()
                    .filter_map(|(k, v)| v.to_json().map(|json| (k.clone(), json)))
                    .collect(),
            ),
        };
        Some(value)
    }

    pub fn is_unset(&self) -> bool {
        matches!(self, FieldValue::Unset)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<&DateTime<Utc>> {
        match self {
            FieldValue::Date(d) => Some(d),
            _ => None,
        }
    }

    /// Identifier text as written to `_id`
    pub fn to_id_string(&self) -> Option<String> {
        match self {
            FieldValue::Text(s) => Some(s.clone()),
            FieldValue::Integer(i) => Some(i.to_string()),
            FieldValue::Number(n) => Some(n.to_string()),
            FieldValue::Boolean(b) => Some(b.to_string()),
            FieldValue::Date(d) => Some(format_date(d)),
            _ => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<i64> for FieldValue {
    fn from(i: i64) -> Self {
        FieldValue::Integer(i)
    }
}

impl From<i32> for FieldValue {
    fn from(i: i32) -> Self {
        FieldValue::Integer(i as i64)
    }
}

impl From<f64> for FieldValue {
    fn from(n: f64) -> Self {
        FieldValue::Number(n)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Boolean(b)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(d: DateTime<Utc>) -> Self {
        FieldValue::Date(d)
    }
}

/// ISO-8601 with millisecond precision and a `Z` suffix
pub fn format_date(date: &DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Logical record: property name to typed value, identifier included.
/// Carries no revision; `_rev` only appears here when a caller sets it
/// explicitly for a conditional write.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    pub fields: BTreeMap<String, FieldValue>,
}

impl Record {
    pub fn new() -> Self {
        Record {
            fields: BTreeMap::new(),
        }
    }

    pub fn with(mut self, name: &str, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    pub fn insert(&mut self, name: String, value: FieldValue) {
        self.fields.insert(name, value);
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<FieldValue> {
        self.fields.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn from_json(value: &Value) -> Result<Record> {
        match value {
            Value::Object(map) => Ok(Record {
                fields: map
                    .iter()
                    .map(|(k, v)| (k.clone(), FieldValue::from_json(v)))
                    .collect(),
            }),
            other => Err(Error::new(
                ErrorKind::InvalidArgument,
                format!("Record must be a JSON object, got {}", other),
            )),
        }
    }

    pub fn to_json(&self) -> Value {
        Value::Object(
            self.fields
                .iter()
                .filter_map(|(k, v)| v.to_json().map(|json| (k.clone(), json)))
                .collect(),
        )
    }

    /// Overwrite fields with the ones set in `patch`; `Unset` entries are skipped
    pub fn merge(&mut self, patch: &Record) {
        for (name, value) in &patch.fields {
            if !value.is_unset() {
                self.fields.insert(name.clone(), value.clone());
            }
        }
    }
}

/// Store answer to a single-document write
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteResult {
    pub id: String,
    pub rev: Revision,
}

/// Per-document outcome of a bulk request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkOutcome {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl BulkOutcome {
    pub fn ok(id: String, rev: &Revision) -> Self {
        BulkOutcome {
            id: Some(id),
            rev: Some(rev.0.clone()),
            error: None,
            reason: None,
        }
    }

    pub fn failed(id: Option<String>, error: &str, reason: &str) -> Self {
        BulkOutcome {
            id,
            rev: None,
            error: Some(error.to_string()),
            reason: Some(reason.to_string()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn json_numbers_keep_integer_identity() {
        assert_eq!(FieldValue::from_json(&json!(100)), FieldValue::Integer(100));
        assert_eq!(FieldValue::from_json(&json!(1.5)), FieldValue::Number(1.5));
    }

    #[test]
    fn dates_serialize_with_millis() {
        let d = Utc.with_ymd_and_hms(1980, 12, 8, 0, 0, 0).unwrap();
        assert_eq!(FieldValue::Date(d).to_json(), Some(json!("1980-12-08T00:00:00.000Z")));
    }

    #[test]
    fn unset_is_dropped_from_json_and_merge() {
        let record = Record::new()
            .with("name", "bread")
            .with("price", FieldValue::Unset);
        assert_eq!(record.to_json(), json!({"name": "bread"}));

        let mut base = Record::new().with("price", 100);
        base.merge(&record);
        assert_eq!(base.get("price"), Some(&FieldValue::Integer(100)));
        assert_eq!(base.get("name"), Some(&FieldValue::Text("bread".to_string())));
    }

    #[test]
    fn revision_generation() {
        assert_eq!(Revision::new("3-abc").generation(), 3);
        assert_eq!(Revision::new("garbage").generation(), 0);
    }
}
