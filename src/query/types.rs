use std::collections::BTreeMap;
use std::fmt;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde::de::Error as DeError;
use serde::ser::SerializeMap;
use serde_json::{Map, Value};
use crate::core::types::Document;

/// Sort order for query results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,   // Ascending: 0 → 9, A → Z
    Desc,  // Descending: 9 → 0, Z → A
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }

    /// Signed-integer convention used by index declarations: positive is ascending
    pub fn from_sign(direction: i32) -> Self {
        if direction > 0 { SortOrder::Asc } else { SortOrder::Desc }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One native sort entry, serialized as `{"<field>": "asc"}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortField {
    pub field: String,    // May carry a `:number` / `:string` type hint
    pub order: SortOrder,
}

impl SortField {
    pub fn new(field: &str, order: SortOrder) -> Self {
        SortField {
            field: field.to_string(),
            order,
        }
    }

    pub fn asc(field: &str) -> Self {
        SortField::new(field, SortOrder::Asc)
    }

    pub fn desc(field: &str) -> Self {
        SortField::new(field, SortOrder::Desc)
    }

    /// Field name without its type hint
    pub fn base_field(&self) -> &str {
        self.field.split_once(':').map(|(base, _)| base).unwrap_or(&self.field)
    }

    pub fn type_hint(&self) -> Option<&str> {
        self.field.split_once(':').map(|(_, hint)| hint)
    }
}

impl Serialize for SortField {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(&self.field, &self.order)?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for SortField {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let entry = BTreeMap::<String, SortOrder>::deserialize(deserializer)?;
        if entry.len() != 1 {
            return Err(D::Error::custom("sort entry must have exactly one field"));
        }
        let (field, order) = entry
            .into_iter()
            .next()
            .ok_or_else(|| D::Error::custom("empty sort entry"))?;
        Ok(SortField { field, order })
    }
}

/// Native `_find` request body
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FindQuery {
    pub selector: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sort: Vec<SortField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bookmark: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_index: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<String>>,
}

impl FindQuery {
    pub fn new(selector: Map<String, Value>) -> Self {
        FindQuery {
            selector,
            ..FindQuery::default()
        }
    }
}

/// Native `_find` response. `docs` stays optional so that a response
/// without a result array can be told apart from an empty page.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FindResponse {
    #[serde(default)]
    pub docs: Option<Vec<Document>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bookmark: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}
