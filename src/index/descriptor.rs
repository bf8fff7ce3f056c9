use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use crate::query::types::SortField;

/// A native JSON index: `_design/<ddoc>` holding index `<name>`.
/// `ddoc` is kept without the `_design/` prefix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDescriptor {
    pub name: String,
    pub ddoc: String,
    pub fields: Vec<SortField>,
    #[serde(default)]
    pub partitioned: bool,
}

impl IndexDescriptor {
    pub fn new(name: &str, ddoc: &str, fields: Vec<SortField>, partitioned: bool) -> Self {
        IndexDescriptor {
            name: name.to_string(),
            ddoc: strip_design_prefix(ddoc).to_string(),
            fields,
            partitioned,
        }
    }

    /// Same fields with the same directions, in any order
    pub fn same_fields(&self, other: &IndexDescriptor) -> bool {
        self.fields.len() == other.fields.len()
            && self.fields.iter().all(|f| other.fields.contains(f))
    }

    /// Body of a `POST /<db>/_index` request
    pub fn to_request(&self) -> Value {
        json!({
            "index": {"fields": self.fields},
            "partitioned": self.partitioned,
            "ddoc": self.ddoc,
            "name": self.name,
            "type": "json",
        })
    }
}

pub fn strip_design_prefix(ddoc: &str) -> &str {
    ddoc.strip_prefix("_design/").unwrap_or(ddoc)
}

/// Outcome of comparing desired against installed indexes
#[derive(Debug, Clone, PartialEq, Default)]
pub struct IndexDiff {
    pub to_add: Vec<IndexDescriptor>,
    pub to_drop: Vec<IndexDescriptor>,
}

impl IndexDiff {
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_drop.is_empty()
    }
}
