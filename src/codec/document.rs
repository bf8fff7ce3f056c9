use chrono::{DateTime, Utc};
use serde_json::Value;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{Document, FieldValue, Record};
use crate::registry::binding::{ModelBinding, Tagging};

/// Maps logical records to stored documents and back.
///
/// `from_physical` is a retraction rather than the inverse of `to_physical`:
/// stored documents carry `_rev` and the discriminator, which the logical
/// view drops.
pub struct DocumentCodec;

impl DocumentCodec {
    pub fn to_physical(record: &Record, binding: &ModelBinding) -> Result<Document> {
        let mut doc = Document::new();

        for (name, value) in &record.fields {
            if value.is_unset() {
                continue;
            }

            if *name == binding.id_field {
                // A nulled identifier is omitted
                if matches!(value, FieldValue::Null) {
                    continue;
                }
                let id = value.to_id_string().ok_or_else(|| {
                    Error::new(
                        ErrorKind::InvalidArgument,
                        format!("Identifier {} of {} must be a scalar", name, binding.model),
                    )
                })?;
                doc.insert("_id".to_string(), Value::String(id));
                continue;
            }

            if let Some(json) = value.to_json() {
                doc.insert(name.clone(), json);
            }
        }

        if let Tagging::Discriminator(field) = &binding.tagging {
            doc.insert(field.clone(), Value::String(binding.model.clone()));
        }
        Ok(doc)
    }

    pub fn from_physical(doc: &Document, binding: &ModelBinding) -> Result<Record> {
        let id = match doc.get("_id") {
            Some(Value::String(id)) => id.clone(),
            Some(Value::Number(n)) => n.to_string(),
            Some(other) => {
                return Err(Error::malformed(format!("Document _id must be a string, got {}", other)));
            }
            None => {
                return Err(Error::malformed(format!(
                    "Document of {} returned without _id",
                    binding.model
                )));
            }
        };

        let mut record = Record::new();
        for (name, value) in doc {
            if name == "_id" || name == "_rev" || Some(name.as_str()) == binding.discriminator() {
                continue;
            }
            record.insert(name.clone(), FieldValue::from_json(value));
        }

        let id_value = if binding.is_numeric_id() {
            let n = id.parse::<i64>().map_err(|_| {
                Error::malformed(format!("Numeric id of {} is not an integer: {}", binding.model, id))
            })?;
            FieldValue::Integer(n)
        } else {
            FieldValue::Text(id)
        };
        record.insert(binding.id_field.clone(), id_value);

        for field in &binding.date_fields {
            match doc.get(field) {
                None | Some(Value::Null) => {}
                Some(value) => {
                    record.insert(field.clone(), FieldValue::Date(parse_date(field, value)?));
                }
            }
        }

        Ok(record)
    }
}

/// ISO-8601 strings and epoch milliseconds are accepted. Precision is cut
/// to milliseconds, the precision dates are written back with.
fn parse_date(field: &str, value: &Value) -> Result<DateTime<Utc>> {
    match value {
        Value::String(s) => {
            let parsed = DateTime::parse_from_rfc3339(s)?;
            DateTime::<Utc>::from_timestamp_millis(parsed.timestamp_millis())
                .ok_or_else(|| Error::malformed(format!("Date field {} out of range: {}", field, s)))
        }
        Value::Number(n) => n
            .as_i64()
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .ok_or_else(|| Error::malformed(format!("Date field {} out of range: {}", field, n))),
        other => Err(Error::malformed(format!("Date field {} holds {}", field, other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use chrono::TimeZone;
    use proptest::prelude::*;
    use serde_json::json;
    use crate::core::config::Config;
    use crate::schema::schema::{FieldType, ModelDefinition};

    fn bind(def: ModelDefinition) -> ModelBinding {
        ModelBinding::from_definition(Arc::new(def), &Config::with_url("http://localhost:5984")).unwrap()
    }

    fn user() -> ModelBinding {
        bind(
            ModelDefinition::new("User")
                .property("name", FieldType::String)
                .property("birthday", FieldType::Date),
        )
    }

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn to_physical_moves_id_and_tags_model() {
        let record = Record::new()
            .with("id", "u1")
            .with("name", "Tony")
            .with("nickname", FieldValue::Unset);
        let physical = DocumentCodec::to_physical(&record, &user()).unwrap();
        assert_eq!(
            Value::Object(physical),
            json!({"_id": "u1", "name": "Tony", "loopback__model__name": "User"})
        );
    }

    #[test]
    fn nulled_identifier_is_omitted() {
        let record = Record::new().with("id", FieldValue::Null).with("name", "x");
        let physical = DocumentCodec::to_physical(&record, &user()).unwrap();
        assert!(!physical.contains_key("_id"));
        assert!(!physical.contains_key("id"));
    }

    #[test]
    fn custom_selector_models_are_not_tagged() {
        let binding = bind(
            ModelDefinition::new("Product")
                .with_model_selector(doc(json!({"kind": "product"}))),
        );
        let physical = DocumentCodec::to_physical(&Record::new().with("id", "p"), &binding).unwrap();
        assert_eq!(Value::Object(physical), json!({"_id": "p"}));
    }

    #[test]
    fn from_physical_strips_bookkeeping_and_converts_dates() {
        let record = DocumentCodec::from_physical(
            &doc(json!({
                "_id": "u1",
                "_rev": "1-abc",
                "loopback__model__name": "User",
                "name": "Tony",
                "birthday": "1980-12-08T00:00:00.000Z"
            })),
            &user(),
        )
        .unwrap();

        let expected = Utc.with_ymd_and_hms(1980, 12, 8, 0, 0, 0).unwrap();
        assert_eq!(record.get("id"), Some(&FieldValue::Text("u1".to_string())));
        assert_eq!(record.get("birthday"), Some(&FieldValue::Date(expected)));
        assert!(!record.contains("_rev"));
        assert!(!record.contains("loopback__model__name"));

        let again = DocumentCodec::to_physical(&record, &user()).unwrap();
        assert_eq!(again["birthday"], json!("1980-12-08T00:00:00.000Z"));
    }

    #[test]
    fn missing_id_is_malformed() {
        let err = DocumentCodec::from_physical(&doc(json!({"name": "x"})), &user()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::MalformedResponse);
    }

    #[test]
    fn numeric_identifier_round_trips() {
        let binding = bind(ModelDefinition::new("Item").id_property("sku", FieldType::Number));
        let record = Record::new().with("sku", 42).with("label", "x");
        let physical = DocumentCodec::to_physical(&record, &binding).unwrap();
        assert_eq!(physical["_id"], json!("42"));
        assert!(!physical.contains_key("sku"));
        assert_eq!(DocumentCodec::from_physical(&physical, &binding).unwrap(), record);

        let err = DocumentCodec::from_physical(&doc(json!({"_id": "abc"})), &binding).unwrap_err();
        assert_eq!(err.kind, ErrorKind::MalformedResponse);
    }

    #[test]
    fn unparsable_date_is_malformed() {
        let err = DocumentCodec::from_physical(
            &doc(json!({"_id": "u", "birthday": "yesterday"})),
            &user(),
        )
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::MalformedResponse);
    }

    #[test]
    fn sub_millisecond_dates_are_truncated_on_read() {
        let stored = doc(json!({"_id": "u1", "birthday": "1980-12-08T00:00:00.000123Z"}));
        let once = DocumentCodec::from_physical(&stored, &user()).unwrap();
        let expected = Utc.with_ymd_and_hms(1980, 12, 8, 0, 0, 0).unwrap();
        assert_eq!(once.get("birthday"), Some(&FieldValue::Date(expected)));

        let written = DocumentCodec::to_physical(&once, &user()).unwrap();
        let twice = DocumentCodec::from_physical(&written, &user()).unwrap();
        assert_eq!(once, twice);
    }

    /// Stored dates as epoch millis or as ISO strings with microseconds
    fn stored_date() -> impl Strategy<Value = Value> {
        prop_oneof![
            (0i64..4_000_000_000_000).prop_map(|ms| json!(ms)),
            (0i64..4_000_000_000_000, 0i64..1000).prop_map(|(ms, us)| {
                let date = DateTime::<Utc>::from_timestamp_millis(ms).unwrap()
                    + chrono::Duration::microseconds(us);
                json!(date.to_rfc3339_opts(chrono::SecondsFormat::Micros, true))
            }),
        ]
    }

    fn scalar() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(|n| json!(n)),
            "[a-z ]{0,12}".prop_map(Value::String),
        ]
    }

    proptest! {
        #[test]
        fn from_physical_is_a_stable_retraction(
            id in "[a-zA-Z0-9]{1,16}",
            rev in "[1-9]-[a-f0-9]{8}",
            fields in prop::collection::btree_map("f_[a-z]{1,6}", scalar(), 0..6),
            birthday in proptest::option::of(stored_date()),
        ) {
            let binding = user();
            let mut physical = Document::new();
            physical.insert("_id".to_string(), json!(id));
            physical.insert("_rev".to_string(), json!(rev));
            physical.insert("loopback__model__name".to_string(), json!("User"));
            for (k, v) in fields {
                physical.insert(k, v);
            }
            if let Some(date) = birthday {
                physical.insert("birthday".to_string(), date);
            }

            let once = DocumentCodec::from_physical(&physical, &binding).unwrap();
            let stored = DocumentCodec::to_physical(&once, &binding).unwrap();
            let twice = DocumentCodec::from_physical(&stored, &binding).unwrap();
            prop_assert_eq!(once, twice);
        }
    }
}
