use serde_json::{Map, Value};
use crate::core::error::{Error, Result};
use crate::schema::schema::{FieldType, IndexDeclaration, ModelDefinition, ModelSettings, PropertyDefinition};

/// Parser for LoopBack-style model definition JSON
///
/// ```text
/// {
///   "name": "Product",
///   "properties": {
///     "name": {"type": "string", "index": true},
///     "tags": [{"tag": "string"}],
///     "sku": {"type": "number", "id": true}
///   },
///   "indexes": {"name_price": {"keys": {"name": 1, "price": -1}, "partitioned": false}},
///   "cloudant": {"database": "shop", "modelIndex": "doc_type"}
/// }
/// ```
pub struct ModelParser;

impl ModelParser {
    pub fn parse(input: &Value) -> Result<ModelDefinition> {
        let root = input
            .as_object()
            .ok_or_else(|| Error::invalid_schema("Model definition must be an object".to_string()))?;

        let name = root
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::invalid_schema("Model definition is missing \"name\"".to_string()))?;

        let mut properties = Vec::new();
        if let Some(props) = root.get("properties") {
            let props = props.as_object().ok_or_else(|| {
                Error::invalid_schema(format!("\"properties\" of {} must be an object", name))
            })?;
            for (prop_name, decl) in props {
                properties.push(Self::parse_property(prop_name, decl)?);
            }
        }

        let mut settings = ModelSettings::default();
        if let Some(indexes) = root.get("indexes") {
            settings.indexes = Self::parse_indexes(name, indexes)?;
        }
        if let Some(Value::Object(store)) = root.get("cloudant").or_else(|| root.get("couchdb")) {
            settings.database = store
                .get("database")
                .or_else(|| store.get("db"))
                .and_then(Value::as_str)
                .map(String::from);
            settings.model_index = store.get("modelIndex").and_then(Value::as_str).map(String::from);
            settings.model_selector = match store.get("modelSelector") {
                None | Some(Value::Null) => None,
                Some(Value::Object(selector)) => Some(selector.clone()),
                Some(other) => {
                    return Err(Error::invalid_schema(format!(
                        "modelSelector of {} must be an object, got {}",
                        name, other
                    )));
                }
            };
        }

        let model = ModelDefinition {
            name: name.to_string(),
            properties,
            settings,
        };
        model.validate()?;
        Ok(model)
    }

    fn parse_property(name: &str, decl: &Value) -> Result<PropertyDefinition> {
        let (id, index) = match decl {
            Value::Object(map) if map.contains_key("type") => (
                map.get("id").map(truthy).unwrap_or(false),
                map.get("index").map(truthy).unwrap_or(false),
            ),
            _ => (false, false),
        };
        Ok(PropertyDefinition {
            name: name.to_string(),
            field_type: Self::parse_type(decl)?,
            id,
            index,
        })
    }

    fn parse_type(decl: &Value) -> Result<FieldType> {
        match decl {
            Value::String(type_name) => Self::parse_type_name(type_name),
            Value::Array(items) => Self::parse_array(items, None),
            Value::Object(map) => match map.get("type") {
                Some(Value::String(t)) if t.eq_ignore_ascii_case("array") => {
                    Self::parse_array(&[], Some(map))
                }
                Some(Value::Array(items)) => Self::parse_array(items, Some(map)),
                Some(inner) => Self::parse_type(inner),
                None => {
                    let mut props = Vec::new();
                    for (prop_name, prop_decl) in map {
                        props.push(Self::parse_property(prop_name, prop_decl)?);
                    }
                    Ok(FieldType::Object(props))
                }
            },
            other => Err(Error::invalid_schema(format!("Unsupported property type {}", other))),
        }
    }

    /// Element shapes come from the array itself and from numbered keys of
    /// the `{type: "array", "0": {...}}` form
    fn parse_array(items: &[Value], numbered: Option<&Map<String, Value>>) -> Result<FieldType> {
        let mut shapes = Vec::new();
        for item in items {
            shapes.push(Self::parse_type(item)?);
        }
        if let Some(map) = numbered {
            for (key, value) in map {
                if key.parse::<usize>().is_ok() {
                    shapes.push(Self::parse_type(value)?);
                }
            }
        }
        if shapes.is_empty() {
            shapes.push(FieldType::Any);
        }
        Ok(FieldType::Array(shapes))
    }

    fn parse_type_name(type_name: &str) -> Result<FieldType> {
        match type_name.to_ascii_lowercase().as_str() {
            "string" => Ok(FieldType::String),
            "number" => Ok(FieldType::Number),
            "boolean" => Ok(FieldType::Boolean),
            "date" => Ok(FieldType::Date),
            "any" | "object" | "geopoint" | "buffer" => Ok(FieldType::Any),
            "array" => Ok(FieldType::Array(vec![FieldType::Any])),
            other => Err(Error::invalid_schema(format!("Unknown property type \"{}\"", other))),
        }
    }

    fn parse_indexes(model: &str, indexes: &Value) -> Result<Vec<IndexDeclaration>> {
        let indexes = indexes.as_object().ok_or_else(|| {
            Error::invalid_schema(format!("\"indexes\" of {} must be an object", model))
        })?;

        let mut declarations = Vec::new();
        for (name, decl) in indexes {
            let keys = match decl.get("keys") {
                Some(Value::Object(keys)) => keys,
                _ => {
                    return Err(Error::invalid_schema(format!(
                        "The keys in model index {} of {} are not well defined",
                        name, model
                    )));
                }
            };

            let mut parsed = Vec::with_capacity(keys.len());
            for (field, direction) in keys {
                let direction = direction.as_i64().ok_or_else(|| {
                    Error::invalid_schema(format!(
                        "Direction of {} in index {} must be 1 or -1",
                        field, name
                    ))
                })?;
                parsed.push((field.clone(), if direction > 0 { 1 } else { -1 }));
            }

            declarations.push(IndexDeclaration {
                name: name.clone(),
                keys: parsed,
                partitioned: decl.get("partitioned").map(truthy).unwrap_or(false),
            });
        }
        Ok(declarations)
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}
