use serde::{Serialize, Deserialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use crate::core::error::{Error, Result};

pub const DEFAULT_ID_FIELD: &str = "id";

/// Declared property type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Date,
    Any,
    Object(Vec<PropertyDefinition>),
    /// Alternative element shapes of an array property
    Array(Vec<FieldType>),
}

impl FieldType {
    pub fn is_numeric(&self) -> bool {
        matches!(self, FieldType::Number)
    }

    /// Types the store collates as strings
    pub fn is_string_like(&self) -> bool {
        matches!(self, FieldType::String | FieldType::Date)
    }

    pub fn is_array(&self) -> bool {
        matches!(self, FieldType::Array(_))
    }

    /// Child type of one path segment. For arrays the first element shape
    /// declaring the segment wins.
    pub fn lookup(&self, segment: &str) -> Option<&FieldType> {
        match self {
            FieldType::Object(props) => props
                .iter()
                .find(|p| p.name == segment)
                .map(|p| &p.field_type),
            FieldType::Array(shapes) => shapes.iter().find_map(|shape| match shape {
                FieldType::Object(_) => shape.lookup(segment),
                _ => None,
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDefinition {
    pub name: String,
    pub field_type: FieldType,
    pub id: bool,
    pub index: bool,
}

/// Named composite index declared on a model. Key direction follows the
/// signed-integer convention: positive is ascending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDeclaration {
    pub name: String,
    pub keys: Vec<(String, i32)>,
    pub partitioned: bool,
}

/// Store-specific model settings
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ModelSettings {
    pub database: Option<String>,
    pub model_index: Option<String>,      // Discriminator override
    pub model_selector: Option<Map<String, Value>>,
    pub indexes: Vec<IndexDeclaration>,
}

/// Logical table schema as handed over by the ORM runtime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDefinition {
    pub name: String,
    pub properties: Vec<PropertyDefinition>,
    pub settings: ModelSettings,
}

impl ModelDefinition {
    pub fn new(name: &str) -> Self {
        ModelDefinition {
            name: name.to_string(),
            properties: Vec::new(),
            settings: ModelSettings::default(),
        }
    }

    pub fn property(mut self, name: &str, field_type: FieldType) -> Self {
        self.properties.push(PropertyDefinition {
            name: name.to_string(),
            field_type,
            id: false,
            index: false,
        });
        self
    }

    pub fn indexed_property(mut self, name: &str, field_type: FieldType) -> Self {
        self.properties.push(PropertyDefinition {
            name: name.to_string(),
            field_type,
            id: false,
            index: true,
        });
        self
    }

    pub fn id_property(mut self, name: &str, field_type: FieldType) -> Self {
        self.properties.push(PropertyDefinition {
            name: name.to_string(),
            field_type,
            id: true,
            index: false,
        });
        self
    }

    pub fn with_database(mut self, database: &str) -> Self {
        self.settings.database = Some(database.to_string());
        self
    }

    pub fn with_model_index(mut self, field: &str) -> Self {
        self.settings.model_index = Some(field.to_string());
        self
    }

    pub fn with_model_selector(mut self, selector: Map<String, Value>) -> Self {
        self.settings.model_selector = Some(selector);
        self
    }

    pub fn with_index(mut self, name: &str, keys: &[(&str, i32)], partitioned: bool) -> Self {
        self.settings.indexes.push(IndexDeclaration {
            name: name.to_string(),
            keys: keys.iter().map(|(k, d)| (k.to_string(), *d)).collect(),
            partitioned,
        });
        self
    }

    pub fn get_property(&self, name: &str) -> Option<&PropertyDefinition> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn id_name(&self) -> &str {
        self.properties
            .iter()
            .find(|p| p.id)
            .map(|p| p.name.as_str())
            .unwrap_or(DEFAULT_ID_FIELD)
    }

    /// Declared identifier type; undeclared ids are store-assigned strings
    pub fn id_type(&self) -> FieldType {
        self.get_property(self.id_name())
            .map(|p| p.field_type.clone())
            .unwrap_or(FieldType::Any)
    }

    pub fn date_fields(&self) -> Vec<String> {
        self.properties
            .iter()
            .filter(|p| p.field_type == FieldType::Date)
            .map(|p| p.name.clone())
            .collect()
    }

    /// Declared type at a dot-separated path, walking nested objects and
    /// array element shapes
    pub fn resolve_type(&self, path: &str) -> Option<&FieldType> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut current = &self.get_property(first)?.field_type;
        for segment in segments {
            current = current.lookup(segment)?;
        }
        Some(current)
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::invalid_schema("Model name must not be empty".to_string()));
        }

        let mut seen = HashSet::new();
        for prop in &self.properties {
            if !seen.insert(prop.name.as_str()) {
                return Err(Error::invalid_schema(format!(
                    "Property {} declared twice on {}",
                    prop.name, self.name
                )));
            }
        }

        if self.properties.iter().filter(|p| p.id).count() > 1 {
            return Err(Error::invalid_schema(format!(
                "Model {} declares more than one id property",
                self.name
            )));
        }

        for index in &self.settings.indexes {
            if index.keys.is_empty() {
                return Err(Error::invalid_schema(format!(
                    "Index {} on {} has no keys",
                    index.name, self.name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn customer() -> ModelDefinition {
        ModelDefinition::new("Customer")
            .property("name", FieldType::String)
            .property("address", FieldType::Object(vec![
                PropertyDefinition {
                    name: "city".to_string(),
                    field_type: FieldType::String,
                    id: false,
                    index: false,
                },
            ]))
            .property("friends", FieldType::Array(vec![FieldType::Object(vec![
                PropertyDefinition {
                    name: "age".to_string(),
                    field_type: FieldType::Number,
                    id: false,
                    index: false,
                },
            ])]))
            .property("birthday", FieldType::Date)
    }

    #[test]
    fn identifier_defaults_to_id() {
        let model = customer();
        assert_eq!(model.id_name(), "id");
        assert_eq!(model.id_type(), FieldType::Any);

        let numeric = ModelDefinition::new("Item").id_property("sku", FieldType::Number);
        assert_eq!(numeric.id_name(), "sku");
        assert!(numeric.id_type().is_numeric());
    }

    #[test]
    fn resolves_nested_and_array_paths() {
        let model = customer();
        assert_eq!(model.resolve_type("address.city"), Some(&FieldType::String));
        assert_eq!(model.resolve_type("friends.age"), Some(&FieldType::Number));
        assert_eq!(model.resolve_type("address.zip"), None);
        assert_eq!(model.resolve_type("missing"), None);
    }

    #[test]
    fn collects_date_fields() {
        assert_eq!(customer().date_fields(), vec!["birthday".to_string()]);
    }

    #[test]
    fn rejects_duplicate_ids() {
        let model = ModelDefinition::new("Bad")
            .id_property("a", FieldType::String)
            .id_property("b", FieldType::String);
        assert!(model.validate().is_err());
    }
}
