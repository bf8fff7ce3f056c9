use std::sync::Arc;
use serde_json::{Map, Value};
use crate::core::config::Config;
use crate::core::error::{Error, Result};
use crate::core::types::Document;
use crate::schema::schema::{FieldType, ModelDefinition};

/// How documents of one model are told apart from the rest of the database
#[derive(Debug, Clone, PartialEq)]
pub enum Tagging {
    /// Documents carry `<field>: <model name>`
    Discriminator(String),
    /// A configured selector fragment identifies the model's documents
    Selector(Map<String, Value>),
}

/// Resolved, immutable per-model binding. A schema change produces a new
/// binding, never a mutated one.
#[derive(Debug, Clone)]
pub struct ModelBinding {
    pub model: String,
    pub database: String,
    pub id_field: String,
    pub id_type: FieldType,
    pub tagging: Tagging,
    pub date_fields: Vec<String>,
    pub definition: Arc<ModelDefinition>,
}

impl ModelBinding {
    pub fn from_definition(definition: Arc<ModelDefinition>, config: &Config) -> Result<Self> {
        definition.validate()?;

        let tagging = match &definition.settings.model_selector {
            Some(selector) if selector.is_empty() => {
                return Err(Error::invalid_schema(format!(
                    "modelSelector of {} must not be empty",
                    definition.name
                )));
            }
            Some(selector) => Tagging::Selector(selector.clone()),
            None => {
                let field = definition
                    .settings
                    .model_index
                    .clone()
                    .unwrap_or_else(|| config.model_index.clone());
                if field.is_empty() {
                    return Err(Error::invalid_schema(format!(
                        "Discriminator field of {} must not be empty",
                        definition.name
                    )));
                }
                Tagging::Discriminator(field)
            }
        };

        let database = definition
            .settings
            .database
            .clone()
            .unwrap_or_else(|| config.database.clone());

        Ok(ModelBinding {
            model: definition.name.clone(),
            database,
            id_field: definition.id_name().to_string(),
            id_type: definition.id_type(),
            tagging,
            date_fields: definition.date_fields(),
            definition,
        })
    }

    pub fn discriminator(&self) -> Option<&str> {
        match &self.tagging {
            Tagging::Discriminator(field) => Some(field),
            Tagging::Selector(_) => None,
        }
    }

    /// Selector matching every document of this model
    pub fn base_selector(&self) -> Map<String, Value> {
        match &self.tagging {
            Tagging::Discriminator(field) => {
                let mut selector = Map::new();
                selector.insert(field.clone(), Value::String(self.model.clone()));
                selector
            }
            Tagging::Selector(selector) => selector.clone(),
        }
    }

    /// Whether a fetched document belongs to this model. Only the
    /// discriminator and plain equality entries of a configured selector
    /// are compared; operator entries are left to the store.
    pub fn owns(&self, doc: &Document) -> bool {
        match &self.tagging {
            Tagging::Discriminator(field) => {
                doc.get(field).and_then(Value::as_str) == Some(self.model.as_str())
            }
            Tagging::Selector(selector) => selector
                .iter()
                .filter(|(key, expected)| !key.starts_with('$') && !expected.is_object())
                .all(|(key, expected)| doc.get(key) == Some(expected)),
        }
    }

    pub fn is_numeric_id(&self) -> bool {
        self.id_type.is_numeric()
    }

    pub fn discriminator_index_name(&self) -> String {
        format!("lb-index-{}", self.model)
    }

    pub fn discriminator_ddoc(&self) -> String {
        format!("lb-index-ddoc-{}", self.model)
    }

    /// `use_index` hint sent with every find on this model
    pub fn use_index(&self) -> Vec<String> {
        vec![self.discriminator_ddoc(), self.discriminator_index_name()]
    }
}
