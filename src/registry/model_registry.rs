use std::collections::HashMap;
use std::sync::Arc;
use parking_lot::RwLock;
use tracing::debug;
use crate::core::config::Config;
use crate::core::error::{Error, Result};
use crate::registry::binding::ModelBinding;
use crate::schema::schema::ModelDefinition;

/// Model definitions handed over by the ORM plus the memoized bindings
/// built from them.
///
/// Lookups take the read lock only. Two concurrent misses for the same model
/// may both build a binding; the later insert wins, which is harmless since
/// bindings are immutable.
pub struct ModelRegistry {
    config: Arc<Config>,
    definitions: RwLock<HashMap<String, Arc<ModelDefinition>>>,
    bindings: RwLock<HashMap<String, Arc<ModelBinding>>>,
}

impl ModelRegistry {
    pub fn new(config: Arc<Config>) -> Self {
        ModelRegistry {
            config,
            definitions: RwLock::new(HashMap::new()),
            bindings: RwLock::new(HashMap::new()),
        }
    }

    /// Register or replace a model definition. The cached binding is kept
    /// until the next forced resolve so a migration can still reach data
    /// written under the previous definition.
    pub fn define(&self, definition: ModelDefinition) -> Result<()> {
        definition.validate()?;
        debug!(target: "couchlink::registry", model = %definition.name, "Model defined");
        self.definitions
            .write()
            .insert(definition.name.clone(), Arc::new(definition));
        Ok(())
    }

    pub fn definition(&self, model: &str) -> Option<Arc<ModelDefinition>> {
        self.definitions.read().get(model).cloned()
    }

    pub fn models(&self) -> Vec<String> {
        let mut names: Vec<String> = self.definitions.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn resolve(&self, model: &str, force_refresh: bool) -> Result<Arc<ModelBinding>> {
        if !force_refresh {
            if let Some(binding) = self.bindings.read().get(model) {
                return Ok(binding.clone());
            }
        }

        let definition = self
            .definition(model)
            .ok_or_else(|| Error::invalid_schema(format!("Model {} is not defined", model)))?;
        let binding = Arc::new(ModelBinding::from_definition(definition, &self.config)?);

        debug!(
            target: "couchlink::registry",
            model,
            database = %binding.database,
            id_field = %binding.id_field,
            force_refresh,
            "Binding resolved"
        );
        self.bindings.write().insert(model.to_string(), binding.clone());
        Ok(binding)
    }

    /// Identifier field of the currently cached binding, if any
    pub fn cached_id_field(&self, model: &str) -> Option<String> {
        self.bindings.read().get(model).map(|b| b.id_field.clone())
    }

    pub fn invalidate(&self, model: &str) {
        self.bindings.write().remove(model);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;
    use crate::schema::schema::FieldType;

    fn registry() -> ModelRegistry {
        ModelRegistry::new(Arc::new(Config::with_url("http://localhost:5984")))
    }

    #[test]
    fn resolve_is_memoized_until_forced() {
        let registry = registry();
        registry.define(ModelDefinition::new("User")).unwrap();

        let first = registry.resolve("User", false).unwrap();
        let second = registry.resolve("User", false).unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let refreshed = registry.resolve("User", true).unwrap();
        assert!(!Arc::ptr_eq(&first, &refreshed));
    }

    #[test]
    fn cached_id_survives_redefinition_until_refresh() {
        let registry = registry();
        registry
            .define(ModelDefinition::new("Item").id_property("sku", FieldType::Number))
            .unwrap();
        registry.resolve("Item", false).unwrap();

        registry.define(ModelDefinition::new("Item")).unwrap();
        assert_eq!(registry.cached_id_field("Item").as_deref(), Some("sku"));
        assert_eq!(registry.resolve("Item", true).unwrap().id_field, "id");
    }

    #[test]
    fn unknown_model_is_a_schema_fault() {
        let err = registry().resolve("Ghost", false).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidSchema);
    }
}
