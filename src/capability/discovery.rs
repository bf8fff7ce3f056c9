use std::sync::Arc;
use serde_json::{json, Map, Value};
use crate::core::error::{Error, Result};
use crate::transport::Transport;

/// Model discovery: every database is offered as a model with an injected
/// id and no declared properties.
pub struct Discovery<T: Transport + ?Sized> {
    transport: Arc<T>,
}

impl<T: Transport + ?Sized> Discovery<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Discovery { transport }
    }

    pub async fn discover_model_definitions(&self) -> Result<Vec<String>> {
        self.transport.list_databases().await
    }

    /// Adds the schema skeleton of `db` to `visited` unless it is already
    /// there and returns the collected schemas
    pub async fn discover_schemas(&self, db: &str, visited: &mut Map<String, Value>) -> Result<Value> {
        if !self.transport.database_exists(db).await? {
            return Err(Error::not_found(format!("Database {} does not exist", db)));
        }
        if !visited.contains_key(db) {
            visited.insert(db.to_string(), Self::schema_skeleton(db));
        }
        Ok(Value::Object(visited.clone()))
    }

    pub fn schema_skeleton(db: &str) -> Value {
        json!({
            "name": db,
            "options": {"idInjection": true, "dbName": db},
            "properties": {},
        })
    }
}
