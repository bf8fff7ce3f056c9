use std::sync::Arc;
use serde_json::Value;
use tracing::{debug, info};
use crate::capability::discovery::Discovery;
use crate::capability::views::ViewService;
use crate::codec::document::DocumentCodec;
use crate::core::config::Config;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{BulkOutcome, Document, FieldValue, Record, Revision, WriteResult};
use crate::index::lifecycle::IndexManager;
use crate::query::filter::{Filter, WhereClause};
use crate::query::selector::SelectorCompiler;
use crate::query::sort::SortCompiler;
use crate::query::types::FindQuery;
use crate::reader::paginator::{IncludeHook, Paginator};
use crate::registry::binding::ModelBinding;
use crate::registry::model_registry::ModelRegistry;
use crate::schema::schema::ModelDefinition;
use crate::transport::Transport;

/// A record as stored after a write, with the revision the store assigned
#[derive(Debug, Clone, PartialEq)]
pub struct SavedRecord {
    pub record: Record,
    pub rev: Revision,
    pub is_new_instance: bool,
}

/// Model persistence entry points on top of a CouchDB-compatible transport.
///
/// Writes that read first (merge updates, replaces, update-or-create) are not
/// atomic: a concurrent writer between the read and the write makes the
/// write fail with `Conflict`, which is returned to the caller as is.
pub struct Connector<T: Transport + ?Sized> {
    config: Arc<Config>,
    transport: Arc<T>,
    registry: ModelRegistry,
    include_hook: Option<Arc<dyn IncludeHook>>,
}

impl<T: Transport + ?Sized> Connector<T> {
    pub fn new(config: Config, transport: Arc<T>) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);
        Ok(Connector {
            registry: ModelRegistry::new(config.clone()),
            config,
            transport,
            include_hook: None,
        })
    }

    /// Builds the connector and, unless `lazy_connect` is set, probes the store
    pub async fn connect(config: Config, transport: Arc<T>) -> Result<Self> {
        let connector = Self::new(config, transport)?;
        if !connector.config.lazy_connect {
            connector.ping().await?;
        }
        info!(target: "couchlink::connector", database = %connector.config.database, "Connected");
        Ok(connector)
    }

    pub fn with_include_hook(mut self, hook: Arc<dyn IncludeHook>) -> Self {
        self.include_hook = Some(hook);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn define(&self, definition: ModelDefinition) -> Result<()> {
        self.registry.define(definition)
    }

    pub fn views(&self) -> ViewService<T> {
        ViewService::new(self.transport.clone(), &self.config.database)
    }

    pub fn discovery(&self) -> Discovery<T> {
        Discovery::new(self.transport.clone())
    }

    pub async fn ping(&self) -> Result<()> {
        debug!(target: "couchlink::connector", "ping");
        self.transport.ping().await.map_err(|e| match e.kind {
            ErrorKind::Connection => e,
            _ => Error::new(ErrorKind::Connection, format!("ping failed: {}", e)),
        })
    }

    // ---- reads ----

    pub async fn all(&self, model: &str, filter: &Filter) -> Result<Vec<Record>> {
        let binding = self.registry.resolve(model, false)?;
        let docs = self.fetch(&binding, filter).await?;
        docs.iter()
            .map(|doc| DocumentCodec::from_physical(doc, &binding))
            .collect()
    }

    /// Like `all` but returns the stored documents untouched
    pub async fn all_raw(&self, model: &str, filter: &Filter) -> Result<Vec<Document>> {
        let binding = self.registry.resolve(model, false)?;
        self.fetch(&binding, filter).await
    }

    /// `None` when no document of the model has this id
    pub async fn find_by_id(&self, model: &str, id: &FieldValue) -> Result<Option<Record>> {
        let binding = self.registry.resolve(model, false)?;
        let filter = Filter::new().with_where(Self::id_clause(&binding, id)?);
        let docs = self.fetch(&binding, &filter).await?;
        docs.first()
            .map(|doc| DocumentCodec::from_physical(doc, &binding))
            .transpose()
    }

    pub async fn count(&self, model: &str, where_clause: Option<&WhereClause>) -> Result<usize> {
        let binding = self.registry.resolve(model, false)?;
        let filter = Filter {
            where_clause: where_clause.cloned(),
            ..Filter::default()
        };
        Ok(self.fetch(&binding, &filter).await?.len())
    }

    pub async fn exists(&self, model: &str, id: &FieldValue) -> Result<bool> {
        let binding = self.registry.resolve(model, false)?;
        let clause = Self::id_clause(&binding, id)?;
        Ok(self.count(model, Some(&clause)).await? > 0)
    }

    /// Revision of a document, fetched without its body
    pub async fn get_current_revision(&self, model: &str, id: &FieldValue) -> Result<Revision> {
        let binding = self.registry.resolve(model, false)?;
        let id = Self::id_string(&binding, id)?;
        self.transport
            .head(&binding.database, &id)
            .await
            .map_err(|e| {
                if e.is_not_found() {
                    Error::not_found(format!("No instance with id {} found for {}", id, model))
                } else {
                    e
                }
            })
    }

    // ---- writes ----

    pub async fn create(&self, model: &str, record: &Record) -> Result<WriteResult> {
        let binding = self.registry.resolve(model, false)?;
        debug!(target: "couchlink::connector", model, "create");
        self.insert(&binding, record).await
    }

    /// Writes a record that carries its id (and `_rev` when updating) and
    /// returns it as stored
    pub async fn save(&self, model: &str, record: &Record) -> Result<SavedRecord> {
        let binding = self.registry.resolve(model, false)?;
        debug!(target: "couchlink::connector", model, "save");
        if Self::present_id(&binding, record).is_none() {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                format!("save on {} requires {}", model, binding.id_field),
            ));
        }
        let written = self.insert(&binding, record).await?;
        self.reload(&binding, written).await
    }

    /// Merges `patch` into the stored document. Fails with `NotFound` when
    /// the document does not exist or belongs to another model.
    pub async fn update_attributes(&self, model: &str, id: &FieldValue, patch: &Record) -> Result<SavedRecord> {
        let binding = self.registry.resolve(model, false)?;
        let id = Self::id_string(&binding, id)?;
        debug!(target: "couchlink::connector", model, %id, "update_attributes");

        let doc = self.transport.get(&binding.database, &id).await?;
        if !binding.owns(&doc) {
            return Err(Error::not_found(format!("No instance with id {} found for {}", id, model)));
        }
        let current_rev = doc.get("_rev").cloned();

        let mut record = DocumentCodec::from_physical(&doc, &binding)?;
        let mut patch = patch.clone();
        patch.remove(&binding.id_field);
        record.merge(&patch);

        let mut physical = DocumentCodec::to_physical(&record, &binding)?;
        if !physical.contains_key("_rev") {
            if let Some(rev) = current_rev {
                physical.insert("_rev".to_string(), rev);
            }
        }
        let written = self.transport.insert(&binding.database, physical).await?;
        record.remove("_rev");
        Ok(SavedRecord {
            record,
            rev: written.rev,
            is_new_instance: false,
        })
    }

    /// Merge-updates the record when its id exists, creates it otherwise
    pub async fn update_or_create(&self, model: &str, record: &Record) -> Result<SavedRecord> {
        let binding = self.registry.resolve(model, false)?;
        debug!(target: "couchlink::connector", model, "update_or_create");
        if let Some(id) = Self::present_id(&binding, record) {
            match self.update_attributes(model, &id, record).await {
                Err(e) if e.is_not_found() => {}
                other => return other,
            }
        }
        let written = self.insert(&binding, record).await?;
        let mut saved = self.reload(&binding, written).await?;
        saved.is_new_instance = true;
        Ok(saved)
    }

    /// Overwrites the record when its id exists, creates it otherwise
    pub async fn replace_or_create(&self, model: &str, record: &Record) -> Result<SavedRecord> {
        let binding = self.registry.resolve(model, false)?;
        debug!(target: "couchlink::connector", model, "replace_or_create");
        if let Some(id) = Self::present_id(&binding, record) {
            if self.exists(model, &id).await? {
                return self.replace(&binding, &id, record).await;
            }
        }
        let written = self.insert(&binding, record).await?;
        let mut saved = self.reload(&binding, written).await?;
        saved.is_new_instance = true;
        Ok(saved)
    }

    /// Overwrites an existing record; properties missing from `record` are removed
    pub async fn replace_by_id(&self, model: &str, id: &FieldValue, record: &Record) -> Result<SavedRecord> {
        let binding = self.registry.resolve(model, false)?;
        debug!(target: "couchlink::connector", model, "replace_by_id");
        self.replace(&binding, id, record).await
    }

    /// Merges `patch` into every matching document in one bulk request and
    /// returns the number of updated documents
    pub async fn update_all(&self, model: &str, where_clause: Option<&WhereClause>, patch: &Record) -> Result<usize> {
        let binding = self.registry.resolve(model, false)?;
        let filter = Filter {
            where_clause: where_clause.cloned(),
            ..Filter::default()
        };
        let docs = self.fetch(&binding, &filter).await?;
        debug!(target: "couchlink::connector", model, matched = docs.len(), "update_all");
        if docs.is_empty() {
            return Ok(0);
        }

        let mut changes = DocumentCodec::to_physical(patch, &binding)?;
        changes.remove("_id");
        changes.remove("_rev");

        let docs: Vec<Document> = docs
            .into_iter()
            .map(|mut doc| {
                for (k, v) in &changes {
                    doc.insert(k.clone(), v.clone());
                }
                doc
            })
            .collect();
        let outcomes = self.bulk_checked(&binding, docs).await?;
        Ok(outcomes.len())
    }

    /// Writes all records in one bulk request. Any failed entry turns the
    /// call into a `PartialBatchFailure` listing the failed outcomes.
    pub async fn bulk_replace(&self, model: &str, records: &[Record]) -> Result<Vec<BulkOutcome>> {
        let binding = self.registry.resolve(model, false)?;
        debug!(target: "couchlink::connector", model, count = records.len(), "bulk_replace");
        let docs = records
            .iter()
            .map(|r| DocumentCodec::to_physical(r, &binding))
            .collect::<Result<Vec<_>>>()?;
        self.bulk_checked(&binding, docs).await
    }

    /// Deletes the single document with this id; returns the deleted count
    pub async fn destroy(&self, model: &str, id: &FieldValue) -> Result<usize> {
        let binding = self.registry.resolve(model, false)?;
        debug!(target: "couchlink::connector", model, "destroy");
        let filter = Filter::new().with_where(Self::id_clause(&binding, id)?);
        let docs = self.fetch(&binding, &filter).await?;

        match docs.as_slice() {
            [] => Err(Error::not_found("could not find matching item in database!".to_string())),
            [doc] => {
                let (doc_id, rev) = Self::id_and_rev(doc)?;
                self.transport.destroy(&binding.database, &doc_id, &rev).await?;
                Ok(1)
            }
            _ => Err(Error::new(
                ErrorKind::InvalidArgument,
                "instance method destroy tries to delete more than one item!".to_string(),
            )),
        }
    }

    /// Deletes every matching document in one bulk request
    pub async fn destroy_all(&self, model: &str, where_clause: Option<&WhereClause>) -> Result<usize> {
        let binding = self.registry.resolve(model, false)?;
        self.purge(&binding, where_clause).await
    }

    // ---- migration ----

    /// Reconciles the indexes of each model with its current definition.
    /// An empty list means every defined model.
    pub async fn autoupdate(&self, models: &[&str]) -> Result<()> {
        for model in self.model_list(models) {
            let binding = self.registry.resolve(&model, true)?;
            let diff = IndexManager::new(&self.config)
                .apply(&*self.transport, &binding)
                .await?;
            info!(
                target: "couchlink::migrate",
                model = %model,
                added = diff.to_add.len(),
                dropped = diff.to_drop.len(),
                "autoupdate done"
            );
        }
        Ok(())
    }

    /// Deletes the data of every model that was already migrated, then runs
    /// `autoupdate`. Data is located through the cached binding so records
    /// written under a previous definition are removed too.
    pub async fn automigrate(&self, models: &[&str]) -> Result<()> {
        let models = self.model_list(models);
        let mut existing = Vec::new();
        for model in &models {
            if self.is_actual(&[model.as_str()]).await? {
                existing.push(model.clone());
            }
        }
        for model in &existing {
            let binding = self.registry.resolve(model, false)?;
            info!(
                target: "couchlink::migrate",
                model = %model,
                id_field = ?self.registry.cached_id_field(model),
                "Purging model data"
            );
            self.purge(&binding, None).await?;
        }
        let names: Vec<&str> = models.iter().map(String::as_str).collect();
        self.autoupdate(&names).await
    }

    /// True when every listed model has its discriminator index installed
    pub async fn is_actual(&self, models: &[&str]) -> Result<bool> {
        let manager = IndexManager::new(&self.config);
        for model in self.model_list(models) {
            let binding = self.registry.resolve(&model, false)?;
            if !manager.is_actual(&*self.transport, &binding).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    // ---- internals ----

    fn model_list(&self, models: &[&str]) -> Vec<String> {
        if models.is_empty() {
            self.registry.models()
        } else {
            models.iter().map(|m| m.to_string()).collect()
        }
    }

    fn build_query(&self, binding: &ModelBinding, filter: &Filter) -> FindQuery {
        let compiled = SelectorCompiler::new(binding).compile(filter.where_clause.as_ref());
        let mut query = FindQuery::new(compiled.selector);
        query.use_index = Some(binding.use_index());
        query.skip = filter.skip.filter(|s| *s > 0);
        query.limit = Some(filter.limit.filter(|l| *l > 0).unwrap_or(self.config.page_size));
        if filter.order.is_some() {
            query.sort = SortCompiler::new(binding).compile(filter.order.as_ref());
        }
        query
    }

    async fn fetch(&self, binding: &ModelBinding, filter: &Filter) -> Result<Vec<Document>> {
        let query = self.build_query(binding, filter);
        debug!(
            target: "couchlink::connector",
            model = %binding.model,
            query = %serde_json::to_string(&query)?,
            "find"
        );
        Paginator::new(&*self.transport, self.config.page_size)
            .with_hook(self.include_hook.as_deref())
            .fetch_all(binding, query, filter.include.as_ref(), filter.limit.filter(|l| *l > 0))
            .await
    }

    async fn insert(&self, binding: &ModelBinding, record: &Record) -> Result<WriteResult> {
        let doc = DocumentCodec::to_physical(record, binding)?;
        self.transport
            .insert(&binding.database, doc)
            .await
            .map_err(|mut e| {
                if e.is_conflict() {
                    e.context.push_str(" (duplicate?)");
                }
                e
            })
    }

    async fn reload(&self, binding: &ModelBinding, written: WriteResult) -> Result<SavedRecord> {
        let doc = self.transport.get(&binding.database, &written.id).await?;
        Ok(SavedRecord {
            record: DocumentCodec::from_physical(&doc, binding)?,
            is_new_instance: written.rev.generation() == 1,
            rev: written.rev,
        })
    }

    async fn replace(&self, binding: &ModelBinding, id: &FieldValue, record: &Record) -> Result<SavedRecord> {
        let mut record = record.clone();
        record.insert(binding.id_field.clone(), id.clone());
        if !record.contains("_rev") {
            let rev = self.get_current_revision(&binding.model, id).await?;
            record.insert("_rev".to_string(), FieldValue::Text(rev.0));
        }
        let written = self.insert(binding, &record).await?;
        self.reload(binding, written).await
    }

    async fn purge(&self, binding: &ModelBinding, where_clause: Option<&WhereClause>) -> Result<usize> {
        let filter = Filter {
            where_clause: where_clause.cloned(),
            ..Filter::default()
        };
        let docs = self.fetch(binding, &filter).await?;
        debug!(target: "couchlink::connector", model = %binding.model, matched = docs.len(), "destroy_all");
        if docs.is_empty() {
            return Ok(0);
        }

        let stubs = docs
            .iter()
            .map(|doc| {
                let (id, rev) = Self::id_and_rev(doc)?;
                let mut stub = Document::new();
                stub.insert("_id".to_string(), Value::String(id));
                stub.insert("_rev".to_string(), Value::String(rev.0));
                stub.insert("_deleted".to_string(), Value::Bool(true));
                Ok(stub)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(self.bulk_checked(binding, stubs).await?.len())
    }

    async fn bulk_checked(&self, binding: &ModelBinding, docs: Vec<Document>) -> Result<Vec<BulkOutcome>> {
        let total = docs.len();
        let outcomes = self.transport.bulk(&binding.database, docs).await?;
        let failures: Vec<BulkOutcome> = outcomes.iter().filter(|o| o.is_error()).cloned().collect();
        if !failures.is_empty() {
            return Err(Error::partial_batch(failures, total));
        }
        Ok(outcomes)
    }

    fn id_string(binding: &ModelBinding, id: &FieldValue) -> Result<String> {
        id.to_id_string().ok_or_else(|| {
            Error::new(
                ErrorKind::InvalidArgument,
                format!("Invalid {} for {}: {:?}", binding.id_field, binding.model, id),
            )
        })
    }

    fn id_clause(binding: &ModelBinding, id: &FieldValue) -> Result<WhereClause> {
        let value = match id.to_json() {
            Some(Value::Null) | None => {
                return Err(Error::new(
                    ErrorKind::InvalidArgument,
                    format!("Missing {} for {}", binding.id_field, binding.model),
                ));
            }
            Some(value) => value,
        };
        Ok(WhereClause::eq(&binding.id_field, value))
    }

    /// Identifier of a record, unless unset or null
    fn present_id(binding: &ModelBinding, record: &Record) -> Option<FieldValue> {
        match record.get(&binding.id_field) {
            None | Some(FieldValue::Unset) | Some(FieldValue::Null) => None,
            Some(id) => Some(id.clone()),
        }
    }

    fn id_and_rev(doc: &Document) -> Result<(String, Revision)> {
        let id = doc
            .get("_id")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::malformed("Document returned without _id".to_string()))?;
        let rev = doc
            .get("_rev")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::malformed(format!("Document {} returned without _rev", id)))?;
        Ok((id.to_string(), Revision::new(rev)))
    }
}
