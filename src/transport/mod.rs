pub mod matcher;
pub mod memory;

use async_trait::async_trait;
use serde_json::Value;
use crate::core::error::Result;
use crate::core::types::{BulkOutcome, Document, Revision, WriteResult};
use crate::index::descriptor::IndexDescriptor;
use crate::query::types::{FindQuery, FindResponse};

/// Request/response primitives of a CouchDB-compatible store.
///
/// Store faults come back as `Error`s carrying the HTTP-style status:
/// 404 maps to `NotFound`, 409 to `Conflict`, an unreachable store to
/// `Connection`. Timeouts and retries belong to implementations.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Connectivity and authentication probe
    async fn ping(&self) -> Result<()>;

    async fn database_exists(&self, db: &str) -> Result<bool>;

    async fn list_databases(&self) -> Result<Vec<String>>;

    async fn get(&self, db: &str, id: &str) -> Result<Document>;

    /// Current revision of a document without fetching its body
    async fn head(&self, db: &str, id: &str) -> Result<Revision>;

    /// Insert, or update when the document carries the current `_rev`
    async fn insert(&self, db: &str, doc: Document) -> Result<WriteResult>;

    async fn destroy(&self, db: &str, id: &str, rev: &Revision) -> Result<WriteResult>;

    /// `_bulk_docs`: one outcome per submitted document, in order
    async fn bulk(&self, db: &str, docs: Vec<Document>) -> Result<Vec<BulkOutcome>>;

    async fn find(&self, db: &str, query: &FindQuery) -> Result<FindResponse>;

    /// Creates the index, replacing an index of the same ddoc and name
    async fn create_index(&self, db: &str, index: &IndexDescriptor) -> Result<()>;

    async fn list_indexes(&self, db: &str) -> Result<Vec<IndexDescriptor>>;

    async fn delete_index(&self, db: &str, ddoc: &str, name: &str) -> Result<()>;

    async fn view(&self, db: &str, ddoc: &str, view: &str, params: &Value) -> Result<Value>;

    async fn geo(&self, db: &str, ddoc: &str, index: &str, params: &Value) -> Result<Value>;
}
