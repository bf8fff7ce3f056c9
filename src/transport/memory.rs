//! In-memory store with CouchDB semantics, used by tests and demos.
//!
//! Revisions, conflicts, `_bulk_docs` outcomes, `_find` bookmarks and index
//! bookkeeping behave like the real server closely enough for the connector
//! to be exercised end to end. Faults and raw `_find` answers can be injected.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};
use uuid::Uuid;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{BulkOutcome, Document, Revision, WriteResult};
use crate::index::descriptor::{strip_design_prefix, IndexDescriptor};
use crate::query::types::{FindQuery, FindResponse, SortOrder};
use crate::transport::matcher::{collate, lookup, SelectorMatcher};
use crate::transport::Transport;

/// Native `_find` limit when the request carries none
pub const DEFAULT_FIND_LIMIT: usize = 25;

const BOOKMARK_PREFIX: &str = "bm-";

#[derive(Debug, Clone)]
struct StoredDoc {
    rev: Revision,
    body: Document,
    deleted: bool,
}

#[derive(Debug, Default)]
struct MemoryDatabase {
    docs: BTreeMap<String, StoredDoc>,
    indexes: Vec<IndexDescriptor>,
}

impl MemoryDatabase {
    fn live_docs(&self) -> impl Iterator<Item = (&String, &StoredDoc)> {
        self.docs.iter().filter(|(_, d)| !d.deleted)
    }

    fn write(&mut self, mut doc: Document) -> Result<WriteResult> {
        let id = match doc.remove("_id") {
            Some(Value::String(id)) => id,
            Some(other) => {
                return Err(Error::new(ErrorKind::InvalidArgument, format!("Document id must be a string, got {}", other))
                    .with_status(400));
            }
            None => Uuid::new_v4().simple().to_string(),
        };
        let submitted = match doc.remove("_rev") {
            Some(Value::String(rev)) => Some(Revision::new(rev)),
            _ => None,
        };
        let deleting = matches!(doc.remove("_deleted"), Some(Value::Bool(true)));

        let generation = match self.docs.get(&id) {
            Some(current) if !current.deleted => {
                if submitted.as_ref() != Some(&current.rev) {
                    return Err(Error::conflict("Document update conflict.".to_string()));
                }
                current.rev.generation() + 1
            }
            Some(current) => current.rev.generation() + 1,
            None if deleting => return Err(Error::not_found("missing".to_string())),
            None => 1,
        };

        let rev = new_revision(generation);
        self.docs.insert(
            id.clone(),
            StoredDoc {
                rev: rev.clone(),
                body: if deleting { Document::new() } else { doc },
                deleted: deleting,
            },
        );
        Ok(WriteResult { id, rev })
    }
}

fn new_revision(generation: u64) -> Revision {
    Revision::new(format!("{}-{}", generation, Uuid::new_v4().simple()))
}

fn full_document(id: &str, stored: &StoredDoc) -> Document {
    let mut doc = Document::new();
    doc.insert("_id".to_string(), Value::String(id.to_string()));
    doc.insert("_rev".to_string(), Value::String(stored.rev.0.clone()));
    for (k, v) in &stored.body {
        doc.insert(k.clone(), v.clone());
    }
    doc
}

/// CouchDB-compatible store kept in process memory
#[derive(Default)]
pub struct MemoryTransport {
    databases: RwLock<HashMap<String, MemoryDatabase>>,
    views: RwLock<HashMap<String, Value>>,
    scripted_finds: Mutex<VecDeque<FindResponse>>,
    find_calls: AtomicUsize,
    write_calls: AtomicUsize,
    offline: AtomicBool,
}

impl MemoryTransport {
    pub fn new() -> Self {
        MemoryTransport::default()
    }

    /// Store that already holds the given databases
    pub fn with_databases(names: &[&str]) -> Self {
        let transport = MemoryTransport::new();
        for name in names {
            transport.create_database(name);
        }
        transport
    }

    pub fn create_database(&self, name: &str) {
        self.databases.write().entry(name.to_string()).or_default();
    }

    /// Makes every request fail as if the server were unreachable
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Queues raw `_find` answers, returned in order before real evaluation resumes
    pub fn script_find_responses(&self, responses: Vec<FindResponse>) {
        self.scripted_finds.lock().extend(responses);
    }

    pub fn find_calls(&self) -> usize {
        self.find_calls.load(Ordering::SeqCst)
    }

    pub fn reset_find_calls(&self) {
        self.find_calls.store(0, Ordering::SeqCst);
    }

    /// Insert, delete and bulk requests received, failed ones included
    pub fn write_calls(&self) -> usize {
        self.write_calls.load(Ordering::SeqCst)
    }

    pub fn reset_write_calls(&self) {
        self.write_calls.store(0, Ordering::SeqCst);
    }

    /// Live documents in a database
    pub fn document_count(&self, db: &str) -> usize {
        self.databases
            .read()
            .get(db)
            .map(|d| d.live_docs().count())
            .unwrap_or(0)
    }

    pub fn register_view(&self, db: &str, ddoc: &str, view: &str, response: Value) {
        self.views
            .write()
            .insert(view_key("view", db, ddoc, view), response);
    }

    pub fn register_geo(&self, db: &str, ddoc: &str, index: &str, response: Value) {
        self.views
            .write()
            .insert(view_key("geo", db, ddoc, index), response);
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::new(ErrorKind::Connection, "connect ECONNREFUSED".to_string()));
        }
        Ok(())
    }

    fn with_db<R>(&self, db: &str, f: impl FnOnce(&MemoryDatabase) -> Result<R>) -> Result<R> {
        self.check_online()?;
        let databases = self.databases.read();
        let database = databases
            .get(db)
            .ok_or_else(|| Error::not_found("Database does not exist.".to_string()))?;
        f(database)
    }

    fn with_db_mut<R>(&self, db: &str, f: impl FnOnce(&mut MemoryDatabase) -> Result<R>) -> Result<R> {
        self.check_online()?;
        let mut databases = self.databases.write();
        let database = databases
            .get_mut(db)
            .ok_or_else(|| Error::not_found("Database does not exist.".to_string()))?;
        f(database)
    }

    fn evaluate_find(database: &MemoryDatabase, query: &FindQuery) -> Result<FindResponse> {
        let mut matched = Vec::new();
        for (id, stored) in database.live_docs() {
            let doc = full_document(id, stored);
            if SelectorMatcher::matches(&doc, &query.selector)? {
                matched.push(doc);
            }
        }

        matched.sort_by(|a, b| {
            for sort in &query.sort {
                let left = doc_field(a, sort.base_field()).unwrap_or(&Value::Null);
                let right = doc_field(b, sort.base_field()).unwrap_or(&Value::Null);
                let ord = collate(left, right);
                let ord = if sort.order == SortOrder::Desc { ord.reverse() } else { ord };
                if ord != std::cmp::Ordering::Equal {
                    return ord;
                }
            }
            collate(
                doc_field(a, "_id").unwrap_or(&Value::Null),
                doc_field(b, "_id").unwrap_or(&Value::Null),
            )
        });

        let start = match &query.bookmark {
            Some(bookmark) => parse_bookmark(bookmark)?,
            None => query.skip.unwrap_or(0),
        };
        let limit = query.limit.unwrap_or(DEFAULT_FIND_LIMIT);
        let page: Vec<Document> = matched
            .into_iter()
            .skip(start)
            .take(limit)
            .map(|doc| project(doc, query.fields.as_deref()))
            .collect();

        let warning = query.use_index.as_ref().and_then(|hint| {
            let ddoc = hint.first().map(|d| strip_design_prefix(d))?;
            let exists = database
                .indexes
                .iter()
                .any(|i| i.ddoc == ddoc && hint.get(1).map(|n| *n == i.name).unwrap_or(true));
            (!exists).then(|| format!("_design/{} was not used because it does not exist", ddoc))
        });

        Ok(FindResponse {
            bookmark: Some(format!("{}{}", BOOKMARK_PREFIX, start + page.len())),
            docs: Some(page),
            warning,
        })
    }
}

fn doc_field<'d>(doc: &'d Document, path: &str) -> Option<&'d Value> {
    match path.split_once('.') {
        Some((head, rest)) => lookup(doc.get(head), rest),
        None => doc.get(path),
    }
}

fn view_key(kind: &str, db: &str, ddoc: &str, name: &str) -> String {
    format!("{}:{}/{}/{}", kind, db, strip_design_prefix(ddoc), name)
}

fn parse_bookmark(bookmark: &str) -> Result<usize> {
    bookmark
        .strip_prefix(BOOKMARK_PREFIX)
        .and_then(|n| n.parse().ok())
        .ok_or_else(|| {
            Error::new(ErrorKind::InvalidArgument, format!("Invalid bookmark value: {}", bookmark)).with_status(400)
        })
}

fn project(doc: Document, fields: Option<&[String]>) -> Document {
    match fields {
        None => doc,
        Some(fields) => doc.into_iter().filter(|(k, _)| fields.contains(k)).collect(),
    }
}

fn bulk_error(id: Option<String>, err: &Error) -> BulkOutcome {
    let error = match err.kind {
        ErrorKind::Conflict => "conflict",
        ErrorKind::NotFound => "not_found",
        _ => "bad_request",
    };
    BulkOutcome::failed(id, error, &err.context)
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn ping(&self) -> Result<()> {
        self.check_online()
    }

    async fn database_exists(&self, db: &str) -> Result<bool> {
        self.check_online()?;
        Ok(self.databases.read().contains_key(db))
    }

    async fn list_databases(&self) -> Result<Vec<String>> {
        self.check_online()?;
        let mut names: Vec<String> = self.databases.read().keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn get(&self, db: &str, id: &str) -> Result<Document> {
        self.with_db(db, |database| match database.docs.get(id) {
            Some(stored) if !stored.deleted => Ok(full_document(id, stored)),
            Some(_) => Err(Error::not_found("deleted".to_string())),
            None => Err(Error::not_found("missing".to_string())),
        })
    }

    async fn head(&self, db: &str, id: &str) -> Result<Revision> {
        self.with_db(db, |database| match database.docs.get(id) {
            Some(stored) if !stored.deleted => Ok(stored.rev.clone()),
            _ => Err(Error::not_found("missing".to_string())),
        })
    }

    async fn insert(&self, db: &str, doc: Document) -> Result<WriteResult> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        self.with_db_mut(db, |database| database.write(doc))
    }

    async fn destroy(&self, db: &str, id: &str, rev: &Revision) -> Result<WriteResult> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        let mut stub = Map::new();
        stub.insert("_id".to_string(), Value::String(id.to_string()));
        stub.insert("_rev".to_string(), Value::String(rev.0.clone()));
        stub.insert("_deleted".to_string(), Value::Bool(true));
        self.with_db_mut(db, |database| {
            let live = database.docs.get(id).map(|stored| !stored.deleted).unwrap_or(false);
            if !live {
                return Err(Error::not_found("missing".to_string()));
            }
            database.write(stub)
        })
    }

    async fn bulk(&self, db: &str, docs: Vec<Document>) -> Result<Vec<BulkOutcome>> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        self.with_db_mut(db, |database| {
            Ok(docs
                .into_iter()
                .map(|doc| {
                    let id = doc.get("_id").and_then(Value::as_str).map(String::from);
                    match database.write(doc) {
                        Ok(result) => BulkOutcome::ok(result.id, &result.rev),
                        Err(err) => bulk_error(id, &err),
                    }
                })
                .collect())
        })
    }

    async fn find(&self, db: &str, query: &FindQuery) -> Result<FindResponse> {
        self.find_calls.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;
        if let Some(scripted) = self.scripted_finds.lock().pop_front() {
            return Ok(scripted);
        }
        self.with_db(db, |database| Self::evaluate_find(database, query))
    }

    async fn create_index(&self, db: &str, index: &IndexDescriptor) -> Result<()> {
        let index = IndexDescriptor::new(&index.name, &index.ddoc, index.fields.clone(), index.partitioned);
        self.with_db_mut(db, |database| {
            database
                .indexes
                .retain(|i| !(i.ddoc == index.ddoc && i.name == index.name));
            database.indexes.push(index);
            Ok(())
        })
    }

    async fn list_indexes(&self, db: &str) -> Result<Vec<IndexDescriptor>> {
        self.with_db(db, |database| Ok(database.indexes.clone()))
    }

    async fn delete_index(&self, db: &str, ddoc: &str, name: &str) -> Result<()> {
        let ddoc = strip_design_prefix(ddoc);
        self.with_db_mut(db, |database| {
            let before = database.indexes.len();
            database.indexes.retain(|i| !(i.ddoc == ddoc && i.name == name));
            if database.indexes.len() == before {
                return Err(Error::not_found("Index not found".to_string()));
            }
            Ok(())
        })
    }

    async fn view(&self, db: &str, ddoc: &str, view: &str, _params: &Value) -> Result<Value> {
        self.check_online()?;
        self.views
            .read()
            .get(&view_key("view", db, ddoc, view))
            .cloned()
            .ok_or_else(|| Error::not_found("missing_named_view".to_string()))
    }

    async fn geo(&self, db: &str, ddoc: &str, index: &str, _params: &Value) -> Result<Value> {
        self.check_online()?;
        self.views
            .read()
            .get(&view_key("geo", db, ddoc, index))
            .cloned()
            .ok_or_else(|| Error::not_found("missing_named_index".to_string()))
    }
}
