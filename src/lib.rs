pub mod core;
pub mod schema;
pub mod registry;
pub mod codec;
pub mod query;
pub mod reader;
pub mod index;
pub mod transport;
pub mod capability;

pub use crate::core::config::Config;
pub use crate::core::connector::{Connector, SavedRecord};
pub use crate::core::error::{Error, ErrorKind, Result};
pub use crate::core::types::{Document, FieldValue, Record, Revision};
pub use crate::query::filter::Filter;
pub use crate::schema::schema::{FieldType, ModelDefinition};
pub use crate::transport::Transport;

/*
┌────────────────────────────────────────────────────────────────────────────────────────────┐
│                            COUCHLINK STRUCT ARCHITECTURE                                   │
└────────────────────────────────────────────────────────────────────────────────────────────┘

┌─────────────────────────────────────── CORE LAYER ─────────────────────────────────────────┐
│                                                                                            │
│  ┌──────────────────────────────────────────────────────────────────────────────────────┐  │
│  │                           struct Connector<T: Transport>                             │  │
│  │  ┌────────────────────────────────────────────────────────────────────────────────┐  │  │
│  │  │ config: Arc<Config>                  // Datasource settings                    │  │  │
│  │  │ transport: Arc<T>                    // CouchDB request/response primitives    │  │  │
│  │  │ registry: ModelRegistry              // Model → binding cache                  │  │  │
│  │  │ include_hook: Option<Arc<dyn IncludeHook>> // Relation loading per page        │  │  │
│  │  └────────────────────────────────────────────────────────────────────────────────┘  │  │
│  └──────────────────────────────────────────────────────────────────────────────────────┘  │
│                                                                                            │
│  ┌──────────────────┐  ┌────────────────────┐  ┌──────────────────────────────────────┐    │
│  │ struct Config    │  │ struct Record      │  │ struct Error                         │    │
│  │ • url / database │  │ • fields: BTreeMap │  │ • kind: ErrorKind                    │    │
│  │ • model_index    │  │   <String,         │  │ • context: String                    │    │
│  │ • page_size      │  │    FieldValue>     │  │ • status: Option<u16>                │    │
│  │ • index prefixes │  └────────────────────┘  │ • failures: Vec<BulkOutcome>         │    │
│  └──────────────────┘                          └──────────────────────────────────────┘    │
│  ┌──────────────────┐  ┌────────────────────┐                                              │
│  │ type Document    │  │ enum FieldValue    │  ┌──────────────────────────────────────┐    │
│  │ • Map<String,    │  │ • Text / Integer   │  │ struct Revision(String)              │    │
│  │   Value>         │  │ • Number / Boolean │  │ struct WriteResult { id, rev }       │    │
│  │ • _id, _rev,     │  │ • Date(DateTime)   │  │ struct BulkOutcome { id, rev,        │    │
│  │   discriminator  │  │ • Array / Object   │  │        error, reason }               │    │
│  └──────────────────┘  │ • Null / Unset     │  └──────────────────────────────────────┘    │
│                        └────────────────────┘                                              │
└────────────────────────────────────────────────────────────────────────────────────────────┘

┌──────────────────────────────────── MODEL LAYER ───────────────────────────────────────────┐
│                                                                                            │
│  ┌──────────────────────────┐  ┌───────────────────────────┐  ┌─────────────────────────┐  │
│  │ struct ModelDefinition   │  │ struct ModelBinding       │  │ struct ModelRegistry    │  │
│  │ • name                   │  │ • model / database        │  │ • definitions: RwLock   │  │
│  │ • properties             │  │ • id_field / id_type      │  │ • bindings: RwLock      │  │
│  │ • settings (db, index,   │  │ • tagging: Discriminator  │  │ • resolve(model, force) │  │
│  │   selector, indexes)     │  │   | Selector              │  └─────────────────────────┘  │
│  └──────────────────────────┘  │ • date_fields             │                               │
│                                └───────────────────────────┘  ┌─────────────────────────┐  │
│  ┌──────────────────────────┐                                 │ struct DocumentCodec    │  │
│  │ struct ModelParser       │                                 │ • to_physical()         │  │
│  │ • LoopBack-style JSON    │                                 │ • from_physical()       │  │
│  └──────────────────────────┘                                 └─────────────────────────┘  │
└────────────────────────────────────────────────────────────────────────────────────────────┘

┌────────────────────────────────────── QUERY LAYER ─────────────────────────────────────────┐
│                                                                                            │
│  ┌─────────────────────┐  ┌───────────────────────┐  ┌───────────────────────────────┐     │
│  │ struct FilterParser │  │ struct Filter         │  │ struct SelectorCompiler       │     │
│  │ • JSON → Filter     │  │ • where_clause        │  │ • WhereClause → Mango         │     │
│  └─────────────────────┘  │ • order / limit / skip│  │ • id → _id, $elemMatch paths  │     │
│                           │ • include             │  │ • _id > null fallback anchor  │     │
│  ┌─────────────────────┐  └───────────────────────┘  └───────────────────────────────┘     │
│  │ struct SortCompiler │                                                                   │
│  │ • "a DESC" →        │  ┌───────────────────────┐  ┌───────────────────────────────┐     │
│  │   {a:string: desc}  │  │ struct FindQuery      │  │ struct Paginator              │     │
│  └─────────────────────┘  │ • selector, sort      │  │ • bookmark loop               │     │
│                           │ • skip, limit         │  │ • include hook per page       │     │
│                           │ • bookmark, use_index │  │ • numeric id resort           │     │
│                           └───────────────────────┘  └───────────────────────────────┘     │
└────────────────────────────────────────────────────────────────────────────────────────────┘

┌────────────────────────────────────── INDEX LAYER ─────────────────────────────────────────┐
│                                                                                            │
│  ┌──────────────────────────┐  ┌───────────────────────────┐  ┌─────────────────────────┐  │
│  │ struct IndexDescriptor   │  │ struct IndexManager       │  │ struct IndexDiff        │  │
│  │ • name / ddoc            │  │ • desired_indexes()       │  │ • to_add                │  │
│  │ • fields: Vec<SortField> │  │ • diff() / apply()        │  │ • to_drop               │  │
│  │ • partitioned            │  │ • is_actual()             │  └─────────────────────────┘  │
│  └──────────────────────────┘  └───────────────────────────┘                               │
└────────────────────────────────────────────────────────────────────────────────────────────┘

┌──────────────────────────────────── TRANSPORT LAYER ───────────────────────────────────────┐
│                                                                                            │
│  ┌──────────────────────────┐  ┌───────────────────────────┐  ┌─────────────────────────┐  │
│  │ trait Transport          │  │ struct MemoryTransport    │  │ struct SelectorMatcher  │  │
│  │ • get / head / insert    │  │ • databases: RwLock<Map>  │  │ • Mango evaluation      │  │
│  │ • destroy / bulk / find  │  │ • bookmark paging         │  │ • collate()             │  │
│  │ • index CRUD             │  │ • scripted find responses │  └─────────────────────────┘  │
│  │ • view / geo             │  └───────────────────────────┘                               │
│  └──────────────────────────┘                                                              │
│                                                                                            │
│  ┌──────────────────────────┐  ┌───────────────────────────┐                               │
│  │ struct ViewService       │  │ struct Discovery          │                               │
│  │ • view_docs / geo_docs   │  │ • databases as models     │                               │
│  └──────────────────────────┘  └───────────────────────────┘                               │
└────────────────────────────────────────────────────────────────────────────────────────────┘
*/
