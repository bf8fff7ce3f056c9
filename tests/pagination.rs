use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use async_trait::async_trait;
use serde_json::{json, Value};
use couchlink::core::config::Config;
use couchlink::core::connector::Connector;
use couchlink::core::error::{ErrorKind, Result};
use couchlink::core::types::{Document, FieldValue, Record};
use couchlink::query::filter::Filter;
use couchlink::query::types::FindResponse;
use couchlink::reader::paginator::IncludeHook;
use couchlink::registry::binding::ModelBinding;
use couchlink::schema::schema::{FieldType, ModelDefinition};
use couchlink::transport::memory::MemoryTransport;

fn setup() -> (Arc<MemoryTransport>, Connector<MemoryTransport>) {
    let store = Arc::new(MemoryTransport::with_databases(&["shop"]));
    let connector = Connector::new(Config::with_url("http://localhost:5984/shop"), store.clone()).unwrap();
    connector
        .define(
            ModelDefinition::new("Counter")
                .id_property("id", FieldType::Number)
                .property("value", FieldType::Number),
        )
        .unwrap();
    connector
        .define(ModelDefinition::new("Note").property("text", FieldType::String))
        .unwrap();
    (store, connector)
}

async fn seed_counters(connector: &Connector<MemoryTransport>, count: i64) {
    let records: Vec<Record> = (1..=count)
        .map(|i| Record::new().with("id", i).with("value", i * 10))
        .collect();
    connector.bulk_replace("Counter", &records).await.unwrap();
}

fn note(id: &str) -> Document {
    json!({"_id": id, "_rev": "1-x", "loopback__model__name": "Note", "text": id})
        .as_object()
        .cloned()
        .unwrap()
}

#[tokio::test]
async fn small_result_sets_take_one_request() {
    let (store, connector) = setup();
    seed_counters(&connector, 5).await;

    store.reset_find_calls();
    let all = connector.all("Counter", &Filter::new()).await.unwrap();
    assert_eq!(all.len(), 5);
    assert_eq!(store.find_calls(), 1);

    seed_counters_from(&connector, 6, 199).await;
    store.reset_find_calls();
    assert_eq!(connector.count("Counter", None).await.unwrap(), 199);
    assert_eq!(store.find_calls(), 1);
}

async fn seed_counters_from(connector: &Connector<MemoryTransport>, from: i64, to: i64) {
    let records: Vec<Record> = (from..=to).map(|i| Record::new().with("id", i)).collect();
    connector.bulk_replace("Counter", &records).await.unwrap();
}

#[tokio::test]
async fn large_result_sets_follow_bookmarks_and_resort_numeric_ids() {
    let (store, connector) = setup();
    seed_counters(&connector, 201).await;

    store.reset_find_calls();
    let records = connector
        .all("Counter", &Filter::new().with_order("id DESC"))
        .await
        .unwrap();
    assert_eq!(records.len(), 201);
    // full page, one-document page, then an empty page repeating the bookmark
    assert_eq!(store.find_calls(), 3);

    let ids: Vec<i64> = records.iter().filter_map(|r| r.get("id").and_then(FieldValue::as_i64)).collect();
    assert_eq!(ids.len(), 201);
    assert_eq!(ids.first(), Some(&201));
    assert_eq!(ids.last(), Some(&1));
    assert!(ids.windows(2).all(|w| w[0] > w[1]));
}

#[tokio::test]
async fn exact_page_size_needs_a_confirming_request() {
    let (store, connector) = setup();
    seed_counters(&connector, 200).await;

    store.reset_find_calls();
    assert_eq!(connector.count("Counter", None).await.unwrap(), 200);
    assert_eq!(store.find_calls(), 2);
}

#[tokio::test]
async fn repeated_bookmark_stops_paging() {
    let (store, connector) = setup();
    let page: Vec<Document> = (0..200).map(|i| note(&format!("n{:03}", i))).collect();
    store.script_find_responses(vec![
        FindResponse {
            docs: Some(page.clone()),
            bookmark: Some("stuck".to_string()),
            warning: None,
        },
        FindResponse {
            docs: Some(page),
            bookmark: Some("stuck".to_string()),
            warning: None,
        },
    ]);

    let docs = connector.all_raw("Note", &Filter::new()).await.unwrap();
    assert_eq!(docs.len(), 400);
    assert_eq!(store.find_calls(), 2);
}

#[tokio::test]
async fn missing_bookmark_ends_paging_with_accumulated_docs() {
    let (store, connector) = setup();
    let page: Vec<Document> = (0..200).map(|i| note(&format!("n{:03}", i))).collect();
    store.script_find_responses(vec![FindResponse {
        docs: Some(page),
        bookmark: None,
        warning: None,
    }]);

    let docs = connector.all_raw("Note", &Filter::new()).await.unwrap();
    assert_eq!(docs.len(), 200);
    assert_eq!(store.find_calls(), 1);
}

#[tokio::test]
async fn response_without_docs_is_malformed() {
    let (store, connector) = setup();
    store.script_find_responses(vec![FindResponse::default()]);

    let err = connector.all("Note", &Filter::new()).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::MalformedResponse);
    assert!(err.context.starts_with("No documents returned for query on Note"));
}

#[tokio::test]
async fn caller_limit_caps_the_result() {
    let (store, connector) = setup();
    seed_counters(&connector, 250).await;

    store.reset_find_calls();
    let records = connector.all("Counter", &Filter::new().with_limit(220)).await.unwrap();
    assert_eq!(records.len(), 220);
    assert_eq!(store.find_calls(), 1);
}

struct OwnerHook {
    calls: AtomicUsize,
}

#[async_trait]
impl IncludeHook for OwnerHook {
    async fn process(&self, _binding: &ModelBinding, docs: Vec<Document>, include: &Value) -> Result<Vec<Document>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(docs
            .into_iter()
            .map(|mut doc| {
                doc.insert("owner".to_string(), include.clone());
                doc
            })
            .collect())
    }
}

#[tokio::test]
async fn include_hook_runs_once_per_page() {
    let store = Arc::new(MemoryTransport::with_databases(&["shop"]));
    let hook = Arc::new(OwnerHook {
        calls: AtomicUsize::new(0),
    });
    let connector = Connector::new(Config::with_url("http://localhost:5984/shop"), store.clone())
        .unwrap()
        .with_include_hook(hook.clone());
    connector
        .define(ModelDefinition::new("Note").property("text", FieldType::String))
        .unwrap();
    for i in 0..3 {
        connector
            .create("Note", &Record::new().with("text", format!("t{}", i)))
            .await
            .unwrap();
    }

    let without = connector.all("Note", &Filter::new()).await.unwrap();
    assert!(without.iter().all(|r| r.get("owner").is_none()));
    assert_eq!(hook.calls.load(Ordering::SeqCst), 0);

    let filter = Filter {
        include: Some(json!("author")),
        ..Filter::default()
    };
    let with = connector.all("Note", &filter).await.unwrap();
    assert_eq!(with.len(), 3);
    assert!(with.iter().all(|r| r.get("owner") == Some(&FieldValue::from("author"))));
    assert_eq!(hook.calls.load(Ordering::SeqCst), 1);
}
