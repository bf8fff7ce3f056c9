use std::sync::Arc;
use serde_json::json;
use couchlink::core::config::Config;
use couchlink::core::connector::Connector;
use couchlink::core::error::ErrorKind;
use couchlink::core::types::{FieldValue, Record, Revision};
use couchlink::query::filter::{Filter, WhereClause};
use couchlink::query::parser::FilterParser;
use couchlink::query::types::FindResponse;
use couchlink::schema::schema::{FieldType, ModelDefinition};
use couchlink::transport::memory::MemoryTransport;
use couchlink::transport::Transport;

fn setup() -> (Arc<MemoryTransport>, Connector<MemoryTransport>) {
    let store = Arc::new(MemoryTransport::with_databases(&["shop"]));
    let connector = Connector::new(Config::with_url("http://localhost:5984/shop"), store.clone()).unwrap();
    connector
        .define(
            ModelDefinition::new("Product")
                .id_property("id", FieldType::String)
                .property("name", FieldType::String)
                .property("price", FieldType::Number),
        )
        .unwrap();
    connector
        .define(ModelDefinition::new("Order").property("total", FieldType::Number))
        .unwrap();
    (store, connector)
}

fn product(id: &str, name: &str, price: i64) -> Record {
    Record::new().with("id", id).with("name", name).with("price", price)
}

fn id(value: &str) -> FieldValue {
    FieldValue::from(value)
}

#[tokio::test]
async fn create_tags_document_and_reads_back() {
    let (store, connector) = setup();
    let written = connector.create("Product", &product("p1", "bread", 100)).await.unwrap();
    assert_eq!(written.id, "p1");
    assert_eq!(written.rev.generation(), 1);

    let raw = store.get("shop", "p1").await.unwrap();
    assert_eq!(raw["loopback__model__name"], json!("Product"));
    assert!(raw.get("id").is_none());

    let found = connector.find_by_id("Product", &id("p1")).await.unwrap().unwrap();
    assert_eq!(found.get("price"), Some(&FieldValue::Integer(100)));
    assert_eq!(found.get("id"), Some(&id("p1")));
    assert!(found.get("_rev").is_none());

    assert!(connector.find_by_id("Product", &id("nope")).await.unwrap().is_none());
    // documents of other models never leak through
    assert!(connector.find_by_id("Order", &id("p1")).await.unwrap().is_none());
}

#[tokio::test]
async fn duplicate_create_is_a_conflict() {
    let (_store, connector) = setup();
    connector.create("Product", &product("p1", "bread", 100)).await.unwrap();

    let err = connector.create("Product", &product("p1", "cake", 300)).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Conflict);
    assert!(err.context.ends_with("(duplicate?)"));
}

#[tokio::test]
async fn update_attributes_merges_and_rejects_stale_revisions() {
    let (_store, connector) = setup();
    let first = connector.create("Product", &product("p1", "bread", 100)).await.unwrap();

    let patch = Record::new().with("price", 120);
    let updated = connector.update_attributes("Product", &id("p1"), &patch).await.unwrap();
    assert_eq!(updated.rev.generation(), 2);
    assert_eq!(updated.record.get("name"), Some(&FieldValue::from("bread")));
    assert_eq!(updated.record.get("price"), Some(&FieldValue::Integer(120)));

    let stale = Record::new()
        .with("price", 1)
        .with("_rev", first.rev.0.clone());
    let err = connector.update_attributes("Product", &id("p1"), &stale).await.unwrap_err();
    assert!(err.is_conflict());

    let current = connector.get_current_revision("Product", &id("p1")).await.unwrap();
    assert_eq!(current, updated.rev);
}

#[tokio::test]
async fn conflicts_are_not_retried() {
    let (store, connector) = setup();
    let first = connector.create("Product", &product("p1", "bread", 100)).await.unwrap();
    let second = connector
        .update_attributes("Product", &id("p1"), &Record::new().with("price", 120))
        .await
        .unwrap();

    store.reset_write_calls();
    let stale = product("p1", "rye", 80).with("_rev", first.rev.0.clone());
    let err = connector.replace_by_id("Product", &id("p1"), &stale).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Conflict);
    assert_eq!(store.write_calls(), 1);

    let current = connector.get_current_revision("Product", &id("p1")).await.unwrap();
    assert_eq!(current, second.rev);
    let found = connector.find_by_id("Product", &id("p1")).await.unwrap().unwrap();
    assert_eq!(found.get("name"), Some(&FieldValue::from("bread")));
}

#[tokio::test]
async fn update_attributes_does_not_cross_models() {
    let (_store, connector) = setup();
    let order = connector
        .create("Order", &Record::new().with("total", 10))
        .await
        .unwrap();

    let err = connector
        .update_attributes("Product", &id(&order.id), &Record::new().with("price", 1))
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    let err = connector
        .update_attributes("Product", &id("missing"), &Record::new().with("price", 1))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn update_or_create_reports_new_instances() {
    let (_store, connector) = setup();

    let created = connector.update_or_create("Product", &product("p1", "bread", 100)).await.unwrap();
    assert!(created.is_new_instance);

    let merged = connector
        .update_or_create("Product", &Record::new().with("id", "p1").with("price", 90))
        .await
        .unwrap();
    assert!(!merged.is_new_instance);
    assert_eq!(merged.record.get("name"), Some(&FieldValue::from("bread")));
    assert_eq!(merged.record.get("price"), Some(&FieldValue::Integer(90)));

    let anonymous = connector
        .update_or_create("Product", &Record::new().with("name", "cake"))
        .await
        .unwrap();
    assert!(anonymous.is_new_instance);
    assert!(matches!(anonymous.record.get("id"), Some(FieldValue::Text(_))));
}

#[tokio::test]
async fn replace_drops_properties_missing_from_the_record() {
    let (_store, connector) = setup();
    connector.create("Product", &product("p1", "bread", 100)).await.unwrap();

    let replaced = connector
        .replace_or_create("Product", &Record::new().with("id", "p1").with("name", "rye"))
        .await
        .unwrap();
    assert!(!replaced.is_new_instance);
    assert_eq!(replaced.record.get("name"), Some(&FieldValue::from("rye")));
    assert!(replaced.record.get("price").is_none());

    let fresh = connector
        .replace_or_create("Product", &product("p2", "cake", 300))
        .await
        .unwrap();
    assert!(fresh.is_new_instance);

    let by_id = connector
        .replace_by_id("Product", &id("p2"), &Record::new().with("price", 250))
        .await
        .unwrap();
    assert_eq!(by_id.record.get("id"), Some(&id("p2")));
    assert!(by_id.record.get("name").is_none());

    let err = connector
        .replace_by_id("Product", &id("ghost"), &Record::new().with("price", 1))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert!(err.context.contains("No instance with id ghost found for Product"));
}

#[tokio::test]
async fn save_requires_an_identifier() {
    let (_store, connector) = setup();
    let err = connector.save("Product", &Record::new().with("name", "bread")).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidArgument);

    let saved = connector.save("Product", &product("p1", "bread", 100)).await.unwrap();
    assert!(saved.is_new_instance);

    let again = Record::new()
        .with("id", "p1")
        .with("name", "bread")
        .with("_rev", saved.rev.0.clone());
    let resaved = connector.save("Product", &again).await.unwrap();
    assert!(!resaved.is_new_instance);
    assert!(resaved.record.get("price").is_none());
}

#[tokio::test]
async fn destroy_removes_exactly_one_record() {
    let (_store, connector) = setup();
    connector.create("Product", &product("p1", "bread", 100)).await.unwrap();

    assert_eq!(connector.destroy("Product", &id("p1")).await.unwrap(), 1);
    assert!(!connector.exists("Product", &id("p1")).await.unwrap());

    let err = connector.destroy("Product", &id("p1")).await.unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(err.context, "could not find matching item in database!");
}

#[tokio::test]
async fn destroy_refuses_ambiguous_matches() {
    let (store, connector) = setup();
    let doc = |id: &str| {
        json!({"_id": id, "_rev": "1-a", "loopback__model__name": "Product"})
            .as_object()
            .cloned()
            .unwrap()
    };
    store.script_find_responses(vec![FindResponse {
        docs: Some(vec![doc("p1"), doc("p1")]),
        bookmark: None,
        warning: None,
    }]);

    let err = connector.destroy("Product", &id("p1")).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidArgument);
    assert!(err.context.contains("more than one item"));
}

#[tokio::test]
async fn update_all_and_destroy_all_use_bulk_writes() {
    let (store, connector) = setup();
    for (i, name) in ["bread", "cake", "rye"].iter().enumerate() {
        connector.create("Product", &product(&format!("p{}", i), name, 100)).await.unwrap();
    }
    connector.create("Order", &Record::new().with("total", 5)).await.unwrap();

    let cheap = WhereClause::eq("price", json!(100));
    let patch = Record::new().with("price", 80);
    assert_eq!(connector.update_all("Product", Some(&cheap), &patch).await.unwrap(), 3);
    assert_eq!(connector.count("Product", Some(&cheap)).await.unwrap(), 0);

    let discounted = WhereClause::eq("price", json!(80));
    assert_eq!(connector.count("Product", Some(&discounted)).await.unwrap(), 3);

    assert_eq!(connector.destroy_all("Product", None).await.unwrap(), 3);
    assert_eq!(connector.count("Product", None).await.unwrap(), 0);
    assert_eq!(connector.count("Order", None).await.unwrap(), 1);
    assert_eq!(store.document_count("shop"), 1);

    assert_eq!(connector.destroy_all("Product", None).await.unwrap(), 0);
}

#[tokio::test]
async fn update_all_reports_partial_failures() {
    let (store, connector) = setup();
    connector.create("Product", &product("p1", "bread", 100)).await.unwrap();
    connector.create("Product", &product("p2", "cake", 100)).await.unwrap();
    let current: Revision = store.head("shop", "p1").await.unwrap();

    let doc = |id: &str, rev: &str| {
        json!({"_id": id, "_rev": rev, "loopback__model__name": "Product", "price": 100})
            .as_object()
            .cloned()
            .unwrap()
    };
    store.script_find_responses(vec![FindResponse {
        docs: Some(vec![doc("p1", current.as_str()), doc("p2", "1-stale")]),
        bookmark: None,
        warning: None,
    }]);

    let err = connector
        .update_all("Product", None, &Record::new().with("price", 1))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::PartialBatchFailure);
    assert_eq!(err.failures.len(), 1);
    assert_eq!(err.failures[0].id.as_deref(), Some("p2"));
    assert_eq!(err.failures[0].error.as_deref(), Some("conflict"));

    // the healthy entry of the batch was still written
    let p1 = connector.find_by_id("Product", &id("p1")).await.unwrap().unwrap();
    assert_eq!(p1.get("price"), Some(&FieldValue::Integer(1)));
}

#[tokio::test]
async fn bulk_replace_returns_outcomes() {
    let (_store, connector) = setup();
    let records = vec![product("a", "bread", 1), product("b", "cake", 2)];
    let outcomes = connector.bulk_replace("Product", &records).await.unwrap();
    assert_eq!(outcomes.len(), 2);
    assert!(outcomes.iter().all(|o| !o.is_error()));

    let err = connector.bulk_replace("Product", &records).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::PartialBatchFailure);
    assert_eq!(err.failures.len(), 2);
}

#[tokio::test]
async fn filters_order_and_page_through_records() {
    let (_store, connector) = setup();
    for (i, price) in [300, 100, 200].iter().enumerate() {
        connector.create("Product", &product(&format!("p{}", i), "bread", *price)).await.unwrap();
    }

    let filter = Filter::new().with_order("price DESC").with_limit(2);
    let records = connector.all("Product", &filter).await.unwrap();
    let prices: Vec<_> = records.iter().map(|r| r.get("price").cloned()).collect();
    assert_eq!(prices, vec![Some(FieldValue::Integer(300)), Some(FieldValue::Integer(200))]);

    let filter = Filter::new().with_order("price ASC").with_skip(1);
    let records = connector.all("Product", &filter).await.unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].get("price"), Some(&FieldValue::Integer(200)));
}

#[tokio::test]
async fn zero_limit_returns_every_record() {
    let (_store, connector) = setup();
    for (i, price) in [300, 100, 200].iter().enumerate() {
        connector.create("Product", &product(&format!("p{}", i), "bread", *price)).await.unwrap();
    }

    let parsed = FilterParser::parse(&json!({"limit": 0, "skip": 0})).unwrap();
    assert_eq!(connector.all("Product", &parsed).await.unwrap().len(), 3);

    let built = Filter::new().with_limit(0);
    assert_eq!(connector.all("Product", &built).await.unwrap().len(), 3);
}

#[tokio::test]
async fn connect_probes_the_store_unless_lazy() {
    let store = Arc::new(MemoryTransport::with_databases(&["shop"]));
    store.set_offline(true);

    let config = Config::with_url("http://localhost:5984/shop");
    let err = Connector::connect(config.clone(), store.clone()).await.err().unwrap();
    assert_eq!(err.kind, ErrorKind::Connection);

    let lazy = Config {
        lazy_connect: true,
        ..config
    };
    let connector = Connector::connect(lazy, store.clone()).await.unwrap();
    store.set_offline(false);
    connector.ping().await.unwrap();
}
