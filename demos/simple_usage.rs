/// couchlink API demo against the in-memory store
///
/// Walks through:
/// - model definition and index migration
/// - create, filtered reads, merge updates and deletes
/// - bulk updates

use std::sync::Arc;
use serde_json::json;
use couchlink::core::config::Config;
use couchlink::core::connector::Connector;
use couchlink::core::types::{FieldValue, Record};
use couchlink::query::parser::FilterParser;
use couchlink::schema::parser::ModelParser;
use couchlink::transport::memory::MemoryTransport;
use couchlink::transport::Transport;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter("couchlink=debug")
        .init();

    println!("\n╔═══════════════════════════════════════════════╗");
    println!("║        couchlink - Connector API Demo         ║");
    println!("╚═══════════════════════════════════════════════╝\n");

    // Step 1: Connect
    let store = Arc::new(MemoryTransport::with_databases(&["shop"]));
    let config = Config::from_json(json!({"url": "http://localhost:5984/shop", "pageSize": 50}))?;
    let connector = Connector::connect(config, store.clone()).await?;

    // Step 2: Define and migrate
    connector.define(ModelParser::parse(&json!({
        "name": "Product",
        "properties": {
            "name": {"type": "string", "index": true},
            "price": {"type": "number"},
            "tags": ["string"]
        }
    }))?)?;
    connector.automigrate(&[]).await?;
    for index in store.list_indexes("shop").await? {
        println!("index {:<14} in _design/{}", index.name, index.ddoc);
    }

    // Step 3: Create
    for (name, price) in [("bread", 100), ("cake", 300), ("rye", 120)] {
        let written = connector
            .create("Product", &Record::new().with("name", name).with("price", price))
            .await?;
        println!("created {} as {} ({})", name, written.id, written.rev);
    }

    // Step 4: Query
    let filter = FilterParser::parse(&json!({
        "where": {"price": {"lt": 200}},
        "order": "price DESC"
    }))?;
    for record in connector.all("Product", &filter).await? {
        println!("{}", record.to_json());
    }

    // Step 5: Update
    let bread = FilterParser::parse(&json!({"where": {"name": "bread"}}))?;
    if let Some(record) = connector.all("Product", &bread).await?.into_iter().next() {
        if let Some(id) = record.get("id") {
            let saved = connector
                .update_attributes("Product", id, &Record::new().with("price", 90))
                .await?;
            println!("bread now costs {:?} at {}", saved.record.get("price"), saved.rev);
        }
    }

    let raised = connector
        .update_all("Product", None, &Record::new().with("tags", FieldValue::Array(vec!["sale".into()])))
        .await?;
    println!("tagged {} products", raised);

    // Step 6: Delete
    let removed = connector.destroy_all("Product", None).await?;
    println!("removed {} products, {} left", removed, connector.count("Product", None).await?);

    Ok(())
}
