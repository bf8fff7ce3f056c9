use std::sync::Arc;
use serde_json::Value;
use tracing::debug;
use crate::core::error::Result;
use crate::transport::Transport;

/// Design-document view and geo index queries against the default database.
/// Responses are returned exactly as the store sends them.
pub struct ViewService<T: Transport + ?Sized> {
    transport: Arc<T>,
    database: String,
}

impl<T: Transport + ?Sized> ViewService<T> {
    pub fn new(transport: Arc<T>, database: &str) -> Self {
        ViewService {
            transport,
            database: database.to_string(),
        }
    }

    /// `GET /<db>/_design/<ddoc>/_view/<view>`
    pub async fn view_docs(&self, ddoc: &str, view: &str, params: &Value) -> Result<Value> {
        debug!(target: "couchlink::views", db = %self.database, ddoc, view, %params, "Querying view");
        self.transport.view(&self.database, ddoc, view, params).await
    }

    /// `GET /<db>/_design/<ddoc>/_geo/<index>`
    pub async fn geo_docs(&self, ddoc: &str, index: &str, params: &Value) -> Result<Value> {
        debug!(target: "couchlink::views", db = %self.database, ddoc, index, %params, "Querying geo index");
        self.transport.geo(&self.database, ddoc, index, params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use crate::transport::memory::MemoryTransport;

    #[tokio::test]
    async fn answers_registered_views_and_geo_indexes() {
        let store = Arc::new(MemoryTransport::with_databases(&["shop"]));
        store.register_view("shop", "_design/products", "by_price", json!({"total_rows": 1, "rows": [{"key": 100}]}));
        store.register_geo("shop", "geo", "nearby", json!({"rows": []}));

        let views = ViewService::new(store.clone(), "shop");
        let result = views.view_docs("products", "by_price", &json!({})).await.unwrap();
        assert_eq!(result["total_rows"], json!(1));
        assert_eq!(views.geo_docs("geo", "nearby", &json!({"radius": 2000})).await.unwrap(), json!({"rows": []}));

        assert!(views.view_docs("products", "missing", &json!({})).await.unwrap_err().is_not_found());
    }
}
