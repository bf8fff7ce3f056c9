use std::cmp::Ordering;
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};
use crate::core::error::{Error, Result};
use crate::core::types::Document;
use crate::query::types::{FindQuery, SortOrder};
use crate::registry::binding::ModelBinding;
use crate::transport::Transport;

/// Relation loading supplied by the ORM runtime. Called once per page with
/// the raw documents, before they join the accumulated result.
#[async_trait]
pub trait IncludeHook: Send + Sync {
    async fn process(&self, binding: &ModelBinding, docs: Vec<Document>, include: &Value) -> Result<Vec<Document>>;
}

/// Repeats a native find, following bookmarks, until the store signals the
/// end of the result set.
///
/// Paging stops when
/// - the first page holds fewer than `page_size` documents,
/// - a response carries no bookmark,
/// - the returned bookmark equals the one just submitted (the store stopped
///   making progress), or
/// - `max_results` documents were collected.
///
/// Pages are requested strictly one after another.
pub struct Paginator<'a, T: Transport + ?Sized> {
    transport: &'a T,
    page_size: usize,
    hook: Option<&'a dyn IncludeHook>,
}

impl<'a, T: Transport + ?Sized> Paginator<'a, T> {
    pub fn new(transport: &'a T, page_size: usize) -> Self {
        Paginator {
            transport,
            page_size,
            hook: None,
        }
    }

    pub fn with_hook(mut self, hook: Option<&'a dyn IncludeHook>) -> Self {
        self.hook = hook;
        self
    }

    pub async fn fetch_all(
        &self,
        binding: &ModelBinding,
        mut query: FindQuery,
        include: Option<&Value>,
        max_results: Option<usize>,
    ) -> Result<Vec<Document>> {
        let mut accumulated: Vec<Document> = Vec::new();
        let mut pages = 0usize;

        loop {
            let submitted = query.bookmark.clone();
            let response = self.transport.find(&binding.database, &query).await?;
            pages += 1;

            let Some(docs) = response.docs else {
                return Err(Error::malformed(format!(
                    "No documents returned for query on {}: {}",
                    binding.model,
                    serde_json::to_string(&query)?
                )));
            };
            if let Some(warning) = &response.warning {
                warn!(target: "couchlink::reader", model = %binding.model, %warning, "Store warning");
            }

            let page_len = docs.len();
            let docs = match (self.hook, include) {
                (Some(hook), Some(include)) => hook.process(binding, docs, include).await?,
                _ => docs,
            };

            let first_page = accumulated.is_empty();
            accumulated.extend(docs);

            debug!(
                target: "couchlink::reader",
                model = %binding.model,
                page = pages,
                page_len,
                total = accumulated.len(),
                "Fetched page"
            );

            if first_page && page_len < self.page_size {
                break;
            }
            if max_results.is_some_and(|max| accumulated.len() >= max) {
                break;
            }
            let Some(next) = response.bookmark else {
                break;
            };
            if submitted.as_deref() == Some(next.as_str()) {
                debug!(target: "couchlink::reader", model = %binding.model, bookmark = %next, "Bookmark repeated, stopping");
                break;
            }

            query.bookmark = Some(next);
            // skip only applies to the first page
            query.skip = None;
        }

        // Resort before the cap so the overshoot of the last page competes
        if binding.is_numeric_id() {
            sort_numeric_ids(&mut accumulated, &query);
        }
        if let Some(max) = max_results {
            accumulated.truncate(max);
        }
        Ok(accumulated)
    }
}

/// The store collates `_id` as text; numeric identifiers are put back in
/// numeric order when the query sorted on `_id:number`
pub fn sort_numeric_ids(docs: &mut [Document], query: &FindQuery) {
    let Some(order) = query
        .sort
        .iter()
        .find(|s| s.field == "_id:number")
        .map(|s| s.order)
    else {
        return;
    };

    let numeric = |doc: &Document| doc.get("_id").and_then(Value::as_str).and_then(|id| id.parse::<i64>().ok());
    docs.sort_by(|a, b| {
        let ord = match (numeric(a), numeric(b)) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        if order == SortOrder::Desc { ord.reverse() } else { ord }
    });
}
