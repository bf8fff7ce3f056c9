use tracing::debug;
use crate::query::filter::OrderSpec;
use crate::query::types::{SortField, SortOrder};
use crate::registry::binding::ModelBinding;
use crate::schema::schema::FieldType;

/// Compiles an order expression into the native sort array.
///
/// The store cannot infer how to collate a sort field that is missing from
/// the chosen index, so each field gets a `:number` or `:string` hint taken
/// from its declared type.
pub struct SortCompiler<'a> {
    binding: &'a ModelBinding,
}

impl<'a> SortCompiler<'a> {
    pub fn new(binding: &'a ModelBinding) -> Self {
        SortCompiler { binding }
    }

    pub fn compile(&self, order: Option<&OrderSpec>) -> Vec<SortField> {
        let items: Vec<String> = order
            .map(|o| o.items())
            .unwrap_or_default()
            .into_iter()
            .filter(|item| !item.is_empty())
            .collect();

        let sort: Vec<SortField> = if items.is_empty() {
            vec![self.compile_item(&self.binding.id_field)]
        } else {
            items.iter().map(|item| self.compile_item(item)).collect()
        };

        debug!(target: "couchlink::query", model = %self.binding.model, ?sort, "Compiled sort");
        sort
    }

    fn compile_item(&self, item: &str) -> SortField {
        let (field, order) = split_direction(item);

        // Explicit hints are trusted as written
        if let Some((base, hint)) = field.split_once(':') {
            let base = if base == self.binding.id_field { "_id" } else { base };
            return SortField::new(&format!("{}:{}", base, hint), order);
        }

        if field == self.binding.id_field || field == "_id" {
            let name = if self.binding.is_numeric_id() { "_id:number" } else { "_id" };
            return SortField::new(name, order);
        }

        let name = match self.binding.definition.resolve_type(field) {
            Some(FieldType::Number) => format!("{}:number", field),
            Some(t) if t.is_string_like() => format!("{}:string", field),
            _ => field.to_string(),
        };
        SortField::new(&name, order)
    }
}

/// Splits a trailing `ASC` / `DESC` token off an order item
fn split_direction(item: &str) -> (&str, SortOrder) {
    let item = item.trim();
    if let Some((field, token)) = item.rsplit_once(char::is_whitespace) {
        if token.eq_ignore_ascii_case("desc") {
            return (field.trim_end(), SortOrder::Desc);
        }
        if token.eq_ignore_ascii_case("asc") {
            return (field.trim_end(), SortOrder::Asc);
        }
    }
    (item, SortOrder::Asc)
}
