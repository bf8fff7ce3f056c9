use tracing::{debug, info};
use crate::core::config::Config;
use crate::core::error::Result;
use crate::index::descriptor::{IndexDescriptor, IndexDiff};
use crate::query::types::{SortField, SortOrder};
use crate::registry::binding::{ModelBinding, Tagging};
use crate::transport::Transport;

/// Derives, diffs and installs the secondary indexes of a model
pub struct IndexManager<'a> {
    config: &'a Config,
}

impl<'a> IndexManager<'a> {
    pub fn new(config: &'a Config) -> Self {
        IndexManager { config }
    }

    /// Index over the discriminator field, or over the plain top-level keys
    /// of a custom selector. `None` when a custom selector has no such keys.
    pub fn discriminator_index(&self, binding: &ModelBinding) -> Option<IndexDescriptor> {
        let fields: Vec<SortField> = match &binding.tagging {
            Tagging::Discriminator(field) => vec![SortField::asc(field)],
            Tagging::Selector(selector) => selector
                .keys()
                .filter(|k| !k.starts_with('$'))
                .map(|k| SortField::asc(k))
                .collect(),
        };
        if fields.is_empty() {
            return None;
        }
        Some(IndexDescriptor::new(
            &binding.discriminator_index_name(),
            &binding.discriminator_ddoc(),
            fields,
            false,
        ))
    }

    /// Every index the model's schema asks for: the discriminator index, one
    /// ascending index per indexed property and each declared composite index.
    /// Property and composite indexes get the discriminator appended with the
    /// direction of their first field, since the store wants uniform directions.
    pub fn desired_indexes(&self, binding: &ModelBinding) -> Vec<IndexDescriptor> {
        let mut desired: Vec<IndexDescriptor> = self.discriminator_index(binding).into_iter().collect();

        for prop in binding.definition.properties.iter().filter(|p| p.index) {
            let name = format!("{}_index", prop.name);
            let fields = self.with_discriminator(binding, vec![SortField::asc(&prop.name)]);
            desired.push(IndexDescriptor::new(&name, &self.ddoc_name(binding, &name), fields, false));
        }

        for decl in &binding.definition.settings.indexes {
            let fields = decl
                .keys
                .iter()
                .map(|(field, direction)| SortField::new(field, SortOrder::from_sign(*direction)))
                .collect();
            let fields = self.with_discriminator(binding, fields);
            desired.push(IndexDescriptor::new(
                &decl.name,
                &self.ddoc_name(binding, &decl.name),
                fields,
                decl.partitioned,
            ));
        }
        desired
    }

    /// `<model prefix>__<Model>__<property prefix>__<index>`
    pub fn ddoc_name(&self, binding: &ModelBinding, index: &str) -> String {
        format!(
            "{}__{}__{}__{}",
            self.config.index_model_prefix, binding.model, self.config.index_property_prefix, index
        )
    }

    fn with_discriminator(&self, binding: &ModelBinding, mut fields: Vec<SortField>) -> Vec<SortField> {
        if let (Some(discriminator), Some(first)) = (binding.discriminator(), fields.first()) {
            let order = first.order;
            if !fields.iter().any(|f| f.field == discriminator) {
                fields.push(SortField::new(discriminator, order));
            }
        }
        fields
    }

    /// Installed indexes that belong to this model
    pub fn model_scoped(&self, binding: &ModelBinding, existing: Vec<IndexDescriptor>) -> Vec<IndexDescriptor> {
        let prefix = format!("{}__{}__", self.config.index_model_prefix, binding.model);
        let discriminator_ddoc = binding.discriminator_ddoc();
        existing
            .into_iter()
            .filter(|index| index.ddoc.starts_with(&prefix) || index.ddoc == discriminator_ddoc)
            .collect()
    }

    /// Compares by index name. Identical indexes are left alone, changed ones
    /// are recreated in place and not dropped, leftovers are dropped.
    pub fn diff(desired: &[IndexDescriptor], existing: &[IndexDescriptor]) -> IndexDiff {
        let mut remaining: Vec<IndexDescriptor> = existing.to_vec();
        let mut to_add = Vec::new();

        for index in desired {
            match remaining.iter().position(|e| e.name == index.name) {
                None => to_add.push(index.clone()),
                Some(pos) => {
                    let current = remaining.remove(pos);
                    if !current.same_fields(index) {
                        to_add.push(index.clone());
                    }
                }
            }
        }

        IndexDiff { to_add, to_drop: remaining }
    }

    /// Reconciles the installed indexes of a model with its schema.
    /// Drops run before creates.
    pub async fn apply<T: Transport + ?Sized>(&self, transport: &T, binding: &ModelBinding) -> Result<IndexDiff> {
        let existing = self.model_scoped(binding, transport.list_indexes(&binding.database).await?);
        let desired = self.desired_indexes(binding);
        let diff = Self::diff(&desired, &existing);

        debug!(
            target: "couchlink::index",
            model = %binding.model,
            to_add = diff.to_add.len(),
            to_drop = diff.to_drop.len(),
            "Index diff computed"
        );

        for index in &diff.to_drop {
            info!(target: "couchlink::index", model = %binding.model, ddoc = %index.ddoc, name = %index.name, "Dropping index");
            transport.delete_index(&binding.database, &index.ddoc, &index.name).await?;
        }
        for index in &diff.to_add {
            info!(target: "couchlink::index", model = %binding.model, ddoc = %index.ddoc, name = %index.name, "Creating index");
            transport.create_index(&binding.database, index).await?;
        }
        Ok(diff)
    }

    /// True when the model's discriminator index is installed
    pub async fn is_actual<T: Transport + ?Sized>(&self, transport: &T, binding: &ModelBinding) -> Result<bool> {
        let Some(wanted) = self.discriminator_index(binding) else {
            return Ok(true);
        };
        let existing = transport.list_indexes(&binding.database).await?;
        Ok(existing
            .iter()
            .any(|index| index.ddoc == wanted.ddoc && index.name == wanted.name))
    }
}
