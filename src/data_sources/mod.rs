//! Data sources: read-only lookups of existing servers by name.
//!
//! Each data source reuses the matching resource's read and exposes the
//! resource's attributes as computed, minus the ones only meaningful at
//! create time.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::arm::ArmClient;
use crate::error::{ProviderError, Result};
use crate::resources::ResourceData;
use crate::schema::{Attribute, AttributeFlags, Block, Schema};

mod flexible_server;
mod server;

/// A data source exposed by this provider.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// The data source type name.
    fn type_name(&self) -> &'static str;

    /// The data source schema.
    fn schema(&self) -> Schema;

    /// Look up the object described by `config` and return its state.
    async fn read(&self, client: &ArmClient, config: &Value) -> Result<Value>;
}

/// The data sources this provider offers, keyed by type name.
pub struct Registry {
    data_sources: BTreeMap<&'static str, Box<dyn DataSource>>,
}

impl Registry {
    /// A registry with every data source.
    pub fn new() -> Self {
        let all: Vec<Box<dyn DataSource>> = vec![
            Box::new(flexible_server::FlexibleServerDataSource),
            Box::new(server::ServerDataSource),
        ];
        Self {
            data_sources: all.into_iter().map(|d| (d.type_name(), d)).collect(),
        }
    }

    /// Look up a data source type.
    pub fn get(&self, type_name: &str) -> Result<&dyn DataSource> {
        self.data_sources
            .get(type_name)
            .map(|d| d.as_ref())
            .ok_or_else(|| ProviderError::UnknownDataSource(type_name.to_string()))
    }

    /// All data sources in name order.
    pub fn iter(&self) -> impl Iterator<Item = &dyn DataSource> {
        self.data_sources.values().map(|d| d.as_ref())
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

/// Derive a data source schema from a resource schema.
///
/// `inputs` stay required; `omit` is dropped; everything else becomes
/// computed with no defaults or constraints.
pub(crate) fn computed_schema(resource: Schema, inputs: &[&str], omit: &[&str]) -> Schema {
    let mut block = computed_block(resource.block, omit);
    for name in inputs {
        if let Some(attr) = block.attributes.get_mut(*name) {
            attr.flags = AttributeFlags::required();
        }
    }
    Schema { version: 0, block }
}

fn computed_block(block: Block, omit: &[&str]) -> Block {
    let attributes = block
        .attributes
        .into_iter()
        .filter(|(name, _)| !omit.contains(&name.as_str()))
        .map(|(name, attr)| (name, computed_attribute(attr)))
        .collect();
    let blocks = block
        .blocks
        .into_iter()
        .filter(|(name, _)| !omit.contains(&name.as_str()))
        .map(|(name, mut nested)| {
            nested.block = computed_block(nested.block, &[]);
            nested.min_items = 0;
            nested.computed = true;
            (name, nested)
        })
        .collect();
    Block {
        attributes,
        blocks,
        description: block.description,
    }
}

fn computed_attribute(attr: Attribute) -> Attribute {
    let mut computed = Attribute::new(attr.attr_type, AttributeFlags::computed());
    computed.flags.sensitive = attr.flags.sensitive;
    computed.description = attr.description;
    computed
}

/// Read `id` through a resource read and keep only what `schema` exposes.
pub(crate) async fn read_into<F, Fut>(id: String, schema: &Schema, read: F) -> Result<Value>
where
    F: FnOnce(ResourceData) -> Fut,
    Fut: std::future::Future<Output = Result<ResourceData>>,
{
    let data = read(ResourceData::from_id(id.clone())).await?;
    if data.is_gone() {
        return Err(ProviderError::NotFound(format!("{} was not found", id)));
    }

    let Value::Object(state) = data.into_state() else {
        return Ok(Value::Null);
    };
    let kept: Map<String, Value> = state
        .into_iter()
        .filter(|(name, _)| schema.block.attributes.contains_key(name) || schema.block.blocks.contains_key(name))
        .collect();
    Ok(Value::Object(kept))
}
