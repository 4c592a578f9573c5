//! Resource handlers.
//!
//! Every managed resource implements [`Resource`]: a schema plus CRUD
//! handlers that translate attributes into ARM calls. Handlers work on a
//! [`ResourceData`], which wraps the JSON state the host sends and offers
//! path-based accessors such as `storage.0.auto_grow_enabled`.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::arm::ArmClient;
use crate::error::{ProviderError, Result};
use crate::ids::IdKind;
use crate::schema::Schema;
use crate::types::PlanResult;
use crate::validation::{is_set, lookup};

pub mod common;

mod aad_admin;
mod configuration;
mod database;
mod firewall_rule;
mod flexible_aad_admin;
mod flexible_configuration;
mod flexible_database;
mod flexible_firewall_rule;
pub mod flexible_server;
pub mod server;
mod server_key;
mod virtual_network_rule;

/// Upper bounds for each CRUD operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Create timeout.
    pub create: Duration,
    /// Read timeout.
    pub read: Duration,
    /// Update timeout.
    pub update: Duration,
    /// Delete timeout.
    pub delete: Duration,
}

impl Timeouts {
    /// Timeouts given in minutes.
    pub const fn minutes(create: u64, read: u64, update: u64, delete: u64) -> Self {
        Self {
            create: Duration::from_secs(create * 60),
            read: Duration::from_secs(read * 60),
            update: Duration::from_secs(update * 60),
            delete: Duration::from_secs(delete * 60),
        }
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self::minutes(30, 5, 30, 30)
    }
}

/// A resource type managed by this provider.
#[async_trait]
pub trait Resource: Send + Sync {
    /// The resource type name, e.g. `azurerm_mysql_flexible_server`.
    fn type_name(&self) -> &'static str;

    /// The resource schema.
    fn schema(&self) -> Schema;

    /// The kind of ARM ID stored in `id`.
    fn id_kind(&self) -> IdKind;

    /// Operation timeouts.
    fn timeouts(&self) -> Timeouts {
        Timeouts::default()
    }

    /// Refine a computed plan, e.g. to force replacement on value-dependent rules.
    fn customize_plan(&self, plan: &mut PlanResult, prior: Option<&Value>) -> Result<()> {
        let _ = (plan, prior);
        Ok(())
    }

    /// Create the resource and fill in its state.
    async fn create(&self, client: &ArmClient, data: &mut ResourceData) -> Result<()>;

    /// Refresh the state; marks the data gone when the resource no longer exists.
    async fn read(&self, client: &ArmClient, data: &mut ResourceData) -> Result<()>;

    /// Apply an in-place update.
    async fn update(&self, client: &ArmClient, data: &mut ResourceData) -> Result<()> {
        let _ = (client, data);
        Err(ProviderError::Unimplemented(format!(
            "{} does not support in-place updates",
            self.type_name()
        )))
    }

    /// Delete the resource.
    async fn delete(&self, client: &ArmClient, data: &mut ResourceData) -> Result<()>;

    /// Import an existing resource by ID.
    async fn import(&self, client: &ArmClient, id: &str) -> Result<Value> {
        self.id_kind().validate(id)?;
        let mut data = ResourceData::from_id(id);
        self.read(client, &mut data).await?;
        if data.is_gone() {
            return Err(ProviderError::NotFound(format!(
                "cannot import non-existent remote object {:?}",
                id
            )));
        }
        Ok(data.into_state())
    }
}

/// The resources this provider manages, keyed by type name.
pub struct Registry {
    resources: BTreeMap<&'static str, Box<dyn Resource>>,
}

impl Registry {
    /// A registry with every resource type.
    pub fn new() -> Self {
        let all: Vec<Box<dyn Resource>> = vec![
            Box::new(flexible_server::FlexibleServer),
            Box::new(flexible_database::FlexibleDatabase),
            Box::new(flexible_firewall_rule::FlexibleFirewallRule),
            Box::new(flexible_configuration::FlexibleConfiguration),
            Box::new(flexible_aad_admin::FlexibleAadAdministrator),
            Box::new(server::Server),
            Box::new(database::Database),
            Box::new(firewall_rule::FirewallRule),
            Box::new(configuration::Configuration),
            Box::new(aad_admin::AadAdministrator),
            Box::new(server_key::ServerKey),
            Box::new(virtual_network_rule::VirtualNetworkRule),
        ];
        Self {
            resources: all.into_iter().map(|r| (r.type_name(), r)).collect(),
        }
    }

    /// Look up a resource type.
    pub fn get(&self, type_name: &str) -> Result<&dyn Resource> {
        self.resources
            .get(type_name)
            .map(|r| r.as_ref())
            .ok_or_else(|| ProviderError::UnknownResource(type_name.to_string()))
    }

    /// All resources in name order.
    pub fn iter(&self) -> impl Iterator<Item = &dyn Resource> {
        self.resources.values().map(|r| r.as_ref())
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

/// State of a single resource instance during an operation.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceData {
    state: Value,
    prior: Option<Value>,
    gone: bool,
}

impl ResourceData {
    /// Wrap planned or current state.
    pub fn new(state: Value) -> Self {
        let state = match state {
            Value::Object(_) => state,
            _ => Value::Object(Map::new()),
        };
        Self {
            state,
            prior: None,
            gone: false,
        }
    }

    /// Wrap planned state alongside the prior state, for updates.
    pub fn with_prior(prior: Value, planned: Value) -> Self {
        let mut data = Self::new(planned);
        data.prior = Some(prior);
        data
    }

    /// State holding only an ID, for imports.
    pub fn from_id(id: impl Into<String>) -> Self {
        let mut data = Self::new(Value::Null);
        data.set_id(id);
        data
    }

    /// The resource ID, if set.
    pub fn id(&self) -> Option<&str> {
        self.get_str("id")
    }

    /// The resource ID, failing when it has not been set.
    pub fn require_id(&self) -> Result<&str> {
        self.id()
            .ok_or_else(|| ProviderError::InvalidRequest("the resource state has no `id`".to_string()))
    }

    /// Record the resource ID.
    pub fn set_id(&mut self, id: impl Into<String>) {
        self.set("id", id.into());
    }

    /// The value at a dotted path, ignoring nulls.
    pub fn get(&self, path: &str) -> Option<&Value> {
        lookup(&self.state, path).filter(|v| !v.is_null())
    }

    /// The value at `path` when it is set to something other than a zero value.
    pub fn get_ok(&self, path: &str) -> Option<&Value> {
        self.get(path).filter(|v| {
            is_set(Some(v)) && !matches!(v, Value::Bool(false)) && v.as_i64() != Some(0)
        })
    }

    /// A non-empty string at `path`.
    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(Value::as_str).filter(|s| !s.is_empty())
    }

    /// The string at `path`, empty when unset.
    pub fn get_string(&self, path: &str) -> String {
        self.get_str(path).unwrap_or_default().to_string()
    }

    /// A string that must be present.
    pub fn require_str(&self, path: &str) -> Result<&str> {
        self.get_str(path)
            .ok_or_else(|| ProviderError::Validation(format!("`{}` must be set", path)))
    }

    /// The integer at `path`.
    pub fn get_i64(&self, path: &str) -> Option<i64> {
        self.get(path).and_then(Value::as_i64)
    }

    /// The boolean at `path`, false when unset.
    pub fn get_bool(&self, path: &str) -> bool {
        self.get(path).and_then(Value::as_bool).unwrap_or(false)
    }

    /// The list at `path`, empty when unset.
    pub fn get_list(&self, path: &str) -> &[Value] {
        self.get(path).and_then(Value::as_array).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The first item of a single-item block, if configured.
    pub fn get_block(&self, path: &str) -> Option<&Map<String, Value>> {
        self.get_list(path).first().and_then(Value::as_object)
    }

    /// Whether `path` differs between the prior and the current state.
    ///
    /// Unset, null and empty values compare equal. Without a prior state
    /// anything set counts as changed.
    pub fn has_change(&self, path: &str) -> bool {
        let (before, after) = self.get_change(path);
        normalized(before) != normalized(after)
    }

    /// The prior and current values at `path`.
    pub fn get_change(&self, path: &str) -> (Option<&Value>, Option<&Value>) {
        let before = self.prior.as_ref().and_then(|p| lookup(p, path));
        (before, lookup(&self.state, path))
    }

    /// Set a top-level attribute.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) {
        if let Value::Object(map) = &mut self.state {
            map.insert(name.to_string(), value.into());
        }
    }

    /// Mark the resource as no longer existing.
    pub fn set_gone(&mut self) {
        self.gone = true;
    }

    /// Whether the resource was found to be gone.
    pub fn is_gone(&self) -> bool {
        self.gone
    }

    /// The current state.
    pub fn state(&self) -> &Value {
        &self.state
    }

    /// The final state: null when the resource is gone.
    pub fn into_state(self) -> Value {
        if self.gone {
            Value::Null
        } else {
            self.state
        }
    }
}

fn normalized(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| is_set(Some(v)))
}
