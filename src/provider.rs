//! The Azure MySQL provider.
//!
//! [`AzureMySqlProvider`] implements [`ProviderService`] on top of the
//! resource and data source registries. Resource operations need an
//! [`ArmClient`], which only exists once the host has called `configure`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::arm::{self, ArmClient};
use crate::config::ProviderConfig;
use crate::data_sources;
use crate::error::{ProviderError, Result};
use crate::plan;
use crate::resources::{Registry, ResourceData};
use crate::schema::{Diagnostic, ProviderSchema};
use crate::server::ProviderService;
use crate::types::{ImportedResource, PlanResult};
use crate::validation;

/// Provider for Azure Database for MySQL single and flexible servers.
pub struct AzureMySqlProvider {
    resources: Registry,
    data_sources: data_sources::Registry,
    client: RwLock<Option<Arc<ArmClient>>>,
    poll_interval: Option<Duration>,
}

impl AzureMySqlProvider {
    /// A provider with every resource and data source registered.
    pub fn new() -> Self {
        Self {
            resources: Registry::new(),
            data_sources: data_sources::Registry::new(),
            client: RwLock::new(None),
            poll_interval: None,
        }
    }

    /// Poll long-running operations at `interval` instead of the ARM default.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    async fn client(&self) -> Result<Arc<ArmClient>> {
        self.client
            .read()
            .await
            .clone()
            .ok_or_else(|| ProviderError::FailedPrecondition("provider has not been configured".to_string()))
    }
}

impl Default for AzureMySqlProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProviderService for AzureMySqlProvider {
    fn schema(&self) -> ProviderSchema {
        let schema = ProviderSchema::new().with_provider_config(ProviderConfig::schema());
        let schema = self
            .resources
            .iter()
            .fold(schema, |schema, r| schema.with_resource(r.type_name(), r.schema()));
        self.data_sources
            .iter()
            .fold(schema, |schema, d| schema.with_data_source(d.type_name(), d.schema()))
    }

    async fn validate_provider_config(&self, config: Value) -> Result<Vec<Diagnostic>> {
        let mut diagnostics = validation::validate(&ProviderConfig::schema(), &config);
        diagnostics.extend(ProviderConfig::from_value(&config)?.with_env_fallbacks().diagnostics());
        Ok(diagnostics)
    }

    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>> {
        let config = ProviderConfig::from_value(&config)?.with_env_fallbacks();
        let diagnostics = config.diagnostics();
        if diagnostics.iter().any(Diagnostic::is_error) {
            return Ok(diagnostics);
        }

        let settings = config.resolve()?;
        let mut client = ArmClient::new(&settings)?;
        if let Some(interval) = self.poll_interval {
            client = client.with_poll_interval(interval);
        }
        info!(
            subscription_id = %settings.subscription_id,
            endpoint = %settings.resource_manager_endpoint,
            "provider configured"
        );
        *self.client.write().await = Some(Arc::new(client));
        Ok(diagnostics)
    }

    async fn stop(&self) -> Result<()> {
        debug!("dropping ARM client");
        self.client.write().await.take();
        Ok(())
    }

    async fn validate_resource_config(&self, resource_type: &str, config: Value) -> Result<Vec<Diagnostic>> {
        let resource = self.resources.get(resource_type)?;
        Ok(validation::validate(&resource.schema(), &config))
    }

    async fn plan(
        &self,
        resource_type: &str,
        prior_state: Option<Value>,
        proposed_state: Value,
        _config: Value,
    ) -> Result<PlanResult> {
        let resource = self.resources.get(resource_type)?;
        let mut result = plan::diff(&resource.schema(), prior_state.as_ref(), &proposed_state);
        if !proposed_state.is_null() {
            resource.customize_plan(&mut result, prior_state.as_ref())?;
        }
        Ok(result)
    }

    async fn create(&self, resource_type: &str, planned_state: Value) -> Result<Value> {
        let resource = self.resources.get(resource_type)?;
        let client = self.client().await?;
        let mut data = ResourceData::new(planned_state);
        arm::with_timeout(
            resource.timeouts().create,
            format!("creating {}", resource_type),
            resource.create(&client, &mut data),
        )
        .await?;
        Ok(data.into_state())
    }

    async fn read(&self, resource_type: &str, current_state: Value) -> Result<Value> {
        let resource = self.resources.get(resource_type)?;
        let client = self.client().await?;
        let mut data = ResourceData::new(current_state);
        arm::with_timeout(
            resource.timeouts().read,
            format!("reading {}", resource_type),
            resource.read(&client, &mut data),
        )
        .await?;
        Ok(data.into_state())
    }

    async fn update(&self, resource_type: &str, prior_state: Value, planned_state: Value) -> Result<Value> {
        let resource = self.resources.get(resource_type)?;
        let client = self.client().await?;
        let mut data = ResourceData::with_prior(prior_state, planned_state);
        arm::with_timeout(
            resource.timeouts().update,
            format!("updating {}", resource_type),
            resource.update(&client, &mut data),
        )
        .await?;
        Ok(data.into_state())
    }

    async fn delete(&self, resource_type: &str, current_state: Value) -> Result<()> {
        let resource = self.resources.get(resource_type)?;
        let client = self.client().await?;
        let mut data = ResourceData::new(current_state);
        arm::with_timeout(
            resource.timeouts().delete,
            format!("deleting {}", resource_type),
            resource.delete(&client, &mut data),
        )
        .await
    }

    async fn import_resource(&self, resource_type: &str, id: &str) -> Result<Vec<ImportedResource>> {
        let resource = self.resources.get(resource_type)?;
        let client = self.client().await?;
        let state = arm::with_timeout(
            resource.timeouts().read,
            format!("importing {}", resource_type),
            resource.import(&client, id),
        )
        .await?;
        Ok(vec![ImportedResource::new(resource_type, state)])
    }

    async fn validate_data_source_config(&self, data_source_type: &str, config: Value) -> Result<Vec<Diagnostic>> {
        let data_source = self.data_sources.get(data_source_type)?;
        Ok(validation::validate(&data_source.schema(), &config))
    }

    async fn read_data_source(&self, data_source_type: &str, config: Value) -> Result<Value> {
        let data_source = self.data_sources.get(data_source_type)?;
        let client = self.client().await?;
        arm::with_timeout(
            Duration::from_secs(5 * 60),
            format!("reading {}", data_source_type),
            data_source.read(&client, &config),
        )
        .await
    }
}
