//! `azurerm_mysql_flexible_server_configuration`.
//!
//! Server parameters always exist, so create and update both set the value
//! and delete puts the server default back.

use async_trait::async_trait;
use tracing::info;

use crate::arm::ArmClient;
use crate::error::{ProviderError, Result};
use crate::ids::{FlexibleServerConfigurationId, IdKind};
use crate::models::flexible::{Configuration, ConfigurationProperties, API_VERSION};
use crate::schema::{Attribute, Constraint, NameRule, Schema};

use super::common;
use super::{Resource, ResourceData, Timeouts};

const TYPE_NAME: &str = "azurerm_mysql_flexible_server_configuration";

const USER_OVERRIDE: &str = "user-override";
const SYSTEM_DEFAULT: &str = "system-default";

/// `azurerm_mysql_flexible_server_configuration`: one server parameter, reset to its default on delete.
pub struct FlexibleConfiguration;

impl FlexibleConfiguration {
    async fn set_value(
        &self,
        client: &ArmClient,
        id: &FlexibleServerConfigurationId,
        value: String,
        source: &str,
    ) -> Result<()> {
        let configuration = Configuration {
            id: None,
            properties: ConfigurationProperties {
                value: Some(value),
                source: Some(source.to_string()),
                ..Default::default()
            },
        };
        client.put_then_poll(&id.id(), API_VERSION, &configuration).await
    }
}

#[async_trait]
impl Resource for FlexibleConfiguration {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_attribute("id", common::id_attribute())
            .with_attribute("name", common::name_attribute(NameRule::ConfigurationName))
            .with_attribute("resource_group_name", common::resource_group_name_attribute())
            .with_attribute("server_name", common::name_attribute(NameRule::ServerName))
            .with_attribute("value", Attribute::required_string().with_constraint(Constraint::NotEmpty))
    }

    fn id_kind(&self) -> IdKind {
        IdKind::FlexibleServerConfiguration
    }

    fn timeouts(&self) -> Timeouts {
        Timeouts::minutes(30, 5, 30, 30)
    }

    async fn create(&self, client: &ArmClient, data: &mut ResourceData) -> Result<()> {
        let id = FlexibleServerConfigurationId::new(
            client.subscription_id(),
            data.require_str("resource_group_name")?,
            data.require_str("server_name")?,
            data.require_str("name")?,
        );

        info!(id = %id.id(), "setting flexible server configuration");
        self.set_value(client, &id, data.get_string("value"), USER_OVERRIDE)
            .await
            .map_err(|e| e.context(format!("creating {}", id)))?;

        data.set_id(id.id());
        self.read(client, data).await
    }

    async fn read(&self, client: &ArmClient, data: &mut ResourceData) -> Result<()> {
        let id = FlexibleServerConfigurationId::parse(data.require_id()?)?;
        let Some(configuration) = client
            .get_optional::<Configuration>(&id.id(), API_VERSION)
            .await
            .map_err(|e| e.context(format!("retrieving {}", id)))?
        else {
            info!(id = %id.id(), "configuration does not exist, removing from state");
            data.set_gone();
            return Ok(());
        };

        data.set("name", id.configuration_name.clone());
        data.set("resource_group_name", id.resource_group_name.clone());
        data.set("server_name", id.flexible_server_name.clone());
        data.set("value", configuration.properties.value);
        Ok(())
    }

    async fn update(&self, client: &ArmClient, data: &mut ResourceData) -> Result<()> {
        let id = FlexibleServerConfigurationId::parse(data.require_id()?)?;
        info!(id = %id.id(), "updating flexible server configuration");
        self.set_value(client, &id, data.get_string("value"), USER_OVERRIDE)
            .await
            .map_err(|e| e.context(format!("updating {}", id)))?;
        self.read(client, data).await
    }

    async fn delete(&self, client: &ArmClient, data: &mut ResourceData) -> Result<()> {
        let id = FlexibleServerConfigurationId::parse(data.require_id()?)?;
        let current: Configuration = client
            .get(&id.id(), API_VERSION)
            .await
            .map_err(|e| e.context(format!("retrieving {}", id)))?;
        let default_value = current.properties.default_value.ok_or_else(|| {
            ProviderError::Azure(format!("resetting {}: the default value was not returned", id))
        })?;

        info!(id = %id.id(), "resetting flexible server configuration to its default");
        self.set_value(client, &id, default_value, SYSTEM_DEFAULT)
            .await
            .map_err(|e| e.context(format!("resetting {}", id)))
    }
}
