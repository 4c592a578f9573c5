//! `azurerm_mysql_configuration`.

use async_trait::async_trait;
use tracing::info;

use crate::arm::ArmClient;
use crate::error::{ProviderError, Result};
use crate::ids::{ConfigurationId, IdKind};
use crate::models::single::{Configuration as ConfigurationModel, ConfigurationProperties, API_VERSION};
use crate::schema::{Attribute, NameRule, Schema};

use super::common;
use super::{Resource, ResourceData};

const TYPE_NAME: &str = "azurerm_mysql_configuration";

/// `azurerm_mysql_configuration`: one single-server parameter, reset to its default on delete.
pub struct Configuration;

async fn put_value(client: &ArmClient, id: &ConfigurationId, value: String) -> Result<()> {
    let configuration = ConfigurationModel {
        id: None,
        properties: ConfigurationProperties {
            value: Some(value),
            ..Default::default()
        },
    };
    client.put_then_poll(&id.id(), API_VERSION, &configuration).await
}

#[async_trait]
impl Resource for Configuration {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_attribute("id", common::id_attribute())
            .with_attribute("name", common::name_attribute(NameRule::ConfigurationName))
            .with_attribute("resource_group_name", common::resource_group_name_attribute())
            .with_attribute("server_name", common::name_attribute(NameRule::ServerName))
            .with_attribute("value", Attribute::required_string().with_force_new())
    }

    fn id_kind(&self) -> IdKind {
        IdKind::Configuration
    }

    async fn create(&self, client: &ArmClient, data: &mut ResourceData) -> Result<()> {
        let id = ConfigurationId::new(
            client.subscription_id(),
            data.require_str("resource_group_name")?,
            data.require_str("server_name")?,
            data.require_str("name")?,
        );

        info!(id = %id.id(), "setting configuration");
        put_value(client, &id, data.get_string("value"))
            .await
            .map_err(|e| e.context(format!("creating {}", id)))?;

        data.set_id(id.id());
        self.read(client, data).await
    }

    async fn read(&self, client: &ArmClient, data: &mut ResourceData) -> Result<()> {
        let id = ConfigurationId::parse(data.require_id()?)?;
        let Some(configuration) = client
            .get_optional::<ConfigurationModel>(&id.id(), API_VERSION)
            .await
            .map_err(|e| e.context(format!("retrieving {}", id)))?
        else {
            info!(id = %id.id(), "configuration does not exist, removing from state");
            data.set_gone();
            return Ok(());
        };

        data.set("name", id.configuration_name.clone());
        data.set("resource_group_name", id.resource_group_name.clone());
        data.set("server_name", id.server_name.clone());
        data.set("value", configuration.properties.value);
        Ok(())
    }

    async fn delete(&self, client: &ArmClient, data: &mut ResourceData) -> Result<()> {
        let id = ConfigurationId::parse(data.require_id()?)?;
        let current: ConfigurationModel = client
            .get(&id.id(), API_VERSION)
            .await
            .map_err(|e| e.context(format!("retrieving {}", id)))?;
        let default_value = current.properties.default_value.ok_or_else(|| {
            ProviderError::Azure(format!("resetting {}: the default value was not returned", id))
        })?;

        info!(id = %id.id(), "resetting configuration to its default");
        put_value(client, &id, default_value)
            .await
            .map_err(|e| e.context(format!("resetting {}", id)))
    }
}
