//! `azurerm_mysql_active_directory_administrator`.

use async_trait::async_trait;
use tracing::info;

use crate::arm::ArmClient;
use crate::error::Result;
use crate::ids::{IdKind, ServerAzureADAdministratorId};
use crate::models::single::{Administrator, AdministratorProperties, API_VERSION};
use crate::schema::{Attribute, Constraint, NameRule, Schema};

use super::common;
use super::{Resource, ResourceData};

const TYPE_NAME: &str = "azurerm_mysql_active_directory_administrator";

/// `azurerm_mysql_active_directory_administrator`: the Entra ID administrator of a single server.
pub struct AadAdministrator;

impl AadAdministrator {
    async fn put(&self, client: &ArmClient, id: &ServerAzureADAdministratorId, data: &ResourceData) -> Result<()> {
        let administrator = Administrator {
            id: None,
            properties: AdministratorProperties {
                administrator_type: Some("ActiveDirectory".to_string()),
                login: data.get_str("login").map(str::to_string),
                sid: data.get_str("object_id").map(str::to_string),
                tenant_id: data.get_str("tenant_id").map(str::to_string),
            },
        };
        client.put_then_poll(&id.id(), API_VERSION, &administrator).await
    }
}

#[async_trait]
impl Resource for AadAdministrator {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_attribute("id", common::id_attribute())
            .with_attribute("server_name", common::name_attribute(NameRule::ServerName))
            .with_attribute("resource_group_name", common::resource_group_name_attribute())
            .with_attribute("login", Attribute::required_string().with_constraint(Constraint::NotEmpty))
            .with_attribute("object_id", Attribute::required_string().with_constraint(Constraint::Uuid))
            .with_attribute("tenant_id", Attribute::required_string().with_constraint(Constraint::Uuid))
    }

    fn id_kind(&self) -> IdKind {
        IdKind::ServerAzureADAdministrator
    }

    async fn create(&self, client: &ArmClient, data: &mut ResourceData) -> Result<()> {
        let id = ServerAzureADAdministratorId::new(
            client.subscription_id(),
            data.require_str("resource_group_name")?,
            data.require_str("server_name")?,
        );
        common::ensure_absent(client, TYPE_NAME, &id.id(), API_VERSION).await?;

        info!(id = %id.id(), "creating server administrator");
        self.put(client, &id, data)
            .await
            .map_err(|e| e.context(format!("creating {}", id)))?;

        data.set_id(id.id());
        self.read(client, data).await
    }

    async fn read(&self, client: &ArmClient, data: &mut ResourceData) -> Result<()> {
        let id = ServerAzureADAdministratorId::parse(data.require_id()?)?;
        let Some(administrator) = client
            .get_optional::<Administrator>(&id.id(), API_VERSION)
            .await
            .map_err(|e| e.context(format!("retrieving {}", id)))?
        else {
            info!(id = %id.id(), "administrator does not exist, removing from state");
            data.set_gone();
            return Ok(());
        };

        data.set("server_name", id.server_name.clone());
        data.set("resource_group_name", id.resource_group_name.clone());
        data.set("login", administrator.properties.login);
        data.set("object_id", administrator.properties.sid);
        data.set("tenant_id", administrator.properties.tenant_id);
        Ok(())
    }

    async fn update(&self, client: &ArmClient, data: &mut ResourceData) -> Result<()> {
        let id = ServerAzureADAdministratorId::parse(data.require_id()?)?;
        info!(id = %id.id(), "updating server administrator");
        self.put(client, &id, data)
            .await
            .map_err(|e| e.context(format!("updating {}", id)))?;
        self.read(client, data).await
    }

    async fn delete(&self, client: &ArmClient, data: &mut ResourceData) -> Result<()> {
        let id = ServerAzureADAdministratorId::parse(data.require_id()?)?;
        info!(id = %id.id(), "deleting server administrator");
        client
            .delete_then_poll(&id.id(), API_VERSION)
            .await
            .map_err(|e| e.context(format!("deleting {}", id)))
    }
}
