//! `azurerm_mysql_flexible_server_active_directory_administrator`.

use async_trait::async_trait;
use tracing::info;

use crate::arm::ArmClient;
use crate::error::Result;
use crate::ids::{FlexibleServerAzureADAdministratorId, FlexibleServerId, IdKind, UserAssignedIdentityId};
use crate::models::flexible::{Administrator, AdministratorProperties, API_VERSION};
use crate::schema::{Attribute, Constraint, Schema};

use super::common;
use super::{Resource, ResourceData, Timeouts};

const TYPE_NAME: &str = "azurerm_mysql_flexible_server_active_directory_administrator";

const ACTIVE_DIRECTORY: &str = "ActiveDirectory";

/// `azurerm_mysql_flexible_server_active_directory_administrator`: the Entra ID administrator of a flexible server.
pub struct FlexibleAadAdministrator;

impl FlexibleAadAdministrator {
    async fn put(
        &self,
        client: &ArmClient,
        id: &FlexibleServerAzureADAdministratorId,
        data: &ResourceData,
    ) -> Result<()> {
        let identity = UserAssignedIdentityId::parse(data.require_str("identity_id")?)?;
        let administrator = Administrator {
            id: None,
            properties: AdministratorProperties {
                administrator_type: Some(ACTIVE_DIRECTORY.to_string()),
                identity_resource_id: Some(identity.id()),
                login: data.get_str("login").map(str::to_string),
                sid: data.get_str("object_id").map(str::to_string),
                tenant_id: data.get_str("tenant_id").map(str::to_string),
            },
        };
        client.put_then_poll(&id.id(), API_VERSION, &administrator).await
    }
}

#[async_trait]
impl Resource for FlexibleAadAdministrator {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_attribute("id", common::id_attribute())
            .with_attribute(
                "server_id",
                Attribute::required_string()
                    .with_force_new()
                    .with_constraint(Constraint::ResourceId(IdKind::FlexibleServer)),
            )
            .with_attribute(
                "identity_id",
                Attribute::required_string().with_constraint(Constraint::ResourceId(IdKind::UserAssignedIdentity)),
            )
            .with_attribute("login", Attribute::required_string().with_constraint(Constraint::NotEmpty))
            .with_attribute("object_id", Attribute::required_string().with_constraint(Constraint::Uuid))
            .with_attribute("tenant_id", Attribute::required_string().with_constraint(Constraint::Uuid))
    }

    fn id_kind(&self) -> IdKind {
        IdKind::FlexibleServerAzureADAdministrator
    }

    fn timeouts(&self) -> Timeouts {
        Timeouts::minutes(30, 5, 30, 30)
    }

    async fn create(&self, client: &ArmClient, data: &mut ResourceData) -> Result<()> {
        let server = FlexibleServerId::parse(data.require_str("server_id")?)?;
        let id = FlexibleServerAzureADAdministratorId::new(
            server.subscription_id,
            server.resource_group_name,
            server.flexible_server_name,
        );
        common::ensure_absent(client, TYPE_NAME, &id.id(), API_VERSION).await?;

        info!(id = %id.id(), "creating flexible server administrator");
        self.put(client, &id, data)
            .await
            .map_err(|e| e.context(format!("creating {}", id)))?;

        data.set_id(id.id());
        self.read(client, data).await
    }

    async fn read(&self, client: &ArmClient, data: &mut ResourceData) -> Result<()> {
        let id = FlexibleServerAzureADAdministratorId::parse(data.require_id()?)?;
        let Some(administrator) = client
            .get_optional::<Administrator>(&id.id(), API_VERSION)
            .await
            .map_err(|e| e.context(format!("retrieving {}", id)))?
        else {
            info!(id = %id.id(), "administrator does not exist, removing from state");
            data.set_gone();
            return Ok(());
        };

        let server = FlexibleServerId::new(&id.subscription_id, &id.resource_group_name, &id.flexible_server_name);
        data.set("server_id", server.id());

        let props = administrator.properties;
        let identity = match props.identity_resource_id.as_deref() {
            Some(raw) => Some(UserAssignedIdentityId::parse_insensitively(raw)?.id()),
            None => None,
        };
        data.set("identity_id", identity);
        data.set("login", props.login);
        data.set("object_id", props.sid);
        data.set("tenant_id", props.tenant_id);
        Ok(())
    }

    async fn update(&self, client: &ArmClient, data: &mut ResourceData) -> Result<()> {
        let id = FlexibleServerAzureADAdministratorId::parse(data.require_id()?)?;
        info!(id = %id.id(), "updating flexible server administrator");
        self.put(client, &id, data)
            .await
            .map_err(|e| e.context(format!("updating {}", id)))?;
        self.read(client, data).await
    }

    async fn delete(&self, client: &ArmClient, data: &mut ResourceData) -> Result<()> {
        let id = FlexibleServerAzureADAdministratorId::parse(data.require_id()?)?;
        info!(id = %id.id(), "deleting flexible server administrator");
        client
            .delete_then_poll(&id.id(), API_VERSION)
            .await
            .map_err(|e| e.context(format!("deleting {}", id)))
    }
}
