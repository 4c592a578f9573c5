//! `azurerm_mysql_server_key`.
//!
//! The key's ARM name is derived from the Key Vault key, so rotating to a
//! new key version also changes the resource ID.

use async_trait::async_trait;
use tracing::info;

use crate::arm::ArmClient;
use crate::error::{ProviderError, Result};
use crate::ids::{IdKind, KeyVaultKeyId, ServerId, ServerKeyId};
use crate::models::single::{ServerKey as ServerKeyModel, ServerKeyProperties, KEYS_API_VERSION};
use crate::schema::{Attribute, Constraint, Schema};

use super::common;
use super::{Resource, ResourceData, Timeouts};

const TYPE_NAME: &str = "azurerm_mysql_server_key";

/// `azurerm_mysql_server_key`: the customer-managed Key Vault key of a single server.
pub struct ServerKey;

/// `{vault}_{key}_{version}`, the name ARM expects for a server key.
fn key_name(key: &KeyVaultKeyId) -> Result<String> {
    let version = key.version.as_deref().ok_or_else(|| {
        ProviderError::Validation(format!("{} must include a key version", key))
    })?;
    Ok(format!("{}_{}_{}", key.vault_name(), key.name, version))
}

fn key_id(server: &ServerId, key: &KeyVaultKeyId) -> Result<ServerKeyId> {
    Ok(ServerKeyId::new(
        &server.subscription_id,
        &server.resource_group_name,
        &server.server_name,
        key_name(key)?,
    ))
}

impl ServerKey {
    async fn put(&self, client: &ArmClient, data: &ResourceData) -> Result<ServerKeyId> {
        let server = ServerId::parse(data.require_str("server_id")?)?;
        let key = KeyVaultKeyId::parse(data.require_str("key_vault_key_id")?)?;
        let id = key_id(&server, &key)?;

        let body = ServerKeyModel {
            id: None,
            properties: ServerKeyProperties {
                server_key_type: Some("AzureKeyVault".to_string()),
                uri: Some(key.id()),
            },
        };
        info!(id = %id.id(), "setting server key");
        client
            .put_then_poll(&id.id(), KEYS_API_VERSION, &body)
            .await
            .map_err(|e| e.context(format!("setting {}", id)))?;
        Ok(id)
    }
}

#[async_trait]
impl Resource for ServerKey {
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
                    .with_constraint(Constraint::ResourceId(IdKind::Server)),
            )
            .with_attribute(
                "key_vault_key_id",
                Attribute::required_string().with_constraint(Constraint::KeyVaultKeyId),
            )
    }

    fn id_kind(&self) -> IdKind {
        IdKind::ServerKey
    }

    fn timeouts(&self) -> Timeouts {
        Timeouts::minutes(60, 5, 60, 30)
    }

    async fn create(&self, client: &ArmClient, data: &mut ResourceData) -> Result<()> {
        let server = ServerId::parse(data.require_str("server_id")?)?;
        let key = KeyVaultKeyId::parse(data.require_str("key_vault_key_id")?)?;
        let id = key_id(&server, &key)?;
        common::ensure_absent(client, TYPE_NAME, &id.id(), KEYS_API_VERSION).await?;

        let id = self.put(client, data).await?;
        data.set_id(id.id());
        self.read(client, data).await
    }

    async fn read(&self, client: &ArmClient, data: &mut ResourceData) -> Result<()> {
        let id = ServerKeyId::parse(data.require_id()?)?;
        let Some(key) = client
            .get_optional::<ServerKeyModel>(&id.id(), KEYS_API_VERSION)
            .await
            .map_err(|e| e.context(format!("retrieving {}", id)))?
        else {
            info!(id = %id.id(), "server key does not exist, removing from state");
            data.set_gone();
            return Ok(());
        };

        let server = ServerId::new(&id.subscription_id, &id.resource_group_name, &id.server_name);
        data.set("server_id", server.id());
        data.set("key_vault_key_id", key.properties.uri);
        Ok(())
    }

    async fn update(&self, client: &ArmClient, data: &mut ResourceData) -> Result<()> {
        let id = self.put(client, data).await?;
        data.set_id(id.id());
        self.read(client, data).await
    }

    async fn delete(&self, client: &ArmClient, data: &mut ResourceData) -> Result<()> {
        let id = ServerKeyId::parse(data.require_id()?)?;
        info!(id = %id.id(), "deleting server key");
        client
            .delete_then_poll(&id.id(), KEYS_API_VERSION)
            .await
            .map_err(|e| e.context(format!("deleting {}", id)))
    }
}
