//! `azurerm_mysql_flexible_database`.

use async_trait::async_trait;
use tracing::info;

use crate::arm::ArmClient;
use crate::error::Result;
use crate::ids::{FlexibleServerDatabaseId, IdKind};
use crate::models::flexible::{Database, DatabaseProperties, API_VERSION};
use crate::schema::{Attribute, Constraint, NameRule, Schema};

use super::common;
use super::{Resource, ResourceData, Timeouts};

const TYPE_NAME: &str = "azurerm_mysql_flexible_database";

/// `azurerm_mysql_flexible_database`: a database on a flexible server.
pub struct FlexibleDatabase;

#[async_trait]
impl Resource for FlexibleDatabase {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_attribute("id", common::id_attribute())
            .with_attribute("name", common::name_attribute(NameRule::DatabaseName))
            .with_attribute("resource_group_name", common::resource_group_name_attribute())
            .with_attribute("server_name", common::name_attribute(NameRule::ServerName))
            .with_attribute(
                "charset",
                Attribute::required_string()
                    .with_force_new()
                    .with_constraint(Constraint::NotEmpty),
            )
            .with_attribute(
                "collation",
                Attribute::required_string()
                    .with_force_new()
                    .with_constraint(Constraint::NotEmpty),
            )
    }

    fn id_kind(&self) -> IdKind {
        IdKind::FlexibleServerDatabase
    }

    fn timeouts(&self) -> Timeouts {
        Timeouts::minutes(60, 5, 60, 60)
    }

    async fn create(&self, client: &ArmClient, data: &mut ResourceData) -> Result<()> {
        let id = FlexibleServerDatabaseId::new(
            client.subscription_id(),
            data.require_str("resource_group_name")?,
            data.require_str("server_name")?,
            data.require_str("name")?,
        );
        let resource_id = id.id();
        common::ensure_absent(client, TYPE_NAME, &resource_id, API_VERSION).await?;

        let database = Database {
            id: None,
            properties: DatabaseProperties {
                charset: data.get_str("charset").map(str::to_string),
                collation: data.get_str("collation").map(str::to_string),
            },
        };

        info!(id = %resource_id, "creating flexible server database");
        client
            .put_then_poll(&resource_id, API_VERSION, &database)
            .await
            .map_err(|e| e.context(format!("creating {}", id)))?;

        data.set_id(resource_id);
        self.read(client, data).await
    }

    async fn read(&self, client: &ArmClient, data: &mut ResourceData) -> Result<()> {
        let id = FlexibleServerDatabaseId::parse(data.require_id()?)?;
        let Some(database) = client
            .get_optional::<Database>(&id.id(), API_VERSION)
            .await
            .map_err(|e| e.context(format!("retrieving {}", id)))?
        else {
            info!(id = %id.id(), "database does not exist, removing from state");
            data.set_gone();
            return Ok(());
        };

        data.set("name", id.database_name.clone());
        data.set("resource_group_name", id.resource_group_name.clone());
        data.set("server_name", id.flexible_server_name.clone());
        data.set("charset", database.properties.charset);
        data.set("collation", database.properties.collation);
        Ok(())
    }

    async fn delete(&self, client: &ArmClient, data: &mut ResourceData) -> Result<()> {
        let id = FlexibleServerDatabaseId::parse(data.require_id()?)?;
        info!(id = %id.id(), "deleting flexible server database");
        client
            .delete_then_poll(&id.id(), API_VERSION)
            .await
            .map_err(|e| e.context(format!("deleting {}", id)))
    }
}
