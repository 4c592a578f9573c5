use async_trait::async_trait;
use serde_json::Value;

use crate::arm::ArmClient;
use crate::error::{ProviderError, Result};
use crate::ids::ServerId;
use crate::resources::server::{self, Server};
use crate::resources::Resource;
use crate::schema::Schema;
use crate::validation::lookup;

use super::{computed_schema, read_into, DataSource};

/// `azurerm_mysql_server` data source: looks up an existing single server.
pub struct ServerDataSource;

#[async_trait]
impl DataSource for ServerDataSource {
    fn type_name(&self) -> &'static str {
        "azurerm_mysql_server"
    }

    fn schema(&self) -> Schema {
        computed_schema(
            server::schema(),
            &["name", "resource_group_name"],
            &[
                "administrator_login_password",
                "create_mode",
                "creation_source_server_id",
                "restore_point_in_time",
            ],
        )
    }

    async fn read(&self, client: &ArmClient, config: &Value) -> Result<Value> {
        let field = |name: &str| lookup(config, name).and_then(Value::as_str).unwrap_or_default();
        let id = ServerId::new(client.subscription_id(), field("resource_group_name"), field("name"));

        let schema = self.schema();
        read_into(id.id(), &schema, |mut data| async move {
            Server.read(client, &mut data).await?;
            Ok::<_, ProviderError>(data)
        })
        .await
    }
}
