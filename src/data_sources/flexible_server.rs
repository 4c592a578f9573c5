use async_trait::async_trait;
use serde_json::Value;

use crate::arm::ArmClient;
use crate::error::{ProviderError, Result};
use crate::ids::FlexibleServerId;
use crate::resources::flexible_server::{self, FlexibleServer};
use crate::resources::Resource;
use crate::schema::Schema;
use crate::validation::lookup;

use super::{computed_schema, read_into, DataSource};

/// `azurerm_mysql_flexible_server` data source: looks up an existing flexible server.
pub struct FlexibleServerDataSource;

#[async_trait]
impl DataSource for FlexibleServerDataSource {
    fn type_name(&self) -> &'static str {
        "azurerm_mysql_flexible_server"
    }

    fn schema(&self) -> Schema {
        computed_schema(
            flexible_server::schema(),
            &["name", "resource_group_name"],
            &[
                "administrator_password",
                "administrator_password_wo",
                "administrator_password_wo_version",
                "create_mode",
                "customer_managed_key",
                "point_in_time_restore_time_in_utc",
                "source_server_id",
            ],
        )
    }

    async fn read(&self, client: &ArmClient, config: &Value) -> Result<Value> {
        let field = |name: &str| lookup(config, name).and_then(Value::as_str).unwrap_or_default();
        let id = FlexibleServerId::new(client.subscription_id(), field("resource_group_name"), field("name"));

        let schema = self.schema();
        read_into(id.id(), &schema, |mut data| async move {
            FlexibleServer.read(client, &mut data).await?;
            Ok::<_, ProviderError>(data)
        })
        .await
    }
}
