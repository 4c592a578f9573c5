//! `azurerm_mysql_virtual_network_rule`.

use async_trait::async_trait;
use tracing::info;

use crate::arm::ArmClient;
use crate::error::{ProviderError, Result};
use crate::ids::{IdKind, SubnetId, VirtualNetworkRuleId};
use crate::models::single::{VirtualNetworkRule as VirtualNetworkRuleModel, VirtualNetworkRuleProperties, API_VERSION};
use crate::schema::{Attribute, Constraint, NameRule, Schema};

use super::common;
use super::{Resource, ResourceData};

const TYPE_NAME: &str = "azurerm_mysql_virtual_network_rule";

const PENDING_STATES: [&str; 3] = ["Initializing", "InProgress", "Unknown"];

/// `azurerm_mysql_virtual_network_rule`: a subnet allowed to reach a single server.
pub struct VirtualNetworkRule;

impl VirtualNetworkRule {
    async fn put_and_wait(&self, client: &ArmClient, id: &VirtualNetworkRuleId, data: &ResourceData) -> Result<()> {
        let subnet = SubnetId::parse(data.require_str("subnet_id")?)?;
        let rule = VirtualNetworkRuleModel {
            id: None,
            properties: VirtualNetworkRuleProperties {
                virtual_network_subnet_id: subnet.id(),
                ignore_missing_vnet_service_endpoint: Some(false),
                state: None,
            },
        };
        let resource_id = id.id();
        client.put_then_poll(&resource_id, API_VERSION, &rule).await?;

        let lookup_id = resource_id.as_str();
        common::wait_for_state(client.poll_interval(), &id.to_string(), &PENDING_STATES, "Ready", move || async move {
            let rule: VirtualNetworkRuleModel = client.get(lookup_id, API_VERSION).await?;
            Ok::<_, ProviderError>(rule.properties.state.unwrap_or_else(|| "Unknown".to_string()))
        })
        .await
    }
}

#[async_trait]
impl Resource for VirtualNetworkRule {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_attribute("id", common::id_attribute())
            .with_attribute("name", common::name_attribute(NameRule::VirtualNetworkRuleName))
            .with_attribute("resource_group_name", common::resource_group_name_attribute())
            .with_attribute("server_name", common::name_attribute(NameRule::ServerName))
            .with_attribute(
                "subnet_id",
                Attribute::required_string().with_constraint(Constraint::ResourceId(IdKind::Subnet)),
            )
    }

    fn id_kind(&self) -> IdKind {
        IdKind::VirtualNetworkRule
    }

    async fn create(&self, client: &ArmClient, data: &mut ResourceData) -> Result<()> {
        let id = VirtualNetworkRuleId::new(
            client.subscription_id(),
            data.require_str("resource_group_name")?,
            data.require_str("server_name")?,
            data.require_str("name")?,
        );
        common::ensure_absent(client, TYPE_NAME, &id.id(), API_VERSION).await?;

        info!(id = %id.id(), "creating virtual network rule");
        self.put_and_wait(client, &id, data)
            .await
            .map_err(|e| e.context(format!("creating {}", id)))?;

        data.set_id(id.id());
        self.read(client, data).await
    }

    async fn read(&self, client: &ArmClient, data: &mut ResourceData) -> Result<()> {
        let id = VirtualNetworkRuleId::parse(data.require_id()?)?;
        let Some(rule) = client
            .get_optional::<VirtualNetworkRuleModel>(&id.id(), API_VERSION)
            .await
            .map_err(|e| e.context(format!("retrieving {}", id)))?
        else {
            info!(id = %id.id(), "virtual network rule does not exist, removing from state");
            data.set_gone();
            return Ok(());
        };

        data.set("name", id.virtual_network_rule_name.clone());
        data.set("resource_group_name", id.resource_group_name.clone());
        data.set("server_name", id.server_name.clone());
        let subnet = SubnetId::parse_insensitively(&rule.properties.virtual_network_subnet_id)?;
        data.set("subnet_id", subnet.id());
        Ok(())
    }

    async fn update(&self, client: &ArmClient, data: &mut ResourceData) -> Result<()> {
        let id = VirtualNetworkRuleId::parse(data.require_id()?)?;
        info!(id = %id.id(), "updating virtual network rule");
        self.put_and_wait(client, &id, data)
            .await
            .map_err(|e| e.context(format!("updating {}", id)))?;
        self.read(client, data).await
    }

    async fn delete(&self, client: &ArmClient, data: &mut ResourceData) -> Result<()> {
        let id = VirtualNetworkRuleId::parse(data.require_id()?)?;
        info!(id = %id.id(), "deleting virtual network rule");
        client
            .delete_then_poll(&id.id(), API_VERSION)
            .await
            .map_err(|e| e.context(format!("deleting {}", id)))
    }
}
