//! `azurerm_mysql_flexible_server_firewall_rule`.

use async_trait::async_trait;
use tracing::info;

use crate::arm::ArmClient;
use crate::error::Result;
use crate::ids::{FlexibleServerFirewallRuleId, IdKind};
use crate::models::flexible::{FirewallRule, FirewallRuleProperties, API_VERSION};
use crate::schema::{Attribute, Constraint, NameRule, Schema};

use super::common;
use super::{Resource, ResourceData, Timeouts};

const TYPE_NAME: &str = "azurerm_mysql_flexible_server_firewall_rule";

/// `azurerm_mysql_flexible_server_firewall_rule`: an IPv4 range allowed to reach a flexible server.
pub struct FlexibleFirewallRule;

impl FlexibleFirewallRule {
    async fn put(&self, client: &ArmClient, id: &FlexibleServerFirewallRuleId, data: &ResourceData) -> Result<()> {
        let rule = FirewallRule {
            id: None,
            properties: FirewallRuleProperties {
                start_ip_address: data.get_string("start_ip_address"),
                end_ip_address: data.get_string("end_ip_address"),
            },
        };
        client.put_then_poll(&id.id(), API_VERSION, &rule).await
    }
}

#[async_trait]
impl Resource for FlexibleFirewallRule {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_attribute("id", common::id_attribute())
            .with_attribute("name", common::name_attribute(NameRule::FirewallRuleName))
            .with_attribute("resource_group_name", common::resource_group_name_attribute())
            .with_attribute("server_name", common::name_attribute(NameRule::ServerName))
            .with_attribute(
                "start_ip_address",
                Attribute::required_string().with_constraint(Constraint::Ipv4),
            )
            .with_attribute(
                "end_ip_address",
                Attribute::required_string().with_constraint(Constraint::Ipv4),
            )
    }

    fn id_kind(&self) -> IdKind {
        IdKind::FlexibleServerFirewallRule
    }

    fn timeouts(&self) -> Timeouts {
        Timeouts::minutes(60, 5, 60, 60)
    }

    async fn create(&self, client: &ArmClient, data: &mut ResourceData) -> Result<()> {
        let id = FlexibleServerFirewallRuleId::new(
            client.subscription_id(),
            data.require_str("resource_group_name")?,
            data.require_str("server_name")?,
            data.require_str("name")?,
        );
        common::ensure_absent(client, TYPE_NAME, &id.id(), API_VERSION).await?;

        info!(id = %id.id(), "creating flexible server firewall rule");
        self.put(client, &id, data)
            .await
            .map_err(|e| e.context(format!("creating {}", id)))?;

        data.set_id(id.id());
        self.read(client, data).await
    }

    async fn read(&self, client: &ArmClient, data: &mut ResourceData) -> Result<()> {
        let id = FlexibleServerFirewallRuleId::parse(data.require_id()?)?;
        let Some(rule) = client
            .get_optional::<FirewallRule>(&id.id(), API_VERSION)
            .await
            .map_err(|e| e.context(format!("retrieving {}", id)))?
        else {
            info!(id = %id.id(), "firewall rule does not exist, removing from state");
            data.set_gone();
            return Ok(());
        };

        data.set("name", id.firewall_rule_name.clone());
        data.set("resource_group_name", id.resource_group_name.clone());
        data.set("server_name", id.flexible_server_name.clone());
        data.set("start_ip_address", rule.properties.start_ip_address);
        data.set("end_ip_address", rule.properties.end_ip_address);
        Ok(())
    }

    async fn update(&self, client: &ArmClient, data: &mut ResourceData) -> Result<()> {
        let id = FlexibleServerFirewallRuleId::parse(data.require_id()?)?;
        info!(id = %id.id(), "updating flexible server firewall rule");
        self.put(client, &id, data)
            .await
            .map_err(|e| e.context(format!("updating {}", id)))?;
        self.read(client, data).await
    }

    async fn delete(&self, client: &ArmClient, data: &mut ResourceData) -> Result<()> {
        let id = FlexibleServerFirewallRuleId::parse(data.require_id()?)?;
        info!(id = %id.id(), "deleting flexible server firewall rule");
        client
            .delete_then_poll(&id.id(), API_VERSION)
            .await
            .map_err(|e| e.context(format!("deleting {}", id)))
    }
}
