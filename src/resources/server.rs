//! `azurerm_mysql_server`, the single server.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::arm::ArmClient;
use crate::error::{ProviderError, Result};
use crate::ids::{IdKind, ServerId};
use crate::models::single::{
    Identity, Server as ServerModel, ServerForCreate, ServerPropertiesForCreate, ServerUpdateParameters,
    ServerUpdateProperties, Sku, StorageProfile, API_VERSION,
};
use crate::schema::{Attribute, Block, Constraint, NameRule, NestedBlock, Schema};
use crate::types::PlanResult;
use crate::validation::lookup;

use super::common::{self, enabled_status, is_enabled};
use super::{Resource, ResourceData, Timeouts};

const TYPE_NAME: &str = "azurerm_mysql_server";

const CREATE_MODE_DEFAULT: &str = "Default";
const TLS_ENFORCEMENT_DISABLED: &str = "TLSEnforcementDisabled";
const STATE_READY: &str = "Ready";

/// `azurerm_mysql_server`: a MySQL single server.
pub struct Server;

pub(crate) fn schema() -> Schema {
    Schema::v0()
        .with_attribute("id", common::id_attribute())
        .with_attribute("name", common::name_attribute(NameRule::ServerName))
        .with_attribute("resource_group_name", common::resource_group_name_attribute())
        .with_attribute("location", common::location_attribute())
        .with_attribute(
            "sku_name",
            Attribute::required_string().with_constraint(Constraint::Rule(NameRule::SingleServerSkuName)),
        )
        .with_attribute(
            "version",
            Attribute::required_string()
                .with_force_new()
                .with_constraint(Constraint::OneOf(vec!["5.6", "5.7", "8.0"])),
        )
        .with_attribute(
            "administrator_login",
            Attribute::optional_computed_string()
                .with_force_new()
                .with_constraint(Constraint::NotEmpty),
        )
        .with_attribute("administrator_login_password", Attribute::optional_string().sensitive())
        .with_attribute("auto_grow_enabled", Attribute::optional_bool().with_default(json!(true)))
        .with_attribute(
            "backup_retention_days",
            Attribute::optional_computed_int64().with_constraint(Constraint::IntBetween(7, 35)),
        )
        .with_attribute(
            "create_mode",
            Attribute::optional_string()
                .with_default(json!(CREATE_MODE_DEFAULT))
                .with_constraint(Constraint::OneOf(vec![
                    CREATE_MODE_DEFAULT,
                    "GeoRestore",
                    "PointInTimeRestore",
                    "Replica",
                ])),
        )
        .with_attribute(
            "creation_source_server_id",
            Attribute::optional_string()
                .with_force_new()
                .with_constraint(Constraint::ResourceId(IdKind::Server)),
        )
        .with_attribute("geo_redundant_backup_enabled", Attribute::optional_computed_bool())
        .with_block(
            "identity",
            NestedBlock::list(
                Block::new()
                    .with_attribute(
                        "type",
                        Attribute::required_string().with_constraint(Constraint::OneOf(vec!["SystemAssigned"])),
                    )
                    .with_attribute("principal_id", Attribute::computed_string())
                    .with_attribute("tenant_id", Attribute::computed_string()),
            )
            .with_max_items(1),
        )
        .with_attribute(
            "infrastructure_encryption_enabled",
            Attribute::optional_bool().with_force_new().with_default(json!(false)),
        )
        .with_attribute("public_network_access_enabled", Attribute::optional_bool().with_default(json!(true)))
        .with_attribute(
            "restore_point_in_time",
            Attribute::optional_string()
                .with_force_new()
                .with_constraint(Constraint::Rfc3339),
        )
        .with_attribute("ssl_enforcement_enabled", Attribute::required_bool())
        .with_attribute(
            "ssl_minimal_tls_version_enforced",
            Attribute::optional_string()
                .with_default(json!("TLS1_2"))
                .with_constraint(Constraint::OneOf(vec![TLS_ENFORCEMENT_DISABLED, "TLS1_0", "TLS1_1", "TLS1_2"])),
        )
        .with_attribute(
            "storage_mb",
            Attribute::optional_computed_int64().with_constraint(Constraint::Rule(NameRule::StorageMb)),
        )
        .with_attribute("fqdn", Attribute::computed_string())
        .with_attribute("tags", common::tags_attribute())
}

#[async_trait]
impl Resource for Server {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> Schema {
        schema()
    }

    fn id_kind(&self) -> IdKind {
        IdKind::Server
    }

    fn timeouts(&self) -> Timeouts {
        Timeouts::minutes(60, 5, 60, 60)
    }

    fn customize_plan(&self, plan: &mut PlanResult, prior: Option<&Value>) -> Result<()> {
        check_tls(&plan.planned_state)?;

        let Some(prior) = prior else {
            return Ok(());
        };
        let old = lookup(prior, "sku_name").and_then(Value::as_str).unwrap_or_default();
        let new = lookup(&plan.planned_state, "sku_name").and_then(Value::as_str).unwrap_or_default();
        // Basic servers can't be scaled to or from other tiers in place
        if !old.is_empty() && old != new && (is_basic(old) != is_basic(new)) {
            debug!(old, new, "sku tier moved to or from Basic, replacing server");
            plan.force_replace("sku_name");
        }
        Ok(())
    }

    async fn create(&self, client: &ArmClient, data: &mut ResourceData) -> Result<()> {
        let id = ServerId::new(
            client.subscription_id(),
            data.require_str("resource_group_name")?,
            data.require_str("name")?,
        );
        let resource_id = id.id();
        common::ensure_absent(client, TYPE_NAME, &resource_id, API_VERSION).await?;

        check_tls(data.state())?;
        let create_mode = data.get_str("create_mode").unwrap_or(CREATE_MODE_DEFAULT).to_string();
        check_create_mode(data, &create_mode)?;

        let sku = expand_sku(&data.get_string("sku_name"))?;
        let server = ServerForCreate {
            location: common::normalize_location(data.require_str("location")?),
            identity: expand_identity(data),
            sku: Some(sku),
            properties: ServerPropertiesForCreate {
                create_mode,
                administrator_login: data.get_str("administrator_login").map(str::to_string),
                administrator_login_password: data.get_str("administrator_login_password").map(str::to_string),
                source_server_id: data.get_str("creation_source_server_id").map(str::to_string),
                restore_point_in_time: data.get_str("restore_point_in_time").map(str::to_string),
                version: data.get_str("version").map(str::to_string),
                ssl_enforcement: Some(enabled_status(data.get_bool("ssl_enforcement_enabled"))),
                minimal_tls_version: data.get_str("ssl_minimal_tls_version_enforced").map(str::to_string),
                infrastructure_encryption: Some(enabled_status(data.get_bool("infrastructure_encryption_enabled"))),
                public_network_access: Some(enabled_status(data.get_bool("public_network_access_enabled"))),
                storage_profile: Some(expand_storage_profile(data)),
            },
            tags: Some(common::expand_tags(data)),
        };

        info!(id = %resource_id, "creating server");
        client
            .put_then_poll(&resource_id, API_VERSION, &server)
            .await
            .map_err(|e| e.context(format!("creating {}", id)))?;

        let lookup_id = resource_id.as_str();
        common::wait_for_state(
            client.poll_interval(),
            &id.to_string(),
            &["Disabled", "Inaccessible", ""],
            STATE_READY,
            move || async move {
                let server: ServerModel = client.get(lookup_id, API_VERSION).await?;
                Ok::<_, ProviderError>(server.properties.user_visible_state.unwrap_or_default())
            },
        )
        .await
        .map_err(|e| e.context(format!("waiting for {} to become available", id)))?;

        data.set_id(resource_id);
        self.read(client, data).await
    }

    async fn read(&self, client: &ArmClient, data: &mut ResourceData) -> Result<()> {
        let id = ServerId::parse(data.require_id()?)?;
        let Some(server) = client
            .get_optional::<ServerModel>(&id.id(), API_VERSION)
            .await
            .map_err(|e| e.context(format!("retrieving {}", id)))?
        else {
            info!(id = %id.id(), "server does not exist, removing from state");
            data.set_gone();
            return Ok(());
        };

        data.set("name", id.server_name.clone());
        data.set("resource_group_name", id.resource_group_name.clone());
        data.set("location", common::normalize_location(&server.location));
        data.set("sku_name", server.sku.map(|sku| sku.name));
        data.set("identity", flatten_identity(server.identity.as_ref()));

        let props = server.properties;
        data.set("administrator_login", props.administrator_login);
        data.set("version", props.version);
        data.set("ssl_enforcement_enabled", is_enabled(props.ssl_enforcement.as_deref()));
        data.set("ssl_minimal_tls_version_enforced", props.minimal_tls_version);
        data.set(
            "infrastructure_encryption_enabled",
            is_enabled(props.infrastructure_encryption.as_deref()),
        );
        data.set("public_network_access_enabled", is_enabled(props.public_network_access.as_deref()));
        if let Some(storage) = props.storage_profile {
            data.set("auto_grow_enabled", is_enabled(storage.storage_autogrow.as_deref()));
            data.set("backup_retention_days", storage.backup_retention_days);
            data.set("geo_redundant_backup_enabled", is_enabled(storage.geo_redundant_backup.as_deref()));
            data.set("storage_mb", storage.storage_mb);
        }
        data.set("fqdn", props.fully_qualified_domain_name);
        data.set("tags", common::flatten_tags(server.tags.as_ref()));
        Ok(())
    }

    async fn update(&self, client: &ArmClient, data: &mut ResourceData) -> Result<()> {
        let id = ServerId::parse(data.require_id()?)?;
        check_tls(data.state())?;

        let mut properties = ServerUpdateProperties {
            ssl_enforcement: Some(enabled_status(data.get_bool("ssl_enforcement_enabled"))),
            minimal_tls_version: data.get_str("ssl_minimal_tls_version_enforced").map(str::to_string),
            public_network_access: Some(enabled_status(data.get_bool("public_network_access_enabled"))),
            storage_profile: Some(expand_storage_profile(data)),
            ..Default::default()
        };
        if data.has_change("administrator_login_password") {
            properties.administrator_login_password = data.get_str("administrator_login_password").map(str::to_string);
        }

        let update = ServerUpdateParameters {
            identity: expand_identity(data),
            sku: Some(expand_sku(&data.get_string("sku_name"))?),
            properties,
            tags: Some(common::expand_tags(data)),
        };

        info!(id = %id.id(), "updating server");
        client
            .patch_then_poll(&id.id(), API_VERSION, &update)
            .await
            .map_err(|e| e.context(format!("updating {}", id)))?;
        self.read(client, data).await
    }

    async fn delete(&self, client: &ArmClient, data: &mut ResourceData) -> Result<()> {
        let id = ServerId::parse(data.require_id()?)?;
        info!(id = %id.id(), "deleting server");
        client
            .delete_then_poll(&id.id(), API_VERSION)
            .await
            .map_err(|e| e.context(format!("deleting {}", id)))
    }
}

fn is_basic(sku_name: &str) -> bool {
    sku_name.starts_with("B_")
}

fn check_tls(state: &Value) -> Result<()> {
    let ssl_enabled = lookup(state, "ssl_enforcement_enabled").and_then(Value::as_bool).unwrap_or(true);
    let tls = lookup(state, "ssl_minimal_tls_version_enforced").and_then(Value::as_str);
    match tls {
        Some(tls) if !ssl_enabled && tls != TLS_ENFORCEMENT_DISABLED => Err(ProviderError::Validation(
            "`ssl_minimal_tls_version_enforced` must be set to `TLSEnforcementDisabled` when \
             `ssl_enforcement_enabled` is set to `false`"
                .to_string(),
        )),
        _ => Ok(()),
    }
}

fn check_create_mode(data: &ResourceData, create_mode: &str) -> Result<()> {
    match create_mode {
        CREATE_MODE_DEFAULT => {
            if data.get_ok("administrator_login").is_none() || data.get_ok("administrator_login_password").is_none() {
                return Err(ProviderError::Validation(
                    "`administrator_login` and `administrator_login_password` are required when `create_mode` \
                     is `Default`"
                        .to_string(),
                ));
            }
        },
        mode => {
            if data.get_ok("creation_source_server_id").is_none() {
                return Err(ProviderError::Validation(format!(
                    "`creation_source_server_id` is required when `create_mode` is `{}`",
                    mode
                )));
            }
            if mode == "PointInTimeRestore" && data.get_ok("restore_point_in_time").is_none() {
                return Err(ProviderError::Validation(
                    "`restore_point_in_time` is required when `create_mode` is `PointInTimeRestore`".to_string(),
                ));
            }
        },
    }
    Ok(())
}

/// Split `GP_Gen5_2` into tier, family and capacity.
fn expand_sku(name: &str) -> Result<Sku> {
    let invalid = || ProviderError::Validation(format!("unable to parse `sku_name` {:?}", name));
    let mut parts = name.splitn(3, '_');
    let (Some(prefix), Some(family), Some(capacity)) = (parts.next(), parts.next(), parts.next()) else {
        return Err(invalid());
    };
    let tier = match prefix {
        "B" => "Basic",
        "GP" => "GeneralPurpose",
        "MO" => "MemoryOptimized",
        _ => return Err(invalid()),
    };
    let capacity = capacity.parse::<i64>().map_err(|_| invalid())?;
    Ok(Sku {
        name: name.to_string(),
        tier: Some(tier.to_string()),
        family: Some(family.to_string()),
        capacity: Some(capacity),
    })
}

fn expand_storage_profile(data: &ResourceData) -> StorageProfile {
    StorageProfile {
        backup_retention_days: data.get_i64("backup_retention_days"),
        geo_redundant_backup: data
            .get("geo_redundant_backup_enabled")
            .and_then(Value::as_bool)
            .map(enabled_status),
        storage_mb: data.get_i64("storage_mb"),
        storage_autogrow: Some(enabled_status(data.get_bool("auto_grow_enabled"))),
    }
}

fn expand_identity(data: &ResourceData) -> Option<Identity> {
    data.get_block("identity").map(|block| Identity {
        kind: block
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("SystemAssigned")
            .to_string(),
        ..Default::default()
    })
}

fn flatten_identity(identity: Option<&Identity>) -> Value {
    match identity {
        Some(identity) if identity.kind == "SystemAssigned" => json!([{
            "type": identity.kind,
            "principal_id": identity.principal_id.clone().unwrap_or_default(),
            "tenant_id": identity.tenant_id.clone().unwrap_or_default(),
        }]),
        _ => json!([]),
    }
}
