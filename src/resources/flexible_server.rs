//! `azurerm_mysql_flexible_server`.
//!
//! Updates are applied in several ARM calls because some property
//! combinations are rejected when sent together:
//!
//! 1. `replication_role` (only `Replica` to `None`);
//! 2. storage, when auto-grow ends up enabled (high availability depends on it);
//! 3. a failover when `zone` and the standby zone were swapped, otherwise
//!    high availability is disabled and re-enabled with the new settings;
//! 4. everything else in one PATCH;
//! 5. storage, when auto-grow ends up disabled, turning off log-on-disk first
//!    if both flip from true to false.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use crate::arm::ArmClient;
use crate::error::{ProviderError, Result};
use crate::ids::{FlexibleServerId, IdKind, UserAssignedIdentityId};
use crate::models::flexible::{
    Backup, DataEncryption, HighAvailability, Identity, MaintenanceWindow, Network, Server,
    ServerForUpdate, ServerProperties, ServerPropertiesForUpdate, Sku, Storage, UserAssignedIdentity,
    API_VERSION,
};
use crate::schema::{Attribute, Block, Constraint, NameRule, NestedBlock, Schema};
use crate::types::PlanResult;
use crate::validation::lookup;

use super::common::{self, enabled_status, is_enabled, DISABLED, ENABLED};
use super::{Resource, ResourceData, Timeouts};

const TYPE_NAME: &str = "azurerm_mysql_flexible_server";

const CREATE_MODES: [&str; 4] = ["Default", "GeoRestore", "PointInTimeRestore", "Replica"];

const HA_DISABLED: &str = "Disabled";
const HA_SAME_ZONE: &str = "SameZone";

/// `azurerm_mysql_flexible_server`: a MySQL flexible server.
pub struct FlexibleServer;

pub(crate) fn schema() -> Schema {
    Schema::v0()
        .with_attribute("id", common::id_attribute())
        .with_attribute("name", common::name_attribute(NameRule::ServerName))
        .with_attribute("resource_group_name", common::resource_group_name_attribute())
        .with_attribute("location", common::location_attribute())
        .with_attribute(
            "administrator_login",
            Attribute::optional_computed_string()
                .with_force_new()
                .with_constraint(Constraint::Rule(NameRule::FlexibleServerAdministratorLogin)),
        )
        .with_attribute(
            "administrator_password",
            Attribute::optional_string()
                .sensitive()
                .with_constraint(Constraint::Rule(NameRule::FlexibleServerAdministratorPassword))
                .conflicts_with(&["administrator_password_wo"]),
        )
        .with_attribute(
            "administrator_password_wo",
            Attribute::optional_string()
                .sensitive()
                .with_description("Write-only administrator password; never stored in state")
                .with_constraint(Constraint::Rule(NameRule::FlexibleServerAdministratorPassword))
                .conflicts_with(&["administrator_password"])
                .required_with(&["administrator_password_wo_version"]),
        )
        .with_attribute(
            "administrator_password_wo_version",
            Attribute::optional_int64().required_with(&["administrator_password_wo"]),
        )
        .with_attribute(
            "backup_retention_days",
            Attribute::optional_int64()
                .with_default(json!(7))
                .with_constraint(Constraint::IntBetween(1, 35)),
        )
        .with_attribute(
            "create_mode",
            Attribute::optional_string()
                .with_force_new()
                .with_constraint(Constraint::OneOf(CREATE_MODES.to_vec())),
        )
        .with_block(
            "customer_managed_key",
            NestedBlock::list(
                Block::new()
                    .with_attribute(
                        "key_vault_key_id",
                        Attribute::optional_string()
                            .with_constraint(Constraint::KeyVaultKeyId)
                            .required_with(&["identity", "customer_managed_key.0.primary_user_assigned_identity_id"]),
                    )
                    .with_attribute(
                        "primary_user_assigned_identity_id",
                        Attribute::optional_string()
                            .with_constraint(Constraint::ResourceId(IdKind::UserAssignedIdentity)),
                    )
                    .with_attribute(
                        "geo_backup_key_vault_key_id",
                        Attribute::optional_string()
                            .with_constraint(Constraint::KeyVaultKeyId)
                            .required_with(&["identity", "customer_managed_key.0.geo_backup_user_assigned_identity_id"]),
                    )
                    .with_attribute(
                        "geo_backup_user_assigned_identity_id",
                        Attribute::optional_string()
                            .with_constraint(Constraint::ResourceId(IdKind::UserAssignedIdentity)),
                    ),
            )
            .with_max_items(1),
        )
        .with_attribute(
            "delegated_subnet_id",
            Attribute::optional_string()
                .with_force_new()
                .with_constraint(Constraint::ResourceId(IdKind::Subnet)),
        )
        .with_attribute(
            "geo_redundant_backup_enabled",
            Attribute::optional_bool().with_force_new().with_default(json!(false)),
        )
        .with_block(
            "high_availability",
            NestedBlock::list(
                Block::new()
                    .with_attribute(
                        "mode",
                        Attribute::required_string().with_constraint(Constraint::OneOf(vec!["ZoneRedundant", HA_SAME_ZONE])),
                    )
                    .with_attribute("standby_availability_zone", Attribute::optional_computed_string()),
            )
            .with_max_items(1),
        )
        .with_block(
            "identity",
            NestedBlock::list(
                Block::new()
                    .with_attribute(
                        "type",
                        Attribute::required_string().with_constraint(Constraint::OneOf(vec!["UserAssigned"])),
                    )
                    .with_attribute("identity_ids", common::string_set(true)),
            )
            .with_max_items(1),
        )
        .with_block(
            "maintenance_window",
            NestedBlock::list(
                Block::new()
                    .with_attribute(
                        "day_of_week",
                        Attribute::optional_int64()
                            .with_default(json!(0))
                            .with_constraint(Constraint::IntBetween(0, 6)),
                    )
                    .with_attribute(
                        "start_hour",
                        Attribute::optional_int64()
                            .with_default(json!(0))
                            .with_constraint(Constraint::IntBetween(0, 23)),
                    )
                    .with_attribute(
                        "start_minute",
                        Attribute::optional_int64()
                            .with_default(json!(0))
                            .with_constraint(Constraint::IntBetween(0, 59)),
                    ),
            )
            .with_max_items(1),
        )
        .with_attribute(
            "point_in_time_restore_time_in_utc",
            Attribute::optional_string()
                .with_force_new()
                .with_constraint(Constraint::Rfc3339),
        )
        .with_attribute(
            "private_dns_zone_id",
            Attribute::optional_string()
                .with_force_new()
                .with_constraint(Constraint::ResourceId(IdKind::PrivateDnsZone)),
        )
        .with_attribute(
            "public_network_access",
            Attribute::optional_computed_string().with_constraint(Constraint::OneOf(vec![ENABLED, DISABLED])),
        )
        .with_attribute(
            "replication_role",
            Attribute::optional_computed_string().with_constraint(Constraint::OneOf(vec!["None"])),
        )
        .with_attribute(
            "sku_name",
            Attribute::optional_computed_string().with_constraint(Constraint::Rule(NameRule::FlexibleServerSkuName)),
        )
        .with_attribute(
            "source_server_id",
            Attribute::optional_string()
                .with_force_new()
                .with_constraint(Constraint::ResourceId(IdKind::FlexibleServer)),
        )
        .with_block(
            "storage",
            NestedBlock::list(
                Block::new()
                    .with_attribute("auto_grow_enabled", Attribute::optional_bool().with_default(json!(true)))
                    .with_attribute(
                        "iops",
                        Attribute::optional_computed_int64().with_constraint(Constraint::IntBetween(360, 48000)),
                    )
                    .with_attribute("log_on_disk_enabled", Attribute::optional_bool().with_default(json!(false)))
                    .with_attribute(
                        "size_gb",
                        Attribute::optional_computed_int64().with_constraint(Constraint::IntBetween(20, 16384)),
                    )
                    .with_attribute("io_scaling_enabled", Attribute::optional_bool().with_default(json!(false))),
            )
            .with_max_items(1)
            .computed(),
        )
        .with_attribute(
            "version",
            Attribute::optional_computed_string()
                .with_force_new()
                .with_constraint(Constraint::OneOf(vec!["5.7", "8.0.21"])),
        )
        .with_attribute("zone", Attribute::optional_computed_string())
        .with_attribute("fqdn", Attribute::computed_string())
        .with_attribute("replica_capacity", Attribute::computed_int64())
        .with_attribute("tags", common::tags_attribute())
}

#[async_trait]
impl Resource for FlexibleServer {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> Schema {
        schema()
    }

    fn id_kind(&self) -> IdKind {
        IdKind::FlexibleServer
    }

    fn timeouts(&self) -> Timeouts {
        Timeouts::minutes(120, 5, 120, 60)
    }

    fn customize_plan(&self, plan: &mut PlanResult, prior: Option<&Value>) -> Result<()> {
        // the write-only password never reaches state, so it can't diff
        plan.changes.retain(|c| c.path != "administrator_password_wo");

        let Some(prior) = prior else {
            return Ok(());
        };
        let old = lookup(prior, "storage.0.size_gb").and_then(Value::as_i64);
        let new = lookup(&plan.planned_state, "storage.0.size_gb").and_then(Value::as_i64);
        if let (Some(old), Some(new)) = (old, new) {
            if new < old {
                debug!(old, new, "storage size decreased, replacing server");
                plan.force_replace("storage.0.size_gb");
            }
        }
        Ok(())
    }

    async fn create(&self, client: &ArmClient, data: &mut ResourceData) -> Result<()> {
        let id = FlexibleServerId::new(
            client.subscription_id(),
            data.require_str("resource_group_name")?,
            data.require_str("name")?,
        );
        let resource_id = id.id();
        common::ensure_absent(client, TYPE_NAME, &resource_id, API_VERSION).await?;

        check_create_arguments(data)?;

        let storage = expand_storage(data.get_block("storage"));
        if let Some(storage) = &storage {
            if storage.iops.is_some() && is_enabled(storage.auto_io_scaling.as_deref()) {
                return Err(ProviderError::Validation(
                    "`iops` can not be set if `io_scaling_enabled` is set to true".to_string(),
                ));
            }
        }

        let sku = expand_sku(data.get_str("sku_name"))
            .map_err(|e| e.context(format!("expanding `sku_name` for {}", id)))?;

        let mut properties = ServerProperties {
            create_mode: data.get_str("create_mode").map(str::to_string),
            version: data.get_str("version").map(str::to_string),
            storage,
            network: Some(expand_network(data)),
            high_availability: Some(expand_high_availability(data.get_block("high_availability"))),
            backup: Some(expand_backup(data)),
            data_encryption: Some(expand_data_encryption(data.get_block("customer_managed_key"))),
            administrator_login: data.get_str("administrator_login").map(str::to_string),
            administrator_login_password: data.get_str("administrator_password").map(str::to_string),
            availability_zone: data.get_str("zone").map(str::to_string),
            source_server_resource_id: data.get_str("source_server_id").map(str::to_string),
            ..Default::default()
        };
        if let Some(password) = data.get_str("administrator_password_wo") {
            properties.administrator_login_password = Some(password.to_string());
        }
        if let Some(restore_time) = data.get_str("point_in_time_restore_time_in_utc") {
            properties.restore_point_in_time = Some(normalize_restore_time(restore_time)?);
        }

        let identity = match data.get_block("identity") {
            Some(block) => Some(expand_identity(Some(block))?),
            None => None,
        };

        let server = Server {
            location: common::normalize_location(data.require_str("location")?),
            tags: Some(common::expand_tags(data)),
            identity,
            sku,
            properties: Some(properties),
            ..Default::default()
        };

        info!(id = %resource_id, "creating flexible server");
        client
            .put_then_poll(&resource_id, API_VERSION, &server)
            .await
            .map_err(|e| e.context(format!("creating {}", id)))?;

        // the server can briefly 404 after the create operation reports success
        let lookup_id = resource_id.as_str();
        common::wait_for_state(client.poll_interval(), &id.to_string(), &["Pending"], "OK", move || async move {
            let found = client.get_optional::<Value>(lookup_id, API_VERSION).await?;
            Ok::<_, ProviderError>(if found.is_some() { "OK" } else { "Pending" }.to_string())
        })
        .await
        .map_err(|e| e.context(format!("waiting for creation of {}", id)))?;

        // a maintenance window can only be set on an existing server
        if let Some(window) = data.get_block("maintenance_window") {
            let update = ServerForUpdate {
                properties: Some(ServerPropertiesForUpdate {
                    maintenance_window: Some(expand_maintenance_window(Some(window))),
                    ..Default::default()
                }),
                ..Default::default()
            };
            client
                .patch_then_poll(&resource_id, API_VERSION, &update)
                .await
                .map_err(|e| e.context(format!("updating Maintenance Window for {}", id)))?;
        }

        data.set_id(resource_id);
        self.read(client, data).await
    }

    async fn read(&self, client: &ArmClient, data: &mut ResourceData) -> Result<()> {
        let id = FlexibleServerId::parse(data.require_id()?)?;

        let Some(server) = client
            .get_optional::<Server>(&id.id(), API_VERSION)
            .await
            .map_err(|e| e.context(format!("retrieving {}", id)))?
        else {
            info!(id = %id.id(), "flexible server does not exist, removing from state");
            data.set_gone();
            return Ok(());
        };

        data.set("name", id.flexible_server_name.clone());
        data.set("resource_group_name", id.resource_group_name.clone());
        data.set("location", common::normalize_location(&server.location));

        if let Some(props) = &server.properties {
            data.set("administrator_login", props.administrator_login.clone());
            data.set("zone", props.availability_zone.clone());
            data.set("version", props.version.clone());
            data.set("fqdn", props.fully_qualified_domain_name.clone());
            data.set("source_server_id", props.source_server_resource_id.clone());

            if let Some(network) = &props.network {
                data.set("delegated_subnet_id", network.delegated_subnet_resource_id.clone());
                data.set("private_dns_zone_id", network.private_dns_zone_resource_id.clone());
                data.set("public_network_access", network.public_network_access.clone());
            }

            let cmk = flatten_data_encryption(props.data_encryption.as_ref())
                .map_err(|e| e.context("flattening `customer_managed_key`"))?;
            data.set("customer_managed_key", cmk);
            data.set("maintenance_window", flatten_maintenance_window(props.maintenance_window.as_ref()));
            data.set("storage", flatten_storage(props.storage.as_ref()));

            if let Some(backup) = &props.backup {
                data.set("backup_retention_days", backup.backup_retention_days);
                data.set("geo_redundant_backup_enabled", is_enabled(backup.geo_redundant_backup.as_deref()));
            }

            data.set("high_availability", flatten_high_availability(props.high_availability.as_ref()));
            data.set("replication_role", props.replication_role.clone());
            data.set("replica_capacity", props.replica_capacity);
        }

        let identity =
            flatten_identity(server.identity.as_ref()).map_err(|e| e.context("flattening `identity`"))?;
        data.set("identity", identity);

        let sku = flatten_sku(server.sku.as_ref()).map_err(|e| e.context("flattening `sku_name`"))?;
        data.set("sku_name", sku);
        data.set("administrator_password_wo", Value::Null);
        data.set("tags", common::flatten_tags(server.tags.as_ref()));

        data.set_id(id.id());
        Ok(())
    }

    async fn update(&self, client: &ArmClient, data: &mut ResourceData) -> Result<()> {
        let id = FlexibleServerId::parse(data.require_id()?)?;
        let resource_id = id.id();

        let zone_changed = data.has_change("zone");
        let standby_changed = data.has_change("high_availability.0.standby_availability_zone");
        let current = if zone_changed && standby_changed {
            let server: Server = client.get(&resource_id, API_VERSION).await?;
            server.properties
        } else {
            None
        };
        let require_failover = requires_failover(
            zone_changed,
            standby_changed,
            data.get_str("zone"),
            data.get_str("high_availability.0.standby_availability_zone"),
            current.as_ref(),
        )?;

        if data.has_change("replication_role") {
            let (old, new) = data.get_change("replication_role");
            let old = old.and_then(Value::as_str).unwrap_or_default();
            let new = new.and_then(Value::as_str).unwrap_or_default();
            if old != "Replica" || new != "None" {
                return Err(ProviderError::Validation(
                    "`replication_role` only can be updated from `Replica` to `None`".to_string(),
                ));
            }
            let update = properties_update(ServerPropertiesForUpdate {
                replication_role: Some("None".to_string()),
                ..Default::default()
            });
            client
                .patch_then_poll(&resource_id, API_VERSION, &update)
                .await
                .map_err(|e| e.context(format!("updating `replication_role` for {}", id)))?;
        }

        let storage_changed = data.has_change("storage");
        let auto_grow = data.get_bool("storage.0.auto_grow_enabled");

        // high availability needs auto-grow, but ARM rejects enabling both at once
        if storage_changed && auto_grow {
            let update = properties_update(ServerPropertiesForUpdate {
                storage: expand_storage(data.get_block("storage")),
                ..Default::default()
            });
            client
                .patch_then_poll(&resource_id, API_VERSION, &update)
                .await
                .map_err(|e| e.context(format!("enabling `auto_grow_enabled` for {}", id)))?;
        }

        if require_failover {
            info!(id = %resource_id, "failing over flexible server");
            client
                .post_then_poll(&format!("{}/failover", resource_id), API_VERSION, None)
                .await
                .map_err(|e| e.context(format!("failing over {}", id)))?;
        } else if data.has_change("high_availability") {
            let disable = properties_update(ServerPropertiesForUpdate {
                high_availability: Some(HighAvailability {
                    mode: HA_DISABLED.to_string(),
                    ..Default::default()
                }),
                ..Default::default()
            });
            client
                .patch_then_poll(&resource_id, API_VERSION, &disable)
                .await
                .map_err(|e| e.context(format!("disabling `high_availability` for {}", id)))?;

            let desired = expand_high_availability(data.get_block("high_availability"));
            if desired.mode != HA_DISABLED {
                let enable = properties_update(ServerPropertiesForUpdate {
                    high_availability: Some(desired),
                    ..Default::default()
                });
                client
                    .patch_then_poll(&resource_id, API_VERSION, &enable)
                    .await
                    .map_err(|e| e.context(format!("updating `high_availability` for {}", id)))?;
            }
        }

        let mut update = ServerForUpdate::default();
        let mut properties = ServerPropertiesForUpdate::default();

        if data.has_change("administrator_password") {
            properties.administrator_login_password = Some(data.get_string("administrator_password"));
        }
        if data.has_change("administrator_password_wo_version") {
            if let Some(password) = data.get_str("administrator_password_wo") {
                properties.administrator_login_password = Some(password.to_string());
            }
        }
        if data.has_change("backup_retention_days") || data.has_change("geo_redundant_backup_enabled") {
            properties.backup = Some(expand_backup(data));
        }
        if data.has_change("customer_managed_key") {
            properties.data_encryption = Some(expand_data_encryption(data.get_block("customer_managed_key")));
        }
        if data.has_change("identity") {
            update.identity =
                Some(expand_identity(data.get_block("identity")).map_err(|e| e.context("expanding `identity`"))?);
        }
        if data.has_change("maintenance_window") {
            properties.maintenance_window = Some(expand_maintenance_window(data.get_block("maintenance_window")));
        }
        if data.has_change("sku_name") {
            update.sku = expand_sku(data.get_str("sku_name")).map_err(|e| e.context("expanding `sku_name`"))?;
        }
        if data.has_change("tags") {
            update.tags = Some(common::expand_tags(data));
        }
        if data.has_change("public_network_access") {
            properties.network = Some(Network {
                public_network_access: data.get_str("public_network_access").map(str::to_string),
                ..Default::default()
            });
        }
        update.properties = Some(properties);

        client
            .patch_then_poll(&resource_id, API_VERSION, &update)
            .await
            .map_err(|e| e.context(format!("updating {}", id)))?;

        if storage_changed && !auto_grow {
            let (old_log, new_log) = change_as_bools(data, "storage.0.log_on_disk_enabled");
            let (old_grow, new_grow) = change_as_bools(data, "storage.0.auto_grow_enabled");
            // log-on-disk has to go first when both flip from true to false
            if old_log && !new_log && old_grow && !new_grow {
                let update = properties_update(ServerPropertiesForUpdate {
                    storage: Some(Storage {
                        log_on_disk: Some(DISABLED.to_string()),
                        ..Default::default()
                    }),
                    ..Default::default()
                });
                client
                    .patch_then_poll(&resource_id, API_VERSION, &update)
                    .await
                    .map_err(|e| e.context(format!("disabling `log_on_disk_enabled` for {}", id)))?;
            }

            let update = properties_update(ServerPropertiesForUpdate {
                storage: expand_storage(data.get_block("storage")),
                ..Default::default()
            });
            client
                .patch_then_poll(&resource_id, API_VERSION, &update)
                .await
                .map_err(|e| e.context(format!("disabling `auto_grow_enabled` for {}", id)))?;
        }

        self.read(client, data).await
    }

    async fn delete(&self, client: &ArmClient, data: &mut ResourceData) -> Result<()> {
        let id = FlexibleServerId::parse(data.require_id()?)?;
        info!(id = %id.id(), "deleting flexible server");
        client
            .delete_then_poll(&id.id(), API_VERSION)
            .await
            .map_err(|e| e.context(format!("deleting {}", id)))
    }
}

fn properties_update(properties: ServerPropertiesForUpdate) -> ServerForUpdate {
    ServerForUpdate {
        properties: Some(properties),
        ..Default::default()
    }
}

fn change_as_bools(data: &ResourceData, path: &str) -> (bool, bool) {
    let (old, new) = data.get_change(path);
    let as_bool = |v: Option<&Value>| v.and_then(Value::as_bool).unwrap_or(false);
    (as_bool(old), as_bool(new))
}

fn check_create_arguments(data: &ResourceData) -> Result<()> {
    let invalid = |msg: &str| Err(ProviderError::Validation(msg.to_string()));
    let create_mode = data.get_str("create_mode").unwrap_or_default();

    if data.get_ok("replication_role").is_some() {
        return invalid("`replication_role` cannot be set while creating");
    }

    if data.get_ok("source_server_id").is_none()
        && matches!(create_mode, "PointInTimeRestore" | "Replica" | "GeoRestore")
    {
        return invalid(
            "`source_server_id` is required when `create_mode` is `PointInTimeRestore`, `GeoRestore`, or `Replica`",
        );
    }

    if create_mode == "PointInTimeRestore" && data.get_ok("point_in_time_restore_time_in_utc").is_none() {
        return invalid("`point_in_time_restore_time_in_utc` is required when `create_mode` is `PointInTimeRestore`");
    }

    if create_mode.is_empty() || create_mode == "Default" {
        if data.get_ok("administrator_login").is_none() {
            return invalid("`administrator_login` is required when `create_mode` is `Default`");
        }
        if data.get_ok("administrator_password").is_none() && data.get_ok("administrator_password_wo").is_none() {
            return invalid(
                "`administrator_password_wo` or `administrator_password` is required when `create_mode` is `Default`",
            );
        }
        if data.get_ok("sku_name").is_none() {
            return invalid("`sku_name` is required when `create_mode` is `Default`");
        }
    }

    Ok(())
}

/// Decide whether a zone change is a failover.
///
/// Failover is only possible when `zone` and the standby zone swap places.
fn requires_failover(
    zone_changed: bool,
    standby_changed: bool,
    zone: Option<&str>,
    standby_zone: Option<&str>,
    current: Option<&ServerProperties>,
) -> Result<bool> {
    match (zone_changed, standby_changed) {
        (true, true) => {
            let Some(props) = current else {
                return Ok(false);
            };
            let current_zone = props.availability_zone.as_deref();
            let current_standby = props
                .high_availability
                .as_ref()
                .and_then(|ha| ha.standby_availability_zone.as_deref());
            match (current_zone, current_standby) {
                (Some(current_zone), Some(current_standby)) => {
                    if zone == Some(current_standby) && standby_zone == Some(current_zone) {
                        Ok(true)
                    } else {
                        Err(ProviderError::Validation(
                            "failover only supports exchange between `zone` and `standby_availability_zone`"
                                .to_string(),
                        ))
                    }
                },
                _ => Err(ProviderError::Validation(
                    "`standby_availability_zone` cannot be added while changing `zone`".to_string(),
                )),
            }
        },
        (true, false) => Err(ProviderError::Validation("`zone` cannot be changed independently".to_string())),
        _ => Ok(false),
    }
}

fn normalize_restore_time(value: &str) -> Result<String> {
    let parsed = DateTime::parse_from_rfc3339(value).map_err(|_| {
        ProviderError::Validation("unable to parse `point_in_time_restore_time_in_utc` value".to_string())
    })?;
    Ok(parsed.with_timezone(&Utc).to_rfc3339_opts(SecondsFormat::Secs, true))
}

fn str_field(block: &Map<String, Value>, key: &str) -> Option<String> {
    block
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn int_field(block: &Map<String, Value>, key: &str) -> Option<i64> {
    block.get(key).and_then(Value::as_i64)
}

fn bool_field(block: &Map<String, Value>, key: &str) -> bool {
    block.get(key).and_then(Value::as_bool).unwrap_or(false)
}

/// Split `GP_Standard_D2ds_v4` into tier `GeneralPurpose` and name `Standard_D2ds_v4`.
pub(crate) fn expand_sku(name: Option<&str>) -> Result<Option<Sku>> {
    let Some(name) = name.filter(|n| !n.is_empty()) else {
        return Ok(None);
    };
    let (prefix, sku_name) = name.split_once('_').unwrap_or((name, ""));
    let tier = match prefix {
        "B" => "Burstable",
        "GP" => "GeneralPurpose",
        "MO" => "MemoryOptimized",
        other => {
            return Err(ProviderError::Validation(format!(
                "sku_name {} has unknown sku tier {}",
                name, other
            )))
        },
    };
    Ok(Some(Sku {
        name: sku_name.to_string(),
        tier: tier.to_string(),
    }))
}

pub(crate) fn flatten_sku(sku: Option<&Sku>) -> Result<String> {
    let Some(sku) = sku.filter(|s| !s.name.is_empty() && !s.tier.is_empty()) else {
        return Ok(String::new());
    };
    let prefix = match sku.tier.as_str() {
        "Burstable" => "B",
        "GeneralPurpose" => "GP",
        "MemoryOptimized" => "MO",
        other => return Err(ProviderError::Azure(format!("sku_name has unknown sku tier {}", other))),
    };
    Ok(format!("{}_{}", prefix, sku.name))
}

fn expand_network(data: &ResourceData) -> Network {
    Network {
        delegated_subnet_resource_id: data.get_str("delegated_subnet_id").map(str::to_string),
        private_dns_zone_resource_id: data.get_str("private_dns_zone_id").map(str::to_string),
        public_network_access: data.get_str("public_network_access").map(str::to_string),
    }
}

fn expand_backup(data: &ResourceData) -> Backup {
    Backup {
        backup_retention_days: data.get_ok("backup_retention_days").and_then(Value::as_i64),
        geo_redundant_backup: Some(enabled_status(data.get_bool("geo_redundant_backup_enabled"))),
        earliest_restore_date: None,
    }
}

fn expand_storage(block: Option<&Map<String, Value>>) -> Option<Storage> {
    let block = block?;
    Some(Storage {
        auto_grow: Some(enabled_status(bool_field(block, "auto_grow_enabled"))),
        auto_io_scaling: Some(enabled_status(bool_field(block, "io_scaling_enabled"))),
        log_on_disk: Some(enabled_status(bool_field(block, "log_on_disk_enabled"))),
        storage_size_gb: int_field(block, "size_gb").filter(|v| *v != 0),
        iops: int_field(block, "iops").filter(|v| *v != 0),
        storage_sku: None,
    })
}

fn flatten_storage(storage: Option<&Storage>) -> Value {
    let Some(storage) = storage else {
        return json!([]);
    };
    json!([{
        "size_gb": storage.storage_size_gb.unwrap_or_default(),
        "iops": storage.iops.unwrap_or_default(),
        "auto_grow_enabled": is_enabled(storage.auto_grow.as_deref()),
        "io_scaling_enabled": is_enabled(storage.auto_io_scaling.as_deref()),
        "log_on_disk_enabled": is_enabled(storage.log_on_disk.as_deref()),
    }])
}

fn expand_maintenance_window(block: Option<&Map<String, Value>>) -> MaintenanceWindow {
    let Some(block) = block else {
        return MaintenanceWindow {
            custom_window: Some(DISABLED.to_string()),
            ..Default::default()
        };
    };
    MaintenanceWindow {
        custom_window: Some(ENABLED.to_string()),
        day_of_week: Some(int_field(block, "day_of_week").unwrap_or_default()),
        start_hour: Some(int_field(block, "start_hour").unwrap_or_default()),
        start_minute: Some(int_field(block, "start_minute").unwrap_or_default()),
    }
}

fn flatten_maintenance_window(window: Option<&MaintenanceWindow>) -> Value {
    match window {
        Some(window) if window.custom_window.as_deref().is_some_and(|c| c != DISABLED) => json!([{
            "day_of_week": window.day_of_week.unwrap_or_default(),
            "start_hour": window.start_hour.unwrap_or_default(),
            "start_minute": window.start_minute.unwrap_or_default(),
        }]),
        _ => json!([]),
    }
}

fn expand_high_availability(block: Option<&Map<String, Value>>) -> HighAvailability {
    let Some(block) = block else {
        return HighAvailability {
            mode: HA_DISABLED.to_string(),
            ..Default::default()
        };
    };
    let mode = str_field(block, "mode").unwrap_or_else(|| HA_DISABLED.to_string());
    // moving to SameZone changes the standby zone, so keeping the old one would be rejected
    let standby_availability_zone = if mode == HA_SAME_ZONE {
        None
    } else {
        str_field(block, "standby_availability_zone")
    };
    HighAvailability {
        mode,
        standby_availability_zone,
        state: None,
    }
}

fn flatten_high_availability(ha: Option<&HighAvailability>) -> Value {
    match ha {
        Some(ha) if !ha.mode.is_empty() && ha.mode != HA_DISABLED => json!([{
            "mode": ha.mode,
            "standby_availability_zone": ha.standby_availability_zone.clone().unwrap_or_default(),
        }]),
        _ => json!([]),
    }
}

fn expand_data_encryption(block: Option<&Map<String, Value>>) -> DataEncryption {
    let Some(block) = block else {
        return DataEncryption {
            kind: "SystemManaged".to_string(),
            ..Default::default()
        };
    };
    DataEncryption {
        kind: "AzureKeyVault".to_string(),
        primary_key_uri: str_field(block, "key_vault_key_id"),
        primary_user_assigned_identity_id: str_field(block, "primary_user_assigned_identity_id"),
        geo_backup_key_uri: str_field(block, "geo_backup_key_vault_key_id"),
        geo_backup_user_assigned_identity_id: str_field(block, "geo_backup_user_assigned_identity_id"),
    }
}

fn flatten_data_encryption(encryption: Option<&DataEncryption>) -> Result<Value> {
    let Some(encryption) = encryption.filter(|e| e.kind != "SystemManaged") else {
        return Ok(json!([]));
    };

    let mut item = Map::new();
    if let Some(uri) = &encryption.primary_key_uri {
        item.insert("key_vault_key_id".to_string(), json!(uri));
    }
    if let Some(identity) = &encryption.primary_user_assigned_identity_id {
        let parsed = UserAssignedIdentityId::parse_insensitively(identity)?;
        item.insert("primary_user_assigned_identity_id".to_string(), json!(parsed.id()));
    }
    if let Some(uri) = &encryption.geo_backup_key_uri {
        item.insert("geo_backup_key_vault_key_id".to_string(), json!(uri));
    }
    if let Some(identity) = &encryption.geo_backup_user_assigned_identity_id {
        let parsed = UserAssignedIdentityId::parse_insensitively(identity)?;
        item.insert("geo_backup_user_assigned_identity_id".to_string(), json!(parsed.id()));
    }
    Ok(Value::Array(vec![Value::Object(item)]))
}

fn expand_identity(block: Option<&Map<String, Value>>) -> Result<Identity> {
    let Some(block) = block else {
        return Ok(Identity {
            kind: "None".to_string(),
            ..Default::default()
        });
    };
    let kind = str_field(block, "type").unwrap_or_else(|| "UserAssigned".to_string());
    let mut user_assigned_identities = std::collections::HashMap::new();
    for id in block.get("identity_ids").and_then(Value::as_array).into_iter().flatten() {
        let Some(id) = id.as_str() else {
            continue;
        };
        let parsed = UserAssignedIdentityId::parse(id)?;
        user_assigned_identities.insert(parsed.id(), UserAssignedIdentity::default());
    }
    Ok(Identity {
        kind,
        user_assigned_identities,
    })
}

fn flatten_identity(identity: Option<&Identity>) -> Result<Value> {
    let Some(identity) = identity.filter(|i| i.kind.eq_ignore_ascii_case("UserAssigned")) else {
        return Ok(json!([]));
    };
    let mut ids = identity
        .user_assigned_identities
        .keys()
        .map(|id| UserAssignedIdentityId::parse_insensitively(id).map(|parsed| parsed.id()))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    ids.sort();
    Ok(json!([{
        "type": "UserAssigned",
        "identity_ids": ids,
    }]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sku_mapping() {
        let sku = expand_sku(Some("GP_Standard_D2ds_v4")).unwrap().unwrap();
        assert_eq!(sku.tier, "GeneralPurpose");
        assert_eq!(sku.name, "Standard_D2ds_v4");
        assert_eq!(flatten_sku(Some(&sku)).unwrap(), "GP_Standard_D2ds_v4");

        let sku = expand_sku(Some("B_Standard_B1s")).unwrap().unwrap();
        assert_eq!(sku.tier, "Burstable");
        assert_eq!(flatten_sku(Some(&sku)).unwrap(), "B_Standard_B1s");

        assert!(expand_sku(None).unwrap().is_none());
        assert!(expand_sku(Some("XX_Standard_B1s")).is_err());
        assert_eq!(flatten_sku(None).unwrap(), "");
    }

    fn current(zone: Option<&str>, standby: Option<&str>) -> ServerProperties {
        ServerProperties {
            availability_zone: zone.map(str::to_string),
            high_availability: Some(HighAvailability {
                mode: "ZoneRedundant".to_string(),
                standby_availability_zone: standby.map(str::to_string),
                state: None,
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_failover_on_zone_exchange() {
        let props = current(Some("1"), Some("2"));
        assert!(requires_failover(true, true, Some("2"), Some("1"), Some(&props)).unwrap());
    }

    #[test]
    fn test_failover_rejections() {
        let props = current(Some("1"), Some("2"));
        let err = requires_failover(true, true, Some("3"), Some("1"), Some(&props)).unwrap_err();
        assert!(err.message().contains("failover only supports exchange"));

        let props = current(Some("1"), None);
        let err = requires_failover(true, true, Some("2"), Some("1"), Some(&props)).unwrap_err();
        assert!(err.message().contains("cannot be added while changing `zone`"));

        let err = requires_failover(true, false, Some("2"), None, None).unwrap_err();
        assert!(err.message().contains("`zone` cannot be changed independently"));
    }

    #[test]
    fn test_standby_only_change_is_not_failover() {
        let props = current(Some("1"), Some("2"));
        assert!(!requires_failover(false, true, Some("1"), Some("3"), Some(&props)).unwrap());
        assert!(!requires_failover(false, true, Some("1"), Some("3"), None).unwrap());
        assert!(!requires_failover(false, false, None, None, None).unwrap());
    }

    #[test]
    fn test_create_arguments() {
        let ok = ResourceData::new(json!({
            "administrator_login": "adminuser",
            "administrator_password": "Passw0rd!",
            "sku_name": "B_Standard_B1s"
        }));
        assert!(check_create_arguments(&ok).is_ok());

        let missing_sku = ResourceData::new(json!({
            "administrator_login": "adminuser",
            "administrator_password_wo": "Passw0rd!"
        }));
        let err = check_create_arguments(&missing_sku).unwrap_err();
        assert!(err.message().contains("`sku_name` is required"));

        let replica = ResourceData::new(json!({"create_mode": "Replica"}));
        let err = check_create_arguments(&replica).unwrap_err();
        assert!(err.message().contains("`source_server_id` is required"));

        let pitr = ResourceData::new(json!({
            "create_mode": "PointInTimeRestore",
            "source_server_id": "/subscriptions/x"
        }));
        let err = check_create_arguments(&pitr).unwrap_err();
        assert!(err.message().contains("`point_in_time_restore_time_in_utc` is required"));

        let role = ResourceData::new(json!({"replication_role": "None"}));
        assert!(check_create_arguments(&role).is_err());
    }

    #[test]
    fn test_storage_mapping() {
        let block = json!({"auto_grow_enabled": true, "io_scaling_enabled": false, "log_on_disk_enabled": false, "size_gb": 0, "iops": 720});
        let storage = expand_storage(block.as_object()).unwrap();
        assert_eq!(storage.auto_grow.as_deref(), Some("Enabled"));
        assert_eq!(storage.auto_io_scaling.as_deref(), Some("Disabled"));
        assert_eq!(storage.storage_size_gb, None);
        assert_eq!(storage.iops, Some(720));
        assert!(expand_storage(None).is_none());

        let flattened = flatten_storage(Some(&storage));
        assert_eq!(flattened[0]["auto_grow_enabled"], true);
        assert_eq!(flattened[0]["size_gb"], 0);
        assert_eq!(flatten_storage(None), json!([]));
    }

    #[test]
    fn test_high_availability_mapping() {
        let same_zone = json!({"mode": "SameZone", "standby_availability_zone": "2"});
        let ha = expand_high_availability(same_zone.as_object());
        assert_eq!(ha.mode, "SameZone");
        assert_eq!(ha.standby_availability_zone, None);

        let redundant = json!({"mode": "ZoneRedundant", "standby_availability_zone": "2"});
        let ha = expand_high_availability(redundant.as_object());
        assert_eq!(ha.standby_availability_zone.as_deref(), Some("2"));

        assert_eq!(expand_high_availability(None).mode, "Disabled");
        assert_eq!(flatten_high_availability(Some(&expand_high_availability(None))), json!([]));
        assert_eq!(flatten_high_availability(Some(&ha))[0]["mode"], "ZoneRedundant");
    }

    #[test]
    fn test_maintenance_window_mapping() {
        let window = expand_maintenance_window(None);
        assert_eq!(window.custom_window.as_deref(), Some("Disabled"));
        assert_eq!(flatten_maintenance_window(Some(&window)), json!([]));

        let block = json!({"day_of_week": 3, "start_hour": 2, "start_minute": 30});
        let window = expand_maintenance_window(block.as_object());
        assert_eq!(window.custom_window.as_deref(), Some("Enabled"));
        assert_eq!(flatten_maintenance_window(Some(&window)), json!([block]));
    }

    #[test]
    fn test_data_encryption_mapping() {
        assert_eq!(expand_data_encryption(None).kind, "SystemManaged");
        assert_eq!(flatten_data_encryption(Some(&expand_data_encryption(None))).unwrap(), json!([]));

        let identity = "/subscriptions/00000000-0000-0000-0000-000000000000/resourceGroups/rg/providers/Microsoft.ManagedIdentity/userAssignedIdentities/uai";
        let encryption = DataEncryption {
            kind: "AzureKeyVault".to_string(),
            primary_key_uri: Some("https://kv.vault.azure.net/keys/k/v1".to_string()),
            primary_user_assigned_identity_id: Some(identity.replace("resourceGroups", "resourcegroups")),
            ..Default::default()
        };
        let flattened = flatten_data_encryption(Some(&encryption)).unwrap();
        assert_eq!(flattened[0]["primary_user_assigned_identity_id"], identity);
        assert_eq!(flattened[0]["key_vault_key_id"], "https://kv.vault.azure.net/keys/k/v1");
    }

    #[test]
    fn test_identity_mapping() {
        let id = "/subscriptions/00000000-0000-0000-0000-000000000000/resourceGroups/rg/providers/Microsoft.ManagedIdentity/userAssignedIdentities/uai";
        let block = json!({"type": "UserAssigned", "identity_ids": [id]});
        let identity = expand_identity(block.as_object()).unwrap();
        assert_eq!(identity.kind, "UserAssigned");
        assert!(identity.user_assigned_identities.contains_key(id));
        assert_eq!(flatten_identity(Some(&identity)).unwrap(), json!([block]));

        assert_eq!(expand_identity(None).unwrap().kind, "None");
        assert_eq!(flatten_identity(None).unwrap(), json!([]));

        let bad = json!({"type": "UserAssigned", "identity_ids": ["not-an-id"]});
        assert!(expand_identity(bad.as_object()).is_err());
    }

    #[test]
    fn test_restore_time() {
        assert_eq!(normalize_restore_time("2024-01-02T03:04:05+01:00").unwrap(), "2024-01-02T02:04:05Z");
        assert!(normalize_restore_time("yesterday").is_err());
    }

    #[test]
    fn test_customize_plan_forces_new_on_shrink() {
        let prior = json!({"storage": [{"size_gb": 64}], "administrator_password_wo": null});
        let mut plan = PlanResult::with_changes(
            json!({"storage": [{"size_gb": 32}]}),
            vec![crate::types::AttributeChange::added("administrator_password_wo", json!("x"))],
            false,
        );
        FlexibleServer.customize_plan(&mut plan, Some(&prior)).unwrap();
        assert!(plan.requires_replace);
        assert_eq!(plan.replace_paths, vec!["storage.0.size_gb".to_string()]);
        assert!(plan.change("administrator_password_wo").is_none());

        let mut grow = PlanResult::with_changes(json!({"storage": [{"size_gb": 128}]}), vec![], false);
        FlexibleServer.customize_plan(&mut grow, Some(&prior)).unwrap();
        assert!(!grow.requires_replace);
    }
}
