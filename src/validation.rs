//! Configuration validation.
//!
//! [`validate`] checks a JSON value against a [`Schema`]: presence of required
//! attributes, value types, nested-block cardinality, value [`Constraint`]s and
//! the `conflicts_with`/`required_with` relations between attributes. Every
//! problem becomes an attribute-scoped [`Diagnostic`].
//!
//! # Example
//!
//! ```
//! use hemmer_provider_azurerm_mysql::schema::{Attribute, Constraint, Schema};
//! use hemmer_provider_azurerm_mysql::validation::validate;
//! use serde_json::json;
//!
//! let schema = Schema::v0()
//!     .with_attribute("name", Attribute::required_string())
//!     .with_attribute(
//!         "backup_retention_days",
//!         Attribute::optional_int64().with_constraint(Constraint::IntBetween(1, 35)),
//!     );
//!
//! assert!(validate(&schema, &json!({"name": "fs1", "backup_retention_days": 7})).is_empty());
//!
//! let diagnostics = validate(&schema, &json!({"name": "fs1", "backup_retention_days": 90}));
//! assert_eq!(diagnostics.len(), 1);
//! assert_eq!(diagnostics[0].attribute, Some("backup_retention_days".to_string()));
//! ```

pub mod names;

use std::net::Ipv4Addr;

use serde_json::Value;

use crate::ids::KeyVaultKeyId;
use crate::schema::{
    Attribute, AttributeType, Block, BlockNestingMode, Constraint, Diagnostic, NameRule, NestedBlock,
    Schema,
};

/// Check a configuration against `schema`. No diagnostics means it is valid.
///
/// Computed-only attributes are never required. Constraints and relations
/// only run for attributes that are set and already have the right type.
pub fn validate(schema: &Schema, value: &Value) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    validate_block(&schema.block, value, value, "", &mut diagnostics);
    diagnostics
}

/// Look up a dotted path such as `storage.0.size_gb`.
///
/// Numeric segments index into arrays.
pub fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Whether a value counts as "set" for relation checks.
pub fn is_set(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(items)) => !items.is_empty(),
        Some(Value::Object(map)) => !map.is_empty(),
        Some(_) => true,
    }
}

fn validate_block(
    block: &Block,
    value: &Value,
    root: &Value,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let obj = match value {
        Value::Object(map) => map,
        Value::Null => return,
        _ => {
            let mut diagnostic =
                Diagnostic::error("Expected object").with_detail(format!("Got {}", value_type_name(value)));
            if !path.is_empty() {
                diagnostic = diagnostic.with_attribute(path);
            }
            diagnostics.push(diagnostic);
            return;
        },
    };

    for (name, attr) in &block.attributes {
        let attr_path = join_path(path, name);
        validate_attribute(attr, obj.get(name), &attr_path, diagnostics);

        if is_set(obj.get(name)) {
            for other in &attr.conflicts_with {
                // report each pair once
                if is_set(obj.get(*other)) && name.as_str() < *other {
                    diagnostics.push(
                        Diagnostic::error(format!(
                            "\"{}\": conflicts with {}",
                            attr_path,
                            join_path(path, other)
                        ))
                        .with_attribute(&attr_path),
                    );
                }
            }
            for required in &attr.required_with {
                if !is_set(lookup(root, required)) {
                    diagnostics.push(
                        Diagnostic::error(format!(
                            "\"{}\": all of `{},{}` must be specified",
                            attr_path, attr_path, required
                        ))
                        .with_attribute(&attr_path),
                    );
                }
            }
        }
    }

    for (name, nested) in &block.blocks {
        let block_path = join_path(path, name);
        validate_nested_block(nested, obj.get(name), root, &block_path, diagnostics);
    }
}

fn validate_attribute(
    attr: &Attribute,
    value: Option<&Value>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    if attr.flags.computed && !attr.flags.optional && !attr.flags.required {
        return;
    }

    match value {
        None | Some(Value::Null) => {
            if attr.flags.required {
                diagnostics.push(
                    Diagnostic::error(format!("Missing required attribute '{}'", path))
                        .with_detail("This attribute is required and must be provided")
                        .with_attribute(path),
                );
            }
        },
        Some(v) => {
            let before = diagnostics.len();
            validate_attribute_type(&attr.attr_type, v, path, diagnostics);
            if diagnostics.len() == before {
                for constraint in &attr.constraints {
                    if let Err(detail) = check_constraint(constraint, v) {
                        diagnostics.push(
                            Diagnostic::error(format!("Invalid value for attribute '{}'", path))
                                .with_detail(detail)
                                .with_attribute(path),
                        );
                    }
                }
            }
        },
    }
}

/// Evaluate a single constraint against a value that already has the right type.
pub fn check_constraint(constraint: &Constraint, value: &Value) -> Result<(), String> {
    match constraint {
        Constraint::IntBetween(min, max) => {
            let Some(n) = value.as_i64() else {
                return Err(format!("expected an integer, got {}", value_type_name(value)));
            };
            if n < *min || n > *max {
                return Err(format!("expected to be in the range ({} - {}), got {}", min, max, n));
            }
            Ok(())
        },
        Constraint::Rule(NameRule::StorageMb) => match value.as_i64() {
            Some(n) => names::storage_mb(n),
            None => Err(format!("expected an integer, got {}", value_type_name(value))),
        },
        other => {
            let Some(s) = value.as_str() else {
                return Err(format!("expected a string, got {}", value_type_name(value)));
            };
            check_string_constraint(other, s)
        },
    }
}

fn check_string_constraint(constraint: &Constraint, s: &str) -> Result<(), String> {
    match constraint {
        Constraint::OneOf(allowed) => {
            if allowed.contains(&s) {
                Ok(())
            } else {
                Err(format!("expected to be one of {:?}, got {}", allowed, s))
            }
        },
        Constraint::NotEmpty => {
            if s.trim().is_empty() {
                Err("must not be empty or consist only of whitespace".to_string())
            } else {
                Ok(())
            }
        },
        Constraint::Rfc3339 => chrono::DateTime::parse_from_rfc3339(s)
            .map(|_| ())
            .map_err(|e| format!("{:?} is not a valid RFC3339 date: {}", s, e)),
        Constraint::Ipv4 => s
            .parse::<Ipv4Addr>()
            .map(|_| ())
            .map_err(|_| format!("expected a valid IPv4 address, got {:?}", s)),
        Constraint::Uuid => uuid::Uuid::parse_str(s)
            .map(|_| ())
            .map_err(|_| format!("expected a valid UUID, got {:?}", s)),
        Constraint::ResourceId(kind) => kind.validate(s).map_err(|e| e.to_string()),
        Constraint::KeyVaultKeyId => KeyVaultKeyId::parse(s).map(|_| ()).map_err(|e| e.message().to_string()),
        Constraint::Rule(rule) => names::check(*rule, s),
        Constraint::IntBetween(..) => Err("expected an integer".to_string()),
    }
}

fn validate_attribute_type(
    attr_type: &AttributeType,
    value: &Value,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    match attr_type {
        AttributeType::String => {
            if !value.is_string() {
                diagnostics.push(type_error(path, "string", value));
            }
        },
        AttributeType::Int64 => {
            if !is_int64(value) {
                diagnostics.push(type_error(path, "int64", value));
            }
        },
        AttributeType::Bool => {
            if !value.is_boolean() {
                diagnostics.push(type_error(path, "bool", value));
            }
        },
        AttributeType::Set(element_type) => {
            if let Some(arr) = value.as_array() {
                for (i, elem) in arr.iter().enumerate() {
                    let elem_path = format!("{}.{}", path, i);
                    validate_attribute_type(element_type, elem, &elem_path, diagnostics);
                }
            } else {
                diagnostics.push(type_error(path, "set", value));
            }
        },
        AttributeType::Map(value_type) => {
            if let Some(obj) = value.as_object() {
                for (key, val) in obj {
                    let key_path = format!("{}.{}", path, key);
                    validate_attribute_type(value_type, val, &key_path, diagnostics);
                }
            } else {
                diagnostics.push(type_error(path, "map", value));
            }
        },
    }
}

fn validate_nested_block(
    nested: &NestedBlock,
    value: Option<&Value>,
    root: &Value,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let count = match value {
        None | Some(Value::Null) => 0,
        Some(Value::Array(arr)) => arr.len(),
        // single blocks may also be given as a bare object
        Some(Value::Object(_)) if nested.nesting_mode == BlockNestingMode::Single => 1,
        Some(v) => {
            diagnostics.push(
                Diagnostic::error(format!("Unexpected value for block '{}'", path))
                    .with_detail(format!("Got {}", value_type_name(v)))
                    .with_attribute(path),
            );
            return;
        },
    };

    if (count as u32) < nested.min_items && !nested.computed {
        diagnostics.push(
            Diagnostic::error(format!(
                "Block '{}' requires at least {} item(s), got {}",
                path, nested.min_items, count
            ))
            .with_attribute(path),
        );
    }
    if nested.max_items > 0 && count as u32 > nested.max_items {
        diagnostics.push(
            Diagnostic::error(format!(
                "Block '{}' allows at most {} item(s), got {}",
                path, nested.max_items, count
            ))
            .with_attribute(path),
        );
    }

    match value {
        Some(Value::Array(arr)) => {
            for (i, item) in arr.iter().enumerate() {
                let item_path = format!("{}.{}", path, i);
                validate_block(&nested.block, item, root, &item_path, diagnostics);
            }
        },
        Some(item @ Value::Object(_)) => {
            validate_block(&nested.block, item, root, path, diagnostics);
        },
        _ => {},
    }
}

fn join_path(base: &str, name: &str) -> String {
    if base.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", base, name)
    }
}

fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn is_int64(value: &Value) -> bool {
    match value {
        Value::Number(n) => {
            n.is_i64()
                || n.as_f64()
                    .map(|f| f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64)
                    .unwrap_or(false)
        },
        _ => false,
    }
}

fn type_error(path: &str, expected: &str, got: &Value) -> Diagnostic {
    Diagnostic::error(format!("Invalid type for attribute '{}'", path))
        .with_detail(format!("Expected {}, got {}", expected, value_type_name(got)))
        .with_attribute(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::IdKind;
    use crate::schema::AttributeFlags;
    use serde_json::json;

    #[test]
    fn test_validate_required_string() {
        let schema = Schema::v0().with_attribute("name", Attribute::required_string());

        assert!(validate(&schema, &json!({"name": "fs1"})).is_empty());

        let diagnostics = validate(&schema, &json!({}));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute, Some("name".to_string()));

        assert_eq!(validate(&schema, &json!({"name": null})).len(), 1);

        let diagnostics = validate(&schema, &json!({"name": 123}));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("Invalid type"));
    }

    #[test]
    fn test_validate_computed_attribute_skipped() {
        let schema = Schema::v0().with_attribute("fqdn", Attribute::computed_string());
        assert!(validate(&schema, &json!({})).is_empty());
        assert!(validate(&schema, &json!({"fqdn": 123})).is_empty());
    }

    #[test]
    fn test_validate_int64() {
        let schema = Schema::v0().with_attribute("size_gb", Attribute::optional_int64());

        assert!(validate(&schema, &json!({"size_gb": 20})).is_empty());
        assert!(validate(&schema, &json!({"size_gb": 20.0})).is_empty());
        assert_eq!(validate(&schema, &json!({"size_gb": 20.5})).len(), 1);
        assert_eq!(validate(&schema, &json!({"size_gb": "20"})).len(), 1);
    }

    #[test]
    fn test_validate_map() {
        let schema = Schema::v0().with_attribute("tags", Attribute::optional_string_map());

        assert!(validate(&schema, &json!({"tags": {"env": "prod"}})).is_empty());

        let diagnostics = validate(&schema, &json!({"tags": {"env": "prod", "count": 42}}));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute, Some("tags.count".to_string()));
    }

    #[test]
    fn test_validate_set_attribute() {
        let schema = Schema::v0().with_attribute(
            "identity_ids",
            Attribute::new(AttributeType::set(AttributeType::String), AttributeFlags::required()),
        );

        assert!(validate(&schema, &json!({"identity_ids": ["a", "b"]})).is_empty());
        let diagnostics = validate(&schema, &json!({"identity_ids": ["a", 1]}));
        assert_eq!(diagnostics[0].attribute, Some("identity_ids.1".to_string()));
    }

    #[test]
    fn test_validate_nested_block_cardinality() {
        let schema = Schema::v0().with_block(
            "identity",
            NestedBlock::list(Block::new().with_attribute("type", Attribute::required_string()))
                .with_min_items(1)
                .with_max_items(1),
        );

        assert!(validate(&schema, &json!({"identity": [{"type": "UserAssigned"}]})).is_empty());

        let diagnostics = validate(&schema, &json!({"identity": []}));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("at least 1"));

        let diagnostics = validate(&schema, &json!({"identity": [{"type": "a"}, {"type": "b"}]}));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("at most 1"));

        let diagnostics = validate(&schema, &json!({"identity": [{"type": 1}]}));
        assert_eq!(diagnostics[0].attribute, Some("identity.0.type".to_string()));

        let diagnostics = validate(&schema, &json!({"identity": "oops"}));
        assert_eq!(diagnostics.len(), 1);
    }

    #[test]
    fn test_computed_block_may_be_absent() {
        let schema = Schema::v0().with_block(
            "storage",
            NestedBlock::single(Block::new()).with_min_items(1).computed(),
        );
        assert!(validate(&schema, &json!({})).is_empty());
    }

    #[test]
    fn test_constraints() {
        let schema = Schema::v0()
            .with_attribute(
                "create_mode",
                Attribute::optional_string().with_constraint(Constraint::OneOf(vec!["Default", "Replica"])),
            )
            .with_attribute(
                "start_ip_address",
                Attribute::optional_string().with_constraint(Constraint::Ipv4),
            )
            .with_attribute(
                "tenant_id",
                Attribute::optional_string().with_constraint(Constraint::Uuid),
            )
            .with_attribute(
                "point_in_time_restore_time_in_utc",
                Attribute::optional_string().with_constraint(Constraint::Rfc3339),
            )
            .with_attribute(
                "source_server_id",
                Attribute::optional_string().with_constraint(Constraint::ResourceId(IdKind::FlexibleServer)),
            )
            .with_attribute(
                "key_vault_key_id",
                Attribute::optional_string().with_constraint(Constraint::KeyVaultKeyId),
            );

        let valid = json!({
            "create_mode": "Replica",
            "start_ip_address": "10.0.0.1",
            "tenant_id": "72f988bf-86f1-41af-91ab-2d7cd011db47",
            "point_in_time_restore_time_in_utc": "2024-01-02T03:04:05Z",
            "source_server_id": "/subscriptions/00000000-0000-0000-0000-000000000000/resourceGroups/rg/providers/Microsoft.DBforMySQL/flexibleServers/src",
            "key_vault_key_id": "https://kv.vault.azure.net/keys/k/v1",
        });
        assert!(validate(&schema, &valid).is_empty());

        let invalid = json!({
            "create_mode": "replica",
            "start_ip_address": "10.0.0.256",
            "tenant_id": "not-a-uuid",
            "point_in_time_restore_time_in_utc": "yesterday",
            "source_server_id": "/subscriptions/x/resourceGroups/rg",
            "key_vault_key_id": "https://kv.vault.azure.net/secrets/k",
        });
        let diagnostics = validate(&schema, &invalid);
        assert_eq!(diagnostics.len(), 6);
        assert!(diagnostics.iter().all(|d| d.summary.starts_with("Invalid value")));
    }

    #[test]
    fn test_int_between() {
        let schema = Schema::v0().with_attribute(
            "backup_retention_days",
            Attribute::optional_int64().with_constraint(Constraint::IntBetween(1, 35)),
        );
        assert!(validate(&schema, &json!({"backup_retention_days": 35})).is_empty());
        let diagnostics = validate(&schema, &json!({"backup_retention_days": 0}));
        assert!(diagnostics[0].detail.as_deref().unwrap_or_default().contains("(1 - 35)"));
    }

    #[test]
    fn test_type_error_skips_constraints() {
        let schema = Schema::v0().with_attribute(
            "name",
            Attribute::optional_string().with_constraint(Constraint::Rule(NameRule::ServerName)),
        );
        assert_eq!(validate(&schema, &json!({"name": 42})).len(), 1);
    }

    #[test]
    fn test_conflicts_with() {
        let schema = Schema::v0()
            .with_attribute(
                "administrator_password",
                Attribute::optional_string().conflicts_with(&["administrator_password_wo"]),
            )
            .with_attribute(
                "administrator_password_wo",
                Attribute::optional_string().conflicts_with(&["administrator_password"]),
            );

        assert!(validate(&schema, &json!({"administrator_password": "x"})).is_empty());
        let diagnostics = validate(
            &schema,
            &json!({"administrator_password": "x", "administrator_password_wo": "y"}),
        );
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("conflicts with"));
    }

    #[test]
    fn test_required_with() {
        let schema = Schema::v0()
            .with_attribute(
                "administrator_password_wo_version",
                Attribute::optional_int64().required_with(&["administrator_password_wo"]),
            )
            .with_attribute("administrator_password_wo", Attribute::optional_string());

        assert!(validate(
            &schema,
            &json!({"administrator_password_wo_version": 1, "administrator_password_wo": "p"})
        )
        .is_empty());
        let diagnostics = validate(&schema, &json!({"administrator_password_wo_version": 1}));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(
            diagnostics[0].attribute,
            Some("administrator_password_wo_version".to_string())
        );
    }

    #[test]
    fn test_lookup() {
        let value = json!({"storage": [{"size_gb": 32}], "tags": {"env": "dev"}});
        assert_eq!(lookup(&value, "storage.0.size_gb"), Some(&json!(32)));
        assert_eq!(lookup(&value, "tags.env"), Some(&json!("dev")));
        assert_eq!(lookup(&value, "storage.1.size_gb"), None);
        assert_eq!(lookup(&value, "storage.x"), None);
    }

    #[test]
    fn test_is_set() {
        assert!(!is_set(None));
        assert!(!is_set(Some(&json!(null))));
        assert!(!is_set(Some(&json!(""))));
        assert!(!is_set(Some(&json!([]))));
        assert!(is_set(Some(&json!(false))));
        assert!(is_set(Some(&json!(0))));
    }
}
