//! Schema-driven plan computation.
//!
//! [`diff`] turns a prior state and a proposed state into a [`PlanResult`].
//! Resources refine the result afterwards (see
//! [`crate::resources::Resource::customize_plan`]) for replace rules that
//! depend on values rather than on `force_new` alone.

use serde_json::{Map, Value};

use crate::schema::{Block, Schema};
use crate::types::{AttributeChange, PlanResult};

/// Compute the plan for moving from `prior` to `proposed`.
///
/// - `prior` of `None` (or null) plans a create: defaults are filled in and
///   every set attribute is reported as added.
/// - A null `proposed` plans a destroy.
/// - Otherwise computed attributes missing from `proposed` keep their prior
///   value, changes are reported per top-level attribute or block, and any
///   change to a `force_new` attribute (at any depth) requires replacement.
pub fn diff(schema: &Schema, prior: Option<&Value>, proposed: &Value) -> PlanResult {
    let prior = prior.filter(|p| !p.is_null());

    if proposed.is_null() {
        let changes = prior
            .and_then(Value::as_object)
            .map(|obj| {
                sorted(obj)
                    .filter(|(_, v)| !v.is_null())
                    .map(|(k, v)| AttributeChange::removed(k.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default();
        return PlanResult::with_changes(Value::Null, changes, false);
    }

    let mut planned = proposed.clone();
    schema.block.apply_defaults(&mut planned);

    let Some(prior) = prior else {
        let changes = planned
            .as_object()
            .map(|obj| {
                sorted(obj)
                    .filter(|(_, v)| !v.is_null())
                    .map(|(k, v)| AttributeChange::added(k.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default();
        return PlanResult::with_changes(planned, changes, false);
    };

    carry_computed(&schema.block, prior, &mut planned);

    let mut result = PlanResult::no_change(Value::Null);
    let empty = Map::new();
    let prior_obj = prior.as_object().unwrap_or(&empty);
    let planned_obj = planned.as_object().unwrap_or(&empty);

    let mut names: Vec<&String> = schema
        .block
        .attributes
        .keys()
        .chain(schema.block.blocks.keys())
        .collect();
    names.sort();

    for name in names {
        let before = prior_obj.get(name).filter(|v| !is_empty(v));
        let after = planned_obj.get(name).filter(|v| !is_empty(v));
        if before == after {
            continue;
        }
        result
            .changes
            .push(AttributeChange::new(name.clone(), before.cloned(), after.cloned()));
    }

    let mut replace = Vec::new();
    collect_force_new(&schema.block, Some(prior), Some(&planned), "", &mut replace);
    for path in replace {
        result.force_replace(path);
    }

    result.planned_state = planned;
    result
}

/// Copy prior values into `planned` for computed attributes and computed
/// blocks the configuration leaves unset.
fn carry_computed(block: &Block, prior: &Value, planned: &mut Value) {
    let (Some(prior), Some(planned)) = (prior.as_object(), planned.as_object_mut()) else {
        return;
    };

    for (name, attr) in &block.attributes {
        if !attr.flags.computed {
            continue;
        }
        let unset = matches!(planned.get(name), None | Some(Value::Null));
        if unset {
            if let Some(value) = prior.get(name) {
                planned.insert(name.clone(), value.clone());
            }
        }
    }

    for (name, nested) in &block.blocks {
        let Some(prior_value) = prior.get(name) else {
            continue;
        };
        if matches!(planned.get(name), None | Some(Value::Null)) {
            if nested.computed {
                planned.insert(name.clone(), prior_value.clone());
            }
            continue;
        }
        if let (Value::Array(prior_items), Some(Value::Array(planned_items))) =
            (prior_value, planned.get_mut(name))
        {
            for (p, n) in prior_items.iter().zip(planned_items.iter_mut()) {
                carry_computed(&nested.block, p, n);
            }
        }
    }
}

fn collect_force_new(
    block: &Block,
    prior: Option<&Value>,
    planned: Option<&Value>,
    path: &str,
    out: &mut Vec<String>,
) {
    for (name, attr) in &block.attributes {
        if !attr.force_new {
            continue;
        }
        let before = prior.and_then(|p| p.get(name)).filter(|v| !v.is_null());
        let after = planned.and_then(|p| p.get(name)).filter(|v| !v.is_null());
        if before != after {
            out.push(join(path, name));
        }
    }

    for (name, nested) in &block.blocks {
        let before = items(prior.and_then(|p| p.get(name)));
        let after = items(planned.and_then(|p| p.get(name)));
        let count = before.len().max(after.len());
        for i in 0..count {
            collect_force_new(
                &nested.block,
                before.get(i).copied(),
                after.get(i).copied(),
                &format!("{}.{}", join(path, name), i),
                out,
            );
        }
    }
    out.sort();
}

fn items(value: Option<&Value>) -> Vec<&Value> {
    match value {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(obj @ Value::Object(_)) => vec![obj],
        _ => Vec::new(),
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

fn sorted(obj: &Map<String, Value>) -> impl Iterator<Item = (&String, &Value)> {
    let mut entries: Vec<_> = obj.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    entries.into_iter()
}

fn join(base: &str, name: &str) -> String {
    if base.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", base, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Attribute, NestedBlock};
    use serde_json::json;

    fn schema() -> Schema {
        Schema::v0()
            .with_attribute("id", Attribute::computed_string())
            .with_attribute("name", Attribute::required_string().with_force_new())
            .with_attribute("fqdn", Attribute::computed_string())
            .with_attribute("zone", Attribute::optional_computed_string())
            .with_attribute("backup_retention_days", Attribute::optional_int64().with_default(json!(7)))
            .with_attribute("tags", Attribute::optional_string_map())
            .with_block(
                "storage",
                NestedBlock::list(
                    Block::new()
                        .with_attribute("size_gb", Attribute::optional_computed_int64())
                        .with_attribute("iops", Attribute::optional_computed_int64()),
                )
                .with_max_items(1)
                .computed(),
            )
            .with_block(
                "customer_managed_key",
                NestedBlock::list(
                    Block::new().with_attribute("key_vault_key_id", Attribute::optional_string().with_force_new()),
                )
                .with_max_items(1),
            )
    }

    #[test]
    fn test_create_fills_defaults() {
        let plan = diff(&schema(), None, &json!({"name": "fs1"}));
        assert_eq!(plan.planned_state["backup_retention_days"], 7);
        assert!(!plan.requires_replace);
        let paths: Vec<_> = plan.changes.iter().map(|c| c.path.as_str()).collect();
        assert_eq!(paths, vec!["backup_retention_days", "name"]);
        assert!(plan.changes.iter().all(|c| c.before.is_none()));
    }

    #[test]
    fn test_null_prior_is_create() {
        let plan = diff(&schema(), Some(&Value::Null), &json!({"name": "fs1"}));
        assert_eq!(plan.planned_state["name"], "fs1");
        assert!(plan.changes.iter().all(|c| c.before.is_none()));
    }

    #[test]
    fn test_update_carries_computed_values() {
        let prior = json!({
            "id": "/subscriptions/x",
            "name": "fs1",
            "fqdn": "fs1.mysql.database.azure.com",
            "zone": "1",
            "backup_retention_days": 7,
            "storage": [{"size_gb": 20, "iops": 360}],
        });
        let plan = diff(&schema(), Some(&prior), &json!({"name": "fs1", "backup_retention_days": 14}));

        assert_eq!(plan.planned_state["id"], "/subscriptions/x");
        assert_eq!(plan.planned_state["fqdn"], "fs1.mysql.database.azure.com");
        assert_eq!(plan.planned_state["zone"], "1");
        assert_eq!(plan.planned_state["storage"][0]["iops"], 360);
        assert_eq!(plan.changes.len(), 1);
        assert_eq!(plan.changes[0].path, "backup_retention_days");
        assert!(!plan.requires_replace);
    }

    #[test]
    fn test_update_nested_computed_attributes() {
        let prior = json!({"name": "fs1", "storage": [{"size_gb": 20, "iops": 360}]});
        let plan = diff(&schema(), Some(&prior), &json!({"name": "fs1", "storage": [{"size_gb": 32}]}));

        assert_eq!(plan.planned_state["storage"][0]["iops"], 360);
        let change = plan.change("storage").unwrap();
        assert_eq!(change.after, Some(json!([{"size_gb": 32, "iops": 360}])));
    }

    #[test]
    fn test_force_new_change_requires_replace() {
        let prior = json!({"name": "fs1", "backup_retention_days": 7});
        let plan = diff(&schema(), Some(&prior), &json!({"name": "fs2"}));
        assert!(plan.requires_replace);
        assert_eq!(plan.replace_paths, vec!["name".to_string()]);
    }

    #[test]
    fn test_nested_force_new() {
        let prior = json!({
            "name": "fs1",
            "customer_managed_key": [{"key_vault_key_id": "https://kv.vault.azure.net/keys/a/1"}],
        });
        let proposed = json!({
            "name": "fs1",
            "customer_managed_key": [{"key_vault_key_id": "https://kv.vault.azure.net/keys/a/2"}],
        });
        let plan = diff(&schema(), Some(&prior), &proposed);
        assert!(plan.requires_replace);
        assert_eq!(plan.replace_paths, vec!["customer_managed_key.0.key_vault_key_id".to_string()]);
    }

    #[test]
    fn test_empty_and_missing_are_equal() {
        let prior = json!({"name": "fs1", "backup_retention_days": 7, "tags": {}});
        let plan = diff(&schema(), Some(&prior), &json!({"name": "fs1"}));
        assert!(!plan.has_changes());
    }

    #[test]
    fn test_destroy() {
        let prior = json!({"name": "fs1", "zone": "1", "fqdn": null});
        let plan = diff(&schema(), Some(&prior), &Value::Null);
        assert!(plan.planned_state.is_null());
        assert_eq!(plan.changes.len(), 2);
        assert!(plan.changes.iter().all(|c| c.after.is_none()));
    }
}
