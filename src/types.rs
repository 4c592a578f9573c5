//! Value types exchanged between the gRPC layer and the provider.
//!
//! State and configuration travel as JSON-encoded bytes on the wire; these
//! types hold the decoded [`serde_json::Value`]s.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Second field of the handshake line.
pub const PROTOCOL_VERSION: u32 = 1;

/// The handshake prefix printed on stdout at startup.
pub const HANDSHAKE_PREFIX: &str = "HEMMER_PROVIDER";

/// Decode JSON bytes from the wire. Empty bytes mean "no value".
pub fn decode_json(bytes: &[u8]) -> Result<Option<Value>, serde_json::Error> {
    if bytes.is_empty() {
        Ok(None)
    } else {
        serde_json::from_slice(bytes).map(Some)
    }
}

/// Encode a value for the wire. `null` is sent as empty bytes.
pub fn encode_json(value: &Value) -> Vec<u8> {
    if value.is_null() {
        Vec::new()
    } else {
        serde_json::to_vec(value).unwrap_or_default()
    }
}

/// One top-level attribute whose planned value differs from prior state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeChange {
    /// The attribute path, e.g. `storage` or `tags`.
    pub path: String,
    /// The value before the change (`None` when creating).
    pub before: Option<Value>,
    /// The value after the change (`None` when removing).
    pub after: Option<Value>,
}

impl AttributeChange {
    pub fn new(path: impl Into<String>, before: Option<Value>, after: Option<Value>) -> Self {
        Self {
            path: path.into(),
            before,
            after,
        }
    }

    /// An attribute that is being set for the first time.
    pub fn added(path: impl Into<String>, value: Value) -> Self {
        Self::new(path, None, Some(value))
    }

    /// An attribute that is being removed.
    pub fn removed(path: impl Into<String>, value: Value) -> Self {
        Self::new(path, Some(value), None)
    }

    /// An attribute whose value changes.
    pub fn modified(path: impl Into<String>, before: Value, after: Value) -> Self {
        Self::new(path, Some(before), Some(after))
    }
}

impl From<crate::generated::AttributeChange> for AttributeChange {
    fn from(proto: crate::generated::AttributeChange) -> Self {
        Self {
            path: proto.path,
            before: decode_json(&proto.before).ok().flatten(),
            after: decode_json(&proto.after).ok().flatten(),
        }
    }
}

impl From<AttributeChange> for crate::generated::AttributeChange {
    fn from(change: AttributeChange) -> Self {
        Self {
            path: change.path,
            before: change.before.as_ref().map(encode_json).unwrap_or_default(),
            after: change.after.as_ref().map(encode_json).unwrap_or_default(),
        }
    }
}

/// The result of planning a resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanResult {
    /// The planned state after apply.
    pub planned_state: Value,
    /// Per-attribute changes.
    pub changes: Vec<AttributeChange>,
    /// Whether the resource must be destroyed and recreated.
    pub requires_replace: bool,
    /// The attribute paths that force replacement.
    #[serde(default)]
    pub replace_paths: Vec<String>,
}

impl PlanResult {
    /// A plan with no changes.
    pub fn no_change(state: Value) -> Self {
        Self {
            planned_state: state,
            changes: Vec::new(),
            requires_replace: false,
            replace_paths: Vec::new(),
        }
    }

    /// A plan with changes.
    pub fn with_changes(planned_state: Value, changes: Vec<AttributeChange>, requires_replace: bool) -> Self {
        Self {
            planned_state,
            changes,
            requires_replace,
            replace_paths: Vec::new(),
        }
    }

    /// Mark `path` as forcing replacement.
    pub fn force_replace(&mut self, path: impl Into<String>) {
        let path = path.into();
        self.requires_replace = true;
        if !self.replace_paths.contains(&path) {
            self.replace_paths.push(path);
        }
    }

    /// Whether any change was planned.
    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty()
    }

    /// Find the change recorded for `path`.
    pub fn change(&self, path: &str) -> Option<&AttributeChange> {
        self.changes.iter().find(|c| c.path == path)
    }
}

/// A resource returned by import.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportedResource {
    pub resource_type: String,
    /// Full state as a read after import would produce it.
    pub state: Value,
}

impl ImportedResource {
    pub fn new(resource_type: impl Into<String>, state: Value) -> Self {
        Self {
            resource_type: resource_type.into(),
            state,
        }
    }
}

/// Answer to `GetMetadata`: the type names this provider serves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ProviderMetadata {
    pub resources: Vec<String>,
    pub data_sources: Vec<String>,
    pub capabilities: ServerCapabilities,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ServerCapabilities {
    /// Always false here. Destroy plans need no provider input.
    pub plan_destroy: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_wire_encoding() {
        assert_eq!(decode_json(b"").unwrap(), None);
        assert_eq!(decode_json(br#"{"name":"fs1"}"#).unwrap(), Some(json!({"name": "fs1"})));
        assert!(decode_json(b"{not json").is_err());

        assert!(encode_json(&Value::Null).is_empty());
        assert_eq!(encode_json(&json!({"a": 1})), br#"{"a":1}"#.to_vec());
    }

    #[test]
    fn test_attribute_change_conversion() {
        let change = AttributeChange::modified("sku_name", json!("B_Standard_B1s"), json!("GP_Standard_D2ds_v4"));
        let proto: crate::generated::AttributeChange = change.clone().into();
        assert_eq!(proto.path, "sku_name");

        let back: AttributeChange = proto.into();
        assert_eq!(back, change);

        let added: crate::generated::AttributeChange = AttributeChange::added("zone", json!("1")).into();
        assert!(added.before.is_empty());
    }

    #[test]
    fn test_force_replace() {
        let mut plan = PlanResult::with_changes(
            json!({"name": "fs2"}),
            vec![AttributeChange::modified("name", json!("fs1"), json!("fs2"))],
            false,
        );
        plan.force_replace("name");
        plan.force_replace("name");

        assert!(plan.requires_replace);
        assert_eq!(plan.replace_paths, vec!["name".to_string()]);
        assert!(plan.change("name").is_some());
        assert!(plan.change("zone").is_none());
        assert!(!PlanResult::no_change(json!({})).has_changes());
    }

    #[test]
    fn test_imported_resource() {
        let imported = ImportedResource::new("azurerm_mysql_flexible_server", json!({"id": "/subscriptions/x"}));
        assert_eq!(imported.resource_type, "azurerm_mysql_flexible_server");
        assert_eq!(imported.state["id"], "/subscriptions/x");
    }
}
