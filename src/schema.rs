//! Attribute and block model for the provider, its resources and data sources.
//!
//! What the host needs (types, flags, defaults, nesting) serializes into
//! `GetSchema`. [`Constraint`]s and the `conflicts_with`/`required_with`
//! relations are skipped on the wire and enforced by [`crate::validation`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::ids::IdKind;

/// Value type of an attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeType {
    String,
    Int64,
    Bool,
    /// Unordered unique elements, e.g. `identity_ids`.
    Set(Box<AttributeType>),
    /// String keys to values, e.g. `tags`.
    Map(Box<AttributeType>),
}

impl AttributeType {
    pub fn set(element: AttributeType) -> Self {
        Self::Set(Box::new(element))
    }

    pub fn map(element: AttributeType) -> Self {
        Self::Map(Box::new(element))
    }
}

/// Who supplies an attribute: the configuration, Azure, or either.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AttributeFlags {
    pub required: bool,
    pub optional: bool,
    /// Read back from ARM.
    pub computed: bool,
    /// Redacted by the host in plan output.
    pub sensitive: bool,
}

impl AttributeFlags {
    pub fn required() -> Self {
        Self { required: true, ..Self::default() }
    }

    pub fn optional() -> Self {
        Self { optional: true, ..Self::default() }
    }

    pub fn computed() -> Self {
        Self { computed: true, ..Self::default() }
    }

    /// Optional in configuration; Azure picks a value when it is left out.
    pub fn optional_computed() -> Self {
        Self {
            optional: true,
            computed: true,
            ..Self::default()
        }
    }
}

/// Named validation rules that need more than a generic constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameRule {
    /// Flexible and single server names.
    ServerName,
    /// Flexible server `administrator_login`.
    FlexibleServerAdministratorLogin,
    /// Flexible server administrator password complexity.
    FlexibleServerAdministratorPassword,
    /// Flexible server `sku_name` such as `GP_Standard_D2ds_v4`.
    FlexibleServerSkuName,
    /// Single server `sku_name` such as `GP_Gen5_2`.
    SingleServerSkuName,
    /// Database names.
    DatabaseName,
    /// Firewall rule names.
    FirewallRuleName,
    /// Virtual network rule names.
    VirtualNetworkRuleName,
    /// Server configuration (parameter) names.
    ConfigurationName,
    /// Single server storage size in MB.
    StorageMb,
}

/// A value constraint checked during validation.
#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    /// The string must be one of the listed values (case-sensitive).
    OneOf(Vec<&'static str>),
    /// The integer must lie in `min..=max`.
    IntBetween(i64, i64),
    /// The string must not be empty or whitespace.
    NotEmpty,
    /// The string must be an RFC3339 timestamp.
    Rfc3339,
    /// The string must be an IPv4 address.
    Ipv4,
    /// The string must be a UUID.
    Uuid,
    /// The string must parse as an ARM resource ID of the given kind.
    ResourceId(IdKind),
    /// The string must be a Key Vault key ID, version optional.
    KeyVaultKeyId,
    Rule(NameRule),
}

/// One attribute of a block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    #[serde(rename = "type")]
    pub attr_type: AttributeType,
    #[serde(flatten)]
    pub flags: AttributeFlags,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// A change to this attribute means delete and recreate.
    #[serde(default)]
    pub force_new: bool,
    /// Filled into plans when the configuration leaves the attribute out.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
    #[serde(skip)]
    pub constraints: Vec<Constraint>,
    /// Sibling attributes that may not be set together with this one.
    #[serde(skip)]
    pub conflicts_with: Vec<&'static str>,
    /// Dotted paths from the root that must be set when this one is.
    #[serde(skip)]
    pub required_with: Vec<&'static str>,
}

impl Attribute {
    pub fn new(attr_type: AttributeType, flags: AttributeFlags) -> Self {
        Self {
            attr_type,
            flags,
            description: None,
            force_new: false,
            default: None,
            constraints: Vec::new(),
            conflicts_with: Vec::new(),
            required_with: Vec::new(),
        }
    }

    pub fn required_string() -> Self {
        Self::new(AttributeType::String, AttributeFlags::required())
    }

    pub fn optional_string() -> Self {
        Self::new(AttributeType::String, AttributeFlags::optional())
    }

    pub fn optional_computed_string() -> Self {
        Self::new(AttributeType::String, AttributeFlags::optional_computed())
    }

    pub fn computed_string() -> Self {
        Self::new(AttributeType::String, AttributeFlags::computed())
    }

    pub fn optional_int64() -> Self {
        Self::new(AttributeType::Int64, AttributeFlags::optional())
    }

    pub fn optional_computed_int64() -> Self {
        Self::new(AttributeType::Int64, AttributeFlags::optional_computed())
    }

    pub fn computed_int64() -> Self {
        Self::new(AttributeType::Int64, AttributeFlags::computed())
    }

    pub fn required_bool() -> Self {
        Self::new(AttributeType::Bool, AttributeFlags::required())
    }

    pub fn optional_bool() -> Self {
        Self::new(AttributeType::Bool, AttributeFlags::optional())
    }

    pub fn optional_computed_bool() -> Self {
        Self::new(AttributeType::Bool, AttributeFlags::optional_computed())
    }

    pub fn computed_bool() -> Self {
        Self::new(AttributeType::Bool, AttributeFlags::computed())
    }

    /// `map(string)`, the shape of `tags`.
    pub fn optional_string_map() -> Self {
        Self::new(AttributeType::map(AttributeType::String), AttributeFlags::optional())
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_force_new(mut self) -> Self {
        self.force_new = true;
        self
    }

    pub fn with_default(mut self, default: serde_json::Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn sensitive(mut self) -> Self {
        self.flags.sensitive = true;
        self
    }

    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    pub fn conflicts_with(mut self, names: &[&'static str]) -> Self {
        self.conflicts_with.extend_from_slice(names);
        self
    }

    pub fn required_with(mut self, paths: &[&'static str]) -> Self {
        self.required_with.extend_from_slice(paths);
        self
    }
}

/// How a nested block appears in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BlockNestingMode {
    /// At most one, e.g. `storage`. A bare object is accepted too.
    #[default]
    Single,
    /// Ordered repeats, e.g. `identity`.
    List,
}

/// A set of attributes plus child blocks. The root of every [`Schema`] is one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Block {
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub attributes: HashMap<String, Attribute>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub blocks: HashMap<String, NestedBlock>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Block {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_attribute(mut self, name: impl Into<String>, attr: Attribute) -> Self {
        self.attributes.insert(name.into(), attr);
        self
    }

    pub fn with_block(mut self, name: impl Into<String>, block: NestedBlock) -> Self {
        self.blocks.insert(name.into(), block);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Fill in defaults for attributes missing from `value`, recursing into
    /// nested blocks that are present.
    pub fn apply_defaults(&self, value: &mut serde_json::Value) {
        let serde_json::Value::Object(obj) = value else {
            return;
        };
        for (name, attr) in &self.attributes {
            if let Some(default) = &attr.default {
                let missing = matches!(obj.get(name), None | Some(serde_json::Value::Null));
                if missing {
                    obj.insert(name.clone(), default.clone());
                }
            }
        }
        for (name, nested) in &self.blocks {
            match obj.get_mut(name) {
                Some(serde_json::Value::Array(items)) => {
                    for item in items {
                        nested.block.apply_defaults(item);
                    }
                },
                Some(item @ serde_json::Value::Object(_)) => nested.block.apply_defaults(item),
                _ => {},
            }
        }
    }
}

/// A child block with its cardinality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NestedBlock {
    #[serde(flatten)]
    pub block: Block,
    #[serde(default)]
    pub nesting_mode: BlockNestingMode,
    #[serde(default)]
    pub min_items: u32,
    /// Zero means unbounded.
    #[serde(default)]
    pub max_items: u32,
    /// Azure fills the block in when it is not configured, so `min_items`
    /// is not enforced.
    #[serde(default)]
    pub computed: bool,
}

impl NestedBlock {
    fn with_mode(block: Block, nesting_mode: BlockNestingMode, max_items: u32) -> Self {
        Self {
            block,
            nesting_mode,
            min_items: 0,
            max_items,
            computed: false,
        }
    }

    pub fn single(block: Block) -> Self {
        Self::with_mode(block, BlockNestingMode::Single, 1)
    }

    pub fn list(block: Block) -> Self {
        Self::with_mode(block, BlockNestingMode::List, 0)
    }

    pub fn with_min_items(mut self, min: u32) -> Self {
        self.min_items = min;
        self
    }

    pub fn with_max_items(mut self, max: u32) -> Self {
        self.max_items = max;
        self
    }

    pub fn computed(mut self) -> Self {
        self.computed = true;
        self
    }
}

/// Versioned root block of a resource, data source or the provider config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Schema {
    #[serde(default)]
    pub version: u64,
    #[serde(flatten)]
    pub block: Block,
}

impl Schema {
    pub fn new(version: u64) -> Self {
        Self {
            version,
            block: Block::new(),
        }
    }

    /// Every type in this provider is still at schema version 0.
    pub fn v0() -> Self {
        Self::new(0)
    }

    pub fn with_attribute(mut self, name: impl Into<String>, attr: Attribute) -> Self {
        self.block.attributes.insert(name.into(), attr);
        self
    }

    pub fn with_block(mut self, name: impl Into<String>, block: NestedBlock) -> Self {
        self.block.blocks.insert(name.into(), block);
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.block.attributes.get(name)
    }
}

/// Everything `GetSchema` returns, keyed by type name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ProviderSchema {
    #[serde(default)]
    pub provider: Schema,
    #[serde(default)]
    pub resources: HashMap<String, Schema>,
    #[serde(default)]
    pub data_sources: HashMap<String, Schema>,
}

impl ProviderSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_provider_config(mut self, schema: Schema) -> Self {
        self.provider = schema;
        self
    }

    pub fn with_resource(mut self, name: impl Into<String>, schema: Schema) -> Self {
        self.resources.insert(name.into(), schema);
        self
    }

    pub fn with_data_source(mut self, name: impl Into<String>, schema: Schema) -> Self {
        self.data_sources.insert(name.into(), schema);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticSeverity {
    Error,
    Warning,
}

/// A validation or operation message returned to the host instead of a
/// gRPC failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: DiagnosticSeverity,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Dotted path such as `storage.0.iops`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
}

impl Diagnostic {
    fn with_severity(severity: DiagnosticSeverity, summary: impl Into<String>) -> Self {
        Self {
            severity,
            summary: summary.into(),
            detail: None,
            attribute: None,
        }
    }

    pub fn error(summary: impl Into<String>) -> Self {
        Self::with_severity(DiagnosticSeverity::Error, summary)
    }

    pub fn warning(summary: impl Into<String>) -> Self {
        Self::with_severity(DiagnosticSeverity::Warning, summary)
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attribute = Some(attribute.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == DiagnosticSeverity::Error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_attribute_flags() {
        let required = AttributeFlags::required();
        assert!(required.required);
        assert!(!required.optional);
        assert!(!required.computed);

        let optional_computed = AttributeFlags::optional_computed();
        assert!(!optional_computed.required);
        assert!(optional_computed.optional);
        assert!(optional_computed.computed);
    }

    #[test]
    fn test_attribute_builders() {
        let attr = Attribute::required_string()
            .with_description("The name of the MySQL Flexible Server")
            .with_force_new()
            .with_constraint(Constraint::Rule(NameRule::ServerName));

        assert_eq!(attr.attr_type, AttributeType::String);
        assert!(attr.flags.required);
        assert!(attr.force_new);
        assert_eq!(attr.constraints, vec![Constraint::Rule(NameRule::ServerName)]);
    }

    #[test]
    fn test_constraints_are_not_serialized() {
        let attr = Attribute::optional_string()
            .sensitive()
            .with_constraint(Constraint::NotEmpty)
            .conflicts_with(&["administrator_password_wo"]);

        let encoded = serde_json::to_value(&attr).unwrap();
        assert_eq!(encoded["sensitive"], true);
        assert!(encoded.get("constraints").is_none());
        assert!(encoded.get("conflicts_with").is_none());

        let decoded: Attribute = serde_json::from_value(encoded).unwrap();
        assert!(decoded.constraints.is_empty());
    }

    #[test]
    fn test_apply_defaults_recurses_into_blocks() {
        let block = Block::new()
            .with_attribute(
                "backup_retention_days",
                Attribute::optional_int64().with_default(json!(7)),
            )
            .with_block(
                "storage",
                NestedBlock::single(Block::new().with_attribute(
                    "auto_grow_enabled",
                    Attribute::optional_bool().with_default(json!(true)),
                )),
            );

        let mut value = json!({"storage": [{}]});
        block.apply_defaults(&mut value);
        assert_eq!(value["backup_retention_days"], 7);
        assert_eq!(value["storage"][0]["auto_grow_enabled"], true);

        let mut value = json!({"backup_retention_days": 14});
        block.apply_defaults(&mut value);
        assert_eq!(value["backup_retention_days"], 14);
        assert!(value.get("storage").is_none());
    }

    #[test]
    fn test_provider_schema() {
        let provider_schema = ProviderSchema::new()
            .with_provider_config(
                Schema::v0().with_attribute("client_secret", Attribute::optional_string().sensitive()),
            )
            .with_resource(
                "azurerm_mysql_database",
                Schema::v0()
                    .with_attribute("name", Attribute::required_string())
                    .with_attribute("id", Attribute::computed_string()),
            );

        assert!(provider_schema.provider.attribute("client_secret").is_some());
        assert!(provider_schema.resources.contains_key("azurerm_mysql_database"));
        assert!(provider_schema.data_sources.is_empty());
    }

    #[test]
    fn test_diagnostic() {
        let err = Diagnostic::error("Invalid configuration")
            .with_detail("`iops` can not be set if `io_scaling_enabled` is set to true")
            .with_attribute("storage.0.iops");

        assert!(err.is_error());
        assert_eq!(err.attribute, Some("storage.0.iops".to_string()));
        assert!(!Diagnostic::warning("heads up").is_error());
    }

    #[test]
    fn test_nested_block_modes() {
        let single = NestedBlock::single(Block::new()).computed();
        assert_eq!(single.nesting_mode, BlockNestingMode::Single);
        assert_eq!(single.max_items, 1);
        assert!(single.computed);

        let list = NestedBlock::list(Block::new())
            .with_min_items(1)
            .with_max_items(5);
        assert_eq!(list.nesting_mode, BlockNestingMode::List);
        assert_eq!(list.min_items, 1);
        assert_eq!(list.max_items, 5);
    }
}
