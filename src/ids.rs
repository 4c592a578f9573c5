//! Azure resource ID parsing and formatting.
//!
//! Every ARM resource ID is a fixed sequence of static segments (such as
//! `resourceGroups` or `Microsoft.DBforMySQL`) and user-supplied values. Each
//! [`IdKind`] describes that sequence once; the typed ID structs below are
//! generated from it and share a single parser.
//!
//! ```
//! use hemmer_provider_azurerm_mysql::ids::FlexibleServerId;
//!
//! let id = FlexibleServerId::parse(
//!     "/subscriptions/00000000-0000-0000-0000-000000000000/resourceGroups/rg1/providers/Microsoft.DBforMySQL/flexibleServers/fs1",
//! )
//! .unwrap();
//! assert_eq!(id.flexible_server_name, "fs1");
//! ```

use std::fmt;

use thiserror::Error;

use crate::error::ProviderError;

const MYSQL_NAMESPACE: &str = "Microsoft.DBforMySQL";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Segment {
    Static(&'static str),
    User(&'static str),
}

use Segment::{Static, User};

const RESOURCE_GROUP: &[Segment] = &[
    Static("subscriptions"),
    User("subscriptionId"),
    Static("resourceGroups"),
    User("resourceGroupName"),
];

macro_rules! segments {
    ($($seg:expr),* $(,)?) => {
        &[
            Static("subscriptions"),
            User("subscriptionId"),
            Static("resourceGroups"),
            User("resourceGroupName"),
            Static("providers"),
            $($seg),*
        ]
    };
}

const FLEXIBLE_SERVER: &[Segment] = segments![
    Static(MYSQL_NAMESPACE),
    Static("flexibleServers"),
    User("flexibleServerName"),
];
const FLEXIBLE_SERVER_DATABASE: &[Segment] = segments![
    Static(MYSQL_NAMESPACE),
    Static("flexibleServers"),
    User("flexibleServerName"),
    Static("databases"),
    User("databaseName"),
];
const FLEXIBLE_SERVER_FIREWALL_RULE: &[Segment] = segments![
    Static(MYSQL_NAMESPACE),
    Static("flexibleServers"),
    User("flexibleServerName"),
    Static("firewallRules"),
    User("firewallRuleName"),
];
const FLEXIBLE_SERVER_CONFIGURATION: &[Segment] = segments![
    Static(MYSQL_NAMESPACE),
    Static("flexibleServers"),
    User("flexibleServerName"),
    Static("configurations"),
    User("configurationName"),
];
const FLEXIBLE_SERVER_AAD_ADMINISTRATOR: &[Segment] = segments![
    Static(MYSQL_NAMESPACE),
    Static("flexibleServers"),
    User("flexibleServerName"),
    Static("administrators"),
    Static("ActiveDirectory"),
];
const SERVER: &[Segment] = segments![
    Static(MYSQL_NAMESPACE),
    Static("servers"),
    User("serverName"),
];
const DATABASE: &[Segment] = segments![
    Static(MYSQL_NAMESPACE),
    Static("servers"),
    User("serverName"),
    Static("databases"),
    User("databaseName"),
];
const FIREWALL_RULE: &[Segment] = segments![
    Static(MYSQL_NAMESPACE),
    Static("servers"),
    User("serverName"),
    Static("firewallRules"),
    User("firewallRuleName"),
];
const CONFIGURATION: &[Segment] = segments![
    Static(MYSQL_NAMESPACE),
    Static("servers"),
    User("serverName"),
    Static("configurations"),
    User("configurationName"),
];
const SERVER_AAD_ADMINISTRATOR: &[Segment] = segments![
    Static(MYSQL_NAMESPACE),
    Static("servers"),
    User("serverName"),
    Static("administrators"),
    Static("activeDirectory"),
];
const SERVER_KEY: &[Segment] = segments![
    Static(MYSQL_NAMESPACE),
    Static("servers"),
    User("serverName"),
    Static("keys"),
    User("keyName"),
];
const VIRTUAL_NETWORK_RULE: &[Segment] = segments![
    Static(MYSQL_NAMESPACE),
    Static("servers"),
    User("serverName"),
    Static("virtualNetworkRules"),
    User("virtualNetworkRuleName"),
];
const SUBNET: &[Segment] = segments![
    Static("Microsoft.Network"),
    Static("virtualNetworks"),
    User("virtualNetworkName"),
    Static("subnets"),
    User("subnetName"),
];
const USER_ASSIGNED_IDENTITY: &[Segment] = segments![
    Static("Microsoft.ManagedIdentity"),
    Static("userAssignedIdentities"),
    User("userAssignedIdentityName"),
];
const PRIVATE_DNS_ZONE: &[Segment] = segments![
    Static("Microsoft.Network"),
    Static("privateDnsZones"),
    User("privateDnsZoneName"),
];

/// The kinds of ARM resource IDs this provider understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdKind {
    /// A resource group.
    ResourceGroup,
    /// A MySQL flexible server.
    FlexibleServer,
    /// A database on a flexible server.
    FlexibleServerDatabase,
    /// A firewall rule on a flexible server.
    FlexibleServerFirewallRule,
    /// A server parameter on a flexible server.
    FlexibleServerConfiguration,
    /// The Entra ID administrator of a flexible server.
    FlexibleServerAzureADAdministrator,
    /// A MySQL single server.
    Server,
    /// A database on a single server.
    Database,
    /// A firewall rule on a single server.
    FirewallRule,
    /// A server parameter on a single server.
    Configuration,
    /// The Entra ID administrator of a single server.
    ServerAzureADAdministrator,
    /// A customer-managed key attached to a single server.
    ServerKey,
    /// A virtual network rule on a single server.
    VirtualNetworkRule,
    /// A virtual network subnet.
    Subnet,
    /// A user-assigned managed identity.
    UserAssignedIdentity,
    /// A private DNS zone.
    PrivateDnsZone,
}

impl IdKind {
    fn segments(self) -> &'static [Segment] {
        match self {
            Self::ResourceGroup => RESOURCE_GROUP,
            Self::FlexibleServer => FLEXIBLE_SERVER,
            Self::FlexibleServerDatabase => FLEXIBLE_SERVER_DATABASE,
            Self::FlexibleServerFirewallRule => FLEXIBLE_SERVER_FIREWALL_RULE,
            Self::FlexibleServerConfiguration => FLEXIBLE_SERVER_CONFIGURATION,
            Self::FlexibleServerAzureADAdministrator => FLEXIBLE_SERVER_AAD_ADMINISTRATOR,
            Self::Server => SERVER,
            Self::Database => DATABASE,
            Self::FirewallRule => FIREWALL_RULE,
            Self::Configuration => CONFIGURATION,
            Self::ServerAzureADAdministrator => SERVER_AAD_ADMINISTRATOR,
            Self::ServerKey => SERVER_KEY,
            Self::VirtualNetworkRule => VIRTUAL_NETWORK_RULE,
            Self::Subnet => SUBNET,
            Self::UserAssignedIdentity => USER_ASSIGNED_IDENTITY,
            Self::PrivateDnsZone => PRIVATE_DNS_ZONE,
        }
    }

    /// Human-readable name used in messages.
    pub fn label(self) -> &'static str {
        match self {
            Self::ResourceGroup => "Resource Group",
            Self::FlexibleServer => "Flexible Server",
            Self::FlexibleServerDatabase => "Flexible Server Database",
            Self::FlexibleServerFirewallRule => "Flexible Server Firewall Rule",
            Self::FlexibleServerConfiguration => "Flexible Server Configuration",
            Self::FlexibleServerAzureADAdministrator => "Flexible Server Azure AD Administrator",
            Self::Server => "Server",
            Self::Database => "Database",
            Self::FirewallRule => "Firewall Rule",
            Self::Configuration => "Configuration",
            Self::ServerAzureADAdministrator => "Server Azure AD Administrator",
            Self::ServerKey => "Server Key",
            Self::VirtualNetworkRule => "Virtual Network Rule",
            Self::Subnet => "Subnet",
            Self::UserAssignedIdentity => "User Assigned Identity",
            Self::PrivateDnsZone => "Private DNS Zone",
        }
    }

    /// The expected format, e.g. `/subscriptions/{subscriptionId}/resourceGroups/...`.
    pub fn format(self) -> String {
        self.segments()
            .iter()
            .map(|segment| match segment {
                Static(value) => format!("/{}", value),
                User(name) => format!("/{{{}}}", name),
            })
            .collect()
    }

    /// Check that `input` is a valid ID of this kind.
    pub fn validate(self, input: &str) -> Result<(), IdParseError> {
        parse_segments(self, input, false).map(|_| ())
    }
}

impl fmt::Display for IdKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Errors produced while parsing a resource ID.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("parsing {input:?} as a {kind} ID: {reason} (expected format {format})", format = .kind.format())]
pub struct IdParseError {
    /// The kind of ID that was expected.
    pub kind: IdKind,
    /// The rejected input.
    pub input: String,
    /// Why parsing failed.
    pub reason: String,
}

impl From<IdParseError> for ProviderError {
    fn from(err: IdParseError) -> Self {
        ProviderError::Validation(err.to_string())
    }
}

fn parse_segments(kind: IdKind, input: &str, insensitive: bool) -> Result<Vec<String>, IdParseError> {
    let fail = |reason: String| IdParseError {
        kind,
        input: input.to_string(),
        reason,
    };

    let Some(rest) = input.strip_prefix('/') else {
        return Err(fail("the ID must start with '/'".to_string()));
    };
    let parts: Vec<&str> = rest.split('/').collect();
    let expected = kind.segments();

    if parts.len() != expected.len() {
        return Err(fail(format!(
            "expected {} segments but got {}",
            expected.len(),
            parts.len()
        )));
    }

    let mut values = Vec::new();
    for (part, segment) in parts.iter().zip(expected) {
        match segment {
            Static(want) => {
                let matches = if insensitive {
                    part.eq_ignore_ascii_case(want)
                } else {
                    part == want
                };
                if !matches {
                    return Err(fail(format!(
                        "expected the static segment {:?} but got {:?}",
                        want, part
                    )));
                }
            },
            User(name) => {
                if part.is_empty() {
                    return Err(fail(format!("the segment {:?} was empty", name)));
                }
                values.push((*part).to_string());
            },
        }
    }
    Ok(values)
}

fn format_segments(kind: IdKind, values: &[&str]) -> String {
    let mut values = values.iter();
    kind.segments()
        .iter()
        .map(|segment| match segment {
            Static(value) => format!("/{}", value),
            User(_) => format!("/{}", values.next().copied().unwrap_or_default()),
        })
        .collect()
}

/// Behaviour shared by every typed resource ID.
pub trait ResourceId: Sized + fmt::Display {
    /// The kind of this ID.
    const KIND: IdKind;

    /// Build the ID from user segment values in format order.
    fn from_values(values: Vec<String>) -> Self;

    /// User segment values in format order.
    fn values(&self) -> Vec<&str>;

    /// Parse an ID, requiring static segments to match exactly.
    fn parse(input: &str) -> Result<Self, IdParseError> {
        parse_segments(Self::KIND, input, false).map(Self::from_values)
    }

    /// Parse an ID returned by ARM, whose static segments may differ in case.
    fn parse_insensitively(input: &str) -> Result<Self, IdParseError> {
        parse_segments(Self::KIND, input, true).map(Self::from_values)
    }

    /// The formatted ID.
    fn id(&self) -> String {
        format_segments(Self::KIND, &self.values())
    }
}

macro_rules! resource_id {
    ($(#[$doc:meta])* $name:ident => $kind:ident { $($field:ident),+ $(,)? }) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        pub struct $name {
            $(
                #[allow(missing_docs)]
                pub $field: String,
            )+
        }

        impl $name {
            /// Build the ID from its components.
            pub fn new($($field: impl Into<String>),+) -> Self {
                Self { $($field: $field.into()),+ }
            }

            /// Parse an ID, requiring static segments to match exactly.
            pub fn parse(input: &str) -> Result<Self, IdParseError> {
                <Self as ResourceId>::parse(input)
            }

            /// Parse an ID returned by ARM, whose static segments may differ in case.
            pub fn parse_insensitively(input: &str) -> Result<Self, IdParseError> {
                <Self as ResourceId>::parse_insensitively(input)
            }

            /// The formatted ID.
            pub fn id(&self) -> String {
                <Self as ResourceId>::id(self)
            }
        }

        impl ResourceId for $name {
            const KIND: IdKind = IdKind::$kind;

            fn from_values(values: Vec<String>) -> Self {
                let mut values = values.into_iter();
                Self { $($field: values.next().unwrap_or_default()),+ }
            }

            fn values(&self) -> Vec<&str> {
                vec![$(self.$field.as_str()),+]
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{} {:?}", IdKind::$kind.label(), self.id())
            }
        }
    };
}

resource_id! {
    /// `/subscriptions/{subscriptionId}/resourceGroups/{resourceGroupName}`
    ResourceGroupId => ResourceGroup { subscription_id, resource_group_name }
}

resource_id! {
    /// A MySQL flexible server.
    FlexibleServerId => FlexibleServer { subscription_id, resource_group_name, flexible_server_name }
}

resource_id! {
    /// A database on a MySQL flexible server.
    FlexibleServerDatabaseId => FlexibleServerDatabase {
        subscription_id, resource_group_name, flexible_server_name, database_name
    }
}

resource_id! {
    /// A firewall rule on a MySQL flexible server.
    FlexibleServerFirewallRuleId => FlexibleServerFirewallRule {
        subscription_id, resource_group_name, flexible_server_name, firewall_rule_name
    }
}

resource_id! {
    /// A server parameter on a MySQL flexible server.
    FlexibleServerConfigurationId => FlexibleServerConfiguration {
        subscription_id, resource_group_name, flexible_server_name, configuration_name
    }
}

resource_id! {
    /// The Entra ID administrator of a flexible server (a singleton child).
    FlexibleServerAzureADAdministratorId => FlexibleServerAzureADAdministrator {
        subscription_id, resource_group_name, flexible_server_name
    }
}

resource_id! {
    /// A MySQL single server.
    ServerId => Server { subscription_id, resource_group_name, server_name }
}

resource_id! {
    /// A database on a MySQL single server.
    DatabaseId => Database { subscription_id, resource_group_name, server_name, database_name }
}

resource_id! {
    /// A firewall rule on a MySQL single server.
    FirewallRuleId => FirewallRule {
        subscription_id, resource_group_name, server_name, firewall_rule_name
    }
}

resource_id! {
    /// A server parameter on a MySQL single server.
    ConfigurationId => Configuration {
        subscription_id, resource_group_name, server_name, configuration_name
    }
}

resource_id! {
    /// The Entra ID administrator of a single server.
    ServerAzureADAdministratorId => ServerAzureADAdministrator {
        subscription_id, resource_group_name, server_name
    }
}

resource_id! {
    /// A customer-managed key on a single server.
    ServerKeyId => ServerKey { subscription_id, resource_group_name, server_name, key_name }
}

resource_id! {
    /// A virtual network rule on a single server.
    VirtualNetworkRuleId => VirtualNetworkRule {
        subscription_id, resource_group_name, server_name, virtual_network_rule_name
    }
}

resource_id! {
    /// A virtual network subnet.
    SubnetId => Subnet { subscription_id, resource_group_name, virtual_network_name, subnet_name }
}

resource_id! {
    /// A user-assigned managed identity.
    UserAssignedIdentityId => UserAssignedIdentity {
        subscription_id, resource_group_name, user_assigned_identity_name
    }
}

resource_id! {
    /// A private DNS zone.
    PrivateDnsZoneId => PrivateDnsZone { subscription_id, resource_group_name, private_dns_zone_name }
}

impl FlexibleServerId {
    /// The ID of this server's resource group.
    pub fn resource_group_id(&self) -> ResourceGroupId {
        ResourceGroupId::new(&self.subscription_id, &self.resource_group_name)
    }
}

impl ServerId {
    /// The ID of this server's resource group.
    pub fn resource_group_id(&self) -> ResourceGroupId {
        ResourceGroupId::new(&self.subscription_id, &self.resource_group_name)
    }
}

/// A Key Vault key ID: `https://{vault}.vault.azure.net/keys/{name}[/{version}]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyVaultKeyId {
    /// The vault host, e.g. `myvault.vault.azure.net`.
    pub host: String,
    /// The key name.
    pub name: String,
    /// The key version, when pinned.
    pub version: Option<String>,
}

impl KeyVaultKeyId {
    /// Parse a key ID; the version segment is optional.
    pub fn parse(input: &str) -> Result<Self, ProviderError> {
        let invalid = |reason: &str| {
            ProviderError::Validation(format!(
                "parsing {:?} as a Key Vault Key ID: {}",
                input, reason
            ))
        };

        let url = reqwest::Url::parse(input).map_err(|e| invalid(&e.to_string()))?;
        if url.scheme() != "https" {
            return Err(invalid("the scheme must be https"));
        }
        let host = url
            .host_str()
            .filter(|host| host.contains('.'))
            .ok_or_else(|| invalid("expected a vault host name"))?
            .to_string();

        let segments: Vec<&str> = url
            .path_segments()
            .map(|s| s.filter(|part| !part.is_empty()).collect())
            .unwrap_or_default();
        match segments.as_slice() {
            ["keys", name] => Ok(Self {
                host,
                name: (*name).to_string(),
                version: None,
            }),
            ["keys", name, version] => Ok(Self {
                host,
                name: (*name).to_string(),
                version: Some((*version).to_string()),
            }),
            _ => Err(invalid("expected the path /keys/{name}[/{version}]")),
        }
    }

    /// The vault name (first label of the host).
    pub fn vault_name(&self) -> &str {
        self.host.split('.').next().unwrap_or(&self.host)
    }

    /// The formatted key ID.
    pub fn id(&self) -> String {
        match &self.version {
            Some(version) => format!("https://{}/keys/{}/{}", self.host, self.name, version),
            None => format!("https://{}/keys/{}", self.host, self.name),
        }
    }
}

impl fmt::Display for KeyVaultKeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key Vault Key {:?}", self.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUB: &str = "00000000-0000-0000-0000-000000000000";

    #[test]
    fn test_flexible_server_id_round_trip() {
        let id = FlexibleServerId::new(SUB, "rg1", "fs1");
        let formatted = id.id();
        assert_eq!(
            formatted,
            format!(
                "/subscriptions/{}/resourceGroups/rg1/providers/Microsoft.DBforMySQL/flexibleServers/fs1",
                SUB
            )
        );
        assert_eq!(FlexibleServerId::parse(&formatted).unwrap(), id);
    }

    #[test]
    fn test_parse_rejects_wrong_case_unless_insensitive() {
        let input = format!(
            "/subscriptions/{}/resourcegroups/rg1/providers/Microsoft.DBforMySQL/flexibleservers/fs1",
            SUB
        );
        let err = FlexibleServerId::parse(&input).unwrap_err();
        assert!(err.reason.contains("resourceGroups"));

        let id = FlexibleServerId::parse_insensitively(&input).unwrap();
        assert_eq!(id.resource_group_name, "rg1");
        // formatting always uses canonical casing
        assert!(id.id().contains("/resourceGroups/rg1/"));
        assert!(id.id().contains("/flexibleServers/fs1"));
    }

    #[test]
    fn test_parse_rejects_segment_count_and_empty_values() {
        let short = format!("/subscriptions/{}/resourceGroups/rg1", SUB);
        let err = ServerId::parse(&short).unwrap_err();
        assert!(err.reason.contains("expected 8 segments"));

        let empty = format!(
            "/subscriptions/{}/resourceGroups//providers/Microsoft.DBforMySQL/servers/s1",
            SUB
        );
        let err = ServerId::parse(&empty).unwrap_err();
        assert!(err.reason.contains("resourceGroupName"));

        let trailing = format!(
            "/subscriptions/{}/resourceGroups/rg1/providers/Microsoft.DBforMySQL/servers/s1/",
            SUB
        );
        assert!(ServerId::parse(&trailing).is_err());

        assert!(ServerId::parse("subscriptions/x").is_err());
    }

    #[test]
    fn test_single_server_id_does_not_parse_as_flexible() {
        let id = ServerId::new(SUB, "rg1", "s1").id();
        assert!(FlexibleServerId::parse(&id).is_err());
        assert!(IdKind::Server.validate(&id).is_ok());
        assert!(IdKind::FlexibleServer.validate(&id).is_err());
    }

    #[test]
    fn test_singleton_administrator_ids() {
        let id = FlexibleServerAzureADAdministratorId::new(SUB, "rg1", "fs1");
        assert!(id.id().ends_with("/flexibleServers/fs1/administrators/ActiveDirectory"));

        let single = ServerAzureADAdministratorId::new(SUB, "rg1", "s1");
        assert!(single.id().ends_with("/servers/s1/administrators/activeDirectory"));
        assert_eq!(ServerAzureADAdministratorId::parse(&single.id()).unwrap(), single);
    }

    #[test]
    fn test_child_ids() {
        let db = FlexibleServerDatabaseId::new(SUB, "rg1", "fs1", "db1");
        assert!(db.id().ends_with("/flexibleServers/fs1/databases/db1"));

        let rule = VirtualNetworkRuleId::new(SUB, "rg1", "s1", "vnr1");
        let parsed = VirtualNetworkRuleId::parse(&rule.id()).unwrap();
        assert_eq!(parsed.virtual_network_rule_name, "vnr1");

        let subnet = SubnetId::parse(&format!(
            "/subscriptions/{}/resourceGroups/net/providers/Microsoft.Network/virtualNetworks/vnet1/subnets/sn1",
            SUB
        ))
        .unwrap();
        assert_eq!(subnet.virtual_network_name, "vnet1");
        assert_eq!(subnet.subnet_name, "sn1");
    }

    #[test]
    fn test_error_message_names_format() {
        let err = FlexibleServerFirewallRuleId::parse("/nope").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("Flexible Server Firewall Rule"));
        assert!(message.contains("{firewallRuleName}"));
    }

    #[test]
    fn test_display() {
        let id = ServerKeyId::new(SUB, "rg1", "s1", "vault_key_v1");
        assert!(id.to_string().starts_with("Server Key \"/subscriptions/"));
    }

    #[test]
    fn test_key_vault_key_id() {
        let key = KeyVaultKeyId::parse("https://myvault.vault.azure.net/keys/mykey/0123abcd").unwrap();
        assert_eq!(key.vault_name(), "myvault");
        assert_eq!(key.name, "mykey");
        assert_eq!(key.version.as_deref(), Some("0123abcd"));
        assert_eq!(key.id(), "https://myvault.vault.azure.net/keys/mykey/0123abcd");

        let versionless = KeyVaultKeyId::parse("https://myvault.vault.azure.net/keys/mykey").unwrap();
        assert!(versionless.version.is_none());

        assert!(KeyVaultKeyId::parse("http://myvault.vault.azure.net/keys/mykey").is_err());
        assert!(KeyVaultKeyId::parse("https://myvault.vault.azure.net/secrets/mykey").is_err());
        assert!(KeyVaultKeyId::parse("not a url").is_err());
    }
}
