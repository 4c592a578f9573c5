//! Provider configuration.
//!
//! The provider block is deserialized into [`ProviderConfig`]; unset values
//! fall back to the usual `ARM_*` environment variables.

use std::fmt;

use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{ProviderError, Result};
use crate::schema::{Attribute, Constraint, Diagnostic, Schema};

/// Default Azure Resource Manager endpoint (public cloud).
pub const DEFAULT_RESOURCE_MANAGER_ENDPOINT: &str = "https://management.azure.com";

/// Default Microsoft Entra ID authority host (public cloud).
pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";

/// Raw provider configuration as written by the user.
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Subscription that owns the managed resources.
    pub subscription_id: Option<String>,
    /// Entra ID tenant used for client-credential authentication.
    pub tenant_id: Option<String>,
    /// Service principal application ID.
    pub client_id: Option<String>,
    /// Service principal secret.
    pub client_secret: Option<String>,
    /// A pre-acquired ARM bearer token; takes precedence over client credentials.
    pub access_token: Option<String>,
    /// ARM endpoint, for sovereign clouds.
    pub resource_manager_endpoint: Option<String>,
    /// Entra ID authority host, for sovereign clouds.
    pub authority_host: Option<String>,
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("subscription_id", &self.subscription_id)
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("resource_manager_endpoint", &self.resource_manager_endpoint)
            .field("authority_host", &self.authority_host)
            .finish()
    }
}

/// How the provider authenticates against ARM.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// A static bearer token.
    AccessToken(String),
    /// OAuth2 client credentials.
    ClientSecret {
        /// Tenant ID.
        tenant_id: String,
        /// Application ID.
        client_id: String,
        /// Client secret.
        client_secret: String,
    },
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AccessToken(_) => f.write_str("AccessToken(<redacted>)"),
            Self::ClientSecret {
                tenant_id,
                client_id,
                ..
            } => f
                .debug_struct("ClientSecret")
                .field("tenant_id", tenant_id)
                .field("client_id", client_id)
                .finish_non_exhaustive(),
        }
    }
}

/// Fully resolved settings used to build the ARM client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArmSettings {
    /// Subscription ID.
    pub subscription_id: String,
    /// ARM endpoint without a trailing slash.
    pub resource_manager_endpoint: String,
    /// Authority host without a trailing slash.
    pub authority_host: String,
    /// Credentials.
    pub credentials: Credentials,
}

impl ProviderConfig {
    /// Deserialize the provider block. A null block yields an empty config.
    pub fn from_value(value: &Value) -> Result<Self> {
        if value.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(value.clone())
            .map_err(|e| ProviderError::Configuration(format!("decoding provider configuration: {}", e)))
    }

    /// Fill unset values from the process environment.
    pub fn with_env_fallbacks(self) -> Self {
        self.with_fallbacks(|name| std::env::var(name).ok())
    }

    /// Fill unset values from `lookup`, keyed by environment variable name.
    pub fn with_fallbacks(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let fallback = |current: Option<String>, name: &str| {
            current
                .filter(|v| !v.is_empty())
                .or_else(|| lookup(name).filter(|v| !v.is_empty()))
        };
        self.subscription_id = fallback(self.subscription_id, "ARM_SUBSCRIPTION_ID");
        self.tenant_id = fallback(self.tenant_id, "ARM_TENANT_ID");
        self.client_id = fallback(self.client_id, "ARM_CLIENT_ID");
        self.client_secret = fallback(self.client_secret, "ARM_CLIENT_SECRET");
        self.access_token = fallback(self.access_token, "ARM_ACCESS_TOKEN");
        self
    }

    /// Report configuration problems without failing.
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        if self.subscription_id.is_none() {
            diagnostics.push(
                Diagnostic::error("Missing subscription ID")
                    .with_detail("set `subscription_id` or the ARM_SUBSCRIPTION_ID environment variable")
                    .with_attribute("subscription_id"),
            );
        }
        if self.access_token.is_none() {
            let missing: Vec<&str> = [
                ("tenant_id", self.tenant_id.is_none()),
                ("client_id", self.client_id.is_none()),
                ("client_secret", self.client_secret.is_none()),
            ]
            .into_iter()
            .filter_map(|(name, missing)| missing.then_some(name))
            .collect();
            if !missing.is_empty() {
                diagnostics.push(
                    Diagnostic::error("Missing credentials")
                        .with_detail(format!(
                            "either `access_token` or all of `tenant_id`, `client_id` and `client_secret` must be set; missing: {}",
                            missing.join(", ")
                        )),
                );
            }
        }
        for (name, endpoint) in [
            ("resource_manager_endpoint", &self.resource_manager_endpoint),
            ("authority_host", &self.authority_host),
        ] {
            if let Some(endpoint) = endpoint {
                if reqwest::Url::parse(endpoint).is_err() {
                    diagnostics.push(
                        Diagnostic::error(format!("Invalid URL for `{}`", name))
                            .with_detail(format!("{:?} is not a valid URL", endpoint))
                            .with_attribute(name),
                    );
                }
            }
        }
        diagnostics
    }

    /// Resolve into [`ArmSettings`], failing on the first problem.
    pub fn resolve(self) -> Result<ArmSettings> {
        if let Some(first) = self.diagnostics().into_iter().next() {
            let detail = first.detail.unwrap_or_default();
            return Err(ProviderError::Configuration(format!("{}: {}", first.summary, detail)));
        }

        let credentials = match (self.access_token, self.tenant_id, self.client_id, self.client_secret) {
            (Some(token), ..) => Credentials::AccessToken(token),
            (None, Some(tenant_id), Some(client_id), Some(client_secret)) => Credentials::ClientSecret {
                tenant_id,
                client_id,
                client_secret,
            },
            _ => return Err(ProviderError::Configuration("incomplete credentials".to_string())),
        };

        Ok(ArmSettings {
            subscription_id: self.subscription_id.unwrap_or_default(),
            resource_manager_endpoint: trim_endpoint(
                self.resource_manager_endpoint
                    .as_deref()
                    .unwrap_or(DEFAULT_RESOURCE_MANAGER_ENDPOINT),
            ),
            authority_host: trim_endpoint(self.authority_host.as_deref().unwrap_or(DEFAULT_AUTHORITY_HOST)),
            credentials,
        })
    }

    /// Schema of the provider block.
    pub fn schema() -> Schema {
        Schema::v0()
            .with_attribute(
                "subscription_id",
                Attribute::optional_string()
                    .with_description("Subscription ID. Falls back to ARM_SUBSCRIPTION_ID.")
                    .with_constraint(Constraint::Uuid),
            )
            .with_attribute(
                "tenant_id",
                Attribute::optional_string()
                    .with_description("Tenant ID. Falls back to ARM_TENANT_ID.")
                    .with_constraint(Constraint::Uuid),
            )
            .with_attribute(
                "client_id",
                Attribute::optional_string()
                    .with_description("Client (application) ID. Falls back to ARM_CLIENT_ID.")
                    .with_constraint(Constraint::Uuid),
            )
            .with_attribute(
                "client_secret",
                Attribute::optional_string()
                    .sensitive()
                    .with_description("Client secret. Falls back to ARM_CLIENT_SECRET."),
            )
            .with_attribute(
                "access_token",
                Attribute::optional_string()
                    .sensitive()
                    .with_description("Pre-acquired ARM bearer token. Falls back to ARM_ACCESS_TOKEN."),
            )
            .with_attribute(
                "resource_manager_endpoint",
                Attribute::optional_string()
                    .with_default(json!(DEFAULT_RESOURCE_MANAGER_ENDPOINT))
                    .with_description("Azure Resource Manager endpoint."),
            )
            .with_attribute(
                "authority_host",
                Attribute::optional_string()
                    .with_default(json!(DEFAULT_AUTHORITY_HOST))
                    .with_description("Microsoft Entra ID authority host."),
            )
    }
}

fn trim_endpoint(endpoint: &str) -> String {
    endpoint.trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const SUB: &str = "00000000-0000-0000-0000-000000000000";

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_access_token_config() {
        let settings = ProviderConfig::from_value(&json!({
            "subscription_id": SUB,
            "access_token": "token",
            "resource_manager_endpoint": "http://127.0.0.1:8080/",
        }))
        .unwrap()
        .resolve()
        .unwrap();

        assert_eq!(settings.subscription_id, SUB);
        assert_eq!(settings.resource_manager_endpoint, "http://127.0.0.1:8080");
        assert_eq!(settings.authority_host, DEFAULT_AUTHORITY_HOST);
        assert_eq!(settings.credentials, Credentials::AccessToken("token".to_string()));
    }

    #[test]
    fn test_env_fallbacks() {
        let config = ProviderConfig::from_value(&Value::Null)
            .unwrap()
            .with_fallbacks(env(&[
                ("ARM_SUBSCRIPTION_ID", SUB),
                ("ARM_TENANT_ID", "tenant"),
                ("ARM_CLIENT_ID", "client"),
                ("ARM_CLIENT_SECRET", "secret"),
            ]));
        let settings = config.resolve().unwrap();
        assert_eq!(settings.resource_manager_endpoint, DEFAULT_RESOURCE_MANAGER_ENDPOINT);
        assert!(matches!(settings.credentials, Credentials::ClientSecret { .. }));
    }

    #[test]
    fn test_explicit_values_win_over_env() {
        let config = ProviderConfig::from_value(&json!({"subscription_id": "explicit"}))
            .unwrap()
            .with_fallbacks(env(&[("ARM_SUBSCRIPTION_ID", "from-env")]));
        assert_eq!(config.subscription_id.as_deref(), Some("explicit"));
    }

    #[test]
    fn test_missing_values_are_reported() {
        let config = ProviderConfig::from_value(&json!({"client_id": "client"})).unwrap();
        let diagnostics = config.diagnostics();
        assert_eq!(diagnostics.len(), 2);
        assert!(diagnostics[1]
            .detail
            .as_deref()
            .unwrap_or_default()
            .contains("tenant_id, client_secret"));

        let err = config.resolve().unwrap_err();
        assert!(matches!(err, ProviderError::Configuration(_)));
    }

    #[test]
    fn test_invalid_endpoint() {
        let config = ProviderConfig::from_value(&json!({
            "subscription_id": SUB,
            "access_token": "t",
            "resource_manager_endpoint": "not a url",
        }))
        .unwrap();
        let diagnostics = config.diagnostics();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute.as_deref(), Some("resource_manager_endpoint"));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = ProviderConfig::from_value(&json!({"client_secret": "hunter2", "access_token": "tok"})).unwrap();
        let printed = format!("{:?}", config);
        assert!(!printed.contains("hunter2"));
        assert!(!printed.contains("tok\""));

        let creds = Credentials::AccessToken("tok".to_string());
        assert_eq!(format!("{:?}", creds), "AccessToken(<redacted>)");
    }

    #[test]
    fn test_bad_types_are_configuration_errors() {
        let err = ProviderConfig::from_value(&json!({"subscription_id": 42})).unwrap_err();
        assert!(matches!(err, ProviderError::Configuration(_)));
    }
}
