//! Bearer tokens for Azure Resource Manager.
//!
//! A static token is used as-is. Client credentials go through
//! `azure_identity::ClientSecretCredential`, which requests tokens from the
//! configured authority and caches them until they are close to expiry.

use std::fmt;
use std::sync::Arc;

use azure_core::auth::TokenCredential;
use azure_core::Url;
use azure_identity::ClientSecretCredential;
use tracing::debug;

use crate::config::{ArmSettings, Credentials};
use crate::error::{ProviderError, Result};

/// Supplies bearer tokens for ARM requests.
#[derive(Clone)]
pub enum TokenSource {
    /// A fixed token supplied by the user.
    Static(String),
    /// Service principal with a client secret.
    ClientSecret {
        credential: Arc<ClientSecretCredential>,
        client_id: String,
        scope: String,
    },
}

impl fmt::Debug for TokenSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(_) => f.write_str("TokenSource::Static"),
            Self::ClientSecret { client_id, scope, .. } => f
                .debug_struct("TokenSource::ClientSecret")
                .field("client_id", client_id)
                .field("scope", scope)
                .finish_non_exhaustive(),
        }
    }
}

impl TokenSource {
    /// Build a token source for the resolved settings.
    pub fn new(settings: &ArmSettings) -> Result<Self> {
        match &settings.credentials {
            Credentials::AccessToken(token) => Ok(Self::Static(token.clone())),
            Credentials::ClientSecret {
                tenant_id,
                client_id,
                client_secret,
            } => {
                let authority_host = Url::parse(&settings.authority_host).map_err(|e| {
                    ProviderError::Configuration(format!(
                        "parsing authority host {:?}: {}",
                        settings.authority_host, e
                    ))
                })?;
                let credential = ClientSecretCredential::new(
                    azure_core::new_http_client(),
                    authority_host,
                    tenant_id.clone(),
                    client_id.clone(),
                    client_secret.clone(),
                );
                Ok(Self::ClientSecret {
                    credential: Arc::new(credential),
                    client_id: client_id.clone(),
                    scope: default_scope(&settings.resource_manager_endpoint),
                })
            },
        }
    }

    /// Return a bearer token. Client-secret tokens come from the credential's cache
    /// while they are still valid.
    pub async fn token(&self) -> Result<String> {
        match self {
            Self::Static(token) => Ok(token.clone()),
            Self::ClientSecret {
                credential,
                client_id,
                scope,
            } => {
                debug!(%client_id, %scope, "acquiring ARM access token");
                let token = credential.get_token(&[scope.as_str()]).await.map_err(|e| {
                    ProviderError::PermissionDenied(format!(
                        "obtaining an access token for client {:?}: {}",
                        client_id, e
                    ))
                })?;
                Ok(token.token.secret().to_string())
            },
        }
    }
}

/// The `.default` scope of an ARM endpoint, e.g. `https://management.azure.com/.default`.
fn default_scope(resource_manager_endpoint: &str) -> String {
    format!("{}/.default", resource_manager_endpoint.trim_end_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(credentials: Credentials) -> ArmSettings {
        ArmSettings {
            subscription_id: "00000000-0000-0000-0000-000000000000".to_string(),
            resource_manager_endpoint: "https://management.azure.com".to_string(),
            authority_host: "https://login.microsoftonline.com".to_string(),
            credentials,
        }
    }

    #[test]
    fn test_default_scope() {
        assert_eq!(
            default_scope("https://management.azure.com"),
            "https://management.azure.com/.default"
        );
        assert_eq!(
            default_scope("https://management.usgovcloudapi.net/"),
            "https://management.usgovcloudapi.net/.default"
        );
    }

    #[tokio::test]
    async fn test_static_token() {
        let source = TokenSource::new(&settings(Credentials::AccessToken("abc".to_string()))).unwrap();
        assert!(matches!(source, TokenSource::Static(_)));
        assert_eq!(source.token().await.unwrap(), "abc");
    }

    #[test]
    fn test_client_secret_source() {
        let source = TokenSource::new(&settings(Credentials::ClientSecret {
            tenant_id: "tenant".to_string(),
            client_id: "app".to_string(),
            client_secret: "s3cret".to_string(),
        }))
        .unwrap();
        let debug = format!("{:?}", source);
        assert!(debug.contains("app"));
        assert!(debug.contains("https://management.azure.com/.default"));
        assert!(!debug.contains("s3cret"));
    }

    #[test]
    fn test_invalid_authority_host() {
        let mut settings = settings(Credentials::ClientSecret {
            tenant_id: "tenant".to_string(),
            client_id: "app".to_string(),
            client_secret: "s3cret".to_string(),
        });
        settings.authority_host = "not a url".to_string();
        assert!(matches!(TokenSource::new(&settings), Err(ProviderError::Configuration(_))));
    }
}
