//! Azure Resource Manager client.
//!
//! A thin JSON client over `reqwest`: every call is addressed by a resource ID
//! and an `api-version`, failed responses are mapped onto [`ProviderError`]
//! and mutating calls can wait for their long-running operation to finish.

pub mod auth;
pub mod lro;

use std::fmt;
use std::future::Future;
use std::time::Duration;

use reqwest::{Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::ArmSettings;
use crate::error::{ProviderError, Result};

use self::auth::TokenSource;
use self::lro::PollTarget;

/// Default interval between LRO polls when ARM sends no `Retry-After`.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

const USER_AGENT: &str = concat!("hemmer-provider-azurerm-mysql/", env!("CARGO_PKG_VERSION"));

/// Body of a failed ARM response: `{"error": {"code": ..., "message": ...}}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ArmErrorBody {
    /// ARM error code, e.g. `ResourceNotFound`.
    #[serde(default)]
    pub code: String,
    /// Human-readable message.
    #[serde(default)]
    pub message: String,
}

impl fmt::Display for ArmErrorBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code.is_empty(), self.message.is_empty()) {
            (false, false) => write!(f, "{}: {}", self.code, self.message),
            (false, true) => f.write_str(&self.code),
            _ => f.write_str(&self.message),
        }
    }
}

#[derive(Deserialize)]
struct ArmErrorEnvelope {
    error: ArmErrorBody,
}

/// Build a [`ProviderError`] from a failed response.
pub(crate) fn arm_error(status: StatusCode, body: &str) -> ProviderError {
    let detail = serde_json::from_str::<ArmErrorEnvelope>(body)
        .map(|e| e.error)
        .or_else(|_| serde_json::from_str::<ArmErrorBody>(body))
        .ok()
        .map(|e| e.to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| body.chars().take(200).collect());
    ProviderError::from_arm_status(
        status.as_u16(),
        format!("unexpected status {} with response: {}", status.as_u16(), detail),
    )
}

/// Run `fut`, failing with `DeadlineExceeded` once `timeout` elapses.
pub async fn with_timeout<T, F>(timeout: Duration, operation: impl fmt::Display, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(ProviderError::DeadlineExceeded(format!(
            "{} did not complete within {}s",
            operation,
            timeout.as_secs()
        ))),
    }
}

/// Client shared by every resource handler.
#[derive(Clone)]
pub struct ArmClient {
    http: reqwest::Client,
    endpoint: String,
    subscription_id: String,
    tokens: TokenSource,
    poll_interval: Duration,
}

impl fmt::Debug for ArmClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArmClient")
            .field("endpoint", &self.endpoint)
            .field("subscription_id", &self.subscription_id)
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

impl ArmClient {
    /// Build a client from resolved settings.
    pub fn new(settings: &ArmSettings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ProviderError::Configuration(format!("building HTTP client: {}", e)))?;
        let tokens = TokenSource::new(settings)?;

        Ok(Self {
            http,
            endpoint: settings.resource_manager_endpoint.clone(),
            subscription_id: settings.subscription_id.clone(),
            tokens,
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    /// Override the LRO poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// The configured subscription.
    pub fn subscription_id(&self) -> &str {
        &self.subscription_id
    }

    /// The interval between LRO polls.
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    fn url(&self, id: &str, api_version: &str) -> String {
        format!("{}{}?api-version={}", self.endpoint, id, api_version)
    }

    /// Send a request to an absolute URL and fail on non-success statuses.
    pub(crate) async fn send_raw(&self, method: Method, url: &str, body: Option<&Value>) -> Result<Response> {
        let token = self.tokens.token().await?;
        debug!(%method, url, "sending ARM request");

        let mut request = self.http.request(method.clone(), url).bearer_auth(token);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await?;
        let status = response.status();
        debug!(%method, url, status = status.as_u16(), "received ARM response");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let err = arm_error(status, &body);
            if status != StatusCode::NOT_FOUND {
                warn!(%method, url, status = status.as_u16(), error = %err, "ARM request failed");
            }
            return Err(err);
        }
        Ok(response)
    }

    async fn send(&self, method: Method, id: &str, api_version: &str, body: Option<&Value>) -> Result<Response> {
        self.send_raw(method, &self.url(id, api_version), body).await
    }

    /// GET a resource.
    pub async fn get<T: DeserializeOwned>(&self, id: &str, api_version: &str) -> Result<T> {
        let response = self.send(Method::GET, id, api_version, None).await?;
        Ok(response.json().await?)
    }

    /// GET a resource, mapping `404` to `None`.
    pub async fn get_optional<T: DeserializeOwned>(&self, id: &str, api_version: &str) -> Result<Option<T>> {
        match self.get(id, api_version).await {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// PUT a resource and wait for the operation to finish.
    pub async fn put_then_poll<B: Serialize + ?Sized>(&self, id: &str, api_version: &str, body: &B) -> Result<()> {
        let body = serde_json::to_value(body)?;
        self.mutate_then_poll(Method::PUT, id, api_version, Some(&body)).await
    }

    /// PATCH a resource and wait for the operation to finish.
    pub async fn patch_then_poll<B: Serialize + ?Sized>(&self, id: &str, api_version: &str, body: &B) -> Result<()> {
        let body = serde_json::to_value(body)?;
        self.mutate_then_poll(Method::PATCH, id, api_version, Some(&body)).await
    }

    /// POST an action (such as `/failover`) and wait for it to finish.
    pub async fn post_then_poll(&self, id: &str, api_version: &str, body: Option<&Value>) -> Result<()> {
        self.mutate_then_poll(Method::POST, id, api_version, body).await
    }

    /// DELETE a resource and wait for the operation to finish. A resource
    /// that is already gone counts as deleted.
    pub async fn delete_then_poll(&self, id: &str, api_version: &str) -> Result<()> {
        match self.mutate_then_poll(Method::DELETE, id, api_version, None).await {
            Err(err) if err.is_not_found() => {
                debug!(id, "resource was already deleted");
                Ok(())
            },
            other => other,
        }
    }

    async fn mutate_then_poll(
        &self,
        method: Method,
        id: &str,
        api_version: &str,
        body: Option<&Value>,
    ) -> Result<()> {
        let response = self.send(method, id, api_version, body).await?;
        let first_wait = lro::retry_after(response.headers());
        match PollTarget::from_response(response.status(), response.headers()) {
            Some(target) => lro::poll(self, target, first_wait).await,
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Credentials;

    fn client() -> ArmClient {
        ArmClient::new(&ArmSettings {
            subscription_id: "00000000-0000-0000-0000-000000000000".to_string(),
            resource_manager_endpoint: "https://management.azure.com".to_string(),
            authority_host: "https://login.microsoftonline.com".to_string(),
            credentials: Credentials::AccessToken("t".to_string()),
        })
        .unwrap()
    }

    #[test]
    fn test_url() {
        let client = client();
        assert_eq!(
            client.url("/subscriptions/x/resourceGroups/rg", "2023-12-30"),
            "https://management.azure.com/subscriptions/x/resourceGroups/rg?api-version=2023-12-30"
        );
        assert_eq!(client.poll_interval(), DEFAULT_POLL_INTERVAL);
        let client = client.with_poll_interval(Duration::from_millis(5));
        assert_eq!(client.poll_interval(), Duration::from_millis(5));
    }

    #[test]
    fn test_arm_error_mapping() {
        let body = r#"{"error":{"code":"ResourceNotFound","message":"The Resource was not found."}}"#;
        let err = arm_error(StatusCode::NOT_FOUND, body);
        assert!(err.is_not_found());
        assert!(err.message().contains("ResourceNotFound: The Resource was not found."));

        let err = arm_error(StatusCode::CONFLICT, r#"{"code":"Conflict","message":"busy"}"#);
        assert!(matches!(err, ProviderError::AlreadyExists(_)));
        assert!(err.message().contains("Conflict: busy"));

        let err = arm_error(StatusCode::BAD_GATEWAY, "upstream failure");
        assert!(matches!(err, ProviderError::Unavailable(_)));
        assert!(err.message().contains("upstream failure"));
    }

    #[tokio::test]
    async fn test_with_timeout() {
        let ok = with_timeout(Duration::from_secs(1), "reading", async { Ok(1) }).await;
        assert_eq!(tokio_test::assert_ok!(ok), 1);

        let slow = with_timeout(Duration::from_millis(10), "creating Flexible Server", async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(slow, Err(ProviderError::DeadlineExceeded(_))));
    }
}
