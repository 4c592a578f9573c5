//! Long-running operation polling.
//!
//! ARM signals an asynchronous operation with `201`/`202` and either an
//! `Azure-AsyncOperation` header (a status resource) or a `Location` header
//! (a URL that answers `202` until the operation finishes).

use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{ArmClient, ArmErrorBody};
use crate::error::{ProviderError, Result};

const AZURE_ASYNC_OPERATION: &str = "azure-asyncoperation";
const LOCATION_HEADER: &str = "location";

/// Where to poll for the outcome of an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollTarget {
    /// An `Azure-AsyncOperation` status URL.
    AsyncOperation(String),
    /// A `Location` URL.
    Location(String),
}

impl PollTarget {
    /// Pick the poll target from an initial response, if it is asynchronous.
    pub fn from_response(status: StatusCode, headers: &HeaderMap) -> Option<Self> {
        if !matches!(status, StatusCode::CREATED | StatusCode::ACCEPTED) {
            return None;
        }
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        header(AZURE_ASYNC_OPERATION)
            .map(Self::AsyncOperation)
            .or_else(|| header(LOCATION_HEADER).map(Self::Location))
    }

    fn url(&self) -> &str {
        match self {
            Self::AsyncOperation(url) | Self::Location(url) => url,
        }
    }
}

/// Parse `Retry-After` given in seconds.
pub fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

#[derive(Debug, Deserialize)]
struct OperationStatus {
    #[serde(default)]
    status: String,
    #[serde(default)]
    error: Option<ArmErrorBody>,
}

/// Status of an operation as reported by the status resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Running,
    Succeeded,
    Failed,
}

fn classify(status: &str) -> Outcome {
    match status.to_ascii_lowercase().as_str() {
        "succeeded" => Outcome::Succeeded,
        "failed" | "canceled" | "cancelled" => Outcome::Failed,
        _ => Outcome::Running,
    }
}

/// Poll until the operation reaches a terminal state.
pub async fn poll(client: &ArmClient, target: PollTarget, first_wait: Option<Duration>) -> Result<()> {
    let mut wait = first_wait.unwrap_or(client.poll_interval());
    let mut attempts = 0u32;

    loop {
        tokio::time::sleep(wait).await;
        attempts += 1;

        let response = client.send_raw(reqwest::Method::GET, target.url(), None).await?;
        let status = response.status();
        let next_wait = retry_after(response.headers());

        match &target {
            PollTarget::AsyncOperation(_) => {
                if !status.is_success() {
                    let body = response.text().await.unwrap_or_default();
                    return Err(super::arm_error(status, &body));
                }
                let body: OperationStatus = response.json().await?;
                match classify(&body.status) {
                    Outcome::Succeeded => {
                        debug!(attempts, "long-running operation succeeded");
                        return Ok(());
                    },
                    Outcome::Failed => {
                        let detail = body
                            .error
                            .map(|e| e.to_string())
                            .unwrap_or_else(|| "no error details were returned".to_string());
                        warn!(status = %body.status, "long-running operation failed");
                        return Err(ProviderError::Azure(format!(
                            "long-running operation ended with status {:?}: {}",
                            body.status, detail
                        )));
                    },
                    Outcome::Running => {
                        debug!(status = %body.status, attempts, "long-running operation in progress");
                    },
                }
            },
            PollTarget::Location(_) => match status {
                StatusCode::ACCEPTED => {
                    debug!(attempts, "long-running operation in progress");
                },
                s if s.is_success() => {
                    debug!(attempts, "long-running operation completed");
                    return Ok(());
                },
                s => {
                    let body = response.text().await.unwrap_or_default();
                    return Err(super::arm_error(s, &body));
                },
            },
        }

        wait = next_wait.unwrap_or(client.poll_interval());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.insert(*k, HeaderValue::from_static(*v));
        }
        map
    }

    #[test]
    fn test_poll_target_prefers_async_operation() {
        let h = headers(&[
            ("azure-asyncoperation", "https://management.azure.com/op/1"),
            ("location", "https://management.azure.com/loc/1"),
        ]);
        assert_eq!(
            PollTarget::from_response(StatusCode::CREATED, &h),
            Some(PollTarget::AsyncOperation("https://management.azure.com/op/1".to_string()))
        );

        let h = headers(&[("location", "https://management.azure.com/loc/1")]);
        assert_eq!(
            PollTarget::from_response(StatusCode::ACCEPTED, &h),
            Some(PollTarget::Location("https://management.azure.com/loc/1".to_string()))
        );
    }

    #[test]
    fn test_synchronous_responses_have_no_target() {
        let h = headers(&[("azure-asyncoperation", "https://management.azure.com/op/1")]);
        assert_eq!(PollTarget::from_response(StatusCode::OK, &h), None);
        assert_eq!(PollTarget::from_response(StatusCode::CREATED, &HeaderMap::new()), None);
    }

    #[test]
    fn test_retry_after() {
        assert_eq!(retry_after(&headers(&[("retry-after", "15")])), Some(Duration::from_secs(15)));
        assert_eq!(retry_after(&headers(&[("retry-after", "soon")])), None);
        assert_eq!(retry_after(&HeaderMap::new()), None);
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify("Succeeded"), Outcome::Succeeded);
        assert_eq!(classify("Failed"), Outcome::Failed);
        assert_eq!(classify("Canceled"), Outcome::Failed);
        assert_eq!(classify("InProgress"), Outcome::Running);
        assert_eq!(classify(""), Outcome::Running);
    }
}
