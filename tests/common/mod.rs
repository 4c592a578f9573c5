//! Shared fixtures for the mock-ARM integration tests.

#![allow(dead_code)]

use hemmer_provider_azurerm_mysql::testing::{ProviderTester, TEST_SUBSCRIPTION_ID};
use hemmer_provider_azurerm_mysql::AzureMySqlProvider;
use serde_json::Value;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

pub const FLEXIBLE_API: &str = "2023-12-30";
pub const SINGLE_API: &str = "2017-12-01";

pub fn flexible_server_id(resource_group: &str, name: &str) -> String {
    format!(
        "/subscriptions/{}/resourceGroups/{}/providers/Microsoft.DBforMySQL/flexibleServers/{}",
        TEST_SUBSCRIPTION_ID, resource_group, name
    )
}

pub fn server_id(resource_group: &str, name: &str) -> String {
    format!(
        "/subscriptions/{}/resourceGroups/{}/providers/Microsoft.DBforMySQL/servers/{}",
        TEST_SUBSCRIPTION_ID, resource_group, name
    )
}

/// A tester configured against `server`.
pub async fn tester(server: &MockServer) -> ProviderTester<AzureMySqlProvider> {
    ProviderTester::azure(&server.uri())
        .await
        .expect("configuring against the mock endpoint")
}

/// A `201 Created` that asks the client to poll `/operations/{name}`.
pub fn accepted_async(server: &MockServer, name: &str) -> ResponseTemplate {
    ResponseTemplate::new(201).insert_header(
        "Azure-AsyncOperation",
        format!("{}/operations/{}", server.uri(), name),
    )
}

/// Every operation status URL reports success.
pub async fn mount_operations_succeed(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path_regex(r"^/operations/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "Succeeded"})))
        .mount(server)
        .await;
}

/// The first GET of `resource_path` answers 404.
pub async fn mount_absent_once(server: &MockServer, resource_path: &str) {
    Mock::given(method("GET"))
        .and(path(resource_path))
        .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
            "error": {"code": "ResourceNotFound", "message": "The Resource was not found."}
        })))
        .up_to_n_times(1)
        .mount(server)
        .await;
}

/// Requests sent to `resource_path` (or below it), as `(method, path)`.
pub async fn calls(server: &MockServer, resource_path: &str) -> Vec<(String, String)> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|r| r.url.path().starts_with(resource_path))
        .map(|r| (r.method.to_string(), r.url.path().to_string()))
        .collect()
}

/// The JSON body of the first `verb` request to `resource_path`.
pub async fn body_of(server: &MockServer, verb: &str, resource_path: &str) -> Value {
    let requests: Vec<Request> = server.received_requests().await.unwrap_or_default();
    requests
        .into_iter()
        .find(|r| r.method.as_str() == verb && r.url.path() == resource_path)
        .map(|r| serde_json::from_slice(&r.body).expect("request body is JSON"))
        .unwrap_or(Value::Null)
}
