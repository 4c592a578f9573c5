//! Provider-level behaviour: configuration, credentials and dispatch.

mod common;

use std::time::Duration;

use common::*;
use hemmer_provider_azurerm_mysql::testing::{ProviderTester, TestError, TEST_SUBSCRIPTION_ID};
use hemmer_provider_azurerm_mysql::{AzureMySqlProvider, ProviderError, ProviderService};
use serde_json::json;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TENANT_ID: &str = "33333333-3333-3333-3333-333333333333";

#[tokio::test]
async fn test_operations_fail_before_configure() {
    let tester = ProviderTester::new(AzureMySqlProvider::new());
    let err = tester
        .read("azurerm_mysql_flexible_server", json!({"id": flexible_server_id("rg", "fs1")}))
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::FailedPrecondition(_)), "{:?}", err);
}

#[tokio::test]
async fn test_schema_lists_every_type() {
    let tester = ProviderTester::new(AzureMySqlProvider::new());
    let resources = tester.resource_types();
    for expected in [
        "azurerm_mysql_flexible_server",
        "azurerm_mysql_flexible_database",
        "azurerm_mysql_flexible_server_firewall_rule",
        "azurerm_mysql_flexible_server_configuration",
        "azurerm_mysql_flexible_server_active_directory_administrator",
        "azurerm_mysql_server",
        "azurerm_mysql_database",
        "azurerm_mysql_firewall_rule",
        "azurerm_mysql_configuration",
        "azurerm_mysql_active_directory_administrator",
        "azurerm_mysql_server_key",
        "azurerm_mysql_virtual_network_rule",
    ] {
        assert!(resources.iter().any(|r| r == expected), "missing {}", expected);
    }
    assert_eq!(resources.len(), 12);

    let mut data_sources = tester.data_source_types();
    data_sources.sort();
    assert_eq!(data_sources, vec!["azurerm_mysql_flexible_server", "azurerm_mysql_server"]);
}

#[tokio::test]
async fn test_configure_reports_missing_credentials() {
    let tester = ProviderTester::new(AzureMySqlProvider::new());
    let result = tester
        .configure(json!({
            "subscription_id": TEST_SUBSCRIPTION_ID,
            "tenant_id": TENANT_ID,
            "client_id": "app",
            "access_token": "",
            "client_secret": ""
        }))
        .await;
    match result {
        Err(TestError::Diagnostics(diags)) => assert!(!diags.is_empty()),
        other => panic!("expected diagnostics, got {:?}", other),
    }
}

#[tokio::test]
async fn test_client_credentials_are_exchanged_once() {
    let server = MockServer::start().await;
    let id = flexible_server_id("rg", "fs1");

    Mock::given(method("POST"))
        .and(path(format!("/{}/oauth2/v2.0/token", TENANT_ID)))
        .and(body_string_contains("grant_type=client_credentials"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token_type": "Bearer",
            "expires_in": 3599,
            "ext_expires_in": 3599,
            "access_token": "minted-token"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(&id))
        .and(header("authorization", "Bearer minted-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": id,
            "location": "westeurope",
            "properties": {"administratorLogin": "mysqladmin"}
        })))
        .expect(2)
        .mount(&server)
        .await;

    let tester = ProviderTester::new(AzureMySqlProvider::new().with_poll_interval(Duration::ZERO));
    tester
        .configure(json!({
            "subscription_id": TEST_SUBSCRIPTION_ID,
            "tenant_id": TENANT_ID,
            "client_id": "app",
            "client_secret": "s3cret",
            "resource_manager_endpoint": server.uri(),
            "authority_host": server.uri()
        }))
        .await
        .unwrap();

    for _ in 0..2 {
        let state = tester
            .read("azurerm_mysql_flexible_server", json!({"id": id}))
            .await
            .unwrap();
        assert_eq!(state["administrator_login"], "mysqladmin");
    }
}

#[tokio::test]
async fn test_stop_drops_the_client() {
    let server = MockServer::start().await;
    let tester = tester(&server).await;
    tester.stop().await.unwrap();

    let err = tester
        .provider()
        .delete("azurerm_mysql_flexible_database", json!({"id": format!("{}/databases/db", flexible_server_id("rg", "fs1"))}))
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::FailedPrecondition(_)), "{:?}", err);
}

#[tokio::test]
async fn test_unsupported_update_is_unimplemented() {
    let server = MockServer::start().await;
    let tester = tester(&server).await;
    let id = format!("{}/databases/db", flexible_server_id("rg", "fs1"));

    let err = tester
        .update("azurerm_mysql_flexible_database", json!({"id": id}), json!({"id": id}))
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::Unimplemented(_)), "{:?}", err);
}
