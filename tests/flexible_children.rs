//! Flexible server child resources against a mock ARM endpoint.

mod common;

use common::*;
use hemmer_provider_azurerm_mysql::testing::{assert_plan_replaces, assert_plan_updates_in_place, TEST_SUBSCRIPTION_ID};
use hemmer_provider_azurerm_mysql::ProviderError;
use serde_json::{json, Value};
use wiremock::matchers::{body_json, body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn child_id(kind: &str, name: &str) -> String {
    format!("{}/{}/{}", flexible_server_id("rg", "fs1"), kind, name)
}

fn firewall_rule(start: &str, end: &str) -> Value {
    json!({"properties": {"startIpAddress": start, "endIpAddress": end}})
}

#[tokio::test]
async fn test_firewall_rule_lifecycle() {
    const TYPE: &str = "azurerm_mysql_flexible_server_firewall_rule";
    let server = MockServer::start().await;
    let id = child_id("firewallRules", "office");

    mount_absent_once(&server, &id).await;
    Mock::given(method("GET"))
        .and(path(&id))
        .respond_with(ResponseTemplate::new(200).set_body_json(firewall_rule("10.0.0.1", "10.0.0.9")))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(&id))
        .respond_with(ResponseTemplate::new(200).set_body_json(firewall_rule("10.0.0.1", "10.0.0.20")))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(&id))
        .and(query_param("api-version", FLEXIBLE_API))
        .and(body_json(firewall_rule("10.0.0.1", "10.0.0.9")))
        .respond_with(accepted_async(&server, "create"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(&id))
        .and(body_json(firewall_rule("10.0.0.1", "10.0.0.20")))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path(&id))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    mount_operations_succeed(&server).await;

    let config = json!({
        "name": "office",
        "resource_group_name": "rg",
        "server_name": "fs1",
        "start_ip_address": "10.0.0.1",
        "end_ip_address": "10.0.0.9"
    });

    let tester = tester(&server).await;
    let state = tester.lifecycle_create(TYPE, config.clone()).await.unwrap();
    assert_eq!(state["id"], json!(id));
    assert_eq!(state["end_ip_address"], "10.0.0.9");

    let mut proposed = config.clone();
    proposed["end_ip_address"] = json!("10.0.0.20");
    let plan = tester.plan_update(TYPE, state.clone(), proposed.clone()).await.unwrap();
    assert_plan_updates_in_place(&plan);

    let state = tester.lifecycle_update(TYPE, state, proposed).await.unwrap();
    assert_eq!(state["end_ip_address"], "10.0.0.20");

    let mut renamed = config;
    renamed["name"] = json!("home");
    let plan = tester.plan_update(TYPE, state.clone(), renamed).await.unwrap();
    assert_plan_replaces(&plan, "name");

    tester.lifecycle_delete(TYPE, state).await.unwrap();
}

#[tokio::test]
async fn test_configuration_create_overrides_value() {
    const TYPE: &str = "azurerm_mysql_flexible_server_configuration";
    let server = MockServer::start().await;
    let id = child_id("configurations", "slow_query_log");

    Mock::given(method("PUT"))
        .and(path(&id))
        .and(body_partial_json(json!({"properties": {"value": "ON", "source": "user-override"}})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(&id))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "properties": {"value": "ON", "defaultValue": "OFF", "source": "user-override"}
        })))
        .mount(&server)
        .await;

    let tester = tester(&server).await;
    let state = tester
        .lifecycle_create(
            TYPE,
            json!({
                "name": "slow_query_log",
                "resource_group_name": "rg",
                "server_name": "fs1",
                "value": "ON"
            }),
        )
        .await
        .unwrap();
    assert_eq!(state["id"], json!(id));
    assert_eq!(state["value"], "ON");

    // parameters always exist, so create never checks for a conflict first
    let methods: Vec<String> = calls(&server, &id).await.into_iter().map(|(m, _)| m).collect();
    assert_eq!(methods, vec!["PUT", "GET"]);
}

#[tokio::test]
async fn test_configuration_delete_restores_default() {
    const TYPE: &str = "azurerm_mysql_flexible_server_configuration";
    let server = MockServer::start().await;
    let id = child_id("configurations", "slow_query_log");

    Mock::given(method("GET"))
        .and(path(&id))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "properties": {"value": "ON", "defaultValue": "OFF", "source": "user-override"}
        })))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(&id))
        .and(body_partial_json(json!({"properties": {"value": "OFF", "source": "system-default"}})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let tester = tester(&server).await;
    tester.delete(TYPE, json!({"id": id})).await.unwrap();
}

#[tokio::test]
async fn test_configuration_delete_without_default_fails() {
    const TYPE: &str = "azurerm_mysql_flexible_server_configuration";
    let server = MockServer::start().await;
    let id = child_id("configurations", "init_connect");

    Mock::given(method("GET"))
        .and(path(&id))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"properties": {"value": "SET x=1"}})))
        .mount(&server)
        .await;

    let tester = tester(&server).await;
    let err = tester.delete(TYPE, json!({"id": id})).await.unwrap_err();
    assert!(err.to_string().contains("the default value was not returned"), "{}", err);
}

#[tokio::test]
async fn test_database_create_and_import() {
    const TYPE: &str = "azurerm_mysql_flexible_database";
    let server = MockServer::start().await;
    let id = child_id("databases", "app");

    mount_absent_once(&server, &id).await;
    Mock::given(method("GET"))
        .and(path(&id))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "properties": {"charset": "utf8mb4", "collation": "utf8mb4_unicode_ci"}
        })))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(&id))
        .and(body_json(json!({"properties": {"charset": "utf8mb4", "collation": "utf8mb4_unicode_ci"}})))
        .respond_with(accepted_async(&server, "db"))
        .expect(1)
        .mount(&server)
        .await;
    mount_operations_succeed(&server).await;

    let config = json!({
        "name": "app",
        "resource_group_name": "rg",
        "server_name": "fs1",
        "charset": "utf8mb4",
        "collation": "utf8mb4_unicode_ci"
    });

    let tester = tester(&server).await;
    let created = tester.lifecycle_create(TYPE, config.clone()).await.unwrap();
    assert_eq!(created["collation"], "utf8mb4_unicode_ci");

    let mut changed = config;
    changed["charset"] = json!("latin1");
    let plan = tester.plan_update(TYPE, created.clone(), changed).await.unwrap();
    assert_plan_replaces(&plan, "charset");

    let imported = tester.import_resource(TYPE, &id).await.unwrap();
    let state = &imported[0].state;
    assert_eq!(state["id"], json!(id));
    assert_eq!(state["name"], "app");
    assert_eq!(state["server_name"], "fs1");
    assert_eq!(state["charset"], "utf8mb4");
}

#[tokio::test]
async fn test_aad_administrator_create() {
    const TYPE: &str = "azurerm_mysql_flexible_server_active_directory_administrator";
    let server = MockServer::start().await;
    let server_resource = flexible_server_id("rg", "fs1");
    let id = format!("{}/administrators/ActiveDirectory", server_resource);
    let identity = format!(
        "/subscriptions/{}/resourceGroups/rg/providers/Microsoft.ManagedIdentity/userAssignedIdentities/uai1",
        TEST_SUBSCRIPTION_ID
    );
    let object_id = "11111111-1111-1111-1111-111111111111";
    let tenant_id = "22222222-2222-2222-2222-222222222222";

    mount_absent_once(&server, &id).await;
    Mock::given(method("PUT"))
        .and(path(&id))
        .and(body_partial_json(json!({
            "properties": {
                "administratorType": "ActiveDirectory",
                "identityResourceId": identity,
                "login": "dba@example.com",
                "sid": object_id,
                "tenantId": tenant_id
            }
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(&id))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "properties": {
                "administratorType": "ActiveDirectory",
                // ARM lower-cases parts of the identity ID
                "identityResourceId": identity.replace("resourceGroups", "resourcegroups"),
                "login": "dba@example.com",
                "sid": object_id,
                "tenantId": tenant_id
            }
        })))
        .mount(&server)
        .await;

    let tester = tester(&server).await;
    let state = tester
        .lifecycle_create(
            TYPE,
            json!({
                "server_id": server_resource,
                "identity_id": identity,
                "login": "dba@example.com",
                "object_id": object_id,
                "tenant_id": tenant_id
            }),
        )
        .await
        .unwrap();
    assert_eq!(state["id"], json!(id));
    assert_eq!(state["identity_id"], json!(identity));
    assert_eq!(state["object_id"], object_id);
}

#[tokio::test]
async fn test_child_errors_carry_arm_details() {
    const TYPE: &str = "azurerm_mysql_flexible_server_firewall_rule";
    let server = MockServer::start().await;
    let id = child_id("firewallRules", "office");

    Mock::given(method("GET"))
        .and(path(&id))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error": {"code": "AuthorizationFailed", "message": "no access to the server"}
        })))
        .mount(&server)
        .await;

    let tester = tester(&server).await;
    let err = tester.read(TYPE, json!({"id": id})).await.unwrap_err();
    match err {
        ProviderError::PermissionDenied(msg) => {
            assert!(msg.contains("retrieving Flexible Server Firewall Rule"), "{}", msg);
            assert!(msg.contains("AuthorizationFailed: no access to the server"), "{}", msg);
        },
        other => panic!("expected PermissionDenied, got {:?}", other),
    }
}
