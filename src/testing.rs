//! Test harness for the provider.
//!
//! [`ProviderTester`] drives a [`ProviderService`] directly, without a gRPC
//! server, and chains plan and apply the way the host does. Pointed at a
//! mock ARM endpoint it exercises the resource handlers end to end:
//!
//! ```ignore
//! let server = wiremock::MockServer::start().await;
//! let tester = ProviderTester::azure(&server.uri()).await?;
//! let state = tester
//!     .lifecycle_create("azurerm_mysql_flexible_database", json!({ ... }))
//!     .await?;
//! ```

use std::fmt;
use std::time::Duration;

use serde_json::{json, Value};

use crate::error::ProviderError;
use crate::provider::AzureMySqlProvider;
use crate::schema::{Diagnostic, DiagnosticSeverity, ProviderSchema};
use crate::server::ProviderService;
use crate::types::{ImportedResource, PlanResult};

/// Subscription used by [`ProviderTester::azure`].
pub const TEST_SUBSCRIPTION_ID: &str = "00000000-0000-0000-0000-000000000000";

/// Drives a provider the way the host would.
pub struct ProviderTester<P: ProviderService> {
    provider: P,
}

impl ProviderTester<AzureMySqlProvider> {
    /// An Azure MySQL provider configured against `endpoint` with a static
    /// token, polling long-running operations without delay.
    pub async fn azure(endpoint: &str) -> Result<Self, TestError> {
        let tester = Self::new(AzureMySqlProvider::new().with_poll_interval(Duration::ZERO));
        tester
            .configure(json!({
                "subscription_id": TEST_SUBSCRIPTION_ID,
                "access_token": "test-token",
                "resource_manager_endpoint": endpoint,
            }))
            .await?;
        Ok(tester)
    }
}

impl<P: ProviderService> ProviderTester<P> {
    /// Wrap `provider`.
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// The wrapped provider.
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// The provider schema.
    pub fn schema(&self) -> ProviderSchema {
        self.provider.schema()
    }

    /// Resource type names, sorted.
    pub fn resource_types(&self) -> Vec<String> {
        self.provider.metadata().resources
    }

    /// Data source type names, sorted.
    pub fn data_source_types(&self) -> Vec<String> {
        self.provider.metadata().data_sources
    }

    /// Validate the provider block, failing on error diagnostics.
    pub async fn validate_provider_config(&self, config: Value) -> Result<(), TestError> {
        let diagnostics = self.provider.validate_provider_config(config).await?;
        check_diagnostics(diagnostics)
    }

    /// Configure the provider, failing on error diagnostics.
    pub async fn configure(&self, config: Value) -> Result<(), TestError> {
        let diagnostics = self.provider.configure(config).await?;
        check_diagnostics(diagnostics)
    }

    /// Calls `stop`, which drops the ARM client.
    pub async fn stop(&self) -> Result<(), ProviderError> {
        self.provider.stop().await
    }

    /// Validate a resource configuration, failing on error diagnostics.
    pub async fn validate_resource_config(&self, resource_type: &str, config: Value) -> Result<(), TestError> {
        let diagnostics = self.provider.validate_resource_config(resource_type, config).await?;
        check_diagnostics(diagnostics)
    }

    /// Plan a create.
    pub async fn plan_create(&self, resource_type: &str, proposed_state: Value) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(resource_type, None, proposed_state.clone(), proposed_state)
            .await
    }

    /// Plan a change to an existing resource.
    pub async fn plan_update(
        &self,
        resource_type: &str,
        prior_state: Value,
        proposed_state: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(resource_type, Some(prior_state), proposed_state.clone(), proposed_state)
            .await
    }

    /// Plan a destroy.
    pub async fn plan_delete(&self, resource_type: &str, prior_state: Value) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(resource_type, Some(prior_state), Value::Null, Value::Null)
            .await
    }

    /// Create a resource from a planned state.
    pub async fn create(&self, resource_type: &str, planned_state: Value) -> Result<Value, ProviderError> {
        self.provider.create(resource_type, planned_state).await
    }

    /// Refresh a resource.
    pub async fn read(&self, resource_type: &str, current_state: Value) -> Result<Value, ProviderError> {
        self.provider.read(resource_type, current_state).await
    }

    /// Update a resource in place.
    pub async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        self.provider.update(resource_type, prior_state, planned_state).await
    }

    pub async fn delete(&self, resource_type: &str, current_state: Value) -> Result<(), ProviderError> {
        self.provider.delete(resource_type, current_state).await
    }

    /// Import a resource by ID.
    pub async fn import_resource(&self, resource_type: &str, id: &str) -> Result<Vec<ImportedResource>, ProviderError> {
        self.provider.import_resource(resource_type, id).await
    }

    /// Read a data source.
    pub async fn read_data_source(&self, data_source_type: &str, config: Value) -> Result<Value, ProviderError> {
        self.provider.read_data_source(data_source_type, config).await
    }

    /// Validate then plan then create, returning the created state.
    pub async fn lifecycle_create(&self, resource_type: &str, config: Value) -> Result<Value, TestError> {
        self.validate_resource_config(resource_type, config.clone()).await?;
        let plan = self.plan_create(resource_type, config).await?;
        Ok(self.create(resource_type, plan.planned_state).await?)
    }

    /// Plan and apply an in-place update, returning the new state.
    ///
    /// Fails when the plan would replace the resource.
    pub async fn lifecycle_update(
        &self,
        resource_type: &str,
        prior_state: Value,
        proposed_state: Value,
    ) -> Result<Value, TestError> {
        let plan = self
            .plan_update(resource_type, prior_state.clone(), proposed_state)
            .await?;
        if plan.requires_replace {
            return Err(TestError::Replace(plan.replace_paths));
        }
        Ok(self.update(resource_type, prior_state, plan.planned_state).await?)
    }

    /// Plan a destroy and delete.
    pub async fn lifecycle_delete(&self, resource_type: &str, current_state: Value) -> Result<(), TestError> {
        self.plan_delete(resource_type, current_state.clone()).await?;
        Ok(self.delete(resource_type, current_state).await?)
    }
}

/// Why a tester operation failed.
#[derive(Debug)]
pub enum TestError {
    /// Error diagnostics were returned.
    Diagnostics(Vec<Diagnostic>),
    /// The provider returned an error.
    Provider(ProviderError),
    /// An update plan required replacement at these paths.
    Replace(Vec<String>),
}

impl fmt::Display for TestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestError::Diagnostics(diags) => {
                writeln!(f, "{} error diagnostic(s):", diags.len())?;
                for diag in diags {
                    write!(f, "  {}", diag.summary)?;
                    if let Some(detail) = &diag.detail {
                        write!(f, ": {}", detail)?;
                    }
                    if let Some(attr) = &diag.attribute {
                        write!(f, " (at {})", attr)?;
                    }
                    writeln!(f)?;
                }
                Ok(())
            }
            TestError::Provider(e) => write!(f, "provider error: {}", e),
            TestError::Replace(paths) => write!(f, "plan requires replacement: {}", paths.join(", ")),
        }
    }
}

impl std::error::Error for TestError {}

impl From<ProviderError> for TestError {
    fn from(e: ProviderError) -> Self {
        TestError::Provider(e)
    }
}

fn check_diagnostics(diagnostics: Vec<Diagnostic>) -> Result<(), TestError> {
    let errors: Vec<_> = diagnostics.into_iter().filter(Diagnostic::is_error).collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(TestError::Diagnostics(errors))
    }
}

fn changed_paths(plan: &PlanResult) -> Vec<&str> {
    plan.changes.iter().map(|c| c.path.as_str()).collect()
}

/// Assert the plan creates without replacing.
pub fn assert_plan_creates(plan: &PlanResult) {
    assert!(plan.has_changes(), "expected a create, but the plan has no changes");
    assert!(!plan.requires_replace, "expected a create, not a replacement");
}

/// Assert the plan changes nothing.
pub fn assert_plan_no_changes(plan: &PlanResult) {
    assert!(
        !plan.has_changes(),
        "expected no changes, got changes to {:?}",
        changed_paths(plan)
    );
}

/// Assert the plan replaces the resource because of `path`.
pub fn assert_plan_replaces(plan: &PlanResult, path: &str) {
    assert!(
        plan.replace_paths.iter().any(|p| p == path),
        "expected {} to force replacement, replace paths are {:?}",
        path,
        plan.replace_paths
    );
}

/// Assert the plan updates in place.
pub fn assert_plan_updates_in_place(plan: &PlanResult) {
    assert!(
        !plan.requires_replace,
        "expected an in-place update, but {:?} force replacement",
        plan.replace_paths
    );
}

/// Assert the plan changes the top-level attribute or block `path`.
pub fn assert_plan_changes_attribute(plan: &PlanResult, path: &str) {
    assert!(
        plan.change(path).is_some(),
        "expected a change to {}, changed: {:?}",
        path,
        changed_paths(plan)
    );
}

/// Assert the plan leaves `path` alone.
pub fn assert_plan_does_not_change_attribute(plan: &PlanResult, path: &str) {
    assert!(plan.change(path).is_none(), "expected {} to be unchanged", path);
}

/// Assert there are no error diagnostics.
pub fn assert_no_errors(diagnostics: &[Diagnostic]) {
    let errors: Vec<&str> = diagnostics
        .iter()
        .filter(|d| d.is_error())
        .map(|d| d.summary.as_str())
        .collect();
    assert!(errors.is_empty(), "expected no errors, got {:?}", errors);
}

/// Assert some error diagnostic's summary or detail contains `substring`.
pub fn assert_error_contains(diagnostics: &[Diagnostic], substring: &str) {
    let found = diagnostics.iter().any(|d| {
        matches!(d.severity, DiagnosticSeverity::Error)
            && (d.summary.contains(substring) || d.detail.as_deref().is_some_and(|s| s.contains(substring)))
    });
    assert!(
        found,
        "expected an error containing {:?}, got {:?}",
        substring,
        diagnostics.iter().map(|d| &d.summary).collect::<Vec<_>>()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    const FLEXIBLE_DATABASE: &str = "azurerm_mysql_flexible_database";

    fn database() -> Value {
        json!({
            "name": "appdb",
            "resource_group_name": "rg",
            "server_name": "fs1",
            "charset": "utf8mb4",
            "collation": "utf8mb4_unicode_ci",
        })
    }

    fn tester() -> ProviderTester<AzureMySqlProvider> {
        ProviderTester::new(AzureMySqlProvider::new())
    }

    #[test]
    fn test_type_names() {
        let tester = tester();
        let resources = tester.resource_types();
        assert_eq!(resources.len(), 12);
        assert_eq!(resources[0], "azurerm_mysql_active_directory_administrator");
        assert_eq!(
            tester.data_source_types(),
            vec!["azurerm_mysql_flexible_server", "azurerm_mysql_server"]
        );
    }

    #[tokio::test]
    async fn test_plan_helpers() {
        let tester = tester();
        let created = tester.plan_create(FLEXIBLE_DATABASE, database()).await.unwrap();
        assert_plan_creates(&created);
        assert_plan_changes_attribute(&created, "charset");

        let mut prior = database();
        prior["id"] = json!("/subscriptions/00000000-0000-0000-0000-000000000000/resourceGroups/rg/providers/Microsoft.DBforMySQL/flexibleServers/fs1/databases/appdb");
        let same = tester.plan_update(FLEXIBLE_DATABASE, prior.clone(), database()).await.unwrap();
        assert_plan_no_changes(&same);
        assert_plan_updates_in_place(&same);

        let mut proposed = database();
        proposed["collation"] = json!("utf8mb4_bin");
        let replaced = tester.plan_update(FLEXIBLE_DATABASE, prior, proposed).await.unwrap();
        assert_plan_replaces(&replaced, "collation");
        assert_plan_does_not_change_attribute(&replaced, "charset");
    }

    #[tokio::test]
    async fn test_validation_diagnostics() {
        let tester = tester();
        tester.validate_resource_config(FLEXIBLE_DATABASE, database()).await.unwrap();

        let mut config = database();
        config["name"] = json!("");
        let err = tester
            .validate_resource_config(FLEXIBLE_DATABASE, config)
            .await
            .unwrap_err();
        let TestError::Diagnostics(diagnostics) = err else {
            panic!("expected diagnostics, got {}", err);
        };
        assert!(!diagnostics.is_empty());
        assert!(diagnostics.iter().all(Diagnostic::is_error));
    }

    #[tokio::test]
    async fn test_lifecycle_update_refuses_replacement() {
        let tester = tester();
        let mut prior = database();
        prior["id"] = json!("/x");
        let mut proposed = database();
        proposed["charset"] = json!("latin1");

        let err = tester
            .lifecycle_update(FLEXIBLE_DATABASE, prior, proposed)
            .await
            .unwrap_err();
        assert!(matches!(err, TestError::Replace(ref paths) if paths == &["charset".to_string()]));
    }

    #[test]
    fn test_assert_error_contains() {
        let diagnostics = vec![
            Diagnostic::warning("deprecated"),
            Diagnostic::error("Missing subscription ID").with_detail("set ARM_SUBSCRIPTION_ID"),
        ];
        assert_error_contains(&diagnostics, "ARM_SUBSCRIPTION_ID");
        assert_no_errors(&diagnostics[..1]);
    }

    #[test]
    #[should_panic(expected = "expected no errors")]
    fn test_assert_no_errors_panics() {
        assert_no_errors(&[Diagnostic::error("boom")]);
    }
}
