//! Helpers shared by the resource handlers.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use serde_json::{Map, Value};
use tracing::debug;

use crate::arm::ArmClient;
use crate::error::{ProviderError, Result};
use crate::schema::{Attribute, AttributeType, Constraint, NameRule};

use super::ResourceData;

/// ARM's `Enabled` status value.
pub const ENABLED: &str = "Enabled";
/// ARM's `Disabled` status value.
pub const DISABLED: &str = "Disabled";

/// The computed `id` attribute.
pub fn id_attribute() -> Attribute {
    Attribute::computed_string().with_description("The ARM resource ID")
}

/// A required, force-new name validated by `rule`.
pub fn name_attribute(rule: NameRule) -> Attribute {
    Attribute::required_string()
        .with_force_new()
        .with_constraint(Constraint::Rule(rule))
}

pub fn resource_group_name_attribute() -> Attribute {
    Attribute::required_string()
        .with_force_new()
        .with_constraint(Constraint::NotEmpty)
        .with_description("The name of the resource group")
}

pub fn location_attribute() -> Attribute {
    Attribute::required_string()
        .with_force_new()
        .with_constraint(Constraint::NotEmpty)
        .with_description("The Azure region")
}

pub fn tags_attribute() -> Attribute {
    Attribute::optional_string_map().with_description("Tags to assign to the resource")
}

/// A set of strings.
pub fn string_set(required: bool) -> Attribute {
    let attr_type = AttributeType::set(AttributeType::String);
    if required {
        Attribute::new(attr_type, crate::schema::AttributeFlags::required())
    } else {
        Attribute::new(attr_type, crate::schema::AttributeFlags::optional())
    }
}

/// Lower-case a location and strip spaces, so `West Europe` becomes `westeurope`.
pub fn normalize_location(location: &str) -> String {
    location.replace(' ', "").to_lowercase()
}

/// The `tags` attribute as an ARM tag map.
pub fn expand_tags(data: &ResourceData) -> HashMap<String, String> {
    data.get("tags")
        .and_then(Value::as_object)
        .map(|tags| {
            tags.iter()
                .map(|(k, v)| (k.clone(), v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

/// ARM tags as state.
pub fn flatten_tags(tags: Option<&HashMap<String, String>>) -> Value {
    let map: Map<String, Value> = tags
        .map(|tags| tags.iter().map(|(k, v)| (k.clone(), Value::String(v.clone()))).collect())
        .unwrap_or_default();
    Value::Object(map)
}

/// `Enabled` or `Disabled`.
pub fn enabled_status(enabled: bool) -> String {
    let status = if enabled { ENABLED } else { DISABLED };
    status.to_string()
}

/// Whether an ARM status string reads `Enabled`.
pub fn is_enabled(status: Option<&str>) -> bool {
    status.is_some_and(|s| s.eq_ignore_ascii_case(ENABLED))
}

/// The error for creating something that already exists outside of state.
pub fn import_as_exists_error(type_name: &str, id: &str) -> ProviderError {
    ProviderError::AlreadyExists(format!(
        "a resource with the ID {:?} already exists - to be managed it needs to be imported into the state. \
         Please see the documentation for {:?} for more information",
        id, type_name
    ))
}

/// Fail when the resource at `id` already exists.
pub async fn ensure_absent(client: &ArmClient, type_name: &str, id: &str, api_version: &str) -> Result<()> {
    let existing = client
        .get_optional::<Value>(id, api_version)
        .await
        .map_err(|e| e.context(format!("checking for presence of existing {:?}", id)))?;
    match existing {
        Some(_) => Err(import_as_exists_error(type_name, id)),
        None => Ok(()),
    }
}

/// Poll `refresh` until it reports `target`.
///
/// States listed in `pending` keep the wait going; anything else fails. The
/// caller's operation timeout bounds the wait.
pub async fn wait_for_state<F, Fut>(
    interval: Duration,
    what: &str,
    pending: &[&str],
    target: &str,
    mut refresh: F,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<String>>,
{
    loop {
        let state = refresh().await?;
        if state.eq_ignore_ascii_case(target) {
            debug!(what, state = %state, "reached target state");
            return Ok(());
        }
        if !pending.iter().any(|p| p.eq_ignore_ascii_case(&state)) {
            return Err(ProviderError::Azure(format!(
                "waiting for {}: unexpected state {:?}, wanted {:?}",
                what, state, target
            )));
        }
        debug!(what, state = %state, "waiting for target state");
        tokio::time::sleep(interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_normalize_location() {
        assert_eq!(normalize_location("West Europe"), "westeurope");
        assert_eq!(normalize_location("eastus2"), "eastus2");
    }

    #[test]
    fn test_tags() {
        let data = ResourceData::new(json!({"tags": {"env": "test", "team": "db"}}));
        let tags = expand_tags(&data);
        assert_eq!(tags.get("env").map(String::as_str), Some("test"));
        assert_eq!(flatten_tags(Some(&tags)), json!({"env": "test", "team": "db"}));
        assert_eq!(flatten_tags(None), json!({}));
        assert!(expand_tags(&ResourceData::new(json!({}))).is_empty());
    }

    #[test]
    fn test_enabled_status() {
        assert_eq!(enabled_status(true), "Enabled");
        assert_eq!(enabled_status(false), "Disabled");
        assert!(is_enabled(Some("Enabled")));
        assert!(!is_enabled(Some("Disabled")));
        assert!(!is_enabled(None));
    }

    #[tokio::test]
    async fn test_wait_for_state() {
        let calls = AtomicUsize::new(0);
        let result = wait_for_state(Duration::from_millis(1), "server", &["Disabled"], "Ready", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move { Ok(if n < 2 { "Disabled" } else { "Ready" }.to_string()) }
        })
        .await;
        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let result = wait_for_state(Duration::from_millis(1), "server", &["Disabled"], "Ready", || async {
            Ok("Dropping".to_string())
        })
        .await;
        assert!(matches!(result, Err(ProviderError::Azure(msg)) if msg.contains("Dropping")));
    }
}
