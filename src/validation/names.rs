//! Azure naming rules for MySQL servers and their child resources.

use std::sync::LazyLock;

use regex::Regex;

use crate::schema::NameRule;

static SERVER_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9a-z][-0-9a-z]{1,61}[0-9a-z]$").unwrap());
static ADMINISTRATOR_LOGIN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z][a-zA-Z0-9_]{0,31}$").unwrap());
static FLEXIBLE_SKU_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(B_Standard_B\d+m?s|GP_Standard_D\d+a?ds_v[45]|MO_Standard_E\d+a?ds_v[45])$").unwrap()
});
static SINGLE_SKU_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(B_Gen[45]_[12]|GP_Gen4_(2|4|8|16|32)|GP_Gen5_(2|4|8|16|32|64)|MO_Gen5_(2|4|8|16|32))$")
        .unwrap()
});
static DATABASE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[-_$a-zA-Z0-9]{1,64}$").unwrap());
static FIREWALL_RULE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[-_a-zA-Z0-9]{1,128}$").unwrap());
static VIRTUAL_NETWORK_RULE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9]([-_a-zA-Z0-9]{0,126}[_a-zA-Z0-9])?$").unwrap()
});
static CONFIGURATION_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9_.]{0,127}$").unwrap());

const RESERVED_LOGINS: &[&str] = &[
    "azure_superuser",
    "azure_pg_admin",
    "admin",
    "administrator",
    "root",
    "guest",
    "public",
];

/// Single server storage bounds in MB.
pub const STORAGE_MB_MIN: i64 = 5120;
/// Single server storage bounds in MB.
pub const STORAGE_MB_MAX: i64 = 16_777_216;

/// Check a string against a named rule.
pub fn check(rule: NameRule, value: &str) -> Result<(), String> {
    match rule {
        NameRule::ServerName => server_name(value),
        NameRule::FlexibleServerAdministratorLogin => administrator_login(value),
        NameRule::FlexibleServerAdministratorPassword => administrator_password(value),
        NameRule::FlexibleServerSkuName => flexible_server_sku_name(value),
        NameRule::SingleServerSkuName => single_server_sku_name(value),
        NameRule::DatabaseName => database_name(value),
        NameRule::FirewallRuleName => firewall_rule_name(value),
        NameRule::VirtualNetworkRuleName => virtual_network_rule_name(value),
        NameRule::ConfigurationName => configuration_name(value),
        NameRule::StorageMb => value
            .parse::<i64>()
            .map_err(|_| format!("expected an integer number of megabytes, got {:?}", value))
            .and_then(storage_mb),
    }
}

/// Flexible and single server names: 3-63 lowercase letters, digits and
/// hyphens, not starting or ending with a hyphen.
pub fn server_name(value: &str) -> Result<(), String> {
    if SERVER_NAME.is_match(value) {
        Ok(())
    } else {
        Err(format!(
            "{:?} must be 3 - 63 characters long, contain only lowercase letters, numbers and hyphens, and must not start or end with a hyphen",
            value
        ))
    }
}

/// Administrator login: starts with a letter, at most 32 characters, not a
/// reserved name.
pub fn administrator_login(value: &str) -> Result<(), String> {
    if !ADMINISTRATOR_LOGIN.is_match(value) {
        return Err(format!(
            "{:?} must start with a letter, contain only letters, numbers and underscores and be at most 32 characters long",
            value
        ));
    }
    let lowered = value.to_ascii_lowercase();
    if RESERVED_LOGINS.contains(&lowered.as_str()) || lowered.starts_with("pg_") {
        return Err(format!("{:?} is a reserved login name", value));
    }
    Ok(())
}

/// Administrator password: 8-128 characters drawn from at least three of
/// uppercase, lowercase, digits and non-alphanumerics.
pub fn administrator_password(value: &str) -> Result<(), String> {
    let length = value.chars().count();
    if !(8..=128).contains(&length) {
        return Err("the password must be between 8 and 128 characters long".to_string());
    }

    let categories = [
        value.chars().any(|c| c.is_ascii_uppercase()),
        value.chars().any(|c| c.is_ascii_lowercase()),
        value.chars().any(|c| c.is_ascii_digit()),
        value.chars().any(|c| !c.is_alphanumeric()),
    ];
    if categories.iter().filter(|present| **present).count() < 3 {
        return Err(
            "the password must contain characters from three of the following categories: uppercase letters, lowercase letters, numbers and non-alphanumeric characters"
                .to_string(),
        );
    }
    Ok(())
}

/// Flexible server SKU such as `B_Standard_B1ms` or `GP_Standard_D2ds_v4`.
pub fn flexible_server_sku_name(value: &str) -> Result<(), String> {
    if FLEXIBLE_SKU_NAME.is_match(value) {
        Ok(())
    } else {
        Err(format!(
            "{:?} is not a valid MySQL Flexible Server SKU, expected e.g. B_Standard_B1ms, GP_Standard_D2ds_v4 or MO_Standard_E4ds_v4",
            value
        ))
    }
}

/// Single server SKU such as `GP_Gen5_2`.
pub fn single_server_sku_name(value: &str) -> Result<(), String> {
    if SINGLE_SKU_NAME.is_match(value) {
        Ok(())
    } else {
        Err(format!(
            "{:?} is not a valid MySQL Server SKU, expected e.g. B_Gen5_1, GP_Gen5_2 or MO_Gen5_4",
            value
        ))
    }
}

/// Database names.
pub fn database_name(value: &str) -> Result<(), String> {
    if DATABASE_NAME.is_match(value) {
        Ok(())
    } else {
        Err(format!(
            "{:?} must be 1 - 64 characters of letters, numbers, hyphens, underscores and dollar signs",
            value
        ))
    }
}

/// Firewall rule names.
pub fn firewall_rule_name(value: &str) -> Result<(), String> {
    if FIREWALL_RULE_NAME.is_match(value) {
        Ok(())
    } else {
        Err(format!(
            "{:?} must be 1 - 128 characters of letters, numbers, hyphens and underscores",
            value
        ))
    }
}

/// Virtual network rule names.
pub fn virtual_network_rule_name(value: &str) -> Result<(), String> {
    if VIRTUAL_NETWORK_RULE_NAME.is_match(value) {
        Ok(())
    } else {
        Err(format!(
            "{:?} must be 1 - 128 characters, start with a letter or number and end with a letter, number or underscore",
            value
        ))
    }
}

/// Server parameter names such as `character_set_server`.
pub fn configuration_name(value: &str) -> Result<(), String> {
    if CONFIGURATION_NAME.is_match(value) {
        Ok(())
    } else {
        Err(format!(
            "{:?} must be a lowercase MySQL server parameter name",
            value
        ))
    }
}

/// Single server storage: 5120 - 16777216 MB in whole GB steps.
pub fn storage_mb(value: i64) -> Result<(), String> {
    if !(STORAGE_MB_MIN..=STORAGE_MB_MAX).contains(&value) {
        return Err(format!(
            "expected storage_mb to be in the range ({} - {}), got {}",
            STORAGE_MB_MIN, STORAGE_MB_MAX, value
        ));
    }
    if value % 1024 != 0 {
        return Err(format!("expected storage_mb to be a multiple of 1024, got {}", value));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_name() {
        let longest = "a".repeat(63);
        let too_long = "a".repeat(64);
        for valid in ["abc", "my-server-1", "0db", longest.as_str()] {
            assert!(server_name(valid).is_ok(), "{valid} should be valid");
        }
        for invalid in ["ab", "-abc", "abc-", "ABC", "my_server", too_long.as_str()] {
            assert!(server_name(invalid).is_err(), "{invalid} should be invalid");
        }
    }

    #[test]
    fn test_administrator_login() {
        assert!(administrator_login("mysqladmin").is_ok());
        assert!(administrator_login("Admin_01").is_ok());
        assert!(administrator_login("1admin").is_err());
        assert!(administrator_login("admin").is_err());
        assert!(administrator_login("Root").is_err());
        assert!(administrator_login("pg_user").is_err());
        assert!(administrator_login(&"a".repeat(33)).is_err());
    }

    #[test]
    fn test_administrator_password() {
        assert!(administrator_password("QAZwsx123").is_ok());
        assert!(administrator_password("qazwsx12!").is_ok());
        assert!(administrator_password("short1A").is_err());
        assert!(administrator_password("alllowercase").is_err());
        assert!(administrator_password("lowerUPPER").is_err());
    }

    #[test]
    fn test_sku_names() {
        for sku in ["B_Standard_B1ms", "B_Standard_B1s", "GP_Standard_D2ds_v4", "GP_Standard_D4ads_v5", "MO_Standard_E4ds_v4"] {
            assert!(flexible_server_sku_name(sku).is_ok(), "{sku}");
        }
        assert!(flexible_server_sku_name("GP_Gen5_2").is_err());
        assert!(flexible_server_sku_name("Standard_D2ds_v4").is_err());

        for sku in ["B_Gen5_1", "B_Gen4_2", "GP_Gen5_64", "MO_Gen5_32"] {
            assert!(single_server_sku_name(sku).is_ok(), "{sku}");
        }
        assert!(single_server_sku_name("GP_Gen4_64").is_err());
        assert!(single_server_sku_name("B_Standard_B1ms").is_err());
    }

    #[test]
    fn test_child_names() {
        assert!(database_name("app_db").is_ok());
        assert!(database_name("").is_err());
        assert!(firewall_rule_name("office-range_1").is_ok());
        assert!(firewall_rule_name("office range").is_err());
        assert!(virtual_network_rule_name("rule_").is_ok());
        assert!(virtual_network_rule_name("_rule").is_err());
        assert!(virtual_network_rule_name("rule-").is_err());
        assert!(configuration_name("character_set_server").is_ok());
        assert!(configuration_name("Character_Set").is_err());
    }

    #[test]
    fn test_storage_mb() {
        assert!(storage_mb(5120).is_ok());
        assert!(storage_mb(16_777_216).is_ok());
        assert!(storage_mb(4096).is_err());
        assert!(storage_mb(5121).is_err());
        assert!(check(NameRule::StorageMb, "51200").is_ok());
        assert!(check(NameRule::StorageMb, "lots").is_err());
    }
}
