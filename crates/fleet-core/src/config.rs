//! Pool configuration.
//!
//! A `PoolConfig` is the (pool identity, cloud API settings, provisioning
//! template) triple handed to `configure()`. The engine treats the two
//! payloads as opaque JSON until the driver parses them into typed settings.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{PoolError, PoolResult};

/// Configuration for one cloud pool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PoolConfig {
    /// Name identifying the pool; also used by drivers as the pool tag.
    pub pool_name: String,
    /// Opaque provider API settings (endpoint, region, auth scheme, ...).
    pub cloud_api_settings: Value,
    /// Opaque template describing how to provision new machines.
    pub provisioning_template: Value,
}

impl PoolConfig {
    /// Load a pool configuration from a TOML file.
    pub fn from_file(path: &Path) -> PoolResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| PoolError::Configuration(format!("failed to read {path:?}: {e}")))?;
        let config: PoolConfig = toml::from_str(&content)
            .map_err(|e| PoolError::Configuration(format!("failed to parse {path:?}: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Check mandatory fields; rejected configurations are never retried.
    pub fn validate(&self) -> PoolResult<()> {
        if self.pool_name.trim().is_empty() {
            return Err(PoolError::Configuration("pool_name must not be empty".into()));
        }
        if !self.cloud_api_settings.is_object() {
            return Err(PoolError::Configuration(
                "cloud_api_settings must be an object".into(),
            ));
        }
        if !self.provisioning_template.is_object() {
            return Err(PoolError::Configuration(
                "provisioning_template must be an object".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid_config() -> PoolConfig {
        PoolConfig {
            pool_name: "webservers".to_string(),
            cloud_api_settings: json!({"endpoint": "https://cloud.example.com"}),
            provisioning_template: json!({"size": "m1.small", "image": "ubuntu-24.04"}),
        }
    }

    #[test]
    fn valid_config_passes() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn empty_pool_name_is_rejected() {
        let mut config = valid_config();
        config.pool_name = "  ".to_string();
        assert!(matches!(
            config.validate(),
            Err(PoolError::Configuration(_))
        ));
    }

    #[test]
    fn non_object_settings_are_rejected() {
        let mut config = valid_config();
        config.cloud_api_settings = json!("not-an-object");
        assert!(matches!(
            config.validate(),
            Err(PoolError::Configuration(_))
        ));

        let mut config = valid_config();
        config.provisioning_template = json!(42);
        assert!(matches!(
            config.validate(),
            Err(PoolError::Configuration(_))
        ));
    }

    #[test]
    fn parses_from_toml() {
        let toml_str = r#"
pool_name = "webservers"

[cloud_api_settings]
endpoint = "https://cloud.example.com"

[provisioning_template]
size = "m1.small"
"#;
        let config: PoolConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.pool_name, "webservers");
        assert!(config.validate().is_ok());
    }
}
