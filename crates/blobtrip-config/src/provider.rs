//! Configuration providers
//!
//! The resolver never reads the process environment directly; it asks a
//! [`ConfigProvider`], so tests can inject a fixed set of values.

use std::collections::HashMap;

/// Source of string configuration values
pub trait ConfigProvider: Send + Sync {
    /// Raw value for `key`, or `None` when it is not set
    fn get(&self, key: &str) -> Option<String>;
}

/// Reads values from the process environment
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvConfigProvider;

impl ConfigProvider for EnvConfigProvider {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// Fixed in-memory values
#[derive(Debug, Clone, Default)]
pub struct StaticConfigProvider {
    values: HashMap<String, String>,
}

impl StaticConfigProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }
}

impl ConfigProvider for StaticConfigProvider {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_provider() {
        let provider = StaticConfigProvider::new().with_value("A", "1");
        assert_eq!(provider.get("A"), Some("1".to_string()));
        assert_eq!(provider.get("B"), None);
    }

    #[test]
    fn test_env_provider_reads_process_environment() {
        std::env::set_var("BLOBTRIP_CONFIG_TEST_ENV_PROVIDER", "from-env");
        assert_eq!(
            EnvConfigProvider.get("BLOBTRIP_CONFIG_TEST_ENV_PROVIDER"),
            Some("from-env".to_string())
        );
        assert_eq!(EnvConfigProvider.get("BLOBTRIP_CONFIG_TEST_DEFINITELY_UNSET"), None);
        std::env::remove_var("BLOBTRIP_CONFIG_TEST_ENV_PROVIDER");
    }
}
