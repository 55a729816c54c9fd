use std::sync::Arc;

use tracing::debug;

use crate::descriptor::ConnectionDescriptor;
use crate::error::ConfigError;
use crate::provider::{ConfigProvider, EnvConfigProvider};

/// Environment variable holding the storage connection string
pub const DEFAULT_CONNECTION_ENV: &str = "BLOBTRIP_CONNECTION_STRING";

/// Resolves the storage connection descriptor from a provider.
///
/// `Ok(None)` means the key is not configured. That is a normal, user-facing
/// outcome and not an error; a value that is present but cannot be parsed is
/// an error.
#[derive(Clone)]
pub struct ConnectionResolver {
    provider: Arc<dyn ConfigProvider>,
    key: String,
}

impl ConnectionResolver {
    pub fn new(provider: Arc<dyn ConfigProvider>, key: impl Into<String>) -> Self {
        Self {
            provider,
            key: key.into(),
        }
    }

    /// Resolver over the process environment using [`DEFAULT_CONNECTION_ENV`]
    pub fn from_env() -> Self {
        Self::new(Arc::new(EnvConfigProvider), DEFAULT_CONNECTION_ENV)
    }

    /// Configuration key this resolver reads
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn resolve(&self) -> Result<Option<ConnectionDescriptor>, ConfigError> {
        let raw = match self.provider.get(&self.key) {
            Some(raw) if !raw.trim().is_empty() => raw,
            _ => {
                debug!("Connection key {} is not set", self.key);
                return Ok(None);
            }
        };

        let descriptor = ConnectionDescriptor::parse(&raw)?;
        debug!(
            "Resolved {} connection from {}",
            descriptor.provider(),
            self.key
        );
        Ok(Some(descriptor))
    }
}

impl std::fmt::Debug for ConnectionResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionResolver")
            .field("key", &self.key)
            .finish()
    }
}
