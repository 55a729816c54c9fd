//! blobtrip-config: connection configuration for blobtrip
//!
//! Resolves the storage connection string from an injected [`ConfigProvider`]
//! and parses it into a [`ConnectionDescriptor`]. An unset key is reported as
//! `Ok(None)` so callers can treat it as a user-facing condition rather than
//! a crash.

mod descriptor;
mod error;
mod provider;
mod resolver;

pub use descriptor::{ConnectionDescriptor, StorageProvider, DEFAULT_REGION};
pub use error::ConfigError;
pub use provider::{ConfigProvider, EnvConfigProvider, StaticConfigProvider};
pub use resolver::{ConnectionResolver, DEFAULT_CONNECTION_ENV};
