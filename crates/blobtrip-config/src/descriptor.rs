//! Connection descriptor parsed from a `Key=Value;Key=Value` connection string

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::ConfigError;

/// Region used when the connection string does not name one
pub const DEFAULT_REGION: &str = "us-east-1";

/// Storage backend addressed by a descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageProvider {
    /// S3-compatible service (AWS S3, MinIO, RustFS)
    S3,
    /// In-process store, nothing leaves the machine
    Memory,
}

impl FromStr for StorageProvider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "s3" | "minio" | "rustfs" => Ok(StorageProvider::S3),
            "memory" | "inmemory" => Ok(StorageProvider::Memory),
            other => Err(ConfigError::UnsupportedProvider(other.to_string())),
        }
    }
}

impl fmt::Display for StorageProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageProvider::S3 => write!(f, "s3"),
            StorageProvider::Memory => write!(f, "memory"),
        }
    }
}

/// Everything needed to address the storage account.
///
/// Immutable once parsed. The secret never shows up in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    provider: StorageProvider,
    endpoint: Option<String>,
    region: String,
    access_key_id: Option<String>,
    secret_access_key: Option<String>,
    force_path_style: bool,
    extras: BTreeMap<String, String>,
}

impl ConnectionDescriptor {
    /// Parse a connection string such as
    /// `Provider=s3;Endpoint=http://localhost:9000;AccessKeyId=minio;SecretAccessKey=secret`.
    ///
    /// Keys are case-insensitive, empty segments are skipped and values may
    /// themselves contain `=`.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let mut fields: BTreeMap<String, String> = BTreeMap::new();

        for segment in raw.split(';') {
            let segment = segment.trim();
            if segment.is_empty() {
                continue;
            }

            let (key, value) = segment
                .split_once('=')
                .ok_or_else(|| ConfigError::Malformed(format!("segment '{}' has no '='", segment)))?;

            let key = key.trim();
            if key.is_empty() {
                return Err(ConfigError::Malformed(format!(
                    "segment '{}' has an empty key",
                    segment
                )));
            }

            fields.insert(key.to_lowercase(), value.trim().to_string());
        }

        if fields.is_empty() {
            return Err(ConfigError::Malformed("no key/value pairs".to_string()));
        }

        let provider = match fields.remove("provider") {
            Some(p) => p.parse()?,
            None => StorageProvider::S3,
        };

        let endpoint = fields
            .remove("endpoint")
            .filter(|e| !e.is_empty())
            .map(|e| e.trim_end_matches('/').to_string());
        let region = fields
            .remove("region")
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| DEFAULT_REGION.to_string());
        let access_key_id = fields.remove("accesskeyid").filter(|v| !v.is_empty());
        let secret_access_key = fields.remove("secretaccesskey").filter(|v| !v.is_empty());

        let force_path_style = match fields.remove("forcepathstyle") {
            Some(v) => parse_bool(&v)?,
            None => endpoint.is_some(),
        };

        if provider == StorageProvider::S3 {
            if access_key_id.is_none() {
                return Err(ConfigError::MissingField("AccessKeyId"));
            }
            if secret_access_key.is_none() {
                return Err(ConfigError::MissingField("SecretAccessKey"));
            }
        }

        Ok(Self {
            provider,
            endpoint,
            region,
            access_key_id,
            secret_access_key,
            force_path_style,
            extras: fields,
        })
    }

    /// Descriptor for the in-process store
    pub fn memory() -> Self {
        Self {
            provider: StorageProvider::Memory,
            endpoint: None,
            region: DEFAULT_REGION.to_string(),
            access_key_id: None,
            secret_access_key: None,
            force_path_style: false,
            extras: BTreeMap::new(),
        }
    }

    pub fn provider(&self) -> StorageProvider {
        self.provider
    }

    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn access_key_id(&self) -> Option<&str> {
        self.access_key_id.as_deref()
    }

    pub fn secret_access_key(&self) -> Option<&str> {
        self.secret_access_key.as_deref()
    }

    pub fn force_path_style(&self) -> bool {
        self.force_path_style
    }

    /// Look up a key the parser does not interpret (lowercased)
    pub fn extra(&self, key: &str) -> Option<&str> {
        self.extras.get(&key.to_lowercase()).map(|s| s.as_str())
    }
}

impl FromStr for ConnectionDescriptor {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionDescriptor")
            .field("provider", &self.provider)
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("access_key_id", &self.access_key_id)
            .field(
                "secret_access_key",
                &self.secret_access_key.as_ref().map(|_| "***"),
            )
            .field("force_path_style", &self.force_path_style)
            .field("extras", &self.extras)
            .finish()
    }
}

fn parse_bool(value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => Err(ConfigError::Malformed(format!(
            "expected a boolean, got '{}'",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minio_connection_string() {
        let descriptor = ConnectionDescriptor::parse(
            "Provider=s3;Endpoint=http://localhost:9000/;AccessKeyId=minioadmin;SecretAccessKey=minioadmin",
        )
        .unwrap();

        assert_eq!(descriptor.provider(), StorageProvider::S3);
        assert_eq!(descriptor.endpoint(), Some("http://localhost:9000"));
        assert_eq!(descriptor.region(), DEFAULT_REGION);
        assert_eq!(descriptor.access_key_id(), Some("minioadmin"));
        assert_eq!(descriptor.secret_access_key(), Some("minioadmin"));
        // Custom endpoints default to path-style addressing
        assert!(descriptor.force_path_style());
    }

    #[test]
    fn test_parse_is_case_insensitive_and_keeps_extras() {
        let descriptor: ConnectionDescriptor =
            "accesskeyid=AK;SECRETACCESSKEY=SK;region=eu-west-1;Label=a=b;"
                .parse()
                .unwrap();

        assert_eq!(descriptor.provider(), StorageProvider::S3);
        assert_eq!(descriptor.region(), "eu-west-1");
        assert_eq!(descriptor.endpoint(), None);
        assert!(!descriptor.force_path_style());
        assert_eq!(descriptor.extra("label"), Some("a=b"));
        assert_eq!(descriptor.extra("LABEL"), Some("a=b"));
    }

    #[test]
    fn test_parse_memory_provider_needs_no_credentials() {
        let descriptor = ConnectionDescriptor::parse("Provider=memory").unwrap();
        assert_eq!(descriptor, ConnectionDescriptor::memory());
    }

    #[test]
    fn test_parse_rejects_missing_credentials() {
        assert_eq!(
            ConnectionDescriptor::parse("Provider=s3;SecretAccessKey=x"),
            Err(ConfigError::MissingField("AccessKeyId"))
        );
        assert_eq!(
            ConnectionDescriptor::parse("AccessKeyId=x"),
            Err(ConfigError::MissingField("SecretAccessKey"))
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            ConnectionDescriptor::parse("not a connection string"),
            Err(ConfigError::Malformed(_))
        ));
        assert!(matches!(
            ConnectionDescriptor::parse(";;"),
            Err(ConfigError::Malformed(_))
        ));
        assert!(matches!(
            ConnectionDescriptor::parse("=value"),
            Err(ConfigError::Malformed(_))
        ));
        assert_eq!(
            ConnectionDescriptor::parse("Provider=ftp"),
            Err(ConfigError::UnsupportedProvider("ftp".to_string()))
        );
    }

    #[test]
    fn test_force_path_style_override() {
        let descriptor = ConnectionDescriptor::parse(
            "Endpoint=https://s3.example.com;AccessKeyId=a;SecretAccessKey=b;ForcePathStyle=false",
        )
        .unwrap();
        assert!(!descriptor.force_path_style());

        assert!(matches!(
            ConnectionDescriptor::parse("AccessKeyId=a;SecretAccessKey=b;ForcePathStyle=maybe"),
            Err(ConfigError::Malformed(_))
        ));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let descriptor =
            ConnectionDescriptor::parse("AccessKeyId=visible;SecretAccessKey=hunter2").unwrap();
        let debug_str = format!("{:?}", descriptor);
        assert!(debug_str.contains("visible"));
        assert!(!debug_str.contains("hunter2"));
    }
}
