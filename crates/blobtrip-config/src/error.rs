//! Error types for connection configuration

use thiserror::Error;

/// Errors raised while turning a connection string into a descriptor
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Malformed connection string: {0}")]
    Malformed(String),

    #[error("Connection string is missing required field '{0}'")]
    MissingField(&'static str),

    #[error("Unsupported storage provider: {0}")]
    UnsupportedProvider(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            ConfigError::Malformed("segment 'abc'".to_string()).to_string(),
            "Malformed connection string: segment 'abc'"
        );
        assert_eq!(
            ConfigError::MissingField("AccessKeyId").to_string(),
            "Connection string is missing required field 'AccessKeyId'"
        );
        assert_eq!(
            ConfigError::UnsupportedProvider("ftp".to_string()).to_string(),
            "Unsupported storage provider: ftp"
        );
    }
}
