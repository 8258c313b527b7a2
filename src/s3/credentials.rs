//! Storage Credentials Module
//!
//! Holds the endpoint, region, keys and bucket used to reach the storage
//! backend. Credentials are immutable for the process lifetime and their
//! `Debug` output never contains the keys.
//!
//! # Example
//!
//! ```
//! use video_upload_gateway::config::StorageConfig;
//! use video_upload_gateway::s3::StorageCredentials;
//!
//! let config = StorageConfig {
//!     endpoint: "http://localhost:9000".into(),
//!     access_key: "access-key".into(),
//!     secret_key: "secret-key".into(),
//!     bucket: "videos".into(),
//!     ..StorageConfig::default()
//! };
//!
//! let creds = StorageCredentials::from_config(&config).unwrap();
//! assert_eq!(creds.bucket(), "videos");
//! assert!(!format!("{:?}", creds).contains("secret-key"));
//! ```

use crate::config::StorageConfig;
use std::fmt;
use thiserror::Error;

/// Credential loading errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CredentialsError {
    #[error("Storage config is incomplete: missing {}", .0.join(", "))]
    Incomplete(Vec<&'static str>),
}

/// Credentials and addressing for the storage backend
#[derive(Clone)]
pub struct StorageCredentials {
    endpoint: String,
    region: String,
    access_key: String,
    secret_key: String,
    bucket: String,
}

impl StorageCredentials {
    /// Create new credentials
    pub fn new(
        endpoint: impl Into<String>,
        region: impl Into<String>,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
        bucket: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            region: region.into(),
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            bucket: bucket.into(),
        }
    }

    /// Load credentials from StorageConfig
    ///
    /// Fails if any of endpoint, access key, secret key or bucket is empty.
    /// An empty region falls back to `us-east-1`.
    pub fn from_config(config: &StorageConfig) -> Result<Self, CredentialsError> {
        let missing = Self::missing_fields(config);
        if !missing.is_empty() {
            return Err(CredentialsError::Incomplete(missing));
        }

        let region = if config.region.trim().is_empty() {
            "us-east-1"
        } else {
            config.region.trim()
        };

        Ok(Self::new(
            config.endpoint.trim(),
            region,
            config.access_key.trim(),
            config.secret_key.trim(),
            config.bucket.trim(),
        ))
    }

    /// Names of the required fields that are empty
    pub fn missing_fields(config: &StorageConfig) -> Vec<&'static str> {
        [
            ("endpoint", &config.endpoint),
            ("access_key", &config.access_key),
            ("secret_key", &config.secret_key),
            ("bucket", &config.bucket),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect()
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn access_key(&self) -> &str {
        &self.access_key
    }

    pub fn secret_key(&self) -> &str {
        &self.secret_key
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

impl fmt::Debug for StorageCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageCredentials")
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("access_key", &"<redacted>")
            .field("secret_key", &"<redacted>")
            .field("bucket", &self.bucket)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete_config() -> StorageConfig {
        StorageConfig {
            endpoint: "http://localhost:9000".into(),
            access_key: "config-access".into(),
            secret_key: "config-secret".into(),
            bucket: "videos".into(),
            ..StorageConfig::default()
        }
    }

    #[test]
    fn test_from_config_success() {
        let creds = StorageCredentials::from_config(&complete_config()).unwrap();
        assert_eq!(creds.endpoint(), "http://localhost:9000");
        assert_eq!(creds.access_key(), "config-access");
        assert_eq!(creds.secret_key(), "config-secret");
        assert_eq!(creds.bucket(), "videos");
        assert_eq!(creds.region(), "us-east-1");
    }

    #[test]
    fn test_from_config_missing_fields_are_named() {
        let config = StorageConfig {
            endpoint: "http://localhost:9000".into(),
            ..StorageConfig::default()
        };

        let err = StorageCredentials::from_config(&config).unwrap_err();
        assert_eq!(
            err,
            CredentialsError::Incomplete(vec!["access_key", "secret_key", "bucket"])
        );
        assert_eq!(
            err.to_string(),
            "Storage config is incomplete: missing access_key, secret_key, bucket"
        );
    }

    #[test]
    fn test_whitespace_counts_as_missing() {
        let mut config = complete_config();
        config.secret_key = "   ".into();
        assert_eq!(
            StorageCredentials::missing_fields(&config),
            vec!["secret_key"]
        );
    }

    #[test]
    fn test_empty_region_falls_back() {
        let mut config = complete_config();
        config.region = String::new();
        let creds = StorageCredentials::from_config(&config).unwrap();
        assert_eq!(creds.region(), "us-east-1");
    }

    #[test]
    fn test_debug_redacts_keys() {
        let creds = StorageCredentials::from_config(&complete_config()).unwrap();
        let rendered = format!("{:?}", creds);
        assert!(!rendered.contains("config-access"));
        assert!(!rendered.contains("config-secret"));
        assert!(rendered.contains("videos"));
    }
}
