//! Storage client factory
//!
//! Builds the single [`S3Client`] shared by every request. Building happens
//! once at startup: credentials are checked, the endpoint host is merged into
//! the proxy bypass set, and the HTTP client is configured with that set.
//!
//! # Example
//!
//! ```
//! use video_upload_gateway::config::StorageConfig;
//! use video_upload_gateway::s3::StorageClientFactory;
//!
//! let config = StorageConfig {
//!     endpoint: "http://minio.internal:9000".into(),
//!     access_key: "access".into(),
//!     secret_key: "secret".into(),
//!     bucket: "videos".into(),
//!     no_proxy: "localhost".into(),
//!     ..StorageConfig::default()
//! };
//!
//! let bypass = StorageClientFactory::bypass_for(&config);
//! assert_eq!(bypass.to_string(), "localhost,minio.internal");
//!
//! let client = StorageClientFactory::build(&config).unwrap();
//! assert_eq!(client.bucket(), "videos");
//! ```

use crate::config::StorageConfig;
use crate::network::ProxyBypass;
use crate::s3::credentials::StorageCredentials;
use crate::s3::{S3Client, S3ClientConfig, S3ClientError};
use std::time::Duration;

/// Builds storage clients from configuration
pub struct StorageClientFactory;

impl StorageClientFactory {
    /// Bypass set for a storage configuration
    ///
    /// Seeded from `storage.no_proxy` and merged with the endpoint host.
    pub fn bypass_for(config: &StorageConfig) -> ProxyBypass {
        let mut bypass = ProxyBypass::from_list(&config.no_proxy);
        bypass.register_endpoint(config.endpoint.trim());
        bypass
    }

    /// Client configuration for a storage configuration
    pub fn client_config(config: &StorageConfig) -> Result<S3ClientConfig, S3ClientError> {
        let credentials = StorageCredentials::from_config(config)?;

        Ok(S3ClientConfig {
            credentials,
            proxy: config.proxy.clone(),
            no_proxy: Self::bypass_for(config),
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
        })
    }

    /// Build a path-style client bound to the configured endpoint
    ///
    /// Fails if credentials are incomplete or the endpoint is not an
    /// absolute http(s) URL.
    pub fn build(config: &StorageConfig) -> Result<S3Client, S3ClientError> {
        let client_config = Self::client_config(config)?;

        tracing::debug!(
            endpoint = %client_config.credentials.endpoint(),
            bucket = %client_config.credentials.bucket(),
            proxy = client_config.proxy.is_some(),
            no_proxy = %client_config.no_proxy,
            "Building storage client"
        );

        S3Client::new(client_config)
    }
}
