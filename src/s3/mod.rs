//! S3 Client module
//!
//! Wraps [`aws_sdk_s3::Client`] bound to one S3-compatible endpoint with
//! path-style addressing (`{endpoint}/{bucket}/{key}`), static credentials
//! and no automatic retries.
//!
//! # Features
//!
//! - **Presigning**: local, time-bound PUT URLs for client-direct uploads
//! - **Multipart**: create, upload part, complete, abort
//! - **Typed failures**: every backend failure is a [`StorageError`] carrying
//!   the optional status code, error code and request id
//!
//! # Example
//!
//! ```no_run
//! use video_upload_gateway::network::ProxyBypass;
//! use video_upload_gateway::s3::{S3Client, S3ClientConfig, StorageCredentials};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = S3ClientConfig {
//!     credentials: StorageCredentials::new(
//!         "http://localhost:9000",
//!         "us-east-1",
//!         "minioadmin",
//!         "minioadmin",
//!         "videos",
//!     ),
//!     proxy: None,
//!     no_proxy: ProxyBypass::new(),
//!     connect_timeout: Duration::from_secs(10),
//! };
//!
//! let client = S3Client::new(config)?;
//! let url = client.presign_put("videos/clip.mp4", "video/mp4", 3600).await?;
//! println!("PUT to {}", url);
//! # Ok(())
//! # }
//! ```
//!
//! # Tracing
//!
//! | Operation | Span Name | Attributes |
//! |-----------|-----------|------------|
//! | CreateMultipartUpload | `s3.create_multipart_upload` | bucket, key, upload_id, status_code |
//! | UploadPart | `s3.upload_part` | bucket, upload_id, part_number, bytes, etag, status_code |
//! | CompleteMultipartUpload | `s3.complete_multipart_upload` | bucket, upload_id, parts_count, etag, status_code |
//! | AbortMultipartUpload | `s3.abort_multipart_upload` | bucket, upload_id, status_code |
//!
//! `status_code` is recorded only when the backend rejects the call.

use crate::network::ProxyBypass;
use aws_config::retry::RetryConfig;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_credential_types::provider::SharedCredentialsProvider;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{
    RequestChecksumCalculation, ResponseChecksumValidation, StalledStreamProtectionConfig,
};
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart as SdkCompletedPart};
use aws_smithy_runtime_api::client::orchestrator::HttpResponse;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::Url;
use serde::Deserialize;
use std::time::{Duration, SystemTime};
use thiserror::Error;

pub mod connector;
pub mod credentials;
pub mod factory;
pub mod translate;

pub use connector::ReqwestHttpClient;
pub use credentials::{CredentialsError, StorageCredentials};
pub use factory::StorageClientFactory;
pub use translate::{translate, TranslatedError};

const REQUEST_ID_HEADER: &str = "x-amz-request-id";

/// S3 client construction errors
#[derive(Error, Debug)]
pub enum S3ClientError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error(transparent)]
    Credentials(#[from] CredentialsError),
}

/// A failed storage operation
#[derive(Error, Debug)]
pub enum StorageError {
    /// The backend answered with an error document or error status
    #[error("{}", .message.as_deref().unwrap_or("storage service error"))]
    Service {
        status: u16,
        code: Option<String>,
        message: Option<String>,
        request_id: Option<String>,
    },

    /// Connection, TLS, timeout or body transfer failure
    #[error("{message}")]
    Transport { message: String, timeout: bool },

    /// The backend answered successfully but the response was unusable
    #[error("{reason}")]
    InvalidResponse {
        status: u16,
        request_id: Option<String>,
        reason: String,
    },

    /// The request could not be built or presigned
    #[error("Invalid storage request: {0}")]
    Request(String),
}

impl StorageError {
    /// Classify an SDK failure
    ///
    /// Service errors keep the code and message the SDK parsed. When the SDK
    /// found no code but the body is an `<Error>` document (S3 can answer
    /// `200 OK` with one), the document is used instead. Any other failure
    /// on a 2xx response is an [`StorageError::InvalidResponse`].
    pub fn from_sdk<E>(error: SdkError<E, HttpResponse>) -> Self
    where
        E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    {
        let detail = DisplayErrorContext(&error).to_string();

        match &error {
            SdkError::DispatchFailure(failure) => {
                return StorageError::Transport {
                    message: detail,
                    timeout: failure.is_timeout(),
                }
            }
            SdkError::TimeoutError(_) => {
                return StorageError::Transport {
                    message: detail,
                    timeout: true,
                }
            }
            _ => {}
        }

        let Some(raw) = error.raw_response() else {
            return StorageError::Request(detail);
        };

        let status = raw.status().as_u16();
        let request_id = raw.headers().get(REQUEST_ID_HEADER).map(str::to_string);
        let (code, message) = match error.as_service_error() {
            Some(service) => (
                service.code().map(str::to_string),
                service.message().map(str::to_string),
            ),
            None => (None, None),
        };

        if code.is_none() {
            if let Some(document) = raw.body().bytes().and_then(error_document) {
                return StorageError::Service {
                    status,
                    code: document.code,
                    message: document.message,
                    request_id: request_id.or(document.request_id),
                };
            }
            if (200..300).contains(&status) {
                return StorageError::InvalidResponse {
                    status,
                    request_id,
                    reason: detail,
                };
            }
        }

        StorageError::Service {
            status,
            code,
            message,
            request_id,
        }
    }

    /// HTTP status reported by the backend, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            StorageError::Service { status, .. } => Some(*status),
            StorageError::InvalidResponse { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Backend error code (e.g. `NoSuchBucket`), if any
    pub fn code(&self) -> Option<String> {
        match self {
            StorageError::Service { code, .. } => code.clone(),
            StorageError::Transport { timeout: true, .. } => Some("Timeout".into()),
            StorageError::Transport { .. } => Some("ConnectionError".into()),
            _ => None,
        }
    }

    /// Request correlation id assigned by the backend, if any
    pub fn request_id(&self) -> Option<&str> {
        match self {
            StorageError::Service { request_id, .. } => request_id.as_deref(),
            StorageError::InvalidResponse { request_id, .. } => request_id.as_deref(),
            _ => None,
        }
    }

    /// Human-readable detail, if any
    pub fn message(&self) -> Option<String> {
        match self {
            StorageError::Service { message, .. } => message.clone(),
            other => Some(other.to_string()),
        }
    }
}

/// S3 error document (`<Error>...</Error>`)
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ErrorDocument {
    code: Option<String>,
    message: Option<String>,
    request_id: Option<String>,
}

fn error_document(body: &[u8]) -> Option<ErrorDocument> {
    let text = std::str::from_utf8(body).ok()?;
    if !text.contains("<Error>") {
        return None;
    }
    quick_xml::de::from_str(text).ok()
}

/// Record the backend status on the current span and classify the failure
fn failed<E>(error: SdkError<E, HttpResponse>) -> StorageError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    let error = StorageError::from_sdk(error);
    if let Some(status) = error.status() {
        tracing::Span::current().record("http.status_code", status);
    }
    error
}

/// S3 completed part
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedPart {
    pub part_number: u32,
    pub etag: String,
}

/// S3 Client configuration
#[derive(Debug, Clone)]
pub struct S3ClientConfig {
    pub credentials: StorageCredentials,
    /// Outbound forward proxy, if any
    pub proxy: Option<String>,
    /// Hosts reached without the proxy
    pub no_proxy: ProxyBypass,
    pub connect_timeout: Duration,
}

/// S3 Client
#[derive(Debug)]
pub struct S3Client {
    client: aws_sdk_s3::Client,
    endpoint: String,
    region: String,
    bucket: String,
}

impl S3Client {
    /// Create a new S3 client
    ///
    /// The client never reads proxy settings or credentials from the
    /// environment. When a proxy is configured, hosts in `no_proxy` are
    /// reached directly.
    pub fn new(config: S3ClientConfig) -> Result<Self, S3ClientError> {
        let creds = config.credentials;
        let endpoint = creds.endpoint().trim_end_matches('/').to_string();

        let parsed = Url::parse(&endpoint)
            .map_err(|e| S3ClientError::ConfigError(format!("Invalid endpoint: {}", e)))?;
        if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
            return Err(S3ClientError::ConfigError(format!(
                "Endpoint must be an absolute http(s) URL: {}",
                endpoint
            )));
        }

        let http_client = ReqwestHttpClient::new(
            config.proxy.as_deref(),
            &config.no_proxy,
            config.connect_timeout,
        )
        .map_err(|e| S3ClientError::ConfigError(format!("Invalid proxy: {}", e)))?;

        let credentials = Credentials::new(
            creds.access_key(),
            creds.secret_key(),
            None,
            None,
            "gateway-config",
        );

        let shared = SdkConfig::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(creds.region().to_string()))
            .endpoint_url(endpoint.clone())
            .credentials_provider(SharedCredentialsProvider::new(credentials))
            .retry_config(RetryConfig::disabled())
            .http_client(http_client)
            .build();

        let s3_config = aws_sdk_s3::config::Builder::from(&shared)
            .force_path_style(true)
            .request_checksum_calculation(RequestChecksumCalculation::WhenRequired)
            .response_checksum_validation(ResponseChecksumValidation::WhenRequired)
            .stalled_stream_protection(StalledStreamProtectionConfig::disabled())
            .build();

        Ok(Self {
            client: aws_sdk_s3::Client::from_conf(s3_config),
            endpoint,
            region: creds.region().to_string(),
            bucket: creds.bucket().to_string(),
        })
    }

    /// Get the bucket name
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Get the region
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Get the endpoint URL (without trailing slash)
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Presign a PUT of `key` with exactly `content_type`, valid for `expires_in` seconds
    pub async fn presign_put(
        &self,
        key: &str,
        content_type: &str,
        expires_in: u64,
    ) -> Result<String, StorageError> {
        self.presign_put_at(key, content_type, expires_in, Utc::now()).await
    }

    /// Presign a PUT as of a given instant
    pub async fn presign_put_at(
        &self,
        key: &str,
        content_type: &str,
        expires_in: u64,
        now: DateTime<Utc>,
    ) -> Result<String, StorageError> {
        let presigning = PresigningConfig::builder()
            .start_time(SystemTime::from(now))
            .expires_in(Duration::from_secs(expires_in))
            .build()
            .map_err(|e| StorageError::Request(e.to_string()))?;

        let presigned = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .presigned(presigning)
            .await
            .map_err(StorageError::from_sdk)?;

        Ok(presigned.uri().to_string())
    }

    /// Create a multipart upload and return its upload id
    #[tracing::instrument(
        name = "s3.create_multipart_upload",
        skip(self),
        fields(
            s3.bucket = %self.bucket,
            s3.key = %key,
            http.method = "POST",
            s3.upload_id = tracing::field::Empty,
            http.status_code = tracing::field::Empty
        ),
        err
    )]
    pub async fn create_multipart_upload(
        &self,
        key: &str,
        content_type: &str,
    ) -> Result<String, StorageError> {
        let output = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .send()
            .await
            .map_err(failed)?;

        let upload_id = output
            .upload_id()
            .map(str::to_string)
            .ok_or_else(|| StorageError::InvalidResponse {
                status: 200,
                request_id: None,
                reason: "CreateMultipartUpload response has no UploadId".into(),
            })?;

        tracing::Span::current().record("s3.upload_id", upload_id.as_str());
        tracing::debug!(upload_id = %upload_id, "CreateMultipartUpload completed");

        Ok(upload_id)
    }

    /// Upload a part in a multipart upload
    #[tracing::instrument(
        name = "s3.upload_part",
        skip(self, key, body),
        fields(
            s3.bucket = %self.bucket,
            s3.upload_id = %upload_id,
            s3.part_number = part_number,
            http.method = "PUT",
            upload.bytes = body.len(),
            s3.etag = tracing::field::Empty,
            http.status_code = tracing::field::Empty
        ),
        err
    )]
    pub async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: u32,
        body: Bytes,
    ) -> Result<CompletedPart, StorageError> {
        let output = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(sdk_part_number(part_number))
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(failed)?;

        let etag = output
            .e_tag()
            .map(str::to_string)
            .ok_or_else(|| StorageError::InvalidResponse {
                status: 200,
                request_id: None,
                reason: format!("UploadPart {} response has no ETag", part_number),
            })?;

        tracing::Span::current().record("s3.etag", etag.as_str());

        Ok(CompletedPart { part_number, etag })
    }

    /// Complete a multipart upload and return the object's ETag, if reported
    ///
    /// S3 may answer `200 OK` with an error document when assembly fails;
    /// that case is reported as a [`StorageError::Service`].
    #[tracing::instrument(
        name = "s3.complete_multipart_upload",
        skip(self, key, parts),
        fields(
            s3.bucket = %self.bucket,
            s3.upload_id = %upload_id,
            http.method = "POST",
            parts_count = parts.len(),
            s3.etag = tracing::field::Empty,
            http.status_code = tracing::field::Empty
        ),
        err
    )]
    pub async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<Option<String>, StorageError> {
        let completed = parts
            .iter()
            .map(|part| {
                SdkCompletedPart::builder()
                    .part_number(sdk_part_number(part.part_number))
                    .e_tag(&part.etag)
                    .build()
            })
            .collect::<Vec<_>>();

        let output = self
            .client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(completed))
                    .build(),
            )
            .send()
            .await
            .map_err(failed)?;

        let etag = output.e_tag().map(str::to_string);
        if let Some(ref etag) = etag {
            tracing::Span::current().record("s3.etag", etag.as_str());
        }
        Ok(etag)
    }

    /// Abort a multipart upload, discarding uploaded parts
    #[tracing::instrument(
        name = "s3.abort_multipart_upload",
        skip(self, key),
        fields(
            s3.bucket = %self.bucket,
            s3.upload_id = %upload_id,
            http.method = "DELETE",
            http.status_code = tracing::field::Empty
        ),
        err
    )]
    pub async fn abort_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
    ) -> Result<(), StorageError> {
        self.client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(failed)?;
        Ok(())
    }
}

/// Part numbers are capped at 10,000 by S3
fn sdk_part_number(part_number: u32) -> i32 {
    i32::try_from(part_number).unwrap_or(i32::MAX)
}
