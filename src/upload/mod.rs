//! Upload module
//!
//! Validates upload requests, derives object keys, and hands off to either
//! the presigned URL issuer (client-direct upload) or the multipart executor
//! (server-mediated upload).

use crate::s3::{translate, S3ClientError, StorageError, TranslatedError};
use serde::Serialize;
use thiserror::Error;

pub mod multipart;
pub mod naming;
pub mod presign;

pub use multipart::MultipartUploadExecutor;
pub use naming::{sanitize_file_name, ObjectKey};
pub use presign::{PresignedUrlGrant, PresignedUrlIssuer};

/// File name used when the client supplies none
pub const DEFAULT_FILE_NAME: &str = "video.mp4";

/// Content type used when the client supplies none
pub const DEFAULT_CONTENT_TYPE: &str = "video/mp4";

/// Required content type prefix
pub const VIDEO_CONTENT_TYPE_PREFIX: &str = "video/";

/// Prefix of every translated storage failure
pub const STORAGE_FAILURE_CONTEXT: &str = "Upload to storage failed";

/// Upload errors
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    TooLarge(String),

    #[error("{0}")]
    Configuration(String),

    #[error("{0}")]
    Storage(TranslatedError),

    #[error("{0}")]
    Unexpected(String),
}

impl UploadError {
    /// HTTP status for this error
    pub fn status_code(&self) -> u16 {
        match self {
            UploadError::Validation(_) => 400,
            UploadError::TooLarge(_) => 413,
            UploadError::Configuration(_) => 500,
            UploadError::Storage(_) => 500,
            UploadError::Unexpected(_) => 500,
        }
    }

    /// Short label used for metrics and logs
    pub fn kind(&self) -> &'static str {
        match self {
            UploadError::Validation(_) => "validation",
            UploadError::TooLarge(_) => "too_large",
            UploadError::Configuration(_) => "configuration",
            UploadError::Storage(_) => "storage",
            UploadError::Unexpected(_) => "unexpected",
        }
    }

    /// Translate a storage failure
    pub fn storage(error: &StorageError) -> Self {
        UploadError::Storage(translate(STORAGE_FAILURE_CONTEXT, error))
    }
}

impl From<S3ClientError> for UploadError {
    fn from(e: S3ClientError) -> Self {
        UploadError::Configuration(e.to_string())
    }
}

/// Reject anything that is not a `video/*` content type
pub fn validate_content_type(content_type: &str) -> Result<(), UploadError> {
    if content_type.starts_with(VIDEO_CONTENT_TYPE_PREFIX) {
        Ok(())
    } else {
        Err(UploadError::Validation("Only video files are allowed.".into()))
    }
}

/// A validated-on-demand upload request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    file_name: String,
    content_type: String,
}

impl UploadRequest {
    /// Build a request; absent or empty values take the defaults
    pub fn new(file_name: Option<&str>, content_type: Option<&str>) -> Self {
        let non_empty = |v: Option<&str>| v.filter(|s| !s.is_empty()).map(str::to_string);
        Self {
            file_name: non_empty(file_name).unwrap_or_else(|| DEFAULT_FILE_NAME.to_string()),
            content_type: non_empty(content_type)
                .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
        }
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn validate(&self) -> Result<(), UploadError> {
        validate_content_type(&self.content_type)
    }

    /// Fresh object key for this request
    pub fn object_key(&self) -> ObjectKey {
        ObjectKey::generate(&self.file_name)
    }
}

/// Public URL of an object: `{base}/{bucket}/{key}`, trailing slash stripped from `base`
pub fn object_url(base: &str, bucket: &str, key: &str) -> String {
    format!("{}/{}/{}", base.trim_end_matches('/'), bucket, key)
}

/// Result of a server-mediated upload
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadOutcome {
    pub object_url: String,
    #[serde(skip)]
    pub etag: Option<String>,
    #[serde(skip)]
    pub bytes_written: u64,
    #[serde(skip)]
    pub parts: usize,
}
