//! Presigned URL issuer
//!
//! Issues time-bound PUT grants so clients upload directly to storage. The
//! SDK presigner computes the grant locally; no request reaches storage.

use super::{object_url, UploadError, UploadRequest};
use crate::config::MIN_UPLOAD_URL_EXPIRES;
use crate::metrics;
use crate::s3::S3Client;
use serde::Serialize;
use std::sync::Arc;

/// Client-direct upload grant
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresignedUrlGrant {
    pub signed_url: String,
    pub object_url: String,
    pub expires_in: u64,
}

/// Apply the 60 second floor to a configured lifetime
pub fn clamp_expiry(configured: i64) -> u64 {
    configured.max(MIN_UPLOAD_URL_EXPIRES) as u64
}

/// Issues presigned PUT URLs for one bucket
pub struct PresignedUrlIssuer {
    client: Arc<S3Client>,
    public_base_url: String,
    expires_in: u64,
}

impl PresignedUrlIssuer {
    /// Create an issuer
    ///
    /// Object URLs use `public_base_url` when non-empty, else the client endpoint.
    pub fn new(client: Arc<S3Client>, public_base_url: &str, configured_expires: i64) -> Self {
        let base = public_base_url.trim();
        let public_base_url = if base.is_empty() {
            client.endpoint().to_string()
        } else {
            base.trim_end_matches('/').to_string()
        };

        Self {
            client,
            public_base_url,
            expires_in: clamp_expiry(configured_expires),
        }
    }

    /// Lifetime of issued grants, in seconds
    pub fn expires_in(&self) -> u64 {
        self.expires_in
    }

    /// Issue a grant for a new object
    #[tracing::instrument(
        name = "upload.presign",
        skip(self, request),
        fields(
            content_type = %request.content_type(),
            s3.key = tracing::field::Empty
        ),
        err(Display)
    )]
    pub async fn issue(&self, request: &UploadRequest) -> Result<PresignedUrlGrant, UploadError> {
        request.validate()?;

        let key = request.object_key();
        tracing::Span::current().record("s3.key", key.as_str());

        let signed_url = self
            .client
            .presign_put(key.as_str(), request.content_type(), self.expires_in)
            .await
            .map_err(|e| UploadError::Unexpected(format!("Failed to sign upload URL: {}", e)))?;

        metrics::record_presigned_url();
        tracing::info!(key = %key, expires_in = self.expires_in, "Issued presigned upload URL");

        Ok(PresignedUrlGrant {
            signed_url,
            object_url: object_url(&self.public_base_url, self.client.bucket(), key.as_str()),
            expires_in: self.expires_in,
        })
    }
}
