//! Multipart upload executor
//!
//! Streams a request body to storage with the S3 multipart protocol:
//! initiate, upload parts with bounded concurrency, complete with parts in
//! order. Any failure aborts the session so no orphaned parts remain.
//!
//! Memory use is bounded by `(concurrent_parts + 1) * part_size`: at most
//! `concurrent_parts` parts are in flight while the next one is buffered.

use super::{object_url, ObjectKey, UploadError, UploadOutcome};
use crate::config::{UploadConfig, MAX_PARTS, MIN_PART_SIZE};
use crate::metrics;
use crate::s3::{CompletedPart, S3Client, StorageError};
use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use std::fmt::Display;
use std::sync::Arc;
use tokio::task::{JoinError, JoinSet};
use tracing::Instrument;

/// Buffers a byte stream into fixed-size parts
struct PartReader<S> {
    stream: S,
    part_size: usize,
    max_bytes: u64,
    buffer: BytesMut,
    total: u64,
    finished: bool,
}

impl<S, E> PartReader<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: Display,
{
    fn new(stream: S, part_size: usize, max_bytes: u64) -> Self {
        Self {
            stream,
            part_size,
            max_bytes,
            buffer: BytesMut::with_capacity(part_size),
            total: 0,
            finished: false,
        }
    }

    /// Next part of exactly `part_size` bytes, or the short final part
    async fn next_part(&mut self) -> Result<Option<Bytes>, UploadError> {
        while self.buffer.len() < self.part_size && !self.finished {
            match self.stream.next().await {
                Some(Ok(chunk)) => {
                    self.total += chunk.len() as u64;
                    if self.total > self.max_bytes {
                        return Err(UploadError::TooLarge(format!(
                            "File exceeds the maximum upload size of {} bytes.",
                            self.max_bytes
                        )));
                    }
                    self.buffer.extend_from_slice(&chunk);
                }
                Some(Err(e)) => {
                    return Err(UploadError::Validation(format!(
                        "Failed to read upload body: {}",
                        e
                    )))
                }
                None => self.finished = true,
            }
        }

        if self.buffer.is_empty() {
            return Ok(None);
        }
        let len = self.part_size.min(self.buffer.len());
        Ok(Some(self.buffer.split_to(len).freeze()))
    }

    fn total(&self) -> u64 {
        self.total
    }
}

/// Aborts an open multipart session unless disarmed
///
/// If dropped while armed (e.g. the request future is cancelled on client
/// disconnect) the abort is spawned on the current runtime.
struct AbortGuard {
    session: Option<(Arc<S3Client>, String, String)>,
}

impl AbortGuard {
    fn new(client: Arc<S3Client>, key: &str, upload_id: &str) -> Self {
        Self {
            session: Some((client, key.to_string(), upload_id.to_string())),
        }
    }

    fn disarm(&mut self) {
        self.session = None;
    }

    /// Abort now, logging (never returning) any abort failure
    async fn abort(mut self) {
        if let Some((client, key, upload_id)) = self.session.take() {
            abort_session(&client, &key, &upload_id).await;
        }
    }
}

impl Drop for AbortGuard {
    fn drop(&mut self) {
        let Some((client, key, upload_id)) = self.session.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                tracing::warn!(
                    upload_id = %upload_id,
                    "Upload cancelled, aborting multipart session"
                );
                handle.spawn(async move { abort_session(&client, &key, &upload_id).await });
            }
            Err(_) => {
                tracing::error!(upload_id = %upload_id, "No runtime to abort multipart session");
            }
        }
    }
}

async fn abort_session(client: &S3Client, key: &str, upload_id: &str) {
    match client.abort_multipart_upload(key, upload_id).await {
        Ok(()) => {
            metrics::record_multipart_abort(true);
            tracing::info!(upload_id = %upload_id, "Aborted multipart upload");
        }
        Err(e) => {
            metrics::record_multipart_abort(false);
            tracing::warn!(upload_id = %upload_id, error = %e, "Failed to abort multipart upload");
        }
    }
}

type PartResult = Result<Result<CompletedPart, StorageError>, JoinError>;

fn collect_part(result: PartResult, completed: &mut Vec<CompletedPart>) -> Result<(), UploadError> {
    let part = result
        .map_err(|e| UploadError::Unexpected(format!("Part upload task failed: {}", e)))?
        .map_err(|e| UploadError::storage(&e))?;
    completed.push(part);
    Ok(())
}

/// Multipart upload executor
pub struct MultipartUploadExecutor {
    client: Arc<S3Client>,
    public_base_url: String,
    part_size: usize,
    concurrent_parts: usize,
    max_bytes: u64,
}

impl MultipartUploadExecutor {
    /// Create a new executor
    ///
    /// `part_size` is raised to the 5 MiB minimum and `concurrent_parts` to 1.
    pub fn new(
        client: Arc<S3Client>,
        public_base_url: &str,
        part_size: usize,
        concurrent_parts: usize,
        max_bytes: u64,
    ) -> Self {
        let base = public_base_url.trim();
        let public_base_url = if base.is_empty() {
            client.endpoint().to_string()
        } else {
            base.to_string()
        };

        Self {
            client,
            public_base_url,
            part_size: part_size.max(MIN_PART_SIZE),
            concurrent_parts: concurrent_parts.max(1),
            max_bytes,
        }
    }

    /// Create an executor from upload tuning
    pub fn from_config(
        client: Arc<S3Client>,
        public_base_url: &str,
        upload: &UploadConfig,
        max_bytes: u64,
    ) -> Self {
        Self::new(
            client,
            public_base_url,
            upload.part_size,
            upload.concurrent_parts,
            max_bytes,
        )
    }

    pub fn part_size(&self) -> usize {
        self.part_size
    }

    /// Stream `body` to `key`
    ///
    /// An empty body is a validation error and touches no storage.
    #[tracing::instrument(
        name = "upload.multipart",
        skip(self, body),
        fields(
            s3.bucket = %self.client.bucket(),
            s3.key = %key,
            s3.upload_id = tracing::field::Empty,
            upload.bytes = tracing::field::Empty,
            parts_count = tracing::field::Empty
        ),
        err(Display)
    )]
    pub async fn upload<S, E>(
        &self,
        body: S,
        key: &ObjectKey,
        content_type: &str,
    ) -> Result<UploadOutcome, UploadError>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: Display,
    {
        let body = std::pin::pin!(body);
        let mut reader = PartReader::new(body, self.part_size, self.max_bytes);

        let first = reader
            .next_part()
            .await?
            .ok_or_else(|| UploadError::Validation("File is required.".into()))?;

        let upload_id = self
            .client
            .create_multipart_upload(key.as_str(), content_type)
            .await
            .map_err(|e| UploadError::storage(&e))?;
        tracing::Span::current().record("s3.upload_id", upload_id.as_str());

        let mut guard = AbortGuard::new(self.client.clone(), key.as_str(), &upload_id);

        let parts = match self
            .upload_parts(&mut reader, first, key.as_str(), &upload_id)
            .await
        {
            Ok(parts) => parts,
            Err(e) => {
                guard.abort().await;
                return Err(e);
            }
        };

        let etag = match self
            .client
            .complete_multipart_upload(key.as_str(), &upload_id, &parts)
            .await
        {
            Ok(etag) => etag,
            Err(e) => {
                guard.abort().await;
                return Err(UploadError::storage(&e));
            }
        };
        guard.disarm();

        let span = tracing::Span::current();
        span.record("upload.bytes", reader.total());
        span.record("parts_count", parts.len());
        metrics::record_multipart_parts(parts.len());

        tracing::info!(
            upload_id = %upload_id,
            parts = parts.len(),
            bytes = reader.total(),
            "Completed multipart upload"
        );

        Ok(UploadOutcome {
            object_url: object_url(&self.public_base_url, self.client.bucket(), key.as_str()),
            etag,
            bytes_written: reader.total(),
            parts: parts.len(),
        })
    }

    /// Upload every part, returning them sorted by part number
    ///
    /// Returning early drops the `JoinSet`, cancelling in-flight parts.
    async fn upload_parts<S, E>(
        &self,
        reader: &mut PartReader<S>,
        first: Bytes,
        key: &str,
        upload_id: &str,
    ) -> Result<Vec<CompletedPart>, UploadError>
    where
        S: Stream<Item = Result<Bytes, E>> + Unpin,
        E: Display,
    {
        let mut tasks = JoinSet::new();
        let mut completed = Vec::new();
        let mut next = Some(first);
        let mut part_number: u32 = 1;

        while let Some(body) = next.take() {
            if u64::from(part_number) > MAX_PARTS {
                return Err(UploadError::TooLarge(format!(
                    "File needs more than {} parts.",
                    MAX_PARTS
                )));
            }

            while tasks.len() >= self.concurrent_parts {
                if let Some(result) = tasks.join_next().await {
                    collect_part(result, &mut completed)?;
                }
            }

            let client = self.client.clone();
            let key = key.to_string();
            let upload_id = upload_id.to_string();
            tasks.spawn(
                async move {
                    client
                        .upload_part(&key, &upload_id, part_number, body)
                        .await
                }
                .in_current_span(),
            );
            part_number += 1;

            next = reader.next_part().await?;

            while let Some(result) = tasks.try_join_next() {
                collect_part(result, &mut completed)?;
            }
        }

        while let Some(result) = tasks.join_next().await {
            collect_part(result, &mut completed)?;
        }

        completed.sort_by_key(|part| part.part_number);
        Ok(completed)
    }
}
