use crate::config::S3Config;
use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Builder as S3ConfigBuilder;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client as S3Client;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Errors surfaced by a blob store
#[derive(Error, Debug)]
pub enum BlobError {
    #[error("Invalid blob reference: {0}")]
    InvalidRef(String),

    #[error("Blob not found: {0}")]
    NotFound(String),

    #[error("Upload stream failed: {0}")]
    Upload(String),

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Chunked blob body
pub type ByteChunks<'a> = BoxStream<'a, Result<Bytes, BlobError>>;

/// Opaque identifier handed out by the blob store on upload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlobRef(Uuid);

impl BlobRef {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(raw: &str) -> Result<Self, BlobError> {
        raw.parse()
    }
}

impl Default for BlobRef {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BlobRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

impl FromStr for BlobRef {
    type Err = BlobError;

    /// Only the lowercase, hyphen-free form handed out on upload is accepted,
    /// so each blob has exactly one valid reference.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match Uuid::try_parse(s) {
            Ok(uuid) if uuid.simple().to_string() == s => Ok(Self(uuid)),
            _ => Err(BlobError::InvalidRef(s.to_string())),
        }
    }
}

/// Metadata attached to an upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobUpload {
    pub filename: String,
    pub content_type: String,
}

/// A blob fetched from the store
pub struct Blob {
    pub filename: String,
    pub content_type: String,
    pub body: ByteChunks<'static>,
}

impl Blob {
    /// Drain the body into memory
    pub async fn into_bytes(self) -> Result<Vec<u8>, BlobError> {
        self.body
            .try_fold(Vec::new(), |mut buf, chunk| async move {
                buf.extend_from_slice(&chunk);
                Ok(buf)
            })
            .await
    }
}

impl fmt::Debug for Blob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Blob")
            .field("filename", &self.filename)
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

/// Large-object storage for vlog bytes
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Stream `body` into the store and return the reference it is kept under.
    /// No size limit is applied.
    async fn put(&self, upload: BlobUpload, body: ByteChunks<'_>) -> Result<BlobRef, BlobError>;

    /// Fetch a blob for streaming
    async fn get(&self, blob_ref: &BlobRef) -> Result<Blob, BlobError>;
}

/// S3-backed blob store
pub struct S3BlobStore {
    client: S3Client,
    bucket: String,
    config: S3Config,
}

impl S3BlobStore {
    /// Create a new S3 blob store
    pub async fn new(config: &S3Config) -> Result<Self> {
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()))
            .load()
            .await;

        let mut s3_config_builder = S3ConfigBuilder::from(&aws_config);

        // Configure custom endpoint for MinIO/LocalStack
        if let Some(ref endpoint_url) = config.endpoint_url {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint_url);
        }

        // Force path-style access for MinIO compatibility
        if config.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        let client = S3Client::from_conf(s3_config_builder.build());

        info!(
            bucket = %config.bucket,
            region = %config.region,
            "S3 blob store initialized"
        );

        Ok(Self {
            client,
            bucket: config.bucket.clone(),
            config: config.clone(),
        })
    }

    /// Object key for a blob reference.
    /// Format: {prefix}/{blob_ref}
    pub fn object_key(&self, blob_ref: &BlobRef) -> String {
        format!("{}/{}", self.config.key_prefix.trim_end_matches('/'), blob_ref)
    }
}

/// Raw object writes the streaming upload is built from
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectWriter: Send + Sync {
    /// Store a whole object in one request
    async fn put_object(&self, key: &str, upload: &BlobUpload, data: Vec<u8>) -> Result<()>;

    /// Open a multipart upload and return its upload ID
    async fn create_multipart(&self, key: &str, upload: &BlobUpload) -> Result<String>;

    /// Upload one part and return its ETag
    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        data: Vec<u8>,
    ) -> Result<String>;

    /// Finish a multipart upload from `(part_number, etag)` pairs
    async fn complete_multipart(
        &self,
        key: &str,
        upload_id: &str,
        parts: Vec<(i32, String)>,
    ) -> Result<()>;

    async fn abort_multipart(&self, key: &str, upload_id: &str) -> Result<()>;
}

#[async_trait]
impl ObjectWriter for S3BlobStore {
    async fn put_object(&self, key: &str, upload: &BlobUpload, data: Vec<u8>) -> Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(data))
            .content_type(&upload.content_type)
            .metadata("filename", header_safe_filename(&upload.filename))
            .send()
            .await
            .context("Failed to upload vlog to S3")?;

        Ok(())
    }

    async fn create_multipart(&self, key: &str, upload: &BlobUpload) -> Result<String> {
        let response = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .content_type(&upload.content_type)
            .metadata("filename", header_safe_filename(&upload.filename))
            .send()
            .await
            .context("Failed to create multipart upload")?;

        response
            .upload_id()
            .map(String::from)
            .context("No upload ID in response")
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        data: Vec<u8>,
    ) -> Result<String> {
        let response = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number)
            .body(ByteStream::from(data))
            .send()
            .await
            .context("Failed to upload part")?;

        Ok(response.e_tag().unwrap_or_default().to_string())
    }

    async fn complete_multipart(
        &self,
        key: &str,
        upload_id: &str,
        parts: Vec<(i32, String)>,
    ) -> Result<()> {
        let completed_parts: Vec<CompletedPart> = parts
            .into_iter()
            .map(|(part_number, e_tag)| {
                CompletedPart::builder()
                    .part_number(part_number)
                    .e_tag(e_tag)
                    .build()
            })
            .collect();

        let completed_upload = CompletedMultipartUpload::builder()
            .set_parts(Some(completed_parts))
            .build();

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(completed_upload)
            .send()
            .await
            .context("Failed to complete multipart upload")?;

        Ok(())
    }

    async fn abort_multipart(&self, key: &str, upload_id: &str) -> Result<()> {
        self.client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
            .context("Failed to abort multipart upload")?;

        Ok(())
    }
}

/// Pull the next part off `body`.
///
/// Chunks are appended until the buffer holds at least `part_size` bytes or
/// the body ends, so a part can overshoot `part_size` by up to one chunk. An
/// empty part means the body is exhausted.
pub async fn next_part(body: &mut ByteChunks<'_>, part_size: usize) -> Result<Vec<u8>, BlobError> {
    let mut buffer = Vec::new();
    while buffer.is_empty() || buffer.len() < part_size {
        match body.next().await.transpose()? {
            Some(chunk) => buffer.extend_from_slice(&chunk),
            None => break,
        }
    }
    Ok(buffer)
}

/// Stream `body` into the object at `key`.
///
/// A body that ends before filling one part is written with a single request.
/// Anything larger goes through a multipart upload, which is aborted if the
/// body or any part upload fails.
pub async fn write_object(
    writer: &dyn ObjectWriter,
    key: &str,
    upload: &BlobUpload,
    body: &mut ByteChunks<'_>,
    part_size: usize,
) -> Result<(), BlobError> {
    let first_part = next_part(body, part_size).await?;

    if first_part.len() < part_size {
        let size_bytes = first_part.len();
        writer.put_object(key, upload, first_part).await?;
        debug!(key = %key, size_bytes, "Vlog uploaded in a single part");
        return Ok(());
    }

    let upload_id = writer.create_multipart(key, upload).await?;

    match write_parts(writer, key, &upload_id, first_part, body, part_size).await {
        Ok(parts) => {
            debug!(key = %key, parts, "Vlog uploaded via multipart upload");
            Ok(())
        }
        Err(e) => {
            if let Err(abort_err) = writer.abort_multipart(key, &upload_id).await {
                warn!(key = %key, error = %abort_err, "Failed to abort multipart upload");
            }
            Err(e)
        }
    }
}

/// Upload every part of an open multipart upload and complete it.
/// Returns the number of parts written.
async fn write_parts(
    writer: &dyn ObjectWriter,
    key: &str,
    upload_id: &str,
    first_part: Vec<u8>,
    body: &mut ByteChunks<'_>,
    part_size: usize,
) -> Result<usize, BlobError> {
    let mut completed = Vec::new();
    let mut part = first_part;
    let mut part_number = 1;

    while !part.is_empty() {
        let e_tag = writer.upload_part(key, upload_id, part_number, part).await?;
        completed.push((part_number, e_tag));
        part_number += 1;
        part = next_part(body, part_size).await?;
    }

    let parts = completed.len();
    writer.complete_multipart(key, upload_id, completed).await?;
    Ok(parts)
}

#[async_trait]
impl BlobStore for S3BlobStore {
    #[instrument(skip_all, fields(filename = %upload.filename))]
    async fn put(&self, upload: BlobUpload, mut body: ByteChunks<'_>) -> Result<BlobRef, BlobError> {
        let blob_ref = BlobRef::new();
        let key = self.object_key(&blob_ref);
        write_object(self, &key, &upload, &mut body, self.config.part_size_bytes).await?;

        info!(key = %key, blob_ref = %blob_ref, "Vlog stored");

        Ok(blob_ref)
    }

    #[instrument(skip_all, fields(blob_ref = %blob_ref))]
    async fn get(&self, blob_ref: &BlobRef) -> Result<Blob, BlobError> {
        let key = self.object_key(blob_ref);

        let output = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
        {
            Ok(output) => output,
            Err(e) => {
                if e.as_service_error()
                    .map(|e| e.is_no_such_key())
                    .unwrap_or(false)
                {
                    return Err(BlobError::NotFound(blob_ref.to_string()));
                }
                return Err(BlobError::Backend(
                    anyhow::Error::new(e).context("Failed to fetch vlog from S3"),
                ));
            }
        };

        let filename = output
            .metadata()
            .and_then(|m| m.get("filename"))
            .cloned()
            .unwrap_or_else(|| blob_ref.to_string());
        let content_type = output
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();

        let body = ReaderStream::new(output.body.into_async_read())
            .map_err(|e| BlobError::Backend(anyhow::Error::new(e).context("Failed to read vlog body")))
            .boxed();

        Ok(Blob {
            filename,
            content_type,
            body,
        })
    }
}

/// Restrict a filename to characters that are safe in HTTP headers and
/// S3 user metadata
pub fn header_safe_filename(filename: &str) -> String {
    let cleaned: String = filename
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' | ' ' | '(' | ')' => c,
            _ => '_',
        })
        .collect();

    if cleaned.trim().is_empty() {
        "vlog".to_string()
    } else {
        cleaned
    }
}
