//! S3 object store transport.
//!
//! Three operations back the job lifecycle: downloading the source object
//! through a presigned GET URL, uploading the packaged archive to the
//! intermediate location, and listing the output bucket while polling for
//! the result artifact.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use futures::StreamExt;
use tokio::io::AsyncWriteExt;

/// Default expiry for presigned download URLs.
const PRESIGN_EXPIRY: Duration = Duration::from_secs(600);

/// Errors from the object store layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Generating the presigned URL failed.
    #[error("Failed to generate presigned URL for s3://{bucket}/{key}: {message}")]
    Presign {
        bucket: String,
        key: String,
        message: String,
    },

    /// The HTTP fetch of the presigned URL failed.
    #[error("Failed to download s3://{bucket}/{key}: {message}")]
    Download {
        bucket: String,
        key: String,
        message: String,
    },

    /// Uploading the archive failed.
    #[error("Failed to upload s3://{bucket}/{key}: {message}")]
    Upload {
        bucket: String,
        key: String,
        message: String,
    },

    /// Listing the output bucket failed.
    #[error("Failed to list bucket '{bucket}': {message}")]
    List { bucket: String, message: String },

    /// Local filesystem I/O while writing a downloaded object.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Object store operations needed by the dispatcher, implemented by
/// [`S3Store`] in production and by in-memory fakes in tests.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Download `s3://{bucket}/{key}` to a local file.
    async fn download(&self, bucket: &str, key: &str, dest: &Path) -> Result<(), StoreError>;

    /// Upload a local file to `s3://{bucket}/{key}`.
    async fn upload(&self, bucket: &str, key: &str, src: &Path) -> Result<(), StoreError>;

    /// List every object key in a bucket.
    async fn list_keys(&self, bucket: &str) -> Result<Vec<String>, StoreError>;
}

/// S3-backed object store.
///
/// Downloads go through a presigned GET URL fetched with [`reqwest`] so
/// the transfer itself does not hold SDK credentials.
pub struct S3Store {
    client: Client,
    http: reqwest::Client,
}

impl S3Store {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn download(&self, bucket: &str, key: &str, dest: &Path) -> Result<(), StoreError> {
        let presign_config =
            PresigningConfig::expires_in(PRESIGN_EXPIRY).map_err(|e| StoreError::Presign {
                bucket: bucket.to_string(),
                key: key.to_string(),
                message: e.to_string(),
            })?;

        let presigned = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .presigned(presign_config)
            .await
            .map_err(|e| StoreError::Presign {
                bucket: bucket.to_string(),
                key: key.to_string(),
                message: e.to_string(),
            })?;

        tracing::debug!(bucket, key, "Generated presigned download URL");

        let download_err = |message: String| StoreError::Download {
            bucket: bucket.to_string(),
            key: key.to_string(),
            message,
        };

        let response = self
            .http
            .get(presigned.uri())
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| download_err(e.to_string()))?;

        let mut file = tokio::fs::File::create(dest).await?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| download_err(e.to_string()))?;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        tracing::debug!(bucket, key, dest = %dest.display(), "Downloaded source object");
        Ok(())
    }

    async fn upload(&self, bucket: &str, key: &str, src: &Path) -> Result<(), StoreError> {
        let body = ByteStream::from_path(src)
            .await
            .map_err(|e| StoreError::Upload {
                bucket: bucket.to_string(),
                key: key.to_string(),
                message: e.to_string(),
            })?;

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .map_err(|e| StoreError::Upload {
                bucket: bucket.to_string(),
                key: key.to_string(),
                message: e.to_string(),
            })?;

        tracing::debug!(bucket, key, src = %src.display(), "Uploaded archive");
        Ok(())
    }

    async fn list_keys(&self, bucket: &str) -> Result<Vec<String>, StoreError> {
        let mut keys = Vec::new();
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .into_paginator()
            .send();

        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| StoreError::List {
                bucket: bucket.to_string(),
                message: e.to_string(),
            })?;
            keys.extend(
                page.contents()
                    .iter()
                    .filter_map(|object| object.key().map(str::to_string)),
            );
        }

        Ok(keys)
    }
}
