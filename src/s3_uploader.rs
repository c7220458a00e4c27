use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use bytes::Bytes;

use crate::aws;
use crate::config::StorageSettings;
use crate::error::{PipelineError, Result};
use crate::uploader::ObjectStore;

pub struct S3Uploader {
    client: Client,
    bucket: String,
}

impl S3Uploader {
    /// Creates a new S3Uploader.
    ///
    /// * `settings.bucket` - The S3 bucket name.
    /// * `settings.endpoint` - An optional endpoint override (for example
    ///   "http://127.0.0.1:9000" to use a local S3-compatible service like MinIO).
    pub async fn new(settings: &StorageSettings) -> Self {
        let client = Client::from_conf(aws::s3_config(settings).await);

        S3Uploader {
            client,
            bucket: settings.bucket.clone(),
        }
    }

    /// Object key for a landing-area path. Keys never start with '/'.
    fn object_key(path: &str) -> &str {
        path.trim_start_matches('/')
    }
}

#[async_trait]
impl ObjectStore for S3Uploader {
    async fn put(&self, path: &str, content: Bytes) -> Result<()> {
        // put_object replaces an existing key, which is what makes re-runs idempotent.
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(Self::object_key(path))
            .content_type("application/json")
            .body(ByteStream::from(content))
            .send()
            .await
            .map_err(|e| PipelineError::upload(path, format!("{}", aws_sdk_s3::error::DisplayErrorContext(e))))?;

        Ok(())
    }
}
