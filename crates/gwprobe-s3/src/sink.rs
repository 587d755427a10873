//! ---
//! probe_section: "03-gateway-control"
//! probe_subsection: "module"
//! probe_type: "source"
//! probe_scope: "code"
//! probe_description: "Signed S3 and admin requests against the gateway."
//! probe_version: "v0.0.0-prealpha"
//! probe_owner: "tbd"
//! ---
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use gwprobe_core::ArtifactSink;
use tracing::debug;

use crate::client::S3Client;

/// Uploads campaign artifacts into a bucket, creating it before the first upload.
#[derive(Debug)]
pub struct S3ArtifactSink {
    client: Arc<S3Client>,
    bucket: String,
    bucket_ready: AtomicBool,
}

impl S3ArtifactSink {
    pub fn new(client: Arc<S3Client>, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            bucket_ready: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl ArtifactSink for S3ArtifactSink {
    fn name(&self) -> &str {
        "s3"
    }

    async fn persist(&self, name: &str, bytes: &[u8]) -> Result<()> {
        if !self.bucket_ready.swap(true, Ordering::AcqRel) {
            if let Err(err) = self.client.create_bucket(&self.bucket).await {
                debug!(bucket = %self.bucket, error = %err, "create bucket failed; assuming it exists");
            }
        }
        self.client
            .put_object(&self.bucket, name, Bytes::copy_from_slice(bytes))
            .await
            .with_context(|| format!("uploading {name} to bucket {}", self.bucket))
    }
}
