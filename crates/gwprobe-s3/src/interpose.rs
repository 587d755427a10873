//! ---
//! probe_section: "03-gateway-control"
//! probe_subsection: "module"
//! probe_type: "source"
//! probe_scope: "code"
//! probe_description: "Signed S3 and admin requests against the gateway."
//! probe_version: "v0.0.0-prealpha"
//! probe_owner: "tbd"
//! ---
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use gwprobe_common::unix_seconds;
use gwprobe_core::{Interposer, PendingAction};
use tracing::{debug, info, warn};

use crate::client::S3Client;

/// Runs queued interposition actions against the gateway.
///
/// Individual object failures are logged and skipped; the action reports an
/// error only when every object failed.
#[derive(Debug, Clone)]
pub struct S3Interposer {
    client: Arc<S3Client>,
}

impl S3Interposer {
    pub fn new(client: Arc<S3Client>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Interposer for S3Interposer {
    async fn interpose(&self, action: &PendingAction) -> Result<()> {
        let keys = action.object_keys(unix_seconds());
        let mut failed = 0usize;
        match action {
            PendingAction::FillBucket {
                bucket, payload, ..
            } => {
                if let Err(err) = self.client.create_bucket(bucket).await {
                    debug!(bucket = %bucket, error = %err, "create bucket failed; continuing");
                }
                let payload = Bytes::copy_from_slice(payload.as_bytes());
                for key in &keys {
                    if let Err(err) = self.client.put_object(bucket, key, payload.clone()).await {
                        warn!(bucket = %bucket, key = %key, error = %err, "fill write failed");
                        failed += 1;
                    }
                }
            }
            PendingAction::EraseObjects { bucket, .. } => {
                for key in &keys {
                    if let Err(err) = self.client.delete_object(bucket, key).await {
                        warn!(bucket = %bucket, key = %key, error = %err, "erase failed");
                        failed += 1;
                    }
                }
            }
        }
        info!(action = action.label(), objects = keys.len(), failed, "interposition done");
        if !keys.is_empty() && failed == keys.len() {
            anyhow::bail!("{} failed for all {} objects", action.label(), keys.len());
        }
        Ok(())
    }
}
