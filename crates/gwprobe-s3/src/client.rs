//! ---
//! probe_section: "03-gateway-control"
//! probe_subsection: "module"
//! probe_type: "source"
//! probe_scope: "code"
//! probe_description: "Signed S3 and admin requests against the gateway."
//! probe_version: "v0.0.0-prealpha"
//! probe_owner: "tbd"
//! ---
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use gwprobe_common::now_nanos;
use gwprobe_core::{DataPath, TargetControl, WriteOutcome};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use tracing::{debug, info};
use url::Url;

use crate::signer::{payload_sha256, SigV4Signer};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Signed HTTP client for one S3 endpoint.
#[derive(Debug, Clone)]
pub struct S3Client {
    http: reqwest::Client,
    endpoint: Url,
    signer: SigV4Signer,
    force_path_style: bool,
}

impl S3Client {
    pub fn new(endpoint: &str, signer: SigV4Signer, force_path_style: bool) -> Result<Self> {
        let endpoint =
            Url::parse(endpoint).with_context(|| format!("invalid S3 endpoint '{endpoint}'"))?;
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("building HTTP client")?;
        Ok(Self {
            http,
            endpoint,
            signer,
            force_path_style,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// URL of `bucket`, or of `key` inside it when given.
    pub fn object_url(&self, bucket: &str, key: Option<&str>) -> Result<Url> {
        let mut url = self.endpoint.clone();
        if !self.force_path_style {
            let host = url
                .host_str()
                .ok_or_else(|| anyhow!("endpoint {} has no host", self.endpoint))?;
            let virtual_host = format!("{bucket}.{host}");
            url.set_host(Some(&virtual_host))
                .with_context(|| format!("invalid virtual host '{virtual_host}'"))?;
        }
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| anyhow!("endpoint {} cannot carry a path", self.endpoint))?;
            segments.pop_if_empty();
            if self.force_path_style {
                segments.push(bucket);
            }
            if let Some(key) = key {
                segments.extend(key.split('/'));
            }
        }
        Ok(url)
    }

    async fn send(&self, method: Method, url: Url, body: Bytes) -> Result<reqwest::Response> {
        let signed = self
            .signer
            .sign(method.as_str(), &url, &payload_sha256(&body), Utc::now())?;
        let mut headers = HeaderMap::with_capacity(signed.len());
        for (name, value) in signed {
            headers.insert(
                HeaderName::from_static(name),
                HeaderValue::from_str(&value)
                    .with_context(|| format!("invalid value for header {name}"))?,
            );
        }
        debug!(%method, %url, "sending signed request");
        let response = self
            .http
            .request(method.clone(), url.clone())
            .headers(headers)
            .body(body)
            .send()
            .await
            .with_context(|| format!("{method} {url}"))?;
        response
            .error_for_status()
            .with_context(|| format!("{method} {url} rejected"))
    }

    pub async fn put_object(&self, bucket: &str, key: &str, payload: impl Into<Bytes>) -> Result<()> {
        let url = self.object_url(bucket, Some(key))?;
        self.send(Method::PUT, url, payload.into()).await?;
        Ok(())
    }

    pub async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        let url = self.object_url(bucket, Some(key))?;
        self.send(Method::DELETE, url, Bytes::new()).await?;
        Ok(())
    }

    pub async fn create_bucket(&self, bucket: &str) -> Result<()> {
        let url = self.object_url(bucket, None)?;
        self.send(Method::PUT, url, Bytes::new()).await?;
        Ok(())
    }

    /// Ask the gateway to terminate through its admin endpoint (`PUT /admin/bucket?die=1&how=..`).
    pub async fn admin_die(&self, how: &str) -> Result<()> {
        let mut url = self.endpoint.clone();
        url.set_path("/admin/bucket");
        url.query_pairs_mut()
            .clear()
            .append_pair("die", "1")
            .append_pair("how", how);
        self.send(Method::PUT, url, Bytes::new()).await?;
        Ok(())
    }
}

#[async_trait]
impl TargetControl for S3Client {
    async fn request_termination(&self, how: &str) -> Result<()> {
        info!(how = %how, endpoint = %self.endpoint, "requesting gateway termination");
        self.admin_die(how).await
    }
}

#[async_trait]
impl DataPath for S3Client {
    async fn write_object(&self, bucket: &str, key: &str, payload: &str) -> WriteOutcome {
        let start_ts = now_nanos();
        let result = self
            .put_object(bucket, key, Bytes::copy_from_slice(payload.as_bytes()))
            .await;
        let end_ts = now_nanos();
        WriteOutcome {
            start_ts,
            end_ts,
            error: result.err().map(|err| format!("{err:#}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signer::Credentials;

    fn client(endpoint: &str, path_style: bool) -> S3Client {
        let signer = SigV4Signer::new(Credentials::new("AKID", "secret"), "us-east-1");
        S3Client::new(endpoint, signer, path_style).unwrap()
    }

    #[test]
    fn path_style_urls_carry_the_bucket_in_the_path() {
        let client = client("http://localhost:7480", true);
        let url = client.object_url("probe", Some("dir/obj 1")).unwrap();
        assert_eq!(url.as_str(), "http://localhost:7480/probe/dir/obj%201");
        let url = client.object_url("probe", None).unwrap();
        assert_eq!(url.as_str(), "http://localhost:7480/probe");
    }

    #[test]
    fn virtual_host_urls_carry_the_bucket_in_the_host() {
        let client = client("http://s3.local:7480", false);
        let url = client.object_url("probe", Some("obj")).unwrap();
        assert_eq!(url.as_str(), "http://probe.s3.local:7480/obj");
    }

    #[test]
    fn rejects_unparsable_endpoint() {
        let signer = SigV4Signer::new(Credentials::new("a", "b"), "us-east-1");
        assert!(S3Client::new("not a url", signer, true).is_err());
    }
}
