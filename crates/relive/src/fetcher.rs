// HTTP access to manifests and media segments.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use tracing::{debug, trace};
use url::Url;

use crate::error::ClipError;
use crate::segment::Segment;

#[async_trait]
pub trait ManifestSource: Send + Sync {
    /// Fetches the manifest body. Non-success statuses are errors.
    async fn fetch_manifest(&self, url: &Url) -> Result<String, ClipError>;
}

#[async_trait]
pub trait SegmentSource: Send + Sync {
    /// Fetches the raw bytes of one segment.
    async fn fetch_segment(&self, segment: &Segment) -> Result<Bytes, ClipError>;
}

pub struct HttpFetcher {
    client: Client,
    manifest_timeout: Duration,
    segment_timeout: Duration,
}

impl HttpFetcher {
    pub fn new(client: Client, manifest_timeout: Duration, segment_timeout: Duration) -> Self {
        Self {
            client,
            manifest_timeout,
            segment_timeout,
        }
    }

    async fn get(
        &self,
        url: Url,
        timeout: Duration,
        operation: &'static str,
    ) -> Result<reqwest::Response, ClipError> {
        let response = self
            .client
            .get(url.clone())
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| timeout_or_network(e, operation, &url))?;

        if !response.status().is_success() {
            return Err(ClipError::http_status(
                response.status(),
                url.as_str(),
                operation,
            ));
        }
        Ok(response)
    }
}

fn timeout_or_network(error: reqwest::Error, operation: &'static str, url: &Url) -> ClipError {
    if error.is_timeout() {
        ClipError::Timeout {
            reason: format!("{operation} for {url}"),
        }
    } else {
        ClipError::from(error)
    }
}

#[async_trait]
impl ManifestSource for HttpFetcher {
    async fn fetch_manifest(&self, url: &Url) -> Result<String, ClipError> {
        const OPERATION: &str = "manifest fetch";
        let response = self.get(url.clone(), self.manifest_timeout, OPERATION).await?;
        let text = response
            .text()
            .await
            .map_err(|e| timeout_or_network(e, OPERATION, url))?;
        trace!(url = %url, len = text.len(), "Fetched manifest");
        Ok(text)
    }
}

#[async_trait]
impl SegmentSource for HttpFetcher {
    async fn fetch_segment(&self, segment: &Segment) -> Result<Bytes, ClipError> {
        const OPERATION: &str = "segment fetch";
        let url = Url::parse(&segment.url).map_err(|e| ClipError::invalid_url(&segment.url, e))?;
        let response = self.get(url.clone(), self.segment_timeout, OPERATION).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| timeout_or_network(e, OPERATION, &url))?;
        debug!(url = %url, size = bytes.len(), "Downloaded segment");
        Ok(bytes)
    }
}
