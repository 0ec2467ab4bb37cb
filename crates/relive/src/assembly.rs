// Clip assembly: fetch selected segments, join them, repackage, name the result.

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use chrono::{DateTime, SecondsFormat, Utc};
use futures::{StreamExt, TryStreamExt};
use tracing::{debug, info, instrument};

use crate::error::ClipError;
use crate::fetcher::SegmentSource;
use crate::repackage::{Repackager, collect_artifact};
use crate::segment::Segment;

/// A finished, playable clip that has not been saved yet.
#[derive(Debug, Clone)]
pub struct ClipArtifact {
    pub filename: String,
    pub bytes: Bytes,
    pub segment_count: usize,
}

/// `<product>-clip-<ISO-8601 with ':' replaced by '-'>.<extension>`
pub fn clip_filename(product: &str, at: DateTime<Utc>, extension: &str) -> String {
    let stamp = at
        .to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace(':', "-");
    format!("{product}-clip-{stamp}.{extension}")
}

/// Joins segment payloads back to back, in the given order.
pub fn concatenate(parts: &[Bytes]) -> Bytes {
    let total = parts.iter().map(Bytes::len).sum();
    let mut combined = BytesMut::with_capacity(total);
    for part in parts {
        combined.extend_from_slice(part);
    }
    combined.freeze()
}

pub struct ClipAssembler {
    source: Arc<dyn SegmentSource>,
    repackager: Arc<dyn Repackager>,
    concurrency: usize,
    product_name: String,
}

impl ClipAssembler {
    pub fn new(
        source: Arc<dyn SegmentSource>,
        repackager: Arc<dyn Repackager>,
        concurrency: usize,
        product_name: impl Into<String>,
    ) -> Self {
        Self {
            source,
            repackager,
            concurrency: concurrency.max(1),
            product_name: product_name.into(),
        }
    }

    /// Downloads every segment concurrently. Results keep the input order;
    /// the first failure aborts the whole batch.
    pub async fn fetch_all(&self, segments: &[Segment]) -> Result<Vec<Bytes>, ClipError> {
        futures::stream::iter(segments.iter().cloned())
            .map(|segment| {
                let source = Arc::clone(&self.source);
                async move { source.fetch_segment(&segment).await }
            })
            .buffered(self.concurrency)
            .try_collect()
            .await
    }

    /// Runs the repackager on the blocking pool and stitches its output.
    pub async fn repackage(&self, data: Bytes) -> Result<Bytes, ClipError> {
        let repackager = Arc::clone(&self.repackager);
        let events = tokio::task::spawn_blocking(move || {
            let mut session = repackager.session();
            session.push(data)?;
            session.flush()
        })
        .await
        .map_err(|e| ClipError::Internal {
            reason: format!("repackaging task failed: {e}"),
        })??;

        debug!(events = events.len(), "Repackager flushed");
        let artifact = collect_artifact(events);
        if artifact.is_empty() {
            return Err(ClipError::repackage("repackager produced no output"));
        }
        Ok(artifact)
    }

    #[instrument(skip_all, fields(segments = segments.len()))]
    pub async fn assemble(&self, segments: &[Segment]) -> Result<ClipArtifact, ClipError> {
        if segments.is_empty() {
            return Err(ClipError::NoSegments {
                reason: "nothing selected for this clip".to_owned(),
            });
        }

        let parts = self.fetch_all(segments).await?;
        let combined = concatenate(&parts);
        info!(
            segments = parts.len(),
            bytes = combined.len(),
            "Fetched clip segments"
        );

        let bytes = self.repackage(combined).await?;
        let filename = clip_filename(
            &self.product_name,
            Utc::now(),
            self.repackager.container_extension(),
        );

        Ok(ClipArtifact {
            filename,
            bytes,
            segment_count: segments.len(),
        })
    }
}
