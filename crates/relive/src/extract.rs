// Segment selection for quick and manual clip requests.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};
use url::Url;

use crate::buffer::SharedBuffer;
use crate::error::ClipError;
use crate::fetcher::ManifestSource;
use crate::playback::{PlaybackStateProvider, query_playback_state};
use crate::playlist::{PlaylistParser, is_master_playlist};
use crate::segment::Segment;
use crate::session::SessionId;
use crate::sync::synchronize;

/// The tail of the buffer covering the last `seconds` of media.
pub fn select_last_duration(segments: &[Segment], seconds: f64) -> Result<Vec<Segment>, ClipError> {
    let last = segments.last().ok_or(ClipError::EmptyBuffer)?;
    let stream_end = last.end_time();
    let target_start = stream_end - seconds;

    let selected: Vec<Segment> = segments
        .iter()
        .filter(|segment| segment.end_time() > target_start)
        .cloned()
        .collect();

    debug!(
        seconds,
        target_start,
        stream_end,
        selected = selected.len(),
        "Selected quick clip window"
    );
    Ok(selected)
}

/// Inputs of a manual (start/end) clip request.
#[derive(Clone)]
pub struct ManualClip {
    pub session: SessionId,
    pub manifest_url: Option<Url>,
    pub buffer: SharedBuffer,
    /// Player-relative marks, in seconds.
    pub start: f64,
    pub end: f64,
}

#[async_trait]
pub trait ClipExtractionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn extract(&self, clip: &ManualClip) -> Result<Vec<Segment>, ClipError>;
}

/// Maps the marks onto the buffer through the player's live edge.
pub struct SynchronizedExtraction {
    playback: Arc<dyn PlaybackStateProvider>,
    query_timeout: Duration,
    tolerance: f64,
}

impl SynchronizedExtraction {
    pub fn new(
        playback: Arc<dyn PlaybackStateProvider>,
        query_timeout: Duration,
        tolerance: f64,
    ) -> Self {
        Self {
            playback,
            query_timeout,
            tolerance,
        }
    }
}

#[async_trait]
impl ClipExtractionStrategy for SynchronizedExtraction {
    fn name(&self) -> &'static str {
        "synchronized"
    }

    async fn extract(&self, clip: &ManualClip) -> Result<Vec<Segment>, ClipError> {
        if clip.buffer.lock().await.is_empty() {
            return Err(ClipError::EmptyBuffer);
        }

        let state =
            query_playback_state(self.playback.as_ref(), clip.session, self.query_timeout).await?;

        let buffer = clip.buffer.lock().await;
        synchronize(
            buffer.segments(),
            state.seekable_end,
            clip.start,
            clip.end,
            self.tolerance,
        )
    }
}

/// Re-fetches the current manifest and returns every segment it lists.
///
/// The marks are not applied: without the player's live edge there is no
/// mapping from player time onto the manifest timeline.
pub struct LegacyManifestExtraction {
    manifests: Arc<dyn ManifestSource>,
    parser: PlaylistParser,
}

impl LegacyManifestExtraction {
    pub fn new(manifests: Arc<dyn ManifestSource>, parser: PlaylistParser) -> Self {
        Self { manifests, parser }
    }
}

#[async_trait]
impl ClipExtractionStrategy for LegacyManifestExtraction {
    fn name(&self) -> &'static str {
        "legacy-manifest"
    }

    async fn extract(&self, clip: &ManualClip) -> Result<Vec<Segment>, ClipError> {
        let url = clip
            .manifest_url
            .as_ref()
            .ok_or(ClipError::NoManifest {
                session: clip.session,
            })?;

        let text = self.manifests.fetch_manifest(url).await?;
        if is_master_playlist(&text) {
            return Err(ClipError::Playlist {
                reason: format!("{url} is a master playlist, not a media playlist"),
            });
        }
        let segments = self.parser.parse(&text, url);
        if segments.is_empty() {
            return Err(ClipError::NoSegments {
                reason: format!("fresh manifest {url} listed no segments"),
            });
        }
        Ok(segments)
    }
}

/// Synchronized extraction first, the fresh-manifest fallback second.
pub struct ManualClipPlan {
    primary: Box<dyn ClipExtractionStrategy>,
    fallback: Box<dyn ClipExtractionStrategy>,
}

impl ManualClipPlan {
    pub fn new(
        primary: Box<dyn ClipExtractionStrategy>,
        fallback: Box<dyn ClipExtractionStrategy>,
    ) -> Self {
        Self { primary, fallback }
    }

    pub async fn extract(&self, clip: &ManualClip) -> Result<Vec<Segment>, ClipError> {
        match self.primary.extract(clip).await {
            Ok(segments) => {
                info!(
                    session = %clip.session,
                    strategy = self.primary.name(),
                    segments = segments.len(),
                    "Manual clip segments selected"
                );
                Ok(segments)
            }
            Err(e) if e.triggers_fallback() => {
                warn!(
                    session = %clip.session,
                    from = self.primary.name(),
                    to = self.fallback.name(),
                    error = %e,
                    "Falling back for manual clip"
                );
                let segments = self.fallback.extract(clip).await?;
                info!(
                    session = %clip.session,
                    strategy = self.fallback.name(),
                    segments = segments.len(),
                    "Manual clip segments selected"
                );
                Ok(segments)
            }
            Err(e) => Err(e),
        }
    }
}
