// Per-session lifecycle: manifest tracking, marks and clip requests.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};
use url::Url;

use crate::assembly::ClipAssembler;
use crate::buffer::{SegmentBuffer, SharedBuffer};
use crate::config::{EngineConfig, create_client};
use crate::detect::DetectionFilter;
use crate::error::ClipError;
use crate::extract::{
    LegacyManifestExtraction, ManualClip, ManualClipPlan, SynchronizedExtraction,
    select_last_duration,
};
use crate::fetcher::{HttpFetcher, ManifestSource, SegmentSource};
use crate::output::{ArtifactSink, SavedClip};
use crate::playback::{PlaybackStateProvider, query_playback_state};
use crate::playlist::{PlaylistParser, PlaylistPoller};
use crate::repackage::Repackager;
use crate::segment::{ClipRequest, Segment};

/// The host's identifier for one tab or player session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What the host reports about a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    ManifestDetected { session: SessionId, url: String },
    NavigationStarted { session: SessionId },
    Closed { session: SessionId },
}

/// Serializable view of one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub manifest_url: Option<String>,
    pub segment_buffer: Vec<Segment>,
    pub marked_start_time: Option<f64>,
    pub marked_end_time: Option<f64>,
}

#[derive(Debug, Clone)]
struct SessionState {
    manifest_url: Option<Url>,
    buffer: SharedBuffer,
    marked_start: Option<f64>,
    marked_end: Option<f64>,
}

impl SessionState {
    fn new(max_buffer_duration: f64) -> Self {
        Self {
            manifest_url: None,
            buffer: SegmentBuffer::new(max_buffer_duration).into_shared(),
            marked_start: None,
            marked_end: None,
        }
    }
}

/// Collaborators the manager drives.
#[derive(Clone)]
pub struct EngineDeps {
    pub manifests: Arc<dyn ManifestSource>,
    pub segments: Arc<dyn SegmentSource>,
    pub repackager: Arc<dyn Repackager>,
    pub sink: Arc<dyn ArtifactSink>,
    pub playback: Arc<dyn PlaybackStateProvider>,
}

pub struct SessionManager {
    config: EngineConfig,
    detection: DetectionFilter,
    sessions: DashMap<SessionId, SessionState>,
    poller: PlaylistPoller,
    assembler: ClipAssembler,
    manual_plan: ManualClipPlan,
    playback: Arc<dyn PlaybackStateProvider>,
    sink: Arc<dyn ArtifactSink>,
}

impl SessionManager {
    pub fn new(config: EngineConfig, deps: EngineDeps) -> Self {
        let parser = PlaylistParser::new(config.timeline);
        let poller = PlaylistPoller::new(
            Arc::clone(&deps.manifests),
            parser,
            config.poll_interval,
        );
        let assembler = ClipAssembler::new(
            deps.segments,
            deps.repackager,
            config.fetch_concurrency,
            config.product_name.clone(),
        );
        let manual_plan = ManualClipPlan::new(
            Box::new(SynchronizedExtraction::new(
                Arc::clone(&deps.playback),
                config.playback_query_timeout,
                config.sync_tolerance,
            )),
            Box::new(LegacyManifestExtraction::new(deps.manifests, parser)),
        );

        Self {
            detection: DetectionFilter::new(&config.detection),
            config,
            sessions: DashMap::new(),
            poller,
            assembler,
            manual_plan,
            playback: deps.playback,
            sink: deps.sink,
        }
    }

    /// Wires the manager to an HTTP client built from `config.client`.
    pub fn with_http(
        config: EngineConfig,
        repackager: Arc<dyn Repackager>,
        sink: Arc<dyn ArtifactSink>,
        playback: Arc<dyn PlaybackStateProvider>,
    ) -> Result<Self, ClipError> {
        let client = create_client(&config.client)?;
        let fetcher = Arc::new(HttpFetcher::new(
            client,
            config.client.manifest_timeout,
            config.segment_fetch_timeout,
        ));
        let deps = EngineDeps {
            manifests: fetcher.clone(),
            segments: fetcher,
            repackager,
            sink,
            playback,
        };
        Ok(Self::new(config, deps))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn detection(&self) -> &DetectionFilter {
        &self.detection
    }

    pub fn handle_event(&self, event: SessionEvent) -> Result<(), ClipError> {
        match event {
            SessionEvent::ManifestDetected { session, url } => self.on_manifest(session, &url),
            SessionEvent::NavigationStarted { session } => {
                self.on_navigation(session);
                Ok(())
            }
            SessionEvent::Closed { session } => {
                self.on_closed(session);
                Ok(())
            }
        }
    }

    fn on_manifest(&self, session: SessionId, url: &str) -> Result<(), ClipError> {
        let url = Url::parse(url).map_err(|e| ClipError::invalid_url(url, e))?;
        if !self.detection.accepts(&url) {
            debug!(%session, %url, "Ignoring request that is not a tracked media playlist");
            return Ok(());
        }

        let mut state = self
            .sessions
            .entry(session)
            .or_insert_with(|| SessionState::new(self.config.max_buffer_duration));
        if state.manifest_url.as_ref() == Some(&url) {
            return Ok(());
        }
        state.manifest_url = Some(url.clone());
        state.buffer = SegmentBuffer::new(self.config.max_buffer_duration).into_shared();

        info!(%session, %url, "Tracking new manifest");
        // Started under the entry guard: the running poller always feeds the tracked buffer.
        self.poller.start(session, url, Arc::clone(&state.buffer));
        Ok(())
    }

    fn on_navigation(&self, session: SessionId) {
        match self.sessions.get_mut(&session) {
            Some(mut state) => {
                self.poller.stop(session);
                *state = SessionState::new(self.config.max_buffer_duration);
                info!(%session, "Session reset on navigation");
            }
            None => {
                self.poller.stop(session);
            }
        }
    }

    fn on_closed(&self, session: SessionId) {
        match self.sessions.entry(session) {
            Entry::Occupied(entry) => {
                self.poller.stop(session);
                entry.remove();
                info!(%session, "Session closed");
            }
            Entry::Vacant(_) => {
                self.poller.stop(session);
            }
        }
    }

    fn state(&self, session: SessionId) -> Result<SessionState, ClipError> {
        self.sessions
            .get(&session)
            .map(|state| state.clone())
            .ok_or(ClipError::UnknownSession { session })
    }

    pub fn contains(&self, session: SessionId) -> bool {
        self.sessions.contains_key(&session)
    }

    pub fn manifest_url(&self, session: SessionId) -> Option<Url> {
        self.sessions
            .get(&session)
            .and_then(|state| state.manifest_url.clone())
    }

    pub fn is_polling(&self, session: SessionId) -> bool {
        self.poller.is_active(session)
    }

    /// Copy of the session's buffered segments.
    pub async fn buffered_segments(&self, session: SessionId) -> Result<Vec<Segment>, ClipError> {
        let buffer = self.state(session)?.buffer;
        let guard = buffer.lock().await;
        Ok(guard.segments().to_vec())
    }

    /// Selects, assembles and saves a clip for the session.
    #[instrument(skip(self))]
    pub async fn request_clip(
        &self,
        session: SessionId,
        request: ClipRequest,
    ) -> Result<SavedClip, ClipError> {
        request.validate()?;
        let state = self.state(session)?;

        let segments = match request {
            ClipRequest::Quick { duration_seconds } => {
                let guard = state.buffer.lock().await;
                select_last_duration(guard.segments(), duration_seconds)?
            }
            ClipRequest::Manual { start, end } => {
                if state.manifest_url.is_none() {
                    return Err(ClipError::NoManifest { session });
                }
                let clip = ManualClip {
                    session,
                    manifest_url: state.manifest_url,
                    buffer: state.buffer,
                    start,
                    end,
                };
                self.manual_plan.extract(&clip).await?
            }
        };

        let artifact = self.assembler.assemble(&segments).await?;
        let saved = self.sink.save(&artifact.filename, artifact.bytes).await?;
        info!(
            filename = %saved.filename,
            size = saved.size,
            segments = artifact.segment_count,
            "Clip ready"
        );
        Ok(saved)
    }

    /// Stores the player's current position as the clip start.
    pub async fn mark_start(&self, session: SessionId) -> Result<f64, ClipError> {
        let position = self.current_time(session).await?;
        self.update_marks(session, |state| state.marked_start = Some(position))?;
        debug!(%session, position, "Start marked");
        Ok(position)
    }

    /// Stores the player's current position as the clip end.
    pub async fn mark_end(&self, session: SessionId) -> Result<f64, ClipError> {
        let position = self.current_time(session).await?;
        self.update_marks(session, |state| state.marked_end = Some(position))?;
        debug!(%session, position, "End marked");
        Ok(position)
    }

    pub fn set_marks(
        &self,
        session: SessionId,
        start: Option<f64>,
        end: Option<f64>,
    ) -> Result<(), ClipError> {
        self.update_marks(session, |state| {
            state.marked_start = start;
            state.marked_end = end;
        })
    }

    pub fn reset_marks(&self, session: SessionId) -> Result<(), ClipError> {
        self.set_marks(session, None, None)
    }

    /// Manual clip over the stored marks.
    pub async fn clip_marked(&self, session: SessionId) -> Result<SavedClip, ClipError> {
        let state = self.state(session)?;
        let start = state
            .marked_start
            .ok_or_else(|| ClipError::invalid_request("start time is not marked"))?;
        let end = state
            .marked_end
            .ok_or_else(|| ClipError::invalid_request("end time is not marked"))?;
        self.request_clip(session, ClipRequest::manual(start, end))
            .await
    }

    async fn current_time(&self, session: SessionId) -> Result<f64, ClipError> {
        if !self.contains(session) {
            return Err(ClipError::UnknownSession { session });
        }
        let state = query_playback_state(
            self.playback.as_ref(),
            session,
            self.config.playback_query_timeout,
        )
        .await?;
        Ok(state.current_time)
    }

    fn update_marks(
        &self,
        session: SessionId,
        update: impl FnOnce(&mut SessionState),
    ) -> Result<(), ClipError> {
        let mut state = self
            .sessions
            .get_mut(&session)
            .ok_or(ClipError::UnknownSession { session })?;
        update(&mut state);
        Ok(())
    }

    /// Serializable view of every session.
    pub async fn snapshot(&self) -> BTreeMap<SessionId, SessionSnapshot> {
        let states: Vec<(SessionId, SessionState)> = self
            .sessions
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();

        let mut snapshot = BTreeMap::new();
        for (session, state) in states {
            let segment_buffer = state.buffer.lock().await.segments().to_vec();
            snapshot.insert(
                session,
                SessionSnapshot {
                    manifest_url: state.manifest_url.map(String::from),
                    segment_buffer,
                    marked_start_time: state.marked_start,
                    marked_end_time: state.marked_end,
                },
            );
        }
        snapshot
    }

    /// Stops every poller and forgets every session.
    pub fn shutdown(&self) {
        self.poller.stop_all();
        self.sessions.clear();
        info!("Session manager shut down");
    }
}
