use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use relive_engine::{
    ClipRequest, DirectorySink, EngineConfig, PassthroughRepackager, PlaybackState,
    QUICK_CLIP_PRESETS, ReportedPlayback, SavedClip, SessionEvent, SessionId, SessionManager,
};
use tracing::{info, warn};

use crate::error::{AppError, Result};

/// The single session a CLI run tracks.
const CLI_SESSION: SessionId = SessionId(1);

#[derive(Debug, Clone)]
pub struct CaptureOptions {
    pub url: String,
    pub last: Option<f64>,
    pub start: Option<f64>,
    pub end: Option<f64>,
    pub live_edge: Option<f64>,
    pub warmup: Duration,
    pub output_dir: PathBuf,
    pub dump_state: bool,
}

impl CaptureOptions {
    /// Marks win over `--last`; with neither, the shortest preset is used.
    pub fn clip_request(&self) -> ClipRequest {
        match (self.start, self.end) {
            (Some(start), Some(end)) => ClipRequest::manual(start, end),
            _ => ClipRequest::quick(self.last.unwrap_or(QUICK_CLIP_PRESETS[0])),
        }
    }

    /// What the player would have reported when the marks were taken.
    fn reported_state(&self) -> Option<PlaybackState> {
        let live_edge = self.live_edge?;
        Some(PlaybackState {
            current_time: self.end.unwrap_or(live_edge),
            seekable_end: live_edge,
            duration: f64::INFINITY,
        })
    }
}

pub async fn run_capture(config: EngineConfig, options: CaptureOptions) -> Result<SavedClip> {
    let request = options.clip_request();
    request.validate()?;

    let playback = Arc::new(ReportedPlayback::new());
    if let Some(state) = options.reported_state() {
        playback.report(CLI_SESSION, state);
    }

    let manager = SessionManager::with_http(
        config,
        Arc::new(PassthroughRepackager),
        Arc::new(DirectorySink::new(options.output_dir.clone())),
        playback,
    )?;

    manager.handle_event(SessionEvent::ManifestDetected {
        session: CLI_SESSION,
        url: options.url.clone(),
    })?;
    if !manager.contains(CLI_SESSION) {
        return Err(AppError::InvalidInput(format!(
            "{} is not a media playlist on a tracked host",
            options.url
        )));
    }

    info!(warmup = ?options.warmup, "Filling buffer");
    tokio::select! {
        _ = tokio::time::sleep(options.warmup) => {}
        _ = tokio::signal::ctrl_c() => {
            manager.shutdown();
            return Err(AppError::Interrupted);
        }
    }

    let buffered = manager.buffered_segments(CLI_SESSION).await?;
    if buffered.is_empty() {
        warn!("No segments buffered during warmup");
    } else {
        info!(segments = buffered.len(), "Buffer ready");
    }

    let result = manager.request_clip(CLI_SESSION, request).await;

    if options.dump_state {
        let snapshot = manager.snapshot().await;
        match serde_json::to_string_pretty(&snapshot) {
            Ok(json) => println!("{json}"),
            Err(e) => warn!("Failed to serialize session state: {e}"),
        }
    }

    manager.handle_event(SessionEvent::Closed {
        session: CLI_SESSION,
    })?;
    manager.shutdown();

    Ok(result?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> CaptureOptions {
        CaptureOptions {
            url: "https://stream.kick.com/live/index.m3u8".to_owned(),
            last: None,
            start: None,
            end: None,
            live_edge: None,
            warmup: Duration::ZERO,
            output_dir: PathBuf::from("."),
            dump_state: false,
        }
    }

    #[test]
    fn defaults_to_shortest_preset() {
        assert_eq!(options().clip_request(), ClipRequest::quick(30.0));
    }

    #[test]
    fn marks_make_a_manual_request() {
        let options = CaptureOptions {
            start: Some(10.0),
            end: Some(20.0),
            live_edge: Some(25.0),
            ..options()
        };
        assert_eq!(options.clip_request(), ClipRequest::manual(10.0, 20.0));
        let state = options.reported_state().unwrap();
        assert_eq!(state.seekable_end, 25.0);
        assert_eq!(state.current_time, 20.0);
    }

    #[test]
    fn no_live_edge_means_no_player() {
        let options = CaptureOptions {
            start: Some(10.0),
            end: Some(20.0),
            ..options()
        };
        assert!(options.reported_state().is_none());
    }

    #[tokio::test]
    async fn untracked_host_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let options = CaptureOptions {
            url: "https://example.com/live/index.m3u8".to_owned(),
            output_dir: dir.path().to_path_buf(),
            ..options()
        };
        let err = run_capture(EngineConfig::default(), options)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }
}
