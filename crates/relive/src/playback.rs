// Player clock collaborator used by manual clips and marks.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::ClipError;
use crate::segment::PlaybackState;
use crate::session::SessionId;

#[async_trait]
pub trait PlaybackStateProvider: Send + Sync {
    async fn playback_state(&self, session: SessionId) -> Result<PlaybackState, ClipError>;
}

/// Asks the player for its state, turning failures and timeouts into
/// [`ClipError::Sync`].
pub async fn query_playback_state(
    provider: &dyn PlaybackStateProvider,
    session: SessionId,
    timeout: Duration,
) -> Result<PlaybackState, ClipError> {
    match tokio::time::timeout(timeout, provider.playback_state(session)).await {
        Ok(Ok(state)) => Ok(state),
        Ok(Err(ClipError::Sync { session, reason })) => Err(ClipError::Sync { session, reason }),
        Ok(Err(e)) => Err(ClipError::Sync {
            session,
            reason: e.to_string(),
        }),
        Err(_) => Err(ClipError::Sync {
            session,
            reason: format!("no answer within {timeout:?}"),
        }),
    }
}

/// Last state each player pushed to the host. Sessions without a report
/// fail the query, as a detached player would.
#[derive(Debug, Default)]
pub struct ReportedPlayback {
    states: DashMap<SessionId, PlaybackState>,
}

impl ReportedPlayback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&self, session: SessionId, state: PlaybackState) {
        self.states.insert(session, state);
    }

    pub fn forget(&self, session: SessionId) {
        self.states.remove(&session);
    }
}

#[async_trait]
impl PlaybackStateProvider for ReportedPlayback {
    async fn playback_state(&self, session: SessionId) -> Result<PlaybackState, ClipError> {
        self.states
            .get(&session)
            .map(|state| *state)
            .ok_or_else(|| ClipError::Sync {
                session,
                reason: "player has not reported its state".to_owned(),
            })
    }
}
