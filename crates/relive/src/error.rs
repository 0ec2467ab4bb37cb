use reqwest::StatusCode;

use crate::session::SessionId;

#[derive(Debug, thiserror::Error)]
pub enum ClipError {
    #[error("HTTP request failed: {source}")]
    Network {
        #[from]
        source: reqwest::Error,
    },

    #[error("request failed with HTTP {status} during {operation} for {url}")]
    HttpStatus {
        status: StatusCode,
        url: String,
        operation: &'static str,
    },

    #[error("invalid URL `{input}`: {reason}")]
    InvalidUrl { input: String, reason: String },

    #[error("playlist error: {reason}")]
    Playlist { reason: String },

    #[error("playback state unavailable for session {session}: {reason}")]
    Sync { session: SessionId, reason: String },

    #[error("segment buffer is empty")]
    EmptyBuffer,

    #[error("no buffered segment overlaps [{start:.2}, {end:.2}]")]
    NoOverlap { start: f64, end: f64 },

    #[error("no usable segments: {reason}")]
    NoSegments { reason: String },

    #[error("session {session} has no tracked manifest")]
    NoManifest { session: SessionId },

    #[error("unknown session {session}")]
    UnknownSession { session: SessionId },

    #[error("invalid clip request: {reason}")]
    InvalidRequest { reason: String },

    #[error("operation timed out: {reason}")]
    Timeout { reason: String },

    #[error("repackaging failed: {reason}")]
    Repackage { reason: String },

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("internal error: {reason}")]
    Internal { reason: String },
}

impl ClipError {
    pub fn http_status(
        status: StatusCode,
        url: impl Into<String>,
        operation: &'static str,
    ) -> Self {
        Self::HttpStatus {
            status,
            url: url.into(),
            operation,
        }
    }

    pub fn invalid_url(input: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidUrl {
            input: input.into(),
            reason: reason.to_string(),
        }
    }

    pub fn invalid_request(reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            reason: reason.into(),
        }
    }

    pub fn repackage(reason: impl Into<String>) -> Self {
        Self::Repackage {
            reason: reason.into(),
        }
    }

    /// Errors after which a manual clip request retries through the
    /// fresh-manifest fallback instead of failing. `NoOverlap` is included:
    /// marks older than the rolling buffer can still lie in the live window.
    pub fn triggers_fallback(&self) -> bool {
        matches!(
            self,
            Self::Sync { .. } | Self::EmptyBuffer | Self::NoOverlap { .. }
        )
    }

    /// Whether a later attempt at the same network operation could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network { .. } | Self::Timeout { .. } | Self::Io { .. } => true,
            Self::HttpStatus { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            Self::InvalidUrl { .. }
            | Self::Playlist { .. }
            | Self::Sync { .. }
            | Self::EmptyBuffer
            | Self::NoOverlap { .. }
            | Self::NoSegments { .. }
            | Self::NoManifest { .. }
            | Self::UnknownSession { .. }
            | Self::InvalidRequest { .. }
            | Self::Repackage { .. }
            | Self::Internal { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_for_sync_empty_buffer_and_no_overlap() {
        let sync = ClipError::Sync {
            session: SessionId(1),
            reason: "no player".into(),
        };
        assert!(sync.triggers_fallback());
        assert!(ClipError::EmptyBuffer.triggers_fallback());
        assert!(ClipError::NoOverlap { start: 0.0, end: 1.0 }.triggers_fallback());
        assert!(!ClipError::repackage("boom").triggers_fallback());
        assert!(!ClipError::NoSegments { reason: "empty".into() }.triggers_fallback());
    }

    #[test]
    fn http_status_retryability() {
        let server = ClipError::http_status(StatusCode::BAD_GATEWAY, "u", "segment fetch");
        let client = ClipError::http_status(StatusCode::NOT_FOUND, "u", "segment fetch");
        let throttled =
            ClipError::http_status(StatusCode::TOO_MANY_REQUESTS, "u", "manifest fetch");
        assert!(server.is_retryable());
        assert!(!client.is_retryable());
        assert!(throttled.is_retryable());
    }
}
