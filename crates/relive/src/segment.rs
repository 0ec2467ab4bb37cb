use serde::{Deserialize, Serialize};

use crate::error::ClipError;

/// Quick clip lengths offered to users, in seconds.
pub const QUICK_CLIP_PRESETS: [f64; 3] = [30.0, 120.0, 180.0];

/// One addressable media segment on the buffer's timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    pub url: String,
    /// Seconds; epoch-based when the manifest has program-date-time tags.
    pub start_time: f64,
    pub duration: f64,
}

impl Segment {
    pub fn new(url: impl Into<String>, start_time: f64, duration: f64) -> Self {
        Self {
            url: url.into(),
            start_time,
            duration,
        }
    }

    #[inline]
    pub fn end_time(&self) -> f64 {
        self.start_time + self.duration
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClipRequest {
    /// The last `duration_seconds` of the buffer.
    Quick { duration_seconds: f64 },
    /// A window marked against the player's clock.
    Manual { start: f64, end: f64 },
}

impl ClipRequest {
    pub fn quick(duration_seconds: f64) -> Self {
        Self::Quick { duration_seconds }
    }

    pub fn manual(start: f64, end: f64) -> Self {
        Self::Manual { start, end }
    }

    pub fn validate(&self) -> Result<(), ClipError> {
        match *self {
            Self::Quick { duration_seconds } => {
                if !duration_seconds.is_finite() || duration_seconds <= 0.0 {
                    return Err(ClipError::invalid_request(format!(
                        "clip duration must be positive, got {duration_seconds}"
                    )));
                }
            }
            Self::Manual { start, end } => {
                if !start.is_finite() || start <= 0.0 {
                    return Err(ClipError::invalid_request("start time is not marked"));
                }
                if !end.is_finite() || end <= 0.0 {
                    return Err(ClipError::invalid_request("end time is not marked"));
                }
                if end <= start {
                    return Err(ClipError::invalid_request(
                        "end time must come after start time",
                    ));
                }
            }
        }
        Ok(())
    }
}

/// What the player reports about its own clock.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackState {
    pub current_time: f64,
    /// Upper bound of the seekable range; the player's live edge.
    pub seekable_end: f64,
    pub duration: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn end_time_adds_duration() {
        let seg = Segment::new("https://cdn/a.ts", 100.0, 6.0);
        assert_eq!(seg.end_time(), 106.0);
    }

    #[test]
    fn manual_request_validation() {
        assert!(ClipRequest::manual(10.0, 20.0).validate().is_ok());
        assert!(ClipRequest::manual(0.0, 20.0).validate().is_err());
        assert!(ClipRequest::manual(10.0, 0.0).validate().is_err());
        assert!(ClipRequest::manual(20.0, 10.0).validate().is_err());
        assert!(ClipRequest::manual(20.0, 20.0).validate().is_err());
    }

    #[test]
    fn quick_request_validation() {
        for preset in QUICK_CLIP_PRESETS {
            assert!(ClipRequest::quick(preset).validate().is_ok());
        }
        assert!(ClipRequest::quick(0.0).validate().is_err());
        assert!(ClipRequest::quick(f64::NAN).validate().is_err());
    }

    #[test]
    fn segment_serializes_camel_case() {
        let json = serde_json::to_value(Segment::new("u", 1.5, 2.0)).unwrap();
        assert_eq!(json["startTime"], 1.5);
        assert_eq!(json["duration"], 2.0);
    }
}
