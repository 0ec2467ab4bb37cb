// Media playlist parser: turns manifest text into segments on a single timeline.

use chrono::{DateTime, FixedOffset, Utc};
use tracing::{debug, trace, warn};
use url::Url;

use crate::config::Timeline;
use crate::segment::Segment;

const TAG_EXTINF: &str = "#EXTINF:";
const TAG_PROGRAM_DATE_TIME: &str = "#EXT-X-PROGRAM-DATE-TIME:";
const TAG_MEDIA_SEQUENCE: &str = "#EXT-X-MEDIA-SEQUENCE:";
const TAG_TARGET_DURATION: &str = "#EXT-X-TARGETDURATION:";

/// Whether the body is a master (variant) playlist rather than a media playlist.
pub fn is_master_playlist(text: &str) -> bool {
    m3u8_rs::is_master_playlist(text.as_bytes())
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PlaylistParser {
    timeline: Timeline,
}

impl PlaylistParser {
    pub fn new(timeline: Timeline) -> Self {
        Self { timeline }
    }

    /// Parses a media playlist, in manifest order.
    ///
    /// Entries with a non-numeric duration or a missing reference line are
    /// skipped; the rest of the manifest is still parsed.
    pub fn parse(&self, text: &str, manifest_url: &Url) -> Vec<Segment> {
        self.parse_at(text, manifest_url, wall_clock_seconds())
    }

    /// Same as [`parse`](Self::parse) with an explicit wall-clock reading.
    pub fn parse_at(&self, text: &str, manifest_url: &Url, now: f64) -> Vec<Segment> {
        let lines: Vec<&str> = text.lines().map(str::trim).collect();
        let is_dvr = text.contains(TAG_PROGRAM_DATE_TIME);

        let mut segments = Vec::new();
        let mut absolute_clock: Option<f64> = None;
        let mut media_sequence: u64 = 0;
        let mut target_duration: Option<f64> = None;
        let mut entry_index: u64 = 0;

        let mut i = 0;
        while i < lines.len() {
            let line = lines[i];
            i += 1;

            if let Some(value) = line.strip_prefix(TAG_MEDIA_SEQUENCE) {
                match value.trim().parse::<u64>() {
                    Ok(seq) => media_sequence = seq,
                    Err(e) => debug!(value, "Ignoring unparseable media sequence: {e}"),
                }
                continue;
            }

            if let Some(value) = line.strip_prefix(TAG_TARGET_DURATION) {
                target_duration = value.trim().parse::<f64>().ok().filter(|d| *d > 0.0);
                continue;
            }

            if is_dvr && let Some(value) = line.strip_prefix(TAG_PROGRAM_DATE_TIME) {
                absolute_clock = parse_program_date_time(value.trim());
                if absolute_clock.is_none() {
                    warn!(value, "Unparseable program-date-time tag");
                }
                continue;
            }

            let Some(info) = line.strip_prefix(TAG_EXTINF) else {
                continue;
            };
            let sequence_index = media_sequence + entry_index;
            entry_index += 1;

            let raw_duration = info.split(',').next().unwrap_or("").trim();
            let duration = match raw_duration.parse::<f64>() {
                Ok(d) if d.is_finite() && d >= 0.0 => d,
                _ => {
                    debug!(raw_duration, "Skipping segment entry with malformed duration");
                    continue;
                }
            };

            let reference = match lines.get(i) {
                Some(next) if !next.is_empty() && !next.starts_with('#') => {
                    i += 1;
                    *next
                }
                // A directive here stays unconsumed so the next pass still applies it.
                _ => {
                    debug!(msn = sequence_index, "Skipping segment entry without a URI line");
                    continue;
                }
            };

            let url = match manifest_url.join(reference) {
                Ok(resolved) => resolved.to_string(),
                Err(e) => {
                    warn!(reference, "Failed to resolve segment URI against {manifest_url}: {e}");
                    continue;
                }
            };

            let start_time = match absolute_clock.as_mut() {
                Some(clock) => {
                    let start = *clock;
                    *clock += duration;
                    start
                }
                None => match self.timeline {
                    Timeline::WallClock => now,
                    Timeline::MediaSequence => {
                        sequence_index as f64 * target_duration.unwrap_or(duration)
                    }
                },
            };

            segments.push(Segment {
                url,
                start_time,
                duration,
            });
        }

        trace!(
            count = segments.len(),
            dvr = is_dvr,
            media_sequence,
            "Parsed media playlist"
        );
        segments
    }
}

fn parse_program_date_time(value: &str) -> Option<f64> {
    let parsed: DateTime<FixedOffset> = DateTime::parse_from_rfc3339(value)
        .or_else(|_| DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f%z"))
        .ok()?;
    Some(parsed.timestamp_millis() as f64 / 1000.0)
}

fn wall_clock_seconds() -> f64 {
    Utc::now().timestamp_millis() as f64 / 1000.0
}
