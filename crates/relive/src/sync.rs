// Maps player-relative marks onto the buffer's timeline.

use tracing::debug;

use crate::error::ClipError;
use crate::segment::Segment;

/// Default slack, in seconds, on both ends of a synchronized window.
pub const DEFAULT_SYNC_TOLERANCE: f64 = 2.0;

/// A player window translated onto the buffer timeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncWindow {
    pub buffer_live_edge: f64,
    pub player_live_edge: f64,
    pub offset: f64,
    pub absolute_start: f64,
    pub absolute_end: f64,
    pub tolerance: f64,
}

impl SyncWindow {
    /// Aligns the buffer's live edge with the player's and shifts the marks by
    /// the difference.
    pub fn new(
        buffer_live_edge: f64,
        player_live_edge: f64,
        user_start: f64,
        user_end: f64,
        tolerance: f64,
    ) -> Self {
        let offset = buffer_live_edge - player_live_edge;
        Self {
            buffer_live_edge,
            player_live_edge,
            offset,
            absolute_start: user_start + offset,
            absolute_end: user_end + offset,
            tolerance,
        }
    }

    #[inline]
    pub fn contains(&self, segment: &Segment) -> bool {
        segment.end_time() > self.absolute_start - self.tolerance
            && segment.start_time < self.absolute_end + self.tolerance
    }

    pub fn select(&self, segments: &[Segment]) -> Vec<Segment> {
        segments
            .iter()
            .filter(|segment| self.contains(segment))
            .cloned()
            .collect()
    }
}

/// Selects the buffered segments covering `[user_start, user_end]` on the
/// player's clock.
pub fn synchronize(
    segments: &[Segment],
    player_live_edge: f64,
    user_start: f64,
    user_end: f64,
    tolerance: f64,
) -> Result<Vec<Segment>, ClipError> {
    let last = segments.last().ok_or(ClipError::EmptyBuffer)?;
    let window = SyncWindow::new(
        last.end_time(),
        player_live_edge,
        user_start,
        user_end,
        tolerance,
    );

    debug!(
        buffer_live_edge = window.buffer_live_edge,
        player_live_edge = window.player_live_edge,
        offset = window.offset,
        absolute_start = window.absolute_start,
        absolute_end = window.absolute_end,
        "Synchronized player window"
    );

    let selected = window.select(segments);
    if selected.is_empty() {
        return Err(ClipError::NoOverlap {
            start: window.absolute_start,
            end: window.absolute_end,
        });
    }
    Ok(selected)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timeline(end: f64, duration: f64, count: usize) -> Vec<Segment> {
        (0..count)
            .rev()
            .map(|i| {
                let start = end - duration * (i as f64 + 1.0);
                Segment::new(format!("https://cdn/{start}.ts"), start, duration)
            })
            .collect()
    }

    #[test]
    fn window_offsets_marks_by_live_edge_difference() {
        let window = SyncWindow::new(1000.0, 950.0, 10.0, 20.0, DEFAULT_SYNC_TOLERANCE);
        assert_eq!(window.offset, 50.0);
        assert_eq!(window.absolute_start, 60.0);
        assert_eq!(window.absolute_end, 70.0);

        // segEnd > 58 AND segStart < 72
        assert!(window.contains(&Segment::new("a", 56.0, 2.5)));
        assert!(!window.contains(&Segment::new("b", 56.0, 2.0)));
        assert!(window.contains(&Segment::new("c", 71.9, 2.0)));
        assert!(!window.contains(&Segment::new("d", 72.0, 2.0)));
    }

    #[test]
    fn synchronize_selects_overlapping_segments() {
        let segments = timeline(1000.0, 2.0, 150);
        // Player live edge 100: marks 80..90 map to 980..990.
        let selected = synchronize(&segments, 100.0, 80.0, 90.0, 2.0).expect("overlap");
        let first = selected.first().unwrap();
        let last = selected.last().unwrap();
        assert!(first.end_time() > 978.0 && first.start_time <= 978.0);
        assert!(last.start_time < 992.0 && last.end_time() >= 992.0);
        // Starts 978, 980, ..., 990.
        assert_eq!(selected.len(), 7);
    }

    #[test]
    fn synchronize_reports_empty_buffer() {
        let result = synchronize(&[], 10.0, 1.0, 2.0, 2.0);
        assert!(matches!(result, Err(ClipError::EmptyBuffer)));
    }

    #[test]
    fn synchronize_reports_window_outside_buffer() {
        let segments = timeline(1000.0, 2.0, 10);
        let result = synchronize(&segments, 1000.0, 100.0, 200.0, 2.0);
        assert!(matches!(result, Err(ClipError::NoOverlap { .. })));
    }
}
