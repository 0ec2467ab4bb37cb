// Sliding window of recently published segments for one session.

use std::sync::Arc;

use rustc_hash::FxHashSet;
use tokio::sync::Mutex;
use tracing::trace;

use crate::segment::Segment;

/// Default amount of media, in seconds, kept behind the live edge.
pub const DEFAULT_MAX_BUFFER_DURATION: f64 = 300.0;

/// A session's buffer, shared by its poller and clip requests.
pub type SharedBuffer = Arc<Mutex<SegmentBuffer>>;

/// Result of folding one poll into the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MergeOutcome {
    pub added: usize,
    pub purged: usize,
    pub len: usize,
}

/// Segments unique by url, ascending by `start_time`, bounded to
/// `max_duration` seconds behind the newest segment's end.
#[derive(Debug, Clone)]
pub struct SegmentBuffer {
    segments: Vec<Segment>,
    known_urls: FxHashSet<String>,
    max_duration: f64,
}

impl Default for SegmentBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BUFFER_DURATION)
    }
}

impl SegmentBuffer {
    pub fn new(max_duration: f64) -> Self {
        Self {
            segments: Vec::new(),
            known_urls: FxHashSet::default(),
            max_duration,
        }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn max_duration(&self) -> f64 {
        self.max_duration
    }

    /// End time of the newest segment.
    pub fn live_edge(&self) -> Option<f64> {
        self.segments.last().map(Segment::end_time)
    }

    /// Appends every segment whose url is not yet buffered, then re-sorts.
    /// Returns the number of segments added.
    pub fn merge(&mut self, new_segments: impl IntoIterator<Item = Segment>) -> usize {
        let mut added = 0;
        for segment in new_segments {
            if self.known_urls.insert(segment.url.clone()) {
                self.segments.push(segment);
                added += 1;
            }
        }
        if added > 0 {
            self.segments
                .sort_by(|a, b| a.start_time.total_cmp(&b.start_time));
        }
        added
    }

    /// Drops segments that ended more than `max_duration` before the live edge.
    /// Returns the number of segments removed.
    pub fn purge(&mut self) -> usize {
        let Some(live_edge) = self.live_edge() else {
            return 0;
        };
        let cutoff = live_edge - self.max_duration;
        let before = self.segments.len();

        let known_urls = &mut self.known_urls;
        self.segments.retain(|segment| {
            let keep = segment.end_time() > cutoff;
            if !keep {
                known_urls.remove(&segment.url);
            }
            keep
        });
        before - self.segments.len()
    }

    /// Merge followed by purge; callers hold the session lock across this call.
    pub fn apply_poll(&mut self, new_segments: impl IntoIterator<Item = Segment>) -> MergeOutcome {
        let added = self.merge(new_segments);
        let purged = self.purge();
        trace!(added, purged, len = self.segments.len(), "Buffer updated");
        MergeOutcome {
            added,
            purged,
            len: self.segments.len(),
        }
    }

    pub fn into_shared(self) -> SharedBuffer {
        Arc::new(Mutex::new(self))
    }

    pub fn clear(&mut self) {
        self.segments.clear();
        self.known_urls.clear();
    }
}
