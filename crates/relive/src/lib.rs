// Rolling HLS buffer and clip extraction engine
pub mod assembly;
pub mod buffer;
pub mod config;
pub mod detect;
pub mod error;
pub mod extract;
pub mod fetcher;
pub mod output;
pub mod playback;
pub mod playlist;
pub mod repackage;
pub mod segment;
pub mod session;
pub mod sync;

// Export common types for ease of use
pub use assembly::{ClipArtifact, ClipAssembler, clip_filename};
pub use buffer::{MergeOutcome, SegmentBuffer, SharedBuffer};
pub use config::{ClientConfig, DetectionConfig, EngineConfig, Timeline, create_client};
pub use detect::DetectionFilter;
pub use error::ClipError;
pub use extract::{ClipExtractionStrategy, ManualClipPlan, select_last_duration};
pub use fetcher::{HttpFetcher, ManifestSource, SegmentSource};
pub use output::{ArtifactSink, DirectorySink, SavedClip};
pub use playback::{PlaybackStateProvider, ReportedPlayback};
pub use playlist::{PlaylistParser, PlaylistPoller};
pub use repackage::{PassthroughRepackager, RepackageEvent, RepackageSession, Repackager};
pub use segment::{ClipRequest, PlaybackState, QUICK_CLIP_PRESETS, Segment};
pub use session::{EngineDeps, SessionEvent, SessionId, SessionManager, SessionSnapshot};
pub use sync::{SyncWindow, synchronize};
