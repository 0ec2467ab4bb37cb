// Background manifest refresh, one task per session.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use url::Url;

use super::parser::{PlaylistParser, is_master_playlist};
use crate::buffer::{MergeOutcome, SharedBuffer};
use crate::error::ClipError;
use crate::fetcher::ManifestSource;
use crate::session::SessionId;

struct PollerHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl PollerHandle {
    fn cancel(self) {
        self.token.cancel();
        self.task.abort();
    }
}

/// Keeps each tracked session's buffer fed from its manifest.
pub struct PlaylistPoller {
    manifests: Arc<dyn ManifestSource>,
    parser: PlaylistParser,
    interval: Duration,
    active: DashMap<SessionId, PollerHandle>,
}

impl PlaylistPoller {
    pub fn new(manifests: Arc<dyn ManifestSource>, parser: PlaylistParser, interval: Duration) -> Self {
        Self {
            manifests,
            parser,
            interval,
            active: DashMap::new(),
        }
    }

    /// Starts polling `manifest_url` into `buffer`, replacing any poller the
    /// session already had. The first cycle runs immediately.
    pub fn start(&self, session: SessionId, manifest_url: Url, buffer: SharedBuffer) {
        let token = CancellationToken::new();
        let task = tokio::spawn(run_poll_loop(
            session,
            manifest_url.clone(),
            buffer,
            Arc::clone(&self.manifests),
            self.parser,
            self.interval,
            token.clone(),
        ));

        info!(%session, url = %manifest_url, interval = ?self.interval, "Polling started");
        // The displaced handle is cancelled, never just dropped.
        if let Some(previous) = self.active.insert(session, PollerHandle { token, task }) {
            previous.cancel();
            debug!(%session, "Replaced previous poller");
        }
    }

    /// Cancels the session's poller. Does nothing when none is running.
    pub fn stop(&self, session: SessionId) -> bool {
        match self.active.remove(&session) {
            Some((_, handle)) => {
                handle.cancel();
                info!(%session, "Polling stopped");
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self, session: SessionId) -> bool {
        self.active
            .get(&session)
            .is_some_and(|handle| !handle.task.is_finished())
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Stops every poller.
    pub fn stop_all(&self) {
        let sessions: Vec<SessionId> = self.active.iter().map(|entry| *entry.key()).collect();
        for session in sessions {
            self.stop(session);
        }
    }
}

impl Drop for PlaylistPoller {
    fn drop(&mut self) {
        for entry in self.active.iter() {
            entry.token.cancel();
            entry.task.abort();
        }
    }
}

async fn run_poll_loop(
    session: SessionId,
    manifest_url: Url,
    buffer: SharedBuffer,
    manifests: Arc<dyn ManifestSource>,
    parser: PlaylistParser,
    interval: Duration,
    token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!(%session, "Poll loop cancelled");
                return;
            }
            _ = ticker.tick() => {}
        }

        let cycle = tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!(%session, "Poll loop cancelled during fetch");
                return;
            }
            result = poll_once(manifests.as_ref(), &parser, &manifest_url, &buffer) => result,
        };

        match cycle {
            Ok(Some(outcome)) => trace!(
                %session,
                added = outcome.added,
                purged = outcome.purged,
                len = outcome.len,
                "Poll cycle merged"
            ),
            Ok(None) => trace!(%session, "Poll cycle had nothing to merge"),
            Err(e) if e.is_retryable() => {
                warn!(%session, url = %manifest_url, error = %e, "Manifest poll failed")
            }
            Err(e) => debug!(%session, url = %manifest_url, error = %e, "Manifest poll failed"),
        }
    }
}

/// One fetch, parse and merge cycle. `Ok(None)` when the manifest listed no
/// segments or was a master playlist.
pub async fn poll_once(
    manifests: &dyn ManifestSource,
    parser: &PlaylistParser,
    manifest_url: &Url,
    buffer: &SharedBuffer,
) -> Result<Option<MergeOutcome>, ClipError> {
    let text = manifests.fetch_manifest(manifest_url).await?;

    if is_master_playlist(&text) {
        debug!(url = %manifest_url, "Skipping master playlist body");
        return Ok(None);
    }

    let segments = parser.parse(&text, manifest_url);
    if segments.is_empty() {
        return Ok(None);
    }

    let mut guard = buffer.lock().await;
    Ok(Some(guard.apply_poll(segments)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::SegmentBuffer;
    use crate::fetcher::HttpFetcher;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const MEDIA: &str = "#EXTM3U\n\
#EXT-X-TARGETDURATION:2\n\
#EXT-X-PROGRAM-DATE-TIME:2024-05-01T12:00:00Z\n\
#EXTINF:2.0,\nseg1.ts\n#EXTINF:2.0,\nseg2.ts\n";

    const MASTER: &str = "#EXTM3U\n\
#EXT-X-STREAM-INF:BANDWIDTH=1280000,RESOLUTION=1280x720\n\
720p/index.m3u8\n";

    /// Answers every poll with the same body, or fails when `body` is None.
    struct CountingManifest {
        body: Option<&'static str>,
        calls: AtomicUsize,
    }

    impl CountingManifest {
        fn new(body: Option<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                body,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ManifestSource for CountingManifest {
        async fn fetch_manifest(&self, url: &Url) -> Result<String, ClipError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.body {
                Some(body) => Ok(body.to_owned()),
                None => Err(ClipError::http_status(
                    reqwest::StatusCode::NOT_FOUND,
                    url.as_str(),
                    "manifest fetch",
                )),
            }
        }
    }

    fn manifest_url() -> Url {
        Url::parse("https://cdn.live-video.net/live/index.m3u8").unwrap()
    }

    #[tokio::test]
    async fn poll_once_merges_segments() {
        let source = CountingManifest::new(Some(MEDIA));
        let buffer = SegmentBuffer::default().into_shared();

        let outcome = poll_once(source.as_ref(), &PlaylistParser::default(), &manifest_url(), &buffer)
            .await
            .unwrap()
            .expect("merged");

        assert_eq!(outcome.added, 2);
        let buffer = buffer.lock().await;
        assert_eq!(buffer.segments()[0].url, "https://cdn.live-video.net/live/seg1.ts");
    }

    #[tokio::test]
    async fn poll_once_skips_master_playlist() {
        let source = CountingManifest::new(Some(MASTER));
        let buffer = SegmentBuffer::default().into_shared();

        let outcome = poll_once(source.as_ref(), &PlaylistParser::default(), &manifest_url(), &buffer)
            .await
            .unwrap();

        assert!(outcome.is_none());
        assert!(buffer.lock().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn polls_immediately_then_on_interval() {
        let source = CountingManifest::new(Some(MEDIA));
        let poller = PlaylistPoller::new(
            source.clone(),
            PlaylistParser::default(),
            Duration::from_millis(4000),
        );
        let buffer = SegmentBuffer::default().into_shared();

        poller.start(SessionId(1), manifest_url(), Arc::clone(&buffer));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(source.calls(), 1);
        assert_eq!(buffer.lock().await.len(), 2);

        tokio::time::sleep(Duration::from_millis(4000)).await;
        assert_eq!(source.calls(), 2);
        // Re-polling the same manifest adds nothing.
        assert_eq!(buffer.lock().await.len(), 2);
        assert!(poller.is_active(SessionId(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_polls_keep_the_loop_running() {
        let source = CountingManifest::new(None);
        let poller = PlaylistPoller::new(
            source.clone(),
            PlaylistParser::default(),
            Duration::from_millis(1000),
        );
        let buffer = SegmentBuffer::default().into_shared();

        poller.start(SessionId(1), manifest_url(), Arc::clone(&buffer));
        tokio::time::sleep(Duration::from_millis(3500)).await;

        assert!(source.calls() >= 3);
        assert!(poller.is_active(SessionId(1)));
        assert!(buffer.lock().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_idempotent_and_halts_polling() {
        let source = CountingManifest::new(Some(MEDIA));
        let poller = PlaylistPoller::new(
            source.clone(),
            PlaylistParser::default(),
            Duration::from_millis(1000),
        );

        assert!(!poller.stop(SessionId(9)));

        poller.start(SessionId(9), manifest_url(), SegmentBuffer::default().into_shared());
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(poller.stop(SessionId(9)));
        assert!(!poller.stop(SessionId(9)));

        let calls = source.calls();
        tokio::time::sleep(Duration::from_millis(5000)).await;
        assert_eq!(source.calls(), calls);
        assert!(!poller.is_active(SessionId(9)));
        assert_eq!(poller.active_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_replaces_previous_poller() {
        let source = CountingManifest::new(Some(MEDIA));
        let poller = PlaylistPoller::new(
            source.clone(),
            PlaylistParser::default(),
            Duration::from_millis(1000),
        );

        poller.start(SessionId(2), manifest_url(), SegmentBuffer::default().into_shared());
        poller.start(SessionId(2), manifest_url(), SegmentBuffer::default().into_shared());
        assert_eq!(poller.active_count(), 1);

        poller.stop_all();
        assert_eq!(poller.active_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_starts_leave_one_poller() {
        let source = CountingManifest::new(Some(MEDIA));
        let poller = Arc::new(PlaylistPoller::new(
            source.clone(),
            PlaylistParser::default(),
            Duration::from_millis(20),
        ));
        let barrier = Arc::new(std::sync::Barrier::new(2));
        let runtime = tokio::runtime::Handle::current();

        let workers: Vec<_> = (0..2)
            .map(|_| {
                let poller = Arc::clone(&poller);
                let barrier = Arc::clone(&barrier);
                let runtime = runtime.clone();
                std::thread::spawn(move || {
                    let _guard = runtime.enter();
                    barrier.wait();
                    for _ in 0..300 {
                        poller.start(
                            SessionId(1),
                            manifest_url(),
                            SegmentBuffer::default().into_shared(),
                        );
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        assert_eq!(poller.active_count(), 1);
        assert!(poller.stop(SessionId(1)));
        assert!(!poller.is_active(SessionId(1)));

        tokio::time::sleep(Duration::from_millis(100)).await;
        let settled = source.calls();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(source.calls(), settled, "a poller kept fetching after stop");
    }

    #[tokio::test]
    async fn polls_a_real_http_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/live/index.m3u8"))
            .respond_with(ResponseTemplate::new(200).set_body_string(MEDIA))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(
            reqwest::Client::new(),
            Duration::from_secs(5),
            Duration::from_secs(5),
        );
        let url = Url::parse(&format!("{}/live/index.m3u8", server.uri())).unwrap();
        let buffer = SegmentBuffer::default().into_shared();

        let outcome = poll_once(&fetcher, &PlaylistParser::default(), &url, &buffer)
            .await
            .unwrap()
            .expect("merged");

        assert_eq!(outcome.len, 2);
        let buffer = buffer.lock().await;
        assert!(buffer.segments()[1].url.ends_with("/live/seg2.ts"));
    }
}
