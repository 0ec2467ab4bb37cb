use std::time::Duration;

use reqwest::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use crate::error::ClipError;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/142.0.0.0 Safari/537.36";

/// How segments get a `start_time` when the manifest carries no
/// program-date-time tags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Timeline {
    /// Every segment is stamped with the wall clock at parse time.
    #[default]
    WallClock,
    /// `media sequence * target duration`, stable across polls.
    MediaSequence,
}

/// HTTP client options shared by manifest and segment fetches.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// User agent string
    pub user_agent: String,

    /// Extra headers sent with every request, on top of the defaults
    pub headers: HeaderMap,

    /// Connection timeout (time to establish initial connection)
    pub connect_timeout: Duration,

    /// Overall timeout for a single manifest request
    pub manifest_timeout: Duration,

    /// Optional proxy URL, `http://`, `https://` or `socks5://`
    pub proxy: Option<String>,

    /// Whether to use system proxy settings if available
    pub use_system_proxy: bool,

    pub pool_max_idle_per_host: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            headers: HeaderMap::new(),
            connect_timeout: Duration::from_secs(10),
            manifest_timeout: Duration::from_secs(10),
            proxy: None,
            use_system_proxy: true,
            pool_max_idle_per_host: 10,
        }
    }
}

impl ClientConfig {
    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self, ClipError> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| ClipError::invalid_request(format!("bad header name `{name}`: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| ClipError::invalid_request(format!("bad header value: {e}")))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    pub fn default_headers() -> HeaderMap {
        let mut default_headers = HeaderMap::new();

        default_headers.insert(
            reqwest::header::ACCEPT,
            HeaderValue::from_static("*/*"),
        );
        default_headers.insert(
            reqwest::header::CONNECTION,
            HeaderValue::from_static("keep-alive"),
        );
        default_headers.insert(
            reqwest::header::ACCEPT_LANGUAGE,
            HeaderValue::from_static("en-US,en;q=0.5"),
        );
        default_headers
    }
}

/// Build the shared HTTP client. Custom headers take precedence over the defaults.
pub fn create_client(config: &ClientConfig) -> Result<Client, ClipError> {
    let mut headers = ClientConfig::default_headers();
    for (name, value) in config.headers.iter() {
        headers.insert(name.clone(), value.clone());
    }

    let mut builder = Client::builder()
        .user_agent(config.user_agent.as_str())
        .default_headers(headers)
        .connect_timeout(config.connect_timeout)
        .pool_max_idle_per_host(config.pool_max_idle_per_host);

    if let Some(proxy_url) = &config.proxy {
        let proxy = reqwest::Proxy::all(proxy_url)
            .map_err(|e| ClipError::invalid_url(proxy_url.clone(), e))?;
        builder = builder.proxy(proxy);
    } else if !config.use_system_proxy {
        builder = builder.no_proxy();
    }

    Ok(builder.build()?)
}

/// Which manifest requests the detection filter lets through.
#[derive(Debug, Clone)]
pub struct DetectionConfig {
    /// Host suffixes, e.g. `kick.com` matches `stream.kick.com`
    pub host_patterns: Vec<String>,
    /// URLs containing this marker are master playlists and are ignored
    pub master_marker: String,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            host_patterns: vec!["kick.com".to_owned(), "live-video.net".to_owned()],
            master_marker: "master.m3u8".to_owned(),
        }
    }
}

// --- Top-Level Configuration ---
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub client: ClientConfig,
    pub detection: DetectionConfig,

    /// Delay between two manifest polls of the same session
    pub poll_interval: Duration,
    /// Seconds of media kept behind the newest segment's end
    pub max_buffer_duration: f64,
    pub timeline: Timeline,

    /// Seconds added on both sides of a synchronized window
    pub sync_tolerance: f64,
    /// Upper bound on waiting for the player to report its state
    pub playback_query_timeout: Duration,

    /// Per-segment timeout while assembling a clip
    pub segment_fetch_timeout: Duration,
    /// Max concurrent segment downloads for one clip
    pub fetch_concurrency: usize,

    /// Prefix of generated clip filenames
    pub product_name: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            client: ClientConfig::default(),
            detection: DetectionConfig::default(),
            poll_interval: Duration::from_millis(4000),
            max_buffer_duration: 300.0,
            timeline: Timeline::default(),
            sync_tolerance: 2.0,
            playback_query_timeout: Duration::from_secs(3),
            segment_fetch_timeout: Duration::from_secs(15),
            fetch_concurrency: 6,
            product_name: "kick".to_owned(),
        }
    }
}
