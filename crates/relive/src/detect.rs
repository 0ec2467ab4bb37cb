// Decides which observed requests are media playlists worth tracking.

use url::Url;

use crate::config::DetectionConfig;

#[derive(Debug, Clone)]
pub struct DetectionFilter {
    host_patterns: Vec<String>,
    master_marker: String,
}

impl Default for DetectionFilter {
    fn default() -> Self {
        Self::new(&DetectionConfig::default())
    }
}

impl DetectionFilter {
    pub fn new(config: &DetectionConfig) -> Self {
        Self {
            host_patterns: config
                .host_patterns
                .iter()
                .map(|pattern| pattern.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            master_marker: config.master_marker.clone(),
        }
    }

    /// A media playlist on a configured host, excluding master playlists.
    pub fn accepts(&self, url: &Url) -> bool {
        self.matches_host(url)
            && url.path().ends_with(".m3u8")
            && !url.as_str().contains(&self.master_marker)
    }

    pub fn accepts_str(&self, url: &str) -> bool {
        Url::parse(url).is_ok_and(|url| self.accepts(&url))
    }

    fn matches_host(&self, url: &Url) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        let host = host.to_ascii_lowercase();
        self.host_patterns.iter().any(|pattern| {
            host == *pattern
                || host
                    .strip_suffix(pattern.as_str())
                    .is_some_and(|prefix| prefix.ends_with('.'))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_media_playlists_on_known_hosts() {
        let filter = DetectionFilter::default();
        assert!(filter.accepts_str(
            "https://fa723fc1b171.us-west-2.playback.live-video.net/api/video/v1/chunklist.m3u8"
        ));
        assert!(filter.accepts_str("https://stream.kick.com/live/1080p/index.m3u8?token=abc"));
        assert!(filter.accepts_str("https://kick.com/hls/index.m3u8"));
    }

    #[test]
    fn rejects_master_playlists() {
        let filter = DetectionFilter::default();
        assert!(!filter.accepts_str("https://stream.kick.com/live/master.m3u8"));
    }

    #[test]
    fn rejects_other_hosts_and_paths() {
        let filter = DetectionFilter::default();
        assert!(!filter.accepts_str("https://example.com/live/index.m3u8"));
        assert!(!filter.accepts_str("https://notkick.com/live/index.m3u8"));
        assert!(!filter.accepts_str("https://stream.kick.com/live/seg1.ts"));
        assert!(!filter.accepts_str("not a url"));
    }

    #[test]
    fn custom_patterns_replace_defaults() {
        let filter = DetectionFilter::new(&DetectionConfig {
            host_patterns: vec![".Example.org".to_owned()],
            master_marker: "variants".to_owned(),
        });
        assert!(filter.accepts_str("https://cdn.example.org/a/index.m3u8"));
        assert!(!filter.accepts_str("https://cdn.example.org/variants/index.m3u8"));
        assert!(!filter.accepts_str("https://stream.kick.com/live/index.m3u8"));
    }
}
