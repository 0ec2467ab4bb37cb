use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use relive_engine::{ClientConfig, DetectionConfig, EngineConfig, Timeline};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AppError, Result};

const CONFIG_DIR: &str = "relive";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TimelineSetting {
    #[default]
    WallClock,
    MediaSequence,
}

impl From<TimelineSetting> for Timeline {
    fn from(value: TimelineSetting) -> Self {
        match value {
            TimelineSetting::WallClock => Timeline::WallClock,
            TimelineSetting::MediaSequence => Timeline::MediaSequence,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    pub user_agent: Option<String>,
    pub proxy: Option<String>,
    pub use_system_proxy: bool,
    pub connect_timeout_ms: u64,
    pub manifest_timeout_ms: u64,
    pub headers: BTreeMap<String, String>,
}

impl Default for ClientSettings {
    fn default() -> Self {
        let defaults = ClientConfig::default();
        Self {
            user_agent: None,
            proxy: None,
            use_system_proxy: defaults.use_system_proxy,
            connect_timeout_ms: defaults.connect_timeout.as_millis() as u64,
            manifest_timeout_ms: defaults.manifest_timeout.as_millis() as u64,
            headers: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionSettings {
    pub host_patterns: Vec<String>,
    pub master_marker: String,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        let defaults = DetectionConfig::default();
        Self {
            host_patterns: defaults.host_patterns,
            master_marker: defaults.master_marker,
        }
    }
}

/// Settings read from `config.toml`; every field is optional in the file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub poll_interval_ms: u64,
    pub max_buffer_duration: f64,
    pub timeline: TimelineSetting,
    pub sync_tolerance: f64,
    pub playback_query_timeout_ms: u64,
    pub segment_fetch_timeout_ms: u64,
    pub fetch_concurrency: usize,
    pub product_name: String,
    pub output_dir: Option<PathBuf>,
    pub client: ClientSettings,
    pub detection: DetectionSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        let engine = EngineConfig::default();
        Self {
            poll_interval_ms: engine.poll_interval.as_millis() as u64,
            max_buffer_duration: engine.max_buffer_duration,
            timeline: TimelineSetting::default(),
            sync_tolerance: engine.sync_tolerance,
            playback_query_timeout_ms: engine.playback_query_timeout.as_millis() as u64,
            segment_fetch_timeout_ms: engine.segment_fetch_timeout.as_millis() as u64,
            fetch_concurrency: engine.fetch_concurrency,
            product_name: engine.product_name,
            output_dir: None,
            client: ClientSettings::default(),
            detection: DetectionSettings::default(),
        }
    }
}

impl AppConfig {
    /// `~/.config/relive/config.toml` or the platform equivalent.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    /// Loads the given file, or the default file when present, or defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                if !path.exists() {
                    return Err(AppError::ConfigMissing(path.to_path_buf()));
                }
                Self::from_file(path)
            }
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path),
                _ => {
                    debug!("No config file found, using defaults");
                    Ok(Self::default())
                }
            },
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&content).map_err(|source| AppError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "Loaded config file");
        Ok(config)
    }

    pub fn from_toml(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn to_engine_config(&self) -> Result<EngineConfig> {
        if self.max_buffer_duration <= 0.0 {
            return Err(AppError::InvalidConfig(
                "max_buffer_duration must be positive".to_owned(),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(AppError::InvalidConfig(
                "poll_interval_ms must be positive".to_owned(),
            ));
        }

        let mut client = ClientConfig {
            connect_timeout: Duration::from_millis(self.client.connect_timeout_ms),
            manifest_timeout: Duration::from_millis(self.client.manifest_timeout_ms),
            proxy: self.client.proxy.clone(),
            use_system_proxy: self.client.use_system_proxy,
            ..ClientConfig::default()
        };
        if let Some(user_agent) = &self.client.user_agent {
            client.user_agent = user_agent.clone();
        }
        for (name, value) in &self.client.headers {
            client = client.with_header(name, value)?;
        }

        Ok(EngineConfig {
            client,
            detection: DetectionConfig {
                host_patterns: self.detection.host_patterns.clone(),
                master_marker: self.detection.master_marker.clone(),
            },
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            max_buffer_duration: self.max_buffer_duration,
            timeline: self.timeline.into(),
            sync_tolerance: self.sync_tolerance,
            playback_query_timeout: Duration::from_millis(self.playback_query_timeout_ms),
            segment_fetch_timeout: Duration::from_millis(self.segment_fetch_timeout_ms),
            fetch_concurrency: self.fetch_concurrency,
            product_name: self.product_name.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_engine_defaults() {
        let config = AppConfig::from_toml("").unwrap();
        let engine = config.to_engine_config().unwrap();
        assert_eq!(engine.poll_interval, Duration::from_millis(4000));
        assert_eq!(engine.max_buffer_duration, 300.0);
        assert_eq!(engine.product_name, "kick");
        assert_eq!(engine.timeline, Timeline::WallClock);
    }

    #[test]
    fn overrides_are_applied() {
        let config = AppConfig::from_toml(
            r#"
poll_interval_ms = 2000
timeline = "media-sequence"
product_name = "relive"

[client]
proxy = "socks5://127.0.0.1:1080"
headers = { referer = "https://kick.com/" }

[detection]
host_patterns = ["example.org"]
"#,
        )
        .unwrap();
        let engine = config.to_engine_config().unwrap();

        assert_eq!(engine.poll_interval, Duration::from_millis(2000));
        assert_eq!(engine.timeline, Timeline::MediaSequence);
        assert_eq!(engine.product_name, "relive");
        assert_eq!(engine.client.proxy.as_deref(), Some("socks5://127.0.0.1:1080"));
        assert!(engine.client.headers.contains_key("referer"));
        assert_eq!(engine.detection.host_patterns, ["example.org"]);
        assert_eq!(engine.detection.master_marker, "master.m3u8");
    }

    #[test]
    fn zero_buffer_is_rejected() {
        let config = AppConfig::from_toml("max_buffer_duration = 0.0").unwrap();
        assert!(matches!(
            config.to_engine_config(),
            Err(AppError::InvalidConfig(_))
        ));
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(matches!(
            AppConfig::load(Some(&missing)),
            Err(AppError::ConfigMissing(_))
        ));
    }

    #[test]
    fn reads_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "fetch_concurrency = 2\n").unwrap();

        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.fetch_concurrency, 2);
    }

    #[test]
    fn malformed_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "fetch_concurrency = \"many\"\n").unwrap();

        let err = AppConfig::load(Some(&path)).unwrap_err();
        assert!(matches!(err, AppError::ConfigParse { .. }));
        assert!(err.to_string().contains("config.toml"));
    }
}
