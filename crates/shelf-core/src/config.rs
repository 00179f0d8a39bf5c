use config::{Config, ConfigError, Environment, File as ConfigFile};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// How an ignore pattern is matched against a filesystem node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IgnorePolicy {
    /// Substring of the node's own name.
    #[default]
    Name,
    /// Substring of the node's full path.
    Path,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub root_paths: Vec<String>,
    #[serde(default)]
    pub ignore_patterns: Vec<String>,
    #[serde(default)]
    pub ignore_policy: IgnorePolicy,
    #[serde(default = "default_rescan_interval")]
    pub rescan_interval_secs: u64,
    #[serde(default)]
    pub auto_tag_rules: Option<String>,
    #[serde(default = "default_db_path")]
    pub db_path: String,
    #[serde(default = "default_frame_count")]
    pub frame_count: usize,
    #[serde(default = "default_ffprobe")]
    pub ffprobe_path: String,
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg_path: String,
    #[serde(default = "default_quick_timeout")]
    pub quick_probe_timeout_secs: u64,
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

fn default_rescan_interval() -> u64 {
    3600
}

fn default_db_path() -> String {
    "shelf.db".to_string()
}

fn default_frame_count() -> usize {
    10
}

fn default_ffprobe() -> String {
    "ffprobe".to_string()
}

fn default_ffmpeg() -> String {
    "ffmpeg".to_string()
}

fn default_quick_timeout() -> u64 {
    10
}

fn default_listen_addr() -> String {
    "127.0.0.1:8750".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            root_paths: Vec::new(),
            ignore_patterns: Vec::new(),
            ignore_policy: IgnorePolicy::default(),
            rescan_interval_secs: default_rescan_interval(),
            auto_tag_rules: None,
            db_path: default_db_path(),
            frame_count: default_frame_count(),
            ffprobe_path: default_ffprobe(),
            ffmpeg_path: default_ffmpeg(),
            quick_probe_timeout_secs: default_quick_timeout(),
            listen_addr: default_listen_addr(),
        }
    }
}

impl AppConfig {
    pub fn rescan_interval(&self) -> Duration {
        Duration::from_secs(self.rescan_interval_secs)
    }

    pub fn quick_probe_timeout(&self) -> Duration {
        Duration::from_secs(self.quick_probe_timeout_secs)
    }
}

/// Reads `Config.{toml,yaml,json}` (optional) and `SHELF_*` environment
/// variables. List values in the environment are comma separated.
pub fn load_configuration() -> Result<AppConfig, ConfigError> {
    let builder = Config::builder()
        .add_source(ConfigFile::with_name("Config").required(false))
        .add_source(
            Environment::with_prefix("SHELF")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("root_paths")
                .with_list_parse_key("ignore_patterns"),
        )
        .build()?;
    builder.try_deserialize::<AppConfig>()
}

/// Remove directories that are subdirectories of other directories in the list.
pub fn non_overlapping_directories(dirs: Vec<String>) -> Vec<String> {
    let mut result: Vec<String> = Vec::new();

    for dir in dirs {
        let dir_path = Path::new(&dir);
        if result.iter().any(|kept| dir_path.starts_with(kept)) {
            continue;
        }
        result.retain(|kept| !Path::new(kept).starts_with(dir_path));
        result.push(dir);
    }

    result
}
