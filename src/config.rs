// Runtime configuration resolved from the environment
//
// Resolution order:
// 1) CLI flag (applied by the binary after from_env)
// 2) Environment variable
// 3) Built-in default

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub video_dir: PathBuf,
    pub qa_file_path: PathBuf,
    pub ledger_path: PathBuf,
    pub hub: HubConfig,
    /// Optional JSON catalog classifying video names by source dataset
    pub catalog_path: Option<PathBuf>,
    /// Substring a QA file name must contain to be scanned for video names
    pub qa_file_pattern: String,
    pub log_level: String,
    pub strict_video_layout: bool,
}

/// Remote dataset repository settings
#[derive(Debug, Clone)]
pub struct HubConfig {
    pub endpoint: String,
    pub repo: String,
    pub repo_type: String,
    pub revision: String,
    pub token: Option<String>,
    pub timeout: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://huggingface.co".to_string(),
            repo: "GuangsTrip/spatialpredictsource".to_string(),
            repo_type: "dataset".to_string(),
            revision: "main".to_string(),
            token: None,
            timeout: Duration::from_secs(300),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            video_dir: PathBuf::from("static/videos"),
            qa_file_path: PathBuf::from("data/qa_constructor.json"),
            ledger_path: PathBuf::from("video_download_status.csv"),
            hub: HubConfig::default(),
            catalog_path: None,
            qa_file_pattern: "qacandidate".to_string(),
            log_level: "info".to_string(),
            strict_video_layout: true,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var               | Default                           |
    /// |-----------------------|-----------------------------------|
    /// | `DATA_DIR`            | `data`                            |
    /// | `VIDEO_DIR`           | `static/videos`                   |
    /// | `QA_FILE_PATH`        | `data/qa_constructor.json`        |
    /// | `LEDGER_PATH`         | `video_download_status.csv`       |
    /// | `HF_ENDPOINT`         | `https://huggingface.co`          |
    /// | `HF_REPO`             | `GuangsTrip/spatialpredictsource` |
    /// | `HF_REPO_TYPE`        | `dataset`                         |
    /// | `HF_REVISION`         | `main`                            |
    /// | `HF_TOKEN`            | unset                             |
    /// | `DOWNLOAD_TIMEOUT`    | `300`                             |
    /// | `VIDEO_CATALOG`       | unset                             |
    /// | `QA_FILE_PATTERN`     | `qacandidate`                     |
    /// | `LOG_LEVEL`           | `info`                            |
    /// | `STRICT_VIDEO_LAYOUT` | `true`                            |
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let hub = HubConfig {
            endpoint: env_string("HF_ENDPOINT", &defaults.hub.endpoint),
            repo: env_string("HF_REPO", &defaults.hub.repo),
            repo_type: env_string("HF_REPO_TYPE", &defaults.hub.repo_type),
            revision: env_string("HF_REVISION", &defaults.hub.revision),
            token: env::var("HF_TOKEN").ok().filter(|t| !t.trim().is_empty()),
            timeout: Duration::from_secs(env_parse("DOWNLOAD_TIMEOUT", defaults.hub.timeout.as_secs())),
        };

        Self {
            data_dir: env_path("DATA_DIR", defaults.data_dir),
            video_dir: env_path("VIDEO_DIR", defaults.video_dir),
            qa_file_path: env_path("QA_FILE_PATH", defaults.qa_file_path),
            ledger_path: env_path("LEDGER_PATH", defaults.ledger_path),
            hub,
            catalog_path: env::var("VIDEO_CATALOG").ok().map(PathBuf::from),
            qa_file_pattern: env_string("QA_FILE_PATTERN", &defaults.qa_file_pattern),
            log_level: env_string("LOG_LEVEL", &defaults.log_level).to_lowercase(),
            strict_video_layout: env_bool("STRICT_VIDEO_LAYOUT", defaults.strict_video_layout),
        }
    }
}

fn env_string(key: &str, default: &str) -> String {
    env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_path(key: &str, default: PathBuf) -> PathBuf {
    env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or(default)
}

fn env_parse<T: FromStr + Copy + std::fmt::Display>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            log::warn!("{} is not a valid value ({}), using {}", key, raw, default);
            default
        }),
        Err(_) => default,
    }
}

fn env_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(raw) => match raw.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => {
                log::warn!("{} is not a boolean ({}), using {}", key, raw, default);
                default
            }
        },
        Err(_) => default,
    }
}
