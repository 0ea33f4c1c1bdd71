use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Deserializer};
use thiserror::Error;

use crate::challenge::{Backoff, ChallengePolicy};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DispatchSettings {
    #[serde(deserialize_with = "millis")]
    pub timeout: Duration,
    /// Health checks run in bulk against slow proxies and get more time.
    #[serde(deserialize_with = "millis")]
    pub health_check_timeout: Duration,
    #[serde(deserialize_with = "millis")]
    pub connect_timeout: Duration,
    pub max_retries: u32,
    /// Bound on pool draws when looking for a proxy not yet used by a call.
    pub max_proxy_draws: u32,
    /// Prefix the percent-encoded target URL is appended to.
    pub translate_endpoint: String,
    pub user_agent: Option<String>,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            health_check_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
            max_retries: 3,
            max_proxy_draws: 10,
            translate_endpoint: "http://translate.google.com/translate?sl=ja&tl=en&u=".to_string(),
            user_agent: Some(
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
                    .to_string(),
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ResolveSettings {
    /// META provider whose id space the seed id belongs to.
    pub seed_provider: String,
    pub min_similarity: f64,
    pub meta_concurrency: usize,
    pub batch_size: usize,
    #[serde(deserialize_with = "millis")]
    pub cache_ttl: Duration,
    pub max_content_pages: u32,
    pub date_tolerance_days: i64,
    pub resolution_attempts: u32,
    pub listing_attempts: u32,
    #[serde(deserialize_with = "millis")]
    pub listing_backoff: Duration,
}

impl Default for ResolveSettings {
    fn default() -> Self {
        Self {
            seed_provider: "anilist".to_string(),
            min_similarity: 0.5,
            meta_concurrency: 5,
            batch_size: 5,
            cache_ttl: Duration::from_secs(60 * 60 * 6),
            max_content_pages: 200,
            date_tolerance_days: 7,
            resolution_attempts: 10,
            listing_attempts: 3,
            listing_backoff: Duration::from_secs(1),
        }
    }
}

impl ResolveSettings {
    /// Challenge handling for by-id resolution and searches.
    pub fn resolution_policy(&self) -> ChallengePolicy {
        ChallengePolicy::new(self.resolution_attempts, Backoff::None)
    }

    /// Challenge handling for listing pages: linear backoff per attempt.
    pub fn listing_policy(&self) -> ChallengePolicy {
        ChallengePolicy::new(self.listing_attempts, Backoff::Linear(self.listing_backoff))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct QueueSettings {
    #[serde(deserialize_with = "millis")]
    pub poll_interval: Duration,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1000),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub dispatch: DispatchSettings,
    pub resolve: ResolveSettings,
    pub queue: QueueSettings,
    pub proxy_dir: PathBuf,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            dispatch: DispatchSettings::default(),
            resolve: ResolveSettings::default(),
            queue: QueueSettings::default(),
            proxy_dir: PathBuf::from("./proxies"),
        }
    }
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("could not read settings from {path}: {source}")]
    Io { path: String, source: io::Error },
    #[error("invalid settings in {path}: {message}")]
    Parse { path: String, message: String },
}

/// Load settings from a RON file. A missing file yields the defaults.
pub fn load_settings(path: &Path) -> Result<EngineSettings, SettingsError> {
    let content = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            mosaic_logging::mosaic_info!("No settings at {:?}, using defaults", path);
            return Ok(EngineSettings::default());
        }
        Err(source) => {
            return Err(SettingsError::Io {
                path: path.display().to_string(),
                source,
            })
        }
    };
    parse_settings(&content).map_err(|message| SettingsError::Parse {
        path: path.display().to_string(),
        message,
    })
}

pub fn parse_settings(content: &str) -> Result<EngineSettings, String> {
    ron::from_str(content).map_err(|err| err.to_string())
}

/// Durations are written as whole milliseconds in settings files.
fn millis<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    u64::deserialize(deserializer).map(Duration::from_millis)
}
