use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::coordinator::RetryPolicy;

pub const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:8000/api/";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    /// Length of the test window from the moment "Start Now" is confirmed
    pub test_duration_secs: u64,
    /// Event-loop tick; the display is recomputed from the clock on each one
    pub tick_rate_ms: u64,
    /// Extra attempts for auto-submissions that hit a network error
    pub submit_retries: u32,
    pub retry_backoff_ms: u64,
    pub request_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            test_duration_secs: 30 * 60,
            tick_rate_ms: 250,
            submit_retries: 0,
            retry_backoff_ms: 1000,
            request_timeout_secs: 10,
        }
    }
}

impl Config {
    pub fn duration_ms(&self) -> i64 {
        i64::try_from(self.test_duration_secs)
            .unwrap_or(i64::MAX)
            .saturating_mul(1000)
    }

    pub fn tick_rate(&self) -> Duration {
        Duration::from_millis(self.tick_rate_ms.max(10))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            retries: self.submit_retries,
            backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }
}

pub trait ConfigStore {
    fn load(&self) -> Config;
    fn save(&self, cfg: &Config) -> std::io::Result<()>;
}

#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        let path = if let Some(pd) = ProjectDirs::from("", "", "skilltest") {
            pd.config_dir().join("config.json")
        } else {
            PathBuf::from("skilltest_config.json")
        };
        Self { path }
    }

    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self {
            path: p.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for FileConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore for FileConfigStore {
    fn load(&self) -> Config {
        if let Ok(bytes) = fs::read(&self.path) {
            match serde_json::from_slice::<Config>(&bytes) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    tracing::warn!(path = %self.path.display(), error = %e, "ignoring unreadable config")
                }
            }
        }
        Config::default()
    }

    fn save(&self, cfg: &Config) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(cfg).map_err(std::io::Error::other)?;
        fs::write(&self.path, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn roundtrip_default_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        let store = FileConfigStore::with_path(&path);
        let cfg = Config::default();
        store.save(&cfg).unwrap();
        let loaded = store.load();
        assert_eq!(cfg, loaded);
    }

    #[test]
    fn missing_or_corrupt_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        let store = FileConfigStore::with_path(&path);
        assert_eq!(store.load(), Config::default());

        fs::write(&path, b"{ nope").unwrap();
        assert_eq!(store.load(), Config::default());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, br#"{"test_duration_secs": 600, "submit_retries": 2}"#).unwrap();

        let cfg = FileConfigStore::with_path(&path).load();
        assert_eq!(cfg.test_duration_secs, 600);
        assert_eq!(cfg.submit_retries, 2);
        assert_eq!(cfg.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(cfg.duration_ms(), 600_000);
    }

    #[test]
    fn default_window_is_thirty_minutes() {
        let cfg = Config::default();
        assert_eq!(cfg.duration_ms(), 1_800_000);
        assert_eq!(cfg.retry_policy().retries, 0);
        assert_eq!(cfg.tick_rate(), Duration::from_millis(250));
    }

    #[test]
    fn oversized_duration_does_not_wrap() {
        let cfg = Config {
            test_duration_secs: u64::MAX,
            ..Config::default()
        };
        assert_eq!(cfg.duration_ms(), i64::MAX);
    }
}
