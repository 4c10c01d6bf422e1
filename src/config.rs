//! Application-level configuration loading: remote backend endpoint, local
//! cache location, and the background sync cadence.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "OCHE_BACK_CONFIG_PATH";
/// Default directory for the device-local match snapshot cache.
const DEFAULT_CACHE_DIR: &str = "cache/matches";
/// Default cadence for the background remote push.
const DEFAULT_SYNC_INTERVAL_SECS: u64 = 15;

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Base URL of the tournament backend, `None` to run cache-only.
    pub remote_base_url: Option<String>,
    /// Bearer token for the tournament backend, if it requires one.
    pub remote_token: Option<String>,
    /// Directory holding the per-match JSON snapshots.
    pub cache_dir: PathBuf,
    /// Interval between periodic remote pushes of the live match.
    pub sync_interval: Duration,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in
    /// defaults when the file is absent or unreadable.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        remote = config.remote_base_url.as_deref().unwrap_or("<none>"),
                        cache_dir = %config.cache_dir.display(),
                        "loaded configuration"
                    );
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            remote_base_url: None,
            remote_token: None,
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            sync_interval: Duration::from_secs(DEFAULT_SYNC_INTERVAL_SECS),
        }
    }
}

#[derive(Debug, Deserialize)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    remote_base_url: Option<String>,
    remote_token: Option<String>,
    cache_dir: Option<PathBuf>,
    sync_interval_secs: Option<u64>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let defaults = AppConfig::default();
        Self {
            remote_base_url: value.remote_base_url,
            remote_token: value.remote_token,
            cache_dir: value.cache_dir.unwrap_or(defaults.cache_dir),
            sync_interval: value
                .sync_interval_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.sync_interval),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
