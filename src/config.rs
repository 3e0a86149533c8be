use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::task::Location;

/// Overrides `api_url` when set.
pub const API_URL_ENV: &str = "TASKMASTER_API_URL";

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("~/.local/share"))
        .join("taskmaster")
}

fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("~/.config"))
        .join("taskmaster")
        .join("config.json")
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    #[default]
    Local,
    Remote,
}

/// What to do when no GPS fix can be had at all.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum LocationPolicy {
    /// Abort task creation with a GPS error.
    #[default]
    Fail,
    /// Substitute a fixed coordinate pair.
    FixedFallback(Location),
}

impl LocationPolicy {
    pub fn default_fallback() -> Self {
        Self::FixedFallback(Location::new(-33.4569, -70.6483))
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub backend: BackendKind,
    pub api_url: Option<String>,
    pub data_directory: PathBuf,
    pub request_timeout_secs: u64,
    pub gps_timeout_ms: u64,
    pub location_policy: LocationPolicy,
    pub require_photo: bool,
    pub require_location: bool,
    pub debug_logging: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Local,
            api_url: None,
            data_directory: default_data_dir(),
            request_timeout_secs: 15,
            gps_timeout_ms: 5000,
            location_policy: LocationPolicy::Fail,
            require_photo: false,
            require_location: false,
            debug_logging: false,
        }
    }
}

impl AppConfig {
    pub fn config_path() -> PathBuf {
        default_config_path()
    }

    /// Load from the default location, then apply environment overrides.
    ///
    /// Problems found on the way come back as messages, since this runs
    /// before any logger is installed.
    pub fn load() -> (Self, Vec<String>) {
        let (config, mut warnings) = Self::read(&Self::config_path());
        let config = config.with_api_url_override(std::env::var(API_URL_ENV).ok());
        warnings.extend(config.missing_api_url());
        (config, warnings)
    }

    /// A missing or unreadable file yields the defaults.
    pub fn load_from(path: &Path) -> Self {
        Self::read(path).0
    }

    fn read(path: &Path) -> (Self, Vec<String>) {
        let Ok(content) = std::fs::read_to_string(path) else {
            return (Self::default(), Vec::new());
        };
        match serde_json::from_str(&content) {
            Ok(config) => (config, Vec::new()),
            Err(e) => (
                Self::default(),
                vec![format!("Ignoring invalid config {}: {}", path.display(), e)],
            ),
        }
    }

    /// Set when the remote backend is selected without an API URL.
    pub fn missing_api_url(&self) -> Option<String> {
        (self.backend == BackendKind::Remote && self.api_url.is_none()).then(|| {
            format!("Remote backend selected but no API URL set (config or {})", API_URL_ENV)
        })
    }

    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
    }

    pub fn with_api_url_override(mut self, api_url: Option<String>) -> Self {
        if let Some(url) = api_url.filter(|u| !u.trim().is_empty()) {
            self.api_url = Some(url);
        }
        self
    }

    pub fn storage_dir(&self) -> PathBuf {
        self.data_directory.join("storage")
    }

    pub fn images_dir(&self) -> PathBuf {
        self.data_directory.join("images")
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn gps_timeout(&self) -> Duration {
        Duration::from_millis(self.gps_timeout_ms)
    }

    /// Ensure the data directories exist.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(self.storage_dir())?;
        std::fs::create_dir_all(self.images_dir())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = AppConfig::load_from(&dir.path().join("nope.json"));
        assert_eq!(cfg, AppConfig::default());
        assert_eq!(cfg.request_timeout(), Duration::from_secs(15));
        assert_eq!(cfg.gps_timeout(), Duration::from_millis(5000));
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"backend": "remote", "api_url": "http://api", "location_policy": {"mode": "fixed_fallback", "latitude": 1.0, "longitude": 2.0}}"#,
        )
        .unwrap();

        let cfg = AppConfig::load_from(&path);
        assert_eq!(cfg.backend, BackendKind::Remote);
        assert_eq!(cfg.api_url.as_deref(), Some("http://api"));
        assert_eq!(cfg.location_policy, LocationPolicy::FixedFallback(Location::new(1.0, 2.0)));
        assert_eq!(cfg.request_timeout_secs, 15);
    }

    #[test]
    fn invalid_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{{{").unwrap();
        assert_eq!(AppConfig::load_from(&path), AppConfig::default());

        let (cfg, warnings) = AppConfig::read(&path);
        assert_eq!(cfg, AppConfig::default());
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].starts_with("Ignoring invalid config"));
    }

    #[test]
    fn remote_without_url_is_reported() {
        let cfg = AppConfig {
            backend: BackendKind::Remote,
            ..AppConfig::default()
        };
        assert!(cfg.missing_api_url().is_some_and(|w| w.contains(API_URL_ENV)));
        let cfg = cfg.with_api_url_override(Some("http://env".into()));
        assert_eq!(cfg.missing_api_url(), None);
        assert_eq!(AppConfig::default().missing_api_url(), None);
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let cfg = AppConfig {
            data_directory: dir.path().to_path_buf(),
            location_policy: LocationPolicy::default_fallback(),
            require_photo: true,
            ..AppConfig::default()
        };
        cfg.save_to(&path).unwrap();
        assert_eq!(AppConfig::load_from(&path), cfg);
    }

    #[test]
    fn env_override_replaces_api_url() {
        let cfg = AppConfig::default().with_api_url_override(Some("http://env".into()));
        assert_eq!(cfg.api_url.as_deref(), Some("http://env"));
        let cfg = cfg.with_api_url_override(Some("  ".into()));
        assert_eq!(cfg.api_url.as_deref(), Some("http://env"));
    }
}
