use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::catalog::{DEFAULT_API_BASE, DEFAULT_IMAGE_BASE};
use crate::history::DEFAULT_HISTORY_LIMIT;
use crate::session::DEFAULT_CHECKPOINT_INTERVAL;

const MIN_CHECKPOINT_SECS: u64 = 1;
const MAX_CHECKPOINT_SECS: u64 = 300;
const MAX_HISTORY_LIMIT: usize = 1000;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid settings file: {0}")]
    Format(#[from] serde_json::Error),
}

fn default_api_base_url() -> String {
    String::from(DEFAULT_API_BASE)
}

fn default_image_base_url() -> String {
    String::from(DEFAULT_IMAGE_BASE)
}

fn default_checkpoint_interval_secs() -> u64 {
    DEFAULT_CHECKPOINT_INTERVAL.as_secs()
}

fn default_history_limit() -> usize {
    DEFAULT_HISTORY_LIMIT
}

fn default_autoplay() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppSettings {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_image_base_url")]
    pub image_base_url: String,
    /// Endpoint that relays manifests, called as `<proxy_base>?url=<encoded>`.
    #[serde(default)]
    pub proxy_base: Option<String>,
    #[serde(default = "default_checkpoint_interval_secs")]
    pub checkpoint_interval_secs: u64,
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    #[serde(default = "default_autoplay")]
    pub autoplay: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            image_base_url: default_image_base_url(),
            proxy_base: None,
            checkpoint_interval_secs: default_checkpoint_interval_secs(),
            history_limit: default_history_limit(),
            autoplay: default_autoplay(),
        }
    }
}

impl AppSettings {
    pub fn config_path() -> Option<PathBuf> {
        std::env::var("HOME").ok().map(|home| {
            PathBuf::from(home)
                .join(".config")
                .join("phimx")
                .join("config.json")
        })
    }

    pub fn load_from(path: &Path) -> Result<Option<Self>, SettingsError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(SettingsError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        let settings: Self = serde_json::from_str(&content)?;
        Ok(Some(settings.clamped()))
    }

    /// Loads the config file, falling back to defaults when it is missing or
    /// unreadable. A missing file is seeded with the defaults.
    pub fn load_or_default() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };
        match Self::load_from(&path) {
            Ok(Some(settings)) => {
                info!(path = %path.display(), "loaded settings");
                settings
            }
            Ok(None) => {
                let settings = Self::default();
                if let Err(e) = settings.save_to(&path) {
                    warn!(error = %e, "could not write default settings");
                }
                settings
            }
            Err(e) => {
                warn!(error = %e, "using default settings");
                Self::default()
            }
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<(), SettingsError> {
        let io_error = |source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_error)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(io_error)
    }

    pub fn clamped(mut self) -> Self {
        if self.api_base_url.trim().is_empty() {
            self.api_base_url = default_api_base_url();
        }
        if self.image_base_url.trim().is_empty() {
            self.image_base_url = default_image_base_url();
        }
        self.proxy_base = self.proxy_base.filter(|p| !p.trim().is_empty());
        self.checkpoint_interval_secs = self
            .checkpoint_interval_secs
            .clamp(MIN_CHECKPOINT_SECS, MAX_CHECKPOINT_SECS);
        self.history_limit = self.history_limit.clamp(1, MAX_HISTORY_LIMIT);
        self
    }

    pub fn checkpoint_interval(&self) -> Duration {
        Duration::from_secs(self.checkpoint_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"proxy_base": "https://proxy.example/hls"}"#).unwrap();

        let settings = AppSettings::load_from(&path).unwrap().unwrap();
        assert_eq!(settings.api_base_url, DEFAULT_API_BASE);
        assert_eq!(settings.proxy_base.as_deref(), Some("https://proxy.example/hls"));
        assert_eq!(settings.checkpoint_interval(), Duration::from_secs(5));
        assert_eq!(settings.history_limit, 50);
        assert!(settings.autoplay);
    }

    #[test]
    fn missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(AppSettings::load_from(&dir.path().join("absent.json"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn malformed_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "history_limit = 3").unwrap();
        assert!(matches!(
            AppSettings::load_from(&path),
            Err(SettingsError::Format(_))
        ));
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let settings = AppSettings {
            api_base_url: String::from(" "),
            proxy_base: Some(String::new()),
            checkpoint_interval_secs: 0,
            history_limit: 0,
            ..AppSettings::default()
        }
        .clamped();
        assert_eq!(settings.api_base_url, DEFAULT_API_BASE);
        assert_eq!(settings.proxy_base, None);
        assert_eq!(settings.checkpoint_interval_secs, 1);
        assert_eq!(settings.history_limit, 1);
    }

    #[test]
    fn save_then_load_keeps_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let settings = AppSettings {
            checkpoint_interval_secs: 10,
            autoplay: false,
            ..AppSettings::default()
        };
        settings.save_to(&path).unwrap();
        assert_eq!(AppSettings::load_from(&path).unwrap(), Some(settings));
    }
}
