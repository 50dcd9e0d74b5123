use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::error::{BuildError, BuildResult};
use crate::core::java::DEFAULT_ADOPTIUM_API;
use crate::core::resilience::RetryPolicy;

const APP_DIR_NAME: &str = "plugsmith";
const SETTINGS_FILE: &str = "settings.json";
pub const DATA_DIR_ENV: &str = "PLUGSMITH_DATA_DIR";

/// Machine-wide settings persisted as `<data_dir>/settings.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildSettings {
    /// Parallel fetches during resolution, parallel class remaps.
    pub concurrency: usize,
    pub retry: RetryPolicy,
    pub adoptium_api: String,
    /// Never touch the network; serve only what is cached.
    pub offline: bool,
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            concurrency: 8,
            retry: RetryPolicy::default(),
            adoptium_api: DEFAULT_ADOPTIUM_API.to_string(),
            offline: false,
        }
    }
}

impl BuildSettings {
    /// Missing or unreadable settings fall back to defaults.
    pub fn load(data_dir: &Path) -> Self {
        let path = data_dir.join(SETTINGS_FILE);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(_) => return Self::default(),
        };
        match serde_json::from_str(&raw) {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Ignoring corrupt settings file {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    pub fn save(&self, data_dir: &Path) -> BuildResult<()> {
        std::fs::create_dir_all(data_dir).map_err(|e| BuildError::Io {
            path: data_dir.to_path_buf(),
            source: e,
        })?;
        let path = data_dir.join(SETTINGS_FILE);
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json).map_err(|e| BuildError::Io { path, source: e })
    }
}

/// `--data-dir`, then `PLUGSMITH_DATA_DIR`, then the platform data directory.
pub fn resolve_data_dir(explicit: Option<&Path>) -> PathBuf {
    if let Some(dir) = explicit {
        return dir.to_path_buf();
    }
    if let Some(dir) = std::env::var_os(DATA_DIR_ENV).filter(|v| !v.is_empty()) {
        return PathBuf::from(dir);
    }
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}
