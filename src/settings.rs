//! User settings stored as settings.json in the app data directory

use crate::constants::DEFAULT_SERVICE_URL;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Base URL of the community service
    pub service_url: String,

    /// Creator name used for "my worlds" queries
    pub creator_name: Option<String>,

    /// Library database file, relative to the data dir unless absolute
    pub library_file: String,

    /// Frame interval of the browse loop
    pub frame_ms: u64,

    /// Rows per cursor window
    pub page_rows: usize,

    /// Seconds the browse loop runs before exiting
    pub run_seconds: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            service_url: DEFAULT_SERVICE_URL.to_string(),
            creator_name: None,
            library_file: "library.db".to_string(),
            frame_ms: 33,
            page_rows: 12,
            run_seconds: 20,
        }
    }
}

impl Settings {
    pub fn load(data_dir: &Path) -> Self {
        let path = data_dir.join("settings.json");
        match std::fs::read_to_string(&path) {
            Ok(s) => match serde_json::from_str(&s) {
                Ok(settings) => {
                    debug!(path = %path.display(), "Settings loaded");
                    settings
                }
                Err(e) => {
                    warn!(error = %e, "Failed to parse settings, using defaults");
                    Self::default()
                }
            },
            Err(_) => {
                debug!("No settings file found, using defaults");
                Self::default()
            }
        }
    }

    pub fn save(&self, data_dir: &Path) {
        let path = data_dir.join("settings.json");
        match serde_json::to_string_pretty(self) {
            Ok(json) => {
                if let Err(e) = std::fs::write(&path, json) {
                    warn!(error = %e, "Failed to save settings");
                }
            }
            Err(e) => warn!(error = %e, "Failed to serialize settings"),
        }
    }

    pub fn library_path(&self, data_dir: &Path) -> PathBuf {
        let file = PathBuf::from(&self.library_file);
        if file.is_absolute() {
            file
        } else {
            data_dir.join(file)
        }
    }
}
