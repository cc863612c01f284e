use std::path::PathBuf;
use directories::ProjectDirs;
use crate::common::error::{Result, VisiRideError};

#[derive(Debug, Clone)]
pub struct DevMode {
    enabled: bool,
    base_dir: PathBuf,
}

impl DevMode {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            base_dir: PathBuf::from("./dev_data"),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Root directory for store documents and scratch files.
    ///
    /// An explicit override wins; otherwise dev mode keeps everything under
    /// `./dev_data` and production uses the platform data directory.
    pub fn data_root(&self, override_dir: Option<&PathBuf>) -> Result<PathBuf> {
        if let Some(dir) = override_dir {
            return Ok(dir.clone());
        }

        if self.enabled {
            return Ok(self.base_dir.clone());
        }

        let dirs = ProjectDirs::from("com", "visiride", "VisiRide")
            .ok_or_else(|| VisiRideError::Storage("Failed to get project dirs".into()))?;
        Ok(dirs.data_dir().to_path_buf())
    }

    pub fn default_log_filter(&self) -> &'static str {
        if self.enabled { "debug" } else { "info" }
    }
}
