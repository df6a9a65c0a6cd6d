//! File system paths for the handshake core.

use crate::{CoreError, CoreResult};
use std::path::PathBuf;

/// Manages file system paths for the handshake core.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Base directory for runtime files (~/.onairos)
    base_dir: PathBuf,
}

impl Paths {
    /// Create a new Paths instance rooted at `~/.onairos`.
    pub fn new() -> CoreResult<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| CoreError::Path("Could not determine home directory".to_string()))?;

        Ok(Self {
            base_dir: home.join(".onairos"),
        })
    }

    /// Create a new Paths instance with a custom base directory.
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Get the base directory (~/.onairos).
    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Get the config file path (~/.onairos/config.json).
    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Get the logs directory (~/.onairos/logs).
    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    /// Get the handshake log file path (~/.onairos/logs/handshake.log).
    pub fn log_file(&self) -> PathBuf {
        self.logs_dir().join("handshake.log")
    }

    /// Ensure all required directories exist.
    pub fn ensure_dirs(&self) -> CoreResult<()> {
        std::fs::create_dir_all(&self.base_dir)?;
        std::fs::create_dir_all(self.logs_dir())?;
        Ok(())
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self::new().expect("Failed to determine home directory")
    }
}
