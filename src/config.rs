//! Configuration loaded from `paket.toml`.
//!
//! Every value has a default, so a missing file is fine. The environment
//! variables `PAKET_STORAGE_ROOT` and `PAKET_PACKAGE_MANAGER` take
//! precedence over the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::PaketError;
use crate::package_manager::PackageManager;

pub const DEFAULT_CONFIG_FILE: &str = "paket.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct PaketConfig {
    /// Root directory for everything paket persists.
    #[serde(default = "default_storage_root")]
    pub storage_root: PathBuf,

    /// Keep the package manager's output next to each job record.
    #[serde(default = "default_capture_output")]
    pub capture_output: bool,

    /// Interval between status checks while waiting on a job.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Give up waiting on a job after this long.
    #[serde(default = "default_wait_timeout_secs")]
    pub wait_timeout_secs: u64,

    #[serde(default)]
    pub package_manager: PackageManager,
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("storage/paket")
}

fn default_capture_output() -> bool {
    true
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_wait_timeout_secs() -> u64 {
    600
}

impl Default for PaketConfig {
    fn default() -> Self {
        Self {
            storage_root: default_storage_root(),
            capture_output: default_capture_output(),
            poll_interval_ms: default_poll_interval_ms(),
            wait_timeout_secs: default_wait_timeout_secs(),
            package_manager: PackageManager::default(),
        }
    }
}

impl PaketConfig {
    /// Loads `path`, or `paket.toml` in the current directory. An explicitly
    /// given path must exist; the default one may be absent.
    pub fn load(path: Option<&Path>) -> Result<Self, PaketError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.exists() {
                    Self::from_file(default)?
                } else {
                    Self::default()
                }
            }
        };

        config.apply_overrides(
            std::env::var("PAKET_STORAGE_ROOT").ok(),
            std::env::var("PAKET_PACKAGE_MANAGER").ok(),
        );
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, PaketError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| PaketError::Config(format!("cannot read {}: {e}", path.display())))?;
        Ok(toml::from_str(&contents)?)
    }

    /// Empty values are ignored.
    pub fn apply_overrides(&mut self, storage_root: Option<String>, package_manager: Option<String>) {
        if let Some(root) = storage_root.filter(|s| !s.is_empty()) {
            self.storage_root = PathBuf::from(root);
        }
        if let Some(binary) = package_manager.filter(|s| !s.is_empty()) {
            self.package_manager.binary = binary;
        }
    }

    pub fn validate(&self) -> Result<(), PaketError> {
        if self.storage_root.as_os_str().is_empty() {
            return Err(PaketError::Config("storage_root must not be empty".into()));
        }
        if self.package_manager.binary.trim().is_empty() {
            return Err(PaketError::Config(
                "package_manager.binary must not be empty".into(),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(PaketError::Config("poll_interval_ms must be positive".into()));
        }
        Ok(())
    }

    /// Where job records and their output logs live.
    pub fn jobs_dir(&self) -> PathBuf {
        self.storage_root.join("jobs")
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_timeout_secs)
    }
}
