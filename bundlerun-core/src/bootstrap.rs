//! Scoped temp bootstrap home.
//!
//! Bootstrapping writes credentials and state under the tool's config home,
//! so each run bootstraps inside a throwaway home containing only the
//! environment under test. The scope is a guard: dropping it removes the
//! temp home whether or not the enclosed quickstart succeeded, and copies
//! any environment state file the bootstrap produced back into the real
//! config home so later commands (status, destroy) can find it.

use crate::environment::Environment;
use crate::error::{BundlerunError, Result};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};

/// Guard holding a temporary bootstrap config home.
pub struct TempBootstrapEnv {
    dir: TempDir,
    base_home: PathBuf,
}

impl TempBootstrapEnv {
    /// Materialize a temp config home under `base_home` containing only
    /// `environment` serialized to `environments.yaml`.
    pub fn new(base_home: &Path, environment: &Environment) -> Result<Self> {
        std::fs::create_dir_all(base_home).map_err(|e| BundlerunError::io(base_home, e))?;
        let dir = tempfile::Builder::new()
            .prefix("bootstrap-")
            .tempdir_in(base_home)
            .map_err(|e| BundlerunError::io(base_home, e))?;

        let yaml = environment.to_environments_yaml()?;
        let config_path = dir.path().join("environments.yaml");
        std::fs::write(&config_path, yaml).map_err(|e| BundlerunError::io(&config_path, e))?;

        debug!(home = %dir.path().display(), "temp bootstrap home ready");
        Ok(Self { dir, base_home: base_home.to_path_buf() })
    }

    /// Path of the temp config home.
    pub fn home(&self) -> &Path {
        self.dir.path()
    }

    fn copy_state_files_back(&self) -> std::io::Result<()> {
        let src = self.dir.path().join("environments");
        if !src.is_dir() {
            return Ok(());
        }
        let dst = self.base_home.join("environments");
        std::fs::create_dir_all(&dst)?;
        for entry in std::fs::read_dir(&src)? {
            let entry = entry?;
            if entry.path().extension().map(|e| e == "jenv").unwrap_or(false) {
                std::fs::copy(entry.path(), dst.join(entry.file_name()))?;
            }
        }
        Ok(())
    }
}

impl Drop for TempBootstrapEnv {
    fn drop(&mut self) {
        // Preserve whatever state the bootstrap wrote before TempDir
        // removes the directory.
        if let Err(e) = self.copy_state_files_back() {
            warn!(error = %e, "failed to copy environment state out of temp bootstrap home");
        }
    }
}
