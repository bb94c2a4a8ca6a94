//! A scoped temp directory with guaranteed removal on every exit path
//! (success, failure, cancellation). Modeled as a Drop guard rather than an
//! explicit `finally` block so a short-circuiting `?` anywhere in the
//! worker loop still cleans up.

use std::path::{Path, PathBuf};

use tracing::warn;
use uuid::Uuid;

use crate::error::{Error, Result};

pub struct ScopedTempDir {
    path: PathBuf,
}

impl ScopedTempDir {
    /// Create `<temp_root>/<job_id>-<random>` and return a guard that
    /// removes the whole tree on drop.
    pub fn create(temp_root: &Path, job_id: Uuid) -> Result<Self> {
        let path = temp_root.join(format!("{job_id}-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&path)
            .map_err(|e| Error::internal("failed to create job temp directory").with_source(e))?;
        std::fs::create_dir_all(path.join("input"))
            .map_err(|e| Error::internal("failed to create job temp input directory").with_source(e))?;
        Ok(ScopedTempDir { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn input_path(&self, filename: &str) -> PathBuf {
        self.path.join("input").join(filename)
    }

    pub fn output_path(&self, filename: &str) -> PathBuf {
        self.path.join(filename)
    }
}

impl Drop for ScopedTempDir {
    fn drop(&mut self) {
        if let Err(err) = std::fs::remove_dir_all(&self.path) {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %err, "failed to remove job temp directory");
            }
        }
    }
}

/// Run once at worker startup: remove orphaned temp directories left by a
/// prior crash. Best-effort; failures are logged, not propagated.
pub fn sweep_orphaned_temp_dirs(temp_root: &Path) {
    let Ok(entries) = std::fs::read_dir(temp_root) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            if let Err(err) = std::fs::remove_dir_all(&path) {
                warn!(path = %path.display(), error = %err, "failed to sweep orphaned temp directory");
            }
        }
    }
}
