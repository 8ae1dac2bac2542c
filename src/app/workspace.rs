use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::app::error::AppError;

/// Exclusively owned extraction directory for one bundle install. Created with
/// a manual lifetime: the session releases it when a newer extraction
/// supersedes it or on shutdown, never while an install referencing it is in
/// flight.
#[derive(Debug)]
pub struct TempWorkspace {
    root: PathBuf,
    created_at: DateTime<Utc>,
}

impl TempWorkspace {
    pub fn create(trace_id: &str) -> Result<Self, AppError> {
        let dir = tempfile::Builder::new()
            .prefix("droidbridge_bundle_")
            .tempdir()
            .map_err(|err| {
                AppError::system(format!("Failed to create temp workspace: {err}"), trace_id)
            })?;
        // Opt out of tempfile's drop-time deletion; the session controls when
        // the directory goes away.
        let root = dir.keep();
        debug!(trace_id = %trace_id, path = %root.display(), "created bundle workspace");
        Ok(Self {
            root,
            created_at: Utc::now(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Best-effort removal of the whole subtree. Failure is logged, never
    /// raised: a stuck directory must not block the next install or shutdown.
    pub fn release(self, trace_id: &str) {
        match fs::remove_dir_all(&self.root) {
            Ok(()) => {
                debug!(trace_id = %trace_id, path = %self.root.display(), "released bundle workspace")
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => warn!(
                trace_id = %trace_id,
                path = %self.root.display(),
                error = %err,
                "failed to remove bundle workspace"
            ),
        }
    }
}
