//! Persistent url→hash state for change detection between runs.
//!
//! The state lives in a single JSON file. Loads are forgiving: a missing file
//! yields an empty state, and an unreadable file is quarantined aside (never
//! deleted) before starting fresh. Saves are atomic — written to a sibling
//! temp file, fsynced, then renamed over the old state — so a crash mid-save
//! leaves the previous state intact.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, info, warn};

use kbsync_shared::{KbSyncError, Result, SyncState};

/// Loads and saves [`SyncState`] at a fixed path.
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the state file, recovering from absence or corruption.
    pub fn load(&self) -> Result<SyncState> {
        if !self.path.exists() {
            debug!(path = ?self.path, "no state file, starting empty");
            return Ok(SyncState::default());
        }

        let content =
            fs::read_to_string(&self.path).map_err(|e| KbSyncError::io(&self.path, e))?;

        match serde_json::from_str::<SyncState>(&content) {
            Ok(state) => {
                debug!(
                    path = ?self.path,
                    documents = state.hashes.len(),
                    "loaded state"
                );
                Ok(state)
            }
            Err(parse_err) => {
                let quarantine = self.quarantine_path();
                warn!(
                    path = ?self.path,
                    quarantine = ?quarantine,
                    error = %parse_err,
                    "state file unreadable, quarantining and starting empty"
                );
                fs::rename(&self.path, &quarantine)
                    .map_err(|e| KbSyncError::io(&self.path, e))?;
                Ok(SyncState::default())
            }
        }
    }

    /// Atomically persist the state: temp file, fsync, rename.
    pub fn save(&self, state: &SyncState) -> Result<()> {
        let json = serde_json::to_string_pretty(state)
            .map_err(|e| KbSyncError::state(format!("failed to serialize state: {e}")))?;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| KbSyncError::io(parent, e))?;
        }

        let tmp = self.path.with_extension("tmp");
        {
            let mut file = File::create(&tmp).map_err(|e| KbSyncError::io(&tmp, e))?;
            file.write_all(json.as_bytes())
                .map_err(|e| KbSyncError::io(&tmp, e))?;
            file.sync_all().map_err(|e| KbSyncError::io(&tmp, e))?;
        }
        fs::rename(&tmp, &self.path).map_err(|e| KbSyncError::io(&self.path, e))?;

        info!(
            path = ?self.path,
            documents = state.hashes.len(),
            "saved state"
        );
        Ok(())
    }

    fn quarantine_path(&self) -> PathBuf {
        let stamp = Utc::now().format("%Y%m%d%H%M%S");
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "state".into());
        self.path.with_file_name(format!("{name}.corrupt-{stamp}"))
    }
}
