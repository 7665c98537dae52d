use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::CheckpointError;
use crate::models::{PageCursor, RunState, RunStatus};

/// Persisted [`RunState`] for one search, rewritten atomically after every
/// page.
#[derive(Debug)]
pub struct Checkpoint {
    path: PathBuf,
    state: RunState,
}

/// `<dir>/<output_stem>.<search_id>.state.json`
pub fn state_path(output_path: &Path, search_id: &str) -> PathBuf {
    let stem = output_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "listings".to_owned());
    output_path.with_file_name(format!("{stem}.{search_id}.state.json"))
}

impl Checkpoint {
    /// Loads the state for `search_id`, or starts a fresh one.
    ///
    /// With `resume == false` any existing state is ignored and overwritten on
    /// the first save.
    pub async fn load_run_state(
        output_path: &Path,
        search_id: &str,
        search_url: &str,
        resume: bool,
    ) -> Result<Self, CheckpointError> {
        let path = state_path(output_path, search_id);
        let fresh = || RunState::new(search_id, search_url, Utc::now());

        if !resume {
            return Ok(Self {
                path,
                state: fresh(),
            });
        }

        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no checkpoint, starting fresh");
                return Ok(Self {
                    path,
                    state: fresh(),
                });
            }
            Err(source) => return Err(CheckpointError::Read { path, source }),
        };

        let mut state: RunState = match serde_json::from_slice(&bytes) {
            Ok(state) => state,
            Err(source) => return Err(CheckpointError::Corrupt { path, source }),
        };
        if state.search_id != search_id {
            return Err(CheckpointError::SearchMismatch {
                path,
                expected: search_id.to_owned(),
                found: state.search_id,
            });
        }

        info!(
            path = %path.display(),
            last_completed_page = state.last_completed_page,
            failed_pages = state.failed_pages.len(),
            seen = state.seen_listing_ids.len(),
            "resuming from checkpoint"
        );
        state.status = RunStatus::InProgress;
        Ok(Self { path, state })
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records a settled page and the ids it emitted, then persists.
    ///
    /// Call only after the page's records are committed to the sink.
    pub async fn save_page_cursor<'a>(
        &mut self,
        cursor: &PageCursor,
        emitted: impl IntoIterator<Item = &'a String>,
    ) -> Result<(), CheckpointError> {
        self.state
            .seen_listing_ids
            .extend(emitted.into_iter().cloned());
        self.state.apply_cursor(cursor, Utc::now());
        self.persist().await
    }

    /// Sets the final run status and persists.
    pub async fn finish(&mut self, status: RunStatus) -> Result<(), CheckpointError> {
        self.state.status = status;
        self.state.updated_at = Utc::now();
        self.persist().await
    }

    async fn persist(&self) -> Result<(), CheckpointError> {
        let write_err = |source| CheckpointError::Write {
            path: self.path.clone(),
            source,
        };
        let json = serde_json::to_vec_pretty(&self.state).map_err(|source| {
            CheckpointError::Corrupt {
                path: self.path.clone(),
                source,
            }
        })?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(write_err)?;
        }
        let mut tmp_name = self.path.clone().into_os_string();
        tmp_name.push(".tmp");
        let tmp = PathBuf::from(tmp_name);

        let mut file = fs::File::create(&tmp).await.map_err(write_err)?;
        file.write_all(&json).await.map_err(write_err)?;
        file.sync_all().await.map_err(write_err)?;
        drop(file);
        fs::rename(&tmp, &self.path).await.map_err(write_err)?;

        debug!(
            path = %self.path.display(),
            last_completed_page = self.state.last_completed_page,
            "checkpoint saved"
        );
        Ok(())
    }
}
