use chrono::Local;
use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use super::coordinate::Coordinate;
use crate::errors::StateError;
use crate::oracle::Message;

const LOCK_FILE: &str = ".lock";

/// One checkpoint as written to disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedState<R> {
    pub timestamp: String,
    pub messages: Vec<Message>,
    pub result: R,
}

/// Directory of `state_d_i_p_s.json` files for one `(project, bug)` pair.
#[derive(Debug, Clone)]
pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// `<result_dir>/<project>_<bug>/`.
    pub fn for_session(result_dir: &Path, project: &str, bug: &str) -> Self {
        Self::new(result_dir.join(format!("{}_{}", project, bug)))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, coord: Coordinate) -> PathBuf {
        self.dir.join(coord.file_name())
    }

    pub fn exists(&self, coord: Coordinate) -> bool {
        self.path(coord).exists()
    }

    pub fn save<R: Serialize>(
        &self,
        coord: Coordinate,
        messages: &[Message],
        result: &R,
    ) -> Result<(), StateError> {
        fs::create_dir_all(&self.dir).map_err(|source| StateError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let path = self.path(coord);
        let state = PersistedState {
            timestamp: Local::now().format("%Y%m%d_%H%M%S").to_string(),
            messages: messages.to_vec(),
            result,
        };
        let content = serde_json::to_string_pretty(&state).map_err(|source| StateError::Encode {
            path: path.clone(),
            source,
        })?;

        // write-then-rename so a crash never leaves a truncated checkpoint
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, content).map_err(|source| StateError::Io {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &path).map_err(|source| StateError::Io {
            path: path.clone(),
            source,
        })?;

        tracing::info!(coord = %coord, "state saved to {}", path.display());
        Ok(())
    }

    /// Missing or unreadable checkpoints are reported as `None`.
    pub fn load<R: DeserializeOwned>(&self, coord: Coordinate) -> Option<PersistedState<R>> {
        let path = self.path(coord);
        if !path.exists() {
            tracing::warn!(coord = %coord, "no saved state at {}", path.display());
            return None;
        }

        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) => {
                tracing::error!(coord = %coord, "failed to read {}: {}", path.display(), e);
                return None;
            }
        };

        match serde_json::from_str(&content) {
            Ok(state) => {
                tracing::debug!(coord = %coord, "state loaded from {}", path.display());
                Some(state)
            }
            Err(e) => {
                tracing::error!(coord = %coord, "corrupt state at {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Returns whether a file was actually removed.
    pub fn remove(&self, coord: Coordinate) -> Result<bool, StateError> {
        let path = self.path(coord);
        if !path.exists() {
            tracing::warn!(coord = %coord, "nothing to remove at {}", path.display());
            return Ok(false);
        }
        fs::remove_file(&path).map_err(|source| StateError::Io {
            path: path.clone(),
            source,
        })?;
        tracing::info!(coord = %coord, "state removed");
        Ok(true)
    }

    /// All checkpoint coordinates, ascending.
    pub fn list(&self) -> Result<Vec<Coordinate>, StateError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&self.dir).map_err(|source| StateError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let mut coords: Vec<Coordinate> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| Coordinate::from_file_name(&entry.file_name().to_string_lossy()))
            .collect();
        coords.sort();
        Ok(coords)
    }

    /// Keep every checkpoint `<= keep`, delete the rest. `None` clears the session.
    ///
    /// Returns the number of checkpoints deleted.
    pub fn rewind(&self, keep: Option<Coordinate>) -> Result<usize, StateError> {
        let mut removed = 0;
        for coord in self.list()? {
            if keep.is_some_and(|k| coord <= k) {
                continue;
            }
            if self.remove(coord)? {
                removed += 1;
            }
        }
        match keep {
            Some(k) => tracing::info!(keep = %k, removed, "rewound session"),
            None => tracing::info!(removed, "cleared session"),
        }
        Ok(removed)
    }

    pub fn clear(&self) -> Result<usize, StateError> {
        self.rewind(None)
    }

    /// Last checkpoint that can be trusted before re-running `(depth, iteration, 1, 1)`.
    ///
    /// Inside an iteration chain that is the previous iteration's comparison;
    /// at the start of a depth it is the deepest localization of the parent
    /// depth that stepped into this one.
    pub fn last_reliable_before(&self, depth: u32, iteration: u32) -> Result<Option<Coordinate>, StateError> {
        if iteration > 1 {
            let prev = Coordinate::narrowing(depth, iteration - 1, 7);
            return Ok(self.exists(prev).then_some(prev));
        }
        if depth > 1 {
            let parent = self
                .list()?
                .into_iter()
                .filter(|c| c.depth == depth - 1 && c.is_localizing())
                .max();
            return Ok(parent);
        }
        Ok(None)
    }

    /// Take the session's advisory lock; released when the guard drops.
    pub fn lock(&self) -> Result<SessionLock, StateError> {
        fs::create_dir_all(&self.dir).map_err(|source| StateError::Io {
            path: self.dir.clone(),
            source,
        })?;
        let path = self.dir.join(LOCK_FILE);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|source| StateError::Io {
                path: path.clone(),
                source,
            })?;

        if file.try_lock_exclusive().is_err() {
            return Err(StateError::Locked { path });
        }
        tracing::debug!("acquired session lock {}", path.display());
        Ok(SessionLock { file, path })
    }
}

/// Exclusive hold on a session directory.
#[derive(Debug)]
pub struct SessionLock {
    file: File,
    path: PathBuf,
}

impl Drop for SessionLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!("failed to release {}: {}", self.path.display(), e);
        }
    }
}
