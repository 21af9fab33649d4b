// At most one in-flight run per repository path

use crate::models::normalize_path;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

/// Set of repository paths with a run in progress
#[derive(Debug, Clone, Default)]
pub struct InFlightTracker {
    paths: Arc<Mutex<HashSet<PathBuf>>>,
}

impl InFlightTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `path`, or `None` if a run for it is already in flight
    ///
    /// Claims are keyed on the normalized path. The claim is released when
    /// the returned guard is dropped.
    pub fn try_acquire(&self, path: &Path) -> Option<InFlightGuard> {
        let path = normalize_path(path);
        let mut paths = self.paths.lock().unwrap_or_else(PoisonError::into_inner);
        if !paths.insert(path.clone()) {
            return None;
        }

        Some(InFlightGuard {
            paths: Arc::clone(&self.paths),
            path,
        })
    }

    pub fn is_in_flight(&self, path: &Path) -> bool {
        self.paths
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&normalize_path(path))
    }

    pub fn len(&self) -> usize {
        self.paths.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Releases its path on drop
#[derive(Debug)]
pub struct InFlightGuard {
    paths: Arc<Mutex<HashSet<PathBuf>>>,
    path: PathBuf,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.paths
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.path);
    }
}
