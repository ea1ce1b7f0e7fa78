//! Advisory file locking for write paths.
//!
//! Every read-modify-write on an artifact (sign, delete, copy, category
//! move) and the venv-dir creation guard take an exclusive lock on a sibling
//! `<name>.lock` file. Locks are process-advisory: readers do not take them.
//! Locks are never held across subprocess execution.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::debug;

use crate::{StoreError, StoreResult};

/// The lock file guarding `target`.
pub fn lock_path_for(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| "store".to_string());
    name.push_str(".lock");
    target.with_file_name(name)
}

/// Run `f` while holding an exclusive advisory lock for `target`.
pub fn with_lock<T>(target: &Path, f: impl FnOnce() -> StoreResult<T>) -> StoreResult<T> {
    let lock_path = lock_path_for(target);
    if let Some(parent) = lock_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let lock_file = OpenOptions::new()
        .create(true)
        .write(true)
        .open(&lock_path)
        .map_err(|e| StoreError::Lock {
            path: lock_path.display().to_string(),
            message: e.to_string(),
        })?;

    lock_file.lock_exclusive().map_err(|e| StoreError::Lock {
        path: lock_path.display().to_string(),
        message: e.to_string(),
    })?;
    debug!(target: "kiwi_store.lock", path = %lock_path.display(), "acquired");

    let result = f();

    if let Err(e) = fs2::FileExt::unlock(&lock_file) {
        debug!(target: "kiwi_store.lock", path = %lock_path.display(), error = %e, "unlock failed");
    }
    result
}
