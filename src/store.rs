//! File-backed key-value store with atomic writes.
//!
//! Each key lives in its own `<key>.json` file inside the data directory.
//! Writes go to a temporary file that is synced and renamed over the target,
//! under an exclusive `fs2` lock, so a crash never leaves a half-written
//! blob behind.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::error::{Result, TaskgateError};
use crate::testing::KeyValueStore;

/// Temporary file suffix for atomic writes.
const TMP_SUFFIX: &str = ".tmp";

/// Lock file suffix for concurrent access prevention.
const LOCK_SUFFIX: &str = ".lock";

/// Write `contents` to `path` atomically.
pub(crate) fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let lock_file = File::create(suffixed(path, LOCK_SUFFIX))?;
    FileExt::lock_exclusive(&lock_file)
        .map_err(|e| TaskgateError::storage(format!("Failed to acquire lock: {e}")))?;

    let tmp_path = suffixed(path, TMP_SUFFIX);
    let mut tmp_file = File::create(&tmp_path)?;
    tmp_file.write_all(contents.as_bytes())?;
    tmp_file.sync_all()?;

    fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Read `path`, returning `None` if it doesn't exist.
pub(crate) fn read_locked(path: &Path) -> Result<Option<String>> {
    let lock_path = suffixed(path, LOCK_SUFFIX);
    let _lock = if lock_path.exists() {
        let lock_file = File::open(&lock_path)?;
        FileExt::lock_shared(&lock_file)
            .map_err(|e| TaskgateError::storage(format!("Failed to acquire lock: {e}")))?;
        Some(lock_file)
    } else {
        None
    };

    let mut file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;
    Ok(Some(contents))
}

fn suffixed(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// Key-value store rooted at a directory.
#[derive(Debug, Clone)]
pub struct FileKeyValueStore {
    dir: PathBuf,
}

impl FileKeyValueStore {
    #[must_use]
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file backing `key`.
    ///
    /// # Errors
    ///
    /// Keys are restricted to ASCII alphanumerics, `_` and `-` so they can't
    /// escape the directory.
    pub fn key_path(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(TaskgateError::storage(format!("Invalid store key '{key}'")));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl KeyValueStore for FileKeyValueStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(read_locked(&self.key_path(key)?)?)
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        Ok(write_atomic(&self.key_path(key)?, value)?)
    }

    fn remove(&self, key: &str) -> anyhow::Result<()> {
        let path = self.key_path(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
