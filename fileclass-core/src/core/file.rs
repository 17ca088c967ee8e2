//! File handles and their per-file mutation lock.
//!
//! A [`FileHandle`] is the unit of storage: one Markdown file in the vault,
//! addressed by its vault-relative path. Metadata writes and moves against the
//! same handle are mutually exclusive; each waits at most the handle's lock
//! timeout and fails with [`FileClassError::LockTimeout`] instead of blocking
//! forever.

use crate::core::frontmatter::{self, Metadata};
use crate::core::store::Store;
use crate::{FileClassError, Result};
use parking_lot::{Mutex, MutexGuard, RwLock};
use serde_json::Value;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Held while a mutation runs; dropping it releases the file.
pub type MutationGuard<'a> = MutexGuard<'a, ()>;

/// One physical file in the vault.
pub struct FileHandle {
    path: RwLock<PathBuf>,
    lock: Mutex<()>,
    lock_timeout: Duration,
}

impl FileHandle {
    pub fn new(path: PathBuf, lock_timeout: Duration) -> Self {
        Self { path: RwLock::new(path), lock: Mutex::new(()), lock_timeout }
    }

    /// Vault-relative path, reflecting any move performed so far.
    pub fn path(&self) -> PathBuf {
        self.path.read().clone()
    }

    /// File name including its extension.
    pub fn name(&self) -> String {
        self.path
            .read()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// File name without its extension.
    pub fn base_name(&self) -> String {
        self.path
            .read()
            .file_stem()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Folder containing the file; empty for the vault root.
    pub fn parent_folder(&self) -> PathBuf {
        self.path.read().parent().map(Path::to_path_buf).unwrap_or_default()
    }

    /// Returns `true` while a mutation holds this file.
    pub fn is_locked(&self) -> bool {
        self.lock.is_locked()
    }

    /// Points the handle at a new path. Only the store calls this, after a rename.
    pub(crate) fn rebind(&self, new_path: PathBuf) {
        *self.path.write() = new_path;
    }

    /// Acquires the mutation lock, waiting at most the configured timeout.
    ///
    /// # Errors
    ///
    /// Returns [`FileClassError::LockTimeout`] if another mutation still holds
    /// the file when the timeout expires.
    pub fn lock(&self) -> Result<MutationGuard<'_>> {
        self.lock
            .try_lock_for(self.lock_timeout)
            .ok_or_else(|| FileClassError::LockTimeout { path: self.path() })
    }

    /// Sets one metadata key (or removes it when `value` is null) and returns
    /// the previous value.
    ///
    /// The whole read-modify-write runs under the file's lock.
    pub fn update_metadata(&self, store: &dyn Store, key: &str, value: Value) -> Result<Option<Value>> {
        let _guard = self.lock()?;
        let mut metadata = store.get_metadata(self)?;
        let previous = if value.is_null() {
            metadata.shift_remove(key)
        } else {
            metadata.insert(key.to_string(), value)
        };
        store.update_metadata(self, &metadata)?;
        Ok(previous)
    }

    /// Replaces the whole metadata block and returns the previous one.
    pub fn write_metadata(&self, store: &dyn Store, metadata: &Metadata) -> Result<Metadata> {
        let _guard = self.lock()?;
        let previous = store.get_metadata(self)?;
        store.update_metadata(self, metadata)?;
        Ok(previous)
    }

    /// Reads the metadata block without taking the lock.
    pub fn metadata(&self, store: &dyn Store) -> Result<Metadata> {
        store.get_metadata(self)
    }

    /// Reads the body below the metadata block.
    pub fn body(&self, store: &dyn Store) -> Result<String> {
        let content = store.read_file(self)?;
        let (_, body) = frontmatter::split(&content)?;
        Ok(body.to_string())
    }

    /// Moves the file to `folder/name`, creating the folder when needed.
    ///
    /// Returns the new path; a move onto the current path does nothing.
    pub fn move_to(&self, store: &dyn Store, folder: &Path, name: &str) -> Result<PathBuf> {
        let _guard = self.lock()?;
        let target = folder.join(name);
        if target == self.path() {
            return Ok(target);
        }
        if !folder.as_os_str().is_empty() && !store.folder_exists(folder) {
            store.create_folder(folder)?;
        }
        store.rename_file(self, &target)?;
        Ok(target)
    }
}

impl fmt::Debug for FileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileHandle")
            .field("path", &self.path())
            .field("locked", &self.is_locked())
            .finish()
    }
}
