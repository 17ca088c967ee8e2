//! [`Store`] implementation backed by a directory on disk.

use crate::core::file::FileHandle;
use crate::core::store::{normalize, Store};
use crate::{FileClassError, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// A vault rooted at a directory. Records are the `.md` files below it;
/// dot-directories (`.git`, `.fileclass`, …) are skipped.
///
/// Handles are interned per path, so every caller asking for the same file
/// shares one handle and therefore one mutation lock.
pub struct FsStore {
    root: PathBuf,
    lock_timeout: Duration,
    handles: Mutex<HashMap<PathBuf, Arc<FileHandle>>>,
}

impl FsStore {
    /// Opens the vault at `root`, creating the directory when missing.
    pub fn open<P: AsRef<Path>>(root: P, lock_timeout: Duration) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root, lock_timeout, handles: Mutex::new(HashMap::new()) })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn absolute(&self, rel: &Path) -> PathBuf {
        self.root.join(rel)
    }

    fn intern(&self, rel: PathBuf) -> Arc<FileHandle> {
        let mut handles = self.handles.lock();
        Arc::clone(
            handles
                .entry(rel.clone())
                .or_insert_with(|| Arc::new(FileHandle::new(rel, self.lock_timeout))),
        )
    }

    fn collect_markdown(&self, dir: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name();
            if name.to_string_lossy().starts_with('.') {
                continue;
            }
            let path = entry.path();
            if entry.file_type()?.is_dir() {
                self.collect_markdown(&path, out)?;
            } else if path.extension().and_then(|e| e.to_str()) == Some("md") {
                if let Ok(rel) = path.strip_prefix(&self.root) {
                    out.push(rel.to_path_buf());
                }
            }
        }
        Ok(())
    }
}

impl Store for FsStore {
    fn get_file(&self, path: &Path) -> Option<Arc<FileHandle>> {
        let rel = normalize(path);
        if !self.absolute(&rel).is_file() {
            self.handles.lock().remove(&rel);
            return None;
        }
        Some(self.intern(rel))
    }

    fn list_files(&self) -> Vec<Arc<FileHandle>> {
        let mut paths = Vec::new();
        if let Err(e) = self.collect_markdown(&self.root, &mut paths) {
            log::warn!("failed to scan {}: {e}", self.root.display());
        }
        paths.sort();
        self.handles.lock().retain(|p, _| paths.binary_search(p).is_ok());
        paths.into_iter().map(|p| self.intern(p)).collect()
    }

    fn read_file(&self, file: &FileHandle) -> Result<String> {
        let path = file.path();
        fs::read_to_string(self.absolute(&path)).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => FileClassError::FileNotFound(path),
            _ => e.into(),
        })
    }

    fn write_file(&self, file: &FileHandle, content: &str) -> Result<()> {
        let target = self.absolute(&file.path());
        let dir = target.parent().unwrap_or(&self.root);
        let tmp = dir.join(format!(".{}.{}.tmp", file.name(), Uuid::new_v4()));
        fs::write(&tmp, content)?;
        if let Err(e) = fs::rename(&tmp, &target) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }

    fn create_file(&self, path: &Path, content: &str) -> Result<Arc<FileHandle>> {
        let rel = normalize(path);
        let abs = self.absolute(&rel);
        if abs.exists() {
            return Err(FileClassError::FileExists(rel));
        }
        if let Some(parent) = abs.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&abs, content)?;
        log::debug!("created {}", rel.display());
        Ok(self.intern(rel))
    }

    fn create_folder(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(self.absolute(&normalize(path)))?;
        Ok(())
    }

    fn folder_exists(&self, path: &Path) -> bool {
        self.absolute(&normalize(path)).is_dir()
    }

    fn rename_file(&self, file: &FileHandle, new_path: &Path) -> Result<()> {
        let from = file.path();
        let to = normalize(new_path);
        let abs_to = self.absolute(&to);
        if abs_to.exists() {
            return Err(FileClassError::FileExists(to));
        }
        if let Some(parent) = abs_to.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::rename(self.absolute(&from), &abs_to).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => FileClassError::FileNotFound(from.clone()),
            _ => e.into(),
        })?;

        let mut handles = self.handles.lock();
        let handle = handles.remove(&from);
        file.rebind(to.clone());
        if let Some(handle) = handle {
            handles.insert(to.clone(), handle);
        }
        log::debug!("moved {} -> {}", from.display(), to.display());
        Ok(())
    }

    fn remove_folder_if_empty(&self, path: &Path) -> Result<bool> {
        let rel = normalize(path);
        if rel.as_os_str().is_empty() {
            return Ok(false);
        }
        let abs = self.absolute(&rel);
        if !abs.is_dir() || fs::read_dir(&abs)?.next().is_some() {
            return Ok(false);
        }
        fs::remove_dir(&abs)?;
        log::debug!("removed empty folder {}", rel.display());
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open() -> (FsStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = FsStore::open(dir.path(), Duration::from_millis(100)).unwrap();
        (store, dir)
    }

    #[test]
    fn test_list_files_skips_dot_dirs_and_non_markdown() {
        let (store, dir) = open();
        store.create_file(Path::new("a.md"), "").unwrap();
        store.create_file(Path::new("sub/b.md"), "").unwrap();
        fs::create_dir_all(dir.path().join(".fileclass")).unwrap();
        fs::write(dir.path().join(".fileclass/hidden.md"), "").unwrap();
        fs::write(dir.path().join("types.yaml"), "").unwrap();

        let paths: Vec<PathBuf> = store.list_files().iter().map(|f| f.path()).collect();
        assert_eq!(paths, vec![PathBuf::from("a.md"), PathBuf::from("sub/b.md")]);
    }

    #[test]
    fn test_handles_are_shared() {
        let (store, _dir) = open();
        let created = store.create_file(Path::new("x.md"), "").unwrap();
        let fetched = store.get_file(Path::new("./x.md")).unwrap();
        assert!(Arc::ptr_eq(&created, &fetched));
        assert!(store.get_file(Path::new("missing.md")).is_none());
    }

    #[test]
    fn test_create_file_refuses_overwrite() {
        let (store, _dir) = open();
        store.create_file(Path::new("x.md"), "one").unwrap();
        assert!(matches!(
            store.create_file(Path::new("x.md"), "two"),
            Err(FileClassError::FileExists(_))
        ));
    }

    #[test]
    fn test_rename_rekeys_handle() {
        let (store, _dir) = open();
        let file = store.create_file(Path::new("x.md"), "content").unwrap();
        store.rename_file(&file, Path::new("deep/y.md")).unwrap();
        assert_eq!(file.path(), PathBuf::from("deep/y.md"));
        let fetched = store.get_file(Path::new("deep/y.md")).unwrap();
        assert!(Arc::ptr_eq(&file, &fetched));
        assert_eq!(store.read_file(&file).unwrap(), "content");
    }

    #[test]
    fn test_write_file_leaves_no_temp_files() {
        let (store, dir) = open();
        let file = store.create_file(Path::new("x.md"), "a").unwrap();
        store.write_file(&file, "b").unwrap();
        assert_eq!(fs::read_to_string(dir.path().join("x.md")).unwrap(), "b");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_remove_folder_if_empty() {
        let (store, _dir) = open();
        store.create_folder(Path::new("empty")).unwrap();
        store.create_file(Path::new("full/x.md"), "").unwrap();
        assert!(store.remove_folder_if_empty(Path::new("empty")).unwrap());
        assert!(!store.remove_folder_if_empty(Path::new("full")).unwrap());
        assert!(!store.remove_folder_if_empty(Path::new("")).unwrap());
        assert!(!store.folder_exists(Path::new("empty")));
    }
}
