//! The document-store collaborator.
//!
//! [`Store`] is everything the core needs from the host: file CRUD, metadata
//! access, folder management and link resolution. [`FsStore`](crate::FsStore)
//! implements it over a plain directory; embedders can provide their own.

use crate::core::file::FileHandle;
use crate::core::frontmatter::{self, Metadata};
use crate::core::link::LinkToken;
use crate::Result;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

pub trait Store: Send + Sync {
    /// Handle for the record at `path`, if it exists.
    fn get_file(&self, path: &Path) -> Option<Arc<FileHandle>>;

    /// Every Markdown record in the vault.
    fn list_files(&self) -> Vec<Arc<FileHandle>>;

    fn read_file(&self, file: &FileHandle) -> Result<String>;

    fn write_file(&self, file: &FileHandle, content: &str) -> Result<()>;

    /// Creates a new record; fails if something already exists at `path`.
    fn create_file(&self, path: &Path, content: &str) -> Result<Arc<FileHandle>>;

    /// Creates `path` and any missing ancestors.
    fn create_folder(&self, path: &Path) -> Result<()>;

    fn folder_exists(&self, path: &Path) -> bool;

    /// Moves `file` to `new_path` and rebinds the handle to it.
    fn rename_file(&self, file: &FileHandle, new_path: &Path) -> Result<()>;

    /// Removes `path` when it contains nothing; returns whether it was removed.
    fn remove_folder_if_empty(&self, path: &Path) -> Result<bool>;

    /// Parsed front matter of `file`.
    fn get_metadata(&self, file: &FileHandle) -> Result<Metadata> {
        let content = self.read_file(file)?;
        Ok(frontmatter::split(&content)?.0)
    }

    /// Rewrites the front matter of `file`, keeping its body.
    fn update_metadata(&self, file: &FileHandle, metadata: &Metadata) -> Result<()> {
        let content = self.read_file(file)?;
        let (_, body) = frontmatter::split(&content)?;
        let updated = frontmatter::compose(metadata, body)?;
        if updated != content {
            self.write_file(file, &updated)?;
        }
        Ok(())
    }

    /// Finds the record a link points to.
    ///
    /// An exact vault path wins; otherwise the link's last segment is matched
    /// against base names, preferring a file next to `source`, then the
    /// shortest path. Unresolvable links yield `None`.
    fn resolve_link(&self, link: &LinkToken, source: Option<&Path>) -> Option<Arc<FileHandle>> {
        let files = self.list_files();
        let wanted = link_target_path(link);
        if let Some(exact) = files.iter().find(|f| f.path() == wanted) {
            return Some(Arc::clone(exact));
        }

        let base = link.base_name();
        let mut candidates: Vec<&Arc<FileHandle>> = files.iter().filter(|f| f.base_name() == base).collect();
        if candidates.is_empty() {
            return None;
        }
        if let Some(folder) = source.and_then(Path::parent) {
            if let Some(sibling) = candidates.iter().find(|f| f.parent_folder() == folder) {
                return Some(Arc::clone(sibling));
            }
        }
        candidates.sort_by_key(|f| {
            let path = f.path();
            (path.components().count(), path)
        });
        Some(Arc::clone(candidates[0]))
    }
}

/// Vault path a link names, with `.md` appended when it has no extension.
pub(crate) fn link_target_path(link: &LinkToken) -> PathBuf {
    let mut path = normalize(Path::new(&link.path));
    if path.extension().is_none() {
        let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".md");
        path.set_file_name(name);
    }
    path
}

/// Reduces `path` to plain vault-relative segments (no root, `.` or `..`).
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(segment) => out.push(segment),
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
        }
    }
    out
}
