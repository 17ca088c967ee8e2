//! Keeps folder layout in step with parent links.
//!
//! A record with at least one child lives in a folder named after itself
//! (`…/Name/Name.md`), and its children live inside that folder. A record
//! without children lives directly in its parent's folder. [`Hierarchy`]
//! restores this layout for one record and its descendants after the
//! record's parent link changes; unrelated records never move.
//!
//! Children are found through the parent-link field of their type. As a
//! fallback, a record sitting in an owner's folder (or owning a subfolder
//! there) is treated as that owner's child unless its own parent link
//! resolves somewhere else.

use crate::core::entity::Entity;
use crate::core::file::FileHandle;
use crate::core::file_class::FileClass;
use crate::core::store::normalize;
use crate::core::workspace::Workspace;
use crate::{FileClassError, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// One file relocated by a synchronization pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMove {
    pub from: PathBuf,
    pub to: PathBuf,
}

/// Moves performed by [`Hierarchy::synchronize`], in execution order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub moves: Vec<FileMove>,
}

impl SyncReport {
    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }
}

/// A record as seen by one synchronization pass.
struct Node {
    file: Arc<FileHandle>,
    class: Option<Arc<FileClass>>,
    /// Index of the record the parent link resolves to.
    parent: Option<usize>,
}

/// Every record with its resolved parent, captured once per pass.
///
/// Parents are stored by identity, so moves made during the pass do not
/// invalidate them. Folder ownership is read from the live handle paths.
struct Snapshot {
    nodes: Vec<Node>,
}

impl Snapshot {
    fn build(ws: &Workspace) -> Self {
        let store = ws.store();
        let mut nodes = Vec::new();
        let mut links = Vec::new();
        for file in store.list_files() {
            let path = file.path();
            let (class, link) = match file.metadata(store) {
                Ok(metadata) => {
                    let class = ws.class_for(&metadata, &path);
                    let link = class.as_ref().and_then(|c| {
                        let field = c.parent_field()?;
                        field.reference_link(metadata.get(&field.name)?)
                    });
                    (class, link)
                }
                Err(e) => {
                    log::warn!("skipping {}: {e}", path.display());
                    (None, None)
                }
            };
            nodes.push(Node { file, class, parent: None });
            links.push(link);
        }

        for (i, link) in links.into_iter().enumerate() {
            let Some(link) = link else { continue };
            let source = nodes[i].file.path();
            match store.resolve_link(&link, Some(&source)) {
                Some(target) => {
                    let target = target.path();
                    let parent = nodes.iter().position(|n| n.file.path() == target);
                    nodes[i].parent = parent;
                }
                None => log::debug!("{}: parent {link} not found", source.display()),
            }
        }
        Self { nodes }
    }

    fn index_of(&self, path: &Path) -> Option<usize> {
        self.nodes.iter().position(|n| n.file.path() == path)
    }

    /// Explicit children, then records placed in `i`'s folder without a
    /// parent link of their own.
    ///
    /// The folder fallback never picks a record on `i`'s explicit parent
    /// chain.
    fn children_of(&self, i: usize) -> Vec<usize> {
        let owned = owned_folder(&self.nodes[i].file);
        let ancestors = self.ancestors(i);
        (0..self.nodes.len())
            .filter(|&j| j != i)
            .filter(|&j| match self.nodes[j].parent {
                Some(p) => p == i,
                None => {
                    !ancestors.contains(&j)
                        && owned
                            .as_deref()
                            .is_some_and(|dir| is_inside(&self.nodes[j].file, dir))
                }
            })
            .collect()
    }

    /// Records reached by following explicit parent links up from `i`,
    /// stopping at the first repeat.
    fn ancestors(&self, i: usize) -> Vec<usize> {
        let mut chain = Vec::new();
        let mut current = self.nodes[i].parent;
        while let Some(p) = current {
            if p == i || chain.contains(&p) {
                break;
            }
            chain.push(p);
            current = self.nodes[p].parent;
        }
        chain
    }

    /// Fails if the parent chain of `i` loops, or if the tree under its
    /// topmost ancestor reaches any record twice.
    ///
    /// Runs before anything moves, so a rejected pass leaves the vault as it
    /// was.
    fn check_acyclic(&self, i: usize) -> Result<()> {
        let mut chain = vec![i];
        let mut root = i;
        while let Some(p) = self.nodes[root].parent {
            if chain.contains(&p) {
                return Err(FileClassError::HierarchyCycle(self.nodes[p].file.path()));
            }
            chain.push(p);
            root = p;
        }

        let mut seen = HashSet::from([root]);
        let mut pending = vec![root];
        while let Some(n) = pending.pop() {
            for child in self.children_of(n) {
                if !seen.insert(child) {
                    return Err(FileClassError::HierarchyCycle(self.nodes[child].file.path()));
                }
                pending.push(child);
            }
        }
        Ok(())
    }
}

/// The folder `file` owns, when it lives in a folder named after itself.
fn owned_folder(file: &FileHandle) -> Option<PathBuf> {
    let folder = file.parent_folder();
    let name = folder.file_name()?.to_string_lossy().into_owned();
    (name == file.base_name()).then_some(folder)
}

/// Whether `file` sits directly in `dir` or owns a subfolder of it.
fn is_inside(file: &FileHandle, dir: &Path) -> bool {
    let folder = file.parent_folder();
    folder == dir || (owned_folder(file).is_some() && folder.parent() == Some(dir))
}

/// Hierarchy operations over one workspace.
pub struct Hierarchy<'a> {
    ws: &'a Workspace,
}

impl<'a> Hierarchy<'a> {
    pub fn new(ws: &'a Workspace) -> Self {
        Self { ws }
    }

    /// Typed children of `entity`. Untyped records in its folder are skipped.
    pub fn find_children(&self, entity: &Entity) -> Result<Vec<Entity>> {
        let path = entity.bound()?.path();
        let snapshot = Snapshot::build(self.ws);
        let Some(i) = snapshot.index_of(&path) else {
            return Err(FileClassError::FileNotFound(path));
        };
        Ok(snapshot
            .children_of(i)
            .into_iter()
            .filter_map(|j| {
                let node = &snapshot.nodes[j];
                let class = node.class.as_ref()?;
                Some(self.ws.entity_from(Arc::clone(&node.file), class))
            })
            .collect())
    }

    /// Moves `entity`, its parent chain and its descendants into place.
    ///
    /// Does nothing when the parent link is empty or unresolvable. Running it
    /// twice in a row moves nothing the second time.
    ///
    /// # Errors
    ///
    /// Returns [`FileClassError::HierarchyCycle`] if the parent chain loops
    /// back (nothing is moved in that case), [`FileClassError::FileExists`] if a move would overwrite another
    /// file, and [`FileClassError::LockTimeout`] if a file to move stays busy.
    pub fn synchronize(&self, entity: &mut Entity) -> Result<SyncReport> {
        let path = entity.bound()?.path();
        let snapshot = Snapshot::build(self.ws);
        let mut report = SyncReport::default();

        // 1. Resolve the parent
        let Some(i) = snapshot.index_of(&path) else {
            return Err(FileClassError::FileNotFound(path));
        };
        let Some(parent) = snapshot.nodes[i].parent else {
            log::debug!("{}: no parent, nothing to synchronize", path.display());
            return Ok(report);
        };
        if parent == i {
            return Err(FileClassError::HierarchyCycle(path));
        }
        snapshot.check_acyclic(i)?;

        // 2. Give the parent (and, recursively, its ancestors) a folder
        let mut visiting = HashSet::from([i]);
        let container = self.ensure_owner_folder(&snapshot, parent, &mut visiting, &mut report)?;
        visiting.remove(&i);

        // 3. Place the record and everything below it
        self.place(&snapshot, i, &container, &mut visiting, &mut report)?;

        let moved = &snapshot.nodes[i].file;
        if let Some(file) = self.ws.store().get_file(&moved.path()) {
            entity.bind(file);
        }
        if !report.is_empty() {
            log::info!("synchronized {}: {} file(s) moved", moved.path().display(), report.moves.len());
        }
        Ok(report)
    }

    /// Returns the folder `i` owns, moving `i` into a new one when needed.
    fn ensure_owner_folder(
        &self,
        snapshot: &Snapshot,
        i: usize,
        visiting: &mut HashSet<usize>,
        report: &mut SyncReport,
    ) -> Result<PathBuf> {
        let node = &snapshot.nodes[i];
        if !visiting.insert(i) {
            return Err(FileClassError::HierarchyCycle(node.file.path()));
        }
        if let Some(folder) = owned_folder(&node.file) {
            visiting.remove(&i);
            return Ok(folder);
        }

        let base = match node.parent {
            Some(p) => self.ensure_owner_folder(snapshot, p, visiting, report)?,
            None => node
                .class
                .as_ref()
                .and_then(|c| c.parent_link.as_ref()?.folder.as_deref())
                .map(|f| normalize(Path::new(f)))
                .unwrap_or_else(|| node.file.parent_folder()),
        };
        let folder = base.join(node.file.base_name());
        self.relocate(&node.file, &folder, report)?;

        // Children left behind before the record owned a folder.
        for child in snapshot.children_of(i) {
            if !visiting.contains(&child) {
                self.place(snapshot, child, &folder, visiting, report)?;
            }
        }
        visiting.remove(&i);
        Ok(folder)
    }

    /// Puts `i` in `container` (or in its own folder there, when it has
    /// children) and recurses into its children.
    fn place(
        &self,
        snapshot: &Snapshot,
        i: usize,
        container: &Path,
        visiting: &mut HashSet<usize>,
        report: &mut SyncReport,
    ) -> Result<()> {
        let file = &snapshot.nodes[i].file;
        if !visiting.insert(i) {
            return Err(FileClassError::HierarchyCycle(file.path()));
        }
        let children = snapshot.children_of(i);
        let vacated = owned_folder(file);
        let folder = if children.is_empty() {
            container.to_path_buf()
        } else {
            container.join(file.base_name())
        };

        let moved = self.relocate(file, &folder, report)?;
        for child in children {
            self.place(snapshot, child, &folder, visiting, report)?;
        }
        if let Some(old) = vacated.filter(|_| moved) {
            self.ws.store().remove_folder_if_empty(&old)?;
        }
        visiting.remove(&i);
        Ok(())
    }

    fn relocate(&self, file: &FileHandle, folder: &Path, report: &mut SyncReport) -> Result<bool> {
        if file.parent_folder() == folder {
            return Ok(false);
        }
        let from = file.path();
        let to = file.move_to(self.ws.store(), folder, &file.name())?;
        log::debug!("hierarchy: {} -> {}", from.display(), to.display());
        report.moves.push(FileMove { from, to });
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    const LIEU: &str = r#"
className: Lieu
classIcon: map-pin
parent:
  property: parent
  folder: Lieux
properties:
  parent: { type: File, classes: [Lieu] }
  population: { type: Number }
"#;

    const TASK: &str = r#"
className: Task
classIcon: check
parent:
  property: parent
properties:
  parent: { type: File, classes: [Task] }
"#;

    const STEP: &str = r#"
className: Step
classIcon: list
parent:
  property: after
properties:
  after: { type: MultiFile, classes: [Step] }
"#;

    const PART: &str = r#"
className: Part
classIcon: cog
parent:
  property: assembly
properties:
  assembly:
    type: Object
    properties:
      of: { type: File, classes: [Part] }
      quantity: { type: Number }
"#;

    fn workspace() -> (Workspace, TempDir) {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("Classes")).unwrap();
        fs::write(dir.path().join("Classes/Lieu.yaml"), LIEU).unwrap();
        fs::write(dir.path().join("Classes/Task.yaml"), TASK).unwrap();
        fs::write(dir.path().join("Classes/Step.yaml"), STEP).unwrap();
        fs::write(dir.path().join("Classes/Part.yaml"), PART).unwrap();
        let ws = Workspace::open(dir.path()).unwrap();
        (ws, dir)
    }

    fn paths(dir: &TempDir) -> Vec<String> {
        fn walk(root: &Path, dir: &Path, out: &mut Vec<String>) {
            for entry in fs::read_dir(dir).unwrap() {
                let path = entry.unwrap().path();
                let name = path.file_name().unwrap().to_string_lossy().into_owned();
                if name.starts_with('.') || name == "Classes" {
                    continue;
                }
                if path.is_dir() {
                    walk(root, &path, out);
                } else {
                    out.push(path.strip_prefix(root).unwrap().to_string_lossy().replace('\\', "/"));
                }
            }
        }
        let mut out = Vec::new();
        walk(dir.path(), dir.path(), &mut out);
        out.sort();
        out
    }

    fn record(ws: &Workspace, path: &str, type_name: &str, parent: Option<&str>) -> Entity {
        let extra = parent.map(|p| format!("parent: '[[{p}]]'\n")).unwrap_or_default();
        record_with(ws, path, type_name, &extra)
    }

    fn record_with(ws: &Workspace, path: &str, type_name: &str, extra: &str) -> Entity {
        let file = ws
            .store()
            .create_file(Path::new(path), &format!("---\nfileClass: {type_name}\n{extra}---\n"))
            .unwrap();
        ws.entity_from(file, &ws.registry().load_type(type_name).unwrap())
    }

    fn child_paths(ws: &Workspace, path: &str) -> Vec<PathBuf> {
        let entity = ws.open_entity(Path::new(path)).unwrap();
        ws.find_children(&entity)
            .unwrap()
            .iter()
            .map(|e| e.path().unwrap())
            .collect()
    }

    #[test]
    fn test_lieu_scenario() {
        let (ws, dir) = workspace();
        record(&ws, "France.md", "Lieu", None);

        let mut idf = record(&ws, "Île-de-France.md", "Lieu", None);
        idf.set_property_value(&ws, "parent", json!("[[France]]")).unwrap();
        assert_eq!(paths(&dir), vec!["Lieux/France/France.md", "Lieux/France/Île-de-France.md"]);

        let mut paris = record(&ws, "Paris.md", "Lieu", None);
        paris.set_property_value(&ws, "parent", json!("[[Île-de-France]]")).unwrap();
        assert_eq!(
            paths(&dir),
            vec![
                "Lieux/France/France.md",
                "Lieux/France/Île-de-France/Paris.md",
                "Lieux/France/Île-de-France/Île-de-France.md",
            ]
        );
        assert_eq!(paris.path().unwrap(), PathBuf::from("Lieux/France/Île-de-France/Paris.md"));
        assert_eq!(idf.path().unwrap(), PathBuf::from("Lieux/France/Île-de-France/Île-de-France.md"));
    }

    #[test]
    fn test_synchronize_is_idempotent() {
        let (ws, _dir) = workspace();
        record(&ws, "A.md", "Task", None);
        let mut b = record(&ws, "B.md", "Task", Some("A"));
        let first = ws.synchronize(&mut b).unwrap();
        assert_eq!(first.moves.len(), 2);
        let second = ws.synchronize(&mut b).unwrap();
        assert!(second.is_empty());
    }

    #[test]
    fn test_no_parent_does_nothing() {
        let (ws, dir) = workspace();
        let mut a = record(&ws, "A.md", "Task", None);
        record(&ws, "B.md", "Task", Some("Missing"));
        assert!(ws.synchronize(&mut a).unwrap().is_empty());
        assert_eq!(paths(&dir), vec!["A.md", "B.md"]);
    }

    #[test]
    fn test_reparenting_moves_subtree_only() {
        let (ws, dir) = workspace();
        record(&ws, "A.md", "Task", None);
        let mut b = record(&ws, "B.md", "Task", Some("A"));
        let mut c = record(&ws, "C.md", "Task", Some("B"));
        record(&ws, "X.md", "Task", None);
        record(&ws, "Bystander.md", "Task", None);
        ws.synchronize(&mut b).unwrap();
        ws.synchronize(&mut c).unwrap();
        assert_eq!(paths(&dir), vec!["A/A.md", "A/B/B.md", "A/B/C.md", "Bystander.md", "X.md"]);

        b.set_property_value(&ws, "parent", json!("[[X]]")).unwrap();
        assert_eq!(paths(&dir), vec!["A/A.md", "Bystander.md", "X/B/B.md", "X/B/C.md", "X/X.md"]);
        assert!(!dir.path().join("A/B").exists());
        assert_eq!(c.path(), Some(PathBuf::from("X/B/C.md")));
    }

    #[test]
    fn test_leaf_leaves_vacated_folder() {
        let (ws, dir) = workspace();
        record(&ws, "A.md", "Task", None);
        record(&ws, "X.md", "Task", None);
        let mut b = record(&ws, "B.md", "Task", Some("A"));
        let mut c = record(&ws, "C.md", "Task", Some("B"));
        ws.synchronize(&mut b).unwrap();
        ws.synchronize(&mut c).unwrap();

        c.set_property_value(&ws, "parent", json!("[[X]]")).unwrap();
        let mut b = ws.open_entity(Path::new("A/B/B.md")).unwrap();
        ws.synchronize(&mut b).unwrap();
        assert_eq!(paths(&dir), vec!["A/A.md", "A/B.md", "X/C.md", "X/X.md"]);
    }

    #[test]
    fn test_cycle_is_reported() {
        let (ws, dir) = workspace();
        let mut a = record(&ws, "A.md", "Task", Some("B"));
        record(&ws, "B.md", "Task", Some("A"));
        assert!(matches!(ws.synchronize(&mut a), Err(FileClassError::HierarchyCycle(_))));
        assert_eq!(paths(&dir), vec!["A.md", "B.md"]);

        let mut selfish = record(&ws, "Self.md", "Task", Some("Self"));
        assert!(matches!(ws.synchronize(&mut selfish), Err(FileClassError::HierarchyCycle(_))));
    }

    #[test]
    fn test_folder_fallback_respects_explicit_parent() {
        let (ws, dir) = workspace();
        record(&ws, "Other.md", "Task", None);
        let a = record(&ws, "A/A.md", "Task", None);
        record(&ws, "A/Loose.md", "Task", None);
        record(&ws, "A/Linked.md", "Task", Some("Other"));
        fs::write(dir.path().join("A/Untyped.md"), "plain\n").unwrap();

        let children: Vec<String> = ws
            .find_children(&a)
            .unwrap()
            .iter()
            .map(|e| e.path().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(children, vec!["A/Loose.md"]);
    }

    #[test]
    fn test_folder_fallback_never_adopts_the_explicit_parent() {
        let (ws, dir) = workspace();
        let mut a = record(&ws, "A/A.md", "Task", None);
        record(&ws, "A/B.md", "Task", None);

        assert!(a.set_property_value(&ws, "parent", json!("[[B]]")).unwrap());
        assert_eq!(paths(&dir), vec!["A/B/A.md", "A/B/B.md"]);
        assert_eq!(a.path(), Some(PathBuf::from("A/B/A.md")));
        assert_eq!(child_paths(&ws, "A/B/B.md"), vec![PathBuf::from("A/B/A.md")]);
        assert!(child_paths(&ws, "A/B/A.md").is_empty());
        assert!(ws.synchronize(&mut a).unwrap().is_empty());
    }

    #[test]
    fn test_multi_link_parent_uses_first_entry() {
        let (ws, dir) = workspace();
        record(&ws, "Design.md", "Step", None);
        record(&ws, "Review.md", "Step", None);
        let mut build = record_with(&ws, "Build.md", "Step", "after: ['[[Design]]', '[[Review]]']\n");

        let report = ws.synchronize(&mut build).unwrap();
        assert_eq!(report.moves.len(), 2);
        assert_eq!(paths(&dir), vec!["Design/Build.md", "Design/Design.md", "Review.md"]);
        assert_eq!(child_paths(&ws, "Design/Design.md"), vec![PathBuf::from("Design/Build.md")]);
        assert!(child_paths(&ws, "Review.md").is_empty());
    }

    #[test]
    fn test_object_held_parent_link() {
        let (ws, dir) = workspace();
        record(&ws, "Engine.md", "Part", None);
        let mut piston = record_with(&ws, "Piston.md", "Part", "assembly:\n  of: '[[Engine]]'\n  quantity: 4\n");

        ws.synchronize(&mut piston).unwrap();
        assert_eq!(paths(&dir), vec!["Engine/Engine.md", "Engine/Piston.md"]);
        assert_eq!(piston.path(), Some(PathBuf::from("Engine/Piston.md")));
        assert_eq!(child_paths(&ws, "Engine/Engine.md"), vec![PathBuf::from("Engine/Piston.md")]);
        assert!(ws.synchronize(&mut piston).unwrap().is_empty());
    }

    #[test]
    fn test_invariants_hold_after_sync() {
        let (ws, _dir) = workspace();
        record(&ws, "Root.md", "Task", None);
        let mut kids: Vec<Entity> = ["One", "Two", "Three"]
            .iter()
            .map(|n| record(&ws, &format!("{n}.md"), "Task", Some("Root")))
            .collect();
        let mut leaf = record(&ws, "Leaf.md", "Task", Some("Two"));
        for kid in &mut kids {
            ws.synchronize(kid).unwrap();
        }
        ws.synchronize(&mut leaf).unwrap();

        for file in ws.store().list_files() {
            let entity = ws.entity_for_file(Arc::clone(&file)).unwrap();
            let has_children = !ws.find_children(&entity).unwrap().is_empty();
            assert_eq!(owned_folder(&file).is_some(), has_children, "{:?}", file.path());
            if let Some(parent) = entity.resolve_parent(&ws).unwrap() {
                let parent_dir = owned_folder(parent.file().unwrap()).unwrap();
                assert!(is_inside(&file, &parent_dir), "{:?}", file.path());
            }
        }
    }
}
