//! High-level operations over a vault of typed Markdown records.

use crate::core::entity::{Entity, EntityConstructor};
use crate::core::file::FileHandle;
use crate::core::file_class::FileClass;
use crate::core::frontmatter::{self, Metadata};
use crate::core::hierarchy::{Hierarchy, SyncReport};
use crate::core::link::LinkToken;
use crate::core::store::Store;
use crate::{FileClassError, FormulaEngine, FsStore, Result, Settings, TypeRegistry};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// An open vault.
///
/// `Workspace` is the primary interface for record mutations. It combines a
/// [`Store`] holding the files, a [`TypeRegistry`] resolving each record's
/// type, the vault [`Settings`] and a [`FormulaEngine`] for computed fields.
///
/// A workspace is `Send + Sync`; concurrent writers to the same file are
/// serialized by that file's lock.
pub struct Workspace {
    store: Arc<dyn Store>,
    registry: TypeRegistry,
    settings: Settings,
    formulas: FormulaEngine,
}

impl Workspace {
    /// Opens the vault rooted at `root`, creating the directory when missing.
    ///
    /// Settings are read from `<root>/.fileclass/settings.json` and type
    /// documents from `<root>/<typesFolder>`.
    ///
    /// # Errors
    ///
    /// Returns [`FileClassError::Io`] if the vault directory cannot be created.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref();
        let settings = Settings::load(root);
        let store = FsStore::open(root, settings.lock_timeout())?;
        let types_dir = root.join(&settings.types_folder);
        log::info!("opened vault {} (types in {})", root.display(), types_dir.display());
        Ok(Self::with_store(Arc::new(store), types_dir, settings))
    }

    /// Builds a workspace over a caller-supplied store.
    pub fn with_store<P: Into<PathBuf>>(store: Arc<dyn Store>, types_dir: P, settings: Settings) -> Self {
        Self {
            store,
            registry: TypeRegistry::new(types_dir),
            settings,
            formulas: FormulaEngine::new(),
        }
    }

    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn formulas(&self) -> &FormulaEngine {
        &self.formulas
    }

    /// Names of every type with a configuration document.
    pub fn list_types(&self) -> Result<Vec<String>> {
        self.registry.available_type_names()
    }

    /// Forgets every parsed type so the next access re-reads the documents.
    pub fn reload_types(&self) {
        self.registry.clear_cache();
    }

    /// Type named by the class key of `metadata`. A list names its first type.
    pub fn type_name_of(&self, metadata: &Metadata) -> Option<String> {
        let value = metadata.get(&self.settings.class_key)?;
        let name = match value {
            Value::String(s) => s.as_str(),
            Value::Array(items) => items.first()?.as_str()?,
            _ => return None,
        };
        let name = name.trim();
        (!name.is_empty()).then(|| name.to_string())
    }

    /// Type of the record at `path`, logging configuration problems.
    pub(crate) fn class_for(&self, metadata: &Metadata, path: &Path) -> Option<Arc<FileClass>> {
        let type_name = self.type_name_of(metadata)?;
        match self.registry.load_type(&type_name) {
            Ok(class) => Some(class),
            Err(e) => {
                log::warn!("{}: {e}", path.display());
                None
            }
        }
    }

    pub(crate) fn entity_from(&self, file: Arc<FileHandle>, class: &Arc<FileClass>) -> Entity {
        EntityConstructor::new(Arc::clone(class)).construct(Some(file))
    }

    /// Entity for an existing file, typed by its class key.
    ///
    /// # Errors
    ///
    /// Returns [`FileClassError::Untyped`] when the file names no type and
    /// [`FileClassError::ConfigurationNotFound`] when its type has no document.
    pub fn entity_for_file(&self, file: Arc<FileHandle>) -> Result<Entity> {
        let metadata = file.metadata(self.store())?;
        let type_name = self
            .type_name_of(&metadata)
            .ok_or_else(|| FileClassError::Untyped(file.path()))?;
        let ctor = self.registry.get_or_create_entity_constructor(&type_name)?;
        Ok(ctor.construct(Some(file)))
    }

    /// Entity for the record at vault path `path`.
    pub fn open_entity(&self, path: &Path) -> Result<Entity> {
        let file = self
            .store
            .get_file(path)
            .ok_or_else(|| FileClassError::FileNotFound(path.to_path_buf()))?;
        self.entity_for_file(file)
    }

    /// Every record of type `type_name`, in path order.
    pub fn list_entities(&self, type_name: &str) -> Result<Vec<Entity>> {
        let ctor = self.registry.get_or_create_entity_constructor(type_name)?;
        let mut entities = Vec::new();
        for file in self.store.list_files() {
            let metadata = match file.metadata(self.store()) {
                Ok(m) => m,
                Err(e) => {
                    log::warn!("skipping {}: {e}", file.path().display());
                    continue;
                }
            };
            if self.type_name_of(&metadata).as_deref() == Some(type_name) {
                entities.push(ctor.construct(Some(file)));
            }
        }
        Ok(entities)
    }

    /// Creates a record of `type_name` named `name` in `folder`.
    ///
    /// The front matter holds the class key, every declared default and the
    /// validated `values`; values a field rejects are logged and dropped,
    /// undeclared keys are kept as given. When the parent link is set, the
    /// hierarchy is synchronized before the entity is returned.
    ///
    /// # Errors
    ///
    /// Returns [`FileClassError::ConfigurationNotFound`] for an unknown type and
    /// [`FileClassError::FileExists`] if the target path is taken.
    pub fn create_entity(&self, type_name: &str, folder: &Path, name: &str, values: Metadata) -> Result<Entity> {
        let ctor = self.registry.get_or_create_entity_constructor(type_name)?;
        let class = Arc::clone(ctor.class());

        let mut metadata = Metadata::new();
        metadata.insert(self.settings.class_key.clone(), Value::String(type_name.to_string()));
        metadata.extend(class.default_metadata(&self.settings.user_name));
        for (key, value) in values {
            match class.field(&key) {
                Some(field) => match field.validate(&value) {
                    Some(v) => {
                        metadata.insert(key, v);
                    }
                    None => log::warn!("{type_name}.{key}: rejected value {value}"),
                },
                None => {
                    metadata.insert(key, value);
                }
            }
        }

        let file_name = if name.ends_with(".md") { name.to_string() } else { format!("{name}.md") };
        let path = folder.join(file_name);
        let file = self.store.create_file(&path, &frontmatter::compose(&metadata, "")?)?;
        log::info!("created {type_name} record {}", path.display());

        let mut entity = ctor.construct(Some(file));
        let has_parent = class
            .parent_field()
            .is_some_and(|f| metadata.get(&f.name).is_some_and(|v| !v.is_null()));
        if has_parent {
            self.synchronize(&mut entity)?;
        }
        Ok(entity)
    }

    /// Replaces the front matter of `file`.
    ///
    /// If the record's parent link differs from the stored one, the
    /// hierarchy is synchronized after the write.
    pub fn update_metadata(&self, file: &Arc<FileHandle>, metadata: &Metadata) -> Result<()> {
        let previous = file.write_metadata(self.store(), metadata)?;
        let path = file.path();
        let Some(class) = self.class_for(metadata, &path) else {
            return Ok(());
        };
        let Some(field) = class.parent_field() else {
            return Ok(());
        };
        if previous.get(&field.name) != metadata.get(&field.name) {
            log::debug!("{}: parent link changed", path.display());
            let mut entity = self.entity_from(Arc::clone(file), &class);
            self.synchronize(&mut entity)?;
        }
        Ok(())
    }

    /// Entity a link points to. Unresolvable links and untyped targets give `None`.
    pub fn resolve_link(&self, link: &LinkToken, source: Option<&Path>) -> Result<Option<Entity>> {
        let Some(file) = self.store.resolve_link(link, source) else {
            return Ok(None);
        };
        let metadata = file.metadata(self.store())?;
        let path = file.path();
        Ok(self
            .class_for(&metadata, &path)
            .map(|class| self.entity_from(file, &class)))
    }

    /// Moves `entity` and its subtree to match its parent link.
    pub fn synchronize(&self, entity: &mut Entity) -> Result<SyncReport> {
        Hierarchy::new(self).synchronize(entity)
    }

    /// Typed records whose parent is `entity`.
    pub fn find_children(&self, entity: &Entity) -> Result<Vec<Entity>> {
        Hierarchy::new(self).find_children(entity)
    }
}
