//! Type registry: loads file classes from their configuration documents and
//! hands out cached entity constructors.
//!
//! Both caches are keyed by type name and dropped together by
//! [`TypeRegistry::clear_cache`]. Entities built before a reset keep their own
//! `Arc` to the old definition and are unaffected.

use crate::core::entity::EntityConstructor;
use crate::core::field::{FieldDescriptor, FieldSpec};
use crate::core::file_class::FileClass;
use crate::{FileClassError, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Extensions tried, in order, when locating a type's document.
const DOCUMENT_EXTENSIONS: [&str; 3] = ["yaml", "yml", "md"];

pub struct TypeRegistry {
    types_dir: PathBuf,
    definitions: Mutex<HashMap<String, Arc<FileClass>>>,
    constructors: Mutex<HashMap<String, Arc<EntityConstructor>>>,
    parses: AtomicUsize,
}

impl TypeRegistry {
    /// Creates a registry reading type documents from `types_dir`.
    pub fn new<P: Into<PathBuf>>(types_dir: P) -> Self {
        Self {
            types_dir: types_dir.into(),
            definitions: Mutex::new(HashMap::new()),
            constructors: Mutex::new(HashMap::new()),
            parses: AtomicUsize::new(0),
        }
    }

    pub fn types_dir(&self) -> &Path {
        &self.types_dir
    }

    /// Builds the descriptor for one raw field declaration.
    ///
    /// Unknown kinds become text fields; `Object` kinds recurse.
    pub fn create_field(spec: &FieldSpec) -> FieldDescriptor {
        FieldDescriptor::from_spec(spec)
    }

    /// Returns the definition of `type_name`, parsing its document on first use.
    ///
    /// # Errors
    ///
    /// Returns [`FileClassError::ConfigurationNotFound`] if no readable,
    /// well-formed document exists for the type, or
    /// [`FileClassError::InvalidConfiguration`] if it declares an invalid
    /// parent link.
    pub fn load_type(&self, type_name: &str) -> Result<Arc<FileClass>> {
        if let Some(class) = self.definitions.lock().get(type_name) {
            return Ok(Arc::clone(class));
        }

        let path = self.locate(type_name).ok_or_else(|| FileClassError::ConfigurationNotFound {
            type_name: type_name.to_string(),
            reason: format!("no document in {}", self.types_dir.display()),
        })?;
        let source = fs::read_to_string(&path).map_err(|e| FileClassError::ConfigurationNotFound {
            type_name: type_name.to_string(),
            reason: format!("{}: {e}", path.display()),
        })?;

        self.parses.fetch_add(1, Ordering::Relaxed);
        let class = Arc::new(FileClass::parse(type_name, &source, Self::create_field)?);
        log::debug!("loaded type '{type_name}' from {} ({} fields)", path.display(), class.fields.len());

        self.definitions
            .lock()
            .insert(type_name.to_string(), Arc::clone(&class));
        Ok(class)
    }

    /// Returns the constructor for `type_name`, building and caching it on first use.
    ///
    /// Repeated calls return the same `Arc` until [`clear_cache`](Self::clear_cache).
    pub fn get_or_create_entity_constructor(&self, type_name: &str) -> Result<Arc<EntityConstructor>> {
        if let Some(ctor) = self.constructors.lock().get(type_name) {
            return Ok(Arc::clone(ctor));
        }
        let class = self.load_type(type_name)?;
        let ctor = Arc::new(EntityConstructor::new(class));
        self.constructors
            .lock()
            .insert(type_name.to_string(), Arc::clone(&ctor));
        Ok(ctor)
    }

    /// Drops every cached definition and constructor.
    pub fn clear_cache(&self) {
        self.definitions.lock().clear();
        self.constructors.lock().clear();
        log::debug!("type caches cleared");
    }

    /// Names of every type with a document in the types folder, sorted.
    pub fn available_type_names(&self) -> Result<Vec<String>> {
        if !self.types_dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.types_dir)? {
            let path = entry?.path();
            let known = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| DOCUMENT_EXTENSIONS.contains(&e));
            if !known || !path.is_file() {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if !stem.starts_with('.') {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        names.dedup();
        Ok(names)
    }

    /// Number of configuration documents parsed so far.
    pub fn parse_count(&self) -> usize {
        self.parses.load(Ordering::Relaxed)
    }

    fn locate(&self, type_name: &str) -> Option<PathBuf> {
        if type_name.is_empty() || type_name.contains(['/', '\\']) || type_name.starts_with('.') {
            return None;
        }
        DOCUMENT_EXTENSIONS
            .iter()
            .map(|ext| self.types_dir.join(format!("{type_name}.{ext}")))
            .find(|p| p.is_file())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn registry_with(docs: &[(&str, &str)]) -> (TypeRegistry, TempDir) {
        let dir = TempDir::new().unwrap();
        for (name, body) in docs {
            fs::write(dir.path().join(name), body).unwrap();
        }
        (TypeRegistry::new(dir.path()), dir)
    }

    const CONTACT: &str = "className: Contact\nclassIcon: user\nproperties:\n  email: { type: Input }\n  employer: { type: File, classes: Company }\n";

    #[test]
    fn test_load_type_is_cached() {
        let (registry, _dir) = registry_with(&[("Contact.yaml", CONTACT)]);
        let a = registry.load_type("Contact").unwrap();
        let b = registry.load_type("Contact").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.parse_count(), 1);
    }

    #[test]
    fn test_missing_type_names_the_type() {
        let (registry, _dir) = registry_with(&[]);
        match registry.load_type("Ghost") {
            Err(FileClassError::ConfigurationNotFound { type_name, .. }) => assert_eq!(type_name, "Ghost"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(registry.load_type("../etc/passwd").is_err());
    }

    #[test]
    fn test_constructor_cache_and_clear() {
        let (registry, _dir) = registry_with(&[("Contact.yaml", CONTACT)]);
        let first = registry.get_or_create_entity_constructor("Contact").unwrap();
        let second = registry.get_or_create_entity_constructor("Contact").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.parse_count(), 1);

        let before = first.construct(None);
        registry.clear_cache();
        let third = registry.get_or_create_entity_constructor("Contact").unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(registry.parse_count(), 2);
        assert_eq!(before.type_name(), "Contact");
        assert_eq!(before.fields().len(), 2);
    }

    #[test]
    fn test_constructed_entities_do_not_share_descriptors() {
        let (registry, _dir) = registry_with(&[("Contact.yaml", CONTACT)]);
        let ctor = registry.get_or_create_entity_constructor("Contact").unwrap();
        let a = ctor.construct(None);
        let b = ctor.construct(None);
        assert_eq!(a.fields(), b.fields());
        assert!(!std::ptr::eq(a.fields().as_ptr(), b.fields().as_ptr()));
    }

    #[test]
    fn test_available_type_names() {
        let (registry, _dir) = registry_with(&[
            ("Contact.yaml", CONTACT),
            ("Project.md", "---\nclassName: Project\nclassIcon: box\n---\n"),
            ("notes.txt", "ignored"),
        ]);
        assert_eq!(registry.available_type_names().unwrap(), vec!["Contact", "Project"]);
        assert_eq!(registry.load_type("Project").unwrap().type_name, "Project");
    }
}
