//! Entities: a typed view over one record.
//!
//! An [`Entity`] pairs a [`FileClass`] with the [`FileHandle`] it describes.
//! Reads go straight to the file's front matter; writes take the file's
//! mutation lock, and writing the parent-link field re-runs hierarchy
//! synchronization once the write has landed.

use crate::core::field::{FieldDescriptor, FieldKind};
use crate::core::file::FileHandle;
use crate::core::file_class::FileClass;
use crate::core::frontmatter::Metadata;
use crate::core::link::LinkToken;
use crate::core::store::Store;
use crate::core::workspace::Workspace;
use crate::{FileClassError, Result};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;

/// Builds entities of one type. Cached per type by the registry.
#[derive(Debug)]
pub struct EntityConstructor {
    class: Arc<FileClass>,
}

impl EntityConstructor {
    pub fn new(class: Arc<FileClass>) -> Self {
        Self { class }
    }

    pub fn class(&self) -> &Arc<FileClass> {
        &self.class
    }

    /// Creates an entity, optionally bound to `file`.
    ///
    /// Every entity gets its own copy of the field descriptors.
    pub fn construct(&self, file: Option<Arc<FileHandle>>) -> Entity {
        Entity {
            class: Arc::clone(&self.class),
            file,
            fields: self.class.fields.clone(),
        }
    }
}

/// A record seen through its type.
#[derive(Debug, Clone)]
pub struct Entity {
    class: Arc<FileClass>,
    file: Option<Arc<FileHandle>>,
    fields: Vec<FieldDescriptor>,
}

impl Entity {
    pub fn type_name(&self) -> &str {
        &self.class.type_name
    }

    pub fn class(&self) -> &Arc<FileClass> {
        &self.class
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn file(&self) -> Option<&Arc<FileHandle>> {
        self.file.as_ref()
    }

    /// Current vault path of the bound file.
    pub fn path(&self) -> Option<PathBuf> {
        self.file.as_ref().map(|f| f.path())
    }

    pub fn bind(&mut self, file: Arc<FileHandle>) {
        self.file = Some(file);
    }

    pub(crate) fn bound(&self) -> Result<&Arc<FileHandle>> {
        self.file
            .as_ref()
            .ok_or_else(|| FileClassError::UnboundEntity(self.class.type_name.clone()))
    }

    fn require_field(&self, name: &str) -> Result<&FieldDescriptor> {
        self.field(name).ok_or_else(|| FileClassError::UnknownField {
            type_name: self.class.type_name.clone(),
            field: name.to_string(),
        })
    }

    fn is_parent_field(&self, name: &str) -> bool {
        self.class
            .parent_link
            .as_ref()
            .is_some_and(|link| link.field_name == name)
    }

    /// Front matter of the bound file.
    pub fn metadata(&self, store: &dyn Store) -> Result<Metadata> {
        self.bound()?.metadata(store)
    }

    /// Stored value of `name`, as found in front matter.
    pub fn get_property_value(&self, store: &dyn Store, name: &str) -> Result<Option<Value>> {
        self.require_field(name)?;
        let metadata = self.metadata(store)?;
        Ok(metadata.get(name).filter(|v| !v.is_null()).cloned())
    }

    /// Validates `value` and writes it to the bound file.
    ///
    /// A value the field rejects is logged and not written; the method then
    /// returns `Ok(false)`. A null value clears the key. Writing the
    /// parent-link field with a new value re-synchronizes the hierarchy.
    ///
    /// # Errors
    ///
    /// Returns [`FileClassError::UnknownField`] or
    /// [`FileClassError::StaticField`] before touching the file, and
    /// [`FileClassError::LockTimeout`] if the file stays busy.
    pub fn set_property_value(&mut self, ws: &Workspace, name: &str, value: Value) -> Result<bool> {
        let field = self.require_field(name)?;
        if field.is_static {
            return Err(FileClassError::StaticField(name.to_string()));
        }
        let stored = if value.is_null() {
            Value::Null
        } else {
            match field.validate(&value) {
                Some(v) => v,
                None => {
                    log::warn!("{}.{}: rejected value {}", self.class.type_name, name, value);
                    return Ok(false);
                }
            }
        };

        let file = Arc::clone(self.bound()?);
        let previous = file.update_metadata(ws.store(), name, stored.clone())?;
        let changed = previous.unwrap_or(Value::Null) != stored;

        if changed && self.is_parent_field(name) {
            ws.synchronize(self)?;
        }
        Ok(true)
    }

    /// Returns `true` iff every field accepts its current stored value.
    pub fn validate(&self, store: &dyn Store) -> Result<bool> {
        let metadata = self.metadata(store)?;
        Ok(self
            .fields
            .iter()
            .all(|f| f.validate(metadata.get(&f.name).unwrap_or(&Value::Null)).is_some()))
    }

    /// Value of a formula field computed from the current metadata.
    ///
    /// Evaluation errors are logged and yield `None`, as do results that are
    /// not a non-empty scalar. Non-formula fields return their validated
    /// stored value.
    pub fn computed_value(&self, ws: &Workspace, name: &str) -> Result<Option<Value>> {
        let field = self.require_field(name)?;
        let metadata = self.metadata(ws.store())?;
        Ok(self.compute(ws, field, &metadata))
    }

    fn compute(&self, ws: &Workspace, field: &FieldDescriptor, metadata: &Metadata) -> Option<Value> {
        match &field.kind {
            FieldKind::Formula { expression } if expression.trim().is_empty() => None,
            FieldKind::Formula { expression } => match ws.formulas().evaluate(expression, metadata) {
                Ok(v) => field.validate(&v),
                Err(e) => {
                    log::warn!("{}.{}: {e}", self.class.type_name, field.name);
                    None
                }
            },
            _ => field.validate(metadata.get(&field.name).unwrap_or(&Value::Null)),
        }
    }

    /// Normalizes every stored value and recomputes formulas, writing the
    /// front matter back only when something changed.
    ///
    /// Values a field rejects are stored as null. Returns whether a write
    /// happened.
    pub fn update_all_properties_metadata(&mut self, ws: &Workspace) -> Result<bool> {
        let file = Arc::clone(self.bound()?);
        let current = file.metadata(ws.store())?;
        let mut updated = current.clone();

        for field in &self.fields {
            let stored = current.get(&field.name);
            if let FieldKind::Formula { .. } = field.kind {
                if let Some(v) = self.compute(ws, field, &current) {
                    updated.insert(field.name.clone(), v);
                }
                continue;
            }
            let Some(stored) = stored else { continue };
            let normalized = field.validate(stored);
            if normalized.is_none() && !stored.is_null() {
                log::warn!("{}.{}: clearing invalid value {}", self.class.type_name, field.name, stored);
            }
            updated.insert(field.name.clone(), FieldDescriptor::serialize_for_storage(normalized));
        }

        if updated == current {
            return Ok(false);
        }
        ws.update_metadata(&file, &updated)?;
        Ok(true)
    }

    /// Writes the default of every declared field that has no stored value.
    ///
    /// Returns whether anything was written.
    pub fn apply_defaults(&mut self, ws: &Workspace) -> Result<bool> {
        let file = Arc::clone(self.bound()?);
        let current = file.metadata(ws.store())?;
        let mut updated = current.clone();
        for (key, value) in self.class.default_metadata(&ws.settings().user_name) {
            if current.get(&key).map_or(true, Value::is_null) {
                updated.insert(key, value);
            }
        }
        if updated == current {
            return Ok(false);
        }
        ws.update_metadata(&file, &updated)?;
        Ok(true)
    }

    /// The link stored in the parent-link field, if any.
    pub fn parent_link_value(&self, store: &dyn Store) -> Result<Option<LinkToken>> {
        let Some(field) = self.class.parent_field() else {
            return Ok(None);
        };
        let metadata = self.metadata(store)?;
        Ok(metadata.get(&field.name).and_then(|v| field.reference_link(v)))
    }

    /// The entity the parent-link field points to.
    ///
    /// Unresolvable links and untyped targets count as no parent.
    pub fn resolve_parent(&self, ws: &Workspace) -> Result<Option<Entity>> {
        let Some(link) = self.parent_link_value(ws.store())? else {
            return Ok(None);
        };
        ws.resolve_link(&link, self.path().as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    const CONTACT: &str = r#"
className: Contact
classIcon: user
properties:
  email: { type: Input }
  age: { type: Number }
  status: { type: Select, options: [lead, client] }
  owner: { type: Input, defaultValue: $me }
  label: { type: Formula, formula: 'email + " (" + status + ")"' }
  broken: { type: Formula, formula: 'nope(' }
  employer: { type: File, classes: Company }
  created: { type: Input, static: true }
"#;

    fn workspace() -> (Workspace, TempDir) {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("Classes")).unwrap();
        fs::write(dir.path().join("Classes/Contact.yaml"), CONTACT).unwrap();
        let ws = Workspace::open(dir.path()).unwrap();
        (ws, dir)
    }

    fn contact(ws: &Workspace, name: &str, front: &str) -> Entity {
        let file = ws
            .store()
            .create_file(Path::new(name), &format!("---\nfileClass: Contact\n{front}---\n"))
            .unwrap();
        ws.entity_for_file(file).unwrap()
    }

    #[test]
    fn test_get_and_set_property() {
        let (ws, _dir) = workspace();
        let mut e = contact(&ws, "Ada.md", "");
        assert!(e.set_property_value(&ws, "age", json!("36")).unwrap());
        assert_eq!(e.get_property_value(ws.store(), "age").unwrap(), Some(json!(36)));
        assert_eq!(e.get_property_value(ws.store(), "email").unwrap(), None);
    }

    #[test]
    fn test_invalid_value_is_not_written() {
        let (ws, _dir) = workspace();
        let mut e = contact(&ws, "Ada.md", "status: lead\n");
        assert!(!e.set_property_value(&ws, "status", json!("stranger")).unwrap());
        assert_eq!(e.get_property_value(ws.store(), "status").unwrap(), Some(json!("lead")));
    }

    #[test]
    fn test_static_and_unknown_fields_are_refused() {
        let (ws, _dir) = workspace();
        let mut e = contact(&ws, "Ada.md", "");
        assert!(matches!(
            e.set_property_value(&ws, "created", json!("x")),
            Err(FileClassError::StaticField(_))
        ));
        assert!(matches!(
            e.set_property_value(&ws, "label", json!("x")),
            Err(FileClassError::StaticField(_))
        ));
        assert!(matches!(
            e.set_property_value(&ws, "missing", json!(1)),
            Err(FileClassError::UnknownField { .. })
        ));
    }

    #[test]
    fn test_unbound_entity() {
        let (ws, _dir) = workspace();
        let ctor = ws.registry().get_or_create_entity_constructor("Contact").unwrap();
        let e = ctor.construct(None);
        assert!(matches!(e.metadata(ws.store()), Err(FileClassError::UnboundEntity(_))));
    }

    #[test]
    fn test_computed_value_and_errors() {
        let (ws, _dir) = workspace();
        let e = contact(&ws, "Ada.md", "email: ada@example.org\nstatus: client\n");
        assert_eq!(
            e.computed_value(&ws, "label").unwrap(),
            Some(json!("ada@example.org (client)"))
        );
        assert_eq!(e.computed_value(&ws, "broken").unwrap(), None);
    }

    #[test]
    fn test_update_all_properties_metadata_writes_only_on_change() {
        let (ws, dir) = workspace();
        let mut e = contact(&ws, "Ada.md", "email: ada@example.org\nstatus: client\nage: '36'\n");
        assert!(e.update_all_properties_metadata(&ws).unwrap());
        let md = e.metadata(ws.store()).unwrap();
        assert_eq!(md.get("age"), Some(&json!(36)));
        assert_eq!(md.get("label"), Some(&json!("ada@example.org (client)")));
        assert!(!md.contains_key("broken"));

        let before = fs::read_to_string(dir.path().join("Ada.md")).unwrap();
        assert!(!e.update_all_properties_metadata(&ws).unwrap());
        assert_eq!(fs::read_to_string(dir.path().join("Ada.md")).unwrap(), before);
    }

    #[test]
    fn test_validate_reflects_every_field() {
        let (ws, _dir) = workspace();
        let e = contact(&ws, "Ada.md", "email: a\n");
        assert!(!e.validate(ws.store()).unwrap());
    }

    #[test]
    fn test_apply_defaults_fills_only_missing_values() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("Classes")).unwrap();
        fs::write(dir.path().join("Classes/Contact.yaml"), CONTACT).unwrap();
        crate::Settings { user_name: "Grace".into(), ..Default::default() }
            .save(dir.path())
            .unwrap();
        let ws = Workspace::open(dir.path()).unwrap();

        let mut fresh = contact(&ws, "Fresh.md", "");
        assert!(fresh.apply_defaults(&ws).unwrap());
        assert_eq!(fresh.get_property_value(ws.store(), "owner").unwrap(), Some(json!("Grace")));

        let mut set = contact(&ws, "Set.md", "owner: Linus\n");
        assert!(!set.apply_defaults(&ws).unwrap());
    }

    #[test]
    fn test_parent_link_value_without_parent_field() {
        let (ws, _dir) = workspace();
        let e = contact(&ws, "Ada.md", "employer: '[[Acme]]'\n");
        assert_eq!(e.parent_link_value(ws.store()).unwrap(), None);
        assert!(e.resolve_parent(&ws).unwrap().is_none());
    }
}
