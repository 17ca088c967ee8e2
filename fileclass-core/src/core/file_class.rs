//! Entity type definitions ("file classes") parsed from configuration documents.

use crate::core::field::{normalize_properties, FieldDescriptor, FieldKind};
use crate::core::frontmatter::{self, Metadata};
use crate::{FileClassError, Result};
use serde::Deserialize;
use serde_json::Value;

/// Raw shape of a type's configuration document.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClassDocument {
    #[serde(default)]
    class_name: Option<String>,
    #[serde(default)]
    class_icon: Option<String>,
    #[serde(default, alias = "fields")]
    properties: Option<Value>,
    #[serde(default)]
    parent: Option<ParentDeclaration>,
    #[serde(default)]
    display: Option<Value>,
    #[serde(default)]
    populate: Option<Value>,
    #[serde(default)]
    data: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
struct ParentDeclaration {
    property: String,
    #[serde(default)]
    folder: Option<String>,
}

/// Which field links a record to its parent, and where hierarchies of this type live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentLink {
    pub field_name: String,
    /// Folder under which parentless owners get their dedicated folder.
    pub folder: Option<String>,
}

/// A parsed entity type: its fields in declaration order plus an optional parent link.
#[derive(Debug, Clone)]
pub struct FileClass {
    pub type_name: String,
    pub icon: Option<String>,
    pub fields: Vec<FieldDescriptor>,
    pub parent_link: Option<ParentLink>,
    /// Rendering hints (`display.containers`, …); not interpreted here.
    pub display: Option<Value>,
    /// Interactive population prompts; not interpreted here.
    pub populate: Option<Value>,
    /// Bulk pre-population sources; not interpreted here.
    pub data: Option<Value>,
}

impl FileClass {
    /// Parses a configuration document.
    ///
    /// `source` is either a YAML document or a Markdown file whose front
    /// matter holds the declaration. Field declarations are turned into
    /// descriptors with `create_field`.
    ///
    /// # Errors
    ///
    /// Returns [`FileClassError::ConfigurationNotFound`] when the document is
    /// malformed or lacks `className` / `classIcon`, and
    /// [`FileClassError::InvalidConfiguration`] when the parent link does not
    /// name a reference field.
    pub fn parse(
        type_name: &str,
        source: &str,
        create_field: impl Fn(&crate::core::field::FieldSpec) -> FieldDescriptor,
    ) -> Result<Self> {
        let not_found = |reason: String| FileClassError::ConfigurationNotFound {
            type_name: type_name.to_string(),
            reason,
        };

        let raw: Value = if source.trim_start().starts_with("---") {
            let (metadata, _) = frontmatter::split(source).map_err(|e| not_found(e.to_string()))?;
            Value::Object(metadata)
        } else {
            serde_yaml::from_str(source).map_err(|e| not_found(e.to_string()))?
        };
        let doc: ClassDocument = serde_json::from_value(raw).map_err(|e| not_found(e.to_string()))?;

        let class_name = doc
            .class_name
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| not_found("missing 'className'".to_string()))?;
        if class_name != type_name {
            log::warn!("type document '{type_name}' declares className '{class_name}'; using '{type_name}'");
        }
        let icon = doc
            .class_icon
            .ok_or_else(|| not_found("missing 'classIcon'".to_string()))?;

        let mut fields: Vec<FieldDescriptor> = Vec::new();
        for spec in normalize_properties(doc.properties.as_ref()) {
            if fields.iter().any(|f| f.name == spec.name) {
                log::warn!("type '{type_name}': duplicate field '{}' ignored", spec.name);
                continue;
            }
            fields.push(create_field(&spec));
        }

        let parent_link = doc.parent.map(|p| ParentLink {
            field_name: p.property,
            folder: p.folder.map(|f| f.trim_matches('/').to_string()).filter(|f| !f.is_empty()),
        });

        let class = Self {
            type_name: type_name.to_string(),
            icon: Some(icon).filter(|i| !i.is_empty()),
            fields,
            parent_link,
            display: doc.display,
            populate: doc.populate,
            data: doc.data,
        };
        class.check_parent_link()?;
        Ok(class)
    }

    fn check_parent_link(&self) -> Result<()> {
        let Some(link) = &self.parent_link else {
            return Ok(());
        };
        match self.field(&link.field_name) {
            Some(f) if f.is_reference() => Ok(()),
            Some(FieldDescriptor { kind: FieldKind::Object { fields }, .. })
                if fields.iter().any(FieldDescriptor::is_reference) =>
            {
                Ok(())
            }
            Some(f) => Err(FileClassError::InvalidConfiguration {
                type_name: self.type_name.clone(),
                reason: format!(
                    "parent property '{}' is a {} field, expected File, MultiFile or an Object holding one",
                    link.field_name,
                    f.kind.tag()
                ),
            }),
            None => Err(FileClassError::InvalidConfiguration {
                type_name: self.type_name.clone(),
                reason: format!("parent property '{}' is not declared", link.field_name),
            }),
        }
    }

    /// Looks up a field by metadata key.
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// The field holding the parent reference, if this type declares one.
    pub fn parent_field(&self) -> Option<&FieldDescriptor> {
        self.field(&self.parent_link.as_ref()?.field_name)
    }

    /// Resolved defaults for every field that declares one.
    pub fn default_metadata(&self, user_name: &str) -> Metadata {
        let mut metadata = Metadata::new();
        for field in &self.fields {
            if matches!(field.kind, FieldKind::Formula { .. }) {
                continue;
            }
            if let Some(value) = field.resolve_default(user_name) {
                metadata.insert(field.name.clone(), value);
            }
        }
        metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const LIEU: &str = r#"
className: Lieu
classIcon: map-pin
parent:
  property: parent
  folder: Lieux/
properties:
  parent:
    type: File
    classes: [Lieu]
  population:
    type: Number
    unit: hab
  kind:
    type: Select
    options: [city, region, country]
    defaultValue: city
"#;

    fn parse(source: &str) -> Result<FileClass> {
        FileClass::parse("Lieu", source, FieldDescriptor::from_spec)
    }

    #[test]
    fn test_parse_yaml_document() {
        let class = parse(LIEU).unwrap();
        assert_eq!(class.type_name, "Lieu");
        assert_eq!(class.icon.as_deref(), Some("map-pin"));
        let names: Vec<&str> = class.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["parent", "population", "kind"]);
        assert_eq!(
            class.parent_link,
            Some(ParentLink { field_name: "parent".into(), folder: Some("Lieux".into()) })
        );
        assert!(class.parent_field().unwrap().is_reference());
    }

    #[test]
    fn test_parse_markdown_document_with_rows() {
        let source = "---\nclassName: Contact\nclassIcon: user\nproperties:\n  - name: email\n    type: Input\n  - name: employer\n    type: File\n---\nNotes about the class.\n";
        let class = FileClass::parse("Contact", source, FieldDescriptor::from_spec).unwrap();
        assert_eq!(class.fields.len(), 2);
        assert_eq!(class.fields[1].name, "employer");
        assert!(class.parent_link.is_none());
    }

    #[test]
    fn test_missing_class_name_is_configuration_not_found() {
        let err = parse("classIcon: x\nproperties: {}\n").unwrap_err();
        match err {
            FileClassError::ConfigurationNotFound { type_name, .. } => assert_eq!(type_name, "Lieu"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_malformed_yaml_is_configuration_not_found() {
        assert!(matches!(
            parse("className: [unclosed\n"),
            Err(FileClassError::ConfigurationNotFound { .. })
        ));
    }

    #[test]
    fn test_parent_must_be_reference() {
        let source = "className: Lieu\nclassIcon: x\nparent: { property: name }\nproperties:\n  name: { type: Input }\n";
        assert!(matches!(parse(source), Err(FileClassError::InvalidConfiguration { .. })));

        let missing = "className: Lieu\nclassIcon: x\nparent: { property: up }\nproperties: {}\n";
        assert!(matches!(parse(missing), Err(FileClassError::InvalidConfiguration { .. })));

        let object = "className: Task\nclassIcon: x\nparent: { property: up }\nproperties:\n  up:\n    type: Object\n    properties:\n      task: { type: File }\n";
        assert!(parse(object).is_ok());
    }

    #[test]
    fn test_default_metadata() {
        let class = parse(LIEU).unwrap();
        let defaults = class.default_metadata("");
        assert_eq!(defaults.get("kind"), Some(&json!("city")));
        assert!(!defaults.contains_key("population"));
    }
}
