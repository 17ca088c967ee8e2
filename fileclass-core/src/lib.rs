//! Core library for fileclass: typed records over a vault of Markdown files.
//!
//! Each record is a Markdown file whose YAML front matter names its type.
//! Types are declared in configuration documents and describe the record's
//! fields and, optionally, a parent link that drives the folder layout.
//!
//! The primary entry point is [`Workspace`], which represents an open vault.
//! Types are re-exported from their respective sub-modules for convenience;
//! consumers should import from the crate root rather than the `core` module.

pub mod core;

// Re-export commonly used types.
#[doc(inline)]
pub use core::{
    entity::{Entity, EntityConstructor},
    error::{FileClassError, Result},
    field::{ChoiceOption, DefaultValue, FieldDescriptor, FieldKind, FieldSpec},
    file::{FileHandle, MutationGuard},
    file_class::{FileClass, ParentLink},
    formula::FormulaEngine,
    frontmatter::Metadata,
    fs_store::FsStore,
    hierarchy::{FileMove, Hierarchy, SyncReport},
    link::LinkToken,
    registry::TypeRegistry,
    settings::Settings,
    store::Store,
    workspace::Workspace,
};
