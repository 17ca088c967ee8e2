//! Internal domain modules for the fileclass core library.
//!
//! All public types from these modules are re-exported at the crate root
//! with `#[doc(inline)]`; import from there in preference to this module.

pub mod entity;
pub mod error;
pub mod field;
pub mod file;
pub mod file_class;
pub mod formula;
pub mod frontmatter;
pub mod fs_store;
pub mod hierarchy;
pub mod link;
pub mod registry;
pub mod settings;
pub mod store;
pub mod workspace;

#[doc(inline)]
pub use entity::{Entity, EntityConstructor};
#[doc(inline)]
pub use error::{FileClassError, Result};
#[doc(inline)]
pub use field::{ChoiceOption, DefaultValue, FieldDescriptor, FieldKind, FieldSpec};
#[doc(inline)]
pub use file::{FileHandle, MutationGuard};
#[doc(inline)]
pub use file_class::{FileClass, ParentLink};
#[doc(inline)]
pub use formula::FormulaEngine;
#[doc(inline)]
pub use frontmatter::Metadata;
#[doc(inline)]
pub use fs_store::FsStore;
#[doc(inline)]
pub use hierarchy::{FileMove, Hierarchy, SyncReport};
#[doc(inline)]
pub use link::LinkToken;
#[doc(inline)]
pub use registry::TypeRegistry;
#[doc(inline)]
pub use settings::Settings;
#[doc(inline)]
pub use store::Store;
#[doc(inline)]
pub use workspace::Workspace;
