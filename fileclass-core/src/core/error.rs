//! Error types for the fileclass core library.

use std::path::PathBuf;
use thiserror::Error;

/// All errors that can occur within the fileclass core library.
#[derive(Debug, Error)]
pub enum FileClassError {
    /// The configuration document for a type is missing or cannot be parsed.
    #[error("Configuration not found for type '{type_name}': {reason}")]
    ConfigurationNotFound { type_name: String, reason: String },

    /// The configuration document parsed but declares something inconsistent.
    #[error("Invalid configuration for type '{type_name}': {reason}")]
    InvalidConfiguration { type_name: String, reason: String },

    /// A formula failed to compile or evaluate.
    #[error("Scripting error: {0}")]
    Scripting(String),

    /// No file exists at the given vault path.
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// A file already exists where a new one would be written or moved.
    #[error("File already exists: {}", .0.display())]
    FileExists(PathBuf),

    /// The record carries no type key in its front matter.
    #[error("{} has no type", .0.display())]
    Untyped(PathBuf),

    /// The entity has no file bound to it yet.
    #[error("Entity of type '{0}' is not bound to a file")]
    UnboundEntity(String),

    /// The type declares no field with that name.
    #[error("Type '{type_name}' has no field '{field}'")]
    UnknownField { type_name: String, field: String },

    /// The field is read-only.
    #[error("Field '{0}' is static and cannot be written")]
    StaticField(String),

    /// The per-file mutation lock could not be acquired in time.
    #[error("Timed out waiting for the lock on {}", .path.display())]
    LockTimeout { path: PathBuf },

    /// Parent links form a loop.
    #[error("Parent links form a cycle through {}", .0.display())]
    HierarchyCycle(PathBuf),

    /// An I/O operation on the filesystem failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Front matter or a type document could not be read or written as YAML.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Settings could not be read or written as JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias that pins the error type to [`FileClassError`].
pub type Result<T> = std::result::Result<T, FileClassError>;

impl FileClassError {
    /// Returns a short, human-readable message suitable for display to the end user.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::ConfigurationNotFound { type_name, .. } => {
                format!("Cannot open records of type '{type_name}': its configuration is missing or unreadable")
            }
            Self::InvalidConfiguration { type_name, reason } => {
                format!("The configuration of type '{type_name}' is invalid: {reason}")
            }
            Self::Scripting(e) => format!("Formula error: {e}"),
            Self::FileNotFound(path) => format!("{} no longer exists", path.display()),
            Self::FileExists(path) => format!("{} already exists", path.display()),
            Self::Untyped(path) => format!("{} is not a typed record", path.display()),
            Self::UnboundEntity(_) => "Save the record before editing its fields".to_string(),
            Self::UnknownField { field, .. } => format!("Unknown field: {field}"),
            Self::StaticField(field) => format!("Field '{field}' is read-only"),
            Self::LockTimeout { path } => format!("{} is busy, try again", path.display()),
            Self::HierarchyCycle(_) => "A record cannot be its own ancestor".to_string(),
            Self::Io(e) => format!("File error: {e}"),
            Self::Yaml(e) => format!("Front matter error: {e}"),
            Self::Json(e) => format!("Settings error: {e}"),
        }
    }
}
