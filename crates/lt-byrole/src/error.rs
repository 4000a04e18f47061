// error.rs — Error types for the trigger subsystem.

use std::path::PathBuf;

use thiserror::Error;

use crate::ids::CourseId;

/// Configuration problems detected while resolving trigger settings.
///
/// `NoResponsibleRoles` is the one error the evaluator converts into a safe
/// `Next` outcome instead of propagating it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// The responsible role list is unset or empty.
    #[error("no responsible roles defined")]
    NoResponsibleRoles,

    /// The delay cannot be represented as a time span.
    #[error("delay of {secs}s is out of range")]
    InvalidDelay { secs: u64 },
}

/// Errors that can occur while evaluating courses.
#[derive(Debug, Error)]
pub enum TriggerError {
    /// Trigger configuration is missing or invalid.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The tracking store failed to read or write a record.
    #[error("tracking store error for {key}: {message}")]
    Store { key: String, message: String },

    /// The role-membership lookup failed.
    #[error("role lookup failed for course {course_id}: {message}")]
    RoleLookup { course_id: CourseId, message: String },

    /// A file I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to serialize/deserialize JSON data.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The configuration file could not be parsed.
    #[error("invalid configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

impl TriggerError {
    /// Build a store error for the given key.
    pub fn store(key: impl ToString, message: impl Into<String>) -> Self {
        TriggerError::Store {
            key: key.to_string(),
            message: message.into(),
        }
    }
}
