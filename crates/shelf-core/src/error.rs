use thiserror::Error;

use crate::probe::ProbeError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Probe error: {0}")]
    Probe(#[from] ProbeError),

    #[error("Path is not absolute: {0}")]
    RelativePath(String),

    #[error("Size {size} out of range for {path}")]
    InvalidSize { path: String, size: u64 },

    #[error("Parent entry {parent_id} does not exist (while storing {path})")]
    ParentNotFound { path: String, parent_id: String },

    #[error("An entry already exists at {0}")]
    DuplicatePath(String),

    #[error("Entry not found: {0}")]
    NotFound(String),

    #[error("Password hashing failed: {0}")]
    PasswordHash(String),

    #[error("{0}")]
    Other(String),
}
