use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Ml4msError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unrecognized collection file type: {0}")]
    UnknownFileType(String),

    #[error("Malformed collection file {path}: {message}")]
    Malformed { path: PathBuf, message: String },

    #[error("Store is closed")]
    StoreClosed,

    #[error("Database not found: {0}")]
    DatabaseNotFound(String),

    #[error("Document not found: {collection}/{id}")]
    NotFound { collection: String, id: String },

    #[error("Document in collection '{collection}' has no _id")]
    MissingId { collection: String },

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("Validation failed for {id} against schema '{schema}':\n  - {}", .violations.join("\n  - "))]
    Validation {
        schema: String,
        id: String,
        violations: Vec<String>,
    },

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Invalid payload {path}: {message}")]
    Payload { path: PathBuf, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Ml4msError>;
