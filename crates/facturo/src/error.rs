use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FacturoError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),

    #[error("Manifest error: {0}")]
    Manifest(#[from] ManifestError),

    #[error("Composition error: {0}")]
    Compose(#[from] ComposeError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] crate::pipeline::PipelineError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },
}

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Failed to open archive '{path}': {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Archive '{path}' is corrupt or unreadable: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("Failed to write extracted entry '{path}': {source}")]
    WriteEntry {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read directory '{path}': {source}")]
    ReadDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to package '{path}': {reason}")]
    Pack { path: PathBuf, reason: String },
}

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("Failed to read manifest '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Manifest is empty (no header row)")]
    Empty,

    #[error("Manifest exceeds the batch ceiling of {limit} rows")]
    TooLarge { limit: usize },
}

#[derive(Error, Debug)]
pub enum ComposeError {
    #[error("Required field '{0}' is missing or empty")]
    MissingField(&'static str),

    #[error("PDF '{0}' not found in the uploaded archive")]
    PdfNotFound(String),

    #[error("'{0}' is not a PDF file (bad magic bytes)")]
    NotAPdf(String),

    #[error("Unrecognized invoice date '{0}'")]
    InvalidDate(String),

    #[error("Failed to read PDF '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write composed document '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("XML generation failed: {0}")]
    Xml(String),

    #[error("PDF processing failed: {0}")]
    Pdf(String),
}

pub type Result<T> = std::result::Result<T, FacturoError>;
