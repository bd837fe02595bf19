use std::path::PathBuf;

use thiserror::Error;

/// Fatal pipeline errors — anything here aborts the whole batch.
/// Per-item failures never reach this type; they are recorded as
/// `ItemError` data instead.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Failed to prepare working directory '{path}': {source}")]
    Workdir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Job is missing its input {0} path")]
    MissingInput(&'static str),

    #[error("Extraction failed: {0}")]
    Extraction(crate::error::ArchiveError),

    #[error("Manifest parsing failed: {0}")]
    Manifest(#[from] crate::error::ManifestError),

    #[error("Packaging failed: {0}")]
    Packaging(crate::error::ArchiveError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),
}
