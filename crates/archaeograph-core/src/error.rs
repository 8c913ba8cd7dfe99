//! Pipeline error taxonomy.
//!
//! Per-row exclusions (missing coordinates, duplicate keys, orphans) are never
//! errors; they are counted in the stage reports. Everything here aborts the
//! current stage.

use std::path::PathBuf;

pub type Result<T, E = ImportError> = std::result::Result<T, E>;

/// Underlying cause carried by stage errors (SQLite, JSON, CBOR).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("source `{}`: {message}", path.display())]
    Source { path: PathBuf, message: String },

    #[error("I/O error on `{}`: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported coordinate reference system `{0}` (supported: EPSG:4326, EPSG:3857, EPSG:326xx, EPSG:327xx)")]
    UnsupportedCrs(String),

    #[error("staging table `{table}` does not exist; run the source loader (and enrichment) first")]
    StagingMissing { table: String },

    #[error("staging store ({stage}): {source}")]
    Staging {
        stage: &'static str,
        #[source]
        source: BoxError,
    },

    #[error("embedding cache `{}`: {message}", path.display())]
    Cache { path: PathBuf, message: String },

    #[error("embedding service failed for {table} row {row}: {message}")]
    Embedding {
        table: String,
        row: usize,
        message: String,
    },

    #[error("export `{}`: {message}", path.display())]
    Export { path: PathBuf, message: String },

    #[error("could not connect to graph store at {uri}: {message}")]
    GraphConnect { uri: String, message: String },

    #[error("{phase} batch {batch} failed after {committed_rows} committed rows: {message}")]
    GraphBatch {
        phase: String,
        batch: usize,
        committed_rows: u64,
        message: String,
    },

    #[error("graph store: {message}")]
    Graph { message: String },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ImportError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ImportError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn source(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        ImportError::Source {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn staging(stage: &'static str, err: impl Into<BoxError>) -> Self {
        ImportError::Staging {
            stage,
            source: err.into(),
        }
    }

    pub fn graph(err: impl std::fmt::Display) -> Self {
        ImportError::Graph {
            message: err.to_string(),
        }
    }
}
