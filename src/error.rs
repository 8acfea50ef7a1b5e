// src/error.rs

use std::{io, path::PathBuf};

/// Every failure the provisioner, loader and stager can surface.
///
/// Variants carry the table identifier and, where one is involved, the
/// offending file path so a caller can act without re-running verbosely.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// Malformed column schema, constraints or properties.
    #[error("schema error for {table}: {reason}")]
    Schema { table: String, reason: String },

    #[error("permission denied creating {table} at {location}: {source}")]
    Permission {
        table: String,
        location: String,
        #[source]
        source: io::Error,
    },

    #[error("no source files for {table} matched {pattern}")]
    PathResolution { table: String, pattern: String },

    #[error("cannot derive batch number for {table} from {}: {reason}", path.display())]
    BatchExtraction {
        table: String,
        path: PathBuf,
        reason: String,
    },

    #[error("data does not match schema of {table}{}: {reason}", in_file(path))]
    SchemaMismatch {
        table: String,
        path: Option<PathBuf>,
        reason: String,
    },

    #[error("table {0} does not exist; provision it first")]
    TableNotFound(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("parquet error on {table}: {source}")]
    Parquet {
        table: String,
        #[source]
        source: parquet::errors::ParquetError,
    },

    #[error("arrow error on {table}: {source}")]
    Arrow {
        table: String,
        #[source]
        source: arrow::error::ArrowError,
    },

    #[error("corrupt table definition {}: {source}", path.display())]
    Definition {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

fn in_file(path: &Option<PathBuf>) -> String {
    match path {
        Some(p) => format!(" in {}", p.display()),
        None => String::new(),
    }
}

impl LoadError {
    pub(crate) fn schema(table: impl ToString, reason: impl Into<String>) -> Self {
        LoadError::Schema {
            table: table.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn io(context: impl Into<String>, source: io::Error) -> Self {
        LoadError::Io {
            context: context.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, LoadError>;
