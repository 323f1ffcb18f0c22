// crates/boston311-core/src/error.rs

use std::path::PathBuf;

use thiserror::Error;

use crate::catalog::TableIdent;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("missing table identifier: {0} was not provided")]
    MissingIdentifier(&'static str),

    #[error("invalid identifier '{0}': expected letters, digits, '_' or '-'")]
    InvalidIdentifier(String),

    #[error("warehouse root {0} does not exist")]
    WarehouseMissing(PathBuf),

    #[error("table {0} not found")]
    TableNotFound(TableIdent),

    #[error("table {0} already exists")]
    TableExists(TableIdent),

    #[error("schema mismatch writing {table}: {detail}")]
    SchemaMismatch { table: TableIdent, detail: String },

    #[error("table {table} is corrupt: {detail}")]
    Corrupt { table: TableIdent, detail: String },

    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Table definition could not be read: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("Table definition could not be written: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("Invalid file pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("Could not list table files: {0}")]
    Glob(#[from] glob::GlobError),

    #[error("Polars operation failed: {0}")]
    Polars(#[from] polars::error::PolarsError),
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("source table {table} is missing required columns: {}", columns.join(", "))]
    MissingColumns {
        table: TableIdent,
        columns: Vec<String>,
    },

    #[error("Polars operation failed: {0}")]
    Polars(#[from] polars::error::PolarsError),
}

impl PipelineError {
    /// Configuration errors are caused by identifiers or schemas, not by the data engine.
    pub fn is_configuration(&self) -> bool {
        match self {
            PipelineError::MissingColumns { .. } => true,
            PipelineError::Catalog(err) => matches!(
                err,
                CatalogError::MissingIdentifier(_)
                    | CatalogError::InvalidIdentifier(_)
                    | CatalogError::WarehouseMissing(_)
                    | CatalogError::TableNotFound(_)
                    | CatalogError::TableExists(_)
                    | CatalogError::SchemaMismatch { .. }
            ),
            PipelineError::Polars(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
