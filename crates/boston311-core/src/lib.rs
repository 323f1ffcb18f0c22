pub mod catalog;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod schema;
pub mod session;

pub use catalog::{Catalog, TableDefinition, TableFormat, TableIdent};
pub use config::PipelineConfig;
pub use error::{CatalogError, PipelineError, Result};
pub use pipeline::{transform, RunSummary};
pub use session::Session;
