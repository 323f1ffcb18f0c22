use std::env;
use std::path::PathBuf;

pub const WAREHOUSE_ENV: &str = "BOSTON311_WAREHOUSE";
pub const WAREHOUSE_ENV_FALLBACK: &str = "WAREHOUSE_ROOT";
pub const DEFAULT_WAREHOUSE: &str = "warehouse";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub warehouse_root: PathBuf,
}

impl PipelineConfig {
    pub fn new(warehouse_root: impl Into<PathBuf>) -> Self {
        Self {
            warehouse_root: warehouse_root.into(),
        }
    }

    /// Resolves the warehouse root from an explicit path, then `.env` / process environment
    /// (`BOSTON311_WAREHOUSE`, then `WAREHOUSE_ROOT`), then `./warehouse`.
    pub fn from_env(explicit: Option<PathBuf>) -> Self {
        dotenvy::dotenv().ok();
        Self::resolve(explicit, |key| env::var(key).ok())
    }

    pub fn resolve(explicit: Option<PathBuf>, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let warehouse_root = explicit
            .or_else(|| lookup(WAREHOUSE_ENV).filter(|v| !v.is_empty()).map(PathBuf::from))
            .or_else(|| {
                lookup(WAREHOUSE_ENV_FALLBACK)
                    .filter(|v| !v.is_empty())
                    .map(PathBuf::from)
            })
            .unwrap_or_else(|| PathBuf::from(DEFAULT_WAREHOUSE));
        Self { warehouse_root }
    }
}
