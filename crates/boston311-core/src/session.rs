use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use polars::prelude::{DataFrame, LazyFrame};
use tracing::{info, warn};
use uuid::Uuid;

use crate::catalog::{Catalog, CatalogResult, TableIdent, WriteReceipt};
use crate::config::PipelineConfig;

/// Handle on the warehouse for the duration of one run.
///
/// Dropping the session removes any staged version that was never committed, whether the run
/// succeeded or not.
#[derive(Debug)]
pub struct Session {
    catalog: Catalog,
    run_id: Uuid,
    started: Instant,
    pending: Vec<PathBuf>,
}

impl Session {
    pub fn open(config: &PipelineConfig) -> CatalogResult<Self> {
        let catalog = Catalog::open(&config.warehouse_root)?;
        let run_id = Uuid::new_v4();
        info!(%run_id, warehouse = %config.warehouse_root.display(), "session started");
        Ok(Self {
            catalog,
            run_id,
            started: Instant::now(),
            pending: Vec::new(),
        })
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn read_table(&self, ident: &TableIdent) -> CatalogResult<LazyFrame> {
        self.catalog.read_table(ident)
    }

    pub fn insert_overwrite(
        &mut self,
        ident: &TableIdent,
        df: &DataFrame,
    ) -> CatalogResult<WriteReceipt> {
        let staged = self.catalog.stage_overwrite(ident, df)?;
        let staging_dir = staged.dir().to_path_buf();
        self.pending.push(staging_dir.clone());

        let receipt = self.catalog.commit(staged)?;
        self.pending.retain(|dir| dir != &staging_dir);
        Ok(receipt)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        for dir in self.pending.drain(..) {
            if !dir.exists() {
                continue;
            }
            match fs::remove_dir_all(&dir) {
                Ok(()) => warn!(path = %dir.display(), "removed uncommitted staging directory"),
                Err(err) => {
                    warn!(path = %dir.display(), error = %err, "failed to remove staging directory")
                }
            }
        }
        info!(
            run_id = %self.run_id,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "session stopped"
        );
    }
}
