use std::path::PathBuf;

use anyhow::{Context, Result};
use boston311_core::{pipeline, PipelineConfig, Session, TableIdent};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Finds closed Boston 311 service requests that missed their target date.
#[derive(Parser, Debug)]
#[command(author, version, about = "Boston 311 service request delay analysis", long_about = None)]
struct Cli {
    /// Namespace holding both the source and target tables
    #[arg(long)]
    database: Option<String>,
    /// Source table name within the namespace
    #[arg(long = "table_source")]
    table_source: Option<String>,
    /// Destination table name within the namespace; its contents are replaced
    #[arg(long = "table_target")]
    table_target: Option<String>,
    /// Warehouse root directory (defaults to $BOSTON311_WAREHOUSE, then ./warehouse)
    #[arg(long)]
    warehouse: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let cli = Cli::parse();
    run(cli)
}

fn run(cli: Cli) -> Result<()> {
    let config = PipelineConfig::from_env(cli.warehouse);

    let source = TableIdent::from_parts(cli.database.as_deref(), cli.table_source.as_deref())
        .context("resolving source table from --database/--table_source")?;
    let destination = TableIdent::from_parts(cli.database.as_deref(), cli.table_target.as_deref())
        .context("resolving destination table from --database/--table_target")?;

    let mut session = Session::open(&config).with_context(|| {
        format!(
            "failed to open warehouse at {}",
            config.warehouse_root.display()
        )
    })?;

    let summary = pipeline::transform(&mut session, &source, &destination)
        .with_context(|| format!("transform {source} -> {destination} failed"))?;

    info!(summary = %serde_json::to_string(&summary)?, "run finished");
    Ok(())
}
