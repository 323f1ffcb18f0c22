//! Service-request delay pipeline: coerce timestamps, derive `delay_days`, project, keep closed
//! cases that missed their target, and overwrite the destination table.

use std::time::Instant;

use chrono::{DateTime, Utc};
use polars::prelude::*;
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::catalog::TableIdent;
use crate::error::{CatalogError, PipelineError, Result};
use crate::schema::{
    timestamp_dtype, CASE_STATUS, CLOSED_DT, DELAY_DAYS, OUTPUT_COLUMNS, SECONDS_PER_DAY,
    STATUS_CLOSED, TARGET_DT, TIMESTAMP_COLUMNS,
};
use crate::session::Session;

const MICROS_PER_SECOND: f64 = 1_000_000.0;

/// Text layouts tried, in order, when a timestamp column arrives as strings.
const DATETIME_FORMATS: [&str; 6] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.fZ",
    "%Y-%m-%dT%H:%M:%S%.fZ",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];
/// Layouts carrying a UTC offset; parsed as UTC instants, then stored naive.
const OFFSET_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
];
const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub source: String,
    pub destination: String,
    pub version: String,
    pub source_rows: usize,
    pub output_rows: usize,
    pub elapsed_ms: u64,
    pub finished_at: DateTime<Utc>,
}

/// Source columns the projection needs.
pub fn required_columns() -> Vec<&'static str> {
    OUTPUT_COLUMNS
        .iter()
        .copied()
        .filter(|name| *name != DELAY_DAYS)
        .collect()
}

pub fn check_source_schema(ident: &TableIdent, schema: &Schema) -> Result<()> {
    let missing: Vec<String> = required_columns()
        .into_iter()
        .filter(|name| schema.get(name).is_none())
        .map(str::to_string)
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(PipelineError::MissingColumns {
            table: ident.clone(),
            columns: missing,
        })
    }
}

fn strptime_options(format: &str) -> StrptimeOptions {
    StrptimeOptions {
        format: Some(format.into()),
        strict: false,
        exact: true,
        cache: true,
    }
}

/// Casts column `name` of type `dtype` to a naive microsecond timestamp.
/// Values that cannot be interpreted become null.
pub fn coerce_timestamp(name: &str, dtype: &DataType) -> Expr {
    let expr = match dtype {
        DataType::String => {
            let text = || col(name).str().strip_chars(lit(Null {}));
            let mut attempts: Vec<Expr> = DATETIME_FORMATS
                .iter()
                .map(|format| {
                    text()
                        .str()
                        .strptime(timestamp_dtype(), strptime_options(format), lit("raise"))
                })
                .collect();
            let utc =
                DataType::Datetime(TimeUnit::Microseconds, Some(polars::prelude::TimeZone::UTC));
            attempts.extend(OFFSET_FORMATS.iter().map(|format| {
                text()
                    .str()
                    .strptime(utc.clone(), strptime_options(format), lit("raise"))
                    .cast(timestamp_dtype())
            }));
            attempts.push(
                text()
                    .str()
                    .strptime(DataType::Date, strptime_options(DATE_FORMAT), lit("raise"))
                    .cast(timestamp_dtype()),
            );
            coalesce(&attempts)
        }
        DataType::Datetime(_, _) | DataType::Date => col(name).cast(timestamp_dtype()),
        // epoch seconds
        dtype if dtype.is_primitive_numeric() => (col(name).cast(DataType::Float64)
            * lit(MICROS_PER_SECOND))
        .cast(DataType::Int64)
        .cast(timestamp_dtype()),
        _ => lit(Null {}).cast(timestamp_dtype()),
    };
    expr.alias(name)
}

/// Whole seconds since the epoch, floored (so pre-1970 fractions round toward the past).
fn epoch_seconds(name: &str) -> Expr {
    (col(name)
        .dt()
        .timestamp(TimeUnit::Microseconds)
        .cast(DataType::Float64)
        / lit(MICROS_PER_SECOND))
    .floor()
}

/// Days `closed_dt` ran past `target_dt`, or 0.0 when it did not (including when either is null).
pub fn delay_days_expr() -> Expr {
    let late_by_seconds = epoch_seconds(CLOSED_DT) - epoch_seconds(TARGET_DT);
    when(col(CLOSED_DT).gt(col(TARGET_DT)))
        .then(late_by_seconds / lit(SECONDS_PER_DAY))
        .otherwise(lit(0.0))
        .alias(DELAY_DAYS)
}

/// Derived records: timestamps coerced, `delay_days` attached, fixed projection applied.
pub fn derive(mut lf: LazyFrame) -> Result<LazyFrame> {
    let schema = lf.collect_schema()?;

    let casts: Vec<Expr> = TIMESTAMP_COLUMNS
        .iter()
        .filter_map(|name| schema.get(name).map(|dtype| coerce_timestamp(name, dtype)))
        .collect();

    let projection: Vec<Expr> = OUTPUT_COLUMNS.iter().map(|name| col(*name)).collect();

    Ok(lf
        .with_columns(casts)
        .with_column(delay_days_expr())
        .select(projection))
}

/// Output records: closed cases with a positive delay, longest delay first.
pub fn select_delayed(lf: LazyFrame) -> LazyFrame {
    lf.filter(
        col(CASE_STATUS)
            .eq(lit(STATUS_CLOSED))
            .and(col(DELAY_DAYS).gt(lit(0.0))),
    )
    .sort(
        [DELAY_DAYS],
        SortMultipleOptions::default()
            .with_order_descending(true)
            .with_maintain_order(true),
    )
}

/// Reads `source`, derives and filters it, and replaces the contents of `destination`.
pub fn transform(
    session: &mut Session,
    source: &TableIdent,
    destination: &TableIdent,
) -> Result<RunSummary> {
    let started = Instant::now();
    info!(%source, %destination, "starting transform");

    if !session.catalog().table_exists(destination) {
        return Err(CatalogError::TableNotFound(destination.clone()).into());
    }

    let mut source_lf = session.read_table(source)?;
    let schema = source_lf.collect_schema()?;
    check_source_schema(source, &schema)?;

    let derived = derive(source_lf)?.collect()?;
    debug!(rows = derived.height(), "derived records");

    let output = select_delayed(derived.clone().lazy()).collect()?;
    debug!(rows = output.height(), "selected delayed closures");

    let receipt = session.insert_overwrite(destination, &output)?;

    let summary = RunSummary {
        run_id: session.run_id(),
        source: source.to_string(),
        destination: destination.to_string(),
        version: receipt.version,
        source_rows: derived.height(),
        output_rows: receipt.rows,
        elapsed_ms: started.elapsed().as_millis() as u64,
        finished_at: Utc::now(),
    };
    info!(
        source_rows = summary.source_rows,
        output_rows = summary.output_rows,
        elapsed_ms = summary.elapsed_ms,
        "transform complete"
    );
    Ok(summary)
}
