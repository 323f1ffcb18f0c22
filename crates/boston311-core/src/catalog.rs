//! File-backed table catalog.
//!
//! A warehouse root holds one directory per namespace and one directory per table:
//!
//! ```text
//! <warehouse>/<namespace>/<table>/_table.toml
//! <warehouse>/<namespace>/<table>/_current
//! <warehouse>/<namespace>/<table>/v-<version>/part-00000.<ext>
//! ```
//!
//! `_current` names the live version directory. Overwrites stage a complete new version and
//! then swap the pointer with a rename, so readers see either the old or the new contents.

use std::fmt;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use polars::io::json::{JsonFormat, JsonReader, JsonWriter};
use polars::io::parquet::read::ParquetReader;
use polars::io::parquet::write::{ParquetCompression, ParquetWriter, StatisticsOptions};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::CatalogError;
use crate::schema::ColumnType;

const DEFINITION_FILE: &str = "_table.toml";
const CURRENT_FILE: &str = "_current";
const VERSION_PREFIX: &str = "v-";
const STAGING_PREFIX: &str = ".staging-";
const PART_FILE_STEM: &str = "part-00000";

pub type CatalogResult<T> = std::result::Result<T, CatalogError>;

/// A table addressed by namespace (database) and name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableIdent {
    pub namespace: String,
    pub name: String,
}

impl TableIdent {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> CatalogResult<Self> {
        let namespace = namespace.into();
        let name = name.into();
        validate_part(&namespace)?;
        validate_part(&name)?;
        Ok(Self { namespace, name })
    }

    /// Builds an identifier from optional parts, as they arrive from the command line.
    pub fn from_parts(namespace: Option<&str>, name: Option<&str>) -> CatalogResult<Self> {
        let namespace = namespace.ok_or(CatalogError::MissingIdentifier("namespace"))?;
        let name = name.ok_or(CatalogError::MissingIdentifier("table name"))?;
        Self::new(namespace, name)
    }
}

impl fmt::Display for TableIdent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "`{}`.`{}`", self.namespace, self.name)
    }
}

fn validate_part(part: &str) -> CatalogResult<()> {
    let valid = !part.is_empty()
        && part
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(CatalogError::InvalidIdentifier(part.to_string()))
    }
}

/// Physical serialization of a table's data files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableFormat {
    #[default]
    Parquet,
    Csv,
    Ndjson,
}

impl TableFormat {
    pub fn extension(self) -> &'static str {
        match self {
            TableFormat::Parquet => "parquet",
            TableFormat::Csv => "csv",
            TableFormat::Ndjson => "ndjson",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
}

/// Contents of `_table.toml`. An empty column list means the schema comes from the data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDefinition {
    #[serde(default)]
    pub format: TableFormat,
    #[serde(default)]
    pub columns: Vec<ColumnDef>,
}

impl TableDefinition {
    pub fn new(format: TableFormat) -> Self {
        Self {
            format,
            columns: Vec::new(),
        }
    }

    pub fn with_column(mut self, name: impl Into<String>, column_type: ColumnType) -> Self {
        self.columns.push(ColumnDef {
            name: name.into(),
            column_type,
        });
        self
    }

    pub fn schema(&self) -> Schema {
        let mut schema = Schema::default();
        for column in &self.columns {
            schema.with_column(column.name.as_str().into(), column.column_type.to_dtype());
        }
        schema
    }
}

/// A fully written version that is not yet visible to readers.
#[derive(Debug)]
pub struct StagedWrite {
    table: TableIdent,
    version: String,
    dir: PathBuf,
    format: TableFormat,
    rows: usize,
}

impl StagedWrite {
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[derive(Debug, Clone)]
pub struct WriteReceipt {
    pub table: TableIdent,
    pub version: String,
    pub rows: usize,
    pub files: Vec<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct Catalog {
    root: PathBuf,
}

impl Catalog {
    pub fn open(root: impl Into<PathBuf>) -> CatalogResult<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(CatalogError::WarehouseMissing(root));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn table_dir(&self, ident: &TableIdent) -> PathBuf {
        self.root.join(&ident.namespace).join(&ident.name)
    }

    pub fn table_exists(&self, ident: &TableIdent) -> bool {
        self.table_dir(ident).join(DEFINITION_FILE).is_file()
    }

    pub fn create_table(
        &self,
        ident: &TableIdent,
        definition: &TableDefinition,
    ) -> CatalogResult<()> {
        if self.table_exists(ident) {
            return Err(CatalogError::TableExists(ident.clone()));
        }
        let dir = self.table_dir(ident);
        fs::create_dir_all(&dir)?;
        fs::write(dir.join(DEFINITION_FILE), toml::to_string_pretty(definition)?)?;
        info!(table = %ident, format = definition.format.extension(), "created table");
        Ok(())
    }

    pub fn definition(&self, ident: &TableIdent) -> CatalogResult<TableDefinition> {
        let path = self.table_dir(ident).join(DEFINITION_FILE);
        if !path.is_file() {
            return Err(CatalogError::TableNotFound(ident.clone()));
        }
        let text = fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }

    /// Directory of the live version, or `None` for a table that was never written.
    pub fn current_version(&self, ident: &TableIdent) -> CatalogResult<Option<PathBuf>> {
        let table_dir = self.table_dir(ident);
        let pointer = table_dir.join(CURRENT_FILE);
        if !pointer.is_file() {
            return Ok(None);
        }
        let version = fs::read_to_string(pointer)?;
        let dir = table_dir.join(version.trim());
        if !dir.is_dir() {
            return Err(CatalogError::Corrupt {
                table: ident.clone(),
                detail: format!("live version {} is missing", version.trim()),
            });
        }
        Ok(Some(dir))
    }

    pub fn data_files(&self, ident: &TableIdent) -> CatalogResult<Vec<PathBuf>> {
        let definition = self.definition(ident)?;
        match self.current_version(ident)? {
            Some(dir) => list_parts(&dir, definition.format),
            None => Ok(Vec::new()),
        }
    }

    pub fn read_table(&self, ident: &TableIdent) -> CatalogResult<LazyFrame> {
        let definition = self.definition(ident)?;
        let files = self.data_files(ident)?;
        debug!(table = %ident, files = files.len(), "reading table");

        if files.is_empty() {
            return Ok(DataFrame::empty_with_schema(&definition.schema()).lazy());
        }

        let frames = files
            .iter()
            .map(|path| read_part(path, &definition))
            .collect::<CatalogResult<Vec<_>>>()?;

        Ok(concat(&frames, UnionArgs::default())?)
    }

    /// Writes `df` as a new, not yet visible, version of an existing table.
    pub fn stage_overwrite(&self, ident: &TableIdent, df: &DataFrame) -> CatalogResult<StagedWrite> {
        let definition = self.definition(ident)?;
        let mut conformed = conform(ident, &definition, df)?;

        let version = Uuid::new_v4().simple().to_string();
        let dir = self
            .table_dir(ident)
            .join(format!("{STAGING_PREFIX}{version}"));
        fs::create_dir_all(&dir)?;

        let path = dir.join(format!("{PART_FILE_STEM}.{}", definition.format.extension()));
        if let Err(err) = write_part(&path, definition.format, &mut conformed) {
            let _ = fs::remove_dir_all(&dir);
            return Err(err);
        }

        debug!(table = %ident, %version, rows = conformed.height(), "staged table version");
        Ok(StagedWrite {
            table: ident.clone(),
            version,
            dir,
            format: definition.format,
            rows: conformed.height(),
        })
    }

    /// Makes a staged version live and removes the version it replaces.
    pub fn commit(&self, staged: StagedWrite) -> CatalogResult<WriteReceipt> {
        let table_dir = self.table_dir(&staged.table);
        let previous = self.current_version(&staged.table)?;

        let version_name = format!("{VERSION_PREFIX}{}", staged.version);
        let version_dir = table_dir.join(&version_name);
        fs::rename(&staged.dir, &version_dir)?;
        let files = match list_parts(&version_dir, staged.format) {
            Ok(files) => files,
            Err(err) => {
                let _ = fs::remove_dir_all(&version_dir);
                return Err(err);
            }
        };

        // nothing below the swap may fail the commit
        let pointer_tmp = table_dir.join(format!("{CURRENT_FILE}.tmp"));
        let swap = fs::write(&pointer_tmp, &version_name)
            .and_then(|_| fs::rename(&pointer_tmp, table_dir.join(CURRENT_FILE)));
        if let Err(err) = swap {
            let _ = fs::remove_dir_all(&version_dir);
            return Err(err.into());
        }

        if let Some(old) = previous {
            if let Err(err) = fs::remove_dir_all(&old) {
                warn!(table = %staged.table, path = %old.display(), error = %err, "failed to remove replaced version");
            }
        }

        info!(table = %staged.table, version = %staged.version, rows = staged.rows, "overwrote table");

        Ok(WriteReceipt {
            table: staged.table,
            version: staged.version,
            rows: staged.rows,
            files,
        })
    }

    /// Replaces the entire contents of an existing table with `df`.
    pub fn insert_overwrite(&self, ident: &TableIdent, df: &DataFrame) -> CatalogResult<WriteReceipt> {
        let staged = self.stage_overwrite(ident, df)?;
        let dir = staged.dir.clone();
        self.commit(staged).inspect_err(|_| {
            let _ = fs::remove_dir_all(&dir);
        })
    }
}

fn list_parts(dir: &Path, format: TableFormat) -> CatalogResult<Vec<PathBuf>> {
    let escaped = glob::Pattern::escape(&dir.to_string_lossy());
    let pattern = format!("{escaped}/part-*.{}", format.extension());
    let mut files = Vec::new();
    for entry in glob::glob(&pattern)? {
        files.push(entry?);
    }
    files.sort();
    Ok(files)
}

fn read_part(path: &Path, definition: &TableDefinition) -> CatalogResult<LazyFrame> {
    let file = File::open(path)?;
    let df = match definition.format {
        TableFormat::Parquet => ParquetReader::new(file).finish()?,
        TableFormat::Csv => CsvReadOptions::default()
            .with_has_header(true)
            .with_schema_overwrite(text_schema(definition))
            .into_reader_with_file_handle(file)
            .finish()?,
        TableFormat::Ndjson => {
            let df = JsonReader::new(file)
                .with_json_format(JsonFormat::JsonLines)
                .finish()?;
            return Ok(cast_declared(df.lazy(), definition));
        }
    };
    Ok(df.lazy())
}

/// CSV schema override: declared types, with temporal columns left as text for the caller to parse.
fn text_schema(definition: &TableDefinition) -> Option<SchemaRef> {
    if definition.columns.is_empty() {
        return None;
    }
    let mut schema = Schema::default();
    for column in &definition.columns {
        let dtype = match column.column_type {
            ColumnType::Timestamp | ColumnType::Date => DataType::String,
            other => other.to_dtype(),
        };
        schema.with_column(column.name.as_str().into(), dtype);
    }
    Some(Arc::new(schema))
}

fn cast_declared(lf: LazyFrame, definition: &TableDefinition) -> LazyFrame {
    let casts: Vec<Expr> = definition
        .columns
        .iter()
        .filter(|c| !matches!(c.column_type, ColumnType::Timestamp | ColumnType::Date))
        .map(|c| col(c.name.as_str()).cast(c.column_type.to_dtype()))
        .collect();
    if casts.is_empty() {
        lf
    } else {
        lf.with_columns(casts)
    }
}

/// Checks `df` against the declared columns (same count, same names in order, castable types)
/// and casts it to the declared types.
fn conform(
    ident: &TableIdent,
    definition: &TableDefinition,
    df: &DataFrame,
) -> CatalogResult<DataFrame> {
    if definition.columns.is_empty() {
        return Ok(df.clone());
    }

    let mismatch = |detail: String| CatalogError::SchemaMismatch {
        table: ident.clone(),
        detail,
    };

    if df.width() != definition.columns.len() {
        return Err(mismatch(format!(
            "table declares {} columns, result has {}",
            definition.columns.len(),
            df.width()
        )));
    }

    let mut exprs = Vec::with_capacity(df.width());
    for (idx, (column, declared)) in df.get_columns().iter().zip(&definition.columns).enumerate() {
        if column.name().as_str() != declared.name {
            return Err(mismatch(format!(
                "column {idx} is '{}', table declares '{}'",
                column.name(),
                declared.name
            )));
        }
        if !declared.column_type.accepts(column.dtype()) {
            return Err(mismatch(format!(
                "column '{}' has type {}, table declares {:?}",
                declared.name,
                column.dtype(),
                declared.column_type
            )));
        }
        exprs.push(col(declared.name.as_str()).cast(declared.column_type.to_dtype()));
    }

    Ok(df.clone().lazy().select(exprs).collect()?)
}

fn write_part(path: &Path, format: TableFormat, df: &mut DataFrame) -> CatalogResult<()> {
    let mut file = File::create(path)?;
    match format {
        TableFormat::Parquet => {
            ParquetWriter::new(&mut file)
                .with_compression(ParquetCompression::Zstd(None))
                .with_statistics(StatisticsOptions::default())
                .finish(df)?;
        }
        TableFormat::Csv => {
            CsvWriter::new(&mut file).include_header(true).finish(df)?;
        }
        TableFormat::Ndjson => {
            JsonWriter::new(&mut file)
                .with_json_format(JsonFormat::JsonLines)
                .finish(df)?;
        }
    }
    file.sync_all()?;
    Ok(())
}
