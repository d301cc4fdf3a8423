//! Local JSONL dataset used as the load destination.
//!
//! Layout under `{output_dir}/{dataset}`:
//! - `{table}/{load_id}.jsonl`: one file per table and load
//! - `_schema.json`: per table, the known columns in first-seen order and the
//!   declared row identity
//!
//! Rows arrive page by page and go straight to a temp file per table; the
//! files are renamed into place when the load finishes.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use ingest_logging::{ingest_debug, ingest_info, ingest_warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::persist::{ensure_output_dir, AtomicFileWriter, PendingFile, PersistError};
use crate::resource::TableKeys;

pub const SCHEMA_FILENAME: &str = "_schema.json";

/// Records of one table within a load.
#[derive(Debug, Clone, PartialEq)]
pub struct TableBatch {
    pub table: String,
    pub rows: Vec<Value>,
}

/// A whole load held in memory. Small loads and tests only; the runner
/// streams pages through [`Destination::write_page`] instead.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadPackage {
    pub load_id: String,
    pub tables: Vec<TableBatch>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchemaUpdate {
    pub table: String,
    pub new_columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedJob {
    pub table: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LoadReport {
    pub load_id: String,
    pub rows_loaded: usize,
    pub schema_updates: Vec<TableSchemaUpdate>,
    pub failed_jobs: Vec<FailedJob>,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error(transparent)]
    Persist(#[from] PersistError),
    #[error("schema file {path:?} is unreadable: {message}")]
    Schema { path: PathBuf, message: String },
    #[error("failed to serialize: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("no load in progress")]
    NotStarted,
}

/// A load target fed one page at a time.
///
/// A load is `begin`, any number of `declare_table` and `write_page` calls,
/// then `finish`, or `abort` to throw the partial load away. Per-table write
/// failures are reported in [`LoadReport::failed_jobs`]; an `Err` means the
/// load as a whole cannot go on.
pub trait Destination {
    /// Destination kind, e.g. `jsonl`.
    fn name(&self) -> &str;
    fn dataset(&self) -> &str;
    /// Starts a load. A load still open is discarded first.
    fn begin(&mut self, load_id: &str) -> Result<(), LoadError>;
    /// Records how rows of `table` are identified.
    fn declare_table(&mut self, table: &str, keys: &TableKeys) -> Result<(), LoadError> {
        let _ = (table, keys);
        Ok(())
    }
    fn write_page(&mut self, table: &str, rows: &[Value]) -> Result<(), LoadError>;
    fn finish(&mut self) -> Result<LoadReport, LoadError>;
    fn abort(&mut self);

    /// Loads an in-memory package in one go.
    fn load(&mut self, package: &LoadPackage) -> Result<LoadReport, LoadError> {
        self.begin(&package.load_id)?;
        for batch in &package.tables {
            if let Err(err) = self.write_page(&batch.table, &batch.rows) {
                self.abort();
                return Err(err);
            }
        }
        self.finish()
    }
}

/// What `_schema.json` keeps for one table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub columns: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub primary_key: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merge_key: Option<String>,
}

type KnownTables = BTreeMap<String, TableSchema>;

#[derive(Debug)]
struct TableLoad {
    table: String,
    keys: Option<TableKeys>,
    file: Option<PendingFile>,
    columns: Vec<String>,
    new_columns: Vec<String>,
    rows: usize,
    failure: Option<String>,
}

#[derive(Debug)]
struct OpenLoad {
    load_id: String,
    known: KnownTables,
    tables: Vec<TableLoad>,
}

impl OpenLoad {
    fn table_mut(&mut self, table: &str) -> &mut TableLoad {
        let index = match self.tables.iter().position(|t| t.table == table) {
            Some(index) => index,
            None => {
                let columns = self
                    .known
                    .get(table)
                    .map(|schema| schema.columns.clone())
                    .unwrap_or_default();
                self.tables.push(TableLoad {
                    table: table.to_string(),
                    keys: None,
                    file: None,
                    columns,
                    new_columns: Vec::new(),
                    rows: 0,
                    failure: None,
                });
                self.tables.len() - 1
            }
        };
        &mut self.tables[index]
    }
}

#[derive(Debug)]
pub struct JsonlDestination {
    dataset: String,
    writer: AtomicFileWriter,
    open: Option<OpenLoad>,
}

impl JsonlDestination {
    pub fn new(output_dir: &Path, dataset: impl Into<String>) -> Self {
        let dataset = dataset.into();
        let writer = AtomicFileWriter::new(output_dir.join(&dataset));
        Self {
            dataset,
            writer,
            open: None,
        }
    }

    pub fn dataset_dir(&self) -> &Path {
        self.writer.root()
    }

    /// Columns recorded for `table` by earlier loads.
    pub fn known_columns(&self, table: &str) -> Result<Vec<String>, LoadError> {
        Ok(self.table_schema(table)?.unwrap_or_default().columns)
    }

    pub fn table_schema(&self, table: &str) -> Result<Option<TableSchema>, LoadError> {
        Ok(self.read_schema()?.remove(table))
    }

    fn schema_path(&self) -> PathBuf {
        self.dataset_dir().join(SCHEMA_FILENAME)
    }

    fn read_schema(&self) -> Result<KnownTables, LoadError> {
        let path = self.schema_path();
        let content = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(KnownTables::new());
            }
            Err(err) => {
                return Err(LoadError::Schema {
                    path,
                    message: err.to_string(),
                })
            }
        };
        serde_json::from_str(&content).map_err(|err| LoadError::Schema {
            path,
            message: err.to_string(),
        })
    }

    fn write_schema(&self, known: &KnownTables) -> Result<(), LoadError> {
        let content = serde_json::to_vec_pretty(known)?;
        self.writer.write(Path::new(SCHEMA_FILENAME), &content)?;
        Ok(())
    }
}

impl Destination for JsonlDestination {
    fn name(&self) -> &str {
        "jsonl"
    }

    fn dataset(&self) -> &str {
        &self.dataset
    }

    fn begin(&mut self, load_id: &str) -> Result<(), LoadError> {
        self.abort();
        ensure_output_dir(self.dataset_dir())?;
        let known = self.read_schema()?;
        self.open = Some(OpenLoad {
            load_id: load_id.to_string(),
            known,
            tables: Vec::new(),
        });
        Ok(())
    }

    fn declare_table(&mut self, table: &str, keys: &TableKeys) -> Result<(), LoadError> {
        let open = self.open.as_mut().ok_or(LoadError::NotStarted)?;
        open.table_mut(table).keys = Some(keys.clone());
        Ok(())
    }

    fn write_page(&mut self, table: &str, rows: &[Value]) -> Result<(), LoadError> {
        let open = self.open.as_mut().ok_or(LoadError::NotStarted)?;
        let relative = Path::new(table).join(format!("{}.jsonl", open.load_id));
        let entry = open.table_mut(table);
        if entry.failure.is_some() || rows.is_empty() {
            return Ok(());
        }

        let mut content = Vec::new();
        for row in rows {
            serde_json::to_writer(&mut content, row)?;
            content.push(b'\n');
        }

        if entry.file.is_none() {
            match self.writer.start(&relative) {
                Ok(file) => entry.file = Some(file),
                Err(err) => {
                    ingest_warn!("load job for table {} failed: {}", table, err);
                    entry.failure = Some(err.to_string());
                    return Ok(());
                }
            }
        }
        let Some(file) = entry.file.as_mut() else {
            return Ok(());
        };
        if let Err(err) = file.append(&content) {
            ingest_warn!("load job for table {} failed: {}", table, err);
            entry.failure = Some(err.to_string());
            // Dropping the pending file removes its temp file.
            entry.file = None;
            return Ok(());
        }

        entry.rows += rows.len();
        let added = discover_columns(&mut entry.columns, rows);
        entry.new_columns.extend(added);
        Ok(())
    }

    fn finish(&mut self) -> Result<LoadReport, LoadError> {
        let OpenLoad {
            load_id,
            mut known,
            tables,
        } = self.open.take().ok_or(LoadError::NotStarted)?;
        let mut report = LoadReport {
            load_id: load_id.clone(),
            ..LoadReport::default()
        };
        let mut schema_changed = false;

        for table in tables {
            if let Some(message) = table.failure {
                report.failed_jobs.push(FailedJob {
                    table: table.table,
                    message,
                });
                continue;
            }
            if let Some(file) = table.file {
                match file.commit() {
                    Ok(path) => {
                        ingest_info!("wrote {} rows to {:?}", table.rows, path);
                        report.rows_loaded += table.rows;
                    }
                    Err(err) => {
                        ingest_warn!("load job for table {} failed: {}", table.table, err);
                        report.failed_jobs.push(FailedJob {
                            table: table.table,
                            message: err.to_string(),
                        });
                        continue;
                    }
                }
            } else {
                ingest_debug!("table {} has no rows in load {}", table.table, load_id);
            }

            let declares_keys = table.keys.as_ref().is_some_and(|keys| !keys.is_empty());
            if table.new_columns.is_empty() && !declares_keys {
                continue;
            }
            let schema = known.entry(table.table.clone()).or_default();
            if !table.new_columns.is_empty() {
                schema.columns = table.columns;
                schema_changed = true;
                report.schema_updates.push(TableSchemaUpdate {
                    table: table.table.clone(),
                    new_columns: table.new_columns,
                });
            }
            if let Some(keys) = table.keys {
                if schema.primary_key != keys.primary_key || schema.merge_key != keys.merge_key {
                    schema.primary_key = keys.primary_key;
                    schema.merge_key = keys.merge_key;
                    schema_changed = true;
                }
            }
        }

        // Table files are committed by now; a lost schema file is one more
        // failed job rather than a failed load.
        if schema_changed {
            if let Err(err) = self.write_schema(&known) {
                ingest_warn!("failed to record schema of load {}: {}", load_id, err);
                report.failed_jobs.push(FailedJob {
                    table: SCHEMA_FILENAME.to_string(),
                    message: err.to_string(),
                });
            }
        }
        Ok(report)
    }

    fn abort(&mut self) {
        if let Some(open) = self.open.take() {
            ingest_debug!("discarding unfinished load {}", open.load_id);
        }
    }
}

/// Appends columns not yet in `known` and returns them, in first-seen order.
/// Object keys are visited in `serde_json`'s sorted order.
fn discover_columns(known: &mut Vec<String>, rows: &[Value]) -> Vec<String> {
    let mut added = Vec::new();
    for row in rows {
        let Value::Object(fields) = row else {
            continue;
        };
        for key in fields.keys() {
            if !known.iter().any(|k| k == key) {
                known.push(key.clone());
                added.push(key.clone());
            }
        }
    }
    added
}
