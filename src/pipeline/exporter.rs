//! Batch exporter: per-identifier result files to bounded CSV chunks.
//!
//! Each stored result is flattened into rows of the declared transaction
//! schema, then folded through an [`ExportBuffer`] that decides when a chunk
//! is cut. Chunks always carry the declared header in declared order; the
//! destination import matches columns by position.

use crate::constants::CHUNK_PREFIX;
use crate::error::Result;
use crate::metrics::ExportMetrics;
use crate::pipeline::fetcher::read_stored;
use crate::types::{EntityIdentifier, Record};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    Integer,
    /// Numeric values too wide for a 64-bit integer (wei amounts)
    Real,
}

#[derive(Debug, Clone, Copy)]
pub struct Column {
    pub name: &'static str,
    pub kind: ColumnKind,
}

const fn col(name: &'static str, kind: ColumnKind) -> Column {
    Column { name, kind }
}

/// Destination table contract for transaction records.
pub const TRANSACTION_COLUMNS: [Column; 18] = [
    col("txn_hash", ColumnKind::Text),
    col("add_contract", ColumnKind::Text),
    col("blockNumber", ColumnKind::Integer),
    col("confirmations", ColumnKind::Integer),
    col("contractAddress", ColumnKind::Text),
    col("cumulativeGasUsed", ColumnKind::Integer),
    col("add_from", ColumnKind::Text),
    col("add_to", ColumnKind::Text),
    col("gas", ColumnKind::Integer),
    col("gasPrice", ColumnKind::Real),
    col("gasUsed", ColumnKind::Integer),
    col("txn_input", ColumnKind::Text),
    col("isError", ColumnKind::Integer),
    col("nonce", ColumnKind::Integer),
    col("timeStamp", ColumnKind::Integer),
    col("transactionIndex", ColumnKind::Integer),
    col("txreceipt_status", ColumnKind::Integer),
    col("value", ColumnKind::Real),
];

/// Source field names that are reserved words in the destination schema
const RESERVED_RENAMES: [(&str, &str); 4] = [
    ("from", "add_from"),
    ("to", "add_to"),
    ("input", "txn_input"),
    ("hash", "txn_hash"),
];

const DROPPED_FIELDS: [&str; 1] = ["blockHash"];

/// Column receiving the identifier the records were fetched for
const IDENTIFIER_COLUMN: &str = "add_contract";

pub type Row = Vec<String>;

#[derive(Debug, Clone)]
pub struct TableSchema {
    pub columns: &'static [Column],
}

impl Default for TableSchema {
    fn default() -> Self {
        Self { columns: &TRANSACTION_COLUMNS }
    }
}

impl TableSchema {
    pub fn header(&self) -> Vec<&'static str> {
        self.columns.iter().map(|c| c.name).collect()
    }

    /// Projects one record onto the schema. Absent fields become empty cells,
    /// fields outside the schema are dropped.
    pub fn to_row(&self, record: &Record, identifier: &EntityIdentifier) -> Row {
        let mut renamed = Record::new();
        for (key, value) in record {
            if DROPPED_FIELDS.contains(&key.as_str()) {
                continue;
            }
            let name = RESERVED_RENAMES
                .iter()
                .find(|(from, _)| *from == key.as_str())
                .map(|(_, to)| *to)
                .unwrap_or(key.as_str());
            renamed.insert(name.to_string(), value.clone());
        }
        renamed.insert(IDENTIFIER_COLUMN.to_string(), Value::String(identifier.to_string()));

        self.columns
            .iter()
            .map(|c| renamed.get(c.name).map(cell_text).unwrap_or_default())
            .collect()
    }

    pub fn to_rows(&self, records: &[Record], identifier: &EntityIdentifier) -> Vec<Row> {
        records.iter().map(|r| self.to_row(r, identifier)).collect()
    }
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => u8::from(*b).to_string(),
        other => other.to_string(),
    }
}

/// Running accumulation of rows waiting to become a chunk.
///
/// `push` returns the rows to flush, if any:
/// - a record set larger than the threshold is flushed on its own and the
///   buffer is left as it was;
/// - if adding the set would take the buffer past the threshold, the buffer
///   is flushed and restarted with the set;
/// - otherwise the set is appended.
///
/// Every flushed chunk is either one oversized set or whole consecutive sets
/// summing to at most the threshold.
#[derive(Debug, Clone)]
pub struct ExportBuffer {
    rows: Vec<Row>,
    threshold: usize,
}

impl ExportBuffer {
    pub fn new(threshold: usize) -> Self {
        Self { rows: Vec::new(), threshold }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn push(&mut self, set: Vec<Row>) -> Option<Vec<Row>> {
        if set.len() > self.threshold {
            return Some(set);
        }
        if !self.rows.is_empty() && self.rows.len() + set.len() > self.threshold {
            return Some(std::mem::replace(&mut self.rows, set));
        }
        self.rows.extend(set);
        None
    }

    /// Remaining rows at end of run, if any.
    pub fn finish(self) -> Option<Vec<Row>> {
        if self.rows.is_empty() {
            None
        } else {
            Some(self.rows)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkInfo {
    pub path: PathBuf,
    pub rows: usize,
}

#[derive(Debug, Default)]
pub struct ExportReport {
    pub chunks: Vec<ChunkInfo>,
    pub files_read: usize,
    pub skipped_files: Vec<PathBuf>,
    pub total_rows: usize,
}

/// Writes numbered chunk files with a fixed header.
struct ChunkWriter<'a> {
    dir: &'a Path,
    header: Vec<&'static str>,
    next_index: usize,
}

impl ChunkWriter<'_> {
    fn write(&mut self, rows: &[Row]) -> Result<ChunkInfo> {
        let path = self.dir.join(format!("{}{}.csv", CHUNK_PREFIX, self.next_index));
        let mut writer = csv::Writer::from_path(&path)?;
        writer.write_record(&self.header)?;
        for row in rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        self.next_index += 1;
        ExportMetrics::record_chunk(rows.len());
        info!("Wrote {} rows to {}", rows.len(), path.display());
        Ok(ChunkInfo { path, rows: rows.len() })
    }
}

/// Number `n` of a `chunk_<n>.csv` file name.
pub(crate) fn chunk_number(path: &Path) -> Option<usize> {
    path.file_name()?
        .to_str()?
        .strip_prefix(CHUNK_PREFIX)?
        .strip_suffix(".csv")?
        .parse()
        .ok()
}

fn remove_stale_chunks(dir: &Path) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if chunk_number(&path).is_some() {
            fs::remove_file(&path)?;
            debug!("Removed stale chunk {}", path.display());
        }
    }
    Ok(())
}

pub struct BatchExporter {
    schema: TableSchema,
    threshold: usize,
}

impl BatchExporter {
    pub fn new(schema: TableSchema, threshold: usize) -> Self {
        Self { schema, threshold }
    }

    /// Exports every `*.json` result in `input_dir` (file-name order) into
    /// `chunk_<n>.csv` files under `output_dir`. Chunks left by an earlier run
    /// are removed first. Unreadable files are logged and skipped; the
    /// remaining buffer is flushed at the end.
    #[instrument(skip(self))]
    pub fn run(&self, input_dir: &Path, output_dir: &Path) -> Result<ExportReport> {
        fs::create_dir_all(output_dir)?;
        remove_stale_chunks(output_dir)?;
        let mut files: Vec<PathBuf> = fs::read_dir(input_dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("json"))
            .collect();
        files.sort();

        let mut writer = ChunkWriter { dir: output_dir, header: self.schema.header(), next_index: 0 };
        let mut report = ExportReport::default();

        let buffer = files.iter().try_fold(ExportBuffer::new(self.threshold), |mut buffer, path| -> Result<ExportBuffer> {
            let stored = match read_stored(path) {
                Ok(stored) => stored,
                Err(e) => {
                    warn!(file = %path.display(), "Skipping unreadable result file: {}", e);
                    ExportMetrics::record_skipped_file();
                    report.skipped_files.push(path.clone());
                    return Ok(buffer);
                }
            };
            report.files_read += 1;
            if stored.result.is_empty() {
                debug!("No records for {}", stored.identifier);
                return Ok(buffer);
            }

            let rows = self.schema.to_rows(&stored.result, &stored.identifier);
            report.total_rows += rows.len();
            if let Some(chunk) = buffer.push(rows) {
                report.chunks.push(writer.write(&chunk)?);
            }
            Ok(buffer)
        })?;

        if let Some(rest) = buffer.finish() {
            report.chunks.push(writer.write(&rest)?);
        }

        info!(
            "Export done: {} files, {} rows, {} chunks, {} skipped",
            report.files_read,
            report.total_rows,
            report.chunks.len(),
            report.skipped_files.len()
        );
        Ok(report)
    }
}
