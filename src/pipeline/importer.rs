use crate::error::{HarvestError, Result};
use crate::metrics::ImportMetrics;
use crate::pipeline::exporter::{chunk_number, ColumnKind, TableSchema};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

/// Loads exporter chunks into an SQLite table whose columns follow the
/// declared schema order.
pub struct ChunkImporter {
    conn: Connection,
    schema: TableSchema,
    table: String,
}

impl ChunkImporter {
    pub fn open(db_path: &Path, table: &str, schema: TableSchema) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(db_path)?;
        Self::with_connection(conn, table, schema)
    }

    pub fn with_connection(conn: Connection, table: &str, schema: TableSchema) -> Result<Self> {
        if !table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') || table.is_empty() {
            return Err(HarvestError::Config(format!("invalid table name '{table}'")));
        }
        let importer = Self { conn, schema, table: table.to_string() };
        importer.create_table()?;
        Ok(importer)
    }

    fn create_table(&self) -> Result<()> {
        let columns: Vec<String> = self
            .schema
            .columns
            .iter()
            .map(|c| {
                let ty = match c.kind {
                    ColumnKind::Text => "TEXT",
                    ColumnKind::Integer => "INTEGER",
                    ColumnKind::Real => "REAL",
                };
                format!("\"{}\" {}", c.name, ty)
            })
            .collect();
        // txn_hash repeats across internal transactions, so it is indexed rather than a key
        let first = self.schema.columns.first().map(|c| c.name).unwrap_or("rowid");
        self.conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {t} ({cols});
             CREATE INDEX IF NOT EXISTS idx_{t}_{first} ON {t} (\"{first}\");",
            t = self.table,
            cols = columns.join(", "),
        ))?;
        Ok(())
    }

    /// Inserts one chunk inside a single transaction. Returns the row count.
    #[instrument(skip(self))]
    pub fn import_chunk(&mut self, path: &Path) -> Result<usize> {
        let mut reader = csv::Reader::from_path(path)?;
        let header = reader.headers()?.clone();
        let expected = self.schema.header();
        if header.iter().ne(expected.iter().copied()) {
            return Err(HarvestError::Schema(format!(
                "{} does not carry the declared column order",
                path.display()
            )));
        }

        let placeholders = vec!["?"; self.schema.columns.len()].join(", ");
        let sql = format!("INSERT INTO {} VALUES ({})", self.table, placeholders);
        let kinds: Vec<ColumnKind> = self.schema.columns.iter().map(|c| c.kind).collect();

        let tx = self.conn.transaction()?;
        let mut count = 0;
        {
            let mut stmt = tx.prepare(&sql)?;
            for record in reader.records() {
                let record = record?;
                let values = record.iter().zip(&kinds).map(|(cell, kind)| coerce(cell, *kind));
                stmt.execute(params_from_iter(values))?;
                count += 1;
            }
        }
        tx.commit()?;
        ImportMetrics::record_rows(count);
        info!("Imported {} rows from {}", count, path.display());
        Ok(count)
    }

    /// Imports every `chunk_<n>.csv` in `dir`, in chunk-number order.
    pub fn import_dir(&mut self, dir: &Path) -> Result<usize> {
        let mut chunks: Vec<(usize, PathBuf)> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter_map(|path| chunk_number(&path).map(|n| (n, path)))
            .collect();
        chunks.sort();

        let mut total = 0;
        for (_, path) in &chunks {
            total += self.import_chunk(path)?;
        }
        info!("Imported {} rows from {} chunks", total, chunks.len());
        Ok(total)
    }

    pub fn row_count(&self) -> Result<i64> {
        Ok(self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {}", self.table), [], |row| row.get(0))?)
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

/// Numeric columns arrive as decimal strings. Integers that overflow i64 and
/// `Real` columns go through f64; empty or unparsable cells become NULL.
fn coerce(cell: &str, kind: ColumnKind) -> SqlValue {
    let cell = cell.trim();
    if cell.is_empty() {
        return SqlValue::Null;
    }
    match kind {
        ColumnKind::Text => SqlValue::Text(cell.to_string()),
        ColumnKind::Integer => match cell.parse::<i64>() {
            Ok(n) => SqlValue::Integer(n),
            Err(_) => real_or_null(cell),
        },
        ColumnKind::Real => real_or_null(cell),
    }
}

fn real_or_null(cell: &str) -> SqlValue {
    match cell.parse::<f64>() {
        Ok(f) => SqlValue::Real(f),
        Err(_) => {
            warn!("Non-numeric value '{}' stored as NULL", cell);
            SqlValue::Null
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coerce() {
        assert_eq!(coerce("46147", ColumnKind::Integer), SqlValue::Integer(46147));
        assert_eq!(coerce("", ColumnKind::Integer), SqlValue::Null);
        assert_eq!(coerce("1e21", ColumnKind::Real), SqlValue::Real(1e21));
        assert_eq!(
            coerce("1000000000000000000000", ColumnKind::Real),
            SqlValue::Real(1e21)
        );
        assert_eq!(coerce("0xabc", ColumnKind::Text), SqlValue::Text("0xabc".into()));
        assert_eq!(coerce("n/a", ColumnKind::Integer), SqlValue::Null);
    }

    #[test]
    fn test_chunk_number() {
        assert_eq!(chunk_number(Path::new("/tmp/chunk_12.csv")), Some(12));
        assert_eq!(chunk_number(Path::new("/tmp/other_1.csv")), None);
        assert_eq!(chunk_number(Path::new("/tmp/chunk_x.csv")), None);
    }

    #[test]
    fn test_rejects_chunk_with_foreign_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chunk_0.csv");
        std::fs::write(&path, "hash,from,to\n0x1,0xa,0xb\n").unwrap();
        let conn = Connection::open_in_memory().unwrap();
        let mut importer = ChunkImporter::with_connection(conn, "transactions", TableSchema::default()).unwrap();

        assert!(matches!(importer.import_chunk(&path), Err(HarvestError::Schema(_))));
        assert_eq!(importer.row_count().unwrap(), 0);
    }

    #[test]
    fn test_rejects_bad_table_name() {
        let conn = Connection::open_in_memory().unwrap();
        assert!(ChunkImporter::with_connection(conn, "tx; DROP", TableSchema::default()).is_err());
    }
}
