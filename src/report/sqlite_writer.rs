//! SQLite backend: persists the merged record set
//!
//! Each write replaces the stored set, so cells missing from a rerun do not
//! linger. Trends and period changes are derived on demand and are not stored.

use super::writer_backend::{ReportError, ReportWriterBackend};
use super::ReportView;
use rusqlite::{params, Connection};
use std::path::Path;

pub struct SqliteReportWriter {
    conn: Connection,
}

impl SqliteReportWriter {
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self, ReportError> {
        if let Some(parent) = db_path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(db_path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;")?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS metric_records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                entity_id TEXT NOT NULL,
                period INTEGER NOT NULL,
                metric_name TEXT NOT NULL,
                value REAL NOT NULL,
                unit TEXT NOT NULL,
                source TEXT NOT NULL,
                anomaly TEXT,
                anomaly_ratio REAL,
                UNIQUE (entity_id, period, metric_name, source)
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_entity_metric ON metric_records(entity_id, metric_name, period)",
            [],
        )?;

        log::info!("✅ SQLite report database initialized");

        Ok(Self { conn })
    }

    pub fn record_count(&self) -> Result<usize, ReportError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM metric_records", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

impl ReportWriterBackend for SqliteReportWriter {
    fn write_report(&mut self, view: &ReportView<'_>) -> Result<(), ReportError> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM metric_records", [])?;

        for r in view.records {
            tx.execute(
                "INSERT OR REPLACE INTO metric_records
                 (entity_id, period, metric_name, value, unit, source, anomaly, anomaly_ratio)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    r.entity_id,
                    r.period,
                    r.metric_name,
                    r.value,
                    r.unit,
                    r.source.as_str(),
                    r.anomaly.map(|a| a.kind.as_str()),
                    r.anomaly.map(|a| a.ratio),
                ],
            )?;
        }

        tx.commit()?;
        log::debug!("✅ Wrote {} merged records to SQLite", view.records.len());
        Ok(())
    }

    fn flush(&mut self) -> Result<(), ReportError> {
        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "SQLite"
    }
}
