//! Unified report writer
//!
//! Routes a finished analysis to the backend picked by `--output`.

use super::csv_writer::CsvReportWriter;
use super::json_writer::JsonReportWriter;
use super::sqlite_writer::SqliteReportWriter;
use super::table_writer::TableReportWriter;
use super::writer_backend::{ReportError, ReportWriterBackend};
use super::ReportView;
use std::env;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

const DEFAULT_SQLITE_PATH: &str = "data/retailstat.db";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    #[default]
    Table,
    Csv,
    Json,
    Sqlite,
}

impl OutputMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputMode::Table => "table",
            OutputMode::Csv => "csv",
            OutputMode::Json => "json",
            OutputMode::Sqlite => "sqlite",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "table" => Some(OutputMode::Table),
            "csv" => Some(OutputMode::Csv),
            "json" => Some(OutputMode::Json),
            "sqlite" => Some(OutputMode::Sqlite),
            _ => None,
        }
    }

    pub fn all() -> [OutputMode; 4] {
        [
            OutputMode::Table,
            OutputMode::Csv,
            OutputMode::Json,
            OutputMode::Sqlite,
        ]
    }
}

/// `--output <mode>`; unknown or missing values fall back to table
pub fn parse_output_mode_from_args() -> OutputMode {
    let args: Vec<String> = env::args().collect();
    parse_output_mode(&args)
}

fn parse_output_mode(args: &[String]) -> OutputMode {
    if let Some(idx) = args.iter().position(|x| x == "--output") {
        if let Some(mode) = args.get(idx + 1).and_then(|s| OutputMode::from_str(s)) {
            return mode;
        }
        log::warn!("⚠️  Unknown --output value, using table");
    }

    OutputMode::Table
}

/// Unified writer that routes to one of the report backends
pub enum ReportWriter {
    Table(TableReportWriter),
    Csv(CsvReportWriter),
    Json(JsonReportWriter),
    Sqlite(SqliteReportWriter),
}

impl ReportWriter {
    /// Text modes write to `output_path` when given, stdout otherwise;
    /// SQLite always needs a database path
    pub fn new(mode: OutputMode, output_path: Option<PathBuf>) -> Result<Self, ReportError> {
        let out = || -> Result<Box<dyn Write>, ReportError> {
            let out: Box<dyn Write> = match &output_path {
                Some(path) => Box::new(BufWriter::new(File::create(path)?)),
                None => Box::new(std::io::stdout()),
            };
            Ok(out)
        };

        let writer = match mode {
            OutputMode::Table => ReportWriter::Table(TableReportWriter::new(out()?)),
            OutputMode::Csv => ReportWriter::Csv(CsvReportWriter::new(out()?)),
            OutputMode::Json => ReportWriter::Json(JsonReportWriter::new(out()?)),
            OutputMode::Sqlite => {
                let path = output_path
                    .clone()
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_SQLITE_PATH));
                ReportWriter::Sqlite(SqliteReportWriter::new(path)?)
            }
        };

        Ok(writer)
    }

    fn backend(&mut self) -> &mut dyn ReportWriterBackend {
        match self {
            ReportWriter::Table(w) => w,
            ReportWriter::Csv(w) => w,
            ReportWriter::Json(w) => w,
            ReportWriter::Sqlite(w) => w,
        }
    }

    pub fn write_report(&mut self, view: &ReportView<'_>) -> Result<(), ReportError> {
        self.backend().write_report(view)
    }

    pub fn flush(&mut self) -> Result<(), ReportError> {
        self.backend().flush()
    }

    pub fn backend_type(&self) -> &'static str {
        match self {
            ReportWriter::Table(w) => w.backend_type(),
            ReportWriter::Csv(w) => w.backend_type(),
            ReportWriter::Json(w) => w.backend_type(),
            ReportWriter::Sqlite(w) => w.backend_type(),
        }
    }
}
