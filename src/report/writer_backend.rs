//! Writer backend trait for analysis reports

use super::ReportView;

#[derive(Debug)]
pub enum ReportError {
    Io(std::io::Error),
    Serialization(serde_json::Error),
    Csv(csv::Error),
    Database(String),
}

impl From<std::io::Error> for ReportError {
    fn from(err: std::io::Error) -> Self {
        ReportError::Io(err)
    }
}

impl From<serde_json::Error> for ReportError {
    fn from(err: serde_json::Error) -> Self {
        ReportError::Serialization(err)
    }
}

impl From<csv::Error> for ReportError {
    fn from(err: csv::Error) -> Self {
        ReportError::Csv(err)
    }
}

impl From<rusqlite::Error> for ReportError {
    fn from(err: rusqlite::Error) -> Self {
        ReportError::Database(err.to_string())
    }
}

impl std::fmt::Display for ReportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReportError::Io(e) => write!(f, "IO error: {}", e),
            ReportError::Serialization(e) => write!(f, "Serialization error: {}", e),
            ReportError::Csv(e) => write!(f, "CSV error: {}", e),
            ReportError::Database(e) => write!(f, "Database error: {}", e),
        }
    }
}

impl std::error::Error for ReportError {}

/// Backend trait for writing a finished report
pub trait ReportWriterBackend {
    fn write_report(&mut self, view: &ReportView<'_>) -> Result<(), ReportError>;

    fn flush(&mut self) -> Result<(), ReportError>;

    /// Get backend type for logging
    fn backend_type(&self) -> &'static str;
}
