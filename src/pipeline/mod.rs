//! # Collection and Orchestration
//!
//! Wires the ingest core to its collaborators:
//! - `source` - the `StatsSource` seam and fetch error classification
//! - `estat` - reqwest client for the e-Stat JSON API
//! - `collector` - bounded concurrent batches with per-target failure records
//! - `retry` - exponential backoff for transient fetch errors
//! - `runner` - the end-to-end analysis run
//!
//! Only the collector is concurrent. Everything after collection runs
//! synchronously over owned data.

pub mod collector;
pub mod estat;
pub mod retry;
pub mod runner;
pub mod source;

pub use collector::{collect_batched, CollectionReport, CollectorConfig, FetchFailure};
pub use estat::{EstatClient, EstatConfig};
pub use runner::{analyze, run_analysis, AnalysisOptions, AnalysisReport, ApiCollection, FileInput};
pub use source::{FetchError, FetchTarget, StatsSource};

use crate::ingest_core::{EntityError, MergeError, ReaderError};
use crate::report::ReportError;

#[derive(Debug)]
pub enum PipelineError {
    Entity(EntityError),
    Reader(ReaderError),
    Merge(MergeError),
    Fetch(FetchError),
    Report(ReportError),
}

impl From<EntityError> for PipelineError {
    fn from(err: EntityError) -> Self {
        PipelineError::Entity(err)
    }
}

impl From<ReaderError> for PipelineError {
    fn from(err: ReaderError) -> Self {
        PipelineError::Reader(err)
    }
}

impl From<MergeError> for PipelineError {
    fn from(err: MergeError) -> Self {
        PipelineError::Merge(err)
    }
}

impl From<FetchError> for PipelineError {
    fn from(err: FetchError) -> Self {
        PipelineError::Fetch(err)
    }
}

impl From<ReportError> for PipelineError {
    fn from(err: ReportError) -> Self {
        PipelineError::Report(err)
    }
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineError::Entity(e) => write!(f, "{}", e),
            PipelineError::Reader(e) => write!(f, "{}", e),
            PipelineError::Merge(e) => write!(f, "{}", e),
            PipelineError::Fetch(e) => write!(f, "{}", e),
            PipelineError::Report(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for PipelineError {}
