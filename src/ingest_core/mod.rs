//! Ingest Core - Retail Statistics Normalisation and Merge
//!
//! Turns raw survey rows (legacy CSV extracts and e-Stat API values) into
//! normalised metric records, aggregates them per municipality and year, and
//! merges independently sourced aggregates with provenance kept intact.
//!
//! # Architecture
//!
//! ```text
//! CsvFileReader / ApiResponse::to_raw_rows → RawRow (layout tag + fields)
//!     ↓
//! RowExtractor (layout fallbacks, retail + target-area filter)
//!     ↓
//! MetricAggregator (entity, period) → metric sums
//!     ↓
//! Merger (parallel per-source records + AnomalyDetector)
//!     ↓
//! compute_trend / compare_periods / CorrelationEngine / describe_groups
//! ```

pub mod aggregator;
pub mod api_response;
pub mod correlator;
pub mod detector;
pub mod entity;
pub mod extractor;
pub mod merger;
pub mod normalizer;
pub mod ratios;
pub mod reader;
pub mod stats;
pub mod trend;

pub use aggregator::{AggregateKey, MetricAggregator, MetricValues};
pub use api_response::{ApiError, ApiResponse, ClassTable};
pub use correlator::{CorrelationEngine, MetricCorrelation};
pub use detector::{AnomalyDetector, AnomalyFlag, AnomalyKind};
pub use entity::{Entity, EntityError, EntityRegistry, PopulationBucket};
pub use extractor::{ExtractorConfig, RawRow, RetailPattern, RowExtractor, RowLayout};
pub use merger::{MergeConfig, MergeError, MergedDataset, MergedRecord, Merger, SourcedAggregate};
pub use normalizer::{Metric, MetricRecord, SentinelPolicy, Source};
pub use reader::{CsvEncoding, CsvFileReader, ReaderError};
pub use stats::{describe_groups, DescriptiveStats, GroupBy, GroupStatistics};
pub use trend::{compare_periods, compute_trend, PeriodChange, TrendError, TrendSummary};
