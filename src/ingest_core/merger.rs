//! Provenance-preserving merge of independently sourced aggregates
//!
//! # Policy
//!
//! - A key present in one source passes through unchanged
//! - A key present in several sources is kept once per source (parallel
//!   records), never summed across sources or overwritten
//! - The same key arriving twice from the same source is last-write-wins,
//!   which makes re-merging a source a no-op
//! - Values from checked sources (API by default) are compared against the
//!   average of the two nearest other periods and flagged when the ratio
//!   leaves [0.3, 3]

use super::aggregator::{AggregateKey, MetricAggregator, MetricValues};
use super::detector::{nearest_neighbour_average, AnomalyDetector, AnomalyFlag};
use super::normalizer::{MetricRecord, Source};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug)]
pub enum MergeError {
    NoInputs,
}

impl std::fmt::Display for MergeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MergeError::NoInputs => write!(f, "Missing input: nothing to merge"),
        }
    }
}

impl std::error::Error for MergeError {}

#[derive(Debug, Clone)]
pub struct SourcedAggregate {
    pub source: Source,
    pub aggregate: MetricAggregator,
}

impl SourcedAggregate {
    pub fn new(source: Source, aggregate: MetricAggregator) -> Self {
        Self { source, aggregate }
    }
}

#[derive(Debug, Clone)]
pub struct MergeConfig {
    /// Sources whose values get the neighbouring-period sanity check
    pub checked_sources: Vec<Source>,
    pub high_ratio: f64,
    pub low_ratio: f64,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            checked_sources: vec![Source::Api],
            high_ratio: 3.0,
            low_ratio: 0.3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergedRecord {
    pub entity_id: String,
    pub period: i32,
    pub metric_name: String,
    pub value: f64,
    pub unit: String,
    pub source: Source,
    pub anomaly: Option<AnomalyFlag>,
}

impl MergedRecord {
    pub fn is_suspect(&self) -> bool {
        self.anomaly.is_some()
    }

    pub fn to_metric_record(&self) -> MetricRecord {
        MetricRecord {
            entity_id: self.entity_id.clone(),
            period: self.period,
            metric_name: self.metric_name.clone(),
            value: self.value,
            unit: self.unit.clone(),
            source: self.source,
        }
    }
}

type CellKey = (String, i32, String, Source);

/// Unified record set, ordered by (entity, period, metric, source)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergedDataset {
    records: Vec<MergedRecord>,
}

impl MergedDataset {
    pub fn records(&self) -> &[MergedRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn suspect_records(&self) -> Vec<&MergedRecord> {
        self.records.iter().filter(|r| r.is_suspect()).collect()
    }

    /// Sum over all sources per (entity, period, metric)
    pub fn totals(&self) -> BTreeMap<(String, i32, String), f64> {
        let mut totals = BTreeMap::new();
        for r in &self.records {
            *totals
                .entry((r.entity_id.clone(), r.period, r.metric_name.clone()))
                .or_insert(0.0) += r.value;
        }
        totals
    }

    pub fn entities(&self) -> Vec<String> {
        let set: BTreeSet<&str> = self.records.iter().map(|r| r.entity_id.as_str()).collect();
        set.into_iter().map(String::from).collect()
    }

    pub fn metrics_for(&self, entity_id: &str) -> Vec<String> {
        let set: BTreeSet<&str> = self
            .records
            .iter()
            .filter(|r| r.entity_id == entity_id)
            .map(|r| r.metric_name.as_str())
            .collect();
        set.into_iter().map(String::from).collect()
    }

    pub fn unit_of(&self, metric_name: &str) -> Option<&str> {
        self.records
            .iter()
            .find(|r| r.metric_name == metric_name)
            .map(|r| r.unit.as_str())
    }

    /// One value per period for an entity/metric
    ///
    /// Parallel source values at the same period are averaged. With
    /// `exclude_suspect`, flagged values are left out unless every value at
    /// that period is flagged.
    pub fn series(&self, entity_id: &str, metric_name: &str, exclude_suspect: bool) -> Vec<(i32, f64)> {
        let mut by_period: BTreeMap<i32, Vec<&MergedRecord>> = BTreeMap::new();
        for r in self
            .records
            .iter()
            .filter(|r| r.entity_id == entity_id && r.metric_name == metric_name)
        {
            by_period.entry(r.period).or_default().push(r);
        }

        by_period
            .into_iter()
            .map(|(period, records)| {
                let trusted: Vec<f64> = records
                    .iter()
                    .filter(|r| !(exclude_suspect && r.is_suspect()))
                    .map(|r| r.value)
                    .collect();
                let values = if trusted.is_empty() {
                    records.iter().map(|r| r.value).collect()
                } else {
                    trusted
                };
                (period, values.iter().sum::<f64>() / values.len() as f64)
            })
            .collect()
    }

    /// Collapse back to (entity, period) groups using the `series` policy
    pub fn group_values(&self, exclude_suspect: bool) -> BTreeMap<AggregateKey, MetricValues> {
        let mut groups: BTreeMap<AggregateKey, MetricValues> = BTreeMap::new();
        for entity in self.entities() {
            for metric in self.metrics_for(&entity) {
                for (period, value) in self.series(&entity, &metric, exclude_suspect) {
                    groups
                        .entry(AggregateKey::new(entity.clone(), period))
                        .or_default()
                        .insert(metric.clone(), value);
                }
            }
        }
        groups
    }

    pub fn to_metric_records(&self) -> Vec<MetricRecord> {
        self.records.iter().map(|r| r.to_metric_record()).collect()
    }
}

pub struct Merger {
    config: MergeConfig,
    detector: AnomalyDetector,
}

impl Merger {
    pub fn new(config: MergeConfig) -> Self {
        let detector = AnomalyDetector::new(config.high_ratio, config.low_ratio);
        Self { config, detector }
    }

    pub fn with_defaults() -> Self {
        Self::new(MergeConfig::default())
    }

    pub fn merge(&self, inputs: &[SourcedAggregate]) -> Result<MergedDataset, MergeError> {
        if inputs.is_empty() {
            return Err(MergeError::NoInputs);
        }

        let mut cells: BTreeMap<CellKey, (f64, String)> = BTreeMap::new();
        for input in inputs {
            for (key, metrics) in input.aggregate.iter() {
                for (metric_name, value) in metrics {
                    let unit = input.aggregate.unit_of(metric_name).unwrap_or("").to_string();
                    let cell = (key.entity_id.clone(), key.period, metric_name.clone(), input.source);
                    if let Some((previous, _)) = cells.insert(cell, (*value, unit)) {
                        log::debug!(
                            "Duplicate {} value for {}/{}/{} replaced ({} -> {})",
                            input.source.as_str(),
                            key.entity_id,
                            key.period,
                            metric_name,
                            previous,
                            value
                        );
                    }
                }
            }
        }

        let references = self.reference_series(&cells);

        let mut records = Vec::with_capacity(cells.len());
        for ((entity_id, period, metric_name, source), (value, unit)) in cells {
            let anomaly = if self.config.checked_sources.contains(&source) {
                let series = references
                    .get(&(entity_id.clone(), metric_name.clone()))
                    .map(|s| s.as_slice())
                    .unwrap_or(&[]);
                self.detector
                    .detect(value, nearest_neighbour_average(period, series))
            } else {
                None
            };

            if let Some(flag) = &anomaly {
                log::warn!(
                    "⚠️  Suspect {} value {}/{}/{}: {} vs neighbour avg {:.1} (ratio {:.2}, {})",
                    source.as_str(),
                    entity_id,
                    period,
                    metric_name,
                    value,
                    flag.neighbour_average,
                    flag.ratio,
                    flag.kind.as_str()
                );
            }

            records.push(MergedRecord {
                entity_id,
                period,
                metric_name,
                value,
                unit,
                source,
                anomaly,
            });
        }

        log::info!(
            "🔀 Merged {} sources into {} records",
            inputs.len(),
            records.len()
        );
        Ok(MergedDataset { records })
    }

    /// Per (entity, metric): one reference value per period
    ///
    /// Unchecked sources are trusted first; a period only covered by checked
    /// sources falls back to their mean.
    fn reference_series(
        &self,
        cells: &BTreeMap<CellKey, (f64, String)>,
    ) -> BTreeMap<(String, String), Vec<(i32, f64)>> {
        let mut per_period: BTreeMap<(String, String), BTreeMap<i32, (Vec<f64>, Vec<f64>)>> =
            BTreeMap::new();

        for ((entity_id, period, metric_name, source), (value, _)) in cells {
            let (trusted, checked) = per_period
                .entry((entity_id.clone(), metric_name.clone()))
                .or_default()
                .entry(*period)
                .or_default();
            if self.config.checked_sources.contains(source) {
                checked.push(*value);
            } else {
                trusted.push(*value);
            }
        }

        per_period
            .into_iter()
            .map(|(key, periods)| {
                let series = periods
                    .into_iter()
                    .map(|(period, (trusted, checked))| {
                        let values = if trusted.is_empty() { checked } else { trusted };
                        (period, values.iter().sum::<f64>() / values.len() as f64)
                    })
                    .collect();
                (key, series)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest_core::detector::AnomalyKind;

    fn create_test_record(entity: &str, period: i32, value: f64, source: Source) -> MetricRecord {
        MetricRecord {
            entity_id: entity.to_string(),
            period,
            metric_name: "establishments".to_string(),
            value,
            unit: "件".to_string(),
            source,
        }
    }

    fn create_file_aggregate() -> SourcedAggregate {
        let records = vec![
            create_test_record("11100", 2007, 90.0, Source::File),
            create_test_record("11100", 2012, 100.0, Source::File),
            create_test_record("11100", 2021, 100.0, Source::File),
            create_test_record("11203", 2012, 40.0, Source::File),
        ];
        SourcedAggregate::new(Source::File, MetricAggregator::from_records(&records))
    }

    fn create_api_aggregate(value: f64) -> SourcedAggregate {
        let records = vec![create_test_record("11100", 2014, value, Source::Api)];
        SourcedAggregate::new(Source::Api, MetricAggregator::from_records(&records))
    }

    #[test]
    fn test_no_inputs_is_missing_input() {
        let merger = Merger::with_defaults();
        assert!(matches!(merger.merge(&[]), Err(MergeError::NoInputs)));
    }

    #[test]
    fn test_single_source_passes_through() {
        let merger = Merger::with_defaults();
        let dataset = merger.merge(&[create_file_aggregate()]).unwrap();

        assert_eq!(dataset.len(), 4);
        assert!(dataset.records().iter().all(|r| r.source == Source::File));
        assert!(dataset.suspect_records().is_empty());
        assert_eq!(dataset.entities(), vec!["11100", "11203"]);
    }

    #[test]
    fn test_overlapping_keys_kept_per_source() {
        let merger = Merger::with_defaults();
        let api = SourcedAggregate::new(
            Source::Api,
            MetricAggregator::from_records(&[create_test_record("11100", 2012, 110.0, Source::Api)]),
        );

        let dataset = merger.merge(&[create_file_aggregate(), api]).unwrap();

        let at_2012: Vec<&MergedRecord> = dataset
            .records()
            .iter()
            .filter(|r| r.entity_id == "11100" && r.period == 2012)
            .collect();
        assert_eq!(at_2012.len(), 2);
        assert_eq!(at_2012[0].source, Source::Api);
        assert_eq!(at_2012[0].value, 110.0);
        assert_eq!(at_2012[1].source, Source::File);
        assert_eq!(at_2012[1].value, 100.0);

        // series averages the parallel values
        let series = dataset.series("11100", "establishments", false);
        assert_eq!(series, vec![(2007, 90.0), (2012, 105.0), (2021, 100.0)]);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let merger = Merger::with_defaults();

        let once = merger
            .merge(&[create_file_aggregate(), create_api_aggregate(120.0)])
            .unwrap();
        let twice = merger
            .merge(&[
                create_file_aggregate(),
                create_api_aggregate(120.0),
                create_file_aggregate(),
            ])
            .unwrap();

        assert_eq!(once.totals(), twice.totals());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_api_outlier_is_flagged() {
        let merger = Merger::with_defaults();
        let dataset = merger
            .merge(&[create_file_aggregate(), create_api_aggregate(900.0)])
            .unwrap();

        let suspects = dataset.suspect_records();
        assert_eq!(suspects.len(), 1);

        let flag = suspects[0].anomaly.unwrap();
        assert_eq!(suspects[0].period, 2014);
        assert_eq!(flag.kind, AnomalyKind::High);
        // nearest periods to 2014 are 2012 and 2007 (100 and 90)
        assert_eq!(flag.neighbour_average, 95.0);
        assert!((flag.ratio - 900.0 / 95.0).abs() < 1e-9);

        // suspect values drop out of the trusted series
        let trusted = dataset.series("11100", "establishments", true);
        assert_eq!(trusted.len(), 4);
        assert_eq!(trusted[2], (2014, 900.0));
    }

    #[test]
    fn test_ratio_nine_against_flat_neighbours() {
        let records = vec![
            create_test_record("11100", 2012, 100.0, Source::File),
            create_test_record("11100", 2021, 100.0, Source::File),
        ];
        let file = SourcedAggregate::new(Source::File, MetricAggregator::from_records(&records));

        let dataset = Merger::with_defaults()
            .merge(&[file, create_api_aggregate(900.0)])
            .unwrap();

        let flag = dataset.suspect_records()[0].anomaly.unwrap();
        assert_eq!(flag.ratio, 9.0);
        assert_eq!(flag.kind, AnomalyKind::High);
    }

    #[test]
    fn test_file_values_are_not_checked() {
        let records = vec![
            create_test_record("11100", 2012, 100.0, Source::File),
            create_test_record("11100", 2021, 1000.0, Source::File),
        ];
        let file = SourcedAggregate::new(Source::File, MetricAggregator::from_records(&records));

        let dataset = Merger::with_defaults().merge(&[file]).unwrap();
        assert!(dataset.suspect_records().is_empty());
    }

    #[test]
    fn test_group_values_and_records() {
        let dataset = Merger::with_defaults()
            .merge(&[create_file_aggregate(), create_api_aggregate(120.0)])
            .unwrap();

        let groups = dataset.group_values(true);
        assert_eq!(groups.len(), 5);
        assert_eq!(
            groups[&AggregateKey::new("11100", 2014)]["establishments"],
            120.0
        );

        let plain = dataset.to_metric_records();
        assert_eq!(plain.len(), 5);
        assert_eq!(dataset.unit_of("establishments"), Some("件"));
        assert_eq!(dataset.metrics_for("11203"), vec!["establishments"]);
    }
}
