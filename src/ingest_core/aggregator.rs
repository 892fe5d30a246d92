//! Per (entity, period) aggregation of metric records

use super::normalizer::MetricRecord;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct AggregateKey {
    pub entity_id: String,
    pub period: i32,
}

impl AggregateKey {
    pub fn new(entity_id: impl Into<String>, period: i32) -> Self {
        Self {
            entity_id: entity_id.into(),
            period,
        }
    }
}

/// Metric name → summed value for one (entity, period) group
pub type MetricValues = BTreeMap<String, f64>;

/// Accumulates records by (entity, period), summing per metric
///
/// Accumulation is pure addition into ordered maps, so the result does not
/// depend on the order records arrive in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricAggregator {
    groups: BTreeMap<AggregateKey, MetricValues>,
    units: BTreeMap<String, String>,
}

impl MetricAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a MetricRecord>) -> Self {
        let mut aggregator = Self::new();
        for record in records {
            aggregator.add_record(record);
        }
        aggregator
    }

    pub fn add_record(&mut self, record: &MetricRecord) {
        let key = AggregateKey::new(record.entity_id.clone(), record.period);
        *self
            .groups
            .entry(key)
            .or_default()
            .entry(record.metric_name.clone())
            .or_insert(0.0) += record.value;

        self.units
            .entry(record.metric_name.clone())
            .or_insert_with(|| record.unit.clone());
    }

    /// Fold another aggregate into this one (summation)
    pub fn absorb(&mut self, other: &MetricAggregator) {
        for (key, metrics) in &other.groups {
            let group = self.groups.entry(key.clone()).or_default();
            for (name, value) in metrics {
                *group.entry(name.clone()).or_insert(0.0) += value;
            }
        }
        for (name, unit) in &other.units {
            self.units.entry(name.clone()).or_insert_with(|| unit.clone());
        }
    }

    pub fn get(&self, entity_id: &str, period: i32) -> Option<&MetricValues> {
        self.groups.get(&AggregateKey::new(entity_id, period))
    }

    pub fn get_value(&self, entity_id: &str, period: i32, metric_name: &str) -> Option<f64> {
        self.get(entity_id, period)?.get(metric_name).copied()
    }

    pub fn unit_of(&self, metric_name: &str) -> Option<&str> {
        self.units.get(metric_name).map(|s| s.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&AggregateKey, &MetricValues)> {
        self.groups.iter()
    }

    pub fn groups(&self) -> &BTreeMap<AggregateKey, MetricValues> {
        &self.groups
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest_core::normalizer::Source;

    fn create_test_record(entity: &str, period: i32, metric: &str, value: f64) -> MetricRecord {
        MetricRecord {
            entity_id: entity.to_string(),
            period,
            metric_name: metric.to_string(),
            value,
            unit: "件".to_string(),
            source: Source::File,
        }
    }

    fn create_test_records() -> Vec<MetricRecord> {
        vec![
            create_test_record("11100", 2012, "establishments", 120.0),
            create_test_record("11100", 2012, "establishments", 35.0),
            create_test_record("11100", 2012, "employees", 910.0),
            create_test_record("11100", 2021, "establishments", 140.0),
            create_test_record("11203", 2012, "establishments", 77.0),
            create_test_record("11203", 2012, "employees", 402.0),
            create_test_record("11203", 2012, "employees", 18.0),
        ]
    }

    #[test]
    fn test_sums_within_group() {
        let agg = MetricAggregator::from_records(&create_test_records());

        assert_eq!(agg.len(), 3);
        assert_eq!(agg.get_value("11100", 2012, "establishments"), Some(155.0));
        assert_eq!(agg.get_value("11100", 2012, "employees"), Some(910.0));
        assert_eq!(agg.get_value("11203", 2012, "employees"), Some(420.0));
        assert_eq!(agg.get_value("11203", 2021, "employees"), None);
        assert_eq!(agg.unit_of("establishments"), Some("件"));
    }

    #[test]
    fn test_order_independent() {
        let records = create_test_records();
        let forward = MetricAggregator::from_records(&records);

        let reversed: Vec<MetricRecord> = records.iter().rev().cloned().collect();
        assert_eq!(MetricAggregator::from_records(&reversed), forward);

        // a fixed interleaving stands in for an arbitrary shuffle
        let mut rotated = records.clone();
        for shift in 1..records.len() {
            rotated.rotate_left(1);
            assert_eq!(
                MetricAggregator::from_records(&rotated),
                forward,
                "rotation by {} changed the aggregate",
                shift
            );
        }
    }

    #[test]
    fn test_absorb_is_associative() {
        let records = create_test_records();
        let (left, right) = records.split_at(3);

        let mut combined = MetricAggregator::from_records(left);
        combined.absorb(&MetricAggregator::from_records(right));

        let mut other_way = MetricAggregator::from_records(right);
        other_way.absorb(&MetricAggregator::from_records(left));

        assert_eq!(combined, MetricAggregator::from_records(&records));
        assert_eq!(other_way, combined);
    }
}
