//! Grouped descriptive statistics over the trusted (entity, period) values
//!
//! Every metric present in the groups (base metrics and derived ratios such
//! as `employeesPerEstablishment`) is summarised three ways: per period, per
//! parent region and per entity.

use super::aggregator::{AggregateKey, MetricValues};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum GroupBy {
    #[serde(rename = "period")]
    Period,
    #[serde(rename = "region")]
    Region,
    #[serde(rename = "entity")]
    Entity,
}

impl GroupBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupBy::Period => "period",
            GroupBy::Region => "region",
            GroupBy::Entity => "entity",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DescriptiveStats {
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    /// Sample standard deviation (n - 1); `None` below two values
    pub std: Option<f64>,
    pub min: f64,
    pub max: f64,
}

impl DescriptiveStats {
    /// `None` for an empty slice
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }

        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let count = sorted.len();
        let mean = sorted.iter().sum::<f64>() / count as f64;
        let mid = count / 2;
        let median = if count % 2 == 0 {
            (sorted[mid - 1] + sorted[mid]) / 2.0
        } else {
            sorted[mid]
        };
        let std = (count > 1).then(|| {
            let ss: f64 = sorted.iter().map(|v| (v - mean).powi(2)).sum();
            (ss / (count - 1) as f64).sqrt()
        });

        Some(Self {
            count,
            mean,
            median,
            std,
            min: sorted[0],
            max: sorted[count - 1],
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupStatistics {
    pub group_by: GroupBy,
    pub group: String,
    pub metric_name: String,
    #[serde(flatten)]
    pub stats: DescriptiveStats,
}

/// Summarise every metric by period, region and entity
///
/// `regions` maps entity id to parent region id; entities without a region
/// are left out of the regional grouping only. Output is ordered by
/// (grouping, group, metric).
pub fn describe_groups(
    groups: &BTreeMap<AggregateKey, MetricValues>,
    regions: &BTreeMap<String, String>,
) -> Vec<GroupStatistics> {
    let mut buckets: BTreeMap<(GroupBy, String, String), Vec<f64>> = BTreeMap::new();

    for (key, values) in groups {
        let region = regions.get(&key.entity_id);
        if region.is_none() {
            log::debug!("No region for {}, skipped in regional statistics", key.entity_id);
        }

        for (metric, value) in values {
            buckets
                .entry((GroupBy::Period, key.period.to_string(), metric.clone()))
                .or_default()
                .push(*value);
            buckets
                .entry((GroupBy::Entity, key.entity_id.clone(), metric.clone()))
                .or_default()
                .push(*value);
            if let Some(region) = region {
                buckets
                    .entry((GroupBy::Region, region.clone(), metric.clone()))
                    .or_default()
                    .push(*value);
            }
        }
    }

    buckets
        .into_iter()
        .filter_map(|((group_by, group, metric_name), values)| {
            Some(GroupStatistics {
                group_by,
                group,
                metric_name,
                stats: DescriptiveStats::from_values(&values)?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn create_test_groups() -> BTreeMap<AggregateKey, MetricValues> {
        let rows = [
            ("11100", 2012, 150.0, 1200.0),
            ("11100", 2021, 200.0, 1800.0),
            ("11203", 2012, 50.0, 300.0),
            ("11203", 2021, 40.0, 240.0),
            ("20202", 2012, 80.0, 480.0),
        ];
        rows.iter()
            .map(|(entity, period, est, emp)| {
                let mut values = MetricValues::new();
                values.insert("establishments".to_string(), *est);
                values.insert("employees".to_string(), *emp);
                values.insert("employeesPerEstablishment".to_string(), emp / est);
                (AggregateKey::new(*entity, *period), values)
            })
            .collect()
    }

    fn create_test_regions() -> BTreeMap<String, String> {
        [("11100", "11"), ("11203", "11"), ("20202", "20")]
            .iter()
            .map(|(e, r)| (e.to_string(), r.to_string()))
            .collect()
    }

    fn find<'a>(
        stats: &'a [GroupStatistics],
        group_by: GroupBy,
        group: &str,
        metric: &str,
    ) -> &'a DescriptiveStats {
        &stats
            .iter()
            .find(|s| s.group_by == group_by && s.group == group && s.metric_name == metric)
            .unwrap()
            .stats
    }

    #[test]
    fn test_descriptive_stats() {
        let stats = DescriptiveStats::from_values(&[4.0, 1.0, 3.0, 2.0]).unwrap();
        assert_eq!(stats.count, 4);
        assert_eq!(stats.mean, 2.5);
        assert_eq!(stats.median, 2.5);
        assert_eq!((stats.min, stats.max), (1.0, 4.0));
        // sample variance of 1..4 is 5/3
        assert!((stats.std.unwrap() - (5.0f64 / 3.0).sqrt()).abs() < EPS);

        let single = DescriptiveStats::from_values(&[7.0]).unwrap();
        assert_eq!(single.median, 7.0);
        assert!(single.std.is_none());

        assert!(DescriptiveStats::from_values(&[]).is_none());
    }

    #[test]
    fn test_grouped_by_period_region_and_entity() {
        let stats = describe_groups(&create_test_groups(), &create_test_regions());

        let est_2012 = find(&stats, GroupBy::Period, "2012", "establishments");
        assert_eq!(est_2012.count, 3);
        assert_eq!(est_2012.median, 80.0);
        assert!((est_2012.mean - 280.0 / 3.0).abs() < EPS);

        let saitama_region = find(&stats, GroupBy::Region, "11", "establishments");
        assert_eq!(saitama_region.count, 4);
        assert_eq!(saitama_region.mean, 110.0);

        let nagano_region = find(&stats, GroupBy::Region, "20", "establishments");
        assert_eq!(nagano_region.count, 1);
        assert!(nagano_region.std.is_none());

        let kawaguchi = find(&stats, GroupBy::Entity, "11203", "employees");
        assert_eq!(kawaguchi.mean, 270.0);
    }

    #[test]
    fn test_efficiency_ratio_is_summarised() {
        let stats = describe_groups(&create_test_groups(), &create_test_regions());

        // 1200/150 = 8, 1800/200 = 9
        let saitama = find(&stats, GroupBy::Entity, "11100", "employeesPerEstablishment");
        assert_eq!(saitama.mean, 8.5);
        assert_eq!(saitama.median, 8.5);

        // 8, 6, 9, 6 across region 11
        let region = find(&stats, GroupBy::Region, "11", "employeesPerEstablishment");
        assert_eq!(region.count, 4);
        assert_eq!(region.median, 7.0);
    }

    #[test]
    fn test_entities_without_region_skip_regional_grouping() {
        let mut regions = create_test_regions();
        regions.remove("20202");

        let stats = describe_groups(&create_test_groups(), &regions);
        assert!(!stats
            .iter()
            .any(|s| s.group_by == GroupBy::Region && s.group == "20"));
        // still counted per period and per entity
        assert_eq!(find(&stats, GroupBy::Period, "2012", "employees").count, 3);
        assert_eq!(find(&stats, GroupBy::Entity, "20202", "employees").count, 1);
    }
}
