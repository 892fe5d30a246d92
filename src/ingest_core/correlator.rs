//! Pairwise metric correlation across (entity, period) groups

use super::aggregator::{AggregateKey, MetricValues};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricCorrelation {
    pub metric_a: String,
    pub metric_b: String,
    pub r: f64,
    pub samples: usize,
    pub strong: bool,
}

pub struct CorrelationEngine {
    strong_threshold: f64,
}

impl CorrelationEngine {
    pub fn new(strong_threshold: f64) -> Self {
        Self { strong_threshold }
    }

    pub fn with_defaults() -> Self {
        Self::new(0.7)
    }

    /// Pearson r between every pair of metrics that co-occur in at least 3 groups
    ///
    /// # Returns
    /// Pairs ordered by metric name; pairs with a constant side are omitted
    pub fn correlate(&self, groups: &BTreeMap<AggregateKey, MetricValues>) -> Vec<MetricCorrelation> {
        let metrics: BTreeSet<&String> = groups.values().flat_map(|m| m.keys()).collect();
        let metrics: Vec<&String> = metrics.into_iter().collect();

        let mut results = Vec::new();
        for (i, a) in metrics.iter().enumerate() {
            for b in &metrics[i + 1..] {
                let (xs, ys): (Vec<f64>, Vec<f64>) = groups
                    .values()
                    .filter_map(|m| Some((*m.get(*a)?, *m.get(*b)?)))
                    .unzip();

                if xs.len() < 3 {
                    continue;
                }

                if let Some(r) = pearson(&xs, &ys) {
                    results.push(MetricCorrelation {
                        metric_a: a.to_string(),
                        metric_b: b.to_string(),
                        r,
                        samples: xs.len(),
                        strong: r.abs() > self.strong_threshold,
                    });
                }
            }
        }

        results
    }

    pub fn strong_pairs(&self, groups: &BTreeMap<AggregateKey, MetricValues>) -> Vec<MetricCorrelation> {
        self.correlate(groups).into_iter().filter(|c| c.strong).collect()
    }
}

/// Pearson correlation; `None` on length mismatch, < 2 samples or zero variance
pub fn pearson(xs: &[f64], ys: &[f64]) -> Option<f64> {
    if xs.len() != ys.len() || xs.len() < 2 {
        return None;
    }

    let n = xs.len() as f64;
    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = ys.iter().sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        let dx = x - mean_x;
        let dy = y - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    if var_x == 0.0 || var_y == 0.0 {
        return None;
    }

    Some(cov / (var_x.sqrt() * var_y.sqrt()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_groups() -> BTreeMap<AggregateKey, MetricValues> {
        let rows = [
            ("11100", 2012, 100.0, 1000.0, 7.0),
            ("11100", 2021, 120.0, 1200.0, 3.0),
            ("11203", 2012, 40.0, 400.0, 9.0),
            ("20202", 2012, 60.0, 600.0, 1.0),
        ];

        rows.iter()
            .map(|(entity, period, est, emp, area)| {
                let values: MetricValues = [
                    ("establishments".to_string(), *est),
                    ("employees".to_string(), *emp),
                    ("salesArea".to_string(), *area),
                ]
                .into_iter()
                .collect();
                (AggregateKey::new(*entity, *period), values)
            })
            .collect()
    }

    #[test]
    fn test_pearson_perfect() {
        let xs = [1.0, 2.0, 3.0, 4.0];
        let up = [2.0, 4.0, 6.0, 8.0];
        let down = [8.0, 6.0, 4.0, 2.0];

        assert!((pearson(&xs, &up).unwrap() - 1.0).abs() < 1e-12);
        assert!((pearson(&xs, &down).unwrap() + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_pearson_degenerate() {
        assert_eq!(pearson(&[1.0, 2.0], &[3.0]), None);
        assert_eq!(pearson(&[1.0], &[3.0]), None);
        assert_eq!(pearson(&[1.0, 2.0, 3.0], &[5.0, 5.0, 5.0]), None);
    }

    #[test]
    fn test_strong_pairs() {
        let engine = CorrelationEngine::with_defaults();
        let groups = create_test_groups();

        let all = engine.correlate(&groups);
        assert_eq!(all.len(), 3);

        let strong = engine.strong_pairs(&groups);
        assert_eq!(strong.len(), 1);
        assert_eq!(strong[0].metric_a, "employees");
        assert_eq!(strong[0].metric_b, "establishments");
        assert!((strong[0].r - 1.0).abs() < 1e-12);
        assert_eq!(strong[0].samples, 4);
    }

    #[test]
    fn test_too_few_samples_skipped() {
        let engine = CorrelationEngine::with_defaults();
        let groups: BTreeMap<AggregateKey, MetricValues> =
            create_test_groups().into_iter().take(2).collect();

        assert!(engine.correlate(&groups).is_empty());
    }
}
