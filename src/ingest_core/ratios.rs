//! Efficiency ratios derived from the base retail metrics

use super::aggregator::MetricValues;
use super::normalizer::Metric;

/// (ratio name, numerator, denominator)
const RATIOS: [(&str, Metric, Metric); 4] = [
    ("salesPerEmployee", Metric::Sales, Metric::Employees),
    ("salesPerEstablishment", Metric::Sales, Metric::Establishments),
    ("employeesPerEstablishment", Metric::Employees, Metric::Establishments),
    ("salesAreaPerEmployee", Metric::SalesArea, Metric::Employees),
];

pub fn ratio_names() -> Vec<&'static str> {
    RATIOS.iter().map(|(name, _, _)| *name).collect()
}

/// Compute every ratio whose inputs are present; zero denominators are skipped
pub fn derive_ratios(values: &MetricValues) -> MetricValues {
    let mut ratios = MetricValues::new();

    for (name, numerator, denominator) in RATIOS {
        let num = match values.get(numerator.as_str()) {
            Some(v) => *v,
            None => continue,
        };
        let den = match values.get(denominator.as_str()) {
            Some(v) if *v != 0.0 => *v,
            _ => continue,
        };
        ratios.insert(name.to_string(), num / den);
    }

    ratios
}
