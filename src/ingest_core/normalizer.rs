//! Metric normalization from raw statistics fields to unified MetricRecord struct

use serde::{Deserialize, Serialize};
use std::error::Error;

/// Where a value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Source {
    #[serde(rename = "API")]
    Api,
    #[serde(rename = "FILE")]
    File,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Api => "API",
            Source::File => "FILE",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "API" => Some(Source::Api),
            "FILE" | "CSV" => Some(Source::File),
            _ => None,
        }
    }
}

/// Retail metrics tracked per municipality and survey year
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Metric {
    Establishments,
    Employees,
    Sales,
    SalesArea,
}

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Establishments => "establishments",
            Metric::Employees => "employees",
            Metric::Sales => "sales",
            Metric::SalesArea => "salesArea",
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            Metric::Establishments => "件",
            Metric::Employees => "人",
            Metric::Sales => "百万円",
            Metric::SalesArea => "㎡",
        }
    }

    /// Resolve a metric from a table label (Japanese survey label or English name)
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim();
        if label.is_empty() {
            return None;
        }

        for metric in Metric::all() {
            if label.eq_ignore_ascii_case(metric.as_str()) {
                return Some(metric);
            }
        }

        if label.contains("事業所数") {
            Some(Metric::Establishments)
        } else if label.contains("従業者数") {
            Some(Metric::Employees)
        } else if label.contains("販売額") {
            Some(Metric::Sales)
        } else if label.contains("売場面積") {
            Some(Metric::SalesArea)
        } else {
            None
        }
    }

    pub fn all() -> [Metric; 4] {
        [
            Metric::Establishments,
            Metric::Employees,
            Metric::Sales,
            Metric::SalesArea,
        ]
    }
}

/// One normalized (entity, period, metric, value, source) observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub entity_id: String,
    pub period: i32,
    pub metric_name: String,
    pub value: f64,
    pub unit: String,
    pub source: Source,
}

impl MetricRecord {
    /// Parse a MetricRecord from a JSON object line
    pub fn from_json(line: &str) -> Result<Self, Box<dyn Error>> {
        let record: MetricRecord = serde_json::from_str(line)?;
        Ok(record)
    }

    pub fn metric(&self) -> Option<Metric> {
        Metric::from_label(&self.metric_name)
    }
}

/// How no-data sentinels (`-`, `***`, `X`) are read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SentinelPolicy {
    /// Sentinels count as zero
    #[default]
    Zero,
    /// Sentinels mean "no data" and produce no value
    NoData,
}

impl SentinelPolicy {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "zero" => Some(SentinelPolicy::Zero),
            "nodata" | "no_data" | "skip" => Some(SentinelPolicy::NoData),
            _ => None,
        }
    }
}

const NO_DATA_SENTINELS: [&str; 6] = ["-", "－", "***", "X", "x", "…"];

pub fn is_no_data_sentinel(raw: &str) -> bool {
    let trimmed = raw.trim();
    trimmed.is_empty() || NO_DATA_SENTINELS.contains(&trimmed)
}

/// Parse a survey cell into a number
///
/// Thousands separators are ignored, so `"1,234"` and `"1234"` read the same.
/// Sentinels follow `policy`; anything else that is not a number is `None`.
pub fn parse_numeric(raw: &str, policy: SentinelPolicy) -> Option<f64> {
    if is_no_data_sentinel(raw) {
        return match policy {
            SentinelPolicy::Zero => Some(0.0),
            SentinelPolicy::NoData => None,
        };
    }

    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| *c != ',' && *c != '，' && *c != ' ')
        .collect();

    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parse a survey year from `2012`, `2012年` or an e-Stat time code like `2012000000`
pub fn parse_period(raw: &str) -> Option<i32> {
    let digits: String = raw
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();

    if digits.len() < 4 {
        return None;
    }

    let year: i32 = digits[..4].parse().ok()?;
    if (1900..=2100).contains(&year) {
        Some(year)
    } else {
        None
    }
}
