//! Row extraction: layout-aware field lookup and retail/area classification
//!
//! Survey extracts changed column names between editions, so each layout
//! carries an ordered list of candidate field names per logical column.

use super::normalizer::{parse_numeric, parse_period, Metric, MetricRecord, SentinelPolicy, Source};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// One raw tabular record tagged with the layout it came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRow {
    pub layout: String,
    pub fields: BTreeMap<String, String>,
}

impl RawRow {
    pub fn new(layout: impl Into<String>) -> Self {
        Self {
            layout: layout.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// First candidate field that is present and non-blank
    fn first_present(&self, candidates: &[&str]) -> Option<&str> {
        candidates
            .iter()
            .filter_map(|name| self.fields.get(*name))
            .map(|v| v.trim())
            .find(|v| !v.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RowLayout {
    /// 商業統計表 (2007)
    Commerce2007,
    /// 経済センサス-活動調査 (2012)
    Census2012,
    /// 経済センサス-活動調査 (2021)
    Census2021,
    /// VALUE objects from the e-Stat getStatsData endpoint
    EstatApi,
}

struct LayoutFields {
    area: &'static [&'static str],
    period: &'static [&'static str],
    industry_code: &'static [&'static str],
    industry_label: &'static [&'static str],
    metric: &'static [&'static str],
    value: &'static [&'static str],
    unit: &'static [&'static str],
    default_period: Option<i32>,
}

impl RowLayout {
    pub fn as_str(&self) -> &'static str {
        match self {
            RowLayout::Commerce2007 => "commerce_2007",
            RowLayout::Census2012 => "census_2012",
            RowLayout::Census2021 => "census_2021",
            RowLayout::EstatApi => "estat_api",
        }
    }

    pub fn from_tag(s: &str) -> Option<Self> {
        match s {
            "commerce_2007" => Some(RowLayout::Commerce2007),
            "census_2012" => Some(RowLayout::Census2012),
            "census_2021" => Some(RowLayout::Census2021),
            "estat_api" => Some(RowLayout::EstatApi),
            _ => None,
        }
    }

    pub fn all() -> [RowLayout; 4] {
        [
            RowLayout::Commerce2007,
            RowLayout::Census2012,
            RowLayout::Census2021,
            RowLayout::EstatApi,
        ]
    }

    fn fields(&self) -> LayoutFields {
        match self {
            RowLayout::Commerce2007 => LayoutFields {
                area: &["市区町村コード", "地域コード", "area_code"],
                period: &["調査年", "年次"],
                industry_code: &["産業分類コード", "業種コード"],
                industry_label: &["産業分類名", "業種名", "産業分類"],
                metric: &["表章項目", "項目名"],
                value: &["値", "数値"],
                unit: &["単位"],
                default_period: Some(2007),
            },
            RowLayout::Census2012 => LayoutFields {
                area: &["地域コード", "全国地方公共団体コード", "area_code"],
                period: &["時間軸（年次）", "時間軸コード", "調査年"],
                industry_code: &["産業分類コード", "cat01_code"],
                industry_label: &["産業分類", "産業分類名", "cat01"],
                metric: &["表章項目", "tab"],
                value: &["値", "value"],
                unit: &["単位", "unit"],
                default_period: Some(2012),
            },
            RowLayout::Census2021 => LayoutFields {
                area: &["地域 コード", "地域コード", "area_code"],
                period: &["時間軸(年次) コード", "時間軸（年次）", "time_code"],
                industry_code: &["産業分類 コード", "産業分類コード"],
                industry_label: &["産業分類", "産業分類名"],
                metric: &["表章項目", "表章項目 名"],
                value: &["値", "value"],
                unit: &["単位", "unit"],
                default_period: Some(2021),
            },
            RowLayout::EstatApi => LayoutFields {
                area: &["@area"],
                period: &["@time"],
                industry_code: &["@cat01"],
                industry_label: &["cat01_name"],
                metric: &["tab_name", "@tab"],
                value: &["$"],
                unit: &["@unit"],
                default_period: None,
            },
        }
    }
}

/// JSIC major groups (two-digit codes)
pub const MAJOR_GROUP_DIGITS: usize = 2;

/// Retail classifier: matches on industry code prefix OR label substring
///
/// Extracts list the same industry at several hierarchy levels (major group
/// 56 next to its minor groups 561 and 569). Only codes with `code_digits`
/// characters are counted so each value enters the aggregate once; a row whose
/// code sits at another level never matches, whatever its label says. Rows
/// without a code fall back to the label.
#[derive(Debug, Clone, PartialEq)]
pub struct RetailPattern {
    pub code_prefixes: Vec<String>,
    pub label_substrings: Vec<String>,
    /// Labels containing any of these never match (section totals such as 卸売業，小売業)
    pub exclude_label_substrings: Vec<String>,
    /// `None` accepts codes at every level
    pub code_digits: Option<usize>,
}

impl Default for RetailPattern {
    fn default() -> Self {
        // JSIC major groups 56-61 make up section I retail trade
        Self {
            code_prefixes: ["56", "57", "58", "59", "60", "61"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            label_substrings: vec!["小売業".to_string()],
            exclude_label_substrings: vec!["卸売業".to_string()],
            code_digits: Some(MAJOR_GROUP_DIGITS),
        }
    }
}

impl RetailPattern {
    pub fn matches(&self, code: Option<&str>, label: Option<&str>) -> bool {
        if let Some(label) = label {
            if self
                .exclude_label_substrings
                .iter()
                .any(|s| label.contains(s.as_str()))
            {
                return false;
            }
        }

        let code = code.map(str::trim).filter(|c| !c.is_empty());
        if let (Some(code), Some(digits)) = (code, self.code_digits) {
            if code.chars().count() != digits {
                return false;
            }
        }

        let code_match = code.map_or(false, |code| {
            self.code_prefixes
                .iter()
                .any(|prefix| code.starts_with(prefix.as_str()))
        });

        let label_match = label.map_or(false, |label| {
            self.label_substrings
                .iter()
                .any(|s| label.contains(s.as_str()))
        });

        code_match || label_match
    }
}

/// Explicit extractor configuration (no module-level state)
#[derive(Debug, Clone, Default)]
pub struct ExtractorConfig {
    pub target_areas: BTreeSet<String>,
    pub retail: RetailPattern,
    pub sentinel_policy: SentinelPolicy,
}

impl ExtractorConfig {
    pub fn new(target_areas: impl IntoIterator<Item = String>) -> Self {
        Self {
            target_areas: target_areas.into_iter().map(|a| normalize_area_code(&a)).collect(),
            ..Default::default()
        }
    }
}

/// Drop the check digit from six-digit local government codes
pub fn normalize_area_code(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.len() == 6 && trimmed.chars().all(|c| c.is_ascii_digit()) {
        trimmed[..5].to_string()
    } else {
        trimmed.to_string()
    }
}

pub struct RowExtractor {
    config: ExtractorConfig,
}

impl RowExtractor {
    pub fn new(config: ExtractorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Classify a row and extract at most one record from it
    ///
    /// Never fails: unknown layouts, out-of-scope rows and unreadable cells
    /// all yield `None`.
    pub fn extract(&self, row: &RawRow, source: Source) -> Option<MetricRecord> {
        let layout = match RowLayout::from_tag(&row.layout) {
            Some(layout) => layout,
            None => {
                log::debug!("Skipping row with unrecognized layout '{}'", row.layout);
                return None;
            }
        };
        let fields = layout.fields();

        let area = normalize_area_code(row.first_present(fields.area)?);
        if !self.config.target_areas.contains(&area) {
            return None;
        }

        let industry_code = row.first_present(fields.industry_code);
        let industry_label = row.first_present(fields.industry_label);
        if !self.config.retail.matches(industry_code, industry_label) {
            return None;
        }

        let metric = match row.first_present(fields.metric).and_then(Metric::from_label) {
            Some(metric) => metric,
            None => {
                log::debug!("Skipping {} row for {}: unknown metric label", layout.as_str(), area);
                return None;
            }
        };

        let value = parse_numeric(row.first_present(fields.value)?, self.config.sentinel_policy)?;

        let period = row
            .first_present(fields.period)
            .and_then(parse_period)
            .or(fields.default_period)?;

        let unit = row
            .first_present(fields.unit)
            .unwrap_or_else(|| metric.unit())
            .to_string();

        Some(MetricRecord {
            entity_id: area,
            period,
            metric_name: metric.as_str().to_string(),
            value,
            unit,
            source,
        })
    }

    pub fn extract_all<'a>(
        &self,
        rows: impl IntoIterator<Item = &'a RawRow>,
        source: Source,
    ) -> Vec<MetricRecord> {
        let mut seen = 0usize;
        let records: Vec<MetricRecord> = rows
            .into_iter()
            .inspect(|_| seen += 1)
            .filter_map(|row| self.extract(row, source))
            .collect();

        log::info!(
            "📥 Extracted {} of {} {} rows",
            records.len(),
            seen,
            source.as_str()
        );
        records
    }
}
