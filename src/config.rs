use crate::ingest_core::{
    CsvEncoding, EntityRegistry, ExtractorConfig, MergeConfig, RetailPattern, SentinelPolicy, Source,
};
use crate::pipeline::estat::{EstatConfig, DEFAULT_BASE_URL};
use crate::pipeline::{AnalysisOptions, CollectorConfig, FileInput};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// Configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub estat_app_id: Option<String>,
    pub estat_base_url: String,
    pub estat_stats_data_id: String,
    pub entities_path: PathBuf,
    pub file_inputs: Vec<FileInput>,
    pub csv_encoding: CsvEncoding,
    pub csv_skip_lines: usize,
    pub target_areas: Vec<String>,
    pub retail_code_prefixes: Vec<String>,
    pub retail_label_substrings: Vec<String>,
    /// Industry code length counted as retail; `None` (RETAIL_CODE_DIGITS=0) accepts every level
    pub retail_code_digits: Option<usize>,
    pub sentinel_policy: SentinelPolicy,
    pub anomaly_high_ratio: f64,
    pub anomaly_low_ratio: f64,
    pub fetch_batch_size: usize,
    pub fetch_timeout_secs: u64,
    pub fetch_max_retries: u32,
    pub fetch_periods: Vec<i32>,
    pub report_output_path: Option<PathBuf>,
    pub rust_log: Option<String>,
}

fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

/// `path=layout` pairs, comma separated; entries without a layout are dropped
pub fn parse_file_inputs(s: &str) -> Vec<FileInput> {
    split_list(s)
        .into_iter()
        .filter_map(|entry| {
            let (path, layout) = entry.split_once('=')?;
            let (path, layout) = (path.trim(), layout.trim());
            if path.is_empty() || layout.is_empty() {
                log::warn!("⚠️  Ignoring FILE_INPUTS entry '{}'", entry);
                return None;
            }
            Some(FileInput::new(path, layout))
        })
        .collect()
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Every variable is optional. Without TARGET_AREAS the ids of the entity
    /// table are used.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let float_or = |key: &str, default: f64| {
            lookup(key)
                .and_then(|s| s.trim().parse::<f64>().ok())
                .unwrap_or(default)
        };
        let list = |key: &str| lookup(key).map(|s| split_list(&s));
        let retail = RetailPattern::default();

        Self {
            estat_app_id: lookup("ESTAT_APP_ID").filter(|s| !s.trim().is_empty()),
            estat_base_url: lookup("ESTAT_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            estat_stats_data_id: lookup("ESTAT_STATS_DATA_ID").unwrap_or_default(),
            entities_path: lookup("ENTITIES_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("data/entities.json")),
            file_inputs: lookup("FILE_INPUTS")
                .map(|s| parse_file_inputs(&s))
                .unwrap_or_default(),
            csv_encoding: lookup("CSV_ENCODING")
                .and_then(|s| CsvEncoding::from_str(&s))
                .unwrap_or_default(),
            csv_skip_lines: lookup("CSV_SKIP_LINES")
                .and_then(|s| usize::from_str(s.trim()).ok())
                .unwrap_or(0),
            target_areas: list("TARGET_AREAS").unwrap_or_default(),
            retail_code_prefixes: list("RETAIL_CODE_PREFIXES").unwrap_or(retail.code_prefixes),
            retail_label_substrings: list("RETAIL_LABEL_SUBSTRINGS")
                .unwrap_or(retail.label_substrings),
            retail_code_digits: match lookup("RETAIL_CODE_DIGITS")
                .and_then(|s| usize::from_str(s.trim()).ok())
            {
                Some(0) => None,
                Some(digits) => Some(digits),
                None => retail.code_digits,
            },
            sentinel_policy: lookup("SENTINEL_POLICY")
                .and_then(|s| SentinelPolicy::from_str(&s))
                .unwrap_or_default(),
            anomaly_high_ratio: float_or("ANOMALY_HIGH_RATIO", 3.0),
            anomaly_low_ratio: float_or("ANOMALY_LOW_RATIO", 0.3),
            fetch_batch_size: lookup("FETCH_BATCH_SIZE")
                .and_then(|s| usize::from_str(s.trim()).ok())
                .unwrap_or(5),
            fetch_timeout_secs: lookup("FETCH_TIMEOUT_SECS")
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(30),
            fetch_max_retries: lookup("FETCH_MAX_RETRIES")
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(2),
            fetch_periods: list("FETCH_PERIODS")
                .map(|items| items.iter().filter_map(|p| p.parse().ok()).collect())
                .unwrap_or_else(|| vec![2012, 2016, 2021]),
            report_output_path: lookup("REPORT_OUTPUT_PATH").map(PathBuf::from),
            rust_log: lookup("RUST_LOG"),
        }
    }

    pub fn extractor_config(&self, default_areas: &[String]) -> ExtractorConfig {
        let areas = if self.target_areas.is_empty() {
            default_areas.to_vec()
        } else {
            self.target_areas.clone()
        };

        let mut config = ExtractorConfig::new(areas);
        config.retail.code_prefixes = self.retail_code_prefixes.clone();
        config.retail.label_substrings = self.retail_label_substrings.clone();
        config.retail.code_digits = self.retail_code_digits;
        config.sentinel_policy = self.sentinel_policy;
        config
    }

    pub fn merge_config(&self) -> MergeConfig {
        MergeConfig {
            checked_sources: vec![Source::Api],
            high_ratio: self.anomaly_high_ratio,
            low_ratio: self.anomaly_low_ratio,
        }
    }

    pub fn collector_config(&self) -> CollectorConfig {
        CollectorConfig {
            batch_size: self.fetch_batch_size,
            max_retries: self.fetch_max_retries,
            ..CollectorConfig::default()
        }
    }

    /// `None` when no application id is configured
    pub fn estat_config(&self) -> Option<EstatConfig> {
        Some(EstatConfig {
            app_id: self.estat_app_id.clone()?,
            base_url: self.estat_base_url.clone(),
            stats_data_id: self.estat_stats_data_id.clone(),
            timeout_secs: self.fetch_timeout_secs,
        })
    }

    /// Target areas fall back to the entity table, which also supplies regions
    pub fn analysis_options(&self, entities: &EntityRegistry) -> AnalysisOptions {
        let mut options = AnalysisOptions::new(
            self.extractor_config(&entities.ids()),
            self.merge_config(),
            self.file_inputs.clone(),
        );
        options.encoding = self.csv_encoding;
        options.skip_lines = self.csv_skip_lines;
        options.regions = entities.regions();
        options
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn create_test_config(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = create_test_config(&[]);

        assert!(config.estat_app_id.is_none());
        assert!(config.estat_config().is_none());
        assert_eq!(config.estat_base_url, DEFAULT_BASE_URL);
        assert_eq!(config.entities_path, PathBuf::from("data/entities.json"));
        assert_eq!(config.csv_encoding, CsvEncoding::ShiftJis);
        assert_eq!(config.sentinel_policy, SentinelPolicy::Zero);
        assert_eq!(config.anomaly_high_ratio, 3.0);
        assert_eq!(config.anomaly_low_ratio, 0.3);
        assert_eq!(config.fetch_batch_size, 5);
        assert_eq!(config.fetch_periods, vec![2012, 2016, 2021]);
        assert_eq!(config.retail_code_prefixes.len(), 6);
        assert_eq!(config.retail_code_digits, Some(2));
    }

    #[test]
    fn test_overrides() {
        let config = create_test_config(&[
            ("ESTAT_APP_ID", "abc"),
            ("FILE_INPUTS", "data/c2007.csv=commerce_2007, data/c2012.csv = census_2012, broken"),
            ("CSV_ENCODING", "utf-8"),
            ("CSV_SKIP_LINES", "3"),
            ("TARGET_AREAS", "111007, 11203"),
            ("RETAIL_CODE_PREFIXES", "58"),
            ("RETAIL_CODE_DIGITS", "0"),
            ("SENTINEL_POLICY", "nodata"),
            ("ANOMALY_HIGH_RATIO", "2.5"),
            ("FETCH_PERIODS", "2012,2021,soon"),
        ]);

        assert_eq!(config.estat_config().unwrap().app_id, "abc");
        assert_eq!(
            config.file_inputs,
            vec![
                FileInput::new("data/c2007.csv", "commerce_2007"),
                FileInput::new("data/c2012.csv", "census_2012"),
            ]
        );
        assert_eq!(config.csv_encoding, CsvEncoding::Utf8);
        assert_eq!(config.csv_skip_lines, 3);
        assert_eq!(config.fetch_periods, vec![2012, 2021]);

        let extractor = config.extractor_config(&[]);
        assert!(extractor.target_areas.contains("11100"));
        assert!(extractor.target_areas.contains("11203"));
        assert_eq!(extractor.retail.code_prefixes, vec!["58"]);
        assert_eq!(extractor.retail.code_digits, None);
        assert_eq!(extractor.sentinel_policy, SentinelPolicy::NoData);

        assert_eq!(config.merge_config().high_ratio, 2.5);
        assert_eq!(config.merge_config().low_ratio, 0.3);
    }

    #[test]
    fn test_analysis_options_from_entities() {
        let entities = EntityRegistry::from_json(
            r#"[
                {"id": "11100", "name": "さいたま市", "parent_region_id": "11", "population": 1324025},
                {"id": "20202", "name": "松本市", "parent_region_id": "20", "population": 241145}
            ]"#,
        )
        .unwrap();

        let options = create_test_config(&[("CSV_ENCODING", "utf-8")]).analysis_options(&entities);
        assert_eq!(options.extractor.target_areas.len(), 2);
        assert_eq!(options.regions["20202"], "20");
        assert_eq!(options.encoding, CsvEncoding::Utf8);
    }

    #[test]
    fn test_target_areas_fall_back_to_entities() {
        let config = create_test_config(&[]);
        let extractor = config.extractor_config(&["20202".to_string()]);
        assert_eq!(extractor.target_areas.len(), 1);
        assert!(extractor.target_areas.contains("20202"));
    }
}
