//! e-Stat API Integration
//!
//! Thin reqwest client for the three JSON endpoints the analysis uses:
//! - `getStatsList` - search statistical tables
//! - `getMetaInfo` - classification code tables for one statsDataId
//! - `getStatsData` - values, filtered by area and time code
//!
//! ## API Reference
//!
//! Base: https://api.e-stat.go.jp/rest/3.0/app/json/
//! Every call needs an application id (`appId`).
//!
//! Responses are parsed into `ApiResponse` immediately, so a shape mismatch
//! surfaces here rather than during aggregation.

use super::source::{FetchError, FetchTarget, StatsSource};
use crate::ingest_core::{ApiResponse, ClassTable, RawRow};
use async_trait::async_trait;
use reqwest::Url;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.e-stat.go.jp/rest/3.0/app/json/";

#[derive(Debug, Clone)]
pub struct EstatConfig {
    pub app_id: String,
    pub base_url: String,
    pub stats_data_id: String,
    pub timeout_secs: u64,
}

pub struct EstatClient {
    client: reqwest::Client,
    config: EstatConfig,
    meta: Option<ClassTable>,
}

impl EstatClient {
    pub fn new(config: EstatConfig) -> Result<Self, FetchError> {
        if config.app_id.is_empty() {
            return Err(FetchError::Config("ESTAT_APP_ID is not set".to_string()));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            config,
            meta: None,
        })
    }

    /// Class table used to name codes when a data response carries none
    pub fn with_meta(mut self, meta: ClassTable) -> Self {
        self.meta = Some(meta);
        self
    }

    pub fn stats_data_id(&self) -> &str {
        &self.config.stats_data_id
    }

    pub fn build_url(&self, endpoint: &str, params: &[(&str, String)]) -> Result<Url, FetchError> {
        let base = if self.config.base_url.ends_with('/') {
            self.config.base_url.clone()
        } else {
            format!("{}/", self.config.base_url)
        };

        let mut query: Vec<(&str, String)> = vec![("appId", self.config.app_id.clone()), ("lang", "J".to_string())];
        query.extend(params.iter().cloned());

        Url::parse(&base)
            .and_then(|b| b.join(endpoint))
            .map(|mut url| {
                url.query_pairs_mut().extend_pairs(query.iter().map(|(k, v)| (*k, v.as_str())));
                url
            })
            .map_err(|e| FetchError::Config(format!("invalid e-Stat URL {}: {}", base, e)))
    }

    async fn get(&self, endpoint: &str, params: &[(&str, String)]) -> Result<ApiResponse, FetchError> {
        let url = self.build_url(endpoint, params)?;
        log::debug!("🌐 GET {}", endpoint);

        let response = self.client.get(url).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(FetchError::Status {
                code: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        Ok(ApiResponse::from_json(&body)?)
    }

    pub async fn get_stats_list(&self, search_word: &str) -> Result<ApiResponse, FetchError> {
        self.get("getStatsList", &[("searchWord", search_word.to_string())])
            .await
    }

    pub async fn get_meta_info(&self, stats_data_id: &str) -> Result<ApiResponse, FetchError> {
        self.get("getMetaInfo", &[("statsDataId", stats_data_id.to_string())])
            .await
    }

    pub async fn get_stats_data(
        &self,
        stats_data_id: &str,
        area_code: &str,
        period: Option<i32>,
    ) -> Result<ApiResponse, FetchError> {
        let mut params = vec![
            ("statsDataId", stats_data_id.to_string()),
            ("cdArea", area_code.to_string()),
            ("metaGetFlg", "Y".to_string()),
            ("cntGetFlg", "N".to_string()),
        ];
        if let Some(period) = period {
            params.push(("cdTime", time_code(period)));
        }
        self.get("getStatsData", &params).await
    }
}

/// e-Stat yearly time code: `2012` → `2012000000`
pub fn time_code(period: i32) -> String {
    format!("{}000000", period)
}

#[async_trait]
impl StatsSource for EstatClient {
    async fn fetch_rows(&self, target: &FetchTarget) -> Result<Vec<RawRow>, FetchError> {
        let response = self
            .get_stats_data(&self.config.stats_data_id, &target.entity_id, Some(target.period))
            .await?;
        Ok(response.to_raw_rows(self.meta.as_ref())?)
    }

    fn source_name(&self) -> &'static str {
        "e-Stat"
    }
}
