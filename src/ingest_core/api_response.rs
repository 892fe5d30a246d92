//! e-Stat API response shapes
//!
//! The API answers every endpoint with a single-key envelope
//! (`GET_STATS_LIST`, `GET_META_INFO`, `GET_STATS_DATA`). Responses are
//! validated here, at the boundary, so nothing shapeless reaches aggregation.
//!
//! ## Wire quirks
//!
//! - Lists with one element are sent as a bare object (`OneOrMany`)
//! - Text nodes are either plain strings or `{"@code": .., "$": ..}` objects
//! - `RESULT.STATUS` 0 = ok, 1 = no matching data, 2 = partial; >= 100 are errors

use super::extractor::RawRow;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug)]
pub enum ApiError {
    Json(serde_json::Error),
    Shape(String),
    Status { status: i64, message: String },
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::Json(e) => write!(f, "Malformed JSON: {}", e),
            ApiError::Shape(e) => write!(f, "Unexpected response shape: {}", e),
            ApiError::Status { status, message } => {
                write!(f, "e-Stat error status {}: {}", status, message)
            }
        }
    }
}

impl std::error::Error for ApiError {}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        match err.classify() {
            serde_json::error::Category::Data => ApiError::Shape(err.to_string()),
            _ => ApiError::Json(err),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> Default for OneOrMany<T> {
    fn default() -> Self {
        OneOrMany::Many(Vec::new())
    }
}

impl<T> OneOrMany<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::One(item) => vec![item],
            OneOrMany::Many(items) => items,
        }
    }

    pub fn as_slice(&self) -> &[T] {
        match self {
            OneOrMany::One(item) => std::slice::from_ref(item),
            OneOrMany::Many(items) => items,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TextNode {
    Plain(String),
    Coded {
        #[serde(rename = "@code", default)]
        code: Option<String>,
        #[serde(rename = "$", default)]
        text: String,
    },
}

impl TextNode {
    pub fn text(&self) -> &str {
        match self {
            TextNode::Plain(text) => text,
            TextNode::Coded { text, .. } => text,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResultInfo {
    #[serde(rename = "STATUS")]
    pub status: i64,
    #[serde(rename = "ERROR_MSG", default)]
    pub error_msg: String,
}

impl ResultInfo {
    fn validate(&self) -> Result<(), ApiError> {
        match self.status {
            0..=2 => Ok(()),
            status => Err(ApiError::Status {
                status,
                message: self.error_msg.clone(),
            }),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TableInfo {
    #[serde(rename = "@id")]
    pub id: String,
    #[serde(rename = "STAT_NAME")]
    pub stat_name: Option<TextNode>,
    #[serde(rename = "TITLE")]
    pub title: Option<TextNode>,
    #[serde(rename = "SURVEY_DATE")]
    pub survey_date: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClassItem {
    #[serde(rename = "@code")]
    pub code: String,
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "@unit")]
    pub unit: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClassObj {
    #[serde(rename = "@id")]
    pub id: String,
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "CLASS", default)]
    pub classes: OneOrMany<ClassItem>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClassInf {
    #[serde(rename = "CLASS_OBJ", default)]
    pub objects: OneOrMany<ClassObj>,
}

/// Code → name lookup over classification objects
#[derive(Debug, Clone, Default)]
pub struct ClassTable {
    names: BTreeMap<(String, String), String>,
}

impl ClassTable {
    pub fn from_objects(objects: &[ClassObj]) -> Self {
        let mut names = BTreeMap::new();
        for obj in objects {
            for item in obj.classes.as_slice() {
                names.insert((obj.id.clone(), item.code.clone()), item.name.clone());
            }
        }
        Self { names }
    }

    pub fn name_of(&self, class_id: &str, code: &str) -> Option<&str> {
        self.names
            .get(&(class_id.to_string(), code.to_string()))
            .map(|s| s.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatsListBody {
    #[serde(rename = "RESULT")]
    pub result: ResultInfo,
    #[serde(rename = "DATALIST_INF", default)]
    pub datalist: Option<DatalistInf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatalistInf {
    #[serde(rename = "NUMBER", default)]
    pub number: u64,
    #[serde(rename = "TABLE_INF", default)]
    pub tables: OneOrMany<TableInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetaInfoBody {
    #[serde(rename = "RESULT")]
    pub result: ResultInfo,
    #[serde(rename = "METADATA_INF", default)]
    pub metadata: Option<MetadataInf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetadataInf {
    #[serde(rename = "TABLE_INF")]
    pub table: Option<TableInfo>,
    #[serde(rename = "CLASS_INF", default)]
    pub class_inf: ClassInf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatsDataBody {
    #[serde(rename = "RESULT")]
    pub result: ResultInfo,
    #[serde(rename = "STATISTICAL_DATA", default)]
    pub data: Option<StatisticalData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatisticalData {
    #[serde(rename = "TABLE_INF")]
    pub table: Option<TableInfo>,
    #[serde(rename = "CLASS_INF", default)]
    pub class_inf: ClassInf,
    #[serde(rename = "DATA_INF", default)]
    pub data_inf: DataInf,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DataInf {
    #[serde(rename = "VALUE", default)]
    pub values: OneOrMany<BTreeMap<String, Value>>,
}

/// Validated e-Stat response, one variant per known endpoint
#[derive(Debug, Clone, Deserialize)]
pub enum ApiResponse {
    #[serde(rename = "GET_STATS_LIST")]
    StatsList(StatsListBody),
    #[serde(rename = "GET_META_INFO")]
    MetaInfo(MetaInfoBody),
    #[serde(rename = "GET_STATS_DATA")]
    StatsData(StatsDataBody),
}

impl ApiResponse {
    /// Parse and validate a response body, failing fast on shape mismatch
    pub fn from_json(body: &str) -> Result<Self, ApiError> {
        let response: ApiResponse = serde_json::from_str(body)?;
        response.result().validate()?;
        Ok(response)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ApiResponse::StatsList(_) => "stats-list",
            ApiResponse::MetaInfo(_) => "meta-info",
            ApiResponse::StatsData(_) => "stats-data",
        }
    }

    fn result(&self) -> &ResultInfo {
        match self {
            ApiResponse::StatsList(body) => &body.result,
            ApiResponse::MetaInfo(body) => &body.result,
            ApiResponse::StatsData(body) => &body.result,
        }
    }

    /// Table ids listed by a getStatsList response
    pub fn table_ids(&self) -> Result<Vec<String>, ApiError> {
        match self {
            ApiResponse::StatsList(body) => Ok(body
                .datalist
                .as_ref()
                .map(|d| d.tables.as_slice().iter().map(|t| t.id.clone()).collect())
                .unwrap_or_default()),
            other => Err(ApiError::Shape(format!(
                "expected stats-list, got {}",
                other.kind()
            ))),
        }
    }

    pub fn class_table(&self) -> ClassTable {
        match self {
            ApiResponse::StatsList(_) => ClassTable::default(),
            ApiResponse::MetaInfo(body) => body
                .metadata
                .as_ref()
                .map(|m| ClassTable::from_objects(m.class_inf.objects.as_slice()))
                .unwrap_or_default(),
            ApiResponse::StatsData(body) => body
                .data
                .as_ref()
                .map(|d| ClassTable::from_objects(d.class_inf.objects.as_slice()))
                .unwrap_or_default(),
        }
    }

    /// Turn getStatsData VALUE objects into `estat_api` rows
    ///
    /// Classification codes (`@cat01`, `@tab`, ...) are kept, and each one
    /// gains a `<class>_name` field resolved through the response's own class
    /// table, falling back to `meta` when the response carried none.
    pub fn to_raw_rows(&self, meta: Option<&ClassTable>) -> Result<Vec<RawRow>, ApiError> {
        let body = match self {
            ApiResponse::StatsData(body) => body,
            other => {
                return Err(ApiError::Shape(format!(
                    "expected stats-data, got {}",
                    other.kind()
                )))
            }
        };

        let data = match &body.data {
            Some(data) => data,
            None => return Ok(Vec::new()),
        };

        let own = self.class_table();
        let classes = if own.is_empty() { meta.unwrap_or(&own) } else { &own };

        let mut rows = Vec::new();
        for value in data.data_inf.values.as_slice() {
            let mut row = RawRow::new("estat_api");
            for (key, raw) in value {
                let text = match raw {
                    Value::String(s) => s.clone(),
                    Value::Null => continue,
                    other => other.to_string(),
                };
                if let Some(class_id) = key.strip_prefix('@') {
                    if let Some(name) = classes.name_of(class_id, &text) {
                        row.fields.insert(format!("{}_name", class_id), name.to_string());
                    }
                }
                row.fields.insert(key.clone(), text);
            }
            rows.push(row);
        }
        Ok(rows)
    }
}
