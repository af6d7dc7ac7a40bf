//! Stored documents: an uploaded dataset and the analyses embedded in it.

use crate::cell::Record;
use crate::chart::{ChartKind, ChartSeries, RenderConfig};
use crate::infer::ColumnType;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Stable identity of the requesting user
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        UserId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        UserId(value.to_string())
    }
}

/// Workbook facts captured at ingestion
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetMetadata {
    pub sheets: Vec<String>,
    pub active_sheet: String,
    pub columns: usize,
    pub data_types: IndexMap<String, ColumnType>,
}

/// One uploaded spreadsheet with its parsed rows
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
    pub id: Uuid,
    pub owner: UserId,
    /// Stored name, unique per upload
    pub filename: String,
    pub original_name: String,
    pub size: u64,
    pub mime_type: String,
    pub headers: Vec<String>,
    pub row_count: usize,
    pub rows: Vec<Record>,
    pub metadata: DatasetMetadata,
    #[serde(default)]
    pub analyses: Vec<Analysis>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Dataset {
    pub fn is_owned_by(&self, user: &UserId) -> bool {
        &self.owner == user
    }

    pub fn has_header(&self, name: &str) -> bool {
        self.headers.iter().any(|h| h == name)
    }

    pub fn analysis(&self, id: Uuid) -> Option<&Analysis> {
        self.analyses.iter().find(|a| a.id == id)
    }

    pub fn summary(&self) -> DatasetSummary {
        DatasetSummary {
            id: self.id,
            owner: self.owner.clone(),
            filename: self.filename.clone(),
            original_name: self.original_name.clone(),
            size: self.size,
            mime_type: self.mime_type.clone(),
            headers: self.headers.clone(),
            row_count: self.row_count,
            metadata: self.metadata.clone(),
            analysis_count: self.analyses.len(),
            tags: self.tags.clone(),
            description: self.description.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// History listing entry: a dataset without its rows and analyses
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetSummary {
    pub id: Uuid,
    pub owner: UserId,
    pub filename: String,
    pub original_name: String,
    pub size: u64,
    pub mime_type: String,
    pub headers: Vec<String>,
    pub row_count: usize,
    pub metadata: DatasetMetadata,
    pub analysis_count: usize,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Saved chart configuration with its precomputed data
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Analysis {
    pub id: Uuid,
    pub chart_type: ChartKind,
    #[serde(rename = "xAxis")]
    pub x_column: Option<String>,
    #[serde(rename = "yAxis")]
    pub y_column: Option<String>,
    pub title: String,
    pub config: RenderConfig,
    pub chart_data: ChartSeries,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Caller supplied fields for a new analysis
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisInput {
    pub chart_type: ChartKind,
    #[serde(default, rename = "xAxis")]
    pub x_column: Option<String>,
    #[serde(default, rename = "yAxis")]
    pub y_column: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub config: Option<RenderConfig>,
}

impl AnalysisInput {
    pub fn new(chart_type: ChartKind, x_column: &str, y_column: &str) -> Self {
        Self {
            chart_type,
            x_column: Some(x_column.to_string()),
            y_column: Some(y_column.to_string()),
            title: None,
            config: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_config(mut self, config: RenderConfig) -> Self {
        self.config = Some(config);
        self
    }
}

/// Editable descriptive fields of a dataset
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetDetails {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

/// Page selection for history listings, 1-based
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageRequest {
    pub page: usize,
    pub limit: usize,
}

impl PageRequest {
    pub fn new(page: usize, limit: usize) -> Self {
        Self { page, limit }
    }
}

/// One page of results plus totals
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub current: usize,
    pub pages: usize,
    pub total: usize,
}
