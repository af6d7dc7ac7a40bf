//! Dataset and analysis operations.
//!
//! Every operation that names a dataset loads it first, answers `NotFound` if
//! it is missing, then checks that the caller owns it. Usage accounting runs
//! after the dataset write has succeeded and its failures are only logged.

use crate::accounting::{UsageDelta, UsageLedger, UsageTotals};
use crate::chart::{ChartKind, ChartSeries, RenderConfig, compute_chart};
use crate::config::Settings;
use crate::dataset::{
    Analysis, AnalysisInput, Dataset, DatasetDetails, DatasetMetadata, DatasetSummary, Page,
    PageRequest, UserId,
};
use crate::error::{Error, Result};
use crate::infer::infer_column_types;
use crate::loader::Loader;
use crate::store::DatasetStore;
use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

/// Chart data for a dataset; a missing dataset gives an empty series
pub fn compute_dataset_chart(
    dataset: Option<&Dataset>,
    x_column: Option<&str>,
    y_column: Option<&str>,
    kind: ChartKind,
) -> ChartSeries {
    compute_chart(
        dataset.map(|d| d.rows.as_slice()),
        x_column,
        y_column,
        kind,
    )
}

pub struct DatasetService<S, L> {
    store: S,
    ledger: L,
    loader: Loader,
    page_size: usize,
}

impl<S: DatasetStore, L: UsageLedger> DatasetService<S, L> {
    pub fn new(store: S, ledger: L) -> Self {
        Self::with_settings(store, ledger, &Settings::default())
    }

    pub fn with_settings(store: S, ledger: L, settings: &Settings) -> Self {
        Self {
            store,
            ledger,
            loader: Loader::new()
                .with_mode(settings.ingest_mode)
                .with_max_upload_bytes(settings.max_upload_bytes),
            page_size: settings.page_size.max(1),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn loader(&self) -> &Loader {
        &self.loader
    }

    /// Parse an upload, store it as a new dataset and count it against the owner
    pub fn ingest(
        &self,
        bytes: &[u8],
        mime_type: &str,
        owner: &UserId,
        original_name: &str,
    ) -> Result<Dataset> {
        let mime_type = self.loader.check_upload(bytes.len() as u64, mime_type)?;
        let ingested = self.loader.ingest(bytes, &mime_type)?;
        let data_types = infer_column_types(&ingested.headers, &ingested.rows);

        let now = Utc::now();
        let dataset = Dataset {
            id: Uuid::new_v4(),
            owner: owner.clone(),
            filename: format!("{}-{}", Uuid::new_v4().simple(), original_name),
            original_name: original_name.to_string(),
            size: bytes.len() as u64,
            mime_type,
            row_count: ingested.rows.len(),
            metadata: DatasetMetadata {
                sheets: ingested.sheet_names,
                active_sheet: ingested.active_sheet,
                columns: ingested.headers.len(),
                data_types,
            },
            headers: ingested.headers,
            rows: ingested.rows,
            analyses: Vec::new(),
            tags: Vec::new(),
            description: None,
            created_at: now,
            updated_at: now,
        };

        self.store.create(&dataset)?;
        info!(
            dataset_id = %dataset.id,
            owner = %owner,
            rows = dataset.row_count,
            columns = dataset.headers.len(),
            "dataset ingested"
        );

        self.record_usage(UsageDelta::upload(owner.clone(), dataset.id, dataset.size));
        Ok(dataset)
    }

    pub fn get_dataset(&self, id: Uuid, owner: &UserId) -> Result<Dataset> {
        self.load_owned(id, owner)
    }

    /// Owner's datasets, newest first, without rows or analyses
    pub fn list_datasets(
        &self,
        owner: &UserId,
        page: Option<PageRequest>,
    ) -> Result<Page<DatasetSummary>> {
        let request = page.unwrap_or(PageRequest::new(1, self.page_size));
        let current = request.page.max(1);
        let limit = if request.limit == 0 {
            self.page_size
        } else {
            request.limit
        };

        let datasets = self.store.find_by_owner(owner)?;
        let total = datasets.len();
        let items = datasets
            .iter()
            .skip((current - 1).saturating_mul(limit))
            .take(limit)
            .map(Dataset::summary)
            .collect();

        Ok(Page {
            items,
            current,
            pages: total.div_ceil(limit),
            total,
        })
    }

    /// Replace description and/or tags; an empty description keeps the old one
    pub fn update_details(
        &self,
        id: Uuid,
        owner: &UserId,
        details: DatasetDetails,
    ) -> Result<Dataset> {
        let mut dataset = self.load_owned(id, owner)?;

        if let Some(description) = details.description.filter(|d| !d.trim().is_empty()) {
            dataset.description = Some(description);
        }
        if let Some(tags) = details.tags {
            dataset.tags = tags;
        }
        dataset.updated_at = Utc::now();

        self.store.update(&dataset)?;
        Ok(dataset)
    }

    pub fn delete_dataset(&self, id: Uuid, owner: &UserId) -> Result<()> {
        let dataset = self.load_owned(id, owner)?;
        self.store.delete(id)?;
        info!(dataset_id = %id, owner = %owner, "dataset deleted");

        self.record_usage(UsageDelta::removal(owner.clone(), id, dataset.size));
        Ok(())
    }

    /// Chart data for an owned dataset without saving anything
    pub fn preview_chart(
        &self,
        id: Uuid,
        owner: &UserId,
        x_column: Option<&str>,
        y_column: Option<&str>,
        kind: ChartKind,
    ) -> Result<ChartSeries> {
        let dataset = self.load_owned(id, owner)?;
        Ok(compute_dataset_chart(Some(&dataset), x_column, y_column, kind))
    }

    /// Compute the chart for `input` and append it to the dataset
    pub fn add_analysis(
        &self,
        dataset_id: Uuid,
        owner: &UserId,
        input: AnalysisInput,
    ) -> Result<Analysis> {
        let mut dataset = self.load_owned(dataset_id, owner)?;
        let kind = input.chart_type;

        let config = match input.config {
            Some(config) if config.kind() != kind => {
                return Err(Error::validation(format!(
                    "config is for a {} chart, analysis is a {} chart",
                    config.kind(),
                    kind
                )));
            }
            Some(config) => {
                config.validate()?;
                config
            }
            None => RenderConfig::default_for(kind),
        };

        for column in [&input.x_column, &input.y_column].into_iter().flatten() {
            if !column.is_empty() && !dataset.has_header(column) {
                warn!(
                    dataset_id = %dataset_id,
                    column = %column,
                    "analysis refers to unknown column"
                );
            }
        }

        let chart_data = compute_dataset_chart(
            Some(&dataset),
            input.x_column.as_deref(),
            input.y_column.as_deref(),
            kind,
        );

        let now = Utc::now();
        let analysis = Analysis {
            id: Uuid::new_v4(),
            chart_type: kind,
            title: input
                .title
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| format!("{} chart", kind)),
            x_column: input.x_column,
            y_column: input.y_column,
            config,
            chart_data,
            created_at: now,
            updated_at: now,
        };

        dataset.analyses.push(analysis.clone());
        dataset.updated_at = now;
        self.store.update(&dataset)?;

        info!(
            dataset_id = %dataset_id,
            analysis_id = %analysis.id,
            chart_type = %kind,
            points = analysis.chart_data.len(),
            "analysis added"
        );
        Ok(analysis)
    }

    pub fn remove_analysis(
        &self,
        dataset_id: Uuid,
        analysis_id: Uuid,
        owner: &UserId,
    ) -> Result<()> {
        let mut dataset = self.load_owned(dataset_id, owner)?;
        let position = dataset
            .analyses
            .iter()
            .position(|a| a.id == analysis_id)
            .ok_or_else(|| Error::analysis_not_found(analysis_id))?;

        dataset.analyses.remove(position);
        dataset.updated_at = Utc::now();
        self.store.update(&dataset)?;

        info!(dataset_id = %dataset_id, analysis_id = %analysis_id, "analysis removed");
        Ok(())
    }

    pub fn list_analyses(&self, dataset_id: Uuid, owner: &UserId) -> Result<Vec<Analysis>> {
        Ok(self.load_owned(dataset_id, owner)?.analyses)
    }

    pub fn usage(&self, owner: &UserId) -> Result<UsageTotals> {
        self.ledger
            .usage(owner)
            .map_err(|e| Error::Storage(e.to_string()))
    }

    fn load_owned(&self, id: Uuid, owner: &UserId) -> Result<Dataset> {
        let dataset = self
            .store
            .find_by_id(id)?
            .ok_or_else(|| Error::dataset_not_found(id))?;

        if !dataset.is_owned_by(owner) {
            warn!(dataset_id = %id, requester = %owner, "ownership check failed");
            return Err(Error::Authorization { dataset_id: id });
        }
        Ok(dataset)
    }

    fn record_usage(&self, delta: UsageDelta) {
        if let Err(e) = self.ledger.increment_usage(&delta) {
            warn!(
                user = %delta.user_id,
                command_id = %delta.command_id,
                error = %e,
                "usage update failed, dataset change kept"
            );
        }
    }
}
