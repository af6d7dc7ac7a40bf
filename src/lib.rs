/*!
# chartbook

Spreadsheet uploads turned into stored datasets and saved charts.

## Overview

A user uploads an Excel workbook or a CSV file. The first sheet is decoded
into an ordered header list and one record per row, every column gets an
advisory type, and the result is stored as a dataset owned by that user.
Charts are then built from any pair of columns and saved with the dataset as
analyses, together with their precomputed chart data.

## Pipeline

- **Loader** (`loader`) - checks the declared MIME type and the 10 MB size
  ceiling, sniffs the bytes (ZIP/OLE workbook or CSV) and decodes the first
  sheet in object mode (missing cells become `""`) or positional mode (falsy
  cells become `null`)
- **Type inference** (`infer`) - `number` when every non-blank value is a
  finite number, `string` otherwise
- **Chart data** (`chart`) - `{x, y, label}` points in row order, or
  `{label, value, x, y}` slices summed per category for pie charts
- **Analysis store** (`service`) - adds, removes and lists analyses inside a
  dataset after checking ownership

## Storage

- Datasets are single documents (`store`): in memory, or gzip-compressed
  JSON files written atomically, one per dataset
- Per-user upload counters (`accounting`) change through idempotent delta
  commands; a failed counter update never undoes an upload or a deletion

## Modules

- **cell**: cell values and records
- **loader**: upload checks and sheet decoding
- **infer**: column type inference
- **chart**: chart kinds, render options and chart data
- **dataset**: dataset, analysis and listing types
- **store**: dataset persistence
- **accounting**: usage counters
- **service**: the operations callers use
- **config**: settings from the environment
- **error**: error types
*/

pub mod accounting;
pub mod cell;
pub mod chart;
pub mod config;
pub mod dataset;
pub mod error;
pub mod infer;
pub mod loader;
pub mod service;
pub mod store;

pub use accounting::{
    AccountingError, JsonLedger, MemoryLedger, UsageChange, UsageDelta, UsageLedger, UsageTotals,
};
pub use cell::{CellValue, Record};
pub use chart::{ChartKind, ChartPoint, ChartSeries, PieSlice, RenderConfig, compute_chart};
pub use config::Settings;
pub use dataset::{
    Analysis, AnalysisInput, Dataset, DatasetDetails, DatasetMetadata, DatasetSummary, Page,
    PageRequest, UserId,
};
pub use error::{Error, Result};
pub use infer::{ColumnType, infer_column_types};
pub use loader::{IngestMode, Ingested, Loader};
pub use service::{DatasetService, compute_dataset_chart};
pub use store::{DatasetStore, FileStore, MemoryStore};
