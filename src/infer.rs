use crate::cell::{CellValue, Record};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Advisory classification of a column
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Number,
    String,
}

/// Classify every header as numeric or textual.
///
/// A column is numeric when it has at least one non-blank value and every
/// non-null, non-blank value reads as a finite number. Stored values are
/// never touched.
pub fn infer_column_types(headers: &[String], rows: &[Record]) -> IndexMap<String, ColumnType> {
    headers
        .iter()
        .map(|header| {
            let values = rows
                .iter()
                .filter_map(|row| row.get(header))
                .filter(|value| !value.is_null());
            (header.clone(), classify(values))
        })
        .collect()
}

fn classify<'a>(values: impl Iterator<Item = &'a CellValue>) -> ColumnType {
    let mut saw_number = false;

    for value in values.filter(|value| !value.is_blank_text()) {
        if value.as_finite_number().is_none() {
            return ColumnType::String;
        }
        saw_number = true;
    }

    if saw_number {
        ColumnType::Number
    } else {
        ColumnType::String
    }
}
