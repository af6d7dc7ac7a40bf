#![allow(dead_code)]

use chartbook::{
    AccountingError, CellValue, Dataset, DatasetMetadata, Record, UsageDelta, UsageLedger,
    UsageTotals, UserId, infer_column_types,
};
use chrono::{DateTime, Utc};
use rust_xlsxwriter::{Workbook, Worksheet};
use uuid::Uuid;

/// Cell written into a generated workbook
pub enum X {
    S(&'static str),
    N(f64),
    B(bool),
    Blank,
}

/// Build an .xlsx file in memory, one entry per sheet
pub fn workbook(sheets: &[(&str, Vec<Vec<X>>)]) -> Vec<u8> {
    let mut workbook = Workbook::new();
    for (name, rows) in sheets {
        let mut sheet = Worksheet::new();
        sheet.set_name(*name).unwrap();
        for (r, row) in rows.iter().enumerate() {
            for (c, cell) in row.iter().enumerate() {
                match cell {
                    X::S(s) => {
                        sheet.write_string(r as u32, c as u16, *s).unwrap();
                    }
                    X::N(n) => {
                        sheet.write_number(r as u32, c as u16, *n).unwrap();
                    }
                    X::B(b) => {
                        sheet.write_boolean(r as u32, c as u16, *b).unwrap();
                    }
                    X::Blank => {}
                }
            }
        }
        workbook.push_worksheet(sheet);
    }
    workbook.save_to_buffer().unwrap()
}

pub fn record(pairs: &[(&str, CellValue)]) -> Record {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

/// A stored dataset built without going through ingestion
pub fn dataset(owner: &str, created_at: DateTime<Utc>, rows: Vec<Record>) -> Dataset {
    let headers: Vec<String> = rows
        .first()
        .map(|row| row.keys().cloned().collect())
        .unwrap_or_default();
    let data_types = infer_column_types(&headers, &rows);
    Dataset {
        id: Uuid::new_v4(),
        owner: UserId::new(owner),
        filename: format!("{}-sales.csv", Uuid::new_v4().simple()),
        original_name: "sales.csv".to_string(),
        size: 64,
        mime_type: "text/csv".to_string(),
        row_count: rows.len(),
        metadata: DatasetMetadata {
            sheets: vec!["Sheet1".to_string()],
            active_sheet: "Sheet1".to_string(),
            columns: headers.len(),
            data_types,
        },
        headers,
        rows,
        analyses: Vec::new(),
        tags: Vec::new(),
        description: None,
        created_at,
        updated_at: created_at,
    }
}

/// Ledger whose every call fails
pub struct BrokenLedger;

impl UsageLedger for BrokenLedger {
    fn increment_usage(&self, _delta: &UsageDelta) -> Result<(), AccountingError> {
        Err(AccountingError::Poisoned)
    }

    fn usage(&self, _user: &UserId) -> Result<UsageTotals, AccountingError> {
        Err(AccountingError::Poisoned)
    }
}

pub const SALES_CSV: &str = "region,sales\nnorth,10\nsouth,5\nnorth,7\n";
