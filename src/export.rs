//! Spreadsheet export: a pure transform from uniform records to a
//! single-sheet `.xlsx` file. No network or store side effects.

use std::path::{Path, PathBuf};

use rust_xlsxwriter::{Workbook, XlsxError};
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("spreadsheet error: {0}")]
    Xlsx(#[from] XlsxError),
    #[error("records must be JSON objects")]
    NotAnObject,
}

/// What was written, for callers that want to confirm the shape.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportSummary {
    pub path: PathBuf,
    pub rows: usize,
    pub columns: Vec<String>,
}

/// Writes `rows` to `{file_name}.xlsx` under `out_dir`, one sheet named
/// `sheet_name` (default "Sheet1").
///
/// The column set comes from the first record: later records with extra keys
/// have those keys ignored, missing keys leave blank cells. An empty input
/// produces a file with an empty sheet.
pub fn export_to_excel(
    rows: &[Value],
    file_name: &str,
    sheet_name: Option<&str>,
    out_dir: &Path,
) -> Result<ExportSummary, ExportError> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(sheet_name.unwrap_or("Sheet1"))?;

    let columns: Vec<String> = match rows.first() {
        Some(first) => first
            .as_object()
            .ok_or(ExportError::NotAnObject)?
            .keys()
            .cloned()
            .collect(),
        None => Vec::new(),
    };

    for (col, name) in columns.iter().enumerate() {
        worksheet.write_string(0, col as u16, name)?;
    }

    for (i, row) in rows.iter().enumerate() {
        let record = row.as_object().ok_or(ExportError::NotAnObject)?;
        for (col, name) in columns.iter().enumerate() {
            let r = (i + 1) as u32;
            let c = col as u16;
            match record.get(name) {
                Some(Value::Number(n)) => {
                    worksheet.write_number(r, c, n.as_f64().unwrap_or(f64::NAN))?;
                }
                Some(Value::String(s)) => {
                    worksheet.write_string(r, c, s)?;
                }
                Some(Value::Bool(b)) => {
                    worksheet.write_boolean(r, c, *b)?;
                }
                Some(Value::Null) | None => {}
                Some(other) => {
                    worksheet.write_string(r, c, &other.to_string())?;
                }
            }
        }
    }

    let path = out_dir.join(format!("{file_name}.xlsx"));
    workbook.save(&path)?;

    Ok(ExportSummary {
        path,
        rows: rows.len(),
        columns,
    })
}
