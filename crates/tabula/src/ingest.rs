// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2024 Jonathan Lee
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License version 3
// as published by the Free Software Foundation.
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see https://www.gnu.org/licenses/.

//! File ingestion: size and type validation, CSV and Excel parsing, and
//! SQL-safe table-name derivation from the file name.

use crate::config::{AppConfig, SUPPORTED_EXTENSIONS};
use crate::error::{DataError, Result, TabulaError};
use calamine::{open_workbook_auto, Data, Reader};
use polars::prelude::*;
use std::path::{Path, PathBuf};
use tracing::info;

/// Per-load knobs that cannot be derived from the file itself.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// CSV field separator.
    pub delimiter: u8,
    /// Worksheet to read from an Excel workbook; first sheet when `None`.
    pub sheet: Option<String>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            sheet: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoadedTable {
    pub table_name: String,
    pub source: PathBuf,
    pub frame: DataFrame,
}

/// Validates and parses a data file into a named table.
pub fn load_table(path: &Path, config: &AppConfig, options: &LoadOptions) -> Result<LoadedTable> {
    let name = file_name(path);
    let metadata = std::fs::metadata(path)?;
    if metadata.len() > config.max_file_size_bytes() {
        return Err(DataError::FileTooLarge {
            name,
            size_mb: metadata.len() as f64 / (1024.0 * 1024.0),
            max_mb: config.max_file_size_mb,
        }
        .into());
    }

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    if !SUPPORTED_EXTENSIONS.contains(&extension.as_str()) {
        return Err(DataError::UnsupportedFileType { extension }.into());
    }

    let frame = match extension.as_str() {
        "csv" => read_csv(path, options.delimiter)?,
        _ => read_excel(path, options.sheet.as_deref())?,
    };
    let table_name = derive_table_name(path);
    info!(
        table = %table_name,
        rows = frame.height(),
        columns = frame.width(),
        "loaded dataset"
    );
    Ok(LoadedTable {
        table_name,
        source: path.to_path_buf(),
        frame,
    })
}

/// File stem with every non-alphanumeric character collapsed to an
/// underscore, lowercased. A stem that is empty or starts with a digit
/// gets a `data_` prefix so the result is always a valid SQL identifier.
pub fn derive_table_name(path: &Path) -> String {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    let cleaned: String = stem
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect::<String>()
        .to_ascii_lowercase();
    if cleaned.is_empty() || cleaned.starts_with(|c: char| c.is_ascii_digit()) {
        format!("data_{cleaned}")
    } else {
        cleaned
    }
}

fn read_csv(path: &Path, delimiter: u8) -> Result<DataFrame> {
    let name = file_name(path);
    let parse_options = CsvParseOptions::default().with_separator(delimiter);
    CsvReadOptions::default()
        .with_parse_options(parse_options)
        .try_into_reader_with_file_path(Some(path.to_path_buf()))
        .and_then(|reader| reader.finish())
        .map_err(|e| {
            TabulaError::Data(DataError::ParseFailure {
                name,
                reason: e.to_string(),
            })
        })
}

fn read_excel(path: &Path, sheet: Option<&str>) -> Result<DataFrame> {
    let name = file_name(path);
    let mut workbook = open_workbook_auto(path).map_err(|e| {
        TabulaError::Data(DataError::ParseFailure {
            name: name.clone(),
            reason: e.to_string(),
        })
    })?;
    let sheet_name = match sheet {
        Some(requested) => {
            if !workbook.sheet_names().iter().any(|s| s.as_str() == requested) {
                return Err(DataError::SheetNotFound {
                    name,
                    sheet: requested.to_string(),
                }
                .into());
            }
            requested.to_string()
        }
        None => workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| DataError::ParseFailure {
                name: name.clone(),
                reason: "workbook has no sheets".to_string(),
            })?,
    };
    let range = workbook.worksheet_range(&sheet_name).map_err(|e| {
        TabulaError::Data(DataError::ParseFailure {
            name: name.clone(),
            reason: e.to_string(),
        })
    })?;

    let mut rows = range.rows();
    let headers: Vec<String> = match rows.next() {
        Some(header_row) => dedupe_headers(header_row),
        None => {
            return Err(DataError::ParseFailure {
                name,
                reason: format!("sheet '{sheet_name}' is empty"),
            }
            .into())
        }
    };
    let body: Vec<&[Data]> = rows.collect();
    let columns: Vec<Column> = headers
        .iter()
        .enumerate()
        .map(|(index, header)| build_column(header, &body, index))
        .collect();
    DataFrame::new(columns).map_err(|e| TabulaError::Data(DataError::Polars(e)))
}

fn dedupe_headers(row: &[Data]) -> Vec<String> {
    let mut seen: Vec<String> = Vec::with_capacity(row.len());
    for (index, cell) in row.iter().enumerate() {
        let mut header = match cell {
            Data::Empty => format!("column_{index}"),
            other => other.to_string().trim().to_string(),
        };
        if header.is_empty() {
            header = format!("column_{index}");
        }
        if seen.contains(&header) {
            header = format!("{header}_{index}");
        }
        seen.push(header);
    }
    seen
}

/// Builds a typed series for one column: integer if every non-empty cell
/// is an integer, float if all are numeric, boolean if all are booleans,
/// otherwise string.
fn build_column(header: &str, body: &[&[Data]], index: usize) -> Column {
    let cells: Vec<&Data> = body
        .iter()
        .map(|row| row.get(index).unwrap_or(&Data::Empty))
        .collect();
    let non_empty: Vec<&&Data> = cells
        .iter()
        .filter(|c| !matches!(c, Data::Empty))
        .collect();

    let all_int = !non_empty.is_empty() && non_empty.iter().all(|c| matches!(c, Data::Int(_)));
    let all_numeric = !non_empty.is_empty()
        && non_empty
            .iter()
            .all(|c| matches!(c, Data::Int(_) | Data::Float(_)));
    let all_bool = !non_empty.is_empty() && non_empty.iter().all(|c| matches!(c, Data::Bool(_)));

    if all_int {
        let values: Vec<Option<i64>> = cells
            .iter()
            .map(|c| match c {
                Data::Int(v) => Some(*v),
                _ => None,
            })
            .collect();
        return Series::new(header.into(), values).into();
    }
    if all_numeric {
        let values: Vec<Option<f64>> = cells
            .iter()
            .map(|c| match c {
                Data::Int(v) => Some(*v as f64),
                Data::Float(v) => Some(*v),
                _ => None,
            })
            .collect();
        return Series::new(header.into(), values).into();
    }
    if all_bool {
        let values: Vec<Option<bool>> = cells
            .iter()
            .map(|c| match c {
                Data::Bool(v) => Some(*v),
                _ => None,
            })
            .collect();
        return Series::new(header.into(), values).into();
    }
    let values: Vec<Option<String>> = cells
        .iter()
        .map(|c| match c {
            Data::Empty => None,
            other => Some(other.to_string()),
        })
        .collect();
    Series::new(header.into(), values).into()
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unnamed>")
        .to_string()
}
