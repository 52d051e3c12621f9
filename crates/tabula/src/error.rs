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

use thiserror::Error;
#[derive(Error, Debug)]
pub enum TabulaError {
    #[error("Data error: {0}")]
    Data(#[from] DataError),
    #[error("Query error: {0}")]
    Query(#[from] QueryError),
    #[error("Chart error: {0}")]
    Chart(#[from] ChartError),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
#[derive(Error, Debug)]
pub enum DataError {
    #[error("File '{name}' is {size_mb:.1} MB, exceeding the {max_mb} MB limit")]
    FileTooLarge {
        name: String,
        size_mb: f64,
        max_mb: u64,
    },
    #[error("Unsupported file type '{extension}'; supported types: csv, xlsx, xls")]
    UnsupportedFileType { extension: String },
    #[error("Failed to parse '{name}': {reason}")]
    ParseFailure { name: String, reason: String },
    #[error("Sheet '{sheet}' not found in workbook '{name}'")]
    SheetNotFound { name: String, sheet: String },
    #[error("No dataset is currently loaded")]
    NoDataset,
    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),
}
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("Query rejected, contains a forbidden operation: {verb}")]
    Rejected { verb: String },
    #[error("Query references unauthorised table '{table}'")]
    UnauthorizedTable { table: String },
    #[error("SQL generation failed: {reason}")]
    Generation { reason: String },
    #[error("Query execution failed: {0}")]
    Execution(#[from] polars::error::PolarsError),
}
#[derive(Error, Debug)]
pub enum ChartError {
    #[error("Failed to render {kind} chart: {reason}")]
    RenderFailure { kind: String, reason: String },
    #[error("Result set has no columns to chart")]
    EmptyResult,
}
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required configuration: {variable}")]
    MissingVariable { variable: String },
    #[error("Invalid value '{value}' for {variable}: {reason}")]
    InvalidValue {
        variable: String,
        value: String,
        reason: String,
    },
}
pub type Result<T> = std::result::Result<T, TabulaError>;
pub type DataResult<T> = std::result::Result<T, DataError>;
pub type QueryResult<T> = std::result::Result<T, QueryError>;

impl TabulaError {
    pub fn category(&self) -> &'static str {
        match self {
            TabulaError::Data(_) => "Data",
            TabulaError::Query(_) => "Query",
            TabulaError::Chart(_) => "Chart",
            TabulaError::Config(_) => "Configuration",
            TabulaError::Io(_) => "I/O",
        }
    }
    pub fn user_message(&self) -> String {
        match self {
            TabulaError::Data(DataError::FileTooLarge { max_mb, .. }) => {
                format!("File exceeds maximum size of {max_mb}MB.")
            }
            TabulaError::Data(DataError::NoDataset) => {
                "Please upload a data file to begin analysis.".to_string()
            }
            TabulaError::Query(QueryError::Generation { .. }) => {
                "Could not translate your question into a query. Please try rephrasing."
                    .to_string()
            }
            TabulaError::Query(QueryError::Rejected { .. })
            | TabulaError::Query(QueryError::UnauthorizedTable { .. }) => {
                "The generated query was blocked for safety reasons.".to_string()
            }
            _ => self.to_string(),
        }
    }
}
