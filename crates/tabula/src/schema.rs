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

use chrono::{NaiveDate, NaiveDateTime};
use indexmap::IndexMap;
use polars::prelude::*;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

const DATETIME_SAMPLE_SIZE: usize = 10;
const DATETIME_PARSE_THRESHOLD: f64 = 0.8;
const CATEGORICAL_MIN_ROWS: usize = 10;
const CATEGORICAL_MAX_CARDINALITY: usize = 20;
const CATEGORICAL_MAX_RATIO: f64 = 0.05;

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%d/%m/%Y",
    "%m/%d/%Y",
    "%Y/%m/%d",
    "%d-%m-%Y",
    "%m-%d-%Y",
    "%Y-%m-%d %H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%Y/%m/%d %H:%M:%S",
    "%d-%m-%Y %H:%M:%S",
    "%m-%d-%Y %H:%M:%S",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SemanticType {
    Integer,
    Float,
    Boolean,
    DateTime,
    Categorical,
    Text,
}

impl SemanticType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SemanticType::Integer => "INTEGER",
            SemanticType::Float => "FLOAT",
            SemanticType::Boolean => "BOOLEAN",
            SemanticType::DateTime => "DATETIME",
            SemanticType::Categorical => "CATEGORICAL",
            SemanticType::Text => "TEXT",
        }
    }
    pub fn is_numeric(&self) -> bool {
        matches!(self, SemanticType::Integer | SemanticType::Float)
    }
}

impl std::fmt::Display for SemanticType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered column-name to semantic-type mapping; entry order follows the
/// dataset's column order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Schema(IndexMap<String, SemanticType>);

impl Schema {
    pub fn get(&self, column: &str) -> Option<SemanticType> {
        self.0.get(column).copied()
    }
    pub fn iter(&self) -> impl Iterator<Item = (&String, &SemanticType)> {
        self.0.iter()
    }
    pub fn len(&self) -> usize {
        self.0.len()
    }
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Assigns every column exactly one semantic type. Total: unclassifiable
/// columns fall back to `Text`.
pub fn infer_schema(df: &DataFrame) -> Schema {
    let mut schema = IndexMap::with_capacity(df.width());
    for column in df.get_columns() {
        let series = column.as_materialized_series();
        schema.insert(series.name().to_string(), infer_column_type(series));
    }
    Schema(schema)
}

fn infer_column_type(series: &Series) -> SemanticType {
    match series.dtype() {
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64 => SemanticType::Integer,
        DataType::Float32 | DataType::Float64 => SemanticType::Float,
        DataType::Boolean => SemanticType::Boolean,
        DataType::Date | DataType::Datetime(_, _) | DataType::Time => SemanticType::DateTime,
        DataType::String => infer_string_column_type(series),
        _ => SemanticType::Text,
    }
}

fn infer_string_column_type(series: &Series) -> SemanticType {
    let Ok(ca) = series.str() else {
        return SemanticType::Text;
    };
    let values: Vec<&str> = ca.into_iter().flatten().collect();
    if values.is_empty() {
        return SemanticType::Text;
    }
    if is_probably_datetime(&values, series.len()) {
        return SemanticType::DateTime;
    }
    if is_probably_categorical(series) {
        return SemanticType::Categorical;
    }
    SemanticType::Text
}

fn is_probably_datetime(non_null: &[&str], total_len: usize) -> bool {
    // Mostly-null columns are too sparse to trust a date reading.
    let null_fraction = 1.0 - non_null.len() as f64 / total_len.max(1) as f64;
    if null_fraction > 0.5 {
        return false;
    }
    let sample: Vec<&str> = non_null
        .choose_multiple(
            &mut rand::thread_rng(),
            DATETIME_SAMPLE_SIZE.min(non_null.len()),
        )
        .copied()
        .collect();
    if sample.is_empty() {
        return false;
    }
    let parsed = sample
        .iter()
        .filter(|value| parse_any_format(value).is_some())
        .count();
    parsed as f64 >= DATETIME_PARSE_THRESHOLD * sample.len() as f64
}

pub(crate) fn parse_any_format(value: &str) -> Option<NaiveDateTime> {
    for format in DATE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(dt);
        }
        if let Ok(date) = NaiveDate::parse_from_str(value, format) {
            return date.and_hms_opt(0, 0, 0);
        }
    }
    None
}

fn is_probably_categorical(series: &Series) -> bool {
    let total = series.len();
    // Tiny columns are never categorical; the ratio is meaningless below
    // ten rows.
    if total < CATEGORICAL_MIN_ROWS {
        return false;
    }
    let Ok(mut distinct) = series.n_unique() else {
        return false;
    };
    // n_unique counts null as a value; the cardinality rule is over
    // actual values only.
    if series.null_count() > 0 {
        distinct -= 1;
    }
    distinct <= CATEGORICAL_MAX_CARDINALITY
        || (distinct as f64 / total as f64) < CATEGORICAL_MAX_RATIO
}
