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

//! Descriptive statistics for a loaded dataset, split by semantic type.

use crate::error::DataResult;
use crate::schema::{Schema, SemanticType};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const TOP_VALUE_COUNT: usize = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NumericSummary {
    pub column: String,
    pub count: usize,
    pub mean: Option<f64>,
    pub std: Option<f64>,
    pub min: Option<f64>,
    pub q25: Option<f64>,
    pub median: Option<f64>,
    pub q75: Option<f64>,
    pub max: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoricalSummary {
    pub column: String,
    pub distinct: usize,
    /// Most frequent values with their counts, descending.
    pub top_values: Vec<(String, usize)>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub rows: usize,
    pub columns: usize,
    pub numeric: Vec<NumericSummary>,
    pub categorical: Vec<CategoricalSummary>,
}

pub fn summarize(df: &DataFrame, schema: &Schema) -> DataResult<DatasetSummary> {
    let mut numeric = Vec::new();
    let mut categorical = Vec::new();
    for (name, semantic_type) in schema.iter() {
        let series = df.column(name)?.as_materialized_series();
        if semantic_type.is_numeric() {
            numeric.push(numeric_summary(name, series)?);
        } else if matches!(semantic_type, SemanticType::Categorical | SemanticType::Boolean) {
            categorical.push(categorical_summary(name, series)?);
        }
    }
    Ok(DatasetSummary {
        rows: df.height(),
        columns: df.width(),
        numeric,
        categorical,
    })
}

fn numeric_summary(name: &str, series: &Series) -> DataResult<NumericSummary> {
    let as_float = series.cast(&DataType::Float64)?;
    let values = as_float.f64()?;
    Ok(NumericSummary {
        column: name.to_string(),
        count: series.len() - series.null_count(),
        mean: values.mean(),
        std: values.std(1),
        min: values.min(),
        q25: values.quantile(0.25, QuantileMethod::Linear)?,
        median: values.median(),
        q75: values.quantile(0.75, QuantileMethod::Linear)?,
        max: values.max(),
    })
}

fn categorical_summary(name: &str, series: &Series) -> DataResult<CategoricalSummary> {
    let as_string = series.cast(&DataType::String)?;
    let values = as_string.str()?;
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for value in values.into_iter().flatten() {
        *counts.entry(value).or_insert(0) += 1;
    }
    let distinct = counts.len();
    let mut ranked: Vec<(String, usize)> = counts
        .into_iter()
        .map(|(value, count)| (value.to_string(), count))
        .collect();
    // Secondary sort on the value keeps ties deterministic.
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(TOP_VALUE_COUNT);
    Ok(CategoricalSummary {
        column: name.to_string(),
        distinct,
        top_values: ranked,
    })
}
