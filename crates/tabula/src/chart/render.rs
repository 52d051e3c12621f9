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

//! Column-role selection and figure construction. A `Figure` is a
//! self-contained, serialisable chart description a front-end can draw
//! without access to the result set. Rendering never fails outward;
//! any internal error degrades to a placeholder figure carrying the
//! error text.

use super::recommend::is_numeric_dtype;
use super::ChartKind;
use crate::error::ChartError;
use indexmap::IndexMap;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::warn;

const NO_DATA_MESSAGE: &str = "No data available for visualization";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AxisValues {
    Numeric(Vec<Option<f64>>),
    Text(Vec<String>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoxGroup {
    pub name: String,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Figure {
    Bar {
        title: String,
        x_label: String,
        y_label: String,
        categories: Vec<String>,
        values: Vec<Option<f64>>,
        color: Option<Vec<String>>,
    },
    Line {
        title: String,
        x_label: String,
        y_label: String,
        x: Vec<String>,
        y: Vec<Option<f64>>,
        color: Option<Vec<String>>,
    },
    Scatter {
        title: String,
        x_label: String,
        y_label: String,
        x: AxisValues,
        y: Vec<Option<f64>>,
        color: Option<Vec<String>>,
        size: Option<Vec<Option<f64>>>,
    },
    Pie {
        title: String,
        names: Vec<String>,
        values: Vec<Option<f64>>,
    },
    Histogram {
        title: String,
        x_label: String,
        bin_edges: Vec<f64>,
        counts: Vec<u32>,
    },
    Box {
        title: String,
        x_label: Option<String>,
        y_label: String,
        groups: Vec<BoxGroup>,
    },
    Heatmap {
        title: String,
        x_label: String,
        y_label: String,
        value_label: String,
        x_categories: Vec<String>,
        y_categories: Vec<String>,
        values: Vec<Vec<Option<f64>>>,
    },
    Placeholder {
        title: String,
        message: String,
    },
}

impl Figure {
    pub fn placeholder(message: impl Into<String>) -> Self {
        Figure::Placeholder {
            title: "Chart unavailable".to_string(),
            message: message.into(),
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, Figure::Placeholder { .. })
    }

    pub fn title(&self) -> &str {
        match self {
            Figure::Bar { title, .. }
            | Figure::Line { title, .. }
            | Figure::Scatter { title, .. }
            | Figure::Pie { title, .. }
            | Figure::Histogram { title, .. }
            | Figure::Box { title, .. }
            | Figure::Heatmap { title, .. }
            | Figure::Placeholder { title, .. } => title,
        }
    }
}

/// Column-to-role assignment for one result set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Roles {
    pub x: String,
    pub y: String,
    pub color: Option<String>,
    pub size: Option<String>,
}

/// x: first non-numeric column, else the first column, else a synthetic
/// row index. y: first numeric column, else the last column. color:
/// second non-numeric. size: second numeric (used by scatter only).
pub fn select_roles(df: &DataFrame) -> Roles {
    let names: Vec<String> = df
        .get_columns()
        .iter()
        .map(|c| c.name().to_string())
        .collect();
    let numeric: Vec<&String> = names
        .iter()
        .zip(df.get_columns())
        .filter(|(_, c)| is_numeric_dtype(c.dtype()))
        .map(|(n, _)| n)
        .collect();
    let non_numeric: Vec<&String> = names
        .iter()
        .zip(df.get_columns())
        .filter(|(_, c)| !is_numeric_dtype(c.dtype()))
        .map(|(n, _)| n)
        .collect();

    let x = non_numeric
        .first()
        .map(|n| (*n).clone())
        .or_else(|| names.first().cloned())
        .unwrap_or_else(|| "index".to_string());
    let y = numeric
        .first()
        .map(|n| (*n).clone())
        .or_else(|| names.last().cloned())
        .unwrap_or_else(|| "index".to_string());
    Roles {
        x,
        y,
        color: non_numeric.get(1).map(|n| (*n).clone()),
        size: numeric.get(1).map(|n| (*n).clone()),
    }
}

pub fn render_chart(df: &DataFrame, kind: ChartKind, query: Option<&str>) -> Figure {
    if df.width() == 0 || df.height() == 0 {
        return Figure::placeholder(NO_DATA_MESSAGE);
    }
    match build_figure(df, kind, query) {
        Ok(figure) => figure,
        Err(e) => {
            warn!(kind = %kind, error = %e, "chart rendering failed, returning placeholder");
            Figure::placeholder(format!("Error generating chart: {e}"))
        }
    }
}

fn build_figure(
    df: &DataFrame,
    kind: ChartKind,
    query: Option<&str>,
) -> Result<Figure, ChartError> {
    let roles = select_roles(df);
    let title = match query {
        Some(q) => format!("Results for: {q}"),
        None => format!("{} by {}", roles.y, roles.x),
    };
    match kind {
        ChartKind::Bar => build_bar(df, &roles, title),
        ChartKind::Line => build_line(df, &roles, title),
        ChartKind::Scatter => build_scatter(df, &roles, title),
        ChartKind::Pie => build_pie(df, &roles, title),
        ChartKind::Histogram => build_histogram(df),
        ChartKind::Box => build_box(df, &roles),
        ChartKind::Heatmap => build_heatmap(df, &roles),
    }
}

fn build_bar(df: &DataFrame, roles: &Roles, title: String) -> Result<Figure, ChartError> {
    Ok(Figure::Bar {
        title,
        x_label: roles.x.clone(),
        y_label: roles.y.clone(),
        categories: stringify_column(df, &roles.x)?,
        values: float_column(df, &roles.y)?,
        color: optional_strings(df, roles.color.as_deref())?,
    })
}

fn build_line(df: &DataFrame, roles: &Roles, title: String) -> Result<Figure, ChartError> {
    Ok(Figure::Line {
        title,
        x_label: roles.x.clone(),
        y_label: roles.y.clone(),
        x: stringify_column(df, &roles.x)?,
        y: float_column(df, &roles.y)?,
        color: optional_strings(df, roles.color.as_deref())?,
    })
}

fn build_scatter(df: &DataFrame, roles: &Roles, title: String) -> Result<Figure, ChartError> {
    let x_column = column(df, &roles.x)?;
    let x = if is_numeric_dtype(x_column.dtype()) {
        AxisValues::Numeric(float_column(df, &roles.x)?)
    } else {
        AxisValues::Text(stringify_column(df, &roles.x)?)
    };
    let size = match roles.size.as_deref() {
        Some(name) => Some(float_column(df, name)?),
        None => None,
    };
    Ok(Figure::Scatter {
        title,
        x_label: roles.x.clone(),
        y_label: roles.y.clone(),
        x,
        y: float_column(df, &roles.y)?,
        color: optional_strings(df, roles.color.as_deref())?,
        size,
    })
}

fn build_pie(df: &DataFrame, roles: &Roles, title: String) -> Result<Figure, ChartError> {
    Ok(Figure::Pie {
        title,
        names: stringify_column(df, &roles.x)?,
        values: float_column(df, &roles.y)?,
    })
}

/// Bins the first numeric column; the general x/y selection is ignored.
fn build_histogram(df: &DataFrame) -> Result<Figure, ChartError> {
    let Some(column) = df
        .get_columns()
        .iter()
        .find(|c| is_numeric_dtype(c.dtype()))
        .or_else(|| df.get_columns().first())
    else {
        return Err(ChartError::EmptyResult);
    };
    let name = column.name().to_string();
    let values: Vec<f64> = float_column(df, &name)?
        .into_iter()
        .flatten()
        .filter(|v| v.is_finite())
        .collect();
    if values.is_empty() {
        return Err(ChartError::RenderFailure {
            kind: "histogram".to_string(),
            reason: format!("column '{name}' has no numeric values to bin"),
        });
    }
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    // Sturges' rule, clamped to something displayable.
    let bin_count = (((values.len() as f64).log2().ceil() as usize) + 1).clamp(1, 50);
    let width = if max > min {
        (max - min) / bin_count as f64
    } else {
        1.0
    };
    let mut counts = vec![0u32; bin_count];
    for value in &values {
        let mut index = ((value - min) / width) as usize;
        if index >= bin_count {
            index = bin_count - 1;
        }
        counts[index] += 1;
    }
    let bin_edges: Vec<f64> = (0..=bin_count).map(|i| min + width * i as f64).collect();
    Ok(Figure::Histogram {
        title: format!("Distribution of {name}"),
        x_label: name,
        bin_edges,
        counts,
    })
}

/// Groups the first numeric column by the first non-numeric one when
/// present, otherwise a single group.
fn build_box(df: &DataFrame, roles: &Roles) -> Result<Figure, ChartError> {
    let y_values = float_column(df, &roles.y)?;
    let group_column = df
        .get_columns()
        .iter()
        .find(|c| !is_numeric_dtype(c.dtype()))
        .map(|c| c.name().to_string());
    let groups = match &group_column {
        Some(group_name) => {
            let labels = stringify_column(df, group_name)?;
            let mut grouped: IndexMap<String, Vec<f64>> = IndexMap::new();
            for (label, value) in labels.into_iter().zip(y_values) {
                if let Some(v) = value {
                    grouped.entry(label).or_default().push(v);
                }
            }
            grouped
                .into_iter()
                .map(|(name, values)| BoxGroup { name, values })
                .collect()
        }
        None => vec![BoxGroup {
            name: roles.y.clone(),
            values: y_values.into_iter().flatten().collect(),
        }],
    };
    let title = match &group_column {
        Some(group_name) => format!("Distribution of {} by {}", roles.y, group_name),
        None => format!("Distribution of {}", roles.y),
    };
    Ok(Figure::Box {
        title,
        x_label: group_column,
        y_label: roles.y.clone(),
        groups,
    })
}

/// Pivoted category-by-category mean grid when the shape allows it, else a
/// numeric correlation grid, else a plain bar chart.
fn build_heatmap(df: &DataFrame, roles: &Roles) -> Result<Figure, ChartError> {
    let non_numeric: Vec<String> = df
        .get_columns()
        .iter()
        .filter(|c| !is_numeric_dtype(c.dtype()))
        .map(|c| c.name().to_string())
        .collect();
    let numeric: Vec<String> = df
        .get_columns()
        .iter()
        .filter(|c| is_numeric_dtype(c.dtype()))
        .map(|c| c.name().to_string())
        .collect();

    if non_numeric.len() >= 2 && !numeric.is_empty() {
        return build_pivot_heatmap(df, &non_numeric[0], &non_numeric[1], &numeric[0]);
    }
    if numeric.len() >= 2 {
        return build_correlation_heatmap(df, &numeric);
    }
    build_bar(
        df,
        roles,
        "Data visualization (heatmap not applicable)".to_string(),
    )
}

fn build_pivot_heatmap(
    df: &DataFrame,
    row_name: &str,
    col_name: &str,
    value_name: &str,
) -> Result<Figure, ChartError> {
    let rows = stringify_column(df, row_name)?;
    let cols = stringify_column(df, col_name)?;
    let values = float_column(df, value_name)?;

    let mut sums: IndexMap<(String, String), (f64, usize)> = IndexMap::new();
    let mut y_categories: Vec<String> = Vec::new();
    let mut x_categories: Vec<String> = Vec::new();
    for ((row, col), value) in rows.into_iter().zip(cols).zip(values) {
        if !y_categories.contains(&row) {
            y_categories.push(row.clone());
        }
        if !x_categories.contains(&col) {
            x_categories.push(col.clone());
        }
        if let Some(v) = value {
            let cell = sums.entry((row, col)).or_insert((0.0, 0));
            cell.0 += v;
            cell.1 += 1;
        }
    }
    let grid: Vec<Vec<Option<f64>>> = y_categories
        .iter()
        .map(|row| {
            x_categories
                .iter()
                .map(|col| {
                    sums.get(&(row.clone(), col.clone()))
                        .map(|(sum, count)| sum / *count as f64)
                })
                .collect()
        })
        .collect();
    Ok(Figure::Heatmap {
        title: format!("Heatmap of {value_name} by {row_name} and {col_name}"),
        x_label: col_name.to_string(),
        y_label: row_name.to_string(),
        value_label: value_name.to_string(),
        x_categories,
        y_categories,
        values: grid,
    })
}

fn build_correlation_heatmap(df: &DataFrame, numeric: &[String]) -> Result<Figure, ChartError> {
    let columns: Vec<Vec<Option<f64>>> = numeric
        .iter()
        .map(|name| float_column(df, name))
        .collect::<Result<_, _>>()?;
    let grid: Vec<Vec<Option<f64>>> = columns
        .iter()
        .map(|a| columns.iter().map(|b| pearson(a, b)).collect())
        .collect();
    Ok(Figure::Heatmap {
        title: "Correlation Heatmap".to_string(),
        x_label: "Features".to_string(),
        y_label: "Features".to_string(),
        value_label: "Correlation".to_string(),
        x_categories: numeric.to_vec(),
        y_categories: numeric.to_vec(),
        values: grid,
    })
}

fn pearson(a: &[Option<f64>], b: &[Option<f64>]) -> Option<f64> {
    let pairs: Vec<(f64, f64)> = a
        .iter()
        .zip(b)
        .filter_map(|(x, y)| match (x, y) {
            (Some(x), Some(y)) if x.is_finite() && y.is_finite() => Some((*x, *y)),
            _ => None,
        })
        .collect();
    if pairs.len() < 2 {
        return None;
    }
    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|(_, y)| y).sum::<f64>() / n;
    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (x, y) in &pairs {
        cov += (x - mean_x) * (y - mean_y);
        var_x += (x - mean_x).powi(2);
        var_y += (y - mean_y).powi(2);
    }
    let denom = (var_x * var_y).sqrt();
    if denom < f64::EPSILON {
        return None;
    }
    Some(cov / denom)
}

fn column<'a>(df: &'a DataFrame, name: &str) -> Result<&'a Column, ChartError> {
    df.column(name).map_err(|e| ChartError::RenderFailure {
        kind: "column lookup".to_string(),
        reason: e.to_string(),
    })
}

fn stringify_column(df: &DataFrame, name: &str) -> Result<Vec<String>, ChartError> {
    let series = column(df, name)?.as_materialized_series();
    let as_string = series
        .cast(&DataType::String)
        .map_err(|e| ChartError::RenderFailure {
            kind: "stringify".to_string(),
            reason: e.to_string(),
        })?;
    let ca = as_string.str().map_err(|e| ChartError::RenderFailure {
        kind: "stringify".to_string(),
        reason: e.to_string(),
    })?;
    Ok(ca
        .into_iter()
        .map(|opt| opt.unwrap_or("").to_string())
        .collect())
}

fn float_column(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>, ChartError> {
    let series = column(df, name)?.as_materialized_series();
    let as_float = series
        .cast(&DataType::Float64)
        .map_err(|e| ChartError::RenderFailure {
            kind: "numeric cast".to_string(),
            reason: e.to_string(),
        })?;
    let ca = as_float.f64().map_err(|e| ChartError::RenderFailure {
        kind: "numeric cast".to_string(),
        reason: e.to_string(),
    })?;
    Ok(ca.into_iter().collect())
}

fn optional_strings(
    df: &DataFrame,
    name: Option<&str>,
) -> Result<Option<Vec<String>>, ChartError> {
    match name {
        Some(name) => Ok(Some(stringify_column(df, name)?)),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region_sales() -> DataFrame {
        df!(
            "region" => &["north", "south", "west"],
            "sales" => &[400i64, 300, 500],
        )
        .unwrap()
    }

    #[test]
    fn empty_frame_renders_placeholder_not_error() {
        let df = DataFrame::empty();
        let figure = render_chart(&df, ChartKind::Bar, None);
        assert!(figure.is_placeholder());
    }

    #[test]
    fn bar_selects_category_x_and_numeric_y() {
        let figure = render_chart(&region_sales(), ChartKind::Bar, None);
        match figure {
            Figure::Bar {
                title,
                x_label,
                y_label,
                categories,
                values,
                ..
            } => {
                assert_eq!(title, "sales by region");
                assert_eq!(x_label, "region");
                assert_eq!(y_label, "sales");
                assert_eq!(categories, vec!["north", "south", "west"]);
                assert_eq!(values, vec![Some(400.0), Some(300.0), Some(500.0)]);
            }
            other => panic!("expected bar figure, got {other:?}"),
        }
    }

    #[test]
    fn query_text_becomes_the_title() {
        let figure = render_chart(&region_sales(), ChartKind::Bar, Some("total sales by region"));
        assert_eq!(figure.title(), "Results for: total sales by region");
    }

    #[test]
    fn second_columns_become_color_and_size() {
        let df = df!(
            "a" => &["x", "y"],
            "b" => &["p", "q"],
            "m" => &[1.0f64, 2.0],
            "n" => &[3.0f64, 4.0],
        )
        .unwrap();
        let roles = select_roles(&df);
        assert_eq!(roles.x, "a");
        assert_eq!(roles.y, "m");
        assert_eq!(roles.color.as_deref(), Some("b"));
        assert_eq!(roles.size.as_deref(), Some("n"));
    }

    #[test]
    fn all_numeric_frame_uses_first_column_for_x() {
        let df = df!(
            "u" => &[1.0f64, 2.0],
            "v" => &[3.0f64, 4.0],
        )
        .unwrap();
        let roles = select_roles(&df);
        assert_eq!(roles.x, "u");
        assert_eq!(roles.y, "u");
        assert_eq!(roles.size.as_deref(), Some("v"));
    }

    #[test]
    fn histogram_bins_cover_the_value_range() {
        let values: Vec<f64> = (0..100).map(f64::from).collect();
        let df = df!("v" => &values).unwrap();
        let figure = render_chart(&df, ChartKind::Histogram, None);
        match figure {
            Figure::Histogram {
                bin_edges, counts, ..
            } => {
                assert_eq!(bin_edges.len(), counts.len() + 1);
                assert_eq!(counts.iter().sum::<u32>(), 100);
                assert!((bin_edges[0] - 0.0).abs() < f64::EPSILON);
                assert!((bin_edges[bin_edges.len() - 1] - 99.0).abs() < 1e-9);
            }
            other => panic!("expected histogram figure, got {other:?}"),
        }
    }

    #[test]
    fn box_groups_by_first_category() {
        let df = df!(
            "team" => &["a", "a", "b"],
            "score" => &[1.0f64, 3.0, 5.0],
        )
        .unwrap();
        let figure = render_chart(&df, ChartKind::Box, None);
        match figure {
            Figure::Box { title, groups, .. } => {
                assert_eq!(title, "Distribution of score by team");
                assert_eq!(groups.len(), 2);
                assert_eq!(groups[0].name, "a");
                assert_eq!(groups[0].values, vec![1.0, 3.0]);
            }
            other => panic!("expected box figure, got {other:?}"),
        }
    }

    #[test]
    fn heatmap_pivots_two_categories() {
        let df = df!(
            "row" => &["a", "a", "b"],
            "col" => &["x", "y", "x"],
            "v" => &[1.0f64, 2.0, 3.0],
        )
        .unwrap();
        let figure = render_chart(&df, ChartKind::Heatmap, None);
        match figure {
            Figure::Heatmap {
                x_categories,
                y_categories,
                values,
                ..
            } => {
                assert_eq!(y_categories, vec!["a", "b"]);
                assert_eq!(x_categories, vec!["x", "y"]);
                assert_eq!(values[0], vec![Some(1.0), Some(2.0)]);
                assert_eq!(values[1], vec![Some(3.0), None]);
            }
            other => panic!("expected heatmap figure, got {other:?}"),
        }
    }

    #[test]
    fn heatmap_falls_back_to_correlation_for_numeric_frames() {
        let df = df!(
            "u" => &[1.0f64, 2.0, 3.0],
            "v" => &[2.0f64, 4.0, 6.0],
        )
        .unwrap();
        let figure = render_chart(&df, ChartKind::Heatmap, None);
        match figure {
            Figure::Heatmap { values, title, .. } => {
                assert_eq!(title, "Correlation Heatmap");
                let r = values[0][1].unwrap();
                assert!((r - 1.0).abs() < 1e-9);
            }
            other => panic!("expected correlation heatmap, got {other:?}"),
        }
    }

    #[test]
    fn heatmap_falls_back_to_bar_when_nothing_fits() {
        let df = df!(
            "name" => &["a", "b"],
            "note" => &["x", "y"],
        )
        .unwrap();
        let figure = render_chart(&df, ChartKind::Heatmap, None);
        assert!(matches!(figure, Figure::Bar { .. }));
    }
}
