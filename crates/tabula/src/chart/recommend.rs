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

//! Chart-kind selection: an explicit wish in the question always wins,
//! otherwise a fixed priority cascade over the result's column shape.

use super::ChartKind;
use polars::prelude::*;

const TIME_INDICATORS: &[&str] = &[
    "date",
    "time",
    "year",
    "month",
    "day",
    "created",
    "updated",
    "timestamp",
];

/// Keyword groups scanned in order; the first group with a hit decides.
const CHART_MENTIONS: &[(ChartKind, &[&str])] = &[
    (
        ChartKind::Bar,
        &["bar chart", "bar graph", "barchart", "column chart"],
    ),
    (
        ChartKind::Line,
        &[
            "line chart",
            "line graph",
            "linechart",
            "trend",
            "over time",
            "time series",
        ],
    ),
    (
        ChartKind::Scatter,
        &[
            "scatter plot",
            "scatterplot",
            "scatter chart",
            "relationship",
            "correlation",
        ],
    ),
    (
        ChartKind::Pie,
        &["pie chart", "piechart", "donut chart", "proportion"],
    ),
    (ChartKind::Histogram, &["histogram", "distribution"]),
    (
        ChartKind::Box,
        &["box plot", "boxplot", "box and whisker", "whisker", "quartile"],
    ),
    (
        ChartKind::Heatmap,
        &["heatmap", "heat map", "correlation matrix"],
    ),
];

const HEATMAP_MAX_ROWS: usize = 50;

pub fn recommend_chart(df: &DataFrame, query: Option<&str>) -> ChartKind {
    if df.width() == 0 || df.height() == 0 {
        return ChartKind::Bar;
    }

    if let Some(query) = query {
        let query_lower = query.to_lowercase();
        for (kind, keywords) in CHART_MENTIONS {
            if keywords.iter().any(|k| query_lower.contains(k)) {
                return *kind;
            }
        }
    }

    let numeric = numeric_column_count(df);
    let non_numeric = df.width() - numeric;
    let has_time_like = df
        .get_columns()
        .iter()
        .any(|c| is_time_like(c.as_materialized_series()));

    if has_time_like && numeric >= 1 {
        return ChartKind::Line;
    }
    if numeric == 2 && non_numeric <= 1 {
        return ChartKind::Scatter;
    }
    if numeric == 1 && non_numeric == 0 {
        return ChartKind::Histogram;
    }
    if non_numeric >= 2 && numeric == 1 && df.height() <= HEATMAP_MAX_ROWS {
        return ChartKind::Heatmap;
    }
    if numeric == 1 && non_numeric == 1 && first_numeric_sums_to_proportion(df) {
        return ChartKind::Pie;
    }
    ChartKind::Bar
}

pub(crate) fn is_numeric_dtype(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
    )
}

fn numeric_column_count(df: &DataFrame) -> usize {
    df.get_columns()
        .iter()
        .filter(|c| is_numeric_dtype(c.dtype()))
        .count()
}

/// A column counts as time-like if its storage type is temporal or its
/// name carries a time indicator token.
pub(crate) fn is_time_like(series: &Series) -> bool {
    if matches!(
        series.dtype(),
        DataType::Date | DataType::Datetime(_, _) | DataType::Time
    ) {
        return true;
    }
    let name = series.name().to_lowercase();
    TIME_INDICATORS.iter().any(|token| name.contains(token))
}

/// The proportion heuristic is a known false-positive source: any small
/// numeric column whose values happen to sum near 1 or 100 will trip it.
/// Kept as-is; intent beyond the threshold is not recoverable.
fn first_numeric_sums_to_proportion(df: &DataFrame) -> bool {
    let Some(column) = df
        .get_columns()
        .iter()
        .find(|c| is_numeric_dtype(c.dtype()))
    else {
        return false;
    };
    let Ok(as_float) = column.as_materialized_series().cast(&DataType::Float64) else {
        return false;
    };
    let Ok(values) = as_float.f64() else {
        return false;
    };
    let total: f64 = values.into_iter().flatten().sum();
    (0.95..=1.05).contains(&total) || (95.0..=105.0).contains(&total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_frame_defaults_to_bar() {
        let df = DataFrame::empty();
        assert_eq!(recommend_chart(&df, None), ChartKind::Bar);
    }

    #[test]
    fn keyword_override_beats_data_shape() {
        // Two numeric and one categorical column would otherwise cascade
        // past pie entirely.
        let df = df!(
            "region" => &["a", "b", "c"],
            "x" => &[1.0f64, 2.0, 3.0],
            "y" => &[4.0f64, 5.0, 6.0],
        )
        .unwrap();
        assert_eq!(
            recommend_chart(&df, Some("show me a pie chart")),
            ChartKind::Pie
        );
    }

    #[test]
    fn trend_keyword_selects_line() {
        let df = df!("v" => &[1i64, 2]).unwrap();
        assert_eq!(
            recommend_chart(&df, Some("what is the TREND here")),
            ChartKind::Line
        );
    }

    #[test]
    fn date_named_column_with_numeric_selects_line() {
        let df = df!(
            "date" => &["2023-01-01", "2023-02-01"],
            "sales" => &[10i64, 20],
        )
        .unwrap();
        assert_eq!(recommend_chart(&df, None), ChartKind::Line);
    }

    #[test]
    fn two_numeric_columns_select_scatter() {
        let df = df!(
            "height" => &[1.0f64, 2.0, 3.0],
            "weight" => &[4.0f64, 5.0, 6.0],
        )
        .unwrap();
        assert_eq!(recommend_chart(&df, None), ChartKind::Scatter);
    }

    #[test]
    fn single_numeric_column_selects_histogram() {
        let df = df!("v" => &[1.0f64, 2.0, 3.0]).unwrap();
        assert_eq!(recommend_chart(&df, None), ChartKind::Histogram);
    }

    #[test]
    fn two_categories_one_numeric_and_few_rows_select_heatmap() {
        let df = df!(
            "row" => &["a", "a", "b", "b"],
            "col" => &["x", "y", "x", "y"],
            "v" => &[1.0f64, 2.0, 3.0, 4.0],
        )
        .unwrap();
        assert_eq!(recommend_chart(&df, None), ChartKind::Heatmap);
    }

    #[test]
    fn percentages_summing_to_hundred_select_pie() {
        let df = df!(
            "segment" => &["a", "b", "c"],
            "share" => &[50.0f64, 30.0, 20.0],
        )
        .unwrap();
        assert_eq!(recommend_chart(&df, None), ChartKind::Pie);
    }

    #[test]
    fn category_and_plain_numeric_fall_back_to_bar() {
        let df = df!(
            "region" => &["a", "b", "c"],
            "sales" => &[400.0f64, 300.0, 500.0],
        )
        .unwrap();
        assert_eq!(recommend_chart(&df, None), ChartKind::Bar);
    }
}
