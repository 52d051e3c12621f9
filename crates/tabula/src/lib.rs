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

//! Natural-language analysis over tabular files: load a CSV or Excel
//! file, infer a semantic schema, translate questions into guarded SQL,
//! execute them in-process, and describe the result as a chart.

pub mod chart;
pub mod config;
pub mod error;
pub mod ingest;
pub mod query;
pub mod schema;
pub mod session;
pub mod summary;

pub use chart::{recommend_chart, render_chart, ChartKind, Figure};
pub use config::{AppConfig, SUPPORTED_EXTENSIONS};
pub use error::{
    ChartError, ConfigError, DataError, QueryError, Result, TabulaError,
};
pub use ingest::{derive_table_name, load_table, LoadOptions, LoadedTable};
pub use query::{AnalyticEngine, OpenAiGenerator, SqlGenerator};
pub use schema::{infer_schema, Schema, SemanticType};
pub use session::{AnalysisOutcome, AnalysisSession, DatasetOverview};
pub use summary::{summarize, CategoricalSummary, DatasetSummary, NumericSummary};
