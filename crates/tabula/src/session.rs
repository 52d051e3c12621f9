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

//! One analysis session: a loaded dataset, its inferred schema, and the
//! question-to-figure pipeline wired end to end.

use crate::chart::{recommend_chart, render_chart, ChartKind, Figure};
use crate::config::AppConfig;
use crate::error::{ConfigError, DataError, Result, TabulaError};
use crate::ingest::{load_table, LoadOptions, LoadedTable};
use crate::query::{AnalyticEngine, OpenAiGenerator, SqlGenerator};
use crate::schema::{infer_schema, Schema};
use crate::summary::{summarize, DatasetSummary};
use polars::prelude::*;
use std::path::Path;
use tracing::{info, warn};

const PREVIEW_ROW_LIMIT: usize = 1000;

/// Everything the caller needs to show right after a file is loaded.
#[derive(Debug, Clone)]
pub struct DatasetOverview {
    pub table_name: String,
    pub schema: Schema,
    pub summary: DatasetSummary,
    pub preview: DataFrame,
}

/// The answer to one natural-language question.
#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub sql: String,
    pub result: DataFrame,
    pub chart_kind: ChartKind,
    pub figure: Figure,
}

pub struct AnalysisSession {
    config: AppConfig,
    engine: AnalyticEngine,
    generator: Option<Box<dyn SqlGenerator>>,
    dataset: Option<LoadedTable>,
    schema: Option<Schema>,
    last_result: Option<DataFrame>,
}

impl AnalysisSession {
    /// Builds a session from configuration. The SQL generator is wired up
    /// only when an API key is configured; `ask` reports the gap otherwise.
    pub fn new(config: AppConfig) -> Self {
        let generator = config.openai_api_key.as_ref().map(|key| {
            Box::new(OpenAiGenerator::new(key.clone(), config.openai_model.clone()))
                as Box<dyn SqlGenerator>
        });
        Self {
            config,
            engine: AnalyticEngine::new(),
            generator,
            dataset: None,
            schema: None,
            last_result: None,
        }
    }

    /// Replaces the generator, mainly for tests and alternative back ends.
    pub fn with_generator(mut self, generator: Box<dyn SqlGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn table_name(&self) -> Option<&str> {
        self.dataset.as_ref().map(|d| d.table_name.as_str())
    }

    pub fn schema(&self) -> Option<&Schema> {
        self.schema.as_ref()
    }

    pub fn last_result(&self) -> Option<&DataFrame> {
        self.last_result.as_ref()
    }

    /// Loads a file as the session's dataset. The previous dataset is
    /// released up front, so a failed load leaves the session empty
    /// rather than answering questions against stale data.
    pub fn load_file(&mut self, path: &Path, options: &LoadOptions) -> Result<DatasetOverview> {
        self.engine.release();
        self.dataset = None;
        self.schema = None;
        self.last_result = None;

        let loaded = load_table(path, &self.config, options)?;
        let schema = infer_schema(&loaded.frame);
        let summary = summarize(&loaded.frame, &schema).map_err(TabulaError::Data)?;
        let preview = loaded.frame.head(Some(PREVIEW_ROW_LIMIT));
        self.engine
            .load_table(&loaded.table_name, loaded.frame.clone());
        let overview = DatasetOverview {
            table_name: loaded.table_name.clone(),
            schema: schema.clone(),
            summary,
            preview,
        };
        self.dataset = Some(loaded);
        self.schema = Some(schema);
        Ok(overview)
    }

    /// Full pipeline for one question: generate SQL, execute it, pick a
    /// chart kind, and build the figure. The previous result is kept
    /// when a step fails, so the caller can keep showing it.
    pub async fn ask(&mut self, question: &str) -> Result<AnalysisOutcome> {
        let (table_name, schema) = match (&self.dataset, &self.schema) {
            (Some(dataset), Some(schema)) => (dataset.table_name.clone(), schema.clone()),
            _ => return Err(DataError::NoDataset.into()),
        };
        let generator = self.generator.as_ref().ok_or_else(|| {
            TabulaError::Config(ConfigError::MissingVariable {
                variable: "OPENAI_API_KEY".to_string(),
            })
        })?;

        let sql = generator.generate_sql(question, &table_name, &schema).await?;
        info!(%sql, "executing generated query");
        let result = match self.engine.query(&sql) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "generated query failed, keeping previous result");
                return Err(e);
            }
        };
        self.last_result = Some(result.clone());

        let chart_kind = recommend_chart(&result, Some(question));
        let figure = render_chart(&result, chart_kind, Some(question));
        Ok(AnalysisOutcome {
            sql,
            result,
            chart_kind,
            figure,
        })
    }

    /// Runs caller-authored SQL through the same guard rails as
    /// generated SQL.
    pub fn execute_sql(&mut self, sql: &str) -> Result<DataFrame> {
        let result = self.engine.query(sql)?;
        self.last_result = Some(result.clone());
        Ok(result)
    }

    /// Writes the most recent result set to `path` as CSV.
    pub fn export_csv(&self, path: &Path) -> Result<()> {
        let mut frame = self
            .last_result
            .clone()
            .ok_or(TabulaError::Data(DataError::NoDataset))?;
        let mut file = std::fs::File::create(path)?;
        CsvWriter::new(&mut file)
            .include_header(true)
            .finish(&mut frame)
            .map_err(DataError::Polars)?;
        info!(path = %path.display(), rows = frame.height(), "exported result set");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::QueryError;
    use async_trait::async_trait;
    use std::io::Write;
    use std::path::PathBuf;

    struct ScriptedGenerator {
        sql: String,
    }

    #[async_trait]
    impl SqlGenerator for ScriptedGenerator {
        async fn generate_sql(
            &self,
            _question: &str,
            _table_name: &str,
            _schema: &Schema,
        ) -> std::result::Result<String, QueryError> {
            Ok(self.sql.clone())
        }
    }

    fn sales_csv(dir: &tempfile::TempDir) -> PathBuf {
        let path = dir.path().join("sales.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(b"region,sales\nnorth,10\nsouth,20\nnorth,30\n")
            .unwrap();
        path
    }

    fn session_with(sql: &str) -> AnalysisSession {
        AnalysisSession::new(AppConfig::default()).with_generator(Box::new(ScriptedGenerator {
            sql: sql.to_string(),
        }))
    }

    #[tokio::test]
    async fn ask_without_a_dataset_fails() {
        let mut session = session_with("SELECT 1");
        let result = session.ask("anything").await;
        assert!(matches!(
            result,
            Err(TabulaError::Data(DataError::NoDataset))
        ));
    }

    #[tokio::test]
    async fn ask_without_an_api_key_reports_configuration() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = AnalysisSession::new(AppConfig::default());
        session
            .load_file(&sales_csv(&dir), &LoadOptions::default())
            .unwrap();
        let result = session.ask("total sales").await;
        assert!(matches!(
            result,
            Err(TabulaError::Config(ConfigError::MissingVariable { .. }))
        ));
    }

    #[tokio::test]
    async fn pipeline_produces_result_and_figure() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session_with(
            "SELECT region, SUM(sales) AS total FROM sales GROUP BY region ORDER BY region",
        );
        let overview = session
            .load_file(&sales_csv(&dir), &LoadOptions::default())
            .unwrap();
        assert_eq!(overview.table_name, "sales");

        let outcome = session.ask("total sales by region").await.unwrap();
        assert_eq!(outcome.result.height(), 2);
        assert_eq!(outcome.chart_kind, ChartKind::Bar);
        assert!(!outcome.figure.is_placeholder());
        assert!(session.last_result().is_some());
    }

    #[tokio::test]
    async fn failed_query_keeps_the_previous_result() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session_with("SELECT region, sales FROM sales");
        session
            .load_file(&sales_csv(&dir), &LoadOptions::default())
            .unwrap();
        session.ask("show everything").await.unwrap();

        session.generator = Some(Box::new(ScriptedGenerator {
            sql: "SELECT no_such_column FROM sales".to_string(),
        }));
        assert!(session.ask("bad question").await.is_err());
        let kept = session.last_result().unwrap();
        assert_eq!(kept.height(), 3);
    }

    #[tokio::test]
    async fn export_writes_the_last_result() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session_with("SELECT region FROM sales");
        session
            .load_file(&sales_csv(&dir), &LoadOptions::default())
            .unwrap();
        session.ask("regions").await.unwrap();

        let out = dir.path().join("out.csv");
        session.export_csv(&out).unwrap();
        let written = std::fs::read_to_string(&out).unwrap();
        assert!(written.starts_with("region\n"));
    }

    #[test]
    fn loading_a_second_file_replaces_the_first() {
        let dir = tempfile::tempdir().unwrap();
        let first = sales_csv(&dir);
        let second = dir.path().join("other.csv");
        std::fs::write(&second, "a,b\n1,2\n").unwrap();

        let mut session = AnalysisSession::new(AppConfig::default());
        session.load_file(&first, &LoadOptions::default()).unwrap();
        session.load_file(&second, &LoadOptions::default()).unwrap();
        assert_eq!(session.table_name(), Some("other"));
        assert!(session.execute_sql("SELECT * FROM sales").is_err());
        assert!(session.execute_sql("SELECT * FROM other").is_ok());
    }
}
