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

//! In-memory SQL execution over the loaded dataset.
//!
//! The engine holds at most one registered table at a time. Loading a new
//! table always releases the previous one first, so a failed load leaves
//! the engine empty rather than pointing at stale data.

use crate::error::{DataError, QueryError, Result, TabulaError};
use crate::query::guard;
use polars::prelude::*;
use polars_sql::SQLContext;
use tracing::{debug, info};

pub struct AnalyticEngine {
    ctx: SQLContext,
    table: Option<String>,
}

impl AnalyticEngine {
    pub fn new() -> Self {
        Self {
            ctx: SQLContext::new(),
            table: None,
        }
    }

    pub fn table_name(&self) -> Option<&str> {
        self.table.as_deref()
    }

    /// Registers `df` under `name`, releasing any previously held table.
    pub fn load_table(&mut self, name: &str, df: DataFrame) {
        self.release();
        info!(table = name, rows = df.height(), "registering dataset");
        self.ctx.register(name, df.lazy());
        self.table = Some(name.to_string());
    }

    /// Drops the current table, if any. Idempotent.
    pub fn release(&mut self) {
        if let Some(name) = self.table.take() {
            debug!(table = %name, "releasing dataset");
            self.ctx.unregister(&name);
        }
    }

    /// Sanitizes, validates against the registered table, executes, and
    /// materialises the result.
    pub fn query(&mut self, raw_sql: &str) -> Result<DataFrame> {
        let table = self
            .table
            .clone()
            .ok_or(TabulaError::Data(DataError::NoDataset))?;
        let cleaned = guard::sanitize(raw_sql)?;
        guard::validate(&cleaned, &table)?;
        debug!(sql = %cleaned, "executing query");
        let frame = self
            .ctx
            .execute(&cleaned)
            .and_then(LazyFrame::collect)
            .map_err(QueryError::Execution)?;
        Ok(frame)
    }
}

impl Default for AnalyticEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for AnalyticEngine {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sales_frame() -> DataFrame {
        df!(
            "region" => &["north", "south", "north", "west"],
            "sales" => &[10i64, 20, 30, 40],
        )
        .unwrap()
    }

    #[test]
    fn query_without_dataset_fails() {
        let mut engine = AnalyticEngine::new();
        let result = engine.query("SELECT 1");
        assert!(matches!(
            result,
            Err(TabulaError::Data(DataError::NoDataset))
        ));
    }

    #[test]
    fn aggregation_over_registered_table() {
        let mut engine = AnalyticEngine::new();
        engine.load_table("sales", sales_frame());
        let out = engine
            .query("SELECT region, SUM(sales) AS total FROM sales GROUP BY region ORDER BY total")
            .unwrap();
        assert_eq!(out.width(), 2);
        assert_eq!(out.height(), 3);
    }

    #[test]
    fn replacing_a_table_releases_the_old_one() {
        let mut engine = AnalyticEngine::new();
        engine.load_table("first", sales_frame());
        engine.load_table("second", sales_frame());
        assert_eq!(engine.table_name(), Some("second"));
        assert!(engine.query("SELECT * FROM first").is_err());
        assert!(engine.query("SELECT * FROM second").is_ok());
    }

    #[test]
    fn stacked_statements_only_run_the_first() {
        let mut engine = AnalyticEngine::new();
        engine.load_table("sales", sales_frame());
        let out = engine
            .query("SELECT region FROM sales; SELECT sales FROM sales;")
            .unwrap();
        assert_eq!(out.get_column_names_str(), &["region"]);
    }

    #[test]
    fn write_verbs_are_vetoed_before_execution() {
        let mut engine = AnalyticEngine::new();
        engine.load_table("sales", sales_frame());
        assert!(matches!(
            engine.query("DELETE FROM sales"),
            Err(TabulaError::Query(QueryError::Rejected { .. }))
        ));
    }
}
