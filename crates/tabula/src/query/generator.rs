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

//! Natural-language to SQL translation over an external chat-completion
//! API. The model is the only party that understands the question; this
//! module just builds the prompt, moves bytes, and cleans up the reply.

use crate::error::QueryError;
use crate::schema::Schema;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MAX_RETRIES: u32 = 3;

#[async_trait]
pub trait SqlGenerator: Send + Sync {
    async fn generate_sql(
        &self,
        question: &str,
        table_name: &str,
        schema: &Schema,
    ) -> Result<String, QueryError>;
}

#[derive(Debug, Clone)]
pub struct OpenAiGenerator {
    client: Client,
    api_key: String,
    model: String,
    endpoint: String,
    timeout: Duration,
    max_retries: u32,
}

impl OpenAiGenerator {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        let timeout = Duration::from_secs(DEFAULT_TIMEOUT_SECS);
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            api_key: api_key.into(),
            model: model.into(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    fn build_payload(&self, question: &str, table_name: &str, schema: &Schema) -> Value {
        json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": build_system_prompt(table_name, schema)},
                {"role": "user", "content": question}
            ],
            "temperature": 0.1,
            "max_tokens": 300
        })
    }

    async fn execute_with_retry(&self, payload: &Value) -> Result<Value, QueryError> {
        let mut last_error = None;
        for attempt in 0..self.max_retries.max(1) {
            let sent = tokio::time::timeout(
                self.timeout,
                self.client
                    .post(&self.endpoint)
                    .header("Authorization", format!("Bearer {}", self.api_key))
                    .header("Content-Type", "application/json")
                    .json(payload)
                    .send(),
            )
            .await;
            match sent {
                Ok(Ok(response)) => {
                    let status = response.status();
                    if status.is_success() {
                        return response.json().await.map_err(|e| QueryError::Generation {
                            reason: format!("failed to parse API response: {e}"),
                        });
                    }
                    let body = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "unknown error".to_string());
                    last_error = Some(QueryError::Generation {
                        reason: format!("API error {status}: {body}"),
                    });
                    // Client errors other than rate limiting will not
                    // recover on retry.
                    if status.is_client_error() && status.as_u16() != 429 {
                        break;
                    }
                }
                Ok(Err(e)) => {
                    warn!(attempt, error = %e, "SQL generation request failed");
                    last_error = Some(QueryError::Generation {
                        reason: format!("request failed: {e}"),
                    });
                    tokio::time::sleep(Duration::from_secs(2_u64.pow(attempt.min(3)))).await;
                }
                Err(_) => {
                    last_error = Some(QueryError::Generation {
                        reason: "request timed out".to_string(),
                    });
                }
            }
        }
        Err(last_error.unwrap_or_else(|| QueryError::Generation {
            reason: "no attempts were made".to_string(),
        }))
    }
}

#[async_trait]
impl SqlGenerator for OpenAiGenerator {
    async fn generate_sql(
        &self,
        question: &str,
        table_name: &str,
        schema: &Schema,
    ) -> Result<String, QueryError> {
        let payload = self.build_payload(question, table_name, schema);
        let response = self.execute_with_retry(&payload).await?;
        let content = response["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| QueryError::Generation {
                reason: "response carried no message content".to_string(),
            })?;
        let sql = strip_code_fences(content);
        debug!(%sql, "generated SQL");
        Ok(sql)
    }
}

fn build_system_prompt(table_name: &str, schema: &Schema) -> String {
    let schema_info = schema
        .iter()
        .map(|(name, semantic_type)| format!("- {name} ({semantic_type})"))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "You are an expert SQL query generator. Your task is to convert natural \
         language questions about data into SQL queries.\n\n\
         The table name is: `{table_name}`\n\n\
         The schema of the table is:\n{schema_info}\n\n\
         Rules for generating SQL:\n\
         1. Only use the columns that exist in the schema.\n\
         2. Always use proper SQL syntax compatible with DuckDB.\n\
         3. Do not include any explanations, only return the SQL query.\n\
         4. Always use double quotes for column names, especially if they contain \
         spaces or special characters.\n\
         5. For aggregate queries with GROUP BY, include the grouping columns in \
         the SELECT clause.\n\
         6. Make educated guesses about what columns to use based on the query and \
         schema.\n\
         7. Always limit results to at most 1000 rows by default with LIMIT 1000.\n\
         8. If the question asks for a specific number of results (e.g. \"top 5\"), \
         use LIMIT appropriately."
    )
}

/// Models often wrap replies in markdown fences; keep only the SQL inside.
fn strip_code_fences(content: &str) -> String {
    let trimmed = content.trim();
    if let Some(rest) = trimmed.split_once("```sql") {
        if let Some((sql, _)) = rest.1.split_once("```") {
            return sql.trim().to_string();
        }
    }
    if let Some(rest) = trimmed.split_once("```") {
        if let Some((sql, _)) = rest.1.split_once("```") {
            return sql.trim().to_string();
        }
    }
    trimmed.to_string()
}
