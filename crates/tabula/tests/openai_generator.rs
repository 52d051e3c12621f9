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

use polars::df;
use serde_json::json;
use tabula::{infer_schema, OpenAiGenerator, QueryError, SqlGenerator};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn sample_schema() -> tabula::Schema {
    let frame = df!(
        "region" => &["north"],
        "sales" => &[1i64],
    )
    .unwrap();
    infer_schema(&frame)
}

fn chat_reply(content: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "choices": [
            {"message": {"role": "assistant", "content": content}}
        ]
    }))
}

#[tokio::test]
async fn fenced_reply_is_unwrapped_to_plain_sql() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("Authorization", "Bearer test-key"))
        .respond_with(chat_reply(
            "```sql\nSELECT region, SUM(sales) FROM sales GROUP BY region LIMIT 1000\n```",
        ))
        .expect(1)
        .mount(&server)
        .await;

    let generator = OpenAiGenerator::new("test-key", "gpt-4o")
        .with_endpoint(format!("{}/v1/chat/completions", server.uri()));
    let sql = generator
        .generate_sql("sales by region", "sales", &sample_schema())
        .await
        .unwrap();
    assert_eq!(
        sql,
        "SELECT region, SUM(sales) FROM sales GROUP BY region LIMIT 1000"
    );
}

#[tokio::test]
async fn client_error_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
        .expect(1)
        .mount(&server)
        .await;

    let generator = OpenAiGenerator::new("test-key", "gpt-4o")
        .with_endpoint(server.uri())
        .with_max_retries(3);
    let result = generator
        .generate_sql("anything", "sales", &sample_schema())
        .await;
    assert!(matches!(result, Err(QueryError::Generation { .. })));
}

#[tokio::test]
async fn server_error_is_retried_until_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(chat_reply("SELECT 1"))
        .mount(&server)
        .await;

    let generator = OpenAiGenerator::new("test-key", "gpt-4o")
        .with_endpoint(server.uri())
        .with_max_retries(2);
    let sql = generator
        .generate_sql("anything", "sales", &sample_schema())
        .await
        .unwrap();
    assert_eq!(sql, "SELECT 1");
}

#[tokio::test]
async fn reply_without_content_is_a_generation_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
        .mount(&server)
        .await;

    let generator = OpenAiGenerator::new("test-key", "gpt-4o").with_endpoint(server.uri());
    let result = generator
        .generate_sql("anything", "sales", &sample_schema())
        .await;
    assert!(matches!(result, Err(QueryError::Generation { .. })));
}
