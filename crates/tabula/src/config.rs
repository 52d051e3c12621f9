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

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

pub const SUPPORTED_EXTENSIONS: &[&str] = &["csv", "xlsx", "xls"];

const DEFAULT_MODEL: &str = "gpt-4o";
const DEFAULT_MAX_FILE_SIZE_MB: u64 = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub max_file_size_mb: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            openai_model: DEFAULT_MODEL.to_string(),
            max_file_size_mb: DEFAULT_MAX_FILE_SIZE_MB,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let openai_api_key = std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty());
        let openai_model =
            std::env::var("OPENAI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let max_file_size_mb = match std::env::var("MAX_FILE_SIZE_MB") {
            Ok(raw) => raw
                .parse::<u64>()
                .map_err(|e| ConfigError::InvalidValue {
                    variable: "MAX_FILE_SIZE_MB".to_string(),
                    value: raw.clone(),
                    reason: e.to_string(),
                })?,
            Err(_) => DEFAULT_MAX_FILE_SIZE_MB,
        };
        Ok(Self {
            openai_api_key,
            openai_model,
            max_file_size_mb,
        })
    }

    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_mb * 1024 * 1024
    }

    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.openai_api_key
            .as_deref()
            .ok_or_else(|| ConfigError::MissingVariable {
                variable: "OPENAI_API_KEY".to_string(),
            })
    }
}
