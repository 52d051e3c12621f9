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

use anyhow::Context;
use clap::Parser;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tabula::{AnalysisOutcome, AnalysisSession, AppConfig, DatasetOverview, LoadOptions};
use tracing::info;

/// Ask questions about a CSV or Excel file in plain language.
#[derive(Debug, Parser)]
#[command(name = "tabula-cli", version, about)]
struct Cli {
    /// Data file to analyse (.csv, .xlsx or .xls)
    #[arg(short, long)]
    file: PathBuf,

    /// CSV field separator
    #[arg(long, default_value = ",", value_parser = parse_delimiter)]
    delimiter: u8,

    /// Excel worksheet name; first sheet when omitted
    #[arg(long)]
    sheet: Option<String>,

    /// Ask a single question and exit instead of starting a prompt
    #[arg(short, long)]
    question: Option<String>,

    /// Run raw SQL and exit instead of starting a prompt
    #[arg(long, conflicts_with = "question")]
    sql: Option<String>,

    /// Write the result of --question or --sql to this CSV file
    #[arg(long)]
    export: Option<PathBuf>,

    /// Print the recommended figure as JSON alongside the result table
    #[arg(long)]
    chart_json: bool,
}

/// The CSV reader works on bytes, so the separator must be one ASCII
/// character.
fn parse_delimiter(raw: &str) -> Result<u8, String> {
    let mut chars = raw.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii() => Ok(c as u8),
        (Some(_), None) => Err(format!("'{raw}' is not an ASCII character")),
        _ => Err("delimiter must be a single character".to_string()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn,tabula=info".into()),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = AppConfig::from_env().context("failed to load configuration")?;
    let mut session = AnalysisSession::new(config);

    let options = LoadOptions {
        delimiter: cli.delimiter,
        sheet: cli.sheet.clone(),
    };
    let overview = session
        .load_file(&cli.file, &options)
        .with_context(|| format!("failed to load {}", cli.file.display()))?;
    print_overview(&overview);

    if let Some(sql) = &cli.sql {
        let result = session.execute_sql(sql)?;
        println!("{result}");
        export_if_requested(&session, cli.export.as_deref())?;
        return Ok(());
    }
    if let Some(question) = &cli.question {
        let outcome = session.ask(question).await?;
        print_outcome(&outcome, cli.chart_json)?;
        export_if_requested(&session, cli.export.as_deref())?;
        return Ok(());
    }

    interactive_loop(&mut session, cli.chart_json).await
}

async fn interactive_loop(session: &mut AnalysisSession, chart_json: bool) -> anyhow::Result<()> {
    println!("Type a question, ':sql <query>', ':export <path>' or ':quit'.");
    let stdin = io::stdin();
    loop {
        print!("> ");
        io::stdout().flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input == ":quit" || input == ":q" {
            break;
        }
        if let Some(sql) = input.strip_prefix(":sql ") {
            match session.execute_sql(sql) {
                Ok(result) => println!("{result}"),
                Err(e) => eprintln!("{}", e.user_message()),
            }
            continue;
        }
        if let Some(path) = input.strip_prefix(":export ") {
            match session.export_csv(std::path::Path::new(path.trim())) {
                Ok(()) => println!("Saved to {}", path.trim()),
                Err(e) => eprintln!("{}", e.user_message()),
            }
            continue;
        }
        match session.ask(input).await {
            Ok(outcome) => print_outcome(&outcome, chart_json)?,
            Err(e) => eprintln!("{}", e.user_message()),
        }
    }
    info!("session closed");
    Ok(())
}

fn print_overview(overview: &DatasetOverview) {
    println!(
        "Loaded '{}' ({} rows, {} columns)",
        overview.table_name, overview.summary.rows, overview.summary.columns
    );
    println!("Schema:");
    for (column, semantic_type) in overview.schema.iter() {
        println!("  {column}: {semantic_type}");
    }
}

fn print_outcome(outcome: &AnalysisOutcome, chart_json: bool) -> anyhow::Result<()> {
    println!("SQL: {}", outcome.sql);
    println!("{}", outcome.result);
    println!("Suggested chart: {}", outcome.chart_kind);
    if chart_json {
        println!("{}", serde_json::to_string_pretty(&outcome.figure)?);
    }
    Ok(())
}

fn export_if_requested(
    session: &AnalysisSession,
    path: Option<&std::path::Path>,
) -> anyhow::Result<()> {
    if let Some(path) = path {
        session
            .export_csv(path)
            .with_context(|| format!("failed to export to {}", path.display()))?;
        println!("Saved to {}", path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn common_separators_parse() {
        assert_eq!(parse_delimiter(","), Ok(b','));
        assert_eq!(parse_delimiter(";"), Ok(b';'));
        assert_eq!(parse_delimiter("|"), Ok(b'|'));
        assert_eq!(parse_delimiter("\t"), Ok(b'\t'));
    }

    #[test]
    fn non_ascii_separator_is_rejected_not_truncated() {
        assert!(parse_delimiter("§").is_err());
        assert!(parse_delimiter("€").is_err());
    }

    #[test]
    fn multi_character_separator_is_rejected() {
        assert!(parse_delimiter(";;").is_err());
        assert!(parse_delimiter("").is_err());
    }
}
