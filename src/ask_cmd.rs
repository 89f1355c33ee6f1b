//! `nlsql ask` and `nlsql validate`.

use anyhow::{bail, Result};

use crate::config::Config;
use crate::guardrail::{SqlGuardrail, ValidationOutcome};
use crate::models::{OrchestratorResult, Record};
use crate::orchestrator::Orchestrator;

/// Answer a question and print the SQL, the rows and the answer.
pub async fn run_ask(config: &Config, question: &str, domain: Option<&str>, json: bool) -> Result<()> {
    let orchestrator = Orchestrator::from_config(config).await?;

    if config.retrieval.sync_on_startup && config.embedding.is_enabled() {
        if let Err(e) = orchestrator.retrieval().reindex_if_stale().await {
            tracing::warn!(error = %e, "index sync failed, continuing with the existing index");
        }
    }

    let result = orchestrator.process(question, domain).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result(&result);
    }

    if let Some(error) = result.error() {
        bail!("{}", error);
    }
    Ok(())
}

fn print_result(result: &OrchestratorResult) {
    println!("SQL: {}", result.sql.as_deref().unwrap_or("(none)"));

    if let Some(rows) = result.rows() {
        println!();
        print_rows(rows);
    }
    if let Some(answer) = result.answer() {
        println!();
        println!("{}", answer);
    }
}

fn print_rows(rows: &[Record]) {
    let Some(first) = rows.first() else {
        println!("(no rows)");
        return;
    };

    let columns: Vec<&str> = first.columns().collect();
    println!("{}", columns.join(" | "));
    for row in rows {
        let cells: Vec<String> = row.iter().map(|(_, value)| value.to_string()).collect();
        println!("{}", cells.join(" | "));
    }
    println!("({} rows)", rows.len());
}

/// Run the guardrail on `sql` without touching any database.
pub fn run_validate(config: &Config, sql: &str) -> Result<()> {
    let guardrail = SqlGuardrail::from_config(&config.guardrail, &config.schema.allowed_tables)?;
    match guardrail.validate(sql) {
        ValidationOutcome::Accepted(normalized) => {
            println!("accepted: {}", normalized);
            Ok(())
        }
        ValidationOutcome::Rejected(reason) => bail!("rejected: {}", reason),
    }
}
