//! Prompt composition for SQL generation and answer summarization.
//!
//! The user prompt is a sequence of markdown sections in a fixed order:
//! schema context, business rules, examples, the previous failure (if any),
//! then the question. Empty sections are omitted.

use std::fmt::Write;

use crate::models::{FewShotExample, Record};

/// Built-in instruction for SQL generation. Overridable with
/// `llm.system_prompt_path`.
pub const SYSTEM_PROMPT: &str = "\
You translate questions into SQL for the database described by the user.
Answer with exactly one read-only SELECT statement and nothing else.
Name every column explicitly; never use SELECT *.
Only use the tables and columns present in the provided schema.
Respect every business rule.
Do not add explanations, comments or markdown.";

/// Instruction for turning result rows into a natural-language answer.
pub const SUMMARY_SYSTEM_PROMPT: &str = "\
You answer questions in natural language.
You are given a question, the SQL query that was run and its results.
Answer clearly and concisely by summarizing the results, in the language of the question.
Do not mention the SQL in your answer.";

/// Build the user prompt for SQL generation.
pub fn build_user_prompt(
    question: &str,
    context: &str,
    rules: &[String],
    examples: &[FewShotExample],
    feedback: Option<&str>,
) -> String {
    let mut out = String::new();

    out.push_str("## Database schema\n");
    out.push_str(context.trim_end());
    out.push_str("\n\n");

    if !rules.is_empty() {
        out.push_str("## Business rules\n");
        for (i, rule) in rules.iter().enumerate() {
            let _ = writeln!(out, "{}. {}", i + 1, rule);
        }
        out.push('\n');
    }

    if !examples.is_empty() {
        out.push_str("## Examples\n");
        for (i, example) in examples.iter().enumerate() {
            let _ = writeln!(out, "{}. Question: {}", i + 1, example.question);
            let _ = writeln!(out, "   SQL: {}", example.sql);
        }
        out.push('\n');
    }

    if let Some(reason) = feedback {
        out.push_str("## Previous attempt\n");
        let _ = writeln!(
            out,
            "The previous attempt failed because: {}. Correct the query.",
            reason.trim_end_matches('.')
        );
        out.push('\n');
    }

    out.push_str("## Question\n");
    out.push_str(question);
    out
}

/// Build the user prompt for summarization, showing at most `max_rows` rows.
pub fn build_summary_prompt(question: &str, sql: &str, rows: &[Record], max_rows: usize) -> String {
    let shown = &rows[..rows.len().min(max_rows)];

    let mut out = String::new();
    let _ = writeln!(out, "Question: {}\n", question);
    let _ = writeln!(out, "SQL executed: {}\n", sql);
    let _ = writeln!(out, "Results ({} rows):", rows.len());
    for row in shown {
        let _ = writeln!(out, "{}", row);
    }
    if shown.len() < rows.len() {
        let _ = writeln!(out, "... {} more rows not shown", rows.len() - shown.len());
    }
    out.push_str("\nAnswer the question in natural language.");
    out
}
