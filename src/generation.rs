//! SQL generation and answer summarization on top of a [`ChatModel`].
//!
//! Models rarely answer with a bare statement. [`extract_sql`] turns a free
//! form reply into a single candidate statement; it never fails, since the
//! guardrail decides whether the result is usable.

use anyhow::{Context, Result};
use regex::Regex;
use std::sync::{Arc, LazyLock};

use crate::config::Config;
use crate::llm::{create_chat_model, ChatMessage, ChatModel};
use crate::models::{FewShotExample, Record};
use crate::prompt::{self, SUMMARY_SYSTEM_PROMPT, SYSTEM_PROMPT};

static BLANK_LINE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n\s*\n").unwrap());

// "SQL:", "Query :", "Requête :"
static LABEL_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\p{L}+\s*:\s*").unwrap());

/// Extract one SQL statement from a model reply.
///
/// - `None` stays `None`; blank text is returned unchanged.
/// - A reply starting with a code fence is unwrapped.
/// - Everything from the first `;` on is dropped.
/// - If a blank line separates a SELECT-like first block from trailing
///   prose, only the first block is kept.
/// - A leading `label:` is removed.
pub fn extract_sql(raw: Option<&str>) -> Option<String> {
    let raw = raw?;
    if raw.trim().is_empty() {
        return Some(raw.to_string());
    }

    let mut text = raw.trim();

    if text.starts_with("```") {
        if let (Some(newline), Some(last_fence)) = (text.find('\n'), text.rfind("```")) {
            if last_fence > newline {
                text = text[newline + 1..last_fence].trim();
            }
        }
    }

    if let Some(idx) = text.find(';') {
        text = text[..idx].trim();
    }

    let mut blocks = BLANK_LINE.splitn(text, 2);
    if let (Some(first), Some(_)) = (blocks.next(), blocks.next()) {
        if first.to_uppercase().contains("SELECT") {
            text = first.trim();
        }
    }

    if let Some(m) = LABEL_PREFIX.find(text) {
        text = text[m.end()..].trim();
    }

    Some(text.to_string())
}

pub struct GenerationClient {
    model: Arc<dyn ChatModel>,
    system_prompt: String,
    summary_rows: usize,
}

impl GenerationClient {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self {
            model,
            system_prompt: SYSTEM_PROMPT.to_string(),
            summary_rows: 20,
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }

    /// Cap on the rows shown to the model when summarizing.
    pub fn with_summary_rows(mut self, summary_rows: usize) -> Self {
        self.summary_rows = summary_rows;
        self
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let mut client = Self::new(create_chat_model(&config.llm)?)
            .with_summary_rows(config.orchestrator.summary_rows);
        if let Some(ref path) = config.llm.system_prompt_path {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read system prompt: {}", path.display()))?;
            client = client.with_system_prompt(text);
        }
        Ok(client)
    }

    pub fn model_name(&self) -> &str {
        self.model.model_name()
    }

    /// Ask the model for SQL and extract the candidate statement.
    ///
    /// `Ok(None)` means the model produced no text at all.
    pub async fn generate_sql(
        &self,
        question: &str,
        context: &str,
        rules: &[String],
        examples: &[FewShotExample],
        feedback: Option<&str>,
    ) -> Result<Option<String>> {
        let user = prompt::build_user_prompt(question, context, rules, examples, feedback);
        let messages = [
            ChatMessage::system(self.system_prompt.as_str()),
            ChatMessage::user(user),
        ];

        let reply = self.model.chat(&messages).await?;
        tracing::debug!(reply = reply.as_deref().unwrap_or(""), "model reply");
        Ok(extract_sql(reply.as_deref()))
    }

    /// Turn result rows into a natural-language answer.
    pub async fn summarize(&self, question: &str, sql: &str, rows: &[Record]) -> Result<String> {
        let user = prompt::build_summary_prompt(question, sql, rows, self.summary_rows);
        let messages = [
            ChatMessage::system(SUMMARY_SYSTEM_PROMPT),
            ChatMessage::user(user),
        ];

        let reply = self
            .model
            .chat(&messages)
            .await?
            .ok_or_else(|| anyhow::anyhow!("model returned no answer"))?;
        Ok(reply.trim().to_string())
    }
}
