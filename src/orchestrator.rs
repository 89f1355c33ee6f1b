//! The question-answering loop.
//!
//! One call to [`Orchestrator::process`] runs at most `max_attempts`
//! attempts. Each attempt generates SQL, validates it, executes it, and
//! summarizes the rows. Any failure along the way becomes the feedback for
//! the next attempt, so the model sees exactly why its previous statement
//! was refused. Schema context and few-shot examples are gathered once per
//! question and reused across attempts.
//!
//! ```text
//! question ─► retrieve context ─► generate ─► validate ─► execute ─► summarize ─► answer
//!                                    ▲            │           │           │
//!                                    └─ feedback ─┴───────────┴───────────┘
//! ```

use anyhow::Result;
use std::sync::Arc;
use thiserror::Error;

use crate::config::{Config, OrchestratorConfig};
use crate::db;
use crate::executor::{QueryExecutor, SqliteExecutor};
use crate::few_shot::{ExampleSource, SqliteExampleSource};
use crate::generation::GenerationClient;
use crate::guardrail::SqlGuardrail;
use crate::models::{FewShotExample, OrchestratorResult};
use crate::retrieval::RetrievalService;

/// Errors reported before any pipeline stage runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("question must not be blank")]
    BlankQuestion,
}

/// What one attempt leaves behind for the next.
#[derive(Debug, Clone, Default)]
struct AttemptState {
    /// Last SQL the model produced, normalized if it was accepted.
    last_sql: Option<String>,
    /// Why the previous attempt failed.
    feedback: Option<String>,
}

enum Step {
    Done(OrchestratorResult),
    Retry(AttemptState),
}

/// Inputs shared by every attempt for one question.
struct Prompt<'a> {
    question: &'a str,
    context: &'a str,
    rules: &'a [String],
    examples: &'a [FewShotExample],
}

pub struct Orchestrator {
    retrieval: Arc<RetrievalService>,
    generator: GenerationClient,
    guardrail: SqlGuardrail,
    executor: Arc<dyn QueryExecutor>,
    examples: Arc<dyn ExampleSource>,
    max_attempts: usize,
    few_shot_limit: usize,
}

impl Orchestrator {
    pub fn new(
        retrieval: Arc<RetrievalService>,
        generator: GenerationClient,
        guardrail: SqlGuardrail,
        executor: Arc<dyn QueryExecutor>,
        examples: Arc<dyn ExampleSource>,
        config: &OrchestratorConfig,
    ) -> Self {
        Self {
            retrieval,
            generator,
            guardrail,
            executor,
            examples,
            max_attempts: config.max_attempts.max(1),
            few_shot_limit: config.few_shot_limit,
        }
    }

    /// Wire the full pipeline from configuration: harness database, target
    /// database, catalog files, embedding provider and chat model.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        let retrieval = Arc::new(RetrievalService::from_config(config, pool.clone())?);
        let generator = GenerationClient::from_config(config)?;
        let guardrail = SqlGuardrail::from_config(&config.guardrail, &config.schema.allowed_tables)?;
        let executor = SqliteExecutor::from_config(&config.target).await?;
        tracing::info!(
            model = generator.model_name(),
            target = %config.target.path.display(),
            "pipeline ready"
        );

        Ok(Self::new(
            retrieval,
            generator,
            guardrail,
            Arc::new(executor),
            Arc::new(SqliteExampleSource::new(pool)),
            &config.orchestrator,
        ))
    }

    pub fn retrieval(&self) -> &Arc<RetrievalService> {
        &self.retrieval
    }

    pub fn guardrail(&self) -> &SqlGuardrail {
        &self.guardrail
    }

    /// Answer `question`, optionally scoped to a domain.
    ///
    /// Returns `Err` only for a blank question. Every other failure,
    /// including running out of attempts, is an `OrchestratorResult` carrying
    /// an error message.
    pub async fn process(
        &self,
        question: &str,
        domain: Option<&str>,
    ) -> Result<OrchestratorResult, EngineError> {
        if question.trim().is_empty() {
            return Err(EngineError::BlankQuestion);
        }
        tracing::info!(question, domain = domain.unwrap_or("-"), "processing question");

        let context = self.retrieval.retrieve_context(question, domain).await;
        let examples = self.load_examples(domain).await;
        let prompt = Prompt {
            question,
            context: &context,
            rules: self.retrieval.catalog().business_rules(),
            examples: &examples,
        };

        let mut state = AttemptState::default();
        for attempt in 1..=self.max_attempts {
            match self.attempt(&prompt, attempt, state).await {
                Step::Done(result) => return Ok(result),
                Step::Retry(next) => state = next,
            }
        }

        let reason = state.feedback.unwrap_or_else(|| "no attempt was made".to_string());
        tracing::warn!(attempts = self.max_attempts, "giving up");
        Ok(OrchestratorResult::failure(
            question,
            state.last_sql,
            format!("failed after {} attempts: {}", self.max_attempts, reason),
        ))
    }

    async fn attempt(&self, prompt: &Prompt<'_>, attempt: usize, state: AttemptState) -> Step {
        let generated = self
            .generator
            .generate_sql(
                prompt.question,
                prompt.context,
                prompt.rules,
                prompt.examples,
                state.feedback.as_deref(),
            )
            .await;

        let candidate = match generated {
            Ok(Some(sql)) => sql,
            Ok(None) => return retry(state.last_sql, attempt, "generation failed: model returned no SQL"),
            Err(e) => return retry(state.last_sql, attempt, &format!("generation failed: {}", e)),
        };
        tracing::info!(attempt, sql = %candidate, "generated SQL");

        let last_sql = if candidate.trim().is_empty() {
            state.last_sql
        } else {
            Some(candidate.clone())
        };

        let validated = match self.guardrail.validate(&candidate).into_result() {
            Ok(sql) => sql,
            Err(reason) => return retry(last_sql, attempt, &format!("validation failed: {}", reason)),
        };
        let sql = validated.as_str().to_string();

        let result = match self.executor.execute(&validated).await {
            Ok(result) => result,
            Err(e) => return retry(Some(sql), attempt, &format!("execution failed: {}", e)),
        };
        tracing::info!(attempt, rows = result.rows.len(), truncated = result.truncated, "query executed");

        match self
            .generator
            .summarize(prompt.question, &sql, &result.rows)
            .await
        {
            Ok(answer) => Step::Done(OrchestratorResult::success(
                prompt.question,
                sql,
                result.rows,
                answer,
            )),
            Err(e) => retry(Some(sql), attempt, &format!("answer generation failed: {}", e)),
        }
    }

    async fn load_examples(&self, domain: Option<&str>) -> Vec<FewShotExample> {
        if self.few_shot_limit == 0 {
            return Vec::new();
        }
        match self.examples.popular(domain, self.few_shot_limit).await {
            Ok(examples) => examples,
            Err(e) => {
                tracing::warn!(error = %e, "could not load few-shot examples");
                Vec::new()
            }
        }
    }
}

fn retry(last_sql: Option<String>, attempt: usize, feedback: &str) -> Step {
    tracing::warn!(attempt, reason = feedback, "attempt failed");
    Step::Retry(AttemptState {
        last_sql,
        feedback: Some(feedback.to_string()),
    })
}
