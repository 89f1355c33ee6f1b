//! Few-shot examples: previously accepted question/SQL pairs shown to the
//! model as demonstrations.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use crate::models::FewShotExample;

#[async_trait]
pub trait ExampleSource: Send + Sync {
    /// Up to `limit` of the most used examples, restricted to `domain` when set.
    async fn popular(&self, domain: Option<&str>, limit: usize) -> Result<Vec<FewShotExample>>;
}

/// Reads the `saved_prompts` table of the harness database.
pub struct SqliteExampleSource {
    pool: SqlitePool,
}

impl SqliteExampleSource {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ExampleSource for SqliteExampleSource {
    async fn popular(&self, domain: Option<&str>, limit: usize) -> Result<Vec<FewShotExample>> {
        let rows = match domain {
            Some(d) => {
                sqlx::query(
                    r#"
                    SELECT question, sql_generated FROM saved_prompts
                    WHERE domain_id = ? AND TRIM(COALESCE(sql_generated, '')) <> ''
                    ORDER BY usage_count DESC, id ASC
                    LIMIT ?
                    "#,
                )
                .bind(d)
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    r#"
                    SELECT question, sql_generated FROM saved_prompts
                    WHERE TRIM(COALESCE(sql_generated, '')) <> ''
                    ORDER BY usage_count DESC, id ASC
                    LIMIT ?
                    "#,
                )
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(rows
            .iter()
            .map(|row| FewShotExample {
                question: row.get("question"),
                sql: row.get("sql_generated"),
            })
            .collect())
    }
}

/// A fixed list of examples, ignoring domains.
#[derive(Debug, Clone, Default)]
pub struct StaticExamples(pub Vec<FewShotExample>);

#[async_trait]
impl ExampleSource for StaticExamples {
    async fn popular(&self, _domain: Option<&str>, limit: usize) -> Result<Vec<FewShotExample>> {
        Ok(self.0.iter().take(limit).cloned().collect())
    }
}
