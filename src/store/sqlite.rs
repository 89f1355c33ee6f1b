//! SQLite-backed [`SegmentStore`] implementation.
//!
//! Segments and their vectors live in the `segments` table; the fingerprint
//! lives in `index_metadata`. Search loads every vector (optionally scoped to
//! one domain) and scores them in process. Schema indexes are small, so a
//! brute-force scan is sufficient.

use anyhow::{bail, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use super::{rank, SegmentStore};
use crate::embedding::{blob_to_vec, relevance_score, vec_to_blob};
use crate::fingerprint::FINGERPRINT_KEY;
use crate::models::{SchemaSegment, SegmentKind, SegmentMatch};

/// SQLite implementation of the [`SegmentStore`] trait.
pub struct SqliteSegmentStore {
    pool: SqlitePool,
}

impl SqliteSegmentStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SegmentStore for SqliteSegmentStore {
    async fn replace_all(&self, segments: &[SchemaSegment], vectors: &[Vec<f32>]) -> Result<()> {
        if segments.len() != vectors.len() {
            bail!(
                "segment/vector count mismatch: {} segments, {} vectors",
                segments.len(),
                vectors.len()
            );
        }

        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM segments").execute(&mut *tx).await?;

        for (segment, vector) in segments.iter().zip(vectors.iter()) {
            sqlx::query(
                r#"
                INSERT INTO segments (id, kind, domain, table_name, text, embedding, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&segment.id)
            .bind(segment.kind.as_str())
            .bind(&segment.domain)
            .bind(&segment.table_name)
            .bind(&segment.text)
            .bind(vec_to_blob(vector))
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn purge(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM segments")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn search(
        &self,
        query_vec: &[f32],
        limit: usize,
        min_score: f64,
        domain: Option<&str>,
    ) -> Result<Vec<SegmentMatch>> {
        let rows = match domain {
            Some(d) => {
                sqlx::query(
                    "SELECT id, kind, domain, table_name, text, embedding FROM segments WHERE domain = ?",
                )
                .bind(d)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query("SELECT id, kind, domain, table_name, text, embedding FROM segments")
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        let mut matches = Vec::new();
        for row in rows {
            let kind_str: String = row.get("kind");
            let Some(kind) = SegmentKind::parse(&kind_str) else {
                tracing::warn!(kind = %kind_str, "skipping segment with unknown kind");
                continue;
            };
            let blob: Vec<u8> = row.get("embedding");
            let score = relevance_score(query_vec, &blob_to_vec(&blob));
            if score < min_score {
                continue;
            }
            matches.push(SegmentMatch {
                segment: SchemaSegment {
                    id: row.get("id"),
                    kind,
                    domain: row.get("domain"),
                    table_name: row.get("table_name"),
                    text: row.get("text"),
                },
                score,
            });
        }

        Ok(rank(matches, limit))
    }

    async fn count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM segments")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    async fn stored_fingerprint(&self) -> Result<Option<String>> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM index_metadata WHERE key = ?")
                .bind(FINGERPRINT_KEY)
                .fetch_optional(&self.pool)
                .await?;
        Ok(value)
    }

    async fn save_fingerprint(&self, fingerprint: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO index_metadata (key, value) VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(FINGERPRINT_KEY)
        .bind(fingerprint)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn clear_fingerprint(&self) -> Result<()> {
        sqlx::query("DELETE FROM index_metadata WHERE key = ?")
            .bind(FINGERPRINT_KEY)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
