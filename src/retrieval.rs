//! Schema context retrieval and index maintenance.
//!
//! The [`RetrievalService`] owns the segment index. It answers "what schema
//! context is relevant to this question" and keeps the index consistent with
//! the catalog by comparing content fingerprints.
//!
//! # Retrieval
//!
//! 1. Embed the question.
//! 2. Search for up to `max_results` segments scoring at least `min_score`,
//!    scoped to a domain when one is given.
//! 3. Drop business-rules matches; join the remaining segment texts.
//! 4. If nothing is left, or if embedding or search failed, use the full
//!    schema description instead.
//! 5. Always append the complete business rules.
//!
//! # Staleness
//!
//! [`reindex_if_stale`](RetrievalService::reindex_if_stale) computes the
//! fingerprint of the catalog and compares it to the persisted one. On a
//! mismatch it rebuilds the index and only then persists the new
//! fingerprint, so an interrupted rebuild is retried on the next call.
//! Rebuilds are serialized by a mutex; searches never wait on it.

use anyhow::{bail, Result};
use serde::Serialize;
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::catalog::{render_rules, SchemaCatalog, StaticSchemaCatalog};
use crate::config::Config;
use crate::embedding::{create_provider, embed_query, EmbeddingProvider};
use crate::fingerprint;
use crate::models::SegmentKind;
use crate::segment::{build_segments, RULES_HEADING};
use crate::store::{SegmentStore, SqliteSegmentStore};

/// Result of a staleness check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReindexOutcome {
    /// The stored fingerprint matched; nothing was done.
    UpToDate,
    /// The index was rebuilt with this many segments.
    Reindexed { segments: usize },
}

/// Snapshot of the index state, as shown by `nlsql index status`.
#[derive(Debug, Clone, Serialize)]
pub struct IndexStatus {
    pub segments: u64,
    pub stored_fingerprint: Option<String>,
    pub current_fingerprint: String,
    pub stale: bool,
}

pub struct RetrievalService {
    catalog: Arc<dyn SchemaCatalog>,
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn SegmentStore>,
    max_results: usize,
    min_score: f64,
    batch_size: usize,
    reindex_lock: Mutex<()>,
}

impl RetrievalService {
    pub fn new(
        catalog: Arc<dyn SchemaCatalog>,
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn SegmentStore>,
    ) -> Self {
        Self {
            catalog,
            embedder,
            store,
            max_results: 5,
            min_score: 0.5,
            batch_size: 64,
            reindex_lock: Mutex::new(()),
        }
    }

    /// Override the number of segments returned and the relevance floor.
    pub fn with_search(mut self, max_results: usize, min_score: f64) -> Self {
        self.max_results = max_results;
        self.min_score = min_score;
        self
    }

    /// Override how many segment texts go into one embedding request.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Wire a service against the harness database using the configured
    /// catalog files and embedding provider.
    pub fn from_config(config: &Config, pool: SqlitePool) -> Result<Self> {
        let catalog = StaticSchemaCatalog::load(&config.schema)?;
        let embedder = create_provider(&config.embedding)?;
        let store = SqliteSegmentStore::new(pool);

        Ok(Self::new(Arc::new(catalog), embedder, Arc::new(store))
            .with_search(config.retrieval.max_results, config.retrieval.min_score)
            .with_batch_size(config.embedding.batch_size))
    }

    pub fn catalog(&self) -> &dyn SchemaCatalog {
        self.catalog.as_ref()
    }

    /// Schema context for `question`, always ending with the business rules.
    ///
    /// Never fails: any embedding or search error degrades to the full
    /// schema description.
    pub async fn retrieve_context(&self, question: &str, domain: Option<&str>) -> String {
        let matched = match self.search_segments(question, domain).await {
            Ok(texts) => texts,
            Err(e) => {
                tracing::warn!(error = %e, "segment search failed, using full schema description");
                Vec::new()
            }
        };

        let context = if matched.is_empty() {
            tracing::debug!("no relevant segments, using full schema description");
            self.catalog.description().to_string()
        } else {
            tracing::debug!(segments = matched.len(), "retrieved schema segments");
            matched.join("\n\n")
        };

        format!(
            "{}\n\n{}\n{}",
            context.trim_end(),
            RULES_HEADING,
            render_rules(self.catalog.business_rules())
        )
    }

    async fn search_segments(&self, question: &str, domain: Option<&str>) -> Result<Vec<String>> {
        let query_vec = embed_query(self.embedder.as_ref(), question).await?;
        let matches = self
            .store
            .search(&query_vec, self.max_results, self.min_score, domain)
            .await?;

        Ok(matches
            .into_iter()
            .filter(|m| m.segment.kind != SegmentKind::BusinessRules)
            .map(|m| m.segment.text)
            .collect())
    }

    /// Rebuild the index if the catalog changed since the last rebuild.
    pub async fn reindex_if_stale(&self) -> Result<ReindexOutcome> {
        let _guard = self.reindex_lock.lock().await;

        let current = self.current_fingerprint();
        let stored = self.store.stored_fingerprint().await?;
        if stored.as_deref() == Some(current.as_str()) {
            tracing::debug!(fingerprint = %current, "schema index up to date");
            return Ok(ReindexOutcome::UpToDate);
        }

        tracing::info!(
            fingerprint = %current,
            previous = stored.as_deref().unwrap_or("none"),
            "schema changed, re-indexing"
        );
        let segments = self.rebuild(&current).await?;
        Ok(ReindexOutcome::Reindexed { segments })
    }

    /// Rebuild the index unconditionally. Returns the number of segments.
    pub async fn reindex(&self) -> Result<usize> {
        let _guard = self.reindex_lock.lock().await;
        let current = self.current_fingerprint();
        self.rebuild(&current).await
    }

    /// Remove every segment and forget the fingerprint. Returns the number
    /// of segments removed.
    pub async fn purge(&self) -> Result<u64> {
        let _guard = self.reindex_lock.lock().await;
        self.store.clear_fingerprint().await?;
        let removed = self.store.purge().await?;
        tracing::info!(segments = removed, "schema index purged");
        Ok(removed)
    }

    pub async fn status(&self) -> Result<IndexStatus> {
        let current = self.current_fingerprint();
        let stored = self.store.stored_fingerprint().await?;
        Ok(IndexStatus {
            segments: self.store.count().await?,
            stale: stored.as_deref() != Some(current.as_str()),
            stored_fingerprint: stored,
            current_fingerprint: current,
        })
    }

    fn current_fingerprint(&self) -> String {
        fingerprint::compute(self.catalog.description(), self.catalog.business_rules())
    }

    // Caller holds `reindex_lock`.
    async fn rebuild(&self, fingerprint: &str) -> Result<usize> {
        let segments = build_segments(self.catalog.as_ref());
        let texts: Vec<String> = segments.iter().map(|s| s.text.clone()).collect();

        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let embedded = self.embedder.embed(batch).await?;
            if embedded.len() != batch.len() {
                bail!(
                    "embedding provider returned {} vectors for {} texts",
                    embedded.len(),
                    batch.len()
                );
            }
            vectors.extend(embedded);
        }

        self.store.replace_all(&segments, &vectors).await?;
        self.store.save_fingerprint(fingerprint).await?;

        tracing::info!(
            segments = segments.len(),
            model = self.embedder.model_name(),
            "schema index rebuilt"
        );
        Ok(segments.len())
    }
}
