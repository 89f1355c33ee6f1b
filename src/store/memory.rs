//! In-memory [`SegmentStore`] implementation for testing.
//!
//! Uses a `Vec` behind `std::sync::RwLock` for thread safety. Search is
//! brute-force relevance scoring over all stored vectors.

use std::sync::RwLock;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use super::{rank, SegmentStore};
use crate::embedding::relevance_score;
use crate::models::{SchemaSegment, SegmentMatch};

struct StoredSegment {
    segment: SchemaSegment,
    vector: Vec<f32>,
}

/// In-memory segment store.
pub struct InMemorySegmentStore {
    segments: RwLock<Vec<StoredSegment>>,
    fingerprint: RwLock<Option<String>>,
}

impl InMemorySegmentStore {
    pub fn new() -> Self {
        Self {
            segments: RwLock::new(Vec::new()),
            fingerprint: RwLock::new(None),
        }
    }
}

impl Default for InMemorySegmentStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow!("segment store lock poisoned")
}

#[async_trait]
impl SegmentStore for InMemorySegmentStore {
    async fn replace_all(&self, segments: &[SchemaSegment], vectors: &[Vec<f32>]) -> Result<()> {
        if segments.len() != vectors.len() {
            bail!(
                "segment/vector count mismatch: {} segments, {} vectors",
                segments.len(),
                vectors.len()
            );
        }
        let fresh: Vec<StoredSegment> = segments
            .iter()
            .zip(vectors.iter())
            .map(|(segment, vector)| StoredSegment {
                segment: segment.clone(),
                vector: vector.clone(),
            })
            .collect();

        let mut stored = self.segments.write().map_err(poisoned)?;
        *stored = fresh;
        Ok(())
    }

    async fn purge(&self) -> Result<u64> {
        let mut stored = self.segments.write().map_err(poisoned)?;
        let removed = stored.len() as u64;
        stored.clear();
        Ok(removed)
    }

    async fn search(
        &self,
        query_vec: &[f32],
        limit: usize,
        min_score: f64,
        domain: Option<&str>,
    ) -> Result<Vec<SegmentMatch>> {
        let stored = self.segments.read().map_err(poisoned)?;
        let matches = stored
            .iter()
            .filter(|s| domain.map_or(true, |d| s.segment.domain == d))
            .map(|s| SegmentMatch {
                segment: s.segment.clone(),
                score: relevance_score(query_vec, &s.vector),
            })
            .filter(|m| m.score >= min_score)
            .collect();
        Ok(rank(matches, limit))
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.segments.read().map_err(poisoned)?.len() as u64)
    }

    async fn stored_fingerprint(&self) -> Result<Option<String>> {
        Ok(self.fingerprint.read().map_err(poisoned)?.clone())
    }

    async fn save_fingerprint(&self, fingerprint: &str) -> Result<()> {
        *self.fingerprint.write().map_err(poisoned)? = Some(fingerprint.to_string());
        Ok(())
    }

    async fn clear_fingerprint(&self) -> Result<()> {
        *self.fingerprint.write().map_err(poisoned)? = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SegmentKind, DEFAULT_DOMAIN};

    fn segment(id: &str, domain: &str) -> SchemaSegment {
        SchemaSegment {
            id: id.to_string(),
            kind: SegmentKind::TableSchema,
            domain: domain.to_string(),
            table_name: Some(id.to_string()),
            text: format!("{} table", id),
        }
    }

    #[tokio::test]
    async fn test_search_orders_and_filters() {
        let store = InMemorySegmentStore::new();
        store
            .replace_all(
                &[
                    segment("a", DEFAULT_DOMAIN),
                    segment("b", DEFAULT_DOMAIN),
                    segment("c", DEFAULT_DOMAIN),
                ],
                &[vec![1.0, 0.0], vec![0.7, 0.7], vec![-1.0, 0.0]],
            )
            .await
            .unwrap();

        let results = store.search(&[1.0, 0.0], 5, 0.5, None).await.unwrap();
        let ids: Vec<&str> = results.iter().map(|m| m.segment.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert!(results[0].score > results[1].score);
    }

    #[tokio::test]
    async fn test_search_respects_limit_and_domain() {
        let store = InMemorySegmentStore::new();
        store
            .replace_all(
                &[segment("a", "x"), segment("b", "y"), segment("c", "x")],
                &[vec![1.0], vec![1.0], vec![1.0]],
            )
            .await
            .unwrap();

        assert_eq!(store.search(&[1.0], 1, 0.0, None).await.unwrap().len(), 1);
        let scoped = store.search(&[1.0], 5, 0.0, Some("x")).await.unwrap();
        assert_eq!(scoped.len(), 2);
        assert!(scoped.iter().all(|m| m.segment.domain == "x"));
    }

    #[tokio::test]
    async fn test_replace_all_swaps_contents() {
        let store = InMemorySegmentStore::new();
        store
            .replace_all(&[segment("a", DEFAULT_DOMAIN)], &[vec![1.0]])
            .await
            .unwrap();
        store
            .replace_all(
                &[segment("b", DEFAULT_DOMAIN), segment("c", DEFAULT_DOMAIN)],
                &[vec![1.0], vec![1.0]],
            )
            .await
            .unwrap();
        assert_eq!(store.count().await.unwrap(), 2);
        assert_eq!(store.purge().await.unwrap(), 2);
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_mismatched_vectors_rejected() {
        let store = InMemorySegmentStore::new();
        let err = store
            .replace_all(&[segment("a", DEFAULT_DOMAIN)], &[])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("mismatch"));
    }

    #[tokio::test]
    async fn test_fingerprint_roundtrip() {
        let store = InMemorySegmentStore::new();
        assert!(store.stored_fingerprint().await.unwrap().is_none());
        store.save_fingerprint("abc").await.unwrap();
        assert_eq!(store.stored_fingerprint().await.unwrap().as_deref(), Some("abc"));
        store.clear_fingerprint().await.unwrap();
        assert!(store.stored_fingerprint().await.unwrap().is_none());
    }
}
