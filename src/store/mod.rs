//! Storage abstraction for the schema segment index.
//!
//! The [`SegmentStore`] trait covers everything the retrieval service needs:
//! wholesale replacement of the indexed segments, similarity search, and the
//! persisted schema fingerprint used to decide whether re-indexing is due.
//!
//! Two backends:
//! - [`sqlite::SqliteSegmentStore`]: the harness database, used by the CLI and server.
//! - [`memory::InMemorySegmentStore`]: `RwLock`-guarded vectors, used by tests.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{SchemaSegment, SegmentMatch};

pub use memory::InMemorySegmentStore;
pub use sqlite::SqliteSegmentStore;

/// Abstract segment index.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`replace_all`](SegmentStore::replace_all) | Swap the whole index for new segments |
/// | [`purge`](SegmentStore::purge) | Remove every segment |
/// | [`search`](SegmentStore::search) | Relevance search over stored vectors |
/// | [`count`](SegmentStore::count) | Number of stored segments |
/// | [`stored_fingerprint`](SegmentStore::stored_fingerprint) | Fingerprint of the indexed content |
/// | [`save_fingerprint`](SegmentStore::save_fingerprint) | Record the fingerprint after a re-index |
/// | [`clear_fingerprint`](SegmentStore::clear_fingerprint) | Drop the fingerprint record |
#[async_trait]
pub trait SegmentStore: Send + Sync {
    /// Remove all segments and store `segments` with their `vectors`
    /// (index-aligned). Readers never observe a mix of old and new segments.
    async fn replace_all(&self, segments: &[SchemaSegment], vectors: &[Vec<f32>]) -> Result<()>;

    /// Remove every segment. Returns the number removed.
    async fn purge(&self) -> Result<u64>;

    /// Return up to `limit` segments scoring at least `min_score`, best first.
    ///
    /// Scores are relevance values in `[0, 1]`
    /// (see [`relevance_score`](crate::embedding::relevance_score)). When
    /// `domain` is set, only segments tagged with exactly that domain match.
    async fn search(
        &self,
        query_vec: &[f32],
        limit: usize,
        min_score: f64,
        domain: Option<&str>,
    ) -> Result<Vec<SegmentMatch>>;

    async fn count(&self) -> Result<u64>;

    async fn stored_fingerprint(&self) -> Result<Option<String>>;

    async fn save_fingerprint(&self, fingerprint: &str) -> Result<()>;

    /// Forget the stored fingerprint so the next staleness check re-indexes.
    async fn clear_fingerprint(&self) -> Result<()>;
}

/// Sort matches best-first and keep the top `limit`.
pub(crate) fn rank(mut matches: Vec<SegmentMatch>, limit: usize) -> Vec<SegmentMatch> {
    matches.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    matches.truncate(limit);
    matches
}
