//! Storage abstraction for the miner store.
//!
//! The [`Store`] trait is the persistence seam: it exposes the primitive
//! reads and writes the engine needs (size ledger, bulk upsert, oldest-first
//! scan, bulk delete, grouped sizes, bucket listing) and nothing more.
//! Capacity policy, eviction and ranking live in the engine so every backend
//! gets the same semantics.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::Serialize;

use crate::models::{DataEntity, DataEntityBucket, DataEntityBucketId, DataSource};

/// Identity, age and size of a stored entity, used to pick eviction victims
/// without loading content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvictionCandidate {
    pub uri: String,
    pub datetime: DateTime<Utc>,
    pub content_size_bytes: u64,
}

/// Per-source breakdown of stored content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceStats {
    pub source: DataSource,
    pub entity_count: u64,
    pub total_bytes: u64,
    pub newest: Option<DateTime<Utc>>,
}

/// Snapshot of what the store currently holds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub entity_count: u64,
    pub total_bytes: u64,
    pub by_source: Vec<SourceStats>,
}

/// Abstract storage backend.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`total_content_size`](Store::total_content_size) | Sum of `content_size_bytes` over live entities |
/// | [`upsert_entities`](Store::upsert_entities) | Insert or replace entities by `uri`, as one bulk write |
/// | [`oldest_entities`](Store::oldest_entities) | Oldest entities first, ordered by `(datetime, uri)` |
/// | [`delete_entities`](Store::delete_entities) | Bulk delete by `uri` |
/// | [`bucket_sizes`](Store::bucket_sizes) | Uncapped per-cell size sums within retention |
/// | [`list_entities_in_bucket`](Store::list_entities_in_bucket) | Lazy, size-bounded listing of one cell |
/// | [`stats`](Store::stats) | Counts and sizes per source |
#[async_trait]
pub trait Store: Send + Sync {
    async fn total_content_size(&self) -> Result<u64>;

    /// Insert or replace every entity keyed by `uri`. When the same `uri`
    /// appears twice in `entities`, the later one wins.
    async fn upsert_entities(&self, entities: &[DataEntity]) -> Result<()>;

    /// Up to `limit` entities, ascending by `datetime` with `uri` as tiebreak.
    async fn oldest_entities(&self, limit: usize) -> Result<Vec<EvictionCandidate>>;

    /// Delete the given entities, returning how many were removed.
    async fn delete_entities(&self, uris: &[String]) -> Result<u64>;

    /// Raw size sum per cell over entities with `time_bucket_id >= oldest_time_bucket_id`.
    async fn bucket_sizes(&self, oldest_time_bucket_id: i64) -> Result<Vec<DataEntityBucket>>;

    /// Entities in one cell in storage order, stopping once the running
    /// size total meets or exceeds `size_limit` (see
    /// [`take_within_budget`](crate::aggregate::take_within_budget)).
    ///
    /// The stream is lazy and each call starts a fresh scan.
    fn list_entities_in_bucket<'a>(
        &'a self,
        bucket_id: &DataEntityBucketId,
        size_limit: u64,
    ) -> BoxStream<'a, Result<DataEntity>>;

    async fn stats(&self) -> Result<StoreStats>;
}
