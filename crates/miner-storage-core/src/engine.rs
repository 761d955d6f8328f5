//! The storage engine: capacity-enforced ingestion plus the read-only
//! bucket, index and listing operations.
//!
//! [`MinerStorage`] owns its backend and the clearing-space lock. Build it
//! once and share it (`&MinerStorage` or `Arc<MinerStorage>`) between the
//! ingestion path and the index-serving paths.
//!
//! # Concurrency
//!
//! [`store`](MinerStorage::store) holds the lock across the
//! check-capacity, evict, upsert sequence so two writers can never both
//! decide eviction is unnecessary and jointly overflow capacity. Reads take
//! no lock and may observe a write in progress.

use anyhow::Context;
use chrono::Utc;
use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::aggregate::{oldest_admissible_bucket, rank_buckets};
use crate::error::{Result, StorageError};
use crate::eviction::{evict_oldest, EvictionReport};
use crate::index::compress;
use crate::ledger::{batch_size, check_batch, gb_to_bytes, plan_capacity, CapacityPlan};
use crate::models::{CompressedMinerIndex, DataEntity, DataEntityBucket, DataEntityBucketId};
use crate::store::{Store, StoreStats};

/// Buckets older than this many days are left out of indexes.
pub const DEFAULT_RETENTION_DAYS: u32 = 30;
/// Maximum cells reported in one index.
pub const DEFAULT_BUCKET_COUNT_LIMIT: usize = 200_000;
/// Largest size reported for, or listed from, a single cell (128 MiB).
pub const DEFAULT_PER_BUCKET_SIZE_LIMIT: u64 = 128 * 1024 * 1024;
/// Default total content budget, in GB.
pub const DEFAULT_CAPACITY_GB: u64 = 250;

/// Limits the engine enforces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageLimits {
    pub capacity_bytes: u64,
    pub retention_days: u32,
    pub bucket_count_limit: usize,
    pub per_bucket_size_limit: u64,
}

impl Default for StorageLimits {
    fn default() -> Self {
        Self {
            capacity_bytes: gb_to_bytes(DEFAULT_CAPACITY_GB),
            retention_days: DEFAULT_RETENTION_DAYS,
            bucket_count_limit: DEFAULT_BUCKET_COUNT_LIMIT,
            per_bucket_size_limit: DEFAULT_PER_BUCKET_SIZE_LIMIT,
        }
    }
}

impl StorageLimits {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.capacity_bytes == 0 {
            anyhow::bail!("storage capacity must be > 0 bytes");
        }
        if self.retention_days == 0 {
            anyhow::bail!("storage.retention_days must be >= 1");
        }
        if self.bucket_count_limit == 0 {
            anyhow::bail!("storage.bucket_count_limit must be >= 1");
        }
        if self.per_bucket_size_limit == 0 {
            anyhow::bail!("storage.per_bucket_size_limit must be >= 1");
        }
        Ok(())
    }
}

/// What a successful [`MinerStorage::store`] call did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub entities_stored: usize,
    pub bytes_added: u64,
    pub evicted: EvictionReport,
}

/// Bounded-capacity entity store over a pluggable [`Store`] backend.
pub struct MinerStorage<S> {
    backend: S,
    limits: StorageLimits,
    clearing_space_lock: Mutex<()>,
}

fn unavailable(err: anyhow::Error) -> StorageError {
    StorageError::BackingStoreUnavailable(err)
}

impl<S: Store> MinerStorage<S> {
    pub fn new(backend: S, limits: StorageLimits) -> Self {
        Self {
            backend,
            limits,
            clearing_space_lock: Mutex::new(()),
        }
    }

    pub fn backend(&self) -> &S {
        &self.backend
    }

    pub fn limits(&self) -> &StorageLimits {
        &self.limits
    }

    /// Store a batch of entities, evicting the oldest content first if the
    /// batch would not otherwise fit.
    ///
    /// The batch is validated as a whole: one malformed entity rejects the
    /// batch before anything is written. Entities are upserted by `uri`.
    pub async fn store(&self, entities: &[DataEntity]) -> Result<IngestReport> {
        if let Err(err) = entities.iter().try_for_each(DataEntity::validate) {
            warn!(error = %err, batch = entities.len(), "rejecting batch");
            return Err(err);
        }

        let added_size = batch_size(entities);
        if let Err(err) = check_batch(added_size, self.limits.capacity_bytes) {
            warn!(error = %err, "rejecting batch");
            return Err(err);
        }
        if entities.is_empty() {
            return Ok(IngestReport::default());
        }

        let _guard = self.clearing_space_lock.lock().await;

        let current_size = self
            .backend
            .total_content_size()
            .await
            .context("failed to read stored content size")
            .map_err(unavailable)?;

        let evicted = match plan_capacity(current_size, added_size, self.limits.capacity_bytes) {
            CapacityPlan::Proceed => EvictionReport::default(),
            CapacityPlan::Evict { target_bytes } => evict_oldest(&self.backend, target_bytes)
                .await
                .context("eviction failed")
                .map_err(unavailable)?,
        };

        self.backend
            .upsert_entities(entities)
            .await
            .context("failed to upsert entities")
            .map_err(unavailable)?;

        debug!(
            entities = entities.len(),
            bytes = added_size,
            evicted = evicted.entities,
            "stored batch"
        );
        Ok(IngestReport {
            entities_stored: entities.len(),
            bytes_added: added_size,
            evicted,
        })
    }

    /// Cells within retention, largest first, bounded by the configured
    /// count limit, each capped at the per-bucket size limit.
    pub async fn list_buckets(&self) -> Result<Vec<DataEntityBucket>> {
        self.list_buckets_with_limit(self.limits.bucket_count_limit)
            .await
    }

    /// Like [`list_buckets`](Self::list_buckets) with a caller-chosen count limit.
    pub async fn list_buckets_with_limit(
        &self,
        bucket_count_limit: usize,
    ) -> Result<Vec<DataEntityBucket>> {
        let oldest = oldest_admissible_bucket(Utc::now(), self.limits.retention_days);
        let cells = self
            .backend
            .bucket_sizes(oldest)
            .await
            .context("failed to aggregate buckets")
            .map_err(unavailable)?;
        Ok(rank_buckets(
            cells,
            bucket_count_limit,
            self.limits.per_bucket_size_limit,
        ))
    }

    /// The ranked buckets reshaped by source and label.
    pub async fn get_compressed_index(&self) -> Result<CompressedMinerIndex> {
        self.get_compressed_index_with_limit(self.limits.bucket_count_limit)
            .await
    }

    pub async fn get_compressed_index_with_limit(
        &self,
        bucket_count_limit: usize,
    ) -> Result<CompressedMinerIndex> {
        let buckets = self.list_buckets_with_limit(bucket_count_limit).await?;
        let index = compress(&buckets);
        debug!(
            buckets = index.bucket_count(),
            size_bytes = index.total_size_bytes(),
            "built compressed index"
        );
        Ok(index)
    }

    /// Entities in one cell as a lazy stream, truncated once the per-bucket
    /// size limit is reached. A short result may therefore be incomplete.
    /// Each call restarts the scan.
    pub fn list_entities<'a>(
        &'a self,
        bucket_id: &DataEntityBucketId,
    ) -> BoxStream<'a, Result<DataEntity>> {
        self.backend
            .list_entities_in_bucket(bucket_id, self.limits.per_bucket_size_limit)
            .map_err(|err| unavailable(err.context("failed to list bucket entities")))
            .boxed()
    }

    pub async fn stats(&self) -> Result<StoreStats> {
        self.backend
            .stats()
            .await
            .context("failed to read store stats")
            .map_err(unavailable)
    }
}
