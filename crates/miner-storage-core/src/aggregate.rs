//! Bucket aggregation: grouping entities into cells, ranking, truncating
//! and capping the reported sizes.
//!
//! SQL backends do the grouping in the database; [`group_bucket_sizes`] is
//! the equivalent for backends that hold entities in memory. Ranking is
//! shared by both through [`rank_buckets`].

use std::collections::HashMap;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use futures::future;
use futures::stream::{BoxStream, Stream, StreamExt, TryStreamExt};

use crate::models::{DataEntity, DataEntityBucket, DataEntityBucketId, TimeBucket};

/// Id of the oldest time bucket still inside the retention window.
pub fn oldest_admissible_bucket(now: DateTime<Utc>, retention_days: u32) -> i64 {
    TimeBucket::from_datetime(now - Duration::days(i64::from(retention_days))).id
}

/// Sum `content_size_bytes` per cell for entities at or after `oldest_time_bucket_id`.
///
/// Sizes are the raw sums; capping happens in [`rank_buckets`].
pub fn group_bucket_sizes<'a, I>(entities: I, oldest_time_bucket_id: i64) -> Vec<DataEntityBucket>
where
    I: IntoIterator<Item = &'a DataEntity>,
{
    let mut sizes: HashMap<DataEntityBucketId, u64> = HashMap::new();
    for entity in entities {
        if entity.time_bucket().id < oldest_time_bucket_id {
            continue;
        }
        let size = sizes.entry(entity.bucket_id()).or_insert(0);
        *size = size.saturating_add(entity.content_size_bytes);
    }
    sizes
        .into_iter()
        .map(|(id, size_bytes)| DataEntityBucket { id, size_bytes })
        .collect()
}

/// Largest cells first, at most `count_limit` of them, each capped at `size_limit`.
///
/// Ties on size are broken by cell id so the output is deterministic.
pub fn rank_buckets(
    mut cells: Vec<DataEntityBucket>,
    count_limit: usize,
    size_limit: u64,
) -> Vec<DataEntityBucket> {
    cells.sort_by(|a, b| b.size_bytes.cmp(&a.size_bytes).then_with(|| a.id.cmp(&b.id)));
    cells.truncate(count_limit);
    for cell in &mut cells {
        cell.size_bytes = cell.size_bytes.min(size_limit);
    }
    cells
}

/// Running size counter for bucket content listings.
///
/// An entity is admitted while the running total is still below the limit;
/// once the total meets or exceeds it, nothing more is admitted. The entity
/// that crosses the limit is still returned, so a listing may exceed the
/// limit by at most one entity.
#[derive(Debug, Clone)]
pub struct SizeBudget {
    limit: u64,
    used: u64,
}

impl SizeBudget {
    pub fn new(limit: u64) -> Self {
        Self { limit, used: 0 }
    }

    pub fn is_spent(&self) -> bool {
        self.used >= self.limit
    }

    /// Charge `size` bytes. Returns `false` (without charging) if the budget
    /// was already spent.
    pub fn admit(&mut self, size: u64) -> bool {
        if self.is_spent() {
            return false;
        }
        self.used = self.used.saturating_add(size);
        true
    }

    pub fn used(&self) -> u64 {
        self.used
    }
}

/// Bound a listing stream by a [`SizeBudget`] of `size_limit` bytes.
///
/// Once the budget is spent the inner stream is no longer polled, so a
/// backend that streams rows stops reading as soon as the listing is full.
pub fn take_within_budget<'a, S>(entities: S, size_limit: u64) -> BoxStream<'a, Result<DataEntity>>
where
    S: Stream<Item = Result<DataEntity>> + Send + 'a,
{
    let mut budget = SizeBudget::new(size_limit);
    entities
        .try_take_while(move |entity| {
            future::ready(Ok::<_, anyhow::Error>(budget.admit(entity.content_size_bytes)))
        })
        .boxed()
}
