//! Oldest-first eviction.
//!
//! Victims are chosen by creation time (`datetime`), not access time: the
//! store has no read-driven recency signal. The scan works page by page so
//! a large store is never loaded at once; each page's victims are deleted
//! in one bulk call before the next page is read.

use anyhow::{bail, Result};
use tracing::{debug, info};

use crate::store::Store;

/// Maximum candidates fetched per scan page.
pub const EVICTION_PAGE_SIZE: usize = 500;

/// Outcome of one eviction run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvictionReport {
    pub entities: u64,
    pub bytes: u64,
}

/// Delete the oldest entities until at least `target_bytes` have been freed
/// or the store is empty.
///
/// Any backend error aborts the run; entities already deleted stay deleted.
pub async fn evict_oldest<S: Store + ?Sized>(store: &S, target_bytes: u64) -> Result<EvictionReport> {
    debug!(target_bytes, "store full, clearing oldest content");
    let mut report = EvictionReport::default();

    while report.bytes < target_bytes {
        let page = store.oldest_entities(EVICTION_PAGE_SIZE).await?;
        if page.is_empty() {
            break;
        }

        let mut victims = Vec::new();
        let mut page_bytes = 0u64;
        let mut evicted_through = None;
        for candidate in page {
            if report.bytes.saturating_add(page_bytes) >= target_bytes {
                break;
            }
            page_bytes = page_bytes.saturating_add(candidate.content_size_bytes);
            evicted_through = Some(candidate.datetime);
            victims.push(candidate.uri);
        }

        let deleted = store.delete_entities(&victims).await?;
        if deleted == 0 {
            bail!(
                "eviction made no progress: {} candidates could not be deleted",
                victims.len()
            );
        }
        report.entities += deleted;
        report.bytes = report.bytes.saturating_add(page_bytes);
        debug!(
            deleted,
            freed = report.bytes,
            target_bytes,
            evicted_through = ?evicted_through,
            "eviction page done"
        );
    }

    info!(
        entities = report.entities,
        bytes = report.bytes,
        target_bytes,
        "evicted oldest content"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DataEntity, DataSource};
    use crate::store::memory::InMemoryStore;
    use chrono::{Duration, TimeZone, Utc};

    fn entity(uri: &str, minutes: i64, size: usize) -> DataEntity {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        DataEntity::new(
            uri,
            base + Duration::minutes(minutes),
            DataSource::Reddit,
            None,
            vec![0; size],
        )
    }

    #[tokio::test]
    async fn test_evicts_oldest_until_target() {
        let store = InMemoryStore::new();
        store
            .upsert_entities(&[
                entity("newest", 30, 100),
                entity("oldest", 0, 100),
                entity("middle", 10, 100),
            ])
            .await
            .unwrap();

        let report = evict_oldest(&store, 150).await.unwrap();
        assert_eq!(report, EvictionReport { entities: 2, bytes: 200 });
        assert!(store.get("oldest").unwrap().is_none());
        assert!(store.get("middle").unwrap().is_none());
        assert!(store.get("newest").unwrap().is_some());
    }

    #[tokio::test]
    async fn test_exact_target_stops_at_boundary() {
        let store = InMemoryStore::new();
        store
            .upsert_entities(&[entity("a", 0, 50), entity("b", 1, 50), entity("c", 2, 50)])
            .await
            .unwrap();

        let report = evict_oldest(&store, 100).await.unwrap();
        assert_eq!(report.entities, 2);
        assert!(store.get("c").unwrap().is_some());
    }

    #[tokio::test]
    async fn test_empties_store_when_target_too_large() {
        let store = InMemoryStore::new();
        store
            .upsert_entities(&[entity("a", 0, 10), entity("b", 1, 10)])
            .await
            .unwrap();

        let report = evict_oldest(&store, 1_000).await.unwrap();
        assert_eq!(report, EvictionReport { entities: 2, bytes: 20 });
        assert!(store.is_empty().unwrap());
    }

    #[tokio::test]
    async fn test_spans_multiple_pages() {
        let store = InMemoryStore::new();
        let batch: Vec<DataEntity> = (0..(EVICTION_PAGE_SIZE as i64 + 20))
            .map(|i| entity(&format!("uri{:05}", i), i, 1))
            .collect();
        store.upsert_entities(&batch).await.unwrap();

        let target = EVICTION_PAGE_SIZE as u64 + 10;
        let report = evict_oldest(&store, target).await.unwrap();
        assert_eq!(report.bytes, target);
        assert_eq!(store.len().unwrap(), 10);
        assert!(store.get(&format!("uri{:05}", EVICTION_PAGE_SIZE + 19)).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_zero_target_is_noop() {
        let store = InMemoryStore::new();
        store.upsert_entities(&[entity("a", 0, 10)]).await.unwrap();
        let report = evict_oldest(&store, 0).await.unwrap();
        assert_eq!(report, EvictionReport::default());
        assert_eq!(store.len().unwrap(), 1);
    }
}
