//! In-memory [`Store`] implementation for testing and embedding.
//!
//! Uses a `HashMap` keyed by `uri` behind `std::sync::RwLock`. Each entity
//! carries the sequence number of its first insertion so that "storage
//! order" is stable across replacements, like a table's row order.

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};

use crate::aggregate::{group_bucket_sizes, take_within_budget};
use crate::models::{DataEntity, DataEntityBucket, DataEntityBucketId, DataSource};

use super::{EvictionCandidate, SourceStats, Store, StoreStats};

struct StoredEntity {
    seq: u64,
    entity: DataEntity,
}

#[derive(Default)]
struct Inner {
    next_seq: u64,
    entities: HashMap<String, StoredEntity>,
}

/// In-memory store for tests and single-process use.
#[derive(Default)]
pub struct InMemoryStore {
    inner: RwLock<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.read()?.entities.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Look up an entity by `uri`.
    pub fn get(&self, uri: &str) -> Result<Option<DataEntity>> {
        Ok(self.read()?.entities.get(uri).map(|s| s.entity.clone()))
    }

    /// Snapshot of one cell's entities in insertion order.
    fn bucket_snapshot(&self, bucket_id: &DataEntityBucketId) -> Result<Vec<DataEntity>> {
        let inner = self.read()?;
        let mut matching: Vec<&StoredEntity> = inner
            .entities
            .values()
            .filter(|s| &s.entity.bucket_id() == bucket_id)
            .collect();
        matching.sort_by_key(|s| s.seq);
        Ok(matching.into_iter().map(|s| s.entity.clone()).collect())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>> {
        self.inner
            .read()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>> {
        self.inner
            .write()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn total_content_size(&self) -> Result<u64> {
        let inner = self.read()?;
        Ok(inner
            .entities
            .values()
            .map(|s| s.entity.content_size_bytes)
            .sum())
    }

    async fn upsert_entities(&self, entities: &[DataEntity]) -> Result<()> {
        let mut inner = self.write()?;
        for entity in entities {
            let existing = inner.entities.get(&entity.uri).map(|s| s.seq);
            let seq = match existing {
                Some(seq) => seq,
                None => {
                    inner.next_seq += 1;
                    inner.next_seq
                }
            };
            inner.entities.insert(
                entity.uri.clone(),
                StoredEntity {
                    seq,
                    entity: entity.clone(),
                },
            );
        }
        Ok(())
    }

    async fn oldest_entities(&self, limit: usize) -> Result<Vec<EvictionCandidate>> {
        let inner = self.read()?;
        let mut candidates: Vec<EvictionCandidate> = inner
            .entities
            .values()
            .map(|s| EvictionCandidate {
                uri: s.entity.uri.clone(),
                datetime: s.entity.datetime,
                content_size_bytes: s.entity.content_size_bytes,
            })
            .collect();
        candidates.sort_by(|a, b| a.datetime.cmp(&b.datetime).then_with(|| a.uri.cmp(&b.uri)));
        candidates.truncate(limit);
        Ok(candidates)
    }

    async fn delete_entities(&self, uris: &[String]) -> Result<u64> {
        let mut inner = self.write()?;
        let mut deleted = 0;
        for uri in uris {
            if inner.entities.remove(uri).is_some() {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    async fn bucket_sizes(&self, oldest_time_bucket_id: i64) -> Result<Vec<DataEntityBucket>> {
        let inner = self.read()?;
        Ok(group_bucket_sizes(
            inner.entities.values().map(|s| &s.entity),
            oldest_time_bucket_id,
        ))
    }

    fn list_entities_in_bucket<'a>(
        &'a self,
        bucket_id: &DataEntityBucketId,
        size_limit: u64,
    ) -> BoxStream<'a, Result<DataEntity>> {
        match self.bucket_snapshot(bucket_id) {
            Ok(entities) => take_within_budget(stream::iter(entities.into_iter().map(Ok)), size_limit),
            Err(err) => stream::once(async move { Err::<DataEntity, _>(err) }).boxed(),
        }
    }

    async fn stats(&self) -> Result<StoreStats> {
        let inner = self.read()?;
        let mut by_source: BTreeMap<DataSource, SourceStats> = BTreeMap::new();
        for s in inner.entities.values() {
            let e = &s.entity;
            let stats = by_source.entry(e.source).or_insert_with(|| SourceStats {
                source: e.source,
                entity_count: 0,
                total_bytes: 0,
                newest: None,
            });
            stats.entity_count += 1;
            stats.total_bytes += e.content_size_bytes;
            stats.newest = stats.newest.max(Some(e.datetime));
        }

        let mut by_source: Vec<SourceStats> = by_source.into_values().collect();
        by_source.sort_by(|a, b| b.entity_count.cmp(&a.entity_count));
        Ok(StoreStats {
            entity_count: inner.entities.len() as u64,
            total_bytes: by_source.iter().map(|s| s.total_bytes).sum(),
            by_source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DataLabel, TimeBucket};
    use chrono::{Duration, TimeZone, Utc};
    use futures::TryStreamExt;

    fn entity(uri: &str, minutes: i64, size: usize) -> DataEntity {
        let base = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        DataEntity::new(
            uri,
            base + Duration::minutes(minutes),
            DataSource::Reddit,
            DataLabel::new("rust").ok(),
            vec![b'x'; size],
        )
    }

    #[tokio::test]
    async fn test_upsert_replaces_by_uri() {
        let store = InMemoryStore::new();
        store.upsert_entities(&[entity("uri1", 0, 100)]).await.unwrap();
        store.upsert_entities(&[entity("uri1", 1, 50)]).await.unwrap();

        assert_eq!(store.len().unwrap(), 1);
        assert_eq!(store.total_content_size().await.unwrap(), 50);
        assert_eq!(store.get("uri1").unwrap().unwrap().content_size_bytes, 50);
    }

    #[tokio::test]
    async fn test_oldest_orders_by_datetime_then_uri() {
        let store = InMemoryStore::new();
        store
            .upsert_entities(&[entity("c", 5, 1), entity("b", 0, 1), entity("a", 0, 1)])
            .await
            .unwrap();
        let uris: Vec<String> = store
            .oldest_entities(10)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.uri)
            .collect();
        assert_eq!(uris, vec!["a", "b", "c"]);
        assert_eq!(store.oldest_entities(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_counts_only_existing() {
        let store = InMemoryStore::new();
        store.upsert_entities(&[entity("a", 0, 1)]).await.unwrap();
        let deleted = store
            .delete_entities(&["a".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(deleted, 1);
        assert!(store.is_empty().unwrap());
    }

    #[tokio::test]
    async fn test_list_in_bucket_storage_order_and_budget() {
        let store = InMemoryStore::new();
        store
            .upsert_entities(&[entity("first", 10, 40), entity("second", 0, 40), entity("third", 5, 40)])
            .await
            .unwrap();
        let bucket_id = entity("first", 0, 0).bucket_id();

        let all: Vec<DataEntity> = store
            .list_entities_in_bucket(&bucket_id, 1000)
            .try_collect()
            .await
            .unwrap();
        let uris: Vec<&str> = all.iter().map(|e| e.uri.as_str()).collect();
        assert_eq!(uris, vec!["first", "second", "third"]);

        let truncated: Vec<DataEntity> = store
            .list_entities_in_bucket(&bucket_id, 50)
            .try_collect()
            .await
            .unwrap();
        assert_eq!(truncated.len(), 2);
    }

    #[tokio::test]
    async fn test_list_in_bucket_label_must_match_exactly() {
        let store = InMemoryStore::new();
        let mut unlabelled = entity("plain", 0, 10);
        unlabelled.label = None;
        store
            .upsert_entities(&[unlabelled.clone(), entity("tagged", 0, 10)])
            .await
            .unwrap();

        let id = DataEntityBucketId::new(
            TimeBucket::from_datetime(unlabelled.datetime),
            DataSource::Reddit,
            None,
        );
        let listed: Vec<DataEntity> = store
            .list_entities_in_bucket(&id, 1000)
            .try_collect()
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].uri, "plain");
    }

    #[tokio::test]
    async fn test_stats_by_source() {
        let store = InMemoryStore::new();
        let mut x = entity("x1", 30, 7);
        x.source = DataSource::X;
        store
            .upsert_entities(&[entity("r1", 0, 10), entity("r2", 1, 20), x])
            .await
            .unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.entity_count, 3);
        assert_eq!(stats.total_bytes, 37);
        assert_eq!(stats.by_source[0].source, DataSource::Reddit);
        assert_eq!(stats.by_source[0].total_bytes, 30);
        assert_eq!(stats.by_source[1].entity_count, 1);
    }

    #[tokio::test]
    async fn test_poisoned_lock_surfaces_as_error() {
        let store = InMemoryStore::new();
        store.upsert_entities(&[entity("a", 0, 1)]).await.unwrap();
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = store.inner.write().unwrap();
            panic!("writer died holding the lock");
        }));

        assert!(store.len().is_err());
        assert!(store.is_empty().is_err());
        assert!(store.get("a").is_err());
        assert!(store.total_content_size().await.is_err());
        let listed: Result<Vec<DataEntity>> = store
            .list_entities_in_bucket(&entity("a", 0, 1).bucket_id(), 100)
            .try_collect()
            .await;
        assert!(listed.is_err());
    }
}
