//! SQLite-backed [`Store`] implementation.
//!
//! Entities live in a single `data_entities` table keyed by `uri` (see
//! [`migrate`](crate::migrate)). Grouping and ordering are pushed down to
//! SQL; the engine applies ranking and capping on top.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future;
use futures::stream::{BoxStream, TryStreamExt};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use miner_storage_core::aggregate::take_within_budget;
use miner_storage_core::models::{
    DataEntity, DataEntityBucket, DataEntityBucketId, DataLabel, DataSource, TimeBucket,
};
use miner_storage_core::store::{EvictionCandidate, SourceStats, Store, StoreStats};

/// Upper bound on `?` placeholders in one `DELETE ... IN (...)`.
const DELETE_BATCH: usize = 500;

/// SQLite implementation of the [`Store`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn to_u64(value: i64) -> u64 {
    value.max(0) as u64
}

fn to_i64(value: u64) -> Result<i64> {
    i64::try_from(value).with_context(|| format!("size {} does not fit in an INTEGER column", value))
}

fn from_micros(micros: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros)
        .with_context(|| format!("stored datetime {} is out of range", micros))
}

fn decode_label(label: Option<String>) -> Result<Option<DataLabel>> {
    Ok(label.map(DataLabel::new).transpose()?)
}

fn decode_entity(row: &SqliteRow) -> Result<DataEntity> {
    let content: Vec<u8> = row.get("content");
    Ok(DataEntity {
        uri: row.get("uri"),
        datetime: from_micros(row.get("datetime"))?,
        source: DataSource::try_from(row.get::<i64, _>("source"))?,
        label: decode_label(row.get("label"))?,
        content_size_bytes: to_u64(row.get("content_size_bytes")),
        content,
    })
}

#[async_trait]
impl Store for SqliteStore {
    async fn total_content_size(&self) -> Result<u64> {
        let total: i64 =
            sqlx::query_scalar("SELECT COALESCE(SUM(content_size_bytes), 0) FROM data_entities")
                .fetch_one(&self.pool)
                .await?;
        Ok(to_u64(total))
    }

    async fn upsert_entities(&self, entities: &[DataEntity]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for entity in entities {
            sqlx::query(
                r#"
                INSERT INTO data_entities (uri, datetime, time_bucket_id, source, label,
                                           content, content_size_bytes)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(uri) DO UPDATE SET
                    datetime = excluded.datetime,
                    time_bucket_id = excluded.time_bucket_id,
                    source = excluded.source,
                    label = excluded.label,
                    content = excluded.content,
                    content_size_bytes = excluded.content_size_bytes
                "#,
            )
            .bind(&entity.uri)
            .bind(entity.datetime.timestamp_micros())
            .bind(entity.time_bucket().id)
            .bind(entity.source.as_i64())
            .bind(entity.label.as_ref().map(|l| l.as_str()))
            .bind(&entity.content)
            .bind(to_i64(entity.content_size_bytes)?)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn oldest_entities(&self, limit: usize) -> Result<Vec<EvictionCandidate>> {
        let rows = sqlx::query(
            r#"
            SELECT uri, datetime, content_size_bytes
            FROM data_entities
            ORDER BY datetime ASC, uri ASC
            LIMIT ?
            "#,
        )
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<EvictionCandidate> {
                Ok(EvictionCandidate {
                    uri: row.get("uri"),
                    datetime: from_micros(row.get("datetime"))?,
                    content_size_bytes: to_u64(row.get("content_size_bytes")),
                })
            })
            .collect()
    }

    async fn delete_entities(&self, uris: &[String]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut deleted = 0u64;

        for batch in uris.chunks(DELETE_BATCH) {
            let placeholders = vec!["?"; batch.len()].join(", ");
            let sql = format!("DELETE FROM data_entities WHERE uri IN ({})", placeholders);
            let mut query = sqlx::query(&sql);
            for uri in batch {
                query = query.bind(uri);
            }
            deleted += query.execute(&mut *tx).await?.rows_affected();
        }

        tx.commit().await?;
        Ok(deleted)
    }

    async fn bucket_sizes(&self, oldest_time_bucket_id: i64) -> Result<Vec<DataEntityBucket>> {
        let rows = sqlx::query(
            r#"
            SELECT time_bucket_id, source, label, SUM(content_size_bytes) AS bucket_size
            FROM data_entities
            WHERE time_bucket_id >= ?
            GROUP BY time_bucket_id, source, label
            "#,
        )
        .bind(oldest_time_bucket_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<DataEntityBucket> {
                Ok(DataEntityBucket {
                    id: DataEntityBucketId::new(
                        TimeBucket::new(row.get("time_bucket_id")),
                        DataSource::try_from(row.get::<i64, _>("source"))?,
                        decode_label(row.get("label"))?,
                    ),
                    size_bytes: to_u64(row.get("bucket_size")),
                })
            })
            .collect()
    }

    fn list_entities_in_bucket<'a>(
        &'a self,
        bucket_id: &DataEntityBucketId,
        size_limit: u64,
    ) -> BoxStream<'a, Result<DataEntity>> {
        // `IS` so that a NULL label only matches unlabelled rows
        let rows = sqlx::query(
            r#"
            SELECT uri, datetime, source, label, content, content_size_bytes
            FROM data_entities
            WHERE time_bucket_id = ? AND source = ? AND label IS ?
            ORDER BY rowid
            "#,
        )
        .bind(bucket_id.time_bucket.id)
        .bind(bucket_id.source.as_i64())
        .bind(bucket_id.label.as_ref().map(|l| l.as_str().to_owned()))
        .fetch(&self.pool)
        .map_err(anyhow::Error::from)
        .and_then(|row| future::ready(decode_entity(&row)));

        take_within_budget(rows, size_limit)
    }

    async fn stats(&self) -> Result<StoreStats> {
        let rows = sqlx::query(
            r#"
            SELECT source,
                   COUNT(*) AS entity_count,
                   COALESCE(SUM(content_size_bytes), 0) AS total_bytes,
                   MAX(datetime) AS newest
            FROM data_entities
            GROUP BY source
            ORDER BY entity_count DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut by_source = Vec::with_capacity(rows.len());
        for row in &rows {
            let newest: Option<i64> = row.get("newest");
            by_source.push(SourceStats {
                source: DataSource::try_from(row.get::<i64, _>("source"))?,
                entity_count: to_u64(row.get("entity_count")),
                total_bytes: to_u64(row.get("total_bytes")),
                newest: newest.map(from_micros).transpose()?,
            });
        }

        Ok(StoreStats {
            entity_count: by_source.iter().map(|s| s.entity_count).sum(),
            total_bytes: by_source.iter().map(|s| s.total_bytes).sum(),
            by_source,
        })
    }
}
