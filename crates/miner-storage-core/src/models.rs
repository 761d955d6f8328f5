//! Core data models for the miner store.
//!
//! A [`DataEntity`] is one harvested content record. Entities are grouped
//! into aggregation cells identified by [`DataEntityBucketId`], a
//! `(time bucket, source, label)` triple, and summarized either as a flat
//! list of [`DataEntityBucket`]s or as a [`CompressedMinerIndex`].

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Maximum length of a normalized label, in characters.
pub const MAX_LABEL_LENGTH: usize = 140;

const SECONDS_PER_BUCKET: i64 = 60 * 60;

/// Platform a piece of content was harvested from.
///
/// Persisted and serialized as its integer discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "i64", try_from = "i64")]
pub enum DataSource {
    Reddit = 1,
    X = 2,
    Youtube = 3,
}

impl DataSource {
    pub fn as_i64(self) -> i64 {
        self as i64
    }

    pub fn name(self) -> &'static str {
        match self {
            DataSource::Reddit => "reddit",
            DataSource::X => "x",
            DataSource::Youtube => "youtube",
        }
    }
}

impl From<DataSource> for i64 {
    fn from(source: DataSource) -> Self {
        source.as_i64()
    }
}

impl TryFrom<i64> for DataSource {
    type Error = StorageError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(DataSource::Reddit),
            2 => Ok(DataSource::X),
            3 => Ok(DataSource::Youtube),
            other => Err(StorageError::UnknownSource(other)),
        }
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Normalized topic tag: trimmed, lowercased, never empty.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct DataLabel(String);

impl DataLabel {
    pub fn new(value: impl AsRef<str>) -> Result<Self, StorageError> {
        let normalized = value.as_ref().trim().to_lowercase();
        if normalized.is_empty() {
            return Err(StorageError::InvalidLabel("label must not be empty".to_string()));
        }
        if normalized.chars().count() > MAX_LABEL_LENGTH {
            return Err(StorageError::InvalidLabel(format!(
                "label '{}' is longer than {} characters",
                normalized, MAX_LABEL_LENGTH
            )));
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<DataLabel> for String {
    fn from(label: DataLabel) -> Self {
        label.0
    }
}

impl TryFrom<String> for DataLabel {
    type Error = StorageError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        DataLabel::new(value)
    }
}

impl fmt::Display for DataLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hour-granularity time partition.
///
/// `id` is the number of whole hours since the Unix epoch, so ids are
/// monotonic in time and two instants share an id exactly when they fall
/// in the same hour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeBucket {
    pub id: i64,
}

impl TimeBucket {
    pub fn new(id: i64) -> Self {
        Self { id }
    }

    pub fn from_datetime(datetime: DateTime<Utc>) -> Self {
        Self {
            id: datetime.timestamp().div_euclid(SECONDS_PER_BUCKET),
        }
    }

    /// The `[start, end)` window covered by this bucket.
    pub fn date_range(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        let start = self
            .id
            .checked_mul(SECONDS_PER_BUCKET)
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .unwrap_or_default();
        let end = start
            .checked_add_signed(Duration::seconds(SECONDS_PER_BUCKET))
            .unwrap_or(start);
        (start, end)
    }
}

/// One harvested content record, identified by `uri`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataEntity {
    pub uri: String,
    pub datetime: DateTime<Utc>,
    pub source: DataSource,
    pub label: Option<DataLabel>,
    pub content: Vec<u8>,
    pub content_size_bytes: u64,
}

impl DataEntity {
    pub fn new(
        uri: impl Into<String>,
        datetime: DateTime<Utc>,
        source: DataSource,
        label: Option<DataLabel>,
        content: Vec<u8>,
    ) -> Self {
        let content_size_bytes = content.len() as u64;
        Self {
            uri: uri.into(),
            datetime,
            source,
            label,
            content,
            content_size_bytes,
        }
    }

    /// Check the invariants required at the ingestion boundary.
    pub fn validate(&self) -> Result<(), StorageError> {
        if self.uri.trim().is_empty() {
            return Err(StorageError::malformed(&self.uri, "uri must not be empty"));
        }
        if self.content_size_bytes != self.content.len() as u64 {
            return Err(StorageError::malformed(
                &self.uri,
                format!(
                    "content_size_bytes is {} but content is {} bytes",
                    self.content_size_bytes,
                    self.content.len()
                ),
            ));
        }
        Ok(())
    }

    pub fn time_bucket(&self) -> TimeBucket {
        TimeBucket::from_datetime(self.datetime)
    }

    pub fn bucket_id(&self) -> DataEntityBucketId {
        DataEntityBucketId::from_entity(self)
    }
}

/// Aggregation cell key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DataEntityBucketId {
    pub time_bucket: TimeBucket,
    pub source: DataSource,
    pub label: Option<DataLabel>,
}

impl DataEntityBucketId {
    pub fn new(time_bucket: TimeBucket, source: DataSource, label: Option<DataLabel>) -> Self {
        Self {
            time_bucket,
            source,
            label,
        }
    }

    pub fn from_entity(entity: &DataEntity) -> Self {
        Self {
            time_bucket: entity.time_bucket(),
            source: entity.source,
            label: entity.label.clone(),
        }
    }
}

/// Size summary of one aggregation cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataEntityBucket {
    pub id: DataEntityBucketId,
    pub size_bytes: u64,
}

/// All time buckets reported for a single `(source, label)` pair.
///
/// `time_bucket_ids[i]` and `sizes_bytes[i]` describe the same cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressedEntityBucket {
    pub label: Option<DataLabel>,
    pub time_bucket_ids: Vec<i64>,
    pub sizes_bytes: Vec<u64>,
}

impl CompressedEntityBucket {
    pub fn new(label: Option<DataLabel>) -> Self {
        Self {
            label,
            time_bucket_ids: Vec::new(),
            sizes_bytes: Vec::new(),
        }
    }

    pub fn push(&mut self, time_bucket_id: i64, size_bytes: u64) {
        self.time_bucket_ids.push(time_bucket_id);
        self.sizes_bytes.push(size_bytes);
    }
}

/// Content-free summary of everything a miner is serving, grouped by source
/// then label.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressedMinerIndex {
    pub sources: BTreeMap<DataSource, Vec<CompressedEntityBucket>>,
}

impl CompressedMinerIndex {
    /// Number of aggregation cells represented.
    pub fn bucket_count(&self) -> usize {
        self.sources
            .values()
            .flat_map(|buckets| buckets.iter())
            .map(|b| b.time_bucket_ids.len())
            .sum()
    }

    /// Sum of all reported cell sizes.
    pub fn total_size_bytes(&self) -> u64 {
        self.sources
            .values()
            .flat_map(|buckets| buckets.iter())
            .flat_map(|b| b.sizes_bytes.iter())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
