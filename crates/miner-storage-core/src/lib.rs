//! # Miner Storage Core
//!
//! Backend-agnostic logic for a bounded-capacity content store: the entity
//! model, capacity ledger, oldest-first eviction, bucket aggregation, the
//! compressed index, and the [`store::Store`] abstraction.
//!
//! This crate contains no SQL or filesystem I/O. The [`engine::MinerStorage`]
//! type ties the pieces together around any [`store::Store`] backend.

pub mod aggregate;
pub mod engine;
pub mod error;
pub mod eviction;
pub mod index;
pub mod ledger;
pub mod models;
pub mod store;

pub use engine::{IngestReport, MinerStorage, StorageLimits};
pub use error::StorageError;
pub use models::{
    CompressedEntityBucket, CompressedMinerIndex, DataEntity, DataEntityBucket,
    DataEntityBucketId, DataLabel, DataSource, TimeBucket,
};
