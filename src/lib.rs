//! # Miner Storage
//!
//! **A bounded-capacity content store for harvested data entities.**
//!
//! Harvesters hand batches of [`DataEntity`] records to
//! [`MinerStorage::store`]; the store keeps the total content size under a
//! configured ceiling by evicting the oldest entities first, and serves
//! size-only summaries of its holdings to index consumers without ever
//! sending raw content.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────────────────┐   ┌──────────────┐
//! │ Harvester  │──▶│ store()              │──▶│   SQLite     │
//! │ (external) │   │ ledger → evict →     │   │ data_entities│
//! └────────────┘   │ upsert (locked)      │   └──────┬───────┘
//!                  └──────────────────────┘          │
//!                        ┌───────────────────────────┤
//!                        ▼                           ▼
//!                 ┌──────────────┐          ┌──────────────────┐
//!                 │ list_buckets │          │ list_entities    │
//!                 │ compressed   │          │ (size-bounded)   │
//!                 │ index        │          └──────────────────┘
//!                 └──────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`db`] | SQLite connection pool with WAL mode |
//! | [`migrate`] | Idempotent schema creation |
//! | [`sqlite_store`] | SQLite implementation of the [`store::Store`] trait |
//! | [`storage`] | Opens a configured [`MinerStorage`] over SQLite |
//!
//! Backend-agnostic logic (entity model, ledger, eviction, aggregation,
//! index compression, in-memory store) lives in `miner-storage-core` and is
//! re-exported here.
//!
//! ## Configuration
//!
//! ```toml
//! [db]
//! path = "data/miner.sqlite"
//!
//! [storage]
//! max_database_size_gb_hint = 250
//! retention_days = 30
//! bucket_count_limit = 200000
//! per_bucket_size_limit = 134217728
//! ```

pub mod config;
pub mod db;
pub mod migrate;
pub mod sqlite_store;
pub mod storage;

pub use miner_storage_core::{
    aggregate, engine, error, eviction, index, ledger, models, store, CompressedEntityBucket,
    CompressedMinerIndex, DataEntity, DataEntityBucket, DataEntityBucketId, DataLabel, DataSource,
    IngestReport, MinerStorage, StorageError, StorageLimits, TimeBucket,
};
pub use sqlite_store::SqliteStore;
pub use storage::{open, SqliteMinerStorage};
