//! Opening a ready-to-use SQLite-backed [`MinerStorage`].

use anyhow::Result;
use tracing::info;

use miner_storage_core::MinerStorage;

use crate::config::Config;
use crate::db;
use crate::migrate;
use crate::sqlite_store::SqliteStore;

/// The engine over the SQLite backend.
pub type SqliteMinerStorage = MinerStorage<SqliteStore>;

/// Connect to the configured database, apply migrations, and build the engine.
pub async fn open(config: &Config) -> Result<SqliteMinerStorage> {
    let limits = config.storage.limits();
    limits.validate()?;

    let pool = db::connect(config).await?;
    migrate::run_migrations(&pool).await?;

    info!(
        path = %config.db.path.display(),
        capacity_bytes = limits.capacity_bytes,
        retention_days = limits.retention_days,
        "miner storage opened"
    );
    Ok(MinerStorage::new(SqliteStore::new(pool), limits))
}
