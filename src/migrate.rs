use anyhow::Result;
use sqlx::SqlitePool;

/// Create the schema if it does not exist yet. Safe to run on every start.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // datetime is unix microseconds; label NULL means "no label"
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS data_entities (
            uri TEXT PRIMARY KEY,
            datetime INTEGER NOT NULL,
            time_bucket_id INTEGER NOT NULL,
            source INTEGER NOT NULL,
            label TEXT,
            content BLOB NOT NULL,
            content_size_bytes INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_data_entities_bucket ON data_entities(time_bucket_id, source, label)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_data_entities_datetime ON data_entities(datetime ASC, uri ASC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
