use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create the schema on an open pool. Idempotent.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tracked_files (
            content_identity TEXT PRIMARY KEY,
            current_location TEXT NOT NULL,
            original_location TEXT NOT NULL,
            content_kind TEXT NOT NULL,
            size_bytes INTEGER NOT NULL,
            admitted_at INTEGER NOT NULL,
            last_confirmed_at INTEGER NOT NULL,
            is_valid INTEGER NOT NULL DEFAULT 1
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_tracked_files_location ON tracked_files(current_location)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_tracked_files_valid ON tracked_files(is_valid)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_tracked_files_admitted_at ON tracked_files(admitted_at DESC)",
    )
    .execute(pool)
    .await?;

    // One location holds one content among valid records.
    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_tracked_files_valid_location
        ON tracked_files(current_location) WHERE is_valid = 1
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
