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

/// Create every harness table. Safe to run repeatedly.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    // Indexed schema segments with their embedding vectors
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS segments (
            id TEXT PRIMARY KEY,
            kind TEXT NOT NULL,
            domain TEXT NOT NULL DEFAULT 'default',
            table_name TEXT,
            text TEXT NOT NULL,
            embedding BLOB NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Keyed values; holds the schema fingerprint
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS index_metadata (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Previously accepted question/SQL pairs, used as few-shot examples
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS saved_prompts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            domain_id TEXT,
            question TEXT NOT NULL,
            sql_generated TEXT,
            usage_count INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_segments_domain ON segments(domain)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_saved_prompts_usage ON saved_prompts(usage_count DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
