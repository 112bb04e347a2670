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

/// Create every table and index if missing. Idempotent.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    // Repository catalog, one row per upstream id
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS repositories (
            external_id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            url TEXT NOT NULL,
            homepage TEXT NOT NULL DEFAULT '',
            description TEXT NOT NULL DEFAULT '',
            topics_json TEXT NOT NULL DEFAULT '[]',
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Visit events, append-only
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS visits (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT NOT NULL UNIQUE,
            ip_address TEXT NOT NULL,
            origin TEXT NOT NULL,
            user_agent TEXT NOT NULL,
            referrer TEXT NOT NULL,
            unique_visitor_token TEXT NOT NULL,
            country TEXT NOT NULL DEFAULT '',
            region TEXT NOT NULL DEFAULT '',
            city TEXT NOT NULL DEFAULT '',
            postal_code TEXT NOT NULL DEFAULT '',
            latitude REAL NOT NULL DEFAULT 0,
            longitude REAL NOT NULL DEFAULT 0,
            isp TEXT NOT NULL DEFAULT '',
            organization TEXT NOT NULL DEFAULT '',
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_visits_token_created ON visits(unique_visitor_token, created_at DESC)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_visits_origin_created ON visits(origin, created_at DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
