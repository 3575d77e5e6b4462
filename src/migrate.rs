//! Auto-migrating schema for the `leads` table.
//!
//! The table is created with only its primary key; every other column is
//! added when missing. Databases written by older versions gain new columns
//! on the next run, and running the migration twice is a no-op.

use anyhow::Result;
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;

/// Column name and SQL type, in display order.
pub const LEAD_COLUMNS: &[(&str, &str)] = &[
    ("ocr_text", "TEXT"),
    ("last_name", "TEXT"),
    ("first_name", "TEXT"),
    ("phone", "TEXT"),
    ("email", "TEXT"),
    ("enrichment", "TEXT"),
    ("offer", "TEXT"),
    ("email_draft", "TEXT"),
    ("qualification", "TEXT"),
    ("note", "TEXT"),
    // SQLite rejects CURRENT_TIMESTAMP defaults in ALTER TABLE; the value is written on insert.
    ("created_at", "TEXT"),
    ("image_sha256", "TEXT"),
    ("source_file", "TEXT"),
];

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let added = migrate(&pool).await?;
    if !added.is_empty() {
        tracing::info!(columns = %added.join(", "), "added lead columns");
    }
    pool.close().await;
    Ok(())
}

/// Bring `leads` up to date. Returns the names of the columns that were added.
pub async fn migrate(pool: &SqlitePool) -> Result<Vec<String>> {
    sqlx::query("CREATE TABLE IF NOT EXISTS leads (id INTEGER PRIMARY KEY AUTOINCREMENT)")
        .execute(pool)
        .await?;

    let existing: Vec<String> = sqlx::query("PRAGMA table_info(leads)")
        .fetch_all(pool)
        .await?
        .iter()
        .map(|row| row.get::<String, _>("name"))
        .collect();

    let mut added = Vec::new();
    for (name, sql_type) in LEAD_COLUMNS {
        if existing.iter().any(|c| c == name) {
            continue;
        }
        sqlx::query(&format!("ALTER TABLE leads ADD COLUMN {} {}", name, sql_type))
            .execute(pool)
            .await?;
        added.push(name.to_string());
    }

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_leads_image_sha256 ON leads(image_sha256)")
        .execute(pool)
        .await?;

    Ok(added)
}
