//! Lead store operations and the `card leads ...` commands.
//!
//! Store functions take a [`SqlitePool`] and are shared by the CLI, the
//! HTTP server and the pipeline. The `run_*` functions are CLI entry points
//! that open the configured database and print to stdout.

use anyhow::{bail, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;
use crate::migrate;
use crate::models::{Lead, NewLead};

const SELECT_LEAD: &str = "SELECT id, ocr_text, last_name, first_name, phone, email, \
     enrichment, offer, email_draft, qualification, note, created_at, image_sha256, source_file \
     FROM leads";

fn text(row: &SqliteRow, column: &str) -> String {
    row.get::<Option<String>, _>(column).unwrap_or_default()
}

fn lead_from_row(row: &SqliteRow) -> Lead {
    Lead {
        id: row.get("id"),
        ocr_text: text(row, "ocr_text"),
        last_name: text(row, "last_name"),
        first_name: text(row, "first_name"),
        phone: text(row, "phone"),
        email: text(row, "email"),
        enrichment: text(row, "enrichment"),
        offer: text(row, "offer"),
        email_draft: text(row, "email_draft"),
        qualification: text(row, "qualification"),
        note: text(row, "note"),
        created_at: text(row, "created_at"),
        image_sha256: row.get("image_sha256"),
        source_file: row.get("source_file"),
    }
}

fn now_timestamp() -> String {
    chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Open the configured database and make sure the schema is current.
pub async fn open(config: &Config) -> Result<SqlitePool> {
    let pool = db::connect(config).await?;
    migrate::migrate(&pool).await?;
    Ok(pool)
}

pub async fn insert_lead(pool: &SqlitePool, lead: &NewLead) -> Result<i64> {
    let result = sqlx::query(
        "INSERT INTO leads (ocr_text, last_name, first_name, phone, email, enrichment, offer, \
         email_draft, qualification, note, created_at, image_sha256, source_file) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&lead.ocr_text)
    .bind(&lead.fields.last_name)
    .bind(&lead.fields.first_name)
    .bind(&lead.fields.phone)
    .bind(&lead.fields.email)
    .bind(&lead.enrichment)
    .bind(&lead.offer)
    .bind(&lead.email_draft)
    .bind(&lead.qualification)
    .bind(&lead.note)
    .bind(now_timestamp())
    .bind(&lead.image_sha256)
    .bind(&lead.source_file)
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Newest first.
pub async fn list_leads(pool: &SqlitePool, limit: Option<i64>) -> Result<Vec<Lead>> {
    let rows = sqlx::query(&format!(
        "{} ORDER BY created_at DESC, id DESC LIMIT ?",
        SELECT_LEAD
    ))
    .bind(limit.unwrap_or(-1))
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(lead_from_row).collect())
}

pub async fn get_lead(pool: &SqlitePool, id: i64) -> Result<Option<Lead>> {
    let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_LEAD))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row.as_ref().map(lead_from_row))
}

/// Most recent lead created from an identical image, if any.
pub async fn find_by_image(pool: &SqlitePool, sha256: &str) -> Result<Option<Lead>> {
    let row = sqlx::query(&format!(
        "{} WHERE image_sha256 = ? ORDER BY id DESC LIMIT 1",
        SELECT_LEAD
    ))
    .bind(sha256)
    .fetch_optional(pool)
    .await?;
    Ok(row.as_ref().map(lead_from_row))
}

/// Returns `false` when no lead had that id.
pub async fn delete_lead(pool: &SqlitePool, id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM leads WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Delete every lead. Returns the number of rows removed.
pub async fn reset(pool: &SqlitePool) -> Result<u64> {
    let result = sqlx::query("DELETE FROM leads").execute(pool).await?;
    Ok(result.rows_affected())
}

pub async fn insert_sample(pool: &SqlitePool) -> Result<i64> {
    insert_lead(pool, &NewLead::sample()).await
}

// ============ CLI ============

pub async fn run_list(config: &Config, limit: Option<i64>, json: bool) -> Result<()> {
    let pool = open(config).await?;
    let leads = list_leads(&pool, Some(limit.unwrap_or(config.leads.list_limit))).await?;
    pool.close().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&leads)?);
        return Ok(());
    }

    if leads.is_empty() {
        println!("No leads recorded yet.");
        return Ok(());
    }

    println!(
        "{:>5}  {:<19}  {:<24}  {:<28}  {:<16}  {}",
        "ID", "CREATED", "NAME", "EMAIL", "PHONE", "QUALIFICATION"
    );
    println!("{}", "-".repeat(112));
    for lead in &leads {
        println!(
            "{:>5}  {:<19}  {:<24}  {:<28}  {:<16}  {}",
            lead.id,
            lead.created_at,
            truncate(&lead.display_name(), 24),
            truncate(&lead.email, 28),
            truncate(&lead.phone, 16),
            lead.qualification
        );
    }
    Ok(())
}

pub async fn run_show(config: &Config, id: i64) -> Result<()> {
    let pool = open(config).await?;
    let lead = get_lead(&pool, id).await?;
    pool.close().await;

    let Some(lead) = lead else {
        bail!("lead not found: {}", id);
    };
    print_lead(&lead);
    Ok(())
}

pub fn print_lead(lead: &Lead) {
    println!("--- Lead {} ---", lead.id);
    println!("name:          {}", lead.display_name());
    println!("email:         {}", lead.email);
    println!("phone:         {}", lead.phone);
    println!("qualification: {}", lead.qualification);
    println!("note:          {}", lead.note);
    println!("created_at:    {}", lead.created_at);
    if let Some(ref file) = lead.source_file {
        println!("source_file:   {}", file);
    }
    println!();
    println!("--- OCR text ---");
    println!("{}", lead.ocr_text);
    println!();
    println!("--- Enrichment ---");
    println!("{}", lead.enrichment);
    println!();
    println!("--- Offer ---");
    println!("{}", lead.offer);
    println!();
    println!("--- Email draft ---");
    println!("{}", lead.email_draft);
}

pub async fn run_delete(config: &Config, id: i64) -> Result<()> {
    let pool = open(config).await?;
    let deleted = delete_lead(&pool, id).await?;
    pool.close().await;
    if !deleted {
        bail!("lead not found: {}", id);
    }
    println!("Deleted lead {}.", id);
    Ok(())
}

pub async fn run_add_sample(config: &Config) -> Result<()> {
    let pool = open(config).await?;
    let id = insert_sample(&pool).await?;
    pool.close().await;
    println!("Sample lead added (id {}).", id);
    Ok(())
}

pub async fn run_reset(config: &Config, confirmed: bool) -> Result<()> {
    if !confirmed {
        bail!("refusing to delete all leads without --yes");
    }
    let pool = open(config).await?;
    let removed = reset(&pool).await?;
    pool.close().await;
    println!("Lead store reset ({} leads deleted).", removed);
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::ContactFields;
    use tempfile::TempDir;

    async fn test_pool(tmp: &TempDir) -> SqlitePool {
        let pool = db::connect_path(&tmp.path().join("leads.sqlite")).await.unwrap();
        migrate::migrate(&pool).await.unwrap();
        pool
    }

    fn lead(first: &str, sha: Option<&str>) -> NewLead {
        NewLead {
            ocr_text: format!("{} card", first),
            fields: ContactFields {
                first_name: first.to_string(),
                last_name: "Test".to_string(),
                phone: String::new(),
                email: format!("{}@example.com", first.to_lowercase()),
            },
            qualification: "Warm".to_string(),
            image_sha256: sha.map(str::to_string),
            ..NewLead::default()
        }
    }

    #[tokio::test]
    async fn insert_then_get_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let pool = test_pool(&tmp).await;

        let id = insert_lead(&pool, &lead("Ana", None)).await.unwrap();
        let stored = get_lead(&pool, id).await.unwrap().unwrap();
        assert_eq!(stored.first_name, "Ana");
        assert_eq!(stored.email, "ana@example.com");
        assert_eq!(stored.qualification, "Warm");
        assert_eq!(stored.created_at.len(), 19);
        assert!(get_lead(&pool, id + 100).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_is_newest_first_and_limited() {
        let tmp = TempDir::new().unwrap();
        let pool = test_pool(&tmp).await;
        for name in ["A", "B", "C"] {
            insert_lead(&pool, &lead(name, None)).await.unwrap();
        }

        let all = list_leads(&pool, None).await.unwrap();
        let names: Vec<_> = all.iter().map(|l| l.first_name.as_str()).collect();
        assert_eq!(names, vec!["C", "B", "A"]);

        let limited = list_leads(&pool, Some(2)).await.unwrap();
        assert_eq!(limited.len(), 2);
    }

    #[tokio::test]
    async fn find_by_image_matches_digest() {
        let tmp = TempDir::new().unwrap();
        let pool = test_pool(&tmp).await;
        insert_lead(&pool, &lead("A", Some("abc"))).await.unwrap();

        assert!(find_by_image(&pool, "abc").await.unwrap().is_some());
        assert!(find_by_image(&pool, "def").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_and_reset() {
        let tmp = TempDir::new().unwrap();
        let pool = test_pool(&tmp).await;
        let id = insert_sample(&pool).await.unwrap();
        insert_sample(&pool).await.unwrap();

        assert!(delete_lead(&pool, id).await.unwrap());
        assert!(!delete_lead(&pool, id).await.unwrap());
        assert_eq!(reset(&pool).await.unwrap(), 1);
        assert!(list_leads(&pool, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rows_with_null_columns_read_as_empty() {
        let tmp = TempDir::new().unwrap();
        let pool = test_pool(&tmp).await;
        sqlx::query("INSERT INTO leads (email) VALUES ('x@y.z')")
            .execute(&pool)
            .await
            .unwrap();
        let leads = list_leads(&pool, None).await.unwrap();
        assert_eq!(leads[0].email, "x@y.z");
        assert_eq!(leads[0].note, "");
        assert_eq!(leads[0].display_name(), "(unnamed)");
    }

    #[test]
    fn truncate_adds_ellipsis() {
        assert_eq!(truncate("abcdef", 4), "abc…");
        assert_eq!(truncate("abc", 4), "abc");
    }
}
