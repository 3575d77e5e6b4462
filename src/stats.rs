//! Lead store statistics.
//!
//! `card stats` prints the total number of leads, how many went through the
//! agent stages, and a per-qualification breakdown.

use anyhow::Result;
use serde::Serialize;
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::leads;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct QualificationCount {
    pub qualification: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LeadStats {
    pub total: i64,
    /// Leads with a stored email draft.
    pub drafted: i64,
    pub latest: Option<String>,
    pub by_qualification: Vec<QualificationCount>,
}

pub async fn lead_stats(pool: &SqlitePool) -> Result<LeadStats> {
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM leads")
        .fetch_one(pool)
        .await?;

    let drafted: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM leads WHERE email_draft IS NOT NULL AND email_draft != ''",
    )
    .fetch_one(pool)
    .await?;

    let latest: Option<String> = sqlx::query_scalar("SELECT MAX(created_at) FROM leads")
        .fetch_one(pool)
        .await?;

    let rows = sqlx::query(
        r#"
        SELECT COALESCE(qualification, '') AS qualification, COUNT(*) AS count
        FROM leads
        GROUP BY COALESCE(qualification, '')
        ORDER BY count DESC, qualification ASC
        "#,
    )
    .fetch_all(pool)
    .await?;

    let by_qualification = rows
        .iter()
        .map(|row| QualificationCount {
            qualification: row.get("qualification"),
            count: row.get("count"),
        })
        .collect();

    Ok(LeadStats {
        total,
        drafted,
        latest,
        by_qualification,
    })
}

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = leads::open(config).await?;
    let stats = lead_stats(&pool).await?;
    pool.close().await;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Card Intake: Lead Stats");
    println!("=======================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    println!("  Leads:       {}", stats.total);
    println!("  Drafted:     {}", stats.drafted);
    println!(
        "  Latest:      {}",
        stats.latest.as_deref().unwrap_or("never")
    );

    if !stats.by_qualification.is_empty() {
        println!();
        println!("  By qualification:");
        println!("  {:<24} {:>6}", "QUALIFICATION", "LEADS");
        println!("  {}", "-".repeat(31));
        for q in &stats.by_qualification {
            let label = if q.qualification.is_empty() {
                "(none)"
            } else {
                q.qualification.as_str()
            };
            println!("  {:<24} {:>6}", label, q.count);
        }
    }
    println!();
    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::migrate;
    use crate::models::NewLead;
    use tempfile::TempDir;

    #[tokio::test]
    async fn counts_by_qualification() {
        let tmp = TempDir::new().unwrap();
        let pool = db::connect_path(&tmp.path().join("leads.sqlite")).await.unwrap();
        migrate::migrate(&pool).await.unwrap();

        for q in ["Hot", "Hot", "Cold", ""] {
            let lead = NewLead {
                qualification: q.to_string(),
                email_draft: if q == "Hot" { "Hi".to_string() } else { String::new() },
                ..NewLead::default()
            };
            leads::insert_lead(&pool, &lead).await.unwrap();
        }

        let stats = lead_stats(&pool).await.unwrap();
        assert_eq!(stats.total, 4);
        assert_eq!(stats.drafted, 2);
        assert!(stats.latest.is_some());
        assert_eq!(
            stats.by_qualification[0],
            QualificationCount {
                qualification: "Hot".to_string(),
                count: 2
            }
        );
        assert_eq!(stats.by_qualification.len(), 3);
    }

    #[tokio::test]
    async fn empty_store() {
        let tmp = TempDir::new().unwrap();
        let pool = db::connect_path(&tmp.path().join("leads.sqlite")).await.unwrap();
        migrate::migrate(&pool).await.unwrap();

        let stats = lead_stats(&pool).await.unwrap();
        assert_eq!(stats.total, 0);
        assert!(stats.latest.is_none());
        assert!(stats.by_qualification.is_empty());
    }

    #[test]
    fn bytes_are_humanized() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
    }
}
