//! Export every stored lead as JSON or CSV.
//!
//! Without `--output` the export goes to stdout for piping; the summary line
//! goes to stderr so it never mixes with the data.

use anyhow::{bail, Context, Result};
use std::path::Path;

use crate::config::Config;
use crate::leads;
use crate::models::Lead;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
}

impl ExportFormat {
    pub fn parse(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            other => bail!("Unknown export format: '{}'. Available: json, csv", other),
        }
    }
}

const CSV_HEADER: &[&str] = &[
    "id",
    "created_at",
    "first_name",
    "last_name",
    "phone",
    "email",
    "qualification",
    "note",
    "ocr_text",
    "enrichment",
    "offer",
    "email_draft",
    "image_sha256",
    "source_file",
];

/// Render leads as CSV with a header row. Fields containing separators,
/// quotes or newlines are quoted.
pub fn to_csv(leads: &[Lead]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(CSV_HEADER)?;
    for lead in leads {
        let id = lead.id.to_string();
        writer.write_record([
            id.as_str(),
            lead.created_at.as_str(),
            lead.first_name.as_str(),
            lead.last_name.as_str(),
            lead.phone.as_str(),
            lead.email.as_str(),
            lead.qualification.as_str(),
            lead.note.as_str(),
            lead.ocr_text.as_str(),
            lead.enrichment.as_str(),
            lead.offer.as_str(),
            lead.email_draft.as_str(),
            lead.image_sha256.as_deref().unwrap_or(""),
            lead.source_file.as_deref().unwrap_or(""),
        ])?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("Failed to flush CSV: {}", e))?;
    Ok(String::from_utf8(bytes)?)
}

pub fn to_json(leads: &[Lead]) -> Result<String> {
    Ok(serde_json::to_string_pretty(leads)?)
}

pub async fn run_export(config: &Config, format: ExportFormat, output: Option<&Path>) -> Result<()> {
    let pool = leads::open(config).await?;
    let all = leads::list_leads(&pool, None).await?;
    pool.close().await;

    let rendered = match format {
        ExportFormat::Json => to_json(&all)?,
        ExportFormat::Csv => to_csv(&all)?,
    };

    match output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            std::fs::write(path, &rendered)
                .with_context(|| format!("Failed to write export: {}", path.display()))?;
            eprintln!("Exported {} leads to {}", all.len(), path.display());
        }
        None => {
            print!("{}", rendered);
            if format == ExportFormat::Json {
                println!();
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lead() -> Lead {
        Lead {
            id: 7,
            ocr_text: "Jean DUPONT\nACME".to_string(),
            last_name: "DUPONT".to_string(),
            first_name: "Jean".to_string(),
            phone: "+33 1 23 45 67 89".to_string(),
            email: "jean@acme.test".to_string(),
            enrichment: String::new(),
            offer: "Plan \"Pro\", yearly".to_string(),
            email_draft: String::new(),
            qualification: "Hot".to_string(),
            note: String::new(),
            created_at: "2025-03-01 10:00:00".to_string(),
            image_sha256: None,
            source_file: None,
        }
    }

    #[test]
    fn csv_quotes_commas_quotes_and_newlines() {
        let out = to_csv(&[lead()]).unwrap();
        let mut lines = out.lines();
        assert!(lines.next().unwrap().starts_with("id,created_at,first_name"));
        assert!(out.contains("\"Jean DUPONT\nACME\""));
        assert!(out.contains("\"Plan \"\"Pro\"\", yearly\""));
        assert!(out.contains("7,2025-03-01 10:00:00,Jean,DUPONT,"));
    }

    #[test]
    fn csv_of_nothing_is_just_the_header() {
        let out = to_csv(&[]).unwrap();
        assert_eq!(out.lines().count(), 1);
    }

    #[test]
    fn format_parsing() {
        assert_eq!(ExportFormat::parse("CSV").unwrap(), ExportFormat::Csv);
        assert!(ExportFormat::parse("xml").is_err());
    }
}
