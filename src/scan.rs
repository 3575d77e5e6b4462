//! `card scan`, `card scan-dir` and `card ocr`.
//!
//! Scanning runs the [`Pipeline`] on one image and stores the result as a
//! lead. An image whose SHA-256 already belongs to a stored lead is not
//! processed again unless forced.

use anyhow::{bail, Result};
use sqlx::SqlitePool;
use std::path::Path;

use crate::config::Config;
use crate::image::{collect_images, CardImage};
use crate::leads;
use crate::models::Lead;
use crate::pipeline::{BatchPosition, CardInput, Pipeline};
use crate::progress::ProgressReporter;

/// Options shared by `scan` and `scan-dir`.
#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    pub qualification: Option<String>,
    pub note: Option<String>,
    pub skip_agents: bool,
    pub force: bool,
}

/// Result of scanning one card.
#[derive(Debug)]
pub enum ScanOutcome {
    Stored(Lead),
    /// The image was scanned before; the existing lead is returned untouched.
    Duplicate(Lead),
}

/// Validate an optional qualification against `[leads].qualifications`.
/// No qualification is stored as an empty string.
pub fn resolve_qualification(config: &Config, input: Option<&str>) -> Result<String> {
    match input.map(str::trim) {
        None | Some("") => Ok(String::new()),
        Some(q) => config.leads.resolve_qualification(q),
    }
}

/// Process one card and persist it.
pub async fn scan_card(
    pool: &SqlitePool,
    pipeline: &Pipeline,
    input: CardInput,
    force: bool,
    reporter: &dyn ProgressReporter,
    position: BatchPosition,
) -> Result<ScanOutcome> {
    if !force {
        if let Some(existing) = leads::find_by_image(pool, &input.image.sha256()).await? {
            tracing::info!(card = %input.image.file_name, id = existing.id, "duplicate image");
            return Ok(ScanOutcome::Duplicate(existing));
        }
    }

    let processed = pipeline.process_at(input, reporter, position).await?;
    let id = leads::insert_lead(pool, &processed.into_new_lead()).await?;
    match leads::get_lead(pool, id).await? {
        Some(lead) => Ok(ScanOutcome::Stored(lead)),
        None => bail!("lead {} vanished after insert", id),
    }
}

fn card_input(config: &Config, path: &Path, options: &ScanOptions) -> Result<CardInput> {
    Ok(CardInput {
        image: CardImage::from_path(path)?,
        qualification: resolve_qualification(config, options.qualification.as_deref())?,
        note: options.note.clone().unwrap_or_default(),
        source_file: Some(path.display().to_string()),
    })
}

pub async fn run_scan(
    config: &Config,
    path: &Path,
    options: &ScanOptions,
    reporter: &dyn ProgressReporter,
) -> Result<()> {
    let input = card_input(config, path, options)?;
    let pipeline = Pipeline::from_config(config)?.skip_agents(options.skip_agents);
    let pool = leads::open(config).await?;

    let outcome = scan_card(
        &pool,
        &pipeline,
        input,
        options.force,
        reporter,
        BatchPosition::SINGLE,
    )
    .await;
    pool.close().await;

    match outcome? {
        ScanOutcome::Stored(lead) => {
            leads::print_lead(&lead);
            Ok(())
        }
        ScanOutcome::Duplicate(lead) => bail!(
            "{} was already scanned as lead {} (use --force to scan again)",
            path.display(),
            lead.id
        ),
    }
}

pub async fn run_scan_dir(
    config: &Config,
    dir: &Path,
    recursive: bool,
    options: &ScanOptions,
    reporter: &dyn ProgressReporter,
) -> Result<()> {
    // Fail before touching the network on a bad qualification.
    resolve_qualification(config, options.qualification.as_deref())?;

    let images = collect_images(dir, recursive)?;
    if images.is_empty() {
        println!("No images found in {}", dir.display());
        return Ok(());
    }

    let pipeline = Pipeline::from_config(config)?.skip_agents(options.skip_agents);
    let pool = leads::open(config).await?;
    let total = images.len() as u64;

    let mut stored = 0usize;
    let mut duplicates = 0usize;
    let mut failed = 0usize;

    for (i, path) in images.iter().enumerate() {
        let position = BatchPosition {
            n: i as u64 + 1,
            total,
        };
        let result = match card_input(config, path, options) {
            Ok(input) => {
                scan_card(&pool, &pipeline, input, options.force, reporter, position).await
            }
            Err(e) => Err(e),
        };
        match result {
            Ok(ScanOutcome::Stored(lead)) => {
                stored += 1;
                println!("  {}  lead {}  {}", path.display(), lead.id, lead.display_name());
            }
            Ok(ScanOutcome::Duplicate(lead)) => {
                duplicates += 1;
                println!("  {}  skipped (already lead {})", path.display(), lead.id);
            }
            Err(e) => {
                failed += 1;
                tracing::warn!(card = %path.display(), error = %e, "card failed");
                eprintln!("  {}  failed: {:#}", path.display(), e);
            }
        }
    }
    pool.close().await;

    println!("scan-dir {}", dir.display());
    println!("  images: {}", total);
    println!("  stored: {}", stored);
    println!("  skipped: {}", duplicates);
    println!("  failed: {}", failed);

    if failed > 0 {
        bail!("{} of {} cards failed", failed, total);
    }
    println!("ok");
    Ok(())
}

pub async fn run_ocr(config: &Config, path: &Path) -> Result<()> {
    let image = CardImage::from_path(path)?;
    let pipeline = Pipeline::from_config(config)?;
    let text = pipeline.extract_text(&image).await?;
    println!("{}", text);
    Ok(())
}
