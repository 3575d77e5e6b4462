//! # Card Intake CLI (`card`)
//!
//! ## Usage
//!
//! ```bash
//! card --config ./config/card.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `card init` | Create the SQLite database and run schema migrations |
//! | `card scan <image>` | Process one card and store the lead |
//! | `card scan-dir <dir>` | Process every image in a directory |
//! | `card ocr <image>` | Print the OCR text of an image |
//! | `card parse [file]` | Parse contact fields from text |
//! | `card leads ...` | Browse, export and manage stored leads |
//! | `card stats` | Lead counts by qualification |
//! | `card serve` | Start the HTTP API |
//! | `card completions <shell>` | Print a shell completion script |
//!
//! ## Examples
//!
//! ```bash
//! export MISTRAL_API_KEY=...
//! card init
//! card scan ./cards/jane.jpg --qualification "Smart Talk" --note "wants a demo in May"
//! card leads list --limit 10
//! card leads export --format csv --output leads.csv
//! ```

use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use card_intake::config::{self, Config};
use card_intake::export::{self, ExportFormat};
use card_intake::progress::ProgressMode;
use card_intake::scan::{self, ScanOptions};
use card_intake::{fields, leads, migrate, server, stats};

/// Card Intake: business-card OCR, lead enrichment and follow-up drafting.
///
/// Most commands read a TOML configuration file given by `--config`.
/// See `config/card.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "card",
    about = "Card Intake: business-card OCR, lead enrichment and follow-up drafting",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/card.toml")]
    config: PathBuf,

    /// Log pipeline stages at info level (RUST_LOG overrides).
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Progress output on stderr: auto, human, json, or off.
    #[arg(long, global = true, default_value = "auto", value_parser = ProgressMode::parse)]
    progress: ProgressMode,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args, Debug, Clone)]
struct ScanArgs {
    /// Lead qualification (one of `[leads].qualifications`, case-insensitive).
    #[arg(long, short)]
    qualification: Option<String>,

    /// Free-form notes from the meeting.
    #[arg(long, short)]
    note: Option<String>,

    /// Stop after OCR and field parsing.
    #[arg(long)]
    skip_agents: bool,

    /// Process images that were already scanned.
    #[arg(long)]
    force: bool,
}

impl From<ScanArgs> for ScanOptions {
    fn from(args: ScanArgs) -> Self {
        ScanOptions {
            qualification: args.qualification,
            note: args.note,
            skip_agents: args.skip_agents,
            force: args.force,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and the leads table, adding any
    /// missing columns. Running it multiple times is safe.
    Init,

    /// Process one business card and store it as a lead.
    Scan {
        /// Image file (JPEG, PNG, WebP, ...).
        image: PathBuf,

        #[command(flatten)]
        args: ScanArgs,
    },

    /// Process every image in a directory, one after another.
    ScanDir {
        dir: PathBuf,

        /// Descend into subdirectories.
        #[arg(long, short)]
        recursive: bool,

        #[command(flatten)]
        args: ScanArgs,
    },

    /// Print the normalized OCR text of an image.
    Ocr { image: PathBuf },

    /// Parse contact fields from a text file (or stdin) and print JSON.
    Parse { file: Option<PathBuf> },

    /// Browse and manage stored leads.
    Leads {
        #[command(subcommand)]
        action: LeadsAction,
    },

    /// Show lead totals by qualification.
    Stats,

    /// Start the HTTP API on `[server].bind`.
    Serve,

    /// Print a shell completion script.
    Completions { shell: clap_complete::Shell },
}

#[derive(Subcommand)]
enum LeadsAction {
    /// List leads, newest first.
    List {
        /// Maximum number of leads (defaults to `[leads].list_limit`).
        #[arg(long)]
        limit: Option<i64>,

        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
    /// Show every field of one lead.
    Show { id: i64 },
    /// Delete one lead.
    Delete { id: i64 },
    /// Insert a placeholder lead (John Doe).
    AddSample,
    /// Delete every lead.
    Reset {
        /// Confirm the deletion.
        #[arg(long)]
        yes: bool,
    },
    /// Export all leads.
    Export {
        /// `json` or `csv`.
        #[arg(long, default_value = "json")]
        format: String,

        /// Write to this file instead of stdout.
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // Commands that don't require config
    match &cli.command {
        Commands::Parse { file } => {
            fields::run_parse(file.as_deref())?;
            return Ok(());
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(*shell, &mut cmd, "card", &mut std::io::stdout());
            return Ok(());
        }
        _ => {}
    }

    let cfg: Config = config::load_config(&cli.config)?;
    let reporter = cli.progress.reporter();

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Scan { image, args } => {
            scan::run_scan(&cfg, &image, &args.into(), reporter.as_ref()).await?;
        }
        Commands::ScanDir {
            dir,
            recursive,
            args,
        } => {
            scan::run_scan_dir(&cfg, &dir, recursive, &args.into(), reporter.as_ref()).await?;
        }
        Commands::Ocr { image } => {
            scan::run_ocr(&cfg, &image).await?;
        }
        Commands::Leads { action } => match action {
            LeadsAction::List { limit, json } => {
                leads::run_list(&cfg, limit, json).await?;
            }
            LeadsAction::Show { id } => {
                leads::run_show(&cfg, id).await?;
            }
            LeadsAction::Delete { id } => {
                leads::run_delete(&cfg, id).await?;
            }
            LeadsAction::AddSample => {
                leads::run_add_sample(&cfg).await?;
            }
            LeadsAction::Reset { yes } => {
                leads::run_reset(&cfg, yes).await?;
            }
            LeadsAction::Export { format, output } => {
                let format = ExportFormat::parse(&format)?;
                export::run_export(&cfg, format, output.as_deref()).await?;
            }
        },
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Parse { .. } | Commands::Completions { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
    }

    Ok(())
}
