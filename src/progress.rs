//! Pipeline progress reporting.
//!
//! Reports which stage each card is in during `card scan` and `card scan-dir`.
//! Progress is emitted on **stderr** so stdout remains parseable for scripts.

use std::io::Write;

/// Stage of the card pipeline.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Stage {
    Ocr,
    Fields,
    Enrichment,
    Offer,
    Email,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Ocr => "ocr",
            Stage::Fields => "fields",
            Stage::Enrichment => "enrichment",
            Stage::Offer => "offer",
            Stage::Email => "email",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Stage::Ocr => "extracting text",
            Stage::Fields => "parsing contact fields",
            Stage::Enrichment => "researching contact",
            Stage::Offer => "matching offer",
            Stage::Email => "drafting email",
        }
    }
}

/// A single progress event.
#[derive(Clone, Debug)]
pub enum ProgressEvent {
    /// `card` is entering `stage`. `n`/`total` position it within a batch.
    Stage {
        card: String,
        stage: Stage,
        n: u64,
        total: u64,
    },
    /// All stages finished for `card`.
    Done { card: String, n: u64, total: u64 },
}

/// Reports pipeline progress. Implementations write to stderr (human or JSON).
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// Human-friendly progress: "[2/5] card-02.jpg  researching contact...".
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: ProgressEvent) {
        let line = match &event {
            ProgressEvent::Stage {
                card,
                stage,
                n,
                total,
            } => format!("[{}/{}] {}  {}...\n", n, total, card, stage.label()),
            ProgressEvent::Done { card, n, total } => {
                format!("[{}/{}] {}  done\n", n, total, card)
            }
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: ProgressEvent) {
        let obj = match &event {
            ProgressEvent::Stage {
                card,
                stage,
                n,
                total,
            } => serde_json::json!({
                "event": "progress",
                "card": card,
                "stage": stage.as_str(),
                "n": n,
                "total": total
            }),
            ProgressEvent::Done { card, n, total } => serde_json::json!({
                "event": "done",
                "card": card,
                "n": n,
                "total": total
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    /// Parse the `--progress` flag value.
    pub fn parse(value: &str) -> Result<Self, String> {
        match value {
            "auto" => Ok(Self::default_for_tty()),
            "human" => Ok(ProgressMode::Human),
            "json" => Ok(ProgressMode::Json),
            "off" => Ok(ProgressMode::Off),
            other => Err(format!(
                "invalid progress mode '{}': expected auto, human, json, or off",
                other
            )),
        }
    }

    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
