//! TOML configuration.
//!
//! Every section except `[db]` is optional and falls back to defaults.
//! API keys never live in the file: `[mistral].api_key_env` and
//! `[search].api_key_env` name the environment variables that hold them.
//!
//! ```toml
//! [db]
//! path = "./data/leads.sqlite"
//!
//! [mistral]
//! chat_model = "mistral-small-latest"
//!
//! [search]
//! provider = "duckduckgo"
//!
//! [sender]
//! name = "Alex Martin"
//! company = "Northwind Consulting"
//!
//! [[offers]]
//! name = "Data audit"
//! description = "Two-week review of a client's data stack"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub mistral: MistralConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub sender: SenderConfig,
    #[serde(default)]
    pub offers: Vec<OfferConfig>,
    #[serde(default)]
    pub leads: LeadsConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MistralConfig {
    #[serde(default = "default_mistral_base_url")]
    pub base_url: String,
    #[serde(default = "default_mistral_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_chat_model")]
    pub chat_model: String,
    #[serde(default = "default_ocr_model")]
    pub ocr_model: String,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for MistralConfig {
    fn default() -> Self {
        Self {
            base_url: default_mistral_base_url(),
            api_key_env: default_mistral_key_env(),
            chat_model: default_chat_model(),
            ocr_model: default_ocr_model(),
            temperature: None,
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_mistral_base_url() -> String {
    "https://api.mistral.ai".to_string()
}
fn default_mistral_key_env() -> String {
    "MISTRAL_API_KEY".to_string()
}
fn default_chat_model() -> String {
    "mistral-small-latest".to_string()
}
fn default_ocr_model() -> String {
    "mistral-ocr-latest".to_string()
}
fn default_max_retries() -> u32 {
    3
}
fn default_retry_base_delay_ms() -> u64 {
    1000
}
fn default_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_search_provider")]
    pub provider: String,
    /// Overrides the provider's public endpoint (used by tests and proxies).
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_search_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: u32,
    #[serde(default = "default_search_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            provider: default_search_provider(),
            base_url: None,
            api_key_env: default_search_key_env(),
            max_results: default_max_results(),
            max_tool_rounds: default_max_tool_rounds(),
            timeout_secs: default_search_timeout_secs(),
        }
    }
}

impl SearchConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_search_provider() -> String {
    "duckduckgo".to_string()
}
fn default_search_key_env() -> String {
    "BRAVE_API_KEY".to_string()
}
fn default_max_results() -> usize {
    5
}
fn default_max_tool_rounds() -> u32 {
    1
}
fn default_search_timeout_secs() -> u64 {
    20
}

/// Who the follow-up email is sent from.
#[derive(Debug, Deserialize, Clone)]
pub struct SenderConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub company: String,
    #[serde(default)]
    pub signature: Option<String>,
    #[serde(default = "default_language")]
    pub language: String,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            company: String::new(),
            signature: None,
            language: default_language(),
        }
    }
}

fn default_language() -> String {
    "English".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct OfferConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LeadsConfig {
    #[serde(default = "default_qualifications")]
    pub qualifications: Vec<String>,
    #[serde(default = "default_list_limit")]
    pub list_limit: i64,
}

impl Default for LeadsConfig {
    fn default() -> Self {
        Self {
            qualifications: default_qualifications(),
            list_limit: default_list_limit(),
        }
    }
}

impl LeadsConfig {
    /// Resolve a user-supplied qualification to its configured spelling.
    ///
    /// Matching is case-insensitive and ignores surrounding whitespace.
    pub fn resolve_qualification(&self, input: &str) -> Result<String> {
        let wanted = input.trim();
        self.qualifications
            .iter()
            .find(|q| q.eq_ignore_ascii_case(wanted))
            .cloned()
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "Unknown qualification '{}'. Expected one of: {}",
                    wanted,
                    self.qualifications.join(", ")
                )
            })
    }
}

fn default_qualifications() -> Vec<String> {
    vec![
        "Hot".to_string(),
        "Warm".to_string(),
        "Cold".to_string(),
        "Smart Talk".to_string(),
        "Partner".to_string(),
    ]
}
fn default_list_limit() -> i64 {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Largest accepted request body; `POST /scan` carries base64 images.
    #[serde(default = "default_max_body_mb")]
    pub max_body_mb: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_body_mb: default_max_body_mb(),
        }
    }
}

impl ServerConfig {
    pub fn max_body_bytes(&self) -> usize {
        self.max_body_mb * 1024 * 1024
    }
}

fn default_bind() -> String {
    "127.0.0.1:8484".to_string()
}
fn default_max_body_mb() -> usize {
    20
}

impl Config {
    /// Defaults for commands that run without a config file.
    pub fn minimal() -> Self {
        Self {
            db: DbConfig {
                path: PathBuf::from("./data/leads.sqlite"),
            },
            mistral: MistralConfig::default(),
            search: SearchConfig::default(),
            sender: SenderConfig::default(),
            offers: Vec::new(),
            leads: LeadsConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if config.mistral.base_url.trim().is_empty() {
        anyhow::bail!("mistral.base_url must not be empty");
    }
    if config.mistral.chat_model.trim().is_empty() {
        anyhow::bail!("mistral.chat_model must not be empty");
    }
    if config.mistral.ocr_model.trim().is_empty() {
        anyhow::bail!("mistral.ocr_model must not be empty");
    }
    if config.mistral.timeout_secs == 0 {
        anyhow::bail!("mistral.timeout_secs must be > 0");
    }
    if let Some(t) = config.mistral.temperature {
        if !(0.0..=1.5).contains(&t) {
            anyhow::bail!("mistral.temperature must be in [0.0, 1.5]");
        }
    }

    match config.search.provider.as_str() {
        "disabled" | "duckduckgo" | "brave" => {}
        other => anyhow::bail!(
            "Unknown search provider: '{}'. Must be disabled, duckduckgo, or brave.",
            other
        ),
    }
    if config.search.is_enabled() && config.search.max_results == 0 {
        anyhow::bail!("search.max_results must be > 0");
    }

    if config.leads.qualifications.is_empty() {
        anyhow::bail!("leads.qualifications must list at least one category");
    }
    if config.leads.list_limit < 1 {
        anyhow::bail!("leads.list_limit must be >= 1");
    }
    if config.server.max_body_mb == 0 {
        anyhow::bail!("server.max_body_mb must be >= 1");
    }

    for (i, offer) in config.offers.iter().enumerate() {
        if offer.name.trim().is_empty() {
            anyhow::bail!("offers[{}].name must not be empty", i);
        }
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn db_only_config_gets_defaults() {
        let cfg = parse_config("[db]\npath = \"leads.sqlite\"\n").unwrap();
        assert_eq!(cfg.mistral.chat_model, "mistral-small-latest");
        assert_eq!(cfg.mistral.max_retries, 3);
        assert_eq!(cfg.search.provider, "duckduckgo");
        assert_eq!(cfg.search.max_tool_rounds, 1);
        assert!(cfg.offers.is_empty());
        assert_eq!(cfg.server.bind, "127.0.0.1:8484");
        assert_eq!(cfg.server.max_body_bytes(), 20 * 1024 * 1024);
    }

    #[test]
    fn offers_and_sender_parse() {
        let cfg = parse_config(
            r#"
            [db]
            path = "leads.sqlite"

            [sender]
            name = "Alex Martin"
            company = "Northwind"

            [[offers]]
            name = "Data audit"
            description = "Two-week review"

            [[offers]]
            name = "Training"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.sender.company, "Northwind");
        assert_eq!(cfg.sender.language, "English");
        assert_eq!(cfg.offers.len(), 2);
        assert_eq!(cfg.offers[1].description, "");
    }

    #[test]
    fn unknown_search_provider_rejected() {
        let err = parse_config("[db]\npath = \"x\"\n[search]\nprovider = \"bing\"\n").unwrap_err();
        assert!(err.to_string().contains("Unknown search provider"));
    }

    #[test]
    fn empty_qualifications_rejected() {
        let err =
            parse_config("[db]\npath = \"x\"\n[leads]\nqualifications = []\n").unwrap_err();
        assert!(err.to_string().contains("qualifications"));
    }

    #[test]
    fn zero_body_limit_rejected() {
        let err = parse_config("[db]\npath = \"x\"\n[server]\nmax_body_mb = 0\n").unwrap_err();
        assert!(err.to_string().contains("server.max_body_mb"));
    }

    #[test]
    fn missing_db_section_is_an_error() {
        assert!(parse_config("[search]\nprovider = \"disabled\"\n").is_err());
    }

    #[test]
    fn qualification_resolves_case_insensitively() {
        let leads = LeadsConfig::default();
        assert_eq!(leads.resolve_qualification(" smart talk ").unwrap(), "Smart Talk");
        assert!(leads.resolve_qualification("lukewarm").is_err());
    }
}
