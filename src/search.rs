//! Web search tool offered to the enrichment agent.
//!
//! Defines the [`WebSearch`] trait and its backends:
//! - **[`DuckDuckGoSearch`]**: DuckDuckGo Instant Answer API, no key needed.
//! - **[`BraveSearch`]**: Brave Web Search API, key from `BRAVE_API_KEY`.
//!
//! When `[search].provider = "disabled"`, [`create_search`] returns `None`
//! and the agent runs without the tool.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

use crate::config::SearchConfig;
use crate::llm::ToolSpec;

/// Name under which the search tool is exposed to the model.
pub const WEB_SEARCH_TOOL: &str = "web_search";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

#[async_trait]
pub trait WebSearch: Send + Sync {
    fn name(&self) -> &str;

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>>;
}

/// The function definition sent to the chat model.
pub fn web_search_tool() -> ToolSpec {
    ToolSpec {
        name: WEB_SEARCH_TOOL.to_string(),
        description: "Search the web for public information about a person or a company. \
                      Use it to confirm a company's activity, website, size or location."
            .to_string(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Search query, e.g. a person's full name plus company name"
                }
            },
            "required": ["query"]
        }),
    }
}

/// Numbered plain-text list fed back to the model as the tool result.
pub fn format_hits(hits: &[SearchHit]) -> String {
    if hits.is_empty() {
        return "No results found.".to_string();
    }
    hits.iter()
        .enumerate()
        .map(|(i, h)| {
            let mut entry = format!("{}. {}", i + 1, h.title);
            if !h.url.is_empty() {
                entry.push_str(&format!("\n   {}", h.url));
            }
            if !h.snippet.is_empty() {
                entry.push_str(&format!("\n   {}", h.snippet));
            }
            entry
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Build the configured backend, or `None` when search is disabled.
pub fn create_search(config: &SearchConfig) -> Result<Option<Box<dyn WebSearch>>> {
    match config.provider.as_str() {
        "disabled" => Ok(None),
        "duckduckgo" => Ok(Some(Box::new(DuckDuckGoSearch::new(config)?))),
        "brave" => Ok(Some(Box::new(BraveSearch::new(config)?))),
        other => bail!("Unknown search provider: {}", other),
    }
}

fn build_http(config: &SearchConfig) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .user_agent(concat!("card-intake/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

async fn get_json(request: reqwest::RequestBuilder, provider: &str) -> Result<Value> {
    let response = request
        .send()
        .await
        .with_context(|| format!("{} search request failed", provider))?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        bail!("{} search error {}: {}", provider, status, body);
    }
    response
        .json()
        .await
        .with_context(|| format!("Invalid JSON from {} search", provider))
}

// ============ DuckDuckGo ============

pub struct DuckDuckGoSearch {
    http: reqwest::Client,
    base_url: String,
}

impl DuckDuckGoSearch {
    pub fn new(config: &SearchConfig) -> Result<Self> {
        Ok(Self {
            http: build_http(config)?,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| "https://api.duckduckgo.com".to_string())
                .trim_end_matches('/')
                .to_string(),
        })
    }
}

#[async_trait]
impl WebSearch for DuckDuckGoSearch {
    fn name(&self) -> &str {
        "duckduckgo"
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>> {
        let request = self.http.get(format!("{}/", self.base_url)).query(&[
            ("q", query),
            ("format", "json"),
            ("no_html", "1"),
            ("skip_disambig", "1"),
        ]);
        let json = get_json(request, "duckduckgo").await?;
        Ok(parse_duckduckgo(&json, max_results))
    }
}

/// Abstract first, then related topics (nested topic groups flattened).
fn parse_duckduckgo(json: &Value, max_results: usize) -> Vec<SearchHit> {
    let mut hits = Vec::new();

    let abstract_text = json
        .get("AbstractText")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    if !abstract_text.is_empty() {
        hits.push(SearchHit {
            title: json
                .get("Heading")
                .and_then(|v| v.as_str())
                .unwrap_or("Summary")
                .to_string(),
            url: json
                .get("AbstractURL")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string(),
            snippet: abstract_text.to_string(),
        });
    }

    let mut stack: Vec<&Value> = json
        .get("RelatedTopics")
        .and_then(|v| v.as_array())
        .map(|a| a.iter().rev().collect())
        .unwrap_or_default();

    while let Some(topic) = stack.pop() {
        if hits.len() >= max_results {
            break;
        }
        if let Some(children) = topic.get("Topics").and_then(|v| v.as_array()) {
            stack.extend(children.iter().rev());
            continue;
        }
        let text = topic.get("Text").and_then(|v| v.as_str()).unwrap_or("");
        if text.is_empty() {
            continue;
        }
        // "Title - rest of description"
        let title = text.split(" - ").next().unwrap_or(text).to_string();
        hits.push(SearchHit {
            title,
            url: topic
                .get("FirstURL")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string(),
            snippet: text.to_string(),
        });
    }

    hits.truncate(max_results);
    hits
}

// ============ Brave ============

pub struct BraveSearch {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl BraveSearch {
    /// # Errors
    ///
    /// Fails if the environment variable named by `api_key_env` is not set.
    pub fn new(config: &SearchConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| anyhow::anyhow!("{} environment variable not set", config.api_key_env))?;
        Ok(Self {
            http: build_http(config)?,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| "https://api.search.brave.com".to_string())
                .trim_end_matches('/')
                .to_string(),
            api_key,
        })
    }
}

#[async_trait]
impl WebSearch for BraveSearch {
    fn name(&self) -> &str {
        "brave"
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>> {
        let count = max_results.to_string();
        let request = self
            .http
            .get(format!("{}/res/v1/web/search", self.base_url))
            .header("Accept", "application/json")
            .header("X-Subscription-Token", &self.api_key)
            .query(&[("q", query), ("count", count.as_str())]);
        let json = get_json(request, "brave").await?;
        Ok(parse_brave(&json, max_results))
    }
}

fn parse_brave(json: &Value, max_results: usize) -> Vec<SearchHit> {
    json.get("web")
        .and_then(|w| w.get("results"))
        .and_then(|r| r.as_array())
        .map(|results| {
            results
                .iter()
                .take(max_results)
                .map(|r| SearchHit {
                    title: str_field(r, "title"),
                    url: str_field(r, "url"),
                    snippet: str_field(r, "description"),
                })
                .collect()
        })
        .unwrap_or_default()
}

fn str_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn duckduckgo_abstract_then_topics() {
        let hits = parse_duckduckgo(
            &json!({
                "Heading": "Acme Corp",
                "AbstractText": "Acme Corp makes anvils.",
                "AbstractURL": "https://en.wikipedia.org/wiki/Acme",
                "RelatedTopics": [
                    {"Text": "Acme Labs - research arm", "FirstURL": "https://duckduckgo.com/Acme_Labs"},
                    {"Name": "Products", "Topics": [
                        {"Text": "Anvil - heavy block", "FirstURL": "https://duckduckgo.com/Anvil"}
                    ]},
                    {"Text": "Road Runner", "FirstURL": "https://duckduckgo.com/RR"}
                ]
            }),
            3,
        );
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].title, "Acme Corp");
        assert_eq!(hits[1].title, "Acme Labs");
        assert_eq!(hits[2].title, "Anvil");
    }

    #[test]
    fn duckduckgo_empty_response() {
        assert!(parse_duckduckgo(&json!({"AbstractText": "", "RelatedTopics": []}), 5).is_empty());
    }

    #[test]
    fn brave_results() {
        let hits = parse_brave(
            &json!({"web": {"results": [
                {"title": "A", "url": "https://a", "description": "first"},
                {"title": "B", "url": "https://b", "description": "second"}
            ]}}),
            1,
        );
        assert_eq!(
            hits,
            vec![SearchHit {
                title: "A".into(),
                url: "https://a".into(),
                snippet: "first".into()
            }]
        );
    }

    #[test]
    fn format_numbered_list() {
        let text = format_hits(&[SearchHit {
            title: "Acme".into(),
            url: "https://acme.test".into(),
            snippet: "Anvils".into(),
        }]);
        assert_eq!(text, "1. Acme\n   https://acme.test\n   Anvils");
        assert_eq!(format_hits(&[]), "No results found.");
    }

    #[test]
    fn disabled_provider_yields_none() {
        let config = SearchConfig {
            provider: "disabled".into(),
            ..SearchConfig::default()
        };
        assert!(create_search(&config).unwrap().is_none());
    }

    #[test]
    fn tool_schema_requires_query() {
        let tool = web_search_tool();
        assert_eq!(tool.name, WEB_SEARCH_TOOL);
        assert_eq!(tool.parameters["required"][0], "query");
    }
}
