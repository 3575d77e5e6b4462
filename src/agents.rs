//! The three prompt-driven stages of the pipeline.
//!
//! ```text
//! OCR text + fields ─▶ EnrichmentAgent ─▶ OfferAgent ─▶ EmailAgent
//!                        │    ▲              ▲  qualification, note
//!                        ▼    │
//!                      web_search
//! ```
//!
//! Each agent is one system prompt plus one user message. Only the
//! enrichment agent may call a tool.

use anyhow::Result;

use crate::config::Config;
use crate::fields::ContactFields;
use crate::llm::{ChatMessage, ChatModel, ChatRequest, ToolCall, ToolChoice};
use crate::prompts::{self, or_dash, render};
use crate::search::{format_hits, web_search_tool, WebSearch, WEB_SEARCH_TOOL};

/// Output of the research stage.
#[derive(Debug, Clone, Default)]
pub struct Enrichment {
    pub text: String,
    /// Queries the model asked the search tool to run, in order.
    pub queries: Vec<String>,
}

pub struct EnrichmentAgent<'a> {
    chat: &'a dyn ChatModel,
    search: Option<&'a dyn WebSearch>,
    config: &'a Config,
}

impl<'a> EnrichmentAgent<'a> {
    pub fn new(
        chat: &'a dyn ChatModel,
        search: Option<&'a dyn WebSearch>,
        config: &'a Config,
    ) -> Self {
        Self {
            chat,
            search,
            config,
        }
    }

    fn tools_enabled(&self) -> bool {
        self.search.is_some() && self.config.search.max_tool_rounds > 0
    }

    fn initial_messages(&self, ocr_text: &str, fields: &ContactFields) -> Vec<ChatMessage> {
        let hint = if self.tools_enabled() {
            prompts::ENRICHMENT_SEARCH_HINT
        } else {
            prompts::ENRICHMENT_NO_SEARCH_HINT
        };
        let system = render(
            prompts::ENRICHMENT_SYSTEM,
            &[
                ("search_hint", hint),
                ("language", self.config.sender.language.as_str()),
            ],
        );
        let user = render(
            prompts::ENRICHMENT_USER,
            &[
                ("ocr_text", or_dash(ocr_text)),
                ("first_name", or_dash(&fields.first_name)),
                ("last_name", or_dash(&fields.last_name)),
                ("phone", or_dash(&fields.phone)),
                ("email", or_dash(&fields.email)),
            ],
        );
        vec![ChatMessage::system(system), ChatMessage::user(user)]
    }

    /// Research the contact, executing search tool calls between model turns.
    pub async fn run(&self, ocr_text: &str, fields: &ContactFields) -> Result<Enrichment> {
        let mut messages = self.initial_messages(ocr_text, fields);
        let tools = if self.tools_enabled() {
            vec![web_search_tool()]
        } else {
            Vec::new()
        };
        let max_rounds = self.config.search.max_tool_rounds;
        let mut queries = Vec::new();
        let mut round = 0;

        loop {
            let exhausted = round >= max_rounds;
            let mut request = ChatRequest::new(messages.clone()).with_tools(tools.clone());
            if !tools.is_empty() && exhausted {
                request = request.with_tool_choice(ToolChoice::None);
            }

            let reply = self.chat.complete(&request).await?;

            if reply.tool_calls.is_empty() || tools.is_empty() || exhausted {
                if reply.content.trim().is_empty() {
                    tracing::warn!("enrichment agent returned an empty answer");
                }
                return Ok(Enrichment {
                    text: reply.content,
                    queries,
                });
            }

            tracing::info!(
                round = round + 1,
                calls = reply.tool_calls.len(),
                "enrichment agent requested tools"
            );
            messages.push(ChatMessage::assistant(
                reply.content.clone(),
                reply.tool_calls.clone(),
            ));
            for call in &reply.tool_calls {
                let result = self.execute_tool(call, &mut queries).await;
                messages.push(ChatMessage::tool_result(call, result));
            }
            round += 1;
        }
    }

    /// Failures are returned as text for the model rather than aborting the stage.
    async fn execute_tool(&self, call: &ToolCall, queries: &mut Vec<String>) -> String {
        let Some(search) = self.search else {
            return "Error: web search is not available".to_string();
        };
        if call.name != WEB_SEARCH_TOOL {
            return format!("Error: unknown tool '{}'", call.name);
        }

        let args: serde_json::Value = match serde_json::from_str(&call.arguments) {
            Ok(v) => v,
            Err(e) => return format!("Error: arguments are not valid JSON: {}", e),
        };
        let query = match args.get("query").and_then(|q| q.as_str()) {
            Some(q) if !q.trim().is_empty() => q.trim().to_string(),
            _ => return "Error: missing 'query' argument".to_string(),
        };

        queries.push(query.clone());
        match search
            .search(&query, self.config.search.max_results)
            .await
        {
            Ok(hits) => {
                tracing::info!(provider = search.name(), %query, hits = hits.len(), "web search");
                format_hits(&hits)
            }
            Err(e) => {
                tracing::warn!(provider = search.name(), %query, error = %e, "web search failed");
                format!("Error: search failed: {}", e)
            }
        }
    }
}

pub struct OfferAgent<'a> {
    chat: &'a dyn ChatModel,
    config: &'a Config,
}

impl<'a> OfferAgent<'a> {
    pub fn new(chat: &'a dyn ChatModel, config: &'a Config) -> Self {
        Self { chat, config }
    }

    fn offer_catalog(&self) -> String {
        if self.config.offers.is_empty() {
            return "(no catalog configured: recommend a sensible generic next step)".to_string();
        }
        self.config
            .offers
            .iter()
            .map(|o| {
                if o.description.is_empty() {
                    format!("- {}", o.name)
                } else {
                    format!("- {}: {}", o.name, o.description)
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub async fn run(&self, enrichment: &str, qualification: &str, note: &str) -> Result<String> {
        let company = if self.config.sender.company.is_empty() {
            "our company"
        } else {
            self.config.sender.company.as_str()
        };
        let catalog = self.offer_catalog();
        let system = render(
            prompts::OFFER_SYSTEM,
            &[
                ("company", company),
                ("offers", catalog.as_str()),
                ("language", self.config.sender.language.as_str()),
            ],
        );
        let user = render(
            prompts::OFFER_USER,
            &[
                ("enrichment", or_dash(enrichment)),
                ("qualification", or_dash(qualification)),
                ("note", or_dash(note)),
            ],
        );
        let request = ChatRequest::new(vec![ChatMessage::system(system), ChatMessage::user(user)]);
        Ok(self.chat.complete(&request).await?.content)
    }
}

pub struct EmailAgent<'a> {
    chat: &'a dyn ChatModel,
    config: &'a Config,
}

impl<'a> EmailAgent<'a> {
    pub fn new(chat: &'a dyn ChatModel, config: &'a Config) -> Self {
        Self { chat, config }
    }

    fn signature(&self) -> String {
        if let Some(ref sig) = self.config.sender.signature {
            return sig.clone();
        }
        [
            self.config.sender.name.as_str(),
            self.config.sender.company.as_str(),
        ]
        .iter()
        .filter(|s| !s.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("\n")
    }

    pub async fn run(
        &self,
        enrichment: &str,
        offer: &str,
        fields: &ContactFields,
        note: &str,
    ) -> Result<String> {
        let signature = self.signature();
        let system = render(
            prompts::EMAIL_SYSTEM,
            &[
                ("signature", or_dash(&signature)),
                ("language", self.config.sender.language.as_str()),
            ],
        );
        let full_name = fields.full_name();
        let recipient = if full_name.is_empty() {
            "the contact"
        } else {
            full_name.as_str()
        };
        let user = render(
            prompts::EMAIL_USER,
            &[
                ("recipient", recipient),
                ("email", or_dash(&fields.email)),
                ("enrichment", or_dash(enrichment)),
                ("offer", or_dash(offer)),
                ("note", or_dash(note)),
            ],
        );
        let request = ChatRequest::new(vec![ChatMessage::system(system), ChatMessage::user(user)]);
        Ok(self.chat.complete(&request).await?.content)
    }
}
