//! Card processing pipeline.
//!
//! ```text
//! image ─▶ OCR ─▶ normalize ─▶ fields ─▶ enrichment ─▶ offer ─▶ email
//!                                          (search)
//! ```
//!
//! Stages run strictly in sequence and each one consumes the previous
//! stage's output. Any stage error aborts the card; nothing is retried here
//! beyond the HTTP 429 policy inside [`crate::llm::ApiClient`].

use anyhow::Result;

use crate::agents::{EmailAgent, Enrichment, EnrichmentAgent, OfferAgent};
use crate::config::Config;
use crate::fields::{parse_fields, ContactFields};
use crate::image::CardImage;
use crate::llm::{ApiClient, ChatModel, MistralChat};
use crate::models::NewLead;
use crate::ocr::{MistralOcr, OcrProvider};
use crate::progress::{ProgressEvent, ProgressReporter, Stage};
use crate::search::{create_search, WebSearch};

/// One card to process, with the user's qualification and notes.
#[derive(Debug, Clone)]
pub struct CardInput {
    pub image: CardImage,
    pub qualification: String,
    pub note: String,
    /// Where the image came from (a path for CLI scans).
    pub source_file: Option<String>,
}

/// Everything the pipeline produced for one card.
#[derive(Debug, Clone)]
pub struct ProcessedCard {
    pub ocr_text: String,
    pub fields: ContactFields,
    pub enrichment: Enrichment,
    pub offer: String,
    pub email_draft: String,
    pub qualification: String,
    pub note: String,
    pub image_sha256: String,
    pub source_file: Option<String>,
}

impl ProcessedCard {
    pub fn into_new_lead(self) -> NewLead {
        NewLead {
            ocr_text: self.ocr_text,
            fields: self.fields,
            enrichment: self.enrichment.text,
            offer: self.offer,
            email_draft: self.email_draft,
            qualification: self.qualification,
            note: self.note,
            image_sha256: Some(self.image_sha256),
            source_file: self.source_file,
        }
    }
}

/// Position of a card within a batch, for progress output.
#[derive(Debug, Clone, Copy)]
pub struct BatchPosition {
    pub n: u64,
    pub total: u64,
}

impl BatchPosition {
    pub const SINGLE: BatchPosition = BatchPosition { n: 1, total: 1 };
}

pub struct Pipeline {
    config: Config,
    ocr: Box<dyn OcrProvider>,
    chat: Box<dyn ChatModel>,
    search: Option<Box<dyn WebSearch>>,
    skip_agents: bool,
}

impl Pipeline {
    /// Build the Mistral OCR/chat backends and the configured search provider.
    ///
    /// # Errors
    ///
    /// Fails if the Mistral API key (or the Brave key, when Brave search is
    /// selected) is missing from the environment.
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = ApiClient::from_config(&config.mistral)?;
        let ocr = MistralOcr::new(client.clone(), &config.mistral);
        let chat = MistralChat::new(client, &config.mistral);
        let search = create_search(&config.search)?;
        Ok(Self::new(config.clone(), Box::new(ocr), Box::new(chat), search))
    }

    pub fn new(
        config: Config,
        ocr: Box<dyn OcrProvider>,
        chat: Box<dyn ChatModel>,
        search: Option<Box<dyn WebSearch>>,
    ) -> Self {
        Self {
            config,
            ocr,
            chat,
            search,
            skip_agents: false,
        }
    }

    /// Stop after field parsing; agent outputs are left empty.
    pub fn skip_agents(mut self, skip: bool) -> Self {
        self.skip_agents = skip;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// OCR only: the normalized plain text of `image`.
    pub async fn extract_text(&self, image: &CardImage) -> Result<String> {
        let doc = self.ocr.extract(image).await?;
        Ok(doc.text())
    }

    pub async fn process(
        &self,
        input: CardInput,
        reporter: &dyn ProgressReporter,
    ) -> Result<ProcessedCard> {
        self.process_at(input, reporter, BatchPosition::SINGLE).await
    }

    pub async fn process_at(
        &self,
        input: CardInput,
        reporter: &dyn ProgressReporter,
        position: BatchPosition,
    ) -> Result<ProcessedCard> {
        let card = input.image.file_name.clone();
        let stage = |stage: Stage| {
            reporter.report(ProgressEvent::Stage {
                card: card.clone(),
                stage,
                n: position.n,
                total: position.total,
            })
        };

        stage(Stage::Ocr);
        let doc = self.ocr.extract(&input.image).await?;
        let ocr_text = doc.text();
        tracing::info!(
            card = %card,
            provider = self.ocr.name(),
            model = doc.model.as_deref().unwrap_or("-"),
            chars = ocr_text.len(),
            "ocr complete"
        );
        if ocr_text.is_empty() {
            tracing::warn!(card = %card, "ocr returned no text");
        }

        stage(Stage::Fields);
        let fields = parse_fields(&ocr_text);
        if fields.is_empty() {
            tracing::warn!(card = %card, "no contact fields recognized");
        } else {
            tracing::info!(
                card = %card,
                name = %fields.full_name(),
                email = %fields.email,
                phone = %fields.phone,
                "fields parsed"
            );
        }

        let (enrichment, offer, email_draft) = if self.skip_agents {
            (Enrichment::default(), String::new(), String::new())
        } else {
            tracing::info!(card = %card, model = self.chat.model_name(), "running agents");
            stage(Stage::Enrichment);
            let enrichment = EnrichmentAgent::new(
                self.chat.as_ref(),
                self.search.as_deref(),
                &self.config,
            )
            .run(&ocr_text, &fields)
            .await?;
            tracing::info!(card = %card, searches = enrichment.queries.len(), "enrichment complete");

            stage(Stage::Offer);
            let offer = OfferAgent::new(self.chat.as_ref(), &self.config)
                .run(&enrichment.text, &input.qualification, &input.note)
                .await?;
            tracing::info!(card = %card, "offer matched");

            stage(Stage::Email);
            let email_draft = EmailAgent::new(self.chat.as_ref(), &self.config)
                .run(&enrichment.text, &offer, &fields, &input.note)
                .await?;
            tracing::info!(card = %card, "email drafted");

            (enrichment, offer, email_draft)
        };

        reporter.report(ProgressEvent::Done {
            card: card.clone(),
            n: position.n,
            total: position.total,
        });

        Ok(ProcessedCard {
            ocr_text,
            fields,
            enrichment,
            offer,
            email_draft,
            qualification: input.qualification,
            note: input.note,
            image_sha256: input.image.sha256(),
            source_file: input.source_file,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ChatReply, ChatRequest};
    use crate::ocr::{OcrDocument, OcrPage};
    use crate::progress::NoProgress;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    struct FakeOcr(&'static str);

    #[async_trait]
    impl OcrProvider for FakeOcr {
        fn name(&self) -> &str {
            "fake"
        }

        async fn extract(&self, _image: &CardImage) -> Result<OcrDocument> {
            Ok(OcrDocument::from_pages(vec![OcrPage {
                index: 0,
                markdown: self.0.to_string(),
            }]))
        }
    }

    /// Answers with "stage N" and records the user message of each call.
    struct CountingChat {
        calls: AtomicUsize,
        prompts: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl ChatModel for CountingChat {
        fn model_name(&self) -> &str {
            "counting"
        }

        async fn complete(&self, request: &ChatRequest) -> Result<ChatReply> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            let user = request
                .messages
                .iter()
                .rev()
                .find(|m| m.role == crate::llm::Role::User)
                .map(|m| m.content.clone())
                .unwrap_or_default();
            self.prompts.lock().unwrap().push(user);
            Ok(ChatReply {
                content: format!("stage {}", n),
                tool_calls: Vec::new(),
                finish_reason: Some("stop".to_string()),
            })
        }
    }

    /// Records every event it sees.
    struct Recorder(Mutex<Vec<String>>);

    impl ProgressReporter for Recorder {
        fn report(&self, event: ProgressEvent) {
            let label = match event {
                ProgressEvent::Stage { stage, .. } => stage.as_str().to_string(),
                ProgressEvent::Done { .. } => "done".to_string(),
            };
            self.0.lock().unwrap().push(label);
        }
    }

    fn input() -> CardInput {
        CardInput {
            image: CardImage::from_bytes("card.png", vec![0x89, b'P', b'N', b'G']).unwrap(),
            qualification: "Hot".to_string(),
            note: "met at booth 12".to_string(),
            source_file: Some("card.png".to_string()),
        }
    }

    fn pipeline(prompts: Arc<Mutex<Vec<String>>>) -> Pipeline {
        Pipeline::new(
            Config::minimal(),
            Box::new(FakeOcr("![logo](logo.png)\nJean DUPONT\njean@acme.test")),
            Box::new(CountingChat {
                calls: AtomicUsize::new(0),
                prompts,
            }),
            None,
        )
    }

    #[tokio::test]
    async fn stages_hand_off_in_order() {
        let prompts = Arc::new(Mutex::new(Vec::new()));
        let recorder = Recorder(Mutex::new(Vec::new()));
        let out = pipeline(prompts.clone())
            .process(input(), &recorder)
            .await
            .unwrap();

        assert_eq!(out.ocr_text, "Jean DUPONT\njean@acme.test");
        assert_eq!(out.fields.last_name, "DUPONT");
        assert_eq!(out.enrichment.text, "stage 1");
        assert_eq!(out.offer, "stage 2");
        assert_eq!(out.email_draft, "stage 3");

        let prompts = prompts.lock().unwrap();
        assert!(prompts[0].contains("Jean DUPONT"));
        assert!(prompts[1].contains("stage 1"));
        assert!(prompts[1].contains("Hot"));
        assert!(prompts[2].contains("stage 1") && prompts[2].contains("stage 2"));

        assert_eq!(
            *recorder.0.lock().unwrap(),
            vec!["ocr", "fields", "enrichment", "offer", "email", "done"]
        );
    }

    #[tokio::test]
    async fn empty_ocr_text_still_runs_every_agent() {
        let prompts = Arc::new(Mutex::new(Vec::new()));
        let pipeline = Pipeline::new(
            Config::minimal(),
            Box::new(FakeOcr("![img](img.png)")),
            Box::new(CountingChat {
                calls: AtomicUsize::new(0),
                prompts: prompts.clone(),
            }),
            None,
        );

        let out = pipeline.process(input(), &NoProgress).await.unwrap();
        assert_eq!(out.ocr_text, "");
        assert_eq!(out.fields, ContactFields::default());
        assert_eq!(out.email_draft, "stage 3");

        let prompts = prompts.lock().unwrap();
        assert_eq!(prompts.len(), 3);
        assert!(prompts[0].contains("First name: -"));
        assert!(prompts[0].contains("Email: -"));
    }

    #[tokio::test]
    async fn skip_agents_stops_after_fields() {
        let prompts = Arc::new(Mutex::new(Vec::new()));
        let out = pipeline(prompts.clone())
            .skip_agents(true)
            .process(input(), &NoProgress)
            .await
            .unwrap();
        assert_eq!(out.fields.email, "jean@acme.test");
        assert_eq!(out.enrichment.text, "");
        assert!(prompts.lock().unwrap().is_empty());

        let lead = out.into_new_lead();
        assert_eq!(lead.qualification, "Hot");
        assert_eq!(lead.image_sha256.as_deref().map(str::len), Some(64));
    }
}
