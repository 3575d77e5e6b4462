//! OCR extraction.
//!
//! The [`OcrProvider`] trait abstracts the external OCR service. The only
//! backend is [`MistralOcr`], which returns one markdown document per page.
//! [`normalize_markdown`] turns those pages into the plain text the field
//! parser and agents work on.

use anyhow::Result;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use crate::config::MistralConfig;
use crate::image::CardImage;
use crate::llm::ApiClient;

/// One OCR page (0-based index as reported by the service).
#[derive(Debug, Clone, Deserialize)]
pub struct OcrPage {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub markdown: String,
}

#[derive(Debug, Clone)]
pub struct OcrDocument {
    pub pages: Vec<OcrPage>,
    pub model: Option<String>,
}

impl OcrDocument {
    pub fn from_pages(mut pages: Vec<OcrPage>) -> Self {
        pages.sort_by_key(|p| p.index);
        Self { pages, model: None }
    }

    /// Plain text with image references removed.
    pub fn text(&self) -> String {
        normalize_markdown(&self.pages)
    }
}

#[async_trait]
pub trait OcrProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn extract(&self, image: &CardImage) -> Result<OcrDocument>;
}

pub struct MistralOcr {
    client: ApiClient,
    model: String,
}

impl MistralOcr {
    pub fn new(client: ApiClient, config: &MistralConfig) -> Self {
        Self {
            client,
            model: config.ocr_model.clone(),
        }
    }
}

#[derive(Deserialize)]
struct OcrResponse {
    #[serde(default)]
    pages: Vec<OcrPage>,
    #[serde(default)]
    model: Option<String>,
}

#[async_trait]
impl OcrProvider for MistralOcr {
    fn name(&self) -> &str {
        "mistral"
    }

    async fn extract(&self, image: &CardImage) -> Result<OcrDocument> {
        let body = serde_json::json!({
            "model": self.model,
            "document": {
                "type": "image_url",
                "image_url": image.data_uri(),
            },
            "include_image_base64": false,
        });
        tracing::debug!(file = %image.file_name, bytes = image.bytes.len(), "ocr request");

        let json = self.client.post_json("/v1/ocr", &body).await?;
        let response: OcrResponse = serde_json::from_value(json)
            .map_err(|e| anyhow::anyhow!("Invalid OCR response: {}", e))?;

        let mut doc = OcrDocument::from_pages(response.pages);
        doc.model = response.model;
        Ok(doc)
    }
}

/// A line consisting only of a markdown image reference, e.g. `![img-0.jpeg](img-0.jpeg)`.
static IMAGE_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*!\[[^\]]*\]\([^)]*\)\s*$").expect("valid regex"));

/// Drop image-reference and blank lines, trim the rest, and join all pages
/// with newlines in page order.
pub fn normalize_markdown(pages: &[OcrPage]) -> String {
    pages
        .iter()
        .flat_map(|p| p.markdown.lines())
        .filter(|line| !IMAGE_LINE.is_match(line))
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(index: u32, markdown: &str) -> OcrPage {
        OcrPage {
            index,
            markdown: markdown.to_string(),
        }
    }

    #[test]
    fn strips_image_lines_and_blanks() {
        let text = normalize_markdown(&[page(
            0,
            "![img-0.jpeg](img-0.jpeg)\n\n# Jean DUPONT\n  Sales Director  \n\n ![logo](logo.png) \n",
        )]);
        assert_eq!(text, "# Jean DUPONT\nSales Director");
    }

    #[test]
    fn inline_image_reference_is_kept() {
        let text = normalize_markdown(&[page(0, "Logo ![x](x.png) Acme")]);
        assert_eq!(text, "Logo ![x](x.png) Acme");
    }

    #[test]
    fn pages_are_joined_in_index_order() {
        let doc = OcrDocument::from_pages(vec![page(1, "back side"), page(0, "front side")]);
        assert_eq!(doc.text(), "front side\nback side");
    }

    #[test]
    fn empty_document_gives_empty_text() {
        assert_eq!(normalize_markdown(&[]), "");
        assert_eq!(normalize_markdown(&[page(0, "![a](b)")]), "");
    }
}
