//! Lead records as stored in SQLite.

use serde::{Deserialize, Serialize};

use crate::fields::ContactFields;

/// A stored lead (one processed business card).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    pub id: i64,
    pub ocr_text: String,
    pub last_name: String,
    pub first_name: String,
    pub phone: String,
    pub email: String,
    /// Research stage output.
    pub enrichment: String,
    /// Offer-matching stage output.
    pub offer: String,
    /// Email-drafting stage output.
    pub email_draft: String,
    pub qualification: String,
    pub note: String,
    /// UTC, `YYYY-MM-DD HH:MM:SS`.
    pub created_at: String,
    pub image_sha256: Option<String>,
    pub source_file: Option<String>,
}

impl Lead {
    pub fn display_name(&self) -> String {
        let name = format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string();
        if name.is_empty() {
            "(unnamed)".to_string()
        } else {
            name
        }
    }
}

/// A lead ready to be inserted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewLead {
    pub ocr_text: String,
    pub fields: ContactFields,
    pub enrichment: String,
    pub offer: String,
    pub email_draft: String,
    pub qualification: String,
    pub note: String,
    pub image_sha256: Option<String>,
    pub source_file: Option<String>,
}

impl NewLead {
    /// The placeholder row used to check that storage and listing work.
    pub fn sample() -> Self {
        Self {
            ocr_text: "Sample OCR text".to_string(),
            fields: ContactFields {
                first_name: "John".to_string(),
                last_name: "Doe".to_string(),
                phone: "0123456789".to_string(),
                email: "john.doe@example.com".to_string(),
            },
            enrichment: "Sample enrichment answer".to_string(),
            offer: "Sample offer answer".to_string(),
            email_draft: "Sample email answer".to_string(),
            qualification: "Smart Talk".to_string(),
            note: "Sample note".to_string(),
            image_sha256: None,
            source_file: None,
        }
    }
}
