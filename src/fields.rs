//! Contact field extraction from OCR text.
//!
//! Each field is an independent pattern search over the whole text. A field
//! that does not match is left as an empty string; it never prevents the
//! other fields from being found.

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::Path;

/// Fields recovered from a card. Empty string means "not found".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactFields {
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub email: String,
}

impl ContactFields {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    pub fn is_empty(&self) -> bool {
        self.first_name.is_empty()
            && self.last_name.is_empty()
            && self.phone.is_empty()
            && self.email.is_empty()
    }
}

static EMAIL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b[a-z0-9._%+-]+@[a-z0-9-]+(?:\.[a-z0-9-]+)*\.[a-z]{2,}\b")
        .expect("valid email regex")
});

// Separators exclude newlines so numbers on adjacent lines never merge.
static PHONE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:\+\d{1,3}[ \t.-]?)?(?:\(0\)[ \t.-]?)?\(?\d{1,4}\)?(?:[ \t./-]?\d{1,4}){2,7}")
        .expect("valid phone regex")
});

static NAME_WORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\p{Lu}[\p{L}'’-]*$").expect("valid name regex"));

static PHONE_CUE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:t[eé]l|mob|phone|portable|gsm|cell)").expect("valid phone cue regex")
});

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

const MIN_PHONE_DIGITS: usize = 9;
const MAX_PHONE_DIGITS: usize = 15;

/// Words that mark a line as a job title or company rather than a person.
const NON_NAME_WORDS: &[&str] = &[
    "ceo", "cto", "cfo", "coo", "founder", "co-founder", "director", "directeur", "directrice",
    "manager", "head", "chief", "officer", "president", "président", "présidente", "engineer",
    "ingénieur", "consultant", "consultante", "sales", "marketing", "commercial", "commerciale",
    "business", "developer", "partner", "associate", "associé", "gérant", "gérante", "responsable",
    "chargé", "chargée", "team", "lead", "senior", "junior", "project", "product", "account",
    "executive", "assistant", "assistante", "ltd", "inc", "llc", "gmbh", "sas", "sarl", "sa",
    "group", "groupe", "company", "corp", "corporation", "consulting", "solutions", "services",
    "technologies", "agency", "agence", "studio", "street", "rue", "avenue", "boulevard", "road",
];

/// Run every field extractor over `text`.
pub fn parse_fields(text: &str) -> ContactFields {
    let (first_name, last_name) = extract_name(text);
    ContactFields {
        first_name,
        last_name,
        phone: extract_phone(text),
        email: extract_email(text),
    }
}

pub fn extract_email(text: &str) -> String {
    EMAIL_REGEX
        .find(text)
        .map(|m| m.as_str().to_lowercase())
        .unwrap_or_default()
}

/// The first plausible phone number, preferring one that starts with `+` or
/// sits on a line labelled as a phone (`Tel`, `Mob`, `Phone`...).
pub fn extract_phone(text: &str) -> String {
    let mut fallback = None;
    for m in PHONE_REGEX.find_iter(text) {
        let digits = m.as_str().chars().filter(char::is_ascii_digit).count();
        if !(MIN_PHONE_DIGITS..=MAX_PHONE_DIGITS).contains(&digits) {
            continue;
        }
        if m.as_str().starts_with('+') || PHONE_CUE.is_match(line_at(text, m.start())) {
            return tidy_phone(m.as_str());
        }
        fallback.get_or_insert(m.as_str());
    }
    fallback.map(tidy_phone).unwrap_or_default()
}

fn tidy_phone(candidate: &str) -> String {
    WHITESPACE.replace_all(candidate.trim(), " ").to_string()
}

/// The full line of `text` containing byte `offset`.
fn line_at(text: &str, offset: usize) -> &str {
    let start = text[..offset].rfind('\n').map_or(0, |i| i + 1);
    let end = text[offset..].find('\n').map_or(text.len(), |i| offset + i);
    &text[start..end]
}

/// Returns `(first_name, last_name)`.
pub fn extract_name(text: &str) -> (String, String) {
    let mut banner: Option<Vec<&str>> = None;

    for raw_line in text.lines() {
        let Some(words) = name_words(raw_line) else {
            continue;
        };
        if words.iter().all(|w| is_upper_word(w)) {
            // Fully uppercase lines are usually company banners.
            banner.get_or_insert(words);
            continue;
        }
        return split_name(&words);
    }

    banner.map(|w| split_name(&w)).unwrap_or_default()
}

/// The words of `line` if it looks like a person's name.
fn name_words(line: &str) -> Option<Vec<&str>> {
    let line = line.trim().trim_matches(|c: char| matches!(c, '#' | '*' | '_' | '>'));
    let lower = line.to_lowercase();
    if line.contains('@')
        || line.chars().any(|c| c.is_ascii_digit())
        || lower.contains("www")
        || lower.contains("http")
    {
        return None;
    }

    let words: Vec<&str> = line.split_whitespace().collect();
    if !(2..=3).contains(&words.len()) {
        return None;
    }
    if !words.iter().all(|w| NAME_WORD.is_match(w)) {
        return None;
    }
    if words
        .iter()
        .any(|w| NON_NAME_WORDS.contains(&w.to_lowercase().as_str()))
    {
        return None;
    }
    Some(words)
}

fn is_upper_word(word: &str) -> bool {
    let letters: Vec<char> = word.chars().filter(|c| c.is_alphabetic()).collect();
    letters.len() >= 2 && letters.iter().all(|c| c.is_uppercase())
}

fn split_name(words: &[&str]) -> (String, String) {
    let upper: Vec<&str> = words.iter().copied().filter(|w| is_upper_word(w)).collect();
    if !upper.is_empty() && upper.len() < words.len() {
        let first: Vec<&str> = words.iter().copied().filter(|w| !is_upper_word(w)).collect();
        return (first.join(" "), upper.join(" "));
    }
    (words[0].to_string(), words[1..].join(" "))
}

/// `card parse [file]`: parse a text file (or stdin) and print the fields as JSON.
pub fn run_parse(path: Option<&Path>) -> Result<()> {
    let text = match path {
        Some(p) => std::fs::read_to_string(p)
            .with_context(|| format!("Failed to read text file: {}", p.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read stdin")?;
            buf
        }
    };
    println!("{}", serde_json::to_string_pretty(&parse_fields(&text))?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CARD: &str = "ACME CONSULTING\n\
        Jean DUPONT\n\
        Sales Director\n\
        12 rue de la Paix, 75002 Paris\n\
        Tel: +33 (0)1 23 45 67 89\n\
        Jean.Dupont@Acme-Consulting.fr\n\
        www.acme-consulting.fr";

    #[test]
    fn full_card() {
        let f = parse_fields(CARD);
        assert_eq!(f.first_name, "Jean");
        assert_eq!(f.last_name, "DUPONT");
        assert_eq!(f.phone, "+33 (0)1 23 45 67 89");
        assert_eq!(f.email, "jean.dupont@acme-consulting.fr");
    }

    #[test]
    fn missing_fields_default_to_empty() {
        let f = parse_fields("Some random text\nwithout contact details");
        assert_eq!(f, ContactFields::default());
        assert!(f.is_empty());
    }

    #[test]
    fn one_field_missing_does_not_block_others() {
        let f = parse_fields("contact: anna@example.org");
        assert_eq!(f.email, "anna@example.org");
        assert_eq!(f.phone, "");
        assert_eq!(f.first_name, "");
    }

    #[test]
    fn title_case_name_splits_first_then_rest() {
        let (first, last) = extract_name("Maria Van Dyke\nProduct Manager");
        assert_eq!(first, "Maria");
        assert_eq!(last, "Van Dyke");
    }

    #[test]
    fn uppercase_surname_first() {
        let (first, last) = extract_name("MARTIN Sophie-Anne");
        assert_eq!(first, "Sophie-Anne");
        assert_eq!(last, "MARTIN");
    }

    #[test]
    fn banner_used_only_as_fallback() {
        assert_eq!(
            extract_name("JOHN SMITH\nhello world"),
            ("JOHN".to_string(), "SMITH".to_string())
        );
        assert_eq!(
            extract_name("ACME LABS\nJohn Smith"),
            ("John".to_string(), "Smith".to_string())
        );
    }

    #[test]
    fn job_titles_are_not_names() {
        assert_eq!(extract_name("Chief Executive Officer"), (String::new(), String::new()));
        assert_eq!(extract_name("Directeur Commercial\nLéa Né"), ("Léa".to_string(), "Né".to_string()));
    }

    #[test]
    fn markdown_heading_markers_ignored() {
        assert_eq!(extract_name("# Paul Durand"), ("Paul".to_string(), "Durand".to_string()));
    }

    #[test]
    fn phone_formats() {
        assert_eq!(extract_phone("Mobile 06.12.34.56.78"), "06.12.34.56.78");
        assert_eq!(extract_phone("(555) 123-4567"), "(555) 123-4567");
        assert_eq!(extract_phone("tel 0123456789 fax"), "0123456789");
    }

    #[test]
    fn labelled_phone_wins_over_earlier_number() {
        let text = "ACME SAS\nSIRET 123 456 789 00012\nTel: 01 23 45 67 89";
        assert_eq!(extract_phone(text), "01 23 45 67 89");
        assert_eq!(
            extract_phone("RCS 812 345 678\n+33 6 12 34 56 78"),
            "+33 6 12 34 56 78"
        );
        assert_eq!(extract_phone("RCS 812 345 678\nParis"), "812 345 678");
    }

    #[test]
    fn short_numbers_are_not_phones() {
        assert_eq!(extract_phone("75002 Paris\nSuite 12"), "");
    }

    #[test]
    fn numbers_on_separate_lines_do_not_merge() {
        assert_eq!(extract_phone("75002\n01 23 45 67 89"), "01 23 45 67 89");
    }

    #[test]
    fn email_is_lowercased_and_first_wins() {
        assert_eq!(
            extract_email("A@B.COM and second@example.com"),
            "a@b.com"
        );
    }
}
