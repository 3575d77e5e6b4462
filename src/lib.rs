//! # Card Intake
//!
//! Turns photos of business cards into qualified leads with a drafted
//! follow-up email.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌─────────┐   ┌──────────┐   ┌────────────────────────┐
//! │  Image   │──▶│   OCR   │──▶│  Fields  │──▶│ Agents                 │
//! │ file/API │   │ Mistral │   │  regex   │   │ enrich ▸ offer ▸ email │
//! └──────────┘   └─────────┘   └──────────┘   └───────────┬────────────┘
//!                                                          ▼
//!                      ┌──────────┐                  ┌──────────┐
//!                      │ CLI/HTTP │◀─────────────────│  SQLite  │
//!                      │ browsing │                  │  leads   │
//!                      └──────────┘                  └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! card init                               # create database
//! card scan card.jpg --qualification hot  # process one card
//! card scan-dir ./cards --recursive       # process a folder
//! card leads list                         # browse leads
//! card serve                              # start HTTP API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`image`] | Image loading and type detection |
//! | [`ocr`] | OCR provider abstraction (Mistral OCR) |
//! | [`fields`] | Regex contact field parser |
//! | [`llm`] | Chat completion client with rate-limit retry |
//! | [`search`] | Web search tool for the enrichment agent |
//! | [`prompts`] | Agent prompt templates |
//! | [`agents`] | Enrichment, offer matching and email drafting |
//! | [`pipeline`] | Stage orchestration for one card |
//! | [`progress`] | Stage progress on stderr |
//! | [`scan`] | `scan`, `scan-dir` and `ocr` commands |
//! | [`leads`] | Lead store and `leads` commands |
//! | [`export`] | JSON/CSV export |
//! | [`stats`] | Lead statistics |
//! | [`server`] | JSON HTTP API |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod agents;
pub mod config;
pub mod db;
pub mod export;
pub mod fields;
pub mod image;
pub mod leads;
pub mod llm;
pub mod migrate;
pub mod models;
pub mod ocr;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod scan;
pub mod search;
pub mod server;
pub mod stats;
