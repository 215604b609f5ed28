//! # passport
//!
//! Migrates a Papers 3 library (collections, publications, notes, PubMed
//! links and PDFs) into a Zotero library through the Zotero Web API, with
//! optional backfill of identifiers, journal names and abstracts from
//! PubMed.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌─────────────┐   ┌──────────────┐
//! │ Papers 3 DB  │──▶│  Transform  │──▶│ Batch upload │──▶ Zotero Web API
//! │ (read-only)  │   │ (+ enrich)  │   │  (≤50/call)  │
//! └──────────────┘   └──────┬──────┘   └──────────────┘
//!                           │
//!                      ┌────▼─────┐
//!                      │  PubMed  │  (rate limited)
//!                      └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! passport --config passport.toml check
//! passport --config passport.toml plan
//! passport --config passport.toml migrate --enrich
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Error taxonomy |
//! | [`models`] | Source rows and the normalized record |
//! | [`payload`] | Child payloads and deferred parent resolution |
//! | [`id_map`] | Source id → server key table |
//! | [`batch`] | Chunked bulk upload |
//! | [`hierarchy`] | Collection tree replication |
//! | [`transform`] | Source record → destination record |
//! | [`enrich`] | Rate-limited PubMed enrichment |
//! | [`pubmed`] | NCBI E-utilities client |
//! | [`zotero`] | Destination API trait and clients |
//! | [`source`] | Source repository trait and backends |
//! | [`db`] | Read-only SQLite connection |
//! | [`attachments`] | PDF attachments and file copy |
//! | [`migrate`] | Stage orchestration and CLI entry points |
//! | [`progress`] | Progress reporting on stderr |

pub mod attachments;
pub mod batch;
pub mod config;
pub mod db;
pub mod enrich;
pub mod error;
pub mod hierarchy;
pub mod id_map;
pub mod migrate;
pub mod models;
pub mod payload;
pub mod progress;
pub mod pubmed;
pub mod source;
pub mod transform;
pub mod zotero;

pub use error::{MigrationError, Result};
