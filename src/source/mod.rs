//! Read access to the library being migrated.
//!
//! [`SourceRepository`] exposes the handful of typed row queries the
//! migration needs. [`load_records`] assembles them into one
//! [`SourceRecord`] per publication.
//!
//! | Type | Backing |
//! |------|---------|
//! | [`SqliteSource`] | a Papers 3 `Database.papersdb`, opened read-only |
//! | [`InMemorySource`] | plain vectors, for tests |

mod memory;
mod sqlite;

use std::path::Path;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Node, SourceAuthor, SourcePdf, SourcePublication, SourceRecord, SyncEvent};

pub use memory::InMemorySource;
pub use sqlite::SqliteSource;

#[async_trait]
pub trait SourceRepository: Send + Sync {
    /// Id of the library's own top-level container, if it has one.
    async fn root_collection_id(&self) -> Result<Option<String>>;

    /// User-created collections, in no particular order.
    async fn collections(&self) -> Result<Vec<Node>>;

    /// Migratable publications, at most `limit` of them.
    async fn publications(&self, limit: Option<usize>) -> Result<Vec<SourcePublication>>;

    /// Authors of a publication in byline order.
    async fn authors(&self, publication_id: &str) -> Result<Vec<SourceAuthor>>;

    async fn keywords(&self, publication_id: &str) -> Result<Vec<String>>;

    /// Collection memberships; `None` for a membership whose collection is
    /// gone.
    async fn memberships(&self, publication_id: &str) -> Result<Vec<Option<String>>>;

    /// PubMed and PubMed Central identifiers.
    async fn sync_events(&self, publication_id: &str) -> Result<Vec<SyncEvent>>;

    async fn pdfs(&self) -> Result<Vec<SourcePdf>>;

    /// Directory that [`SourcePdf::path`] is relative to.
    fn attachments_root(&self) -> Option<&Path>;
}

/// Load every publication together with its dependent rows.
pub async fn load_records(
    source: &dyn SourceRepository,
    limit: Option<usize>,
) -> Result<Vec<SourceRecord>> {
    let publications = source.publications(limit).await?;
    let mut records = Vec::with_capacity(publications.len());

    for publication in publications {
        let id = publication.id.as_str();
        let authors = source.authors(id).await?;
        let sync_events = source.sync_events(id).await?;
        let keywords = source.keywords(id).await?;
        let memberships = source.memberships(id).await?;
        records.push(SourceRecord {
            publication,
            authors,
            sync_events,
            keywords,
            memberships,
        });
    }

    tracing::debug!(count = records.len(), "loaded source records");
    Ok(records)
}
