//! [`SourceRepository`] over a Papers 3 `Database.papersdb`.
//!
//! Text-like columns are `CAST` in SQL because Papers stores some of them
//! (volume, issue, pages) as integers on some rows.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use super::SourceRepository;
use crate::db;
use crate::error::Result;
use crate::models::{
    Node, SourceAuthor, SourcePdf, SourcePublication, SyncEvent, PMC_PROVIDER, PUBMED_PROVIDER,
};

pub struct SqliteSource {
    pool: SqlitePool,
    attachments_root: Option<PathBuf>,
}

impl SqliteSource {
    pub fn new(pool: SqlitePool, attachments_root: Option<PathBuf>) -> Self {
        Self {
            pool,
            attachments_root,
        }
    }

    /// Open `database` read-only. Attachments are resolved against
    /// `attachments_root`, or the database's directory when not given.
    pub async fn open(database: &Path, attachments_root: Option<PathBuf>) -> Result<Self> {
        let pool = db::connect_read_only(database).await?;
        let root = attachments_root.or_else(|| database.parent().map(Path::to_path_buf));
        Ok(Self::new(pool, root))
    }
}

#[async_trait]
impl SourceRepository for SqliteSource {
    async fn root_collection_id(&self) -> Result<Option<String>> {
        let row = sqlx::query(
            "SELECT uuid FROM Collection WHERE editable = 0 AND name = 'COLLECTIONS' LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(match row {
            Some(row) => row.try_get("uuid")?,
            None => None,
        })
    }

    async fn collections(&self) -> Result<Vec<Node>> {
        let rows = sqlx::query(
            "SELECT uuid, CAST(name AS TEXT) AS name, parent \
             FROM Collection WHERE editable = 1 ORDER BY ROWID",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut nodes = Vec::with_capacity(rows.len());
        for row in &rows {
            nodes.push(Node {
                source_id: row.try_get("uuid")?,
                name: row.try_get::<Option<String>, _>("name")?.unwrap_or_default(),
                parent_source_id: row.try_get("parent")?,
            });
        }
        Ok(nodes)
    }

    async fn publications(&self, limit: Option<usize>) -> Result<Vec<SourcePublication>> {
        let limit = limit.map(|n| n as i64).unwrap_or(-1);
        let rows = sqlx::query(
            "SELECT a.uuid AS uuid, \
                    CAST(a.title AS TEXT) AS title, \
                    CAST(b.title AS TEXT) AS journal_title, \
                    CAST(b.abbreviation AS TEXT) AS journal_abbreviation, \
                    CAST(a.volume AS TEXT) AS volume, \
                    CAST(a.number AS TEXT) AS number, \
                    CAST(a.startpage AS TEXT) AS startpage, \
                    CAST(a.endpage AS TEXT) AS endpage, \
                    CAST(a.publication_date AS TEXT) AS publication_date, \
                    CAST(a.language AS TEXT) AS language, \
                    CAST(a.doi AS TEXT) AS doi, \
                    COALESCE(CAST(a.imported_date AS INTEGER), 0) AS imported_date, \
                    CAST(a.notes AS TEXT) AS notes \
             FROM Publication a, Publication b \
             WHERE a.bundle = b.uuid AND a.type >= 0 AND a.privacy_level = 0 \
             ORDER BY a.ROWID \
             LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut publications = Vec::with_capacity(rows.len());
        for row in &rows {
            publications.push(SourcePublication {
                id: row.try_get("uuid")?,
                title: row.try_get("title")?,
                journal_title: row.try_get("journal_title")?,
                journal_abbreviation: row.try_get("journal_abbreviation")?,
                volume: row.try_get("volume")?,
                number: row.try_get("number")?,
                start_page: row.try_get("startpage")?,
                end_page: row.try_get("endpage")?,
                publication_date: row.try_get("publication_date")?,
                language: row.try_get("language")?,
                doi: row.try_get("doi")?,
                imported_date: row.try_get("imported_date")?,
                notes: row.try_get("notes")?,
            });
        }
        Ok(publications)
    }

    async fn authors(&self, publication_id: &str) -> Result<Vec<SourceAuthor>> {
        let rows = sqlx::query(
            "SELECT CAST(Author.prename AS TEXT) AS prename, \
                    CAST(Author.surname AS TEXT) AS surname \
             FROM OrderedAuthor \
             LEFT JOIN Author ON OrderedAuthor.author_id = Author.uuid \
             WHERE OrderedAuthor.object_id = ? AND OrderedAuthor.type = 0 \
             ORDER BY OrderedAuthor.priority",
        )
        .bind(publication_id)
        .fetch_all(&self.pool)
        .await?;

        let mut authors = Vec::with_capacity(rows.len());
        for row in &rows {
            authors.push(SourceAuthor {
                first_name: row.try_get("prename")?,
                last_name: row.try_get("surname")?,
            });
        }
        Ok(authors)
    }

    async fn keywords(&self, publication_id: &str) -> Result<Vec<String>> {
        let rows = sqlx::query(
            "SELECT CAST(Keyword.name AS TEXT) AS name \
             FROM KeywordItem \
             LEFT JOIN Keyword ON KeywordItem.keyword_id = Keyword.uuid \
             WHERE KeywordItem.object_id = ? AND KeywordItem.type = 99",
        )
        .bind(publication_id)
        .fetch_all(&self.pool)
        .await?;

        let mut keywords = Vec::with_capacity(rows.len());
        for row in &rows {
            if let Some(name) = row.try_get::<Option<String>, _>("name")? {
                keywords.push(name);
            }
        }
        Ok(keywords)
    }

    async fn memberships(&self, publication_id: &str) -> Result<Vec<Option<String>>> {
        let rows = sqlx::query(
            "SELECT Collection.uuid AS uuid \
             FROM CollectionItem \
             LEFT JOIN Collection ON CollectionItem.collection = Collection.uuid \
             WHERE CollectionItem.object_id = ?",
        )
        .bind(publication_id)
        .fetch_all(&self.pool)
        .await?;

        let mut memberships = Vec::with_capacity(rows.len());
        for row in &rows {
            memberships.push(row.try_get::<Option<String>, _>("uuid")?);
        }
        Ok(memberships)
    }

    async fn sync_events(&self, publication_id: &str) -> Result<Vec<SyncEvent>> {
        let rows = sqlx::query(
            "SELECT CAST(remote_id AS TEXT) AS remote_id, source_id \
             FROM SyncEvent \
             WHERE device_id = ? AND subtype = 0 AND source_id IN (?, ?)",
        )
        .bind(publication_id)
        .bind(PUBMED_PROVIDER)
        .bind(PMC_PROVIDER)
        .fetch_all(&self.pool)
        .await?;

        let mut events = Vec::with_capacity(rows.len());
        for row in &rows {
            if let Some(remote_id) = row.try_get::<Option<String>, _>("remote_id")? {
                events.push(SyncEvent {
                    provider: row.try_get("source_id")?,
                    remote_id,
                });
            }
        }
        Ok(events)
    }

    async fn pdfs(&self) -> Result<Vec<SourcePdf>> {
        let rows = sqlx::query(
            "SELECT CAST(path AS TEXT) AS path, object_id, \
                    COALESCE(CAST(created_at AS INTEGER), 0) AS created_at \
             FROM PDF \
             WHERE type = 0 AND mime_type = 'application/pdf' \
             ORDER BY ROWID",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut pdfs = Vec::with_capacity(rows.len());
        for row in &rows {
            let path: Option<String> = row.try_get("path")?;
            let owner: Option<String> = row.try_get("object_id")?;
            if let (Some(path), Some(owner_id)) = (path, owner) {
                pdfs.push(SourcePdf {
                    path,
                    owner_id,
                    created_at: row.try_get("created_at")?,
                });
            }
        }
        Ok(pdfs)
    }

    fn attachments_root(&self) -> Option<&Path> {
        self.attachments_root.as_deref()
    }
}
