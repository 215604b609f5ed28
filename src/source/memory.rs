//! In-memory [`SourceRepository`] built from plain vectors.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::SourceRepository;
use crate::error::Result;
use crate::models::{Node, SourceAuthor, SourcePdf, SourcePublication, SourceRecord, SyncEvent};

#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    pub root_id: Option<String>,
    pub collections: Vec<Node>,
    pub records: Vec<SourceRecord>,
    pub pdfs: Vec<SourcePdf>,
    pub attachments_root: Option<PathBuf>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, publication_id: &str) -> Option<&SourceRecord> {
        self.records
            .iter()
            .find(|r| r.publication.id == publication_id)
    }
}

#[async_trait]
impl SourceRepository for InMemorySource {
    async fn root_collection_id(&self) -> Result<Option<String>> {
        Ok(self.root_id.clone())
    }

    async fn collections(&self) -> Result<Vec<Node>> {
        Ok(self.collections.clone())
    }

    async fn publications(&self, limit: Option<usize>) -> Result<Vec<SourcePublication>> {
        Ok(self
            .records
            .iter()
            .take(limit.unwrap_or(usize::MAX))
            .map(|r| r.publication.clone())
            .collect())
    }

    async fn authors(&self, publication_id: &str) -> Result<Vec<SourceAuthor>> {
        Ok(self
            .record(publication_id)
            .map(|r| r.authors.clone())
            .unwrap_or_default())
    }

    async fn keywords(&self, publication_id: &str) -> Result<Vec<String>> {
        Ok(self
            .record(publication_id)
            .map(|r| r.keywords.clone())
            .unwrap_or_default())
    }

    async fn memberships(&self, publication_id: &str) -> Result<Vec<Option<String>>> {
        Ok(self
            .record(publication_id)
            .map(|r| r.memberships.clone())
            .unwrap_or_default())
    }

    async fn sync_events(&self, publication_id: &str) -> Result<Vec<SyncEvent>> {
        Ok(self
            .record(publication_id)
            .map(|r| r.sync_events.clone())
            .unwrap_or_default())
    }

    async fn pdfs(&self) -> Result<Vec<SourcePdf>> {
        Ok(self.pdfs.clone())
    }

    fn attachments_root(&self) -> Option<&Path> {
        self.attachments_root.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::load_records;

    #[tokio::test]
    async fn test_load_records_respects_limit() {
        let mut source = InMemorySource::new();
        for i in 0..3 {
            source.records.push(SourceRecord {
                publication: SourcePublication {
                    id: format!("p{i}"),
                    ..Default::default()
                },
                keywords: vec![format!("k{i}")],
                ..Default::default()
            });
        }

        let records = load_records(&source, Some(2)).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].keywords, vec!["k1".to_string()]);

        let all = load_records(&source, None).await.unwrap();
        assert_eq!(all, source.records);
    }
}
