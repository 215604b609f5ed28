//! Core data models used throughout passport.
//!
//! Two families of types live here: rows read from the Papers library
//! (`Source*`, [`Node`]) and the normalized [`BibliographicRecord`] that the
//! transformer builds from them and the uploader serializes for Zotero.

use std::fmt;

use serde::Serialize;

/// Sync-event provider id for PubMed identifiers.
pub const PUBMED_PROVIDER: &str = "gov.nih.nlm.ncbi.pubmed";
/// Sync-event provider id for PubMed Central identifiers.
pub const PMC_PROVIDER: &str = "gov.nih.nlm.ncbi.pmc";

/// One collection in the source hierarchy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub source_id: String,
    pub name: String,
    /// `None` means "directly under the import root".
    pub parent_source_id: Option<String>,
}

impl Node {
    pub fn new(source_id: &str, name: &str, parent_source_id: Option<&str>) -> Self {
        Self {
            source_id: source_id.to_string(),
            name: name.to_string(),
            parent_source_id: parent_source_id.map(str::to_string),
        }
    }
}

/// A publication row joined with its bundle (journal).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourcePublication {
    pub id: String,
    pub title: Option<String>,
    pub journal_title: Option<String>,
    pub journal_abbreviation: Option<String>,
    pub volume: Option<String>,
    pub number: Option<String>,
    pub start_page: Option<String>,
    pub end_page: Option<String>,
    /// Raw Papers date string; characters 2..10 hold `YYYYMMDD`.
    pub publication_date: Option<String>,
    pub language: Option<String>,
    pub doi: Option<String>,
    /// Seconds since the Unix epoch.
    pub imported_date: i64,
    pub notes: Option<String>,
}

/// An author in publication order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceAuthor {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// External identifier recorded by a Papers sync event.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncEvent {
    pub provider: String,
    pub remote_id: String,
}

/// A PDF stored in the Papers library.
#[derive(Debug, Clone, PartialEq)]
pub struct SourcePdf {
    /// Path relative to the library's attachment root.
    pub path: String,
    /// Source id of the owning publication.
    pub owner_id: String,
    /// Seconds since the Unix epoch.
    pub created_at: i64,
}

/// Everything the transformer needs to know about one publication.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceRecord {
    pub publication: SourcePublication,
    pub authors: Vec<SourceAuthor>,
    pub sync_events: Vec<SyncEvent>,
    pub keywords: Vec<String>,
    /// Collection ids the publication belongs to. `None` marks a membership
    /// whose collection row no longer exists.
    pub memberships: Vec<Option<String>>,
}

// ═══════════════════════════════════════════════════════════════════════
// Normalized record
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Creator {
    pub creator_type: &'static str,
    pub first_name: String,
    pub last_name: String,
}

impl Creator {
    pub fn author(first_name: String, last_name: String) -> Self {
        Self {
            creator_type: "author",
            first_name,
            last_name,
        }
    }
}

/// A Zotero tag. `type: 1` marks an automatic tag, which is how imported
/// keywords are shown.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tag {
    pub tag: String,
    #[serde(rename = "type")]
    pub kind: u8,
}

impl Tag {
    pub fn imported(tag: String) -> Self {
        Self { tag, kind: 1 }
    }
}

/// Publication date truncated to the precision the source actually knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublicationDate {
    Year(u16),
    YearMonth(u16, u8),
    YearMonthDay(u16, u8, u8),
}

impl fmt::Display for PublicationDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublicationDate::Year(y) => write!(f, "{:04}", y),
            PublicationDate::YearMonth(y, m) => write!(f, "{:04}-{:02}", y, m),
            PublicationDate::YearMonthDay(y, m, d) => write!(f, "{:04}-{:02}-{:02}", y, m, d),
        }
    }
}

/// Cross-reference identifiers of a record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Identifiers {
    pub doi: Option<String>,
    pub pmid: Option<String>,
    pub pmcid: Option<String>,
}

/// The normalized form of one publication, ready for upload.
///
/// Built once by [`crate::transform::transform`]; afterwards only the
/// enrichment pass touches it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BibliographicRecord {
    pub source_id: String,
    pub title: Option<String>,
    pub creators: Vec<Creator>,
    pub publication_title: Option<String>,
    pub journal_abbreviation: Option<String>,
    pub volume: Option<String>,
    pub issue: Option<String>,
    pub pages: Option<String>,
    pub date: Option<PublicationDate>,
    pub language: Option<String>,
    pub identifiers: Identifiers,
    pub abstract_note: Option<String>,
    pub tags: Vec<Tag>,
    pub collections: Vec<String>,
    pub date_added: Option<String>,
}

impl BibliographicRecord {
    /// `PMID: …` / `PMCID: …` lines for Zotero's free-text `extra` field.
    pub fn extra(&self) -> Option<String> {
        let mut lines = Vec::new();
        if let Some(pmid) = &self.identifiers.pmid {
            lines.push(format!("PMID: {}", pmid));
        }
        if let Some(pmcid) = &self.identifiers.pmcid {
            lines.push(format!("PMCID: {}", pmcid));
        }
        if lines.is_empty() {
            None
        } else {
            Some(lines.join("\n"))
        }
    }

    pub fn library_catalog(&self) -> Option<&'static str> {
        if self.identifiers.pmid.is_some() || self.identifiers.pmcid.is_some() {
            Some("PubMed")
        } else {
            None
        }
    }

    /// Borrowing view serialized as a Zotero `journalArticle`.
    pub fn payload(&self) -> ItemPayload<'_> {
        ItemPayload {
            item_type: "journalArticle",
            title: self.title.as_deref(),
            creators: &self.creators,
            publication_title: self.publication_title.as_deref(),
            journal_abbreviation: self.journal_abbreviation.as_deref(),
            volume: self.volume.as_deref(),
            issue: self.issue.as_deref(),
            pages: self.pages.as_deref(),
            date: self.date.map(|d| d.to_string()),
            language: self.language.as_deref(),
            doi: self.identifiers.doi.as_deref(),
            abstract_note: self.abstract_note.as_deref(),
            extra: self.extra(),
            library_catalog: self.library_catalog(),
            date_added: self.date_added.as_deref(),
            tags: &self.tags,
            collections: &self.collections,
            relations: Relations::default(),
        }
    }
}

/// Serializes as `{}`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Relations {}

fn is_empty_slice<T>(items: &&[T]) -> bool {
    items.is_empty()
}

/// Wire form of a [`BibliographicRecord`]. Absent fields are omitted rather
/// than sent as `null`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemPayload<'a> {
    item_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<&'a str>,
    #[serde(skip_serializing_if = "is_empty_slice")]
    creators: &'a [Creator],
    #[serde(skip_serializing_if = "Option::is_none")]
    publication_title: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    journal_abbreviation: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    volume: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    issue: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pages: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    language: Option<&'a str>,
    #[serde(rename = "DOI", skip_serializing_if = "Option::is_none")]
    doi: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    abstract_note: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    extra: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    library_catalog: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    date_added: Option<&'a str>,
    tags: &'a [Tag],
    collections: &'a [String],
    relations: Relations,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_publication_date_display() {
        assert_eq!(PublicationDate::Year(1999).to_string(), "1999");
        assert_eq!(PublicationDate::YearMonth(2020, 5).to_string(), "2020-05");
        assert_eq!(
            PublicationDate::YearMonthDay(2020, 5, 3).to_string(),
            "2020-05-03"
        );
    }

    #[test]
    fn test_payload_omits_absent_fields() {
        let record = BibliographicRecord {
            source_id: "p1".to_string(),
            title: Some("A title".to_string()),
            ..Default::default()
        };
        let value = serde_json::to_value(record.payload()).unwrap();
        assert_eq!(
            value,
            json!({
                "itemType": "journalArticle",
                "title": "A title",
                "tags": [],
                "collections": [],
                "relations": {}
            })
        );
    }

    #[test]
    fn test_payload_identifiers_render_extra() {
        let record = BibliographicRecord {
            identifiers: Identifiers {
                doi: Some("10.1000/xyz".to_string()),
                pmid: Some("123".to_string()),
                pmcid: Some("PMC9".to_string()),
            },
            date: Some(PublicationDate::YearMonth(2020, 5)),
            ..Default::default()
        };
        let value = serde_json::to_value(record.payload()).unwrap();
        assert_eq!(value["DOI"], "10.1000/xyz");
        assert_eq!(value["extra"], "PMID: 123\nPMCID: PMC9");
        assert_eq!(value["libraryCatalog"], "PubMed");
        assert_eq!(value["date"], "2020-05");
    }

    #[test]
    fn test_creator_and_tag_wire_format() {
        let creator = Creator::author("J. K.".to_string(), "Rowling".to_string());
        assert_eq!(
            serde_json::to_value(&creator).unwrap(),
            json!({"creatorType": "author", "firstName": "J. K.", "lastName": "Rowling"})
        );
        let tag = Tag::imported("genomics".to_string());
        assert_eq!(
            serde_json::to_value(&tag).unwrap(),
            json!({"tag": "genomics", "type": 1})
        );
    }
}
