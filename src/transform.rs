//! Pure conversion of source rows into destination records.
//!
//! [`transform`] never touches the network or the database: it takes one
//! [`SourceRecord`] plus the collection [`IdMap`] and returns the
//! [`BibliographicRecord`] together with its pending children.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use crate::id_map::{IdMap, ROOT_ALIAS};
use crate::models::{
    BibliographicRecord, Creator, Identifiers, PublicationDate, SourceAuthor, SourceRecord, Tag,
    PMC_PROVIDER, PUBMED_PROVIDER,
};
use crate::payload::{LinkedUrlPayload, NotePayload, Pending};

pub const PUBMED_ENTRY_URL: &str = "https://www.ncbi.nlm.nih.gov/pubmed/";
pub const PUBMED_ENTRY_TITLE: &str = "PubMed entry";

/// A record and the children that can only be uploaded after it.
#[derive(Debug, Clone, PartialEq)]
pub struct Transformed {
    pub item: BibliographicRecord,
    pub note: Option<Pending<NotePayload>>,
    pub links: Vec<Pending<LinkedUrlPayload>>,
}

pub fn transform(record: &SourceRecord, collections: &IdMap) -> Transformed {
    let publication = &record.publication;
    let date_added = format_date_added(publication.imported_date);
    let identifiers = identifiers(record);

    let item = BibliographicRecord {
        source_id: publication.id.clone(),
        title: present(&publication.title),
        creators: record.authors.iter().filter_map(creator).collect(),
        publication_title: present(&publication.journal_title),
        journal_abbreviation: present(&publication.journal_abbreviation),
        volume: present(&publication.volume),
        issue: present(&publication.number),
        pages: format_pages(
            publication.start_page.as_deref(),
            publication.end_page.as_deref(),
        ),
        date: publication
            .publication_date
            .as_deref()
            .and_then(parse_publication_date),
        language: present(&publication.language),
        identifiers,
        abstract_note: None,
        tags: tags(&record.keywords),
        collections: collection_keys(&publication.id, &record.memberships, collections),
        date_added,
    };

    let note = publication
        .notes
        .as_deref()
        .filter(|text| !text.trim().is_empty())
        .map(|text| Pending::new(publication.id.as_str(), NotePayload::from_text(text)));

    let links = item
        .identifiers
        .pmid
        .as_deref()
        .map(|pmid| pubmed_link_stub(&item.source_id, pmid, item.date_added.clone()))
        .into_iter()
        .collect();

    Transformed { item, note, links }
}

fn present(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|v| !v.is_empty()).cloned()
}

fn creator(author: &SourceAuthor) -> Option<Creator> {
    let first = author.first_name.as_deref().unwrap_or_default();
    let last = author.last_name.as_deref().unwrap_or_default();
    if first.is_empty() && last.is_empty() {
        return None;
    }
    Some(Creator::author(normalize_initials(first), last.to_string()))
}

fn identifiers(record: &SourceRecord) -> Identifiers {
    let mut ids = Identifiers {
        doi: present(&record.publication.doi),
        ..Default::default()
    };
    // first non-empty id per provider wins
    for event in &record.sync_events {
        let (slot, kind) = match event.provider.as_str() {
            PUBMED_PROVIDER => (&mut ids.pmid, "pmid"),
            PMC_PROVIDER => (&mut ids.pmcid, "pmcid"),
            _ => continue,
        };
        if event.remote_id.is_empty() {
            continue;
        }
        if let Some(kept) = slot.as_deref() {
            if kept != event.remote_id {
                debug!(
                    source_id = %record.publication.id,
                    kind,
                    kept,
                    ignored = %event.remote_id,
                    "extra sync identifier ignored"
                );
            }
        } else {
            *slot = Some(event.remote_id.clone());
        }
    }
    ids
}

fn tags(keywords: &[String]) -> Vec<Tag> {
    let mut seen = HashSet::new();
    keywords
        .iter()
        .filter(|k| !k.is_empty() && seen.insert(k.as_str()))
        .map(|k| Tag::imported(k.clone()))
        .collect()
}

/// Memberships whose collection is unknown land in the import root.
fn collection_keys(
    source_id: &str,
    memberships: &[Option<String>],
    collections: &IdMap,
) -> Vec<String> {
    let mut keys: Vec<String> = Vec::new();
    for membership in memberships {
        let known = membership.as_deref().and_then(|id| collections.get(id));
        if let (Some(id), None) = (membership.as_deref(), known) {
            debug!(
                source_id,
                collection = id,
                "membership to a collection that was not replicated, filed under the import root"
            );
        }
        let key = known.or_else(|| collections.get(ROOT_ALIAS));
        if let Some(key) = key {
            if !keys.iter().any(|k| k == key) {
                keys.push(key.to_string());
            }
        }
    }
    keys
}

fn initial_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"((?:^| )[A-Z])( |$)").expect("valid initial pattern"))
}

/// Put a period after every lone capital letter: `"J K"` becomes `"J. K."`.
pub fn normalize_initials(first_name: &str) -> String {
    let pattern = initial_pattern();
    let mut name = first_name.to_string();
    // adjacent initials share a space, so one pass only catches every other one
    while pattern.is_match(&name) {
        name = pattern.replace_all(&name, "$1.$2").into_owned();
    }
    name
}

pub fn format_pages(start: Option<&str>, end: Option<&str>) -> Option<String> {
    let start = start.filter(|s| !s.is_empty())?;
    match end.filter(|e| !e.is_empty()) {
        Some(end) => Some(format!("{}-{}", start, end)),
        None => Some(start.to_string()),
    }
}

/// Parse the `YYYYMMDD` digits at byte offset 2 of a Papers date string.
///
/// Zero components truncate the precision; a zero year, a short string or
/// non-digits mean the date is unknown.
pub fn parse_publication_date(raw: &str) -> Option<PublicationDate> {
    let digits = raw.get(2..10)?;
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let year: u16 = digits[0..4].parse().ok()?;
    let month: u8 = digits[4..6].parse().ok()?;
    let day: u8 = digits[6..8].parse().ok()?;

    match (year, month, day) {
        (0, _, _) => None,
        (y, 0, _) => Some(PublicationDate::Year(y)),
        (y, m, 0) => Some(PublicationDate::YearMonth(y, m)),
        (y, m, d) => Some(PublicationDate::YearMonthDay(y, m, d)),
    }
}

/// Epoch seconds as `YYYY-MM-DDTHH:MM:SSZ`.
pub fn format_date_added(epoch_secs: i64) -> Option<String> {
    chrono::DateTime::from_timestamp(epoch_secs, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
}

pub fn pubmed_link_stub(
    parent_source_id: &str,
    pmid: &str,
    access_date: Option<String>,
) -> Pending<LinkedUrlPayload> {
    Pending::new(
        parent_source_id,
        LinkedUrlPayload::html(
            PUBMED_ENTRY_TITLE,
            format!("{}{}", PUBMED_ENTRY_URL, pmid),
            access_date,
        ),
    )
}
