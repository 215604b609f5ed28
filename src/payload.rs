//! Wire payloads for collections and dependent child items.
//!
//! Children (notes, linked URLs, imported files) are created in a later
//! upload pass than their parent item, so they start life as a
//! [`Pending`] that only knows the parent's source id. [`Pending::resolve`]
//! looks the parent up in the item [`IdMap`] and yields an immutable
//! [`Resolved`] carrying the server key as `parentItem`.

use serde::Serialize;

use crate::error::{MigrationError, Result};
use crate::id_map::IdMap;
use crate::models::{Relations, Tag};

/// `{"name", "parentCollection"}` for the collections endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionPayload {
    pub name: String,
    /// Zotero expects `false` for a top-level collection.
    #[serde(serialize_with = "parent_or_false")]
    pub parent_collection: Option<String>,
}

impl CollectionPayload {
    pub fn new(name: impl Into<String>, parent_collection: Option<String>) -> Self {
        Self {
            name: name.into(),
            parent_collection,
        }
    }
}

fn parent_or_false<S: serde::Serializer>(
    parent: &Option<String>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    match parent {
        Some(key) => serializer.serialize_str(key),
        None => serializer.serialize_bool(false),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotePayload {
    item_type: &'static str,
    pub note: String,
    tags: Vec<Tag>,
    collections: Vec<String>,
    relations: Relations,
}

impl NotePayload {
    /// Wrap free text as note HTML: markup is escaped and line breaks
    /// become `<br/>`.
    pub fn from_text(text: &str) -> Self {
        let escaped = quick_xml::escape::escape(text);
        let note = escaped
            .replace("\r\n", "<br/>")
            .replace(['\n', '\r'], "<br/>");
        Self {
            item_type: "note",
            note,
            tags: Vec::new(),
            collections: Vec::new(),
            relations: Relations::default(),
        }
    }
}

/// A `linked_url` attachment, used for PubMed entry links.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkedUrlPayload {
    item_type: &'static str,
    link_mode: &'static str,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_date: Option<String>,
    pub url: String,
    note: String,
    content_type: &'static str,
    charset: String,
    tags: Vec<Tag>,
    collections: Vec<String>,
    relations: Relations,
}

impl LinkedUrlPayload {
    pub fn html(title: impl Into<String>, url: impl Into<String>, access_date: Option<String>) -> Self {
        Self {
            item_type: "attachment",
            link_mode: "linked_url",
            title: title.into(),
            access_date,
            url: url.into(),
            note: String::new(),
            content_type: "text/html",
            charset: String::new(),
            tags: Vec::new(),
            collections: Vec::new(),
            relations: Relations::default(),
        }
    }
}

/// An `imported_file` attachment. The file itself is copied into the
/// destination's storage directory once the server has assigned a key.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportedFilePayload {
    item_type: &'static str,
    link_mode: &'static str,
    pub title: String,
    pub content_type: String,
    pub filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_added: Option<String>,
    tags: Vec<Tag>,
    relations: Relations,
}

impl ImportedFilePayload {
    pub fn pdf(filename: impl Into<String>, date_added: Option<String>) -> Self {
        let filename = filename.into();
        Self {
            item_type: "attachment",
            link_mode: "imported_file",
            title: filename.clone(),
            content_type: "application/pdf".to_string(),
            filename,
            date_added,
            tags: Vec::new(),
            relations: Relations::default(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Deferred parent references
// ═══════════════════════════════════════════════════════════════════════

/// A child whose parent item has not been uploaded yet.
#[derive(Debug, Clone, PartialEq)]
pub struct Pending<T> {
    pub parent_source_id: String,
    pub child: T,
}

impl<T: Clone> Pending<T> {
    pub fn new(parent_source_id: impl Into<String>, child: T) -> Self {
        Self {
            parent_source_id: parent_source_id.into(),
            child,
        }
    }

    /// Attach the parent's server key.
    ///
    /// Fails with [`MigrationError::UnresolvedParent`] when the parent was
    /// never uploaded.
    pub fn resolve(&self, items: &IdMap) -> Result<Resolved<T>> {
        let parent_item = items
            .get(&self.parent_source_id)
            .ok_or_else(|| MigrationError::UnresolvedParent(self.parent_source_id.clone()))?;
        Ok(Resolved {
            child: self.child.clone(),
            parent_item: parent_item.to_string(),
        })
    }
}

/// A child payload bound to its parent's server key.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Resolved<T> {
    #[serde(flatten)]
    child: T,
    parent_item: String,
}

impl<T> Resolved<T> {
    pub fn child(&self) -> &T {
        &self.child
    }

    pub fn parent_item(&self) -> &str {
        &self.parent_item
    }
}
