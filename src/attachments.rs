//! Imported-file (PDF) attachments.
//!
//! A PDF row becomes an attachment only when its owner item was uploaded
//! and the file is present on disk. Once the destination has assigned the
//! attachment a key, the file is copied to `{storage_dir}/storage/{key}/`,
//! where the Zotero client expects stored files.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::Result;
use crate::id_map::IdMap;
use crate::models::SourcePdf;
use crate::payload::{ImportedFilePayload, Pending};
use crate::transform::format_date_added;

/// A PDF ready for upload, with the file it was built from.
#[derive(Debug, Clone, PartialEq)]
pub struct PdfAttachment {
    pub source_path: PathBuf,
    pub pending: Pending<ImportedFilePayload>,
}

/// Build attachments for every PDF whose owner was uploaded and whose file
/// exists under `root`.
pub fn collect_pdf_attachments(
    pdfs: &[SourcePdf],
    root: Option<&Path>,
    items: &IdMap,
) -> Vec<PdfAttachment> {
    let Some(root) = root else {
        if !pdfs.is_empty() {
            warn!(count = pdfs.len(), "no attachment root configured, skipping PDFs");
        }
        return Vec::new();
    };

    let mut attachments = Vec::new();
    for pdf in pdfs {
        if !items.contains(&pdf.owner_id) {
            continue;
        }
        let source_path = root.join(&pdf.path);
        if !source_path.is_file() {
            debug!(path = %source_path.display(), "PDF missing on disk, skipped");
            continue;
        }
        let Some(filename) = source_path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            continue;
        };
        attachments.push(PdfAttachment {
            pending: Pending::new(
                pdf.owner_id.as_str(),
                ImportedFilePayload::pdf(filename, format_date_added(pdf.created_at)),
            ),
            source_path,
        });
    }
    attachments
}

/// Copy `source` into the storage folder of attachment `key`.
pub fn copy_into_storage(source: &Path, storage_dir: &Path, key: &str) -> Result<PathBuf> {
    let dir = storage_dir.join("storage").join(key);
    std::fs::create_dir_all(&dir)?;
    let file_name = source.file_name().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("{} has no file name", source.display()),
        )
    })?;
    let target = dir.join(file_name);
    std::fs::copy(source, &target)?;
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pdf(path: &str, owner: &str) -> SourcePdf {
        SourcePdf {
            path: path.to_string(),
            owner_id: owner.to_string(),
            created_at: 0,
        }
    }

    #[test]
    fn test_collect_filters_missing_owner_and_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("Files/A")).unwrap();
        std::fs::write(dir.path().join("Files/A/paper.pdf"), b"%PDF-1.4").unwrap();

        let mut items = IdMap::new();
        items.insert("p1", "ITEM0001").unwrap();

        let pdfs = vec![
            pdf("Files/A/paper.pdf", "p1"),
            pdf("Files/A/paper.pdf", "not-uploaded"),
            pdf("Files/A/missing.pdf", "p1"),
        ];
        let found = collect_pdf_attachments(&pdfs, Some(dir.path()), &items);

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].pending.parent_source_id, "p1");
        assert_eq!(found[0].pending.child.filename, "paper.pdf");
        assert_eq!(
            found[0].pending.child.date_added.as_deref(),
            Some("1970-01-01T00:00:00Z")
        );
    }

    #[test]
    fn test_no_root_means_no_attachments() {
        let mut items = IdMap::new();
        items.insert("p1", "ITEM0001").unwrap();
        assert!(collect_pdf_attachments(&[pdf("a.pdf", "p1")], None, &items).is_empty());
    }

    #[test]
    fn test_copy_into_storage() {
        let src_dir = tempfile::tempdir().unwrap();
        let source = src_dir.path().join("paper.pdf");
        std::fs::write(&source, b"%PDF-1.4").unwrap();
        let storage = tempfile::tempdir().unwrap();

        let target = copy_into_storage(&source, storage.path(), "ATTACH01").unwrap();

        assert_eq!(target, storage.path().join("storage/ATTACH01/paper.pdf"));
        assert_eq!(std::fs::read(&target).unwrap(), b"%PDF-1.4");
    }
}
