//! Migration orchestrator.
//!
//! Stages run strictly forward:
//!
//! ```text
//! Authenticate → ReplicateHierarchy → TransformAll → [Enrich] → UploadItems
//!   → UploadNotes → UploadLinkedAttachments → UploadFileAttachments → Done
//! ```
//!
//! The orchestrator owns every id map and the enrichment rate limiter and
//! lends them to the stages. Any error aborts the run; writes already
//! accepted by the destination are left in place.

use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result as AnyResult};
use chrono::Utc;
use tracing::{info, warn};

use crate::attachments::{collect_pdf_attachments, copy_into_storage};
use crate::batch::{BatchUploader, PartialFailurePolicy};
use crate::config::Config;
use crate::enrich::{enrich, EnrichField, EnrichOptions, EnrichmentReport, LookupService, RateLimiter};
use crate::error::{MigrationError, Result};
use crate::hierarchy::{replicate, unique_root_name};
use crate::id_map::IdMap;
use crate::models::BibliographicRecord;
use crate::payload::{Pending, Resolved};
use crate::progress::{format_number, MigrationEvent, ProgressMode, ProgressReporter};
use crate::pubmed::PubMedClient;
use crate::source::{load_records, SourceRepository, SqliteSource};
use crate::transform::{pubmed_link_stub, transform, Transformed};
use crate::zotero::{check_access, DestinationApi, Endpoint, InMemoryDestination, ZoteroClient};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Authenticate,
    ReplicateHierarchy,
    TransformAll,
    Enrich,
    UploadItems,
    UploadNotes,
    UploadLinkedAttachments,
    UploadFileAttachments,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Authenticate => "authenticate",
            Stage::ReplicateHierarchy => "collections",
            Stage::TransformAll => "transform",
            Stage::Enrich => "enrich",
            Stage::UploadItems => "items",
            Stage::UploadNotes => "notes",
            Stage::UploadLinkedAttachments => "links",
            Stage::UploadFileAttachments => "files",
            Stage::Done => "done",
        })
    }
}

/// Enrichment settings for one run.
#[derive(Debug, Clone)]
pub struct EnrichSettings {
    pub options: EnrichOptions,
    pub requests_per_second: u32,
}

#[derive(Debug, Clone)]
pub struct MigrationOptions {
    pub batch_size: usize,
    pub policy: PartialFailurePolicy,
    pub root_prefix: String,
    pub limit: Option<usize>,
    pub enrich: Option<EnrichSettings>,
    /// Zotero data directory that PDFs are copied into.
    pub storage_dir: Option<PathBuf>,
    /// Upload PDF attachments without copying files.
    pub dry_run: bool,
}

impl Default for MigrationOptions {
    fn default() -> Self {
        Self {
            batch_size: crate::zotero::MAX_BATCH_SIZE,
            policy: PartialFailurePolicy::Abort,
            root_prefix: crate::hierarchy::DEFAULT_ROOT_PREFIX.to_string(),
            limit: None,
            enrich: None,
            storage_dir: None,
            dry_run: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MigrationReport {
    pub root_name: String,
    pub root_key: String,
    pub collections: usize,
    pub items: usize,
    pub notes: usize,
    pub links: usize,
    pub files: usize,
    pub files_copied: usize,
    pub enrichment: Option<EnrichmentReport>,
    /// Records the destination rejected under the `continue` policy.
    pub rejected: usize,
    /// Children dropped because their parent item was rejected.
    pub skipped_children: usize,
}

impl fmt::Display for MigrationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let n = |v: usize| format_number(v as u64);
        writeln!(f, "root:         {} ({})", self.root_name, self.root_key)?;
        writeln!(f, "collections:  {}", n(self.collections))?;
        writeln!(f, "items:        {}", n(self.items))?;
        writeln!(f, "notes:        {}", n(self.notes))?;
        writeln!(f, "pubmed links: {}", n(self.links))?;
        write!(f, "pdfs:         {}", n(self.files))?;
        if self.files_copied != self.files {
            write!(f, " ({} copied)", n(self.files_copied))?;
        }
        if let Some(e) = &self.enrichment {
            write!(
                f,
                "\nenrichment:   {} PMIDs found, {} records updated",
                n(e.pmids_from_doi + e.pmids_from_pmcid),
                n(e.records_updated)
            )?;
        }
        if self.rejected > 0 || self.skipped_children > 0 {
            write!(
                f,
                "\nrejected:     {} records, {} children skipped",
                n(self.rejected),
                n(self.skipped_children)
            )?;
        }
        Ok(())
    }
}

fn started(progress: &dyn ProgressReporter, stage: Stage) {
    info!(%stage, "stage started");
    progress.report(MigrationEvent::StageStarted { stage });
}

fn finished(progress: &dyn ProgressReporter, stage: Stage, count: usize) {
    info!(%stage, count, "stage finished");
    progress.report(MigrationEvent::StageFinished {
        stage,
        count: count as u64,
    });
}

/// Bind pending children to their uploaded parents.
///
/// Under `continue` a missing parent was rejected earlier, so the child is
/// dropped and counted; under `abort` it is an error.
fn resolve_all<T: Clone>(
    pending: &[Pending<T>],
    items: &IdMap,
    policy: PartialFailurePolicy,
    skipped: &mut usize,
) -> Result<Vec<Resolved<T>>> {
    let mut resolved = Vec::with_capacity(pending.len());
    for child in pending {
        match child.resolve(items) {
            Ok(r) => resolved.push(r),
            Err(MigrationError::UnresolvedParent(id)) if policy == PartialFailurePolicy::Continue => {
                warn!(parent = %id, "parent item was rejected, child skipped");
                *skipped += 1;
            }
            Err(e) => return Err(e),
        }
    }
    Ok(resolved)
}

/// Run every stage after authentication against `dest`.
pub async fn run_migration(
    dest: &dyn DestinationApi,
    source: &dyn SourceRepository,
    lookup: Option<&dyn LookupService>,
    options: &MigrationOptions,
    progress: &dyn ProgressReporter,
) -> Result<MigrationReport> {
    let uploader = BatchUploader::new(dest, options.batch_size, options.policy)?;
    let mut report = MigrationReport::default();

    // ============ Hierarchy ============
    started(progress, Stage::ReplicateHierarchy);
    let existing = dest.top_level_collection_names().await?;
    let root_name = unique_root_name(&options.root_prefix, &existing, Utc::now).await;
    let root_source_id = source.root_collection_id().await?;
    let nodes = source.collections().await?;
    let collections = replicate(
        &uploader.reporting(progress, Stage::ReplicateHierarchy),
        &nodes,
        root_source_id.as_deref(),
        &root_name,
    )
    .await?;
    report.root_key = collections.root().unwrap_or_default().to_string();
    report.root_name = root_name;
    report.collections = nodes
        .iter()
        .filter(|n| collections.contains(&n.source_id))
        .count();
    finished(progress, Stage::ReplicateHierarchy, report.collections);

    // ============ Transform ============
    started(progress, Stage::TransformAll);
    let records = load_records(source, options.limit).await?;
    let mut items: Vec<BibliographicRecord> = Vec::with_capacity(records.len());
    let mut notes = Vec::new();
    let mut links = Vec::new();
    for record in &records {
        let Transformed {
            item,
            note,
            links: record_links,
        } = transform(record, &collections);
        items.push(item);
        notes.extend(note);
        links.extend(record_links);
    }
    finished(progress, Stage::TransformAll, items.len());

    // ============ Enrich ============
    if let (Some(lookup), Some(settings)) = (lookup, &options.enrich) {
        started(progress, Stage::Enrich);
        let mut limiter = RateLimiter::per_second(settings.requests_per_second);
        let summary = enrich(&mut items, lookup, &mut limiter, &settings.options, progress).await?;
        {
            let gained: HashSet<&str> = summary.gained_pmid.iter().map(String::as_str).collect();
            for item in items.iter().filter(|i| gained.contains(i.source_id.as_str())) {
                if let Some(pmid) = &item.identifiers.pmid {
                    links.push(pubmed_link_stub(&item.source_id, pmid, item.date_added.clone()));
                }
            }
        }
        finished(progress, Stage::Enrich, summary.records_updated);
        report.enrichment = Some(summary);
    }

    // ============ Items ============
    started(progress, Stage::UploadItems);
    let payloads: Vec<_> = items.iter().map(BibliographicRecord::payload).collect();
    let uploaded = uploader
        .reporting(progress, Stage::UploadItems)
        .upload(Endpoint::Items, &payloads)
        .await?;
    let mut item_map = IdMap::new();
    for (&index, key) in &uploaded.ids {
        item_map.insert(items[index].source_id.as_str(), key.as_str())?;
    }
    report.items = uploaded.ids.len();
    report.rejected += uploaded.failed.len();
    finished(progress, Stage::UploadItems, report.items);

    // ============ Notes ============
    started(progress, Stage::UploadNotes);
    let resolved = resolve_all(&notes, &item_map, options.policy, &mut report.skipped_children)?;
    let result = uploader
        .reporting(progress, Stage::UploadNotes)
        .upload(Endpoint::Items, &resolved)
        .await?;
    report.notes = result.ids.len();
    report.rejected += result.failed.len();
    finished(progress, Stage::UploadNotes, report.notes);

    // ============ PubMed links ============
    started(progress, Stage::UploadLinkedAttachments);
    let resolved = resolve_all(&links, &item_map, options.policy, &mut report.skipped_children)?;
    let result = uploader
        .reporting(progress, Stage::UploadLinkedAttachments)
        .upload(Endpoint::Items, &resolved)
        .await?;
    report.links = result.ids.len();
    report.rejected += result.failed.len();
    finished(progress, Stage::UploadLinkedAttachments, report.links);

    // ============ PDFs ============
    started(progress, Stage::UploadFileAttachments);
    if options.storage_dir.is_none() && !options.dry_run {
        warn!("no destination storage directory configured, PDFs are not migrated");
    } else {
        let pdfs = source.pdfs().await?;
        let attachments = collect_pdf_attachments(&pdfs, source.attachments_root(), &item_map);
        let pending: Vec<_> = attachments.iter().map(|a| a.pending.clone()).collect();
        // owners are filtered against the item map, so nothing is skipped here
        let resolved = resolve_all(&pending, &item_map, options.policy, &mut report.skipped_children)?;
        let result = uploader
            .reporting(progress, Stage::UploadFileAttachments)
            .upload(Endpoint::Items, &resolved)
            .await?;
        report.files = result.ids.len();
        report.rejected += result.failed.len();

        if let (Some(storage_dir), false) = (&options.storage_dir, options.dry_run) {
            for (&index, key) in &result.ids {
                let source_path = &attachments[index].source_path;
                copy_into_storage(source_path, storage_dir, key)?;
                report.files_copied += 1;
            }
        }
    }
    finished(progress, Stage::UploadFileAttachments, report.files);

    progress.report(MigrationEvent::StageStarted { stage: Stage::Done });
    info!(
        root = %report.root_name,
        items = report.items,
        notes = report.notes,
        links = report.links,
        files = report.files,
        "migration finished"
    );
    Ok(report)
}

// ═══════════════════════════════════════════════════════════════════════
// CLI entry points
// ═══════════════════════════════════════════════════════════════════════

fn resolve_token(token: Option<String>) -> AnyResult<String> {
    token
        .or_else(|| std::env::var("ZOTERO_API_KEY").ok())
        .filter(|t| !t.trim().is_empty())
        .context("no API key: pass --token or set ZOTERO_API_KEY")
}

fn options_from_config(config: &Config, limit: Option<usize>) -> MigrationOptions {
    MigrationOptions {
        batch_size: config.upload.batch_size,
        policy: config.upload.on_partial_failure,
        root_prefix: config.destination.root_prefix.clone(),
        limit,
        enrich: None,
        storage_dir: config.destination.storage_dir.clone(),
        dry_run: false,
    }
}

async fn open_source(config: &Config) -> AnyResult<SqliteSource> {
    SqliteSource::open(
        &config.source.database,
        config.source.attachments_root.clone(),
    )
    .await
    .with_context(|| format!("Failed to open {}", config.source.database.display()))
}

/// `passport check`: validate the key and print what it may do.
pub async fn run_check(config: &Config, token: Option<String>) -> AnyResult<()> {
    let token = resolve_token(token)?;
    let access = check_access(
        &config.destination.api_url,
        &token,
        Duration::from_secs(config.upload.timeout_secs),
    )
    .await?;

    println!("user id:  {}", access.user_id);
    if let Some(name) = &access.username {
        println!("username: {}", name);
    }
    println!("library:  {}", access.library);
    println!("write:    {}", access.write);
    println!("notes:    {}", access.notes);
    println!("files:    {}", access.files);
    if !access.can_migrate() {
        anyhow::bail!("this key cannot be used for a migration: library and write access are required");
    }
    println!("ok");
    Ok(())
}

/// `passport plan`: run the whole pipeline against an in-memory destination.
pub async fn run_plan(config: &Config, limit: Option<usize>) -> AnyResult<()> {
    let source = open_source(config).await?;
    let dest = InMemoryDestination::new();
    let mut options = options_from_config(config, limit);
    options.dry_run = true;

    let report = run_migration(&dest, &source, None, &options, &crate::progress::NoProgress)
        .await
        .context("Migration plan failed")?;

    println!("{}", report);
    println!("(dry run: nothing was written)");
    Ok(())
}

/// Arguments of `passport migrate`.
#[derive(Debug, Clone)]
pub struct MigrateArgs {
    pub token: Option<String>,
    pub enrich: bool,
    pub fields: Option<Vec<EnrichField>>,
    pub limit: Option<usize>,
    pub progress: ProgressMode,
}

/// `passport migrate`: the full run.
pub async fn run_migrate(config: &Config, args: MigrateArgs) -> AnyResult<()> {
    let progress = args.progress.reporter();
    let token = resolve_token(args.token)?;
    let timeout = Duration::from_secs(config.upload.timeout_secs);

    let mut options = options_from_config(config, args.limit);
    let pubmed = if args.enrich {
        options.enrich = Some(EnrichSettings {
            options: EnrichOptions {
                fields: args
                    .fields
                    .unwrap_or_else(|| config.enrichment.fields.clone()),
                max_fetch_ids: config.enrichment.max_fetch_ids,
            },
            requests_per_second: config.enrichment.requests_per_second,
        });
        Some(PubMedClient::new(
            &config.enrichment.api_url,
            std::env::var("NCBI_API_KEY").ok(),
            timeout,
        )?)
    } else {
        None
    };

    started(progress.as_ref(), Stage::Authenticate);
    let client = ZoteroClient::connect(&config.destination.api_url, &token, timeout)
        .await
        .context("Authentication failed")?;
    finished(progress.as_ref(), Stage::Authenticate, 1);

    let source = open_source(config).await?;
    let report = run_migration(
        &client,
        &source,
        pubmed.as_ref().map(|p| p as &dyn LookupService),
        &options,
        progress.as_ref(),
    )
    .await
    .context("Migration failed")?;

    println!("{}", report);
    println!("ok");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_names() {
        assert_eq!(Stage::ReplicateHierarchy.to_string(), "collections");
        assert_eq!(Stage::UploadLinkedAttachments.to_string(), "links");
    }

    #[test]
    fn test_report_display() {
        let report = MigrationReport {
            root_name: "passport-import_2024-01-01T00:00:00".to_string(),
            root_key: "ROOT".to_string(),
            collections: 3,
            items: 1200,
            files: 2,
            files_copied: 2,
            ..Default::default()
        };
        let text = report.to_string();
        assert!(text.contains("passport-import_2024-01-01T00:00:00 (ROOT)"));
        assert!(text.contains("items:        1,200"));
        assert!(!text.contains("rejected"));
    }

    #[test]
    fn test_explicit_token_wins() {
        assert_eq!(resolve_token(Some("abc".to_string())).unwrap(), "abc");
    }
}
