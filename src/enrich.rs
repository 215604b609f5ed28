//! Optional enrichment of records from a bibliographic lookup service.
//!
//! Three passes run over the working set, all sharing one [`RateLimiter`]:
//!
//! 1. records with a DOI but no PMID: search `"{doi}[doi]"`;
//! 2. records with a PMCID but no PMID: search `"{pmcid}[pmcid]"`;
//! 3. one bulk fetch of every PMID, merging identifiers, journal names and
//!    abstracts back into every record that carries the PMID.
//!
//! A search only counts when it returns exactly one id. Running [`enrich`]
//! again on its own output leaves the records unchanged.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::error::{MigrationError, Result};
use crate::models::BibliographicRecord;
use crate::progress::{MigrationEvent, ProgressReporter};

pub const DEFAULT_REQUESTS_PER_SECOND: u32 = 3;
/// NCBI's ceiling for clients; no setting may exceed it.
pub const MAX_REQUESTS_PER_SECOND: u32 = 3;
/// Shortest gap between two lookups: one third of a second, rounded up.
pub const MIN_INTERVAL: Duration = Duration::from_nanos(333_333_334);
/// Hard cap on ids in one fetch request.
pub const MAX_FETCH_IDS: usize = 10_000;

/// Spaces calls so that each starts at least `min_interval` after the
/// previous one completed. The interval never drops below [`MIN_INTERVAL`].
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    last_completed: Option<Instant>,
}

impl RateLimiter {
    /// `requests` is clamped to `1..=MAX_REQUESTS_PER_SECOND`.
    pub fn per_second(requests: u32) -> Self {
        let requests = u64::from(requests.clamp(1, MAX_REQUESTS_PER_SECOND));
        Self::with_interval(Duration::from_nanos(1_000_000_000u64.div_ceil(requests)))
    }

    pub fn with_interval(min_interval: Duration) -> Self {
        Self {
            min_interval: min_interval.max(MIN_INTERVAL),
            last_completed: None,
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Sleep until the next call is allowed.
    pub async fn wait(&mut self) {
        if let Some(last) = self.last_completed {
            let elapsed = last.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
    }

    pub fn mark_completed(&mut self) {
        self.last_completed = Some(Instant::now());
    }

    /// Run `call` inside the rate limit.
    pub async fn run<F, T>(&mut self, call: F) -> T
    where
        F: Future<Output = T>,
    {
        self.wait().await;
        let out = call.await;
        self.mark_completed();
        out
    }
}

/// Fields the bulk fetch may overwrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum EnrichField {
    /// Journal title and abbreviation.
    Journal,
    Abstract,
}

/// What the lookup service knows about one article.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArticleDetails {
    pub pmid: String,
    pub doi: Option<String>,
    pub pmcid: Option<String>,
    pub journal_title: Option<String>,
    pub journal_abbreviation: Option<String>,
    pub abstract_text: Option<String>,
}

/// A bibliographic search-and-fetch service keyed by PMID.
#[async_trait]
pub trait LookupService: Send + Sync {
    /// PMIDs matching a search term.
    async fn search(&self, term: &str) -> Result<Vec<String>>;

    /// Details for each of `pmids`. Unknown ids are simply absent.
    async fn fetch(&self, pmids: &[String]) -> Result<Vec<ArticleDetails>>;
}

#[derive(Debug, Clone)]
pub struct EnrichOptions {
    pub fields: Vec<EnrichField>,
    pub max_fetch_ids: usize,
}

impl Default for EnrichOptions {
    fn default() -> Self {
        Self {
            fields: vec![EnrichField::Journal, EnrichField::Abstract],
            max_fetch_ids: MAX_FETCH_IDS,
        }
    }
}

impl EnrichOptions {
    fn wants(&self, field: EnrichField) -> bool {
        self.fields.contains(&field)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnrichmentReport {
    pub doi_searches: usize,
    pub pmcid_searches: usize,
    pub pmids_from_doi: usize,
    pub pmids_from_pmcid: usize,
    pub articles_fetched: usize,
    pub records_updated: usize,
    /// Source ids of records that had no PMID before enrichment.
    pub gained_pmid: Vec<String>,
}

#[derive(Clone, Copy)]
enum IdSpace {
    Doi,
    Pmcid,
}

impl IdSpace {
    fn name(self) -> &'static str {
        match self {
            IdSpace::Doi => "doi",
            IdSpace::Pmcid => "pmcid",
        }
    }

    fn value(self, record: &BibliographicRecord) -> Option<&str> {
        match self {
            IdSpace::Doi => record.identifiers.doi.as_deref(),
            IdSpace::Pmcid => record.identifiers.pmcid.as_deref(),
        }
    }
}

/// Backfill identifiers and requested fields in place.
pub async fn enrich(
    records: &mut [BibliographicRecord],
    lookup: &dyn LookupService,
    limiter: &mut RateLimiter,
    options: &EnrichOptions,
    progress: &dyn ProgressReporter,
) -> Result<EnrichmentReport> {
    let mut report = EnrichmentReport::default();
    let had_pmid: HashSet<String> = records
        .iter()
        .filter(|r| r.identifiers.pmid.is_some())
        .map(|r| r.source_id.clone())
        .collect();

    let (searches, found) =
        resolve_missing_pmids(records, IdSpace::Doi, lookup, limiter, progress).await?;
    report.doi_searches = searches;
    report.pmids_from_doi = found;

    let (searches, found) =
        resolve_missing_pmids(records, IdSpace::Pmcid, lookup, limiter, progress).await?;
    report.pmcid_searches = searches;
    report.pmids_from_pmcid = found;

    let mut pmids: Vec<String> = Vec::new();
    let mut seen = HashSet::new();
    for pmid in records.iter().filter_map(|r| r.identifiers.pmid.as_deref()) {
        if seen.insert(pmid) {
            pmids.push(pmid.to_string());
        }
    }

    if !pmids.is_empty() {
        if pmids.len() > options.max_fetch_ids {
            return Err(MigrationError::Configuration(format!(
                "{} PMIDs exceed the fetch limit of {}",
                pmids.len(),
                options.max_fetch_ids
            )));
        }
        let articles = limiter.run(lookup.fetch(&pmids)).await?;
        report.articles_fetched = articles.len();
        progress.report(MigrationEvent::Looking {
            pass: "fetch",
            n: 1,
            total: 1,
        });

        let mut by_pmid: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, record) in records.iter().enumerate() {
            if let Some(pmid) = &record.identifiers.pmid {
                by_pmid.entry(pmid.clone()).or_default().push(i);
            }
        }
        let mut updated = HashSet::new();
        for article in &articles {
            for &i in by_pmid.get(&article.pmid).into_iter().flatten() {
                if merge_article(&mut records[i], article, options) {
                    updated.insert(i);
                }
            }
        }
        report.records_updated = updated.len();
    }

    report.gained_pmid = records
        .iter()
        .filter(|r| r.identifiers.pmid.is_some() && !had_pmid.contains(&r.source_id))
        .map(|r| r.source_id.clone())
        .collect();

    info!(
        doi_searches = report.doi_searches,
        pmcid_searches = report.pmcid_searches,
        gained_pmid = report.gained_pmid.len(),
        articles = report.articles_fetched,
        updated = report.records_updated,
        "enrichment finished"
    );
    Ok(report)
}

/// Search each distinct identifier of records lacking a PMID, once.
///
/// Returns the number of searches made and of records that gained a PMID.
async fn resolve_missing_pmids(
    records: &mut [BibliographicRecord],
    space: IdSpace,
    lookup: &dyn LookupService,
    limiter: &mut RateLimiter,
    progress: &dyn ProgressReporter,
) -> Result<(usize, usize)> {
    let mut terms: Vec<String> = Vec::new();
    for record in records.iter().filter(|r| r.identifiers.pmid.is_none()) {
        if let Some(value) = space.value(record) {
            if !terms.iter().any(|t| t == value) {
                terms.push(value.to_string());
            }
        }
    }

    let total = terms.len() as u64;
    let mut resolved: HashMap<String, String> = HashMap::new();
    for (n, value) in terms.iter().enumerate() {
        let term = format!("{}[{}]", value, space.name());
        let hits = limiter.run(lookup.search(&term)).await?;
        match hits.as_slice() {
            [pmid] => {
                resolved.insert(value.clone(), pmid.clone());
            }
            _ => debug!(%term, hits = hits.len(), "no unique match"),
        }
        progress.report(MigrationEvent::Looking {
            pass: space.name(),
            n: n as u64 + 1,
            total,
        });
    }

    let mut found = 0;
    for record in records.iter_mut().filter(|r| r.identifiers.pmid.is_none()) {
        let pmid = space.value(record).and_then(|v| resolved.get(v)).cloned();
        if let Some(pmid) = pmid {
            record.identifiers.pmid = Some(pmid);
            found += 1;
        }
    }
    Ok((terms.len(), found))
}

/// Returns whether anything changed.
fn merge_article(
    record: &mut BibliographicRecord,
    article: &ArticleDetails,
    options: &EnrichOptions,
) -> bool {
    let before = record.clone();

    if record.identifiers.doi.is_none() {
        record.identifiers.doi = article.doi.clone();
    }
    if record.identifiers.pmcid.is_none() {
        record.identifiers.pmcid = article.pmcid.clone();
    }
    if options.wants(EnrichField::Journal) {
        if let Some(title) = &article.journal_title {
            record.publication_title = Some(title.clone());
        }
        if let Some(abbreviation) = &article.journal_abbreviation {
            record.journal_abbreviation = Some(abbreviation.clone());
        }
    }
    if options.wants(EnrichField::Abstract) {
        if let Some(text) = &article.abstract_text {
            record.abstract_note = Some(text.clone());
        }
    }

    *record != before
}
