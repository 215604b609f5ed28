//! NCBI E-utilities client (PubMed).
//!
//! `esearch.fcgi` turns a search term into PMIDs (JSON), `efetch.fcgi`
//! returns PubMed XML for a list of PMIDs. The XML is walked with
//! `quick-xml`, tracking the element path so that identifiers of cited
//! references are not mistaken for the article's own.

use std::time::Duration;

use async_trait::async_trait;
use quick_xml::events::{BytesStart, Event};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::enrich::{ArticleDetails, LookupService};
use crate::error::{MigrationError, Result};

pub const DEFAULT_EUTILS_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";

#[derive(Deserialize)]
struct SearchResponse {
    esearchresult: SearchResult,
}

#[derive(Deserialize)]
struct SearchResult {
    #[serde(default)]
    idlist: Vec<String>,
    #[serde(rename = "ERROR", default)]
    error: Option<String>,
}

pub struct PubMedClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
}

impl PubMedClient {
    pub fn new(base_url: &str, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MigrationError::Configuration(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
        })
    }

    fn params<'a>(&'a self, extra: &[(&'a str, &'a str)]) -> Vec<(&'a str, &'a str)> {
        let mut params = vec![("db", "pubmed")];
        params.extend_from_slice(extra);
        if let Some(key) = &self.api_key {
            params.push(("api_key", key.as_str()));
        }
        params
    }
}

async fn ensure_success(url: &str, resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(MigrationError::Transport {
        url: url.to_string(),
        status: Some(status.as_u16()),
        message: body,
    })
}

#[async_trait]
impl LookupService for PubMedClient {
    async fn search(&self, term: &str) -> Result<Vec<String>> {
        let url = format!("{}/esearch.fcgi", self.base_url);
        let resp = self
            .http
            .get(&url)
            .query(&self.params(&[("term", term), ("retmode", "json")]))
            .send()
            .await
            .map_err(|e| MigrationError::transport(&url, e))?;
        let resp = ensure_success(&url, resp).await?;
        let body: SearchResponse = resp
            .json()
            .await
            .map_err(|e| MigrationError::Parse(format!("esearch response: {e}")))?;
        if let Some(error) = body.esearchresult.error {
            return Err(MigrationError::Parse(format!("esearch error: {error}")));
        }
        debug!(term, hits = body.esearchresult.idlist.len(), "esearch");
        Ok(body.esearchresult.idlist)
    }

    async fn fetch(&self, pmids: &[String]) -> Result<Vec<ArticleDetails>> {
        let url = format!("{}/efetch.fcgi", self.base_url);
        let ids = pmids.join(",");
        let resp = self
            .http
            .post(&url)
            .form(&self.params(&[("id", ids.as_str()), ("retmode", "xml")]))
            .send()
            .await
            .map_err(|e| MigrationError::transport(&url, e))?;
        let resp = ensure_success(&url, resp).await?;
        let xml = resp
            .text()
            .await
            .map_err(|e| MigrationError::transport(&url, e))?;
        let articles = parse_pubmed_xml(&xml)?;
        debug!(requested = pmids.len(), returned = articles.len(), "efetch");
        Ok(articles)
    }
}

fn attribute(e: &BytesStart<'_>, name: &[u8]) -> Option<String> {
    e.try_get_attribute(name)
        .ok()
        .flatten()
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

fn ends_with(path: &[String], suffix: &[&str]) -> bool {
    path.len() >= suffix.len()
        && path[path.len() - suffix.len()..]
            .iter()
            .zip(suffix)
            .all(|(a, b)| a == b)
}

/// Inside `Abstract/AbstractText`, including inline markup below it.
fn in_abstract_text(path: &[String]) -> bool {
    path.windows(2)
        .any(|w| w[0] == "Abstract" && w[1] == "AbstractText")
}

fn record_text(article: &mut ArticleDetails, path: &[String], id_type: Option<&str>, value: &str) {
    if value.is_empty() {
        return;
    }
    if ends_with(path, &["MedlineCitation", "PMID"]) {
        article.pmid = value.to_string();
    } else if ends_with(path, &["Journal", "Title"]) {
        article.journal_title = Some(value.to_string());
    } else if ends_with(path, &["Journal", "ISOAbbreviation"]) {
        article.journal_abbreviation = Some(value.to_string());
    } else if ends_with(path, &["PubmedData", "ArticleIdList", "ArticleId"]) {
        match id_type {
            Some("doi") => article.doi = Some(value.to_string()),
            Some("pmc") => article.pmcid = Some(value.to_string()),
            _ => {}
        }
    }
}

/// Parse a `PubmedArticleSet` document.
pub fn parse_pubmed_xml(xml: &str) -> Result<Vec<ArticleDetails>> {
    let mut reader = quick_xml::Reader::from_str(xml);
    reader.config_mut().trim_text(false);

    let mut articles = Vec::new();
    let mut current: Option<ArticleDetails> = None;
    let mut path: Vec<String> = Vec::new();
    let mut id_type: Option<String> = None;
    let mut sections: Vec<String> = Vec::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                match name.as_str() {
                    "PubmedArticle" => {
                        current = Some(ArticleDetails::default());
                        sections.clear();
                    }
                    "ArticleId" => id_type = attribute(&e, b"IdType"),
                    "AbstractText" if path.last().map(String::as_str) == Some("Abstract") => {
                        sections.push(
                            attribute(&e, b"Label")
                                .map(|label| format!("{label}: "))
                                .unwrap_or_default(),
                        );
                    }
                    _ => {}
                }
                path.push(name);
            }
            Ok(Event::Text(te)) => {
                if let Some(article) = current.as_mut() {
                    let text = te
                        .unescape()
                        .map_err(|e| MigrationError::Parse(format!("PubMed XML: {e}")))?;
                    if in_abstract_text(&path) {
                        if let Some(section) = sections.last_mut() {
                            section.push_str(&text);
                        }
                    } else {
                        record_text(article, &path, id_type.as_deref(), text.trim());
                    }
                }
            }
            Ok(Event::End(e)) => {
                if e.local_name().as_ref() == b"PubmedArticle" {
                    if let Some(mut article) = current.take() {
                        let joined = sections
                            .iter()
                            .map(|s| s.trim())
                            .filter(|s| !s.is_empty())
                            .collect::<Vec<_>>()
                            .join("\n");
                        if !joined.is_empty() {
                            article.abstract_text = Some(joined);
                        }
                        if !article.pmid.is_empty() {
                            articles.push(article);
                        }
                    }
                }
                path.pop();
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(MigrationError::Parse(format!(
                    "PubMed XML at byte {}: {e}",
                    reader.buffer_position()
                )))
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(articles)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" ?>
<!DOCTYPE PubmedArticleSet PUBLIC "-//NLM//DTD PubMedArticle, 1st January 2019//EN" "https://dtd.nlm.nih.gov/ncbi/pubmed/out/pubmed_190101.dtd">
<PubmedArticleSet>
  <PubmedArticle>
    <MedlineCitation Status="MEDLINE" Owner="NLM">
      <PMID Version="1">111</PMID>
      <Article PubModel="Print">
        <Journal>
          <Title>Journal of Testing &amp; Things</Title>
          <ISOAbbreviation>J Test Things</ISOAbbreviation>
        </Journal>
        <Abstract>
          <AbstractText Label="BACKGROUND">Cells <i>divide</i>.</AbstractText>
          <AbstractText Label="RESULTS">They did.</AbstractText>
        </Abstract>
      </Article>
      <CommentsCorrectionsList>
        <CommentsCorrections RefType="CommentIn"><PMID Version="1">999</PMID></CommentsCorrections>
      </CommentsCorrectionsList>
    </MedlineCitation>
    <PubmedData>
      <ArticleIdList>
        <ArticleId IdType="pubmed">111</ArticleId>
        <ArticleId IdType="doi">10.1/a</ArticleId>
        <ArticleId IdType="pmc">PMC11</ArticleId>
      </ArticleIdList>
      <ReferenceList>
        <Reference>
          <ArticleIdList><ArticleId IdType="doi">10.9/cited</ArticleId></ArticleIdList>
        </Reference>
      </ReferenceList>
    </PubmedData>
  </PubmedArticle>
  <PubmedArticle>
    <MedlineCitation>
      <PMID Version="1">222</PMID>
      <Article><Journal><Title>Cell</Title></Journal></Article>
    </MedlineCitation>
  </PubmedArticle>
</PubmedArticleSet>"#;

    #[test]
    fn test_parse_article_fields() {
        let articles = parse_pubmed_xml(SAMPLE).unwrap();
        assert_eq!(articles.len(), 2);

        let first = &articles[0];
        assert_eq!(first.pmid, "111");
        assert_eq!(first.journal_title.as_deref(), Some("Journal of Testing & Things"));
        assert_eq!(first.journal_abbreviation.as_deref(), Some("J Test Things"));
        assert_eq!(first.doi.as_deref(), Some("10.1/a"));
        assert_eq!(first.pmcid.as_deref(), Some("PMC11"));
        assert_eq!(
            first.abstract_text.as_deref(),
            Some("BACKGROUND: Cells divide.\nRESULTS: They did.")
        );

        let second = &articles[1];
        assert_eq!(second.pmid, "222");
        assert_eq!(second.journal_title.as_deref(), Some("Cell"));
        assert!(second.doi.is_none());
        assert!(second.abstract_text.is_none());
    }

    #[test]
    fn test_empty_set() {
        let articles = parse_pubmed_xml("<PubmedArticleSet></PubmedArticleSet>").unwrap();
        assert!(articles.is_empty());
    }

    #[test]
    fn test_malformed_xml_is_parse_error() {
        let err = parse_pubmed_xml("<PubmedArticleSet><PubmedArticle></Oops>").unwrap_err();
        assert!(matches!(err, MigrationError::Parse(_)));
    }
}
