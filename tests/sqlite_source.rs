mod common;

use passport::models::{Node, PUBMED_PROVIDER};
use passport::source::{load_records, SourceRepository, SqliteSource};
use passport::MigrationError;
use tempfile::TempDir;

async fn open_fixture() -> (TempDir, SqliteSource) {
    let tmp = TempDir::new().unwrap();
    let db_path = common::build_papers_library(tmp.path()).await;
    let source = SqliteSource::open(&db_path, None).await.unwrap();
    (tmp, source)
}

#[tokio::test]
async fn test_root_and_collections() {
    let (_tmp, source) = open_fixture().await;

    assert_eq!(source.root_collection_id().await.unwrap().as_deref(), Some("ROOT"));
    let collections = source.collections().await.unwrap();
    assert_eq!(
        collections,
        vec![
            Node::new("c-bio", "Biology", Some("ROOT")),
            Node::new("c-gen", "Genetics", Some("c-bio")),
            Node::new("c-read", "Reading", Some("ROOT")),
        ]
    );
}

#[tokio::test]
async fn test_publications_exclude_bundles_and_private() {
    let (_tmp, source) = open_fixture().await;

    let publications = source.publications(None).await.unwrap();
    let ids: Vec<&str> = publications.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, vec!["p-one", "p-two"]);

    let one = &publications[0];
    assert_eq!(one.journal_title.as_deref(), Some("Journal of Things"));
    assert_eq!(one.journal_abbreviation.as_deref(), Some("J Things"));
    // stored as an integer, read as text
    assert_eq!(one.volume.as_deref(), Some("12"));
    assert_eq!(one.imported_date, 1_500_000_000);
    assert_eq!(one.notes.as_deref(), Some("Read this\nsoon"));

    let limited = source.publications(Some(1)).await.unwrap();
    assert_eq!(limited.len(), 1);
}

#[tokio::test]
async fn test_dependent_rows() {
    let (_tmp, source) = open_fixture().await;

    let authors = source.authors("p-one").await.unwrap();
    let names: Vec<_> = authors
        .iter()
        .map(|a| a.last_name.clone().unwrap_or_default())
        .collect();
    // byline order by priority, editors (type 1) excluded
    assert_eq!(names, vec!["Doe", "Roe"]);

    assert_eq!(source.keywords("p-one").await.unwrap(), vec!["genomics"]);
    assert!(source.keywords("p-two").await.unwrap().is_empty());

    assert_eq!(
        source.memberships("p-one").await.unwrap(),
        vec![Some("c-gen".to_string())]
    );
    assert_eq!(source.memberships("p-two").await.unwrap(), vec![None]);

    let events = source.sync_events("p-one").await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].provider, PUBMED_PROVIDER);
    assert_eq!(events[0].remote_id, "123");
}

#[tokio::test]
async fn test_pdfs_and_attachment_root() {
    let (tmp, source) = open_fixture().await;

    let pdfs = source.pdfs().await.unwrap();
    let paths: Vec<&str> = pdfs.iter().map(|p| p.path.as_str()).collect();
    assert_eq!(paths, vec!["Files/one.pdf", "Files/two.pdf"]);
    assert_eq!(source.attachments_root(), Some(tmp.path()));
}

#[tokio::test]
async fn test_load_records_assembles_rows() {
    let (_tmp, source) = open_fixture().await;

    let records = load_records(&source, None).await.unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].authors.len(), 2);
    assert_eq!(records[0].keywords, vec!["genomics"]);
    assert_eq!(records[1].memberships, vec![None]);
}

#[tokio::test]
async fn test_missing_database_is_configuration_error() {
    let tmp = TempDir::new().unwrap();
    let err = SqliteSource::open(&tmp.path().join("nope.papersdb"), None)
        .await
        .err()
        .unwrap();
    assert!(matches!(err, MigrationError::Configuration(_)));
}
