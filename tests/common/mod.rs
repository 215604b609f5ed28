//! Builds a small Papers 3 database for the integration tests.
//!
//! Layout:
//!
//! ```text
//! COLLECTIONS (root)
//! ├── Biology        c-bio
//! │   └── Genetics   c-gen
//! └── Reading        c-read
//! ```
//!
//! Publications: `p-one` (in Genetics, PMID 123, note, PDF on disk),
//! `p-two` (membership to a deleted collection), `p-private` (excluded),
//! plus the journal bundle `j-things`.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};

const SCHEMA: &[&str] = &[
    "CREATE TABLE Collection (uuid TEXT, name TEXT, parent TEXT, editable INTEGER)",
    "CREATE TABLE Publication (uuid TEXT, title TEXT, bundle TEXT, type INTEGER, \
        privacy_level INTEGER, abbreviation TEXT, volume, number, startpage, endpage, \
        publication_date TEXT, language TEXT, doi TEXT, imported_date REAL, notes TEXT)",
    "CREATE TABLE Author (uuid TEXT, prename TEXT, surname TEXT)",
    "CREATE TABLE OrderedAuthor (object_id TEXT, author_id TEXT, type INTEGER, priority INTEGER)",
    "CREATE TABLE SyncEvent (device_id TEXT, remote_id TEXT, source_id TEXT, subtype INTEGER)",
    "CREATE TABLE Keyword (uuid TEXT, name TEXT)",
    "CREATE TABLE KeywordItem (object_id TEXT, keyword_id TEXT, type INTEGER)",
    "CREATE TABLE CollectionItem (object_id TEXT, collection TEXT)",
    "CREATE TABLE PDF (path TEXT, object_id TEXT, created_at REAL, type INTEGER, mime_type TEXT)",
];

const ROWS: &[&str] = &[
    "INSERT INTO Collection VALUES ('ROOT', 'COLLECTIONS', NULL, 0)",
    "INSERT INTO Collection VALUES ('c-bio', 'Biology', 'ROOT', 1)",
    "INSERT INTO Collection VALUES ('c-gen', 'Genetics', 'c-bio', 1)",
    "INSERT INTO Collection VALUES ('c-read', 'Reading', 'ROOT', 1)",
    "INSERT INTO Publication (uuid, title, type, privacy_level, abbreviation) \
        VALUES ('j-things', 'Journal of Things', -100, 0, 'J Things')",
    "INSERT INTO Publication VALUES ('p-one', 'Paper One', 'j-things', 0, 0, NULL, 12, 3, \
        '100', '110', '99202005000000000000222000', 'en', '10.1/one', 1500000000.0, 'Read this\nsoon')",
    "INSERT INTO Publication VALUES ('p-two', 'Paper Two', 'j-things', 0, 0, NULL, NULL, NULL, \
        '7', NULL, '99199900000000000000222000', NULL, NULL, 1500000100.0, NULL)",
    "INSERT INTO Publication VALUES ('p-private', 'Secret', 'j-things', 0, 1, NULL, NULL, NULL, \
        NULL, NULL, NULL, NULL, NULL, 0, NULL)",
    "INSERT INTO Author VALUES ('a-1', 'J K', 'Doe')",
    "INSERT INTO Author VALUES ('a-2', 'Ann', 'Roe')",
    "INSERT INTO OrderedAuthor VALUES ('p-one', 'a-2', 0, 1)",
    "INSERT INTO OrderedAuthor VALUES ('p-one', 'a-1', 0, 0)",
    "INSERT INTO OrderedAuthor VALUES ('p-one', 'a-1', 1, 2)",
    "INSERT INTO SyncEvent VALUES ('p-one', '123', 'gov.nih.nlm.ncbi.pubmed', 0)",
    "INSERT INTO SyncEvent VALUES ('p-one', 'x', 'com.example.other', 0)",
    "INSERT INTO Keyword VALUES ('k-1', 'genomics')",
    "INSERT INTO KeywordItem VALUES ('p-one', 'k-1', 99)",
    "INSERT INTO KeywordItem VALUES ('p-two', 'k-1', 1)",
    "INSERT INTO CollectionItem VALUES ('p-one', 'c-gen')",
    "INSERT INTO CollectionItem VALUES ('p-two', 'c-deleted')",
    "INSERT INTO PDF VALUES ('Files/one.pdf', 'p-one', 1500000000.0, 0, 'application/pdf')",
    "INSERT INTO PDF VALUES ('Files/two.pdf', 'p-two', 1500000000.0, 0, 'application/pdf')",
    "INSERT INTO PDF VALUES ('Files/one.png', 'p-one', 1500000000.0, 0, 'image/png')",
];

/// Create `Database.papersdb` and `Files/one.pdf` under `dir`.
///
/// `Files/two.pdf` is referenced but deliberately not written.
pub async fn build_papers_library(dir: &Path) -> PathBuf {
    let db_path = dir.join("Database.papersdb");
    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))
        .unwrap()
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Delete);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .unwrap();

    for statement in SCHEMA.iter().chain(ROWS) {
        sqlx::query(statement).execute(&pool).await.unwrap();
    }
    pool.close().await;

    std::fs::create_dir_all(dir.join("Files")).unwrap();
    std::fs::write(dir.join("Files/one.pdf"), b"%PDF-1.4 one").unwrap();

    db_path
}
