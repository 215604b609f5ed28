//! Error taxonomy for the migration engine.
//!
//! Every variant is fatal for the run that produced it: the engine performs
//! no retries and no compensating deletes. Writes already committed to the
//! destination stay there, so a rerun after a failure may duplicate records.

use thiserror::Error;

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, MigrationError>;

/// Errors raised while migrating a library.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// The API token is invalid or lacks library-read or write access.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// A remote call returned a non-2xx status or never completed.
    #[error("request to {url} failed{}: {message}", status.map(|s| format!(" with HTTP {s}")).unwrap_or_default())]
    Transport {
        url: String,
        status: Option<u16>,
        message: String,
    },

    /// The destination accepted a batch but rejected some of its records.
    ///
    /// `failed` holds global record indices and the server's message.
    #[error("{endpoint} upload rejected {} record(s), first at index {}: {}",
        failed.len(),
        failed.first().map(|(i, _)| *i).unwrap_or_default(),
        failed.first().map(|(_, m)| m.as_str()).unwrap_or_default())]
    PartialFailure {
        endpoint: String,
        failed: Vec<(usize, String)>,
    },

    /// The import root collection could not be created.
    #[error("could not create the import root collection: {0}")]
    RootCreation(String),

    /// Hierarchy replication stalled: these nodes have no reachable parent.
    #[error("{} collection(s) have no reachable parent: {}", ids.len(), ids.join(", "))]
    DanglingNodes { ids: Vec<String> },

    /// A source id was mapped twice to different server keys.
    #[error("source id {source_id} already maps to {existing}, refusing {attempted}")]
    IdConflict {
        source_id: String,
        existing: String,
        attempted: String,
    },

    /// A dependent child references a parent that was never uploaded.
    #[error("no uploaded parent item for source id {0}")]
    UnresolvedParent(String),

    /// Invalid configuration or a request that exceeds a hard service limit.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A remote response could not be understood.
    #[error("could not parse response: {0}")]
    Parse(String),

    #[error("source database error: {0}")]
    Source(#[from] sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MigrationError {
    /// Build a [`MigrationError::Transport`] from a `reqwest` failure.
    pub fn transport(url: impl Into<String>, err: reqwest::Error) -> Self {
        MigrationError::Transport {
            url: url.into(),
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }
}
