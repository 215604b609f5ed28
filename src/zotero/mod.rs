//! Destination API abstraction.
//!
//! The migration engine talks to the destination through the
//! [`DestinationApi`] trait: one call to list the names of existing
//! top-level collections, and one bulk write per endpoint. Two
//! implementations are provided:
//!
//! | Type | Backing |
//! |------|---------|
//! | [`ZoteroClient`] | Zotero Web API v3 over HTTPS |
//! | [`InMemoryDestination`] | in-process fake used by tests and `plan` |

mod client;
mod memory;

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::error::Result;

pub use client::{check_access, KeyAccess, ZoteroClient};
pub use memory::{InMemoryDestination, WriteCall};

/// Largest number of objects the write endpoints accept per request.
pub const MAX_BATCH_SIZE: usize = 50;

/// Create endpoint under `/users/{id}/`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Collections,
    Items,
}

impl Endpoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Endpoint::Collections => "collections",
            Endpoint::Items => "items",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-object rejection reported by a write call.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FailedWrite {
    #[serde(default)]
    pub code: Option<u16>,
    #[serde(default)]
    pub message: String,
}

/// Body of a successful (2xx) write call. Keys are the object's position in
/// the request array, as decimal strings.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct WriteResponse {
    #[serde(default)]
    pub success: BTreeMap<String, String>,
    #[serde(default)]
    pub failed: BTreeMap<String, FailedWrite>,
}

impl WriteResponse {
    /// Response accepting every object, each under the given key.
    pub fn accepted<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        Self {
            success: keys
                .into_iter()
                .enumerate()
                .map(|(i, k)| (i.to_string(), k.into()))
                .collect(),
            failed: BTreeMap::new(),
        }
    }
}

/// Remote side of a migration.
#[async_trait]
pub trait DestinationApi: Send + Sync {
    /// Names of every collection directly under the library root.
    async fn top_level_collection_names(&self) -> Result<Vec<String>>;

    /// Create up to [`MAX_BATCH_SIZE`] objects in one request.
    async fn write(&self, endpoint: Endpoint, objects: &[Value]) -> Result<WriteResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_response_parses_zotero_body() {
        let body = r#"{
            "successful": {"0": {"key": "AAAA1111"}},
            "success": {"0": "AAAA1111"},
            "unchanged": {},
            "failed": {"1": {"key": "", "code": 400, "message": "Invalid field"}}
        }"#;
        let resp: WriteResponse = serde_json::from_str(body).unwrap();
        assert_eq!(resp.success.get("0").map(String::as_str), Some("AAAA1111"));
        let failed = &resp.failed["1"];
        assert_eq!(failed.code, Some(400));
        assert_eq!(failed.message, "Invalid field");
    }

    #[test]
    fn test_accepted_numbers_from_zero() {
        let resp = WriteResponse::accepted(["A", "B"]);
        assert_eq!(resp.success["0"], "A");
        assert_eq!(resp.success["1"], "B");
        assert!(resp.failed.is_empty());
    }
}
