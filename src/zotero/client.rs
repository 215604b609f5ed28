//! HTTP client for the Zotero Web API v3.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use super::{DestinationApi, Endpoint, WriteResponse};
use crate::error::{MigrationError, Result};

const API_VERSION: &str = "3";
const PAGE_SIZE: usize = 100;

/// What an API key is allowed to do, as reported by `GET /keys/{key}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyAccess {
    pub user_id: u64,
    pub username: Option<String>,
    pub library: bool,
    pub write: bool,
    pub notes: bool,
    pub files: bool,
}

impl KeyAccess {
    /// Reading the personal library and writing to it are both required.
    pub fn can_migrate(&self) -> bool {
        self.library && self.write
    }
}

#[derive(Deserialize)]
struct KeyResponse {
    #[serde(rename = "userID")]
    user_id: u64,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    access: AccessBlock,
}

#[derive(Deserialize, Default)]
struct AccessBlock {
    #[serde(default)]
    user: UserAccess,
}

#[derive(Deserialize, Default)]
struct UserAccess {
    #[serde(default)]
    library: bool,
    #[serde(default)]
    write: bool,
    #[serde(default)]
    notes: bool,
    #[serde(default)]
    files: bool,
}

#[derive(Deserialize)]
struct CollectionEntry {
    data: CollectionData,
}

#[derive(Deserialize)]
struct CollectionData {
    name: String,
}

fn build_http(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| MigrationError::Configuration(format!("cannot build HTTP client: {e}")))
}

/// Turn a non-2xx response into [`MigrationError::Transport`].
async fn ensure_success(url: &str, resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(MigrationError::Transport {
        url: url.to_string(),
        status: Some(status.as_u16()),
        message: if body.is_empty() {
            status.to_string()
        } else {
            body
        },
    })
}

/// Look up what `token` may do.
///
/// A 403 or 404 from the key endpoint means the key does not exist and is
/// reported as [`MigrationError::Auth`].
pub async fn check_access(api_url: &str, token: &str, timeout: Duration) -> Result<KeyAccess> {
    let http = build_http(timeout)?;
    let url = format!("{}/keys/{}", api_url.trim_end_matches('/'), token);
    let resp = http
        .get(&url)
        .header("Zotero-API-Version", API_VERSION)
        .send()
        .await
        .map_err(|e| MigrationError::transport(&url, e))?;

    if matches!(resp.status().as_u16(), 403 | 404) {
        return Err(MigrationError::Auth("API key is not valid".to_string()));
    }
    let resp = ensure_success(&url, resp).await?;
    let key: KeyResponse = resp
        .json()
        .await
        .map_err(|e| MigrationError::Parse(format!("key response: {e}")))?;

    Ok(KeyAccess {
        user_id: key.user_id,
        username: key.username,
        library: key.access.user.library,
        write: key.access.user.write,
        notes: key.access.user.notes,
        files: key.access.user.files,
    })
}

/// Authenticated client bound to one user library.
pub struct ZoteroClient {
    http: Client,
    base_url: String,
    token: String,
    user_id: u64,
}

impl ZoteroClient {
    /// Validate `token` and bind to its user library.
    ///
    /// Fails with [`MigrationError::Auth`] before any write when the key
    /// lacks library or write access.
    pub async fn connect(api_url: &str, token: &str, timeout: Duration) -> Result<Self> {
        let access = check_access(api_url, token, timeout).await?;
        if !access.library {
            return Err(MigrationError::Auth(
                "API key has no access to the personal library".to_string(),
            ));
        }
        if !access.write {
            return Err(MigrationError::Auth("API key is read-only".to_string()));
        }
        info!(user_id = access.user_id, "authenticated with destination");

        Ok(Self {
            http: build_http(timeout)?,
            base_url: api_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            user_id: access.user_id,
        })
    }

    pub fn user_id(&self) -> u64 {
        self.user_id
    }

    fn user_url(&self, path: &str) -> String {
        format!("{}/users/{}/{}", self.base_url, self.user_id, path)
    }

    fn authorized(&self, req: RequestBuilder) -> RequestBuilder {
        req.header("Zotero-API-Key", &self.token)
            .header("Zotero-API-Version", API_VERSION)
    }
}

#[async_trait]
impl DestinationApi for ZoteroClient {
    async fn top_level_collection_names(&self) -> Result<Vec<String>> {
        let url = self.user_url("collections/top");
        let mut names = Vec::new();
        let mut start = 0usize;

        loop {
            let resp = self
                .authorized(self.http.get(&url))
                .query(&[("limit", PAGE_SIZE), ("start", start)])
                .send()
                .await
                .map_err(|e| MigrationError::transport(&url, e))?;
            let resp = ensure_success(&url, resp).await?;
            let page: Vec<CollectionEntry> = resp
                .json()
                .await
                .map_err(|e| MigrationError::Parse(format!("collection list: {e}")))?;

            let count = page.len();
            names.extend(page.into_iter().map(|c| c.data.name));
            if count < PAGE_SIZE {
                break;
            }
            start += count;
        }

        debug!(count = names.len(), "listed top-level collections");
        Ok(names)
    }

    async fn write(&self, endpoint: Endpoint, objects: &[Value]) -> Result<WriteResponse> {
        let url = self.user_url(endpoint.as_str());
        let resp = self
            .authorized(self.http.post(&url))
            .json(objects)
            .send()
            .await
            .map_err(|e| MigrationError::transport(&url, e))?;
        let resp = ensure_success(&url, resp).await?;
        resp.json()
            .await
            .map_err(|e| MigrationError::Parse(format!("{endpoint} write response: {e}")))
    }
}
