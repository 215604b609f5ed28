//! Chunked bulk upload with global index tracking.
//!
//! [`BatchUploader::upload`] splits an ordered slice of records into
//! consecutive chunks of at most `batch_size`, writes each chunk with one
//! call, and translates the chunk-local indices of the response back to
//! positions in the original slice:
//!
//! ```text
//! global index = chunk number * batch_size + local index
//! ```
//!
//! Chunks are sent one at a time, in order. Callers only ever see global
//! indices.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{MigrationError, Result};
use crate::migrate::Stage;
use crate::progress::{MigrationEvent, NoProgress, ProgressReporter};
use crate::zotero::{DestinationApi, Endpoint, MAX_BATCH_SIZE};

/// What to do when the destination rejects part of a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PartialFailurePolicy {
    /// Raise [`MigrationError::PartialFailure`] after the offending chunk.
    #[default]
    Abort,
    /// Log the rejection, record it in [`BatchResult::failed`] and go on.
    Continue,
}

/// Outcome of one [`BatchUploader::upload`] call, keyed by global index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchResult {
    pub ids: BTreeMap<usize, String>,
    pub failed: BTreeMap<usize, String>,
}

impl BatchResult {
    pub fn key(&self, index: usize) -> Option<&str> {
        self.ids.get(&index).map(String::as_str)
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

static NO_PROGRESS: NoProgress = NoProgress;

/// Sends records to one create endpoint in fixed-size chunks.
#[derive(Clone, Copy)]
pub struct BatchUploader<'a> {
    api: &'a dyn DestinationApi,
    batch_size: usize,
    policy: PartialFailurePolicy,
    progress: &'a dyn ProgressReporter,
    stage: Option<Stage>,
}

impl<'a> BatchUploader<'a> {
    /// `batch_size` must be between 1 and [`MAX_BATCH_SIZE`].
    pub fn new(
        api: &'a dyn DestinationApi,
        batch_size: usize,
        policy: PartialFailurePolicy,
    ) -> Result<Self> {
        if batch_size == 0 || batch_size > MAX_BATCH_SIZE {
            return Err(MigrationError::Configuration(format!(
                "batch size must be between 1 and {MAX_BATCH_SIZE}, got {batch_size}"
            )));
        }
        Ok(Self {
            api,
            batch_size,
            policy,
            progress: &NO_PROGRESS,
            stage: None,
        })
    }

    /// Report per-chunk progress for `stage` to `progress`.
    pub fn reporting(self, progress: &'a dyn ProgressReporter, stage: Stage) -> Self {
        Self {
            progress,
            stage: Some(stage),
            ..self
        }
    }

    pub fn policy(&self) -> PartialFailurePolicy {
        self.policy
    }

    pub async fn upload<T: Serialize>(&self, endpoint: Endpoint, records: &[T]) -> Result<BatchResult> {
        let mut result = BatchResult::default();
        let total = records.len() as u64;

        for (chunk_no, chunk) in records.chunks(self.batch_size).enumerate() {
            let offset = chunk_no * self.batch_size;
            let objects = chunk
                .iter()
                .map(serde_json::to_value)
                .collect::<std::result::Result<Vec<Value>, _>>()?;

            let response = self.api.write(endpoint, &objects).await?;

            let mut chunk_failed = Vec::new();
            for (local, key) in response.success {
                let global = offset + local_index(&local, chunk.len())?;
                result.ids.insert(global, key);
            }
            for (local, failure) in response.failed {
                let global = offset + local_index(&local, chunk.len())?;
                chunk_failed.push((global, failure.message));
            }
            for global in offset..offset + chunk.len() {
                let reported = result.ids.contains_key(&global)
                    || chunk_failed.iter().any(|(i, _)| *i == global);
                if !reported {
                    chunk_failed.push((global, "no result reported for this object".to_string()));
                }
            }
            chunk_failed.sort_by_key(|(i, _)| *i);

            debug!(
                %endpoint,
                chunk = chunk_no,
                offset,
                size = chunk.len(),
                failed = chunk_failed.len(),
                "batch written"
            );

            if let Some(stage) = self.stage {
                self.progress.report(MigrationEvent::Uploading {
                    stage,
                    n: (offset + chunk.len()) as u64,
                    total,
                });
            }

            if chunk_failed.is_empty() {
                continue;
            }
            match self.policy {
                PartialFailurePolicy::Abort => {
                    return Err(MigrationError::PartialFailure {
                        endpoint: endpoint.to_string(),
                        failed: chunk_failed,
                    });
                }
                PartialFailurePolicy::Continue => {
                    warn!(
                        %endpoint,
                        rejected = chunk_failed.len(),
                        first_index = chunk_failed[0].0,
                        message = %chunk_failed[0].1,
                        "destination rejected records, continuing"
                    );
                    result.failed.extend(chunk_failed);
                }
            }
        }

        Ok(result)
    }
}

fn local_index(raw: &str, chunk_len: usize) -> Result<usize> {
    let index: usize = raw
        .parse()
        .map_err(|_| MigrationError::Parse(format!("non-numeric batch index {raw:?}")))?;
    if index >= chunk_len {
        return Err(MigrationError::Parse(format!(
            "batch index {index} outside a chunk of {chunk_len}"
        )));
    }
    Ok(index)
}
