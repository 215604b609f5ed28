//! In-process [`DestinationApi`] that records every write.
//!
//! Keys are handed out sequentially (`KEY00001`, `KEY00002`, …). Tests can
//! queue canned responses, or mark objects for rejection by their `name`,
//! `title` or `note` field.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use super::{DestinationApi, Endpoint, FailedWrite, WriteResponse};
use crate::error::Result;

/// One recorded write call.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteCall {
    pub endpoint: Endpoint,
    pub objects: Vec<Value>,
}

#[derive(Default)]
struct State {
    calls: Vec<WriteCall>,
    next_key: u64,
    top_level: Vec<String>,
    scripted: VecDeque<WriteResponse>,
    rejected: HashSet<String>,
    list_calls: usize,
}

/// Fake destination for tests and dry runs.
#[derive(Default)]
pub struct InMemoryDestination {
    state: Mutex<State>,
}

impl InMemoryDestination {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pretend these top-level collections already exist.
    pub fn with_top_level(names: &[&str]) -> Self {
        let dest = Self::new();
        dest.lock().top_level = names.iter().map(|n| n.to_string()).collect();
        dest
    }

    /// Answer the next write call with `response` instead of generating one.
    pub fn push_response(&self, response: WriteResponse) {
        self.lock().scripted.push_back(response);
    }

    /// Reject any object whose `name`, `title` or `note` equals `label`.
    pub fn reject(&self, label: &str) {
        self.lock().rejected.insert(label.to_string());
    }

    pub fn calls(&self) -> Vec<WriteCall> {
        self.lock().calls.clone()
    }

    pub fn calls_to(&self, endpoint: Endpoint) -> Vec<WriteCall> {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.endpoint == endpoint)
            .cloned()
            .collect()
    }

    /// Every object written to `endpoint`, in upload order.
    pub fn objects(&self, endpoint: Endpoint) -> Vec<Value> {
        self.calls_to(endpoint)
            .into_iter()
            .flat_map(|c| c.objects)
            .collect()
    }

    pub fn list_calls(&self) -> usize {
        self.lock().list_calls
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        // A panicking test thread must not hide the recorded calls.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn label(object: &Value) -> Option<&str> {
    ["name", "title", "note"]
        .iter()
        .find_map(|field| object.get(*field).and_then(Value::as_str))
}

#[async_trait]
impl DestinationApi for InMemoryDestination {
    async fn top_level_collection_names(&self) -> Result<Vec<String>> {
        let mut state = self.lock();
        state.list_calls += 1;
        Ok(state.top_level.clone())
    }

    async fn write(&self, endpoint: Endpoint, objects: &[Value]) -> Result<WriteResponse> {
        let mut state = self.lock();
        state.calls.push(WriteCall {
            endpoint,
            objects: objects.to_vec(),
        });
        if let Some(response) = state.scripted.pop_front() {
            return Ok(response);
        }

        let mut success = BTreeMap::new();
        let mut failed = BTreeMap::new();
        for (i, object) in objects.iter().enumerate() {
            if label(object).is_some_and(|l| state.rejected.contains(l)) {
                failed.insert(
                    i.to_string(),
                    FailedWrite {
                        code: Some(400),
                        message: "rejected by test".to_string(),
                    },
                );
                continue;
            }
            state.next_key += 1;
            let key = format!("KEY{:05}", state.next_key);
            if endpoint == Endpoint::Collections
                && object.get("parentCollection") == Some(&Value::Bool(false))
            {
                if let Some(name) = object.get("name").and_then(Value::as_str) {
                    state.top_level.push(name.to_string());
                }
            }
            success.insert(i.to_string(), key);
        }
        Ok(WriteResponse { success, failed })
    }
}
