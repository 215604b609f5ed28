//! Collection hierarchy replication.
//!
//! The source hierarchy is a flat list of `(id, name, parent)` rows. It is
//! rebuilt under a freshly created import root, one level per pass: every
//! node whose parent already has a server key goes into the same batched
//! create call. A pass that finds no ready node while nodes remain means the
//! rest are orphaned or form a cycle, and replication stops with
//! [`MigrationError::DanglingNodes`].

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::batch::BatchUploader;
use crate::error::{MigrationError, Result};
use crate::id_map::{IdMap, ROOT_ALIAS};
use crate::models::Node;
use crate::payload::CollectionPayload;
use crate::zotero::Endpoint;

pub const DEFAULT_ROOT_PREFIX: &str = "passport-import";

/// `{prefix}_{YYYY-MM-DDTHH:MM:SS}` in UTC.
pub fn root_name(prefix: &str, now: DateTime<Utc>) -> String {
    format!("{}_{}", prefix, now.format("%Y-%m-%dT%H:%M:%S"))
}

/// Pick a root name that no existing top-level collection uses.
///
/// On a collision waits one second and asks `now` again, so two imports
/// started within the same second still get distinct roots.
pub async fn unique_root_name<F>(prefix: &str, existing: &[String], mut now: F) -> String
where
    F: FnMut() -> DateTime<Utc>,
{
    loop {
        let name = root_name(prefix, now());
        if !existing.iter().any(|n| *n == name) {
            return name;
        }
        debug!(%name, "root name taken, waiting");
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
}

/// Recreate `nodes` under a new root collection named `root_name`.
///
/// `root_source_id` is the source's own top-level container, if it has
/// one; nodes pointing at it are placed directly under the new root. The
/// returned map holds the root source id, the [`ROOT_ALIAS`] and every
/// created node.
pub async fn replicate(
    uploader: &BatchUploader<'_>,
    nodes: &[Node],
    root_source_id: Option<&str>,
    root_name: &str,
) -> Result<IdMap> {
    let mut map = IdMap::new();

    let root = uploader
        .upload(Endpoint::Collections, &[CollectionPayload::new(root_name, None)])
        .await
        .map_err(|e| match e {
            MigrationError::PartialFailure { failed, .. } => MigrationError::RootCreation(
                failed
                    .into_iter()
                    .next()
                    .map(|(_, message)| message)
                    .unwrap_or_default(),
            ),
            other => other,
        })?;
    let root_key = root
        .key(0)
        .ok_or_else(|| MigrationError::RootCreation("server returned no key".to_string()))?
        .to_string();
    map.insert(ROOT_ALIAS, root_key.as_str())?;
    if let Some(id) = root_source_id {
        map.insert(id, root_key.as_str())?;
    }
    info!(name = root_name, key = %root_key, "created import root");

    let mut pending: Vec<&Node> = nodes
        .iter()
        .filter(|n| Some(n.source_id.as_str()) != root_source_id)
        .collect();
    let mut level = 0usize;

    while !pending.is_empty() {
        level += 1;
        let (ready, waiting): (Vec<&Node>, Vec<&Node>) =
            pending.into_iter().partition(|n| match &n.parent_source_id {
                None => true,
                Some(parent) => map.contains(parent),
            });

        if ready.is_empty() {
            let mut ids: Vec<String> = waiting.iter().map(|n| n.source_id.clone()).collect();
            ids.sort();
            return Err(MigrationError::DanglingNodes { ids });
        }

        let payloads: Vec<CollectionPayload> = ready
            .iter()
            .map(|n| {
                let parent = n
                    .parent_source_id
                    .as_deref()
                    .and_then(|p| map.get(p))
                    .unwrap_or(root_key.as_str());
                CollectionPayload::new(n.name.clone(), Some(parent.to_string()))
            })
            .collect();

        let result = uploader.upload(Endpoint::Collections, &payloads).await?;
        for (i, node) in ready.iter().enumerate() {
            match result.key(i) {
                Some(key) => map.insert(node.source_id.as_str(), key)?,
                None => warn!(
                    source_id = %node.source_id,
                    name = %node.name,
                    "collection not created, its subtree will be unreachable"
                ),
            }
        }
        debug!(level, created = result.ids.len(), remaining = waiting.len(), "replicated level");
        pending = waiting;
    }

    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::PartialFailurePolicy;
    use crate::zotero::InMemoryDestination;
    use chrono::TimeZone;

    fn uploader(dest: &InMemoryDestination) -> BatchUploader<'_> {
        BatchUploader::new(dest, 50, PartialFailurePolicy::Abort).unwrap()
    }

    #[tokio::test]
    async fn test_forest_replicates_level_by_level() {
        let dest = InMemoryDestination::new();
        let nodes = vec![
            Node::new("a", "Alpha", None),
            Node::new("b", "Beta", Some("ROOT")),
            Node::new("c", "Gamma", Some("a")),
        ];

        let map = replicate(&uploader(&dest), &nodes, Some("ROOT"), "imp")
            .await
            .unwrap();

        // root, then level 1, then level 2
        assert_eq!(dest.calls().len(), 3);
        let root = map.root().unwrap().to_string();
        assert_eq!(map.get("ROOT"), Some(root.as_str()));
        for id in ["a", "b", "c"] {
            assert!(map.contains(id), "{id} not mapped");
        }
        assert_eq!(map.len(), 5);

        let level1 = &dest.calls()[1].objects;
        assert_eq!(level1.len(), 2);
        assert!(level1.iter().all(|o| o["parentCollection"] == root.as_str()));
        let level2 = &dest.calls()[2].objects;
        assert_eq!(level2[0]["name"], "Gamma");
        assert_eq!(level2[0]["parentCollection"], map.get("a").unwrap());
    }

    #[tokio::test]
    async fn test_root_is_top_level() {
        let dest = InMemoryDestination::new();
        replicate(&uploader(&dest), &[], None, "imp").await.unwrap();
        let root = &dest.calls()[0].objects[0];
        assert_eq!(root["name"], "imp");
        assert_eq!(root["parentCollection"], false);
    }

    #[tokio::test]
    async fn test_orphan_is_dangling() {
        let dest = InMemoryDestination::new();
        let nodes = vec![
            Node::new("a", "Alpha", None),
            Node::new("o", "Orphan", Some("missing")),
        ];
        let err = replicate(&uploader(&dest), &nodes, None, "imp")
            .await
            .unwrap_err();
        match err {
            MigrationError::DanglingNodes { ids } => assert_eq!(ids, vec!["o".to_string()]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_cycle_terminates() {
        let dest = InMemoryDestination::new();
        let nodes = vec![Node::new("x", "X", Some("y")), Node::new("y", "Y", Some("x"))];
        let err = replicate(&uploader(&dest), &nodes, None, "imp")
            .await
            .unwrap_err();
        assert!(
            matches!(err, MigrationError::DanglingNodes { ref ids } if ids == &["x".to_string(), "y".to_string()])
        );
        // only the root was created
        assert_eq!(dest.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_rejected_root_is_root_creation_error() {
        let dest = InMemoryDestination::new();
        dest.reject("imp");
        let err = replicate(&uploader(&dest), &[], None, "imp")
            .await
            .unwrap_err();
        assert!(matches!(err, MigrationError::RootCreation(_)));
    }

    #[tokio::test]
    async fn test_failed_parent_strands_subtree_under_continue() {
        let dest = InMemoryDestination::new();
        dest.reject("Alpha");
        let uploader = BatchUploader::new(&dest, 50, PartialFailurePolicy::Continue).unwrap();
        let nodes = vec![Node::new("a", "Alpha", None), Node::new("c", "Gamma", Some("a"))];
        let err = replicate(&uploader, &nodes, None, "imp").await.unwrap_err();
        assert!(matches!(err, MigrationError::DanglingNodes { ref ids } if ids == &["c".to_string()]));
    }

    #[test]
    fn test_root_name_format() {
        let now = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(root_name("passport-import", now), "passport-import_2024-03-09T14:05:07");
    }

    #[tokio::test(start_paused = true)]
    async fn test_unique_root_name_waits_on_collision() {
        let base = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        let started = tokio::time::Instant::now();
        let clock = move || base + chrono::Duration::seconds(started.elapsed().as_secs() as i64);
        let existing = vec!["p_2024-03-09T14:05:07".to_string()];

        let name = unique_root_name("p", &existing, clock).await;

        assert_eq!(name, "p_2024-03-09T14:05:08");
        assert!(started.elapsed() >= Duration::from_secs(1));
    }
}
