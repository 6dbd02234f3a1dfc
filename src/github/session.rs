use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::graph::retain_records;

use super::types::Fetched;

pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct SessionQuery {
    pub org: Option<String>,
    pub api_url: String,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct CachedExpansion {
    pub node_id: String,
    pub batches: Vec<Fetched>,
}

/// Flat blob persisted between runs: the query, every accepted expansion in
/// the order it was merged, and when the blob was last written.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct SessionBlob {
    pub query: SessionQuery,
    pub expansions: Vec<CachedExpansion>,
    pub timestamp: u64,
}

impl SessionBlob {
    pub fn new(query: SessionQuery) -> Self {
        Self {
            query,
            expansions: Vec::new(),
            timestamp: 0,
        }
    }

    /// Replaces an earlier record for `node_id` in place, so replay still
    /// expands parents before their children.
    pub fn record(&mut self, node_id: &str, batches: Vec<Fetched>) {
        if let Some(existing) = self
            .expansions
            .iter_mut()
            .find(|expansion| expansion.node_id == node_id)
        {
            existing.batches = batches;
            return;
        }

        self.expansions.push(CachedExpansion {
            node_id: node_id.to_owned(),
            batches,
        });
    }

    /// Drops the expansions of removed nodes and their records from the
    /// batches that introduced them, so a removed node stays gone on replay.
    pub fn forget(&mut self, node_ids: &[String]) {
        let removed = node_ids.iter().map(String::as_str).collect::<HashSet<_>>();
        self.expansions
            .retain(|expansion| !removed.contains(expansion.node_id.as_str()));
        for expansion in &mut self.expansions {
            for batch in &mut expansion.batches {
                retain_records(batch, |id| !removed.contains(id));
            }
        }
    }
}

pub struct SessionStore {
    path: PathBuf,
    max_age: Duration,
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            max_age: DEFAULT_MAX_AGE,
        }
    }

    pub fn default_path() -> PathBuf {
        std::env::temp_dir().join("gh-atlas-session.json")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns a cached session for `query`, or `None` when the file is missing,
    /// stale, unreadable, or was written for a different query.
    pub fn load(&self, query: &SessionQuery) -> Option<SessionBlob> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return None,
            Err(error) => {
                warn!("failed to read session {}: {error}", self.path.display());
                return None;
            }
        };

        let blob = match serde_json::from_str::<SessionBlob>(&raw) {
            Ok(blob) => blob,
            Err(error) => {
                warn!(
                    "discarding corrupt session {}: {error}",
                    self.path.display()
                );
                self.clear();
                return None;
            }
        };

        if &blob.query != query {
            info!("session query changed; ignoring cached session");
            return None;
        }

        let age = unix_now().saturating_sub(blob.timestamp);
        if age > self.max_age.as_secs() {
            info!("session is {age}s old; refetching");
            return None;
        }

        info!(
            "restoring {} cached expansions from {}",
            blob.expansions.len(),
            self.path.display()
        );
        Some(blob)
    }

    pub fn save(&self, blob: &mut SessionBlob) -> Result<()> {
        blob.timestamp = unix_now();
        let raw = serde_json::to_string(blob).context("failed to serialize session")?;
        fs::write(&self.path, raw)
            .with_context(|| format!("failed to write session {}", self.path.display()))
    }

    pub fn clear(&self) {
        if let Err(error) = fs::remove_file(&self.path)
            && error.kind() != std::io::ErrorKind::NotFound
        {
            warn!("failed to remove session {}: {error}", self.path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::super::testing::{named_org, named_repo};
    use super::*;

    fn query() -> SessionQuery {
        SessionQuery {
            org: Some("acme".to_owned()),
            api_url: "https://api.github.com".to_owned(),
        }
    }

    fn orgs_batch() -> Vec<Fetched> {
        vec![Fetched::Organizations {
            items: vec![named_org("acme")],
        }]
    }

    #[test]
    fn saved_session_round_trips_for_same_query() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SessionStore::new(dir.path().join("session.json"));

        let mut blob = SessionBlob::new(query());
        blob.record("root", orgs_batch());
        store.save(&mut blob).expect("save session");

        let loaded = store.load(&query()).expect("fresh session");
        assert_eq!(loaded, blob);
    }

    #[test]
    fn session_for_other_query_is_ignored() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SessionStore::new(dir.path().join("session.json"));

        let mut blob = SessionBlob::new(query());
        store.save(&mut blob).expect("save session");

        let other = SessionQuery {
            org: Some("globex".to_owned()),
            ..query()
        };
        assert!(store.load(&other).is_none());
    }

    #[test]
    fn stale_session_is_ignored() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("session.json");
        let mut blob = SessionBlob::new(query());
        blob.timestamp = unix_now() - DEFAULT_MAX_AGE.as_secs() - 60;
        fs::write(&path, serde_json::to_string(&blob).expect("json")).expect("write");

        assert!(SessionStore::new(&path).load(&query()).is_none());
    }

    #[test]
    fn corrupt_session_is_removed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("session.json");
        fs::write(&path, "{not json").expect("write");

        let store = SessionStore::new(&path);
        assert!(store.load(&query()).is_none());
        assert!(!store.path().exists());
    }

    #[test]
    fn forgotten_nodes_leave_their_parent_batches() {
        let mut blob = SessionBlob::new(query());
        blob.record("root", orgs_batch());
        blob.record(
            "org:acme",
            vec![Fetched::Repositories {
                org: "acme".to_owned(),
                items: vec![named_repo("acme/api"), named_repo("acme/web")],
            }],
        );
        blob.record("repo:acme/api", Vec::new());

        blob.forget(&["repo:acme/api".to_owned()]);

        let order = blob
            .expansions
            .iter()
            .map(|expansion| expansion.node_id.as_str())
            .collect::<Vec<_>>();
        assert_eq!(order, vec!["root", "org:acme"]);
        assert_eq!(
            blob.expansions[1].batches,
            vec![Fetched::Repositories {
                org: "acme".to_owned(),
                items: vec![named_repo("acme/web")],
            }]
        );
        assert_eq!(blob.expansions[0].batches, orgs_batch());
    }

    #[test]
    fn recording_same_node_replaces_previous_expansion() {
        let mut blob = SessionBlob::new(query());
        blob.record("root", orgs_batch());
        blob.record("org:acme", Vec::new());
        blob.record("root", Vec::new());

        let order = blob
            .expansions
            .iter()
            .map(|expansion| expansion.node_id.as_str())
            .collect::<Vec<_>>();
        assert_eq!(order, vec!["root", "org:acme"]);
        assert!(blob.expansions[0].batches.is_empty());
    }
}
