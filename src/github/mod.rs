mod client;
mod session;
mod types;

pub use client::GitHubClient;
pub use session::{SessionBlob, SessionQuery, SessionStore};
pub use types::{
    BranchSummary, ContributorSummary, Fetched, FileContent, FileEntry, OrgSummary, RepoSummary,
};

use crate::error::ApiError;

/// Upstream collaborator the explorer pulls entity collections from.
///
/// Implementations block the calling thread; the desktop app runs them on
/// worker threads and hands results back over a channel.
pub trait DataSource: Send + Sync {
    fn fetch_organizations(&self) -> Result<Vec<OrgSummary>, ApiError>;

    fn fetch_repositories(&self, org: &str) -> Result<Vec<RepoSummary>, ApiError>;

    fn fetch_members(&self, org: &str) -> Result<Vec<ContributorSummary>, ApiError>;

    fn fetch_branches(&self, repo: &str) -> Result<Vec<BranchSummary>, ApiError>;

    fn fetch_contributors(&self, repo: &str) -> Result<Vec<ContributorSummary>, ApiError>;

    fn fetch_branch_contributors(
        &self,
        repo: &str,
        branch: &str,
    ) -> Result<Vec<ContributorSummary>, ApiError>;

    fn fetch_files(
        &self,
        repo: &str,
        path: Option<&str>,
        reference: Option<&str>,
    ) -> Result<Vec<FileEntry>, ApiError>;

    /// Text of one file, decoded.
    fn fetch_file_content(
        &self,
        repo: &str,
        path: &str,
        reference: Option<&str>,
    ) -> Result<String, ApiError>;
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;

    /// In-memory source keyed by the same scope strings the real client uses.
    #[derive(Default)]
    pub(crate) struct StaticSource {
        pub(crate) organizations: Vec<OrgSummary>,
        pub(crate) repositories: HashMap<String, Vec<RepoSummary>>,
        pub(crate) members: HashMap<String, Vec<ContributorSummary>>,
        pub(crate) branches: HashMap<String, Vec<BranchSummary>>,
        pub(crate) contributors: HashMap<String, Vec<ContributorSummary>>,
        pub(crate) files: HashMap<String, Vec<FileEntry>>,
        pub(crate) contents: HashMap<String, String>,
        pub(crate) failing: HashMap<String, ApiError>,
        pub(crate) calls: Mutex<Vec<String>>,
    }

    impl StaticSource {
        fn record(&self, call: String) -> Result<(), ApiError> {
            if let Ok(mut calls) = self.calls.lock() {
                calls.push(call.clone());
            }
            match self.failing.get(&call) {
                Some(error) => Err(error.clone()),
                None => Ok(()),
            }
        }

        pub(crate) fn calls(&self) -> Vec<String> {
            self.calls
                .lock()
                .map(|calls| calls.clone())
                .unwrap_or_default()
        }
    }

    impl DataSource for StaticSource {
        fn fetch_organizations(&self) -> Result<Vec<OrgSummary>, ApiError> {
            self.record("orgs".to_owned())?;
            Ok(self.organizations.clone())
        }

        fn fetch_repositories(&self, org: &str) -> Result<Vec<RepoSummary>, ApiError> {
            self.record(format!("repos:{org}"))?;
            Ok(self.repositories.get(org).cloned().unwrap_or_default())
        }

        fn fetch_members(&self, org: &str) -> Result<Vec<ContributorSummary>, ApiError> {
            self.record(format!("members:{org}"))?;
            Ok(self.members.get(org).cloned().unwrap_or_default())
        }

        fn fetch_branches(&self, repo: &str) -> Result<Vec<BranchSummary>, ApiError> {
            self.record(format!("branches:{repo}"))?;
            Ok(self.branches.get(repo).cloned().unwrap_or_default())
        }

        fn fetch_contributors(&self, repo: &str) -> Result<Vec<ContributorSummary>, ApiError> {
            self.record(format!("contributors:{repo}"))?;
            Ok(self.contributors.get(repo).cloned().unwrap_or_default())
        }

        fn fetch_branch_contributors(
            &self,
            repo: &str,
            branch: &str,
        ) -> Result<Vec<ContributorSummary>, ApiError> {
            let key = format!("{repo}@{branch}");
            self.record(format!("contributors:{key}"))?;
            Ok(self.contributors.get(&key).cloned().unwrap_or_default())
        }

        fn fetch_files(
            &self,
            repo: &str,
            path: Option<&str>,
            reference: Option<&str>,
        ) -> Result<Vec<FileEntry>, ApiError> {
            let key = format!(
                "{repo}@{}:{}",
                reference.unwrap_or("HEAD"),
                path.unwrap_or("")
            );
            self.record(format!("files:{key}"))?;
            Ok(self.files.get(&key).cloned().unwrap_or_default())
        }

        fn fetch_file_content(
            &self,
            repo: &str,
            path: &str,
            reference: Option<&str>,
        ) -> Result<String, ApiError> {
            let key = format!("{repo}@{}:{path}", reference.unwrap_or("HEAD"));
            self.record(format!("content:{key}"))?;
            self.contents
                .get(&key)
                .cloned()
                .ok_or_else(|| ApiError::new(Some(404), "Not Found"))
        }
    }

    pub(crate) fn named_org(login: &str) -> OrgSummary {
        OrgSummary {
            login: Some(login.to_owned()),
            ..OrgSummary::default()
        }
    }

    pub(crate) fn named_repo(full_name: &str) -> RepoSummary {
        RepoSummary {
            full_name: Some(full_name.to_owned()),
            name: full_name.rsplit('/').next().map(str::to_owned),
            ..RepoSummary::default()
        }
    }

    pub(crate) fn named_branch(name: &str) -> BranchSummary {
        BranchSummary {
            name: Some(name.to_owned()),
            protected: Some(name == "main"),
            ..BranchSummary::default()
        }
    }

    pub(crate) fn contributor(login: &str, contributions: u64) -> ContributorSummary {
        ContributorSummary {
            login: Some(login.to_owned()),
            contributions: Some(contributions),
            ..ContributorSummary::default()
        }
    }

    pub(crate) fn file(path: &str, size: u64) -> FileEntry {
        FileEntry {
            name: path.rsplit('/').next().map(str::to_owned),
            path: Some(path.to_owned()),
            entry_type: Some("file".to_owned()),
            size: Some(size),
        }
    }

    pub(crate) fn directory(path: &str) -> FileEntry {
        FileEntry {
            name: path.rsplit('/').next().map(str::to_owned),
            path: Some(path.to_owned()),
            entry_type: Some("dir".to_owned()),
            size: Some(0),
        }
    }
}
