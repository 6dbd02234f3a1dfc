use serde::{Deserialize, Serialize};

// Identifying fields are optional here so a record missing one can be reported
// as malformed by the normalizer instead of failing the whole response.

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct OrgSummary {
    pub login: Option<String>,
    pub description: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct RepoSummary {
    pub full_name: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub language: Option<String>,
    pub default_branch: Option<String>,
    pub stargazers_count: Option<u64>,
    pub size: Option<u64>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct CommitRef {
    pub sha: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct BranchSummary {
    pub name: Option<String>,
    pub protected: Option<bool>,
    pub commit: Option<CommitRef>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct ContributorSummary {
    pub login: Option<String>,
    pub avatar_url: Option<String>,
    pub contributions: Option<u64>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct FileEntry {
    pub name: Option<String>,
    pub path: Option<String>,
    #[serde(rename = "type")]
    pub entry_type: Option<String>,
    pub size: Option<u64>,
}

impl FileEntry {
    pub fn is_directory(&self) -> bool {
        self.entry_type.as_deref() == Some("dir")
    }
}

/// A single file from the contents endpoint. `content` is base64 with
/// line breaks when `encoding` is `"base64"`.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct FileContent {
    pub path: Option<String>,
    pub encoding: Option<String>,
    pub content: Option<String>,
}

/// One fetched collection plus the scope keys its node ids are derived from.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Fetched {
    Organizations {
        items: Vec<OrgSummary>,
    },
    Repositories {
        org: String,
        items: Vec<RepoSummary>,
    },
    Members {
        org: String,
        items: Vec<ContributorSummary>,
    },
    Branches {
        repo: String,
        items: Vec<BranchSummary>,
    },
    Contributors {
        repo: String,
        branch: Option<String>,
        items: Vec<ContributorSummary>,
    },
    Files {
        repo: String,
        reference: Option<String>,
        items: Vec<FileEntry>,
    },
}

impl Fetched {
    pub fn item_count(&self) -> usize {
        match self {
            Self::Organizations { items } => items.len(),
            Self::Repositories { items, .. } => items.len(),
            Self::Members { items, .. } => items.len(),
            Self::Branches { items, .. } => items.len(),
            Self::Contributors { items, .. } => items.len(),
            Self::Files { items, .. } => items.len(),
        }
    }
}
