use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use log::debug;
use reqwest::blocking::{Client, Response};
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::error::ApiError;

use super::DataSource;
use super::types::{
    BranchSummary, ContributorSummary, FileContent, FileEntry, OrgSummary, RepoSummary,
};

const PAGE_SIZE: &str = "100";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Blocking GitHub REST client. One page of up to 100 records per collection.
pub struct GitHubClient {
    http: Client,
    api_url: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

#[derive(Deserialize)]
struct CommitAuthor {
    login: Option<String>,
    avatar_url: Option<String>,
}

#[derive(Deserialize)]
struct CommitRecord {
    author: Option<CommitAuthor>,
}

impl GitHubClient {
    pub fn new(api_url: &str, token: Option<&str>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );

        if let Some(token) = token.map(str::trim).filter(|token| !token.is_empty()) {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .context("GitHub token contains characters not allowed in a header")?;
            headers.insert(AUTHORIZATION, value);
        }

        let http = Client::builder()
            .user_agent(concat!("gh-atlas/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build GitHub HTTP client")?;

        Ok(Self {
            http,
            api_url: api_url.trim_end_matches('/').to_owned(),
        })
    }

    fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ApiError> {
        let url = format!("{}{path}", self.api_url);
        debug!("GET {url} {query:?}");

        let response = self
            .http
            .get(&url)
            .query(&[("per_page", PAGE_SIZE)])
            .query(query)
            .send()
            .map_err(|error| ApiError::new(None, error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(error_from_response(status.as_u16(), response));
        }

        response.json::<T>().map_err(|error| {
            ApiError::new(
                Some(status.as_u16()),
                format!("invalid JSON from {path}: {error}"),
            )
        })
    }
}

fn error_from_response(status: u16, response: Response) -> ApiError {
    let body = response.text().unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .ok()
        .and_then(|parsed| parsed.message)
        .unwrap_or_else(|| {
            if body.trim().is_empty() {
                "empty response body".to_owned()
            } else {
                body
            }
        });
    ApiError::new(Some(status), message)
}

/// Decodes a contents response into text. GitHub wraps base64 at 60
/// columns, so whitespace is stripped before decoding.
fn decode_content(body: FileContent) -> Result<String, ApiError> {
    let path = body.path.unwrap_or_default();
    let raw = body.content.unwrap_or_default();
    let bytes = match body.encoding.as_deref() {
        Some("base64") => {
            let packed = raw
                .chars()
                .filter(|c| !c.is_ascii_whitespace())
                .collect::<String>();
            STANDARD
                .decode(packed)
                .map_err(|error| ApiError::new(None, format!("undecodable {path}: {error}")))?
        }
        Some("none") => {
            return Err(ApiError::new(
                None,
                format!("{path} is too large to preview"),
            ));
        }
        _ => raw.into_bytes(),
    };

    String::from_utf8(bytes).map_err(|_| ApiError::new(None, format!("{path} is not a text file")))
}

/// Folds a commit listing into per-author contribution counts, busiest first.
fn tally_commit_authors(commits: Vec<CommitRecord>) -> Vec<ContributorSummary> {
    let mut by_login: HashMap<String, ContributorSummary> = HashMap::new();
    let mut anonymous = 0usize;

    for commit in commits {
        let Some(author) = commit.author else {
            anonymous += 1;
            continue;
        };
        let Some(login) = author.login else {
            anonymous += 1;
            continue;
        };

        let entry = by_login
            .entry(login.clone())
            .or_insert_with(|| ContributorSummary {
                login: Some(login),
                avatar_url: author.avatar_url,
                contributions: Some(0),
            });
        entry.contributions = Some(entry.contributions.unwrap_or(0) + 1);
    }

    if anonymous > 0 {
        debug!("skipped {anonymous} commits without a linked GitHub account");
    }

    let mut contributors = by_login.into_values().collect::<Vec<_>>();
    contributors.sort_by(|a, b| {
        b.contributions
            .cmp(&a.contributions)
            .then_with(|| a.login.cmp(&b.login))
    });
    contributors
}

impl DataSource for GitHubClient {
    fn fetch_organizations(&self) -> Result<Vec<OrgSummary>, ApiError> {
        self.get_json("/user/orgs", &[])
    }

    fn fetch_repositories(&self, org: &str) -> Result<Vec<RepoSummary>, ApiError> {
        self.get_json(&format!("/orgs/{org}/repos"), &[("sort", "updated")])
    }

    fn fetch_members(&self, org: &str) -> Result<Vec<ContributorSummary>, ApiError> {
        self.get_json(&format!("/orgs/{org}/members"), &[])
    }

    fn fetch_branches(&self, repo: &str) -> Result<Vec<BranchSummary>, ApiError> {
        self.get_json(&format!("/repos/{repo}/branches"), &[])
    }

    fn fetch_contributors(&self, repo: &str) -> Result<Vec<ContributorSummary>, ApiError> {
        self.get_json(&format!("/repos/{repo}/contributors"), &[])
    }

    fn fetch_branch_contributors(
        &self,
        repo: &str,
        branch: &str,
    ) -> Result<Vec<ContributorSummary>, ApiError> {
        let commits: Vec<CommitRecord> =
            self.get_json(&format!("/repos/{repo}/commits"), &[("sha", branch)])?;
        Ok(tally_commit_authors(commits))
    }

    fn fetch_files(
        &self,
        repo: &str,
        path: Option<&str>,
        reference: Option<&str>,
    ) -> Result<Vec<FileEntry>, ApiError> {
        let endpoint = match path.map(|path| path.trim_matches('/')) {
            Some(path) if !path.is_empty() => format!("/repos/{repo}/contents/{path}"),
            _ => format!("/repos/{repo}/contents"),
        };
        match reference {
            Some(reference) => self.get_json(&endpoint, &[("ref", reference)]),
            None => self.get_json(&endpoint, &[]),
        }
    }

    fn fetch_file_content(
        &self,
        repo: &str,
        path: &str,
        reference: Option<&str>,
    ) -> Result<String, ApiError> {
        let endpoint = format!("/repos/{repo}/contents/{}", path.trim_matches('/'));
        let body: FileContent = match reference {
            Some(reference) => self.get_json(&endpoint, &[("ref", reference)])?,
            None => self.get_json(&endpoint, &[])?,
        };
        decode_content(body)
    }
}
