use log::warn;

use crate::error::MalformedPayload;
use crate::github::{BranchSummary, ContributorSummary, Fetched, FileEntry, OrgSummary, RepoSummary};

use super::node::{Category, Edge, EdgeKind, Node, Payload};

const HEAD_REF: &str = "HEAD";

/// Nodes and edges produced from one fetched collection.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Subtree {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

impl Subtree {
    pub fn extend(&mut self, other: Subtree) {
        self.nodes.extend(other.nodes);
        self.edges.extend(other.edges);
    }
}

/// A normalized batch plus the records that had to be skipped.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Normalized {
    pub subtree: Subtree,
    pub skipped: Vec<MalformedPayload>,
}

pub fn organization_id(login: &str) -> String {
    format!("org:{login}")
}

pub fn repository_id(full_name: &str) -> String {
    format!("repo:{full_name}")
}

pub fn branch_id(repo: &str, name: &str) -> String {
    format!("branch:{repo}:{name}")
}

pub fn contributor_id(scope: &str, login: &str) -> String {
    format!("contributor:{scope}:{login}")
}

pub fn entry_id(directory: bool, repo: &str, reference: Option<&str>, path: &str) -> String {
    let prefix = if directory { "dir" } else { "file" };
    format!(
        "{prefix}:{repo}@{}:{path}",
        reference.unwrap_or(HEAD_REF)
    )
}

fn required<'a>(
    value: Option<&'a str>,
    kind: &'static str,
    field: &'static str,
) -> Result<&'a str, MalformedPayload> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or(MalformedPayload { kind, field })
}

fn organization(summary: &OrgSummary) -> Result<Node, MalformedPayload> {
    let login = required(summary.login.as_deref(), "organization", "login")?;
    Ok(Node::new(
        organization_id(login),
        login.to_owned(),
        Category::Organization,
        Payload::Organization {
            login: login.to_owned(),
            description: summary.description.clone(),
            avatar_url: summary.avatar_url.clone(),
        },
    ))
}

fn repository(summary: &RepoSummary) -> Result<Node, MalformedPayload> {
    let full_name = required(summary.full_name.as_deref(), "repository", "full_name")?;
    let label = summary
        .name
        .as_deref()
        .filter(|name| !name.is_empty())
        .unwrap_or(full_name);
    Ok(Node::new(
        repository_id(full_name),
        label.to_owned(),
        Category::Repository,
        Payload::Repository {
            full_name: full_name.to_owned(),
            description: summary.description.clone(),
            language: summary.language.clone(),
            default_branch: summary.default_branch.clone(),
            stars: summary.stargazers_count.unwrap_or(0),
            size: summary.size.unwrap_or(0).saturating_mul(1024),
        },
    ))
}

fn branch(repo: &str, summary: &BranchSummary) -> Result<Node, MalformedPayload> {
    let name = required(summary.name.as_deref(), "branch", "name")?;
    Ok(Node::new(
        branch_id(repo, name),
        name.to_owned(),
        Category::Branch,
        Payload::Branch {
            repository: repo.to_owned(),
            name: name.to_owned(),
            protected: summary.protected.unwrap_or(false),
            commit_sha: summary
                .commit
                .as_ref()
                .and_then(|commit| commit.sha.clone()),
        },
    ))
}

/// `counted` is false for branch listings, whose tallies cover one page of
/// commits and only weight the edge.
fn contributor(
    scope: &str,
    summary: &ContributorSummary,
    counted: bool,
) -> Result<Node, MalformedPayload> {
    let login = required(summary.login.as_deref(), "contributor", "login")?;
    Ok(Node::new(
        contributor_id(scope, login),
        format!("@{login}"),
        Category::Contributor,
        Payload::Contributor {
            scope: scope.to_owned(),
            login: login.to_owned(),
            avatar_url: summary.avatar_url.clone(),
            contributions: if counted {
                summary.contributions
            } else {
                None
            },
        },
    ))
}

fn file_entry(
    repo: &str,
    reference: Option<&str>,
    entry: &FileEntry,
) -> Result<Node, MalformedPayload> {
    let path = required(entry.path.as_deref(), "file", "path")?;
    let name = entry
        .name
        .as_deref()
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| path.rsplit('/').next().unwrap_or(path));
    let directory = entry.is_directory();
    let (category, payload) = if directory {
        (
            Category::Directory,
            Payload::Directory {
                repository: repo.to_owned(),
                reference: reference.map(str::to_owned),
                path: path.to_owned(),
            },
        )
    } else {
        (
            Category::for_file(name),
            Payload::File {
                repository: repo.to_owned(),
                reference: reference.map(str::to_owned),
                path: path.to_owned(),
                size: entry.size.unwrap_or(0),
            },
        )
    };

    Ok(Node::new(
        entry_id(directory, repo, reference, path),
        name.to_owned(),
        category,
        payload,
    ))
}

fn attach<T>(
    normalized: &mut Normalized,
    parent_id: &str,
    items: &[T],
    kind: EdgeKind,
    build: impl Fn(&T) -> Result<Node, MalformedPayload>,
    weight: impl Fn(&T) -> f32,
) {
    for item in items {
        match build(item) {
            Ok(node) => {
                normalized
                    .subtree
                    .edges
                    .push(Edge::new(parent_id, &node.id, kind, weight(item)));
                normalized.subtree.nodes.push(node);
            }
            Err(error) => {
                warn!("skipping record under {parent_id}: {error}");
                normalized.skipped.push(error);
            }
        }
    }
}

fn contribution_weight(summary: &ContributorSummary) -> f32 {
    summary.contributions.unwrap_or(1).max(1) as f32
}

/// Converts one fetched collection into nodes linked under `parent_id`.
/// Malformed records are skipped; their siblings still come through.
pub fn normalize(batch: &Fetched, parent_id: &str) -> Normalized {
    let mut normalized = Normalized::default();

    match batch {
        Fetched::Organizations { items } => attach(
            &mut normalized,
            parent_id,
            items,
            EdgeKind::Membership,
            organization,
            |_| 1.0,
        ),
        Fetched::Repositories { items, .. } => attach(
            &mut normalized,
            parent_id,
            items,
            EdgeKind::Owns,
            repository,
            |_| 2.0,
        ),
        Fetched::Members { org, items } => attach(
            &mut normalized,
            parent_id,
            items,
            EdgeKind::Member,
            |summary| contributor(org, summary, true),
            |_| 1.0,
        ),
        Fetched::Branches { repo, items } => attach(
            &mut normalized,
            parent_id,
            items,
            EdgeKind::Branch,
            |summary| branch(repo, summary),
            |_| 1.0,
        ),
        Fetched::Contributors { repo, branch, items } => attach(
            &mut normalized,
            parent_id,
            items,
            EdgeKind::Contributed,
            |summary| contributor(repo, summary, branch.is_none()),
            contribution_weight,
        ),
        Fetched::Files {
            repo,
            reference,
            items,
        } => attach(
            &mut normalized,
            parent_id,
            items,
            EdgeKind::Contains,
            |entry| file_entry(repo, reference.as_deref(), entry),
            |_| 1.0,
        ),
    }

    normalized
}

fn keep_records<T>(
    items: &mut Vec<T>,
    build: impl Fn(&T) -> Result<Node, MalformedPayload>,
    keep: &impl Fn(&str) -> bool,
) {
    items.retain(|item| build(item).map_or(true, |node| keep(&node.id)));
}

/// Drops every record of `batch` whose node id fails `keep`. Malformed
/// records have no id and stay, so replay reports them the same way.
pub fn retain_records(batch: &mut Fetched, keep: impl Fn(&str) -> bool) {
    match batch {
        Fetched::Organizations { items } => keep_records(items, organization, &keep),
        Fetched::Repositories { items, .. } => keep_records(items, repository, &keep),
        Fetched::Members { org, items } => {
            keep_records(items, |summary| contributor(org, summary, true), &keep)
        }
        Fetched::Branches { repo, items } => {
            keep_records(items, |summary| branch(repo, summary), &keep)
        }
        Fetched::Contributors { repo, items, .. } => {
            keep_records(items, |summary| contributor(repo, summary, true), &keep)
        }
        Fetched::Files {
            repo,
            reference,
            items,
        } => keep_records(
            items,
            |entry| file_entry(repo, reference.as_deref(), entry),
            &keep,
        ),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::github::testing::{contributor as summary, directory, file, named_branch, named_repo};
    use crate::graph::NodeKind;

    fn ids(normalized: &Normalized) -> Vec<&str> {
        normalized
            .subtree
            .nodes
            .iter()
            .map(|node| node.id.as_str())
            .collect()
    }

    #[test]
    fn repositories_get_content_derived_ids() {
        let batch = Fetched::Repositories {
            org: "acme".to_owned(),
            items: vec![named_repo("acme/api"), named_repo("acme/web")],
        };

        let normalized = normalize(&batch, "org:acme");

        assert_eq!(ids(&normalized), vec!["repo:acme/api", "repo:acme/web"]);
        assert_eq!(normalized.subtree.edges.len(), 2);
        assert!(
            normalized
                .subtree
                .edges
                .iter()
                .all(|edge| edge.source == "org:acme" && edge.kind == EdgeKind::Owns)
        );
        assert_eq!(normalized.subtree.nodes[0].label, "api");
    }

    #[test]
    fn repository_size_is_kept_in_bytes() {
        let batch = Fetched::Repositories {
            org: "acme".to_owned(),
            items: vec![RepoSummary {
                size: Some(3),
                stargazers_count: Some(40),
                ..named_repo("acme/api")
            }],
        };

        let normalized = normalize(&batch, "org:acme");
        assert!(matches!(
            normalized.subtree.nodes[0].payload,
            Payload::Repository {
                size: 3072,
                stars: 40,
                ..
            }
        ));
    }

    #[test]
    fn independent_fetches_do_not_collide() {
        let api = normalize(
            &Fetched::Branches {
                repo: "acme/api".to_owned(),
                items: vec![named_branch("main")],
            },
            "repo:acme/api",
        );
        let web = normalize(
            &Fetched::Branches {
                repo: "acme/web".to_owned(),
                items: vec![named_branch("main")],
            },
            "repo:acme/web",
        );

        assert_eq!(ids(&api), vec!["branch:acme/api:main"]);
        assert_eq!(ids(&web), vec!["branch:acme/web:main"]);
    }

    #[test]
    fn malformed_records_are_skipped_not_fatal() {
        let batch = Fetched::Contributors {
            repo: "acme/api".to_owned(),
            branch: None,
            items: vec![
                summary("ana", 12),
                ContributorSummary::default(),
                summary("bo", 3),
            ],
        };

        let normalized = normalize(&batch, "repo:acme/api");

        assert_eq!(
            ids(&normalized),
            vec!["contributor:acme/api:ana", "contributor:acme/api:bo"]
        );
        assert_eq!(
            normalized.skipped,
            vec![MalformedPayload {
                kind: "contributor",
                field: "login"
            }]
        );
        assert_eq!(normalized.subtree.edges[0].weight, 12.0);
    }

    #[test]
    fn branch_and_repo_contributors_share_a_node_id() {
        let repo_level = normalize(
            &Fetched::Contributors {
                repo: "acme/api".to_owned(),
                branch: None,
                items: vec![summary("ana", 12)],
            },
            "repo:acme/api",
        );
        let branch_level = normalize(
            &Fetched::Contributors {
                repo: "acme/api".to_owned(),
                branch: Some("main".to_owned()),
                items: vec![summary("ana", 4)],
            },
            "branch:acme/api:main",
        );

        assert_eq!(ids(&repo_level), ids(&branch_level));
        assert_eq!(branch_level.subtree.edges[0].source, "branch:acme/api:main");
        assert_eq!(branch_level.subtree.edges[0].weight, 4.0);
        assert!(matches!(
            branch_level.subtree.nodes[0].payload,
            Payload::Contributor {
                contributions: None,
                ..
            }
        ));
    }

    #[test]
    fn files_and_directories_are_scoped_by_reference() {
        let batch = Fetched::Files {
            repo: "acme/api".to_owned(),
            reference: Some("main".to_owned()),
            items: vec![directory("src"), file("setup.py", 2048)],
        };

        let normalized = normalize(&batch, "branch:acme/api:main");

        assert_eq!(
            ids(&normalized),
            vec!["dir:acme/api@main:src", "file:acme/api@main:setup.py"]
        );
        assert_eq!(normalized.subtree.nodes[0].kind(), NodeKind::Directory);
        assert_eq!(normalized.subtree.nodes[1].category, Category::Python);
    }

    #[test]
    fn retained_records_match_node_ids() {
        let mut batch = Fetched::Files {
            repo: "acme/api".to_owned(),
            reference: Some("main".to_owned()),
            items: vec![
                directory("src"),
                file("setup.py", 2048),
                FileEntry::default(),
            ],
        };

        retain_records(&mut batch, |id| id != "dir:acme/api@main:src");

        let normalized = normalize(&batch, "branch:acme/api:main");
        assert_eq!(ids(&normalized), vec!["file:acme/api@main:setup.py"]);
        assert_eq!(normalized.skipped.len(), 1);
    }

    #[test]
    fn blank_identifiers_count_as_missing() {
        let batch = Fetched::Organizations {
            items: vec![OrgSummary {
                login: Some("   ".to_owned()),
                ..OrgSummary::default()
            }],
        };

        let normalized = normalize(&batch, "root");
        assert!(normalized.subtree.nodes.is_empty());
        assert_eq!(normalized.skipped.len(), 1);
    }
}
