use std::collections::HashMap;

use eframe::egui::Vec2;
use log::debug;

use crate::error::ApiError;
use crate::github::{DataSource, Fetched};
use crate::graph::{Graph, Node, Payload};
use crate::util::language_for;

const PREVIEW_CHAR_LIMIT: usize = 64 * 1024;

/// What to fetch when a node is expanded, dispatched on the node's payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExpandRequest {
    Organizations,
    Organization {
        login: String,
    },
    Repository {
        full_name: String,
    },
    Branch {
        repo: String,
        name: String,
    },
    Directory {
        repo: String,
        reference: Option<String>,
        path: String,
    },
}

impl ExpandRequest {
    /// `None` for leaf kinds (contributors and files); clicking those selects.
    pub fn for_node(node: &Node) -> Option<Self> {
        match &node.payload {
            Payload::Root => Some(Self::Organizations),
            Payload::Organization { login, .. } => Some(Self::Organization {
                login: login.clone(),
            }),
            Payload::Repository { full_name, .. } => Some(Self::Repository {
                full_name: full_name.clone(),
            }),
            Payload::Branch {
                repository, name, ..
            } => Some(Self::Branch {
                repo: repository.clone(),
                name: name.clone(),
            }),
            Payload::Directory {
                repository,
                reference,
                path,
            } => Some(Self::Directory {
                repo: repository.clone(),
                reference: reference.clone(),
                path: path.clone(),
            }),
            Payload::Contributor { .. } | Payload::File { .. } => None,
        }
    }

    /// Runs every fetch the expansion needs. Any failed collection fails the
    /// whole expansion so nothing half-fetched is merged.
    pub fn fetch(&self, source: &dyn DataSource) -> Result<Vec<Fetched>, ApiError> {
        let batches = match self {
            Self::Organizations => vec![Fetched::Organizations {
                items: source.fetch_organizations()?,
            }],
            Self::Organization { login } => vec![
                Fetched::Repositories {
                    org: login.clone(),
                    items: source.fetch_repositories(login)?,
                },
                Fetched::Members {
                    org: login.clone(),
                    items: source.fetch_members(login)?,
                },
            ],
            Self::Repository { full_name } => vec![
                Fetched::Branches {
                    repo: full_name.clone(),
                    items: source.fetch_branches(full_name)?,
                },
                Fetched::Contributors {
                    repo: full_name.clone(),
                    branch: None,
                    items: source.fetch_contributors(full_name)?,
                },
            ],
            Self::Branch { repo, name } => vec![
                Fetched::Contributors {
                    repo: repo.clone(),
                    branch: Some(name.clone()),
                    items: source.fetch_branch_contributors(repo, name)?,
                },
                Fetched::Files {
                    repo: repo.clone(),
                    reference: Some(name.clone()),
                    items: source.fetch_files(repo, None, Some(name))?,
                },
            ],
            Self::Directory {
                repo,
                reference,
                path,
            } => vec![Fetched::Files {
                repo: repo.clone(),
                reference: reference.clone(),
                items: source.fetch_files(repo, Some(path), reference.as_deref())?,
            }],
        };
        Ok(batches)
    }
}

/// Fetches the text of a file node for the preview window.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PreviewRequest {
    pub repo: String,
    pub path: String,
    pub reference: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilePreview {
    pub path: String,
    pub language: &'static str,
    pub text: String,
    /// Set when `text` was cut at the preview limit.
    pub truncated: bool,
}

impl PreviewRequest {
    /// Only file nodes can be previewed.
    pub fn for_node(node: &Node) -> Option<Self> {
        match &node.payload {
            Payload::File {
                repository,
                reference,
                path,
                ..
            } => Some(Self {
                repo: repository.clone(),
                path: path.clone(),
                reference: reference.clone(),
            }),
            _ => None,
        }
    }

    pub fn fetch(&self, source: &dyn DataSource) -> Result<FilePreview, ApiError> {
        let mut text =
            source.fetch_file_content(&self.repo, &self.path, self.reference.as_deref())?;
        let cut = text
            .char_indices()
            .nth(PREVIEW_CHAR_LIMIT)
            .map(|(index, _)| index);
        if let Some(index) = cut {
            text.truncate(index);
        }
        Ok(FilePreview {
            path: self.path.clone(),
            language: language_for(&self.path),
            text,
            truncated: cut.is_some(),
        })
    }
}

/// Identifies one in-flight expand. Only the newest token per node is honored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RequestToken(u64);

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum ExpandState {
    #[default]
    Collapsed,
    Pending {
        token: RequestToken,
    },
    Expanded,
    Failed {
        message: String,
    },
}

#[derive(Debug, Default)]
pub struct ExpandTracker {
    next_token: u64,
    states: HashMap<String, ExpandState>,
}

impl ExpandTracker {
    /// Starts a request for `node_id`, superseding any request still pending.
    pub fn begin(&mut self, node_id: &str) -> RequestToken {
        self.next_token += 1;
        let token = RequestToken(self.next_token);
        let previous = self
            .states
            .insert(node_id.to_owned(), ExpandState::Pending { token });
        if let Some(ExpandState::Pending { token: stale }) = previous {
            debug!("expand of {node_id} supersedes request {}", stale.0);
        }
        token
    }

    pub fn is_current(&self, node_id: &str, token: RequestToken) -> bool {
        matches!(
            self.states.get(node_id),
            Some(ExpandState::Pending { token: current }) if *current == token
        )
    }

    /// Marks a current request as merged. Stale tokens are refused.
    pub fn complete(&mut self, node_id: &str, token: RequestToken) -> bool {
        if !self.is_current(node_id, token) {
            return false;
        }
        self.states
            .insert(node_id.to_owned(), ExpandState::Expanded);
        true
    }

    pub fn fail(&mut self, node_id: &str, token: RequestToken, message: String) -> bool {
        if !self.is_current(node_id, token) {
            return false;
        }
        self.states
            .insert(node_id.to_owned(), ExpandState::Failed { message });
        true
    }

    /// For expansions restored without a request, such as session replay.
    pub fn mark_expanded(&mut self, node_id: &str) {
        self.states
            .insert(node_id.to_owned(), ExpandState::Expanded);
    }

    pub fn state(&self, node_id: &str) -> ExpandState {
        self.states.get(node_id).cloned().unwrap_or_default()
    }

    pub fn pending_count(&self) -> usize {
        self.states
            .values()
            .filter(|state| matches!(state, ExpandState::Pending { .. }))
            .count()
    }

    pub fn forget(&mut self, node_ids: &[String]) {
        for node_id in node_ids {
            self.states.remove(node_id);
        }
    }

    pub fn clear(&mut self) {
        self.states.clear();
    }
}

/// What a click on a node asks the host to do.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClickAction {
    /// Run `request` off the UI thread and hand the result back with `token`.
    Expand {
        node_id: String,
        token: RequestToken,
        request: ExpandRequest,
    },
    Select {
        node_id: String,
    },
    Ignored,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DragState {
    pub node_id: String,
    /// Pinned before the drag started; such nodes stay pinned on release.
    pub was_pinned: bool,
}

/// Topmost node under `point` (world space). `reach` gives each node's
/// clickable radius in world units, so callers can match what they draw.
/// Later nodes are drawn over earlier ones, so the search runs backwards.
pub fn hit_test<'a>(
    graph: &'a Graph,
    point: Vec2,
    reach: impl Fn(&Node) -> f32,
) -> Option<&'a Node> {
    graph.nodes().iter().rev().find(|node| {
        node.current_position().is_some_and(|position| {
            let reach = reach(node).max(0.0);
            (position - point).length_sq() <= reach * reach
        })
    })
}

#[cfg(test)]
mod tests {
    use eframe::egui::vec2;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::github::testing::{StaticSource, directory, file, named_branch};
    use crate::graph::{ROOT_ID, normalize};

    fn branch_node() -> Node {
        let batch = Fetched::Branches {
            repo: "acme/api".to_owned(),
            items: vec![named_branch("main")],
        };
        normalize(&batch, "repo:acme/api").subtree.nodes.remove(0)
    }

    #[test]
    fn dispatch_follows_node_kind() {
        assert_eq!(
            ExpandRequest::for_node(&Node::root()),
            Some(ExpandRequest::Organizations)
        );
        assert_eq!(
            ExpandRequest::for_node(&branch_node()),
            Some(ExpandRequest::Branch {
                repo: "acme/api".to_owned(),
                name: "main".to_owned()
            })
        );

        let files = Fetched::Files {
            repo: "acme/api".to_owned(),
            reference: None,
            items: vec![file("README.md", 12)],
        };
        let readme = normalize(&files, ROOT_ID).subtree.nodes.remove(0);
        assert_eq!(ExpandRequest::for_node(&readme), None);
    }

    #[test]
    fn branch_expand_fetches_contributors_and_root_files_at_ref() {
        let mut source = StaticSource::default();
        source.files.insert(
            "acme/api@main:".to_owned(),
            vec![directory("src"), file("setup.py", 300)],
        );

        let request = ExpandRequest::for_node(&branch_node()).expect("expandable");
        let batches = request.fetch(&source).expect("fetch");

        assert_eq!(
            source.calls(),
            vec![
                "contributors:acme/api@main".to_owned(),
                "files:acme/api@main:".to_owned()
            ]
        );
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[1].item_count(), 2);
    }

    #[test]
    fn directory_expand_keeps_its_reference() {
        let source = StaticSource::default();
        let request = ExpandRequest::Directory {
            repo: "acme/api".to_owned(),
            reference: Some("dev".to_owned()),
            path: "src".to_owned(),
        };

        request.fetch(&source).expect("fetch");
        assert_eq!(source.calls(), vec!["files:acme/api@dev:src".to_owned()]);
    }

    #[test]
    fn any_failed_collection_fails_the_expand() {
        let mut source = StaticSource::default();
        source.failing.insert(
            "members:acme".to_owned(),
            ApiError::new(Some(403), "Forbidden"),
        );

        let request = ExpandRequest::Organization {
            login: "acme".to_owned(),
        };
        let error = request.fetch(&source).expect_err("members fail");
        assert_eq!(error.status, Some(403));
    }

    #[test]
    fn file_preview_fetches_at_the_node_reference() {
        let mut source = StaticSource::default();
        source.contents.insert(
            "acme/api@main:src/app.py".to_owned(),
            "print('hi')\n".to_owned(),
        );
        let files = Fetched::Files {
            repo: "acme/api".to_owned(),
            reference: Some("main".to_owned()),
            items: vec![file("src/app.py", 12), directory("docs")],
        };
        let nodes = normalize(&files, ROOT_ID).subtree.nodes;

        assert_eq!(PreviewRequest::for_node(&nodes[1]), None);
        let request = PreviewRequest::for_node(&nodes[0]).expect("file node");
        let preview = request.fetch(&source).expect("content");

        assert_eq!(source.calls(), vec!["content:acme/api@main:src/app.py".to_owned()]);
        assert_eq!(preview.language, "python");
        assert_eq!(preview.text, "print('hi')\n");
        assert!(!preview.truncated);
    }

    #[test]
    fn long_previews_are_cut_on_a_char_boundary() {
        let mut source = StaticSource::default();
        source.contents.insert(
            "acme/api@HEAD:notes.txt".to_owned(),
            "é".repeat(PREVIEW_CHAR_LIMIT + 10),
        );
        let request = PreviewRequest {
            repo: "acme/api".to_owned(),
            path: "notes.txt".to_owned(),
            reference: None,
        };

        let preview = request.fetch(&source).expect("content");
        assert!(preview.truncated);
        assert_eq!(preview.text.chars().count(), PREVIEW_CHAR_LIMIT);

        let missing = PreviewRequest {
            path: "gone.txt".to_owned(),
            ..request
        };
        assert_eq!(missing.fetch(&source).expect_err("missing").status, Some(404));
    }

    #[test]
    fn newer_request_supersedes_older() {
        let mut tracker = ExpandTracker::default();
        let first = tracker.begin("org:acme");
        let second = tracker.begin("org:acme");

        assert!(!tracker.complete("org:acme", first));
        assert_eq!(tracker.state("org:acme"), ExpandState::Pending { token: second });
        assert!(tracker.complete("org:acme", second));
        assert_eq!(tracker.state("org:acme"), ExpandState::Expanded);
        assert!(!tracker.complete("org:acme", second));
    }

    #[test]
    fn failure_is_recorded_and_retry_starts_fresh() {
        let mut tracker = ExpandTracker::default();
        let token = tracker.begin("repo:acme/api");
        assert!(tracker.fail("repo:acme/api", token, "boom".to_owned()));
        assert_eq!(
            tracker.state("repo:acme/api"),
            ExpandState::Failed {
                message: "boom".to_owned()
            }
        );
        assert_eq!(tracker.pending_count(), 0);

        let retry = tracker.begin("repo:acme/api");
        assert_ne!(retry, token);
        assert!(tracker.is_current("repo:acme/api", retry));
        assert_eq!(tracker.pending_count(), 1);
    }

    #[test]
    fn hit_test_prefers_topmost_node() {
        let mut graph = Graph::new();
        let batch = Fetched::Branches {
            repo: "acme/api".to_owned(),
            items: vec![named_branch("main"), named_branch("dev")],
        };
        graph.merge(normalize(&batch, ROOT_ID).subtree);
        graph.node_mut(ROOT_ID).expect("root").position = Some(vec2(0.0, 0.0));
        graph.node_mut("branch:acme/api:main").expect("main").position = Some(vec2(4.0, 0.0));
        graph.node_mut("branch:acme/api:dev").expect("dev").position = Some(vec2(300.0, 0.0));

        let hit = hit_test(&graph, vec2(2.0, 0.0), |node| node.radius).map(|node| node.id.as_str());
        assert_eq!(hit, Some("branch:acme/api:main"));
        assert!(hit_test(&graph, vec2(150.0, 150.0), |node| node.radius + 2.0).is_none());
    }
}
