use std::collections::HashSet;

use super::Graph;
use super::node::{Category, Node};

pub const VISIBLE_NODE_OPACITY: f32 = 1.0;
pub const HIDDEN_NODE_OPACITY: f32 = 0.2;
pub const VISIBLE_EDGE_OPACITY: f32 = 0.6;
pub const HIDDEN_EDGE_OPACITY: f32 = 0.1;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CategoryFilter {
    #[default]
    All,
    Only(Category),
}

impl CategoryFilter {
    pub fn matches(self, node: &Node) -> bool {
        match self {
            Self::All => true,
            Self::Only(category) => node.category == category,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Only(category) => category.label(),
        }
    }
}

/// Which nodes and edges are emphasized under the active filter.
///
/// Filtering never removes anything from the graph: non-matching nodes are
/// drawn faded, and an edge stays emphasized while either endpoint matches.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GraphView {
    visible_nodes: HashSet<String>,
    visible_edges: HashSet<usize>,
    revision: u64,
}

impl GraphView {
    pub(super) fn build(graph: &Graph, predicate: impl Fn(&Node) -> bool) -> Self {
        let visible_nodes = graph
            .nodes()
            .iter()
            .filter(|node| predicate(node))
            .map(|node| node.id.clone())
            .collect::<HashSet<_>>();

        let visible_edges = graph
            .edges()
            .iter()
            .enumerate()
            .filter(|(_, edge)| {
                visible_nodes.contains(&edge.source) || visible_nodes.contains(&edge.target)
            })
            .map(|(index, _)| index)
            .collect();

        Self {
            visible_nodes,
            visible_edges,
            revision: graph.revision(),
        }
    }

    /// View with every node and edge of `graph` visible.
    pub fn all(graph: &Graph) -> Self {
        Self::build(graph, |_| true)
    }


    pub fn is_node_visible(&self, id: &str) -> bool {
        self.visible_nodes.contains(id)
    }

    pub fn is_edge_visible(&self, index: usize) -> bool {
        self.visible_edges.contains(&index)
    }

    pub fn visible_node_count(&self) -> usize {
        self.visible_nodes.len()
    }

    pub fn visible_edge_count(&self) -> usize {
        self.visible_edges.len()
    }

    pub fn node_opacity(&self, id: &str) -> f32 {
        if self.is_node_visible(id) {
            VISIBLE_NODE_OPACITY
        } else {
            HIDDEN_NODE_OPACITY
        }
    }

    pub fn edge_opacity(&self, index: usize) -> f32 {
        if self.is_edge_visible(index) {
            VISIBLE_EDGE_OPACITY
        } else {
            HIDDEN_EDGE_OPACITY
        }
    }

    /// Opacity of edge `index` of `graph`. Once the graph has moved past the
    /// revision this view was built for, edge indices may have shifted, so
    /// the edge is judged by its endpoints instead.
    pub fn edge_opacity_in(&self, graph: &Graph, index: usize) -> f32 {
        if self.revision == graph.revision() {
            return self.edge_opacity(index);
        }
        match graph.edges().get(index) {
            Some(edge)
                if self.is_node_visible(&edge.source) || self.is_node_visible(&edge.target) =>
            {
                VISIBLE_EDGE_OPACITY
            }
            _ => HIDDEN_EDGE_OPACITY,
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::graph::{Edge, EdgeKind, Payload, ROOT_ID, Subtree};

    fn sample() -> Graph {
        let repo = Node::new(
            "repo:acme/api".to_owned(),
            "api".to_owned(),
            Category::Repository,
            Payload::Repository {
                full_name: "acme/api".to_owned(),
                description: None,
                language: None,
                default_branch: None,
                stars: 0,
                size: 0,
            },
        );
        let readme = Node::new(
            "file:acme/api@HEAD:README.md".to_owned(),
            "README.md".to_owned(),
            Category::Documentation,
            Payload::File {
                repository: "acme/api".to_owned(),
                reference: None,
                path: "README.md".to_owned(),
                size: 10,
            },
        );

        let mut graph = Graph::new();
        graph.merge(Subtree {
            edges: vec![
                Edge::new(ROOT_ID, &repo.id, EdgeKind::Owns, 1.0),
                Edge::new(&repo.id, &readme.id, EdgeKind::Contains, 1.0),
            ],
            nodes: vec![repo, readme],
        });
        graph
    }

    #[test]
    fn edges_stay_visible_while_either_endpoint_matches() {
        let graph = sample();
        let view = graph.filter(|node| CategoryFilter::Only(Category::Documentation).matches(node));

        assert_eq!(view.visible_node_count(), 1);
        assert!(view.is_node_visible("file:acme/api@HEAD:README.md"));
        assert!(!view.is_edge_visible(0));
        assert!(view.is_edge_visible(1));
        assert_eq!(view.node_opacity("repo:acme/api"), HIDDEN_NODE_OPACITY);
        assert_eq!(view.edge_opacity(0), HIDDEN_EDGE_OPACITY);
    }

    #[test]
    fn stale_view_judges_edges_by_endpoints() {
        let mut graph = sample();
        graph.merge(Subtree {
            nodes: Vec::new(),
            edges: vec![Edge::new(
                ROOT_ID,
                "file:acme/api@HEAD:README.md",
                EdgeKind::Contains,
                1.0,
            )],
        });
        let view = graph.filter(|node| CategoryFilter::Only(Category::Documentation).matches(node));
        assert_eq!(view.edge_opacity_in(&graph, 0), HIDDEN_EDGE_OPACITY);

        graph.remove("repo:acme/api", false);
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(view.edge_opacity(0), HIDDEN_EDGE_OPACITY);
        assert_eq!(view.edge_opacity_in(&graph, 0), VISIBLE_EDGE_OPACITY);
    }

    #[test]
    fn filtering_then_all_restores_everything() {
        let graph = sample();
        let before = graph.node_count();
        let narrowed = graph.filter(|node| CategoryFilter::Only(Category::Branch).matches(node));
        assert_eq!(narrowed.visible_node_count(), 0);
        assert_eq!(graph.node_count(), before);

        let restored = graph.filter(|node| CategoryFilter::All.matches(node));
        assert_eq!(restored, GraphView::all(&graph));
        assert_eq!(restored.visible_node_count(), graph.node_count());
        assert_eq!(restored.visible_edge_count(), graph.edge_count());
    }
}
