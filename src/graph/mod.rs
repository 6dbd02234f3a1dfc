mod node;
mod normalize;
mod view;

use std::collections::{HashMap, HashSet, VecDeque};

use eframe::egui::Vec2;
use log::debug;

pub use node::{Category, Edge, EdgeKind, Node, NodeKind, Payload, ROOT_ID};
pub use normalize::{Subtree, normalize, retain_records};
pub use view::{CategoryFilter, GraphView};

use node::EdgeKey;

/// What a `merge` changed. `added` seeds the layout for just the new nodes.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MergeOutcome {
    pub added: Vec<String>,
    pub updated: usize,
    pub added_edges: usize,
    pub dropped_edges: usize,
}

/// Node map, ordered edge list and the adjacency index derived from them.
///
/// Nodes keep insertion order so drawing and simulation iterate
/// deterministically; `index_by_id` maps ids into that order.
#[derive(Clone, Debug)]
pub struct Graph {
    nodes: Vec<Node>,
    index_by_id: HashMap<String, usize>,
    edges: Vec<Edge>,
    edge_keys: HashSet<EdgeKey>,
    adjacency: HashMap<String, Vec<usize>>,
    revision: u64,
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl Graph {
    pub fn new() -> Self {
        let mut graph = Self {
            nodes: Vec::new(),
            index_by_id: HashMap::new(),
            edges: Vec::new(),
            edge_keys: HashSet::new(),
            adjacency: HashMap::new(),
            revision: 0,
        };
        graph.reset();
        graph
    }

    /// Drops everything except a fresh root node.
    pub fn reset(&mut self) {
        self.nodes.clear();
        self.edges.clear();
        self.nodes.push(Node::root());
        self.rebuild_indexes();
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Bumped on every structural change (node or edge added or removed).
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index_by_id.contains_key(id)
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.index_by_id.get(id).copied()
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.index_of(id).map(|index| &self.nodes[index])
    }

    pub(crate) fn node_mut(&mut self, id: &str) -> Option<&mut Node> {
        let index = self.index_of(id)?;
        self.nodes.get_mut(index)
    }

    pub(crate) fn nodes_mut(&mut self) -> &mut [Node] {
        &mut self.nodes
    }

    /// Indices into `edges()` of every edge touching `id`.
    pub fn adjacency(&self, id: &str) -> &[usize] {
        self.adjacency.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn incident_edges<'a>(&'a self, id: &str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.adjacency(id)
            .iter()
            .filter_map(|&index| self.edges.get(index))
    }

    /// The first node with an edge into `id`, used to place newcomers.
    pub fn parent_of(&self, id: &str) -> Option<&Node> {
        self.incident_edges(id)
            .find(|edge| edge.target == id)
            .and_then(|edge| self.node(&edge.source))
    }

    /// Where `id` should appear before the layout has placed it: its own
    /// position, else the nearest positioned node among its neighbors.
    pub fn anchor_position(&self, id: &str) -> Option<Vec2> {
        let node = self.node(id)?;
        if let Some(position) = node.current_position() {
            return Some(position);
        }

        if let Some(position) = self.parent_of(id).and_then(Node::current_position) {
            return Some(position);
        }

        self.incident_edges(id)
            .filter_map(|edge| {
                let other = if edge.source == id {
                    &edge.target
                } else {
                    &edge.source
                };
                self.node(other).and_then(Node::current_position)
            })
            .next()
    }

    /// Additive merge: new ids are inserted, known ids only take the fresh
    /// payload so live `position`/`pinned` state is untouched. Edges whose
    /// endpoints are missing after the node pass are dropped.
    pub fn merge(&mut self, subtree: Subtree) -> MergeOutcome {
        let mut outcome = MergeOutcome::default();
        let mut structural = false;

        for node in subtree.nodes {
            match self.index_of(&node.id) {
                Some(index) => {
                    let existing = &mut self.nodes[index];
                    let payload = existing.payload.merged_with(node.payload);
                    if existing.payload != payload {
                        existing.radius = payload.radius();
                        existing.payload = payload;
                        outcome.updated += 1;
                    }
                }
                None => {
                    self.index_by_id.insert(node.id.clone(), self.nodes.len());
                    outcome.added.push(node.id.clone());
                    self.nodes.push(node);
                    structural = true;
                }
            }
        }

        for edge in subtree.edges {
            if !self.contains(&edge.source) || !self.contains(&edge.target) {
                debug!(
                    "dropping {} edge {} -> {}: endpoint missing",
                    edge.kind.label(),
                    edge.source,
                    edge.target
                );
                outcome.dropped_edges += 1;
                continue;
            }

            let key = edge.key();
            if self.edge_keys.contains(&key) {
                if let Some(existing) = self
                    .edges
                    .iter_mut()
                    .find(|existing| existing.key() == key)
                {
                    existing.weight = edge.weight;
                }
                continue;
            }

            self.edge_keys.insert(key);
            self.edges.push(edge);
            outcome.added_edges += 1;
            structural = true;
        }

        if structural {
            self.rebuild_indexes();
        }

        debug!(
            "merge: {} nodes added, {} updated, {} edges added, {} dropped",
            outcome.added.len(),
            outcome.updated,
            outcome.added_edges,
            outcome.dropped_edges
        );
        outcome
    }

    /// Removes `id` and its incident edges. With `cascade`, any node no longer
    /// reachable from the root is removed too. The root itself is never
    /// removed here; use `reset`.
    pub fn remove(&mut self, id: &str, cascade: bool) -> Vec<String> {
        if id == ROOT_ID || !self.contains(id) {
            return Vec::new();
        }

        let mut doomed = HashSet::new();
        doomed.insert(id.to_owned());
        self.edges.retain(|edge| !edge.touches(id));

        if cascade {
            let reachable = self.reachable_from_root();
            for node in &self.nodes {
                if !reachable.contains(node.id.as_str()) {
                    doomed.insert(node.id.clone());
                }
            }
            self.edges
                .retain(|edge| !doomed.contains(&edge.source) && !doomed.contains(&edge.target));
        }

        let mut removed = Vec::with_capacity(doomed.len());
        self.nodes.retain(|node| {
            if doomed.contains(&node.id) {
                removed.push(node.id.clone());
                false
            } else {
                true
            }
        });
        self.rebuild_indexes();

        debug!("removed {} nodes starting at {id}", removed.len());
        removed
    }

    /// Opacity view of the nodes matching `predicate`; the graph is untouched.
    pub fn filter(&self, predicate: impl Fn(&Node) -> bool) -> GraphView {
        GraphView::build(self, predicate)
    }

    /// Ids along edge direction from the root to `target`, inclusive.
    pub fn path_from_root(&self, target: &str) -> Option<Vec<String>> {
        if !self.contains(target) {
            return None;
        }
        if target == ROOT_ID {
            return Some(vec![ROOT_ID.to_owned()]);
        }

        let mut queue = VecDeque::new();
        let mut parent: HashMap<&str, &str> = HashMap::new();
        let mut visited = HashSet::new();
        queue.push_back(ROOT_ID);
        visited.insert(ROOT_ID);

        while let Some(current) = queue.pop_front() {
            if current == target {
                break;
            }
            for edge in self.incident_edges(current) {
                if edge.source != current || !visited.insert(edge.target.as_str()) {
                    continue;
                }
                parent.insert(edge.target.as_str(), current);
                queue.push_back(edge.target.as_str());
            }
        }

        if !visited.contains(target) {
            return None;
        }

        let mut path = vec![target.to_owned()];
        let mut cursor = target;
        while cursor != ROOT_ID {
            cursor = *parent.get(cursor)?;
            path.push(cursor.to_owned());
        }
        path.reverse();
        Some(path)
    }

    pub(crate) fn set_pinned(&mut self, id: &str, pinned: Option<Vec2>) -> bool {
        let Some(node) = self.node_mut(id) else {
            return false;
        };
        node.pinned = pinned;
        if let Some(position) = pinned {
            node.position = Some(position);
        }
        true
    }

    fn reachable_from_root(&self) -> HashSet<&str> {
        let mut outgoing: HashMap<&str, Vec<&str>> = HashMap::new();
        for edge in &self.edges {
            outgoing
                .entry(edge.source.as_str())
                .or_default()
                .push(edge.target.as_str());
        }

        let mut reachable = HashSet::new();
        let mut queue = VecDeque::from([ROOT_ID]);
        reachable.insert(ROOT_ID);
        while let Some(current) = queue.pop_front() {
            for &next in outgoing.get(current).map(Vec::as_slice).unwrap_or(&[]) {
                if reachable.insert(next) {
                    queue.push_back(next);
                }
            }
        }
        reachable
    }

    fn rebuild_indexes(&mut self) {
        self.index_by_id.clear();
        for (index, node) in self.nodes.iter().enumerate() {
            self.index_by_id.insert(node.id.clone(), index);
        }

        let known = &self.index_by_id;
        self.edges
            .retain(|edge| known.contains_key(&edge.source) && known.contains_key(&edge.target));

        self.edge_keys.clear();
        self.adjacency.clear();
        for (index, edge) in self.edges.iter().enumerate() {
            self.edge_keys.insert(edge.key());
            self.adjacency
                .entry(edge.source.clone())
                .or_default()
                .push(index);
            if edge.target != edge.source {
                self.adjacency
                    .entry(edge.target.clone())
                    .or_default()
                    .push(index);
            }
        }

        self.revision = self.revision.wrapping_add(1);
    }
}
