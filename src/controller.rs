use std::collections::VecDeque;

use eframe::egui::Vec2;
use log::{debug, info, warn};

use crate::error::ApiError;
use crate::github::Fetched;
use crate::graph::{CategoryFilter, Graph, GraphView, ROOT_ID, Subtree, normalize};
use crate::interaction::{
    ClickAction, DragState, ExpandRequest, ExpandState, ExpandTracker, RequestToken,
};
use crate::layout::{LayoutConfig, LayoutEngine, TickOutcome};
use crate::render::{Frame, build_frame};

/// Downstream consumer of graph changes, typically a drawing surface.
pub trait RenderSurface {
    /// Called once per tick that merged anything, with the ids that are new.
    fn on_merge(&mut self, new_ids: &[String], graph: &Graph);

    /// Called after every layout step that moved nodes.
    fn on_tick(&mut self, positions: &[(&str, Vec2)]);

    fn on_filter_changed(&mut self, view: &GraphView);
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ControllerConfig {
    /// Keep a dragged node pinned where it was dropped.
    pub lock_on_drop: bool,
    pub layout: LayoutConfig,
}

struct PendingMerge {
    node_id: String,
    /// `None` for cached expansions, which bypass request tracking.
    token: Option<RequestToken>,
    batches: Vec<Fetched>,
}

/// An expansion that made it into the graph on this tick.
#[derive(Clone, Debug, PartialEq)]
pub struct AcceptedExpansion {
    pub node_id: String,
    pub batches: Vec<Fetched>,
}

#[derive(Debug, PartialEq)]
pub struct TickReport {
    pub merged: Vec<AcceptedExpansion>,
    pub added: Vec<String>,
    pub skipped_records: usize,
    pub layout: TickOutcome,
}

/// Owns the graph store and drives layout, interaction and rendering.
///
/// Fetch results never touch the graph directly: they are queued by
/// `complete_expand`/`enqueue_cached` and applied at the start of the next
/// `tick`, so a layout step always sees a stable node array.
pub struct Visualization<S> {
    config: ControllerConfig,
    graph: Graph,
    layout: LayoutEngine,
    expand: ExpandTracker,
    pending: VecDeque<PendingMerge>,
    filter: CategoryFilter,
    view: GraphView,
    drag: Option<DragState>,
    surface: S,
}

impl<S: RenderSurface> Visualization<S> {
    pub fn new(config: ControllerConfig, surface: S) -> Self {
        let graph = Graph::new();
        let view = GraphView::all(&graph);
        Self {
            config,
            layout: LayoutEngine::new(config.layout),
            graph,
            expand: ExpandTracker::default(),
            pending: VecDeque::new(),
            filter: CategoryFilter::All,
            view,
            drag: None,
            surface,
        }
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn view(&self) -> &GraphView {
        &self.view
    }

    pub fn filter(&self) -> CategoryFilter {
        self.filter
    }

    pub fn layout(&self) -> &LayoutEngine {
        &self.layout
    }

    pub fn expand_state(&self, node_id: &str) -> ExpandState {
        self.expand.state(node_id)
    }

    pub fn pending_requests(&self) -> usize {
        self.expand.pending_count()
    }

    pub fn queued_merges(&self) -> usize {
        self.pending.len()
    }

    pub fn dragging(&self) -> Option<&str> {
        self.drag.as_ref().map(|drag| drag.node_id.as_str())
    }

    pub fn lock_on_drop(&self) -> bool {
        self.config.lock_on_drop
    }

    pub fn set_lock_on_drop(&mut self, lock_on_drop: bool) {
        self.config.lock_on_drop = lock_on_drop;
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    /// Expands a collapsed (or failed) expandable node; anything else is
    /// selected. A click on a node already pending supersedes that request.
    pub fn click(&mut self, node_id: &str) -> ClickAction {
        match self.expand.state(node_id) {
            ExpandState::Expanded => ClickAction::Select {
                node_id: node_id.to_owned(),
            },
            _ => self.expand(node_id),
        }
    }

    /// Starts a fresh expand regardless of the node's current state.
    pub fn expand(&mut self, node_id: &str) -> ClickAction {
        let Some(node) = self.graph.node(node_id) else {
            return ClickAction::Ignored;
        };
        let Some(request) = ExpandRequest::for_node(node) else {
            return ClickAction::Select {
                node_id: node_id.to_owned(),
            };
        };

        let token = self.expand.begin(node_id);
        debug!("expanding {node_id} with {request:?}");
        ClickAction::Expand {
            node_id: node_id.to_owned(),
            token,
            request,
        }
    }

    /// Hands back the result of an expand. Returns whether it was queued;
    /// superseded results and failures are not.
    pub fn complete_expand(
        &mut self,
        node_id: &str,
        token: RequestToken,
        result: Result<Vec<Fetched>, ApiError>,
    ) -> bool {
        if !self.expand.is_current(node_id, token) {
            debug!("ignoring superseded expand result for {node_id}");
            return false;
        }

        match result {
            Ok(batches) => {
                self.pending.push_back(PendingMerge {
                    node_id: node_id.to_owned(),
                    token: Some(token),
                    batches,
                });
                true
            }
            Err(error) => {
                warn!("expand of {node_id} failed: {error}");
                self.expand.fail(node_id, token, error.to_string());
                false
            }
        }
    }

    /// Queues batches restored from the session cache for `node_id`.
    pub fn enqueue_cached(&mut self, node_id: &str, batches: Vec<Fetched>) {
        self.pending.push_back(PendingMerge {
            node_id: node_id.to_owned(),
            token: None,
            batches,
        });
    }

    /// Drains the pending queue once, then advances the layout one step.
    pub fn tick(&mut self) -> TickReport {
        let drained = std::mem::take(&mut self.pending);
        let mut merged = Vec::new();
        let mut added = Vec::new();
        let mut skipped_records = 0;

        for pending in drained {
            if !self.graph.contains(&pending.node_id) {
                debug!("dropping merge for removed node {}", pending.node_id);
                continue;
            }
            match pending.token {
                Some(token) => {
                    if !self.expand.complete(&pending.node_id, token) {
                        debug!("dropping superseded merge for {}", pending.node_id);
                        continue;
                    }
                }
                None => self.expand.mark_expanded(&pending.node_id),
            }

            debug!(
                "merging {} records under {}",
                pending.batches.iter().map(Fetched::item_count).sum::<usize>(),
                pending.node_id
            );
            let mut subtree = Subtree::default();
            for batch in &pending.batches {
                let normalized = normalize(batch, &pending.node_id);
                skipped_records += normalized.skipped.len();
                subtree.extend(normalized.subtree);
            }
            let outcome = self.graph.merge(subtree);
            added.extend(outcome.added);
            merged.push(AcceptedExpansion {
                node_id: pending.node_id,
                batches: pending.batches,
            });
        }

        if !merged.is_empty() {
            if !added.is_empty() {
                self.layout.seed_new_nodes(&mut self.graph, &added);
                self.layout.reheat_for_merge();
            }
            self.refresh_view();
            self.surface.on_merge(&added, &self.graph);
            self.surface.on_filter_changed(&self.view);
        }

        let layout = self.layout.tick(&mut self.graph);
        if layout.moved() {
            self.emit_positions();
        }

        TickReport {
            merged,
            added,
            skipped_records,
            layout,
        }
    }

    /// Pins `node_id` where it currently is.
    pub fn drag_start(&mut self, node_id: &str) -> bool {
        let Some(node) = self.graph.node(node_id) else {
            return false;
        };
        let was_pinned = node.pinned.is_some();
        let Some(position) = self.graph.anchor_position(node_id) else {
            return false;
        };

        self.graph.set_pinned(node_id, Some(position));
        self.layout.hold_for_drag(true);
        self.drag = Some(DragState {
            node_id: node_id.to_owned(),
            was_pinned,
        });
        true
    }

    pub fn drag_move(&mut self, world: Vec2) {
        let Some(drag) = &self.drag else {
            return;
        };
        self.graph.set_pinned(&drag.node_id, Some(world));
        self.layout.reheat(self.config.layout.drag_alpha_target);
    }

    /// Releases the drag. The node stays pinned when lock-on-drop is on or
    /// when it was already pinned before the drag began.
    pub fn drag_end(&mut self) {
        let Some(drag) = self.drag.take() else {
            return;
        };
        if !self.config.lock_on_drop && !drag.was_pinned {
            self.graph.set_pinned(&drag.node_id, None);
        }
        self.layout.hold_for_drag(false);
    }

    pub fn unpin(&mut self, node_id: &str) -> bool {
        let was_pinned = self
            .graph
            .node(node_id)
            .is_some_and(|node| node.pinned.is_some());
        if !was_pinned {
            return false;
        }
        self.graph.set_pinned(node_id, None);
        self.layout.reheat_for_merge();
        true
    }

    pub fn set_filter(&mut self, filter: CategoryFilter) {
        self.filter = filter;
        self.refresh_view();
        debug!(
            "filter {} leaves {} of {} nodes visible",
            filter.label(),
            self.view.visible_node_count(),
            self.graph.node_count()
        );
        self.surface.on_filter_changed(&self.view);
    }

    /// Removes a node (and with `cascade`, whatever it orphaned). Queued
    /// merges for removed nodes are dropped.
    pub fn remove(&mut self, node_id: &str, cascade: bool) -> Vec<String> {
        let removed = self.graph.remove(node_id, cascade);
        if removed.is_empty() {
            return removed;
        }

        self.layout.forget(&removed);
        self.expand.forget(&removed);
        self.pending
            .retain(|pending| !removed.contains(&pending.node_id));
        if self
            .drag
            .as_ref()
            .is_some_and(|drag| removed.contains(&drag.node_id))
        {
            self.drag = None;
            self.layout.hold_for_drag(false);
        }

        self.layout.reheat_for_merge();
        self.refresh_view();
        self.surface.on_filter_changed(&self.view);
        removed
    }

    /// Back to a lone root. Requests still in flight are orphaned by the
    /// cleared tracker and ignored when they report back.
    pub fn reset(&mut self) {
        info!("resetting graph ({} nodes)", self.graph.node_count());
        self.graph.reset();
        self.layout.reset();
        self.expand.clear();
        self.pending.clear();
        self.drag = None;
        self.refresh_view();
        self.surface.on_merge(&[ROOT_ID.to_owned()], &self.graph);
        self.surface.on_filter_changed(&self.view);
    }

    pub fn reheat(&mut self, alpha: f32) {
        self.layout.reheat(alpha);
    }

    /// Runs the layout to rest (or to its cap) without waiting for frames.
    pub fn settle(&mut self) -> TickOutcome {
        let outcome = self.layout.run(&mut self.graph);
        if outcome.moved() {
            self.emit_positions();
        }
        outcome
    }

    pub fn frame(&self) -> Frame<'_> {
        build_frame(&self.graph, &self.view, &self.expand)
    }

    fn emit_positions(&mut self) {
        let positions = self
            .graph
            .nodes()
            .iter()
            .filter_map(|node| Some((node.id.as_str(), node.current_position()?)))
            .collect::<Vec<_>>();
        self.surface.on_tick(&positions);
    }

    fn refresh_view(&mut self) {
        let filter = self.filter;
        self.view = self.graph.filter(|node| filter.matches(node));
    }
}
