mod forces;
mod quadtree;

use std::collections::HashMap;
use std::f32::consts::TAU;
use std::time::{Duration, Instant};

use eframe::egui::{Vec2, vec2};
use log::{debug, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::LayoutStall;
use crate::graph::{Graph, NodeKind};

use forces::{Collision, Repulsion, repulsion_on, resolve_collisions};
use quadtree::Quadtree;

const BARNES_HUT_THETA: f32 = 0.72;
const REPULSION_SOFTENING: f32 = 620.0;
const SPRING_DAMPING: f32 = 0.22;
const ROOT_PULL: f32 = 0.036;
const FORCE_GAIN: f32 = 0.055;
const MAX_FORCE: f32 = 255.0;
const MAX_SPEED: f32 = 26.0;

/// Tuning for the force simulation. Values are clamped when used.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LayoutConfig {
    pub center: Vec2,
    pub alpha_min: f32,
    pub alpha_decay: f32,
    /// Alpha floor applied when new nodes are merged.
    pub reheat_alpha: f32,
    /// Alpha the simulation is held at while a node is being dragged.
    pub drag_alpha_target: f32,
    pub velocity_damping: f32,
    pub repulsion: f32,
    pub link_distance: f32,
    pub link_strength: f32,
    pub collision_padding: f32,
    pub collision_strength: f32,
    pub center_strength: f32,
    pub seed_jitter: f32,
    pub max_ticks: usize,
    pub max_duration: Duration,
    pub seed: u64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            center: Vec2::ZERO,
            alpha_min: 0.001,
            alpha_decay: 0.0228,
            reheat_alpha: 0.3,
            drag_alpha_target: 0.3,
            velocity_damping: 0.9,
            repulsion: 78_000.0,
            link_distance: 120.0,
            link_strength: 0.016,
            collision_padding: 1.2,
            collision_strength: 0.7,
            center_strength: 0.003,
            seed_jitter: 24.0,
            max_ticks: 600,
            max_duration: Duration::from_secs(3),
            seed: 0x6a74_6c61,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LayoutStatus {
    Running,
    Settled,
    Stalled,
}

impl LayoutStatus {
    pub fn label(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Settled => "settled",
            Self::Stalled => "stalled",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum TickOutcome {
    /// Positions moved and the simulation still has energy.
    Running,
    /// Alpha dropped below the threshold on this tick.
    Converged,
    /// The tick or time cap was hit first; positions are kept as they are.
    Stalled(LayoutStall),
    /// Nothing to do until the next reheat.
    Idle,
}

impl TickOutcome {
    pub fn moved(&self) -> bool {
        !matches!(self, Self::Idle)
    }
}

#[derive(Default)]
struct Scratch {
    positions: Vec<Vec2>,
    velocities: Vec<Vec2>,
    forces: Vec<Vec2>,
    radii: Vec<f32>,
    pinned: Vec<bool>,
    stack: Vec<usize>,
}

pub struct LayoutEngine {
    config: LayoutConfig,
    alpha: f32,
    alpha_target: f32,
    velocities: HashMap<String, Vec2>,
    ticks: usize,
    started_at: Option<Instant>,
    status: LayoutStatus,
    rng: StdRng,
    scratch: Scratch,
}

impl LayoutEngine {
    pub fn new(config: LayoutConfig) -> Self {
        Self {
            config,
            alpha: 1.0,
            alpha_target: 0.0,
            velocities: HashMap::new(),
            ticks: 0,
            started_at: None,
            status: LayoutStatus::Running,
            rng: StdRng::seed_from_u64(config.seed),
            scratch: Scratch::default(),
        }
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    pub fn status(&self) -> LayoutStatus {
        self.status
    }

    /// Ticks since the last reheat.
    pub fn ticks(&self) -> usize {
        self.ticks
    }

    /// Places nodes that have no position yet next to their parent.
    /// Nodes that already have a position are left alone.
    pub fn seed_new_nodes(&mut self, graph: &mut Graph, ids: &[String]) {
        for id in ids {
            let Some(node) = graph.node(id) else {
                continue;
            };
            if node.current_position().is_some() {
                continue;
            }

            let anchor = graph.anchor_position(id).unwrap_or(self.config.center);
            let position = anchor + self.jitter();
            if let Some(node) = graph.node_mut(id) {
                node.position = Some(position);
            }
            self.velocities.remove(id);
        }
    }

    /// Raises alpha to at least `alpha` without touching positions, and
    /// restarts the tick and time budget.
    pub fn reheat(&mut self, alpha: f32) {
        self.alpha = self.alpha.max(alpha.clamp(0.0, 1.0));
        self.restart_budget();
    }

    pub fn reheat_for_merge(&mut self) {
        self.reheat(self.config.reheat_alpha);
    }

    /// Holds the simulation warm (drag) or lets it cool (`0.0`).
    pub fn set_alpha_target(&mut self, target: f32) {
        self.alpha_target = target.clamp(0.0, 1.0);
        if self.alpha_target > 0.0 {
            self.restart_budget();
        }
    }

    pub fn hold_for_drag(&mut self, held: bool) {
        let target = if held {
            self.config.drag_alpha_target
        } else {
            0.0
        };
        self.set_alpha_target(target);
    }

    pub fn forget(&mut self, ids: &[String]) {
        for id in ids {
            self.velocities.remove(id);
        }
    }

    pub fn reset(&mut self) {
        self.velocities.clear();
        self.alpha = 1.0;
        self.alpha_target = 0.0;
        self.restart_budget();
    }

    /// Advances one simulation step.
    pub fn tick(&mut self, graph: &mut Graph) -> TickOutcome {
        if self.status != LayoutStatus::Running {
            return TickOutcome::Idle;
        }

        let started_at = *self.started_at.get_or_insert_with(Instant::now);
        self.alpha += (self.alpha_target - self.alpha) * self.config.alpha_decay.clamp(1.0e-4, 1.0);
        self.ticks += 1;
        self.step(graph);

        if self.alpha < self.config.alpha_min.max(0.0) {
            self.status = LayoutStatus::Settled;
            debug!(
                "layout converged after {} ticks ({} nodes)",
                self.ticks,
                graph.node_count()
            );
            return TickOutcome::Converged;
        }

        if self.ticks >= self.config.max_ticks.max(1) || started_at.elapsed() >= self.config.max_duration {
            let stall = LayoutStall {
                ticks: self.ticks,
                alpha: self.alpha,
            };
            warn!("{stall}; keeping current positions");
            self.status = LayoutStatus::Stalled;
            return TickOutcome::Stalled(stall);
        }

        TickOutcome::Running
    }

    /// Ticks until the simulation converges or hits its cap.
    pub fn run(&mut self, graph: &mut Graph) -> TickOutcome {
        loop {
            match self.tick(graph) {
                TickOutcome::Running => continue,
                outcome => return outcome,
            }
        }
    }

    fn restart_budget(&mut self) {
        self.ticks = 0;
        self.started_at = None;
        self.status = LayoutStatus::Running;
    }

    fn jitter(&mut self) -> Vec2 {
        let reach = self.config.seed_jitter.max(1.0);
        let angle = self.rng.gen_range(0.0..TAU);
        let distance = self.rng.gen_range(reach * 0.5..=reach);
        vec2(angle.cos(), angle.sin()) * distance
    }

    fn step(&mut self, graph: &mut Graph) {
        let unplaced = graph
            .nodes()
            .iter()
            .filter(|node| !node.current_position().is_some_and(|position| position.is_finite()))
            .map(|node| node.id.clone())
            .collect::<Vec<_>>();
        if !unplaced.is_empty() {
            for id in &unplaced {
                if let Some(node) = graph.node_mut(id) {
                    node.position = None;
                }
            }
            self.seed_new_nodes(graph, &unplaced);
        }

        let node_count = graph.node_count();
        if node_count == 0 {
            return;
        }

        let config = self.config;
        let alpha = self.alpha;
        let scratch = &mut self.scratch;
        scratch.positions.clear();
        scratch.velocities.clear();
        scratch.radii.clear();
        scratch.pinned.clear();
        scratch.forces.clear();
        scratch.forces.resize(node_count, Vec2::ZERO);
        let mut root_index = None;
        for (index, node) in graph.nodes().iter().enumerate() {
            scratch
                .positions
                .push(node.current_position().unwrap_or(config.center));
            scratch
                .velocities
                .push(self.velocities.get(&node.id).copied().unwrap_or(Vec2::ZERO));
            scratch.radii.push(node.radius);
            scratch.pinned.push(node.pinned.is_some());
            if node.kind() == NodeKind::Root {
                root_index = Some(index);
            }
        }

        if let Some(tree) = Quadtree::build(&scratch.positions, &scratch.radii) {
            let repulsion = Repulsion {
                strength: config.repulsion.max(0.0),
                softening: REPULSION_SOFTENING,
                theta: BARNES_HUT_THETA,
            };
            for index in 0..node_count {
                scratch.forces[index] +=
                    repulsion_on(&tree, index, &scratch.positions, repulsion, &mut scratch.stack);
            }
        }

        let link_strength = config.link_strength.clamp(0.0, 1.0);
        for edge in graph.edges() {
            let (Some(from), Some(to)) = (graph.index_of(&edge.source), graph.index_of(&edge.target))
            else {
                continue;
            };
            if from == to {
                continue;
            }

            let delta = scratch.positions[from] - scratch.positions[to];
            let distance_sq = delta.length_sq();
            if distance_sq <= 1.0e-8 {
                continue;
            }
            let distance = distance_sq.sqrt();
            let direction = delta / distance;

            let degree = graph
                .adjacency(&edge.source)
                .len()
                .min(graph.adjacency(&edge.target).len())
                .max(1);
            let preferred =
                config.link_distance.max(0.0) + (scratch.radii[from] + scratch.radii[to]) * 2.0;
            let spring = (distance - preferred) * link_strength / degree as f32;
            let relative_velocity = scratch.velocities[from] - scratch.velocities[to];
            let damping = relative_velocity.dot(direction) * SPRING_DAMPING * link_strength;
            let correction = direction * (spring + damping);
            scratch.forces[from] -= correction;
            scratch.forces[to] += correction;
        }

        let center_strength = config.center_strength.clamp(0.0, 1.0);
        for (index, force) in scratch.forces.iter_mut().enumerate() {
            let offset = scratch.positions[index] - config.center;
            *force -= offset * center_strength;
            if Some(index) == root_index {
                *force -= offset * ROOT_PULL;
            }
        }

        let damping = config.velocity_damping.clamp(0.5, 0.99);
        for index in 0..node_count {
            if scratch.pinned[index] {
                scratch.velocities[index] = Vec2::ZERO;
                continue;
            }

            let mut force = scratch.forces[index];
            let force_length = force.length();
            if force_length > MAX_FORCE {
                force *= MAX_FORCE / force_length;
            }

            let mut velocity = (scratch.velocities[index] + force * (FORCE_GAIN * alpha)) * damping;
            let speed = velocity.length();
            if speed > MAX_SPEED {
                velocity *= MAX_SPEED / speed;
            }
            scratch.velocities[index] = velocity;
            scratch.positions[index] += velocity;
        }

        if let Some(tree) = Quadtree::build(&scratch.positions, &scratch.radii) {
            resolve_collisions(
                &tree,
                &mut scratch.positions,
                &scratch.radii,
                &scratch.pinned,
                Collision {
                    padding: config.collision_padding.max(1.0),
                    strength: config.collision_strength.clamp(0.0, 1.0),
                },
                &mut scratch.stack,
            );
        }

        for (index, node) in graph.nodes_mut().iter_mut().enumerate() {
            if let Some(pinned) = node.pinned {
                node.position = Some(pinned);
                self.velocities.remove(&node.id);
                continue;
            }

            node.position = Some(scratch.positions[index]);
            match self.velocities.get_mut(&node.id) {
                Some(velocity) => *velocity = scratch.velocities[index],
                None => {
                    self.velocities
                        .insert(node.id.clone(), scratch.velocities[index]);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::github::Fetched;
    use crate::github::testing::{named_branch, named_repo};
    use crate::graph::{ROOT_ID, normalize};

    fn config() -> LayoutConfig {
        LayoutConfig {
            seed: 7,
            max_duration: Duration::from_secs(30),
            ..LayoutConfig::default()
        }
    }

    fn with_repos(names: &[&str]) -> Graph {
        let mut graph = Graph::new();
        let batch = Fetched::Repositories {
            org: "acme".to_owned(),
            items: names.iter().map(|name| named_repo(name)).collect(),
        };
        graph.merge(normalize(&batch, ROOT_ID).subtree);
        graph
    }

    fn position(graph: &Graph, id: &str) -> Vec2 {
        graph
            .node(id)
            .and_then(|node| node.current_position())
            .expect("positioned node")
    }

    #[test]
    fn coincident_nodes_are_pushed_beyond_their_radii() {
        let mut graph = with_repos(&["acme/api", "acme/web"]);
        for id in ["repo:acme/api", "repo:acme/web"] {
            graph.node_mut(id).expect("repo").position = Some(vec2(10.0, 10.0));
        }
        let mut engine = LayoutEngine::new(config());

        for _ in 0..60 {
            engine.tick(&mut graph);
        }

        let api = graph.node("repo:acme/api").expect("api");
        let web = graph.node("repo:acme/web").expect("web");
        let distance = (position(&graph, &api.id) - position(&graph, &web.id)).length();
        assert!(
            distance > api.radius + web.radius,
            "still overlapping at {distance}"
        );
    }

    #[test]
    fn disconnected_graph_terminates_within_cap() {
        let names = (0..30).map(|index| format!("acme/r{index}")).collect::<Vec<_>>();
        let batch = Fetched::Repositories {
            org: "acme".to_owned(),
            items: names.iter().map(|name| named_repo(name)).collect(),
        };
        let mut subtree = normalize(&batch, ROOT_ID).subtree;
        subtree.edges.clear();
        let mut graph = Graph::new();
        graph.merge(subtree);
        assert_eq!(graph.edge_count(), 0);
        let mut engine = LayoutEngine::new(config());

        let outcome = engine.run(&mut graph);

        assert!(matches!(outcome, TickOutcome::Converged | TickOutcome::Stalled(_)));
        assert!(engine.ticks() <= config().max_ticks);
        assert_eq!(engine.tick(&mut graph), TickOutcome::Idle);
    }

    #[test]
    fn pinned_pair_on_same_spot_still_terminates() {
        let mut graph = with_repos(&["acme/api", "acme/web"]);
        graph.set_pinned("repo:acme/api", Some(vec2(5.0, 5.0)));
        graph.set_pinned("repo:acme/web", Some(vec2(5.0, 5.0)));
        let mut engine = LayoutEngine::new(config());

        let outcome = engine.run(&mut graph);

        assert!(matches!(outcome, TickOutcome::Converged | TickOutcome::Stalled(_)));
        assert_eq!(position(&graph, "repo:acme/api"), vec2(5.0, 5.0));
        assert_eq!(position(&graph, "repo:acme/web"), vec2(5.0, 5.0));
    }

    #[test]
    fn pinned_node_is_not_moved_by_forces() {
        let mut graph = with_repos(&["acme/api", "acme/web", "acme/cli"]);
        graph.set_pinned("repo:acme/api", Some(vec2(100.0, 200.0)));
        let mut engine = LayoutEngine::new(config());

        for _ in 0..25 {
            engine.tick(&mut graph);
            assert_eq!(position(&graph, "repo:acme/api"), vec2(100.0, 200.0));
        }
        assert_eq!(
            graph.node("repo:acme/api").and_then(|node| node.position),
            Some(vec2(100.0, 200.0))
        );
    }

    #[test]
    fn tick_cap_reports_stall() {
        let mut graph = with_repos(&["acme/api", "acme/web"]);
        let mut engine = LayoutEngine::new(LayoutConfig {
            max_ticks: 5,
            ..config()
        });

        let outcome = engine.run(&mut graph);

        let TickOutcome::Stalled(stall) = outcome else {
            panic!("expected a stall, got {outcome:?}");
        };
        assert_eq!(stall.ticks, 5);
        assert_eq!(engine.status(), LayoutStatus::Stalled);
        assert!(graph.nodes().iter().all(|node| node.position.is_some()));
    }

    #[test]
    fn small_graph_settles() {
        let mut graph = with_repos(&["acme/api", "acme/web"]);
        let mut engine = LayoutEngine::new(config());

        assert_eq!(engine.run(&mut graph), TickOutcome::Converged);
        assert_eq!(engine.status(), LayoutStatus::Settled);
        assert!(engine.alpha() < config().alpha_min);
    }

    #[test]
    fn reheat_keeps_existing_positions_and_seeds_near_parent() {
        let mut graph = with_repos(&["acme/api", "acme/web"]);
        let mut engine = LayoutEngine::new(config());
        engine.run(&mut graph);
        let settled = graph
            .nodes()
            .iter()
            .map(|node| (node.id.clone(), position(&graph, &node.id)))
            .collect::<Vec<_>>();

        let branches = Fetched::Branches {
            repo: "acme/api".to_owned(),
            items: vec![named_branch("main")],
        };
        let outcome = graph.merge(normalize(&branches, "repo:acme/api").subtree);
        engine.seed_new_nodes(&mut graph, &outcome.added);
        engine.reheat_for_merge();

        for (id, before) in &settled {
            assert_eq!(position(&graph, id), *before);
        }
        let parent = position(&graph, "repo:acme/api");
        let seeded = position(&graph, "branch:acme/api:main");
        assert!((seeded - parent).length() <= config().seed_jitter + 1.0e-3);
        assert!((seeded - parent).length() > 0.0);

        assert_eq!(engine.status(), LayoutStatus::Running);
        assert!(engine.alpha() >= config().reheat_alpha);
        engine.tick(&mut graph);
        for (id, before) in &settled {
            let drift = (position(&graph, id) - *before).length();
            assert!(drift < 80.0, "{id} jumped by {drift}");
        }
    }
}
