use std::f32::consts::TAU;

use eframe::egui::{Vec2, vec2};

use super::quadtree::Quadtree;

const COINCIDENT_DISTANCE_SQ: f32 = 1.0e-8;

#[derive(Clone, Copy, Debug)]
pub(super) struct Repulsion {
    pub(super) strength: f32,
    pub(super) softening: f32,
    pub(super) theta: f32,
}

#[derive(Clone, Copy, Debug)]
pub(super) struct Collision {
    pub(super) padding: f32,
    pub(super) strength: f32,
}

/// Unit vector pushing `index` away from `other` when the two coincide.
///
/// Derived from the unordered pair so the two nodes always receive opposite
/// directions and the pair's net force stays zero.
pub(super) fn separation_direction(index: usize, other: usize) -> Vec2 {
    let (low, high, sign) = if index < other {
        (index, other, 1.0)
    } else {
        (other, index, -1.0)
    };
    let angle = ((low as f32) * 0.618_034 + (high as f32) * 0.414_214) * TAU;
    vec2(angle.cos(), angle.sin()) * sign
}

fn pairwise_push(
    index: usize,
    other: usize,
    positions: &[Vec2],
    params: Repulsion,
) -> Vec2 {
    let delta = positions[index] - positions[other];
    let distance_sq = delta.length_sq();
    let direction = if distance_sq > COINCIDENT_DISTANCE_SQ {
        delta / distance_sq.sqrt()
    } else {
        separation_direction(index, other)
    };
    direction * (params.strength / (distance_sq + params.softening))
}

/// Barnes-Hut repulsion acting on `index`. `stack` is scratch space.
pub(super) fn repulsion_on(
    tree: &Quadtree,
    index: usize,
    positions: &[Vec2],
    params: Repulsion,
    stack: &mut Vec<usize>,
) -> Vec2 {
    let point = positions[index];
    let mut force = Vec2::ZERO;
    stack.clear();
    stack.push(Quadtree::ROOT);

    while let Some(slot) = stack.pop() {
        let Some(cell) = tree.cell(slot) else {
            continue;
        };
        if cell.mass <= 0.0 {
            continue;
        }

        if cell.is_leaf() {
            for &other in &cell.members {
                if other != index {
                    force += pairwise_push(index, other, positions, params);
                }
            }
            continue;
        }

        let delta = point - cell.center_of_mass;
        let distance_sq = delta.length_sq().max(1.0e-4);
        let distance = distance_sq.sqrt();
        let far_enough = !cell.bounds.contains(point)
            && cell.mass > 1.0
            && cell.bounds.side() / distance < params.theta;
        if far_enough {
            force += (delta / distance) * (params.strength * cell.mass / (distance_sq + params.softening));
            continue;
        }

        stack.extend(cell.child_slots());
    }

    force
}

/// Pushes overlapping pairs apart in place and returns how many overlapped.
///
/// A pinned node never moves; its free partner takes the whole correction.
/// Two pinned nodes are left overlapping.
pub(super) fn resolve_collisions(
    tree: &Quadtree,
    positions: &mut [Vec2],
    radii: &[f32],
    pinned: &[bool],
    params: Collision,
    stack: &mut Vec<usize>,
) -> usize {
    let mut overlaps = 0;

    for index in 0..positions.len() {
        let radius = radii[index];
        stack.clear();
        stack.push(Quadtree::ROOT);

        while let Some(slot) = stack.pop() {
            let Some(cell) = tree.cell(slot) else {
                continue;
            };
            let reach = (radius + cell.max_radius) * params.padding;
            if cell.bounds.distance_sq_to(positions[index]) > reach * reach {
                continue;
            }
            if !cell.is_leaf() {
                stack.extend(cell.child_slots());
                continue;
            }

            for &other in &cell.members {
                if other <= index || (pinned[index] && pinned[other]) {
                    continue;
                }

                let min_distance = (radius + radii[other]) * params.padding;
                let delta = positions[index] - positions[other];
                let distance_sq = delta.length_sq();
                if distance_sq >= min_distance * min_distance {
                    continue;
                }

                let distance = distance_sq.sqrt();
                let direction = if distance_sq > COINCIDENT_DISTANCE_SQ {
                    delta / distance
                } else {
                    separation_direction(index, other)
                };
                let correction = direction * ((min_distance - distance) * params.strength);
                let (own_share, other_share) = match (pinned[index], pinned[other]) {
                    (true, _) => (0.0, 1.0),
                    (_, true) => (1.0, 0.0),
                    _ => (0.5, 0.5),
                };
                positions[index] += correction * own_share;
                positions[other] -= correction * other_share;
                overlaps += 1;
            }
        }
    }

    overlaps
}
