use eframe::egui::{Vec2, vec2};

const LEAF_CAPACITY: usize = 12;
const MAX_DEPTH: usize = 10;

/// Axis-aligned square region of world space.
#[derive(Clone, Copy, Debug)]
pub(super) struct Bounds {
    center: Vec2,
    half: f32,
}

impl Bounds {
    fn enclosing(points: &[Vec2]) -> Option<Self> {
        let mut min = vec2(f32::INFINITY, f32::INFINITY);
        let mut max = vec2(f32::NEG_INFINITY, f32::NEG_INFINITY);
        for point in points.iter().filter(|point| point.is_finite()) {
            min = min.min(*point);
            max = max.max(*point);
        }
        if !min.is_finite() || !max.is_finite() {
            return None;
        }

        let span = (max - min).max(vec2(1.0, 1.0));
        Some(Self {
            center: (min + max) * 0.5,
            half: span.max_elem() * 0.5 + 1.0,
        })
    }

    pub(super) fn contains(self, point: Vec2) -> bool {
        (point.x - self.center.x).abs() <= self.half && (point.y - self.center.y).abs() <= self.half
    }

    pub(super) fn side(self) -> f32 {
        self.half * 2.0
    }

    /// Squared distance from `point` to the nearest edge of the square, zero inside.
    pub(super) fn distance_sq_to(self, point: Vec2) -> f32 {
        let dx = ((point.x - self.center.x).abs() - self.half).max(0.0);
        let dy = ((point.y - self.center.y).abs() - self.half).max(0.0);
        dx * dx + dy * dy
    }

    fn quadrant_of(self, point: Vec2) -> usize {
        usize::from(point.x >= self.center.x) | (usize::from(point.y >= self.center.y) << 1)
    }

    fn quadrant(self, quadrant: usize) -> Self {
        let quarter = self.half * 0.5;
        let x = if quadrant & 1 == 0 { -quarter } else { quarter };
        let y = if quadrant & 2 == 0 { -quarter } else { quarter };
        Self {
            center: self.center + vec2(x, y),
            half: quarter,
        }
    }
}

pub(super) struct Cell {
    pub(super) bounds: Bounds,
    pub(super) center_of_mass: Vec2,
    pub(super) mass: f32,
    /// Largest radius of any member below this cell; bounds collision lookups.
    pub(super) max_radius: f32,
    /// Member indices, only populated on leaves.
    pub(super) members: Vec<usize>,
    pub(super) children: [Option<usize>; 4],
}

impl Cell {
    pub(super) fn is_leaf(&self) -> bool {
        self.children.iter().all(Option::is_none)
    }

    pub(super) fn child_slots(&self) -> impl Iterator<Item = usize> + '_ {
        self.children.iter().flatten().copied()
    }
}

/// Arena-backed quadtree over node positions; slot 0 is the root cell.
pub(super) struct Quadtree {
    cells: Vec<Cell>,
}

impl Quadtree {
    pub(super) const ROOT: usize = 0;

    pub(super) fn build(positions: &[Vec2], radii: &[f32]) -> Option<Self> {
        let bounds = Bounds::enclosing(positions)?;
        let mut tree = Self {
            cells: Vec::with_capacity(positions.len() / LEAF_CAPACITY * 2 + 1),
        };
        tree.push_cell(bounds, (0..positions.len()).collect(), positions, radii, 0);
        Some(tree)
    }

    pub(super) fn cell(&self, slot: usize) -> Option<&Cell> {
        self.cells.get(slot)
    }

    fn push_cell(
        &mut self,
        bounds: Bounds,
        members: Vec<usize>,
        positions: &[Vec2],
        radii: &[f32],
        depth: usize,
    ) -> usize {
        let mut center_of_mass = Vec2::ZERO;
        let mut max_radius = 0.0_f32;
        for &member in &members {
            center_of_mass += positions[member];
            max_radius = max_radius.max(radii.get(member).copied().unwrap_or(0.0));
        }
        let mass = members.len() as f32;
        if mass > 0.0 {
            center_of_mass /= mass;
        }

        let slot = self.cells.len();
        self.cells.push(Cell {
            bounds,
            center_of_mass,
            mass,
            max_radius,
            members: Vec::new(),
            children: [None; 4],
        });

        if depth >= MAX_DEPTH || members.len() <= LEAF_CAPACITY {
            self.cells[slot].members = members;
            return slot;
        }

        let mut buckets: [Vec<usize>; 4] = Default::default();
        for &member in &members {
            buckets[bounds.quadrant_of(positions[member])].push(member);
        }
        if buckets.iter().filter(|bucket| !bucket.is_empty()).count() <= 1 {
            // Coincident points; splitting further would never separate them.
            self.cells[slot].members = members;
            return slot;
        }

        for (quadrant, bucket) in buckets.into_iter().enumerate() {
            if bucket.is_empty() {
                continue;
            }
            let child = self.push_cell(
                bounds.quadrant(quadrant),
                bucket,
                positions,
                radii,
                depth + 1,
            );
            self.cells[slot].children[quadrant] = Some(child);
        }
        slot
    }
}
