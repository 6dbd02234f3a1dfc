use eframe::egui::{Color32, Vec2, vec2};

use crate::graph::{Category, Graph, GraphView, Node, Payload};
use crate::interaction::{ExpandState, ExpandTracker};

const LABEL_GAP: f32 = 5.0;

pub fn category_color(category: Category) -> Color32 {
    match category {
        Category::Root => Color32::from_rgb(0x00, 0x7b, 0xff),
        Category::Organization => Color32::from_rgb(0x33, 0x66, 0xcc),
        Category::Repository => Color32::from_rgb(0xff, 0x99, 0x00),
        Category::Branch => Color32::from_rgb(0x4b, 0x8b, 0xbe),
        Category::Contributor => Color32::from_rgb(0x28, 0xa7, 0x45),
        Category::Directory => Color32::from_rgb(0x5c, 0x6b, 0xc0),
        Category::Python => Color32::from_rgb(0x4b, 0x8b, 0xbe),
        Category::JavaScript => Color32::from_rgb(0xf0, 0xdb, 0x4f),
        Category::Config => Color32::from_rgb(0x6a, 0x5a, 0xcd),
        Category::Documentation => Color32::from_rgb(0x17, 0xa2, 0xb8),
        Category::Text => Color32::from_rgb(0x6c, 0x75, 0x7d),
        Category::Other => Color32::from_rgb(0x8a, 0x93, 0x9b),
    }
}

const PROTECTED_STROKE: Color32 = Color32::from_rgb(0xdc, 0x35, 0x45);
const DEFAULT_STROKE: Color32 = Color32::from_rgb(0x1a, 0x1d, 0x22);
const EDGE_COLOR: Color32 = Color32::from_rgb(0x99, 0x99, 0x99);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Marker {
    Busy,
    Failed,
    Pinned,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LineCommand {
    pub edge_index: usize,
    pub from: Vec2,
    pub to: Vec2,
    pub width: f32,
    pub color: Color32,
    pub opacity: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CircleCommand {
    pub node_index: usize,
    pub center: Vec2,
    pub radius: f32,
    pub fill: Color32,
    pub stroke: Color32,
    pub opacity: f32,
    pub markers: Vec<Marker>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LabelCommand<'a> {
    pub node_index: usize,
    pub anchor: Vec2,
    pub text: &'a str,
    pub opacity: f32,
}

/// Draw commands for one tick, in world coordinates. Lines come first so
/// circles cover their endpoints.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Frame<'a> {
    pub lines: Vec<LineCommand>,
    pub circles: Vec<CircleCommand>,
    pub labels: Vec<LabelCommand<'a>>,
}

/// Where a node is drawn this frame. A node the layout has not reached yet
/// borrows its parent's spot; with no placed neighbor it is skipped.
fn draw_position(graph: &Graph, node: &Node) -> Option<Vec2> {
    node.current_position()
        .or_else(|| graph.anchor_position(&node.id))
}

fn markers(node: &Node, expand: &ExpandTracker) -> Vec<Marker> {
    let mut markers = Vec::new();
    match expand.state(&node.id) {
        ExpandState::Pending { .. } => markers.push(Marker::Busy),
        ExpandState::Failed { .. } => markers.push(Marker::Failed),
        ExpandState::Collapsed | ExpandState::Expanded => {}
    }
    if node.pinned.is_some() {
        markers.push(Marker::Pinned);
    }
    markers
}

pub fn edge_width(weight: f32) -> f32 {
    weight.max(0.0).sqrt().clamp(1.0, 6.0)
}

pub fn build_frame<'a>(graph: &'a Graph, view: &GraphView, expand: &ExpandTracker) -> Frame<'a> {
    let mut frame = Frame::default();
    let positions = graph
        .nodes()
        .iter()
        .map(|node| draw_position(graph, node))
        .collect::<Vec<_>>();

    for (edge_index, edge) in graph.edges().iter().enumerate() {
        let from = graph.index_of(&edge.source).and_then(|index| positions[index]);
        let to = graph.index_of(&edge.target).and_then(|index| positions[index]);
        let (Some(from), Some(to)) = (from, to) else {
            continue;
        };
        frame.lines.push(LineCommand {
            edge_index,
            from,
            to,
            width: edge_width(edge.weight),
            color: EDGE_COLOR,
            opacity: view.edge_opacity_in(graph, edge_index),
        });
    }

    for (node_index, node) in graph.nodes().iter().enumerate() {
        let Some(center) = positions[node_index] else {
            continue;
        };
        let opacity = view.node_opacity(&node.id);
        let stroke = match node.payload {
            Payload::Branch {
                protected: true, ..
            } => PROTECTED_STROKE,
            _ => DEFAULT_STROKE,
        };

        frame.circles.push(CircleCommand {
            node_index,
            center,
            radius: node.radius,
            fill: category_color(node.category),
            stroke,
            opacity,
            markers: markers(node, expand),
        });
        frame.labels.push(LabelCommand {
            node_index,
            anchor: center + vec2(node.radius + LABEL_GAP, 0.0),
            text: &node.label,
            opacity,
        });
    }

    frame
}
