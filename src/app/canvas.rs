use std::collections::HashSet;
use std::sync::Arc;

use eframe::egui::{
    self, Align2, Color32, FontId, PointerButton, Rect, Sense, Stroke, Ui, Vec2, vec2,
};
use fuzzy_matcher::FuzzyMatcher;
use fuzzy_matcher::skim::SkimMatcherV2;

use crate::graph::Graph;
use crate::interaction::hit_test;
use crate::render::Marker;

use super::render_utils::{
    blend_color, circle_visible, draw_background, edge_visible, screen_to_world, with_opacity,
    world_to_screen,
};
use super::{RootPathCache, SearchMatchCache, ViewModel};

const HIT_SLOP_PX: f32 = 4.0;
const SELECTED_COLOR: Color32 = Color32::from_rgb(245, 206, 93);
const PATH_COLOR: Color32 = Color32::from_rgb(246, 206, 104);
const MATCH_COLOR: Color32 = Color32::from_rgb(103, 196, 255);
const FAILED_COLOR: Color32 = Color32::from_rgb(0xdc, 0x35, 0x45);

fn fuzzy_match_score(matcher: &SkimMatcherV2, text: &str, query: &str) -> Option<i64> {
    matcher
        .fuzzy_match(text, query)
        .or_else(|| matcher.fuzzy_match(&text.to_ascii_lowercase(), &query.to_ascii_lowercase()))
}

fn screen_radius(radius: f32, zoom: f32) -> f32 {
    (radius * zoom.powf(0.4)).clamp(2.5, 46.0)
}

/// Node under `world`, judged against the circle as drawn at `zoom` plus a
/// few pixels of slop.
fn node_at(graph: &Graph, world: Vec2, zoom: f32) -> Option<String> {
    hit_test(graph, world, |node| {
        (screen_radius(node.radius, zoom) + HIT_SLOP_PX) / zoom
    })
    .map(|node| node.id.clone())
}

impl ViewModel {
    fn handle_zoom(&mut self, ui: &Ui, rect: Rect, response: &egui::Response) {
        if !response.hovered() {
            return;
        }

        let scroll = ui.input(|input| input.raw_scroll_delta.y);
        if scroll.abs() <= f32::EPSILON {
            return;
        }

        let pointer = ui
            .input(|input| input.pointer.hover_pos())
            .unwrap_or_else(|| rect.center());
        let world_before = screen_to_world(rect, self.pan, self.zoom, pointer);

        let zoom_factor = (1.0 + (scroll * 0.0018)).clamp(0.85, 1.15);
        self.zoom = (self.zoom * zoom_factor).clamp(0.05, 6.0);
        self.pan = pointer - rect.center() - (world_before * self.zoom);
    }

    /// Primary drag on a node moves and pins it; on empty space it pans,
    /// as do secondary and middle drags anywhere.
    fn handle_drag(&mut self, rect: Rect, response: &egui::Response) {
        let pointer_world = response
            .interact_pointer_pos()
            .map(|pointer| screen_to_world(rect, self.pan, self.zoom, pointer));

        if response.drag_started_by(PointerButton::Primary)
            && let Some(world) = pointer_world
            && let Some(node_id) = node_at(self.viz.graph(), world, self.zoom)
        {
            self.viz.drag_start(&node_id);
        }

        if response.dragged_by(PointerButton::Primary) {
            match (self.viz.dragging().is_some(), pointer_world) {
                (true, Some(world)) => self.viz.drag_move(world),
                (true, None) => {}
                (false, _) => self.pan += response.drag_delta(),
            }
        } else if response.dragged_by(PointerButton::Secondary)
            || response.dragged_by(PointerButton::Middle)
        {
            self.pan += response.drag_delta();
        }

        if response.drag_stopped_by(PointerButton::Primary) && self.viz.dragging().is_some() {
            self.viz.drag_end();
        }
    }

    fn handle_click(&mut self, rect: Rect, response: &egui::Response) {
        if !response.clicked_by(PointerButton::Primary) {
            return;
        }
        let Some(pointer) = response.interact_pointer_pos() else {
            return;
        };

        let world = screen_to_world(rect, self.pan, self.zoom, pointer);
        match node_at(self.viz.graph(), world, self.zoom) {
            Some(node_id) => {
                let action = self.viz.click(&node_id);
                self.apply_click(action);
            }
            None => self.selected = None,
        }
    }

    fn cached_search_matches(&mut self) -> Option<Arc<HashSet<String>>> {
        let query = self.search.trim();
        if query.is_empty() {
            return None;
        }

        let revision = self.viz.graph().revision();
        if let Some(cached) = &self.search_match_cache
            && cached.graph_revision == revision
            && cached.query == query
        {
            return Some(Arc::clone(&cached.matches));
        }

        let matcher = SkimMatcherV2::default();
        let matches = self
            .viz
            .graph()
            .nodes()
            .iter()
            .filter(|node| fuzzy_match_score(&matcher, &node.label, query).is_some())
            .map(|node| node.id.clone())
            .collect::<HashSet<_>>();
        let matches = Arc::new(matches);

        self.search_match_cache = Some(SearchMatchCache {
            query: query.to_owned(),
            graph_revision: revision,
            matches: Arc::clone(&matches),
        });
        Some(matches)
    }

    fn cached_root_path(&mut self) -> Option<(Arc<HashSet<String>>, Arc<HashSet<(String, String)>>)> {
        let selected_id = self.selected.as_deref()?;
        let revision = self.viz.graph().revision();
        if let Some(cached) = &self.root_path_cache
            && cached.graph_revision == revision
            && cached.selected_id == selected_id
        {
            return Some((Arc::clone(&cached.nodes), Arc::clone(&cached.edges)));
        }

        let path = self.viz.graph().path_from_root(selected_id)?;
        let edges = path
            .windows(2)
            .map(|pair| (pair[0].clone(), pair[1].clone()))
            .collect::<HashSet<_>>();
        let nodes = Arc::new(path.into_iter().collect::<HashSet<_>>());
        let edges = Arc::new(edges);

        self.root_path_cache = Some(RootPathCache {
            selected_id: selected_id.to_owned(),
            graph_revision: revision,
            nodes: Arc::clone(&nodes),
            edges: Arc::clone(&edges),
        });
        Some((nodes, edges))
    }

    pub(in crate::app) fn draw_canvas(&mut self, ui: &mut Ui) {
        let (rect, response) = ui.allocate_exact_size(ui.available_size(), Sense::click_and_drag());
        let painter = ui.painter_at(rect);

        draw_background(&painter, rect, self.pan, self.zoom);

        self.handle_zoom(ui, rect, &response);
        self.handle_drag(rect, &response);
        self.handle_click(rect, &response);

        let search_matches = self.cached_search_matches();
        let root_path = self.cached_root_path();
        let (pan, zoom) = (self.pan, self.zoom);
        let time = ui.input(|input| input.time);

        let hovered_id = ui
            .input(|input| input.pointer.hover_pos())
            .filter(|pointer| rect.contains(*pointer))
            .and_then(|pointer| {
                let world = screen_to_world(rect, pan, zoom, pointer);
                node_at(self.viz.graph(), world, zoom)
            });

        if self.viz.dragging().is_some() {
            ui.output_mut(|output| output.cursor_icon = egui::CursorIcon::Grabbing);
        } else if hovered_id.is_some() {
            ui.output_mut(|output| output.cursor_icon = egui::CursorIcon::PointingHand);
        }

        if self.viz.graph().node_count() <= 1 && self.viz.pending_requests() > 0 {
            painter.text(
                rect.center(),
                Align2::CENTER_CENTER,
                "Loading organizations...",
                FontId::proportional(16.0),
                Color32::from_gray(200),
            );
        }

        let graph = self.viz.graph();
        let surface = self.viz.surface();
        let frame = self.viz.frame();
        let zoom_sqrt = zoom.sqrt();

        for line in &frame.lines {
            let start = world_to_screen(rect, pan, zoom, line.from);
            let end = world_to_screen(rect, pan, zoom, line.to);
            if !edge_visible(rect, start, end, 2.0) {
                continue;
            }

            let edge = &graph.edges()[line.edge_index];
            let on_path = root_path.as_ref().is_some_and(|(_, edges)| {
                edges.contains(&(edge.source.clone(), edge.target.clone()))
                    || edges.contains(&(edge.target.clone(), edge.source.clone()))
            });
            let fade = surface
                .entry_fade(&edge.source)
                .min(surface.entry_fade(&edge.target));

            let (width, color) = if on_path {
                ((line.width + 1.5) * zoom_sqrt, PATH_COLOR)
            } else {
                (line.width * zoom_sqrt, line.color)
            };
            painter.line_segment(
                [start, end],
                Stroke::new(width.clamp(0.5, 8.0), with_opacity(color, line.opacity * fade)),
            );
        }

        let mut selection_animating = false;
        for circle in &frame.circles {
            let node = &graph.nodes()[circle.node_index];
            let position = world_to_screen(rect, pan, zoom, circle.center);
            let radius = screen_radius(circle.radius, zoom);
            if !circle_visible(rect, position, radius + 8.0) {
                continue;
            }

            let is_selected = self.selected.as_deref() == Some(node.id.as_str());
            let is_hovered = hovered_id.as_deref() == Some(node.id.as_str());
            let on_path = root_path
                .as_ref()
                .is_some_and(|(nodes, _)| nodes.contains(&node.id));
            let is_match = search_matches
                .as_ref()
                .is_some_and(|matches| matches.contains(&node.id));

            let selection_mix = ui.ctx().animate_bool(
                ui.make_persistent_id(("node-selection", node.id.as_str())),
                is_selected,
            );
            if selection_mix > 0.0 && selection_mix < 1.0 {
                selection_animating = true;
            }

            let mut fill = circle.fill;
            if is_hovered {
                fill = blend_color(fill, Color32::WHITE, 0.25);
            } else if on_path {
                fill = blend_color(fill, PATH_COLOR, 0.45);
            } else if is_match {
                fill = blend_color(fill, MATCH_COLOR, 0.6);
            }
            fill = blend_color(fill, SELECTED_COLOR, selection_mix * 0.5);

            let opacity = circle.opacity * surface.entry_fade(&node.id);
            let radius = radius * (0.4 + 0.6 * surface.entry_fade(&node.id));

            painter.circle_filled(position, radius, with_opacity(fill, opacity));
            painter.circle_stroke(
                position,
                radius,
                Stroke::new(
                    1.5 + selection_mix * 1.2,
                    with_opacity(circle.stroke, opacity),
                ),
            );

            if selection_mix > 0.0 {
                let halo_strength = (selection_mix * (1.0 - selection_mix) * 4.0).clamp(0.0, 1.0);
                let halo_alpha = (30.0 + (halo_strength * 145.0)) as u8;
                painter.circle_stroke(
                    position,
                    radius + 4.0 + ((1.0 - selection_mix) * 6.0),
                    Stroke::new(
                        1.0 + (halo_strength * 1.6),
                        Color32::from_rgba_unmultiplied(245, 206, 93, halo_alpha),
                    ),
                );
            }

            for marker in &circle.markers {
                match marker {
                    Marker::Busy => {
                        let pulse = ((time * 4.0).sin() * 0.5 + 0.5) as f32;
                        painter.circle_stroke(
                            position,
                            radius + 3.0 + pulse * 3.0,
                            Stroke::new(1.5, with_opacity(Color32::WHITE, 0.3 + pulse * 0.5)),
                        );
                    }
                    Marker::Failed => {
                        painter.circle_stroke(
                            position,
                            radius + 3.0,
                            Stroke::new(2.0, FAILED_COLOR),
                        );
                        painter.text(
                            position,
                            Align2::CENTER_CENTER,
                            "!",
                            FontId::proportional(radius.max(10.0)),
                            Color32::WHITE,
                        );
                    }
                    Marker::Pinned => {
                        let corner = position + vec2(radius, -radius) * 0.72;
                        painter.circle_filled(corner, 2.5_f32.max(radius * 0.18), Color32::WHITE);
                    }
                }
            }
        }

        for label in &frame.labels {
            let node = &graph.nodes()[label.node_index];
            let radius = screen_radius(node.radius, zoom);
            let is_selected = self.selected.as_deref() == Some(node.id.as_str());
            let is_hovered = hovered_id.as_deref() == Some(node.id.as_str());
            let on_path = root_path
                .as_ref()
                .is_some_and(|(nodes, _)| nodes.contains(&node.id));
            let is_match = search_matches
                .as_ref()
                .is_some_and(|matches| matches.contains(&node.id));

            let show = is_selected
                || is_hovered
                || on_path
                || (is_match && zoom > 0.35)
                || radius > 17.0
                || zoom > 1.35;
            if !show {
                continue;
            }

            let anchor = world_to_screen(rect, pan, zoom, label.anchor - vec2(node.radius, 0.0))
                + vec2(radius, 0.0);
            painter.text(
                anchor,
                Align2::LEFT_CENTER,
                label.text,
                FontId::proportional(12.0),
                with_opacity(Color32::from_gray(238), label.opacity),
            );
        }

        if let Some(node) = hovered_id.as_deref().and_then(|id| graph.node(id)) {
            let panel_text = format!(
                "{}  |  {}  |  links {}",
                node.label,
                node.kind().label(),
                graph.adjacency(&node.id).len()
            );
            painter.text(
                rect.left_top() + vec2(10.0, 10.0),
                Align2::LEFT_TOP,
                panel_text,
                FontId::proportional(13.0),
                Color32::from_gray(240),
            );
        }

        if selection_animating {
            ui.ctx().request_repaint();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::Fetched;
    use crate::github::testing::named_repo;
    use crate::graph::{ROOT_ID, normalize};

    #[test]
    fn search_falls_back_to_case_insensitive_match() {
        let matcher = SkimMatcherV2::default();
        assert!(fuzzy_match_score(&matcher, "Acme-API", "api").is_some());
        assert!(fuzzy_match_score(&matcher, "tooling", "xyz").is_none());
    }

    fn graph_with_repo_at_origin() -> Graph {
        let mut graph = Graph::new();
        graph.merge(
            normalize(
                &Fetched::Repositories {
                    org: "acme".to_owned(),
                    items: vec![named_repo("acme/api")],
                },
                ROOT_ID,
            )
            .subtree,
        );
        graph.node_mut(ROOT_ID).expect("root").position = Some(vec2(-5000.0, 0.0));
        graph.node_mut("repo:acme/api").expect("repo").position = Some(Vec2::ZERO);
        graph
    }

    #[test]
    fn tiny_nodes_stay_clickable_when_zoomed_out() {
        assert_eq!(screen_radius(1.0, 0.05), 2.5);
        assert_eq!(screen_radius(200.0, 6.0), 46.0);

        let graph = graph_with_repo_at_origin();
        let zoom = 0.05;
        let drawn = screen_radius(18.0, zoom);
        let inside = vec2((drawn + 1.0) / zoom, 0.0);
        assert_eq!(node_at(&graph, inside, zoom).as_deref(), Some("repo:acme/api"));
    }

    #[test]
    fn clicks_outside_the_drawn_circle_miss_when_zoomed_in() {
        let graph = graph_with_repo_at_origin();
        let zoom = 3.0;
        let drawn = screen_radius(graph.node("repo:acme/api").expect("repo").radius, zoom);
        assert!(drawn < 46.0);

        let pixels_to_world = |pixels: f32| vec2(pixels / zoom, 0.0);
        assert_eq!(
            node_at(&graph, pixels_to_world(drawn - 1.0), zoom).as_deref(),
            Some("repo:acme/api")
        );
        assert_eq!(node_at(&graph, pixels_to_world(drawn + 20.0), zoom), None);
    }
}
