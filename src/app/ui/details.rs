use eframe::egui::{self, Color32, RichText, Ui};

use crate::graph::{Node, Payload, ROOT_ID};
use crate::interaction::{ExpandRequest, ExpandState, PreviewRequest};
use crate::util::{abbreviate_path, format_bytes, short_sha};

use super::super::ViewModel;

const NEIGHBOR_ROWS: usize = 48;

fn optional(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("-")
}

fn draw_payload(ui: &mut Ui, node: &Node) {
    match &node.payload {
        Payload::Root => {
            ui.label("Entry point: expand to list organizations.");
        }
        Payload::Organization {
            login, description, ..
        } => {
            ui.label(format!("Login: {login}"));
            ui.label(format!("Description: {}", optional(description)));
        }
        Payload::Repository {
            full_name,
            description,
            language,
            default_branch,
            stars,
            size,
        } => {
            ui.label(format!("Repository: {full_name}"));
            ui.label(format!("Description: {}", optional(description)));
            ui.label(format!("Language: {}", optional(language)));
            ui.label(format!("Default branch: {}", optional(default_branch)));
            ui.label(format!("Stars: {stars}"));
            ui.label(format!("Size: {}", format_bytes(*size)));
        }
        Payload::Branch {
            repository,
            name,
            protected,
            commit_sha,
        } => {
            ui.label(format!("Branch: {repository}@{name}"));
            if *protected {
                ui.label(RichText::new("Protected").color(Color32::from_rgb(0xdc, 0x35, 0x45)));
            }
            if let Some(sha) = commit_sha {
                ui.label(format!("Head: {}", short_sha(sha)));
            }
        }
        Payload::Contributor {
            scope,
            login,
            contributions,
            ..
        } => {
            ui.label(format!("Login: @{login}"));
            match contributions {
                Some(count) => ui.label(format!("Contributions to {scope}: {count}")),
                None => ui.label(format!("Seen on {scope} branches; see link weights")),
            };
        }
        Payload::File {
            repository,
            reference,
            path,
            size,
        } => {
            ui.label(format!("Path: {path}"));
            ui.label(format!("Size: {}", format_bytes(*size)));
            ui.label(format!(
                "In: {repository}@{}",
                reference.as_deref().unwrap_or("HEAD")
            ));
        }
        Payload::Directory {
            repository,
            reference,
            path,
        } => {
            ui.label(format!("Directory: {path}/"));
            ui.label(format!(
                "In: {repository}@{}",
                reference.as_deref().unwrap_or("HEAD")
            ));
        }
    }
}

impl ViewModel {
    pub(in crate::app) fn draw_details(&mut self, ui: &mut Ui) {
        ui.heading("Selection Details");
        ui.add_space(6.0);

        let Some(selected_id) = self.selected.clone() else {
            ui.label("Click a node to expand it. Drag a node to pin it in place.");
            return;
        };

        let Some(node) = self.viz.graph().node(&selected_id).cloned() else {
            ui.label("Selected node is no longer in the graph.");
            return;
        };

        ui.label(RichText::new(node.label.as_str()).strong());
        ui.small(format!("{}  ({})", node.id, node.kind().label()));
        ui.add_space(6.0);
        draw_payload(ui, &node);

        ui.separator();
        self.draw_expand_controls(ui, &node);

        ui.separator();
        ui.horizontal(|ui| {
            if let Some(pin) = node.pinned {
                ui.label(format!("Pinned at ({:.0}, {:.0})", pin.x, pin.y));
                if ui.button("Unpin").clicked() {
                    self.viz.unpin(&node.id);
                }
            } else {
                ui.label("Free");
            }
        });
        if node.id != ROOT_ID {
            let label = if self.cascade_remove {
                "Remove with descendants"
            } else {
                "Remove"
            };
            if ui.button(label).clicked() {
                self.remove_node(&node.id);
                return;
            }
        }

        ui.separator();
        ui.label(RichText::new("Path from root").strong());
        match self.viz.graph().path_from_root(&node.id) {
            Some(path) => {
                let labels = path
                    .iter()
                    .map(|id| {
                        self.viz
                            .graph()
                            .node(id)
                            .map(|node| node.label.as_str())
                            .unwrap_or(id.as_str())
                    })
                    .collect::<Vec<_>>();
                ui.label(abbreviate_path(&labels, 6, 3));
            }
            None => {
                ui.label("Not connected to the root.");
            }
        }

        ui.separator();
        self.draw_neighbors(ui, &node.id);
    }

    fn draw_expand_controls(&mut self, ui: &mut Ui, node: &Node) {
        if PreviewRequest::for_node(node).is_some() {
            if ui.button("Preview").on_hover_text("Show the file contents").clicked() {
                self.request_preview(node);
            }
            return;
        }
        if ExpandRequest::for_node(node).is_none() {
            ui.label("Leaf node: nothing to expand.");
            return;
        }

        let mut clicked = false;
        match self.viz.expand_state(&node.id) {
            ExpandState::Collapsed => {
                clicked = ui.button("Expand").clicked();
            }
            ExpandState::Pending { .. } => {
                ui.horizontal(|ui| {
                    ui.spinner();
                    ui.label("Fetching...");
                });
            }
            ExpandState::Expanded => {
                clicked = ui
                    .button("Refresh")
                    .on_hover_text("Fetch again and merge anything new")
                    .clicked();
            }
            ExpandState::Failed { message } => {
                ui.label(RichText::new(format!("Expand failed: {message}")).color(Color32::LIGHT_RED));
                clicked = ui.button("Retry").clicked();
            }
        }

        if clicked {
            let action = self.viz.expand(&node.id);
            self.apply_click(action);
        }
    }

    fn draw_neighbors(&mut self, ui: &mut Ui, node_id: &str) {
        ui.label(RichText::new("Links").strong());

        let graph = self.viz.graph();
        let mut rows = graph
            .incident_edges(node_id)
            .filter_map(|edge| {
                let (other, direction) = if edge.source == node_id {
                    (edge.target.as_str(), "->")
                } else {
                    (edge.source.as_str(), "<-")
                };
                let label = graph.node(other)?.label.as_str();
                Some((other.to_owned(), format!("{direction} {label}  ({})", edge.kind.label())))
            })
            .collect::<Vec<_>>();
        rows.sort_by(|a, b| a.1.cmp(&b.1));

        if rows.is_empty() {
            ui.label("No links.");
            return;
        }

        let mut picked = None;
        egui::ScrollArea::vertical()
            .id_salt("neighbor_scroll")
            .max_height(320.0)
            .auto_shrink([false, false])
            .show(ui, |ui| {
                for (other, text) in rows.iter().take(NEIGHBOR_ROWS) {
                    if ui.link(text.as_str()).on_hover_text(other.as_str()).clicked() {
                        picked = Some(other.clone());
                    }
                }
                if rows.len() > NEIGHBOR_ROWS {
                    ui.small(format!("and {} more", rows.len() - NEIGHBOR_ROWS));
                }
            });
        if picked.is_some() {
            self.selected = picked;
        }
    }
}
