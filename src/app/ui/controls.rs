use eframe::egui::{self, RichText, Sense, Ui, vec2};

use crate::graph::{Category, CategoryFilter};
use crate::render::category_color;

use super::super::ViewModel;

const MATCH_ROWS: usize = 40;

impl ViewModel {
    pub(in crate::app) fn draw_controls(&mut self, ui: &mut Ui) {
        ui.heading("Controls");
        ui.add_space(6.0);

        ui.label(RichText::new("Filter").strong());
        let current = self.viz.filter();
        let mut chosen = current;
        egui::ComboBox::from_id_salt("category_filter")
            .selected_text(current.label())
            .show_ui(ui, |ui| {
                ui.selectable_value(&mut chosen, CategoryFilter::All, CategoryFilter::All.label());
                for category in Category::ALL {
                    let filter = CategoryFilter::Only(category);
                    ui.selectable_value(&mut chosen, filter, filter.label());
                }
            });
        if chosen != current {
            self.viz.set_filter(chosen);
        }
        let view = self.viz.view();
        ui.small(format!(
            "{} nodes and {} edges emphasized",
            view.visible_node_count(),
            view.visible_edge_count()
        ));

        ui.separator();
        ui.label(RichText::new("Search").strong());
        ui.add(egui::TextEdit::singleline(&mut self.search).hint_text("fuzzy match on labels"));
        self.draw_search_matches(ui);

        ui.separator();
        ui.label(RichText::new("Layout").strong());
        ui.checkbox(&mut self.live_layout, "Live layout");
        let mut lock_on_drop = self.viz.lock_on_drop();
        if ui
            .checkbox(&mut lock_on_drop, "Keep dragged nodes pinned")
            .changed()
        {
            self.viz.set_lock_on_drop(lock_on_drop);
        }
        ui.checkbox(&mut self.cascade_remove, "Remove descendants with a node");
        if ui.button("Reset view").clicked() {
            self.pan = vec2(0.0, 0.0);
            self.zoom = 1.0;
        }

        ui.separator();
        ui.label(RichText::new("Legend").strong());
        for category in Category::ALL {
            ui.horizontal(|ui| {
                let (rect, _) = ui.allocate_exact_size(vec2(12.0, 12.0), Sense::hover());
                ui.painter()
                    .circle_filled(rect.center(), 5.5, category_color(category));
                ui.label(category.label());
            });
        }
        ui.small("Red outline: protected branch");
    }

    fn draw_search_matches(&mut self, ui: &mut Ui) {
        let query = self.search.trim();
        if query.is_empty() {
            return;
        }

        let matches = self
            .search_match_cache
            .as_ref()
            .filter(|cache| cache.query == query)
            .map(|cache| {
                let mut ids = cache.matches.iter().cloned().collect::<Vec<_>>();
                ids.sort();
                ids
            })
            .unwrap_or_default();
        if matches.is_empty() {
            ui.small("No matches.");
            return;
        }

        ui.small(format!("{} matches", matches.len()));
        let mut picked = None;
        egui::ScrollArea::vertical()
            .id_salt("search_matches_scroll")
            .max_height(180.0)
            .show(ui, |ui| {
                for id in matches.iter().take(MATCH_ROWS) {
                    let Some(node) = self.viz.graph().node(id) else {
                        continue;
                    };
                    if ui.link(node.label.as_str()).on_hover_text(id.as_str()).clicked() {
                        picked = Some(id.clone());
                    }
                }
            });
        if picked.is_some() {
            self.selected = picked;
        }
    }
}
