use eframe::egui::{self, Align, Color32, Context, Layout, RichText};

use super::super::{PreviewLoad, ViewModel};

impl ViewModel {
    pub(in crate::app) fn show(&mut self, ctx: &Context) {
        egui::TopBottomPanel::top("top_bar")
            .resizable(false)
            .show(ctx, |ui| {
                ui.horizontal(|ui| {
                    ui.heading("gh-atlas");
                    ui.separator();
                    if let Some(org) = &self.org {
                        ui.label(format!("org: {org}"));
                    }
                    ui.label(format!("api: {}", self.api_url));
                    ui.label(format!("nodes: {}", self.viz.graph().node_count()));
                    ui.label(format!("edges: {}", self.viz.graph().edge_count()));

                    if ui
                        .button("Reset")
                        .on_hover_text("Clear the graph and the session cache")
                        .clicked()
                    {
                        self.reset_requested = true;
                    }
                    if ui.button("Reheat").clicked() {
                        self.viz.reheat(1.0);
                    }
                    if ui
                        .button("Settle")
                        .on_hover_text("Run the layout to rest now")
                        .clicked()
                    {
                        self.viz.settle();
                    }

                    ui.with_layout(Layout::right_to_left(Align::Center), |ui| {
                        ui.label(self.layout_status_text());
                        let pending = self.viz.pending_requests();
                        if pending > 0 {
                            ui.spinner();
                            ui.label(format!("fetching {pending}"));
                        }
                        ui.label(format!(
                            "visible: {}",
                            self.viz.surface().visible_nodes
                        ));
                    });
                });
            });

        egui::SidePanel::left("controls")
            .resizable(true)
            .default_width(280.0)
            .show(ctx, |ui| self.draw_controls(ui));

        egui::SidePanel::right("details")
            .resizable(true)
            .default_width(340.0)
            .show(ctx, |ui| self.draw_details(ui));

        egui::CentralPanel::default().show(ctx, |ui| self.draw_canvas(ui));

        self.draw_preview_window(ctx);
    }

    fn draw_preview_window(&mut self, ctx: &Context) {
        let Some(pane) = &self.preview else {
            return;
        };

        let mut open = true;
        egui::Window::new(format!("Preview: {}", pane.path))
            .id(egui::Id::new("file_preview"))
            .open(&mut open)
            .default_size([640.0, 480.0])
            .resizable(true)
            .show(ctx, |ui| match &pane.state {
                PreviewLoad::Loading => {
                    ui.horizontal(|ui| {
                        ui.spinner();
                        ui.label("Loading...");
                    });
                }
                PreviewLoad::Failed(message) => {
                    ui.label(RichText::new(message.as_str()).color(Color32::LIGHT_RED));
                }
                PreviewLoad::Ready(preview) => {
                    ui.small(format!("language: {}", preview.language));
                    if preview.truncated {
                        ui.small("Showing the beginning of a long file.");
                    }
                    egui::ScrollArea::both()
                        .id_salt("preview_scroll")
                        .auto_shrink([false, false])
                        .show(ui, |ui| {
                            ui.add(
                                egui::TextEdit::multiline(&mut preview.text.as_str())
                                    .code_editor()
                                    .desired_width(f32::INFINITY),
                            );
                        });
                }
            });

        if !open {
            self.preview = None;
        }
    }

    fn layout_status_text(&self) -> String {
        let layout = self.viz.layout();
        let moving = self.viz.surface().moving_nodes;
        format!(
            "layout: {} (alpha {:.3}, tick {}, {moving} moving)",
            layout.status().label(),
            layout.alpha(),
            layout.ticks()
        )
    }
}
