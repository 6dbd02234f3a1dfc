use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread;

use eframe::egui::{Context, Vec2};
use log::{debug, info, warn};

use crate::controller::{ControllerConfig, RenderSurface, Visualization};
use crate::error::ApiError;
use crate::github::{DataSource, Fetched, OrgSummary, SessionBlob, SessionQuery, SessionStore};
use crate::graph::{Graph, GraphView, Node, ROOT_ID};
use crate::interaction::{ClickAction, ExpandRequest, FilePreview, PreviewRequest, RequestToken};
use crate::layout::LayoutStatus;

mod canvas;
mod render_utils;
mod ui;

const ENTRY_FADE_SECS: f64 = 0.6;

pub struct AppOptions {
    pub org: Option<String>,
    pub query: SessionQuery,
    /// `None` disables the session cache.
    pub session_path: Option<std::path::PathBuf>,
    pub controller: ControllerConfig,
}

/// A finished fetch on its way back from a worker thread.
struct FetchCompletion {
    node_id: String,
    token: RequestToken,
    result: Result<Vec<Fetched>, ApiError>,
}

struct PreviewCompletion {
    seq: u64,
    result: Result<FilePreview, ApiError>,
}

enum PreviewLoad {
    Loading,
    Ready(FilePreview),
    Failed(String),
}

/// The file preview window. Only the newest request (`seq`) may fill it.
struct PreviewPane {
    seq: u64,
    path: String,
    state: PreviewLoad,
}

struct Session {
    store: SessionStore,
    blob: SessionBlob,
}

impl Session {
    fn persist(&mut self) {
        if let Err(error) = self.store.save(&mut self.blob) {
            warn!("{error:#}");
        }
    }
}

/// Receives controller callbacks and keeps what the canvas needs to
/// animate them.
#[derive(Default)]
struct CanvasSurface {
    now: f64,
    entered_at: HashMap<String, f64>,
    moving_nodes: usize,
    visible_nodes: usize,
}

impl CanvasSurface {
    /// 0 right after a node is merged, rising to 1 as it fades in.
    fn entry_fade(&self, node_id: &str) -> f32 {
        self.entered_at
            .get(node_id)
            .map(|entered| ((self.now - entered) / ENTRY_FADE_SECS).clamp(0.0, 1.0) as f32)
            .unwrap_or(1.0)
    }

    fn fading(&self) -> bool {
        !self.entered_at.is_empty()
    }

    fn forget_finished_fades(&mut self) {
        let now = self.now;
        self.entered_at
            .retain(|_, entered| now - *entered < ENTRY_FADE_SECS);
    }
}

impl RenderSurface for CanvasSurface {
    fn on_merge(&mut self, new_ids: &[String], _graph: &Graph) {
        for id in new_ids {
            self.entered_at.insert(id.clone(), self.now);
        }
    }

    fn on_tick(&mut self, positions: &[(&str, Vec2)]) {
        self.moving_nodes = positions.len();
    }

    fn on_filter_changed(&mut self, view: &GraphView) {
        self.visible_nodes = view.visible_node_count();
    }
}

struct SearchMatchCache {
    query: String,
    graph_revision: u64,
    matches: Arc<HashSet<String>>,
}

struct RootPathCache {
    selected_id: String,
    graph_revision: u64,
    nodes: Arc<HashSet<String>>,
    edges: Arc<HashSet<(String, String)>>,
}

struct ViewModel {
    viz: Visualization<CanvasSurface>,
    org: Option<String>,
    api_url: String,
    search: String,
    selected: Option<String>,
    pan: Vec2,
    zoom: f32,
    live_layout: bool,
    cascade_remove: bool,
    search_match_cache: Option<SearchMatchCache>,
    root_path_cache: Option<RootPathCache>,
    /// Expand requests started from the UI this frame, waiting for a worker.
    outbox: Vec<(String, RequestToken, ExpandRequest)>,
    removed: Vec<String>,
    reset_requested: bool,
    preview: Option<PreviewPane>,
    preview_outbox: Option<(u64, PreviewRequest)>,
    next_preview: u64,
}

pub struct ExplorerApp {
    source: Arc<dyn DataSource>,
    session: Option<Session>,
    model: ViewModel,
    results_tx: Sender<FetchCompletion>,
    results_rx: Receiver<FetchCompletion>,
    previews_tx: Sender<PreviewCompletion>,
    previews_rx: Receiver<PreviewCompletion>,
    auto_expand: Option<String>,
}

impl ViewModel {
    fn new(options: &AppOptions) -> Self {
        Self {
            viz: Visualization::new(options.controller, CanvasSurface::default()),
            org: options.org.clone(),
            api_url: options.query.api_url.clone(),
            search: String::new(),
            selected: None,
            pan: Vec2::ZERO,
            zoom: 1.0,
            live_layout: true,
            cascade_remove: true,
            search_match_cache: None,
            root_path_cache: None,
            outbox: Vec::new(),
            removed: Vec::new(),
            reset_requested: false,
            preview: None,
            preview_outbox: None,
            next_preview: 0,
        }
    }

    /// Opens the preview window for a file node and queues its fetch.
    fn request_preview(&mut self, node: &Node) {
        let Some(request) = PreviewRequest::for_node(node) else {
            return;
        };
        self.next_preview += 1;
        self.preview = Some(PreviewPane {
            seq: self.next_preview,
            path: request.path.clone(),
            state: PreviewLoad::Loading,
        });
        self.preview_outbox = Some((self.next_preview, request));
    }

    fn complete_preview(&mut self, completion: PreviewCompletion) {
        let Some(pane) = self
            .preview
            .as_mut()
            .filter(|pane| pane.seq == completion.seq)
        else {
            debug!("dropping stale preview {}", completion.seq);
            return;
        };
        pane.state = match completion.result {
            Ok(preview) => PreviewLoad::Ready(preview),
            Err(error) => {
                warn!("preview of {} failed: {error}", pane.path);
                PreviewLoad::Failed(error.to_string())
            }
        };
    }

    /// Routes a click outcome: expands go to the outbox, both select.
    fn apply_click(&mut self, action: ClickAction) {
        match action {
            ClickAction::Expand {
                node_id,
                token,
                request,
            } => {
                self.selected = Some(node_id.clone());
                self.outbox.push((node_id, token, request));
            }
            ClickAction::Select { node_id } => self.selected = Some(node_id),
            ClickAction::Ignored => {}
        }
    }

    fn remove_node(&mut self, node_id: &str) {
        let removed = self.viz.remove(node_id, self.cascade_remove);
        if self
            .selected
            .as_ref()
            .is_some_and(|selected| removed.contains(selected))
        {
            self.selected = None;
        }
        self.removed.extend(removed);
    }
}

impl ExplorerApp {
    pub fn new(
        _cc: &eframe::CreationContext<'_>,
        source: Arc<dyn DataSource>,
        options: AppOptions,
    ) -> Self {
        let (results_tx, results_rx) = mpsc::channel();
        let (previews_tx, previews_rx) = mpsc::channel();
        let mut model = ViewModel::new(&options);

        let mut session = options.session_path.as_ref().map(|path| {
            let store = SessionStore::new(path);
            info!("session cache at {}", store.path().display());
            Session {
                store,
                blob: SessionBlob::new(options.query.clone()),
            }
        });
        let restored = session
            .as_ref()
            .and_then(|session| session.store.load(&options.query));

        let mut auto_expand = None;
        match (restored, session.as_mut()) {
            (Some(blob), Some(session)) => {
                for expansion in &blob.expansions {
                    model
                        .viz
                        .enqueue_cached(&expansion.node_id, expansion.batches.clone());
                }
                session.blob = blob;
            }
            _ => match &options.org {
                Some(org) => {
                    model.viz.enqueue_cached(
                        ROOT_ID,
                        vec![Fetched::Organizations {
                            items: vec![OrgSummary {
                                login: Some(org.clone()),
                                ..OrgSummary::default()
                            }],
                        }],
                    );
                    auto_expand = Some(format!("org:{org}"));
                }
                None => auto_expand = Some(ROOT_ID.to_owned()),
            },
        }

        Self {
            source,
            session,
            model,
            results_tx,
            results_rx,
            previews_tx,
            previews_rx,
            auto_expand,
        }
    }

    fn spawn_expand(&self, ctx: &Context, node_id: String, token: RequestToken, request: ExpandRequest) {
        let source = Arc::clone(&self.source);
        let tx = self.results_tx.clone();
        let ctx = ctx.clone();

        thread::spawn(move || {
            let result = request.fetch(source.as_ref());
            let _ = tx.send(FetchCompletion {
                node_id,
                token,
                result,
            });
            ctx.request_repaint();
        });
    }

    fn spawn_preview(&self, ctx: &Context, seq: u64, request: PreviewRequest) {
        let source = Arc::clone(&self.source);
        let tx = self.previews_tx.clone();
        let ctx = ctx.clone();

        thread::spawn(move || {
            let result = request.fetch(source.as_ref());
            let _ = tx.send(PreviewCompletion { seq, result });
            ctx.request_repaint();
        });
    }

    fn receive_completions(&mut self) {
        while let Ok(completion) = self.previews_rx.try_recv() {
            self.model.complete_preview(completion);
        }

        loop {
            match self.results_rx.try_recv() {
                Ok(completion) => {
                    self.model.viz.complete_expand(
                        &completion.node_id,
                        completion.token,
                        completion.result,
                    );
                }
                Err(TryRecvError::Empty) => break,
                // The app holds a sender itself, so this only happens on shutdown.
                Err(TryRecvError::Disconnected) => break,
            }
        }
    }

    fn advance(&mut self, ctx: &Context) {
        self.model.viz.surface_mut().now = ctx.input(|input| input.time);
        if !self.model.live_layout && self.model.viz.queued_merges() == 0 {
            return;
        }

        let report = self.model.viz.tick();
        if report.merged.is_empty() {
            return;
        }

        info!(
            "merged {} expansions, {} new nodes, {} records skipped",
            report.merged.len(),
            report.added.len(),
            report.skipped_records
        );
        if let Some(session) = self.session.as_mut() {
            for accepted in report.merged {
                session.blob.record(&accepted.node_id, accepted.batches);
            }
            session.persist();
        }
    }

    fn apply_housekeeping(&mut self) {
        if self.model.reset_requested {
            self.model.reset_requested = false;
            self.model.viz.reset();
            self.model.selected = None;
            self.model.removed.clear();
            self.model.pan = Vec2::ZERO;
            if let Some(session) = self.session.as_mut() {
                session.blob.expansions.clear();
                session.store.clear();
            }
            self.auto_expand = Some(ROOT_ID.to_owned());
        }

        if !self.model.removed.is_empty() {
            let removed = std::mem::take(&mut self.model.removed);
            if let Some(session) = self.session.as_mut() {
                session.blob.forget(&removed);
                session.persist();
            }
        }

        if let Some(node_id) = self.auto_expand.take() {
            if self.model.viz.graph().contains(&node_id) {
                let action = self.model.viz.click(&node_id);
                self.model.apply_click(action);
            } else {
                self.auto_expand = Some(node_id);
            }
        }
    }
}

impl eframe::App for ExplorerApp {
    fn update(&mut self, ctx: &Context, _frame: &mut eframe::Frame) {
        self.receive_completions();
        self.advance(ctx);
        self.apply_housekeeping();

        self.model.show(ctx);

        for (node_id, token, request) in std::mem::take(&mut self.model.outbox) {
            self.spawn_expand(ctx, node_id, token, request);
        }
        if let Some((seq, request)) = self.model.preview_outbox.take() {
            self.spawn_preview(ctx, seq, request);
        }

        let surface = self.model.viz.surface();
        let animating = (self.model.live_layout && self.model.viz.layout().status() == LayoutStatus::Running)
            || self.model.viz.queued_merges() > 0
            || surface.fading();
        if animating {
            ctx.request_repaint();
        }
        self.model.viz.surface_mut().forget_finished_fades();
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::github::testing::file;
    use crate::graph::normalize;

    fn model() -> ViewModel {
        ViewModel::new(&AppOptions {
            org: None,
            query: SessionQuery::default(),
            session_path: None,
            controller: ControllerConfig::default(),
        })
    }

    fn file_node(path: &str) -> Node {
        let batch = Fetched::Files {
            repo: "acme/api".to_owned(),
            reference: Some("main".to_owned()),
            items: vec![file(path, 10)],
        };
        normalize(&batch, ROOT_ID).subtree.nodes.remove(0)
    }

    fn preview(path: &str) -> FilePreview {
        FilePreview {
            path: path.to_owned(),
            language: "python",
            text: "pass\n".to_owned(),
            truncated: false,
        }
    }

    #[test]
    fn only_the_newest_preview_fills_the_window() {
        let mut model = model();
        model.request_preview(&file_node("a.py"));
        model.request_preview(&file_node("b.py"));
        let (seq, request) = model.preview_outbox.take().expect("queued");
        assert_eq!(request.path, "b.py");

        model.complete_preview(PreviewCompletion {
            seq: seq - 1,
            result: Ok(preview("a.py")),
        });
        assert!(matches!(
            model.preview.as_ref().map(|pane| &pane.state),
            Some(PreviewLoad::Loading)
        ));

        model.complete_preview(PreviewCompletion {
            seq,
            result: Err(ApiError::new(Some(404), "Not Found")),
        });
        let pane = model.preview.as_ref().expect("open");
        assert_eq!(pane.path, "b.py");
        assert!(matches!(&pane.state, PreviewLoad::Failed(message) if message.contains("404")));
    }

    #[test]
    fn only_file_nodes_open_a_preview() {
        let mut model = model();
        model.request_preview(&Node::root());
        assert!(model.preview.is_none());
        assert!(model.preview_outbox.is_none());
    }
}
