mod app;
mod controller;
mod error;
mod github;
mod graph;
mod interaction;
mod layout;
mod render;
mod util;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, anyhow};
use clap::Parser;

use crate::app::{AppOptions, ExplorerApp};
use crate::controller::ControllerConfig;
use crate::github::{GitHubClient, SessionQuery, SessionStore};
use crate::layout::LayoutConfig;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Start from this organization instead of listing your organizations.
    #[arg(long)]
    org: Option<String>,

    #[arg(long, default_value = "https://api.github.com")]
    api_url: String,

    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Where expansions are cached between runs.
    #[arg(long)]
    session_file: Option<PathBuf>,

    /// Always fetch fresh data and never write the session cache.
    #[arg(long)]
    no_session: bool,

    /// Keep dragged nodes pinned where they are dropped.
    #[arg(long)]
    lock_on_drop: bool,

    /// Layout ticks allowed per reheat before the simulation is stopped.
    #[arg(long, default_value_t = 600)]
    max_ticks: usize,

    /// Wall-clock budget per reheat, in milliseconds.
    #[arg(long, default_value_t = 3000)]
    max_layout_ms: u64,

    /// Seed for initial node placement.
    #[arg(long)]
    layout_seed: Option<u64>,
}

impl Args {
    fn controller_config(&self) -> ControllerConfig {
        let defaults = LayoutConfig::default();
        ControllerConfig {
            lock_on_drop: self.lock_on_drop,
            layout: LayoutConfig {
                max_ticks: self.max_ticks.max(1),
                max_duration: Duration::from_millis(self.max_layout_ms.max(1)),
                seed: self.layout_seed.unwrap_or(defaults.seed),
                ..defaults
            },
        }
    }

    fn session_path(&self) -> Option<PathBuf> {
        if self.no_session {
            return None;
        }
        Some(
            self.session_file
                .clone()
                .unwrap_or_else(SessionStore::default_path),
        )
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let client = GitHubClient::new(&args.api_url, args.token.as_deref())
        .with_context(|| format!("failed to set up a client for {}", args.api_url))?;

    let app_options = AppOptions {
        org: args.org.clone(),
        query: SessionQuery {
            org: args.org.clone(),
            api_url: args.api_url.clone(),
        },
        session_path: args.session_path(),
        controller: args.controller_config(),
    };

    let options = eframe::NativeOptions {
        viewport: eframe::egui::ViewportBuilder::default().with_inner_size([1440.0, 920.0]),
        ..Default::default()
    };

    eframe::run_native(
        "gh-atlas",
        options,
        Box::new(move |cc| {
            Ok(Box::new(ExplorerApp::new(
                cc,
                Arc::new(client),
                app_options,
            )))
        }),
    )
    .map_err(|error| anyhow!("{error}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_feed_the_layout_config() {
        let args = Args::parse_from([
            "gh-atlas",
            "--org",
            "acme",
            "--max-ticks",
            "0",
            "--layout-seed",
            "7",
            "--lock-on-drop",
            "--no-session",
        ]);

        let config = args.controller_config();
        assert!(config.lock_on_drop);
        assert_eq!(config.layout.max_ticks, 1);
        assert_eq!(config.layout.seed, 7);
        assert_eq!(args.session_path(), None);
        assert_eq!(args.org.as_deref(), Some("acme"));
    }

    #[test]
    fn session_file_defaults_to_temp_dir() {
        let args = Args::parse_from(["gh-atlas"]);
        assert_eq!(args.session_path(), Some(SessionStore::default_path()));
        assert_eq!(args.api_url, "https://api.github.com");
    }
}
