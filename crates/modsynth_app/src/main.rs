// SPDX-License-Identifier: MIT OR Apache-2.0
//! `modsynth` - headless texture graph renderer
//!
//! Loads a graph document, solves it on the configured backend and writes
//! every `OUT` node to `<output_dir>/<key>.png`.
//!
//! ```text
//! modsynth <graph.ron> [settings.ron]
//! modsynth --write-settings [settings.ron]
//! ```

mod document;
mod error;
mod export;
mod settings;

use document::GraphDocument;
use error::{AppError, Result};
use modsynth_graph::{NodeGraph, NodeRegistry};
use settings::{AppSettings, SETTINGS_FILE_NAME};
use std::path::{Path, PathBuf};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const DEFAULT_FILTER: &str = "modsynth_app=info,modsynth_graph=info,wgpu=warn,naga=warn";

fn main() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting modsynth v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(std::env::args_os().skip(1).map(PathBuf::from).collect()) {
        tracing::error!("{e}");
        std::process::exit(1);
    }
}

fn run(args: Vec<PathBuf>) -> Result<()> {
    let settings_arg = |index: usize| {
        args.get(index)
            .cloned()
            .unwrap_or_else(|| PathBuf::from(SETTINGS_FILE_NAME))
    };

    match args.first() {
        None => Err(AppError::Usage),
        Some(flag) if flag.as_os_str() == "--write-settings" => {
            let path = settings_arg(1);
            AppSettings::default().save(&path)?;
            tracing::info!("Wrote default settings to {:?}", path);
            Ok(())
        }
        Some(document) => render(document, &settings_arg(1)),
    }
}

fn render(document_path: &Path, settings_path: &Path) -> Result<()> {
    let settings = AppSettings::load(settings_path)?;
    let document = GraphDocument::load(document_path)?;
    let base_dir = document_path.parent().unwrap_or_else(|| Path::new("."));

    let render = settings.create_context();
    let registry = NodeRegistry::with_builtin();
    let mut graph = NodeGraph::new(render.clone());
    let mut built = document.build(&mut graph, &registry, base_dir)?;

    let report = graph.solve();
    tracing::info!(
        "Solved {} nodes: {} compiled, {} reused, {} rendered",
        report.visited.len(),
        report.compiles,
        report.cache_reuses,
        report.renders
    );
    for (id, diagnostic) in &report.failed {
        tracing::error!("Node `{}` failed:\n{diagnostic}", built.key(*id).unwrap_or("?"));
    }

    let exported = export::export_outputs(&graph, &built, &settings.output_dir);
    built.release_uploads(&render);
    let written = exported?;
    if written.is_empty() {
        tracing::warn!("Document has no {} nodes, nothing exported", export::OUTPUT_CODE);
    }

    if report.is_success() {
        Ok(())
    } else {
        Err(AppError::SolveFailed(report.failed.len()))
    }
}
