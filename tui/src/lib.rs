//! Terminal UI for quill: a manuscript editor hosting the inline
//! continuation loop.

// Forbid accidental stdout/stderr writes in the library portion of the TUI;
// the terminal is owned by ratatui and logging goes to a file.
#![deny(clippy::print_stdout, clippy::print_stderr)]

mod app;
mod app_event;
pub mod cli;
mod tui;

pub use cli::Cli;

use std::fs::OpenOptions;
use std::sync::Arc;

use quill_core::config::Config;
use quill_core::config::ConfigOverrides;
use quill_core::config::MAX_PREDICTION_LENGTH;
use quill_core::config::MIN_PREDICTION_LENGTH;
use quill_core::config::find_quill_home;
use quill_core::store::DraftStore;
use tracing_appender::non_blocking;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use crate::app::App;

pub async fn run_main(cli: Cli) -> anyhow::Result<()> {
    let quill_home = find_quill_home()?;

    let log_dir = quill_home.join("log");
    std::fs::create_dir_all(&log_dir)?;
    let mut log_file_opts = OpenOptions::new();
    log_file_opts.create(true).append(true);
    let log_file = log_file_opts.open(log_dir.join("quill-tui.log"))?;

    // Wrap file in non-blocking writer.
    let (non_blocking, _guard) = non_blocking(log_file);

    // use RUST_LOG env var, default to info for quill crates.
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("quill_core=info,quill_tui=info"));
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_target(false)
        .with_filter(env_filter);
    let _ = tracing_subscriber::registry().with(file_layer).try_init();

    let length_overridden = cli.length.is_some();
    let overrides = ConfigOverrides {
        model: cli.model,
        base_url: cli.base_url,
        api_key: cli.api_key,
        prediction_length: cli.length,
        draft_path: cli.draft,
    };
    let config = Arc::new(Config::load_with_overrides(quill_home, overrides).await?);

    let store = DraftStore::new(&config);
    let document = store.load_draft().await?.unwrap_or_default();
    let (story, saved_length) = store.load_story().await?;
    // A --length flag beats the value persisted in story.toml. Hand-edited
    // story files get clamped back into range.
    let prediction_length = if length_overridden {
        config.prediction_length
    } else {
        saved_length
            .unwrap_or(config.prediction_length)
            .clamp(MIN_PREDICTION_LENGTH, MAX_PREDICTION_LENGTH)
    };

    let mut terminal = tui::init()?;
    let app = App::new(config, store, story, prediction_length, document);
    let result = app.run(&mut terminal).await;
    tui::restore();
    result
}
